//! In-memory model of a rendered document.
//!
//! A `PageModel` is what the collection stages walk: an arena of nodes in tree
//! order, each carrying the computed style subset, client rect and live form
//! state the browser reported at capture time. Same-origin child frames carry
//! their own nested `PageModel`; cross-origin frames are opaque leaves.

use crate::errors::Result;
use crate::types::{ElementRect, Viewport};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

pub const TEXT_TAG: &str = "#text";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub usize);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ComputedStyle {
    pub display: String,
    pub visibility: String,
    pub opacity: f64,
    pub z_index: String,
    pub position: String,
    pub background_color: String,
    pub color: String,
    pub cursor: String,
    pub font_weight: String,
    pub font_size: String,
    pub pointer_events: String,
    pub fill: Option<String>,
    pub stroke: Option<String>,
}

impl Default for ComputedStyle {
    fn default() -> Self {
        Self {
            display: "block".to_string(),
            visibility: "visible".to_string(),
            opacity: 1.0,
            z_index: "auto".to_string(),
            position: "static".to_string(),
            background_color: "rgba(0, 0, 0, 0)".to_string(),
            color: "rgb(0, 0, 0)".to_string(),
            cursor: "auto".to_string(),
            font_weight: "400".to_string(),
            font_size: "16px".to_string(),
            pointer_events: "auto".to_string(),
            fill: None,
            stroke: None,
        }
    }
}

impl ComputedStyle {
    /// Numeric z-index, `None` for `auto` or anything unparsable.
    pub fn z_index_value(&self) -> Option<i64> {
        self.z_index.trim().parse::<i64>().ok()
    }

    pub fn is_positioned(&self) -> bool {
        self.position != "static"
    }

    pub fn is_hidden(&self) -> bool {
        self.display == "none" || self.visibility == "hidden" || self.opacity <= 0.0
    }
}

/// Serialized form of a document, as produced by the capture script.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSpec {
    pub url: String,
    #[serde(default)]
    pub viewport: Viewport,
    #[serde(default)]
    pub scroll_y: f64,
    #[serde(default = "default_ready_state")]
    pub ready_state: String,
    pub root: NodeSpec,
    /// Node budget the capture ran out of, if it did.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub truncated_at: Option<usize>,
}

fn default_ready_state() -> String {
    "complete".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FrameSpec {
    SameOrigin { document: Box<DocumentSpec> },
    CrossOrigin,
    NotLoaded,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeSpec {
    pub tag: String,
    pub attrs: BTreeMap<String, String>,
    pub style: ComputedStyle,
    pub rect: ElementRect,
    pub text: Option<String>,
    pub children: Vec<NodeSpec>,
    pub shadow: Vec<NodeSpec>,
    pub listeners: Vec<String>,
    pub value: Option<String>,
    pub checked: Option<bool>,
    pub connected: bool,
    pub frame: Option<FrameSpec>,
}

impl Default for NodeSpec {
    fn default() -> Self {
        Self {
            tag: "div".to_string(),
            attrs: BTreeMap::new(),
            style: ComputedStyle::default(),
            rect: ElementRect::default(),
            text: None,
            children: Vec::new(),
            shadow: Vec::new(),
            listeners: Vec::new(),
            value: None,
            checked: None,
            connected: true,
            frame: None,
        }
    }
}

impl NodeSpec {
    pub fn element(tag: &str) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            ..Default::default()
        }
    }

    pub fn text_node(text: &str) -> Self {
        Self {
            tag: TEXT_TAG.to_string(),
            text: Some(text.to_string()),
            ..Default::default()
        }
    }

    pub fn attr(mut self, key: &str, value: &str) -> Self {
        self.attrs.insert(key.to_string(), value.to_string());
        self
    }

    pub fn rect(mut self, x: f64, y: f64, width: f64, height: f64) -> Self {
        self.rect = ElementRect::new(x, y, width, height);
        self
    }

    pub fn styled(mut self, f: impl FnOnce(&mut ComputedStyle)) -> Self {
        f(&mut self.style);
        self
    }

    pub fn with_text(self, text: &str) -> Self {
        self.child(NodeSpec::text_node(text))
    }

    pub fn child(mut self, child: NodeSpec) -> Self {
        self.children.push(child);
        self
    }

    pub fn children(mut self, children: impl IntoIterator<Item = NodeSpec>) -> Self {
        self.children.extend(children);
        self
    }

    pub fn shadow_child(mut self, child: NodeSpec) -> Self {
        self.shadow.push(child);
        self
    }

    pub fn listener(mut self, event: &str) -> Self {
        self.listeners.push(event.to_string());
        self
    }

    pub fn value(mut self, value: &str) -> Self {
        self.value = Some(value.to_string());
        self
    }

    pub fn checked(mut self, checked: bool) -> Self {
        self.checked = Some(checked);
        self
    }

    pub fn disconnected(mut self) -> Self {
        self.connected = false;
        self
    }

    pub fn frame(mut self, frame: FrameSpec) -> Self {
        self.frame = Some(frame);
        self
    }
}

#[derive(Debug, Clone)]
pub enum FrameContent {
    SameOrigin(Arc<PageModel>),
    CrossOrigin,
    NotLoaded,
}

#[derive(Debug, Clone)]
pub struct Node {
    pub tag: String,
    pub attributes: BTreeMap<String, String>,
    pub style: ComputedStyle,
    pub rect: ElementRect,
    pub text: Option<String>,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub shadow_children: Vec<NodeId>,
    pub listeners: Vec<String>,
    pub value: Option<String>,
    pub checked: Option<bool>,
    pub connected: bool,
    pub frame: Option<FrameContent>,
}

impl Node {
    pub fn is_text(&self) -> bool {
        self.tag == TEXT_TAG
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(|v| v.as_str())
    }

    /// Attribute value trimmed, `None` when missing or blank.
    pub fn attr_nonempty(&self, name: &str) -> Option<&str> {
        self.attr(name).map(str::trim).filter(|v| !v.is_empty())
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    pub fn class_tokens(&self) -> impl Iterator<Item = &str> {
        self.attr("class").unwrap_or("").split_whitespace()
    }

    pub fn has_listener(&self, event: &str) -> bool {
        self.listeners.iter().any(|l| l == event)
    }
}

#[derive(Debug, Clone)]
pub struct PageModel {
    pub url: String,
    pub viewport: Viewport,
    pub scroll_y: f64,
    pub ready_state: String,
    /// Set when the capture stopped at a node budget and the tail of the
    /// document is missing.
    pub truncated_at: Option<usize>,
    nodes: Vec<Node>,
    root: NodeId,
    ids: HashMap<String, NodeId>,
}

impl PageModel {
    pub fn from_spec(spec: DocumentSpec) -> Self {
        let mut model = Self {
            url: spec.url,
            viewport: spec.viewport,
            scroll_y: spec.scroll_y,
            ready_state: spec.ready_state,
            truncated_at: spec.truncated_at,
            nodes: Vec::new(),
            root: NodeId(0),
            ids: HashMap::new(),
        };
        model.root = model.push(spec.root, None);
        model
    }

    /// The same document viewed at another scroll offset. Rects stay
    /// viewport-relative, so every node moves by the scroll difference.
    pub fn scrolled_to(&self, scroll_y: f64) -> Self {
        let mut page = self.clone();
        let dy = self.scroll_y - scroll_y;
        for node in &mut page.nodes {
            node.rect = node.rect.offset(0.0, dy);
        }
        page.scroll_y = scroll_y;
        page
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let spec: DocumentSpec = serde_json::from_value(value)?;
        Ok(Self::from_spec(spec))
    }

    // Nodes are pushed in pre-order (shadow tree before light children), so
    // arena index doubles as tree order.
    fn push(&mut self, spec: NodeSpec, parent: Option<NodeId>) -> NodeId {
        let id = NodeId(self.nodes.len());
        let frame = spec.frame.map(|frame| match frame {
            FrameSpec::SameOrigin { document } => {
                FrameContent::SameOrigin(Arc::new(PageModel::from_spec(*document)))
            }
            FrameSpec::CrossOrigin => FrameContent::CrossOrigin,
            FrameSpec::NotLoaded => FrameContent::NotLoaded,
        });

        if let Some(dom_id) = spec.attrs.get("id") {
            self.ids.entry(dom_id.clone()).or_insert(id);
        }

        self.nodes.push(Node {
            tag: spec.tag.to_ascii_lowercase(),
            attributes: spec.attrs,
            style: spec.style,
            rect: spec.rect,
            text: spec.text,
            parent,
            children: Vec::new(),
            shadow_children: Vec::new(),
            listeners: spec.listeners,
            value: spec.value,
            checked: spec.checked,
            connected: spec.connected,
            frame,
        });

        let shadow: Vec<NodeId> = spec
            .shadow
            .into_iter()
            .map(|child| self.push(child, Some(id)))
            .collect();
        let children: Vec<NodeId> = spec
            .children
            .into_iter()
            .map(|child| self.push(child, Some(id)))
            .collect();

        let node = &mut self.nodes[id.0];
        node.shadow_children = shadow;
        node.children = children;
        id
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.nodes.len()).map(NodeId)
    }

    /// Number of element nodes (text nodes excluded).
    pub fn node_count(&self) -> usize {
        self.nodes.iter().filter(|n| !n.is_text()).count()
    }

    /// Shadow children followed by light children.
    pub fn composed_children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        let node = self.node(id);
        node.shadow_children
            .iter()
            .chain(node.children.iter())
            .copied()
    }

    pub fn element_children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.node(id)
            .children
            .iter()
            .copied()
            .filter(move |c| !self.node(*c).is_text())
    }

    pub fn ancestors(&self, id: NodeId) -> Ancestors<'_> {
        Ancestors {
            page: self,
            next: self.node(id).parent,
        }
    }

    pub fn closest(&self, id: NodeId, tag: &str) -> Option<NodeId> {
        self.ancestors(id).find(|a| self.node(*a).tag == tag)
    }

    /// True when `ancestor` is a strict ancestor of `node`.
    pub fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        self.ancestors(node).any(|a| a == ancestor)
    }

    pub fn element_by_id(&self, dom_id: &str) -> Option<NodeId> {
        self.ids.get(dom_id).copied()
    }

    /// `label[for=<id>]` pointing at the node, in tree order.
    pub fn label_for(&self, id: NodeId) -> Option<NodeId> {
        let dom_id = self.node(id).attr_nonempty("id")?;
        self.node_ids().find(|candidate| {
            let node = self.node(*candidate);
            node.tag == "label" && node.attr("for") == Some(dom_id)
        })
    }

    /// Preceding element siblings, nearest first.
    pub fn previous_element_siblings(&self, id: NodeId) -> Vec<NodeId> {
        let Some(parent) = self.node(id).parent else {
            return Vec::new();
        };
        let parent = self.node(parent);
        let siblings = if parent.children.contains(&id) {
            &parent.children
        } else {
            &parent.shadow_children
        };
        let position = siblings.iter().position(|s| *s == id).unwrap_or(0);
        siblings[..position]
            .iter()
            .rev()
            .copied()
            .filter(|s| !self.node(*s).is_text())
            .collect()
    }

    /// Text of the node's own text children, whitespace-normalized.
    pub fn direct_text(&self, id: NodeId) -> String {
        let parts: Vec<&str> = self
            .node(id)
            .children
            .iter()
            .filter_map(|c| {
                let child = self.node(*c);
                if child.is_text() {
                    child.text.as_deref()
                } else {
                    None
                }
            })
            .collect();
        normalize_whitespace(&parts.join(" "))
    }

    /// Rendered descendant text, the way `innerText` reports it.
    pub fn inner_text(&self, id: NodeId) -> String {
        let mut parts = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let node = self.node(current);
            if node.is_text() {
                if let Some(text) = node.text.as_deref() {
                    parts.push(text);
                }
                continue;
            }
            if matches!(
                node.tag.as_str(),
                "script" | "style" | "noscript" | "template" | "head"
            ) || node.style.display == "none"
            {
                continue;
            }
            let children: Vec<NodeId> = self.composed_children(current).collect();
            stack.extend(children.into_iter().rev());
        }
        normalize_whitespace(&parts.join(" "))
    }

    /// Topmost rendered element whose rect contains the point.
    ///
    /// Paint order is approximated as (z-index of positioned elements, tree
    /// order); stacking contexts are not modelled.
    pub fn element_from_point(&self, x: f64, y: f64) -> Option<NodeId> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| {
                !node.is_text()
                    && node.connected
                    && !node.style.is_hidden()
                    && node.style.pointer_events != "none"
                    && node.rect.area() > 0.0
                    && node.rect.contains_point(x, y)
            })
            .max_by_key(|(index, node)| {
                let z = if node.style.is_positioned() {
                    node.style.z_index_value().unwrap_or(0)
                } else {
                    0
                };
                (z, *index)
            })
            .map(|(index, _)| NodeId(index))
    }
}

pub struct Ancestors<'a> {
    page: &'a PageModel,
    next: Option<NodeId>,
}

impl Iterator for Ancestors<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let current = self.next?;
        self.next = self.page.node(current).parent;
        Some(current)
    }
}

pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Truncate to at most `max` characters on a char boundary.
pub fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}
