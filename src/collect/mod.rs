//! Per-document collection: enumerate candidates and annotate each one.

pub mod color;
pub mod enumerator;
pub mod geometry;
pub mod semantics;

use crate::core::config::{InferenceConfig, SnapshotOptions};
use crate::dom::element::{ElementAttributes, ElementStyles, RawElementRecord, MAX_TEXT_CHARS};
use crate::dom::grouping::normalize_class;
use crate::dom::page::{truncate_chars, NodeId, PageModel};
use crate::errors::Result;
use crate::session::NodeLocator;
use tracing::{debug, trace};

const SIGNATURE_DEPTH: usize = 3;

/// A raw record together with the node it was built from.
#[derive(Debug, Clone)]
pub struct Collected {
    pub record: RawElementRecord,
    pub locator: NodeLocator,
}

/// Collect this document's own candidates. Child frames are not visited;
/// record ids are local to the document.
pub fn collect_document(page: &PageModel, options: &SnapshotOptions) -> Result<Vec<Collected>> {
    let inference = options.inference();
    let candidates = enumerator::enumerate(page)?;

    let mut collected = Vec::with_capacity(candidates.len());
    for (index, id) in candidates.into_iter().enumerate() {
        let record = build_record(page, id, index as u32, inference.as_ref());
        if options.debug {
            trace!(
                id = record.id,
                tag = %record.tag,
                text = ?record.text,
                source = ?record.attributes.label_source,
                "candidate"
            );
        }
        collected.push(Collected {
            record,
            locator: NodeLocator::top(id),
        });
    }

    debug!(url = %page.url, nodes = page.node_count(), candidates = collected.len(), "collected document");
    Ok(collected)
}

pub fn build_record(
    page: &PageModel,
    id: NodeId,
    record_id: u32,
    inference: Option<&InferenceConfig>,
) -> RawElementRecord {
    let node = page.node(id);
    let style = &node.style;
    let text = semantics::interaction_text(page, id, inference);
    let visibility = geometry::analyze(page, id);

    let has_direct_text = !page.direct_text(id).is_empty()
        || node.attr_nonempty("aria-label").is_some()
        || (node.tag == "img" && node.attr_nonempty("alt").is_some());

    RawElementRecord {
        id: record_id,
        tag: node.tag.clone(),
        rect: node.rect,
        styles: ElementStyles {
            display: style.display.clone(),
            visibility: style.visibility.clone(),
            opacity: style.opacity,
            z_index: style.z_index.clone(),
            position: style.position.clone(),
            bg_color: geometry::effective_background(page, id),
            color: style.color.clone(),
            cursor: style.cursor.clone(),
            font_weight: style.font_weight.clone(),
            font_size: style.font_size.clone(),
        },
        attributes: attributes(page, id, &text),
        text: if text.is_empty() { None } else { Some(text.text) },
        in_viewport: visibility.in_viewport,
        is_occluded: visibility.is_occluded,
        scroll_y: page.scroll_y,
        has_direct_text,
        parent_signature: parent_signature(page, id),
        iframe_context: None,
    }
}

fn attributes(
    page: &PageModel,
    id: NodeId,
    text: &crate::dom::element::SemanticText,
) -> ElementAttributes {
    let node = page.node(id);
    let owned = |name: &str| node.attr(name).map(str::to_string);

    let input_type = if node.tag == "input" {
        Some(
            node.attr_nonempty("type")
                .unwrap_or("text")
                .to_ascii_lowercase(),
        )
    } else {
        None
    };
    let is_password = input_type.as_deref() == Some("password");

    let (value, value_redacted) = if is_password {
        (None, Some("true".to_string()))
    } else if matches!(node.tag.as_str(), "input" | "textarea" | "select") {
        let value = node
            .value
            .clone()
            .or_else(|| owned("value"))
            .map(|v| truncate_chars(&v, MAX_TEXT_CHARS));
        (value, None)
    } else {
        (None, None)
    };

    let checked = node
        .checked
        .or_else(|| node.has_attr("checked").then_some(true))
        .map(|c| c.to_string());

    ElementAttributes {
        role: node.attr_nonempty("role").map(str::to_string),
        type_: owned("type"),
        input_type,
        aria_label: node.attr_nonempty("aria-label").map(str::to_string),
        name: semantics::accessible_name(page, id),
        inferred_label: if text.source.is_inferred() {
            Some(text.text.clone())
        } else {
            None
        },
        label_source: Some(text.source),
        inferred_role: semantics::infer_role(page, id).map(str::to_string),
        nearby_text: semantics::nearby_text(page, id, &text.text),
        href: owned("href"),
        class: owned("class"),
        value,
        value_redacted,
        checked,
        disabled: node.has_attr("disabled").then(|| "true".to_string()),
        aria_checked: owned("aria-checked"),
        aria_disabled: owned("aria-disabled"),
        aria_expanded: owned("aria-expanded"),
    }
}

/// Up to three ancestors as `tag.firstclass`, nearest first.
pub fn parent_signature(page: &PageModel, id: NodeId) -> String {
    page.ancestors(id)
        .take(SIGNATURE_DEPTH)
        .map(|ancestor| {
            let node = page.node(ancestor);
            match node.class_tokens().map(normalize_class).find(|c| !c.is_empty()) {
                Some(class) => format!("{}.{}", node.tag, class),
                None => node.tag.clone(),
            }
        })
        .collect::<Vec<_>>()
        .join(" > ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::element::LabelSource;
    use crate::dom::page::NodeSpec;
    use crate::testing::TestHelper;

    fn record_for(page: &PageModel, dom_id: &str) -> RawElementRecord {
        let id = page.element_by_id(dom_id).unwrap();
        build_record(page, id, 0, Some(&InferenceConfig::default()))
    }

    #[test]
    fn test_password_value_is_redacted() {
        let page = TestHelper::page(NodeSpec::element("body").child(
            NodeSpec::element("input")
                .attr("id", "pw")
                .attr("type", "Password")
                .attr("value", "secret123")
                .value("secret123")
                .rect(0.0, 0.0, 200.0, 30.0),
        ));
        let record = record_for(&page, "pw");
        assert_eq!(record.attributes.input_type.as_deref(), Some("password"));
        assert_eq!(record.attributes.value, None);
        assert_eq!(record.attributes.value_redacted.as_deref(), Some("true"));
        assert!(!serde_json::to_string(&record).unwrap().contains("secret123"));
    }

    #[test]
    fn test_input_attributes() {
        let page = TestHelper::page(NodeSpec::element("body").child(
            NodeSpec::element("input")
                .attr("id", "q")
                .attr("disabled", "")
                .attr("aria-expanded", "false")
                .value("rust")
                .rect(0.0, 0.0, 200.0, 30.0),
        ));
        let record = record_for(&page, "q");
        assert_eq!(record.attributes.input_type.as_deref(), Some("text"));
        assert_eq!(record.attributes.value.as_deref(), Some("rust"));
        assert_eq!(record.attributes.value_redacted, None);
        assert_eq!(record.attributes.disabled.as_deref(), Some("true"));
        assert_eq!(record.attributes.aria_expanded.as_deref(), Some("false"));
        assert_eq!(record.attributes.label_source, Some(LabelSource::InputValue));
        assert_eq!(record.attributes.inferred_label, None);
    }

    #[test]
    fn test_inferred_label_is_recorded() {
        let page = TestHelper::page(NodeSpec::element("body").child(
            NodeSpec::element("form").children([
                NodeSpec::element("label").attr("for", "email").with_text("Email address"),
                NodeSpec::element("input")
                    .attr("id", "email")
                    .attr("type", "email")
                    .rect(0.0, 0.0, 200.0, 30.0),
            ]),
        ));
        let record = record_for(&page, "email");
        assert_eq!(record.attributes.label_source, Some(LabelSource::ExplicitLabel));
        assert_eq!(record.attributes.inferred_label.as_deref(), Some("Email address"));
        assert_eq!(record.text.as_deref(), Some("Email address"));
    }

    #[test]
    fn test_parent_signature() {
        let page = TestHelper::page(
            NodeSpec::element("body").child(
                NodeSpec::element("ul").attr("class", "results list-2").child(
                    NodeSpec::element("li")
                        .attr("class", "result-17 item")
                        .child(NodeSpec::element("a").attr("id", "link").attr("href", "/x")),
                ),
            ),
        );
        let id = page.element_by_id("link").unwrap();
        assert_eq!(parent_signature(&page, id), "li.result > ul.results > body");
    }

    #[test]
    fn test_collect_document_assigns_local_ids() {
        let page = TestHelper::page(
            NodeSpec::element("body").rect(0.0, 0.0, 1280.0, 720.0).children([
                NodeSpec::element("a").attr("href", "/a").rect(0.0, 0.0, 80.0, 20.0).with_text("A"),
                NodeSpec::element("button").rect(0.0, 30.0, 80.0, 20.0).with_text("B"),
            ]),
        );
        let collected = collect_document(&page, &SnapshotOptions::default()).unwrap();
        let ids: Vec<u32> = collected.iter().map(|c| c.record.id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
        assert!(collected.iter().all(|c| c.locator.frames.is_empty()));
        assert!(collected[1].record.has_direct_text);
        assert!(!collected[0].record.has_direct_text);
    }
}
