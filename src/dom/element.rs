use crate::types::ElementRect;
use serde::{Deserialize, Serialize};

pub const MAX_NAME_CHARS: usize = 200;
pub const MAX_TEXT_CHARS: usize = 100;
pub const MAX_NEARBY_TEXT_CHARS: usize = 80;

/// One candidate node as collected from a frame, before ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawElementRecord {
    pub id: u32,
    pub tag: String,
    pub rect: ElementRect,
    pub styles: ElementStyles,
    pub attributes: ElementAttributes,
    pub text: Option<String>,
    pub in_viewport: bool,
    pub is_occluded: bool,
    pub scroll_y: f64,
    /// Own text (text children, `alt`, `aria-label`), as opposed to text
    /// inherited from descendants.
    #[serde(default)]
    pub has_direct_text: bool,
    /// Compact ancestry fingerprint (`tag.class > tag.class`) used for grouping.
    pub parent_signature: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iframe_context: Option<IframeContext>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementStyles {
    pub display: String,
    pub visibility: String,
    pub opacity: f64,
    pub z_index: String,
    pub position: String,
    /// Effective background after walking transparent ancestors.
    pub bg_color: String,
    pub color: String,
    pub cursor: String,
    pub font_weight: String,
    pub font_size: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ElementAttributes {
    pub role: Option<String>,
    #[serde(rename = "type")]
    pub type_: Option<String>,
    pub input_type: Option<String>,
    pub aria_label: Option<String>,
    pub name: Option<String>,
    pub inferred_label: Option<String>,
    pub label_source: Option<LabelSource>,
    pub inferred_role: Option<String>,
    pub nearby_text: Option<String>,
    pub href: Option<String>,
    pub class: Option<String>,
    pub value: Option<String>,
    pub value_redacted: Option<String>,
    pub checked: Option<String>,
    pub disabled: Option<String>,
    pub aria_checked: Option<String>,
    pub aria_disabled: Option<String>,
    pub aria_expanded: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelSource {
    ExplicitAriaLabel,
    InputValue,
    InputPlaceholder,
    ImgAlt,
    InnerText,
    ExplicitLabel,
    AriaLabelledby,
    ParentLabel,
    SiblingLabel,
    None,
}

impl LabelSource {
    pub fn is_inferred(self) -> bool {
        matches!(
            self,
            LabelSource::ExplicitLabel
                | LabelSource::AriaLabelledby
                | LabelSource::ParentLabel
                | LabelSource::SiblingLabel
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticText {
    pub text: String,
    pub source: LabelSource,
}

impl SemanticText {
    pub fn new(text: String, source: LabelSource) -> Self {
        Self { text, source }
    }

    pub fn none() -> Self {
        Self {
            text: String::new(),
            source: LabelSource::None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IframeContext {
    pub src: String,
    pub is_same_origin: bool,
}

pub const INTERACTIVE_ROLES: &[&str] = &[
    "button",
    "link",
    "textbox",
    "searchbox",
    "checkbox",
    "radio",
    "combobox",
    "listbox",
    "option",
    "menuitem",
    "tab",
    "switch",
    "slider",
    "spinbutton",
];

pub const NATIVE_INTERACTIVE_TAGS: &[&str] =
    &["a", "button", "input", "select", "textarea", "option", "summary"];

impl RawElementRecord {
    pub fn href(&self) -> Option<&str> {
        self.attributes
            .href
            .as_deref()
            .filter(|h| !h.trim().is_empty())
    }

    /// Explicit role, then inferred role.
    pub fn declared_role(&self) -> Option<&str> {
        self.attributes
            .role
            .as_deref()
            .or(self.attributes.inferred_role.as_deref())
            .filter(|r| !r.is_empty())
    }

    /// Role implied by the tag when nothing is declared.
    pub fn implicit_role(&self) -> &'static str {
        match self.tag.as_str() {
            "a" if self.href().is_some() => "link",
            "a" => "generic",
            "button" | "summary" => "button",
            "select" => "combobox",
            "textarea" => "textbox",
            "option" => "option",
            "img" => "img",
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => "heading",
            "nav" => "navigation",
            "li" => "listitem",
            "input" => match self.attributes.input_type.as_deref().unwrap_or("text") {
                "checkbox" => "checkbox",
                "radio" => "radio",
                "submit" | "button" | "reset" | "image" => "button",
                "search" => "searchbox",
                "range" => "slider",
                "number" => "spinbutton",
                _ => "textbox",
            },
            _ => "generic",
        }
    }

    pub fn effective_role(&self) -> String {
        self.declared_role()
            .map(str::to_string)
            .unwrap_or_else(|| self.implicit_role().to_string())
    }

    pub fn is_native_interactive(&self) -> bool {
        NATIVE_INTERACTIVE_TAGS.contains(&self.tag.as_str())
    }

    pub fn is_interactive(&self) -> bool {
        self.is_native_interactive()
            || self.href().is_some()
            || self
                .declared_role()
                .is_some_and(|r| INTERACTIVE_ROLES.contains(&r))
    }

    pub fn is_disabled(&self) -> bool {
        self.attributes.disabled.as_deref() == Some("true")
            || self.attributes.aria_disabled.as_deref() == Some("true")
    }

    pub fn doc_y(&self) -> f64 {
        self.rect.y + self.scroll_y
    }
}

/// Ranked element, as handed to prompt formatting and verification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub id: u32,
    pub role: String,
    pub text: Option<String>,
    pub name: Option<String>,
    pub importance: i32,
    pub bbox: ElementRect,
    pub visual_cues: VisualCues,
    pub in_viewport: bool,
    pub is_occluded: bool,
    pub z_index: i64,
    pub href: Option<String>,
    pub doc_y: f64,
    pub in_dominant_group: bool,
    pub group_rank: Option<u32>,
    pub disabled: bool,
    pub checked: Option<bool>,
    pub expanded: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iframe_context: Option<IframeContext>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualCues {
    pub is_primary: bool,
    pub background_color_name: Option<String>,
    pub is_clickable: bool,
}

pub const CLICKABLE_ROLES: &[&str] = &["link", "button", "textbox", "checkbox", "radio", "combobox"];

fn parse_state(value: Option<&str>) -> Option<bool> {
    match value {
        Some("true") | Some("mixed") => Some(true),
        Some("false") => Some(false),
        _ => None,
    }
}

impl Element {
    /// Shared projection of a raw record; scoring fields are filled by the caller.
    pub(crate) fn from_record(record: &RawElementRecord, role: String, importance: i32) -> Self {
        let text = record
            .text
            .clone()
            .filter(|t| !t.is_empty());
        Element {
            id: record.id,
            role,
            text,
            name: record.attributes.name.clone().filter(|n| !n.is_empty()),
            importance,
            bbox: record.rect,
            visual_cues: VisualCues {
                is_primary: false,
                background_color_name: None,
                is_clickable: false,
            },
            in_viewport: record.in_viewport,
            is_occluded: record.is_occluded,
            z_index: record.styles.z_index.trim().parse().unwrap_or(0),
            href: record.href().map(str::to_string),
            doc_y: record.doc_y(),
            in_dominant_group: false,
            group_rank: None,
            disabled: record.is_disabled(),
            checked: parse_state(record.attributes.checked.as_deref())
                .or_else(|| parse_state(record.attributes.aria_checked.as_deref())),
            expanded: parse_state(record.attributes.aria_expanded.as_deref()),
            iframe_context: record.iframe_context.clone(),
        }
    }
}
