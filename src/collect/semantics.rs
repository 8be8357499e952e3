//! Text, accessible name and role derivation for a single node.

use crate::core::config::InferenceConfig;
use crate::dom::element::{
    LabelSource, SemanticText, MAX_NAME_CHARS, MAX_NEARBY_TEXT_CHARS, MAX_TEXT_CHARS,
};
use crate::dom::page::{truncate_chars, NodeId, PageModel};

const NATIVE_SEMANTIC_TAGS: &[&str] = &["button", "a", "input", "textarea", "select", "option"];
const HANDLER_EVENTS: &[&str] = &[
    "click",
    "mousedown",
    "mouseup",
    "pointerdown",
    "pointerup",
    "keydown",
    "keyup",
    "keypress",
];
const CONTAINER_TAGS: &[&str] = &["form", "fieldset", "label"];
const CONTAINER_ROLES: &[&str] = &["form", "group", "radiogroup", "search"];
const CONTAINER_CLASS_HINTS: &[&str] = &["form", "field", "input", "group", "control"];

fn bounded(text: String, max: usize, source: LabelSource) -> Option<SemanticText> {
    let text = text.trim();
    if text.is_empty() {
        None
    } else {
        Some(SemanticText::new(truncate_chars(text, max), source))
    }
}

fn is_password(page: &PageModel, id: NodeId) -> bool {
    let node = page.node(id);
    node.tag == "input"
        && node
            .attr("type")
            .is_some_and(|t| t.eq_ignore_ascii_case("password"))
}

/// Interaction text, inference only when nothing explicit is present.
pub fn interaction_text(
    page: &PageModel,
    id: NodeId,
    inference: Option<&InferenceConfig>,
) -> SemanticText {
    if let Some(text) = explicit_text(page, id) {
        return text;
    }
    inference
        .and_then(|config| infer_label(page, id, config))
        .unwrap_or_else(SemanticText::none)
}

fn explicit_text(page: &PageModel, id: NodeId) -> Option<SemanticText> {
    let node = page.node(id);
    if let Some(label) = node.attr_nonempty("aria-label") {
        return bounded(label.to_string(), MAX_TEXT_CHARS, LabelSource::ExplicitAriaLabel);
    }
    match node.tag.as_str() {
        "input" => {
            let placeholder = node
                .attr_nonempty("placeholder")
                .and_then(|p| bounded(p.to_string(), MAX_TEXT_CHARS, LabelSource::InputPlaceholder));
            if is_password(page, id) {
                return placeholder;
            }
            let value = node
                .value
                .clone()
                .or_else(|| node.attr("value").map(str::to_string))
                .and_then(|v| bounded(v, MAX_TEXT_CHARS, LabelSource::InputValue));
            return value.or(placeholder);
        }
        "img" => {
            if let Some(alt) = node.attr_nonempty("alt") {
                return bounded(alt.to_string(), MAX_TEXT_CHARS, LabelSource::ImgAlt);
            }
        }
        _ => {}
    }
    bounded(page.inner_text(id), MAX_TEXT_CHARS, LabelSource::InnerText)
}

/// Label inference chain: `<label>`, `aria-labelledby`, ancestors, siblings.
pub fn infer_label(page: &PageModel, id: NodeId, config: &InferenceConfig) -> Option<SemanticText> {
    if config.use_labels {
        if let Some(text) = associated_label(page, id) {
            return bounded(text, MAX_TEXT_CHARS, LabelSource::ExplicitLabel);
        }
    }
    if config.use_aria_labelledby {
        if let Some(text) = labelledby_text(page, id) {
            return bounded(text, MAX_TEXT_CHARS, LabelSource::AriaLabelledby);
        }
    }
    if config.use_parent_traversal {
        if let Some(text) = parent_label(page, id, config) {
            return bounded(text, MAX_TEXT_CHARS, LabelSource::ParentLabel);
        }
    }
    if config.use_siblings {
        if let Some(text) = sibling_label(page, id, config) {
            return bounded(text, MAX_TEXT_CHARS, LabelSource::SiblingLabel);
        }
    }
    None
}

fn nonempty(text: String) -> Option<String> {
    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}

fn associated_label(page: &PageModel, id: NodeId) -> Option<String> {
    page.label_for(id)
        .or_else(|| page.closest(id, "label"))
        .and_then(|label| nonempty(page.inner_text(label)))
}

/// Space-separated id list, texts concatenated in order.
fn labelledby_text(page: &PageModel, id: NodeId) -> Option<String> {
    let ids = page.node(id).attr_nonempty("aria-labelledby")?;
    let parts: Vec<String> = ids
        .split_whitespace()
        .filter_map(|ref_id| page.element_by_id(ref_id))
        .map(|label| page.inner_text(label))
        .filter(|text| !text.is_empty())
        .collect();
    nonempty(parts.join(" "))
}

fn matches_source_criteria(page: &PageModel, id: NodeId, config: &InferenceConfig) -> bool {
    let node = page.node(id);
    if config.allowed_tags.iter().any(|t| t.eq_ignore_ascii_case(&node.tag)) {
        return true;
    }
    if let Some(role) = node.attr("role") {
        if config.allowed_roles.iter().any(|r| r.eq_ignore_ascii_case(role)) {
            return true;
        }
    }
    node.class_tokens().any(|class| {
        let class = class.to_ascii_lowercase();
        config
            .class_patterns
            .iter()
            .any(|pattern| class.contains(&pattern.to_ascii_lowercase()))
    })
}

fn parent_label(page: &PageModel, id: NodeId, config: &InferenceConfig) -> Option<String> {
    page.ancestors(id)
        .take(config.max_parent_depth)
        .filter(|ancestor| matches_source_criteria(page, *ancestor, config))
        .find_map(|ancestor| {
            let node = page.node(ancestor);
            node.attr_nonempty("aria-label")
                .map(str::to_string)
                .or_else(|| nonempty(page.direct_text(ancestor)))
        })
}

fn looks_like_field_container(page: &PageModel, id: NodeId) -> bool {
    let node = page.node(id);
    if CONTAINER_TAGS.contains(&node.tag.as_str()) {
        return true;
    }
    if node
        .attr("role")
        .is_some_and(|role| CONTAINER_ROLES.contains(&role))
    {
        return true;
    }
    node.class_tokens().any(|class| {
        let class = class.to_ascii_lowercase();
        CONTAINER_CLASS_HINTS.iter().any(|hint| class.contains(hint))
    })
}

fn sibling_label(page: &PageModel, id: NodeId, config: &InferenceConfig) -> Option<String> {
    if config.require_same_container {
        // Siblings share every ancestor; one within reach has to look like a field wrapper.
        let in_container = page
            .ancestors(id)
            .take(config.max_parent_depth.max(1))
            .any(|ancestor| looks_like_field_container(page, ancestor));
        if !in_container {
            return None;
        }
    }
    page.previous_element_siblings(id)
        .into_iter()
        .take(config.max_sibling_distance)
        .find_map(|sibling| nonempty(page.inner_text(sibling)))
}

/// Accessible name for state-aware matching.
pub fn accessible_name(page: &PageModel, id: NodeId) -> Option<String> {
    let node = page.node(id);
    let name = node
        .attr_nonempty("aria-label")
        .map(str::to_string)
        .or_else(|| labelledby_text(page, id))
        .or_else(|| {
            page.label_for(id)
                .and_then(|label| nonempty(page.inner_text(label)))
        })
        .or_else(|| {
            page.closest(id, "label")
                .and_then(|label| nonempty(page.inner_text(label)))
        })
        .or_else(|| {
            if matches!(node.tag.as_str(), "input" | "textarea") {
                node.attr_nonempty("placeholder").map(str::to_string)
            } else {
                None
            }
        })
        .or_else(|| node.attr_nonempty("title").map(str::to_string))?;
    Some(truncate_chars(name.trim(), MAX_NAME_CHARS))
}

/// `"button"` for generic elements that behave like one.
pub fn infer_role(page: &PageModel, id: NodeId) -> Option<&'static str> {
    let node = page.node(id);
    if node.has_attr("role") || node.has_attr("aria-label") {
        return None;
    }
    if NATIVE_SEMANTIC_TAGS.contains(&node.tag.as_str()) {
        return None;
    }
    let has_handler = HANDLER_EVENTS.iter().any(|event| node.has_listener(event));
    let has_inline = HANDLER_EVENTS
        .iter()
        .any(|event| node.has_attr(&format!("on{}", event)));
    let focusable_generic = matches!(node.tag.as_str(), "div" | "span") && node.has_attr("tabindex");
    if has_handler || has_inline || focusable_generic {
        Some("button")
    } else {
        None
    }
}

/// Closest preceding sibling text, else the parent's own text.
pub fn nearby_text(page: &PageModel, id: NodeId, own_text: &str) -> Option<String> {
    let candidate = page
        .previous_element_siblings(id)
        .into_iter()
        .map(|sibling| page.inner_text(sibling))
        .find(|text| !text.is_empty())
        .or_else(|| {
            page.node(id)
                .parent
                .map(|parent| page.direct_text(parent))
                .filter(|text| !text.is_empty())
        })?;
    if candidate == own_text {
        return None;
    }
    Some(truncate_chars(&candidate, MAX_NEARBY_TEXT_CHARS))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::page::NodeSpec;
    use crate::testing::TestHelper;

    fn find(page: &PageModel, dom_id: &str) -> NodeId {
        page.element_by_id(dom_id).unwrap()
    }

    #[test]
    fn test_aria_label_wins_over_inner_text() {
        let page = TestHelper::page(NodeSpec::element("body").child(
            NodeSpec::element("button")
                .attr("id", "b")
                .attr("aria-label", "Close dialog")
                .with_text("X"),
        ));
        let text = interaction_text(&page, find(&page, "b"), None);
        assert_eq!(text.text, "Close dialog");
        assert_eq!(text.source, LabelSource::ExplicitAriaLabel);
    }

    #[test]
    fn test_password_never_uses_value() {
        let page = TestHelper::page(NodeSpec::element("body").children([
            NodeSpec::element("input")
                .attr("id", "pw")
                .attr("type", "password")
                .attr("placeholder", "Password")
                .value("secret123"),
            NodeSpec::element("input")
                .attr("id", "pw2")
                .attr("type", "password")
                .value("secret123"),
        ]));
        let text = interaction_text(&page, find(&page, "pw"), None);
        assert_eq!(text.text, "Password");
        assert_eq!(text.source, LabelSource::InputPlaceholder);

        let bare = interaction_text(&page, find(&page, "pw2"), None);
        assert!(bare.is_empty());
        assert!(!bare.text.contains("secret"));
    }

    #[test]
    fn test_input_value_then_placeholder() {
        let page = TestHelper::page(NodeSpec::element("body").children([
            NodeSpec::element("input")
                .attr("id", "q")
                .attr("placeholder", "Search")
                .value("rust"),
            NodeSpec::element("input").attr("id", "e").attr("placeholder", "Email"),
        ]));
        assert_eq!(interaction_text(&page, find(&page, "q"), None).source, LabelSource::InputValue);
        assert_eq!(interaction_text(&page, find(&page, "e"), None).text, "Email");
    }

    #[test]
    fn test_interaction_text_is_bounded() {
        let long = "word ".repeat(60);
        let page = TestHelper::page(
            NodeSpec::element("body").child(NodeSpec::element("p").attr("id", "p").with_text(&long)),
        );
        let text = interaction_text(&page, find(&page, "p"), None);
        assert_eq!(text.text.chars().count(), MAX_TEXT_CHARS);
    }

    #[test]
    fn test_explicit_label_inference() {
        let page = TestHelper::page(NodeSpec::element("body").children([
            NodeSpec::element("label").attr("for", "city").with_text("City"),
            NodeSpec::element("select").attr("id", "city"),
        ]));
        let config = InferenceConfig::default();
        let text = interaction_text(&page, find(&page, "city"), Some(&config));
        assert_eq!(text.text, "City");
        assert_eq!(text.source, LabelSource::ExplicitLabel);
    }

    #[test]
    fn test_labelledby_concatenates_ids() {
        let page = TestHelper::page(NodeSpec::element("body").children([
            NodeSpec::element("span").attr("id", "a").with_text("Billing"),
            NodeSpec::element("span").attr("id", "b").with_text("address"),
            NodeSpec::element("select")
                .attr("id", "s")
                .attr("aria-labelledby", "a missing b"),
        ]));
        let config = InferenceConfig::default();
        let text = interaction_text(&page, find(&page, "s"), Some(&config));
        assert_eq!(text.text, "Billing address");
        assert_eq!(text.source, LabelSource::AriaLabelledby);
    }

    #[test]
    fn test_parent_label_respects_depth() {
        let page = TestHelper::page(
            NodeSpec::element("body").child(
                NodeSpec::element("div")
                    .attr("class", "field-wrapper")
                    .with_text("Quantity")
                    .child(
                        NodeSpec::element("section").child(
                            NodeSpec::element("section")
                                .child(NodeSpec::element("select").attr("id", "qty")),
                        ),
                    ),
            ),
        );
        let shallow = InferenceConfig {
            max_parent_depth: 2,
            use_siblings: false,
            ..Default::default()
        };
        assert!(infer_label(&page, find(&page, "qty"), &shallow).is_none());

        let deep = InferenceConfig {
            max_parent_depth: 3,
            ..shallow
        };
        let text = infer_label(&page, find(&page, "qty"), &deep).unwrap();
        assert_eq!(text.text, "Quantity");
        assert_eq!(text.source, LabelSource::ParentLabel);
    }

    #[test]
    fn test_sibling_label_requires_field_container() {
        let sibling_pair = |class: &str| {
            TestHelper::page(
                NodeSpec::element("body").child(
                    NodeSpec::element("section")
                        .attr("class", class)
                        .children([
                            NodeSpec::element("h4").with_text("Size"),
                            NodeSpec::element("select").attr("id", "size"),
                        ]),
                ),
            )
        };
        let config = InferenceConfig::default();

        let plain = sibling_pair("promo");
        assert!(infer_label(&plain, find(&plain, "size"), &config).is_none());

        let form = sibling_pair("form-row");
        let text = infer_label(&form, find(&form, "size"), &config).unwrap();
        assert_eq!(text.text, "Size");
        assert_eq!(text.source, LabelSource::SiblingLabel);
    }

    #[test]
    fn test_accessible_name_precedence() {
        let page = TestHelper::page(NodeSpec::element("body").children([
            NodeSpec::element("label").attr("for", "n").with_text("Full name"),
            NodeSpec::element("input")
                .attr("id", "n")
                .attr("placeholder", "Jane Doe")
                .attr("title", "Name"),
            NodeSpec::element("textarea")
                .attr("id", "t")
                .attr("placeholder", "Message")
                .attr("title", "Body"),
            NodeSpec::element("div").attr("id", "d").attr("title", "Tooltip"),
        ]));
        assert_eq!(accessible_name(&page, find(&page, "n")).as_deref(), Some("Full name"));
        assert_eq!(accessible_name(&page, find(&page, "t")).as_deref(), Some("Message"));
        assert_eq!(accessible_name(&page, find(&page, "d")).as_deref(), Some("Tooltip"));
    }

    #[test]
    fn test_role_inference_signals() {
        let page = TestHelper::page(NodeSpec::element("body").children([
            NodeSpec::element("div").attr("id", "click").listener("click"),
            NodeSpec::element("span").attr("id", "tab").attr("tabindex", "0"),
            NodeSpec::element("li").attr("id", "inline").attr("onclick", "go()"),
            NodeSpec::element("div")
                .attr("id", "labelled")
                .attr("aria-label", "Menu")
                .listener("click"),
            NodeSpec::element("a").attr("id", "native").listener("click"),
            NodeSpec::element("section").attr("id", "focusable").attr("tabindex", "0"),
        ]));
        assert_eq!(infer_role(&page, find(&page, "click")), Some("button"));
        assert_eq!(infer_role(&page, find(&page, "tab")), Some("button"));
        assert_eq!(infer_role(&page, find(&page, "inline")), Some("button"));
        assert_eq!(infer_role(&page, find(&page, "labelled")), None);
        assert_eq!(infer_role(&page, find(&page, "native")), None);
        assert_eq!(infer_role(&page, find(&page, "focusable")), None);
    }

    #[test]
    fn test_nearby_text() {
        let page = TestHelper::page(NodeSpec::element("body").child(
            NodeSpec::element("div").children([
                NodeSpec::element("span").with_text("Price"),
                NodeSpec::element("button").attr("id", "buy").with_text("Buy"),
            ]),
        ));
        assert_eq!(
            nearby_text(&page, find(&page, "buy"), "Buy").as_deref(),
            Some("Price")
        );
    }

    #[test]
    fn test_accessible_name_is_bounded() {
        let long = "é".repeat(260);
        let page = TestHelper::page(NodeSpec::element("body").child(
            NodeSpec::element("button")
                .attr("id", "b")
                .attr("aria-label", &long)
                .with_text("Go"),
        ));
        let name = accessible_name(&page, find(&page, "b")).unwrap();
        assert_eq!(name.chars().count(), MAX_NAME_CHARS);
        assert!(long.starts_with(&name));
    }

    #[test]
    fn test_nearby_text_is_bounded() {
        let caption = "Limited offer ".repeat(12);
        let page = TestHelper::page(NodeSpec::element("body").child(
            NodeSpec::element("div").children([
                NodeSpec::element("p").with_text(&caption),
                NodeSpec::element("button").attr("id", "buy").with_text("Buy"),
            ]),
        ));
        let text = nearby_text(&page, find(&page, "buy"), "Buy").unwrap();
        assert_eq!(text.chars().count(), MAX_NEARBY_TEXT_CHARS);
        assert!(text.starts_with("Limited offer Limited offer"));
    }
}
