use super::color::Rgba;
use crate::dom::page::{NodeId, PageModel};

const MAX_BACKGROUND_DEPTH: usize = 10;
const DEFAULT_CANVAS: &str = "rgb(255, 255, 255)";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Visibility {
    pub in_viewport: bool,
    pub is_occluded: bool,
}

pub fn analyze(page: &PageModel, id: NodeId) -> Visibility {
    let node = page.node(id);
    Visibility {
        in_viewport: node.rect.intersects_viewport(&page.viewport),
        is_occluded: is_occluded(page, id),
    }
}

/// Static elements at z-index <= 10 (or non-numeric) are assumed visible
/// without a hit test.
pub fn needs_hit_test(page: &PageModel, id: NodeId) -> bool {
    let style = &page.node(id).style;
    let z = style.z_index_value();
    style.is_positioned() || z.is_some_and(|z| z > 10)
}

pub fn is_occluded(page: &PageModel, id: NodeId) -> bool {
    if !needs_hit_test(page, id) {
        return false;
    }
    let (cx, cy) = page.node(id).rect.center();
    match page.element_from_point(cx, cy) {
        Some(hit) => hit != id && !page.contains(hit, id) && !page.contains(id, hit),
        None => false,
    }
}

/// First sufficiently opaque color walking up from the node.
///
/// SVG nodes resolve `fill`, then `stroke`, instead of `background-color`.
pub fn effective_background(page: &PageModel, id: NodeId) -> String {
    let is_svg = page.node(id).tag == "svg";
    let chain = std::iter::once(id).chain(page.ancestors(id));
    for current in chain.take(MAX_BACKGROUND_DEPTH + 1) {
        let style = &page.node(current).style;
        let candidates: Vec<&str> = if is_svg {
            [style.fill.as_deref(), style.stroke.as_deref()]
                .into_iter()
                .flatten()
                .collect()
        } else {
            vec![style.background_color.as_str()]
        };
        for value in candidates {
            if let Some(color) = Rgba::parse(value) {
                if color.is_opaque() {
                    return color.to_css();
                }
            }
        }
    }
    DEFAULT_CANVAS.to_string()
}
