use crate::dom::page::{NodeId, PageModel};
use crate::errors::{Result, SnapshotError};

const MIN_SIDE_PX: f64 = 5.0;
const SKIPPED_TAGS: &[&str] = &["script", "style", "noscript", "meta", "link", "head", "template"];

/// Depth-first walk over the composed tree (shadow roots included),
/// returning candidate element nodes in tree order.
pub fn enumerate(page: &PageModel) -> Result<Vec<NodeId>> {
    let mut candidates = Vec::new();
    let mut stack = vec![page.root()];

    while let Some(id) = stack.pop() {
        let node = page.get(id).ok_or_else(|| {
            SnapshotError::FatalEnumeration(format!("dangling node reference {}", id.0))
        })?;
        if node.is_text() || !node.connected || SKIPPED_TAGS.contains(&node.tag.as_str()) {
            continue;
        }

        if is_candidate(page, id) {
            candidates.push(id);
        }

        // Only the svg root is kept; its drawing primitives are noise.
        if node.tag == "svg" {
            continue;
        }
        let children: Vec<NodeId> = page.composed_children(id).collect();
        if children.contains(&id) {
            return Err(SnapshotError::FatalEnumeration(format!(
                "node {} lists itself as a child",
                id.0
            )));
        }
        stack.extend(children.into_iter().rev());
    }

    Ok(candidates)
}

fn is_candidate(page: &PageModel, id: NodeId) -> bool {
    let node = page.node(id);
    if node.rect.width < MIN_SIDE_PX || node.rect.height < MIN_SIDE_PX {
        return false;
    }
    if node.tag == "span" && is_redundant_span(page, id) {
        return false;
    }
    true
}

/// A span inside a link, or wrapping one, duplicates the link itself.
fn is_redundant_span(page: &PageModel, id: NodeId) -> bool {
    page.closest(id, "a").is_some() || has_descendant_link(page, id)
}

fn has_descendant_link(page: &PageModel, id: NodeId) -> bool {
    let mut stack: Vec<NodeId> = page.composed_children(id).collect();
    while let Some(current) = stack.pop() {
        let Some(node) = page.get(current) else {
            continue;
        };
        if node.tag == "a" && node.has_attr("href") {
            return true;
        }
        stack.extend(page.composed_children(current));
    }
    false
}
