use crate::collect::color::Rgba;
use crate::core::config::SnapshotFilter;
use crate::core::dom::{GroupingStrategy, ProcessOptions, SnapshotProcessor};
use crate::dom::element::{Element, RawElementRecord, VisualCues, CLICKABLE_ROLES};
use crate::dom::grouping::FingerprintGrouping;
use std::sync::Arc;
use tracing::{debug, trace};

/// Elements below this score are pruned unless something else keeps them.
pub const LOW_IMPORTANCE: i32 = 250;
const PRIMARY_MIN_CHROMA: u8 = 60;

pub struct Ranker {
    grouping: Arc<dyn GroupingStrategy>,
}

impl Default for Ranker {
    fn default() -> Self {
        Self::new(Arc::new(FingerprintGrouping::default()))
    }
}

impl Ranker {
    pub fn new(grouping: Arc<dyn GroupingStrategy>) -> Self {
        Self { grouping }
    }
}

impl SnapshotProcessor for Ranker {
    fn process(
        &self,
        raw_elements: &[RawElementRecord],
        options: &ProcessOptions,
    ) -> anyhow::Result<Vec<Element>> {
        let in_group = self.grouping.dominant_group(raw_elements);
        anyhow::ensure!(
            in_group.len() == raw_elements.len(),
            "grouping returned {} flags for {} elements",
            in_group.len(),
            raw_elements.len()
        );

        let scores: Vec<i32> = raw_elements
            .iter()
            .map(|record| importance(record, options.viewport_height))
            .collect();
        let ranks = group_ranks(raw_elements, &scores, &in_group);

        let mut elements = Vec::new();
        for (index, record) in raw_elements.iter().enumerate() {
            let keep = in_group[index]
                || record.is_interactive()
                || scores[index] >= LOW_IMPORTANCE
                || record.has_direct_text;
            if options.debug {
                trace!(id = record.id, tag = %record.tag, score = scores[index], keep, "ranked");
            }
            if !keep {
                continue;
            }

            let mut element = Element::from_record(record, record.effective_role(), scores[index]);
            element.in_dominant_group = in_group[index];
            element.group_rank = ranks[index];
            element.visual_cues = visual_cues(record);
            elements.push(element);
        }

        elements.sort_by(|a, b| b.importance.cmp(&a.importance).then(a.id.cmp(&b.id)));
        if let Some(filter) = &options.filter {
            elements.retain(|element| passes_filter(element, filter));
        }
        let elements = apply_limit(elements, options.limit);

        debug!(
            raw = raw_elements.len(),
            kept = elements.len(),
            dominant = in_group.iter().filter(|f| **f).count(),
            "ranking complete"
        );
        Ok(elements)
    }
}

pub fn importance(record: &RawElementRecord, viewport_height: f64) -> i32 {
    let interactive = record.is_interactive();
    let mut score = 0.0;

    if record.in_viewport {
        score += if interactive || record.has_direct_text { 200.0 } else { 20.0 };
    }
    if record.is_occluded {
        score -= 150.0;
    }
    if record.styles.visibility == "hidden" || record.styles.opacity <= 0.0 {
        score -= 500.0;
    }
    if record.is_native_interactive() {
        score += 400.0;
    }
    if record
        .declared_role()
        .is_some_and(|role| crate::dom::element::INTERACTIVE_ROLES.contains(&role))
    {
        score += 300.0;
    }
    if record.href().is_some() {
        score += 200.0;
    }
    if record.has_direct_text {
        score += 50.0;
    }

    score += (record.rect.area().max(0.0).sqrt() / 4.0).min(100.0);
    if viewport_height > 0.0 && record.rect.y >= 0.0 && record.rect.y < viewport_height {
        score += 100.0 * (1.0 - record.rect.y / viewport_height);
    }
    if record.is_disabled() {
        score -= 100.0;
    }

    score.round() as i32
}

fn group_ranks(
    raw_elements: &[RawElementRecord],
    scores: &[i32],
    in_group: &[bool],
) -> Vec<Option<u32>> {
    let mut members: Vec<usize> = (0..raw_elements.len()).filter(|i| in_group[*i]).collect();
    members.sort_by(|a, b| {
        let (ra, rb) = (&raw_elements[*a], &raw_elements[*b]);
        ra.doc_y()
            .total_cmp(&rb.doc_y())
            .then(ra.rect.x.total_cmp(&rb.rect.x))
            .then(scores[*b].cmp(&scores[*a]))
            .then(ra.id.cmp(&rb.id))
    });

    let mut ranks = vec![None; raw_elements.len()];
    for (rank, index) in members.into_iter().enumerate() {
        ranks[index] = Some(rank as u32);
    }
    ranks
}

fn visual_cues(record: &RawElementRecord) -> VisualCues {
    let background = Rgba::parse(&record.styles.bg_color);
    let is_clickable = record.is_interactive() || record.styles.cursor == "pointer";
    let is_primary = is_clickable
        && background.is_some_and(|color| color.is_opaque() && color.chroma() >= PRIMARY_MIN_CHROMA);
    VisualCues {
        is_primary,
        background_color_name: background.map(|color| color.name().to_string()),
        is_clickable,
    }
}

fn passes_filter(element: &Element, filter: &SnapshotFilter) -> bool {
    if let Some(min_area) = filter.min_area {
        if element.bbox.area() < min_area {
            return false;
        }
    }

    if let Some(ref roles) = filter.allowed_roles {
        if !roles.iter().any(|role| role == &element.role) {
            return false;
        }
    }

    if let Some(min_z) = filter.min_z_index {
        if element.z_index < min_z {
            return false;
        }
    }

    true
}

/// Truncates to `limit`, reserving room for the dominant group first.
fn apply_limit(elements: Vec<Element>, limit: usize) -> Vec<Element> {
    if elements.len() <= limit {
        return elements;
    }
    let group_slots = elements
        .iter()
        .filter(|element| element.in_dominant_group)
        .count()
        .min(limit);
    let mut other_slots = limit - group_slots;
    let mut group_left = group_slots;

    elements
        .into_iter()
        .filter(|element| {
            let slot = if element.in_dominant_group {
                &mut group_left
            } else {
                &mut other_slots
            };
            if *slot == 0 {
                return false;
            }
            *slot -= 1;
            true
        })
        .collect()
}

/// 1:1 mapping used when ranking fails or runs out of time.
pub fn fallback_elements(raw_elements: &[RawElementRecord]) -> Vec<Element> {
    raw_elements
        .iter()
        .map(|record| {
            let role = match (record.declared_role(), record.href()) {
                (Some(role), _) => role.to_string(),
                (None, Some(_)) => "link".to_string(),
                (None, None) => "generic".to_string(),
            };
            let is_clickable = CLICKABLE_ROLES.contains(&role.as_str()) || record.href().is_some();
            let mut element = Element::from_record(record, role, 1);
            element.visual_cues = VisualCues {
                is_primary: false,
                background_color_name: Rgba::parse(&record.styles.bg_color)
                    .map(|color| color.name().to_string()),
                is_clickable,
            };
            element
        })
        .collect()
}
