use crate::dom::element::{Element, RawElementRecord};
use crate::dom::page::normalize_whitespace;
use crate::errors::{Result, SnapshotError};
use crate::types::Viewport;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotStatus {
    Success,
    Error,
}

/// The result of one pipeline pass. Read-only once built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub status: SnapshotStatus,
    pub url: String,
    pub viewport: Viewport,
    pub elements: Vec<Element>,
    pub raw_elements: Vec<RawElementRecord>,
    /// Base64 image data.
    pub screenshot: Option<String>,
    pub screenshot_format: Option<String>,
    pub diagnostics: Diagnostics,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl Snapshot {
    pub fn element(&self, id: u32) -> Option<&Element> {
        self.elements.iter().find(|e| e.id == id)
    }

    pub fn raw_element(&self, id: u32) -> Option<&RawElementRecord> {
        self.raw_elements.iter().find(|e| e.id == id)
    }

    pub fn dominant_group(&self) -> Vec<&Element> {
        let mut members: Vec<&Element> =
            self.elements.iter().filter(|e| e.in_dominant_group).collect();
        members.sort_by_key(|e| e.group_rank);
        members
    }

    /// Degraded snapshots are usable but carry at least one warning.
    pub fn is_degraded(&self) -> bool {
        self.diagnostics.fallback_used || !self.diagnostics.warnings.is_empty()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Diagnostics {
    pub metrics: Metrics,
    pub captcha: CaptchaDetection,
    pub requires_vision: bool,
    pub requires_vision_reason: Option<String>,
    pub fallback_used: bool,
    pub warnings: Vec<PipelineWarning>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub ready_state: String,
    /// Quiet time observed by the stability monitor when it finished.
    pub quiet_ms: u64,
    pub node_count: usize,
    pub stability_wait_ms: u64,
    pub collect_ms: u64,
    pub process_ms: u64,
    pub total_ms: u64,
    pub frames_requested: usize,
    pub frames_merged: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CaptchaDetection {
    pub detected: bool,
    pub provider_hint: Option<String>,
    pub confidence: f64,
    pub evidence: CaptchaEvidence,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CaptchaEvidence {
    pub text_hits: Vec<String>,
    pub selector_hits: Vec<String>,
    pub iframe_src_hits: Vec<String>,
    pub url_hits: Vec<String>,
}

/// Recoverable conditions encountered during a pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PipelineWarning {
    StabilityTimeout { waited_ms: u64 },
    FrameTimeout { src: String },
    FrameUnreachable { src: String, reason: String },
    ProcessingTimeout { budget_ms: u64 },
    ProcessingFailed { message: String },
    ScreenshotTimeout,
    ScreenshotFailed { message: String },
    /// The capture hit its node budget; elements past it are missing.
    CaptureTruncated { limit: usize },
}

impl PipelineWarning {
    /// `None` for errors that are fatal to a pass.
    pub fn from_error(error: &SnapshotError) -> Option<Self> {
        let warning = match error {
            SnapshotError::StabilityTimeout { waited_ms } => Self::StabilityTimeout {
                waited_ms: *waited_ms,
            },
            SnapshotError::FrameTimeout { src } => Self::FrameTimeout { src: src.clone() },
            SnapshotError::FrameUnreachable { src, reason } => Self::FrameUnreachable {
                src: src.clone(),
                reason: reason.clone(),
            },
            SnapshotError::ProcessingTimeout { budget_ms } => Self::ProcessingTimeout {
                budget_ms: *budget_ms,
            },
            SnapshotError::ProcessingFailed(message) => Self::ProcessingFailed {
                message: message.clone(),
            },
            SnapshotError::ScreenshotTimeout => Self::ScreenshotTimeout,
            SnapshotError::ScreenshotFailed(message) => Self::ScreenshotFailed {
                message: message.clone(),
            },
            _ => return None,
        };
        Some(warning)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub status: SnapshotStatus,
    pub error: String,
    pub stack: Vec<String>,
}

/// Wire shape of a `snapshot` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SnapshotResponse {
    Success(Box<Snapshot>),
    Error(ErrorResponse),
}

impl SnapshotResponse {
    pub fn from_error(error: &SnapshotError) -> Self {
        SnapshotResponse::Error(ErrorResponse {
            status: SnapshotStatus::Error,
            error: error.to_string(),
            stack: error.chain(),
        })
    }

    pub fn is_success(&self) -> bool {
        matches!(self, SnapshotResponse::Success(_))
    }

    pub fn snapshot(&self) -> Option<&Snapshot> {
        match self {
            SnapshotResponse::Success(snapshot) => Some(&**snapshot),
            SnapshotResponse::Error(_) => None,
        }
    }
}

const DEDUPE_TEXT_CHARS: usize = 120;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum DedupeKey {
    Href(String),
    RoleName(String, String),
    RoleText(String, String, i64),
    RolePosition(String, i64),
    Id(u32),
}

/// Ids and bboxes are not stable across passes, so keys prefer content and
/// document position.
fn dedupe_key(element: &Element) -> DedupeKey {
    if let Some(href) = element.href.as_deref().map(str::trim).filter(|h| !h.is_empty()) {
        return DedupeKey::Href(href.to_string());
    }
    let name = normalize_whitespace(element.name.as_deref().unwrap_or(""));
    if !name.is_empty() {
        return DedupeKey::RoleName(element.role.clone(), name);
    }
    let bucket = if element.doc_y.is_finite() {
        Some((element.doc_y / 10.0).floor() as i64)
    } else {
        None
    };
    let text = normalize_whitespace(element.text.as_deref().unwrap_or(""));
    match (text.is_empty(), bucket) {
        (false, Some(bucket)) => DedupeKey::RoleText(
            element.role.clone(),
            text.chars().take(DEDUPE_TEXT_CHARS).collect(),
            bucket,
        ),
        (true, Some(bucket)) => DedupeKey::RolePosition(element.role.clone(), bucket),
        _ => DedupeKey::Id(element.id),
    }
}

fn quality(element: &Element) -> (i32, bool, bool, bool, bool) {
    let present = |value: &Option<String>| {
        value
            .as_deref()
            .is_some_and(|v| !normalize_whitespace(v).is_empty())
    };
    (
        element.importance,
        element.href.as_deref().is_some_and(|h| !h.trim().is_empty()),
        present(&element.text),
        present(&element.name),
        element.doc_y.is_finite(),
    )
}

/// Union of several snapshots of the same page (typically taken while
/// scrolling). The union keeps the first snapshot's url, viewport and
/// diagnostics and drops the screenshot.
///
/// Merged bboxes are relative to the scroll position of the pass each element
/// came from; they are not click targets.
pub fn merge_snapshots(snapshots: &[Snapshot], union_limit: Option<usize>) -> Result<Snapshot> {
    let base = snapshots.first().ok_or_else(|| {
        SnapshotError::Anyhow("merge_snapshots requires at least one snapshot".into())
    })?;

    let mut best: HashMap<DedupeKey, (usize, Element)> = HashMap::new();
    let mut seen = 0usize;
    for element in snapshots.iter().flat_map(|s| s.elements.iter()) {
        let key = dedupe_key(element);
        match best.get_mut(&key) {
            Some((_, current)) => {
                if quality(element) > quality(current) {
                    *current = element.clone();
                }
            }
            None => {
                best.insert(key, (seen, element.clone()));
            }
        }
        seen += 1;
    }

    let mut merged: Vec<(usize, Element)> = best.into_values().collect();
    merged.sort_by(|(first_a, a), (first_b, b)| {
        a.doc_y
            .total_cmp(&b.doc_y)
            .then(b.importance.cmp(&a.importance))
            .then(first_a.cmp(first_b))
    });
    let mut elements: Vec<Element> = merged.into_iter().map(|(_, element)| element).collect();
    if let Some(limit) = union_limit {
        elements.truncate(limit.max(1));
    }

    Ok(Snapshot {
        elements,
        screenshot: None,
        screenshot_format: None,
        ..base.clone()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestHelper;

    fn element(id: u32, doc_y: f64) -> Element {
        let mut record = TestHelper::raw_record("div");
        record.id = id;
        record.rect.y = doc_y;
        let mut element = Element::from_record(&record, "generic".into(), 10);
        element.text = None;
        element
    }

    fn snapshot(elements: Vec<Element>) -> Snapshot {
        Snapshot {
            status: SnapshotStatus::Success,
            url: "https://example.com/".into(),
            viewport: Viewport::default(),
            elements,
            raw_elements: Vec::new(),
            screenshot: Some("aGVsbG8=".into()),
            screenshot_format: Some("png".into()),
            diagnostics: Diagnostics::default(),
            timestamp: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_merge_dedupes_by_href_and_keeps_best() {
        let mut weak = element(0, 900.0);
        weak.href = Some("/article".into());
        weak.importance = 5;
        let mut strong = element(7, 100.0);
        strong.href = Some("/article".into());
        strong.importance = 400;
        strong.text = Some("Read more".into());

        let merged = merge_snapshots(
            &[snapshot(vec![weak, element(1, 50.0)]), snapshot(vec![strong])],
            None,
        )
        .unwrap();

        assert_eq!(merged.elements.len(), 2);
        assert_eq!(merged.elements[0].id, 1);
        assert_eq!(merged.elements[1].id, 7);
        assert!(merged.screenshot.is_none());
    }

    #[test]
    fn test_merge_position_buckets_and_limit() {
        let first = snapshot(vec![element(0, 100.0), element(1, 300.0)]);
        // Same role, no text, same 10px bucket as id 0.
        let second = snapshot(vec![element(5, 104.0), element(6, 500.0)]);
        let merged = merge_snapshots(&[first.clone(), second.clone()], None).unwrap();
        let ids: Vec<u32> = merged.elements.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![0, 1, 6]);

        let limited = merge_snapshots(&[first, second], Some(2)).unwrap();
        assert_eq!(limited.elements.len(), 2);
    }

    #[test]
    fn test_merge_requires_input() {
        assert!(merge_snapshots(&[], None).is_err());
    }

    #[test]
    fn test_error_response_shape() {
        let response = SnapshotResponse::from_error(&SnapshotError::FatalEnumeration(
            "dangling node reference 4".into(),
        ));
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["status"], "error");
        assert!(value["error"].as_str().unwrap().contains("dangling"));
        assert!(value["stack"].is_array());
        assert!(!response.is_success());
    }

    #[test]
    fn test_warning_mapping_skips_fatal_errors() {
        assert_eq!(
            PipelineWarning::from_error(&SnapshotError::ScreenshotTimeout),
            Some(PipelineWarning::ScreenshotTimeout)
        );
        assert!(PipelineWarning::from_error(&SnapshotError::FatalEnumeration("x".into())).is_none());
        let value = serde_json::to_value(PipelineWarning::FrameTimeout { src: "/f".into() }).unwrap();
        assert_eq!(value["kind"], "frame_timeout");
    }
}
