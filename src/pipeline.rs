//! One snapshot pass from a settled document to a ranked `Snapshot`.

use crate::captcha;
use crate::core::config::{SampleOptions, SnapshotOptions};
use crate::core::dom::{ProcessOptions, SnapshotProcessor};
use crate::core::page::PageSource;
use crate::dom::element::{Element, RawElementRecord};
use crate::dom::page::PageModel;
use crate::dom::processor::{fallback_elements, Ranker};
use crate::dom::state::{
    merge_snapshots, Diagnostics, Metrics, PipelineWarning, Snapshot, SnapshotResponse,
    SnapshotStatus,
};
use crate::errors::{Result, SnapshotError};
use crate::frames::connector::FrameConnector;
use crate::frames::FrameStitcher;
use crate::session::{NodeLocator, PassSession};
use crate::stability::StabilityMonitor;
use crate::types::ElementRect;
use crate::utils::screenshot::ScreenshotManager;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};

const CANVAS_DOMINANT_RATIO: f64 = 0.5;
const LOW_YIELD_ELEMENTS: usize = 3;
const LOW_YIELD_MIN_NODES: usize = 100;
const SCROLL_STEP_RATIO: f64 = 0.9;
const MIN_SCROLL_STEP: f64 = 200.0;
const RESTORE_SETTLE_MS: u64 = 200;

/// A snapshot together with the id table that resolves its element ids.
#[derive(Debug, Clone)]
pub struct SnapshotPass {
    pub snapshot: Snapshot,
    pub session: PassSession,
}

pub struct SnapshotPipeline<S: PageSource> {
    source: Arc<S>,
    processor: Arc<dyn SnapshotProcessor>,
    stitcher: FrameStitcher,
}

impl<S: PageSource> SnapshotPipeline<S> {
    pub fn new(source: Arc<S>) -> Self {
        Self {
            source,
            processor: Arc::new(Ranker::default()),
            stitcher: FrameStitcher::default(),
        }
    }

    pub fn with_processor(mut self, processor: Arc<dyn SnapshotProcessor>) -> Self {
        self.processor = processor;
        self
    }

    pub fn with_frame_connector(mut self, connector: Arc<dyn FrameConnector>) -> Self {
        self.stitcher = FrameStitcher::new(connector);
        self
    }

    pub fn source(&self) -> &Arc<S> {
        &self.source
    }

    /// Run a full pass. Only capture and enumeration failures are errors;
    /// every other stage degrades into a warning on the snapshot.
    pub async fn run(&self, options: &SnapshotOptions) -> Result<SnapshotPass> {
        let started = Instant::now();
        let mut diagnostics = Diagnostics::default();

        let mut stability_wait_ms = 0;
        let mut settled = None;
        if let Some(config) = options.stability() {
            match StabilityMonitor::new(config).wait(self.source.as_ref()).await {
                Ok(report) => {
                    if report.timed_out {
                        diagnostics.warnings.push(PipelineWarning::StabilityTimeout {
                            waited_ms: report.waited_ms,
                        });
                    }
                    stability_wait_ms = report.waited_ms;
                    settled = Some(report);
                }
                Err(err) => warn!(error = %err, "activity reading failed, collecting anyway"),
            }
        }

        let page = Arc::new(self.source.capture().await?);
        if let Some(limit) = page.truncated_at {
            warn!(limit, "capture stopped at node budget, document tail missing");
            diagnostics
                .warnings
                .push(PipelineWarning::CaptureTruncated { limit });
        }
        diagnostics.metrics = Metrics {
            ready_state: page.ready_state.clone(),
            quiet_ms: settled.as_ref().map_or(0, |report| report.quiet_ms),
            node_count: page.node_count(),
            stability_wait_ms,
            ..Default::default()
        };

        let collect_started = Instant::now();
        let collection = self.stitcher.collect(Arc::clone(&page), options.clone()).await?;
        diagnostics.metrics.collect_ms = elapsed_ms(collect_started);
        diagnostics.metrics.frames_requested = collection.frames_requested;
        diagnostics.metrics.frames_merged = collection.frames_merged;
        diagnostics.warnings.extend(collection.warnings);

        let mut raw_elements = Vec::with_capacity(collection.elements.len());
        let mut locators: Vec<NodeLocator> = Vec::with_capacity(collection.elements.len());
        for (index, item) in collection.elements.into_iter().enumerate() {
            let mut record = item.record;
            record.id = index as u32;
            raw_elements.push(record);
            locators.push(item.locator);
        }
        debug!(
            elements = raw_elements.len(),
            frames = diagnostics.metrics.frames_merged,
            collect_ms = diagnostics.metrics.collect_ms,
            "collection finished"
        );

        let process_started = Instant::now();
        let process_options = ProcessOptions::from_snapshot_options(options, page.viewport.height);
        let elements = match self
            .rank(&raw_elements, process_options, options.timeouts.processing_ms)
            .await
        {
            Ok(elements) => elements,
            Err(err) => {
                warn!(error = %err, "ranking failed, using fallback mapping");
                if let Some(warning) = PipelineWarning::from_error(&err) {
                    diagnostics.warnings.push(warning);
                }
                diagnostics.fallback_used = true;
                fallback_elements(&raw_elements)
            }
        };
        diagnostics.metrics.process_ms = elapsed_ms(process_started);

        diagnostics.captcha = captcha::detect(&page);
        if let Some(reason) = vision_reason(&page, &raw_elements, diagnostics.captcha.detected) {
            diagnostics.requires_vision = true;
            diagnostics.requires_vision_reason = Some(reason.to_string());
        }

        let mut screenshot = None;
        let mut screenshot_format = None;
        if let Some(screenshot_options) = &options.screenshot {
            match ScreenshotManager::take_base64(
                self.source.as_ref(),
                screenshot_options,
                options.timeouts.screenshot_ms,
            )
            .await
            {
                Ok(encoded) => {
                    screenshot = Some(encoded);
                    screenshot_format =
                        Some(ScreenshotManager::format_name(screenshot_options).to_string());
                }
                Err(err) => {
                    warn!(error = %err, "screenshot unavailable");
                    if let Some(warning) = PipelineWarning::from_error(&err) {
                        diagnostics.warnings.push(warning);
                    }
                }
            }
        }

        diagnostics.metrics.total_ms = elapsed_ms(started);
        debug!(
            url = %page.url,
            elements = elements.len(),
            raw = raw_elements.len(),
            warnings = diagnostics.warnings.len(),
            total_ms = diagnostics.metrics.total_ms,
            "snapshot built"
        );

        let session = PassSession::new(page.url.clone(), locators);
        let snapshot = Snapshot {
            status: SnapshotStatus::Success,
            url: page.url.clone(),
            viewport: page.viewport,
            elements,
            raw_elements,
            screenshot,
            screenshot_format,
            diagnostics,
            timestamp: chrono::Utc::now(),
        };
        Ok(SnapshotPass { snapshot, session })
    }

    /// `run` folded into the success/error wire shape.
    pub async fn snapshot(&self, options: &SnapshotOptions) -> SnapshotResponse {
        match self.run(options).await {
            Ok(pass) => SnapshotResponse::Success(Box::new(pass.snapshot)),
            Err(err) => {
                warn!(error = %err, "snapshot failed");
                SnapshotResponse::from_error(&err)
            }
        }
    }

    /// Snapshot `samples.samples` times while scrolling down, then merge the
    /// passes into one union snapshot. The scroll position is restored
    /// afterwards even when a pass fails.
    pub async fn sampled(
        &self,
        options: &SnapshotOptions,
        samples: &SampleOptions,
    ) -> Result<Snapshot> {
        if samples.samples <= 1 {
            return Ok(self.run(options).await?.snapshot);
        }

        let base_scroll = match self.source.scroll_y().await {
            Ok(y) => y,
            Err(err) => {
                debug!(error = %err, "scroll offset unavailable, assuming top");
                0.0
            }
        };
        let outcome = self.collect_samples(options, samples).await;

        if samples.restore_scroll {
            match self.source.scroll_to(base_scroll).await {
                Ok(()) => {
                    if samples.settle_ms > 0 {
                        let settle = samples.settle_ms.min(RESTORE_SETTLE_MS);
                        tokio::time::sleep(Duration::from_millis(settle)).await;
                    }
                }
                Err(err) => warn!(error = %err, "could not restore scroll position"),
            }
        }

        let snapshots = outcome?;
        debug!(samples = snapshots.len(), "merging sampled snapshots");
        merge_snapshots(&snapshots, samples.union_limit)
    }

    async fn collect_samples(
        &self,
        options: &SnapshotOptions,
        samples: &SampleOptions,
    ) -> Result<Vec<Snapshot>> {
        let first = self.run(options).await?.snapshot;
        let viewport_height = if first.viewport.height > 0.0 {
            first.viewport.height
        } else {
            800.0
        };
        let delta = match samples.scroll_delta_y {
            Some(delta) if delta > 0.0 => delta,
            _ => (viewport_height * SCROLL_STEP_RATIO).max(MIN_SCROLL_STEP),
        };

        let mut snapshots = vec![first];
        for _ in 1..samples.samples {
            let scrolled = match self.source.scroll_y().await {
                Ok(current) => self.source.scroll_to(current + delta).await,
                Err(err) => Err(err),
            };
            if let Err(err) = scrolled {
                warn!(error = %err, "scrolling failed, stopping sampling");
                break;
            }
            if samples.settle_ms > 0 {
                tokio::time::sleep(Duration::from_millis(samples.settle_ms)).await;
            }
            snapshots.push(self.run(options).await?.snapshot);
        }
        Ok(snapshots)
    }

    async fn rank(
        &self,
        raw_elements: &[RawElementRecord],
        options: ProcessOptions,
        budget_ms: u64,
    ) -> Result<Vec<Element>> {
        let processor = Arc::clone(&self.processor);
        let input = raw_elements.to_vec();
        let task = tokio::task::spawn_blocking(move || processor.process(&input, &options));

        match tokio::time::timeout(Duration::from_millis(budget_ms), task).await {
            Ok(Ok(Ok(elements))) => Ok(elements),
            Ok(Ok(Err(err))) => Err(SnapshotError::ProcessingFailed(format!("{:#}", err))),
            Ok(Err(join_err)) => Err(SnapshotError::ProcessingFailed(join_err.to_string())),
            Err(_) => Err(SnapshotError::ProcessingTimeout { budget_ms }),
        }
    }
}

fn elapsed_ms(since: Instant) -> u64 {
    since.elapsed().as_millis() as u64
}

fn vision_reason(
    page: &PageModel,
    raw_elements: &[RawElementRecord],
    captcha_detected: bool,
) -> Option<&'static str> {
    if captcha_detected {
        return Some("captcha_detected");
    }
    if canvas_dominant(page) {
        return Some("canvas_dominant");
    }
    if raw_elements.len() < LOW_YIELD_ELEMENTS && page.node_count() >= LOW_YIELD_MIN_NODES {
        return Some("low_element_yield");
    }
    None
}

fn canvas_dominant(page: &PageModel) -> bool {
    let viewport_area = page.viewport.width * page.viewport.height;
    if viewport_area <= 0.0 {
        return false;
    }
    page.node_ids().any(|id| {
        let node = page.node(id);
        node.tag == "canvas"
            && node.connected
            && !node.style.is_hidden()
            && visible_area(&node.rect, page) / viewport_area >= CANVAS_DOMINANT_RATIO
    })
}

fn visible_area(rect: &ElementRect, page: &PageModel) -> f64 {
    let width = (rect.x + rect.width).min(page.viewport.width) - rect.x.max(0.0);
    let height = (rect.y + rect.height).min(page.viewport.height) - rect.y.max(0.0);
    width.max(0.0) * height.max(0.0)
}

/// Reuses a recent pass instead of re-running the pipeline.
///
/// The cache is keyed on nothing but age: callers that change options
/// should `invalidate` first or pass `force_refresh`.
pub struct SnapshotCache {
    max_age: Duration,
    entry: Mutex<Option<(Instant, Arc<SnapshotPass>)>>,
}

impl Default for SnapshotCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(2))
    }
}

impl SnapshotCache {
    pub fn new(max_age: Duration) -> Self {
        Self {
            max_age,
            entry: Mutex::new(None),
        }
    }

    pub async fn get_or_refresh<S: PageSource>(
        &self,
        pipeline: &SnapshotPipeline<S>,
        options: &SnapshotOptions,
        force_refresh: bool,
    ) -> Result<Arc<SnapshotPass>> {
        let mut entry = self.entry.lock().await;
        if !force_refresh {
            if let Some((taken_at, pass)) = entry.as_ref() {
                if taken_at.elapsed() < self.max_age {
                    debug!(age_ms = elapsed_ms(*taken_at), "serving cached snapshot");
                    return Ok(Arc::clone(pass));
                }
            }
        }
        let pass = Arc::new(pipeline.run(options).await?);
        *entry = Some((Instant::now(), Arc::clone(&pass)));
        Ok(pass)
    }

    pub async fn invalidate(&self) {
        *self.entry.lock().await = None;
    }

    pub async fn is_fresh(&self) -> bool {
        self.entry
            .lock()
            .await
            .as_ref()
            .is_some_and(|(taken_at, _)| taken_at.elapsed() < self.max_age)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::{ScreenshotOptions, StabilitySetting};
    use crate::core::page::ActivitySample;
    use crate::dom::page::NodeSpec;
    use crate::testing::{StaticPage, TestHelper};

    fn options() -> SnapshotOptions {
        SnapshotOptions {
            wait_for_stability: StabilitySetting::Enabled(false),
            ..Default::default()
        }
    }

    fn results_page(count: usize) -> StaticPage {
        let body = NodeSpec::element("body")
            .rect(0.0, 0.0, 1280.0, 2000.0)
            .child(TestHelper::result_list(count));
        StaticPage::new(TestHelper::page(body))
    }

    struct FailingProcessor;

    impl SnapshotProcessor for FailingProcessor {
        fn process(
            &self,
            _raw_elements: &[RawElementRecord],
            _options: &ProcessOptions,
        ) -> anyhow::Result<Vec<Element>> {
            anyhow::bail!("ranker crashed")
        }
    }

    struct SlowProcessor;

    impl SnapshotProcessor for SlowProcessor {
        fn process(
            &self,
            raw_elements: &[RawElementRecord],
            _options: &ProcessOptions,
        ) -> anyhow::Result<Vec<Element>> {
            std::thread::sleep(Duration::from_millis(300));
            Ok(fallback_elements(raw_elements))
        }
    }

    #[tokio::test]
    async fn test_run_assigns_dense_ids_and_session() {
        let pipeline = SnapshotPipeline::new(Arc::new(results_page(4)));
        let pass = pipeline.run(&options()).await.unwrap();

        let ids: Vec<u32> = pass.snapshot.raw_elements.iter().map(|r| r.id).collect();
        let expected: Vec<u32> = (0..ids.len() as u32).collect();
        assert_eq!(ids, expected);
        assert_eq!(pass.session.len(), ids.len());
        assert_eq!(pass.snapshot.status, SnapshotStatus::Success);
        assert!(!pass.snapshot.diagnostics.fallback_used);
        assert_eq!(pass.snapshot.dominant_group().len(), 4);
    }

    #[tokio::test]
    async fn test_processor_failure_falls_back() {
        let pipeline = SnapshotPipeline::new(Arc::new(results_page(3)))
            .with_processor(Arc::new(FailingProcessor));
        let pass = pipeline.run(&options()).await.unwrap();
        let snapshot = &pass.snapshot;

        assert!(snapshot.diagnostics.fallback_used);
        assert_eq!(snapshot.elements.len(), snapshot.raw_elements.len());
        assert!(matches!(
            snapshot.diagnostics.warnings.as_slice(),
            [PipelineWarning::ProcessingFailed { .. }]
        ));
    }

    #[tokio::test]
    async fn test_processor_timeout_falls_back() {
        let pipeline = SnapshotPipeline::new(Arc::new(results_page(3)))
            .with_processor(Arc::new(SlowProcessor));
        let mut opts = options();
        opts.timeouts.processing_ms = 20;
        let pass = pipeline.run(&opts).await.unwrap();

        assert!(pass.snapshot.diagnostics.fallback_used);
        assert!(pass
            .snapshot
            .diagnostics
            .warnings
            .contains(&PipelineWarning::ProcessingTimeout { budget_ms: 20 }));
    }

    #[tokio::test]
    async fn test_screenshot_failure_is_a_warning() {
        let pipeline = SnapshotPipeline::new(Arc::new(results_page(3)));
        let opts = SnapshotOptions {
            screenshot: Some(ScreenshotOptions::default()),
            ..options()
        };
        let pass = pipeline.run(&opts).await.unwrap();

        assert!(pass.snapshot.screenshot.is_none());
        assert!(matches!(
            pass.snapshot.diagnostics.warnings.as_slice(),
            [PipelineWarning::ScreenshotFailed { .. }]
        ));
    }

    #[tokio::test]
    async fn test_screenshot_attached() {
        let source = results_page(3).with_screenshot(b"png-bytes".to_vec());
        let pipeline = SnapshotPipeline::new(Arc::new(source));
        let opts = SnapshotOptions {
            screenshot: Some(ScreenshotOptions::default()),
            ..options()
        };
        let pass = pipeline.run(&opts).await.unwrap();

        assert_eq!(
            pass.snapshot.screenshot.as_deref(),
            Some(ScreenshotManager::encode_base64(b"png-bytes").as_str())
        );
        assert_eq!(pass.snapshot.screenshot_format.as_deref(), Some("png"));
    }

    #[tokio::test]
    async fn test_capture_failure_is_error_response() {
        let source = results_page(1).failing_capture("target closed");
        let response = SnapshotPipeline::new(Arc::new(source))
            .snapshot(&options())
            .await;

        assert!(!response.is_success());
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["status"], "error");
        assert!(value["error"].as_str().unwrap().contains("target closed"));
    }

    #[tokio::test]
    async fn test_canvas_page_requires_vision() {
        let body = NodeSpec::element("body")
            .rect(0.0, 0.0, 1280.0, 720.0)
            .child(NodeSpec::element("canvas").rect(0.0, 0.0, 1280.0, 600.0))
            .child(
                NodeSpec::element("button")
                    .rect(10.0, 650.0, 80.0, 30.0)
                    .with_text("Play"),
            );
        let pipeline = SnapshotPipeline::new(Arc::new(StaticPage::new(TestHelper::page(body))));
        let pass = pipeline.run(&options()).await.unwrap();

        assert!(pass.snapshot.diagnostics.requires_vision);
        assert_eq!(
            pass.snapshot.diagnostics.requires_vision_reason.as_deref(),
            Some("canvas_dominant")
        );
    }

    #[tokio::test]
    async fn test_cache_serves_recent_pass() {
        let pipeline = SnapshotPipeline::new(Arc::new(results_page(3)));
        let cache = SnapshotCache::default();

        let first = cache.get_or_refresh(&pipeline, &options(), false).await.unwrap();
        let second = cache.get_or_refresh(&pipeline, &options(), false).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        let forced = cache.get_or_refresh(&pipeline, &options(), true).await.unwrap();
        assert_ne!(first.session.pass_id(), forced.session.pass_id());

        cache.invalidate().await;
        assert!(!cache.is_fresh().await);
    }

    #[tokio::test]
    async fn test_truncated_capture_is_degraded() {
        let mut page = TestHelper::page(
            NodeSpec::element("body")
                .rect(0.0, 0.0, 1280.0, 2000.0)
                .child(TestHelper::result_list(3)),
        );
        page.truncated_at = Some(20_000);
        let pipeline = SnapshotPipeline::new(Arc::new(StaticPage::new(page)));
        let pass = pipeline.run(&options()).await.unwrap();

        assert!(pass.snapshot.is_degraded());
        assert_eq!(
            pass.snapshot.diagnostics.warnings,
            vec![PipelineWarning::CaptureTruncated { limit: 20_000 }]
        );
        assert!(!pass.snapshot.elements.is_empty());
    }

    /// A results feed that only renders the rows inside the viewport.
    struct VirtualFeed {
        rows: usize,
        scroll_y: Mutex<f64>,
    }

    impl VirtualFeed {
        fn new(rows: usize) -> Self {
            Self {
                rows,
                scroll_y: Mutex::new(0.0),
            }
        }
    }

    #[async_trait::async_trait]
    impl PageSource for VirtualFeed {
        async fn capture(&self) -> Result<PageModel> {
            let scroll_y = *self.scroll_y.lock().await;
            let rows = (0..self.rows).filter_map(|i| {
                let doc_y = 100.0 + 40.0 * i as f64;
                let y = doc_y - scroll_y;
                (0.0..720.0).contains(&y).then(|| {
                    NodeSpec::element("a")
                        .attr("href", &format!("/item/{}", i))
                        .rect(10.0, y, 400.0, 24.0)
                        .with_text(&format!("Item {}", i))
                })
            });
            let mut page = TestHelper::page(
                NodeSpec::element("body")
                    .rect(0.0, -scroll_y, 1280.0, 3000.0)
                    .children(rows),
            );
            page.scroll_y = scroll_y;
            Ok(page)
        }

        async fn sample_activity(&self) -> Result<ActivitySample> {
            Ok(ActivitySample::default())
        }

        async fn screenshot(&self, _options: &ScreenshotOptions) -> Result<Vec<u8>> {
            Err(SnapshotError::ScreenshotFailed("not rendered".into()))
        }

        async fn scroll_y(&self) -> Result<f64> {
            Ok(*self.scroll_y.lock().await)
        }

        async fn scroll_to(&self, y: f64) -> Result<()> {
            *self.scroll_y.lock().await = y;
            Ok(())
        }
    }

    fn item_hrefs(snapshot: &Snapshot) -> Vec<String> {
        snapshot
            .elements
            .iter()
            .filter_map(|e| e.href.clone())
            .collect()
    }

    #[tokio::test]
    async fn test_sampled_union_covers_virtualized_rows() {
        let feed = Arc::new(VirtualFeed::new(60));
        let pipeline = SnapshotPipeline::new(Arc::clone(&feed));
        let samples = SampleOptions {
            samples: 3,
            settle_ms: 0,
            ..Default::default()
        };

        let single = pipeline.run(&options()).await.unwrap().snapshot;
        let merged = pipeline.sampled(&options(), &samples).await.unwrap();

        let single_hrefs = item_hrefs(&single);
        let hrefs = item_hrefs(&merged);
        assert!(hrefs.len() > single_hrefs.len());
        assert!(hrefs.contains(&"/item/0".to_string()));
        assert!(hrefs.contains(&"/item/45".to_string()));
        let mut unique = hrefs.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), hrefs.len());
        assert!(merged.screenshot.is_none());
        assert_eq!(feed.scroll_y().await.unwrap(), 0.0);
    }

    #[tokio::test]
    async fn test_sampled_respects_union_limit() {
        let pipeline = SnapshotPipeline::new(Arc::new(VirtualFeed::new(60)));
        let samples = SampleOptions {
            samples: 3,
            settle_ms: 0,
            union_limit: Some(10),
            ..Default::default()
        };
        let merged = pipeline.sampled(&options(), &samples).await.unwrap();
        assert_eq!(merged.elements.len(), 10);
    }

    #[tokio::test]
    async fn test_sampled_restores_static_page_scroll() {
        let source = Arc::new(results_page(3));
        source.scroll_to(120.0).await.unwrap();
        let pipeline = SnapshotPipeline::new(Arc::clone(&source));
        let samples = SampleOptions {
            samples: 2,
            settle_ms: 0,
            scroll_delta_y: Some(500.0),
            ..Default::default()
        };

        let merged = pipeline.sampled(&options(), &samples).await.unwrap();
        assert_eq!(source.scroll_y().await.unwrap(), 120.0);
        assert_eq!(
            item_hrefs(&merged).len(),
            3,
            "static rows seen at two offsets merge by href"
        );
    }
}
