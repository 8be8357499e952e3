//! Frame stitching: fan out to same-origin child frames, translate their
//! elements into top-document coordinates and flatten the results.

pub mod connector;
pub mod rpc;

pub use connector::{FrameConnector, FrameRequest, FrameResponder, LocalFrames};
pub use rpc::{CorrelationTable, RpcOutcome};

use crate::collect::{collect_document, Collected};
use crate::core::config::SnapshotOptions;
use crate::dom::element::IframeContext;
use crate::dom::page::{FrameContent, NodeId, PageModel};
use crate::dom::state::PipelineWarning;
use crate::errors::Result;
use futures::future::{join_all, BoxFuture, FutureExt};
use regex::Regex;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

const AD_NETWORK_PATTERN: &str = r"(?i)(doubleclick\.net|googlesyndication\.com|googleadservices\.com|amazon-adsystem\.com|adnxs\.com|taboola\.com|outbrain\.com|criteo\.(com|net)|pubmatic\.com|rubiconproject\.com|/ads/)";

static AD_NETWORKS: OnceLock<Option<Regex>> = OnceLock::new();

pub fn is_ad_frame(src: &str) -> bool {
    AD_NETWORKS
        .get_or_init(|| Regex::new(AD_NETWORK_PATTERN).ok())
        .as_ref()
        .is_some_and(|re| re.is_match(src))
}

/// `about:blank` and `srcdoc` frames inherit the parent's origin.
pub fn is_same_origin(parent_url: &str, frame_url: &str) -> bool {
    if frame_url.is_empty() || frame_url.starts_with("about:") {
        return true;
    }
    match (Url::parse(parent_url), Url::parse(frame_url)) {
        (Ok(parent), Ok(frame)) => parent.origin() == frame.origin(),
        _ => false,
    }
}

/// Flattened elements of one document and everything below it.
#[derive(Debug, Clone, Default)]
pub struct FrameCollection {
    pub elements: Vec<Collected>,
    pub warnings: Vec<PipelineWarning>,
    pub frames_requested: usize,
    pub frames_merged: usize,
}

struct FrameTarget {
    iframe: NodeId,
    src: String,
    document: Arc<PageModel>,
}

#[derive(Clone)]
pub struct FrameStitcher {
    connector: Arc<dyn FrameConnector>,
    table: CorrelationTable<FrameCollection>,
}

impl Default for FrameStitcher {
    fn default() -> Self {
        Self::new(Arc::new(LocalFrames))
    }
}

impl FrameStitcher {
    pub fn new(connector: Arc<dyn FrameConnector>) -> Self {
        Self {
            connector,
            table: CorrelationTable::new(),
        }
    }

    /// Collect `page` and, when `collect_iframes` is set, every reachable
    /// frame below it.
    pub fn collect(
        &self,
        page: Arc<PageModel>,
        options: SnapshotOptions,
    ) -> BoxFuture<'static, Result<FrameCollection>> {
        let stitcher = self.clone();
        async move {
            let mut collection = FrameCollection {
                elements: collect_document(&page, &options)?,
                ..Default::default()
            };
            if options.collect_iframes {
                stitcher.stitch(&page, &options, &mut collection).await;
            }
            Ok(collection)
        }
        .boxed()
    }

    fn targets(page: &PageModel) -> Vec<FrameTarget> {
        let mut targets = Vec::new();
        for id in page.node_ids() {
            let node = page.node(id);
            if !matches!(node.tag.as_str(), "iframe" | "frame") || !node.connected {
                continue;
            }
            let src = node.attr("src").unwrap_or("about:blank").to_string();
            if is_ad_frame(&src) {
                debug!(%src, "skipping ad frame");
                continue;
            }
            match &node.frame {
                Some(FrameContent::SameOrigin(document)) => {
                    if !is_same_origin(&page.url, &document.url) {
                        debug!(%src, frame_url = %document.url, "frame origin mismatch");
                        continue;
                    }
                    targets.push(FrameTarget {
                        iframe: id,
                        src,
                        document: Arc::clone(document),
                    });
                }
                Some(FrameContent::CrossOrigin) => debug!(%src, "cross-origin frame unreachable"),
                Some(FrameContent::NotLoaded) | None => debug!(%src, "frame not loaded"),
            }
        }
        targets
    }

    async fn stitch(
        &self,
        page: &PageModel,
        options: &SnapshotOptions,
        collection: &mut FrameCollection,
    ) {
        let targets = Self::targets(page);
        if targets.is_empty() {
            return;
        }
        let timeout = Duration::from_millis(options.timeouts.frame_ms);
        let child_options = options.for_child_frame();

        let requests = targets.iter().map(|target| {
            let request_options = child_options.clone();
            self.table.call(timeout, move |request_id| {
                let request = FrameRequest {
                    request_id,
                    src: target.src.clone(),
                    document: Arc::clone(&target.document),
                    options: request_options,
                };
                let responder = FrameResponder::new(request_id, self.table.clone());
                self.connector.dispatch(request, responder, self)
            })
        });
        let outcomes = join_all(requests).await;

        for (target, outcome) in targets.iter().zip(outcomes) {
            collection.frames_requested += 1;
            match outcome {
                RpcOutcome::Reply(child) => {
                    collection.frames_requested += child.frames_requested;
                    collection.frames_merged += 1 + child.frames_merged;
                    collection.warnings.extend(child.warnings);
                    let merged = child.elements.len();
                    self.merge(page, target, child.elements, collection);
                    debug!(src = %target.src, elements = merged, "frame merged");
                }
                RpcOutcome::Expired => {
                    warn!(src = %target.src, timeout_ms = options.timeouts.frame_ms, "frame timed out");
                    collection.warnings.push(PipelineWarning::FrameTimeout {
                        src: target.src.clone(),
                    });
                }
                RpcOutcome::Failed(reason) => {
                    warn!(src = %target.src, %reason, "frame collection failed");
                    collection.warnings.push(PipelineWarning::FrameUnreachable {
                        src: target.src.clone(),
                        reason,
                    });
                }
            }
        }
    }

    /// Frame-local rects are offset by the iframe's own rect.
    fn merge(
        &self,
        page: &PageModel,
        target: &FrameTarget,
        elements: Vec<Collected>,
        collection: &mut FrameCollection,
    ) {
        let frame_rect = page.node(target.iframe).rect;
        for mut item in elements {
            let record = &mut item.record;
            record.rect = record.rect.offset(frame_rect.x, frame_rect.y);
            record.in_viewport = record.in_viewport && record.rect.intersects_viewport(&page.viewport);
            record.scroll_y = page.scroll_y;
            if record.iframe_context.is_none() {
                record.iframe_context = Some(IframeContext {
                    src: target.src.clone(),
                    is_same_origin: true,
                });
            }
            item.locator = item.locator.through_frame(target.iframe);
            collection.elements.push(item);
        }
    }
}
