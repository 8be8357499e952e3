use super::rpc::CorrelationTable;
use super::{FrameCollection, FrameStitcher};
use crate::core::config::SnapshotOptions;
use crate::dom::page::PageModel;
use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

/// A sub-collection request posted to a child frame.
#[derive(Debug, Clone)]
pub struct FrameRequest {
    pub request_id: Uuid,
    pub src: String,
    pub document: Arc<PageModel>,
    pub options: SnapshotOptions,
}

/// Reply channel for one request. Replies after the deadline go nowhere.
pub struct FrameResponder {
    id: Uuid,
    table: CorrelationTable<FrameCollection>,
}

impl FrameResponder {
    pub(crate) fn new(id: Uuid, table: CorrelationTable<FrameCollection>) -> Self {
        Self { id, table }
    }

    pub fn request_id(&self) -> Uuid {
        self.id
    }

    pub async fn respond(self, reply: std::result::Result<FrameCollection, String>) -> bool {
        self.table.resolve(self.id, reply).await
    }
}

/// Delivers requests into child frames.
///
/// `dispatch` only posts the request; the reply comes back later (or never)
/// through the responder.
#[async_trait]
pub trait FrameConnector: Send + Sync {
    async fn dispatch(
        &self,
        request: FrameRequest,
        responder: FrameResponder,
        stitcher: &FrameStitcher,
    ) -> anyhow::Result<()>;
}

/// Runs the child pipeline in-process against the captured child document.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFrames;

#[async_trait]
impl FrameConnector for LocalFrames {
    async fn dispatch(
        &self,
        request: FrameRequest,
        responder: FrameResponder,
        stitcher: &FrameStitcher,
    ) -> anyhow::Result<()> {
        let stitcher = stitcher.clone();
        tokio::spawn(async move {
            let reply = stitcher
                .collect(request.document, request.options)
                .await
                .map_err(|err| err.to_string());
            if !responder.respond(reply).await {
                tracing::debug!(src = %request.src, "late frame reply dropped");
            }
        });
        Ok(())
    }
}
