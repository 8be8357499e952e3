//! Per-pass element id table.
//!
//! Every pipeline pass builds a fresh `PassSession`. Ids and handles are only
//! meaningful against the session that minted them; the action layer resolves
//! a handle through the session to find the live node.

use crate::dom::page::NodeId;
use crate::errors::{Result, SnapshotError};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where an element lives: the chain of iframe nodes leading to its document,
/// outermost first, then the node inside that document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeLocator {
    pub frames: Vec<NodeId>,
    pub node: NodeId,
}

impl NodeLocator {
    pub fn top(node: NodeId) -> Self {
        Self {
            frames: Vec::new(),
            node,
        }
    }

    /// The same locator seen from the parent document through `iframe`.
    pub fn through_frame(mut self, iframe: NodeId) -> Self {
        self.frames.insert(0, iframe);
        self
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementHandle {
    pub pass_id: Uuid,
    pub element_id: u32,
}

#[derive(Debug, Clone)]
pub struct PassSession {
    pass_id: Uuid,
    url: String,
    locators: Vec<NodeLocator>,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl PassSession {
    /// `locators[i]` is the node for element id `i`.
    pub fn new(url: impl Into<String>, locators: Vec<NodeLocator>) -> Self {
        Self {
            pass_id: Uuid::new_v4(),
            url: url.into(),
            locators,
            created_at: chrono::Utc::now(),
        }
    }

    pub fn pass_id(&self) -> Uuid {
        self.pass_id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn created_at(&self) -> chrono::DateTime<chrono::Utc> {
        self.created_at
    }

    pub fn len(&self) -> usize {
        self.locators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locators.is_empty()
    }

    pub fn handle(&self, element_id: u32) -> Result<ElementHandle> {
        if element_id as usize >= self.locators.len() {
            return Err(SnapshotError::UnknownElement(element_id));
        }
        Ok(ElementHandle {
            pass_id: self.pass_id,
            element_id,
        })
    }

    pub fn resolve(&self, handle: &ElementHandle) -> Result<&NodeLocator> {
        if handle.pass_id != self.pass_id {
            return Err(SnapshotError::StaleHandle {
                handle_pass: handle.pass_id,
                current_pass: self.pass_id,
            });
        }
        self.locator(handle.element_id)
            .ok_or(SnapshotError::UnknownElement(handle.element_id))
    }

    pub fn locator(&self, element_id: u32) -> Option<&NodeLocator> {
        self.locators.get(element_id as usize)
    }
}
