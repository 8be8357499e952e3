//! Correlation-id request/response table.
//!
//! Each outgoing request registers an entry keyed by a random id and holding a
//! deadline. Replies are matched by id whatever order they arrive in. A reply
//! that arrives after its entry expired finds nothing and is dropped.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex};
use tokio::time::Instant;
use uuid::Uuid;

pub type Reply<T> = std::result::Result<T, String>;

struct Pending<T> {
    deadline: Instant,
    reply: oneshot::Sender<Reply<T>>,
}

#[derive(Debug, PartialEq)]
pub enum RpcOutcome<T> {
    Reply(T),
    Failed(String),
    /// The deadline passed with no reply.
    Expired,
}

pub struct CorrelationTable<T> {
    entries: Arc<Mutex<HashMap<Uuid, Pending<T>>>>,
}

impl<T> Clone for CorrelationTable<T> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
        }
    }
}

impl<T: Send + 'static> Default for CorrelationTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + 'static> CorrelationTable<T> {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub async fn register(&self, deadline: Instant) -> (Uuid, oneshot::Receiver<Reply<T>>) {
        let id = Uuid::new_v4();
        let (reply, receiver) = oneshot::channel();
        self.entries
            .lock()
            .await
            .insert(id, Pending { deadline, reply });
        (id, receiver)
    }

    /// Deliver a reply. Returns `false` when the id is unknown or expired.
    pub async fn resolve(&self, id: Uuid, reply: Reply<T>) -> bool {
        let Some(pending) = self.entries.lock().await.remove(&id) else {
            return false;
        };
        if Instant::now() > pending.deadline {
            return false;
        }
        pending.reply.send(reply).is_ok()
    }

    /// Drop every entry whose deadline is at or before `now`; their waiters
    /// observe a closed channel.
    pub async fn expire(&self, now: Instant) -> Vec<Uuid> {
        let mut entries = self.entries.lock().await;
        let expired: Vec<Uuid> = entries
            .iter()
            .filter(|(_, pending)| pending.deadline <= now)
            .map(|(id, _)| *id)
            .collect();
        for id in &expired {
            entries.remove(id);
        }
        expired
    }

    pub async fn pending(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Register, hand the id to `dispatch`, then wait for the reply or the
    /// deadline, whichever comes first.
    pub async fn call<F, Fut>(&self, timeout: Duration, dispatch: F) -> RpcOutcome<T>
    where
        F: FnOnce(Uuid) -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
    {
        let deadline = Instant::now() + timeout;
        let (id, receiver) = self.register(deadline).await;

        if let Err(err) = dispatch(id).await {
            self.entries.lock().await.remove(&id);
            return RpcOutcome::Failed(format!("{:#}", err));
        }

        match tokio::time::timeout_at(deadline, receiver).await {
            Ok(Ok(Ok(value))) => RpcOutcome::Reply(value),
            Ok(Ok(Err(message))) => RpcOutcome::Failed(message),
            Ok(Err(_closed)) => RpcOutcome::Expired,
            Err(_elapsed) => {
                self.expire(Instant::now()).await;
                self.entries.lock().await.remove(&id);
                RpcOutcome::Expired
            }
        }
    }
}
