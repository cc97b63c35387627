//! Pending request table.

use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::debug;

use crate::error::ClientError;

/// Completion handle for one outstanding request.
pub type Completion = oneshot::Sender<Result<Value, ClientError>>;

struct Entry {
    method: String,
    completion: Completion,
}

/// In-flight requests keyed by correlation id.
///
/// Every entry is settled exactly once: by its response, or by a flush when
/// the connection carrying it goes away.
#[derive(Default)]
pub struct PendingTable {
    entries: HashMap<String, Entry>,
}

impl PendingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a request. Fails if `id` is already outstanding.
    pub fn insert(&mut self, id: String, method: String, completion: Completion) -> Result<(), Completion> {
        if self.entries.contains_key(&id) {
            return Err(completion);
        }
        self.entries.insert(id, Entry { method, completion });
        Ok(())
    }

    /// Settle the entry for `id`. Returns false if nothing was pending.
    pub fn settle(&mut self, id: &str, result: Result<Value, ClientError>) -> bool {
        match self.entries.remove(id) {
            Some(entry) => {
                debug!(id, method = %entry.method, ok = result.is_ok(), "request settled");
                // The caller may have dropped its handle.
                let _ = entry.completion.send(result);
                true
            }
            None => false,
        }
    }

    /// Fail every outstanding request and empty the table.
    pub fn flush(&mut self, error: impl Fn() -> ClientError) -> usize {
        let count = self.entries.len();
        for (id, entry) in self.entries.drain() {
            debug!(id = %id, method = %entry.method, "failing pending request");
            let _ = entry.completion.send(Err(error()));
        }
        count
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Caller-side handle to an outstanding request.
///
/// Dropping the handle abandons the result; the entry is still settled or
/// flushed inside the client.
#[derive(Debug)]
pub struct PendingRequest {
    id: String,
    method: String,
    rx: oneshot::Receiver<Result<Value, ClientError>>,
}

impl PendingRequest {
    pub(crate) fn new(
        id: String,
        method: String,
        rx: oneshot::Receiver<Result<Value, ClientError>>,
    ) -> Self {
        Self { id, method, rx }
    }

    /// Correlation id of the request.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Method name of the request.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Wait for the response payload.
    pub async fn wait(self) -> Result<Value, ClientError> {
        // A dropped sender means the client task is gone.
        self.rx.await.unwrap_or(Err(ClientError::Stopped))
    }

    /// Wait for the response and decode it.
    pub async fn wait_as<T: DeserializeOwned>(self) -> Result<T, ClientError> {
        let value = self.wait().await?;
        Ok(serde_json::from_value(value)?)
    }
}
