//! Correlation of in-flight requests.
//!
//! Every outgoing request gets a correlation id unique to the call; the
//! pending table maps it back to the waiting caller. Entries leave the table
//! when the request settles, when the target peer goes away, or when the
//! caller stops waiting.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use ipcchan_channel::{CorrelationId, RemoteError, RemoteErrorKind};
use ipcchan_transport::PeerId;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::error::ChannelError;

/// Source of correlation ids.
pub trait CorrelationIdGenerator: Send + Sync {
    /// Produce an id not used by any other outstanding request.
    fn next_id(&self) -> CorrelationId;
}

/// Counter-based ids: `<prefix>-1`, `<prefix>-2`, ...
#[derive(Debug)]
pub struct SequentialIds {
    prefix: String,
    next: AtomicU64,
}

impl SequentialIds {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: AtomicU64::new(1),
        }
    }
}

impl CorrelationIdGenerator for SequentialIds {
    fn next_id(&self) -> CorrelationId {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        CorrelationId::new(format!("{}-{n}", self.prefix))
    }
}

/// What a waiting caller eventually receives: the encoded response or the error.
pub(crate) type Settlement = std::result::Result<String, ChannelError>;

struct PendingRequest {
    channel: String,
    target: PeerId,
    tx: oneshot::Sender<Settlement>,
}

/// Correlation table of requests awaiting an answer.
#[derive(Default)]
pub(crate) struct PendingRequests {
    entries: Mutex<HashMap<CorrelationId, PendingRequest>>,
}

impl PendingRequests {
    /// Register a request and return the receiver its settlement arrives on.
    pub(crate) fn insert(
        &self,
        id: CorrelationId,
        channel: &str,
        target: PeerId,
    ) -> oneshot::Receiver<Settlement> {
        let (tx, rx) = oneshot::channel();
        let entry = PendingRequest {
            channel: channel.to_string(),
            target,
            tx,
        };
        if self.entries().insert(id.clone(), entry).is_some() {
            warn!(correlation_id = %id, "correlation id reused; previous caller is abandoned");
        }
        rx
    }

    /// Settle a request with the far side's answer.
    ///
    /// Returns false if nothing is waiting on `id` any more.
    pub(crate) fn settle(
        &self,
        id: &CorrelationId,
        outcome: std::result::Result<String, RemoteError>,
    ) -> bool {
        let Some(entry) = self.entries().remove(id) else {
            warn!(correlation_id = %id, "late or unknown response dropped");
            return false;
        };
        let settlement = outcome.map_err(|err| remote_to_channel_error(&entry.channel, err));
        // The caller may have stopped waiting in the meantime.
        let _ = entry.tx.send(settlement);
        true
    }

    /// Forget a request without settling it.
    pub(crate) fn remove(&self, id: &CorrelationId) -> bool {
        self.entries().remove(id).is_some()
    }

    /// Reject every request addressed to `peer`.
    pub(crate) fn fail_peer(&self, peer: &PeerId) -> usize {
        let failed: Vec<PendingRequest> = {
            let mut entries = self.entries();
            let ids: Vec<CorrelationId> = entries
                .iter()
                .filter(|(_, entry)| &entry.target == peer)
                .map(|(id, _)| id.clone())
                .collect();
            ids.iter().filter_map(|id| entries.remove(id)).collect()
        };

        let count = failed.len();
        for entry in failed {
            let _ = entry.tx.send(Err(ChannelError::Disconnected(peer.clone())));
        }
        if count > 0 {
            debug!(%peer, count, "rejected pending requests for closed peer");
        }
        count
    }

    /// Reject every outstanding request, each with its own target as the
    /// disconnected peer. Used once no answer can arrive any more.
    pub(crate) fn fail_all(&self) -> usize {
        let failed: Vec<PendingRequest> = self.entries().drain().map(|(_, entry)| entry).collect();

        let count = failed.len();
        for entry in failed {
            let _ = entry.tx.send(Err(ChannelError::Disconnected(entry.target)));
        }
        if count > 0 {
            debug!(count, "rejected all pending requests");
        }
        count
    }

    pub(crate) fn len(&self) -> usize {
        self.entries().len()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<CorrelationId, PendingRequest>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Removes a pending entry when the waiting caller goes away.
pub(crate) struct PendingGuard<'a> {
    table: &'a PendingRequests,
    id: CorrelationId,
}

impl<'a> PendingGuard<'a> {
    pub(crate) fn new(table: &'a PendingRequests, id: CorrelationId) -> Self {
        Self { table, id }
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if self.table.remove(&self.id) {
            debug!(correlation_id = %self.id, "request abandoned before settlement");
        }
    }
}

fn remote_to_channel_error(channel: &str, err: RemoteError) -> ChannelError {
    match err.kind {
        RemoteErrorKind::Unhandled => ChannelError::UnhandledRequest(channel.to_string()),
        RemoteErrorKind::Handler => ChannelError::Handler {
            channel: channel.to_string(),
            message: err.message,
        },
        RemoteErrorKind::Serialization => ChannelError::RemoteSerialization {
            channel: channel.to_string(),
            message: err.message,
        },
    }
}
