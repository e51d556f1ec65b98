use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::intent::{IntentKind, PendingIntent};
use crate::ledger::{Completion, CorrelationId, Outcome};

/// Immediate answer to a submission. The terminal outcome arrives later through the
/// callback handed to [`IntentSender::submit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ack {
    pub id: CorrelationId,
    pub status: AckStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AckStatus {
    Accepted,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error("intent queue closed; the tick loop is no longer running")]
    Closed,
}

/// Producer side, cloned into every transport thread.
#[derive(Debug, Clone)]
pub struct IntentSender {
    tx: Sender<PendingIntent>,
}

/// Consumer side, owned by the tick thread.
#[derive(Debug)]
pub struct IntentQueue {
    rx: Receiver<PendingIntent>,
}

impl IntentQueue {
    pub fn new() -> (IntentSender, IntentQueue) {
        let (tx, rx) = unbounded();
        (IntentSender { tx }, IntentQueue { rx })
    }

    /// Never blocks; `None` when nothing is waiting or every producer is gone.
    pub fn try_pop(&self) -> Option<PendingIntent> {
        match self.rx.try_recv() {
            Ok(intent) => Some(intent),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

impl IntentSender {
    pub fn submit<F>(
        &self,
        id: CorrelationId,
        kind: IntentKind,
        callback: F,
    ) -> Result<Ack, SubmitError>
    where
        F: FnOnce(Outcome) + Send + 'static,
    {
        let completion = Completion::new(id.clone(), callback);
        self.tx
            .send(PendingIntent::new(kind, completion))
            .map_err(|_| SubmitError::Closed)?;
        Ok(Ack {
            id,
            status: AckStatus::Accepted,
        })
    }
}
