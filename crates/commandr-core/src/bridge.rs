//! Cross-thread handoff from the background worker to the UI loop.
//!
//! Producers never block: the channel is unbounded, which is fine for an
//! interactive workload that emits a handful of events per keystroke of
//! model output. The consumer side is drained without waiting on every UI
//! tick. Envelopes belonging to a cancelled request are dropped at drain
//! time, so an event queued just before cancellation still never reaches
//! the UI.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::events::{RequestId, StreamEvent};
use crate::state::ConversationId;

#[derive(Debug, Clone)]
pub struct Envelope {
    pub request: RequestId,
    pub conversation: ConversationId,
    pub event: StreamEvent,
    cancel: CancellationToken,
}

impl Envelope {
    pub fn new(
        request: RequestId,
        conversation: ConversationId,
        event: StreamEvent,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            request,
            conversation,
            event,
            cancel,
        }
    }

    /// True once the originating request has been abandoned
    pub fn is_discarded(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

pub fn channel() -> (BridgeSender, BridgeReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (BridgeSender { tx }, BridgeReceiver { rx })
}

#[derive(Debug, Clone)]
pub struct BridgeSender {
    tx: mpsc::UnboundedSender<Envelope>,
}

impl BridgeSender {
    /// Returns false when the UI side has gone away
    pub fn send(&self, envelope: Envelope) -> bool {
        if self.tx.send(envelope).is_err() {
            tracing::debug!("bridge receiver dropped; event discarded");
            return false;
        }
        true
    }
}

#[derive(Debug)]
pub struct BridgeReceiver {
    rx: mpsc::UnboundedReceiver<Envelope>,
}

impl BridgeReceiver {
    /// Take everything currently queued, in FIFO order. Never waits.
    pub fn drain(&mut self) -> Vec<Envelope> {
        let mut out = Vec::new();
        while let Some(envelope) = self.try_next() {
            out.push(envelope);
        }
        out
    }

    /// Next live envelope, or None if the queue is empty right now
    pub fn try_next(&mut self) -> Option<Envelope> {
        loop {
            match self.rx.try_recv() {
                Ok(envelope) if envelope.is_discarded() => continue,
                Ok(envelope) => return Some(envelope),
                Err(_) => return None,
            }
        }
    }

    /// Wait for the next live envelope. For headless consumers and tests;
    /// the UI loop uses [`drain`](Self::drain).
    pub async fn recv(&mut self) -> Option<Envelope> {
        loop {
            let envelope = self.rx.recv().await?;
            if !envelope.is_discarded() {
                return Some(envelope);
            }
        }
    }
}
