//! Broadcast of successful public invocations.

use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use std::time::{SystemTime, UNIX_EPOCH};

use afw_operation::OperationDef;
use futures::Stream;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;

/// One completed public invocation.
#[derive(Debug, Clone)]
pub struct InvocationEvent {
    pub operation: Arc<OperationDef>,
    pub input: Value,
    pub output: Value,
    /// Wall-clock completion time, nanoseconds since the Unix epoch.
    pub timestamp_ns: u64,
    /// Publication order, starting at 1.
    pub seq: u64,
}

/// Fan-out of invocation events to every live subscriber.
///
/// Sequence numbers are assigned and events delivered under the same lock, so
/// every subscriber observes events in `seq` order.
#[derive(Default)]
pub(crate) struct InvocationBus {
    subscribers: Mutex<Vec<mpsc::UnboundedSender<InvocationEvent>>>,
    seq: AtomicU64,
}

impl InvocationBus {
    pub(crate) fn subscribe(&self) -> InvocationStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut subscribers = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        subscribers.push(tx);
        InvocationStream {
            rx,
            start_seq: self.seq.load(Ordering::SeqCst),
        }
    }

    pub(crate) fn publish(&self, operation: Arc<OperationDef>, input: Value, output: Value) -> u64 {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        let seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        let event = InvocationEvent {
            operation,
            input,
            output,
            timestamp_ns: now_wallclock_ns(),
            seq,
        };
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        debug!(
            operation = %event.operation.key(),
            seq,
            subscribers = subscribers.len(),
            "invocation published"
        );
        seq
    }

    pub(crate) fn subscriber_count(&self) -> usize {
        let subscribers = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        subscribers.iter().filter(|tx| !tx.is_closed()).count()
    }

    /// Sequence number of the most recent event, 0 if none.
    pub(crate) fn published(&self) -> u64 {
        self.seq.load(Ordering::SeqCst)
    }
}

/// Subscriber end of the invocation broadcast. Sees every event published
/// after it was created, in order; dropping it unsubscribes.
#[derive(Debug)]
pub struct InvocationStream {
    rx: mpsc::UnboundedReceiver<InvocationEvent>,
    start_seq: u64,
}

impl InvocationStream {
    /// Next event, or `None` once the invoker is gone.
    pub async fn recv(&mut self) -> Option<InvocationEvent> {
        self.rx.recv().await
    }

    /// Next already-published event, if any.
    pub fn try_recv(&mut self) -> Option<InvocationEvent> {
        self.rx.try_recv().ok()
    }

    /// Last sequence number published before this subscription.
    pub fn start_seq(&self) -> u64 {
        self.start_seq
    }
}

impl Stream for InvocationStream {
    type Item = InvocationEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

pub(crate) fn now_wallclock_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos() as u64)
        .unwrap_or_default()
}
