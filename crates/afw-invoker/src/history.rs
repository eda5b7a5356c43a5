//! Undo history built from the invocation stream.
//!
//! A background consumer records every public invocation that has an undo
//! mapping. `undo` replays the most recent entry's inverse through the
//! non-publishing path, so undoing never records new history.

use std::collections::VecDeque;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use afw_operation::builtins::{ShowUndoInput, show_undo};
use afw_operation::{InvokeError, InvokeOptions, OperationDef};
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::bus::{InvocationEvent, InvocationStream};
use crate::config::HistoryConfig;
use crate::followup::FollowupScheduler;
use crate::invoker::Invoker;
use crate::outcome::Outcome;
use crate::undo::UndoRegistry;

/// A completed undoable invocation plus the input that reverses it.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub operation: Arc<OperationDef>,
    pub input: Value,
    pub output: Value,
    pub inverse: Arc<OperationDef>,
    pub inverse_input: Value,
    pub timestamp_ns: u64,
    pub seq: u64,
}

type History = Arc<Mutex<VecDeque<HistoryEntry>>>;

fn lock(history: &History) -> MutexGuard<'_, VecDeque<HistoryEntry>> {
    history.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct HistoryTracker {
    invoker: Invoker,
    history: History,
    /// Highest event sequence number the consumer has handled.
    processed: watch::Receiver<u64>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl HistoryTracker {
    /// Subscribes to `invoker` and spawns the consumer on the current runtime.
    /// Only invocations completed after this call are tracked.
    pub fn start(
        invoker: &Invoker,
        registry: UndoRegistry,
        config: HistoryConfig,
    ) -> Result<Self, InvokeError> {
        let runtime = Handle::try_current().map_err(|_| InvokeError::NoRuntime)?;
        let stream = invoker.invocations();
        let history: History = Arc::new(Mutex::new(VecDeque::new()));
        let (processed_tx, processed_rx) = watch::channel(stream.start_seq());
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let consumer = Consumer {
            registry,
            history: history.clone(),
            followups: invoker.followups().clone(),
            config,
            processed: processed_tx,
        };
        info!(capacity = consumer.config.capacity, "history tracker started");
        let task = runtime.spawn(consumer.run(stream, shutdown_rx));

        Ok(Self {
            invoker: invoker.clone(),
            history,
            processed: processed_rx,
            shutdown: Some(shutdown_tx),
            task: Some(task),
        })
    }

    pub fn can_undo(&self) -> bool {
        !lock(&self.history).is_empty()
    }

    pub fn len(&self) -> usize {
        lock(&self.history).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.history).is_empty()
    }

    /// Oldest first.
    pub fn entries(&self) -> Vec<HistoryEntry> {
        lock(&self.history).iter().cloned().collect()
    }

    /// Resolves once every invocation published before this call has been
    /// handled by the consumer, or the consumer has stopped.
    pub async fn settled(&self) {
        let target = self.invoker.published();
        let mut processed = self.processed.clone();
        let _ = processed.wait_for(|seq| *seq >= target).await;
    }

    /// Reverts the most recent entry and returns the inverse's output.
    ///
    /// The entry is removed before the inverse runs; if the inverse fails the
    /// error is returned and the entry is not restored.
    pub async fn undo(&self) -> Result<Value, InvokeError> {
        self.settled().await;
        let entry = lock(&self.history)
            .pop_back()
            .ok_or(InvokeError::EmptyHistory)?;
        info!(
            operation = %entry.operation.key(),
            inverse = %entry.inverse.key(),
            seq = entry.seq,
            "undoing invocation"
        );
        self.invoker
            .invoke_core(entry.inverse, entry.inverse_input, InvokeOptions::default())
            .await
    }

    pub async fn undo_outcome(&self) -> Outcome<Value> {
        match self.undo().await {
            Ok(output) => Outcome::ok(output),
            Err(err) => {
                error!(error = %err, "undo failed");
                Outcome::err(err)
            }
        }
    }

    /// Stops the consumer and waits for it to exit.
    pub async fn shutdown(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                warn!(error = %err, "history consumer ended abnormally");
            }
        }
    }
}

impl Drop for HistoryTracker {
    fn drop(&mut self) {
        // Dropping the sender wakes the consumer's shutdown branch.
        self.shutdown.take();
    }
}

impl std::fmt::Debug for HistoryTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryTracker")
            .field("len", &self.len())
            .field("processed", &*self.processed.borrow())
            .finish_non_exhaustive()
    }
}

struct Consumer {
    registry: UndoRegistry,
    history: History,
    followups: FollowupScheduler,
    config: HistoryConfig,
    processed: watch::Sender<u64>,
}

impl Consumer {
    async fn run(self, mut stream: InvocationStream, mut shutdown: oneshot::Receiver<()>) {
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                event = stream.recv() => match event {
                    Some(event) => self.record(event),
                    None => break,
                },
            }
        }
        info!(entries = lock(&self.history).len(), "history tracker stopped");
    }

    /// Tracking is best-effort per event: a panicking mapping loses only
    /// that event.
    fn record(&self, event: InvocationEvent) {
        let seq = event.seq;
        let key = event.operation.key().clone();
        if catch_unwind(AssertUnwindSafe(|| self.track(event))).is_err() {
            warn!(operation = %key, seq, "undo mapping panicked; invocation not recorded");
        }
        self.processed.send_replace(seq);
    }

    fn track(&self, event: InvocationEvent) {
        let Some(mapping) = self.registry.lookup(&event.operation) else {
            return;
        };
        let Some(inverse_input) = mapping.derive_context(&event.input, &event.output) else {
            debug!(operation = %event.operation.key(), seq = event.seq, "invocation not undoable");
            return;
        };
        let message = if self.config.notify {
            mapping.message(&event.input, &event.output)
        } else {
            None
        };

        let entry = HistoryEntry {
            operation: event.operation,
            input: event.input,
            output: event.output,
            inverse: mapping.inverse().clone(),
            inverse_input,
            timestamp_ns: event.timestamp_ns,
            seq: event.seq,
        };
        {
            let mut history = lock(&self.history);
            debug!(operation = %entry.operation.key(), seq = entry.seq, "history entry recorded");
            history.push_back(entry);
            while history.len() > self.config.capacity {
                if let Some(evicted) = history.pop_front() {
                    debug!(operation = %evicted.operation.key(), seq = evicted.seq, "history entry evicted");
                }
            }
        }

        if let Some(message) = message {
            self.notify(message);
        }
    }

    fn notify(&self, message: String) {
        let op = show_undo();
        let scheduled = op
            .encode_input(&ShowUndoInput {
                message: Some(message),
            })
            .and_then(|input| self.followups.schedule(op.def().clone(), input));
        if let Err(err) = scheduled {
            warn!(error = %err, "failed to schedule undo notification");
        }
    }
}
