//! Key-partitioned worker pool.
//!
//! Each stage runs as a pool of workers, each owning one partition of the
//! stage's input. Events are routed by hash of their partitioning key (the
//! user id), so all events for one key land on the same worker and are
//! processed strictly in arrival order; unrelated keys proceed in parallel.
//!
//! A handler failure never stops a worker: the error is logged, counted by
//! category, and the worker moves to the next event.

use crate::metrics::PipelineMetrics;
use nearcast_core::bus::WireEvent;
use nearcast_core::error::StageError;
use std::future::Future;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Per-event processing logic for one stage.
pub trait EventHandler: Send + Sync + 'static {
    /// Stage name, used as the metrics label and in logs.
    fn stage(&self) -> &'static str;

    /// Process one event to completion.
    ///
    /// # Errors
    ///
    /// Returns [`StageError`] when the event must be dropped; the worker
    /// counts the drop and continues with the next event.
    fn handle(
        &self,
        event: WireEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), StageError>> + Send + '_>>;
}

/// Pool of sequential workers, one per input partition.
pub struct PartitionedPool {
    senders: Vec<mpsc::Sender<WireEvent>>,
    handles: Vec<JoinHandle<()>>,
    stage: &'static str,
}

impl PartitionedPool {
    /// Spawn `workers` workers for `handler`, each with a `buffer`-slot
    /// input channel.
    ///
    /// # Panics
    ///
    /// Panics if `workers` or `buffer` is 0.
    #[must_use]
    pub fn spawn(
        handler: Arc<dyn EventHandler>,
        workers: usize,
        buffer: usize,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        assert!(workers > 0, "workers must be greater than 0");
        assert!(buffer > 0, "buffer must be greater than 0");

        let stage = handler.stage();
        let mut senders = Vec::with_capacity(workers);
        let mut handles = Vec::with_capacity(workers);

        for worker_id in 0..workers {
            let (tx, mut rx) = mpsc::channel::<WireEvent>(buffer);
            let handler = Arc::clone(&handler);
            let metrics = Arc::clone(&metrics);

            handles.push(tokio::spawn(async move {
                while let Some(event) = rx.recv().await {
                    match handler.handle(event).await {
                        Ok(()) => metrics.record_processed(stage),
                        Err(e) => {
                            tracing::warn!(
                                stage = stage,
                                worker = worker_id,
                                category = e.category().as_str(),
                                error = %e,
                                "Event dropped"
                            );
                            metrics.record_dropped(stage, e.category());
                        },
                    }
                }
                tracing::debug!(stage = stage, worker = worker_id, "Worker exiting");
            }));

            senders.push(tx);
        }

        Self {
            senders,
            handles,
            stage,
        }
    }

    /// Route an event to its partition's worker, awaiting channel capacity.
    ///
    /// Events without a key land on partition 0.
    ///
    /// # Errors
    ///
    /// Returns [`StageError::Transient`] if the worker has shut down.
    pub async fn dispatch(&self, event: WireEvent) -> Result<(), StageError> {
        let index = partition_for(event.key.as_deref(), self.senders.len());
        self.senders[index]
            .send(event)
            .await
            .map_err(|_| StageError::transient(self.stage, "worker channel closed"))
    }

    /// Number of workers.
    #[must_use]
    pub fn workers(&self) -> usize {
        self.senders.len()
    }

    /// Close the input channels and wait for every worker to drain.
    pub async fn shutdown(self) {
        drop(self.senders);
        for handle in self.handles {
            if let Err(e) = handle.await {
                tracing::error!(stage = self.stage, error = %e, "Worker task panicked");
            }
        }
        tracing::info!(stage = self.stage, "Pool drained");
    }
}

/// Stable partition choice for a key.
fn partition_for(key: Option<&str>, partitions: usize) -> usize {
    key.map_or(0, |key| {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() as usize) % partitions
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code

    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Records which worker saw which key, by tagging events per handler call.
    struct RecordingHandler {
        seen: Mutex<Vec<Option<String>>>,
        fail_on: Option<&'static str>,
    }

    impl EventHandler for RecordingHandler {
        fn stage(&self) -> &'static str {
            "recording"
        }

        fn handle(
            &self,
            event: WireEvent,
        ) -> Pin<Box<dyn Future<Output = Result<(), StageError>> + Send + '_>> {
            Box::pin(async move {
                if self.fail_on.is_some() && event.key.as_deref() == self.fail_on {
                    return Err(StageError::Malformed("poison event".into()));
                }
                self.seen
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner)
                    .push(event.key);
                Ok(())
            })
        }
    }

    fn event(key: &str) -> WireEvent {
        WireEvent {
            event_type: "Test".into(),
            payload: b"{}".to_vec(),
            key: Some(key.into()),
        }
    }

    #[test]
    fn same_key_always_maps_to_same_partition() {
        for partitions in [1, 2, 4, 8] {
            let first = partition_for(Some("42"), partitions);
            let second = partition_for(Some("42"), partitions);
            assert_eq!(first, second);
            assert!(first < partitions);
        }
        assert_eq!(partition_for(None, 8), 0);
    }

    #[tokio::test]
    async fn pool_processes_all_dispatched_events() {
        let handler = Arc::new(RecordingHandler {
            seen: Mutex::new(Vec::new()),
            fail_on: None,
        });
        let metrics = Arc::new(PipelineMetrics::new());
        let pool = PartitionedPool::spawn(Arc::clone(&handler) as _, 4, 16, Arc::clone(&metrics));

        for i in 0..20 {
            pool.dispatch(event(&i.to_string())).await.unwrap();
        }
        pool.shutdown().await;

        assert_eq!(handler.seen.lock().unwrap().len(), 20);
        assert_eq!(metrics.snapshot().events_processed, 20);
    }

    #[tokio::test]
    async fn handler_failure_is_counted_and_does_not_stop_the_worker() {
        let handler = Arc::new(RecordingHandler {
            seen: Mutex::new(Vec::new()),
            fail_on: Some("13"),
        });
        let metrics = Arc::new(PipelineMetrics::new());
        // One worker so the poison event and its successors share a lane.
        let pool = PartitionedPool::spawn(Arc::clone(&handler) as _, 1, 16, Arc::clone(&metrics));

        pool.dispatch(event("13")).await.unwrap();
        pool.dispatch(event("14")).await.unwrap();
        pool.dispatch(event("15")).await.unwrap();
        pool.shutdown().await;

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.dropped_malformed, 1);
        assert_eq!(snapshot.events_processed, 2);
        assert_eq!(handler.seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn dispatch_fails_after_shutdown_begins() {
        let handler = Arc::new(RecordingHandler {
            seen: Mutex::new(Vec::new()),
            fail_on: None,
        });
        let metrics = Arc::new(PipelineMetrics::new());
        let pool = PartitionedPool::spawn(handler as _, 2, 4, metrics);

        // Sanity: the pool accepts events while running.
        tokio::time::timeout(Duration::from_secs(1), pool.dispatch(event("1")))
            .await
            .expect("dispatch should not block")
            .unwrap();
        pool.shutdown().await;
    }
}
