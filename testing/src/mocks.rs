//! In-memory fakes for the environment traits.

use nearcast_core::bus::{BusError, EventBus, EventStream, WireEvent};
use nearcast_core::environment::{
    AnalyticsSink, GeneratedReply, GeneratorRequest, MessageGenerator, NearbyShop, SpatialIndex,
};
use nearcast_core::error::{GeneratorError, SinkError, SpatialError};
use nearcast_core::events::NotificationEvent;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use tokio::sync::mpsc;

/// In-process event bus that records every publish.
///
/// Subscriptions receive events published after the subscribe call, like a
/// consumer group starting at the latest offset.
#[derive(Default)]
pub struct InMemoryEventBus {
    topics: Mutex<HashMap<String, TopicState>>,
}

#[derive(Default)]
struct TopicState {
    published: Vec<WireEvent>,
    subscribers: Vec<mpsc::UnboundedSender<Result<WireEvent, BusError>>>,
}

impl InMemoryEventBus {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything published to `topic`, in publish order.
    #[must_use]
    pub fn published(&self, topic: &str) -> Vec<WireEvent> {
        let topics = self
            .topics
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        topics
            .get(topic)
            .map(|state| state.published.clone())
            .unwrap_or_default()
    }

    /// Number of events published to `topic`.
    #[must_use]
    pub fn published_count(&self, topic: &str) -> usize {
        let topics = self
            .topics
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        topics.get(topic).map_or(0, |state| state.published.len())
    }
}

impl EventBus for InMemoryEventBus {
    fn publish(
        &self,
        topic: &str,
        event: &WireEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), BusError>> + Send + '_>> {
        let topic = topic.to_string();
        let event = event.clone();
        Box::pin(async move {
            let mut topics = self
                .topics
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let state = topics.entry(topic).or_default();
            state.published.push(event.clone());
            state
                .subscribers
                .retain(|tx| tx.send(Ok(event.clone())).is_ok());
            Ok(())
        })
    }

    fn subscribe(
        &self,
        topics: &[&str],
    ) -> Pin<Box<dyn Future<Output = Result<EventStream, BusError>> + Send + '_>> {
        let topics: Vec<String> = topics.iter().map(|s| (*s).to_string()).collect();
        Box::pin(async move {
            let (tx, mut rx) = mpsc::unbounded_channel();
            {
                let mut map = self
                    .topics
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                for topic in topics {
                    map.entry(topic).or_default().subscribers.push(tx.clone());
                }
            }

            let stream = async_stream::stream! {
                while let Some(result) = rx.recv().await {
                    yield result;
                }
            };
            Ok(Box::pin(stream) as EventStream)
        })
    }
}

/// Spatial index answering from a fixed shop list.
///
/// Honors the real contract: results are filtered by radius, sorted by
/// ascending distance and capped at 10. Can be switched into failure mode to
/// exercise the degraded path.
pub struct StaticSpatialIndex {
    shops: Vec<NearbyShop>,
    failing: AtomicBool,
    lookups: AtomicUsize,
}

impl StaticSpatialIndex {
    /// Create an index serving `shops`.
    #[must_use]
    pub fn new(shops: Vec<NearbyShop>) -> Self {
        Self {
            shops,
            failing: AtomicBool::new(false),
            lookups: AtomicUsize::new(0),
        }
    }

    /// Make every subsequent lookup fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of lookups served, including failed ones.
    #[must_use]
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

impl SpatialIndex for StaticSpatialIndex {
    fn find_nearby(
        &self,
        _latitude: f64,
        _longitude: f64,
        radius_m: f64,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<NearbyShop>, SpatialError>> + Send + '_>> {
        Box::pin(async move {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            if self.failing.load(Ordering::SeqCst) {
                return Err(SpatialError::Lookup("index unavailable".into()));
            }
            let mut shops: Vec<NearbyShop> = self
                .shops
                .iter()
                .filter(|shop| shop.distance <= radius_m)
                .cloned()
                .collect();
            shops.sort_by(|a, b| a.distance.total_cmp(&b.distance));
            shops.truncate(10);
            Ok(shops)
        })
    }
}

/// Generator answering from a scripted reply queue.
///
/// Each call pops the next reply; an exhausted script fails the call, which
/// drives the caller onto the fallback path.
#[derive(Default)]
pub struct ScriptedGenerator {
    replies: Mutex<VecDeque<Result<String, String>>>,
    calls: AtomicUsize,
}

impl ScriptedGenerator {
    /// Create a generator with an empty script (every call fails).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful reply.
    pub fn push_reply(&self, message: impl Into<String>) {
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(Ok(message.into()));
    }

    /// Queue a failure.
    pub fn push_failure(&self, reason: impl Into<String>) {
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(Err(reason.into()));
    }

    /// Number of generation calls received.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl MessageGenerator for ScriptedGenerator {
    fn generate(
        &self,
        _request: &GeneratorRequest,
    ) -> Pin<Box<dyn Future<Output = Result<GeneratedReply, GeneratorError>> + Send + '_>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self
                .replies
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pop_front();
            match next {
                Some(Ok(message)) => Ok(GeneratedReply {
                    message,
                    cached: false,
                }),
                Some(Err(reason)) => Err(GeneratorError::RequestFailed(reason)),
                None => Err(GeneratorError::RequestFailed("script exhausted".into())),
            }
        })
    }
}

/// Analytics sink capturing every stored notification.
#[derive(Default)]
pub struct CapturingSink {
    stored: Mutex<Vec<NotificationEvent>>,
    failing: AtomicBool,
}

impl CapturingSink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Everything stored so far, in write order.
    #[must_use]
    pub fn stored(&self) -> Vec<NotificationEvent> {
        self.stored
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl AnalyticsSink for CapturingSink {
    fn store_notification(
        &self,
        event: &NotificationEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), SinkError>> + Send + '_>> {
        let event = event.clone();
        Box::pin(async move {
            if self.failing.load(Ordering::SeqCst) {
                return Err(SinkError::Write("sink unavailable".into()));
            }
            self.stored
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(event);
            Ok(())
        })
    }
}
