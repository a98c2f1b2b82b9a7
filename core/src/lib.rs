//! # Nearcast Core
//!
//! Core types and traits for the Nearcast proximity-notification pipeline.
//!
//! This crate defines the shared vocabulary of the system:
//!
//! - **Events**: the records that flow between stages ([`events`])
//! - **State**: the per-key mutable state that survives across events ([`state`])
//! - **Environment**: traits for every external collaborator ([`environment`], [`cache`])
//! - **Transport**: the [`bus::EventBus`] abstraction over the event broker
//! - **Errors**: the stage-level failure taxonomy ([`error`])
//!
//! ## Architecture
//!
//! ```text
//! gps_stream ──▶ Location Stage ──▶ shop_proximity_events ──▶ Notification Stage
//!                     │                                              │
//!                     ▼                                              ├─▶ notification_events ─▶ Analytics Stage ─▶ sink
//!                 UserState                                          └─▶ analytics_events ────▶ Analytics Stage ─▶ SystemStats
//! ```
//!
//! Stages never call each other directly: each consumes its input channel and
//! produces its output channels. All state is addressed per key through the
//! store crate; all external I/O goes through the traits defined here so that
//! stages are backend-agnostic and testable with in-memory fakes.

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};

pub mod bus;
pub mod cache;
pub mod environment;
pub mod error;
pub mod events;
pub mod state;

pub use bus::{BusError, EventBus, EventStream, WireEvent};
pub use cache::{Cache, CacheError, CacheInfo};
pub use environment::{
    AnalyticsSink, GeneratedReply, GeneratorRequest, MessageGenerator, NearbyShop, PoiAttributes,
    SpatialIndex, UserAttributes,
};
pub use error::{ErrorCategory, GeneratorError, SinkError, SpatialError, StageError};
pub use events::{AnalyticsEvent, AnalyticsKind, LocationEvent, NotificationEvent, ShopProximityEvent};
pub use state::{PositionSample, ShopStats, SystemStats, UserState};
