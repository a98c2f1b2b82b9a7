//! # Nearcast Testing
//!
//! In-memory fakes for the pipeline's environment traits, plus event
//! builders for concise test setup.
//!
//! The fakes are deliberately observable: the bus records everything
//! published per topic, the sink captures every stored notification, and the
//! generator counts its calls, so tests assert on behavior instead of wiring
//! their own instrumentation.
//!
//! ## Example
//!
//! ```
//! use nearcast_testing::builders::LocationEventBuilder;
//!
//! let event = LocationEventBuilder::new(42)
//!     .position(45.4642, 9.19)
//!     .profession("architect")
//!     .build();
//! assert_eq!(event.user_id, 42);
//! ```

pub mod builders;
pub mod mocks;

pub use builders::{LocationEventBuilder, ProximityEventBuilder, test_timestamp};
pub use mocks::{CapturingSink, InMemoryEventBus, ScriptedGenerator, StaticSpatialIndex};
