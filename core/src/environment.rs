//! Environment traits for the pipeline's external collaborators.
//!
//! All external dependencies are abstracted behind traits and injected into
//! the stages, so production adapters (PostGIS, the generation service, the
//! analytics store) and in-memory fakes are interchangeable.
//!
//! The traits use explicit `Pin<Box<dyn Future>>` returns instead of
//! `async fn` so they can be held as trait objects (`Arc<dyn SpatialIndex>`
//! and friends) by the stages.

use crate::error::{GeneratorError, SinkError, SpatialError};
use crate::events::NotificationEvent;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;

/// One row returned by a spatial lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NearbyShop {
    /// Shop identifier.
    pub shop_id: i64,
    /// Display name.
    pub shop_name: String,
    /// Shop category.
    pub category: String,
    /// Distance from the queried position, meters.
    pub distance: f64,
}

/// Geospatial "shops near a position" lookup.
///
/// Implementations return shops within `radius_m` meters of the position,
/// ordered by ascending distance and capped at 10 results.
pub trait SpatialIndex: Send + Sync {
    /// Find shops within `radius_m` meters of (`latitude`, `longitude`).
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError::Lookup`] if the index is unreachable or the
    /// query fails. Callers treat this as transient and degrade to an empty
    /// result.
    fn find_nearby(
        &self,
        latitude: f64,
        longitude: f64,
        radius_m: f64,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<NearbyShop>, SpatialError>> + Send + '_>>;
}

/// User profile attributes sent to the generation service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserAttributes {
    /// User age.
    pub age: u32,
    /// User profession.
    pub profession: String,
    /// Free-text interests.
    pub interests: String,
}

/// Point-of-interest attributes sent to the generation service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoiAttributes {
    /// Shop display name.
    pub name: String,
    /// Shop category.
    pub category: String,
    /// Distance-derived description shown to the model.
    pub description: String,
}

/// Request body for the external message generation service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratorRequest {
    /// Profile attributes for personalization.
    pub user: UserAttributes,
    /// The place the message is about.
    pub poi: PoiAttributes,
}

/// Response from the external message generation service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedReply {
    /// The generated message text.
    pub message: String,
    /// Whether the service answered from its own cache.
    #[serde(default)]
    pub cached: bool,
}

/// Client for the external natural-language message generation service.
pub trait MessageGenerator: Send + Sync {
    /// Generate a personalized message for a (user, place) pair.
    ///
    /// # Errors
    ///
    /// Returns [`GeneratorError`] on transport failure, timeout, non-2xx
    /// status or an unparseable body. Callers fall back to a deterministic
    /// local message.
    fn generate(
        &self,
        request: &GeneratorRequest,
    ) -> Pin<Box<dyn Future<Output = Result<GeneratedReply, GeneratorError>> + Send + '_>>;
}

/// Durable, append-only sink for notification records.
pub trait AnalyticsSink: Send + Sync {
    /// Persist one notification record.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Write`] if the write fails; the caller logs,
    /// counts and drops the record (no retry queue).
    fn store_notification(
        &self,
        event: &NotificationEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), SinkError>> + Send + '_>>;
}
