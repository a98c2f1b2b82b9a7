//! Broker readiness probe used at service startup.

use nearcast_core::bus::BusError;
use rand::Rng;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{BaseConsumer, Consumer};
use rdkafka::util::Timeout;
use std::time::Duration;
use tokio::time::sleep;

/// Delay before the first retry.
const INITIAL_DELAY: Duration = Duration::from_millis(500);

/// Cap on the backoff between retries.
const MAX_DELAY: Duration = Duration::from_secs(10);

/// Block until the Kafka broker answers a metadata request, retrying with
/// exponential backoff plus jitter.
///
/// In container deployments the pipeline regularly comes up before the
/// broker; this keeps startup quiet instead of failing the first subscribe.
///
/// # Errors
///
/// Returns [`BusError::ConnectionFailed`] once `max_attempts` probes have
/// failed.
pub async fn wait_for_broker(brokers: &str, max_attempts: usize) -> Result<(), BusError> {
    let mut last_error = String::new();

    for attempt in 0..max_attempts {
        match probe(brokers).await {
            Ok(()) => {
                tracing::info!(brokers = %brokers, attempt = attempt + 1, "Broker is reachable");
                return Ok(());
            },
            Err(reason) => {
                last_error = reason;
                let backoff = INITIAL_DELAY
                    .saturating_mul(2_u32.saturating_pow(u32::try_from(attempt).unwrap_or(u32::MAX)))
                    .min(MAX_DELAY);
                let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..250));
                tracing::warn!(
                    brokers = %brokers,
                    attempt = attempt + 1,
                    max_attempts = max_attempts,
                    delay = ?(backoff + jitter),
                    error = %last_error,
                    "Broker not ready, retrying"
                );
                sleep(backoff + jitter).await;
            },
        }
    }

    Err(BusError::ConnectionFailed(format!(
        "broker at {brokers} not reachable after {max_attempts} attempts: {last_error}"
    )))
}

/// One metadata round-trip against the broker.
async fn probe(brokers: &str) -> Result<(), String> {
    let brokers = brokers.to_string();
    tokio::task::spawn_blocking(move || {
        let consumer: BaseConsumer = ClientConfig::new()
            .set("bootstrap.servers", &brokers)
            .create()
            .map_err(|e| e.to_string())?;
        consumer
            .fetch_metadata(None, Timeout::After(Duration::from_secs(3)))
            .map_err(|e| e.to_string())?;
        Ok(())
    })
    .await
    .map_err(|e| e.to_string())?
}
