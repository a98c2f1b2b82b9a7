//! Cache-backed message resolution with local fallback.

use nearcast_core::cache::Cache;
use nearcast_core::environment::{GeneratorRequest, MessageGenerator};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

/// Deterministic local substitute for an unreachable generator.
#[must_use]
pub fn fallback_message(shop_name: &str) -> String {
    format!("You are near {shop_name}! Stop by and take a look.")
}

/// Stable cache key for a (user attributes, place attributes) pair.
///
/// Plain field concatenation rather than a hash: keys stay debuggable in
/// `redis-cli`, and the same pair must map to the same key from every
/// pipeline instance.
#[must_use]
pub fn cache_key(request: &GeneratorRequest) -> String {
    format!(
        "msg:{}:{}:{}:{}:{}:{}",
        request.user.age,
        request.user.profession,
        request.user.interests,
        request.poi.name,
        request.poi.category,
        request.poi.description,
    )
}

/// Outcome of one resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedMessage {
    /// The message text; never empty.
    pub message: String,
    /// Whether the text came from the cache.
    pub from_cache: bool,
    /// Generator call latency in milliseconds; 0 on cache hits.
    pub generation_time_ms: f64,
    /// Whether the local fallback was substituted for a failed call.
    pub used_fallback: bool,
}

/// Resolves generation requests through the cache.
///
/// Order: cache hit → cached text; miss → generator call, result stored with
/// the configured TTL; call failure (transport, timeout, non-2xx, bad body)
/// → [`fallback_message`]. A cache backend failure is logged and treated as
/// a miss on read and a no-op on write, so the cache is never load-bearing.
pub struct MessageResolver {
    generator: Arc<dyn MessageGenerator>,
    cache: Arc<dyn Cache>,
    ttl: Duration,
}

impl MessageResolver {
    /// Create a resolver storing generated messages with `ttl`.
    #[must_use]
    pub fn new(generator: Arc<dyn MessageGenerator>, cache: Arc<dyn Cache>, ttl: Duration) -> Self {
        Self {
            generator,
            cache,
            ttl,
        }
    }

    /// Resolve a message for the request. Infallible by design: the worst
    /// outcome is the fallback text.
    pub async fn resolve(&self, request: &GeneratorRequest) -> ResolvedMessage {
        let key = cache_key(request);

        match self.cache.get(&key).await {
            Ok(Some(message)) => {
                return ResolvedMessage {
                    message,
                    from_cache: true,
                    generation_time_ms: 0.0,
                    used_fallback: false,
                };
            },
            Ok(None) => {},
            Err(e) => {
                warn!(error = %e, "cache read failed, treating as miss");
            },
        }

        let started = Instant::now();
        match self.generator.generate(request).await {
            Ok(reply) => {
                let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
                if let Err(e) = self.cache.set(&key, &reply.message, self.ttl).await {
                    warn!(error = %e, "cache write failed, continuing without caching");
                }
                ResolvedMessage {
                    message: reply.message,
                    from_cache: false,
                    generation_time_ms: elapsed_ms,
                    used_fallback: false,
                }
            },
            Err(e) => {
                let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
                warn!(
                    error = %e,
                    shop = %request.poi.name,
                    "message generation failed, using fallback"
                );
                ResolvedMessage {
                    message: fallback_message(&request.poi.name),
                    from_cache: false,
                    generation_time_ms: elapsed_ms,
                    used_fallback: true,
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code

    use super::*;
    use nearcast_cache::MemoryCache;
    use nearcast_core::environment::{GeneratedReply, PoiAttributes, UserAttributes};
    use nearcast_core::error::GeneratorError;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubGenerator {
        reply: Result<&'static str, ()>,
        calls: AtomicUsize,
    }

    impl StubGenerator {
        fn succeeding(message: &'static str) -> Self {
            Self {
                reply: Ok(message),
                calls: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                reply: Err(()),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl MessageGenerator for StubGenerator {
        fn generate(
            &self,
            _request: &GeneratorRequest,
        ) -> Pin<Box<dyn Future<Output = Result<GeneratedReply, GeneratorError>> + Send + '_>>
        {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let reply = self.reply;
            Box::pin(async move {
                match reply {
                    Ok(message) => Ok(GeneratedReply {
                        message: message.to_string(),
                        cached: false,
                    }),
                    Err(()) => Err(GeneratorError::RequestFailed("connection refused".into())),
                }
            })
        }
    }

    fn request() -> GeneratorRequest {
        GeneratorRequest {
            user: UserAttributes {
                age: 30,
                profession: "engineer".into(),
                interests: "tech,travel".into(),
            },
            poi: PoiAttributes {
                name: "Café Milano".into(),
                category: "bar".into(),
                description: "Shop 50m away".into(),
            },
        }
    }

    #[test]
    fn cache_key_is_stable_and_attribute_sensitive() {
        let a = cache_key(&request());
        let b = cache_key(&request());
        assert_eq!(a, b);

        let mut other = request();
        other.poi.name = "Libreria Dante".into();
        assert_ne!(a, cache_key(&other));
    }

    #[test]
    fn fallback_text_is_deterministic() {
        assert_eq!(
            fallback_message("Café Milano"),
            "You are near Café Milano! Stop by and take a look."
        );
    }

    #[tokio::test]
    async fn miss_then_hit_round_trip() {
        let generator = Arc::new(StubGenerator::succeeding("Fresh espresso nearby!"));
        let resolver = MessageResolver::new(
            Arc::clone(&generator) as Arc<dyn MessageGenerator>,
            Arc::new(MemoryCache::new()),
            Duration::from_secs(60),
        );

        let first = resolver.resolve(&request()).await;
        assert_eq!(first.message, "Fresh espresso nearby!");
        assert!(!first.from_cache);
        assert!(!first.used_fallback);

        let second = resolver.resolve(&request()).await;
        assert_eq!(second.message, "Fresh espresso nearby!");
        assert!(second.from_cache);
        assert_eq!(second.generation_time_ms, 0.0);
        // The generator was only consulted once.
        assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failure_resolves_to_fallback_without_caching() {
        let cache = Arc::new(MemoryCache::new());
        let resolver = MessageResolver::new(
            Arc::new(StubGenerator::failing()),
            Arc::clone(&cache) as Arc<dyn Cache>,
            Duration::from_secs(60),
        );

        let resolved = resolver.resolve(&request()).await;
        assert!(resolved.used_fallback);
        assert!(!resolved.from_cache);
        assert_eq!(
            resolved.message,
            "You are near Café Milano! Stop by and take a look."
        );
        // Fallback text is never cached: the next resolution retries the call.
        assert_eq!(cache.get(&cache_key(&request())).await.unwrap(), None);
    }
}
