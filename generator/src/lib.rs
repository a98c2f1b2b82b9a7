//! # Nearcast Generator
//!
//! Client side of the external natural-language message generation service.
//!
//! Two layers:
//!
//! - [`HttpMessageGenerator`] - the raw HTTP client (10 s timeout, typed
//!   request/response, status-matched errors).
//! - [`MessageResolver`] - what the notification stage actually calls: cache
//!   lookup first, then the generator, then the deterministic local
//!   [`fallback_message`]. Resolution never fails; a generator outage
//!   degrades to the fallback text, never to a lost notification.

pub mod client;
pub mod resolver;

pub use client::HttpMessageGenerator;
pub use resolver::{MessageResolver, ResolvedMessage, cache_key, fallback_message};
