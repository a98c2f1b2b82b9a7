//! HTTP client for the message generation service.

use nearcast_core::environment::{GeneratedReply, GeneratorRequest, MessageGenerator};
use nearcast_core::error::GeneratorError;
use reqwest::{Client, StatusCode};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// Client-side timeout on generation calls. A slow generator falls through
/// to the fallback message rather than stalling the partition's worker.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP message generator client.
///
/// POSTs `{user: {age, profession, interests}, poi: {name, category,
/// description}}` and expects `{message, cached}` back. Any non-2xx status
/// is a generation failure.
#[derive(Clone)]
pub struct HttpMessageGenerator {
    client: Client,
    url: String,
}

impl HttpMessageGenerator {
    /// Create a client for the generation endpoint at `url`.
    ///
    /// # Errors
    ///
    /// Returns [`GeneratorError::RequestFailed`] if the underlying HTTP
    /// client cannot be constructed.
    pub fn new(url: impl Into<String>) -> Result<Self, GeneratorError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| GeneratorError::RequestFailed(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    /// The endpoint this client targets.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl MessageGenerator for HttpMessageGenerator {
    fn generate(
        &self,
        request: &GeneratorRequest,
    ) -> Pin<Box<dyn Future<Output = Result<GeneratedReply, GeneratorError>> + Send + '_>> {
        let request = request.clone();
        Box::pin(async move {
            let response = self
                .client
                .post(&self.url)
                .json(&request)
                .send()
                .await
                .map_err(|e| GeneratorError::RequestFailed(e.to_string()))?;

            match response.status() {
                StatusCode::OK => response
                    .json::<GeneratedReply>()
                    .await
                    .map_err(|e| GeneratorError::ResponseParseFailed(e.to_string())),
                status => {
                    let body = response.text().await.unwrap_or_default();
                    Err(GeneratorError::Api {
                        status: status.as_u16(),
                        message: body,
                    })
                },
            }
        })
    }
}
