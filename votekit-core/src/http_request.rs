use std::time::Duration;

use reqwest::{Method, RequestBuilder, Response};

use crate::gateway::GatewayError;

/// A simple wrapper on an HTTP client for making requests. Sets sensible
/// defaults such as timeouts, user-agent & ensuring HTTPS.
///
/// Requests are never retried automatically: every retry in the voting flow is
/// voter-initiated (re-submit the form, press resend, retake the photo).
pub struct Request {
    client: reqwest::Client,
    timeout: Duration,
}

impl Request {
    /// Initializes a new `Request` instance.
    pub(crate) fn new() -> Self {
        let client = reqwest::Client::new();
        let timeout = Duration::from_secs(10);
        Self { client, timeout }
    }

    /// Creates a request builder with defaults applied.
    pub(crate) fn req(&self, method: Method, url: &str) -> RequestBuilder {
        #[cfg(not(test))]
        assert!(url.starts_with("https"));

        self.client
            .request(method, url)
            .timeout(self.timeout)
            .header(
                "User-Agent",
                format!("votekit-core/{}", env!("CARGO_PKG_VERSION")),
            )
    }

    /// Creates a GET request builder with defaults applied.
    pub(crate) fn get(&self, url: &str) -> RequestBuilder {
        self.req(Method::GET, url)
    }

    /// Creates a POST request builder with defaults applied.
    pub(crate) fn post(&self, url: &str) -> RequestBuilder {
        self.req(Method::POST, url)
    }

    /// Sends a request built by `req`/`get`/`post`, mapping network-level
    /// failures to [`GatewayError::Transport`]. Responses with error statuses
    /// are returned as-is; the caller decodes the server's reason string.
    pub(crate) async fn handle(
        &self,
        request_builder: RequestBuilder,
    ) -> Result<Response, GatewayError> {
        let (client, request) = request_builder.build_split();
        let request = request.map_err(|err| GatewayError::Transport {
            url: err
                .url()
                .map_or_else(|| "<unknown>".to_string(), ToString::to_string),
            status: None,
            error: format!("request build failed: {err}"),
        })?;
        let url = request.url().to_string();

        client
            .execute(request)
            .await
            .map_err(|err| GatewayError::Transport {
                url,
                status: None,
                error: if err.is_timeout() {
                    format!("request timed out: {err}")
                } else if err.is_connect() {
                    format!("connection failed: {err}")
                } else {
                    format!("request failed: {err}")
                },
            })
    }
}
