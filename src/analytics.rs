//! Optional request analytics.
//!
//! Disabled unless `ANALYTICS_URL` is configured. When enabled, one JSON
//! event per request is posted from a detached task after the response has
//! been produced, so a slow or failing collector never affects callers.

use std::time::{Duration, Instant};

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

const ANALYTICS_TIMEOUT_SECS: u64 = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestEvent {
    pub method: String,
    pub path: String,
    pub status: u16,
    pub duration_ms: u64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Clone)]
pub struct AnalyticsHook {
    http: Client,
    endpoint: Url,
}

impl AnalyticsHook {
    pub fn new(endpoint: Url) -> Result<Self, reqwest::Error> {
        let http = Client::builder()
            .timeout(Duration::from_secs(ANALYTICS_TIMEOUT_SECS))
            .build()?;
        Ok(Self { http, endpoint })
    }

    /// Fire and forget.
    pub fn record(&self, event: RequestEvent) {
        let http = self.http.clone();
        let endpoint = self.endpoint.clone();

        tokio::spawn(async move {
            match http.post(endpoint).json(&event).send().await {
                Ok(resp) if !resp.status().is_success() => {
                    tracing::debug!("Analytics collector answered {}", resp.status());
                }
                Ok(_) => {}
                Err(e) => tracing::debug!("Analytics event dropped: {e}"),
            }
        });
    }
}

pub async fn track_requests(
    State(hook): State<AnalyticsHook>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let started = Instant::now();

    let response = next.run(request).await;

    hook.record(RequestEvent {
        method,
        path,
        status: response.status().as_u16(),
        duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        timestamp: Utc::now(),
    });

    response
}
