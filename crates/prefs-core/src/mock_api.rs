//! Canned stand-in for the remote user API, for local development.
//!
//! Every request answers with the same fixture after a fixed delay. Responses
//! are delivered on one dedicated runtime thread; requests are fire-and-forget
//! and cannot be cancelled, and concurrent requests may complete in any order.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::runtime::{Builder, Runtime};

pub const MOCK_DELAY: Duration = Duration::from_millis(200);

/// Identifier carried by the canned response.
pub const CANNED_SAMPLE_ID: &str = "123";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blog: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_refresh: Option<DateTime<Utc>>,
}

impl Sample {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            login: None,
            avatar_url: None,
            name: None,
            company: None,
            blog: None,
            last_refresh: None,
        }
    }

    pub fn canned() -> Self {
        Self::new(CANNED_SAMPLE_ID)
    }
}

pub struct MockApi {
    runtime: Option<Runtime>,
    delay: Duration,
}

impl MockApi {
    pub fn new() -> std::io::Result<Self> {
        Self::with_delay(MOCK_DELAY)
    }

    pub fn with_delay(delay: Duration) -> std::io::Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("mock-api")
            .enable_time()
            .build()?;
        Ok(Self {
            runtime: Some(runtime),
            delay,
        })
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Answer `user_id` through `callback` once the delay has passed.
    pub fn fetch_sample<F>(&self, user_id: &str, callback: F)
    where
        F: FnOnce(Sample) + Send + 'static,
    {
        let Some(runtime) = self.runtime.as_ref() else {
            return;
        };
        let delay = self.delay;
        tracing::debug!(user_id, "mock fetch queued");
        runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            callback(Sample::canned());
        });
    }

    /// Awaitable form of [`fetch_sample`](Self::fetch_sample). `None` only if
    /// the mock runtime shut down before answering.
    pub async fn fetch_sample_async(&self, user_id: &str) -> Option<Sample> {
        let runtime = self.runtime.as_ref()?;
        let delay = self.delay;
        tracing::debug!(user_id, "mock fetch queued");
        let handle = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            Sample::canned()
        });
        handle.await.ok()
    }
}

impl Drop for MockApi {
    fn drop(&mut self) {
        // Safe to drop from inside another runtime.
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}
