use std::future::Future;

use anyhow::{Context, Result};
use rand::seq::SliceRandom;
use reqwest::{Client, StatusCode};
use tracing::debug;

use super::requester::{FailureKind, QueryParams};
use crate::config::ApiConfig;

/// Browser identities picked from at random for every new session
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_4_1) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4.1 Safari/605.1.15",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Ubuntu; Linux x86_64; rv:124.0) Gecko/20100101 Firefox/124.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36 Edg/124.0.2478.80",
];

fn random_user_agent() -> &'static str {
    USER_AGENTS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(USER_AGENTS[0])
}

/// What came back from one GET
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: StatusCode,
    /// Only read for successful statuses
    pub body: Vec<u8>,
}

/// A request that never produced a response
#[derive(Debug, Clone)]
pub struct TransportError {
    pub kind: FailureKind,
    pub message: String,
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            FailureKind::Timeout
        } else if err.is_connect() {
            FailureKind::Connect
        } else {
            FailureKind::Transport
        };
        Self {
            kind,
            message: err.to_string(),
        }
    }
}

/// Something that can issue a GET with query parameters
pub trait Transport {
    fn get(
        &self,
        url: &str,
        params: &QueryParams,
    ) -> impl Future<Output = Result<Reply, TransportError>> + Send;
}

// RAII (Resource Acquisition Is Initialization)
// One session backs one logical operation. When it is dropped the client and
// its pooled connections go with it.
pub struct Session {
    client: Option<Client>,
    user_agent: &'static str,
}

impl Session {
    pub fn open(config: &ApiConfig) -> Result<Self> {
        let user_agent = random_user_agent();
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(config.request_timeout())
            .build()
            .context("Failed to create HTTP client for GOGDB session")?;

        Ok(Session {
            client: Some(client),
            user_agent,
        })
    }

    pub fn user_agent(&self) -> &str {
        self.user_agent
    }
}

impl Transport for Session {
    fn get(
        &self,
        url: &str,
        params: &QueryParams,
    ) -> impl Future<Output = Result<Reply, TransportError>> + Send {
        let request = self
            .client
            .as_ref()
            .map(|client| client.get(url).query(params.pairs()));

        async move {
            let request = request.ok_or_else(|| TransportError {
                kind: FailureKind::Transport,
                message: "session already released".to_string(),
            })?;
            let response = request.send().await?;
            let status = response.status();
            let body = if status.is_success() {
                response.bytes().await?.to_vec()
            } else {
                Vec::new()
            };
            Ok::<Reply, TransportError>(Reply { status, body })
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(client) = self.client.take() {
            drop(client); // Closes pooled connections
            debug!(user_agent = self.user_agent, "Released GOGDB session");
        }
    }
}
