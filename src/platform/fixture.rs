//! In-memory transport for pipeline tests

use crate::error::TransportError;
use crate::platform::client::Transport;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Clone)]
enum Fixture {
    Body(Vec<u8>),
    Status(u16),
}

/// Serves canned bodies by exact URL and records every request.
/// Unknown URLs answer 404.
#[derive(Debug, Default)]
pub struct FixtureTransport {
    fixtures: HashMap<String, Fixture>,
    requests: Mutex<Vec<String>>,
}

impl FixtureTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_text(mut self, url: impl Into<String>, body: impl Into<String>) -> Self {
        self.fixtures
            .insert(url.into(), Fixture::Body(body.into().into_bytes()));
        self
    }

    pub fn with_bytes(mut self, url: impl Into<String>, body: Vec<u8>) -> Self {
        self.fixtures.insert(url.into(), Fixture::Body(body));
        self
    }

    pub fn with_status(mut self, url: impl Into<String>, status: u16) -> Self {
        self.fixtures.insert(url.into(), Fixture::Status(status));
        self
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Number of requests whose URL starts with `prefix`
    pub fn count(&self, prefix: &str) -> usize {
        self.requests()
            .iter()
            .filter(|url| url.starts_with(prefix))
            .count()
    }

    fn lookup(&self, url: &str) -> Result<&[u8], TransportError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(url.to_string());
        }
        match self.fixtures.get(url) {
            Some(Fixture::Body(body)) => Ok(body),
            Some(Fixture::Status(status)) => Err(TransportError::Status {
                status: *status,
                url: url.to_string(),
            }),
            None => Err(TransportError::Status {
                status: 404,
                url: url.to_string(),
            }),
        }
    }
}

#[async_trait]
impl Transport for FixtureTransport {
    async fn fetch_text(&self, url: &str) -> Result<String, TransportError> {
        let body = self.lookup(url)?;
        Ok(String::from_utf8_lossy(body).into_owned())
    }

    async fn fetch_bytes_range(
        &self,
        url: &str,
        offset: u64,
        length: u64,
    ) -> Result<Vec<u8>, TransportError> {
        let body = self.lookup(url)?;
        let start = (offset as usize).min(body.len());
        let end = start.saturating_add(length as usize).min(body.len());
        Ok(body[start..end].to_vec())
    }

    async fn content_length(&self, url: &str) -> Result<Option<u64>, TransportError> {
        Ok(Some(self.lookup(url)?.len() as u64))
    }
}
