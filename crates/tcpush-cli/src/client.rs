//! HTTP implementations of the pushlog and graph ports.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tcpush_core::events::{Changeset, Push};
use tcpush_core::ports::{GraphFetcher, PushlogClient};
use tcpush_core::{Error, Result};
use tracing::debug;

fn http_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| Error::Internal(format!("HTTP client: {}", e)))
}

/// Fetches graph templates over HTTP.
pub struct HttpGraphFetcher {
    client: Client,
}

impl HttpGraphFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
        })
    }
}

#[async_trait]
impl GraphFetcher for HttpGraphFetcher {
    async fn fetch_graph(&self, url: &str) -> Result<String> {
        debug!(url, "Fetching graph");
        let res = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::Fetch(format!("{}: {}", url, e)))?;

        match res.status() {
            StatusCode::OK => res
                .text()
                .await
                .map_err(|e| Error::Fetch(format!("{}: {}", url, e))),
            StatusCode::NOT_FOUND => Err(Error::GraphNotFound(url.to_string())),
            status => Err(Error::Fetch(format!("{} returned {}", url, status))),
        }
    }
}

/// Reads pushes from a Mercurial `json-pushes` endpoint.
pub struct HgPushlogClient {
    client: Client,
}

#[derive(Debug, Deserialize)]
struct PushlogResponse {
    pushes: HashMap<String, PushlogEntry>,
}

#[derive(Debug, Deserialize)]
struct PushlogEntry {
    user: String,
    #[serde(default)]
    date: Option<i64>,
    changesets: Vec<Changeset>,
}

impl HgPushlogClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
        })
    }
}

#[async_trait]
impl PushlogClient for HgPushlogClient {
    async fn get_one(&self, repo_url: &str, pushlog_id: u64) -> Result<Push> {
        let url = format!("{}/json-pushes", repo_url.trim_end_matches('/'));
        let start = pushlog_id.saturating_sub(1).to_string();
        let end = pushlog_id.to_string();
        debug!(url = %url, pushlog_id, "Reading pushlog");

        let res = self
            .client
            .get(&url)
            .query(&[
                ("version", "2"),
                ("full", "1"),
                ("startID", start.as_str()),
                ("endID", end.as_str()),
            ])
            .send()
            .await
            .map_err(|e| Error::Pushlog(format!("{}: {}", url, e)))?;

        if res.status() != StatusCode::OK {
            return Err(Error::Pushlog(format!("{} returned {}", url, res.status())));
        }

        let mut body: PushlogResponse = res
            .json()
            .await
            .map_err(|e| Error::Pushlog(format!("{}: {}", url, e)))?;

        let entry = body
            .pushes
            .remove(&end)
            .ok_or_else(|| Error::Pushlog(format!("push {} not found in {}", pushlog_id, url)))?;

        Ok(Push {
            id: pushlog_id,
            user: entry.user,
            date: entry.date,
            changesets: entry.changesets,
        })
    }
}
