//! Client for a running slice-map server: submit, poll, download.

use anyhow::{anyhow, bail, Context, Result};
use reqwest::header::LOCATION;
use std::path::Path;
use std::time::{Duration, Instant};

use crate::server::api::{CreateMapRequest, QueueState, QueueStatusResponse};

pub struct MapClient {
    client: reqwest::Client,
    server: String,
    poll_interval: Duration,
}

impl MapClient {
    pub fn new(server: impl Into<String>, poll_interval: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("slice-map/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            server: server.into().trim_end_matches('/').to_string(),
            poll_interval,
        })
    }

    /// Resolve a `Location` header against the server URL
    fn absolute(&self, location: &str) -> String {
        if location.starts_with("http://") || location.starts_with("https://") {
            location.to_string()
        } else {
            format!("{}{}", self.server, location)
        }
    }

    fn location(response: &reqwest::Response) -> Result<String> {
        response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| anyhow!("Response from {} has no Location header", response.url()))
    }

    /// Submit a map request; returns the status URL to poll.
    pub async fn submit(&self, request: &CreateMapRequest) -> Result<String> {
        let url = format!("{}/maps", self.server);
        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .with_context(|| format!("Failed to reach {}", url))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("Map request rejected with {}: {}", status, body);
        }

        Ok(self.absolute(&Self::location(&response)?))
    }

    /// Poll until the job is done; returns the tile base URL.
    pub async fn wait(&self, status_url: &str, timeout: Option<Duration>) -> Result<String> {
        let started = Instant::now();

        loop {
            let response = self
                .client
                .get(status_url)
                .send()
                .await?
                .error_for_status()?;
            let location = Self::location(&response).ok();
            let status: QueueStatusResponse = response.json().await?;

            match status.status {
                QueueState::Done => {
                    let location = location
                        .ok_or_else(|| anyhow!("Job finished without a tile location"))?;
                    return Ok(self.absolute(&location));
                }
                QueueState::Failed => {
                    bail!(
                        "Job failed: {}",
                        status.error.unwrap_or_else(|| "unknown error".to_string())
                    );
                }
                QueueState::Running => {}
            }

            if let Some(limit) = timeout {
                if started.elapsed() > limit {
                    bail!(
                        "Gave up waiting after {}",
                        humantime::format_duration(limit)
                    );
                }
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Download one tile to `output`; returns the number of bytes written.
    pub async fn download(&self, tiles_url: &str, subset: u32, output: &Path) -> Result<usize> {
        let url = format!("{}/{}", tiles_url, subset);
        let bytes = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()
            .with_context(|| format!("Tile {} is not available", subset))?
            .bytes()
            .await?;

        tokio::fs::write(output, &bytes)
            .await
            .with_context(|| format!("Failed to write {}", output.display()))?;

        Ok(bytes.len())
    }
}
