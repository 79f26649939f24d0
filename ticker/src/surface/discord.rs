use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument, warn};

use crate::error::RenameError;
use crate::surface::SurfaceRenamer;

#[derive(Deserialize)]
struct Channel {
    name: Option<String>,
}

#[derive(Deserialize)]
struct RateLimitBody {
    retry_after: Option<f64>,
}

/// Renames voice channels through the Discord REST API.
///
/// Only `GET` and `PATCH /channels/{id}` are used; the group id is carried for
/// logging since channel ids are globally unique.
pub struct DiscordChannelRenamer {
    http: Client,
    api_base: String,
    token: String,
}

impl DiscordChannelRenamer {
    pub fn new(api_base: &str, token: String, timeout: Duration) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build discord http client")?;

        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn channel_url(&self, surface_id: &str) -> String {
        format!("{}/channels/{}", self.api_base, surface_id)
    }

    fn auth(&self) -> String {
        format!("Bot {}", self.token)
    }
}

#[async_trait]
impl SurfaceRenamer for DiscordChannelRenamer {
    #[instrument(skip(self), level = "debug")]
    async fn current_name(
        &self,
        group_id: &str,
        surface_id: &str,
    ) -> Result<Option<String>, RenameError> {
        let resp = self
            .http
            .get(self.channel_url(surface_id))
            .header("Authorization", self.auth())
            .send()
            .await?;

        match resp.status() {
            StatusCode::NOT_FOUND => Ok(None),
            s if s.is_success() => {
                let channel: Channel = resp.json().await?;
                Ok(Some(channel.name.unwrap_or_default()))
            }
            s => Err(rejected(surface_id, s, resp).await),
        }
    }

    #[instrument(skip(self), level = "debug")]
    async fn rename(
        &self,
        group_id: &str,
        surface_id: &str,
        name: &str,
    ) -> Result<(), RenameError> {
        let resp = self
            .http
            .patch(self.channel_url(surface_id))
            .header("Authorization", self.auth())
            .header("X-Audit-Log-Reason", "price ticker update")
            .json(&json!({ "name": name }))
            .send()
            .await?;

        let status = resp.status();
        if status.is_success() {
            debug!("channel renamed");
            return Ok(());
        }
        Err(rejected(surface_id, status, resp).await)
    }
}

async fn rejected(surface_id: &str, status: StatusCode, resp: reqwest::Response) -> RenameError {
    let header_retry = resp
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(parse_retry_after);
    let body = resp.text().await.unwrap_or_default();

    match status {
        StatusCode::NOT_FOUND => RenameError::SurfaceMissing {
            surface_id: surface_id.to_string(),
        },
        StatusCode::TOO_MANY_REQUESTS => {
            let retry_after = serde_json::from_str::<RateLimitBody>(&body)
                .ok()
                .and_then(|b| b.retry_after)
                .and_then(seconds_to_duration)
                .or(header_retry);
            warn!(surface_id, ?retry_after, "rename rate limited");
            RenameError::RateLimited {
                surface_id: surface_id.to_string(),
                retry_after,
            }
        }
        s => RenameError::Rejected {
            status: s.as_u16(),
            message: body.chars().take(200).collect(),
        },
    }
}

/// `Retry-After` in (possibly fractional) seconds.
pub fn parse_retry_after(raw: &str) -> Option<Duration> {
    raw.trim().parse::<f64>().ok().and_then(seconds_to_duration)
}

fn seconds_to_duration(secs: f64) -> Option<Duration> {
    (secs.is_finite() && secs >= 0.0).then(|| Duration::from_secs_f64(secs))
}
