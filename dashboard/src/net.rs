use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info};

use crate::config::Config;
use crate::controller::UpdateService;
use crate::types::{Patch, RefreshRequest, ThingRef, ThingSummary};

pub async fn list_things(client: &Client, config: &Config) -> Result<Vec<ThingSummary>> {
    let url = format!("{}/api/machines", config.backend_url);
    let things: Vec<ThingSummary> = client
        .get(&url)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    info!("Listed {} things.", things.len());
    Ok(things)
}

/// Returns the raw shadow body; decoding is the caller's job.
pub async fn fetch_shadow(client: &Client, config: &Config, thing: &str) -> Result<String> {
    let url = format!("{}/api/machines/{}/shadow", config.backend_url, thing);
    let text = client.get(&url).send().await?.error_for_status()?.text().await?;
    debug!(thing, bytes = text.len(), "fetched shadow");
    Ok(text)
}

pub async fn send_patch(client: &Client, config: &Config, thing: &str, patch: &Patch) -> Result<()> {
    let url = format!("{}/api/machines/{}/shadow", config.backend_url, thing);
    client.post(&url).json(patch).send().await?.error_for_status()?;
    info!(thing, fields = patch.field_count(), "Patch sent successfully.");
    Ok(())
}

/// Asks the machine to publish its current state again.
pub async fn request_refresh(client: &Client, config: &Config, thing: &str) -> Result<()> {
    let url = format!("{}/api/upDateState", config.backend_url);
    let body = RefreshRequest {
        thing_name: ThingRef { thing_name: thing },
    };
    client.post(&url).json(&body).send().await?.error_for_status()?;
    info!(thing, "Refresh requested.");
    Ok(())
}

/// [`UpdateService`] backed by the dashboard backend.
#[derive(Clone)]
pub struct HttpUpdateService {
    client: Client,
    config: Config,
}

impl HttpUpdateService {
    pub fn new(client: Client, config: Config) -> Self {
        HttpUpdateService { client, config }
    }
}

#[async_trait]
impl UpdateService for HttpUpdateService {
    async fn dispatch(&self, device: &str, patch: &Patch) -> Result<()> {
        send_patch(&self.client, &self.config, device, patch).await
    }
}
