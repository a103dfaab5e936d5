use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::{Client, StatusCode};
use tracing::info;

use crate::config::DashboardConfig;
use crate::error::{FeedError, FeedResult};

/// Kibana saved-objects import endpoint, relative to the base URL.
pub const IMPORT_PATH: &str = "/api/kibana/dashboards/import";

pub fn import_url(base_url: &str) -> String {
    format!("{}{IMPORT_PATH}", base_url.trim_end_matches('/'))
}

/// One-shot import of visualizations and dashboards into Kibana.
pub struct DashboardProvisioner {
    client: Client,
    base_url: String,
    file: PathBuf,
}

impl DashboardProvisioner {
    pub fn new(config: &DashboardConfig) -> FeedResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| FeedError::Dashboard(e.to_string()))?;
        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            file: config.file.clone(),
        })
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    /// Posts the raw file to Kibana. Anything but 200 is an error carrying
    /// the response body.
    pub async fn import(&self) -> FeedResult<()> {
        let payload = tokio::fs::read(&self.file).await.map_err(|e| {
            FeedError::Dashboard(format!("cannot read {}: {e}", self.file.display()))
        })?;

        let url = import_url(&self.base_url);
        let resp = self
            .client
            .post(&url)
            .header("kbn-xsrf", "true")
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(payload)
            .send()
            .await
            .map_err(|e| FeedError::Dashboard(e.to_string()))?;

        let status = resp.status();
        if status != StatusCode::OK {
            let body = resp.text().await.unwrap_or_default();
            return Err(FeedError::Dashboard(format!(
                "Kibana answered {}: {body}",
                status.as_u16()
            )));
        }

        info!(url = %url, "dashboards imported");
        Ok(())
    }
}
