use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::error::WarehouseError;

const RAW_FILE_NAME: &str = "sales_raw.json";

/// Pulls the raw sales feed from the upstream HTTP API.
pub struct ApiExtractor {
    client: reqwest::Client,
    url: String,
}

impl ApiExtractor {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, WarehouseError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    /// Fetches the feed, which must be a JSON array of sale objects.
    pub async fn extract(&self) -> Result<Vec<Value>, WarehouseError> {
        info!("Extracting sales from {}", self.url);

        let response = self.client.get(&self.url).send().await?.error_for_status()?;
        let status = response.status();
        let body: Value = response.json().await?;

        let records = match body {
            Value::Array(records) => records,
            other => {
                return Err(WarehouseError::ExtractionError {
                    message: format!("expected a JSON array, got {}", json_kind(&other)),
                })
            }
        };

        info!("Extracted {} raw records ({})", records.len(), status);
        Ok(records)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Landing zone for the untouched extraction output.
pub struct RawLanding {
    path: PathBuf,
}

impl RawLanding {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(RAW_FILE_NAME),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn store(&self, records: &[Value]) -> Result<(), WarehouseError> {
        if records.is_empty() {
            return Err(WarehouseError::InvalidInput {
                message: "no raw records to land".to_string(),
            });
        }

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let body = serde_json::to_vec_pretty(records)?;
        tokio::fs::write(&self.path, body).await?;

        info!("Landed {} raw records at {}", records.len(), self.path.display());
        Ok(())
    }

    pub async fn load(&self) -> Result<Vec<Value>, WarehouseError> {
        read_raw_file(&self.path).await
    }
}

/// Reads a JSON array of raw sale objects from disk.
pub async fn read_raw_file(path: &Path) -> Result<Vec<Value>, WarehouseError> {
    let body = tokio::fs::read(path).await?;
    Ok(serde_json::from_slice(&body)?)
}
