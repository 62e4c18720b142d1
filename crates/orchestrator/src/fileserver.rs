//! Minimal fileserver upload client used by the QCM orchestrator (C9) to
//! publish its generated JSON artifact.

use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::citation::rewrite_url;
use crate::OrchestratorError;

#[derive(Debug, Deserialize)]
struct UploadResponse {
    url: String,
}

pub struct FileserverClient {
    client: reqwest::Client,
    internal_base: String,
    public_base: String,
}

impl FileserverClient {
    pub fn new(internal_base: impl Into<String>, public_base: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("fileserver http client"),
            internal_base: internal_base.into(),
            public_base: public_base.into(),
        }
    }

    /// Uploads `body` as `{name}.json` and returns its public URL.
    pub async fn upload_json(
        &self,
        name: &str,
        body: &Value,
    ) -> Result<String, OrchestratorError> {
        let endpoint = format!("{}/upload/{name}.json", self.internal_base);

        let response = self
            .client
            .post(&endpoint)
            .json(body)
            .send()
            .await
            .map_err(|e| OrchestratorError::Upload(e.to_string()))?;

        if !response.status().is_success() {
            return Err(OrchestratorError::Upload(format!(
                "fileserver returned {}",
                response.status()
            )));
        }

        let parsed: UploadResponse = response
            .json()
            .await
            .map_err(|e| OrchestratorError::Upload(e.to_string()))?;

        Ok(rewrite_url(&parsed.url, &self.internal_base, &self.public_base))
    }
}
