use crate::{
    AnchorPayload, ApiError, JobStatusReport, LedgerPayload, MergeResult, RegeneratedShots,
    RemixBackend, RemoteStatus, RevisionOutcome, StoryboardSnapshot, UploadReceipt,
};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::path::Path;
use storyboard::{JobId, Shot};

/// Connection settings for the JSON/HTTP backend.
#[derive(Debug, Clone)]
pub struct HttpBackendConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl HttpBackendConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            timeout_secs: 60,
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

/// reqwest implementation of [`RemixBackend`].
pub struct HttpBackend {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl HttpBackend {
    pub fn new(config: HttpBackendConfig) -> Result<Self, ApiError> {
        let base_url = config.base_url.trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(ApiError::Validation("base URL not set".into()));
        }
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ApiError::Unavailable(e.to_string()))?;
        Ok(Self {
            base_url,
            api_key: config.api_key,
            client,
        })
    }

    /// Probe whether anything is serving on the configured base URL.
    pub async fn is_available(&self) -> bool {
        match self.request(self.client.get(self.url("health"))).await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn request(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, ApiError> {
        let builder = match &self.api_key {
            Some(key) => builder.header("Authorization", format!("Bearer {key}")),
            None => builder,
        };
        Ok(builder.send().await?)
    }

    async fn decode<T: DeserializeOwned>(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> Result<T, ApiError> {
        let response = self.request(builder).await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::from_status(status.as_u16(), body));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))
    }
}

#[async_trait]
impl RemixBackend for HttpBackend {
    async fn upload_source(&self, file: &Path) -> Result<UploadReceipt, ApiError> {
        let bytes = tokio::fs::read(file)
            .await
            .map_err(|e| ApiError::Validation(format!("cannot read {}: {e}", file.display())))?;
        if bytes.is_empty() {
            return Err(ApiError::Validation(format!(
                "{} is empty",
                file.display()
            )));
        }
        let file_name = file
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "source.mp4".to_string());
        let part = reqwest::multipart::Part::bytes(bytes).file_name(file_name);
        let form = reqwest::multipart::Form::new().part("file", part);
        self.decode(self.client.post(self.url("upload")).multipart(form))
            .await
    }

    async fn fetch_storyboard(&self, job: &JobId) -> Result<StoryboardSnapshot, ApiError> {
        self.decode(self.client.get(self.url(&format!("jobs/{job}/storyboard"))))
            .await
    }

    async fn fetch_job_status(&self, job: &JobId) -> Result<JobStatusReport, ApiError> {
        self.decode(self.client.get(self.url(&format!("jobs/{job}/status"))))
            .await
    }

    async fn fetch_ledger(&self, job: &JobId) -> Result<LedgerPayload, ApiError> {
        self.decode(self.client.get(self.url(&format!("jobs/{job}/ledger"))))
            .await
    }

    async fn fetch_anchors(&self, job: &JobId) -> Result<AnchorPayload, ApiError> {
        self.decode(self.client.get(self.url(&format!("jobs/{job}/anchors"))))
            .await
    }

    async fn revise_storyboard(
        &self,
        job: &JobId,
        instruction: &str,
        current_shots: &[Shot],
    ) -> Result<RevisionOutcome, ApiError> {
        if instruction.trim().is_empty() {
            return Err(ApiError::Validation("revision instruction is empty".into()));
        }
        let body = serde_json::json!({
            "instruction": instruction,
            "currentShots": current_shots,
        });
        self.decode(
            self.client
                .post(self.url(&format!("jobs/{job}/storyboard/revise")))
                .json(&body),
        )
        .await
    }

    async fn regenerate_shot_artifacts(
        &self,
        job: &JobId,
        shot_indices: &[usize],
    ) -> Result<RegeneratedShots, ApiError> {
        if shot_indices.is_empty() {
            return Err(ApiError::Validation("no shot indices to regenerate".into()));
        }
        let body = serde_json::json!({ "shotIndices": shot_indices });
        self.decode(
            self.client
                .post(self.url(&format!("jobs/{job}/shots/regenerate")))
                .json(&body),
        )
        .await
    }

    async fn generate_entity_views(
        &self,
        job: &JobId,
        anchor_id: &str,
        force: bool,
    ) -> Result<RemoteStatus, ApiError> {
        let body = serde_json::json!({ "force": force });
        let reply: serde_json::Value = self
            .decode(
                self.client
                    .post(self.url(&format!("jobs/{job}/anchors/{anchor_id}/views")))
                    .json(&body),
            )
            .await?;
        status_field(&reply)
    }

    async fn fetch_generation_status(
        &self,
        job: &JobId,
        anchor_id: &str,
    ) -> Result<RemoteStatus, ApiError> {
        let reply: serde_json::Value = self
            .decode(
                self.client
                    .get(self.url(&format!("jobs/{job}/anchors/{anchor_id}/views/status"))),
            )
            .await?;
        status_field(&reply)
    }

    async fn merge_final(&self, job: &JobId) -> Result<MergeResult, ApiError> {
        self.decode(self.client.post(self.url(&format!("jobs/{job}/merge"))))
            .await
    }
}

fn status_field(reply: &serde_json::Value) -> Result<RemoteStatus, ApiError> {
    let value = reply.get("status").cloned().unwrap_or(reply.clone());
    serde_json::from_value(value)
        .map_err(|_| ApiError::Decode(format!("no recognizable status in {reply}")))
}
