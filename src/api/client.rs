use super::logging::{debug_payload_enabled, emit_debug_payload};
use crate::config::Config;
use crate::types::{
    AckEnvelope, ChatRequest, IngestEnvelope, IngestReport, KbStatus, ThreadDetail, ThreadEnvelope,
    ThreadSummary, ThreadsEnvelope,
};
use crate::util::is_local_endpoint_url;
use anyhow::{anyhow, Context, Result};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::path::Path;
use std::pin::Pin;
#[cfg(test)]
use std::sync::Arc;

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

#[cfg(test)]
pub trait MockStreamProducer: Send + Sync {
    fn create_mock_stream(&self, request: &ChatRequest) -> Result<ByteStream>;
    fn list_threads(&self) -> Result<Vec<ThreadSummary>>;
}

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    #[cfg(test)]
    mock_stream_producer: Option<Arc<dyn MockStreamProducer>>,
}

impl ApiClient {
    pub fn new(config: &Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.api_url.trim_end_matches('/').to_string(),
            #[cfg(test)]
            mock_stream_producer: None,
        }
    }

    #[cfg(test)]
    pub fn new_mock(mock_producer: Arc<dyn MockStreamProducer>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: "http://127.0.0.1:8000/api".to_string(),
            #[cfg(test)]
            mock_stream_producer: Some(mock_producer),
        }
    }

    /// Open the chunked answer stream for one question.
    pub async fn chat_stream(&self, request: &ChatRequest) -> Result<ByteStream> {
        #[cfg(test)]
        {
            if let Some(producer) = &self.mock_stream_producer {
                return producer.create_mock_stream(request);
            }
        }

        let request_url = self.endpoint_url("chat-stream");

        if debug_payload_enabled() {
            let payload = serde_json::to_value(request).unwrap_or_default();
            emit_debug_payload(&request_url, &payload);
        }

        let response = self
            .http
            .post(&request_url)
            .json(request)
            .send()
            .await
            .map_err(|error| map_api_request_error(error, &request_url))?
            .error_for_status()
            .map_err(|error| map_api_request_error(error, &request_url))?;

        let request_url_for_stream = request_url.clone();
        let stream = response.bytes_stream().map(move |item| {
            item.map_err(|error| map_api_request_error(error, &request_url_for_stream))
        });
        Ok(Box::pin(stream))
    }

    pub async fn status(&self) -> Result<KbStatus> {
        let request_url = self.endpoint_url("status");
        let response = self.get_checked(&request_url).await?;
        response
            .json::<KbStatus>()
            .await
            .map_err(|error| map_api_request_error(error, &request_url))
    }

    pub async fn list_threads(&self) -> Result<Vec<ThreadSummary>> {
        #[cfg(test)]
        {
            if let Some(producer) = &self.mock_stream_producer {
                return producer.list_threads();
            }
        }

        let request_url = self.endpoint_url("threads");
        let response = self.get_checked(&request_url).await?;
        let envelope = response
            .json::<ThreadsEnvelope>()
            .await
            .map_err(|error| map_api_request_error(error, &request_url))?;
        Ok(envelope.threads)
    }

    pub async fn fetch_thread(&self, thread_id: &str) -> Result<ThreadDetail> {
        let request_url = self.endpoint_url(&format!("threads/{thread_id}"));
        let response = self.get_checked(&request_url).await?;
        let envelope = response
            .json::<ThreadEnvelope>()
            .await
            .map_err(|error| map_api_request_error(error, &request_url))?;
        if !envelope.ok {
            return Err(anyhow!(envelope
                .error
                .unwrap_or_else(|| "Thread not found".to_string())));
        }
        envelope
            .thread
            .ok_or_else(|| anyhow!("thread payload missing from response"))
    }

    pub async fn delete_thread(&self, thread_id: &str) -> Result<()> {
        let request_url = self.endpoint_url(&format!("threads/{thread_id}"));
        let response = self
            .http
            .delete(&request_url)
            .send()
            .await
            .map_err(|error| map_api_request_error(error, &request_url))?
            .error_for_status()
            .map_err(|error| map_api_request_error(error, &request_url))?;
        check_ack(response, &request_url).await
    }

    pub async fn rename_thread(&self, thread_id: &str, title: &str) -> Result<()> {
        let request_url = self.endpoint_url(&format!("threads/{thread_id}"));
        let response = self
            .http
            .put(&request_url)
            .json(&serde_json::json!({ "title": title }))
            .send()
            .await
            .map_err(|error| map_api_request_error(error, &request_url))?
            .error_for_status()
            .map_err(|error| map_api_request_error(error, &request_url))?;
        check_ack(response, &request_url).await
    }

    pub async fn load_urls(&self, urls: &str) -> Result<IngestReport> {
        let request_url = self.endpoint_url("load-urls");
        let response = self
            .http
            .post(&request_url)
            .json(&serde_json::json!({ "urls": urls }))
            .send()
            .await
            .map_err(|error| map_api_request_error(error, &request_url))?
            .error_for_status()
            .map_err(|error| map_api_request_error(error, &request_url))?;
        unwrap_ingest(response, &request_url).await
    }

    pub async fn upload_files(&self, paths: &[std::path::PathBuf]) -> Result<IngestReport> {
        let request_url = self.endpoint_url("upload-files");

        let mut form = reqwest::multipart::Form::new();
        for (file_name, bytes) in read_upload_parts(paths)? {
            let part = reqwest::multipart::Part::bytes(bytes).file_name(file_name);
            form = form.part("files", part);
        }

        let response = self
            .http
            .post(&request_url)
            .multipart(form)
            .send()
            .await
            .map_err(|error| map_api_request_error(error, &request_url))?
            .error_for_status()
            .map_err(|error| map_api_request_error(error, &request_url))?;
        unwrap_ingest(response, &request_url).await
    }

    pub async fn clear_knowledge_base(&self) -> Result<()> {
        let request_url = self.endpoint_url("clear");
        let response = self
            .http
            .post(&request_url)
            .send()
            .await
            .map_err(|error| map_api_request_error(error, &request_url))?
            .error_for_status()
            .map_err(|error| map_api_request_error(error, &request_url))?;
        check_ack(response, &request_url).await
    }

    async fn get_checked(&self, request_url: &str) -> Result<reqwest::Response> {
        self.http
            .get(request_url)
            .send()
            .await
            .map_err(|error| map_api_request_error(error, request_url))?
            .error_for_status()
            .map_err(|error| map_api_request_error(error, request_url))
    }

    fn endpoint_url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }
}

async fn check_ack(response: reqwest::Response, request_url: &str) -> Result<()> {
    let envelope = response
        .json::<AckEnvelope>()
        .await
        .map_err(|error| map_api_request_error(error, request_url))?;
    if !envelope.ok {
        return Err(anyhow!(envelope
            .error
            .unwrap_or_else(|| format!("request to '{request_url}' was rejected"))));
    }
    Ok(())
}

async fn unwrap_ingest(response: reqwest::Response, request_url: &str) -> Result<IngestReport> {
    let envelope = response
        .json::<IngestEnvelope>()
        .await
        .map_err(|error| map_api_request_error(error, request_url))?;
    if !envelope.ok {
        let detail = if envelope.errors.is_empty() {
            "No documents could be loaded.".to_string()
        } else {
            envelope.errors.join(", ")
        };
        return Err(anyhow!(detail));
    }
    Ok(IngestReport {
        loaded: envelope.loaded,
        errors: envelope.errors,
        sources: envelope.sources,
    })
}

/// Read upload payloads into memory before the request is built, so a missing
/// file fails with a filesystem error instead of a half-sent request.
fn read_upload_parts(paths: &[std::path::PathBuf]) -> Result<Vec<(String, Vec<u8>)>> {
    let mut parts = Vec::with_capacity(paths.len());
    for path in paths {
        let bytes = std::fs::read(path)
            .with_context(|| format!("cannot read upload file '{}'", path.display()))?;
        let file_name = file_name_for_upload(path);
        parts.push((file_name, bytes));
    }
    Ok(parts)
}

fn file_name_for_upload(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string())
}

fn map_api_request_error(error: reqwest::Error, request_url: &str) -> anyhow::Error {
    if error.is_connect() && is_local_endpoint_url(request_url) {
        return anyhow!(
            "cannot reach local CiteFlow backend '{}': {}. Start the backend or update CITEFLOW_API_URL.",
            request_url,
            error
        );
    }
    if error.is_connect() {
        return anyhow!("cannot reach API endpoint '{}': {}", request_url, error);
    }
    if error.is_timeout() {
        return anyhow!("API request to '{}' timed out: {}", request_url, error);
    }
    if let Some(status) = error.status() {
        return anyhow!(
            "API endpoint '{}' returned HTTP {}: {}",
            request_url,
            status,
            error
        );
    }
    anyhow!("API request to '{}' failed: {}", request_url, error)
}
