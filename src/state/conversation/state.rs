use crate::api::logging::emit_thread_refresh_error;
use crate::api::ApiClient;
use crate::config::RetrievalSettings;
use crate::state::turn::{ConversationTurn, Role};
use crate::types::{Citation, SourceInfo, ThreadSummary};
use anyhow::Result;
use std::sync::Arc;

/// Mirror of a decoded stream event, delivered to a concurrently rendering
/// front-end. The manager applies every event to its own state before
/// forwarding it, so a renderer may also just re-read `turns()` on receipt.
#[derive(Debug, Clone, PartialEq)]
pub enum ConversationStreamUpdate {
    Metadata {
        sources: Vec<Citation>,
        in_kb: Option<bool>,
    },
    Delta(String),
    Finished,
    Failed(String),
    Cancelled,
}

/// One indexed source plus whether it participates in retrieval.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceToggle {
    pub info: SourceInfo,
    pub enabled: bool,
}

/// Append-only conversation log plus the request-cycle state around it.
/// Exactly one trailing assistant turn is mutable while a stream is open;
/// `streaming` marks that window and guards every store mutation.
pub struct ConversationManager {
    pub(super) client: Arc<ApiClient>,
    pub(super) turns: Vec<ConversationTurn>,
    pub(super) thread_id: Option<String>,
    pub(super) threads: Vec<ThreadSummary>,
    pub(super) kb_ready: bool,
    pub(super) sources: Vec<SourceToggle>,
    pub(super) retrieval: RetrievalSettings,
    pub(super) streaming: bool,
    pub(super) generation: u64,
}

impl ConversationManager {
    pub fn new(client: ApiClient, retrieval: RetrievalSettings) -> Self {
        Self {
            client: Arc::new(client),
            turns: Vec::new(),
            thread_id: None,
            threads: Vec::new(),
            kb_ready: false,
            sources: Vec::new(),
            retrieval,
            streaming: false,
            generation: 0,
        }
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn thread_id(&self) -> Option<&str> {
        self.thread_id.as_deref()
    }

    pub fn threads(&self) -> &[ThreadSummary] {
        &self.threads
    }

    pub fn kb_ready(&self) -> bool {
        self.kb_ready
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    pub fn sources(&self) -> &[SourceToggle] {
        &self.sources
    }

    pub fn retrieval(&self) -> RetrievalSettings {
        self.retrieval
    }

    pub fn set_retrieval(&mut self, retrieval: RetrievalSettings) {
        self.retrieval = retrieval;
    }

    /// Titles of the sources currently enabled for retrieval.
    pub fn active_source_titles(&self) -> Vec<String> {
        self.sources
            .iter()
            .filter(|source| source.enabled)
            .map(|source| source.info.title.clone())
            .collect()
    }

    pub fn set_source_enabled(&mut self, title: &str, enabled: bool) -> bool {
        match self
            .sources
            .iter_mut()
            .find(|source| source.info.title == title)
        {
            Some(source) => {
                source.enabled = enabled;
                true
            }
            None => false,
        }
    }

    /// Re-read knowledge-base readiness and the indexed source list, keeping
    /// the enabled flag of sources that survive the refresh.
    pub async fn refresh_status(&mut self) -> Result<()> {
        let status = self.client.status().await?;
        self.kb_ready = status.ready;
        self.sources = status
            .sources
            .into_iter()
            .map(|info| {
                let enabled = self
                    .sources
                    .iter()
                    .find(|existing| existing.info.title == info.title)
                    .map_or(true, |existing| existing.enabled);
                SourceToggle { info, enabled }
            })
            .collect();
        Ok(())
    }

    pub async fn refresh_threads(&mut self) -> Result<()> {
        self.threads = self.client.list_threads().await?;
        Ok(())
    }

    /// Thread-list refresh after a turn completes. Failures are logged, never
    /// surfaced; the finished turn stands on its own.
    pub(super) async fn refresh_threads_after_turn(&mut self) {
        if let Err(error) = self.refresh_threads().await {
            emit_thread_refresh_error(&error);
        }
    }

    /// Load a persisted thread into the conversation history.
    pub async fn open_thread(&mut self, thread_id: &str) -> Result<()> {
        if self.streaming {
            return Ok(());
        }
        let detail = self.client.fetch_thread(thread_id).await?;
        self.thread_id = Some(detail.id);
        self.turns = detail
            .messages
            .into_iter()
            .map(|message| ConversationTurn {
                role: if message.role == "user" {
                    Role::User
                } else {
                    Role::Assistant
                },
                content: message.content,
                sources: message.sources,
                in_kb: message.in_kb,
            })
            .collect();
        Ok(())
    }

    pub fn start_new_thread(&mut self) {
        if self.streaming {
            return;
        }
        self.thread_id = None;
        self.turns.clear();
    }

    pub async fn delete_thread(&mut self, thread_id: &str) -> Result<()> {
        self.client.delete_thread(thread_id).await?;
        if self.thread_id.as_deref() == Some(thread_id) {
            self.start_new_thread();
        }
        self.refresh_threads().await
    }

    pub async fn rename_thread(&mut self, thread_id: &str, title: &str) -> Result<()> {
        self.client.rename_thread(thread_id, title).await?;
        self.refresh_threads().await
    }

    pub async fn ingest_urls(&mut self, urls: &str) -> Result<crate::types::IngestReport> {
        let report = self.client.load_urls(urls).await?;
        self.refresh_status().await?;
        Ok(report)
    }

    pub async fn ingest_files(
        &mut self,
        paths: &[std::path::PathBuf],
    ) -> Result<crate::types::IngestReport> {
        let report = self.client.upload_files(paths).await?;
        self.refresh_status().await?;
        Ok(report)
    }

    pub async fn clear_knowledge_base(&mut self) -> Result<()> {
        self.client.clear_knowledge_base().await?;
        self.refresh_status().await
    }
}
