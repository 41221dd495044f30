use super::{ConversationManager, ConversationStreamUpdate};
use crate::api::stream::AnswerDecoder;
use crate::types::{ChatRequest, StreamEvent};
use anyhow::Result;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

enum StreamOutcome {
    Completed,
    InBandError,
    TransportFailure,
    Cancelled,
}

impl ConversationManager {
    /// Run one request/response cycle: append the user turn and an assistant
    /// placeholder, open the answer stream, and drive the decoder until a
    /// terminal outcome. Returns the finalized assistant content, or `None`
    /// when the preconditions reject the call (empty input, knowledge base not
    /// ready, or a stream already in flight).
    ///
    /// Every decoded event is applied to the trailing turn first and then
    /// mirrored onto `update_tx` for a concurrently rendering front-end.
    /// Firing `cancel` abandons the read loop; remaining transport chunks are
    /// discarded and the turn is sealed with whatever content accumulated.
    pub async fn send_message(
        &mut self,
        input: &str,
        update_tx: Option<&mpsc::UnboundedSender<ConversationStreamUpdate>>,
        cancel: &CancellationToken,
    ) -> Result<Option<String>> {
        let question = input.trim();
        if question.is_empty() || !self.kb_ready || self.streaming {
            return Ok(None);
        }

        let request = ChatRequest {
            question: question.to_string(),
            thread_id: self.thread_id.clone(),
            active_sources: self.active_source_titles(),
            top_k: self.retrieval.top_k,
            hybrid_search: self.retrieval.hybrid_search,
            temperature: self.retrieval.temperature,
        };

        self.begin_turn(question.to_string());
        let generation = self.generation;

        let mut stream = match self.client.chat_stream(&request).await {
            Ok(stream) => stream,
            Err(_) => {
                self.finalize_error(None);
                emit_update(
                    update_tx,
                    ConversationStreamUpdate::Failed(super::CONNECTIVITY_ERROR_MESSAGE.to_string()),
                );
                self.refresh_threads_after_turn().await;
                return Ok(Some(self.trailing_content()));
            }
        };

        let mut decoder = AnswerDecoder::new();
        let outcome = loop {
            let next_chunk = tokio::select! {
                biased;
                _ = cancel.cancelled() => break StreamOutcome::Cancelled,
                chunk = stream.next() => chunk,
            };

            let Some(chunk_result) = next_chunk else {
                break StreamOutcome::Completed;
            };
            let chunk = match chunk_result {
                Ok(chunk) => chunk,
                Err(_) => break StreamOutcome::TransportFailure,
            };
            let Ok(events) = decoder.process(&chunk) else {
                break StreamOutcome::TransportFailure;
            };

            if self.apply_stream_events(generation, events, update_tx) {
                break StreamOutcome::InBandError;
            }
        };

        match outcome {
            StreamOutcome::Completed => {
                let flushed = decoder.finish().unwrap_or_default();
                let errored = self.apply_stream_events(generation, flushed, update_tx);
                if !errored {
                    self.finalize_ok();
                    emit_update(update_tx, ConversationStreamUpdate::Finished);
                }
            }
            StreamOutcome::InBandError => {}
            StreamOutcome::TransportFailure => {
                self.finalize_error(None);
                emit_update(
                    update_tx,
                    ConversationStreamUpdate::Failed(super::CONNECTIVITY_ERROR_MESSAGE.to_string()),
                );
            }
            StreamOutcome::Cancelled => {
                self.finalize_ok();
                emit_update(update_tx, ConversationStreamUpdate::Cancelled);
            }
        }

        self.refresh_threads_after_turn().await;
        Ok(Some(self.trailing_content()))
    }

    /// Apply a batch of decoded events to the store and mirror each onto the
    /// update channel. Returns true once the stream has reached a terminal
    /// in-band error. Events tagged with a stale generation are discarded:
    /// they belong to a request that no longer owns the trailing turn.
    pub(super) fn apply_stream_events(
        &mut self,
        generation: u64,
        events: Vec<StreamEvent>,
        update_tx: Option<&mpsc::UnboundedSender<ConversationStreamUpdate>>,
    ) -> bool {
        if generation != self.generation {
            return true;
        }

        for event in events {
            match event {
                StreamEvent::Metadata {
                    thread_id,
                    sources,
                    in_kb,
                } => {
                    self.apply_metadata(sources.clone(), in_kb, thread_id);
                    emit_update(
                        update_tx,
                        ConversationStreamUpdate::Metadata { sources, in_kb },
                    );
                }
                StreamEvent::BodyText(text) => {
                    self.apply_body_append(&text);
                    emit_update(update_tx, ConversationStreamUpdate::Delta(text));
                }
                StreamEvent::StreamError(message) => {
                    self.finalize_error(Some(message.clone()));
                    emit_update(update_tx, ConversationStreamUpdate::Failed(message));
                    return true;
                }
            }
        }
        false
    }

    fn trailing_content(&self) -> String {
        self.turns
            .last()
            .map(|turn| turn.content.clone())
            .unwrap_or_default()
    }
}

fn emit_update(
    update_tx: Option<&mpsc::UnboundedSender<ConversationStreamUpdate>>,
    update: ConversationStreamUpdate,
) {
    if let Some(tx) = update_tx {
        let _ = tx.send(update);
    }
}
