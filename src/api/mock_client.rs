use crate::api::client::{ByteStream, MockStreamProducer};
use crate::types::{ChatRequest, ThreadSummary};
use anyhow::{anyhow, Result};
use bytes::Bytes;
use futures::stream;
use std::sync::{Arc, Mutex};

/// One scripted transport chunk: answer text, raw bytes (for splits that land
/// inside a UTF-8 sequence), or a mid-stream failure.
#[derive(Debug, Clone)]
pub enum MockChunk {
    Text(String),
    Bytes(Vec<u8>),
    TransportError(String),
}

impl MockChunk {
    pub fn text(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

/// Scripted stand-in for the backend: each `chat_stream` call consumes the
/// next chunk list, delivered exactly as written (no framing added). The
/// thread list is served from `set_threads`, so refresh paths run against the
/// mock too.
#[derive(Clone)]
pub struct MockApiClient {
    responses: Arc<Mutex<Vec<Vec<MockChunk>>>>,
    requests_seen: Arc<Mutex<Vec<ChatRequest>>>,
    threads: Arc<Mutex<Vec<ThreadSummary>>>,
    thread_list_calls: Arc<Mutex<usize>>,
}

impl MockApiClient {
    pub fn new(responses: Vec<Vec<MockChunk>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            requests_seen: Arc::new(Mutex::new(Vec::new())),
            threads: Arc::new(Mutex::new(Vec::new())),
            thread_list_calls: Arc::new(Mutex::new(0)),
        }
    }

    pub fn requests_seen(&self) -> Vec<ChatRequest> {
        self.requests_seen.lock().unwrap().clone()
    }

    pub fn set_threads(&self, threads: Vec<ThreadSummary>) {
        *self.threads.lock().unwrap() = threads;
    }

    pub fn thread_list_calls(&self) -> usize {
        *self.thread_list_calls.lock().unwrap()
    }
}

impl MockStreamProducer for MockApiClient {
    fn create_mock_stream(&self, request: &ChatRequest) -> Result<ByteStream> {
        self.requests_seen.lock().unwrap().push(request.clone());

        let mut responses_guard = self.responses.lock().unwrap();
        if responses_guard.is_empty() {
            return Err(anyhow!("MockApiClient: no more responses configured"));
        }
        let chunks = responses_guard.remove(0);

        let byte_chunks: Vec<Result<Bytes>> = chunks
            .into_iter()
            .map(|chunk| match chunk {
                MockChunk::Text(text) => Ok(Bytes::from(text)),
                MockChunk::Bytes(bytes) => Ok(Bytes::from(bytes)),
                MockChunk::TransportError(message) => Err(anyhow!(message)),
            })
            .collect();

        Ok(Box::pin(stream::iter(byte_chunks)))
    }

    fn list_threads(&self) -> Result<Vec<ThreadSummary>> {
        *self.thread_list_calls.lock().unwrap() += 1;
        Ok(self.threads.lock().unwrap().clone())
    }
}
