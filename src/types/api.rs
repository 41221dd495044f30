use serde::{Deserialize, Serialize};

/// Body of `POST /chat-stream`.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub question: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    pub active_sources: Vec<String>,
    pub top_k: u32,
    pub hybrid_search: bool,
    pub temperature: f32,
}

/// A structured pointer to the source document/URL backing part of an answer.
/// Produced only in the stream header, never incrementally.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Citation {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<i64>,
}

/// The single JSON line prefixing a streamed answer. Every field is optional;
/// an `error` header may be the entire stream.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamHeader {
    pub thread_id: Option<String>,
    pub sources: Option<Vec<Citation>>,
    pub in_kb: Option<bool>,
    pub error: Option<String>,
}

/// Decoded unit of the answer stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Emitted exactly once per stream, from the header line.
    Metadata {
        thread_id: Option<String>,
        sources: Vec<Citation>,
        in_kb: Option<bool>,
    },
    /// Verbatim answer text, in arrival order.
    BodyText(String),
    /// In-band application error; terminates the stream.
    StreamError(String),
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ThreadSummary {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub message_count: usize,
    #[serde(default)]
    pub created: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ThreadDetail {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub messages: Vec<ThreadMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ThreadMessage {
    pub role: String,
    pub content: String,
    #[serde(default)]
    pub sources: Vec<Citation>,
    pub in_kb: Option<bool>,
}

/// One indexed knowledge-base source, as reported by `/status` and the ingest
/// endpoints.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SourceInfo {
    pub title: String,
    #[serde(default, rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KbStatus {
    pub ready: bool,
    #[serde(default)]
    pub sources: Vec<SourceInfo>,
}

/// Outcome of a successful `/load-urls` or `/upload-files` call. `errors`
/// carries per-source failures that did not sink the whole request.
#[derive(Debug, Clone)]
pub struct IngestReport {
    pub loaded: usize,
    pub errors: Vec<String>,
    pub sources: Vec<SourceInfo>,
}

// `{ ok, ... }` envelopes for the collaborator endpoints.

#[derive(Debug, Deserialize)]
pub struct ThreadsEnvelope {
    #[serde(default)]
    pub threads: Vec<ThreadSummary>,
}

#[derive(Debug, Deserialize)]
pub struct ThreadEnvelope {
    pub ok: bool,
    pub thread: Option<ThreadDetail>,
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct IngestEnvelope {
    pub ok: bool,
    #[serde(default)]
    pub loaded: usize,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub sources: Vec<SourceInfo>,
}

#[derive(Debug, Deserialize)]
pub struct AckEnvelope {
    pub ok: bool,
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_header_defaults_missing_fields() {
        let header: StreamHeader = serde_json::from_str("{}").expect("empty header");
        assert!(header.thread_id.is_none());
        assert!(header.sources.is_none());
        assert!(header.in_kb.is_none());
        assert!(header.error.is_none());
    }

    #[test]
    fn test_stream_header_parses_full_payload() {
        let header: StreamHeader = serde_json::from_str(
            r#"{"thread_id":"t1","sources":[{"title":"Guide","url":"https://example.com","page":3}],"in_kb":true}"#,
        )
        .expect("full header");
        assert_eq!(header.thread_id.as_deref(), Some("t1"));
        assert_eq!(header.in_kb, Some(true));
        let sources = header.sources.expect("sources present");
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].title, "Guide");
        assert_eq!(sources[0].page, Some(3));
        assert_eq!(sources[0].file, None);
    }

    #[test]
    fn test_citation_round_trip_without_optionals() {
        let citation = Citation {
            title: "notes.txt".to_string(),
            url: None,
            file: Some("notes.txt".to_string()),
            page: None,
        };
        let json = serde_json::to_string(&citation).expect("serialize");
        assert!(!json.contains("url"));
        let parsed: Citation = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed, citation);
    }

    #[test]
    fn test_chat_request_omits_absent_thread_id() {
        let request = ChatRequest {
            question: "q".to_string(),
            thread_id: None,
            active_sources: vec!["Guide".to_string()],
            top_k: 5,
            hybrid_search: true,
            temperature: 0.3,
        };
        let json = serde_json::to_value(&request).expect("serialize");
        assert!(json.get("thread_id").is_none());
        assert_eq!(json["top_k"], 5);
        assert_eq!(json["hybrid_search"], true);
    }

    #[test]
    fn test_ingest_envelope_tolerates_error_shape() {
        let envelope: IngestEnvelope =
            serde_json::from_str(r#"{"ok":false,"errors":["No documents could be loaded."]}"#)
                .expect("error envelope");
        assert!(!envelope.ok);
        assert_eq!(envelope.loaded, 0);
        assert_eq!(envelope.errors.len(), 1);
        assert!(envelope.sources.is_empty());
    }
}
