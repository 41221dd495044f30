use super::logging::emit_header_parse_error;
use crate::types::{StreamEvent, StreamHeader};
use anyhow::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum DecoderPhase {
    #[default]
    AwaitingHeader,
    StreamingBody,
    Terminated,
}

/// Incremental decoder for the answer stream: one JSON header line, then raw
/// answer text until the stream ends. Chunk boundaries are arbitrary; the
/// header, its terminator, the first body bytes, and even a single multi-byte
/// character may arrive in any split. The buffer holds raw bytes so a UTF-8
/// sequence cut by a chunk boundary is held back until its continuation
/// arrives, never decoded in halves.
///
/// The decoder is a pure producer of [`StreamEvent`]s and holds no reference
/// to the conversation state that consumes them.
#[derive(Default)]
pub struct AnswerDecoder {
    buffer: Vec<u8>,
    phase: DecoderPhase,
}

impl AnswerDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume one transport chunk and return the events it completes.
    ///
    /// Before the header terminator has been seen, chunks accumulate in the
    /// buffer and produce nothing. Once the header line parses, any buffered
    /// text past the terminator is emitted as body text in the same call, and
    /// every later chunk passes through as soon as it decodes; an incomplete
    /// trailing UTF-8 sequence stays buffered for the next chunk.
    pub fn process(&mut self, chunk: &[u8]) -> Result<Vec<StreamEvent>> {
        let mut events = Vec::new();

        match self.phase {
            DecoderPhase::AwaitingHeader => {
                self.buffer.extend_from_slice(chunk);
                if let Some(terminator) = self.buffer.iter().position(|byte| *byte == b'\n') {
                    self.decode_header(terminator, &mut events);
                }
            }
            DecoderPhase::StreamingBody => {
                self.buffer.extend_from_slice(chunk);
                self.emit_ready_body(&mut events);
            }
            DecoderPhase::Terminated => {}
        }

        Ok(events)
    }

    /// End-of-stream flush. The backend emits a bare `{"error": ...}` object
    /// with no trailing newline when the request fails before any answer text,
    /// so a buffer still awaiting its terminator is parsed as the header here.
    /// A held-back UTF-8 tail the stream never completed is flushed lossily.
    pub fn finish(&mut self) -> Result<Vec<StreamEvent>> {
        let mut events = Vec::new();

        if self.phase == DecoderPhase::AwaitingHeader && !self.buffer.is_empty() {
            let terminator = self.buffer.len();
            self.decode_header(terminator, &mut events);
        }
        if self.phase == DecoderPhase::StreamingBody && !self.buffer.is_empty() {
            events.push(StreamEvent::BodyText(
                String::from_utf8_lossy(&self.buffer).into_owned(),
            ));
        }
        self.phase = DecoderPhase::Terminated;
        self.buffer.clear();

        Ok(events)
    }

    pub fn is_terminated(&self) -> bool {
        self.phase == DecoderPhase::Terminated
    }

    fn decode_header(&mut self, terminator: usize, events: &mut Vec<StreamEvent>) {
        let header_line = String::from_utf8_lossy(&self.buffer[..terminator]).into_owned();

        let header = match serde_json::from_str::<StreamHeader>(&header_line) {
            Ok(header) => header,
            Err(parse_error) => {
                // Recognized soft failure: log and wait for more input. The
                // malformed line stays buffered, so it never reaches the body.
                emit_header_parse_error(&header_line, &parse_error);
                return;
            }
        };

        if let Some(error) = header.error {
            events.push(StreamEvent::StreamError(error));
            self.buffer.clear();
            self.phase = DecoderPhase::Terminated;
            return;
        }

        events.push(StreamEvent::Metadata {
            thread_id: header.thread_id,
            sources: header.sources.unwrap_or_default(),
            in_kb: header.in_kb,
        });

        let body_start = (terminator + 1).min(self.buffer.len());
        self.buffer.drain(..body_start);
        self.phase = DecoderPhase::StreamingBody;
        self.emit_ready_body(events);
    }

    /// Emit every buffered byte that belongs to a complete UTF-8 sequence,
    /// keeping an unfinished trailing sequence for the next chunk. Invalid
    /// bytes inside the ready prefix are replaced, not held.
    fn emit_ready_body(&mut self, events: &mut Vec<StreamEvent>) {
        let ready_len = self.buffer.len() - incomplete_utf8_suffix_len(&self.buffer);
        if ready_len == 0 {
            return;
        }
        let ready: Vec<u8> = self.buffer.drain(..ready_len).collect();
        events.push(StreamEvent::BodyText(
            String::from_utf8_lossy(&ready).into_owned(),
        ));
    }
}

/// Length of an unfinished UTF-8 sequence at the end of `bytes`, at most 3.
/// A malformed tail (stray continuation bytes, invalid lead) reports 0 and is
/// left for lossy replacement.
fn incomplete_utf8_suffix_len(bytes: &[u8]) -> usize {
    let len = bytes.len();
    for idx in (len.saturating_sub(3)..len).rev() {
        let byte = bytes[idx];
        if byte & 0b1100_0000 == 0b1000_0000 {
            continue;
        }
        let width = match byte {
            _ if byte < 0x80 => 1,
            _ if byte & 0b1110_0000 == 0b1100_0000 => 2,
            _ if byte & 0b1111_0000 == 0b1110_0000 => 3,
            _ if byte & 0b1111_1000 == 0b1111_0000 => 4,
            _ => 1,
        };
        return if idx + width > len { len - idx } else { 0 };
    }
    0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Citation;

    fn metadata_event(events: &[StreamEvent]) -> (&Option<String>, &Vec<Citation>, &Option<bool>) {
        match events.first() {
            Some(StreamEvent::Metadata {
                thread_id,
                sources,
                in_kb,
            }) => (thread_id, sources, in_kb),
            other => panic!("expected metadata event, got {other:?}"),
        }
    }

    #[test]
    fn test_header_without_terminator_emits_nothing() {
        let mut decoder = AnswerDecoder::new();
        let events = decoder
            .process(b"{\"thread_id\":\"t1\",\"sour")
            .expect("partial header");
        assert!(events.is_empty());
        assert!(!decoder.is_terminated());
    }

    #[test]
    fn test_terminator_split_across_chunks() {
        let mut decoder = AnswerDecoder::new();
        assert!(decoder.process(b"{\"in_kb\":true}").expect("chunk").is_empty());
        let events = decoder.process(b"\nHi").expect("terminator chunk");
        assert_eq!(events.len(), 2);
        let (_, sources, in_kb) = metadata_event(&events);
        assert!(sources.is_empty());
        assert_eq!(*in_kb, Some(true));
        assert_eq!(events[1], StreamEvent::BodyText("Hi".to_string()));
    }

    #[test]
    fn test_header_and_body_in_single_chunk() {
        let mut decoder = AnswerDecoder::new();
        let events = decoder
            .process(b"{\"in_kb\":false}\nNot found.")
            .expect("bundled chunk");
        assert_eq!(events.len(), 2);
        let (thread_id, sources, in_kb) = metadata_event(&events);
        assert!(thread_id.is_none());
        assert!(sources.is_empty());
        assert_eq!(*in_kb, Some(false));
        assert_eq!(events[1], StreamEvent::BodyText("Not found.".to_string()));
    }

    #[test]
    fn test_header_missing_optional_fields_defaults() {
        let mut decoder = AnswerDecoder::new();
        let events = decoder.process(b"{}\n").expect("minimal header");
        assert_eq!(events.len(), 1);
        let (thread_id, sources, in_kb) = metadata_event(&events);
        assert!(thread_id.is_none());
        assert!(sources.is_empty());
        assert!(in_kb.is_none());
    }

    #[test]
    fn test_body_chunks_pass_through_verbatim() {
        let mut decoder = AnswerDecoder::new();
        decoder.process(b"{}\n").expect("header");
        let events = decoder.process(b"a { not json\n\n } b").expect("body");
        assert_eq!(
            events,
            vec![StreamEvent::BodyText("a { not json\n\n } b".to_string())]
        );
    }

    #[test]
    fn test_multibyte_character_split_is_held_until_complete() {
        let mut decoder = AnswerDecoder::new();
        decoder.process(b"{}\n").expect("header");

        // "café" split inside the two-byte e-acute (0xC3 0xA9).
        let bytes = "café".as_bytes();
        let events = decoder.process(&bytes[..4]).expect("chunk ending mid-character");
        assert_eq!(events, vec![StreamEvent::BodyText("caf".to_string())]);

        let events = decoder.process(&bytes[4..]).expect("continuation chunk");
        assert_eq!(events, vec![StreamEvent::BodyText("é".to_string())]);
    }

    #[test]
    fn test_four_byte_character_split_three_ways() {
        let mut decoder = AnswerDecoder::new();
        decoder.process(b"{}\n").expect("header");

        let bytes = "🦀!".as_bytes();
        assert!(decoder.process(&bytes[..1]).expect("lead byte").is_empty());
        assert!(decoder.process(&bytes[1..3]).expect("middle bytes").is_empty());
        let events = decoder.process(&bytes[3..]).expect("final bytes");
        assert_eq!(events, vec![StreamEvent::BodyText("🦀!".to_string())]);
    }

    #[test]
    fn test_truncated_multibyte_tail_flushed_lossily_at_end() {
        let mut decoder = AnswerDecoder::new();
        decoder.process(b"{}\n").expect("header");
        let events = decoder.process(b"ok \xC3").expect("dangling lead byte");
        assert_eq!(events, vec![StreamEvent::BodyText("ok ".to_string())]);

        let events = decoder.finish().expect("finish");
        assert_eq!(events, vec![StreamEvent::BodyText("\u{FFFD}".to_string())]);
    }

    #[test]
    fn test_malformed_header_is_logged_not_fatal() {
        let mut decoder = AnswerDecoder::new();
        let events = decoder.process(b"not json at all\n").expect("bad header");
        assert!(events.is_empty());
        assert!(!decoder.is_terminated());

        // The buffer keeps the malformed line, so later input never parses
        // either and the stream yields no events at all.
        let events = decoder.process(b"more text").expect("follow-up");
        assert!(events.is_empty());
        assert!(decoder.finish().expect("finish").is_empty());
    }

    #[test]
    fn test_error_header_terminates_stream() {
        let mut decoder = AnswerDecoder::new();
        let events = decoder
            .process(b"{\"error\":\"Rate limited. Try again.\"}\nleftover")
            .expect("error header");
        assert_eq!(
            events,
            vec![StreamEvent::StreamError(
                "Rate limited. Try again.".to_string()
            )]
        );
        assert!(decoder.is_terminated());

        let events = decoder.process(b"ignored").expect("post-error chunk");
        assert!(events.is_empty());
    }

    #[test]
    fn test_finish_flushes_newline_less_error_header() {
        let mut decoder = AnswerDecoder::new();
        assert!(decoder
            .process(b"{\"error\":\"Knowledge base is empty.\"}")
            .expect("error without newline")
            .is_empty());
        let events = decoder.finish().expect("finish");
        assert_eq!(
            events,
            vec![StreamEvent::StreamError(
                "Knowledge base is empty.".to_string()
            )]
        );
        assert!(decoder.is_terminated());
    }

    #[test]
    fn test_finish_after_body_emits_nothing() {
        let mut decoder = AnswerDecoder::new();
        decoder.process(b"{}\nanswer").expect("header and body");
        assert!(decoder.finish().expect("finish").is_empty());
        assert!(decoder.is_terminated());
    }
}
