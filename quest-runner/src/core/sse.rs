//! Incremental decoder for `data: `-prefixed chat completion streams.
//!
//! Bytes are fed as they arrive; only complete lines are decoded, so a line or a
//! multi-byte character split across reads is reassembled before parsing.

use serde_json::Value;

const DATA_PREFIX: &str = "data: ";
const DONE_SENTINEL: &str = "[DONE]";

/// One decoded stream event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Incremental text fragment.
    Fragment(String),
    /// A line that could not be parsed; the stream continues.
    Malformed { line: String, error: String },
    /// End-of-stream sentinel.
    Done,
}

/// Line-buffered stream decoder.
#[derive(Debug, Default)]
pub struct StreamDecoder {
    pending: Vec<u8>,
    done: bool,
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once the `[DONE]` sentinel has been decoded.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feed raw bytes and return events for every completed line.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<StreamEvent> {
        if self.done {
            return Vec::new();
        }
        self.pending.extend_from_slice(bytes);
        let mut events = Vec::new();
        while let Some(newline) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=newline).collect();
            self.decode_line(&line, &mut events);
            if self.done {
                self.pending.clear();
                break;
            }
        }
        events
    }

    /// Decode any trailing partial line at channel close.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if !self.done && !self.pending.is_empty() {
            let line = std::mem::take(&mut self.pending);
            self.decode_line(&line, &mut events);
        }
        self.pending.clear();
        events
    }

    fn decode_line(&mut self, raw: &[u8], events: &mut Vec<StreamEvent>) {
        let line = String::from_utf8_lossy(raw);
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        let payload = line.strip_prefix(DATA_PREFIX).unwrap_or(line).trim();
        if payload == DONE_SENTINEL {
            self.done = true;
            events.push(StreamEvent::Done);
            return;
        }
        if payload.is_empty() {
            return;
        }
        match serde_json::from_str::<Value>(payload) {
            Ok(value) => {
                if let Some(fragment) = delta_content(&value) {
                    events.push(StreamEvent::Fragment(fragment.to_string()));
                }
            }
            Err(err) => events.push(StreamEvent::Malformed {
                line: line.to_string(),
                error: err.to_string(),
            }),
        }
    }
}

/// Read `choices[0].delta.content`; empty or missing content yields `None`.
fn delta_content(value: &Value) -> Option<&str> {
    value
        .pointer("/choices/0/delta/content")
        .and_then(Value::as_str)
        .filter(|content| !content.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(content: &str) -> String {
        format!(
            "data: {}\n",
            serde_json::json!({"choices": [{"delta": {"content": content}}]})
        )
    }

    fn fragments(events: &[StreamEvent]) -> String {
        events
            .iter()
            .filter_map(|event| match event {
                StreamEvent::Fragment(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn decodes_fragments_in_order() {
        let mut decoder = StreamDecoder::new();
        let mut events = decoder.feed(chunk("Hello").as_bytes());
        events.extend(decoder.feed(chunk(", world").as_bytes()));
        events.extend(decoder.feed(b"data: [DONE]\n"));
        assert_eq!(fragments(&events), "Hello, world");
        assert_eq!(events.last(), Some(&StreamEvent::Done));
        assert!(decoder.is_done());
    }

    #[test]
    fn reassembles_line_split_across_feeds() {
        let line = chunk("split");
        let (head, tail) = line.split_at(10);
        let mut decoder = StreamDecoder::new();
        assert!(decoder.feed(head.as_bytes()).is_empty());
        let events = decoder.feed(tail.as_bytes());
        assert_eq!(events, vec![StreamEvent::Fragment("split".to_string())]);
    }

    #[test]
    fn reassembles_multibyte_character_split_across_feeds() {
        let line = chunk("café");
        let bytes = line.as_bytes();
        let cut = line.find('é').expect("é") + 1;
        let mut decoder = StreamDecoder::new();
        let mut events = decoder.feed(&bytes[..cut]);
        events.extend(decoder.feed(&bytes[cut..]));
        assert_eq!(fragments(&events), "café");
    }

    #[test]
    fn malformed_line_is_reported_and_skipped() {
        let mut decoder = StreamDecoder::new();
        let mut events = decoder.feed(b"data: {not json\n");
        events.extend(decoder.feed(chunk("ok").as_bytes()));
        assert!(matches!(events[0], StreamEvent::Malformed { .. }));
        assert_eq!(fragments(&events), "ok");
    }

    #[test]
    fn chunks_without_content_are_ignored() {
        let mut decoder = StreamDecoder::new();
        let events =
            decoder.feed(b"data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\r\n\r\n");
        assert!(events.is_empty());
    }

    #[test]
    fn input_after_done_is_ignored() {
        let mut decoder = StreamDecoder::new();
        let mut payload = b"data: [DONE]\n".to_vec();
        payload.extend_from_slice(chunk("late").as_bytes());
        let events = decoder.feed(&payload);
        assert_eq!(events, vec![StreamEvent::Done]);
        assert!(decoder.feed(chunk("later").as_bytes()).is_empty());
    }

    #[test]
    fn finish_flushes_unterminated_line() {
        let mut decoder = StreamDecoder::new();
        let line = chunk("tail");
        assert!(decoder.feed(line.trim_end().as_bytes()).is_empty());
        assert_eq!(
            decoder.finish(),
            vec![StreamEvent::Fragment("tail".to_string())]
        );
    }
}
