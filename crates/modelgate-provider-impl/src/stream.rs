//! Dialect-agnostic framing decoder for provider byte streams (SPEC_FULL.md
//! §4.8). Sniffs SSE vs. NDJSON vs. a bare JSON array from the first
//! non-whitespace byte seen, then demuxes subsequent chunks the same way
//! regardless of which provider is on the other end; `Provider::parse_stream_frame`
//! interprets the resulting string payloads.

use bytes::Bytes;

use modelgate_protocol::sse::SseParser;

#[derive(Debug)]
enum Mode {
    Unknown,
    Sse(SseParser),
    Ndjson,
    JsonArray,
}

#[derive(Debug)]
pub struct StreamDecoder {
    mode: Mode,
    pending: String,
}

impl Default for StreamDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self {
            mode: Mode::Unknown,
            pending: String::new(),
        }
    }

    pub fn push(&mut self, chunk: &Bytes) -> Vec<String> {
        let Ok(text) = std::str::from_utf8(chunk) else {
            return Vec::new();
        };

        match &mut self.mode {
            Mode::Unknown => {
                self.pending.push_str(text);
                let combined = std::mem::take(&mut self.pending);
                let first_non_ws = combined.chars().find(|c| !c.is_whitespace());
                match first_non_ws {
                    None => {
                        self.pending = combined;
                        Vec::new()
                    }
                    Some('[') => {
                        self.mode = Mode::JsonArray;
                        self.pending = combined;
                        drain_json_array(&mut self.pending)
                    }
                    Some('{') => {
                        self.mode = Mode::Ndjson;
                        self.pending = combined;
                        drain_ndjson(&mut self.pending)
                    }
                    _ => {
                        let mut parser = SseParser::new();
                        let events = parser.push_str(&combined);
                        self.mode = Mode::Sse(parser);
                        events
                            .into_iter()
                            .filter(|event| !event.data.is_empty())
                            .map(|event| event.data)
                            .collect()
                    }
                }
            }
            Mode::Sse(parser) => parser
                .push_str(text)
                .into_iter()
                .filter(|event| !event.data.is_empty())
                .map(|event| event.data)
                .collect(),
            Mode::Ndjson => {
                self.pending.push_str(text);
                drain_ndjson(&mut self.pending)
            }
            Mode::JsonArray => {
                self.pending.push_str(text);
                drain_json_array(&mut self.pending)
            }
        }
    }

    pub fn finish(&mut self) -> Vec<String> {
        match &mut self.mode {
            Mode::Unknown => {
                let pending = self.pending.trim();
                if pending.is_empty() {
                    Vec::new()
                } else {
                    vec![pending.to_string()]
                }
            }
            Mode::Sse(parser) => parser
                .finish()
                .into_iter()
                .filter(|event| !event.data.is_empty())
                .map(|event| event.data)
                .collect(),
            Mode::Ndjson | Mode::JsonArray => {
                let pending = self.pending.trim();
                if pending.is_empty() {
                    Vec::new()
                } else {
                    vec![pending.to_string()]
                }
            }
        }
    }
}

fn drain_ndjson(buffer: &mut String) -> Vec<String> {
    let mut frames = Vec::new();
    while let Some(pos) = buffer.find('\n') {
        let line = buffer[..pos].trim().to_string();
        buffer.drain(..=pos);
        if !line.is_empty() {
            frames.push(line);
        }
    }
    frames
}

/// Splits top-level JSON objects out of a (possibly still-growing) `[ ... ]`
/// array by bracket depth, ignoring braces inside string literals.
fn drain_json_array(buffer: &mut String) -> Vec<String> {
    let mut frames = Vec::new();
    let mut depth: i32 = 0;
    let mut in_string = false;
    let mut escaped = false;
    let mut start: Option<usize> = None;
    let mut consumed = 0;

    for (idx, ch) in buffer.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' | '[' => {
                if depth == 0 && ch == '{' {
                    start = Some(idx);
                }
                depth += 1;
            }
            '}' => {
                depth -= 1;
                if depth == 1 {
                    if let Some(s) = start.take() {
                        frames.push(buffer[s..=idx].to_string());
                        consumed = idx + ch.len_utf8();
                    }
                }
            }
            ']' => {
                depth -= 1;
            }
            _ => {}
        }
    }

    if consumed > 0 {
        buffer.drain(..consumed);
    }
    frames
}
