use serde_json::Value;

/// Prefix of event-stream lines that carry a payload.
const DATA_PREFIX: &str = "data:";
/// Payload marking the logical end of a conversation stream.
const DONE_SENTINEL: &str = "[DONE]";

/// Incremental line splitter for a server-sent event stream.
///
/// Chunks may end anywhere, including inside a line or inside a multi-byte
/// UTF-8 sequence. Complete lines are drained as soon as they are seen, so
/// the decoder only ever holds the unterminated tail.
#[derive(Debug, Default)]
pub struct EventStreamDecoder {
    buffer: String,
    /// Trailing bytes of an incomplete UTF-8 sequence.
    pending: Vec<u8>,
}

impl EventStreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk and return every line it completed. Blank lines
    /// (frame separators) are not returned.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.decode(chunk);
        self.drain_lines()
    }

    /// Flush at end of stream, including a last line with no newline.
    pub fn finish(&mut self) -> Vec<String> {
        if !self.pending.is_empty() {
            let tail = std::mem::take(&mut self.pending);
            self.buffer.push_str(&String::from_utf8_lossy(&tail));
        }
        let mut lines = self.drain_lines();
        let rest = std::mem::take(&mut self.buffer);
        let rest = strip_cr(&rest);
        if !rest.is_empty() {
            lines.push(rest.to_string());
        }
        lines
    }

    /// Bytes currently held back (unterminated line plus partial UTF-8).
    pub fn buffered(&self) -> usize {
        self.buffer.len() + self.pending.len()
    }

    fn decode(&mut self, chunk: &[u8]) {
        let mut input = std::mem::take(&mut self.pending);
        input.extend_from_slice(chunk);

        let mut rest: &[u8] = &input;
        loop {
            match std::str::from_utf8(rest) {
                Ok(text) => {
                    self.buffer.push_str(text);
                    return;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    if let Ok(text) = std::str::from_utf8(&rest[..valid]) {
                        self.buffer.push_str(text);
                    }
                    match e.error_len() {
                        Some(bad) => {
                            self.buffer.push(char::REPLACEMENT_CHARACTER);
                            rest = &rest[valid + bad..];
                        }
                        None => {
                            // Incomplete sequence at the end; wait for the next chunk.
                            self.pending = rest[valid..].to_vec();
                            return;
                        }
                    }
                }
            }
        }
    }

    fn drain_lines(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(pos) = self.buffer[start..].find('\n') {
            let end = start + pos;
            let line = strip_cr(&self.buffer[start..end]);
            if !line.is_empty() {
                lines.push(line.to_string());
            }
            start = end + 1;
        }
        self.buffer.drain(..start);
        lines
    }
}

fn strip_cr(line: &str) -> &str {
    line.strip_suffix('\r').unwrap_or(line)
}

/// Parse one event-stream line into its JSON payload.
///
/// `None` for non-`data:` lines, empty payloads, the `[DONE]` sentinel and
/// payloads that are not valid JSON. Keepalives and garbage are expected on
/// the wire and are dropped here rather than reported.
pub fn parse_data_line(line: &str) -> Option<Value> {
    let payload = line.strip_prefix(DATA_PREFIX)?.trim();
    if payload.is_empty() || payload == DONE_SENTINEL {
        return None;
    }
    serde_json::from_str(payload).ok()
}
