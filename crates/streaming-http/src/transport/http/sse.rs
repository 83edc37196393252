/// Largest frame (pending line plus buffered data lines) the decoder holds.
pub(crate) const DEFAULT_MAX_FRAME_BYTES: usize = 1024 * 1024;

/// One server-sent event frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SseFrame {
    pub event: Option<String>,
    pub id: Option<String>,
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("event frame exceeds {limit} bytes")]
pub(crate) struct FrameTooLarge {
    pub limit: usize,
}

#[derive(Default)]
struct PendingFrame {
    event: Option<String>,
    id: Option<String>,
    data: Vec<String>,
    data_bytes: usize,
}

impl PendingFrame {
    fn accept_line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.event = Some(value.to_string()),
            "id" => self.id = Some(value.to_string()),
            "data" => {
                self.data_bytes += value.len() + 1;
                self.data.push(value.to_string());
            }
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        let frame = std::mem::take(self);
        if frame.data.is_empty() {
            return None;
        }
        Some(SseFrame {
            event: frame.event,
            id: frame.id,
            data: frame.data.join("\n"),
        })
    }
}

/// Incremental decoder for `text/event-stream` bodies.
///
/// Lines end in LF, CRLF or a lone CR; chunks may split lines (and a CRLF
/// pair) anywhere. Each byte is scanned once.
pub(crate) struct SseDecoder {
    /// Bytes of the current, unterminated line.
    line: Vec<u8>,
    /// The previous chunk ended in CR, so a leading LF belongs to it.
    after_cr: bool,
    frame: PendingFrame,
    max_frame_bytes: usize,
}

impl Default for SseDecoder {
    fn default() -> Self {
        Self::with_limit(DEFAULT_MAX_FRAME_BYTES)
    }
}

impl SseDecoder {
    pub fn with_limit(max_frame_bytes: usize) -> Self {
        Self {
            line: Vec::new(),
            after_cr: false,
            frame: PendingFrame::default(),
            max_frame_bytes,
        }
    }

    pub fn push_chunk(&mut self, chunk: &[u8]) -> Result<Vec<SseFrame>, FrameTooLarge> {
        let mut frames = Vec::new();
        let mut rest = chunk;
        if self.after_cr && !rest.is_empty() {
            self.after_cr = false;
            if let Some(tail) = rest.strip_prefix(b"\n") {
                rest = tail;
            }
        }
        while let Some(end) = rest.iter().position(|b| *b == b'\n' || *b == b'\r') {
            self.line.extend_from_slice(&rest[..end]);
            self.check_size()?;
            let mut next = end + 1;
            if rest[end] == b'\r' {
                match rest.get(next) {
                    Some(b'\n') => next += 1,
                    Some(_) => {}
                    None => self.after_cr = true,
                }
            }
            if let Some(frame) = self.finish_line() {
                frames.push(frame);
            }
            rest = &rest[next..];
        }
        self.line.extend_from_slice(rest);
        self.check_size()?;
        Ok(frames)
    }

    /// Flushes a trailing frame the server did not terminate with a blank line.
    pub fn finish(&mut self) -> Option<SseFrame> {
        self.after_cr = false;
        let trailing = if self.line.is_empty() {
            None
        } else {
            self.finish_line()
        };
        trailing.or_else(|| self.frame.dispatch())
    }

    fn finish_line(&mut self) -> Option<SseFrame> {
        let line = std::mem::take(&mut self.line);
        self.frame.accept_line(&String::from_utf8_lossy(&line))
    }

    fn check_size(&mut self) -> Result<(), FrameTooLarge> {
        if self.line.len() + self.frame.data_bytes > self.max_frame_bytes {
            self.line.clear();
            self.frame = PendingFrame::default();
            return Err(FrameTooLarge {
                limit: self.max_frame_bytes,
            });
        }
        Ok(())
    }
}
