use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FramingError {
    #[error("line exceeds {limit} bytes without a newline")]
    LineTooLong { limit: usize },
}

/// One complete line taken off the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Message(String),
    /// The line was not valid UTF-8.
    Malformed(String),
}

/// Splits a byte stream into trimmed, non-empty newline-terminated lines,
/// keeping any trailing partial line for the next read.
#[derive(Debug)]
pub struct LineFramer {
    pending: Vec<u8>,
    max_line: usize,
}

impl LineFramer {
    pub fn new(max_line: usize) -> Self {
        Self {
            pending: Vec::new(),
            max_line,
        }
    }

    pub fn push(&mut self, bytes: &[u8]) -> Result<Vec<Frame>, FramingError> {
        self.pending.extend_from_slice(bytes);

        let mut frames = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.pending[start..].iter().position(|&b| b == b'\n') {
            let end = start + offset;
            if end - start > self.max_line {
                self.pending.clear();
                return Err(FramingError::LineTooLong {
                    limit: self.max_line,
                });
            }
            let line = self.pending[start..end].trim_ascii();
            if !line.is_empty() {
                frames.push(match std::str::from_utf8(line) {
                    Ok(text) => Frame::Message(text.to_string()),
                    Err(e) => Frame::Malformed(e.to_string()),
                });
            }
            start = end + 1;
        }
        self.pending.drain(..start);

        if self.pending.len() > self.max_line {
            self.pending.clear();
            return Err(FramingError::LineTooLong {
                limit: self.max_line,
            });
        }

        Ok(frames)
    }

    /// Bytes held back waiting for a newline.
    pub fn buffered(&self) -> usize {
        self.pending.len()
    }
}
