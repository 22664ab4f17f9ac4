use crate::error::FrameParseError;
use crate::CHANNEL_COUNT;
use log::{debug, trace};

const FIELD_SEPARATOR: char = ';';

/// Longest unterminated line kept in the accumulator. Twelve `i64` fields with
/// separators fit in well under this.
pub const MAX_LINE_LEN: usize = 1024;

/// One line of raw integer samples, one per channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    pub values: [i64; CHANNEL_COUNT],
}

impl Frame {
    pub fn new(values: [i64; CHANNEL_COUNT]) -> Self {
        Self { values }
    }
}

/// Parse a single line (without its newline) into a frame.
pub fn parse_line(line: &str) -> Result<Frame, FrameParseError> {
    let line = line.trim();
    if line.is_empty() {
        return Err(FrameParseError::EmptyLine);
    }

    let tokens: Vec<&str> = line.split(FIELD_SEPARATOR).map(str::trim).collect();
    if tokens.len() != CHANNEL_COUNT {
        return Err(FrameParseError::FieldCount {
            expected: CHANNEL_COUNT,
            got: tokens.len(),
        });
    }

    let mut values = [0i64; CHANNEL_COUNT];
    for (index, (slot, token)) in values.iter_mut().zip(tokens).enumerate() {
        if token.is_empty() {
            return Err(FrameParseError::EmptyField { index });
        }
        *slot = token
            .parse::<i64>()
            .map_err(|source| FrameParseError::InvalidField {
                index,
                token: token.to_string(),
                source,
            })?;
    }

    Ok(Frame { values })
}

/// Accumulates transport bytes and splits them into newline-delimited frames.
#[derive(Debug, Default)]
pub struct FrameReader {
    buffer: Vec<u8>,
}

impl FrameReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append transport bytes. An unterminated tail longer than [`MAX_LINE_LEN`] is dropped.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);

        let tail_start = self
            .buffer
            .iter()
            .rposition(|&b| b == b'\n')
            .map_or(0, |newline| newline + 1);
        let tail_len = self.buffer.len() - tail_start;
        if tail_len > MAX_LINE_LEN {
            debug!("Discarding {} bytes without a line terminator", tail_len);
            self.buffer.truncate(tail_start);
        }
    }

    pub fn has_complete_line(&self) -> bool {
        self.buffer.contains(&b'\n')
    }

    /// Bytes buffered but not yet consumed.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Take the first complete line off the accumulator and parse it.
    ///
    /// Returns `None` when no newline has arrived yet. A malformed line is consumed
    /// and reported; whatever follows it stays buffered.
    pub fn next_frame(&mut self) -> Option<Result<Frame, FrameParseError>> {
        let newline = self.buffer.iter().position(|&b| b == b'\n')?;
        let line: Vec<u8> = self.buffer.drain(..=newline).collect();
        let line = &line[..newline];

        if !line.is_ascii() {
            debug!("Discarding non-ASCII line: {}", hex::encode(line));
            return Some(Err(FrameParseError::NotAscii));
        }

        // ASCII is always valid UTF-8
        let text = String::from_utf8_lossy(line);
        let result = parse_line(&text);
        match &result {
            Ok(frame) => trace!("Parsed frame {:?}", frame.values),
            Err(e) => debug!("Discarding line {:?}: {}", text, e),
        }
        Some(result)
    }

    /// Append `bytes` and return the next well-formed frame, if any.
    pub fn read_frame(&mut self, bytes: &[u8]) -> Option<Frame> {
        self.extend(bytes);
        self.next_frame().and_then(Result::ok)
    }
}
