//! Incremental Server-Sent Events decoder.

use crate::constants::MAX_SSE_EVENT_BYTES;
use crate::error::BridgeError;

/// One dispatched SSE event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// Event type; `message` when the block has no `event:` field.
    pub event: String,
    /// `data:` lines joined with `\n`.
    pub data: String,
}

/// Splits a byte stream into events on blank-line boundaries.
///
/// `\r\n`, `\r` and `\n` all end a line, even when a CRLF pair is split
/// across chunks. Bytes after the last boundary stay buffered until the next
/// chunk, so events and multi-byte characters may straddle reads.
#[derive(Debug)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    after_cr: bool,
    limit: usize,
}

impl Default for SseDecoder {
    fn default() -> Self {
        Self::with_limit(MAX_SSE_EVENT_BYTES)
    }
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decoder that fails once an unfinished event exceeds `limit` bytes.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            buffer: Vec::new(),
            after_cr: false,
            limit,
        }
    }

    /// Feed one chunk and return every event it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<SseEvent>, BridgeError> {
        for &byte in chunk {
            let after_cr = std::mem::replace(&mut self.after_cr, byte == b'\r');
            match byte {
                b'\n' if after_cr => {}
                b'\r' => self.buffer.push(b'\n'),
                _ => self.buffer.push(byte),
            }
        }

        let mut events = Vec::new();
        while let Some(end) = find_boundary(&self.buffer) {
            let block: Vec<u8> = self.buffer.drain(..end + 2).collect();
            if let Some(event) = parse_block(&String::from_utf8_lossy(&block[..end])) {
                events.push(event);
            }
        }

        if self.buffer.len() > self.limit {
            self.buffer.clear();
            return Err(BridgeError::EventTooLarge { limit: self.limit });
        }
        Ok(events)
    }

    /// Bytes waiting for the rest of their event.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

fn find_boundary(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|w| w == b"\n\n")
}

fn parse_block(block: &str) -> Option<SseEvent> {
    let mut event = None;
    let mut data: Option<String> = None;

    for line in block.split('\n') {
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => event = Some(value.to_string()),
            "data" => match data.as_mut() {
                Some(existing) => {
                    existing.push('\n');
                    existing.push_str(value);
                }
                None => data = Some(value.to_string()),
            },
            _ => {}
        }
    }

    // Comment-only blocks (keep-alives) dispatch nothing.
    let data = data?;
    Some(SseEvent {
        event: event.unwrap_or_else(|| "message".to_string()),
        data,
    })
}
