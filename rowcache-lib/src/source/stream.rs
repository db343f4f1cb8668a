//! Line-delimited (NDJSON) streaming format.
//!
//! The streaming variant of the data endpoint writes one JSON object per
//! line: a schema announcement, any number of row batches tagged with their
//! starting offset, then a terminal `complete` or `error` marker.

use serde::Deserialize;
use serde::Serialize;

use crate::model::Column;
use crate::model::Row;

/// MIME type of the streaming response.
pub const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

/// One line of a streamed response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamMessage {
    /// Schema and total announcement; always the first line.
    Metadata {
        /// Table columns.
        columns: Vec<Column>,
        /// Total rows in the table.
        total: usize,
        /// Rows per `batch` line chosen by the server.
        #[serde(rename = "batchSize")]
        batch_size: Option<usize>,
    },
    /// A run of rows starting at absolute row `offset`.
    Batch {
        /// Absolute index of the first row in `data`.
        offset: usize,
        /// The rows.
        data: Vec<Row>,
    },
    /// Terminal marker for a successful stream.
    Complete {
        /// Number of rows sent.
        #[serde(rename = "totalLoaded")]
        total_loaded: usize,
    },
    /// Terminal marker for a failed stream.
    Error {
        /// Error message.
        error: String,
    },
}

impl StreamMessage {
    /// Returns `true` for `complete` and `error` messages.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete { .. } | Self::Error { .. })
    }
}

/// Incremental NDJSON decoder.
///
/// Accepts arbitrary byte chunks (lines may be split anywhere, including
/// inside a multi-byte character) and yields every complete message. The
/// trailing partial line stays buffered until more bytes or
/// [`finish`](Self::finish) arrive. Lines that fail to decode are logged and
/// skipped.
#[derive(Debug, Default)]
pub struct NdjsonDecoder {
    buffer: Vec<u8>,
    /// Leading bytes of `buffer` known to hold no newline.
    scanned: usize,
}

impl NdjsonDecoder {
    /// Creates a new decoder with an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a chunk and returns the messages completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<StreamMessage> {
        self.buffer.extend_from_slice(chunk);

        let mut messages = Vec::new();
        let mut start = 0;
        while let Some(found) = self.buffer[self.scanned..].iter().position(|b| *b == b'\n') {
            let end = self.scanned + found;
            if let Some(message) = decode_line(&self.buffer[start..end]) {
                messages.push(message);
            }
            start = end + 1;
            self.scanned = start;
        }
        self.buffer.drain(..start);
        self.scanned = self.buffer.len();
        messages
    }

    /// Decodes whatever is left in the buffer at end of input.
    pub fn finish(&mut self) -> Option<StreamMessage> {
        let rest = std::mem::take(&mut self.buffer);
        self.scanned = 0;
        decode_line(&rest)
    }

    /// Returns the number of buffered bytes not yet forming a full line.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

fn decode_line(line: &[u8]) -> Option<StreamMessage> {
    let line = line.trim_ascii();
    if line.is_empty() {
        return None;
    }
    match serde_json::from_slice(line) {
        Ok(message) => Some(message),
        Err(e) => {
            log::warn!(
                "Skipping undecodable stream line ({}): {}",
                e,
                String::from_utf8_lossy(line)
            );
            None
        }
    }
}
