//! Generated table for running without a server.

use futures::Stream;
use rowcache_lib::{Column, MemoryRowSource, Row, SourceError, StreamMessage};

/// Rows per `batch` message of the demo stream.
const STREAM_CHUNK: usize = 64;

pub fn columns() -> Vec<Column> {
    vec![
        Column::new("id", "BIGINT"),
        Column::new("name", "VARCHAR"),
        Column::new("score", "DOUBLE"),
        Column::new("active", "BOOLEAN"),
    ]
}

fn row(index: usize) -> Row {
    Row::new()
        .set("id", index as i64)
        .set("name", format!("user-{:05}", index))
        .set("score", (index % 1000) as f64 / 10.0)
        .set("active", index % 3 != 0)
}

pub fn rows(total: usize) -> Vec<Row> {
    (0..total).map(row).collect()
}

pub fn source(total: usize) -> MemoryRowSource {
    MemoryRowSource::new(columns(), rows(total))
}

/// The demo table as a row stream, `limit` rows from `offset`.
pub fn stream(
    total: usize,
    limit: usize,
    offset: usize,
) -> impl Stream<Item = Result<StreamMessage, SourceError>> {
    let end = offset.saturating_add(limit).min(total);
    let mut messages = vec![StreamMessage::Metadata {
        columns: columns(),
        total,
        batch_size: Some(STREAM_CHUNK),
    }];

    let mut start = offset;
    while start < end {
        let chunk_end = (start + STREAM_CHUNK).min(end);
        messages.push(StreamMessage::Batch {
            offset: start,
            data: (start..chunk_end).map(row).collect(),
        });
        start = chunk_end;
    }
    messages.push(StreamMessage::Complete {
        total_loaded: end.saturating_sub(offset),
    });

    futures::stream::iter(messages.into_iter().map(Ok))
}
