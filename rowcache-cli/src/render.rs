//! Plain text rendering of a cached window.

use std::fmt::Write;
use std::ops::Range;

use rowcache_lib::{LoadState, TableSession};

/// Cell text for a row that is not loaded yet.
pub const PLACEHOLDER: &str = "...";

/// Renders rows `range` as tab separated lines with a header.
///
/// Only `columns` are shown when given, otherwise the selected columns, or
/// every column if none are selected. Missing rows render as placeholders.
pub fn window(session: &TableSession, range: Range<usize>, columns: &[String]) -> String {
    let columns: Vec<String> = if !columns.is_empty() {
        columns.to_vec()
    } else {
        let selected = session.selected_columns();
        if selected.is_empty() {
            session.columns().into_iter().map(|c| c.name).collect()
        } else {
            selected
        }
    };

    let mut out = String::new();
    let _ = writeln!(out, "#\t{}", columns.join("\t"));

    let start = range.start;
    for (i, row) in session.rows(range).into_iter().enumerate() {
        let cells: Vec<String> = match row {
            Some(row) => columns.iter().map(|c| row.display(c)).collect(),
            None => vec![PLACEHOLDER.to_string(); columns.len()],
        };
        let _ = writeln!(out, "{}\t{}", start + i, cells.join("\t"));
    }
    out
}

/// One line summary, e.g. `Loaded 300 of 1000 rows (30%)`.
pub fn status(state: &LoadState) -> String {
    let mut line = format!(
        "Loaded {} of {} rows ({:.0}%)",
        state.loaded_rows,
        state.total,
        state.progress() * 100.0
    );
    if state.is_bulk_loading {
        line.push_str(", streaming");
    }
    if let Some(error) = &state.error {
        let _ = write!(line, ", error: {}", error);
    }
    line
}
