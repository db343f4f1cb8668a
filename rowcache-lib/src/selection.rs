//! Column selection state.

use std::collections::HashSet;

use crate::model::Column;

/// The set of columns a user picked for display.
///
/// Selection is by name and survives row resets. Names that are not
/// columns of the current schema are ignored on entry and pruned when the
/// schema changes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnSelection {
    selected: HashSet<String>,
}

impl ColumnSelection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flips `name` in or out of the selection. Returns whether it is now
    /// selected. Unknown names are ignored and report `false`.
    pub fn toggle(&mut self, name: &str, columns: &[Column]) -> bool {
        if !is_known(name, columns) {
            log::warn!("Ignoring toggle of unknown column {}", name);
            return false;
        }
        if self.selected.remove(name) {
            false
        } else {
            self.selected.insert(name.to_string());
            true
        }
    }

    /// Selects every column.
    pub fn select_all(&mut self, columns: &[Column]) {
        self.selected = columns.iter().map(|c| c.name.clone()).collect();
    }

    pub fn clear(&mut self) {
        self.selected.clear();
    }

    /// Replaces the selection. Unknown names are dropped.
    pub fn set_explicit<I, S>(&mut self, names: I, columns: &[Column])
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.selected.clear();
        for name in names {
            let name = name.as_ref();
            if is_known(name, columns) {
                self.selected.insert(name.to_string());
            } else {
                log::warn!("Ignoring unknown column {} in selection", name);
            }
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.selected.contains(name)
    }

    pub fn len(&self) -> usize {
        self.selected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    /// Selected names in schema order.
    pub fn ordered(&self, columns: &[Column]) -> Vec<String> {
        columns
            .iter()
            .filter(|c| self.selected.contains(&c.name))
            .map(|c| c.name.clone())
            .collect()
    }

    /// Drops names that are not in `columns`.
    pub fn retain_columns(&mut self, columns: &[Column]) {
        self.selected.retain(|name| is_known(name, columns));
    }
}

fn is_known(name: &str, columns: &[Column]) -> bool {
    columns.iter().any(|c| c.name == name)
}
