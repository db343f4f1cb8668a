//! Visible range tracking and overscan.

use crate::fetch::BatchFetcher;
use crate::fetch::FetchPlan;

/// An inclusive range of row indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Viewport {
    /// First row.
    pub start: usize,
    /// Last row, inclusive.
    pub end: usize,
}

impl Viewport {
    /// Creates a viewport, swapping the bounds if they are reversed.
    pub fn new(start: usize, end: usize) -> Self {
        if start <= end {
            Self { start, end }
        } else {
            Self { start: end, end: start }
        }
    }

    pub fn contains(&self, row: usize) -> bool {
        (self.start..=self.end).contains(&row)
    }

    /// Widens the viewport by `overscan` rows on each side, clamped to a
    /// table of `total` rows.
    ///
    /// Returns `None` when the table is empty or the viewport lies entirely
    /// past its end.
    pub fn buffer(&self, overscan: usize, total: usize) -> Option<Viewport> {
        let last = total.checked_sub(1)?;
        let start = self.start.saturating_sub(overscan);
        let end = self.end.saturating_add(overscan).min(last);
        (start <= end).then_some(Viewport { start, end })
    }
}

/// Maps visible ranges to batch requests.
#[derive(Clone)]
pub struct ViewportController {
    fetcher: BatchFetcher,
    overscan: usize,
}

impl ViewportController {
    pub(crate) fn new(fetcher: BatchFetcher, overscan: usize) -> Self {
        Self { fetcher, overscan }
    }

    pub fn overscan(&self) -> usize {
        self.overscan
    }

    pub fn fetcher(&self) -> &BatchFetcher {
        &self.fetcher
    }

    /// Records `start..=end` as the visible range and requests every batch
    /// overlapping it, widened by the overscan margin.
    pub fn set_visible_range(&self, start: usize, end: usize) -> FetchPlan {
        let visible = Viewport::new(start, end);
        let total = {
            let mut state = self.fetcher.shared().lock();
            if state.closed {
                return FetchPlan::default();
            }
            state.viewport = Some(visible);
            state.cache.total()
        };

        match visible.buffer(self.overscan, total) {
            Some(buffered) => self.fetcher.request_range(buffered.start, buffered.end),
            None => FetchPlan::default(),
        }
    }

    /// The last range passed to [`set_visible_range`](Self::set_visible_range).
    pub fn visible_range(&self) -> Option<Viewport> {
        self.fetcher.shared().lock().viewport
    }

    /// Re-issues the last visible range, for example after a reset.
    pub fn refresh(&self) -> FetchPlan {
        match self.visible_range() {
            Some(visible) => self.set_visible_range(visible.start, visible.end),
            None => FetchPlan::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_orders_bounds() {
        assert_eq!(Viewport::new(9, 3), Viewport { start: 3, end: 9 });
        assert_eq!(Viewport::new(3, 3), Viewport { start: 3, end: 3 });
    }

    #[test]
    fn test_buffer_widens_and_clamps() {
        let visible = Viewport::new(180, 220);
        assert_eq!(visible.buffer(20, 250), Some(Viewport::new(160, 240)));
        assert_eq!(visible.buffer(40, 250), Some(Viewport::new(140, 249)));
        assert_eq!(Viewport::new(5, 10).buffer(20, 250), Some(Viewport::new(0, 30)));
    }

    #[test]
    fn test_buffer_empty_table() {
        assert_eq!(Viewport::new(0, 10).buffer(20, 0), None);
    }

    #[test]
    fn test_buffer_past_end() {
        assert_eq!(Viewport::new(300, 320).buffer(20, 250), None);
        assert_eq!(Viewport::new(260, 300).buffer(20, 250), Some(Viewport::new(240, 249)));
    }

    #[test]
    fn test_contains() {
        let visible = Viewport::new(10, 20);
        assert!(visible.contains(10));
        assert!(visible.contains(20));
        assert!(!visible.contains(21));
    }
}
