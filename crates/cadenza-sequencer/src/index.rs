//! Static interval index over beat ranges.
//!
//! Built once per arrangement snapshot, queried from the audio thread. Entries
//! are sorted by start; `max_end[i]` is the largest end among entries `0..=i`,
//! which makes the prefix that can still overlap a query binary-searchable.

/// Half-open interval `[start, end)` carrying a payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Interval<T> {
    pub start: f64,
    pub end: f64,
    pub value: T,
}

#[derive(Debug, Clone)]
pub struct IntervalIndex<T> {
    entries: Vec<Interval<T>>,
    max_end: Vec<f64>,
}

impl<T> Default for IntervalIndex<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            max_end: Vec::new(),
        }
    }
}

impl<T> IntervalIndex<T> {
    /// Empty intervals are discarded. Ties on start keep input order.
    pub fn build(mut entries: Vec<Interval<T>>) -> Self {
        entries.retain(|e| e.end > e.start);
        entries.sort_by(|a, b| a.start.total_cmp(&b.start));
        let mut max_end = Vec::with_capacity(entries.len());
        let mut running = f64::NEG_INFINITY;
        for e in &entries {
            running = running.max(e.end);
            max_end.push(running);
        }
        Self { entries, max_end }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Interval<T>> {
        self.entries.iter()
    }

    /// Entries overlapping `[start, end)`, in start order. Allocation-free.
    pub fn query(&self, start: f64, end: f64) -> impl Iterator<Item = &Interval<T>> {
        // max_end is non-decreasing, so everything before `lo` ended by `start`.
        let lo = self.max_end.partition_point(|&m| m <= start);
        let hi = self.entries.partition_point(|e| e.start < end);
        self.entries[lo..hi.max(lo)]
            .iter()
            .filter(move |e| e.end > start)
    }
}
