//! Time-series facet: decimated range queries and gap detection.

use crate::error::{CoreError, CoreResult};
use crate::store::Store;
use std::collections::{BTreeSet, HashSet};
use tristore_codec::Value;

/// A timestamped value.
pub type Point = (i64, Value);

/// Parameters of a [`TimeSeries::range`] query.
///
/// Unset bounds default to the earliest and latest stored timestamps.
/// Unset `freq` falls back to the store's default frequency; with neither,
/// every point in range is returned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RangeQuery {
    /// Inclusive lower bound.
    pub start: Option<i64>,
    /// Inclusive upper bound.
    pub end: Option<i64>,
    /// Maximum number of points returned.
    pub limit: Option<usize>,
    /// Decimation frequency.
    pub freq: Option<i64>,
}

impl RangeQuery {
    /// A query over every stored point.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A query over `start..=end`.
    #[must_use]
    pub fn between(start: i64, end: i64) -> Self {
        Self::new().start(start).end(end)
    }

    /// Sets the lower bound.
    #[must_use]
    pub fn start(mut self, start: i64) -> Self {
        self.start = Some(start);
        self
    }

    /// Sets the upper bound.
    #[must_use]
    pub fn end(mut self, end: i64) -> Self {
        self.end = Some(end);
        self
    }

    /// Caps the number of points returned.
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Sets the decimation frequency.
    #[must_use]
    pub fn freq(mut self, freq: i64) -> Self {
        self.freq = Some(freq);
        self
    }
}

/// Time series of a store.
///
/// Obtained from [`Store::timeseries`].
#[derive(Debug, Clone, Copy)]
pub struct TimeSeries<'s> {
    store: &'s Store,
}

impl<'s> TimeSeries<'s> {
    pub(crate) fn new(store: &'s Store) -> Self {
        Self { store }
    }

    fn freq(&self, freq: Option<i64>) -> CoreResult<Option<i64>> {
        match freq.or(self.store.default_freq()) {
            Some(f) if f <= 0 => Err(CoreError::invalid_argument(format!(
                "frequency must be positive, got {f}"
            ))),
            other => Ok(other),
        }
    }

    /// Returns the points of `key` in the query window, ascending.
    ///
    /// With a frequency, at most one point per `freq`-wide window is
    /// returned: the first point at or after `previous + freq`, where
    /// `previous` is the last point returned.
    pub fn range(&self, key: &str, query: RangeQuery) -> CoreResult<Vec<Point>> {
        let ns_key = self.store.codec().encode(key)?;
        let freq = self.freq(query.freq)?;
        let adapter = self.store.adapter();

        let Some(start) = query.start.map_or_else(|| adapter.ts_first(&ns_key), |s| Ok(Some(s)))?
        else {
            return Ok(Vec::new());
        };
        let Some(end) = query.end.map_or_else(|| adapter.ts_last(&ns_key), |e| Ok(Some(e)))? else {
            return Ok(Vec::new());
        };
        if end < start || query.limit == Some(0) {
            return Ok(Vec::new());
        }

        let mut found = Vec::new();
        let mut step = i64::MIN;
        for (timestamp, bytes) in adapter.ts_range(&ns_key, start, end)? {
            if timestamp < step {
                continue;
            }
            found.push((timestamp, self.store.from_store(&bytes)?));
            if query.limit.is_some_and(|n| found.len() >= n) {
                break;
            }
            if let Some(freq) = freq {
                step = timestamp.saturating_add(freq);
            }
        }
        Ok(found)
    }

    /// Returns the earliest point of `key`.
    pub fn first(&self, key: &str) -> CoreResult<Option<Point>> {
        let ns_key = self.store.codec().encode(key)?;
        match self.store.adapter().ts_first(&ns_key)? {
            Some(t) => self.point_at(key, t),
            None => Ok(None),
        }
    }

    /// Returns the latest point of `key`.
    pub fn last(&self, key: &str) -> CoreResult<Option<Point>> {
        let ns_key = self.store.codec().encode(key)?;
        match self.store.adapter().ts_last(&ns_key)? {
            Some(t) => self.point_at(key, t),
            None => Ok(None),
        }
    }

    fn point_at(&self, key: &str, timestamp: i64) -> CoreResult<Option<Point>> {
        Ok(self
            .range(key, RangeQuery::between(timestamp, timestamp))?
            .into_iter()
            .next())
    }

    /// Returns the timestamps of the grid `start, start + freq, ..., end`
    /// that have no point in the decimated range over the same window.
    ///
    /// `end` defaults to `start`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidArgument`] if neither `freq` nor a store
    /// default frequency is given.
    pub fn missing(
        &self,
        key: &str,
        start: i64,
        end: Option<i64>,
        freq: Option<i64>,
    ) -> CoreResult<Vec<i64>> {
        let end = end.unwrap_or(start);
        let freq = self.freq(freq)?.ok_or_else(|| {
            CoreError::invalid_argument("missing points are undefined without a frequency")
        })?;
        let present: HashSet<i64> = self
            .range(key, RangeQuery::between(start, end).freq(freq))?
            .into_iter()
            .map(|(t, _)| t)
            .collect();

        let mut gaps = Vec::new();
        let mut t = start;
        while t <= end {
            if !present.contains(&t) {
                gaps.push(t);
            }
            match t.checked_add(freq) {
                Some(next) => t = next,
                None => break,
            }
        }
        Ok(gaps)
    }

    /// Returns `true` if [`missing`](Self::missing) finds no gap.
    pub fn is_complete(
        &self,
        key: &str,
        start: i64,
        end: Option<i64>,
        freq: Option<i64>,
    ) -> CoreResult<bool> {
        Ok(self.missing(key, start, end, freq)?.is_empty())
    }

    /// Adds points, replacing any point at the same timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::FrozenStore`] on a read-only store.
    pub fn extend<V: Into<Value>>(
        &self,
        key: &str,
        points: impl IntoIterator<Item = (i64, V)>,
    ) -> CoreResult<()> {
        self.store.ensure_writable()?;
        let ns_key = self.store.codec().encode(key)?;
        let raw = points
            .into_iter()
            .map(|(t, v)| Ok((t, self.store.to_store(&v.into())?)))
            .collect::<CoreResult<Vec<_>>>()?;
        if !raw.is_empty() {
            self.store.adapter().ts_extend(&ns_key, &raw)?;
        }
        Ok(())
    }

    /// Deletes the points in `start..=end` of each key.
    ///
    /// Unset bounds default to each key's own first and last timestamp.
    /// Keys without points are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::FrozenStore`] on a read-only store.
    pub fn remove<K: AsRef<str>>(
        &self,
        keys: impl IntoIterator<Item = K>,
        start: Option<i64>,
        end: Option<i64>,
    ) -> CoreResult<()> {
        self.store.ensure_writable()?;
        let adapter = self.store.adapter();
        for key in keys {
            let ns_key = self.store.codec().encode(key.as_ref())?;
            let Some(kstart) = start.map_or_else(|| adapter.ts_first(&ns_key), |s| Ok(Some(s)))?
            else {
                continue;
            };
            let Some(kend) = end.map_or_else(|| adapter.ts_last(&ns_key), |e| Ok(Some(e)))? else {
                continue;
            };
            if kend >= kstart {
                adapter.ts_delete(&ns_key, kstart, kend)?;
            }
        }
        Ok(())
    }

    /// Returns every key with at least one point.
    pub fn keys(&self) -> CoreResult<BTreeSet<String>> {
        self.store.decode_keys(self.store.adapter().ts_keys()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StoreConfig;

    fn store(freq: Option<i64>) -> Store {
        let mut config = StoreConfig::new().frozen(false);
        config.default_freq = freq;
        Store::open("memory://ts", config).unwrap()
    }

    fn sample(store: &Store) {
        store
            .timeseries()
            .extend("test", (0..6).map(|i| (100 + 10 * i, i.to_string())))
            .unwrap();
    }

    fn stamps(points: &[Point]) -> Vec<i64> {
        points.iter().map(|(t, _)| *t).collect()
    }

    #[test]
    fn decimation_keeps_first_point_of_each_window() {
        let store = store(None);
        let ts = store.timeseries();
        ts.extend("k", [(0, 0), (3, 3), (10, 10), (12, 12), (25, 25), (26, 26)])
            .unwrap();
        let all = ts.range("k", RangeQuery::new()).unwrap();
        assert_eq!(stamps(&all), vec![0, 3, 10, 12, 25, 26]);
        let decimated = ts.range("k", RangeQuery::new().freq(10)).unwrap();
        assert_eq!(stamps(&decimated), vec![0, 10, 25]);
    }

    #[test]
    fn negative_timestamps_are_not_skipped() {
        let store = store(Some(10));
        let ts = store.timeseries();
        ts.extend("k", [(-20, 1), (-10, 2)]).unwrap();
        assert_eq!(stamps(&ts.range("k", RangeQuery::new()).unwrap()), vec![-20, -10]);
    }

    #[test]
    fn limits_and_bounds() {
        let store = store(Some(10));
        sample(&store);
        let ts = store.timeseries();
        assert_eq!(
            ts.range("test", RangeQuery::new().limit(2)).unwrap(),
            vec![(100, Value::from("0")), (110, Value::from("1"))]
        );
        assert_eq!(
            stamps(&ts.range("test", RangeQuery::between(130, 150)).unwrap()),
            vec![130, 140, 150]
        );
        assert_eq!(
            stamps(&ts.range("test", RangeQuery::new().start(125).end(145)).unwrap()),
            vec![130, 140]
        );
        assert!(ts.range("test", RangeQuery::between(150, 130)).unwrap().is_empty());
        assert!(ts.range("test", RangeQuery::new().limit(0)).unwrap().is_empty());
        assert!(ts.range("unknown", RangeQuery::new().start(0)).unwrap().is_empty());
    }

    #[test]
    fn first_and_last() {
        let store = store(None);
        let ts = store.timeseries();
        assert_eq!(ts.first("test").unwrap(), None);
        sample(&store);
        assert_eq!(ts.first("test").unwrap(), Some((100, Value::from("0"))));
        assert_eq!(ts.last("test").unwrap(), Some((150, Value::from("5"))));
    }

    #[test]
    fn missing_needs_a_frequency() {
        let store = store(None);
        assert!(matches!(
            store.timeseries().missing("test", 0, Some(10), None),
            Err(CoreError::InvalidArgument { .. })
        ));
        assert!(matches!(
            store.timeseries().range("test", RangeQuery::new().freq(-1)),
            Err(CoreError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn gaps_and_completeness() {
        let store = store(Some(10));
        let ts = store.timeseries();
        assert_eq!(
            ts.missing("test", 100, Some(150), None).unwrap(),
            vec![100, 110, 120, 130, 140, 150]
        );
        sample(&store);
        assert!(ts.is_complete("test", 100, Some(150), None).unwrap());
        ts.remove(["test"], Some(120), Some(120)).unwrap();
        assert_eq!(ts.missing("test", 100, Some(150), None).unwrap(), vec![120]);
        assert_eq!(ts.missing("test", 120, None, None).unwrap(), vec![120]);
        assert!(!ts.is_complete("test", 100, Some(150), None).unwrap());
    }

    #[test]
    fn extend_overwrites_and_remove_defaults_to_full_range() {
        let store = store(None);
        let ts = store.timeseries();
        sample(&store);
        ts.extend("test", [(100, "zero")]).unwrap();
        assert_eq!(ts.first("test").unwrap(), Some((100, Value::from("zero"))));
        assert_eq!(ts.range("test", RangeQuery::new()).unwrap().len(), 6);
        assert_eq!(ts.keys().unwrap(), BTreeSet::from(["test".to_string()]));

        ts.remove(["test", "unknown"], None, None).unwrap();
        assert!(ts.range("test", RangeQuery::new()).unwrap().is_empty());
        assert!(ts.keys().unwrap().is_empty());
    }
}
