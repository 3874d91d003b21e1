//! Functions of simulated time, and a named store for them.
//!
//! Components read exogenous inputs (prices, temperatures, load profiles)
//! from time series shared through the [`crate::Simulation`]. Series are
//! looked up by id and by value type.

use rustc_hash::FxHashMap;
use std::any::Any;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::rc::Rc;

use crate::error::SimError;
use crate::time::Time;

/// A value that varies with simulated time.
pub trait TimeSeries {
    type Value;

    /// Value at `time`, or `None` if the series has no data.
    fn value(&self, time: Time) -> Option<Self::Value>;
}

/// The same value at every time.
#[derive(Clone, Debug)]
pub struct ConstTimeSeries<V> {
    value: V,
}

impl<V> ConstTimeSeries<V> {
    pub fn new(value: V) -> Self {
        Self { value }
    }
}

impl<V: Clone> TimeSeries for ConstTimeSeries<V> {
    type Value = V;

    fn value(&self, _time: Time) -> Option<V> {
        Some(self.value.clone())
    }
}

/// Holds each tabulated value until the next point. Before the first point
/// the first value applies.
#[derive(Clone, Debug, Default)]
pub struct StepwiseTimeSeries<V> {
    points: BTreeMap<Time, V>,
}

impl<V> StepwiseTimeSeries<V> {
    pub fn new() -> Self {
        Self {
            points: BTreeMap::new(),
        }
    }

    /// Add or overwrite the point at `time`.
    pub fn add_point(&mut self, time: Time, value: V) {
        self.points.insert(time, value);
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

impl<V: Clone> TimeSeries for StepwiseTimeSeries<V> {
    type Value = V;

    fn value(&self, time: Time) -> Option<V> {
        self.points
            .range(..=time)
            .next_back()
            .or_else(|| self.points.iter().next())
            .map(|(_, v)| v.clone())
    }
}

/// Linear interpolation between tabulated points, constant beyond either end.
#[derive(Clone, Debug, Default)]
pub struct LerpTimeSeries {
    points: BTreeMap<Time, f64>,
}

impl LerpTimeSeries {
    pub fn new() -> Self {
        Self {
            points: BTreeMap::new(),
        }
    }

    pub fn add_point(&mut self, time: Time, value: f64) {
        self.points.insert(time, value);
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

impl TimeSeries for LerpTimeSeries {
    type Value = f64;

    fn value(&self, time: Time) -> Option<f64> {
        let before = self.points.range(..=time).next_back();
        let after = self
            .points
            .range((Bound::Excluded(time), Bound::Unbounded))
            .next();
        match (before, after) {
            (None, None) => None,
            (Some((_, &v)), None) | (None, Some((_, &v))) => Some(v),
            (Some((&t1, &v1)), Some((&t2, &v2))) => {
                let (Some(x1), Some(x2), Some(x)) =
                    (t1.as_secs_f64(), t2.as_secs_f64(), time.as_secs_f64())
                else {
                    return Some(v1);
                };
                Some(v1 + (v2 - v1) * (x - x1) / (x2 - x1))
            }
        }
    }
}

/// Values computed by a closure.
pub struct FunctionTimeSeries<V> {
    func: Box<dyn Fn(Time) -> V>,
}

impl<V> FunctionTimeSeries<V> {
    pub fn new(func: impl Fn(Time) -> V + 'static) -> Self {
        Self {
            func: Box::new(func),
        }
    }
}

impl<V> TimeSeries for FunctionTimeSeries<V> {
    type Value = V;

    fn value(&self, time: Time) -> Option<V> {
        Some((self.func)(time))
    }
}

struct Entry {
    /// Always an `Rc<dyn TimeSeries<Value = V>>` for the recorded value type.
    series: Box<dyn Any>,
    value_type: &'static str,
}

/// Time series keyed by id.
#[derive(Default)]
pub struct TimeSeriesStore {
    entries: FxHashMap<String, Entry>,
}

impl TimeSeriesStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a series, replacing any series with the same id. Returns true if
    /// one was replaced.
    pub fn insert<S>(&mut self, id: impl Into<String>, series: S) -> bool
    where
        S: TimeSeries + 'static,
        S::Value: 'static,
    {
        let shared: Rc<dyn TimeSeries<Value = S::Value>> = Rc::new(series);
        self.insert_shared(id, shared)
    }

    pub fn insert_shared<V: 'static>(
        &mut self,
        id: impl Into<String>,
        series: Rc<dyn TimeSeries<Value = V>>,
    ) -> bool {
        self.entries
            .insert(
                id.into(),
                Entry {
                    series: Box::new(series),
                    value_type: std::any::type_name::<V>(),
                },
            )
            .is_some()
    }

    /// Typed lookup by id and value type.
    pub fn get<V: 'static>(&self, id: &str) -> Result<Rc<dyn TimeSeries<Value = V>>, SimError> {
        let entry = self
            .entries
            .get(id)
            .ok_or_else(|| SimError::TimeSeriesNotFound(id.to_string()))?;
        entry
            .series
            .downcast_ref::<Rc<dyn TimeSeries<Value = V>>>()
            .cloned()
            .ok_or_else(|| SimError::TimeSeriesTypeMismatch {
                id: id.to_string(),
                actual: entry.value_type,
            })
    }

    pub fn remove(&mut self, id: &str) -> bool {
        self.entries.remove(id).is_some()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stepwise() -> StepwiseTimeSeries<f64> {
        let mut series = StepwiseTimeSeries::new();
        series.add_point(Time::from_secs(10), 1.0);
        series.add_point(Time::from_secs(20), 2.0);
        series
    }

    #[test]
    fn test_stepwise_holds_values() {
        let series = stepwise();
        assert_eq!(series.value(Time::zero()), Some(1.0));
        assert_eq!(series.value(Time::from_secs(10)), Some(1.0));
        assert_eq!(series.value(Time::from_secs(19)), Some(1.0));
        assert_eq!(series.value(Time::from_secs(20)), Some(2.0));
        assert_eq!(series.value(Time::PosInfinity), Some(2.0));
        assert_eq!(StepwiseTimeSeries::<f64>::new().value(Time::zero()), None);
    }

    #[test]
    fn test_lerp_interpolates_between_points() {
        let mut series = LerpTimeSeries::new();
        series.add_point(Time::from_secs(0), 10.0);
        series.add_point(Time::from_secs(4), 20.0);

        assert_eq!(series.value(Time::from_secs(-5)), Some(10.0));
        assert_eq!(series.value(Time::from_secs(1)), Some(12.5));
        assert_eq!(series.value(Time::from_secs(4)), Some(20.0));
        assert_eq!(series.value(Time::from_secs(9)), Some(20.0));
        assert_eq!(series.len(), 2);
    }

    #[test]
    fn test_const_and_function_series() {
        let constant = ConstTimeSeries::new("on");
        assert_eq!(constant.value(Time::NegInfinity), Some("on"));

        let doubled = FunctionTimeSeries::new(|t: Time| t.as_secs_f64().unwrap_or(0.0) * 2.0);
        assert_eq!(doubled.value(Time::from_millis(1500)), Some(3.0));
    }

    #[test]
    fn test_store_lookup_by_id_and_value_type() {
        let mut store = TimeSeriesStore::new();
        assert!(!store.insert("price", stepwise()));
        assert!(!store.insert("mode", ConstTimeSeries::new(3u8)));

        let price = store.get::<f64>("price").unwrap();
        assert_eq!(price.value(Time::from_secs(25)), Some(2.0));

        assert_eq!(
            store.get::<u8>("price").err(),
            Some(SimError::TimeSeriesTypeMismatch {
                id: "price".to_string(),
                actual: "f64",
            })
        );
        assert_eq!(
            store.get::<f64>("missing").err(),
            Some(SimError::TimeSeriesNotFound("missing".to_string()))
        );
    }

    #[test]
    fn test_store_replace_and_remove() {
        let mut store = TimeSeriesStore::new();
        store.insert("t", ConstTimeSeries::new(1.0));
        assert!(store.insert("t", ConstTimeSeries::new(2.0)));
        assert_eq!(store.len(), 1);
        assert_eq!(
            store.get::<f64>("t").unwrap().value(Time::zero()),
            Some(2.0)
        );

        assert!(store.remove("t"));
        assert!(!store.contains("t"));
        assert!(store.is_empty());
    }
}
