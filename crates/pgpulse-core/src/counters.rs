//! Cumulative counter tracking.
//!
//! PostgreSQL statistics views expose monotonically increasing counters.
//! [`CounterState`] keeps the last observed value per metric name and turns
//! each new observation into a per-interval delta.

use std::collections::HashMap;

/// Outcome of observing one cumulative value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// No baseline existed; the value became the baseline.
    FirstSeen,
    /// Counter advanced (or stayed flat) since the previous cycle.
    Delta(u64),
    /// Counter went backwards (stats reset or server restart).
    /// The new value replaced the baseline.
    Reset { previous: u64 },
}

impl Observation {
    /// Returns the delta to emit, if any.
    pub fn delta(self) -> Option<u64> {
        match self {
            Observation::Delta(d) => Some(d),
            _ => None,
        }
    }
}

/// Compute delta, returning `None` on counter regression (stats reset).
pub fn du64(curr: u64, prev: u64) -> Option<u64> {
    curr.checked_sub(prev)
}

/// Last observed cumulative value per metric name.
///
/// Owned by exactly one polling context. Entries are never removed; the set of
/// counter names is closed, so the map stops growing after the first cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CounterState {
    baselines: HashMap<String, u64>,
}

impl CounterState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `current` as the new baseline for `name` and reports what the
    /// previous baseline implies.
    ///
    /// The baseline is replaced on every call, whether or not a delta is emitted.
    pub fn observe(&mut self, name: &str, current: u64) -> Observation {
        let previous = match self.baselines.get_mut(name) {
            Some(slot) => std::mem::replace(slot, current),
            None => {
                self.baselines.insert(name.to_string(), current);
                return Observation::FirstSeen;
            }
        };

        match du64(current, previous) {
            Some(delta) => Observation::Delta(delta),
            None => Observation::Reset { previous },
        }
    }

    /// Returns the stored baseline for `name`.
    pub fn baseline(&self, name: &str) -> Option<u64> {
        self.baselines.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.baselines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.baselines.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, u64)> for CounterState {
    fn from_iter<I: IntoIterator<Item = (S, u64)>>(iter: I) -> Self {
        Self {
            baselines: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

/// Parses a cumulative counter delivered as text.
///
/// PostgreSQL returns `sum(bigint)` as `numeric`, so integral values may carry
/// a fractional part of zeros (`"42.000"`). Anything else is rejected.
pub fn parse_counter(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    let integral = match raw.split_once('.') {
        Some((int, frac)) if frac.bytes().all(|b| b == b'0') => int,
        Some(_) => return None,
        None => raw,
    };
    integral.parse::<u64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_observation_sets_baseline_without_delta() {
        let mut state = CounterState::new();
        assert_eq!(state.observe("inserts", 100), Observation::FirstSeen);
        assert_eq!(state.baseline("inserts"), Some(100));
    }

    #[test]
    fn non_decreasing_sequence_emits_consecutive_differences() {
        let mut state = CounterState::new();
        let values = [3u64, 3, 10, 25, 25, 1000];
        let deltas: Vec<Option<u64>> = values
            .iter()
            .map(|&v| state.observe("seq", v).delta())
            .collect();
        assert_eq!(
            deltas,
            vec![None, Some(0), Some(7), Some(15), Some(0), Some(975)]
        );
    }

    #[test]
    fn decrease_is_suppressed_and_rebases() {
        let mut state = CounterState::new();
        state.observe("updates", 500);
        assert_eq!(
            state.observe("updates", 20),
            Observation::Reset { previous: 500 }
        );
        assert_eq!(state.baseline("updates"), Some(20));
        assert_eq!(state.observe("updates", 35), Observation::Delta(15));
    }

    #[test]
    fn du64_regression_is_none() {
        assert_eq!(du64(10, 4), Some(6));
        assert_eq!(du64(4, 4), Some(0));
        assert_eq!(du64(4, 10), None);
        assert_eq!(du64(0, u64::MAX), None);
    }

    #[test]
    fn inserts_scenario() {
        let mut state = CounterState::new();
        assert_eq!(state.observe("inserts", 100).delta(), None);
        assert_eq!(state.observe("inserts", 150).delta(), Some(50));
        assert_eq!(state.baseline("inserts"), Some(150));
        assert_eq!(state.observe("inserts", 140).delta(), None);
        assert_eq!(state.baseline("inserts"), Some(140));
        assert_eq!(state.observe("inserts", 160).delta(), Some(20));
        assert_eq!(state.baseline("inserts"), Some(160));
    }

    #[test]
    fn names_are_tracked_independently() {
        let mut state = CounterState::new();
        state.observe("inserts", 10);
        assert_eq!(state.observe("deletes", 5), Observation::FirstSeen);
        assert_eq!(state.observe("inserts", 12), Observation::Delta(2));
        assert_eq!(state.len(), 2);
    }

    #[test]
    fn seeded_state_emits_on_first_cycle() {
        let mut state: CounterState = [("inserts", 40u64)].into_iter().collect();
        assert_eq!(state.observe("inserts", 45), Observation::Delta(5));
    }

    #[test]
    fn parse_counter_accepts_integral_text() {
        assert_eq!(parse_counter("42"), Some(42));
        assert_eq!(parse_counter(" 7 "), Some(7));
        assert_eq!(parse_counter("1200.000"), Some(1200));
        assert_eq!(parse_counter("0"), Some(0));
    }

    #[test]
    fn parse_counter_rejects_garbage() {
        assert_eq!(parse_counter(""), None);
        assert_eq!(parse_counter("abc"), None);
        assert_eq!(parse_counter("-3"), None);
        assert_eq!(parse_counter("1.5"), None);
    }
}
