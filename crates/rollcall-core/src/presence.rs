//! Frame-over-frame presence tracking.
//!
//! The tracker holds the set of identity ids seen in the last processed tick
//! and turns each new tick into ENTRY/EXIT transitions. It performs no I/O.

use crate::types::Action;
use std::collections::BTreeSet;

/// A presence change for one identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub identity_id: String,
    pub action: Action,
}

impl Transition {
    fn new(identity_id: &str, action: Action) -> Self {
        Self {
            identity_id: identity_id.to_string(),
            action,
        }
    }
}

/// Owns the set of currently present identity ids.
#[derive(Debug, Default)]
pub struct PresenceTracker {
    present: BTreeSet<String>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Diff one tick's recognized ids against the present set and apply
    /// the result.
    ///
    /// Duplicate ids within a tick collapse to one. Entries are emitted first,
    /// then exits, each group in ascending id order. Ids present in both the
    /// previous and the current tick produce nothing.
    pub fn process_tick<'a, I>(&mut self, ids: I) -> Vec<Transition>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let transitions = self.diff(ids);
        for t in &transitions {
            self.commit(t);
        }
        transitions
    }

    /// Compute the transitions for one tick without changing the present set.
    /// Apply each one with [`commit`](Self::commit) once it has been recorded.
    pub fn diff<'a, I>(&self, ids: I) -> Vec<Transition>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let seen: BTreeSet<&str> = ids.into_iter().collect();

        let entries = seen
            .iter()
            .filter(|id| !self.present.contains(**id))
            .map(|id| Transition::new(id, Action::Entry));
        let exits = self
            .present
            .iter()
            .filter(|id| !seen.contains(id.as_str()))
            .map(|id| Transition::new(id, Action::Exit));

        entries.chain(exits).collect()
    }

    /// Apply one transition to the present set.
    pub fn commit(&mut self, transition: &Transition) {
        match transition.action {
            Action::Entry => {
                self.present.insert(transition.identity_id.clone());
            }
            Action::Exit | Action::ExitForced => {
                self.present.remove(&transition.identity_id);
            }
        }
    }

    /// Emit a forced exit for every present id and clear the set.
    pub fn drain(&mut self) -> Vec<Transition> {
        let forced = self.forced_exits();
        self.present.clear();
        forced
    }

    /// A forced exit for every present id, in ascending order. Like
    /// [`diff`](Self::diff), this leaves the set untouched.
    pub fn forced_exits(&self) -> Vec<Transition> {
        self.present
            .iter()
            .map(|id| Transition::new(id, Action::ExitForced))
            .collect()
    }

    pub fn is_present(&self, id: &str) -> bool {
        self.present.contains(id)
    }

    pub fn len(&self) -> usize {
        self.present.len()
    }

    pub fn is_empty(&self) -> bool {
        self.present.is_empty()
    }

    /// Present ids in ascending order.
    pub fn present(&self) -> impl Iterator<Item = &str> {
        self.present.iter().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn actions(ts: &[Transition]) -> Vec<(&str, Action)> {
        ts.iter().map(|t| (t.identity_id.as_str(), t.action)).collect()
    }

    #[test]
    fn test_steady_presence_is_silent() {
        let mut tracker = PresenceTracker::new();
        assert_eq!(actions(&tracker.process_tick(["1"])), vec![("1", Action::Entry)]);
        for _ in 0..5 {
            assert!(tracker.process_tick(["1"]).is_empty());
        }
        assert_eq!(actions(&tracker.process_tick([])), vec![("1", Action::Exit)]);
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_scenario_sequence() {
        let mut tracker = PresenceTracker::new();
        let ticks: [&[&str]; 5] = [&["A"], &["A"], &[], &["B"], &[]];
        let events: Vec<(String, Action)> = ticks
            .iter()
            .flat_map(|tick| tracker.process_tick(tick.iter().copied()))
            .map(|t| (t.identity_id, t.action))
            .collect();

        assert_eq!(
            events,
            vec![
                ("A".to_string(), Action::Entry),
                ("A".to_string(), Action::Exit),
                ("B".to_string(), Action::Entry),
                ("B".to_string(), Action::Exit),
            ]
        );
    }

    #[test]
    fn test_duplicate_ids_in_tick_enter_once() {
        let mut tracker = PresenceTracker::new();
        let ts = tracker.process_tick(["2", "2", "2"]);
        assert_eq!(actions(&ts), vec![("2", Action::Entry)]);
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_emission_order_entries_then_exits_sorted() {
        let mut tracker = PresenceTracker::new();
        tracker.process_tick(["9", "3"]);
        let ts = tracker.process_tick(["5", "1"]);
        assert_eq!(
            actions(&ts),
            vec![
                ("1", Action::Entry),
                ("5", Action::Entry),
                ("3", Action::Exit),
                ("9", Action::Exit),
            ]
        );
        assert_eq!(tracker.present().collect::<Vec<_>>(), vec!["1", "5"]);
    }

    #[test]
    fn test_diff_leaves_set_until_committed() {
        let mut tracker = PresenceTracker::new();
        tracker.process_tick(["1"]);

        let pending = tracker.diff(["2"]);
        assert_eq!(actions(&pending), vec![("2", Action::Entry), ("1", Action::Exit)]);
        assert!(tracker.is_present("1"));
        assert!(!tracker.is_present("2"));

        tracker.commit(&pending[0]);
        assert_eq!(tracker.present().collect::<Vec<_>>(), vec!["1", "2"]);
        // The uncommitted exit is produced again on the next tick.
        assert_eq!(actions(&tracker.diff(["2"])), vec![("1", Action::Exit)]);
    }

    #[test]
    fn test_drain_emits_forced_exit_per_member() {
        let mut tracker = PresenceTracker::new();
        tracker.process_tick(["1", "2", "3"]);
        let before = tracker.len();

        let forced = tracker.forced_exits();
        assert_eq!(forced.len(), before);
        assert!(forced.iter().all(|t| t.action == Action::ExitForced));
        assert_eq!(tracker.len(), before);

        assert_eq!(tracker.drain(), forced);
        assert!(tracker.is_empty());
        assert!(tracker.drain().is_empty());
    }

    #[test]
    fn test_balance_never_leaves_zero_or_one() {
        let mut tracker = PresenceTracker::new();
        let ticks: [&[&str]; 8] = [
            &["1", "2"],
            &["2"],
            &["1", "2", "3"],
            &[],
            &["3"],
            &["1", "3"],
            &["1"],
            &["2"],
        ];
        let mut balance: HashMap<String, i32> = HashMap::new();
        let mut check = |ts: Vec<Transition>| {
            for t in ts {
                let b = balance.entry(t.identity_id).or_default();
                *b += if t.action.is_exit() { -1 } else { 1 };
                assert!(*b == 0 || *b == 1, "balance out of range: {b}");
            }
        };
        for tick in ticks {
            check(tracker.process_tick(tick.iter().copied()));
        }
        check(tracker.drain());
        assert!(balance.values().all(|b| *b == 0));
    }
}
