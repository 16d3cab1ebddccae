//! Condition sets: named tri-state status fields that roll up into one
//! aggregate "happy" condition.
//!
//! The happy condition (usually `Ready`) is derived: it is False as soon as
//! any dependent is False, True once every dependent is True, and Unknown
//! otherwise. It cannot be marked directly.

use std::fmt::Debug;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Tri-state condition value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ConditionStatus {
    True,
    False,
    #[default]
    Unknown,
}

impl ConditionStatus {
    pub fn is_true(&self) -> bool {
        matches!(self, ConditionStatus::True)
    }

    pub fn is_false(&self) -> bool {
        matches!(self, ConditionStatus::False)
    }
}

/// One named condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition<T> {
    #[serde(rename = "type")]
    pub type_: T,

    pub status: ConditionStatus,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<DateTime<Utc>>,
}

impl<T> Condition<T> {
    /// Creates a condition stamped with the current time.
    pub fn new(
        type_: T,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            type_,
            status,
            reason: reason.into(),
            message: message.into(),
            last_transition_time: Some(Utc::now()),
        }
    }

    pub fn is_true(&self) -> bool {
        self.status.is_true()
    }
}

/// Looks up a condition by type.
pub fn find<T: PartialEq>(conditions: &[Condition<T>], type_: T) -> Option<&Condition<T>> {
    conditions.iter().find(|c| c.type_ == type_)
}

/// Restores the persisted transition time of every condition whose status
/// did not change relative to `previous`.
///
/// Without this, re-deriving an unchanged condition would move its timestamp
/// and make every pass look like a status change.
pub fn carry_transition_times<T: PartialEq + Copy>(
    conditions: &mut [Condition<T>],
    previous: &[Condition<T>],
) {
    for condition in conditions.iter_mut() {
        if let Some(prev) = find(previous, condition.type_) {
            if prev.status == condition.status {
                condition.last_transition_time = prev.last_transition_time;
            }
        }
    }
}

/// The shape of a condition set: one happy type and its dependents.
#[derive(Debug, Clone, Copy)]
pub struct ConditionSet<T: 'static> {
    happy: T,
    dependents: &'static [T],
}

impl<T> ConditionSet<T>
where
    T: Copy + Ord + Debug + 'static,
{
    /// Defines a condition set.
    pub const fn new(happy: T, dependents: &'static [T]) -> Self {
        Self { happy, dependents }
    }

    /// The aggregate condition type.
    pub fn happy(&self) -> T {
        self.happy
    }

    /// Returns true if `type_` belongs to this set.
    pub fn contains(&self, type_: T) -> bool {
        type_ == self.happy || self.dependents.contains(&type_)
    }

    /// Borrows a condition list for mutation under this set's rules.
    pub fn manage<'a>(&'a self, conditions: &'a mut Vec<Condition<T>>) -> ConditionManager<'a, T> {
        ConditionManager {
            set: self,
            conditions,
        }
    }
}

/// Mutates a condition list while keeping the happy condition consistent.
pub struct ConditionManager<'a, T: 'static> {
    set: &'a ConditionSet<T>,
    conditions: &'a mut Vec<Condition<T>>,
}

impl<T> ConditionManager<'_, T>
where
    T: Copy + Ord + Debug + 'static,
{
    /// Looks up a condition by type.
    pub fn get(&self, type_: T) -> Option<&Condition<T>> {
        find(self.conditions.as_slice(), type_)
    }

    /// Returns true if the happy condition is True.
    pub fn is_happy(&self) -> bool {
        self.get(self.set.happy).is_some_and(Condition::is_true)
    }

    /// Resets the happy condition and every dependent to Unknown.
    pub fn initialize(&mut self) {
        for &type_ in self.set.dependents {
            self.upsert(Condition::new(type_, ConditionStatus::Unknown, "", ""));
        }
        self.recompute_happy();
    }

    /// Marks a dependent True.
    pub fn mark_true(&mut self, type_: T) {
        self.mark(type_, ConditionStatus::True, "", "");
    }

    /// Marks a dependent False.
    pub fn mark_false(&mut self, type_: T, reason: &str, message: impl Into<String>) {
        self.mark(type_, ConditionStatus::False, reason, message);
    }

    /// Marks a dependent Unknown.
    pub fn mark_unknown(&mut self, type_: T, reason: &str, message: impl Into<String>) {
        self.mark(type_, ConditionStatus::Unknown, reason, message);
    }

    /// Sets a condition that sits outside the set (a marker); it does not
    /// influence the happy condition.
    pub fn set_marker(
        &mut self,
        type_: T,
        status: ConditionStatus,
        reason: &str,
        message: impl Into<String>,
    ) {
        if self.set.contains(type_) {
            warn!(condition = ?type_, "refusing to set a managed condition as a marker");
            return;
        }
        self.upsert(Condition::new(type_, status, reason, message));
    }

    /// Removes a condition outside the set.
    pub fn clear_marker(&mut self, type_: T) {
        if !self.set.contains(type_) {
            self.conditions.retain(|c| c.type_ != type_);
        }
    }

    fn mark(&mut self, type_: T, status: ConditionStatus, reason: &str, message: impl Into<String>) {
        if type_ == self.set.happy || !self.set.dependents.contains(&type_) {
            warn!(condition = ?type_, "only dependent conditions can be marked");
            return;
        }
        self.upsert(Condition::new(type_, status, reason, message));
        self.recompute_happy();
    }

    fn recompute_happy(&mut self) {
        let dependents: Vec<_> = self
            .set
            .dependents
            .iter()
            .map(|&t| self.get(t).cloned())
            .collect();

        let failed = dependents
            .iter()
            .flatten()
            .find(|c| c.status.is_false());
        let unknown = dependents.iter().find_map(|c| match c {
            None => Some((String::new(), String::new())),
            Some(c) if !c.status.is_true() => Some((c.reason.clone(), c.message.clone())),
            Some(_) => None,
        });

        let happy = match (failed, unknown) {
            (Some(c), _) => Condition::new(
                self.set.happy,
                ConditionStatus::False,
                c.reason.clone(),
                c.message.clone(),
            ),
            (None, Some((reason, message))) => {
                Condition::new(self.set.happy, ConditionStatus::Unknown, reason, message)
            }
            (None, None) => Condition::new(self.set.happy, ConditionStatus::True, "", ""),
        };
        self.upsert(happy);
    }

    /// Replaces a condition, keeping the transition time when the status
    /// does not change. The list is kept sorted by type.
    fn upsert(&mut self, mut condition: Condition<T>) {
        match self
            .conditions
            .binary_search_by(|c| c.type_.cmp(&condition.type_))
        {
            Ok(index) => {
                let existing = &mut self.conditions[index];
                if existing.status == condition.status {
                    condition.last_transition_time = existing.last_transition_time;
                }
                *existing = condition;
            }
            Err(index) => self.conditions.insert(index, condition),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
    enum Cond {
        Ready,
        A,
        B,
        Marker,
    }

    static SET: ConditionSet<Cond> = ConditionSet::new(Cond::Ready, &[Cond::A, Cond::B]);

    #[test]
    fn test_initialize_seeds_unknown() {
        let mut conditions = Vec::new();
        SET.manage(&mut conditions).initialize();

        assert_eq!(conditions.len(), 3);
        assert!(conditions
            .iter()
            .all(|c| c.status == ConditionStatus::Unknown));
    }

    #[test]
    fn test_happy_is_and_of_dependents() {
        let mut conditions = Vec::new();
        let mut manager = SET.manage(&mut conditions);
        manager.initialize();

        manager.mark_true(Cond::A);
        assert!(!manager.is_happy());
        assert_eq!(
            manager.get(Cond::Ready).unwrap().status,
            ConditionStatus::Unknown
        );

        manager.mark_true(Cond::B);
        assert!(manager.is_happy());

        manager.mark_false(Cond::A, "Broken", "a is broken");
        let ready = manager.get(Cond::Ready).unwrap();
        assert_eq!(ready.status, ConditionStatus::False);
        assert_eq!(ready.reason, "Broken");
        assert_eq!(ready.message, "a is broken");
    }

    #[test]
    fn test_happy_cannot_be_marked_directly() {
        let mut conditions = Vec::new();
        let mut manager = SET.manage(&mut conditions);
        manager.initialize();
        manager.mark_true(Cond::Ready);
        assert!(!manager.is_happy());
    }

    #[test]
    fn test_marker_does_not_affect_happy() {
        let mut conditions = Vec::new();
        let mut manager = SET.manage(&mut conditions);
        manager.initialize();
        manager.mark_true(Cond::A);
        manager.mark_true(Cond::B);
        manager.set_marker(Cond::Marker, ConditionStatus::True, "Oops", "");
        assert!(manager.is_happy());
        assert!(manager.get(Cond::Marker).unwrap().is_true());

        manager.clear_marker(Cond::Marker);
        assert!(manager.get(Cond::Marker).is_none());
    }

    #[test]
    fn test_unchanged_status_keeps_transition_time() {
        let mut conditions = Vec::new();
        let mut manager = SET.manage(&mut conditions);
        manager.initialize();
        manager.mark_false(Cond::A, "Waiting", "first");
        let first = manager.get(Cond::A).unwrap().last_transition_time;

        std::thread::sleep(std::time::Duration::from_millis(2));
        manager.mark_false(Cond::A, "Waiting", "second");
        let condition = manager.get(Cond::A).unwrap();
        assert_eq!(condition.last_transition_time, first);
        assert_eq!(condition.message, "second");
    }

    #[test]
    fn test_carry_transition_times() {
        let mut previous = Vec::new();
        SET.manage(&mut previous).initialize();
        SET.manage(&mut previous).mark_true(Cond::A);

        std::thread::sleep(std::time::Duration::from_millis(2));
        let mut current = Vec::new();
        let mut manager = SET.manage(&mut current);
        manager.initialize();
        manager.mark_true(Cond::A);
        manager.mark_false(Cond::B, "Nope", "");

        carry_transition_times(&mut current, &previous);

        let a_prev = find(&previous, Cond::A).unwrap();
        let a_now = find(&current, Cond::A).unwrap();
        assert_eq!(a_now.last_transition_time, a_prev.last_transition_time);

        let b_prev = find(&previous, Cond::B).unwrap();
        let b_now = find(&current, Cond::B).unwrap();
        assert_ne!(b_now.last_transition_time, b_prev.last_transition_time);
    }

    #[test]
    fn test_conditions_sorted_by_type() {
        let mut conditions = Vec::new();
        let mut manager = SET.manage(&mut conditions);
        manager.set_marker(Cond::Marker, ConditionStatus::True, "", "");
        manager.initialize();
        let types: Vec<_> = conditions.iter().map(|c| c.type_).collect();
        assert_eq!(types, vec![Cond::Ready, Cond::A, Cond::B, Cond::Marker]);
    }
}
