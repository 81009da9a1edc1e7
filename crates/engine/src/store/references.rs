//! In-memory edge stores.
//!
//! # Edge Direction
//!
//! ```text
//! T → B  means  "B's formula mentions T"  (B is a referrer of T)
//! ```
//!
//! Recompute walks edges forward: "who has to be refreshed if T changes?"
//!
//! # Invariants
//!
//! 1. **Bidirectional consistency:** B ∈ referrers[T] iff T ∈ references[B].
//! 2. **No dangling entries:** empty sets are removed, not stored.
//! 3. **No duplicate edges:** set semantics.
//! 4. **Normalized keys:** referrers are stored without `$` markers.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::hash::Hash;

use rustc_hash::FxHashMap;

use super::{RangeReferenceStore, ReferenceStore};
use crate::reference::{CellRange, CellRef};

#[derive(Debug)]
struct Edges<T: Eq + Hash> {
    /// target -> cells mentioning it
    referrers: FxHashMap<T, BTreeSet<CellRef>>,
    /// cell -> targets its formula mentions
    references: FxHashMap<CellRef, BTreeSet<T>>,
}

impl<T: Eq + Hash> Default for Edges<T> {
    fn default() -> Self {
        Self { referrers: FxHashMap::default(), references: FxHashMap::default() }
    }
}

impl<T: Clone + Eq + Hash + Ord> Edges<T> {
    fn add(&mut self, target: T, referrer: CellRef) {
        let referrer = referrer.normalized();
        self.references.entry(referrer).or_default().insert(target.clone());
        self.referrers.entry(target).or_default().insert(referrer);
    }

    fn remove(&mut self, target: &T, referrer: CellRef) {
        let referrer = referrer.normalized();
        if let Some(cells) = self.referrers.get_mut(target) {
            cells.remove(&referrer);
            if cells.is_empty() {
                self.referrers.remove(target);
            }
        }
        if let Some(targets) = self.references.get_mut(&referrer) {
            targets.remove(target);
            if targets.is_empty() {
                self.references.remove(&referrer);
            }
        }
    }

    fn remove_referrer(&mut self, referrer: CellRef) {
        let referrer = referrer.normalized();
        let Some(targets) = self.references.remove(&referrer) else {
            return;
        };
        for target in targets {
            if let Some(cells) = self.referrers.get_mut(&target) {
                cells.remove(&referrer);
                if cells.is_empty() {
                    self.referrers.remove(&target);
                }
            }
        }
    }

    fn referrers(&self, target: &T) -> BTreeSet<CellRef> {
        self.referrers.get(target).cloned().unwrap_or_default()
    }

    fn references(&self, referrer: CellRef) -> Vec<T> {
        self.references
            .get(&referrer.normalized())
            .map(|targets| targets.iter().cloned().collect())
            .unwrap_or_default()
    }

    #[cfg(test)]
    fn assert_consistent(&self)
    where
        T: std::fmt::Debug,
    {
        for (target, cells) in &self.referrers {
            assert!(!cells.is_empty(), "Empty referrer set stored for {:?}", target);
            for cell in cells {
                assert!(
                    self.references.get(cell).map_or(false, |t| t.contains(target)),
                    "Missing reference edge: {} should mention {:?}",
                    cell,
                    target
                );
            }
        }
        for (cell, targets) in &self.references {
            assert!(!targets.is_empty(), "Empty reference set stored for {}", cell);
            for target in targets {
                assert!(
                    self.referrers.get(target).map_or(false, |c| c.contains(cell)),
                    "Missing referrer edge: {:?} should list {}",
                    target,
                    cell
                );
            }
        }
    }
}

/// Edges from cells or labels to the cells whose formulas mention them.
#[derive(Debug)]
pub struct MemoryReferenceStore<T: Eq + Hash> {
    edges: RefCell<Edges<T>>,
}

impl<T: Eq + Hash> Default for MemoryReferenceStore<T> {
    fn default() -> Self {
        Self { edges: RefCell::new(Edges::default()) }
    }
}

impl<T: Clone + Eq + Hash + Ord> MemoryReferenceStore<T> {
    /// Number of distinct targets with at least one referrer.
    pub fn target_count(&self) -> usize {
        self.edges.borrow().referrers.len()
    }

    #[cfg(test)]
    pub(crate) fn assert_consistent(&self)
    where
        T: std::fmt::Debug,
    {
        self.edges.borrow().assert_consistent();
    }
}

impl<T: Clone + Eq + Hash + Ord> ReferenceStore<T> for MemoryReferenceStore<T> {
    fn add_reference(&self, target: T, referrer: CellRef) {
        self.edges.borrow_mut().add(target, referrer);
    }

    fn remove_reference(&self, target: &T, referrer: CellRef) {
        self.edges.borrow_mut().remove(target, referrer);
    }

    fn load_referrers(&self, target: &T) -> BTreeSet<CellRef> {
        self.edges.borrow().referrers(target)
    }

    fn load_references(&self, referrer: CellRef) -> Vec<T> {
        self.edges.borrow().references(referrer)
    }

    fn remove_referrer(&self, referrer: CellRef) {
        self.edges.borrow_mut().remove_referrer(referrer);
    }
}

/// Edges from ranges to the cells whose formulas mention them.
///
/// Ranges are stored normalized, so `$A$1:B2` and `A1:B2` share one entry.
#[derive(Debug, Default)]
pub struct MemoryRangeReferenceStore {
    edges: RefCell<Edges<CellRange>>,
}

impl MemoryRangeReferenceStore {
    #[cfg(test)]
    pub(crate) fn assert_consistent(&self) {
        self.edges.borrow().assert_consistent();
    }
}

impl RangeReferenceStore for MemoryRangeReferenceStore {
    fn add_value(&self, range: CellRange, referrer: CellRef) {
        self.edges.borrow_mut().add(range.normalized(), referrer);
    }

    fn remove_value(&self, range: &CellRange, referrer: CellRef) {
        self.edges.borrow_mut().remove(&range.normalized(), referrer);
    }

    fn load(&self, range: &CellRange) -> BTreeSet<CellRef> {
        self.edges.borrow().referrers(&range.normalized())
    }

    fn ranges_containing(&self, cell: CellRef) -> Vec<CellRange> {
        let mut found: Vec<CellRange> = self
            .edges
            .borrow()
            .referrers
            .keys()
            .filter(|range| range.contains(cell))
            .copied()
            .collect();
        found.sort();
        found
    }

    fn remove_referrer(&self, referrer: CellRef) {
        self.edges.borrow_mut().remove_referrer(referrer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::label::LabelName;

    fn r(a1: &str) -> CellRef {
        a1.parse().unwrap()
    }

    fn range(a1: &str) -> CellRange {
        a1.parse().unwrap()
    }

    #[test]
    fn test_single_edge() {
        // B1 = A1
        let store = MemoryReferenceStore::<CellRef>::default();
        store.add_reference(r("A1"), r("B1"));
        store.assert_consistent();

        assert_eq!(store.load_referrers(&r("A1")).into_iter().collect::<Vec<_>>(), vec![r("B1")]);
        assert_eq!(store.load_references(r("B1")), vec![r("A1")]);
        assert!(store.load_referrers(&r("B1")).is_empty());
    }

    #[test]
    fn test_referrer_is_normalized() {
        let store = MemoryReferenceStore::<CellRef>::default();
        store.add_reference(r("A1"), r("$B$1"));
        store.add_reference(r("A1"), r("B1"));

        assert_eq!(store.load_referrers(&r("A1")).len(), 1);
        assert_eq!(store.load_references(r("B$1")), vec![r("A1")]);
    }

    #[test]
    fn test_remove_referrer_clears_both_sides() {
        // C1 = A1 + B1, D1 = A1
        let store = MemoryReferenceStore::<CellRef>::default();
        store.add_reference(r("A1"), r("C1"));
        store.add_reference(r("B1"), r("C1"));
        store.add_reference(r("A1"), r("D1"));

        store.remove_referrer(r("C1"));
        store.assert_consistent();

        assert!(store.load_references(r("C1")).is_empty());
        assert!(store.load_referrers(&r("B1")).is_empty());
        assert_eq!(store.load_referrers(&r("A1")).into_iter().collect::<Vec<_>>(), vec![r("D1")]);
        assert_eq!(store.target_count(), 1);
    }

    #[test]
    fn test_remove_single_edge() {
        let store = MemoryReferenceStore::<LabelName>::default();
        let rate = LabelName::new("Rate").unwrap();
        store.add_reference(rate.clone(), r("A1"));
        store.remove_reference(&LabelName::new("RATE").unwrap(), r("A1"));
        store.assert_consistent();

        assert!(store.load_referrers(&rate).is_empty());
        assert_eq!(store.target_count(), 0);
    }

    #[test]
    fn test_ranges_containing() {
        let store = MemoryRangeReferenceStore::default();
        store.add_value(range("A1:B2"), r("D1"));
        store.add_value(range("$A$1:$B$2"), r("D2"));
        store.add_value(range("B2:C3"), r("D3"));
        store.assert_consistent();

        assert_eq!(store.load(&range("A1:B2")).len(), 2);
        assert_eq!(store.ranges_containing(r("B2")), vec![range("A1:B2"), range("B2:C3")]);
        assert_eq!(store.ranges_containing(r("C3")), vec![range("B2:C3")]);
        assert!(store.ranges_containing(r("Z9")).is_empty());

        store.remove_referrer(r("D1"));
        store.remove_value(&range("A1:B2"), r("D2"));
        store.assert_consistent();
        assert_eq!(store.ranges_containing(r("A1")), Vec::<CellRange>::new());
    }
}
