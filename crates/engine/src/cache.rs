//! Per-operation reference cache.
//!
//! Every cell, label and header an operation touches gets a [`CacheStatus`].
//! Statuses only move through [`CacheStatus::apply`]. A reference loads at
//! most once per operation, a bare reference touch never replaces a recorded
//! save or delete, and the final delta is read straight out of the cache.
//!
//! ```text
//! Unloaded ─┬─ Referenced ──────► ReferenceUnloaded ─┐
//!           └─ ReferenceLoaded ─► ReferenceLoaded ───┤
//!                                                    ▼
//!           Loading ─► Loaded ─┬─ ReferencesRefreshed ─► LoadedReferencesRefreshed
//!           Saving  ─► Saved  ─┼─ ReferencesRefreshed ─► SavedReferencesRefreshed
//!                      Deleted ┴─ ReferencesRefreshed ─► DeletedReferencesRefreshed
//! ```
//!
//! `ForceReferencesRefresh` steps a refreshed status back so the reference is
//! processed again.

use std::fmt::Display;
use std::hash::Hash;

use rustc_hash::FxHashMap;

use crate::error::InternalFault;

/// Lifecycle of one reference within one operation.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheStatus<T> {
    Unloaded,
    /// Queued because something it feeds changed; not yet read.
    ReferenceUnloaded,
    /// Read as an evaluation input only.
    ReferenceLoaded(T),
    Loading,
    Loaded(T),
    LoadedReferencesRefreshed(T),
    Saving,
    Saved(T),
    SavedReferencesRefreshed(T),
    Deleted,
    DeletedReferencesRefreshed,
}

/// Input to [`CacheStatus::apply`].
#[derive(Debug, Clone, PartialEq)]
pub enum StatusEvent<T> {
    Loading,
    Loaded(T),
    Saving,
    Saved(T),
    Deleted,
    ForceReferencesRefresh,
    ReferencesRefreshed,
    Referenced,
    ReferenceLoaded(T),
}

impl<T> StatusEvent<T> {
    pub fn name(&self) -> &'static str {
        match self {
            StatusEvent::Loading => "loading",
            StatusEvent::Loaded(_) => "loaded",
            StatusEvent::Saving => "saving",
            StatusEvent::Saved(_) => "saved",
            StatusEvent::Deleted => "deleted",
            StatusEvent::ForceReferencesRefresh => "force_references_refresh",
            StatusEvent::ReferencesRefreshed => "references_refreshed",
            StatusEvent::Referenced => "referenced",
            StatusEvent::ReferenceLoaded(_) => "reference_loaded",
        }
    }
}

impl<T> Default for CacheStatus<T> {
    fn default() -> Self {
        CacheStatus::Unloaded
    }
}

impl<T> CacheStatus<T> {
    pub fn name(&self) -> &'static str {
        match self {
            CacheStatus::Unloaded => "Unloaded",
            CacheStatus::ReferenceUnloaded => "ReferenceUnloaded",
            CacheStatus::ReferenceLoaded(_) => "ReferenceLoaded",
            CacheStatus::Loading => "Loading",
            CacheStatus::Loaded(_) => "Loaded",
            CacheStatus::LoadedReferencesRefreshed(_) => "LoadedReferencesRefreshed",
            CacheStatus::Saving => "Saving",
            CacheStatus::Saved(_) => "Saved",
            CacheStatus::SavedReferencesRefreshed(_) => "SavedReferencesRefreshed",
            CacheStatus::Deleted => "Deleted",
            CacheStatus::DeletedReferencesRefreshed => "DeletedReferencesRefreshed",
        }
    }

    /// The value carried by this status, if it has one.
    pub fn value(&self) -> Option<&T> {
        match self {
            CacheStatus::ReferenceLoaded(value)
            | CacheStatus::Loaded(value)
            | CacheStatus::LoadedReferencesRefreshed(value)
            | CacheStatus::Saved(value)
            | CacheStatus::SavedReferencesRefreshed(value) => Some(value),
            CacheStatus::Unloaded
            | CacheStatus::ReferenceUnloaded
            | CacheStatus::Loading
            | CacheStatus::Saving
            | CacheStatus::Deleted
            | CacheStatus::DeletedReferencesRefreshed => None,
        }
    }

    /// Saved or deleted with edges refreshed: nothing left to do this operation.
    pub fn is_finalized(&self) -> bool {
        matches!(
            self,
            CacheStatus::SavedReferencesRefreshed(_) | CacheStatus::DeletedReferencesRefreshed
        )
    }

    /// Touched only as somebody else's input or referrer.
    pub fn is_reference(&self) -> bool {
        matches!(
            self,
            CacheStatus::Unloaded | CacheStatus::ReferenceUnloaded | CacheStatus::ReferenceLoaded(_)
        )
    }

    /// An explicit load, save or delete outcome that belongs in the delta.
    pub fn is_outcome(&self) -> bool {
        matches!(
            self,
            CacheStatus::Loaded(_)
                | CacheStatus::LoadedReferencesRefreshed(_)
                | CacheStatus::Saved(_)
                | CacheStatus::SavedReferencesRefreshed(_)
                | CacheStatus::Deleted
                | CacheStatus::DeletedReferencesRefreshed
        )
    }

    pub fn is_deleted(&self) -> bool {
        matches!(self, CacheStatus::Deleted | CacheStatus::DeletedReferencesRefreshed)
    }

    /// Next status after `event`. On an invalid transition the current status
    /// is handed back with the names needed to report it.
    pub fn apply(self, event: StatusEvent<T>) -> Result<Self, (Self, &'static str)> {
        use CacheStatus as S;
        use StatusEvent as E;

        let event_name = event.name();
        let next = match (self, event) {
            // Reference touches never overwrite an explicit status
            (S::Unloaded, E::Referenced) => S::ReferenceUnloaded,
            (status, E::Referenced) => status,
            (S::Unloaded | S::ReferenceUnloaded | S::ReferenceLoaded(_), E::ReferenceLoaded(value)) => {
                S::ReferenceLoaded(value)
            }
            (status, E::ReferenceLoaded(_)) => status,

            (S::Unloaded | S::ReferenceUnloaded | S::ReferenceLoaded(_) | S::Loading, E::Loading) => S::Loading,
            (status @ (S::Loaded(_) | S::LoadedReferencesRefreshed(_)), E::Loading) => status,
            (
                S::Unloaded
                | S::ReferenceUnloaded
                | S::ReferenceLoaded(_)
                | S::Loading
                | S::Loaded(_)
                | S::LoadedReferencesRefreshed(_),
                E::Loaded(value),
            ) => S::Loaded(value),

            // The latest save or delete wins: structural edits delete a
            // coordinate and then save the cell moved onto it
            (S::Loading, E::Saving) => return Err((S::Loading, event_name)),
            (_, E::Saving) => S::Saving,
            (S::Loading, E::Saved(_)) => return Err((S::Loading, event_name)),
            (_, E::Saved(value)) => S::Saved(value),
            (status @ (S::Loading | S::Saving), E::Deleted) => return Err((status, event_name)),
            (_, E::Deleted) => S::Deleted,

            (S::Loaded(value) | S::LoadedReferencesRefreshed(value), E::ReferencesRefreshed) => {
                S::LoadedReferencesRefreshed(value)
            }
            (S::Saved(value) | S::SavedReferencesRefreshed(value), E::ReferencesRefreshed) => {
                S::SavedReferencesRefreshed(value)
            }
            (S::Deleted | S::DeletedReferencesRefreshed, E::ReferencesRefreshed) => S::DeletedReferencesRefreshed,

            (S::LoadedReferencesRefreshed(value), E::ForceReferencesRefresh) => S::Loaded(value),
            (S::SavedReferencesRefreshed(value), E::ForceReferencesRefresh) => S::Saved(value),
            (S::DeletedReferencesRefreshed, E::ForceReferencesRefresh) => S::Deleted,
            (
                status @ (S::Unloaded
                | S::ReferenceUnloaded
                | S::ReferenceLoaded(_)
                | S::Loaded(_)
                | S::Saved(_)
                | S::Deleted),
                E::ForceReferencesRefresh,
            ) => status,

            (
                status @ (S::Saving
                | S::Saved(_)
                | S::SavedReferencesRefreshed(_)
                | S::Deleted
                | S::DeletedReferencesRefreshed),
                E::Loading | E::Loaded(_),
            ) => return Err((status, event_name)),
            (
                status @ (S::Unloaded | S::ReferenceUnloaded | S::ReferenceLoaded(_) | S::Loading | S::Saving),
                E::ReferencesRefreshed,
            ) => return Err((status, event_name)),
            (status @ (S::Loading | S::Saving), E::ForceReferencesRefresh) => return Err((status, event_name)),
        };
        Ok(next)
    }
}

/// Statuses for one kind of reference (cells, labels, columns or rows).
#[derive(Debug)]
pub struct Cache<K, V> {
    entries: FxHashMap<K, CacheStatus<V>>,
}

impl<K, V> Default for Cache<K, V> {
    fn default() -> Self {
        Self { entries: FxHashMap::default() }
    }
}

impl<K: Display + Hash + Eq + Clone, V: Clone> Cache<K, V> {
    pub fn status(&self, key: &K) -> Option<&CacheStatus<V>> {
        self.entries.get(key)
    }

    pub fn apply(&mut self, key: &K, event: StatusEvent<V>) -> Result<(), InternalFault> {
        let current = self.entries.remove(key).unwrap_or_default();
        match current.apply(event) {
            Ok(next) => {
                log::trace!("{} -> {}", key, next.name());
                self.entries.insert(key.clone(), next);
                Ok(())
            }
            Err((current, event)) => {
                let fault = InternalFault::InvalidTransition {
                    reference: key.to_string(),
                    status: current.name(),
                    event,
                };
                self.entries.insert(key.clone(), current);
                Err(fault)
            }
        }
    }

    /// The value recorded for `key`. Statuses without one are a fault.
    pub fn value(&self, key: &K) -> Result<&V, InternalFault> {
        let status = self.entries.get(key).ok_or_else(|| InternalFault::Untracked { reference: key.to_string() })?;
        status.value().ok_or_else(|| InternalFault::NoValue {
            reference: key.to_string(),
            status: status.name(),
        })
    }

    pub fn is_finalized(&self, key: &K) -> bool {
        self.entries.get(key).map_or(false, CacheStatus::is_finalized)
    }

    pub fn is_deleted(&self, key: &K) -> bool {
        self.entries.get(key).map_or(false, CacheStatus::is_deleted)
    }

    /// Explicit outcomes: `(key, Some(value))` for loads and saves,
    /// `(key, None)` for deletes. Reference-only touches are left out.
    pub fn outcomes(&self) -> impl Iterator<Item = (&K, Option<&V>)> + '_ {
        self.entries
            .iter()
            .filter(|(_, status)| status.is_outcome())
            .map(|(key, status)| (key, status.value()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
