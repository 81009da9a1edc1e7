//! Change tracking for one engine operation.
//!
//! A [`Changes`] value lives for exactly one operation. On construction it
//! registers save/delete watchers on every entity store; from then on each
//! store mutation, whoever triggers it:
//!
//! 1. records the outcome in the operation's [`Cache`],
//! 2. drops the entity's old edges and derives new ones from its formula,
//! 3. marks every transitive referrer pending and queues it.
//!
//! The engine drains the queue (after each of its own saves in
//! [`ChangesMode::Immediate`], once after staging in [`ChangesMode::Batch`]).
//! Dropping the tracker releases every watcher.

use std::cell::RefCell;
use std::collections::{BTreeSet, VecDeque};
use std::rc::{Rc, Weak};

use parking_lot::Mutex;
use rustc_hash::FxHashSet;

use crate::axis::{AxisKind, Header};
use crate::cache::{Cache, StatusEvent};
use crate::cell::Cell;
use crate::config::EngineConfig;
use crate::engine::EngineDelta;
use crate::error::InternalFault;
use crate::formula::refs::extract_references;
use crate::formula::Expr;
use crate::label::{follow_chain, LabelMapping, LabelName};
use crate::reference::{CellRef, ExpressionReference};
use crate::store::{EngineStores, HeaderStore, Unregister};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangesMode {
    /// Referrers are recomputed right after each engine save.
    Immediate,
    /// Edges are maintained as saves happen; recomputation waits for an
    /// explicit drain.
    Batch,
}

struct ChangesState {
    stores: EngineStores,
    max_label_depth: usize,
    cells: RefCell<Cache<CellRef, Cell>>,
    labels: RefCell<Cache<LabelName, LabelMapping>>,
    columns: RefCell<Cache<u32, Header>>,
    rows: RefCell<Cache<u32, Header>>,
    queue: Mutex<VecDeque<CellRef>>,
    /// Marked but not yet recomputed
    pending: RefCell<FxHashSet<CellRef>>,
    /// Currently being evaluated; reading one of these is a cycle
    evaluating: RefCell<FxHashSet<CellRef>>,
    /// First fault raised inside a watcher
    fault: RefCell<Option<InternalFault>>,
}

pub struct Changes {
    mode: ChangesMode,
    state: Rc<ChangesState>,
    registrations: Vec<Unregister>,
}

impl Changes {
    pub fn new(stores: &EngineStores, config: &EngineConfig, mode: ChangesMode) -> Self {
        let state = Rc::new(ChangesState {
            stores: stores.clone(),
            max_label_depth: config.max_label_depth,
            cells: RefCell::default(),
            labels: RefCell::default(),
            columns: RefCell::default(),
            rows: RefCell::default(),
            queue: Mutex::new(VecDeque::new()),
            pending: RefCell::default(),
            evaluating: RefCell::default(),
            fault: RefCell::new(None),
        });

        let mut registrations = Vec::with_capacity(8);

        let weak = Rc::downgrade(&state);
        registrations.push(stores.cells.add_save_watcher(Rc::new(move |cell: &Cell| {
            if let Some(state) = weak.upgrade() {
                state.cell_saved(cell);
            }
        })));
        let weak = Rc::downgrade(&state);
        registrations.push(stores.cells.add_delete_watcher(Rc::new(move |reference: &CellRef| {
            if let Some(state) = weak.upgrade() {
                state.cell_deleted(*reference);
            }
        })));
        let weak = Rc::downgrade(&state);
        registrations.push(stores.labels.add_save_watcher(Rc::new(move |mapping: &LabelMapping| {
            if let Some(state) = weak.upgrade() {
                state.label_saved(mapping);
            }
        })));
        let weak = Rc::downgrade(&state);
        registrations.push(stores.labels.add_delete_watcher(Rc::new(move |label: &LabelName| {
            if let Some(state) = weak.upgrade() {
                state.label_deleted(label);
            }
        })));
        registrations.extend(watch_headers(&state, &stores.columns, AxisKind::Column));
        registrations.extend(watch_headers(&state, &stores.rows, AxisKind::Row));

        log::trace!("registered {} store watchers ({:?})", registrations.len(), mode);
        Self { mode, state, registrations }
    }

    pub fn mode(&self) -> ChangesMode {
        self.mode
    }

    // =========================================================================
    // Cache access
    // =========================================================================

    pub fn cell_event(&self, reference: CellRef, event: StatusEvent<Cell>) -> Result<(), InternalFault> {
        self.state.cells.borrow_mut().apply(&reference.normalized(), event)
    }

    pub fn label_event(&self, label: &LabelName, event: StatusEvent<LabelMapping>) -> Result<(), InternalFault> {
        self.state.labels.borrow_mut().apply(label, event)
    }

    pub fn header_event(&self, axis: AxisKind, index: u32, event: StatusEvent<Header>) -> Result<(), InternalFault> {
        self.state.headers(axis).borrow_mut().apply(&index, event)
    }

    /// The cell as this operation last saw it, if it carries a value.
    pub fn cached_cell(&self, reference: CellRef) -> Option<Cell> {
        let cells = self.state.cells.borrow();
        cells.status(&reference.normalized()).and_then(|status| status.value()).cloned()
    }

    /// The cell this operation recorded a value for. A reference with no
    /// value recorded yet is a fault.
    pub fn settled_cell(&self, reference: CellRef) -> Result<Cell, InternalFault> {
        self.state.cells.borrow().value(&reference.normalized()).cloned()
    }

    pub fn is_deleted(&self, reference: CellRef) -> bool {
        self.state.cells.borrow().is_deleted(&reference.normalized())
    }

    pub fn is_finalized(&self, reference: CellRef) -> bool {
        self.state.cells.borrow().is_finalized(&reference.normalized())
    }

    // =========================================================================
    // Pending work
    // =========================================================================

    pub fn is_pending(&self, reference: CellRef) -> bool {
        self.state.pending.borrow().contains(&reference.normalized())
    }

    /// Mark everything that reads `reference` pending without recording an
    /// outcome for `reference` itself.
    pub fn mark_referrers(&self, reference: CellRef) {
        self.state.mark_referrers(reference.normalized());
    }

    /// Claim a pending cell for recomputation. False if it was not pending.
    pub fn take_pending(&self, reference: CellRef) -> bool {
        self.state.pending.borrow_mut().remove(&reference.normalized())
    }

    /// Queue `reference` for recomputation even though its outcome is already
    /// recorded.
    pub fn force_refresh(&self, reference: CellRef) -> Result<(), InternalFault> {
        let reference = reference.normalized();
        self.cell_event(reference, StatusEvent::ForceReferencesRefresh)?;
        if self.state.pending.borrow_mut().insert(reference) {
            self.state.queue.lock().push_back(reference);
        }
        Ok(())
    }

    /// Next queued cell that still needs work.
    pub fn next_pending(&self) -> Option<CellRef> {
        loop {
            let next = self.state.queue.lock().pop_front()?;
            if !self.is_pending(next) {
                continue;
            }
            if self.is_finalized(next) {
                log::trace!("dropping queued cell {}: already finalized", next);
                self.take_pending(next);
                continue;
            }
            return Some(next);
        }
    }

    pub fn queued(&self) -> usize {
        self.state.queue.lock().len()
    }

    // =========================================================================
    // Evaluation guard
    // =========================================================================

    /// Mark `reference` as being evaluated. False if it already is.
    pub fn begin_evaluation(&self, reference: CellRef) -> bool {
        self.state.evaluating.borrow_mut().insert(reference.normalized())
    }

    pub fn end_evaluation(&self, reference: CellRef) {
        self.state.evaluating.borrow_mut().remove(&reference.normalized());
    }

    pub fn is_evaluating(&self, reference: CellRef) -> bool {
        self.state.evaluating.borrow().contains(&reference.normalized())
    }

    /// Surface a fault a watcher ran into since the last check.
    pub fn check_fault(&self) -> Result<(), InternalFault> {
        match self.state.fault.borrow_mut().take() {
            Some(fault) => Err(fault),
            None => Ok(()),
        }
    }

    /// Release the watchers and collect every explicit outcome.
    pub fn into_delta(self) -> EngineDelta {
        let Changes { state, registrations, .. } = self;
        drop(registrations);
        log::trace!("released store watchers");

        let delta = EngineDelta::from_caches(
            &state.cells.borrow(),
            &state.labels.borrow(),
            &state.columns.borrow(),
            &state.rows.borrow(),
        );
        delta
    }
}

impl std::fmt::Debug for Changes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Changes")
            .field("mode", &self.mode)
            .field("watchers", &self.registrations.len())
            .field("queued", &self.queued())
            .finish()
    }
}

fn watch_headers(state: &Rc<ChangesState>, store: &Rc<dyn HeaderStore>, axis: AxisKind) -> [Unregister; 2] {
    let weak: Weak<ChangesState> = Rc::downgrade(state);
    let saved = store.add_save_watcher(Rc::new(move |header: &Header| {
        if let Some(state) = weak.upgrade() {
            state.header_changed(axis, header.index, StatusEvent::Saved(header.clone()));
        }
    }));
    let weak: Weak<ChangesState> = Rc::downgrade(state);
    let deleted = store.add_delete_watcher(Rc::new(move |index: &u32| {
        if let Some(state) = weak.upgrade() {
            state.header_changed(axis, *index, StatusEvent::Deleted);
        }
    }));
    [saved, deleted]
}

impl ChangesState {
    fn headers(&self, axis: AxisKind) -> &RefCell<Cache<u32, Header>> {
        match axis {
            AxisKind::Column => &self.columns,
            AxisKind::Row => &self.rows,
        }
    }

    fn record(&self, result: Result<(), InternalFault>) {
        if let Err(fault) = result {
            log::warn!("store watcher fault: {}", fault);
            self.fault.borrow_mut().get_or_insert(fault);
        }
    }

    // -------------------------------------------------------------------------
    // Watchers
    // -------------------------------------------------------------------------

    fn cell_saved(&self, cell: &Cell) {
        let reference = cell.reference.normalized();
        log::trace!("cell {} saved", reference);
        self.record(self.cells.borrow_mut().apply(&reference, StatusEvent::Saved(cell.clone())));
        self.refresh_edges(reference, cell.formula.expression.as_ref());
        self.record(self.cells.borrow_mut().apply(&reference, StatusEvent::ReferencesRefreshed));
        self.mark_referrers(reference);
    }

    fn cell_deleted(&self, reference: CellRef) {
        let reference = reference.normalized();
        log::trace!("cell {} deleted", reference);
        self.record(self.cells.borrow_mut().apply(&reference, StatusEvent::Deleted));
        self.stores.remove_referrer(reference);
        self.record(self.cells.borrow_mut().apply(&reference, StatusEvent::ReferencesRefreshed));
        self.mark_referrers(reference);
    }

    fn label_saved(&self, mapping: &LabelMapping) {
        log::trace!("label {} saved", mapping.label);
        self.record(self.labels.borrow_mut().apply(&mapping.label, StatusEvent::Saved(mapping.clone())));
        self.record(self.labels.borrow_mut().apply(&mapping.label, StatusEvent::ReferencesRefreshed));
        self.mark_label_referrers(&mapping.label);
    }

    fn label_deleted(&self, label: &LabelName) {
        log::trace!("label {} deleted", label);
        self.record(self.labels.borrow_mut().apply(label, StatusEvent::Deleted));
        self.record(self.labels.borrow_mut().apply(label, StatusEvent::ReferencesRefreshed));
        self.mark_label_referrers(label);
    }

    fn header_changed(&self, axis: AxisKind, index: u32, event: StatusEvent<Header>) {
        let headers = self.headers(axis);
        self.record(headers.borrow_mut().apply(&index, event));
        self.record(headers.borrow_mut().apply(&index, StatusEvent::ReferencesRefreshed));
    }

    // -------------------------------------------------------------------------
    // Edges
    // -------------------------------------------------------------------------

    /// Replace `referrer`'s outgoing edges with the ones its formula implies.
    fn refresh_edges(&self, referrer: CellRef, expression: Option<&Expr>) {
        self.stores.remove_referrer(referrer);
        let Some(expression) = expression else {
            return;
        };
        for reference in extract_references(expression) {
            match reference {
                ExpressionReference::Cell(cell) => {
                    self.stores.cell_references.add_reference(cell.normalized(), referrer)
                }
                ExpressionReference::Label(label) => self.stores.label_references.add_reference(label, referrer),
                ExpressionReference::Range(range) => self.stores.range_references.add_value(range, referrer),
            }
        }
    }

    /// Cells whose formulas read `cell` directly, through a range, or through
    /// a label that resolves onto it.
    fn direct_referrers(&self, cell: CellRef) -> BTreeSet<CellRef> {
        let mut found = self.stores.cell_references.load_referrers(&cell);
        for range in self.stores.range_references.ranges_containing(cell) {
            found.extend(self.stores.range_references.load(&range));
        }
        for mapping in self.stores.labels.all() {
            let chain = follow_chain(&*self.stores.labels, &mapping.label, self.max_label_depth);
            if matches!(chain.end, Ok(target) if target.contains(cell)) {
                found.extend(self.stores.label_references.load_referrers(&mapping.label));
            }
        }
        found
    }

    /// Mark every cell reachable from `origin` pending before any of them is
    /// evaluated.
    fn mark_referrers(&self, origin: CellRef) {
        let mut frontier = vec![origin];
        while let Some(changed) = frontier.pop() {
            for referrer in self.direct_referrers(changed) {
                if self.enqueue(referrer) {
                    frontier.push(referrer);
                }
            }
        }
    }

    /// Mark the cells reading `label`, or any label whose chain passes
    /// through it.
    fn mark_label_referrers(&self, label: &LabelName) {
        let mut affected = vec![label.clone()];
        for mapping in self.stores.labels.all() {
            if mapping.label == *label {
                continue;
            }
            let chain = follow_chain(&*self.stores.labels, &mapping.label, self.max_label_depth);
            if chain.visited.contains(label) {
                affected.push(mapping.label);
            }
        }

        for name in affected {
            for referrer in self.stores.label_references.load_referrers(&name) {
                if self.enqueue(referrer) {
                    self.mark_referrers(referrer);
                }
            }
        }
    }

    /// Queue a referrer once. Finalized cells are left alone.
    fn enqueue(&self, referrer: CellRef) -> bool {
        if self.cells.borrow().is_finalized(&referrer) {
            log::trace!("{} already settled, not queued", referrer);
            return false;
        }
        if !self.pending.borrow_mut().insert(referrer) {
            return false;
        }
        self.record(self.cells.borrow_mut().apply(&referrer, StatusEvent::Referenced));
        self.queue.lock().push_back(referrer);
        log::trace!("queued {}", referrer);
        true
    }
}
