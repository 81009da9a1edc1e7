//! The recompute engine.
//!
//! Every public operation builds a [`Changes`] tracker, mutates the stores,
//! drains the pending queue to a fixpoint and returns the resulting
//! [`EngineDelta`]. Request errors are raised before the first mutation.

mod context;
mod copy;
mod delta;
mod structural;

use std::rc::Rc;

pub use delta::EngineDelta;

use crate::axis::{Axis, Columns, Header, Rows};
use crate::cache::StatusEvent;
use crate::cell::{Cell, Formula};
use crate::changes::{Changes, ChangesMode};
use crate::config::EngineConfig;
use crate::error::{EngineError, InternalFault};
use crate::formula::{A1Parser, BasicEvaluator, FormulaError, FormulaEvaluator, FormulaParser};
use crate::label::{LabelMapping, LabelName, LabelTarget};
use crate::reference::{CellRange, CellRef};
use crate::store::EngineStores;

use context::RecomputeContext;

pub struct Engine {
    stores: EngineStores,
    parser: Rc<dyn FormulaParser>,
    evaluator: Rc<dyn FormulaEvaluator>,
    config: EngineConfig,
}

impl Engine {
    pub fn new(stores: EngineStores, config: EngineConfig) -> Self {
        Self::with_collaborators(stores, config, Rc::new(A1Parser), Rc::new(BasicEvaluator))
    }

    /// Engine over fresh in-memory stores with the default grid limits.
    pub fn in_memory() -> Self {
        Self::new(EngineStores::in_memory(), EngineConfig::default())
    }

    pub fn with_collaborators(
        stores: EngineStores,
        config: EngineConfig,
        parser: Rc<dyn FormulaParser>,
        evaluator: Rc<dyn FormulaEvaluator>,
    ) -> Self {
        Self { stores, parser, evaluator, config }
    }

    pub fn stores(&self) -> &EngineStores {
        &self.stores
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // =========================================================================
    // Cells
    // =========================================================================

    /// Load a cell, evaluating it if it has no value or error yet. A missing
    /// cell yields an empty delta.
    pub fn load_cell(&self, reference: CellRef) -> Result<EngineDelta, EngineError> {
        let reference = reference.normalized();
        self.check_cell(reference)?;
        let changes = self.changes(ChangesMode::Immediate);

        if let Some(mut cell) = self.stores.cells.load(reference) {
            changes.cell_event(reference, StatusEvent::Loading)?;
            self.evaluate_cell(&changes, &mut cell)?;
            changes.cell_event(reference, StatusEvent::Loaded(cell))?;
            self.settle(&changes)?;
        }
        Ok(changes.into_delta())
    }

    /// Parse, evaluate and store `cell`, then recompute everything that reads it.
    pub fn save_cell(&self, cell: Cell) -> Result<EngineDelta, EngineError> {
        let reference = cell.reference.normalized();
        self.check_cell(reference)?;
        log::debug!("save_cell {}", reference);
        let changes = self.changes(ChangesMode::Immediate);

        // Whatever was parsed or computed for the old text is stale
        let mut cell = Cell::with_formula(reference, Formula::new(cell.formula.text));
        changes.cell_event(reference, StatusEvent::Saving)?;
        // Referrers go pending first so a cycle through this cell re-enters it
        changes.mark_referrers(reference);
        self.evaluate_cell(&changes, &mut cell)?;
        self.persist(&changes, cell)?;
        self.settle(&changes)?;
        Ok(changes.into_delta())
    }

    /// Delete a cell and recompute everything that read it.
    pub fn delete_cell(&self, reference: CellRef) -> Result<EngineDelta, EngineError> {
        let reference = reference.normalized();
        self.check_cell(reference)?;
        log::debug!("delete_cell {}", reference);
        let changes = self.changes(ChangesMode::Immediate);

        self.stores.cells.delete(reference);
        changes.check_fault()?;
        self.settle(&changes)?;
        Ok(changes.into_delta())
    }

    // =========================================================================
    // Labels
    // =========================================================================

    pub fn load_label(&self, label: &LabelName) -> Result<EngineDelta, EngineError> {
        let changes = self.changes(ChangesMode::Immediate);
        if let Some(mapping) = self.stores.labels.load(label) {
            let name = mapping.label.clone();
            changes.label_event(&name, StatusEvent::Loading)?;
            changes.label_event(&name, StatusEvent::Loaded(mapping))?;
        }
        Ok(changes.into_delta())
    }

    /// Store a label and recompute every cell that reads it, directly or
    /// through another label.
    pub fn save_label(&self, mapping: LabelMapping) -> Result<EngineDelta, EngineError> {
        self.check_label_target(&mapping.target)?;
        log::debug!("save_label {} -> {}", mapping.label, mapping.target);
        let changes = self.changes(ChangesMode::Immediate);

        changes.label_event(&mapping.label, StatusEvent::Saving)?;
        self.stores.labels.save(mapping);
        changes.check_fault()?;
        self.settle(&changes)?;
        Ok(changes.into_delta())
    }

    pub fn delete_label(&self, label: &LabelName) -> Result<EngineDelta, EngineError> {
        log::debug!("delete_label {}", label);
        let changes = self.changes(ChangesMode::Immediate);

        self.stores.labels.delete(label);
        changes.check_fault()?;
        self.settle(&changes)?;
        Ok(changes.into_delta())
    }

    // =========================================================================
    // Column and row headers
    // =========================================================================

    pub fn load_column(&self, index: u32) -> Result<EngineDelta, EngineError> {
        self.load_header::<Columns>(index)
    }

    pub fn save_column(&self, header: Header) -> Result<EngineDelta, EngineError> {
        self.save_header::<Columns>(header)
    }

    pub fn delete_column(&self, index: u32) -> Result<EngineDelta, EngineError> {
        self.delete_header::<Columns>(index)
    }

    pub fn load_row(&self, index: u32) -> Result<EngineDelta, EngineError> {
        self.load_header::<Rows>(index)
    }

    pub fn save_row(&self, header: Header) -> Result<EngineDelta, EngineError> {
        self.save_header::<Rows>(header)
    }

    pub fn delete_row(&self, index: u32) -> Result<EngineDelta, EngineError> {
        self.delete_header::<Rows>(index)
    }

    fn load_header<A: Axis>(&self, index: u32) -> Result<EngineDelta, EngineError> {
        self.check_coordinate::<A>(index)?;
        let changes = self.changes(ChangesMode::Immediate);
        if let Some(header) = A::headers(&self.stores).load(index) {
            changes.header_event(A::KIND, index, StatusEvent::Loading)?;
            changes.header_event(A::KIND, index, StatusEvent::Loaded(header))?;
        }
        Ok(changes.into_delta())
    }

    fn save_header<A: Axis>(&self, header: Header) -> Result<EngineDelta, EngineError> {
        self.check_coordinate::<A>(header.index)?;
        let changes = self.changes(ChangesMode::Immediate);
        changes.header_event(A::KIND, header.index, StatusEvent::Saving)?;
        A::headers(&self.stores).save(header);
        changes.check_fault()?;
        Ok(changes.into_delta())
    }

    fn delete_header<A: Axis>(&self, index: u32) -> Result<EngineDelta, EngineError> {
        self.check_coordinate::<A>(index)?;
        let changes = self.changes(ChangesMode::Immediate);
        A::headers(&self.stores).delete(index);
        changes.check_fault()?;
        Ok(changes.into_delta())
    }

    // =========================================================================
    // Recompute internals
    // =========================================================================

    fn changes(&self, mode: ChangesMode) -> Changes {
        Changes::new(&self.stores, &self.config, mode)
    }

    /// No-op if the expression is already cached. A parse failure becomes the
    /// formula's error.
    pub(crate) fn parse_if_necessary(&self, formula: &mut Formula) {
        if formula.expression.is_some() {
            return;
        }
        match self.parser.parse(&formula.text) {
            Ok(expression) => {
                formula.text = self.parser.format(&expression);
                formula.expression = Some(expression);
            }
            Err(failure) => {
                log::trace!("parse failed for {:?}: {}", formula.text, failure);
                formula.set_error(failure.to_formula_error());
            }
        }
    }

    /// No-op if the formula already has a value or an error.
    fn evaluate_if_possible(&self, changes: &Changes, cell: &mut Cell) -> Result<(), InternalFault> {
        if cell.formula.is_evaluated() {
            return Ok(());
        }
        let Some(expression) = cell.formula.expression.clone() else {
            return Err(InternalFault::Unevaluable { reference: cell.reference.to_string() });
        };

        let mut context = RecomputeContext::new(self, changes);
        let result = self.evaluator.evaluate(&expression, &mut context);
        context.finish()?;

        match result {
            Ok(value) => cell.formula.set_value(value),
            Err(error) => cell.formula.set_error(error),
        }
        Ok(())
    }

    /// Parse and evaluate `cell`, reporting a cycle if it is already being
    /// evaluated further up the stack.
    fn evaluate_cell(&self, changes: &Changes, cell: &mut Cell) -> Result<(), InternalFault> {
        self.parse_if_necessary(&mut cell.formula);
        if !changes.begin_evaluation(cell.reference) {
            cell.formula.set_error(FormulaError::cycle(cell.reference));
            return Ok(());
        }
        let result = self.evaluate_if_possible(changes, cell);
        changes.end_evaluation(cell.reference);
        result
    }

    /// Re-evaluate a cell from scratch and save it.
    pub(crate) fn recompute(&self, changes: &Changes, reference: CellRef) -> Result<(), InternalFault> {
        changes.take_pending(reference);
        let mut cell = match changes.cached_cell(reference) {
            Some(cell) => cell,
            None => {
                let Some(cell) = self.stores.cells.load(reference) else {
                    log::warn!("cell {} vanished before it was recomputed", reference);
                    return Ok(());
                };
                changes.cell_event(reference, StatusEvent::Loading)?;
                changes.cell_event(reference, StatusEvent::Loaded(cell.clone()))?;
                cell
            }
        };

        cell.formula.clear_result();
        self.evaluate_cell(changes, &mut cell)?;
        changes.cell_event(reference, StatusEvent::Saving)?;
        self.persist(changes, cell)
    }

    fn persist(&self, changes: &Changes, cell: Cell) -> Result<(), InternalFault> {
        log::trace!("persist {}", cell);
        self.stores.cells.save(cell);
        changes.check_fault()
    }

    /// Recompute queued cells until nothing is pending.
    pub(crate) fn drain(&self, changes: &Changes) -> Result<(), EngineError> {
        let mut recomputed = 0usize;
        while let Some(next) = changes.next_pending() {
            self.recompute(changes, next)?;
            recomputed += 1;
        }
        changes.check_fault()?;
        log::debug!("drained {} pending cells", recomputed);
        Ok(())
    }

    /// Drain now in immediate mode; batch operations drain once at the end.
    fn settle(&self, changes: &Changes) -> Result<(), EngineError> {
        match changes.mode() {
            ChangesMode::Immediate => self.drain(changes),
            ChangesMode::Batch => Ok(()),
        }
    }

    // =========================================================================
    // Request validation
    // =========================================================================

    fn check_coordinate<A: Axis>(&self, value: u32) -> Result<(), EngineError> {
        let max = A::last_coordinate(&self.config);
        if value > max {
            return Err(EngineError::OutOfBounds { axis: A::NAME, value, max });
        }
        Ok(())
    }

    fn check_cell(&self, cell: CellRef) -> Result<(), EngineError> {
        self.check_coordinate::<Columns>(cell.column.value)?;
        self.check_coordinate::<Rows>(cell.row.value)
    }

    fn check_range(&self, range: CellRange) -> Result<(), EngineError> {
        self.check_cell(range.begin())?;
        self.check_cell(range.end())
    }

    fn check_label_target(&self, target: &LabelTarget) -> Result<(), EngineError> {
        match target {
            LabelTarget::Cell(cell) => self.check_cell(*cell),
            LabelTarget::Range(range) => self.check_range(*range),
            LabelTarget::Label(_) => Ok(()),
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine").field("config", &self.config).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::{ErrorKind, Value};
    use crate::harness::EngineHarness;

    #[test]
    fn test_save_evaluates_and_canonicalizes() {
        let h = EngineHarness::new();
        let delta = h.set("A1", "=  1 + 2 * 3 ");
        assert_eq!(delta.cells.len(), 1);
        assert_eq!(h.text("A1"), "=1+2*3");
        assert_eq!(h.value("A1"), Some(Value::Number(7.0)));
    }

    #[test]
    fn test_literal_text() {
        let h = EngineHarness::new();
        h.set("A1", "hello");
        h.set("A2", "42");
        assert_eq!(h.value("A1"), Some(Value::Text("hello".into())));
        assert_eq!(h.value("A2"), Some(Value::Number(42.0)));
    }

    #[test]
    fn test_save_recomputes_referrers() {
        let h = EngineHarness::new();
        h.set("A1", "5");
        h.set("B1", "=A1*2");
        h.set("C1", "=B1+1");

        let delta = h.set("A1", "7");
        assert_eq!(h.value("B1"), Some(Value::Number(14.0)));
        assert_eq!(h.value("C1"), Some(Value::Number(15.0)));
        let changed: Vec<String> = delta.cells.iter().map(|c| c.reference.to_string()).collect();
        assert_eq!(changed, vec!["A1", "B1", "C1"]);
    }

    #[test]
    fn test_parse_failure_is_cell_error() {
        let h = EngineHarness::new();
        h.set("A1", "=1+");
        let error = h.error("A1").unwrap();
        assert_eq!(error.kind, ErrorKind::Syntax);

        h.set("B1", "=1 2");
        let error = h.error("B1").unwrap();
        assert!(error.message.contains("2"), "{}", error.message);
        assert_eq!(h.value("B1"), None);
    }

    #[test]
    fn test_self_reference_is_cycle() {
        let h = EngineHarness::new();
        h.set("A1", "=A1+1");
        assert_eq!(h.error("A1").map(|e| e.kind), Some(ErrorKind::Cycle));
    }

    #[test]
    fn test_errors_propagate() {
        let h = EngineHarness::new();
        h.set("A1", "=1/0");
        h.set("B1", "=A1+1");
        assert_eq!(h.error("B1").map(|e| e.kind), Some(ErrorKind::Div0));

        h.set("A1", "1");
        assert_eq!(h.value("B1"), Some(Value::Number(2.0)));
        assert_eq!(h.error("B1"), None);
    }

    #[test]
    fn test_delete_cell_recomputes_referrers() {
        let h = EngineHarness::new();
        h.set("A1", "3");
        h.set("B1", "=A1+1");

        let delta = h.engine.delete_cell(h.r("A1")).unwrap();
        assert_eq!(delta.deleted_cells, vec![h.r("A1")]);
        assert_eq!(h.value("B1"), Some(Value::Number(1.0)));
    }

    #[test]
    fn test_delete_missing_cell_is_empty() {
        let h = EngineHarness::new();
        assert!(h.engine.delete_cell(h.r("Z9")).unwrap().is_empty());
        assert!(h.engine.load_cell(h.r("Z9")).unwrap().is_empty());
    }

    #[test]
    fn test_load_cell_reports_loaded() {
        let h = EngineHarness::new();
        h.set("A1", "=2*3");
        let delta = h.engine.load_cell(h.r("$A$1")).unwrap();
        assert_eq!(delta.cell(h.r("A1")).and_then(|c| c.value().cloned()), Some(Value::Number(6.0)));
        assert!(delta.deleted_cells.is_empty());
    }

    #[test]
    fn test_resave_same_text_keeps_edges() {
        let h = EngineHarness::new();
        h.set("B1", "=A1+A1");
        h.set("B1", "=A1+A1");
        assert_eq!(h.engine.stores().cell_references.load_references(h.r("B1")), vec![h.r("A1")]);
    }

    #[test]
    fn test_diamond_recomputes_once() {
        let h = EngineHarness::new();
        h.set("A1", "1");
        h.set("B1", "=A1+1");
        h.set("C1", "=A1*10");
        h.set("D1", "=B1+C1+SUM(A1:C1)");
        h.reset_saves();

        let delta = h.set("A1", "2");
        assert_eq!(h.value("D1"), Some(Value::Number(3.0 + 20.0 + 25.0)));
        for a1 in ["A1", "B1", "C1", "D1"] {
            assert_eq!(h.save_count(a1), 1, "{} saved more than once", a1);
        }
        assert_eq!(delta.cells.len(), 4);
    }

    #[test]
    fn test_labels() {
        let h = EngineHarness::new();
        h.set("A1", "10");
        h.set("A2", "20");
        let rate = LabelName::new("Rate").unwrap();
        h.engine.save_label(LabelMapping::cell(rate.clone(), h.r("A1"))).unwrap();
        h.set("B1", "=Rate*2");
        assert_eq!(h.value("B1"), Some(Value::Number(20.0)));

        let delta = h.engine.save_label(LabelMapping::cell(rate.clone(), h.r("A2"))).unwrap();
        assert_eq!(h.value("B1"), Some(Value::Number(40.0)));
        assert!(delta.label(&rate).is_some());
        assert!(delta.cell(h.r("B1")).is_some());

        // Changing the cell behind the label reaches the formula too
        h.set("A2", "21");
        assert_eq!(h.value("B1"), Some(Value::Number(42.0)));

        let delta = h.engine.delete_label(&rate).unwrap();
        assert_eq!(delta.deleted_labels, vec![rate]);
        assert_eq!(h.error("B1").map(|e| e.kind), Some(ErrorKind::Name));
    }

    #[test]
    fn test_label_chain_depth_from_config() {
        let config = EngineConfig { max_label_depth: 2, ..EngineConfig::default() };
        let h = EngineHarness::with_config(config);
        let name = |s: &str| LabelName::new(s).unwrap();
        h.set("A1", "1");
        h.engine.save_label(LabelMapping::cell(name("Base"), h.r("A1"))).unwrap();
        h.engine.save_label(LabelMapping::alias(name("Middle"), name("Base"))).unwrap();
        h.engine.save_label(LabelMapping::alias(name("Top"), name("Middle"))).unwrap();

        h.set("B1", "=Middle");
        h.set("B2", "=Top");
        assert_eq!(h.value("B1"), Some(Value::Number(1.0)));
        assert_eq!(h.error("B2").map(|e| e.kind), Some(ErrorKind::Name));
    }

    #[test]
    fn test_headers() {
        let h = EngineHarness::new();
        let delta = h.engine.save_column(Header::hidden(2)).unwrap();
        assert_eq!(delta.columns, vec![Header::hidden(2)]);
        assert_eq!(h.engine.load_column(2).unwrap().columns, vec![Header::hidden(2)]);

        let delta = h.engine.delete_row(5).unwrap();
        assert!(delta.is_empty());
        h.engine.save_row(Header::new(5)).unwrap();
        assert_eq!(h.engine.delete_row(5).unwrap().deleted_rows, vec![5]);
    }

    #[test]
    fn test_out_of_bounds_rejected() {
        let config = EngineConfig { max_column: 4, max_row: 4, ..EngineConfig::default() };
        let h = EngineHarness::with_config(config);
        let err = h.engine.save_cell(Cell::new(h.r("E1"), "1")).unwrap_err();
        assert!(matches!(err, EngineError::OutOfBounds { axis: "column", value: 4, max: 3 }));
        assert!(h.engine.stores().cells.all().is_empty());

        let err = h.engine.save_row(Header::new(4)).unwrap_err();
        assert!(matches!(err, EngineError::OutOfBounds { axis: "row", .. }));
    }

    #[test]
    fn test_watchers_released_after_each_operation() {
        let h = EngineHarness::new();
        h.set("A1", "1");
        h.engine.insert_rows(0, 1).unwrap();
        let _ = h.engine.delete_columns(0, -1);
        // Only the harness' own counter remains
        assert_eq!(h.cell_watchers(), 1);
    }
}
