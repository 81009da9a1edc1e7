//! Evaluation context used while recomputing.
//!
//! Reading a cell that is still pending recomputes it first, so every cell is
//! evaluated after its precedents no matter which order the queue hands them
//! out in. Reading a cell that is being evaluated further up the stack is a
//! cycle.

use super::Engine;
use crate::cache::StatusEvent;
use crate::cell::Cell;
use crate::changes::Changes;
use crate::error::InternalFault;
use crate::formula::{EvaluationContext, FormulaError, Value};
use crate::label::{resolve_label, LabelName, ResolvedTarget};
use crate::reference::{CellRange, CellRef};

pub(crate) struct RecomputeContext<'a> {
    engine: &'a Engine,
    changes: &'a Changes,
    /// Evaluation callbacks cannot fail with a fault, so the first one is
    /// kept here and surfaced by [`RecomputeContext::finish`].
    fault: Option<InternalFault>,
}

impl<'a> RecomputeContext<'a> {
    pub(crate) fn new(engine: &'a Engine, changes: &'a Changes) -> Self {
        Self { engine, changes, fault: None }
    }

    pub(crate) fn finish(self) -> Result<(), InternalFault> {
        match self.fault {
            Some(fault) => Err(fault),
            None => Ok(()),
        }
    }

    /// The current version of `reference`, recomputing it first if needed.
    /// `None` for empty or deleted cells.
    fn current(&mut self, reference: CellRef) -> Result<Option<Cell>, InternalFault> {
        if self.changes.is_pending(reference) {
            self.engine.recompute(self.changes, reference)?;
        }

        if let Some(cell) = self.changes.cached_cell(reference) {
            if cell.formula.is_evaluated() {
                return Ok(Some(cell));
            }
        } else if self.changes.is_deleted(reference) {
            return Ok(None);
        }

        let Some(cell) = self.engine.stores.cells.load(reference) else {
            return Ok(None);
        };
        if cell.formula.is_evaluated() {
            self.changes.cell_event(reference, StatusEvent::ReferenceLoaded(cell.clone()))?;
            return Ok(Some(cell));
        }

        // Stored without a result: compute it now
        log::trace!("{} read before it was evaluated", reference);
        self.engine.recompute(self.changes, reference)?;
        self.changes.settled_cell(reference).map(Some)
    }
}

impl EvaluationContext for RecomputeContext<'_> {
    fn cell_value(&mut self, cell: CellRef) -> Result<Value, FormulaError> {
        let reference = cell.normalized();
        if self.changes.is_evaluating(reference) {
            return Err(FormulaError::cycle(reference));
        }

        match self.current(reference) {
            Ok(Some(cell)) => cell.formula.result().unwrap_or(Ok(Value::Empty)),
            Ok(None) => Ok(Value::Empty),
            Err(fault) => {
                self.fault.get_or_insert(fault);
                Ok(Value::Empty)
            }
        }
    }

    fn range_cells(&mut self, range: CellRange) -> Vec<CellRef> {
        self.engine
            .stores
            .cells
            .load_range(range)
            .into_iter()
            .map(|cell| cell.reference)
            .collect()
    }

    fn resolve_label(&mut self, label: &LabelName) -> Result<ResolvedTarget, FormulaError> {
        resolve_label(&*self.engine.stores.labels, label, self.engine.config.max_label_depth)
    }
}

#[cfg(test)]
mod tests {
    use crate::formula::{ErrorKind, Value};
    use crate::harness::EngineHarness;

    #[test]
    fn test_pending_precedent_is_pulled_first() {
        let h = EngineHarness::new();
        h.set("A1", "1");
        // B1 leaves the queue before C1 but reads it
        h.set("D1", "=A1+1");
        h.set("C1", "=D1*10");
        h.set("B1", "=C1+D1");
        h.reset_saves();

        h.set("A1", "2");
        assert_eq!(h.value("D1"), Some(Value::Number(3.0)));
        assert_eq!(h.value("C1"), Some(Value::Number(30.0)));
        assert_eq!(h.value("B1"), Some(Value::Number(33.0)));
        for a1 in ["B1", "C1", "D1"] {
            assert_eq!(h.save_count(a1), 1, "{}", a1);
        }
    }

    #[test]
    fn test_mutual_reference_reports_cycle() {
        let h = EngineHarness::new();
        h.set("A1", "=B1+1");
        h.set("B1", "=A1+1");
        // A1 is pending while B1 evaluates, and recomputing it reads B1 back
        assert_eq!(h.error("A1").map(|e| e.kind), Some(ErrorKind::Cycle));
        assert_eq!(h.error("B1").map(|e| e.kind), Some(ErrorKind::Cycle));
    }

    #[test]
    fn test_empty_cells_read_as_empty() {
        let h = EngineHarness::new();
        h.set("A1", "=Z99&\"x\"");
        assert_eq!(h.value("A1"), Some(Value::Text("x".into())));
    }
}
