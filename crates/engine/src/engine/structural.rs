//! Row and column insert/delete.
//!
//! One algorithm for both axes:
//!
//! 1. validate, before anything is mutated
//! 2. delete the doomed band (insert: cells pushed off the grid)
//! 3. vacate the old coordinates of every moving cell, then save each moved or
//!    rewritten cell at its new coordinate and force it to recompute
//! 4. re-point or delete label mappings
//! 5. shift or delete headers
//! 6. drain once, so cells that read each other settle together

use super::{Engine, EngineDelta};
use crate::axis::{Axis, Columns, EditKind, Header, Rows, StructuralEdit};
use crate::cell::{Cell, Formula};
use crate::changes::{Changes, ChangesMode};
use crate::error::{EngineError, InternalFault};
use crate::formula::fixer::{fix_label_target, fix_references, ReferenceFixer, StructuralFixer};
use crate::label::LabelMapping;
use crate::reference::CellRef;

/// What a structural edit does to the cell store.
#[derive(Debug, Default)]
struct CellPlan {
    doomed: Vec<CellRef>,
    vacated: Vec<CellRef>,
    staged: Vec<Cell>,
}

impl Engine {
    pub fn insert_columns(&self, at: u32, count: i64) -> Result<EngineDelta, EngineError> {
        self.structural_edit::<Columns>(EditKind::Insert, at, count)
    }

    pub fn delete_columns(&self, at: u32, count: i64) -> Result<EngineDelta, EngineError> {
        self.structural_edit::<Columns>(EditKind::Delete, at, count)
    }

    pub fn insert_rows(&self, at: u32, count: i64) -> Result<EngineDelta, EngineError> {
        self.structural_edit::<Rows>(EditKind::Insert, at, count)
    }

    pub fn delete_rows(&self, at: u32, count: i64) -> Result<EngineDelta, EngineError> {
        self.structural_edit::<Rows>(EditKind::Delete, at, count)
    }

    fn structural_edit<A: Axis>(&self, kind: EditKind, at: u32, count: i64) -> Result<EngineDelta, EngineError> {
        if count < 0 {
            return Err(EngineError::NegativeCount { axis: A::NAME, count });
        }
        self.check_coordinate::<A>(at)?;
        if count == 0 {
            return Ok(EngineDelta::default());
        }

        let last = A::last_coordinate(&self.config);
        let edit = StructuralEdit { kind, at, count: u32::try_from(count).unwrap_or(u32::MAX) };
        log::debug!("{:?} {} {}(s) at {}", kind, edit.count, A::NAME, at);

        let plan = self.plan_cells::<A>(edit, last)?;
        let changes = self.changes(ChangesMode::Batch);

        for reference in plan.doomed.iter().chain(&plan.vacated) {
            self.stores.cells.delete(*reference);
            changes.check_fault()?;
        }
        let staged = plan.staged.len();
        for cell in plan.staged {
            let reference = cell.reference;
            self.stores.cells.save(cell);
            changes.check_fault()?;
            changes.force_refresh(reference)?;
        }
        log::debug!(
            "{} cells deleted, {} staged, {} queued",
            plan.doomed.len(),
            staged,
            changes.queued()
        );

        self.shift_labels::<A>(&changes, edit, last)?;
        self.shift_headers::<A>(&changes, edit, last)?;
        self.drain(&changes)?;
        Ok(changes.into_delta())
    }

    fn plan_cells<A: Axis>(&self, edit: StructuralEdit, last: u32) -> Result<CellPlan, InternalFault> {
        let fixer = StructuralFixer::<A>::new(edit, last);
        let mut plan = CellPlan::default();

        for cell in self.stores.cells.all() {
            let from = cell.reference;
            let Some(value) = edit.move_coordinate(A::coordinate_of(from), last) else {
                plan.doomed.push(from);
                continue;
            };
            let to = A::with_coordinate(from, value);
            let rewritten = self.rewrite_formula(&cell.formula, &fixer)?;
            if to == from && rewritten.is_none() {
                continue;
            }
            if to != from {
                plan.vacated.push(from);
            }
            let mut formula = rewritten.unwrap_or(cell.formula);
            formula.clear_result();
            plan.staged.push(Cell::with_formula(to, formula));
        }
        Ok(plan)
    }

    /// `formula` with its references run through `fixer`, or `None` if nothing
    /// changed. Text that does not parse is left alone.
    pub(crate) fn rewrite_formula(
        &self,
        formula: &Formula,
        fixer: &dyn ReferenceFixer,
    ) -> Result<Option<Formula>, InternalFault> {
        let expression = match &formula.expression {
            Some(expression) => expression.clone(),
            None => match self.parser.parse(&formula.text) {
                Ok(expression) => expression,
                Err(_) => return Ok(None),
            },
        };

        let fixed = fix_references(&expression, fixer)?;
        if fixed == expression {
            return Ok(None);
        }
        let mut rewritten = Formula::new(self.parser.format(&fixed));
        rewritten.expression = Some(fixed);
        Ok(Some(rewritten))
    }

    fn shift_labels<A: Axis>(&self, changes: &Changes, edit: StructuralEdit, last: u32) -> Result<(), EngineError> {
        for mapping in self.stores.labels.all() {
            match fix_label_target::<A>(&mapping.target, edit, last) {
                Some(target) if target == mapping.target => {}
                Some(target) => {
                    self.stores.labels.save(LabelMapping::new(mapping.label, target));
                }
                None => {
                    log::debug!("label {} lost its target", mapping.label);
                    self.stores.labels.delete(&mapping.label);
                }
            }
            changes.check_fault()?;
        }
        Ok(())
    }

    fn shift_headers<A: Axis>(&self, changes: &Changes, edit: StructuralEdit, last: u32) -> Result<(), EngineError> {
        let store = A::headers(&self.stores);
        let mut vacated = Vec::new();
        let mut moved = Vec::new();
        for header in store.all() {
            match edit.move_coordinate(header.index, last) {
                Some(index) if index == header.index => {}
                Some(index) => {
                    vacated.push(header.index);
                    moved.push(Header { index, ..header });
                }
                None => vacated.push(header.index),
            }
        }

        for index in vacated {
            store.delete(index);
        }
        for header in moved {
            store.save(header);
        }
        changes.check_fault()?;
        Ok(())
    }
}
