// End-to-end recompute scenarios against the public engine API.

use gridflow_engine::{
    Cell, CellRange, CellRef, Engine, EngineConfig, EngineError, EngineStores, ErrorKind, Header, LabelMapping,
    LabelName, Value,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn r(a1: &str) -> CellRef {
    a1.parse().unwrap()
}

fn set(engine: &Engine, a1: &str, text: &str) {
    engine.save_cell(Cell::new(r(a1), text)).unwrap();
}

fn stored(engine: &Engine, a1: &str) -> Option<Cell> {
    engine.stores().cells.load(r(a1))
}

fn value(engine: &Engine, a1: &str) -> Option<Value> {
    stored(engine, a1).and_then(|cell| cell.formula.value)
}

fn text(engine: &Engine, a1: &str) -> String {
    stored(engine, a1).map(|cell| cell.formula.text).unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[test]
fn insert_then_delete_column() {
    let engine = Engine::in_memory();
    set(&engine, "B1", "=A1*2");
    set(&engine, "A1", "5");
    assert_eq!(value(&engine, "B1"), Some(Value::Number(10.0)));

    engine.insert_columns(0, 1).unwrap();
    assert_eq!(text(&engine, "C1"), "=B1*2");
    assert_eq!(value(&engine, "C1"), Some(Value::Number(10.0)));

    engine.delete_columns(1, 1).unwrap();
    let cell = stored(&engine, "B1").unwrap();
    let error = cell.formula.error.unwrap();
    assert_eq!(error.kind, ErrorKind::Ref);
    assert_eq!(error.message, "Reference B1 deleted");
}

#[test]
fn chain_recomputes_every_link() {
    let engine = Engine::in_memory();
    set(&engine, "C1", "1");
    set(&engine, "B1", "=C1+1");
    set(&engine, "A1", "=B1+1");

    let delta = engine.save_cell(Cell::new(r("C1"), "10")).unwrap();
    assert_eq!(value(&engine, "A1"), Some(Value::Number(12.0)));
    let changed: Vec<String> = delta.cells.iter().map(|c| c.reference.to_string()).collect();
    assert_eq!(changed, vec!["A1", "B1", "C1"]);
}

#[test]
fn dropped_reference_stops_recompute() {
    let engine = Engine::in_memory();
    set(&engine, "A1", "1");
    set(&engine, "B1", "=A1");
    assert!(engine.save_cell(Cell::new(r("A1"), "2")).unwrap().cell(r("B1")).is_some());

    set(&engine, "B1", "=7");
    let delta = engine.save_cell(Cell::new(r("A1"), "3")).unwrap();
    assert!(delta.cell(r("B1")).is_none());
    assert_eq!(delta.cells.len(), 1);
}

#[test]
fn range_and_direct_paths_recompute_once() {
    let engine = Engine::in_memory();
    set(&engine, "A1", "1");
    set(&engine, "A2", "2");
    set(&engine, "B1", "=A1+SUM(A1:A2)");

    let delta = engine.save_cell(Cell::new(r("A1"), "5")).unwrap();
    assert_eq!(delta.cells.iter().filter(|c| c.reference == r("B1")).count(), 1);
    assert_eq!(value(&engine, "B1"), Some(Value::Number(12.0)));
}

#[test]
fn labels_resolve_and_follow_structural_edits() {
    let engine = Engine::in_memory();
    let revenue = LabelName::new("Revenue").unwrap();
    set(&engine, "B2", "100");
    set(&engine, "B3", "50");
    engine
        .save_label(LabelMapping::range(revenue.clone(), CellRange::new(r("B2"), r("B3"))))
        .unwrap();
    set(&engine, "D1", "=SUM(Revenue)");
    assert_eq!(value(&engine, "D1"), Some(Value::Number(150.0)));

    engine.insert_rows(2, 1).unwrap();
    let mapping = engine.stores().labels.load(&revenue).unwrap();
    assert_eq!(mapping.target.to_string(), "B2:B4");
    set(&engine, "B3", "25");
    assert_eq!(value(&engine, "D1"), Some(Value::Number(175.0)));
}

#[test]
fn fill_shifts_relative_and_keeps_absolute() {
    let engine = Engine::in_memory();
    for (a1, n) in [("A1", "1"), ("A2", "2"), ("A3", "3")] {
        set(&engine, a1, n);
    }
    let sources = vec![Cell::new(r("B1"), "=A1+1"), Cell::new(r("C1"), "=$A$1+1")];

    engine
        .fill_cells(sources, CellRange::new(r("B1"), r("C1")), CellRange::new(r("B1"), r("C3")))
        .unwrap();
    let relative: Vec<String> = ["B1", "B2", "B3"].iter().map(|a1| text(&engine, a1)).collect();
    assert_eq!(relative, vec!["=A1+1", "=A2+1", "=A3+1"]);
    for a1 in ["C1", "C2", "C3"] {
        assert_eq!(text(&engine, a1), "=$A$1+1");
        assert_eq!(value(&engine, a1), Some(Value::Number(2.0)));
    }
}

#[test]
fn config_from_toml_bounds_the_grid() {
    let config = EngineConfig::from_toml("max_column = 3\nmax_row = 10\n").unwrap();
    let engine = Engine::new(EngineStores::in_memory(), config);
    set(&engine, "C1", "1");

    let err = engine.save_cell(Cell::new(r("D1"), "1")).unwrap_err();
    assert!(matches!(err, EngineError::OutOfBounds { axis: "column", value: 3, max: 2 }));

    let delta = engine.insert_columns(0, 1).unwrap();
    assert_eq!(delta.deleted_cells, vec![r("C1")]);
    assert!(engine.stores().cells.all().is_empty());
}

#[test]
fn shared_stores_see_engine_writes() {
    let stores = EngineStores::in_memory();
    let engine = Engine::new(stores.clone(), EngineConfig::default());
    set(&engine, "A1", "=2+2");
    engine.save_row(Header::hidden(0)).unwrap();

    let cell = stores.cells.load(r("A1")).unwrap();
    assert_eq!(cell.formula.value, Some(Value::Number(4.0)));
    assert_eq!(stores.rows.load(0), Some(Header::hidden(0)));
}

#[test]
fn delta_serializes() {
    let engine = Engine::in_memory();
    set(&engine, "A1", "1");
    let delta = engine.delete_cell(r("A1")).unwrap();

    let json = serde_json::to_string(&delta).unwrap();
    assert!(json.contains("\"deleted_cells\":[\"A1\"]"), "{}", json);
    let back: gridflow_engine::EngineDelta = serde_json::from_str(&json).unwrap();
    assert_eq!(back, delta);
}
