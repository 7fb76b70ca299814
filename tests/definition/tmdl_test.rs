//! TMDL folder parsing over temporary definition trees.

use std::path::PathBuf;

use pbimeta::definition::load_definition;
use pbimeta::model::{Cardinality, CrossFilterDirection, UNKNOWN_DATA_TYPE};
use pbimeta::{Error, ModelMetadata, ParseError};
use tempfile::TempDir;

/// Writes `files` under `Shop.SemanticModel/definition/` and returns the model dir.
fn definition(files: &[(&str, &str)]) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let model_dir = dir.path().join("Shop.SemanticModel");
    let definition = model_dir.join("definition");
    std::fs::create_dir_all(definition.join("tables")).unwrap();
    for (relative, content) in files {
        std::fs::write(definition.join(relative), content).unwrap();
    }
    (dir, model_dir)
}

fn load(files: &[(&str, &str)]) -> ModelMetadata {
    let (_dir, model_dir) = definition(files);
    load_definition(&model_dir, None).unwrap()
}

fn load_err(files: &[(&str, &str)]) -> ParseError {
    let (_dir, model_dir) = definition(files);
    match load_definition(&model_dir, None) {
        Err(Error::Parse(err)) => err,
        other => panic!("expected parse error, got {other:?}"),
    }
}

const SALES: &str = r#"table Sales
    column CustomerID
        dataType: int64
    column Amount
        dataType: decimal
"#;

const CUSTOMER: &str = r#"table Customer
    column CustomerID
        dataType: int64
    column Name
        dataType: string
"#;

#[test]
fn test_relationship_defaults() {
    let model = load(&[
        ("tables/Sales.tmdl", SALES),
        ("tables/Customer.tmdl", CUSTOMER),
        (
            "relationships.tmdl",
            "relationship r1\n    fromColumn: Sales.CustomerID\n    toColumn: Customer.CustomerID\n",
        ),
    ]);

    assert_eq!(model.name(), "Shop");
    assert_eq!(model.relationships().len(), 1);
    let rel = &model.relationships()[0];
    assert_eq!(rel.from_table, "Sales");
    assert_eq!(rel.from_column, "CustomerID");
    assert_eq!(rel.to_table, "Customer");
    assert_eq!(rel.to_column, "CustomerID");
    assert_eq!(rel.cardinality, Cardinality::ManyToOne);
    assert_eq!(rel.cross_filter_direction, CrossFilterDirection::Single);
    assert!(rel.is_active);
}

#[test]
fn test_explicit_relationship_properties() {
    let model = load(&[
        ("tables/Sales.tmdl", SALES),
        ("tables/Customer.tmdl", CUSTOMER),
        (
            "relationships.tmdl",
            r#"relationship r1
    fromCardinality: one
    toCardinality: many
    crossFilteringBehavior: bothDirections
    isActive: false
    fromColumn: Customer.CustomerID
    toColumn: Sales.CustomerID

relationship r2
    crossFilteringBehavior: automatic
    fromColumn: Sales.CustomerID
    toColumn: Customer.CustomerID
"#,
        ),
    ]);

    let rels = model.relationships();
    assert_eq!(rels.len(), 2);
    assert_eq!(rels[0].cardinality, Cardinality::OneToMany);
    assert_eq!(rels[0].cross_filter_direction, CrossFilterDirection::Both);
    assert!(!rels[0].is_active);
    assert_eq!(rels[1].cross_filter_direction, CrossFilterDirection::Single);
    assert_eq!(model.relationships_for("Sales").count(), 2);
}

#[test]
fn test_tables_follow_file_order_without_refs() {
    let model = load(&[
        ("tables/Sales.tmdl", SALES),
        ("tables/Customer.tmdl", CUSTOMER),
    ]);
    let tables: Vec<_> = model.tables().iter().map(|t| t.name.as_str()).collect();
    assert_eq!(tables, ["Customer", "Sales"]);
}

#[test]
fn test_ref_order_wins_and_unreferenced_tables_trail() {
    let model = load(&[
        ("model.tmdl", "model Model\n    culture: en-US\n\nref table Sales\n"),
        ("tables/Sales.tmdl", SALES),
        ("tables/Customer.tmdl", CUSTOMER),
        ("tables/Audit.tmdl", "table Audit\n    column Id\n        dataType: int64\n"),
    ]);
    let tables: Vec<_> = model.tables().iter().map(|t| t.name.as_str()).collect();
    assert_eq!(tables, ["Sales", "Audit", "Customer"]);
}

#[test]
fn test_quoted_names() {
    let model = load(&[
        (
            "tables/Date Table.tmdl",
            r#"table 'Date Table'
    column 'Fiscal Year'
        dataType: int64
    column Date
        dataType: dateTime
"#,
        ),
        (
            "tables/Sales Lines.tmdl",
            r#"table 'Sales Lines'
    column 'Order Date'
        dataType: dateTime

    measure 'Lines ''Shipped''' = COUNTROWS('Sales Lines')
"#,
        ),
        (
            "relationships.tmdl",
            "relationship d1\n    fromColumn: 'Sales Lines'.'Order Date'\n    toColumn: 'Date Table'.Date\n",
        ),
    ]);

    assert!(model.table("Date Table").unwrap().column("Fiscal Year").is_some());
    let lines = model.table("Sales Lines").unwrap();
    assert_eq!(lines.measures[0].name, "Lines 'Shipped'");
    assert_eq!(lines.measures[0].expression, "COUNTROWS('Sales Lines')");
    assert_eq!(model.relationships()[0].to_table, "Date Table");
    assert_eq!(model.relationships()[0].from_column, "Order Date");
}

#[test]
fn test_column_without_data_type_is_unknown() {
    let model = load(&[("tables/Misc.tmdl", "table Misc\n    column Anything\n        isHidden\n")]);
    let column = &model.table("Misc").unwrap().columns[0];
    assert_eq!(column.data_type, UNKNOWN_DATA_TYPE);
    assert!(column.is_hidden);
}

#[test]
fn test_measure_without_expression_is_missing_field() {
    let err = load_err(&[(
        "tables/Sales.tmdl",
        "table Sales\n    measure Broken\n        formatString: 0\n",
    )]);
    match err {
        ParseError::MissingField { field, context, .. } => {
            assert_eq!(field, "expression");
            assert!(context.contains("Broken"), "{context}");
        }
        other => panic!("expected missing field, got {other:?}"),
    }
}

#[test]
fn test_unnamed_column_names_file_and_line() {
    for declaration in ["column", "column ''"] {
        let text = format!("table Sales\n    column Amount\n    {declaration}\n        dataType: int64\n");
        let err = load_err(&[("tables/Sales.tmdl", text.as_str())]);
        match err {
            ParseError::MissingField { field, context, .. } => {
                assert_eq!(field, "name");
                assert!(context.starts_with("column ("), "{context}");
                assert!(context.contains("Sales.tmdl line 3"), "{context}");
            }
            other => panic!("expected missing field for '{declaration}', got {other:?}"),
        }
    }
}

#[test]
fn test_model_records_definition_folder() {
    let (_dir, model_dir) = definition(&[("tables/Sales.tmdl", SALES)]);
    let model = load_definition(&model_dir, None).unwrap();
    assert_eq!(model.file_path(), Some(model_dir.join("definition").as_path()));
    assert!(model.tables().iter().all(|t| t.row_count().is_none()));
}

#[test]
fn test_relationship_without_to_column_is_missing_field() {
    let err = load_err(&[
        ("tables/Sales.tmdl", SALES),
        ("relationships.tmdl", "relationship r1\n    fromColumn: Sales.CustomerID\n"),
    ]);
    assert!(
        matches!(err, ParseError::MissingField { ref field, .. } if field == "toColumn"),
        "{err:?}"
    );
}

#[test]
fn test_unknown_cardinality_is_rejected() {
    let err = load_err(&[
        ("tables/Sales.tmdl", SALES),
        ("tables/Customer.tmdl", CUSTOMER),
        (
            "relationships.tmdl",
            "relationship r1\n    toCardinality: several\n    fromColumn: Sales.CustomerID\n    toColumn: Customer.CustomerID\n",
        ),
    ]);
    assert!(
        matches!(err, ParseError::UnknownEnumValue { ref value, .. } if value == "several"),
        "{err:?}"
    );
}

#[test]
fn test_relationship_to_missing_table_is_undefined() {
    let err = load_err(&[
        ("tables/Sales.tmdl", SALES),
        (
            "relationships.tmdl",
            "relationship r1\n    fromColumn: Sales.CustomerID\n    toColumn: Region.RegionID\n",
        ),
    ]);
    assert!(
        matches!(err, ParseError::UndefinedReference { ref name, .. } if name == "Region"),
        "{err:?}"
    );
}

#[test]
fn test_duplicate_column_is_rejected() {
    let err = load_err(&[(
        "tables/Sales.tmdl",
        "table Sales\n    column Amount\n    column Amount\n",
    )]);
    assert!(
        matches!(err, ParseError::Duplicate { kind: "column", ref name, .. } if name == "Amount"),
        "{err:?}"
    );
}

#[test]
fn test_syntax_error_names_file_and_line() {
    let err = load_err(&[("tables/Sales.tmdl", "table Sales\n    column Amount\n    = 1\n")]);
    match err {
        ParseError::Syntax { file, line, .. } => {
            assert!(file.ends_with("Sales.tmdl"), "{file}");
            assert_eq!(line, 3);
        }
        other => panic!("expected syntax error, got {other:?}"),
    }
}

#[test]
fn test_non_m_partitions_and_empty_expressions_are_skipped() {
    let model = load(&[
        (
            "tables/Calc.tmdl",
            r#"table Calc
    column Value
        dataType: int64

    partition Calc = calculated
        source = GENERATESERIES(1, 10)
"#,
        ),
        ("expressions.tmdl", "expression Empty =\n\nexpression Path = \"C:\\data\"\n"),
    ]);
    let sources: Vec<_> = model.data_sources().iter().map(|s| s.name.as_str()).collect();
    assert_eq!(sources, ["Path"]);
    assert_eq!(model.data_sources()[0].expression, "\"C:\\data\"");
}
