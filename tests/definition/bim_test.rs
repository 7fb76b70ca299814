//! `model.bim` parsing.

use pbimeta::definition::bim::{parse_file, parse_str};
use pbimeta::model::{Cardinality, CrossFilterDirection, UNKNOWN_DATA_TYPE};
use pbimeta::ParseError;
use serde_json::json;

fn parse(document: serde_json::Value) -> Result<pbimeta::ModelMetadata, ParseError> {
    parse_str("model.bim", &document.to_string(), "Shop")
}

fn two_tables() -> serde_json::Value {
    json!([
        {
            "name": "Sales",
            "columns": [
                {"name": "CustomerID", "dataType": "int64"},
                {"name": "Amount", "dataType": "decimal"}
            ]
        },
        {
            "name": "Customer",
            "columns": [{"name": "CustomerID", "dataType": "int64"}]
        }
    ])
}

#[test]
fn test_top_level_document_without_model_wrapper() {
    let model = parse(json!({
        "tables": two_tables(),
        "relationships": [{
            "name": "r1",
            "fromTable": "Sales", "fromColumn": "CustomerID",
            "toTable": "Customer", "toColumn": "CustomerID"
        }]
    }))
    .unwrap();

    assert_eq!(model.name(), "Shop");
    assert_eq!(model.tables().len(), 2);
    // In-memory documents have no backing file.
    assert_eq!(model.file_path(), None);
    let rel = &model.relationships()[0];
    assert_eq!(rel.cardinality, Cardinality::ManyToOne);
    assert_eq!(rel.cross_filter_direction, CrossFilterDirection::Single);
    assert!(rel.is_active);
}

#[test]
fn test_explicit_relationship_properties() {
    let model = parse(json!({
        "model": {
            "tables": two_tables(),
            "relationships": [{
                "name": "r1",
                "fromTable": "Customer", "fromColumn": "CustomerID",
                "toTable": "Sales", "toColumn": "CustomerID",
                "fromCardinality": "one",
                "toCardinality": "many",
                "crossFilteringBehavior": "bothDirections",
                "isActive": false
            }]
        }
    }))
    .unwrap();

    let rel = &model.relationships()[0];
    assert_eq!(rel.cardinality, Cardinality::OneToMany);
    assert_eq!(rel.cross_filter_direction, CrossFilterDirection::Both);
    assert!(!rel.is_active);
}

#[test]
fn test_defaults_and_skipped_columns() {
    let model = parse(json!({
        "model": {
            "tables": [{
                "name": "Sales",
                "isHidden": true,
                "description": ["Fact table", "of orders"],
                "columns": [
                    {"name": "RowNumber-2662979B", "dataType": "int64", "type": "rowNumber", "isHidden": true},
                    {"name": "Amount"},
                    {"name": "Note", "dataType": "string", "type": "calculated"}
                ],
                "measures": [{"name": "Total", "expression": "SUM(Sales[Amount])"}]
            }]
        }
    }))
    .unwrap();

    let sales = model.table("Sales").unwrap();
    assert!(sales.is_hidden);
    assert_eq!(sales.description, "Fact table\nof orders");
    let columns: Vec<_> = sales.columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(columns, ["Amount", "Note"]);
    assert_eq!(sales.columns[0].data_type, UNKNOWN_DATA_TYPE);

    let total = &model.measures()[0];
    assert_eq!(total.table, "Sales");
    assert_eq!(total.format_string, "");
    assert_eq!(total.display_folder, "");
    assert!(!total.is_hidden);
}

#[test]
fn test_sources_in_table_order_then_shared() {
    let model = parse(json!({
        "model": {
            "tables": [
                {
                    "name": "Sales",
                    "partitions": [
                        {"name": "p1", "source": {"type": "m", "expression": ["let", "    S = 1", "in", "    S"]}},
                        {"name": "p2", "source": {"type": "calculated", "expression": "GENERATESERIES(1, 3)"}}
                    ]
                },
                {
                    "name": "Customer",
                    "partitions": [{"name": "p", "source": {"type": "m", "expression": "   "}}]
                },
                {
                    "name": "Region",
                    "partitions": [{"name": "p", "source": {"type": "m", "expression": "Region.Query"}}]
                }
            ],
            "expressions": [
                {"name": "Server", "kind": "m", "expression": "\"db01\" meta [IsParameterQuery=true]"},
                {"name": "Script", "kind": "python", "expression": "print(1)"},
                {"name": "Blank", "kind": "m", "expression": ""}
            ]
        }
    }))
    .unwrap();

    let sources: Vec<_> = model
        .data_sources()
        .iter()
        .map(|s| (s.name.as_str(), s.table.as_deref(), s.expression.as_str()))
        .collect();
    assert_eq!(
        sources,
        [
            ("Sales", Some("Sales"), "let\n    S = 1\nin\n    S"),
            ("Region", Some("Region"), "Region.Query"),
            ("Server", None, "\"db01\""),
        ]
    );
}

#[test]
fn test_table_without_name_is_missing_field() {
    let err = parse(json!({"model": {"tables": [{"columns": []}]}})).unwrap_err();
    match err {
        ParseError::MissingField { field, context, .. } => {
            assert_eq!(field, "name");
            assert_eq!(context, "model.bim tables[0]");
        }
        other => panic!("expected missing field, got {other:?}"),
    }
}

#[test]
fn test_measure_without_expression_is_missing_field() {
    let err = parse(json!({
        "model": {"tables": [{"name": "Sales", "measures": [{"name": "Total"}]}]}
    }))
    .unwrap_err();
    assert!(
        matches!(err, ParseError::MissingField { ref field, ref context, .. }
            if field == "expression" && context == "model.bim measure 'Total'"),
        "{err:?}"
    );
}

#[test]
fn test_relationship_to_unknown_column_is_undefined() {
    let err = parse(json!({
        "model": {
            "tables": two_tables(),
            "relationships": [{
                "fromTable": "Sales", "fromColumn": "RegionID",
                "toTable": "Customer", "toColumn": "CustomerID"
            }]
        }
    }))
    .unwrap_err();
    assert!(
        matches!(err, ParseError::UndefinedReference { ref name, .. } if name == "Sales.RegionID"),
        "{err:?}"
    );
}

#[test]
fn test_unknown_cross_filter_is_rejected() {
    let err = parse(json!({
        "model": {
            "tables": two_tables(),
            "relationships": [{
                "fromTable": "Sales", "fromColumn": "CustomerID",
                "toTable": "Customer", "toColumn": "CustomerID",
                "crossFilteringBehavior": "sideways"
            }]
        }
    }))
    .unwrap_err();
    assert!(
        matches!(err, ParseError::UnknownEnumValue { kind: "cross-filter direction", .. }),
        "{err:?}"
    );
}

#[test]
fn test_invalid_json_names_the_file() {
    let err = parse_str("model.bim", "{\"model\": {\"tables\": [", "Shop").unwrap_err();
    assert!(
        matches!(err, ParseError::Json { ref file, .. } if file == "model.bim"),
        "{err:?}"
    );
    assert!(err.to_string().starts_with("invalid JSON in model.bim"));
}

#[test]
fn test_parse_file_strips_byte_order_mark() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.bim");
    let document = json!({"model": {"tables": two_tables()}}).to_string();
    std::fs::write(&path, format!("\u{feff}{document}")).unwrap();

    let model = parse_file(&path, "Shop").unwrap();
    assert_eq!(model.tables().len(), 2);
    assert_eq!(model.file_path(), Some(path.as_path()));
    assert!(model.tables().iter().all(|t| t.row_count().is_none()));
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = parse_file(&dir.path().join("model.bim"), "Shop").unwrap_err();
    assert!(matches!(err, ParseError::Io { .. }), "{err:?}");
}
