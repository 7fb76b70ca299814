//! PBIXRay adapter tests over a canned tool caller.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use pbimeta::mcp::{CallToolResult, ContentBlock, McpError, McpResult, ToolCaller};
use pbimeta::model::{Cardinality, CrossFilterDirection};
use pbimeta::pbixray::{MetadataSource, PbixRayProvider};
use pbimeta::{Error, ErrorKind, ParseError};
use serde_json::{json, Value};

/// Answers each tool with fixed text; `get_schema` is keyed by table.
#[derive(Default)]
struct CannedCaller {
    answers: HashMap<String, McpResult<String>>,
    calls: Mutex<Vec<(String, Value)>>,
}

impl CannedCaller {
    fn answer(mut self, key: &str, text: impl Into<String>) -> Self {
        self.answers.insert(key.to_string(), Ok(text.into()));
        self
    }

    fn fail(mut self, key: &str, message: &str) -> Self {
        self.answers
            .insert(key.to_string(), Err(McpError::tool(None, message)));
        self
    }

    fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ToolCaller for CannedCaller {
    async fn call_tool(&self, name: &str, arguments: Value) -> McpResult<CallToolResult> {
        self.calls
            .lock()
            .unwrap()
            .push((name.to_string(), arguments.clone()));

        let key = match arguments.get("table_name").and_then(Value::as_str) {
            Some(table) => format!("{name}:{table}"),
            None => name.to_string(),
        };
        match self.answers.get(&key) {
            Some(Ok(text)) => Ok(CallToolResult {
                content: vec![ContentBlock::Text { text: text.clone() }],
                ..Default::default()
            }),
            Some(Err(McpError::Tool { code, message })) => Err(McpError::tool(*code, message.clone())),
            Some(Err(other)) => Err(McpError::connection(other.to_string())),
            None => Err(McpError::tool(None, format!("no canned answer for {key}"))),
        }
    }
}

fn sales_model() -> CannedCaller {
    CannedCaller::default()
        .answer("load_pbix_file", "Successfully loaded 'Sales.pbix'")
        .answer(
            "get_tables",
            "<StringArray>\n['Sales', 'Customer']\nLength: 2, dtype: string",
        )
        .answer(
            "get_schema:Sales",
            json!([
                {"TableName": "Sales", "ColumnName": "CustomerID", "PandasDataType": "int64"},
                {"TableName": "Sales", "ColumnName": "Amount", "PandasDataType": "float64"}
            ])
            .to_string(),
        )
        .answer(
            "get_schema:Customer",
            json!([
                {"TableName": "Customer", "ColumnName": "CustomerID", "PandasDataType": "int64"},
                {"TableName": "Customer", "ColumnName": "Name", "PandasDataType": "object"}
            ])
            .to_string(),
        )
        .answer(
            "get_dax_measures",
            json!([
                {"TableName": "Sales", "Name": "Total Sales", "Expression": "SUM(Sales[Amount])"},
                {"TableName": "Sales", "Name": "Avg Sale", "Expression": "DIVIDE([Total Sales], COUNTROWS(Sales))", "DisplayFolder": "KPIs"}
            ])
            .to_string(),
        )
        .answer(
            "get_relationships",
            json!([{
                "FromTableName": "Sales",
                "FromColumnName": "CustomerID",
                "ToTableName": "Customer",
                "ToColumnName": "CustomerID",
                "IsActive": 1,
                "Cardinality": "M:1",
                "CrossFilteringBehavior": "Single"
            }])
            .to_string(),
        )
        .answer(
            "get_power_query",
            json!([
                {"TableName": "Customer", "Expression": "let\n    Source = Sql.Database(\"db\", \"crm\")\nin\n    Source"},
                {"TableName": "Sales", "Expression": "let Source = Csv.Document(...) in Source"}
            ])
            .to_string(),
        )
        .answer(
            "get_model_summary",
            json!({"tables_count": 2, "measures_count": 2, "relationships_count": 1, "size_bytes": 40960})
                .to_string(),
        )
}

fn pbix_fixture() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("Sales.pbix"), b"PK\x03\x04").unwrap();
    dir
}

#[tokio::test]
async fn test_extract_model_end_to_end() {
    let dir = pbix_fixture();
    let caller = sales_model();
    let provider = PbixRayProvider::new(&caller);

    let model = provider
        .extract_model(&dir.path().join("Sales.pbix"), None)
        .await
        .unwrap();

    assert_eq!(model.name(), "Sales");
    assert_eq!(model.size_bytes(), Some(40960));

    let tables: Vec<_> = model.tables().iter().map(|t| t.name.as_str()).collect();
    assert_eq!(tables, ["Sales", "Customer"]);
    assert_eq!(model.table("Customer").unwrap().columns[1].data_type, "object");
    assert!(model.columns().all(|c| !c.table.is_empty()));

    let measures: Vec<_> = model.measures().iter().map(|m| m.name.as_str()).collect();
    assert_eq!(measures, ["Total Sales", "Avg Sale"]);
    assert_eq!(model.measures()[1].display_folder, "KPIs");
    assert_eq!(model.measures()[0].format_string, "");

    let rel = &model.relationships()[0];
    assert_eq!((rel.from_table.as_str(), rel.to_table.as_str()), ("Sales", "Customer"));
    assert_eq!(rel.cardinality, Cardinality::ManyToOne);
    assert_eq!(rel.cross_filter_direction, CrossFilterDirection::Single);
    assert!(rel.is_active);

    // Table queries follow table order.
    let sources: Vec<_> = model
        .data_sources()
        .iter()
        .map(|s| (s.name.as_str(), s.table.as_deref()))
        .collect();
    assert_eq!(sources, [("Sales", Some("Sales")), ("Customer", Some("Customer"))]);

    let calls = caller.calls();
    assert_eq!(calls[0].0, "load_pbix_file");
    let loaded = calls[0].1["file_path"].as_str().unwrap();
    assert!(Path::new(loaded).is_absolute());
    assert_eq!(model.file_path(), Some(Path::new(loaded)));
    assert!(model.file_path().unwrap().ends_with("Sales.pbix"));
    // Bare table names carry no row counts.
    assert!(model.tables().iter().all(|t| t.row_count().is_none()));
    let schema_calls = calls.iter().filter(|(name, _)| name == "get_schema").count();
    assert_eq!(schema_calls, 2);
}

#[tokio::test]
async fn test_table_records_carry_row_counts() {
    let dir = pbix_fixture();
    let caller = sales_model().answer(
        "get_tables",
        json!([
            {"Name": "Sales", "RowCount": 1200},
            {"name": "Customer", "row_count": "35"}
        ])
        .to_string(),
    );
    let model = PbixRayProvider::new(&caller)
        .extract_model(&dir.path().join("Sales.pbix"), None)
        .await
        .unwrap();

    assert_eq!(model.table("Sales").unwrap().row_count(), Some(1200));
    assert_eq!(model.table("Customer").unwrap().row_count(), Some(35));
    let json = serde_json::to_value(&model).unwrap();
    assert_eq!(json["tables"][0]["row_count"], 1200);
}

#[tokio::test]
async fn test_display_name_override() {
    let dir = pbix_fixture();
    let caller = sales_model();
    let model = PbixRayProvider::new(&caller)
        .extract_model(&dir.path().join("Sales.pbix"), Some("Sales Model"))
        .await
        .unwrap();
    assert_eq!(model.name(), "Sales Model");
}

#[tokio::test]
async fn test_summary_failure_is_not_fatal() {
    let dir = pbix_fixture();
    let caller = sales_model().fail("get_model_summary", "summary not supported");
    let model = PbixRayProvider::new(&caller)
        .extract_model(&dir.path().join("Sales.pbix"), None)
        .await
        .unwrap();
    assert_eq!(model.size_bytes(), None);
    assert_eq!(model.tables().len(), 2);
}

#[tokio::test]
async fn test_tool_error_aborts_extraction() {
    let dir = pbix_fixture();
    let caller = sales_model().fail("get_dax_measures", "No model loaded");
    let err = PbixRayProvider::new(&caller)
        .extract_model(&dir.path().join("Sales.pbix"), None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Tool);
}

#[tokio::test]
async fn test_malformed_table_literal_is_parse_error() {
    let dir = pbix_fixture();
    let caller = sales_model().answer("get_tables", "['Sales', )");
    let err = PbixRayProvider::new(&caller)
        .extract_model(&dir.path().join("Sales.pbix"), None)
        .await
        .unwrap_err();
    assert!(
        matches!(err, Error::Parse(ParseError::MalformedLiteral { .. })),
        "{err:?}"
    );
}

#[tokio::test]
async fn test_measure_without_name_is_fatal() {
    let dir = pbix_fixture();
    let caller = sales_model().answer(
        "get_dax_measures",
        json!([{"TableName": "Sales", "Expression": "1"}]).to_string(),
    );
    let err = PbixRayProvider::new(&caller)
        .extract_model(&dir.path().join("Sales.pbix"), None)
        .await
        .unwrap_err();
    match err {
        Error::Parse(ParseError::MissingField { field, context, .. }) => {
            assert_eq!(field, "measure name");
            assert_eq!(context, "get_dax_measures record 1");
        }
        other => panic!("expected missing field, got {other:?}"),
    }
}

#[tokio::test]
async fn test_relationship_to_unknown_table_is_undefined_reference() {
    let dir = pbix_fixture();
    let caller = sales_model().answer(
        "get_relationships",
        json!([{
            "FromTableName": "Sales",
            "FromColumnName": "CustomerID",
            "ToTableName": "Region",
            "ToColumnName": "RegionID"
        }])
        .to_string(),
    );
    let err = PbixRayProvider::new(&caller)
        .extract_model(&dir.path().join("Sales.pbix"), None)
        .await
        .unwrap_err();
    assert!(
        matches!(err, Error::Parse(ParseError::UndefinedReference { ref name, .. }) if name == "Region"),
        "{err:?}"
    );
}

#[tokio::test]
async fn test_missing_file_is_not_found() {
    let caller = sales_model();
    let err = PbixRayProvider::new(&caller)
        .extract_model(Path::new("/no/such/Sales.pbix"), None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(caller.calls().is_empty());
}

#[tokio::test]
async fn test_custom_tool_names() {
    let dir = pbix_fixture();
    let mut tools = pbimeta::config::ToolNames::default();
    tools.tables = "list_tables".to_string();
    let caller = sales_model().answer("list_tables", json!(["Sales", "Customer"]).to_string());

    let provider = PbixRayProvider::with_tools(&caller, tools);
    let tables = {
        provider
            .load_model(&dir.path().join("Sales.pbix"))
            .await
            .unwrap();
        provider.list_tables().await.unwrap()
    };
    assert_eq!(tables.len(), 2);
    assert!(caller.calls().iter().any(|(name, _)| name == "list_tables"));
}
