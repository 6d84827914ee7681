//! Schema-directed mapping of a [`DocumentTree`] onto one table row.
//!
//! [`map_row`] is the recursive core: a pure function of a row of fields and
//! a list of schema columns, returning the mapped values and the diagnostics
//! raised on the way. [`DocumentMapper`] owns one document's mapping result
//! and renders the rows the insert coordinator sends to the store.

use crate::config::{IngestConfig, ParsingMethodology};
use crate::error::{Diagnostic, DiagnosticKind};
use crate::pipeline::cast::cast_field;
use crate::pipeline::metadata::MetadataMapper;
use crate::schema::{find_column, ColumnType, SchemaColumn};
use crate::store::{InsertError, TableRow};
use crate::tree::{DocumentTree, Field, FieldValue, Row};
use serde_json::Value;
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// Column holding the serialised tree.
pub const RAW_ENTITIES_COLUMN: &str = "raw_entities";
/// Boolean column set when any diagnostic was recorded.
pub const HAS_ERRORS_COLUMN: &str = "has_errors";
/// Column holding the diagnostic records.
pub const ERRORS_COLUMN: &str = "errors";

/// Map one row of fields against a list of columns.
pub fn map_row(
    row: &Row,
    columns: &[SchemaColumn],
    methodology: ParsingMethodology,
) -> (TableRow, Vec<Diagnostic>) {
    let mut out = TableRow::new();
    let mut diagnostics = Vec::new();

    for column in columns {
        let Some(field) = row.find(&column.name) else {
            if column.is_repeated() {
                warn!("field '{}' not found in document; column skipped", column.name);
            }
            continue;
        };

        if column.is_repeated() {
            if column.fields.is_empty() {
                warn!("repeated column '{}' has no child columns", column.name);
                continue;
            }
            let mut items = Vec::with_capacity(field.children.len());
            for child in &field.children {
                let (mapped, child_diags) = map_row(child, &column.fields, methodology);
                diagnostics.extend(child_diags);
                if !mapped.is_empty() {
                    items.push(Value::Object(mapped));
                }
            }
            out.insert(column.name.clone(), Value::Array(items));
            continue;
        }

        if column.column_type == ColumnType::Record && field.is_group() {
            let (mapped, child_diags) = map_row(&field.children[0], &column.fields, methodology);
            diagnostics.extend(child_diags);
            if !mapped.is_empty() {
                out.insert(column.name.clone(), Value::Object(mapped));
            }
            continue;
        }

        if field.value.is_none() {
            continue;
        }
        match cast_field(field, &column.column_type, methodology) {
            Ok(Some(value)) => {
                out.insert(column.name.clone(), value);
            }
            Ok(None) => {}
            Err(e) => diagnostics.push(conversion_failure(field, &column.column_type, e.to_string())),
        }
    }

    for field in &row.fields {
        if find_column(columns, &field.column_name()).is_none() {
            debug!(
                "field '{}' not found in schema; excluded from the row",
                field.column_name()
            );
        }
    }

    (out, diagnostics)
}

fn conversion_failure(field: &Field, column_type: &ColumnType, detail: String) -> Diagnostic {
    Diagnostic::new(
        DiagnosticKind::ConversionFailure,
        &field.name,
        format!("casting to {column_type}"),
    )
    .with_value(field.value.as_ref().map(FieldValue::to_json))
    .with_message(detail)
}

/// Map resolved metadata pairs as synthetic scalar fields.
///
/// Columns missing from the schema and failed casts are logged and skipped.
pub fn map_metadata(
    metadata: &[(String, Option<FieldValue>)],
    columns: &[SchemaColumn],
    methodology: ParsingMethodology,
) -> TableRow {
    let mut out = TableRow::new();
    for (name, value) in metadata {
        if value.is_none() {
            continue;
        }
        let Some(column) = find_column(columns, name) else {
            warn!("metadata column '{}' not found in schema; skipped", name);
            continue;
        };
        let field = Field::synthetic(name.clone(), value.clone());
        match cast_field(&field, &column.column_type, methodology) {
            Ok(Some(v)) => {
                out.insert(name.clone(), v);
            }
            Ok(None) => {}
            Err(e) => warn!(
                "metadata column '{}' could not be cast to {}: {}",
                name, column.column_type, e
            ),
        }
    }
    out
}

/// One document's mapping result plus the state needed to render rows.
///
/// Diagnostics only grow. Exclusions are reported once per column.
#[derive(Debug)]
pub struct DocumentMapper {
    tree: DocumentTree,
    mapped: TableRow,
    diagnostics: Vec<Diagnostic>,
    mapping_diagnostic_count: usize,
    reported_exclusions: BTreeSet<String>,
    custom_fields: TableRow,
    include_raw_entities: bool,
    include_error_fields: bool,
}

impl DocumentMapper {
    /// Map the tree and metadata against the schema.
    ///
    /// `parse_diagnostics` are the diagnostics raised while building the tree.
    pub fn new(
        tree: DocumentTree,
        parse_diagnostics: Vec<Diagnostic>,
        schema: &[SchemaColumn],
        metadata: &MetadataMapper,
        config: &IngestConfig,
    ) -> Self {
        let methodology = config.parsing_methodology;
        let (mut mapped, row_diags) = map_row(&tree.root, schema, methodology);
        let meta = map_metadata(&metadata.resolve(), schema, methodology);
        mapped.extend(meta);

        let mut diagnostics = parse_diagnostics;
        diagnostics.extend(row_diags);
        let mapping_diagnostic_count = diagnostics.len();

        debug!(
            "mapped {} column(s) with {} diagnostic(s)",
            mapped.len(),
            mapping_diagnostic_count
        );

        Self {
            tree,
            mapped,
            diagnostics,
            mapping_diagnostic_count,
            reported_exclusions: BTreeSet::new(),
            custom_fields: config.custom_fields.clone(),
            include_raw_entities: config.include_raw_entities,
            include_error_fields: config.include_error_fields,
        }
    }

    pub fn tree(&self) -> &DocumentTree {
        &self.tree
    }

    /// Mapped tree and metadata columns, before exclusions and extras.
    pub fn mapped(&self) -> &TableRow {
        &self.mapped
    }

    /// Diagnostics raised before any insert attempt.
    pub fn mapping_diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics[..self.mapping_diagnostic_count]
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics
    }

    /// Render the row with the given columns removed.
    ///
    /// Adds `raw_entities` and the error columns when configured; static
    /// custom fields are applied last and always win.
    pub fn to_output_row(&mut self, exclude: &BTreeSet<String>) -> TableRow {
        let mut row = TableRow::new();
        if self.include_raw_entities {
            row.insert(
                RAW_ENTITIES_COLUMN.to_string(),
                Value::String(self.tree.to_raw_entities()),
            );
        }
        row.extend(self.mapped.clone());

        for column in exclude {
            if let Some(value) = row.remove(column) {
                self.record_exclusion(column, value, "Excluding field due to insert error");
            }
        }

        self.finish_row(row, exclude)
    }

    /// Render the fallback row: no mapped columns, only custom fields and
    /// the diagnostic columns.
    pub fn to_fallback_row(&mut self, exclude: &BTreeSet<String>) -> TableRow {
        let dropped: Vec<(String, Value)> = self
            .mapped
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        for (column, value) in dropped {
            self.record_exclusion(&column, value, "Excluding field for fallback insert");
        }

        let mut row = TableRow::new();
        if self.include_raw_entities && !exclude.contains(RAW_ENTITIES_COLUMN) {
            row.insert(
                RAW_ENTITIES_COLUMN.to_string(),
                Value::String(self.tree.to_raw_entities()),
            );
        }
        self.finish_row(row, exclude)
    }

    fn finish_row(&self, mut row: TableRow, exclude: &BTreeSet<String>) -> TableRow {
        if self.include_error_fields {
            if !exclude.contains(HAS_ERRORS_COLUMN) {
                row.insert(
                    HAS_ERRORS_COLUMN.to_string(),
                    Value::Bool(!self.diagnostics.is_empty()),
                );
            }
            if !exclude.contains(ERRORS_COLUMN) {
                let records = self.diagnostics.iter().map(Diagnostic::to_record).collect();
                row.insert(ERRORS_COLUMN.to_string(), Value::Array(records));
            }
        }
        row.extend(self.custom_fields.clone());
        row
    }

    fn record_exclusion(&mut self, column: &str, value: Value, reason: &str) {
        if self.reported_exclusions.insert(column.to_string()) {
            self.diagnostics.push(
                Diagnostic::new(DiagnosticKind::ExcludedField, column, reason)
                    .with_value(Some(value)),
            );
        }
    }

    /// Record store rejections and return the top-level columns they name.
    pub fn record_rejections(&mut self, errors: &[InsertError]) -> BTreeSet<String> {
        let mut columns = BTreeSet::new();
        for err in errors {
            let column = top_level_column(&err.location);
            if column.is_empty() {
                warn!("insert error without a column location: {}", err.message);
                continue;
            }
            let value = self.mapped.get(column).cloned();
            self.diagnostics.push(
                Diagnostic::new(DiagnosticKind::InsertRejected, column, &err.reason)
                    .with_value(value)
                    .with_message(&err.message),
            );
            columns.insert(column.to_string());
        }
        columns
    }
}

/// Reduce an insert-error location to the top-level column it belongs to.
///
/// `line_item[0].amount` → `line_item`; `total_amount` → `total_amount`.
pub fn top_level_column(location: &str) -> &str {
    let head = location.split('.').next().unwrap_or(location);
    match head.rfind('[') {
        Some(i) => &head[..i],
        None => head,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::metadata::MappingInfo;
    use crate::schema::ColumnMode;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn text(name: &str, value: &str) -> Field {
        Field::new(name, Some(FieldValue::from(value)))
    }

    fn group(name: &str, rows: Vec<Row>) -> Field {
        Field {
            children: rows,
            ..Field::new(name, None)
        }
    }

    fn line_items_schema() -> Vec<SchemaColumn> {
        vec![
            SchemaColumn::scalar("invoice_id", ColumnType::String),
            SchemaColumn::repeated(
                "line_item",
                vec![
                    SchemaColumn::scalar("description", ColumnType::String),
                    SchemaColumn::scalar("amount", ColumnType::Numeric),
                ],
            ),
        ]
    }

    fn quiet_metadata() -> MetadataMapper {
        let overrides: BTreeMap<String, MappingInfo> = crate::pipeline::metadata::KNOWN_METADATA_KEYS
            .iter()
            .map(|k| (k.to_string(), MappingInfo::skipped()))
            .collect();
        MetadataMapper::new(&overrides)
    }

    #[test]
    fn scalar_string_is_trimmed() {
        let row = Row::new(vec![text("vendor", " Acme Corp ")]);
        let schema = vec![SchemaColumn::scalar("vendor", ColumnType::String)];
        let (out, diags) = map_row(&row, &schema, ParsingMethodology::RawMention);
        assert_eq!(out["vendor"], "Acme Corp");
        assert!(diags.is_empty());
    }

    #[test]
    fn normalized_reading_without_mention_is_skipped() {
        let blank_total = Field {
            normalized_value: Some(crate::document::NormalizedValue {
                integer_value: Some(42),
                ..Default::default()
            }),
            ..Field::new("total", None)
        };
        let row = Row::new(vec![blank_total, Field::synthetic("count", Some(FieldValue::Integer(7)))]);
        let schema = vec![
            SchemaColumn::scalar("total", ColumnType::Integer),
            SchemaColumn::scalar("count", ColumnType::Integer),
        ];
        let (out, diags) = map_row(&row, &schema, ParsingMethodology::Normalized);
        assert!(!out.contains_key("total"));
        assert_eq!(out["count"], 7);
        assert!(diags.is_empty());
    }

    #[test]
    fn failed_cast_omits_column_and_records_diagnostic() {
        let row = Row::new(vec![text("total", "abc"), text("count", "$1,234")]);
        let schema = vec![
            SchemaColumn::scalar("total", ColumnType::Integer),
            SchemaColumn::scalar("count", ColumnType::Integer),
        ];
        let (out, diags) = map_row(&row, &schema, ParsingMethodology::RawMention);
        assert!(!out.contains_key("total"));
        assert_eq!(out["count"], 1234);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].kind, DiagnosticKind::ConversionFailure);
        assert_eq!(diags[0].reason, "casting to INTEGER");
        assert_eq!(diags[0].value, Some(json!("abc")));
    }

    #[test]
    fn repeated_rows_keep_order_and_drop_empty_children() {
        let rows = vec![
            Row::new(vec![text("description", "a"), text("amount", "1")]),
            Row::new(vec![text("unrelated", "x")]),
            Row::new(vec![text("description", "b")]),
            Row::new(vec![text("amount", "3.5")]),
        ];
        let tree_row = Row::new(vec![text("invoice_id", "INV-9"), group("line_item", rows)]);
        let (out, diags) = map_row(&tree_row, &line_items_schema(), ParsingMethodology::RawMention);
        assert!(diags.is_empty());
        assert_eq!(
            out["line_item"],
            json!([
                {"description": "a", "amount": 1.0},
                {"description": "b"},
                {"amount": 3.5}
            ])
        );
    }

    #[test]
    fn missing_repeated_field_is_skipped() {
        let row = Row::new(vec![text("invoice_id", "INV-1")]);
        let (out, _) = map_row(&row, &line_items_schema(), ParsingMethodology::RawMention);
        assert!(!out.contains_key("line_item"));
    }

    #[test]
    fn repeated_column_without_children_is_skipped() {
        let schema = vec![SchemaColumn {
            name: "tags".into(),
            column_type: ColumnType::String,
            mode: ColumnMode::Repeated,
            fields: vec![],
        }];
        let row = Row::new(vec![group("tags", vec![Row::new(vec![text("t", "x")])])]);
        let (out, _) = map_row(&row, &schema, ParsingMethodology::RawMention);
        assert!(out.is_empty());
    }

    #[test]
    fn hyphenated_fields_match_underscored_columns() {
        let row = Row::new(vec![text("due-date", "2024-01-31")]);
        let schema = vec![SchemaColumn::scalar("due_date", ColumnType::Datetime)];
        let (out, _) = map_row(&row, &schema, ParsingMethodology::RawMention);
        assert_eq!(out["due_date"], "2024-01-31");
    }

    #[test]
    fn metadata_skips_unknown_columns_and_failed_casts() {
        let schema = vec![
            SchemaColumn::scalar("doc_type", ColumnType::String),
            SchemaColumn::scalar("doc_event_id", ColumnType::Integer),
        ];
        let metadata = vec![
            ("doc_type".to_string(), Some(FieldValue::from("invoice"))),
            ("doc_event_id".to_string(), Some(FieldValue::from("not-a-number"))),
            ("file_name".to_string(), Some(FieldValue::from("a.json"))),
            ("doc_status".to_string(), None),
        ];
        let out = map_metadata(&metadata, &schema, ParsingMethodology::RawMention);
        assert_eq!(out.len(), 1);
        assert_eq!(out["doc_type"], "invoice");
    }

    #[test]
    fn metadata_wins_over_document_fields() {
        let tree = DocumentTree::new(Row::new(vec![text("doc_type", "from-document")]));
        let schema = vec![SchemaColumn::scalar("doc_type", ColumnType::String)];
        let mut overrides: BTreeMap<String, MappingInfo> =
            crate::pipeline::metadata::KNOWN_METADATA_KEYS
                .iter()
                .map(|k| (k.to_string(), MappingInfo::skipped()))
                .collect();
        overrides.insert("doc_type".to_string(), MappingInfo::default().with_value("receipt"));
        let metadata = MetadataMapper::new(&overrides);
        let mapper = DocumentMapper::new(tree, vec![], &schema, &metadata, &IngestConfig::default());
        assert_eq!(mapper.mapped()["doc_type"], "receipt");
    }

    #[test]
    fn output_row_applies_exclusions_once_and_custom_fields_win() {
        let tree = DocumentTree::new(Row::new(vec![
            text("invoice_id", "INV-1"),
            text("vendor", "Acme"),
        ]));
        let schema = vec![
            SchemaColumn::scalar("invoice_id", ColumnType::String),
            SchemaColumn::scalar("vendor", ColumnType::String),
        ];
        let mut custom = TableRow::new();
        custom.insert("vendor".into(), json!("Custom Vendor"));
        custom.insert("source".into(), json!("batch-1"));
        let config = IngestConfig {
            custom_fields: custom,
            include_error_fields: true,
            include_raw_entities: true,
            ..IngestConfig::default()
        };
        let mut mapper = DocumentMapper::new(tree, vec![], &schema, &quiet_metadata(), &config);

        let exclude: BTreeSet<String> = ["invoice_id".to_string()].into();
        let row = mapper.to_output_row(&exclude);
        assert!(!row.contains_key("invoice_id"));
        assert_eq!(row["vendor"], "Custom Vendor");
        assert_eq!(row["source"], "batch-1");
        assert_eq!(row[HAS_ERRORS_COLUMN], true);
        assert_eq!(row[ERRORS_COLUMN][0]["type"], "EXCLUDED_FIELD");
        assert!(row[RAW_ENTITIES_COLUMN].as_str().unwrap().contains("INV-1"));

        mapper.to_output_row(&exclude);
        let excluded = mapper
            .diagnostics()
            .iter()
            .filter(|d| d.kind == DiagnosticKind::ExcludedField)
            .count();
        assert_eq!(excluded, 1);
    }

    #[test]
    fn fallback_row_keeps_only_custom_and_diagnostic_columns() {
        let tree = DocumentTree::new(Row::new(vec![text("invoice_id", "INV-1")]));
        let schema = vec![SchemaColumn::scalar("invoice_id", ColumnType::String)];
        let mut config = IngestConfig::default();
        let mut mapper = DocumentMapper::new(tree.clone(), vec![], &schema, &quiet_metadata(), &config);
        assert!(mapper.to_fallback_row(&BTreeSet::new()).is_empty());

        config.include_error_fields = true;
        let mut mapper = DocumentMapper::new(tree, vec![], &schema, &quiet_metadata(), &config);
        let row = mapper.to_fallback_row(&BTreeSet::new());
        assert_eq!(row.len(), 2);
        assert_eq!(row[ERRORS_COLUMN][0]["field"], "invoice_id");
    }

    #[test]
    fn rejections_name_top_level_columns() {
        let tree = DocumentTree::new(Row::new(vec![text("invoice_id", "INV-1")]));
        let schema = vec![SchemaColumn::scalar("invoice_id", ColumnType::String)];
        let mut mapper = DocumentMapper::new(
            tree,
            vec![],
            &schema,
            &quiet_metadata(),
            &IngestConfig::default(),
        );
        let cols = mapper.record_rejections(&[
            InsertError::new("invoice_id", "invalid", "bad value"),
            InsertError::new("line_item[2].amount", "invalid", "bad amount"),
        ]);
        assert_eq!(
            cols,
            BTreeSet::from(["invoice_id".to_string(), "line_item".to_string()])
        );
        let d = &mapper.diagnostics()[0];
        assert_eq!(d.kind, DiagnosticKind::InsertRejected);
        assert_eq!(d.value, Some(json!("INV-1")));
        assert_eq!(mapper.mapping_diagnostics().len(), 0);
    }

    #[test]
    fn location_truncation() {
        assert_eq!(top_level_column("total_amount"), "total_amount");
        assert_eq!(top_level_column("line_item[0].amount"), "line_item");
        assert_eq!(top_level_column("a[1].b[2].c"), "a");
        assert_eq!(top_level_column("record.child"), "record");
        assert_eq!(top_level_column("tags[3]"), "tags");
    }
}
