//! Build a [`DocumentTree`] from extractor output.
//!
//! Two sources are supported (see [`crate::config::TreeSource`]):
//!
//! * **Entities**: typed entities, nested through `properties`. Entities with
//!   properties become group fields holding one child row per occurrence.
//! * **Form fields**: page-level key/value pairs, always flat.
//!
//! Parsing never fails; problems come back as [`Diagnostic`]s.

use crate::document::{Entity, ExtractedDocument};
use crate::error::{Diagnostic, DiagnosticKind};
use crate::tree::{DocumentTree, Field, FieldValue, Row};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

/// Parse an entity list into a tree.
pub fn parse_entities(entities: &[Entity]) -> (DocumentTree, Vec<Diagnostic>) {
    let mut diagnostics = Vec::new();
    let root = parse_level(entities, &mut diagnostics);
    (DocumentTree::new(root), diagnostics)
}

fn parse_level(entities: &[Entity], diagnostics: &mut Vec<Diagnostic>) -> Row {
    let mut row = Row::default();
    for entity in entities {
        let [page_ref] = entity.page_anchor.page_refs.as_slice() else {
            debug!(
                "skipping entity '{}' with {} page references",
                entity.entity_type,
                entity.page_anchor.page_refs.len()
            );
            continue;
        };
        let value = entity
            .mention_text
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .map(FieldValue::from);

        if entity.properties.is_empty() {
            if row.contains(&entity.entity_type) {
                diagnostics.push(
                    Diagnostic::new(
                        DiagnosticKind::DuplicateField,
                        &entity.entity_type,
                        "Duplicate field definition",
                    )
                    .with_value(value.as_ref().map(FieldValue::to_json))
                    .with_entity_id(entity.id.clone()),
                );
                continue;
            }
            row.fields.push(entity_field(entity, value, page_ref.page));
            continue;
        }

        let child = parse_level(&entity.properties, diagnostics);
        match row.find_mut(&entity.entity_type) {
            Some(group) => group.children.push(child),
            None => {
                let mut group = entity_field(entity, value, page_ref.page);
                group.children.push(child);
                row.fields.push(group);
            }
        }
    }
    row
}

fn entity_field(entity: &Entity, value: Option<FieldValue>, page: i64) -> Field {
    Field {
        name: entity.entity_type.clone(),
        value,
        normalized_value: entity.normalized_value.clone(),
        confidence: entity.confidence,
        page_number: i32::try_from(page + 1).unwrap_or(i32::MAX),
        children: Vec::new(),
    }
}

// ── Form fields ──────────────────────────────────────────────────────────

static RE_CAMEL_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"(.)([A-Z][a-z]+)").unwrap());
static RE_CAMEL_TAIL: Lazy<Regex> = Lazy::new(|| Regex::new(r"([a-z0-9])([A-Z])").unwrap());

/// Parse page form fields into a flat tree.
///
/// A name seen twice keeps its first field; the later one becomes a
/// [`DiagnosticKind::DuplicateField`].
pub fn parse_form_fields(document: &ExtractedDocument) -> (DocumentTree, Vec<Diagnostic>) {
    let chars: Vec<char> = document.text.chars().collect();
    let mut row = Row::default();
    let mut diagnostics = Vec::new();
    for page in &document.pages {
        for form_field in &page.form_fields {
            let name = to_snake_case(&form_field.field_name.text_anchor.resolve_chars(&chars));
            if name.is_empty() {
                debug!("skipping form field without a name on page {}", page.page_number);
                continue;
            }
            let text = form_field.field_value.text_anchor.resolve_chars(&chars);
            let value = (!text.is_empty()).then_some(FieldValue::Text(text));
            if row.contains(&name) {
                diagnostics.push(
                    Diagnostic::new(DiagnosticKind::DuplicateField, &name, "Duplicate field definition")
                        .with_value(value.as_ref().map(FieldValue::to_json)),
                );
                continue;
            }
            let confidence = (form_field.field_value.confidence * 10_000.0).round() / 10_000.0;
            row.fields.push(Field {
                name,
                value,
                normalized_value: None,
                confidence,
                page_number: i32::try_from(page.page_number).unwrap_or(i32::MAX),
                children: Vec::new(),
            });
        }
    }
    (DocumentTree::new(row), diagnostics)
}

/// `"@Invoice Number:"` → `"invoice_number"`, `"dueDate"` → `"due_date"`.
pub fn to_snake_case(name: &str) -> String {
    let stripped = name
        .trim_matches(|c| matches!(c, '@' | '#' | '$' | ':'))
        .replace(' ', "");
    let split = RE_CAMEL_WORD.replace_all(&stripped, "${1}_${2}");
    RE_CAMEL_TAIL
        .replace_all(&split, "${1}_${2}")
        .to_lowercase()
}
