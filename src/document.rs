//! Extractor output model: the Document AI JSON shape this crate consumes.
//!
//! Only the parts the mapping pipeline reads are modelled. The wire format
//! encodes int64 values as strings and omits zero values, so numeric fields
//! use lenient deserialisers and every struct defaults missing members.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize};

/// One extraction result, as produced by the external extractor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExtractedDocument {
    /// Full document text; layout text anchors index into it.
    pub text: String,
    pub entities: Vec<Entity>,
    pub pages: Vec<Page>,
    /// Identifier of a pending human-review operation, when one was started.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<String>,
}

impl ExtractedDocument {
    /// Parse a document from JSON.
    ///
    /// Accepts either the bare document or a processor response wrapping it
    /// as `{"document": {...}}`.
    pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Envelope {
            Wrapped {
                document: ExtractedDocument,
                #[serde(default, rename = "humanReviewStatus")]
                review: Option<HumanReviewStatus>,
            },
            Bare(ExtractedDocument),
        }

        Ok(match serde_json::from_slice::<Envelope>(bytes)? {
            Envelope::Wrapped {
                mut document,
                review,
            } => {
                if document.operation_id.is_none() {
                    document.operation_id = review.and_then(|r| r.operation_id());
                }
                document
            }
            Envelope::Bare(document) => document,
        })
    }

    /// True when there is nothing to map: no entities, no pages, no text.
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.pages.is_empty() && self.text.trim().is_empty()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct HumanReviewStatus {
    human_review_operation: String,
}

impl HumanReviewStatus {
    /// The trailing segment of the operation resource name.
    fn operation_id(&self) -> Option<String> {
        self.human_review_operation
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }
}

/// A typed entity found by the extractor. Entities nest through `properties`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Entity {
    #[serde(rename = "type")]
    pub entity_type: String,
    pub mention_text: Option<String>,
    pub normalized_value: Option<NormalizedValue>,
    pub confidence: f32,
    pub page_anchor: PageAnchor,
    pub properties: Vec<Entity>,
    pub id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PageAnchor {
    pub page_refs: Vec<PageRef>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PageRef {
    /// 0-based page index.
    #[serde(deserialize_with = "lenient_i64")]
    pub page: i64,
}

/// The extractor's normalised reading of an entity.
///
/// At most one typed variant is normally populated next to `text`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NormalizedValue {
    pub text: Option<String>,
    pub boolean_value: Option<bool>,
    #[serde(deserialize_with = "lenient_opt_i64")]
    pub integer_value: Option<i64>,
    pub float_value: Option<f64>,
    pub money_value: Option<Money>,
    pub date_value: Option<DateParts>,
    pub datetime_value: Option<DateTimeParts>,
}

impl NormalizedValue {
    pub fn as_bool(&self) -> Option<bool> {
        self.boolean_value
    }

    /// Numeric reading: float, then integer, then money.
    pub fn as_float(&self) -> Option<f64> {
        self.float_value
            .or(self.integer_value.map(|i| i as f64))
            .or_else(|| self.money_value.as_ref().map(Money::as_f64))
    }

    /// Integer reading, truncating floats and money amounts.
    pub fn as_integer(&self) -> Option<i64> {
        self.integer_value
            .or(self.float_value.filter(|f| f.is_finite()).map(|f| f.trunc() as i64))
            .or_else(|| self.money_value.as_ref().map(|m| m.units))
    }

    /// Datetime reading; a date-only value becomes midnight.
    pub fn as_datetime(&self) -> Option<NaiveDateTime> {
        self.datetime_value
            .as_ref()
            .and_then(DateTimeParts::to_naive)
            .or_else(|| {
                self.date_value
                    .as_ref()
                    .and_then(DateParts::to_naive)
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
            })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Money {
    pub currency_code: String,
    #[serde(deserialize_with = "lenient_i64")]
    pub units: i64,
    pub nanos: i32,
}

impl Money {
    pub fn as_f64(&self) -> f64 {
        self.units as f64 + f64::from(self.nanos) / 1e9
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DateParts {
    pub year: i32,
    pub month: u32,
    pub day: u32,
}

impl DateParts {
    pub fn to_naive(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, self.day)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DateTimeParts {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hours: u32,
    pub minutes: u32,
    pub seconds: u32,
    pub nanos: u32,
}

impl DateTimeParts {
    pub fn to_naive(&self) -> Option<NaiveDateTime> {
        NaiveDate::from_ymd_opt(self.year, self.month, self.day)?.and_hms_nano_opt(
            self.hours,
            self.minutes,
            self.seconds,
            self.nanos,
        )
    }
}

/// One page of the document; only form fields are read from it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Page {
    /// 1-based page number.
    #[serde(deserialize_with = "lenient_i64")]
    pub page_number: i64,
    pub form_fields: Vec<FormField>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FormField {
    pub field_name: Layout,
    pub field_value: Layout,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Layout {
    pub text_anchor: TextAnchor,
    pub confidence: f32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TextAnchor {
    pub text_segments: Vec<TextSegment>,
}

/// Half-open character range into [`ExtractedDocument::text`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TextSegment {
    #[serde(deserialize_with = "lenient_i64")]
    pub start_index: i64,
    #[serde(deserialize_with = "lenient_i64")]
    pub end_index: i64,
}

impl TextAnchor {
    /// Resolve the anchor against the document text.
    ///
    /// Each segment is trimmed, newlines become spaces, and the segments are
    /// concatenated.
    pub fn resolve(&self, text: &str) -> String {
        let chars: Vec<char> = text.chars().collect();
        self.resolve_chars(&chars)
    }

    /// Like [`TextAnchor::resolve`], over text already split into chars.
    ///
    /// Callers resolving many anchors against one document collect the chars
    /// once. Out-of-range indices are clamped to the text length.
    pub fn resolve_chars(&self, chars: &[char]) -> String {
        let mut out = String::new();
        for seg in &self.text_segments {
            let start = (seg.start_index.max(0) as usize).min(chars.len());
            let end = (seg.end_index.max(0) as usize).min(chars.len());
            if end <= start {
                continue;
            }
            let piece: String = chars[start..end].iter().collect();
            out.push_str(&piece.trim().replace('\n', " "));
        }
        out.trim().to_string()
    }
}

// ── Lenient numeric deserialisers ────────────────────────────────────────

#[derive(Deserialize)]
#[serde(untagged)]
enum IntOrString {
    Int(i64),
    Text(String),
}

fn parse_int_or_string<E: serde::de::Error>(raw: IntOrString) -> Result<i64, E> {
    match raw {
        IntOrString::Int(n) => Ok(n),
        IntOrString::Text(s) => s.trim().parse().map_err(E::custom),
    }
}

pub(crate) fn lenient_i64<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
    parse_int_or_string(IntOrString::deserialize(d)?)
}

pub(crate) fn lenient_opt_i64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
    match Option::<IntOrString>::deserialize(d)? {
        Some(raw) => parse_int_or_string(raw).map(Some),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_string_encoded_integers() {
        let json = br#"{
            "entities": [{
                "type": "total_amount",
                "mentionText": "$1,234",
                "confidence": 0.93,
                "pageAnchor": {"pageRefs": [{"page": "2"}]},
                "normalizedValue": {"moneyValue": {"currencyCode": "USD", "units": "1234", "nanos": 500000000}}
            }]
        }"#;
        let doc = ExtractedDocument::from_json(json).unwrap();
        let e = &doc.entities[0];
        assert_eq!(e.entity_type, "total_amount");
        assert_eq!(e.page_anchor.page_refs[0].page, 2);
        let nv = e.normalized_value.as_ref().unwrap();
        assert_eq!(nv.as_float(), Some(1234.5));
        assert_eq!(nv.as_integer(), Some(1234));
    }

    #[test]
    fn omitted_page_means_first_page() {
        let json = br#"{"entities": [{"type": "a", "pageAnchor": {"pageRefs": [{}]}}]}"#;
        let doc = ExtractedDocument::from_json(json).unwrap();
        assert_eq!(doc.entities[0].page_anchor.page_refs[0].page, 0);
    }

    #[test]
    fn unwraps_processor_response() {
        let json = br#"{
            "document": {"text": "hello"},
            "humanReviewStatus": {"humanReviewOperation": "projects/p/locations/us/operations/42"}
        }"#;
        let doc = ExtractedDocument::from_json(json).unwrap();
        assert_eq!(doc.text, "hello");
        assert_eq!(doc.operation_id.as_deref(), Some("42"));
    }

    #[test]
    fn empty_document_detected() {
        let doc = ExtractedDocument::from_json(b"{}").unwrap();
        assert!(doc.is_empty());
    }

    #[test]
    fn date_only_value_reads_as_midnight() {
        let nv = NormalizedValue {
            date_value: Some(DateParts {
                year: 2024,
                month: 3,
                day: 9,
            }),
            ..Default::default()
        };
        let dt = nv.as_datetime().unwrap();
        assert_eq!(dt.to_string(), "2024-03-09 00:00:00");
    }

    #[test]
    fn text_anchor_joins_segments() {
        let text = "Invoice\nNumber: INV-7\n";
        let anchor = TextAnchor {
            text_segments: vec![
                TextSegment {
                    start_index: 0,
                    end_index: 7,
                },
                TextSegment {
                    start_index: 7,
                    end_index: 15,
                },
            ],
        };
        assert_eq!(anchor.resolve(text), "InvoiceNumber:");
    }

    #[test]
    fn resolve_chars_clamps_out_of_range_segments() {
        let chars: Vec<char> = "Total: €12".chars().collect();
        let anchor = TextAnchor {
            text_segments: vec![
                TextSegment {
                    start_index: 7,
                    end_index: 40,
                },
                TextSegment {
                    start_index: 50,
                    end_index: 60,
                },
            ],
        };
        assert_eq!(anchor.resolve_chars(&chars), "€12");
        assert_eq!(anchor.resolve("Total: €12"), "€12");
    }
}
