//! Pipeline stages for document-to-row ingestion.
//!
//! Each submodule implements one transformation step and is tested on its own.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ parse ──▶ metadata ──▶ map (cast) ──▶ insert
//! (path/URL) (tree)   (columns)    (row)          (store)
//! ```
//!
//! 1. [`input`]: read the extracted-document JSON from a path or URL
//! 2. [`parse`]: build the [`crate::tree::DocumentTree`] from entities or form fields
//! 3. [`metadata`]: resolve operational metadata into column/value pairs
//! 4. [`map`]: shape the tree into a row for the table schema, casting
//!    each value through [`cast`]
//! 5. [`insert`]: full insert, degraded retries, fallback; the only stage
//!    that talks to the store

pub mod cast;
pub mod input;
pub mod insert;
pub mod map;
pub mod metadata;
pub mod parse;
