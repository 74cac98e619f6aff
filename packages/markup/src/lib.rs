//! # Revisor Markup
//!
//! Typed document tree for Revisor documents plus the markup format used to
//! store them.
//!
//! ```text
//! markup text ──tokenize──▶ tokens ──parse──▶ Document ──serialize──▶ markup text
//!                                                 │
//!                                                 └──flatten──▶ FlatText (plain text + offset map)
//! ```
//!
//! The tree is the source of truth. Editing code mutates `Document` values
//! and only serializes at the boundary; nothing rewrites the markup text
//! directly.

pub mod ast;
pub mod error;
pub mod flatten;
pub mod id_generator;
pub mod normalize;
pub mod parser;
pub mod serializer;
pub mod style;
pub mod tokenizer;

#[cfg(test)]
mod tests_serializer;

pub use error::{ParseError, ParseResult};
pub use flatten::{flatten, flatten_blocks, FlatText, Segment, TextLocation};
pub use id_generator::{get_document_id, IDGenerator};
pub use normalize::{normalize_document, normalize_inlines};
pub use parser::{parse, parse_with_generator, parse_with_name, Parser};
pub use serializer::{serialize, Serializer};
pub use style::{ResolvedStyle, Style, StyleSheet};
pub use tokenizer::{tokenize, Token};
