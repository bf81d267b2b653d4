//! Record formatters for exportflow.
//!
//! - [`JsonLinesFormatter`] - One JSON document per line (`jl`), the default
//! - [`JsonArrayFormatter`] - One JSON array per file (`json`)
//! - [`CsvFormatter`] - Fixed column order with optional title row (`csv`)
//! - [`XmlFormatter`] - Configurable root and item elements (`xml`)

mod delimited;
mod json;
mod xml;

pub use delimited::CsvFormatter;
pub use json::{JsonArrayFormatter, JsonLinesFormatter};
pub use xml::XmlFormatter;
