//! XML formatter.

use ef_error::{ExportError, Result};
use ef_traits::Formatter;
use ef_types::{value_to_text, OptionKind, OptionSpec, Record};
use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Deserialize)]
struct XmlOptions {
    root_element: String,
    item_element: String,
    fields: Option<Vec<String>>,
}

/// Writes each record as an `<item_element>` under a single root element.
///
/// Objects become nested elements and list entries are written as repeated
/// `<value>` elements. With `fields` set, only those fields are written, in
/// that order.
#[derive(Debug, Clone)]
pub struct XmlFormatter {
    root_element: String,
    item_element: String,
    fields: Option<Vec<String>>,
}

impl XmlFormatter {
    pub const OPTIONS: &'static [OptionSpec] = &[
        OptionSpec::required("root_element", OptionKind::String).with_default("\"root\""),
        OptionSpec::required("item_element", OptionKind::String).with_default("\"item\""),
        OptionSpec::optional("fields", OptionKind::List),
    ];

    pub fn from_options(options: &Map<String, Value>) -> Result<Self> {
        let opts: XmlOptions = ef_types::parse_options("formatters.xml", Self::OPTIONS, options)?;
        for name in [&opts.root_element, &opts.item_element] {
            if !is_valid_element_name(name) {
                return Err(ExportError::config(format!("invalid XML element name '{name}'")));
            }
        }
        Ok(Self {
            root_element: opts.root_element,
            item_element: opts.item_element,
            fields: opts.fields,
        })
    }
}

impl Formatter for XmlFormatter {
    fn format(&self, record: &Record) -> Result<Vec<u8>> {
        let mut out = String::new();
        out.push('<');
        out.push_str(&self.item_element);
        out.push('>');
        match &self.fields {
            Some(fields) => {
                for field in fields {
                    if let Some(value) = record.get(field) {
                        write_element(&mut out, field, value)?;
                    }
                }
            }
            None => {
                for (field, value) in record.fields() {
                    write_element(&mut out, field, value)?;
                }
            }
        }
        out.push_str("</");
        out.push_str(&self.item_element);
        out.push('>');
        Ok(out.into_bytes())
    }

    fn format_header(&self) -> Vec<u8> {
        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<{}>\n",
            self.root_element
        )
        .into_bytes()
    }

    fn format_footer(&self) -> Vec<u8> {
        format!("\n</{}>\n", self.root_element).into_bytes()
    }

    fn file_extension(&self) -> &str {
        "xml"
    }

    fn name(&self) -> &str {
        "xml"
    }
}

fn write_element(out: &mut String, name: &str, value: &Value) -> Result<()> {
    if !is_valid_element_name(name) {
        return Err(ExportError::Format(format!(
            "field '{name}' is not a valid XML element name"
        )));
    }
    out.push('<');
    out.push_str(name);
    out.push('>');
    match value {
        Value::Object(map) => {
            for (k, v) in map {
                write_element(out, k, v)?;
            }
        }
        Value::Array(items) => {
            for item in items {
                write_element(out, "value", item)?;
            }
        }
        scalar => out.push_str(&escape(&value_to_text(scalar))),
    }
    out.push_str("</");
    out.push_str(name);
    out.push('>');
    Ok(())
}

fn is_valid_element_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    !name.to_lowercase().starts_with("xml")
        && chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            other => escaped.push(other),
        }
    }
    escaped
}
