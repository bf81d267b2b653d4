//! Destination path templates.
//!
//! A filebase such as `exports/%Y/%m/{groups[0]}/part_` is rendered per
//! group: strftime tokens are expanded first, then `{date}` (`%Y-%m-%d`) and
//! `{groups[i]}`. The rendered value is split into a directory and a file
//! prefix; writers append their own suffix and the file extension.

use chrono::{DateTime, Utc};
use ef_error::{ExportError, Result};
use regex::Regex;
use std::collections::HashMap;
use std::fmt::Write;
use std::sync::LazyLock;

static GROUP_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{groups\[(\d+)\]\}").expect("valid group token regex"));

/// A rendered filebase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedFilebase {
    /// Directory part, without trailing separator (may be empty)
    pub dir: String,
    /// File name prefix (may be empty)
    pub prefix: String,
}

impl RenderedFilebase {
    /// Joins the directory, prefix and `name`.
    pub fn file(&self, name: &str) -> String {
        if self.dir.is_empty() {
            format!("{}{name}", self.prefix)
        } else {
            format!("{}/{}{name}", self.dir, self.prefix)
        }
    }

    /// The whole rendered value treated as a directory.
    pub fn as_dir(&self) -> String {
        match (self.dir.is_empty(), self.prefix.is_empty()) {
            (true, _) => self.prefix.clone(),
            (false, true) => self.dir.clone(),
            (false, false) => format!("{}/{}", self.dir, self.prefix),
        }
    }
}

/// A filebase template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filebase {
    template: String,
}

impl Filebase {
    pub fn new(template: impl Into<String>) -> Result<Self> {
        let template = template.into();
        if template.trim().is_empty() {
            return Err(ExportError::config("filebase must not be empty"));
        }
        Ok(Self { template })
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    /// Renders the template for `groups` at the current time.
    pub fn render(&self, groups: &[String]) -> Result<RenderedFilebase> {
        self.render_at(groups, Utc::now())
    }

    pub fn render_at(&self, groups: &[String], now: DateTime<Utc>) -> Result<RenderedFilebase> {
        let mut dated = String::new();
        write!(dated, "{}", now.format(&self.template)).map_err(|_| {
            ExportError::config(format!("invalid date format in filebase '{}'", self.template))
        })?;
        let dated = dated.replace("{date}", &now.format("%Y-%m-%d").to_string());

        let mut missing = None;
        let rendered = GROUP_TOKEN.replace_all(&dated, |caps: &regex::Captures<'_>| {
            let index: usize = caps[1].parse().unwrap_or(usize::MAX);
            match groups.get(index) {
                Some(group) => group.clone(),
                None => {
                    missing.get_or_insert(index);
                    String::new()
                }
            }
        });
        if let Some(index) = missing {
            return Err(ExportError::writer(format!(
                "filebase '{}' references groups[{index}] but the record has {} group keys",
                self.template,
                groups.len()
            )));
        }

        Ok(match rendered.rsplit_once('/') {
            Some((dir, prefix)) => RenderedFilebase {
                dir: dir.to_string(),
                prefix: prefix.to_string(),
            },
            None => RenderedFilebase {
                dir: String::new(),
                prefix: rendered.into_owned(),
            },
        })
    }
}

/// Monotonic per-prefix file counters.
#[derive(Debug, Default)]
pub struct FileCounters {
    next: HashMap<String, u64>,
}

impl FileCounters {
    /// Returns the next number for `prefix`, skipping numbers `taken` reports
    /// as already used.
    pub fn next(&mut self, prefix: &str, mut taken: impl FnMut(u64) -> bool) -> u64 {
        let counter = self.next.entry(prefix.to_string()).or_insert(0);
        while taken(*counter) {
            *counter += 1;
        }
        let number = *counter;
        *counter += 1;
        number
    }
}
