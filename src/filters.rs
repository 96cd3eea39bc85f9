//! String redaction filters applied to event summaries.
//!
//! Filters are an ordered list of `{regexp, replacement}` pairs stored as JSON:
//!
//! ```json
//! [
//!     {"regexp": "[\\(\\[<].*?[\\)\\]>]", "replacement": ""},
//!     {"regexp": "CONCACAF Gold Cup,", "replacement": ""}
//! ]
//! ```
//!
//! Replacement strings use the `regex` crate syntax (`$1`, `${name}`). A filter
//! with a `null` replacement blanks the whole text when the pattern matches at
//! its start.

use std::path::Path;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{persist_atomically, Error};

/// Filter installed when no filter file exists: strips bracketed asides
/// such as `(optional)`, `[external]` or `<tentative>`.
pub const DEFAULT_FILTER: &str = r"[\(\[<].*?[\)\]>]";

/// Serialized form of a filter.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct FilterRecord {
    regexp: String,
    #[serde(default)]
    replacement: Option<String>,
}

/// A single compiled substitution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "FilterRecord", into = "FilterRecord")]
pub struct StringFilter {
    regexp: String,
    replacement: Option<String>,
    compiled: Regex,
}

impl StringFilter {
    /// Compile a substitution filter.
    ///
    /// # Example
    ///
    /// ```
    /// use inkdash::StringFilter;
    ///
    /// let filter = StringFilter::new("world", "universe").unwrap();
    /// assert_eq!(filter.apply("Hello world!"), "Hello universe!");
    /// ```
    pub fn new(regexp: impl Into<String>, replacement: impl Into<String>) -> Result<Self, Error> {
        Self::build(regexp.into(), Some(replacement.into()))
    }

    /// Compile a filter that blanks any text starting with a match.
    pub fn blanking(regexp: impl Into<String>) -> Result<Self, Error> {
        Self::build(regexp.into(), None)
    }

    fn build(regexp: String, replacement: Option<String>) -> Result<Self, Error> {
        let compiled = Regex::new(&regexp)?;
        Ok(Self {
            regexp,
            replacement,
            compiled,
        })
    }

    /// Pattern source.
    pub fn regexp(&self) -> &str {
        &self.regexp
    }

    /// Replacement text, `None` for blanking filters.
    pub fn replacement(&self) -> Option<&str> {
        self.replacement.as_deref()
    }

    /// Apply this filter to `text`.
    pub fn apply(&self, text: &str) -> String {
        match &self.replacement {
            Some(replacement) => self
                .compiled
                .replace_all(text, replacement.as_str())
                .into_owned(),
            None => match self.compiled.find(text) {
                Some(m) if m.start() == 0 => String::new(),
                _ => text.to_string(),
            },
        }
    }
}

impl PartialEq for StringFilter {
    fn eq(&self, other: &Self) -> bool {
        self.regexp == other.regexp && self.replacement == other.replacement
    }
}

impl Eq for StringFilter {}

impl TryFrom<FilterRecord> for StringFilter {
    type Error = Error;

    fn try_from(record: FilterRecord) -> Result<Self, Self::Error> {
        Self::build(record.regexp, record.replacement)
    }
}

impl From<StringFilter> for FilterRecord {
    fn from(filter: StringFilter) -> Self {
        Self {
            regexp: filter.regexp,
            replacement: filter.replacement,
        }
    }
}

/// Ordered list of filters applied in sequence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterPipeline {
    filters: Vec<StringFilter>,
}

impl FilterPipeline {
    /// Create an empty pipeline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pipeline holding only [`DEFAULT_FILTER`].
    pub fn with_default() -> Self {
        let mut pipeline = Self::new();
        if let Ok(filter) = StringFilter::new(DEFAULT_FILTER, "") {
            pipeline.add(filter);
        }
        pipeline
    }

    /// Filters in application order.
    pub fn filters(&self) -> &[StringFilter] {
        &self.filters
    }

    /// Number of filters.
    pub fn len(&self) -> usize {
        self.filters.len()
    }

    /// Whether the pipeline has no filters.
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Append a filter. Returns `false` if an identical filter is already present.
    pub fn add(&mut self, filter: StringFilter) -> bool {
        if self.filters.contains(&filter) {
            return false;
        }
        self.filters.push(filter);
        true
    }

    /// Remove a filter.
    pub fn remove(&mut self, filter: &StringFilter) -> Result<(), Error> {
        let idx = self.position(filter)?;
        self.filters.remove(idx);
        Ok(())
    }

    /// Remove the filter at `index`.
    pub fn remove_at(&mut self, index: usize) -> Result<StringFilter, Error> {
        if index >= self.filters.len() {
            return Err(Error::invalid(
                "filter",
                format!("index {} out of range ({} filters)", index, self.filters.len()),
            ));
        }
        Ok(self.filters.remove(index))
    }

    /// Replace the filter at `index`, returning the one it displaced.
    pub fn replace_at(&mut self, index: usize, new: StringFilter) -> Result<StringFilter, Error> {
        match self.filters.get_mut(index) {
            Some(slot) => Ok(std::mem::replace(slot, new)),
            None => Err(Error::invalid(
                "filter",
                format!("index {} out of range ({} filters)", index, self.filters.len()),
            )),
        }
    }

    /// Replace `old` with `new` in place.
    pub fn replace(&mut self, old: &StringFilter, new: StringFilter) -> Result<(), Error> {
        let idx = self.position(old)?;
        self.filters[idx] = new;
        Ok(())
    }

    fn position(&self, filter: &StringFilter) -> Result<usize, Error> {
        self.filters
            .iter()
            .position(|f| f == filter)
            .ok_or_else(|| Error::invalid("filter", format!("not found: {}", filter.regexp)))
    }

    /// Run `text` through every filter, then collapse runs of whitespace.
    ///
    /// # Example
    ///
    /// ```
    /// use inkdash::{FilterPipeline, StringFilter};
    ///
    /// let mut filters = FilterPipeline::new();
    /// filters.add(StringFilter::new("CONCACAF Gold Cup,", "").unwrap());
    /// filters.add(StringFilter::new(r"202\d", "").unwrap());
    ///
    /// let text = filters.apply("2023 CONCACAF Gold Cup, Group A: U.S. Men vs. Saint Kitts");
    /// assert_eq!(text, "Group A: U.S. Men vs. Saint Kitts");
    /// ```
    pub fn apply(&self, text: &str) -> String {
        let filtered = self
            .filters
            .iter()
            .fold(text.to_string(), |acc, f| f.apply(&acc));
        filtered.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    /// Load filters from a JSON file. Fails if any entry is invalid.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let mut pipeline = Self::new();
        for record in read_records(path.as_ref())? {
            pipeline.add(StringFilter::try_from(record)?);
        }
        Ok(pipeline)
    }

    /// Load filters, skipping entries that do not compile.
    ///
    /// The default filter is seeded and saved only when the file is missing
    /// or holds an empty list. An unreadable file or one whose entries are
    /// all invalid yields the default filter in memory and is left untouched.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        if path.exists() {
            let records = match read_records(path) {
                Ok(records) => records,
                Err(e) => {
                    tracing::warn!("Ignoring string filter file: {}", e);
                    return Self::with_default();
                }
            };
            if !records.is_empty() {
                let total = records.len();
                let mut pipeline = Self::new();
                for record in records {
                    match StringFilter::try_from(record) {
                        Ok(filter) => {
                            pipeline.add(filter);
                        }
                        Err(e) => tracing::warn!("Skipping string filter: {}", e),
                    }
                }
                tracing::debug!(
                    "Loaded {} of {} string filters from {}",
                    pipeline.len(),
                    total,
                    path.display()
                );
                if pipeline.is_empty() {
                    return Self::with_default();
                }
                return pipeline;
            }
            tracing::debug!("No string filters in {}", path.display());
        }

        let pipeline = Self::with_default();
        if let Err(e) = pipeline.save(path) {
            tracing::warn!("Failed to save default string filters: {}", e);
        } else {
            tracing::debug!("Saved default string filters to {}", path.display());
        }
        pipeline
    }

    /// Save filters as pretty-printed JSON.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), Error> {
        let json = serde_json::to_vec_pretty(&self.filters)?;
        persist_atomically(path.as_ref(), &json)
    }
}

fn read_records(path: &Path) -> Result<Vec<FilterRecord>, Error> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!(
            "Failed to read filter file '{}': {}",
            path.display(),
            e
        ))
    })?;
    Ok(serde_json::from_str(&content)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_strips_brackets() {
        let filters = FilterPipeline::with_default();
        assert_eq!(filters.apply("Standup (optional) [Zoom]"), "Standup");
        assert_eq!(filters.apply("<tentative> Design review"), "Design review");
    }

    #[test]
    fn test_filters_apply_in_order() {
        let mut filters = FilterPipeline::new();
        filters.add(StringFilter::new("cat", "dog").unwrap());
        filters.add(StringFilter::new("dog", "bird").unwrap());
        assert_eq!(filters.apply("cat"), "bird");
    }

    #[test]
    fn test_blanking_filter() {
        let filter = StringFilter::blanking("Canceled:").unwrap();
        assert_eq!(filter.apply("Canceled: Standup"), "");
        assert_eq!(filter.apply("Standup Canceled:"), "Standup Canceled:");
    }

    #[test]
    fn test_duplicates_ignored() {
        let mut filters = FilterPipeline::new();
        assert!(filters.add(StringFilter::new("a", "b").unwrap()));
        assert!(!filters.add(StringFilter::new("a", "b").unwrap()));
        assert_eq!(filters.len(), 1);
    }

    #[test]
    fn test_remove_and_replace() {
        let a = StringFilter::new("a", "").unwrap();
        let b = StringFilter::new("b", "").unwrap();
        let c = StringFilter::new("c", "").unwrap();

        let mut filters = FilterPipeline::new();
        filters.add(a.clone());
        filters.add(b.clone());

        filters.replace(&a, c.clone()).unwrap();
        assert_eq!(filters.filters(), &[c.clone(), b.clone()]);

        assert_eq!(filters.replace_at(1, a.clone()).unwrap(), b);
        assert!(filters.replace_at(2, b.clone()).is_err());
        assert_eq!(filters.filters(), &[c.clone(), a.clone()]);

        filters.remove(&a).unwrap();
        assert!(filters.remove(&a).is_err());
        assert_eq!(filters.remove_at(0).unwrap(), c);
        assert!(filters.remove_at(0).is_err());
    }

    #[test]
    fn test_invalid_regex_rejected() {
        assert!(StringFilter::new("(unclosed", "").is_err());
        let json = r#"[{"regexp": "(unclosed", "replacement": ""}]"#;
        assert!(serde_json::from_str::<Vec<StringFilter>>(json).is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("string-filters.json");

        let mut filters = FilterPipeline::with_default();
        filters.add(StringFilter::new(r"202\d", "").unwrap());
        filters.add(StringFilter::blanking("Canceled:").unwrap());
        filters.save(&path).unwrap();

        let loaded = FilterPipeline::load(&path).unwrap();
        assert_eq!(loaded, filters);
    }

    #[test]
    fn test_load_or_default_seeds_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("string-filters.json");

        let filters = FilterPipeline::load_or_default(&path);
        assert_eq!(filters.len(), 1);
        assert_eq!(filters.filters()[0].regexp(), DEFAULT_FILTER);
        assert!(path.exists());
    }

    #[test]
    fn test_load_or_default_skips_invalid_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("string-filters.json");
        let content = r#"[
            {"regexp": "Canceled:", "replacement": null},
            {"regexp": "CONCACAF Gold Cup,", "replacement": ""},
            {"regexp": "(unclosed", "replacement": ""}
        ]"#;
        std::fs::write(&path, content).unwrap();

        let filters = FilterPipeline::load_or_default(&path);
        assert_eq!(filters.len(), 2);
        assert_eq!(filters.filters()[0].regexp(), "Canceled:");
        assert_eq!(filters.filters()[1].regexp(), "CONCACAF Gold Cup,");

        // The user's file is never overwritten
        assert_eq!(std::fs::read_to_string(&path).unwrap(), content);
        assert!(FilterPipeline::load(&path).is_err());
    }

    #[test]
    fn test_load_or_default_keeps_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("string-filters.json");
        std::fs::write(&path, "[{not json").unwrap();

        let filters = FilterPipeline::load_or_default(&path);
        assert_eq!(filters, FilterPipeline::with_default());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "[{not json");
    }

    #[test]
    fn test_load_or_default_seeds_empty_list() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("string-filters.json");
        std::fs::write(&path, "[]").unwrap();

        let filters = FilterPipeline::load_or_default(&path);
        assert_eq!(filters, FilterPipeline::with_default());
        assert_eq!(FilterPipeline::load(&path).unwrap(), filters);
    }
}
