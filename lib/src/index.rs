//! The in-memory document index of a build.

use std::collections::BTreeSet;

use chrono::NaiveDateTime;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::datetime::guess_datetime;
use crate::extract::TITLE;
use crate::util::{cmp_ci, sort_ci};

#[derive(Debug, Default)]
struct Entry {
    /// key -> values, values in the order they were added.
    properties: FxHashMap<String, Vec<String>>,
    /// Fallback timestamp, normally the file's modification time.
    modified: Option<NaiveDateTime>,
}

/// Maps document ids to their attributes and answers the queries the build
/// needs: all keys, all values of a key, documents per key/value pair, and
/// date ordering.
///
/// Date ordering consults `sort_attributes` in order and falls back to the
/// document's file modification time.
#[derive(Debug)]
pub struct DocumentIndex {
    docs: FxHashMap<String, Entry>,
    blocked: FxHashSet<String>,
    ignored: FxHashSet<String>,
    sort_attributes: Vec<String>,
}

impl Default for DocumentIndex {
    fn default() -> Self {
        DocumentIndex::new(Vec::new())
    }
}

impl DocumentIndex {
    pub fn new(sort_attributes: Vec<String>) -> Self {
        DocumentIndex {
            docs: FxHashMap::default(),
            blocked: FxHashSet::from_iter([TITLE.to_string()]),
            ignored: FxHashSet::default(),
            sort_attributes,
        }
    }

    pub fn sort_attributes(&self) -> &[String] {
        &self.sort_attributes
    }

    /// Excludes `key` from [`DocumentIndex::get_all_keys()`].
    pub fn ignore_key<K: Into<String>>(&mut self, key: K) {
        self.ignored.insert(key.into());
    }

    pub fn block_key<K: Into<String>>(&mut self, key: K) {
        self.blocked.insert(key.into());
    }

    pub fn is_ignored(&self, key: &str) -> bool {
        self.ignored.contains(key) || self.blocked.contains(key)
    }

    pub fn add_document<D: Into<String>>(&mut self, doc: D) {
        self.docs.entry(doc.into()).or_default();
    }

    /// Records the fallback timestamp for `doc`.
    pub fn set_modified(&mut self, doc: &str, modified: NaiveDateTime) {
        if let Some(entry) = self.docs.get_mut(doc) {
            entry.modified = Some(modified);
        }
    }

    /// Appends `value` to `doc`'s values for `key`. Adding to an unknown
    /// document registers it first.
    pub fn add_document_key(&mut self, doc: &str, key: &str, value: &str) {
        let entry = self.docs.entry(doc.to_string()).or_default();
        entry.properties.entry(key.to_string()).or_default().push(value.to_string());
    }

    pub fn remove_document(&mut self, doc: &str) -> bool {
        self.docs.remove(doc).is_some()
    }

    pub fn contains(&self, doc: &str) -> bool {
        self.docs.contains_key(doc)
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// All document ids, sorted case-insensitively.
    pub fn documents(&self) -> Vec<&str> {
        let mut docs: Vec<&str> = self.docs.keys().map(|d| d.as_str()).collect();
        sort_ci(&mut docs);
        docs
    }

    pub fn get_values(&self, doc: &str, key: &str) -> &[String] {
        self.docs.get(doc)
            .and_then(|e| e.properties.get(key))
            .map_or(&[], |v| v.as_slice())
    }

    pub fn get_title(&self, doc: &str) -> Option<&str> {
        self.get_values(doc, TITLE).first().map(|s| s.as_str())
    }

    /// The keys of `doc`, sorted case-insensitively, blocked keys included.
    pub fn get_doc_keys(&self, doc: &str) -> Vec<&str> {
        let mut keys: Vec<&str> = self.docs.get(doc)
            .map(|e| e.properties.keys().map(|k| k.as_str()).collect())
            .unwrap_or_default();

        sort_ci(&mut keys);
        keys
    }

    /// Every key used by any document, sorted case-insensitively, excluding
    /// blocked and ignored keys.
    pub fn get_all_keys(&self) -> Vec<&str> {
        let keys: BTreeSet<&str> = self.docs.values()
            .flat_map(|e| e.properties.keys())
            .map(|k| k.as_str())
            .filter(|k| !self.is_ignored(k))
            .collect();

        let mut keys: Vec<&str> = keys.into_iter().collect();
        sort_ci(&mut keys);
        keys
    }

    /// The distinct values of `key` across all documents, sorted
    /// case-insensitively.
    pub fn get_all_values_for_key(&self, key: &str) -> Vec<&str> {
        let values: BTreeSet<&str> = self.docs.values()
            .filter_map(|e| e.properties.get(key))
            .flatten()
            .map(|v| v.as_str())
            .collect();

        let mut values: Vec<&str> = values.into_iter().collect();
        sort_ci(&mut values);
        values
    }

    /// The documents carrying `value` under `key`, most recent first.
    pub fn get_docs_by_key_value(&self, key: &str, value: &str) -> Vec<&str> {
        let docs: Vec<&str> = self.documents()
            .into_iter()
            .filter(|doc| self.get_values(doc, key).iter().any(|v| v == value))
            .collect();

        self.sort_by_date(docs)
    }

    /// The timestamp of `doc`: the first sort attribute whose first value
    /// parses as a date, else the recorded modification time.
    pub fn get_doc_timestamp(&self, doc: &str) -> Option<NaiveDateTime> {
        let entry = self.docs.get(doc)?;
        self.sort_attributes.iter()
            .filter_map(|attr| entry.properties.get(attr)?.first())
            .find_map(|value| guess_datetime(value))
            .or(entry.modified)
    }

    /// Orders `docs` most recent first. Documents with equal timestamps keep
    /// a case-insensitive name order. If any document has no resolvable
    /// timestamp the input order is returned unchanged.
    pub fn sort_by_date<D: AsRef<str>>(&self, docs: Vec<D>) -> Vec<D> {
        let stamps: Option<Vec<NaiveDateTime>> = docs.iter()
            .map(|doc| self.get_doc_timestamp(doc.as_ref()))
            .collect();

        let Some(stamps) = stamps else {
            return docs;
        };

        let mut keyed: Vec<(NaiveDateTime, D)> = stamps.into_iter().zip(docs).collect();
        keyed.sort_by(|(ta, a), (tb, b)| tb.cmp(ta).then_with(|| cmp_ci(a.as_ref(), b.as_ref())));
        keyed.into_iter().map(|(_, doc)| doc).collect()
    }
}

#[cfg(test)]
mod index_tests {
    use super::*;

    fn index() -> DocumentIndex {
        let mut index = DocumentIndex::new(vec!["Updated".into(), "Published".into()]);
        for (doc, title, published, tags) in [
            ("a.adoc", "A", "2021-01-01", &["rust", "Web"][..]),
            ("b.adoc", "B", "2023-06-01", &["rust"][..]),
            ("c.adoc", "C", "2022-03-15", &["web"][..]),
        ] {
            index.add_document(doc);
            index.add_document_key(doc, "Title", title);
            index.add_document_key(doc, "Published", published);
            for tag in tags {
                index.add_document_key(doc, "Tag", tag);
            }
        }

        index
    }

    #[test]
    fn keys_exclude_blocked_and_ignored() {
        let mut index = index();
        assert_eq!(index.get_all_keys(), ["Published", "Tag"]);
        index.ignore_key("Published");
        assert_eq!(index.get_all_keys(), ["Tag"]);
        assert_eq!(index.get_doc_keys("a.adoc"), ["Published", "Tag", "Title"]);
    }

    #[test]
    fn values_are_distinct_and_sorted() {
        let index = index();
        assert_eq!(index.get_all_values_for_key("Tag"), ["rust", "Web", "web"]);
        assert!(index.get_all_values_for_key("Nope").is_empty());
        assert_eq!(index.get_values("a.adoc", "Tag"), ["rust", "Web"]);
        assert!(index.get_values("zzz.adoc", "Tag").is_empty());
    }

    #[test]
    fn docs_by_key_value_newest_first() {
        let index = index();
        assert_eq!(index.get_docs_by_key_value("Tag", "rust"), ["b.adoc", "a.adoc"]);
        assert_eq!(index.get_docs_by_key_value("Tag", "web"), ["c.adoc"]);
        assert!(index.get_docs_by_key_value("Tag", "go").is_empty());
    }

    #[test]
    fn sort_priority_and_fallback() {
        let mut index = index();
        index.add_document_key("a.adoc", "Updated", "2024-01-01");
        assert_eq!(index.sort_by_date(vec!["b.adoc", "a.adoc", "c.adoc"]), ["a.adoc", "b.adoc", "c.adoc"]);

        index.add_document("d.adoc");
        index.add_document_key("d.adoc", "Published", "not a date");
        let modified = guess_datetime("2022-12-31").unwrap();
        index.set_modified("d.adoc", modified);
        assert_eq!(index.get_doc_timestamp("d.adoc"), Some(modified));
        assert_eq!(index.sort_by_date(vec!["c.adoc", "d.adoc"]), ["d.adoc", "c.adoc"]);
    }

    #[test]
    fn unresolvable_timestamp_degrades_to_input_order() {
        let mut index = index();
        index.add_document("x.adoc");
        let input = vec!["a.adoc", "x.adoc", "b.adoc"];
        assert_eq!(index.sort_by_date(input.clone()), input);
        assert_eq!(index.sort_by_date(vec!["nope.adoc", "zed.adoc"]), ["nope.adoc", "zed.adoc"]);
    }

    #[test]
    fn documents_are_case_insensitively_sorted() {
        let mut index = DocumentIndex::default();
        for doc in ["b.adoc", "C.adoc", "a.adoc"] {
            index.add_document(doc);
        }

        assert_eq!(index.documents(), ["a.adoc", "b.adoc", "C.adoc"]);
        assert!(index.remove_document("b.adoc"));
        assert_eq!(index.len(), 2);
    }
}
