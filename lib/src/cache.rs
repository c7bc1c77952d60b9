//! The persisted two-generation build cache.
//!
//! The previous generation is loaded from disk when a build starts and is
//! only read. The current generation is filled in while documents are
//! preprocessed, and it is what gets saved. Every rebuild decision compares
//! the two.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ErrorKind, Result, Chainable};
use crate::extract::{Attributes, TITLE};
use crate::util::{fs::write_atomic, sort_ci};

/// The cached record of a single document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub content_hash: String,
    pub metadata_hash: String,
    /// Whether this build compiles the document. A value read back from an
    /// earlier generation carries no meaning.
    #[serde(default)]
    pub compile: bool,
    /// The document's attributes, kept apart from the fields above so that
    /// any attribute name is valid. Entries that are not lists of strings
    /// are carried along but otherwise ignored.
    #[serde(default)]
    pub attributes: BTreeMap<String, Value>,
}

impl CacheEntry {
    pub fn new(content_hash: String, metadata_hash: String, attrs: &Attributes) -> Self {
        let attributes = attrs.iter()
            .map(|(k, v)| (k.clone(), Value::from(v.clone())))
            .collect();

        CacheEntry { content_hash, metadata_hash, compile: false, attributes }
    }

    pub fn values(&self, key: &str) -> Vec<&str> {
        match self.attributes.get(key) {
            Some(Value::Array(values)) => values.iter().filter_map(|v| v.as_str()).collect(),
            _ => vec![],
        }
    }

    pub fn title(&self) -> Option<&str> {
        self.values(TITLE).first().copied()
    }

    /// Keys whose value is a list of strings.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.attributes.iter()
            .filter(|(_, v)| v.as_array().map_or(false, |a| a.iter().all(Value::is_string)))
            .map(|(k, _)| k.as_str())
    }
}

/// key -> value -> documents with that value, sorted case-insensitively.
pub type InvertedIndex = BTreeMap<String, BTreeMap<String, Vec<String>>>;

/// One snapshot of the cache.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Generation {
    #[serde(default)]
    pub document: BTreeMap<String, CacheEntry>,
    #[serde(default)]
    pub metadata: InvertedIndex,
}

impl Generation {
    /// The sorted values recorded for `key`.
    pub fn values_of(&self, key: &str) -> Vec<&str> {
        let mut values: Vec<&str> = self.metadata.get(key)
            .map(|values| values.keys().map(|v| v.as_str()).collect())
            .unwrap_or_default();

        sort_ci(&mut values);
        values
    }

    /// The documents recorded under `key`/`value`.
    pub fn docs_of(&self, key: &str, value: &str) -> &[String] {
        self.metadata.get(key)
            .and_then(|values| values.get(value))
            .map_or(&[], |docs| docs.as_slice())
    }
}

/// Hit/miss counters for one build.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// Present in the previous generation with identical fingerprints.
    pub hits: usize,
    /// Present in the previous generation with different fingerprints.
    pub changed: usize,
    /// Absent from the previous generation.
    pub new: usize,
    /// Compiled for any reason.
    pub compiled: usize,
}

#[derive(Debug)]
pub struct CacheStore {
    path: PathBuf,
    previous: Generation,
    current: Generation,
    force_all: bool,
    force_keys: BTreeSet<String>,
    stats: CacheStats,
}

impl CacheStore {
    /// Loads the previous generation from `path`. A missing file is a first
    /// build. An unreadable or malformed file is logged and treated as an
    /// empty previous generation.
    pub fn load<P: AsRef<Path>>(path: P, force_all: bool) -> Self {
        let path = path.as_ref().to_path_buf();
        let previous = match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), "ignoring malformed cache: {e}");
                Generation::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no previous cache");
                Generation::default()
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), "ignoring unreadable cache: {e}");
                Generation::default()
            }
        };

        tracing::debug!(docs = previous.document.len(), "loaded previous generation");
        CacheStore::with_previous(path, previous, force_all)
    }

    pub fn with_previous(path: PathBuf, previous: Generation, force_all: bool) -> Self {
        CacheStore {
            path,
            previous,
            current: Generation::default(),
            force_all,
            force_keys: BTreeSet::new(),
            stats: CacheStats::default(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn previous(&self) -> &Generation {
        &self.previous
    }

    pub fn current(&self) -> &Generation {
        &self.current
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    pub fn force_all(&self) -> bool {
        self.force_all
    }

    pub fn force_key<K: Into<String>>(&mut self, key: K) {
        self.force_keys.insert(key.into());
    }

    pub fn is_forced(&self, key: &str) -> bool {
        self.force_all || self.force_keys.contains(key)
    }

    /// Records `doc` in the current generation and returns whether it must
    /// be compiled: forced, new, or either fingerprint changed.
    pub fn record(
        &mut self,
        doc: &str,
        content_hash: String,
        metadata_hash: String,
        attrs: &Attributes,
    ) -> bool {
        let mut entry = CacheEntry::new(content_hash, metadata_hash, attrs);
        let compile = match self.previous.document.get(doc) {
            Some(prev) if prev.content_hash == entry.content_hash
                && prev.metadata_hash == entry.metadata_hash =>
            {
                self.stats.hits += 1;
                self.force_all
            }
            Some(_) => {
                self.stats.changed += 1;
                true
            }
            None => {
                self.stats.new += 1;
                true
            }
        };

        if compile {
            self.stats.compiled += 1;
        }

        entry.compile = compile;
        for (key, values) in attrs.iter() {
            let inverted = self.current.metadata.entry(key.clone()).or_default();
            for value in values {
                let docs = inverted.entry(value.clone()).or_default();
                if !docs.iter().any(|d| d == doc) {
                    docs.push(doc.to_string());
                    sort_ci(docs);
                }
            }
        }

        self.current.document.insert(doc.to_string(), entry);
        compile
    }

    /// Marks an already recorded document for compilation.
    pub fn invalidate(&mut self, doc: &str) {
        if let Some(entry) = self.current.document.get_mut(doc) {
            if !entry.compile {
                entry.compile = true;
                self.stats.compiled += 1;
            }
        }
    }

    /// Whether the keys in use across the repository differ from the
    /// previous generation's. Never true on a first build.
    pub fn key_set_changed(&self) -> bool {
        !self.previous.document.is_empty()
            && !self.previous.metadata.keys().eq(self.current.metadata.keys())
    }

    /// Marks every recorded document for compilation and every aggregate
    /// page for rebuilding.
    pub fn force_everything(&mut self) {
        self.force_all = true;
        for entry in self.current.document.values_mut() {
            if !entry.compile {
                entry.compile = true;
                self.stats.compiled += 1;
            }
        }
    }

    pub fn compile_flag(&self, doc: &str) -> bool {
        self.current.document.get(doc).map_or(false, |e| e.compile)
    }

    /// The title `doc` had in the previous generation, if it differs from the
    /// current one.
    pub fn title_change(&self, doc: &str) -> Option<(&str, &str)> {
        let old = self.previous.document.get(doc)?.title()?;
        let new = self.current.document.get(doc)?.title()?;
        (old != new).then_some((old, new))
    }

    /// Whether the page for `key` must be rebuilt: forced, or the set of
    /// values of `key` differs between generations.
    pub fn key_compile_decision(&self, key: &str) -> bool {
        self.is_forced(key) || self.current.values_of(key) != self.previous.values_of(key)
    }

    /// Whether the page for `key`/`value` must be rebuilt: forced, or the
    /// documents carrying the pair differ between generations.
    pub fn value_compile_decision(&self, key: &str, value: &str) -> bool {
        self.is_forced(key)
            || self.current.docs_of(key, value) != self.previous.docs_of(key, value)
    }

    /// Documents of the previous generation missing from the current one.
    pub fn orphans(&self) -> Vec<&str> {
        self.previous.document.keys()
            .filter(|doc| !self.current.document.contains_key(*doc))
            .map(|doc| doc.as_str())
            .collect()
    }

    /// Writes the current generation to disk.
    pub fn save(&self) -> Result<()> {
        let json = serde_json::to_vec(&self.current).kind(ErrorKind::Cache)?;
        write_atomic(&self.path, &json)
            .chain_with(|| error!("failed to save cache", "path" => self.path.display()))
            .kind(ErrorKind::Cache)
    }
}
