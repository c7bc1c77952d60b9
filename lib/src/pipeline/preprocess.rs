use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use rayon::prelude::*;

use crate::datetime::{file_timestamp, normalize};
use crate::error::{ErrorKind, Result, Chainable};
use crate::extract::{extract, replace_header_mark, Attributes, TITLE};
use crate::fingerprint::{content_hash, metadata_hash};
use crate::util::{file_name, html_name};

use super::{tolerate, Pipeline};

/// A source document read, parsed and fingerprinted.
#[derive(Debug)]
struct Scanned {
    doc: String,
    text: String,
    /// Attributes with sort attribute values normalized.
    attributes: Attributes,
    content_hash: String,
    metadata_hash: String,
    modified: Option<NaiveDateTime>,
}

fn normalize_sort_values(attributes: &Attributes, sort: &[String]) -> Attributes {
    let mut normalized = Attributes::default();
    for (key, values) in attributes.iter() {
        let values = match sort.contains(key) {
            true => values.iter().map(|v| normalize(v).unwrap_or_else(|| v.clone())).collect(),
            false => values.clone(),
        };

        normalized.insert(key.clone(), values);
    }

    normalized
}

fn scan(path: &Path, sort: &[String]) -> Result<Scanned> {
    let doc = file_name(path);
    let text = fs::read_to_string(path)
        .chain_with(|| error!("failed to read document", "path" => path.display()))?;

    let header = extract(&text)?;
    if !header.terminated {
        tracing::debug!(doc = %doc, "no end-of-header line");
    }

    Ok(Scanned {
        content_hash: content_hash(&header.canonical),
        metadata_hash: metadata_hash(&header.attributes),
        attributes: normalize_sort_values(&header.attributes, sort),
        modified: file_timestamp(path).ok(),
        doc,
        text,
    })
}

impl Pipeline {
    /// Indexes, fingerprints and records every source, stages the documents
    /// that must be compiled, and persists the current cache generation.
    pub(super) fn preprocess(&mut self, sources: &[PathBuf]) -> Result<()> {
        let sort = self.index.sort_attributes().to_vec();
        let scanned: Vec<Result<Scanned>> = sources.par_iter()
            .map(|path| scan(path, &sort))
            .collect();

        let mut registered = vec![];
        for (path, scanned) in sources.iter().zip(scanned) {
            match scanned {
                Ok(doc) => {
                    self.register(&doc);
                    registered.push(doc);
                }
                Err(e) => {
                    tracing::warn!(doc = %file_name(path), "skipping document: {e}");
                    self.report.skipped += 1;
                }
            }
        }

        if self.cache.key_set_changed() {
            tracing::info!("set of keys changed; rebuilding everything");
            self.cache.force_everything();
        }

        for doc in &registered {
            match self.cache.compile_flag(&doc.doc) {
                true => self.stage_document(doc)?,
                false => self.report.kept += 1,
            }
        }

        self.remove_orphans();
        if let Err(e) = self.cache.save() {
            tracing::error!("{e}");
        }

        let stats = self.cache.stats();
        tracing::debug!(
            hits = stats.hits,
            changed = stats.changed,
            new = stats.new,
            compile = stats.compiled,
            "cache decisions"
        );

        Ok(())
    }

    /// Adds `scanned` to the index and the cache, deciding whether the
    /// document must be compiled.
    fn register(&mut self, scanned: &Scanned) {
        let doc = scanned.doc.as_str();
        self.index.add_document(doc);
        if let Some(modified) = scanned.modified {
            self.index.set_modified(doc, modified);
        }

        for (key, values) in scanned.attributes.iter() {
            for value in values {
                self.index.add_document_key(doc, key, value);
            }
        }

        let (content, metadata) = (scanned.content_hash.clone(), scanned.metadata_hash.clone());
        let compile = self.cache.record(doc, content, metadata, &scanned.attributes);
        if !compile && !self.config.layout.cache.join(html_name(doc)).is_file() {
            tracing::debug!(doc, "compiled page missing from cache");
            self.cache.invalidate(doc);
        }

        let retitled = self.cache.title_change(doc)
            .map(|(old, new)| tracing::info!(doc, old, new, "title changed"))
            .is_some();

        if retitled {
            for key in scanned.attributes.keys().filter(|key| *key != TITLE) {
                self.cache.force_key(key);
            }
        }

        self.stage.add_target(html_name(doc));
        self.report.documents += 1;
    }

    /// Writes `scanned` into the scratch directory with its end-of-header
    /// line replaced by the page builder's metadata section.
    fn stage_document(&mut self, scanned: &Scanned) -> Result<()> {
        let doc = scanned.doc.as_str();
        let section = self.builder.metadata_section(&context!(self), doc)
            .chain_with(|| error!("failed to render metadata section", "doc" => doc));

        let section = tolerate(section)?.unwrap_or_default();
        let written = self.stage.write(doc, &replace_header_mark(&scanned.text, &section))
            .kind(ErrorKind::Document);

        if tolerate(written)?.is_none() {
            self.stage.remove_target(&html_name(doc));
            self.report.failed += 1;
        }

        Ok(())
    }

    /// Deletes the cached pages of documents that no longer exist.
    fn remove_orphans(&mut self) {
        for doc in self.cache.orphans() {
            let page = self.config.layout.cache.join(html_name(doc));
            match fs::remove_file(&page) {
                Ok(()) => tracing::info!(doc, "removed orphaned page"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!(doc, "failed to remove orphaned page: {e}"),
            }
        }
    }
}
