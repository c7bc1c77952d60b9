//! The per-build scratch area.
//!
//! Documents to compile, and pages a theme synthesizes, are written here.
//! The stage also tracks the set of target pages the build will publish.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::error::{ErrorKind, Result, Chainable};
use crate::fingerprint::{content_hash, file_hash};
use crate::util::html_name;

#[derive(Debug)]
pub struct Stage {
    dir: TempDir,
    source: PathBuf,
    dist: PathBuf,
    targets: BTreeSet<String>,
    /// Theme-distributed sources and their content hashes.
    distributed: BTreeMap<String, String>,
    /// Sources a theme wrote into the source directory for this build only.
    generated: Vec<PathBuf>,
}

impl Stage {
    /// Creates a fresh scratch directory under `tmp`.
    pub fn new(tmp: &Path, source: &Path, dist: &Path) -> Result<Stage> {
        let dir = tempfile::Builder::new()
            .prefix("build-")
            .tempdir_in(tmp)
            .chain_with(|| error!("failed to create scratch directory", "parent" => tmp.display()))
            .kind(ErrorKind::Config)?;

        Ok(Stage {
            dir,
            source: source.to_path_buf(),
            dist: dist.to_path_buf(),
            targets: BTreeSet::new(),
            distributed: BTreeMap::new(),
            generated: vec![],
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn dist(&self) -> &Path {
        &self.dist
    }

    pub fn targets(&self) -> &BTreeSet<String> {
        &self.targets
    }

    pub fn add_target<S: Into<String>>(&mut self, page: S) {
        self.targets.insert(page.into());
    }

    pub fn remove_target(&mut self, page: &str) -> bool {
        self.targets.remove(page)
    }

    /// Writes `contents` to the scratch file `name`.
    pub fn write(&self, name: &str, contents: &str) -> Result<PathBuf> {
        let path = self.path().join(name);
        fs::write(&path, contents)
            .chain_with(|| error!("failed to write staged file", "path" => path.display()))?;

        Ok(path)
    }

    /// Stages a synthesized source page `name` for compilation and publishes
    /// its HTML counterpart.
    pub fn distribute(&mut self, name: &str, contents: &str) -> Result<()> {
        self.write(name, contents)?;
        self.distributed.insert(name.to_string(), content_hash(contents));
        self.add_target(html_name(name));
        Ok(())
    }

    /// Stages ready HTML that is published without compilation.
    pub fn distribute_html(&mut self, name: &str, html: &str) -> Result<()> {
        self.write(name, html)?;
        self.add_target(name);
        Ok(())
    }

    /// Writes a document into the source directory. It is processed like any
    /// other document and removed by [`Stage::cleanup()`].
    pub fn distribute_to_source(&mut self, name: &str, contents: &str) -> Result<()> {
        let path = self.source.join(name);
        fs::write(&path, contents)
            .chain_with(|| error!("failed to write generated source", "path" => path.display()))?;

        self.generated.push(path);
        Ok(())
    }

    pub fn is_distributed(&self, name: &str) -> bool {
        self.distributed.contains_key(name)
    }

    pub fn distributed(&self) -> impl Iterator<Item = &str> {
        self.distributed.keys().map(|k| k.as_str())
    }

    /// Whether the distributed page `name` is identical to the copy kept
    /// from the previous build.
    pub fn unchanged_since_last_build(&self, name: &str) -> bool {
        let Some(hash) = self.distributed.get(name) else {
            return false;
        };

        file_hash(&self.dist.join(name)).map_or(false, |previous| previous == *hash)
    }

    /// Removes generated sources and the scratch directory.
    pub fn cleanup(self) -> Result<()> {
        for path in &self.generated {
            if let Err(e) = fs::remove_file(path) {
                tracing::warn!(path = %path.display(), "failed to remove generated source: {e}");
            }
        }

        let path = self.dir.path().to_path_buf();
        self.dir.close()
            .chain_with(|| error!("failed to remove scratch directory", "path" => path.display()))
    }
}
