//! Publishing a finished build into the target directory.

use std::fs;
use std::path::Path;

use crate::config::Config;
use crate::error::{Result, Chainable};
use crate::stage::Stage;
use crate::theme::{builtin, Theme};
use crate::util::file_name;
use crate::util::fs::{clear_dir, copy_dir, copy_file, list_files};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Published {
    /// Pages copied into the target.
    pub pages: usize,
    /// Targets with no compiled HTML in the cache.
    pub missing: usize,
}

fn copy_matching(from: &Path, ext: &str, to: &Path) -> Result<usize> {
    let files = list_files(from, ext)?;
    for path in &files {
        copy_file(path, &to.join(file_name(path)))?;
    }

    Ok(files.len())
}

/// Replaces the contents of the target with this build's pages.
///
/// Theme-distributed sources are kept for the next build's comparison, the
/// sources are published under `sources/`, freshly compiled pages join the
/// cache, every target page is copied from the cache, and theme and local
/// resources are merged under `resources/`. The cache is then rebuilt from
/// the target so it holds exactly the published pages.
pub fn publish(config: &Config, theme: &Theme, stage: &Stage) -> Result<Published> {
    let layout = &config.layout;
    let target = &config.target;

    for name in stage.distributed() {
        copy_file(&stage.path().join(name), &layout.dist.join(name))?;
    }

    clear_dir(target)?;
    copy_matching(&config.source, "adoc", &target.join("sources"))?;

    let fresh = copy_matching(stage.path(), "html", &layout.cache)?;
    tracing::debug!(pages = fresh, "cached compiled pages");

    let mut published = Published::default();
    for page in stage.targets() {
        let cached = layout.cache.join(page);
        if !cached.is_file() {
            tracing::error!(page = %page, "compiled page is missing; consider rebuilding with --force");
            published.missing += 1;
            continue;
        }

        copy_file(&cached, &target.join(page))?;
        published.pages += 1;
    }

    let themes = target.join("resources").join("themes");
    for (name, contents) in builtin::RESOURCES {
        let path = themes.join(builtin::ID).join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(&path, contents)
            .chain_with(|| error!("failed to write theme resource", "path" => path.display()))?;
    }

    if let Some(resources) = theme.resources_dir() {
        copy_dir(&resources, &themes.join(theme.id()))?;
    }

    let local = config.source.join("resources");
    if local.is_dir() {
        copy_dir(&local, &target.join("resources"))?;
    }

    clear_dir(&layout.cache)?;
    copy_matching(target, "html", &layout.cache)?;

    tracing::info!(pages = published.pages, missing = published.missing, "published");
    Ok(published)
}
