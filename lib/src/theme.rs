//! Theme discovery and manifests.
//!
//! A theme is a directory holding a `theme.toml` manifest, optional
//! `templates/` overriding the built-in ones, optional `resources/` copied
//! into the published site, and an optional `example/` repository used to
//! scaffold new repositories. The `default` theme is compiled in.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, Result, Chainable};
use crate::util::sort_ci;

pub const MANIFEST: &str = "theme.toml";

/// Environment variable naming an extra theme directory.
pub const THEMES_ENV: &str = "QUIRE_THEMES";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct App {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Manifest {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub ignored_keys: Vec<String>,
    #[serde(default)]
    pub apps: Vec<App>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    Builtin,
    Dir(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Theme {
    pub manifest: Manifest,
    pub origin: Origin,
}

impl Theme {
    pub fn builtin() -> Result<Theme> {
        let manifest = toml::from_str(builtin::MANIFEST)
            .chain_with(|| error!("built-in theme manifest is invalid"))?;

        Ok(Theme { manifest, origin: Origin::Builtin })
    }

    /// Reads the theme in `dir`.
    pub fn load<P: AsRef<Path>>(dir: P) -> Result<Theme> {
        let dir = dir.as_ref();
        let path = dir.join(MANIFEST);
        let string = std::fs::read_to_string(&path)
            .chain_with(|| error!("failed to read theme manifest", "path" => path.display()))?;

        let manifest = toml::from_str(&string)
            .chain_with(|| error!("invalid theme manifest", "path" => path.display()))?;

        Ok(Theme { manifest, origin: Origin::Dir(dir.to_path_buf()) })
    }

    pub fn id(&self) -> &str {
        &self.manifest.id
    }

    pub fn dir(&self) -> Option<&Path> {
        match &self.origin {
            Origin::Builtin => None,
            Origin::Dir(dir) => Some(dir),
        }
    }

    /// Directories searched for templates before the built-in ones.
    pub fn template_dirs(&self) -> Vec<PathBuf> {
        self.dir()
            .map(|dir| dir.join("templates"))
            .filter(|dir| dir.is_dir())
            .into_iter()
            .collect()
    }

    pub fn resources_dir(&self) -> Option<PathBuf> {
        self.dir().map(|d| d.join("resources")).filter(|d| d.is_dir())
    }

    pub fn example_dir(&self) -> Option<PathBuf> {
        self.dir().map(|d| d.join("example")).filter(|d| d.is_dir())
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.manifest.name, self.manifest.id)?;
        if !self.manifest.version.is_empty() {
            write!(f, " v{}", self.manifest.version)?;
        }

        match &self.origin {
            Origin::Builtin => write!(f, " [built-in]"),
            Origin::Dir(dir) => write!(f, " [{}]", dir.display()),
        }
    }
}

/// An ordered list of directories, each holding one subdirectory per theme.
#[derive(Debug, Clone, Default)]
pub struct ThemeSearch {
    paths: Vec<PathBuf>,
}

impl ThemeSearch {
    /// The standard search order: `<source>/resources/themes`, the configured
    /// `extra` paths, `$QUIRE_THEMES`, then `~/.quire/themes`.
    pub fn new(source: Option<&Path>, extra: &[PathBuf]) -> Self {
        let mut paths = vec![];
        paths.extend(source.map(|s| s.join("resources").join("themes")));
        paths.extend(extra.iter().cloned());
        paths.extend(std::env::var_os(THEMES_ENV).map(PathBuf::from));
        paths.extend(std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".quire").join("themes")));
        ThemeSearch { paths }
    }

    pub fn with_paths(paths: Vec<PathBuf>) -> Self {
        ThemeSearch { paths }
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Finds the theme named `id`. A theme directory shadows the built-in
    /// theme of the same id.
    pub fn find(&self, id: &str) -> Result<Theme> {
        for path in &self.paths {
            let dir = path.join(id);
            if dir.join(MANIFEST).is_file() {
                return Theme::load(&dir).kind(ErrorKind::Config);
            }
        }

        if id == builtin::ID {
            return Theme::builtin().kind(ErrorKind::Config);
        }

        err! {
            kind: Config; "theme not found",
            "theme" => id,
            "searched" => format!("{:?}", self.paths),
        }
    }

    /// Every loadable theme, sorted by id. Earlier search paths shadow later
    /// ones. Unreadable manifests are logged and skipped.
    pub fn list(&self) -> Vec<Theme> {
        let mut themes: Vec<Theme> = vec![];
        let mut push = |theme: Theme| if !themes.iter().any(|t| t.id() == theme.id()) {
            themes.push(theme);
        };

        for path in &self.paths {
            let Ok(entries) = std::fs::read_dir(path) else { continue };
            let mut dirs: Vec<PathBuf> = entries.filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.join(MANIFEST).is_file())
                .collect();

            dirs.sort();
            for dir in dirs {
                match Theme::load(&dir) {
                    Ok(theme) => push(theme),
                    Err(e) => tracing::warn!(dir = %dir.display(), "skipping theme: {e}"),
                }
            }
        }

        if let Ok(theme) = Theme::builtin() {
            push(theme);
        }

        themes.sort_by(|a, b| crate::util::cmp_ci(a.id(), b.id()));
        themes
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.list().into_iter().map(|t| t.manifest.id).collect();
        sort_ci(&mut ids);
        ids
    }
}

/// The compiled-in `default` theme.
pub mod builtin {
    pub const ID: &str = "default";

    pub const MANIFEST: &str = include_str!("../themes/default/theme.toml");

    const TEMPLATES: &[(&str, &str)] = &[
        ("metadata.adoc", include_str!("../themes/default/templates/metadata.adoc")),
        ("key.adoc", include_str!("../themes/default/templates/key.adoc")),
        ("value.adoc", include_str!("../themes/default/templates/value.adoc")),
        ("index.adoc", include_str!("../themes/default/templates/index.adoc")),
        ("all.adoc", include_str!("../themes/default/templates/all.adoc")),
        ("properties.adoc", include_str!("../themes/default/templates/properties.adoc")),
        ("stats.adoc", include_str!("../themes/default/templates/stats.adoc")),
        ("page.html", include_str!("../themes/default/templates/page.html")),
        ("welcome.adoc", include_str!("../themes/default/templates/welcome.adoc")),
    ];

    /// Files published under `resources/themes/default/`.
    pub const RESOURCES: &[(&str, &str)] = &[
        ("css/quire.css", include_str!("../themes/default/resources/css/quire.css")),
    ];

    pub fn template(name: &str) -> Option<&'static str> {
        TEMPLATES.iter().find(|(n, _)| *n == name).map(|(_, t)| *t)
    }
}
