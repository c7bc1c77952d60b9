//! Repository configuration and the derived on-disk layout.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{Error, ErrorKind, Result, Chainable};
use crate::util::valid_filename;

/// Upper bound on concurrent compile jobs.
pub const MAX_WORKERS: usize = 30;

pub const DEFAULT_THEME: &str = "default";

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// The repository configuration file, as written by users.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RepoConfig {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tagline: Option<String>,
    pub source: PathBuf,
    pub target: PathBuf,
    #[serde(default = "default_theme")]
    pub theme: String,
    /// Attributes consulted, in order, for a document's date.
    #[serde(default, deserialize_with = "one_or_many")]
    pub sort: Vec<String>,
    #[serde(default)]
    pub ignored_keys: Vec<String>,
    #[serde(default)]
    pub events: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,
    #[serde(default)]
    pub force: bool,
    /// Seconds a single compile job may run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    /// Directory for caches and scratch space.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub var: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub theme_paths: Vec<PathBuf>,
    #[serde(default)]
    pub compiler: CompilerSettings,
}

fn default_theme() -> String {
    DEFAULT_THEME.into()
}

fn one_or_many<'de, D: Deserializer<'de>>(de: D) -> Result<Vec<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(de)? {
        OneOrMany::One(s) if s.trim().is_empty() => vec![],
        OneOrMany::One(s) => vec![s],
        OneOrMany::Many(v) => v,
    })
}

/// A compiler directive value: `true` passes the bare attribute, `false`
/// unsets it, a string assigns it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Directive {
    Flag(bool),
    Value(String),
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CompilerSettings {
    /// Shell command template. `{input}`, `{output}` and `{attributes}` are
    /// substituted per job.
    #[serde(default = "CompilerSettings::default_command")]
    pub command: String,
    #[serde(default = "CompilerSettings::default_attributes")]
    pub attributes: BTreeMap<String, Directive>,
}

impl CompilerSettings {
    fn default_command() -> String {
        "asciidoctor -q -s {attributes} -b html5 -D {output} {input}".into()
    }

    fn default_attributes() -> BTreeMap<String, Directive> {
        [
            ("source-highlighter", Directive::Value("coderay".into())),
            ("toc", Directive::Value("left".into())),
            ("toclevels", Directive::Value("3".into())),
            ("icons", Directive::Value("font".into())),
        ].into_iter().map(|(k, v)| (k.to_string(), v)).collect()
    }
}

impl Default for CompilerSettings {
    fn default() -> Self {
        CompilerSettings {
            command: Self::default_command(),
            attributes: Self::default_attributes(),
        }
    }
}

impl RepoConfig {
    /// A configuration with every optional setting at its default.
    pub fn new<T: Into<String>>(title: T, source: PathBuf, target: PathBuf) -> Self {
        RepoConfig {
            title: title.into(),
            tagline: None,
            source,
            target,
            theme: default_theme(),
            sort: vec![],
            ignored_keys: vec![],
            events: vec![],
            workers: None,
            force: false,
            timeout: None,
            var: None,
            theme_paths: vec![],
            compiler: CompilerSettings::default(),
        }
    }

    /// Reads a TOML file, or a JSON file if the extension is `.json`.
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let string = std::fs::read_to_string(path)
            .chain_with(|| error!("failed to read configuration", "path" => path.display()))
            .kind(ErrorKind::Config)?;

        let parsed: Result<RepoConfig> = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(&string).map_err(Error::from),
            _ => toml::from_str(&string).map_err(Error::from),
        };

        parsed.chain_with(|| error!("invalid configuration", "path" => path.display()))
            .kind(ErrorKind::Config)
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Rewrites relative paths as relative to `base`.
    pub fn rebase(mut self, base: &Path) -> Self {
        let join = |p: &mut PathBuf| if p.is_relative() { *p = base.join(&*p) };
        join(&mut self.source);
        join(&mut self.target);
        if let Some(var) = self.var.as_mut() {
            join(var);
        }

        self.theme_paths.iter_mut().for_each(join);
        self
    }
}

/// Overrides given on the command line.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BuildOptions {
    pub force: bool,
    pub workers: Option<usize>,
}

/// Where a repository keeps its state between builds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub var: PathBuf,
    /// Parent of per-build scratch directories.
    pub tmp: PathBuf,
    /// Compiled HTML from earlier builds.
    pub cache: PathBuf,
    /// Copies of theme-distributed sources from the last build.
    pub dist: PathBuf,
    pub db: PathBuf,
}

impl Layout {
    pub fn new(var: &Path, source: &Path) -> Self {
        let key = valid_filename(&source.to_string_lossy());
        Layout {
            var: var.to_path_buf(),
            tmp: var.join("tmp"),
            cache: var.join("cache").join(&key),
            dist: var.join("dist").join(&key),
            db: var.join("db").join(format!("kbdict-{key}.json")),
        }
    }

    pub fn create(&self) -> Result<()> {
        for dir in [&self.tmp, &self.cache, &self.dist] {
            std::fs::create_dir_all(dir)
                .chain_with(|| error!("failed to create directory", "path" => dir.display()))
                .kind(ErrorKind::Config)?;
        }

        if let Some(parent) = self.db.parent() {
            std::fs::create_dir_all(parent).kind(ErrorKind::Config)?;
        }

        Ok(())
    }
}

/// A validated configuration, ready to build with.
#[derive(Debug, Clone)]
pub struct Config {
    pub repo: RepoConfig,
    pub source: PathBuf,
    pub target: PathBuf,
    pub force: bool,
    pub workers: usize,
    pub timeout: Duration,
    pub layout: Layout,
}

impl Config {
    /// Reads the configuration at `path` and resolves it.
    pub fn load<P: AsRef<Path>>(path: P, options: BuildOptions) -> Result<Self> {
        let path = path.as_ref();
        let base = path.parent().unwrap_or(Path::new("."));
        Config::resolve(RepoConfig::read(path)?.rebase(base), options)
    }

    /// Validates `repo` and applies `options`. The source directory must
    /// exist and differ from the target, which is created if missing.
    pub fn resolve(repo: RepoConfig, options: BuildOptions) -> Result<Self> {
        let source = repo.source.canonicalize()
            .chain_with(|| error! {
                kind: Config; "source directory is not accessible",
                "source" => repo.source.display(),
            })?;

        if !source.is_dir() {
            return err!(kind: Config; "source is not a directory", "source" => source.display());
        }

        std::fs::create_dir_all(&repo.target)
            .chain_with(|| error!("failed to create target directory", "target" => repo.target.display()))
            .kind(ErrorKind::Config)?;

        let target = repo.target.canonicalize().kind(ErrorKind::Config)?;
        if source == target {
            return err! {
                kind: Config; "source and target must be different directories",
                "directory" => source.display(),
            };
        }

        let host = std::thread::available_parallelism().map_or(1, |n| n.get());
        let workers = options.workers.or(repo.workers).unwrap_or(host).clamp(1, MAX_WORKERS);
        let timeout = repo.timeout.map_or(DEFAULT_TIMEOUT, Duration::from_secs);
        let var = match &repo.var {
            Some(var) => var.clone(),
            None => source.parent().unwrap_or(&source).join("var"),
        };

        let layout = Layout::new(&var, &source);
        Ok(Config {
            force: options.force || repo.force,
            repo,
            source,
            target,
            workers,
            timeout,
            layout,
        })
    }

    pub fn theme(&self) -> &str {
        &self.repo.theme
    }
}

#[cfg(test)]
mod config_tests {
    use super::*;

    fn repo(tmp: &Path) -> RepoConfig {
        std::fs::create_dir_all(tmp.join("source")).unwrap();
        RepoConfig::new("KB", tmp.join("source"), tmp.join("target"))
    }

    #[test]
    fn reads_toml_with_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("repo.toml");
        std::fs::write(&path, r#"
            title = "My KB"
            source = "source"
            target = "target"
            sort = "Published"

            [compiler.attributes]
            toc = "left"
            linkcss = true
        "#).unwrap();

        let config = RepoConfig::read(&path).unwrap().rebase(tmp.path());
        assert_eq!(config.theme, "default");
        assert_eq!(config.sort, ["Published"]);
        assert_eq!(config.source, tmp.path().join("source"));
        assert_eq!(config.compiler.attributes["linkcss"], Directive::Flag(true));
        assert!(config.compiler.command.starts_with("asciidoctor"));
    }

    #[test]
    fn reads_json() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("repo.json");
        std::fs::write(&path, r#"{
            "title": "KB", "source": "/s", "target": "/t",
            "sort": ["Updated", "Published"], "workers": 4, "force": true
        }"#).unwrap();

        let config = RepoConfig::read(&path).unwrap();
        assert_eq!(config.sort, ["Updated", "Published"]);
        assert_eq!(config.theme, DEFAULT_THEME);
        assert_eq!(config.workers, Some(4));
        assert!(config.force);
    }

    #[test]
    fn malformed_config_is_a_config_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("repo.toml");
        std::fs::write(&path, "title = ").unwrap();
        assert_eq!(RepoConfig::read(&path).unwrap_err().kind(), ErrorKind::Config);
        assert_eq!(RepoConfig::read(tmp.path().join("nope.toml")).unwrap_err().kind(), ErrorKind::Config);
    }

    #[test]
    fn resolve_validates_and_clamps() {
        let tmp = tempfile::tempdir().unwrap();
        let options = BuildOptions { force: true, workers: Some(500) };
        let config = Config::resolve(repo(tmp.path()), options).unwrap();
        assert_eq!(config.workers, MAX_WORKERS);
        assert!(config.force);
        assert!(config.target.is_dir());
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
        assert!(config.layout.var.ends_with("var"));

        let options = BuildOptions { force: false, workers: Some(0) };
        assert_eq!(Config::resolve(repo(tmp.path()), options).unwrap().workers, 1);
    }

    #[test]
    fn resolve_rejects_bad_directories() {
        let tmp = tempfile::tempdir().unwrap();
        let mut same = repo(tmp.path());
        same.target = same.source.clone();
        let e = Config::resolve(same, BuildOptions::default()).unwrap_err();
        assert_eq!(e.kind(), ErrorKind::Config);

        let mut missing = repo(tmp.path());
        missing.source = tmp.path().join("nope");
        let e = Config::resolve(missing, BuildOptions::default()).unwrap_err();
        assert_eq!(e.kind(), ErrorKind::Config);
    }

    #[test]
    fn layout_is_keyed_by_source() {
        let layout = Layout::new(Path::new("/var/kb"), Path::new("/home/me/my kb/source"));
        assert_eq!(layout.db, Path::new("/var/kb/db/kbdict-homeme_my_kbsource.json"));
        assert_eq!(layout.cache, Path::new("/var/kb/cache/homeme_my_kbsource"));
    }
}
