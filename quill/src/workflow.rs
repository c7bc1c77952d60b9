use std::fs;
use std::path::Path;

use serde_json::json;

use quire::datetime::{format_timestamp, now};
use quire::error::{ErrorKind, Result, Chainable};
use quire::templating::{Engine, EngineInit, minijinja::MiniJinjaEngine};
use quire::theme::ThemeSearch;
use quire::util::fs::copy_dir;
use quire::{error, err, BuildOptions, Config, Pipeline, RepoConfig};

pub const CONFIG_DIR: &str = "config";
pub const CONFIG_FILE: &str = "repo.toml";

pub fn build(config: &Path, options: BuildOptions) -> Result<()> {
    let config = Config::load(config, options)?;
    let report = Pipeline::new(config)?.run()?;
    if report.failed > 0 || report.missing > 0 {
        tracing::warn!(
            failed = report.failed,
            missing = report.missing,
            "build finished with errors; see above"
        );
    }

    Ok(())
}

pub fn info(path: &Path) -> Result<()> {
    let base = path.parent().unwrap_or(Path::new("."));
    let repo = RepoConfig::read(path)?.rebase(base);
    let workers = repo.workers.map_or_else(|| "host parallelism".to_string(), |n| n.to_string());

    println!("title:   {}", repo.title);
    println!("tagline: {}", repo.tagline.as_deref().unwrap_or(""));
    println!("theme:   {}", repo.theme);
    println!("sort:    {}", repo.sort.join(", "));
    println!("force:   {}", repo.force);
    println!("workers: {workers}");
    println!("source:  {}", repo.source.display());
    println!("target:  {}", repo.target.display());
    Ok(())
}

/// Scaffolds a repository under `path`: a source and a target directory, a
/// configuration file, and either the theme's example documents or a
/// welcome document.
pub fn create(theme: &str, path: &Path) -> Result<()> {
    let theme = ThemeSearch::new(None, &[]).find(theme)?;
    let config_path = path.join(CONFIG_DIR).join(CONFIG_FILE);
    if config_path.exists() {
        return err!(kind: Config; "repository already exists", "config" => config_path.display());
    }

    for dir in ["source", "target", CONFIG_DIR] {
        fs::create_dir_all(path.join(dir))
            .chain_with(|| error!("failed to create directory", "path" => path.join(dir).display()))
            .kind(ErrorKind::Config)?;
    }

    let source = path.join("source").canonicalize().kind(ErrorKind::Config)?;
    let target = path.join("target").canonicalize().kind(ErrorKind::Config)?;
    let title = path.canonicalize()?
        .file_name()
        .map_or_else(|| "Repository".to_string(), |name| name.to_string_lossy().into_owned());

    match theme.example_dir() {
        Some(example) => {
            let copied = copy_dir(&example, &source)?;
            tracing::info!(files = copied, theme = theme.id(), "copied example documents");
        }
        None => {
            let engine = MiniJinjaEngine::init(theme.template_dirs(), json!({ "title": title }));
            let vars = json!({
                "title": title,
                "published": format_timestamp(&now()),
                "theme": theme.id(),
            });

            let welcome = engine.render("welcome.adoc", &vars)?;
            fs::write(source.join("welcome.adoc"), welcome)?;
        }
    }

    let mut repo = RepoConfig::new(title, source, target);
    repo.theme = theme.id().to_string();
    repo.sort = vec!["Published".into()];
    fs::write(&config_path, repo.to_toml()?)
        .chain_with(|| error!("failed to write configuration", "path" => config_path.display()))?;

    println!("created repository at {}", path.display());
    println!("build it with: quill build {}", config_path.display());
    Ok(())
}

pub fn themes() -> Result<()> {
    for theme in ThemeSearch::new(None, &[]).list() {
        println!("{theme}");
        if !theme.manifest.description.is_empty() {
            println!("    {}", theme.manifest.description);
        }
    }

    Ok(())
}

pub fn apps(theme: &str) -> Result<()> {
    let theme = ThemeSearch::new(None, &[]).find(theme)?;
    if theme.manifest.apps.is_empty() {
        println!("{} has no apps", theme.id());
    }

    for app in &theme.manifest.apps {
        println!("{:<12} {}", app.id, app.name);
        if !app.description.is_empty() {
            println!("{:<12} {}", "", app.description);
        }
    }

    Ok(())
}

#[cfg(test)]
mod workflow_tests {
    use super::*;

    #[test]
    fn create_scaffolds_a_buildable_repository() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("notes");
        create("default", &path).unwrap();

        let config_path = path.join(CONFIG_DIR).join(CONFIG_FILE);
        let repo = RepoConfig::read(&config_path).unwrap();
        assert_eq!(repo.title, "notes");
        assert_eq!(repo.theme, "default");
        assert_eq!(repo.sort, ["Published"]);
        assert!(repo.source.is_absolute());

        let welcome = fs::read_to_string(repo.source.join("welcome.adoc")).unwrap();
        assert!(welcome.starts_with("= Welcome to notes\n"));
        assert!(welcome.contains(quire::extract::END_OF_HEADER));
        quire::extract::extract(&welcome).unwrap();

        assert!(info(&config_path).is_ok());
        let e = create("default", &path).unwrap_err();
        assert_eq!(e.kind(), ErrorKind::Config);
    }

    #[test]
    fn unknown_themes_are_config_errors() {
        let tmp = tempfile::tempdir().unwrap();
        let e = create("no-such-theme", &tmp.path().join("kb")).unwrap_err();
        assert_eq!(e.kind(), ErrorKind::Config);
        assert_eq!(apps("no-such-theme").unwrap_err().kind(), ErrorKind::Config);
        assert!(apps("default").is_ok());
    }
}
