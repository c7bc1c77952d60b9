use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use filetime::FileTime;
use quire::builder::{Context, PageBuilder, StandardBuilder};
use quire::compiler::{Compiler, Job, Outcome};
use quire::{BuildOptions, BuildReport, Config, ErrorKind, Pipeline};

const EOH: &str = "// END-OF-HEADER. DO NOT MODIFY OR DELETE THIS LINE";

/// Wraps the staged source in a `<pre>` block instead of compiling it.
#[derive(Debug, Default)]
struct Echo {
    fail: Vec<&'static str>,
    panic: Vec<&'static str>,
}

impl Compiler for Echo {
    fn compile(&self, job: &Job) -> Outcome {
        let doc = job.doc();
        if self.panic.contains(&doc.as_str()) {
            panic!("compiler crashed on {doc}");
        }

        if self.fail.contains(&doc.as_str()) {
            return Outcome::failed(job.clone(), "syntax error", Duration::ZERO);
        }

        let text = fs::read_to_string(&job.source).unwrap();
        fs::write(job.output(), format!("<div class=\"sect1\">\n<pre>{text}</pre>\n</div>\n")).unwrap();
        Outcome { job: job.clone(), success: true, message: None, elapsed: Duration::ZERO }
    }
}

/// The standard builder, except that post-processing `page` fails with an
/// error of `kind`.
struct Faulty {
    inner: StandardBuilder,
    page: &'static str,
    kind: ErrorKind,
}

impl PageBuilder for Faulty {
    fn metadata_section(&mut self, ctx: &Context<'_>, doc: &str) -> quire::Result<String> {
        self.inner.metadata_section(ctx, doc)
    }

    fn build_page_key(&mut self, ctx: &mut Context<'_>, key: &str, values: &[&str]) -> quire::Result<()> {
        self.inner.build_page_key(ctx, key, values)
    }

    fn build_page_key_value(
        &mut self,
        ctx: &mut Context<'_>,
        key: &str,
        value: &str,
        docs: &[&str],
    ) -> quire::Result<()> {
        self.inner.build_page_key_value(ctx, key, value, docs)
    }

    fn build(&mut self, ctx: &mut Context<'_>) -> quire::Result<()> {
        self.inner.build(ctx)
    }

    fn build_page(&mut self, ctx: &Context<'_>, page: &Path) -> quire::Result<()> {
        if page.ends_with(self.page) {
            return Err(quire::error!("cannot post-process page").with_kind(self.kind));
        }

        self.inner.build_page(ctx, page)
    }
}

struct Repo {
    _tmp: tempfile::TempDir,
    root: PathBuf,
}

impl Repo {
    fn new() -> Repo {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().to_path_buf();
        fs::create_dir_all(root.join("source")).unwrap();
        fs::create_dir_all(root.join("config")).unwrap();
        fs::write(root.join("config/repo.toml"), r#"
            title = "Test KB"
            source = "../source"
            target = "../target"
            var = "../var"
            sort = "Published"
            ignored_keys = ["Published"]
        "#).unwrap();

        Repo { _tmp: tmp, root }
    }

    fn doc(&self, name: &str, title: &str, category: &str, published: &str, body: &str) {
        let header = format!(":Category: {category}\n:Published: {published}");
        self.doc_with(name, title, &header, body);
    }

    fn doc_with(&self, name: &str, title: &str, header: &str, body: &str) {
        let path = self.root.join("source").join(name);
        fs::write(&path, format!("= {title}\n{header}\n{EOH}\n\n{body}\n")).unwrap();
        filetime::set_file_mtime(&path, FileTime::from_unix_time(1_600_000_000, 0)).unwrap();
    }

    fn config(&self, force: bool) -> Config {
        let options = BuildOptions { force, workers: Some(2) };
        Config::load(self.root.join("config/repo.toml"), options).unwrap()
    }

    fn build_with(&self, compiler: Echo, force: bool) -> BuildReport {
        let pipeline = Pipeline::new(self.config(force)).unwrap();
        pipeline.compiler(Arc::new(compiler)).run().unwrap()
    }

    fn build(&self) -> BuildReport {
        self.build_with(Echo::default(), false)
    }

    fn build_failing(&self, page: &'static str, kind: ErrorKind) -> quire::Result<BuildReport> {
        let pipeline = Pipeline::new(self.config(false)).unwrap();
        let builder = Faulty { inner: StandardBuilder::new(pipeline.theme()), page, kind };
        pipeline.compiler(Arc::new(Echo::default())).builder(Box::new(builder)).run()
    }

    fn target(&self, page: &str) -> Option<String> {
        fs::read_to_string(self.root.join("target").join(page)).ok()
    }

    fn snapshot(&self) -> BTreeMap<PathBuf, Vec<u8>> {
        let target = self.root.join("target");
        jwalk::WalkDir::new(&target).sort(true).into_iter()
            .map(|entry| entry.unwrap().path())
            .filter(|path| path.is_file())
            .map(|path| (path.strip_prefix(&target).unwrap().to_path_buf(), fs::read(&path).unwrap()))
            .collect()
    }
}

fn two_documents() -> Repo {
    let repo = Repo::new();
    repo.doc("a.adoc", "A", "X", "2023-01-10", "Body of A.");
    repo.doc("b.adoc", "B", "Y", "10/02/2023", "Body of B.");
    repo
}

#[test]
fn incremental_builds() {
    let repo = two_documents();

    let first = repo.build();
    assert_eq!(first.documents, 2);
    assert_eq!((first.kept, first.compiled, first.failed), (0, 2, 0));
    assert_eq!((first.keys, first.pairs), (1, 2));
    assert_eq!(first.missing, 0);

    let key = repo.target("Category.html").unwrap();
    assert!(key.contains("Category_X.html") && key.contains("Category_Y.html"));
    assert!(repo.target("Category_X.html").unwrap().contains("a.html"));
    assert!(repo.target("Category_Y.html").unwrap().contains("b.html"));
    assert!(repo.target("Published.html").is_none());
    assert!(repo.target("a.html").unwrap().contains("Body of A."));
    assert!(repo.target("sources/a.adoc").is_some());
    assert!(repo.target("resources/themes/default/css/quire.css").is_some());

    // Newest first.
    let all = repo.target("all.html").unwrap();
    assert!(all.find("b.html").unwrap() < all.find("a.html").unwrap());

    let snapshot = repo.snapshot();
    let second = repo.build();
    assert_eq!((second.kept, second.compiled, second.failed), (2, 0, 0));
    assert_eq!((second.keys, second.pairs, second.jobs), (0, 0, 0));
    assert_eq!(repo.snapshot(), snapshot);

    repo.doc("a.adoc", "A", "X", "2023-01-10", "Edited body of A.");
    let third = repo.build();
    assert_eq!((third.kept, third.compiled, third.failed), (1, 1, 0));
    assert_eq!((third.keys, third.pairs), (0, 0));
    assert!(repo.target("a.html").unwrap().contains("Edited body of A."));

    let after = repo.snapshot();
    for page in ["Category.html", "Category_X.html", "Category_Y.html", "b.html"] {
        assert_eq!(after[Path::new(page)], snapshot[Path::new(page)], "{page}");
    }
}

#[test]
fn title_change_rebuilds_the_documents_keys() {
    let repo = two_documents();
    repo.build();

    repo.doc("a.adoc", "A renamed", "X", "2023-01-10", "Body of A.");
    let report = repo.build();
    assert_eq!(report.compiled, 1);
    assert_eq!((report.keys, report.pairs), (1, 2));
    assert!(repo.target("Category_X.html").unwrap().contains("A renamed"));
}

#[test]
fn new_keys_rebuild_everything() {
    let repo = two_documents();
    repo.build();

    let header = ":Category: X\n:Author: Z\n:Published: 2023-01-10";
    repo.doc_with("a.adoc", "A", header, "Body of A.");
    let report = repo.build();
    assert_eq!((report.kept, report.compiled, report.failed), (0, 2, 0));
    assert_eq!((report.keys, report.pairs), (2, 3));
    assert!(repo.target("Author_Z.html").unwrap().contains("a.html"));

    let report = repo.build();
    assert_eq!((report.kept, report.compiled), (2, 0));
    assert_eq!((report.keys, report.pairs, report.jobs), (0, 0, 0));
}

#[test]
fn post_processing_failures_are_counted() {
    let repo = two_documents();
    let report = repo.build_failing("a.html", ErrorKind::Compile).unwrap();
    assert_eq!((report.compiled, report.failed), (1, 1));
    assert!(repo.target("a.html").is_none());
    assert!(repo.target("b.html").is_some());

    let report = repo.build();
    assert_eq!((report.kept, report.compiled, report.failed), (1, 1, 0));
    assert!(repo.target("a.html").is_some());
}

#[test]
fn exhausted_resources_abort_the_build() {
    let repo = two_documents();
    let e = repo.build_failing("a.html", ErrorKind::Exhausted).unwrap_err();
    assert_eq!(e.kind(), ErrorKind::Exhausted);
    assert_eq!(e.kind().exit_code(), 12);
    assert!(repo.target("a.html").is_none());
}

#[test]
fn removed_documents_disappear() {
    let repo = two_documents();
    repo.build();

    fs::remove_file(repo.root.join("source/b.adoc")).unwrap();
    let report = repo.build();
    assert_eq!(report.documents, 1);
    assert!(repo.target("b.html").is_none());
    assert!(repo.target("Category_Y.html").is_none());
    assert!(repo.target("sources/b.adoc").is_none());
    assert!(!repo.config(false).layout.cache.join("b.html").exists());
    assert!(!repo.target("Category.html").unwrap().contains("Category_Y.html"));
}

#[test]
fn failed_jobs_are_excluded_and_retried() {
    let repo = two_documents();
    repo.doc("c.adoc", "C", "X", "2023-03-01", "Body of C.");

    let report = repo.build_with(Echo { fail: vec!["c.adoc"], panic: vec!["b.adoc"] }, false);
    assert_eq!((report.compiled, report.failed), (1, 2));
    assert!(repo.target("a.html").is_some());
    assert!(repo.target("b.html").is_none());
    assert!(repo.target("c.html").is_none());
    assert!(repo.target("Category_X.html").is_some());

    let report = repo.build();
    assert_eq!((report.kept, report.compiled, report.failed), (1, 2, 0));
    assert!(repo.target("b.html").is_some());
    assert!(repo.target("c.html").is_some());
}

#[test]
fn malformed_documents_are_skipped() {
    let repo = two_documents();
    fs::write(repo.root.join("source/empty.adoc"), "\n\n").unwrap();
    fs::write(repo.root.join("source/untitled.adoc"), "=\n:Category: X\n").unwrap();

    let report = repo.build();
    assert_eq!((report.documents, report.skipped, report.compiled), (2, 2, 2));
    assert!(repo.target("empty.html").is_none());
    assert!(!repo.target("Category_X.html").unwrap().contains("untitled"));
}

#[test]
fn missing_cached_pages_are_recompiled() {
    let repo = two_documents();
    repo.build();

    let cache = repo.config(false).layout.cache;
    fs::remove_file(cache.join("a.html")).unwrap();
    fs::remove_file(cache.join("Category_X.html")).unwrap();

    let report = repo.build();
    assert_eq!((report.kept, report.compiled), (1, 1));
    assert_eq!((report.keys, report.pairs), (1, 1));
    assert!(repo.target("a.html").is_some());
    assert!(repo.target("Category_X.html").is_some());
}

#[test]
fn force_recompiles_everything() {
    let repo = two_documents();
    repo.build();

    let report = repo.build_with(Echo::default(), true);
    assert_eq!((report.kept, report.compiled), (0, 2));
    assert_eq!((report.keys, report.pairs), (1, 2));
}

#[test]
fn corrupt_cache_means_a_full_build() {
    let repo = two_documents();
    repo.build();

    fs::write(repo.config(false).layout.db, "{ definitely not json").unwrap();
    let report = repo.build();
    assert_eq!((report.kept, report.compiled), (0, 2));
}

#[test]
fn configuration_errors_are_fatal() {
    let repo = Repo::new();
    fs::write(repo.root.join("config/repo.toml"), r#"
        title = "Test KB"
        source = "../source"
        target = "../source"
    "#).unwrap();

    let e = Config::load(repo.root.join("config/repo.toml"), BuildOptions::default()).unwrap_err();
    assert_eq!(e.kind(), ErrorKind::Config);

    fs::write(repo.root.join("config/repo.toml"), r#"
        title = "Test KB"
        source = "../source"
        target = "../target"
        var = "../var"
        theme = "no-such-theme"
    "#).unwrap();

    let config = Config::load(repo.root.join("config/repo.toml"), BuildOptions::default()).unwrap();
    let e = Pipeline::new(config).unwrap_err();
    assert_eq!(e.kind(), ErrorKind::Config);
    assert_eq!(e.kind().exit_code(), 2);
    assert!(!repo.root.join("var").exists());
}
