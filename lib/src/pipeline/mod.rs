//! The build orchestrator.
//!
//! A [`Pipeline`] owns every collaborator of one build and runs its stages in
//! order. Only [fatal](crate::error::ErrorKind::is_fatal) errors leave
//! [`Pipeline::run()`]; anything else is logged where it happens and counted
//! in the [`BuildReport`].

/// Borrows the disjoint parts of a pipeline as a builder [`Context`].
macro_rules! context {
    ($self:ident) => ($crate::builder::Context {
        config: &$self.config,
        theme: &$self.theme,
        index: &$self.index,
        cache: &$self.cache,
        engine: &*$self.engine,
        stage: &mut $self.stage,
    })
}

mod preprocess;
mod plan;
mod compile;

pub use plan::{Collision, Plan, KeyPlan, ValuePlan};

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;

use crate::builder::{PageBuilder, Registry};
use crate::cache::CacheStore;
use crate::compiler::{Compiler, ShellCompiler};
use crate::config::Config;
use crate::deploy;
use crate::error::{ErrorKind, Result, Chainable};
use crate::index::DocumentIndex;
use crate::stage::Stage;
use crate::templating::{Engine, EngineInit, minijinja::MiniJinjaEngine};
use crate::theme::{Theme, ThemeSearch};
use crate::util::{cmp_ci, fs::list_files};

/// What a build did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BuildReport {
    /// Documents indexed.
    pub documents: usize,
    /// Documents skipped for a malformed header or an unreadable file.
    pub skipped: usize,
    /// Documents carried forward from the previous build.
    pub kept: usize,
    /// Documents compiled and post-processed successfully.
    pub compiled: usize,
    /// Pages that failed to compile or post-process.
    pub failed: usize,
    /// Key pages rebuilt.
    pub keys: usize,
    /// Key/value pages rebuilt.
    pub pairs: usize,
    /// Compile jobs run.
    pub jobs: usize,
    /// Pages copied into the target.
    pub published: usize,
    /// Target pages with no compiled HTML to publish.
    pub missing: usize,
    pub elapsed: Duration,
}

/// Passes fatal errors through. Anything else is logged and becomes `None`.
fn tolerate<T>(result: Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_fatal() => Err(e),
        Err(e) => {
            tracing::error!("{e}");
            Ok(None)
        }
    }
}

#[derive(derive_more::Debug)]
pub struct Pipeline {
    config: Config,
    theme: Theme,
    #[debug(ignore)]
    builder: Box<dyn PageBuilder>,
    compiler: Arc<dyn Compiler>,
    engine: Arc<dyn Engine>,
    index: DocumentIndex,
    cache: CacheStore,
    stage: Stage,
    report: BuildReport,
}

#[cfg(test)] static_assertions::assert_impl_all!(Pipeline: Send);
#[cfg(test)] static_assertions::assert_impl_all!(crate::compiler::Outcome: Send);

impl Pipeline {
    /// Prepares a build of `config`: resolves the theme, creates the state
    /// directories, loads the previous cache generation and opens a fresh
    /// scratch directory. Nothing is written when the theme is unknown.
    pub fn new(config: Config) -> Result<Pipeline> {
        let search = ThemeSearch::new(Some(&config.source), &config.repo.theme_paths);
        let theme = search.find(config.theme())?;
        tracing::debug!(theme = %theme, "resolved theme");

        config.layout.create()?;

        let mut index = DocumentIndex::new(config.repo.sort.clone());
        for key in config.repo.ignored_keys.iter().chain(&theme.manifest.ignored_keys) {
            index.ignore_key(key.clone());
        }

        let cache = CacheStore::load(&config.layout.db, config.force);
        let stage = Stage::new(&config.layout.tmp, &config.source, &config.layout.dist)?;

        let globals = json!({
            "title": config.repo.title,
            "tagline": config.repo.tagline,
            "theme": theme.id(),
            "events": config.repo.events,
        });

        let engine = Arc::new(MiniJinjaEngine::init(theme.template_dirs(), globals));
        let compiler = Arc::new(ShellCompiler::new(&config.repo.compiler, config.timeout));
        let builder = Registry::default().create(&theme);

        Ok(Pipeline {
            config,
            theme,
            builder,
            compiler,
            engine,
            index,
            cache,
            stage,
            report: BuildReport::default(),
        })
    }

    /// Replaces the compiler that runs jobs.
    pub fn compiler(mut self, compiler: Arc<dyn Compiler>) -> Self {
        self.compiler = compiler;
        self
    }

    /// Replaces the page builder.
    pub fn builder(mut self, builder: Box<dyn PageBuilder>) -> Self {
        self.builder = builder;
        self
    }

    /// Picks the page builder of the theme from `registry`.
    pub fn registry(self, registry: &Registry) -> Self {
        let builder = registry.create(&self.theme);
        self.builder(builder)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn theme(&self) -> &Theme {
        &self.theme
    }

    /// Runs the build. The scratch directory and generated sources are
    /// removed whether or not the build succeeds.
    pub fn run(mut self) -> Result<BuildReport> {
        let start = Instant::now();
        tracing::info!(
            source = %self.config.source.display(),
            target = %self.config.target.display(),
            theme = self.theme.id(),
            workers = self.config.workers,
            force = self.config.force,
            "building repository"
        );

        let result = self.stages();
        let Pipeline { stage, mut report, .. } = self;
        if let Err(e) = stage.cleanup() {
            tracing::warn!("{e}");
        }

        result?;
        report.elapsed = start.elapsed();
        tracing::info!(
            documents = report.documents,
            skipped = report.skipped,
            keys = report.keys,
            pairs = report.pairs,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "documents kept/compiled/failed: {}/{}/{}",
            report.kept, report.compiled, report.failed
        );

        Ok(report)
    }

    fn stages(&mut self) -> Result<()> {
        let sources = crate::time!("discover" => self.discover())?;
        crate::time!("preprocess" => self.preprocess(&sources))?;

        let plan = crate::time!("plan" => Plan::new(&self.index, &self.cache, &self.config.layout.cache));
        crate::time!("generate" => self.generate(&plan))?;
        crate::time!("compile" => self.compile())?;
        crate::time!("publish" => self.publish())
    }

    /// Lets the page builder generate sources, then lists the source
    /// directory.
    fn discover(&mut self) -> Result<Vec<PathBuf>> {
        let generated = self.builder.generate_sources(&mut context!(self));
        tolerate(generated.chain_with(|| error!("failed to generate sources")))?;

        let mut sources = list_files(&self.config.source, "adoc")
            .chain_with(|| error!("failed to list sources", "source" => self.config.source.display()))
            .kind(ErrorKind::Config)?;

        sources.sort_by(|a, b| cmp_ci(&a.to_string_lossy(), &b.to_string_lossy()));
        tracing::debug!(sources = sources.len(), "discovered sources");
        Ok(sources)
    }

    fn publish(&mut self) -> Result<()> {
        let published = deploy::publish(&self.config, &self.theme, &self.stage)
            .chain_with(|| error!("failed to publish", "target" => self.config.target.display()));

        if let Some(published) = tolerate(published.kind(ErrorKind::Publish))? {
            self.report.published = published.pages;
            self.report.missing = published.missing;
        }

        Ok(())
    }
}
