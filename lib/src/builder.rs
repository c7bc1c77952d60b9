//! Page builders: the seam through which a theme shapes the site.
//!
//! The build calls into a [`PageBuilder`] at fixed points. It can generate
//! extra sources before discovery, supply the metadata section injected
//! into each staged document, produce key and key/value pages, add extra
//! pages, and post-process every compiled page.

use std::path::Path;

use rustc_hash::FxHashMap;
use serde_json::{json, Value};

use crate::cache::CacheStore;
use crate::config::Config;
use crate::error::{ErrorKind, Result, Chainable};
use crate::extract::{extract, TITLE};
use crate::index::DocumentIndex;
use crate::templating::Engine;
use crate::theme::Theme;
use crate::stage::Stage;
use crate::datetime::format_timestamp;
use crate::util::{adoc_name, file_name, html_name, valid_filename};

/// What a page builder may see and touch during a build.
pub struct Context<'a> {
    pub config: &'a Config,
    pub theme: &'a Theme,
    pub index: &'a DocumentIndex,
    pub cache: &'a CacheStore,
    pub engine: &'a dyn Engine,
    pub stage: &'a mut Stage,
}

impl Context<'_> {
    pub fn render(&self, template: &str, vars: &Value) -> Result<String> {
        self.engine.render(template, vars)
    }

    /// The document's timestamp formatted for display, if it has one.
    pub fn timestamp(&self, doc: &str) -> Option<String> {
        self.index.get_doc_timestamp(doc).map(|ts| format_timestamp(&ts))
    }

    /// Template variables describing `docs`, in the given order.
    pub fn doc_list(&self, docs: &[&str]) -> Vec<Value> {
        docs.iter().map(|doc| json!({
            "doc": doc,
            "title": self.index.get_title(doc).unwrap_or(doc),
            "page": html_name(doc),
            "timestamp": self.timestamp(doc),
        })).collect()
    }
}

pub fn key_page(key: &str) -> String {
    format!("{}.adoc", valid_filename(key))
}

pub fn key_value_page(key: &str, value: &str) -> String {
    format!("{}_{}.adoc", valid_filename(key), valid_filename(value))
}

pub trait PageBuilder: Send {
    /// Runs before source discovery. Documents written with
    /// [`Stage::distribute_to_source()`] are discovered like any other.
    fn generate_sources(&mut self, _ctx: &mut Context<'_>) -> Result<()> {
        Ok(())
    }

    /// The text that replaces the end-of-header line of `doc` when it is
    /// staged for compilation.
    fn metadata_section(&mut self, ctx: &Context<'_>, doc: &str) -> Result<String>;

    /// Stages the page listing the values of `key`.
    fn build_page_key(&mut self, ctx: &mut Context<'_>, key: &str, values: &[&str]) -> Result<()>;

    /// Stages the page listing the documents carrying `key`/`value`. `docs`
    /// is ordered most recent first.
    fn build_page_key_value(
        &mut self,
        ctx: &mut Context<'_>,
        key: &str,
        value: &str,
        docs: &[&str],
    ) -> Result<()>;

    /// Stages any extra pages of the theme.
    fn build(&mut self, ctx: &mut Context<'_>) -> Result<()>;

    /// Post-processes a freshly compiled page in place.
    fn build_page(&mut self, ctx: &Context<'_>, page: &Path) -> Result<()>;
}

/// Splits the compiler's table of contents out of `html`. Returns the list
/// markup of the table and the remaining body.
pub fn split_toc(html: &str) -> (Option<String>, String) {
    const START: &str = "<div id=\"toc\"";
    const END: &str = "</ul>\n</div>";

    let Some(start) = html.find(START) else {
        return (None, html.to_string());
    };

    let Some(end) = html[start..].find(END).map(|i| start + i + END.len()) else {
        return (None, html.to_string());
    };

    let block = &html[start..end];
    let toc = block.find("<ul").map(|i| block[i..block.len() - "\n</div>".len()].to_string());
    let body = format!("{}{}", &html[..start], html[end..].trim_start_matches('\n'));
    (toc, body)
}

fn exhausted_or(e: std::io::Error, kind: ErrorKind) -> crate::error::Error {
    let kind = match e.kind() {
        std::io::ErrorKind::OutOfMemory => ErrorKind::Exhausted,
        _ => kind,
    };

    crate::error::Error::from(e).with_kind(kind)
}

/// Renders every page from the theme's templates.
#[derive(Debug, Default)]
pub struct StandardBuilder {
    /// Extra pages staged by [`PageBuilder::build()`], by id.
    apps: Vec<String>,
}

impl StandardBuilder {
    pub fn new(theme: &Theme) -> Self {
        StandardBuilder { apps: theme.manifest.apps.iter().map(|a| a.id.clone()).collect() }
    }

    fn page_title(&self, ctx: &Context<'_>, page: &Path) -> String {
        let doc = adoc_name(&file_name(page));
        if let Some(title) = ctx.index.get_title(&doc) {
            return title.to_string();
        }

        std::fs::read_to_string(ctx.stage.path().join(&doc)).ok()
            .and_then(|text| extract(&text).ok())
            .map(|header| header.title)
            .unwrap_or(doc)
    }
}

impl PageBuilder for StandardBuilder {
    fn metadata_section(&mut self, ctx: &Context<'_>, doc: &str) -> Result<String> {
        let keys: Vec<Value> = ctx.index.get_doc_keys(doc).into_iter()
            .filter(|key| *key != TITLE && !ctx.index.is_ignored(key))
            .map(|key| json!({ "key": key, "values": ctx.index.get_values(doc, key) }))
            .collect();

        ctx.render("metadata.adoc", &json!({ "doc": doc, "keys": keys }))
    }

    fn build_page_key(&mut self, ctx: &mut Context<'_>, key: &str, values: &[&str]) -> Result<()> {
        let values: Vec<Value> = values.iter()
            .map(|value| json!({
                "value": value,
                "count": ctx.index.get_docs_by_key_value(key, value).len(),
            }))
            .collect();

        let page = ctx.render("key.adoc", &json!({ "key": key, "values": values }))?;
        ctx.stage.distribute(&key_page(key), &page)
    }

    fn build_page_key_value(
        &mut self,
        ctx: &mut Context<'_>,
        key: &str,
        value: &str,
        docs: &[&str],
    ) -> Result<()> {
        let vars = json!({ "key": key, "value": value, "docs": ctx.doc_list(docs) });
        let page = ctx.render("value.adoc", &vars)?;
        ctx.stage.distribute(&key_value_page(key, value), &page)
    }

    fn build(&mut self, ctx: &mut Context<'_>) -> Result<()> {
        let docs = ctx.index.sort_by_date(ctx.index.documents());
        let keys: Vec<Value> = ctx.index.get_all_keys().into_iter()
            .map(|key| json!({ "key": key, "count": ctx.index.get_all_values_for_key(key).len() }))
            .collect();

        let values: usize = ctx.index.get_all_keys().iter()
            .map(|key| ctx.index.get_all_values_for_key(key).len())
            .sum();

        let stats = json!({ "documents": docs.len(), "keys": keys.len(), "values": values });
        let vars = json!({ "docs": ctx.doc_list(&docs), "keys": keys, "stats": stats });

        for app in &self.apps {
            let template = format!("{app}.adoc");
            if !ctx.engine.has_template(&template) {
                tracing::warn!(theme = ctx.theme.id(), app = %app, "theme app has no template");
                continue;
            }

            let page = ctx.render(&template, &vars)?;
            ctx.stage.distribute(&template, &page)?;
        }

        Ok(())
    }

    fn build_page(&mut self, ctx: &Context<'_>, page: &Path) -> Result<()> {
        let html = std::fs::read_to_string(page)
            .map_err(|e| exhausted_or(e, ErrorKind::Compile))
            .chain_with(|| error!("failed to read compiled page", "page" => page.display()))?;

        let (toc, body) = split_toc(&html);
        let vars = json!({
            "title": self.page_title(ctx, page),
            "page": file_name(page),
            "toc": toc,
            "body": body,
        });

        let wrapped = ctx.render("page.html", &vars)?;
        std::fs::write(page, wrapped)
            .map_err(|e| exhausted_or(e, ErrorKind::Compile))
            .chain_with(|| error!("failed to write page", "page" => page.display()))
    }
}

fn standard(theme: &Theme) -> Box<dyn PageBuilder> {
    Box::new(StandardBuilder::new(theme))
}

/// Creates the page builder of a theme.
pub type BuilderFactory = fn(&Theme) -> Box<dyn PageBuilder>;

/// Maps theme ids to page builders. Themes without a registered builder use
/// [`StandardBuilder`] with their own templates.
#[derive(Clone)]
pub struct Registry {
    factories: FxHashMap<String, BuilderFactory>,
}

impl Default for Registry {
    fn default() -> Self {
        let mut registry = Registry { factories: FxHashMap::default() };
        registry.register(crate::theme::builtin::ID, standard);
        registry
    }
}

impl Registry {
    pub fn register<S: Into<String>>(&mut self, id: S, factory: BuilderFactory) {
        self.factories.insert(id.into(), factory);
    }

    pub fn create(&self, theme: &Theme) -> Box<dyn PageBuilder> {
        match self.factories.get(theme.id()) {
            Some(factory) => factory(theme),
            None => standard(theme),
        }
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.factories.keys()).finish()
    }
}
