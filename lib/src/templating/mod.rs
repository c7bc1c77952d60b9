pub mod minijinja;

use std::fmt::Debug;
use std::path::PathBuf;

use serde::Serialize;
use serde_json::Value;

use crate::error::Result;

pub trait EngineInit {
    type Engine: Engine + 'static;

    /// Creates an engine that looks templates up in `dirs`, in order, before
    /// falling back to the built-in templates. `globals` is visible to every
    /// template as `G`.
    fn init<G: Serialize>(dirs: Vec<PathBuf>, globals: G) -> Self::Engine;
}

pub trait Engine: Send + Sync + Debug {
    fn render(&self, name: &str, vars: &Value) -> Result<String>;

    fn render_str(&self, name: Option<&str>, template: &str, vars: &Value) -> Result<String>;

    fn has_template(&self, name: &str) -> bool;
}
