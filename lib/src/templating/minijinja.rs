use std::path::PathBuf;

use minijinja::{Environment, Error as TemplateError, ErrorKind};
use minijinja::value::Value as TemplateValue;
use serde::Serialize;
use serde_json::Value;

use crate::error::{Result, Chainable};
use crate::templating::{Engine, EngineInit};
use crate::theme::builtin;

#[derive(Debug)]
pub struct MiniJinjaEngine {
    env: Result<Environment<'static>>,
}

fn load(dirs: &[PathBuf], name: &str) -> Result<Option<String>, TemplateError> {
    if name.split(['/', '\\']).any(|segment| segment == "..") {
        return Ok(None);
    }

    for dir in dirs {
        let path = dir.join(name);
        match std::fs::read_to_string(&path) {
            Ok(source) => return Ok(Some(source)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(TemplateError::new(
                ErrorKind::InvalidOperation,
                format!("failed to read template {}", path.display())
            ).with_source(e)),
        }
    }

    Ok(builtin::template(name).map(String::from))
}

fn try_init<G: Serialize>(dirs: Vec<PathBuf>, globals: G) -> Result<Environment<'static>> {
    let mut env = Environment::new();
    env.set_loader(move |name| load(&dirs, name));
    env.add_global("G", TemplateValue::from_serialize(&globals));
    env.add_filter("vf", ext::vf);
    env.add_filter("page", ext::page);
    env.add_filter("date", ext::date);
    env.add_filter("htmlname", ext::htmlname);
    Ok(env)
}

impl EngineInit for MiniJinjaEngine {
    type Engine = Self;

    fn init<G: Serialize>(dirs: Vec<PathBuf>, globals: G) -> Self::Engine {
        MiniJinjaEngine { env: try_init(dirs, globals) }
    }
}

impl Engine for MiniJinjaEngine {
    fn render(&self, name: &str, vars: &Value) -> Result<String> {
        let env = self.env.as_ref().map_err(|e| e.clone())?;
        let template = env.get_template(name)
            .chain_with(|| error!("failed to load template", "name" => name))?;

        template.render(vars).chain_with(|| error!("failed to render template", "name" => name))
    }

    fn render_str(&self, name: Option<&str>, template: &str, vars: &Value) -> Result<String> {
        let env = self.env.as_ref().map_err(|e| e.clone())?;
        let string = match name {
            Some(name) => env.render_named_str(name, template, vars)?,
            None => env.render_str(template, vars)?,
        };

        Ok(string)
    }

    fn has_template(&self, name: &str) -> bool {
        self.env.as_ref().map_or(false, |env| env.get_template(name).is_ok())
    }
}

mod ext {
    use minijinja::{Error, ErrorKind};

    use crate::datetime::guess_datetime;
    use crate::util::{html_name, valid_filename};

    pub fn vf(value: &str) -> String {
        valid_filename(value)
    }

    /// `key|page` is the page of a key, `key|page(value)` the page of a
    /// key/value pair.
    pub fn page(key: &str, value: Option<&str>) -> String {
        match value {
            Some(value) => format!("{}_{}.html", valid_filename(key), valid_filename(value)),
            None => format!("{}.html", valid_filename(key)),
        }
    }

    pub fn htmlname(doc: &str) -> String {
        html_name(doc)
    }

    pub fn date(value: &str, fmt: Option<&str>) -> Result<String, Error> {
        let datetime = guess_datetime(value).ok_or_else(|| Error::new(
            ErrorKind::InvalidOperation,
            format!("`date` could not parse {value:?}")
        ))?;

        Ok(datetime.format(fmt.unwrap_or("%Y-%m-%d")).to_string())
    }
}

#[cfg(test)]
mod minijinja_tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn renders_builtin_and_overrides() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("value.adoc"), "= {{ key }}: {{ value }}").unwrap();

        let engine = MiniJinjaEngine::init(vec![tmp.path().to_path_buf()], json!({"title": "KB"}));
        let out = engine.render("value.adoc", &json!({"key": "Tag", "value": "rust"})).unwrap();
        assert_eq!(out, "= Tag: rust");

        assert!(engine.has_template("key.adoc"));
        assert!(!engine.has_template("nope.adoc"));
        assert!(!engine.has_template("../secret"));
        assert!(engine.render("nope.adoc", &json!({})).is_err());
    }

    #[test]
    fn filters() {
        let engine = MiniJinjaEngine::init(vec![], json!({"title": "KB"}));
        let vars = json!({"k": "My Key", "v": "a/b", "d": "05/04/2023"});
        let out = engine.render_str(None, "{{ k|page }} {{ k|page(v) }} {{ d|date }} {{ G.title }}", &vars);
        assert_eq!(out.unwrap(), "My_Key.html My_Key_ab.html 2023-04-05 KB");

        let out = engine.render_str(None, "{{ 'a.adoc'|htmlname }} {{ 'x y'|vf }}", &vars);
        assert_eq!(out.unwrap(), "a.html x_y");
        assert!(engine.render_str(None, "{{ 'never'|date }}", &vars).is_err());
    }
}
