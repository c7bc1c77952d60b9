use std::collections::BTreeMap;
use std::path::Path;

use crate::builder::{key_page, key_value_page};
use crate::cache::CacheStore;
use crate::error::{Result, Chainable};
use crate::index::DocumentIndex;
use crate::util::html_name;

use super::{tolerate, Pipeline};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValuePlan {
    pub value: String,
    pub compile: bool,
    /// Documents carrying the value, most recent first.
    pub docs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPlan {
    pub key: String,
    pub compile: bool,
    pub values: Vec<ValuePlan>,
}

/// Two values of one key whose key/value pages have the same file name. The
/// page of the later value overwrites the earlier one's.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collision {
    pub key: String,
    pub page: String,
    pub first: String,
    pub second: String,
}

/// Which aggregate pages a build rebuilds.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Plan {
    pub keys: Vec<KeyPlan>,
    pub collisions: Vec<Collision>,
}

impl Plan {
    /// Decides every key and key/value page of `index`. A page is rebuilt
    /// when the cache says so or when its compiled HTML is missing from
    /// `compiled`. A key page is also rebuilt when any of its key/value
    /// pages is.
    pub fn new(index: &DocumentIndex, cache: &CacheStore, compiled: &Path) -> Plan {
        let missing = |page: &str| !compiled.join(html_name(page)).is_file();

        let mut plan = Plan::default();
        for key in index.get_all_keys() {
            let mut pages: BTreeMap<String, &str> = BTreeMap::new();
            let mut values = vec![];
            for value in index.get_all_values_for_key(key) {
                let page = key_value_page(key, value);
                if let Some(first) = pages.insert(page.clone(), value) {
                    plan.collisions.push(Collision {
                        key: key.to_string(),
                        page: page.clone(),
                        first: first.to_string(),
                        second: value.to_string(),
                    });
                }

                values.push(ValuePlan {
                    value: value.to_string(),
                    compile: cache.value_compile_decision(key, value) || missing(&page),
                    docs: index.get_docs_by_key_value(key, value).into_iter().map(String::from).collect(),
                });
            }

            let compile = cache.key_compile_decision(key)
                || values.iter().any(|v| v.compile)
                || missing(&key_page(key));

            plan.keys.push(KeyPlan { key: key.to_string(), compile, values });
        }

        plan
    }

    pub fn keys_to_build(&self) -> impl Iterator<Item = &KeyPlan> {
        self.keys.iter().filter(|k| k.compile)
    }

    pub fn values_to_build(&self) -> impl Iterator<Item = (&KeyPlan, &ValuePlan)> {
        self.keys.iter().flat_map(|k| k.values.iter().filter(|v| v.compile).map(move |v| (k, v)))
    }
}

impl Pipeline {
    /// Registers every aggregate page as a target and has the page builder
    /// stage the ones `plan` rebuilds, then the theme's extra pages.
    pub(super) fn generate(&mut self, plan: &Plan) -> Result<()> {
        for c in &plan.collisions {
            tracing::warn!(key = %c.key, page = %c.page, "values {:?} and {:?} share a page", c.first, c.second);
        }

        for key in &plan.keys {
            self.stage.add_target(html_name(&key_page(&key.key)));
            for value in &key.values {
                self.stage.add_target(html_name(&key_value_page(&key.key, &value.value)));
            }
        }

        for (key, value) in plan.values_to_build() {
            let docs: Vec<&str> = value.docs.iter().map(String::as_str).collect();
            let built = self.builder
                .build_page_key_value(&mut context!(self), &key.key, &value.value, &docs)
                .chain_with(|| error! {
                    "failed to build key/value page",
                    "key" => &key.key,
                    "value" => &value.value,
                });

            if tolerate(built)?.is_some() {
                self.report.pairs += 1;
            }
        }

        for key in plan.keys_to_build() {
            let values: Vec<&str> = key.values.iter().map(|v| v.value.as_str()).collect();
            let built = self.builder
                .build_page_key(&mut context!(self), &key.key, &values)
                .chain_with(|| error!("failed to build key page", "key" => &key.key));

            if tolerate(built)?.is_some() {
                self.report.keys += 1;
            }
        }

        let built = self.builder.build(&mut context!(self));
        tolerate(built.chain_with(|| error!("failed to build theme pages", "theme" => self.theme.id())))?;
        tracing::debug!(keys = self.report.keys, pairs = self.report.pairs, "staged aggregate pages");
        Ok(())
    }
}
