//! Filter boundary - named text transformations supplied by the host

use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::entity::ContentEntity;
use crate::rule::FilterOptions;
use crate::BoxError;

#[derive(Debug, Error)]
pub enum FilterError {
    #[error("Unknown filter: {name}")]
    Unknown { name: String },

    #[error("Filter {name} failed: {source}")]
    Failed {
        name: String,
        #[source]
        source: BoxError,
    },
}

/// What a filter may look at besides its input text.
#[derive(Debug, Clone, Copy)]
pub struct FilterContext<'a> {
    pub item: &'a ContentEntity,
    pub items: &'a [ContentEntity],
    pub layout: Option<&'a ContentEntity>,
    pub rep: &'a str,
}

pub trait Filter: Send + Sync {
    fn run(
        &self,
        input: &str,
        options: &FilterOptions,
        ctx: &FilterContext<'_>,
    ) -> Result<String, BoxError>;
}

impl<F> Filter for F
where
    F: Fn(&str, &FilterOptions, &FilterContext<'_>) -> Result<String, BoxError> + Send + Sync,
{
    fn run(
        &self,
        input: &str,
        options: &FilterOptions,
        ctx: &FilterContext<'_>,
    ) -> Result<String, BoxError> {
        self(input, options, ctx)
    }
}

/// Filter registry - resolves filter names at compile time
#[derive(Clone, Default)]
pub struct FilterRegistry {
    filters: HashMap<String, Arc<dyn Filter>>,
}

impl FilterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, filter: impl Filter + 'static) {
        self.filters.insert(name.into(), Arc::new(filter));
    }

    pub fn register_fn<F>(&mut self, name: impl Into<String>, func: F)
    where
        F: Fn(&str, &FilterOptions, &FilterContext<'_>) -> Result<String, BoxError> + Send + Sync + 'static,
    {
        self.register(name, func);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.filters.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.filters.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Failures are wrapped with the filter name and returned as is, never retried.
    pub fn invoke(
        &self,
        name: &str,
        options: &FilterOptions,
        input: &str,
        ctx: &FilterContext<'_>,
    ) -> Result<String, FilterError> {
        let filter = self
            .filters
            .get(name)
            .ok_or_else(|| FilterError::Unknown { name: name.to_string() })?;
        filter.run(input, options, ctx).map_err(|source| FilterError::Failed {
            name: name.to_string(),
            source,
        })
    }
}

impl std::fmt::Debug for FilterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterRegistry").field("filters", &self.names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Attributes;

    #[test]
    fn test_invoke_runs_registered_filter() {
        let mut registry = FilterRegistry::new();
        registry.register_fn("upcase", |input, _, _| Ok(input.to_uppercase()));
        let item = ContentEntity::item("hi", Attributes::new(), "/a");
        let ctx = FilterContext { item: &item, items: &[], layout: None, rep: "default" };
        let out = registry.invoke("upcase", &FilterOptions::new(), "hi", &ctx).unwrap();
        assert_eq!(out, "HI");
    }

    #[test]
    fn test_failure_carries_filter_name() {
        let mut registry = FilterRegistry::new();
        registry.register_fn("broken", |_, _, _| Err("syntax error on line 3".into()));
        let item = ContentEntity::item("", Attributes::new(), "/a");
        let ctx = FilterContext { item: &item, items: &[], layout: None, rep: "default" };

        let err = registry.invoke("broken", &FilterOptions::new(), "", &ctx).unwrap_err();
        assert!(matches!(&err, FilterError::Failed { name, .. } if name == "broken"));
        assert!(err.to_string().contains("syntax error on line 3"));

        let err = registry.invoke("missing", &FilterOptions::new(), "", &ctx).unwrap_err();
        assert!(matches!(err, FilterError::Unknown { .. }));
    }
}
