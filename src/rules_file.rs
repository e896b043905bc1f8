//! Rules File - serialized configuration source
//!
//! A rules file is a JSON document whose `rules` array is evaluated top to
//! bottom against a `ConfigurationBuilder`. Each directive names exactly one
//! verb (`compile`, `route`, `layout`, `passthrough`, `ignore`, `include`).

use serde::Deserialize;
use std::collections::HashMap;

use crate::builder::ConfigError;
use crate::pattern::PatternSource;
use crate::pipeline::{RuleContext, Site};
use crate::rule::{ActionRef, CallbackRef, FilterOptions, PreprocessorRef, Step};
use crate::BoxError;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RulesFile {
    #[serde(default)]
    pub engine_min_version: Option<String>,
    #[serde(default)]
    pub preprocess: Option<String>,
    #[serde(default)]
    pub rules: Vec<Directive>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Directive {
    #[serde(default)]
    pub compile: Option<PatternSource>,
    #[serde(default)]
    pub route: Option<PatternSource>,
    #[serde(default)]
    pub layout: Option<PatternSource>,
    #[serde(default)]
    pub passthrough: Option<PatternSource>,
    #[serde(default)]
    pub ignore: Option<PatternSource>,
    #[serde(default)]
    pub include: Option<String>,

    #[serde(default)]
    pub rep: Option<String>,
    #[serde(default)]
    pub snapshot: Option<String>,

    #[serde(default)]
    pub filter: Option<String>,
    #[serde(default)]
    pub options: Option<FilterOptions>,
    #[serde(default)]
    pub steps: Option<Vec<Step>>,
    #[serde(default)]
    pub call: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub identity: bool,
    #[serde(default)]
    pub noop: bool,
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum Verb<'a> {
    Compile(&'a PatternSource),
    Route(&'a PatternSource),
    Layout(&'a PatternSource),
    Passthrough(&'a PatternSource),
    Ignore(&'a PatternSource),
    Include(&'a str),
}

const ACTION_FIELDS: [&str; 7] = ["filter", "options", "steps", "call", "to", "identity", "noop"];

impl Verb<'_> {
    fn name(&self) -> &'static str {
        match self {
            Verb::Compile(_) => "compile",
            Verb::Route(_) => "route",
            Verb::Layout(_) => "layout",
            Verb::Passthrough(_) => "passthrough",
            Verb::Ignore(_) => "ignore",
            Verb::Include(_) => "include",
        }
    }

    /// Passthrough and ignore take action fields so the builder can report
    /// them as `UnexpectedAction`.
    fn accepts(&self, field: &str) -> bool {
        match self {
            Verb::Compile(_) | Verb::Passthrough(_) | Verb::Ignore(_) => {
                field == "rep" || ACTION_FIELDS.contains(&field)
            }
            Verb::Route(_) => field == "rep" || field == "snapshot" || ACTION_FIELDS.contains(&field),
            Verb::Layout(_) => field == "filter" || field == "options",
            Verb::Include(_) => false,
        }
    }
}

impl Directive {
    pub(crate) fn verb(&self) -> Result<Verb<'_>, String> {
        let mut verbs = vec![];
        if let Some(p) = &self.compile {
            verbs.push(Verb::Compile(p));
        }
        if let Some(p) = &self.route {
            verbs.push(Verb::Route(p));
        }
        if let Some(p) = &self.layout {
            verbs.push(Verb::Layout(p));
        }
        if let Some(p) = &self.passthrough {
            verbs.push(Verb::Passthrough(p));
        }
        if let Some(p) = &self.ignore {
            verbs.push(Verb::Ignore(p));
        }
        if let Some(name) = &self.include {
            verbs.push(Verb::Include(name));
        }
        let verb = match verbs.as_slice() {
            [verb] => *verb,
            [] => return Err("directive names no verb".to_string()),
            _ => return Err("directive names more than one verb".to_string()),
        };
        self.check_fields(verb)?;
        Ok(verb)
    }

    /// Reject fields the verb does not read.
    fn check_fields(&self, verb: Verb<'_>) -> Result<(), String> {
        if let Some(field) = self.present_fields().into_iter().find(|f| !verb.accepts(f)) {
            return Err(format!("{} directive does not accept `{}`", verb.name(), field));
        }
        if self.options.is_some() && self.filter.is_none() {
            return Err("`options` requires `filter`".to_string());
        }
        Ok(())
    }

    fn present_fields(&self) -> Vec<&'static str> {
        [
            ("rep", self.rep.is_some()),
            ("snapshot", self.snapshot.is_some()),
            ("filter", self.filter.is_some()),
            ("options", self.options.is_some()),
            ("steps", self.steps.is_some()),
            ("call", self.call.is_some()),
            ("to", self.to.is_some()),
            ("identity", self.identity),
            ("noop", self.noop),
        ]
        .into_iter()
        .filter_map(|(field, present)| present.then_some(field))
        .collect()
    }

    /// The action this directive specifies, if any.
    ///
    /// `filter` belongs to the action except on `layout` directives, where
    /// the caller reads it as the layout's filter instead.
    pub(crate) fn action(&self, callbacks: &CallbackRegistry) -> Result<Option<ActionRef>, ConfigError> {
        let mut actions = vec![];
        if let Some(name) = &self.filter {
            actions.push(ActionRef::filter_with(name.clone(), self.options.clone().unwrap_or_default()));
        }
        if let Some(steps) = &self.steps {
            actions.push(ActionRef::Steps(steps.clone()));
        }
        if let Some(name) = &self.call {
            actions.push(ActionRef::Custom(callbacks.callback(name)?));
        }
        if let Some(template) = &self.to {
            actions.push(ActionRef::RouteTo(template.clone()));
        }
        if self.identity {
            actions.push(ActionRef::IdentityRoute);
        }
        if self.noop {
            actions.push(ActionRef::Noop);
        }
        if actions.len() > 1 {
            return Err(ConfigError::InvalidDirective(
                "directive specifies more than one action".to_string(),
            ));
        }
        Ok(actions.pop())
    }
}

/// Host-provided callbacks that rules files refer to by name.
#[derive(Debug, Clone, Default)]
pub struct CallbackRegistry {
    callbacks: HashMap<String, CallbackRef>,
    preprocessors: HashMap<String, PreprocessorRef>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_callback<F>(&mut self, name: impl Into<String>, func: F)
    where
        F: Fn(&mut RuleContext<'_>) -> Result<Option<String>, BoxError> + Send + Sync + 'static,
    {
        let name = name.into();
        self.callbacks.insert(name.clone(), CallbackRef::new(name, func));
    }

    pub fn register_preprocessor<F>(&mut self, name: impl Into<String>, func: F)
    where
        F: Fn(&mut Site) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        let name = name.into();
        self.preprocessors.insert(name.clone(), PreprocessorRef::new(name, func));
    }

    pub fn callback(&self, name: &str) -> Result<CallbackRef, ConfigError> {
        self.callbacks
            .get(name)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownCallback(name.to_string()))
    }

    pub fn preprocessor(&self, name: &str) -> Result<PreprocessorRef, ConfigError> {
        self.preprocessors
            .get(name)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownCallback(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn directive(value: serde_json::Value) -> Directive {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_verb_must_be_unique() {
        assert!(matches!(directive(json!({"compile": "/*"})).verb(), Ok(Verb::Compile(_))));
        assert!(matches!(directive(json!({"include": "more"})).verb(), Ok(Verb::Include("more"))));
        assert!(directive(json!({"rep": "raw"})).verb().is_err());
        assert!(directive(json!({"compile": "/*", "route": "/*"})).verb().is_err());
    }

    #[test]
    fn test_fields_must_apply_to_verb() {
        let rejected = [
            json!({"compile": "/*", "options": {"toc": true}}),
            json!({"compile": "/*", "snapshot": "pre", "noop": true}),
            json!({"layout": "/default", "filter": "erb", "steps": []}),
            json!({"layout": "/default", "filter": "erb", "rep": "raw"}),
            json!({"include": "more", "rep": "raw"}),
            json!({"include": "more", "to": "/x"}),
            json!({"passthrough": "/*", "snapshot": "pre"}),
        ];
        for value in rejected {
            assert!(directive(value.clone()).verb().is_err(), "{}", value);
        }

        let accepted = [
            json!({"compile": "/*", "rep": "raw", "filter": "md", "options": {"toc": true}}),
            json!({"route": "/*", "rep": "raw", "snapshot": "pre", "to": "/x"}),
            json!({"layout": "/default", "filter": "erb", "options": {}}),
        ];
        for value in accepted {
            assert!(directive(value.clone()).verb().is_ok(), "{}", value);
        }
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let parsed: Result<Directive, _> = serde_json::from_value(json!({"compile": "/*", "fliter": "x"}));
        assert!(parsed.is_err());
    }

    #[test]
    fn test_action_variants() {
        let callbacks = CallbackRegistry::new();
        let d = directive(json!({"compile": "/*", "filter": "md", "options": {"toc": true}}));
        assert!(matches!(
            d.action(&callbacks).unwrap(),
            Some(ActionRef::NamedFilter { name, options }) if name == "md" && options["toc"] == json!(true)
        ));
        assert!(directive(json!({"compile": "/*"})).action(&callbacks).unwrap().is_none());
        assert!(matches!(
            directive(json!({"route": "/*", "identity": true})).action(&callbacks).unwrap(),
            Some(ActionRef::IdentityRoute)
        ));
        assert!(matches!(
            directive(json!({"route": "/*", "to": "/x", "identity": true})).action(&callbacks),
            Err(ConfigError::InvalidDirective(_))
        ));
    }

    #[test]
    fn test_unknown_callback() {
        let mut callbacks = CallbackRegistry::new();
        callbacks.register_callback("known", |_ctx| Ok(None));
        let known = directive(json!({"compile": "/*", "call": "known"}));
        assert!(matches!(known.action(&callbacks).unwrap(), Some(ActionRef::Custom(cb)) if cb.name() == "known"));
        let unknown = directive(json!({"compile": "/*", "call": "nope"}));
        assert!(matches!(unknown.action(&callbacks), Err(ConfigError::UnknownCallback(name)) if name == "nope"));
    }
}
