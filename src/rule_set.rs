//! Rule Set - ordered, first-match-wins rule lookup
//!
//! Rules are tried in registration order and the first match wins, so authors
//! register specific rules before general fallbacks. A rule set is mutable
//! only until sealed; afterwards it is read-only and shared across workers.

use serde::Serialize;
use tracing::debug;

use crate::builder::ConfigError;
use crate::identifier::Identifier;
use crate::pattern::{Pattern, PatternSource};
use crate::rule::{FilterOptions, PreprocessorRef, Rule, RuleDescriptor, LAST_SNAPSHOT};

#[derive(Debug, Clone)]
struct LayoutFilter {
    pattern: Pattern,
    filter_name: String,
    options: FilterOptions,
}

#[derive(Debug, Default)]
pub struct RuleSet {
    compilation_rules: Vec<Rule>,
    routing_rules: Vec<Rule>,
    layout_filters: Vec<LayoutFilter>,
    preprocessor: Option<PreprocessorRef>,
    sealed: bool,
}

/// Serializable snapshot of a whole rule set.
#[derive(Debug, Serialize)]
pub struct RuleSetSummary {
    pub preprocessor: Option<String>,
    pub compile: Vec<RuleDescriptor>,
    pub route: Vec<RuleDescriptor>,
    pub layout: Vec<LayoutFilterSummary>,
}

#[derive(Debug, Serialize)]
pub struct LayoutFilterSummary {
    pub pattern: PatternSource,
    pub filter: String,
    pub options: FilterOptions,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_compilation_rule(&mut self, rule: Rule) -> Result<(), ConfigError> {
        self.ensure_open()?;
        debug!(pattern = rule.pattern().source().as_str(), rep = rule.rep_name(), "compilation rule added");
        self.compilation_rules.push(rule);
        Ok(())
    }

    pub fn add_routing_rule(&mut self, rule: Rule) -> Result<(), ConfigError> {
        self.ensure_open()?;
        debug!(
            pattern = rule.pattern().source().as_str(),
            rep = rule.rep_name(),
            snapshot = rule.snapshot_name().unwrap_or(LAST_SNAPSHOT),
            "routing rule added"
        );
        self.routing_rules.push(rule);
        Ok(())
    }

    /// Equal pattern sources are not deduplicated; the earlier entry keeps winning.
    pub fn add_layout_filter(
        &mut self,
        pattern: Pattern,
        filter_name: impl Into<String>,
        options: FilterOptions,
    ) -> Result<(), ConfigError> {
        self.ensure_open()?;
        let filter_name = filter_name.into();
        debug!(pattern = pattern.source().as_str(), filter = %filter_name, "layout filter added");
        self.layout_filters.push(LayoutFilter { pattern, filter_name, options });
        Ok(())
    }

    /// Last write wins.
    pub fn set_preprocessor(&mut self, preprocessor: PreprocessorRef) -> Result<(), ConfigError> {
        self.ensure_open()?;
        if let Some(previous) = &self.preprocessor {
            debug!(previous = previous.name(), replacement = preprocessor.name(), "preprocessor replaced");
        }
        self.preprocessor = Some(preprocessor);
        Ok(())
    }

    pub fn compilation_rule_for(&self, identifier: &Identifier, rep_name: &str) -> Option<&Rule> {
        self.compilation_rules
            .iter()
            .find(|r| r.matches(identifier, rep_name))
    }

    /// `snapshot_name` is compared literally; resolving `last` is the caller's job.
    pub fn routing_rule_for(
        &self,
        identifier: &Identifier,
        rep_name: &str,
        snapshot_name: &str,
    ) -> Option<&Rule> {
        self.routing_rules
            .iter()
            .find(|r| r.matches_snapshot(identifier, rep_name, snapshot_name))
    }

    pub fn filter_for_layout(&self, identifier: &Identifier) -> Option<(&str, &FilterOptions)> {
        self.layout_filters
            .iter()
            .find(|lf| lf.pattern.matches(identifier))
            .map(|lf| (lf.filter_name.as_str(), &lf.options))
    }

    pub fn preprocessor(&self) -> Option<&PreprocessorRef> {
        self.preprocessor.as_ref()
    }

    pub fn compilation_rules(&self) -> &[Rule] {
        &self.compilation_rules
    }

    pub fn routing_rules(&self) -> &[Rule] {
        &self.routing_rules
    }

    /// Distinct representation names across compilation rules, first seen first.
    pub fn rep_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = vec![];
        for rule in &self.compilation_rules {
            if !names.contains(&rule.rep_name()) {
                names.push(rule.rep_name());
            }
        }
        names
    }

    /// Distinct snapshot names targeted by routing rules, excluding `last`.
    pub fn snapshot_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = vec![];
        for snapshot in self.routing_rules.iter().filter_map(Rule::snapshot_name) {
            if snapshot != LAST_SNAPSHOT && !names.contains(&snapshot) {
                names.push(snapshot);
            }
        }
        names
    }

    pub fn seal(&mut self) {
        self.sealed = true;
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub fn summary(&self) -> RuleSetSummary {
        RuleSetSummary {
            preprocessor: self.preprocessor.as_ref().map(|p| p.name().to_string()),
            compile: self.compilation_rules.iter().map(Rule::describe).collect(),
            route: self.routing_rules.iter().map(Rule::describe).collect(),
            layout: self
                .layout_filters
                .iter()
                .map(|lf| LayoutFilterSummary {
                    pattern: lf.pattern.source().clone(),
                    filter: lf.filter_name.clone(),
                    options: lf.options.clone(),
                })
                .collect(),
        }
    }

    fn ensure_open(&self) -> Result<(), ConfigError> {
        if self.sealed {
            return Err(ConfigError::Sealed);
        }
        Ok(())
    }
}
