//! Configuration Builder - declarative entry point for rule sets
//!
//! Loading is strictly sequential: rules are appended in the order directives
//! are evaluated, and an `include` splices the included file's rules in at
//! the point of inclusion. Any error aborts the load; `finish` is the only
//! way to obtain the (sealed) rule set.

use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use crate::pattern::{Pattern, PatternError, PatternSource};
use crate::rule::{ActionRef, FilterOptions, PreprocessorRef, Rule, DEFAULT_REP, LAST_SNAPSHOT};
use crate::rule_set::RuleSet;
use crate::rules_file::{CallbackRegistry, RulesFile, Verb};
use crate::ENGINE_VERSION;

/// Nesting limit for `include`, guarding against runaway recursion.
pub const MAX_INCLUDE_DEPTH: usize = 16;

const RULES_FILE_EXTENSION: &str = "json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid pattern: {0}")]
    Pattern(#[from] PatternError),

    #[error("{verb} rule for {pattern:?} requires an action")]
    MissingAction { verb: &'static str, pattern: String },

    #[error("{verb} rule for {pattern:?} does not accept an action")]
    UnexpectedAction { verb: &'static str, pattern: String },

    #[error("Configuration source not found: {name} (tried {candidates:?})")]
    SourceNotFound { name: String, candidates: Vec<PathBuf> },

    #[error("Include cycle detected at {0}")]
    IncludeCycle(PathBuf),

    #[error("Include depth limit exceeded while including {0}")]
    IncludeDepthExceeded(String),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {origin}: {source}")]
    Parse {
        origin: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid directive: {0}")]
    InvalidDirective(String),

    #[error("Unknown callback: {0}")]
    UnknownCallback(String),

    #[error("Rules require engine >= {0}, current is {1}")]
    EngineVersionMismatch(String, String),

    #[error("Invalid engine version requirement: {0}")]
    InvalidVersion(String),

    #[error("Rule set is sealed")]
    Sealed,
}

pub struct ConfigurationBuilder {
    rules: RuleSet,
    root: PathBuf,
    callbacks: CallbackRegistry,
    include_stack: Vec<PathBuf>,
}

impl ConfigurationBuilder {
    pub fn new() -> Self {
        Self {
            rules: RuleSet::new(),
            root: PathBuf::from("."),
            callbacks: CallbackRegistry::new(),
            include_stack: vec![],
        }
    }

    /// Directory that `./`-relative includes resolve against.
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    pub fn with_callbacks(mut self, callbacks: CallbackRegistry) -> Self {
        self.callbacks = callbacks;
        self
    }

    /// Load a rules file rooted at its own directory and seal the result.
    pub fn from_path(path: &Path, callbacks: CallbackRegistry) -> Result<RuleSet, ConfigError> {
        let root = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let mut builder = Self::new().with_root(root).with_callbacks(callbacks);
        builder.load_file(path)?;
        Ok(builder.finish())
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn finish(mut self) -> RuleSet {
        self.rules.seal();
        info!(
            compile = self.rules.compilation_rules().len(),
            route = self.rules.routing_rules().len(),
            "rule set sealed"
        );
        self.rules
    }

    pub fn on_preprocess(&mut self, preprocessor: PreprocessorRef) -> Result<(), ConfigError> {
        self.rules.set_preprocessor(preprocessor)
    }

    pub fn compile(
        &mut self,
        pattern: impl Into<PatternSource>,
        rep: Option<&str>,
        action: Option<ActionRef>,
    ) -> Result<(), ConfigError> {
        let source = pattern.into();
        let action = action.ok_or_else(|| ConfigError::MissingAction {
            verb: "compile",
            pattern: source.as_str().to_string(),
        })?;
        let rule = Rule::compilation(Pattern::compile(source)?, rep.unwrap_or(DEFAULT_REP), action);
        self.rules.add_compilation_rule(rule)
    }

    pub fn route(
        &mut self,
        pattern: impl Into<PatternSource>,
        rep: Option<&str>,
        snapshot: Option<&str>,
        action: Option<ActionRef>,
    ) -> Result<(), ConfigError> {
        let source = pattern.into();
        let action = action.ok_or_else(|| ConfigError::MissingAction {
            verb: "route",
            pattern: source.as_str().to_string(),
        })?;
        let rule = Rule::routing(
            Pattern::compile(source)?,
            rep.unwrap_or(DEFAULT_REP),
            snapshot.unwrap_or(LAST_SNAPSHOT),
            action,
        );
        self.rules.add_routing_rule(rule)
    }

    pub fn layout(
        &mut self,
        pattern: impl Into<PatternSource>,
        filter_name: impl Into<String>,
        options: FilterOptions,
    ) -> Result<(), ConfigError> {
        let pattern = Pattern::compile(pattern)?;
        self.rules.add_layout_filter(pattern, filter_name, options)
    }

    /// Copies matching items to their identifier untouched.
    pub fn passthrough(
        &mut self,
        pattern: impl Into<PatternSource>,
        rep: Option<&str>,
        action: Option<ActionRef>,
    ) -> Result<(), ConfigError> {
        self.add_meta_rule("passthrough", pattern.into(), rep, action, ActionRef::IdentityRoute)
    }

    /// Compiles matching items to nothing and writes nothing.
    pub fn ignore(
        &mut self,
        pattern: impl Into<PatternSource>,
        rep: Option<&str>,
        action: Option<ActionRef>,
    ) -> Result<(), ConfigError> {
        self.add_meta_rule("ignore", pattern.into(), rep, action, ActionRef::Noop)
    }

    /// Evaluate another rules source in this builder.
    ///
    /// Candidates, in order: `name` and `name.json` next to the including
    /// file, then `name` and `name.json` under the builder root.
    pub fn include(&mut self, name: &str) -> Result<(), ConfigError> {
        if self.include_stack.len() >= MAX_INCLUDE_DEPTH {
            return Err(ConfigError::IncludeDepthExceeded(name.to_string()));
        }
        let candidates = self.include_candidates(name);
        let found = candidates.iter().find(|c| c.is_file()).cloned();
        match found {
            Some(path) => {
                info!(name, path = %path.display(), "including rules");
                self.load_file(&path)
            }
            None => Err(ConfigError::SourceNotFound {
                name: name.to_string(),
                candidates,
            }),
        }
    }

    pub fn load_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let canonical = fs::canonicalize(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if self.include_stack.contains(&canonical) {
            return Err(ConfigError::IncludeCycle(canonical));
        }
        let text = fs::read_to_string(&canonical).map_err(|source| ConfigError::Io {
            path: canonical.clone(),
            source,
        })?;

        self.include_stack.push(canonical);
        let result = self.load_str(&text, &path.display().to_string());
        self.include_stack.pop();
        result
    }

    pub fn load_str(&mut self, text: &str, origin: &str) -> Result<(), ConfigError> {
        let file: RulesFile = serde_json::from_str(text).map_err(|source| ConfigError::Parse {
            origin: origin.to_string(),
            source,
        })?;

        if let Some(required) = &file.engine_min_version {
            check_engine_version(required)?;
        }
        if let Some(name) = &file.preprocess {
            let preprocessor = self.callbacks.preprocessor(name)?;
            self.on_preprocess(preprocessor)?;
        }

        debug!(origin, directives = file.rules.len(), "evaluating rules source");
        for (index, directive) in file.rules.iter().enumerate() {
            let verb = directive
                .verb()
                .map_err(|reason| ConfigError::InvalidDirective(format!("{} #{}: {}", origin, index, reason)))?;
            let rep = directive.rep.as_deref();
            match verb {
                Verb::Compile(pattern) => {
                    let action = directive.action(&self.callbacks)?;
                    self.compile(pattern, rep, action)?;
                }
                Verb::Route(pattern) => {
                    let action = directive.action(&self.callbacks)?;
                    self.route(pattern, rep, directive.snapshot.as_deref(), action)?;
                }
                Verb::Layout(pattern) => {
                    let filter = directive.filter.as_deref().ok_or_else(|| {
                        ConfigError::InvalidDirective(format!("{} #{}: layout requires a filter", origin, index))
                    })?;
                    self.layout(pattern, filter, directive.options.clone().unwrap_or_default())?;
                }
                Verb::Passthrough(pattern) => {
                    let action = directive.action(&self.callbacks)?;
                    self.passthrough(pattern, rep, action)?;
                }
                Verb::Ignore(pattern) => {
                    let action = directive.action(&self.callbacks)?;
                    self.ignore(pattern, rep, action)?;
                }
                Verb::Include(name) => self.include(name)?,
            }
        }
        Ok(())
    }

    fn add_meta_rule(
        &mut self,
        verb: &'static str,
        source: PatternSource,
        rep: Option<&str>,
        action: Option<ActionRef>,
        route_action: ActionRef,
    ) -> Result<(), ConfigError> {
        if action.is_some() {
            return Err(ConfigError::UnexpectedAction {
                verb,
                pattern: source.as_str().to_string(),
            });
        }
        let pattern = Pattern::compile(source)?;
        let rep = rep.unwrap_or(DEFAULT_REP);
        self.rules
            .add_compilation_rule(Rule::compilation(pattern.clone(), rep, ActionRef::Noop))?;
        self.rules
            .add_routing_rule(Rule::routing(pattern, rep, LAST_SNAPSHOT, route_action))
    }

    fn include_candidates(&self, name: &str) -> Vec<PathBuf> {
        let with_ext = format!("{}.{}", name, RULES_FILE_EXTENSION);
        let local = self
            .include_stack
            .last()
            .and_then(|p| p.parent())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());

        let mut candidates = vec![];
        for path in [
            local.join(name),
            local.join(&with_ext),
            self.root.join(name),
            self.root.join(&with_ext),
        ] {
            if !candidates.contains(&path) {
                candidates.push(path);
            }
        }
        candidates
    }
}

impl Default for ConfigurationBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn check_engine_version(required: &str) -> Result<(), ConfigError> {
    let engine_ver = semver::Version::parse(ENGINE_VERSION)
        .map_err(|_| ConfigError::InvalidVersion(ENGINE_VERSION.to_string()))?;
    let min_ver = semver::Version::parse(required)
        .map_err(|_| ConfigError::InvalidVersion(required.to_string()))?;

    if engine_ver < min_ver {
        return Err(ConfigError::EngineVersionMismatch(
            required.to_string(),
            ENGINE_VERSION.to_string(),
        ));
    }
    Ok(())
}
