//! Rules - pattern, representation and action bindings

use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

use crate::identifier::Identifier;
use crate::pattern::{Pattern, PatternSource};
use crate::pipeline::{RuleContext, Site};
use crate::BoxError;

pub type RepName = String;
pub type SnapshotName = String;
pub type FilterOptions = Map<String, Value>;

pub const DEFAULT_REP: &str = "default";

/// Snapshot holding whatever a representation finally emits.
pub const LAST_SNAPSHOT: &str = "last";

type CallbackFn = dyn Fn(&mut RuleContext<'_>) -> Result<Option<String>, BoxError> + Send + Sync;
type PreprocessFn = dyn Fn(&mut Site) -> Result<(), BoxError> + Send + Sync;

/// Named handle to host-provided rule logic.
///
/// Compilation rules call it for its effect on the context; routing rules use
/// the returned path (`None` leaves the representation unwritten).
#[derive(Clone)]
pub struct CallbackRef {
    name: String,
    func: Arc<CallbackFn>,
}

impl CallbackRef {
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&mut RuleContext<'_>) -> Result<Option<String>, BoxError> + Send + Sync + 'static,
    {
        Self { name: name.into(), func: Arc::new(func) }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn call(&self, ctx: &mut RuleContext<'_>) -> Result<Option<String>, BoxError> {
        (self.func)(ctx)
    }
}

impl fmt::Debug for CallbackRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CallbackRef").field(&self.name).finish()
    }
}

impl Serialize for CallbackRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.name)
    }
}

/// Site-wide hook run once before any rule is evaluated.
#[derive(Clone)]
pub struct PreprocessorRef {
    name: String,
    func: Arc<PreprocessFn>,
}

impl PreprocessorRef {
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&mut Site) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        Self { name: name.into(), func: Arc::new(func) }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn call(&self, site: &mut Site) -> Result<(), BoxError> {
        (self.func)(site)
    }
}

impl fmt::Debug for PreprocessorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PreprocessorRef").field(&self.name).finish()
    }
}

/// One step of a declarative compile action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Step {
    Filter {
        filter: String,
        #[serde(default)]
        options: FilterOptions,
    },
    Layout { layout: Identifier },
    Snapshot { snapshot: SnapshotName },
}

/// What a rule does once it matches.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionRef {
    /// Compile: leave content as is. Route: do not write.
    Noop,
    NamedFilter { name: String, options: FilterOptions },
    Steps(Vec<Step>),
    Custom(CallbackRef),
    /// Route to the identifier unchanged.
    IdentityRoute,
    /// Route to a path template; `{identifier}`, `{rep}` and `{extension}` expand.
    RouteTo(String),
}

impl ActionRef {
    pub fn filter(name: impl Into<String>) -> Self {
        Self::NamedFilter { name: name.into(), options: FilterOptions::new() }
    }

    pub fn filter_with(name: impl Into<String>, options: FilterOptions) -> Self {
        Self::NamedFilter { name: name.into(), options }
    }
}

/// Serializable view of a rule, used for diagnostics and output reuse checks.
#[derive(Debug, Clone, Serialize)]
pub struct RuleDescriptor {
    pub pattern: PatternSource,
    pub rep: RepName,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<SnapshotName>,
    pub action: ActionRef,
}

#[derive(Debug, Clone)]
pub struct Rule {
    pattern: Pattern,
    rep_name: RepName,
    action: ActionRef,
    snapshot_name: Option<SnapshotName>,
}

impl Rule {
    pub fn compilation(pattern: Pattern, rep_name: impl Into<RepName>, action: ActionRef) -> Self {
        Self {
            pattern,
            rep_name: rep_name.into(),
            action,
            snapshot_name: None,
        }
    }

    pub fn routing(
        pattern: Pattern,
        rep_name: impl Into<RepName>,
        snapshot_name: impl Into<SnapshotName>,
        action: ActionRef,
    ) -> Self {
        Self {
            pattern,
            rep_name: rep_name.into(),
            action,
            snapshot_name: Some(snapshot_name.into()),
        }
    }

    pub fn matches(&self, identifier: &Identifier, rep_name: &str) -> bool {
        self.rep_name == rep_name && self.pattern.matches(identifier)
    }

    pub fn matches_snapshot(&self, identifier: &Identifier, rep_name: &str, snapshot_name: &str) -> bool {
        self.snapshot_name.as_deref() == Some(snapshot_name) && self.matches(identifier, rep_name)
    }

    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    pub fn rep_name(&self) -> &str {
        &self.rep_name
    }

    pub fn action(&self) -> &ActionRef {
        &self.action
    }

    pub fn snapshot_name(&self) -> Option<&str> {
        self.snapshot_name.as_deref()
    }

    pub fn describe(&self) -> RuleDescriptor {
        RuleDescriptor {
            pattern: self.pattern.source().clone(),
            rep: self.rep_name.clone(),
            snapshot: self.snapshot_name.clone(),
            action: self.action.clone(),
        }
    }
}
