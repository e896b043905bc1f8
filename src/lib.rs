//! ForgeSite Core - Static Content Rule Engine
//!
//! # The Rules
//! 1. First Registered, First Matched
//! 2. Sealed Rules Are Read-Only
//! 3. Identity Is Kind + Identifier
//! 4. Checksums Decide Reuse
//! 5. Configuration Errors Abort the Load

pub mod identifier;
pub mod hashing;
pub mod pattern;
pub mod entity;
pub mod rule;
pub mod rule_set;
pub mod rules_file;
pub mod builder;
pub mod filter;
pub mod pipeline;

pub use identifier::Identifier;
pub use pattern::{Pattern, PatternError, PatternSource};
pub use entity::{Attributes, ContentEntity, ContentError, EntityKind};
pub use rule::{ActionRef, CallbackRef, PreprocessorRef, Rule, Step, DEFAULT_REP, LAST_SNAPSHOT};
pub use rule_set::RuleSet;
pub use rules_file::CallbackRegistry;
pub use builder::{ConfigError, ConfigurationBuilder};
pub use filter::{Filter, FilterContext, FilterError, FilterRegistry};
pub use pipeline::{CompileReport, CompiledRep, Compiler, OutputCache, PipelineError, RuleContext, Site};

pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Error type returned by host-provided filters and callbacks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;
