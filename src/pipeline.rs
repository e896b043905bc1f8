//! Compilation Pipeline - runs rules against a site
//!
//! The compiler only reads the rule set, so one sealed `Arc<RuleSet>` can
//! back any number of compilers. Output is reused from an `OutputCache` when
//! the item, its rule and every layout it used are unchanged.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use crate::entity::ContentEntity;
use crate::filter::{FilterContext, FilterError, FilterRegistry};
use crate::hashing::compute_job_checksum;
use crate::identifier::Identifier;
use crate::rule::{ActionRef, FilterOptions, RepName, Rule, SnapshotName, Step, LAST_SNAPSHOT};
use crate::rule_set::RuleSet;
use crate::{BoxError, ENGINE_VERSION};

/// Options key under which a layout filter receives the content being laid out.
pub const LAYOUT_CONTENT_KEY: &str = "content";

/// Snapshot taken automatically before the first layout is applied.
pub const PRE_SNAPSHOT: &str = "pre";

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("No compilation rule matches {0}")]
    NoCompilationRule(Identifier),

    #[error("Filter error compiling {identifier} ({rep}): {source}")]
    Filter {
        identifier: Identifier,
        rep: RepName,
        #[source]
        source: FilterError,
    },

    #[error("Layout {layout} used by {identifier} does not exist")]
    LayoutNotFound { identifier: Identifier, layout: Identifier },

    #[error("No layout rule matches {0}")]
    NoLayoutFilter(Identifier),

    #[error("Binary item {0} cannot be run through a text filter or layout")]
    BinaryItemFiltered(Identifier),

    #[error("{phase} rule for {identifier} ({rep}) has an action that only applies to the other phase")]
    ActionNotApplicable {
        identifier: Identifier,
        rep: RepName,
        phase: &'static str,
    },

    #[error("Callback {name} failed for {identifier} ({rep}): {source}")]
    Callback {
        name: String,
        identifier: Identifier,
        rep: RepName,
        #[source]
        source: BoxError,
    },

    #[error("Preprocessor {name} failed: {source}")]
    Preprocess {
        name: String,
        #[source]
        source: BoxError,
    },

    #[error("Output path {path} is claimed by both {first} and {second}")]
    DuplicatePath { path: String, first: String, second: String },

    #[error("Route callback for {identifier} ({rep}) cannot change content or snapshots")]
    ContentChangedWhileRouting { identifier: Identifier, rep: RepName },

    #[error("Rule set must be sealed before compiling")]
    UnsealedRules,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Everything the loader found: items to compile and layouts they may use.
#[derive(Debug, Default)]
pub struct Site {
    pub items: Vec<ContentEntity>,
    pub layouts: Vec<ContentEntity>,
}

impl Site {
    pub fn new(items: Vec<ContentEntity>, layouts: Vec<ContentEntity>) -> Self {
        Self { items, layouts }
    }

    pub fn item(&self, identifier: &Identifier) -> Option<&ContentEntity> {
        self.items.iter().find(|i| i.identifier() == identifier)
    }

    pub fn layout(&self, identifier: &Identifier) -> Option<&ContentEntity> {
        self.layouts.iter().find(|l| l.identifier() == identifier)
    }

    pub fn freeze(&mut self) {
        for entity in self.items.iter_mut().chain(self.layouts.iter_mut()) {
            entity.freeze();
        }
    }
}

/// Output of one item representation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompiledRep {
    pub identifier: Identifier,
    pub rep: RepName,
    pub content: String,
    pub path: Option<String>,
    /// Content at each named snapshot, `last` excluded.
    #[serde(default)]
    pub snapshots: BTreeMap<SnapshotName, String>,
    /// Paths of routed named snapshots, `last` excluded.
    #[serde(default)]
    pub snapshot_paths: BTreeMap<SnapshotName, String>,
    pub job_checksum: String,
    /// Checksums of the layouts this output was built from.
    #[serde(default)]
    pub dependencies: BTreeMap<Identifier, String>,
    pub compiled_at: DateTime<Utc>,
    #[serde(default)]
    pub reused: bool,
}

/// Previously compiled output, keyed by identifier then rep.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputCache {
    entries: BTreeMap<Identifier, BTreeMap<RepName, CompiledRep>>,
}

impl OutputCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, identifier: &Identifier, rep: &str) -> Option<&CompiledRep> {
        self.entries.get(identifier).and_then(|reps| reps.get(rep))
    }

    pub fn insert(&mut self, compiled: CompiledRep) {
        self.entries
            .entry(compiled.identifier.clone())
            .or_default()
            .insert(compiled.rep.clone(), compiled);
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Default)]
pub struct CompileReport {
    pub reps: Vec<CompiledRep>,
    pub compiled: usize,
    pub reused: usize,
}

impl CompileReport {
    pub fn get(&self, identifier: &Identifier, rep: &str) -> Option<&CompiledRep> {
        self.reps
            .iter()
            .find(|r| &r.identifier == identifier && r.rep == rep)
    }

    pub fn into_cache(self) -> OutputCache {
        let mut cache = OutputCache::new();
        for rep in self.reps {
            cache.insert(rep);
        }
        cache
    }
}

/// State of one representation while its rules run.
///
/// Custom callbacks receive this to inspect the item and to apply filters,
/// layouts and snapshots the same way declarative steps do. Route callbacks
/// get the same type, read-only: content is final once routing starts.
pub struct RuleContext<'a> {
    item: &'a ContentEntity,
    site: &'a Site,
    rules: &'a RuleSet,
    filters: &'a FilterRegistry,
    rep: &'a str,
    content: String,
    snapshots: BTreeMap<SnapshotName, String>,
    dependencies: BTreeMap<Identifier, String>,
    routing: bool,
}

impl<'a> RuleContext<'a> {
    fn new(
        item: &'a ContentEntity,
        site: &'a Site,
        rules: &'a RuleSet,
        filters: &'a FilterRegistry,
        rep: &'a str,
    ) -> Self {
        Self {
            item,
            site,
            rules,
            filters,
            rep,
            content: item.raw_content().to_string(),
            snapshots: BTreeMap::new(),
            dependencies: BTreeMap::new(),
            routing: false,
        }
    }

    pub fn item(&self) -> &ContentEntity {
        self.item
    }

    pub fn items(&self) -> &[ContentEntity] {
        &self.site.items
    }

    pub fn rep(&self) -> &str {
        self.rep
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn snapshot_content(&self, name: &str) -> Option<&str> {
        self.snapshots.get(name).map(String::as_str)
    }

    /// True while route callbacks run; `filter`, `layout` and `snapshot` fail.
    pub fn is_routing(&self) -> bool {
        self.routing
    }

    pub fn filter(&mut self, name: &str, options: &FilterOptions) -> Result<(), PipelineError> {
        self.ensure_compiling()?;
        self.ensure_textual()?;
        let (site, filters) = (self.site, self.filters);
        let ctx = FilterContext {
            item: self.item,
            items: &site.items,
            layout: None,
            rep: self.rep,
        };
        self.content = filters
            .invoke(name, options, &self.content, &ctx)
            .map_err(|source| self.filter_error(source))?;
        Ok(())
    }

    /// Render the current content inside a layout, using the layout's filter.
    pub fn layout(&mut self, identifier: impl Into<Identifier>) -> Result<(), PipelineError> {
        self.ensure_compiling()?;
        self.ensure_textual()?;
        let identifier = identifier.into();
        let (site, rules, filters) = (self.site, self.rules, self.filters);
        let layout = site
            .layout(&identifier)
            .ok_or_else(|| PipelineError::LayoutNotFound {
                identifier: self.item.identifier().clone(),
                layout: identifier.clone(),
            })?;
        let (filter_name, options) = rules
            .filter_for_layout(&identifier)
            .ok_or_else(|| PipelineError::NoLayoutFilter(identifier.clone()))?;

        if !self.snapshots.contains_key(PRE_SNAPSHOT) {
            self.snapshot(PRE_SNAPSHOT)?;
        }

        let mut options = options.clone();
        options.insert(LAYOUT_CONTENT_KEY.to_string(), Value::String(self.content.clone()));
        let ctx = FilterContext {
            item: self.item,
            items: &site.items,
            layout: Some(layout),
            rep: self.rep,
        };
        self.content = filters
            .invoke(filter_name, &options, layout.raw_content(), &ctx)
            .map_err(|source| self.filter_error(source))?;
        self.dependencies
            .insert(identifier, layout.checksum().to_string());
        Ok(())
    }

    pub fn snapshot(&mut self, name: impl Into<SnapshotName>) -> Result<(), PipelineError> {
        self.ensure_compiling()?;
        self.snapshots.insert(name.into(), self.content.clone());
        Ok(())
    }

    fn apply_step(&mut self, step: &Step) -> Result<(), PipelineError> {
        match step {
            Step::Filter { filter, options } => self.filter(filter, options),
            Step::Layout { layout } => self.layout(layout.clone()),
            Step::Snapshot { snapshot } => self.snapshot(snapshot.clone()),
        }
    }

    fn ensure_compiling(&self) -> Result<(), PipelineError> {
        if self.routing {
            return Err(PipelineError::ContentChangedWhileRouting {
                identifier: self.item.identifier().clone(),
                rep: self.rep.to_string(),
            });
        }
        Ok(())
    }

    fn ensure_textual(&self) -> Result<(), PipelineError> {
        if self.item.is_binary() {
            return Err(PipelineError::BinaryItemFiltered(self.item.identifier().clone()));
        }
        Ok(())
    }

    fn filter_error(&self, source: FilterError) -> PipelineError {
        PipelineError::Filter {
            identifier: self.item.identifier().clone(),
            rep: self.rep.to_string(),
            source,
        }
    }

    fn callback_error(&self, name: &str, source: BoxError) -> PipelineError {
        PipelineError::Callback {
            name: name.to_string(),
            identifier: self.item.identifier().clone(),
            rep: self.rep.to_string(),
            source,
        }
    }

    fn not_applicable(&self, phase: &'static str) -> PipelineError {
        PipelineError::ActionNotApplicable {
            identifier: self.item.identifier().clone(),
            rep: self.rep.to_string(),
            phase,
        }
    }
}

/// The compilation pipeline - applies a sealed rule set to a site
pub struct Compiler {
    rules: Arc<RuleSet>,
    filters: FilterRegistry,
}

impl Compiler {
    pub fn new(rules: Arc<RuleSet>, filters: FilterRegistry) -> Self {
        Self { rules, filters }
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Run the preprocessor, if any, over the still-mutable site.
    pub fn preprocess(&self, site: &mut Site) -> Result<(), PipelineError> {
        if let Some(preprocessor) = self.rules.preprocessor() {
            debug!(name = preprocessor.name(), "running preprocessor");
            preprocessor.call(site).map_err(|source| PipelineError::Preprocess {
                name: preprocessor.name().to_string(),
                source,
            })?;
        }
        Ok(())
    }

    /// Preprocess, freeze and compile every item of the site.
    pub fn compile(&self, site: &mut Site, cache: &OutputCache) -> Result<CompileReport, PipelineError> {
        if !self.rules.is_sealed() {
            return Err(PipelineError::UnsealedRules);
        }
        self.preprocess(site)?;
        site.freeze();

        let site: &Site = site;
        let mut report = CompileReport::default();
        let mut claimed: HashMap<String, String> = HashMap::new();

        for item in &site.items {
            for compiled in self.compile_item(item, site, cache)? {
                let owner = format!("{} ({})", compiled.identifier, compiled.rep);
                let paths = compiled.path.iter().chain(compiled.snapshot_paths.values());
                for path in paths {
                    if let Some(first) = claimed.insert(path.clone(), owner.clone()) {
                        return Err(PipelineError::DuplicatePath {
                            path: path.clone(),
                            first,
                            second: owner,
                        });
                    }
                }
                if compiled.reused {
                    report.reused += 1;
                } else {
                    report.compiled += 1;
                }
                report.reps.push(compiled);
            }
        }

        info!(
            items = site.items.len(),
            compiled = report.compiled,
            reused = report.reused,
            "site compiled"
        );
        Ok(report)
    }

    /// Compile every representation of one item that has a matching rule.
    pub fn compile_item(
        &self,
        item: &ContentEntity,
        site: &Site,
        cache: &OutputCache,
    ) -> Result<Vec<CompiledRep>, PipelineError> {
        let mut reps = vec![];
        for rep in self.rules.rep_names() {
            if let Some(rule) = self.rules.compilation_rule_for(item.identifier(), rep) {
                reps.push(self.compile_rep(item, rep, rule, site, cache)?);
            }
        }
        if reps.is_empty() {
            return Err(PipelineError::NoCompilationRule(item.identifier().clone()));
        }
        Ok(reps)
    }

    fn compile_rep(
        &self,
        item: &ContentEntity,
        rep: &str,
        rule: &Rule,
        site: &Site,
        cache: &OutputCache,
    ) -> Result<CompiledRep, PipelineError> {
        let job_checksum = compute_job_checksum(item.checksum(), &rule.describe(), ENGINE_VERSION)?;
        let mut ctx = RuleContext::new(item, site, &self.rules, &self.filters, rep);

        let cached = cache
            .get(item.identifier(), rep)
            .filter(|c| c.job_checksum == job_checksum && dependencies_unchanged(c, site));
        let reused = match cached {
            Some(cached) => {
                debug!(identifier = %item.identifier(), rep, "reusing cached output");
                ctx.content = cached.content.clone();
                ctx.snapshots = cached.snapshots.clone();
                ctx.dependencies = cached.dependencies.clone();
                true
            }
            None => {
                debug!(identifier = %item.identifier(), rep, "compiling");
                self.execute(rule, &mut ctx)?;
                false
            }
        };

        let mut routes = self.route(&mut ctx)?;
        Ok(CompiledRep {
            identifier: item.identifier().clone(),
            rep: rep.to_string(),
            path: routes.remove(LAST_SNAPSHOT),
            content: ctx.content,
            snapshots: ctx.snapshots,
            snapshot_paths: routes,
            job_checksum,
            dependencies: ctx.dependencies,
            compiled_at: Utc::now(),
            reused,
        })
    }

    fn execute(&self, rule: &Rule, ctx: &mut RuleContext<'_>) -> Result<(), PipelineError> {
        match rule.action() {
            ActionRef::Noop => Ok(()),
            ActionRef::NamedFilter { name, options } => ctx.filter(name, options),
            ActionRef::Steps(steps) => steps.iter().try_for_each(|step| ctx.apply_step(step)),
            ActionRef::Custom(callback) => callback
                .call(ctx)
                .map(|_| ())
                .map_err(|source| ctx.callback_error(callback.name(), source)),
            ActionRef::IdentityRoute | ActionRef::RouteTo(_) => Err(ctx.not_applicable("compile")),
        }
    }

    /// Resolve output paths for `last` and every named snapshot taken.
    fn route(&self, ctx: &mut RuleContext<'_>) -> Result<BTreeMap<SnapshotName, String>, PipelineError> {
        ctx.routing = true;
        let mut snapshot_names = vec![LAST_SNAPSHOT.to_string()];
        snapshot_names.extend(ctx.snapshots.keys().filter(|k| k.as_str() != LAST_SNAPSHOT).cloned());

        let mut routes = BTreeMap::new();
        for snapshot in snapshot_names {
            let Some(rule) = self
                .rules
                .routing_rule_for(ctx.item.identifier(), ctx.rep, &snapshot)
            else {
                continue;
            };
            let path = match rule.action() {
                ActionRef::Noop => None,
                ActionRef::IdentityRoute => Some(ctx.item.identifier().to_string()),
                ActionRef::RouteTo(template) => Some(expand_route(template, ctx.item, ctx.rep)),
                ActionRef::Custom(callback) => callback
                    .call(ctx)
                    .map_err(|source| ctx.callback_error(callback.name(), source))?,
                ActionRef::NamedFilter { .. } | ActionRef::Steps(_) => {
                    return Err(ctx.not_applicable("route"));
                }
            };
            if let Some(path) = path {
                routes.insert(snapshot, path);
            }
        }
        Ok(routes)
    }
}

fn dependencies_unchanged(cached: &CompiledRep, site: &Site) -> bool {
    cached.dependencies.iter().all(|(layout, checksum)| {
        site.layout(layout).map(ContentEntity::checksum) == Some(checksum.as_str())
    })
}

fn expand_route(template: &str, item: &ContentEntity, rep: &str) -> String {
    template
        .replace("{identifier}", item.identifier().as_str())
        .replace("{rep}", rep)
        .replace("{extension}", item.extension().unwrap_or(""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ConfigurationBuilder;
    use crate::entity::Attributes;
    use crate::rule::{CallbackRef, PreprocessorRef, DEFAULT_REP};
    use serde_json::json;

    fn filters() -> FilterRegistry {
        let mut filters = FilterRegistry::new();
        filters.register_fn("upcase", |input, _, _| Ok(input.to_uppercase()));
        filters.register_fn("bang", |input, _, _| Ok(format!("{}!", input)));
        filters.register_fn("wrap", |input, options, _| {
            let content = options.get(LAYOUT_CONTENT_KEY).and_then(Value::as_str).unwrap_or("");
            Ok(input.replace("{{content}}", content))
        });
        filters
    }

    fn item(content: &str, id: &str) -> ContentEntity {
        ContentEntity::item(content, Attributes::new(), id)
    }

    fn compiler(build: impl FnOnce(&mut ConfigurationBuilder)) -> Compiler {
        let mut builder = ConfigurationBuilder::new();
        build(&mut builder);
        Compiler::new(Arc::new(builder.finish()), filters())
    }

    #[test]
    fn test_steps_with_layout_and_snapshots() {
        let compiler = compiler(|b| {
            b.compile(
                "/*",
                None,
                Some(ActionRef::Steps(vec![
                    Step::Filter { filter: "upcase".into(), options: FilterOptions::new() },
                    Step::Layout { layout: Identifier::new("/default") },
                ])),
            )
            .unwrap();
            b.route("/*", None, None, Some(ActionRef::RouteTo("{identifier}/index.html".into()))).unwrap();
            b.route("/*", None, Some(PRE_SNAPSHOT), Some(ActionRef::RouteTo("{identifier}.frag".into()))).unwrap();
            b.layout("/default", "wrap", FilterOptions::new()).unwrap();
        });
        let mut site = Site::new(
            vec![item("hello", "/about")],
            vec![ContentEntity::layout("<main>{{content}}</main>", Attributes::new(), "/default")],
        );

        let report = compiler.compile(&mut site, &OutputCache::new()).unwrap();
        let rep = report.get(&Identifier::new("/about"), DEFAULT_REP).unwrap();
        assert_eq!(rep.content, "<main>HELLO</main>");
        assert_eq!(rep.path.as_deref(), Some("/about/index.html"));
        assert_eq!(rep.snapshots.get(PRE_SNAPSHOT).map(String::as_str), Some("HELLO"));
        assert_eq!(rep.snapshot_paths.get(PRE_SNAPSHOT).map(String::as_str), Some("/about.frag"));
        assert!(rep.dependencies.contains_key(&Identifier::new("/default")));
        assert!(site.items[0].is_frozen());
    }

    #[test]
    fn test_item_without_rule_fails() {
        let compiler = compiler(|b| b.compile("/blog/*", None, Some(ActionRef::Noop)).unwrap());
        let mut site = Site::new(vec![item("x", "/about")], vec![]);
        let err = compiler.compile(&mut site, &OutputCache::new()).unwrap_err();
        assert!(matches!(err, PipelineError::NoCompilationRule(id) if id.as_str() == "/about"));
    }

    #[test]
    fn test_filter_error_propagates() {
        let compiler = compiler(|b| b.compile("/*", None, Some(ActionRef::filter("missing"))).unwrap());
        let mut site = Site::new(vec![item("x", "/a")], vec![]);
        let err = compiler.compile(&mut site, &OutputCache::new()).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Filter { source: FilterError::Unknown { .. }, .. }
        ));
    }

    #[test]
    fn test_custom_callbacks_compile_and_route() {
        let compile = CallbackRef::new("title_first", |ctx| {
            let title = ctx.item().attribute("title").and_then(Value::as_str).unwrap_or("").to_string();
            ctx.filter("upcase", &FilterOptions::new())?;
            ctx.snapshot("body")?;
            Ok(Some(title))
        });
        let route = CallbackRef::new("by_title", |ctx| {
            Ok(ctx
                .item()
                .attribute("slug")
                .and_then(Value::as_str)
                .map(|slug| format!("/posts/{}.html", slug)))
        });
        let compiler = compiler(|b| {
            b.compile("/*", None, Some(ActionRef::Custom(compile))).unwrap();
            b.route("/*", None, None, Some(ActionRef::Custom(route))).unwrap();
        });
        let mut attributes = Attributes::new();
        attributes.insert("slug".into(), json!("hello-world"));
        let mut site = Site::new(vec![ContentEntity::item("hi", attributes, "/p1")], vec![]);

        let report = compiler.compile(&mut site, &OutputCache::new()).unwrap();
        let rep = &report.reps[0];
        assert_eq!(rep.content, "HI");
        assert_eq!(rep.path.as_deref(), Some("/posts/hello-world.html"));
        assert_eq!(rep.snapshots.get("body").map(String::as_str), Some("HI"));
    }

    #[test]
    fn test_route_callback_cannot_filter() {
        let route = CallbackRef::new("bang_route", |ctx| {
            ctx.filter("bang", &FilterOptions::new())?;
            Ok(Some(ctx.item().identifier().to_string()))
        });
        let compiler = compiler(|b| {
            b.compile("/*", None, Some(ActionRef::Noop)).unwrap();
            b.route("/*", None, None, Some(ActionRef::Custom(route))).unwrap();
        });
        let mut site = Site::new(vec![item("a", "/a")], vec![]);
        let err = compiler.compile(&mut site, &OutputCache::new()).unwrap_err();
        match err {
            PipelineError::Callback { name, source, .. } => {
                assert_eq!(name, "bang_route");
                assert!(matches!(
                    source.downcast_ref::<PipelineError>(),
                    Some(PipelineError::ContentChangedWhileRouting { .. })
                ));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_reused_output_routed_by_callback_is_unchanged() {
        let route = CallbackRef::new("by_content", |ctx| {
            assert!(ctx.is_routing());
            assert!(ctx.snapshot("late").is_err());
            Ok(Some(format!("/{}.html", ctx.content())))
        });
        let compiler = compiler(|b| {
            b.compile("/*", None, Some(ActionRef::filter("bang"))).unwrap();
            b.route("/*", None, None, Some(ActionRef::Custom(route))).unwrap();
        });
        let site = || Site::new(vec![item("a", "/a")], vec![]);

        let first = compiler.compile(&mut site(), &OutputCache::new()).unwrap();
        assert_eq!(first.reps[0].content, "a!");
        let cache = first.clone().into_cache();

        let second = compiler.compile(&mut site(), &cache).unwrap();
        assert!(second.reps[0].reused);
        assert_eq!(second.reps[0].content, first.reps[0].content);
        assert_eq!(second.reps[0].path, first.reps[0].path);
        assert_eq!(second.reps[0].path.as_deref(), Some("/a!.html"));
        assert!(second.reps[0].snapshots.is_empty());
    }

    #[test]
    fn test_preprocessor_runs_before_rules() {
        let compiler = compiler(|b| {
            b.on_preprocess(PreprocessorRef::new("drop_drafts", |site| {
                site.items.retain(|i| i.attribute("draft") != Some(&json!(true)));
                Ok(())
            }))
            .unwrap();
            b.passthrough("/*", None, None).unwrap();
        });
        let mut draft = Attributes::new();
        draft.insert("draft".into(), json!(true));
        let mut site = Site::new(
            vec![item("a", "/a"), ContentEntity::item("b", draft, "/b")],
            vec![],
        );
        let report = compiler.compile(&mut site, &OutputCache::new()).unwrap();
        assert_eq!(report.reps.len(), 1);
        assert_eq!(report.reps[0].path.as_deref(), Some("/a"));
    }

    #[test]
    fn test_binary_items_skip_filters() {
        let compiler = compiler(|b| b.compile("/*", None, Some(ActionRef::filter("upcase"))).unwrap());
        let mut binary = Attributes::new();
        binary.insert("binary".into(), json!(true));
        let mut site = Site::new(vec![ContentEntity::item("\u{0}png", binary, "/logo.png")], vec![]);
        let err = compiler.compile(&mut site, &OutputCache::new()).unwrap_err();
        assert!(matches!(err, PipelineError::BinaryItemFiltered(_)));
    }

    #[test]
    fn test_route_action_in_compile_rule_rejected() {
        let compiler = compiler(|b| b.compile("/*", None, Some(ActionRef::IdentityRoute)).unwrap());
        let mut site = Site::new(vec![item("x", "/a")], vec![]);
        let err = compiler.compile(&mut site, &OutputCache::new()).unwrap_err();
        assert!(matches!(err, PipelineError::ActionNotApplicable { phase: "compile", .. }));
    }

    #[test]
    fn test_unsealed_rules_rejected() {
        let compiler = Compiler::new(Arc::new(RuleSet::new()), filters());
        let err = compiler.compile(&mut Site::default(), &OutputCache::new()).unwrap_err();
        assert!(matches!(err, PipelineError::UnsealedRules));
    }
}
