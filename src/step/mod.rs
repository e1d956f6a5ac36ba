//! Step Abstraction
//!
//! A [`Step`] is one named unit of work in a plan. What it does is its
//! [`Action`]: a read-only [`Utility`], a mutating [`Operation`], a
//! [`Condition`] used as a step, or one of the composite actions (fan-out,
//! group, loop) that produce child steps while the plan runs.
//!
//! # Design
//!
//! - **Immutable once registered**: steps are built with consuming builder
//!   methods before they are added to a plan. The engine only reads them.
//! - **Shared leaves**: leaf logic sits behind `Arc`, so cloning a step (fan-out,
//!   loops) copies configuration, never state.
//! - **Pure specialization**: [`specialize`] turns a template into a child step
//!   with a derived name, a parent back-reference and its own target.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::condition::{Condition, Guard};
use crate::context::TransformationContext;
use crate::error::StepError;
use crate::result::{OperationResult, UtilityResult};

mod composite;
mod fanout;

pub use composite::{LoopDriver, StepGroup, StepLoop, DEFAULT_MAX_ITERATIONS};
pub use fanout::MultipleOperations;

static NO_PROPERTIES: BTreeMap<String, String> = BTreeMap::new();

// ============================================================================
// Leaf Contracts
// ============================================================================

/// Everything a leaf sees while it runs.
///
/// The target is already resolved to an absolute path when the step has one.
#[derive(Debug, Clone, Copy)]
pub struct StepInput<'a> {
    root: &'a Path,
    target: Option<&'a Path>,
    context: &'a TransformationContext,
    properties: &'a BTreeMap<String, String>,
    step_name: &'a str,
    plan_name: &'a str,
}

impl<'a> StepInput<'a> {
    /// Input rooted at an application folder, with no target and no properties
    pub fn new(root: &'a Path, context: &'a TransformationContext) -> Self {
        Self {
            root,
            target: None,
            context,
            properties: &NO_PROPERTIES,
            step_name: "",
            plan_name: "",
        }
    }

    /// Same input pointed at another file
    pub fn with_target<'b>(&self, target: &'b Path) -> StepInput<'b>
    where
        'a: 'b,
    {
        StepInput {
            root: self.root,
            target: Some(target),
            context: self.context,
            properties: self.properties,
            step_name: self.step_name,
            plan_name: self.plan_name,
        }
    }

    /// Same input with no target
    pub fn without_target(&self) -> Self {
        Self { target: None, ..*self }
    }

    pub fn with_properties(mut self, properties: &'a BTreeMap<String, String>) -> Self {
        self.properties = properties;
        self
    }

    pub fn with_names(mut self, step_name: &'a str, plan_name: &'a str) -> Self {
        self.step_name = step_name;
        self.plan_name = plan_name;
        self
    }

    /// Application root folder
    #[inline]
    pub fn root(&self) -> &'a Path {
        self.root
    }

    #[inline]
    pub fn context(&self) -> &'a TransformationContext {
        self.context
    }

    #[inline]
    pub fn properties(&self) -> &'a BTreeMap<String, String> {
        self.properties
    }

    #[inline]
    pub fn step_name(&self) -> &'a str {
        self.step_name
    }

    #[inline]
    pub fn plan_name(&self) -> &'a str {
        self.plan_name
    }

    /// Resolved target, failing when the step has none
    pub fn target(&self) -> Result<&'a Path, StepError> {
        self.target
            .ok_or_else(|| StepError::resolution(format!("step '{}' has no resolved target", self.step_name)))
    }

    /// A path relative to the application root, with `/` separators
    pub fn relative(&self, path: &Path) -> String {
        relative_to_root(self.root, path)
    }
}

/// Read-only step logic.
///
/// # Contract
///
/// - `execute()` never mutates the application folder.
/// - Faults are returned as `Err`; the engine turns them into an ERROR result.
/// - `requires_target()` tells the engine whether to resolve a target first.
pub trait Utility: Send + Sync + fmt::Debug {
    /// Short type name, used in generated step names
    fn kind(&self) -> &'static str;

    fn description(&self) -> String;

    fn requires_target(&self) -> bool {
        true
    }

    /// Whether steps built from this utility save their value by default
    fn saves_result(&self) -> bool {
        true
    }

    /// Whether steps built from this utility abort the plan on failure by default
    fn aborts_on_failure(&self) -> bool {
        false
    }

    fn execute(&self, input: &StepInput<'_>) -> anyhow::Result<UtilityResult>;
}

/// Mutating step logic.
///
/// Operations always act on a resolved target file or folder.
pub trait Operation: Send + Sync + fmt::Debug {
    /// Short type name, used in generated step names
    fn kind(&self) -> &'static str;

    fn description(&self) -> String;

    fn execute(&self, input: &StepInput<'_>) -> anyhow::Result<OperationResult>;
}

// ============================================================================
// Target Resolution
// ============================================================================

/// Where a step points.
///
/// A relative path and a path attribute are mutually exclusive; setting one
/// replaces the other.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Target {
    #[default]
    Unset,
    /// Relative to the application root
    Relative(PathBuf),
    /// Absolute path held by a context attribute, optionally extended
    Attribute {
        name: String,
        additional: Option<PathBuf>,
    },
}

impl Target {
    /// Relative target. Backslashes are normalised to `/`; empty or `.` means the root.
    pub fn relative(path: impl AsRef<str>) -> Self {
        Self::Relative(normalize_relative(path.as_ref()))
    }

    pub fn attribute(name: impl Into<String>) -> Self {
        Self::Attribute {
            name: name.into(),
            additional: None,
        }
    }

    pub fn attribute_with(name: impl Into<String>, additional: impl AsRef<str>) -> Self {
        Self::Attribute {
            name: name.into(),
            additional: Some(normalize_relative(additional.as_ref())),
        }
    }

    #[inline]
    pub fn is_set(&self) -> bool {
        !matches!(self, Self::Unset)
    }

    /// Resolve to an absolute path against the application root and context
    pub fn resolve(&self, root: &Path, context: &TransformationContext) -> Result<PathBuf, StepError> {
        match self {
            Self::Unset => Err(StepError::resolution(
                "neither a relative path nor a path attribute is set",
            )),
            Self::Relative(rel) => Ok(join_relative(root, rel)),
            Self::Attribute { name, additional } => {
                let base = context
                    .get_path(name)
                    .map_err(|e| StepError::resolution(e.to_string()))?;
                Ok(match additional {
                    Some(extra) => join_relative(base, extra),
                    None => base.to_path_buf(),
                })
            }
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unset => write!(f, "<unset>"),
            Self::Relative(rel) if rel.as_os_str().is_empty() => write!(f, "."),
            Self::Relative(rel) => write!(f, "{}", rel.display()),
            Self::Attribute { name, additional: None } => write!(f, "${name}"),
            Self::Attribute {
                name,
                additional: Some(extra),
            } => write!(f, "${name}/{}", extra.display()),
        }
    }
}

fn normalize_relative(path: &str) -> PathBuf {
    let normalized = path.replace('\\', "/");
    let trimmed = normalized.trim();
    if trimmed.is_empty() || trimmed == "." {
        PathBuf::new()
    } else {
        PathBuf::from(trimmed)
    }
}

fn join_relative(base: &Path, rel: &Path) -> PathBuf {
    if rel.as_os_str().is_empty() {
        base.to_path_buf()
    } else {
        base.join(rel)
    }
}

/// Render `path` relative to `root` with `/` separators (`.` for the root itself)
pub fn relative_to_root(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    let text = rel.to_string_lossy().replace('\\', "/");
    if text.is_empty() { ".".to_string() } else { text }
}

// ============================================================================
// Steps
// ============================================================================

/// What a step does
#[derive(Debug, Clone)]
pub enum Action {
    Utility(Arc<dyn Utility>),
    Operation(Arc<dyn Operation>),
    /// A condition run as a step; its boolean becomes the value
    Condition(Arc<dyn Condition>),
    /// Fan a template operation out over a file set
    FanOut(MultipleOperations),
    /// Run an ordered list of child steps
    Group(StepGroup),
    /// Repeat a template step
    Loop(StepLoop),
}

impl Action {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Utility(u) => u.kind(),
            Self::Operation(o) => o.kind(),
            Self::Condition(c) => c.kind(),
            Self::FanOut(_) => "MultipleOperations",
            Self::Group(_) => "Group",
            Self::Loop(_) => "Loop",
        }
    }

    pub fn description(&self) -> String {
        match self {
            Self::Utility(u) => u.description(),
            Self::Operation(o) => o.description(),
            Self::Condition(c) => c.description(),
            Self::FanOut(m) => m.description(),
            Self::Group(g) => format!("Run a group of {} steps", g.len()),
            Self::Loop(l) => l.description(),
        }
    }

    fn requires_target(&self) -> bool {
        match self {
            Self::Utility(u) => u.requires_target(),
            Self::Operation(_) => true,
            Self::Condition(c) => c.requires_target(),
            Self::FanOut(_) | Self::Group(_) | Self::Loop(_) => false,
        }
    }
}

/// A named unit of work
#[derive(Debug, Clone)]
pub struct Step {
    name: Option<String>,
    description: Option<String>,
    target: Target,
    guards: Vec<Guard>,
    depends_on: Vec<String>,
    abort_on_failure: bool,
    abort_message: Option<String>,
    save_result: bool,
    result_attribute: Option<String>,
    parent: Option<String>,
    /// 1-based position under its parent; 0 until registered
    order: usize,
    action: Action,
}

impl Step {
    /// Wrap an action with default flags (save on, abort off)
    pub fn new(action: Action) -> Self {
        Self {
            name: None,
            description: None,
            target: Target::Unset,
            guards: Vec::new(),
            depends_on: Vec::new(),
            abort_on_failure: false,
            abort_message: None,
            save_result: true,
            result_attribute: None,
            parent: None,
            order: 0,
            action,
        }
    }

    pub fn utility(utility: impl Utility + 'static) -> Self {
        Self::from_utility(Arc::new(utility))
    }

    /// Utility step from a shared leaf, honouring the leaf's save/abort defaults
    pub fn from_utility(utility: Arc<dyn Utility>) -> Self {
        let save = utility.saves_result();
        let abort = utility.aborts_on_failure();
        let mut step = Self::new(Action::Utility(utility));
        step.save_result = save;
        step.abort_on_failure = abort;
        step
    }

    pub fn operation(operation: impl Operation + 'static) -> Self {
        Self::new(Action::Operation(Arc::new(operation)))
    }

    pub fn condition(condition: impl Condition + 'static) -> Self {
        Self::new(Action::Condition(Arc::new(condition)))
    }

    pub fn multiple(fan_out: MultipleOperations) -> Self {
        Self::new(Action::FanOut(fan_out))
    }

    pub fn group(group: StepGroup) -> Self {
        Self::new(Action::Group(group))
    }

    pub fn repeat(step_loop: StepLoop) -> Self {
        Self::new(Action::Loop(step_loop))
    }

    // ------------------------------------------------------------------------
    // Builder
    // ------------------------------------------------------------------------

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn described(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Point at a path relative to the application root
    pub fn relative(mut self, path: impl AsRef<str>) -> Self {
        self.target = Target::relative(path);
        self
    }

    /// Point at the absolute path held by a context attribute
    pub fn absolute(mut self, attribute: impl Into<String>) -> Self {
        self.target = Target::attribute(attribute);
        self
    }

    /// Point at a path under the absolute path held by a context attribute
    pub fn absolute_with(mut self, attribute: impl Into<String>, additional: impl AsRef<str>) -> Self {
        self.target = Target::attribute_with(attribute, additional);
        self
    }

    pub fn at(mut self, target: Target) -> Self {
        self.target = target;
        self
    }

    /// Add a guard; all guards must pass for the step to run
    pub fn when(mut self, guard: Guard) -> Self {
        self.guards.push(guard);
        self
    }

    /// Run only if the attribute holds `true`
    pub fn execute_if(self, attribute: impl Into<String>) -> Self {
        self.when(Guard::attribute(attribute))
    }

    /// Run unless the attribute holds `true`
    pub fn execute_unless(self, attribute: impl Into<String>) -> Self {
        self.when(Guard::attribute(attribute).negate())
    }

    /// Run only if the named step ran without a dependency failure
    pub fn depends_on(mut self, step_name: impl Into<String>) -> Self {
        self.depends_on.push(step_name.into());
        self
    }

    pub fn abort_on_failure(mut self, abort: bool) -> Self {
        self.abort_on_failure = abort;
        self
    }

    /// Abort on failure with a custom message
    pub fn abort_with(mut self, message: impl Into<String>) -> Self {
        self.abort_on_failure = true;
        self.abort_message = Some(message.into());
        self
    }

    pub fn save_result(mut self, save: bool) -> Self {
        self.save_result = save;
        self
    }

    /// Save the value under this attribute instead of the step name
    pub fn result_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.result_attribute = Some(attribute.into());
        self
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    /// Step name; empty until named or registered
    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or_default()
    }

    #[inline]
    pub fn has_name(&self) -> bool {
        self.name.is_some()
    }

    pub fn description(&self) -> String {
        if let Some(description) = &self.description {
            return description.clone();
        }
        match &self.target {
            Target::Unset => self.action.description(),
            target => format!("{} ({target})", self.action.description()),
        }
    }

    #[inline]
    pub fn target(&self) -> &Target {
        &self.target
    }

    #[inline]
    pub fn guards(&self) -> &[Guard] {
        &self.guards
    }

    #[inline]
    pub fn dependencies(&self) -> &[String] {
        &self.depends_on
    }

    #[inline]
    pub fn aborts_on_failure(&self) -> bool {
        self.abort_on_failure
    }

    pub fn abort_message(&self) -> Option<&str> {
        self.abort_message.as_deref()
    }

    #[inline]
    pub fn saves_result(&self) -> bool {
        self.save_result
    }

    /// Context key the value is saved under
    pub fn result_key(&self) -> &str {
        self.result_attribute.as_deref().unwrap_or_else(|| self.name())
    }

    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    #[inline]
    pub fn order(&self) -> usize {
        self.order
    }

    #[inline]
    pub fn action(&self) -> &Action {
        &self.action
    }

    pub(crate) fn action_mut(&mut self) -> &mut Action {
        &mut self.action
    }

    pub fn kind(&self) -> &'static str {
        self.action.kind()
    }

    /// Whether the engine must resolve a target before running the step
    pub fn requires_target(&self) -> bool {
        self.action.requires_target()
    }

    /// Mutating steps are counted as operations, everything else as utilities
    pub fn is_operation(&self) -> bool {
        matches!(self.action, Action::Operation(_))
    }

    /// Give the step its position and, if it has none, a derived name
    pub(crate) fn assign(&mut self, parent_name: &str, order: usize, child: bool) {
        self.order = order;
        if self.name.is_none() {
            self.name = Some(format!("{parent_name}-{order}-{}", self.kind()));
        }
        if child {
            self.parent = Some(parent_name.to_string());
        }
    }
}

/// Produce a child step from a template.
///
/// The child is named `{parent}-{order}-{Kind}`, points back at `parent` and
/// takes `target` when one is given (the template's own target otherwise).
/// Guards, dependencies, flags and a custom result attribute carry over.
/// Children of a group template are specialized again under the new name, so
/// every copy gets its own ledger names.
pub fn specialize(template: &Step, parent: &str, order: usize, target: Option<Target>) -> Step {
    let mut child = template.clone();
    child.name = None;
    child.assign(parent, order, true);
    if let Some(target) = target {
        child.target = target;
    }
    let name = child.name().to_string();
    if let Action::Group(group) = &mut child.action {
        group.respecialize(&name);
    }
    child
}
