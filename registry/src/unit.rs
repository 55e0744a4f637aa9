//! Loading tool source units into isolated script namespaces.
//!
//! A source unit is a Rhai script. Loading a unit compiles it, runs its
//! top-level statements in a fresh engine and scope, and collects the tools
//! it registered through the host function `register_tool`:
//!
//! ```text
//! fn greet_user(name) {
//!     #{ message: `Hello, ${name}! Welcome!` }
//! }
//!
//! register_tool("greet_user", "Greets the user with a personalized message.");
//! ```
//!
//! The [`UnitLoader`] trait is the single "load isolated unit" capability.
//! [`RegistryUnitLoader`] commits registrations into a pending snapshot,
//! [`SandboxUnitLoader`] throws them away.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use rhai::{AST, CallFnOptions, Dynamic, Engine, EvalAltResult, FnPtr, ImmutableString, Map, Scope};
use tracing::debug;

use crate::error::LoadError;
use crate::snapshot::{DirectoryId, RegistrySnapshot, SnapshotBuilder};
use crate::tool::{
    InvocationResult, ToolDefinition, ToolEntry, is_valid_tool_name, schema_from_params,
};

/// File extension of tool source units.
pub const DEFAULT_UNIT_EXTENSION: &str = "rhai";

/// Host function units call to register a tool.
pub const REGISTER_FN: &str = "register_tool";

static LOAD_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Generate a module identifier that is unique for every load, including
/// repeated loads of the same file.
pub fn next_module_id(namespace: &str, stem: &str) -> String {
    let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    let sequence = LOAD_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!("{namespace}.{stem}.{nanos}-{sequence}")
}

/// File stem of a unit path, used as its short name.
pub fn unit_stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// One file's worth of tool-defining source.
#[derive(Debug, Clone)]
pub struct SourceUnit {
    /// Where the source came from.
    pub path: PathBuf,

    /// Load-time unique identifier.
    pub module_id: String,

    /// Script source text.
    pub source: String,
}

impl SourceUnit {
    /// Create a unit from source text already in memory.
    pub fn new(
        path: impl Into<PathBuf>,
        module_id: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            module_id: module_id.into(),
            source: source.into(),
        }
    }

    /// Read a unit from disk, assigning it a fresh module identifier.
    pub fn read(path: &Path, namespace: &str) -> Result<Self, LoadError> {
        let source = std::fs::read_to_string(path).map_err(|e| LoadError::Read {
            unit: path.display().to_string(),
            message: e.to_string(),
        })?;

        Ok(Self::new(path, next_module_id(namespace, &unit_stem(path)), source))
    }

    /// Label used in logs and errors.
    pub fn label(&self) -> String {
        self.path.display().to_string()
    }
}

/// A named member of a loaded namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Member {
    /// A script function.
    Function { params: Vec<String> },

    /// A top-level variable.
    Value { type_name: String, callable: bool },
}

impl Member {
    /// Whether the member can be called.
    pub fn is_callable(&self) -> bool {
        match self {
            Self::Function { .. } => true,
            Self::Value { callable, .. } => *callable,
        }
    }
}

/// A tool registration made by a unit during its load.
#[derive(Debug, Clone, PartialEq)]
pub struct Registration {
    /// Tool name.
    pub name: String,

    /// Tool description.
    pub description: String,

    /// Argument schema.
    pub schema: serde_json::Value,
}

/// The names a unit defined once its top-level statements ran.
#[derive(Debug, Clone, Default)]
pub struct Namespace {
    module_id: String,
    members: BTreeMap<String, Member>,
    registrations: Vec<Registration>,
}

impl Namespace {
    /// Identifier of the load that produced this namespace.
    pub fn module_id(&self) -> &str {
        &self.module_id
    }

    /// Look up a member by exact name.
    pub fn member(&self, name: &str) -> Option<&Member> {
        self.members.get(name)
    }

    /// All members in name order.
    pub fn members(&self) -> impl Iterator<Item = (&str, &Member)> {
        self.members.iter().map(|(name, member)| (name.as_str(), member))
    }

    /// Tools the unit registered, in call order.
    pub fn registrations(&self) -> &[Registration] {
        &self.registrations
    }
}

/// Loads one source unit into an isolated namespace.
pub trait UnitLoader {
    /// Execute `unit` and return what it defined.
    fn load_unit(&self, unit: &SourceUnit) -> Result<Namespace, LoadError>;
}

/// Build the engine used to run units and invoke their functions.
pub fn script_engine() -> Engine {
    let mut engine = Engine::new();
    engine.on_print(|text| debug!(target: "toolsmith::script", "{text}"));
    engine
}

#[derive(Default)]
struct RegistrationState {
    taken: BTreeSet<String>,
    pending: Vec<Registration>,
    rejection: Option<LoadError>,
}

impl RegistrationState {
    fn reject(&mut self, error: LoadError) -> Box<EvalAltResult> {
        let message = error.to_string();
        self.rejection.get_or_insert(error);
        message.into()
    }

    fn claim(
        &mut self,
        unit: &str,
        directory: &str,
        registration: Registration,
    ) -> Result<(), Box<EvalAltResult>> {
        let name = &registration.name;
        if !is_valid_tool_name(name) {
            return Err(self.reject(LoadError::Registration {
                unit: unit.to_string(),
                message: format!("`{name}` is not a valid tool name"),
            }));
        }
        if self.taken.contains(name) || self.pending.iter().any(|r| &r.name == name) {
            return Err(self.reject(LoadError::NameCollision {
                unit: unit.to_string(),
                name: name.clone(),
                directory: directory.to_string(),
            }));
        }

        self.pending.push(registration);
        Ok(())
    }
}

/// Binds `register_tool` to one unit's registration state.
#[derive(Clone)]
struct Registrar {
    unit: String,
    directory: String,
    functions: Arc<BTreeMap<String, Vec<String>>>,
    state: Arc<Mutex<RegistrationState>>,
}

impl Registrar {
    fn register(
        &self,
        name: &str,
        description: &str,
        schema: Option<Map>,
    ) -> Result<(), Box<EvalAltResult>> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        let Some(params) = self.functions.get(name) else {
            return Err(state.reject(LoadError::Registration {
                unit: self.unit.clone(),
                message: format!("`{REGISTER_FN}(\"{name}\")` has no function `{name}` to call"),
            }));
        };

        let schema = match schema {
            Some(map) => rhai::serde::from_dynamic::<serde_json::Value>(&Dynamic::from(map))?,
            None => schema_from_params(params),
        };

        state.claim(
            &self.unit,
            &self.directory,
            Registration {
                name: name.to_string(),
                description: description.to_string(),
                schema,
            },
        )
    }

    fn install(&self, engine: &mut Engine) {
        let registrar = self.clone();
        engine.register_fn(REGISTER_FN, move |name: ImmutableString, description: ImmutableString| {
            registrar.register(&name, &description, None)
        });

        let registrar = self.clone();
        engine.register_fn(
            REGISTER_FN,
            move |name: ImmutableString, description: ImmutableString, schema: Map| {
                registrar.register(&name, &description, Some(schema))
            },
        );
    }
}

struct ExecutedUnit {
    namespace: Namespace,
    ast: Arc<AST>,
}

/// Compile and run a unit in a throwaway engine.
///
/// Registrations are checked against `taken` and against each other; the
/// first rejected registration fails the whole unit.
fn execute_unit(
    unit: &SourceUnit,
    directory: &str,
    taken: BTreeSet<String>,
) -> Result<ExecutedUnit, LoadError> {
    let label = unit.label();
    let mut engine = script_engine();

    let mut ast = engine.compile(&unit.source).map_err(|e| LoadError::Compile {
        unit: label.clone(),
        message: e.to_string(),
    })?;
    ast.set_source(unit.module_id.as_str());

    let functions: BTreeMap<String, Vec<String>> = ast
        .iter_functions()
        .map(|f| (f.name.to_string(), f.params.iter().map(ToString::to_string).collect()))
        .collect();
    let functions = Arc::new(functions);

    let state = Arc::new(Mutex::new(RegistrationState {
        taken,
        ..Default::default()
    }));
    Registrar {
        unit: label.clone(),
        directory: directory.to_string(),
        functions: Arc::clone(&functions),
        state: Arc::clone(&state),
    }
    .install(&mut engine);

    let mut scope = Scope::new();
    let outcome = engine.run_ast_with_scope(&mut scope, &ast);

    let state = std::mem::take(&mut *state.lock().unwrap_or_else(PoisonError::into_inner));
    if let Some(rejection) = state.rejection {
        return Err(rejection);
    }
    outcome.map_err(|e| LoadError::Execute {
        unit: label,
        message: e.to_string(),
    })?;

    let mut members = BTreeMap::new();
    for (name, _, value) in scope.iter() {
        members.insert(
            name.to_string(),
            Member::Value {
                type_name: value.type_name().to_string(),
                callable: value.is::<FnPtr>(),
            },
        );
    }
    for (name, params) in functions.iter() {
        members.insert(name.clone(), Member::Function { params: params.clone() });
    }

    Ok(ExecutedUnit {
        namespace: Namespace {
            module_id: unit.module_id.clone(),
            members,
            registrations: state.pending,
        },
        ast: Arc::new(ast),
    })
}

/// A tool backed by a script function.
#[derive(Clone)]
pub struct ScriptFunction {
    engine: Arc<Engine>,
    ast: Arc<AST>,
    function: String,
    params: Vec<String>,
}

impl fmt::Debug for ScriptFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptFunction")
            .field("function", &self.function)
            .field("params", &self.params)
            .field("source", &self.ast.source())
            .finish()
    }
}

impl ScriptFunction {
    /// Call the function on the current thread.
    pub fn call_blocking(&self, args: serde_json::Value) -> InvocationResult {
        let args = bind_arguments(&self.function, &self.params, args)?;

        // The unit's top-level statements already ran at load time.
        let options = CallFnOptions::new().eval_ast(false);
        let mut scope = Scope::new();
        let result: Dynamic = self
            .engine
            .call_fn_with_options(options, &mut scope, &self.ast, &self.function, args)
            .map_err(|e| e.to_string())?;

        rhai::serde::from_dynamic::<serde_json::Value>(&result)
            .map_err(|e| format!("`{}` returned a value that is not JSON: {e}", self.function))
    }
}

#[async_trait]
impl ToolEntry for ScriptFunction {
    async fn call(&self, args: serde_json::Value) -> InvocationResult {
        let function = self.clone();
        tokio::task::spawn_blocking(move || function.call_blocking(args))
            .await
            .map_err(|e| format!("tool task failed: {e}"))?
    }
}

/// Map JSON arguments onto a script function's parameters.
///
/// Objects bind by parameter name, arrays bind positionally, and a bare
/// value is passed to a single-parameter function.
fn bind_arguments(
    function: &str,
    params: &[String],
    args: serde_json::Value,
) -> Result<Vec<Dynamic>, String> {
    let values = match args {
        serde_json::Value::Object(mut map) => {
            let values = params
                .iter()
                .map(|p| {
                    map.remove(p)
                        .ok_or_else(|| format!("missing argument `{p}` for `{function}`"))
                })
                .collect::<Result<Vec<_>, _>>()?;
            if let Some(extra) = map.keys().next() {
                return Err(format!("unexpected argument `{extra}` for `{function}`"));
            }
            values
        }
        serde_json::Value::Array(items) => items,
        serde_json::Value::Null => Vec::new(),
        other => vec![other],
    };

    if values.len() != params.len() {
        return Err(format!(
            "`{function}` takes {} arguments, got {}",
            params.len(),
            values.len()
        ));
    }

    values
        .iter()
        .map(|value| rhai::serde::to_dynamic(value).map_err(|e| e.to_string()))
        .collect()
}

/// Loader that commits each unit's registrations into a pending snapshot.
pub struct RegistryUnitLoader {
    builder: Mutex<SnapshotBuilder>,
    invoker: Arc<Engine>,
}

impl RegistryUnitLoader {
    /// Create a loader building a snapshot for `directory`.
    pub fn new(directory: DirectoryId) -> Self {
        Self::with_invoker(directory, Arc::new(script_engine()))
    }

    /// Create a loader whose tools are invoked through `invoker`.
    pub fn with_invoker(directory: DirectoryId, invoker: Arc<Engine>) -> Self {
        Self {
            builder: Mutex::new(SnapshotBuilder::new(directory)),
            invoker,
        }
    }

    /// Finish the load pass.
    pub fn into_snapshot(self) -> RegistrySnapshot {
        self.builder
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
            .build()
    }
}

impl UnitLoader for RegistryUnitLoader {
    fn load_unit(&self, unit: &SourceUnit) -> Result<Namespace, LoadError> {
        let (taken, directory) = {
            let builder = self.builder.lock().unwrap_or_else(PoisonError::into_inner);
            (builder.names(), builder.directory().to_string())
        };

        let executed = execute_unit(unit, &directory, taken)?;
        let definitions = executed
            .namespace
            .registrations()
            .iter()
            .map(|registration| {
                let params = match executed.namespace.member(&registration.name) {
                    Some(Member::Function { params }) => params.clone(),
                    _ => Vec::new(),
                };
                let entry = ScriptFunction {
                    engine: Arc::clone(&self.invoker),
                    ast: Arc::clone(&executed.ast),
                    function: registration.name.clone(),
                    params,
                };
                ToolDefinition::new(
                    &registration.name,
                    &registration.description,
                    registration.schema.clone(),
                    Arc::new(entry),
                )
                .with_origin(&unit.path, &unit.module_id)
            })
            .collect();

        self.builder
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .register_all(definitions)
            .map_err(|e| LoadError::Registration {
                unit: unit.label(),
                message: e.to_string(),
            })?;

        Ok(executed.namespace)
    }
}

/// Loader for throwaway trial loads. Nothing it loads is ever registered.
#[derive(Debug, Default, Clone, Copy)]
pub struct SandboxUnitLoader;

impl UnitLoader for SandboxUnitLoader {
    fn load_unit(&self, unit: &SourceUnit) -> Result<Namespace, LoadError> {
        execute_unit(unit, "sandbox", BTreeSet::new()).map(|executed| executed.namespace)
    }
}
