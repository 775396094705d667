//! Tasks that call a registered Rust function
//!
//! The task never holds a closure directly in its inputs. It holds the
//! function's registry identifier in the `_func` input, which keeps the
//! task snapshot serializable and makes the identifier part of the
//! fingerprint. The callable itself is resolved once, at construction.

use crate::kernel::{Task, TaskCore};
use cairn_core::{Error, FieldSpec, FieldType, Record, Result, SpecBase, SpecInfo, FUNCTION_FIELD};
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Arguments passed to a function, keyed by parameter name
pub type Arguments = IndexMap<String, Value>;

/// Signature of a registered callable
pub type TaskFn = dyn Fn(&Arguments) -> Result<Returned> + Send + Sync;

/// What a function hands back
#[derive(Debug, Clone, PartialEq)]
pub enum Returned {
    /// A single value, becoming the first output
    Value(Value),
    /// Several values, spread over the outputs in order
    Tuple(Vec<Value>),
}

impl Returned {
    pub fn into_outputs(self) -> Vec<Value> {
        match self {
            Returned::Value(value) => vec![value],
            Returned::Tuple(values) => values,
        }
    }
}

impl From<Value> for Returned {
    fn from(value: Value) -> Self {
        Returned::Value(value)
    }
}

/// Declared return shape of a function
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ReturnAnnotation {
    /// Nothing declared: a single untyped `out`
    #[default]
    None,
    /// A named structure with typed fields
    Named {
        name: String,
        fields: Vec<(String, FieldType)>,
    },
    /// A structure with typed fields but no name of its own
    Anonymous { fields: Vec<(String, FieldType)> },
    /// An ordered shape without field names: `out1`, `out2`, ...
    Tuple(Vec<FieldType>),
}

impl ReturnAnnotation {
    fn is_declared(&self) -> bool {
        !matches!(self, ReturnAnnotation::None)
    }

    /// Output spec implied by this annotation
    pub fn output_spec(&self) -> SpecInfo {
        let from_fields = |name: &str, fields: &[(String, FieldType)]| {
            SpecInfo::new(name, SpecBase::Base).fields(
                fields
                    .iter()
                    .map(|(field, ty)| FieldSpec::new(field.as_str(), ty.clone())),
            )
        };

        match self {
            ReturnAnnotation::None => {
                SpecInfo::new("Output", SpecBase::Base).field(FieldSpec::new("out", FieldType::Any))
            }
            ReturnAnnotation::Named { name, fields } => from_fields(name, fields),
            ReturnAnnotation::Anonymous { fields } => from_fields("Output", fields),
            ReturnAnnotation::Tuple(types) => SpecInfo::new("Output", SpecBase::Base).fields(
                types
                    .iter()
                    .enumerate()
                    .map(|(n, ty)| FieldSpec::new(format!("out{}", n + 1), ty.clone())),
            ),
        }
    }
}

/// Parameters and return shape of a function
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FunctionSignature {
    pub params: Vec<FieldSpec>,
    pub returns: ReturnAnnotation,
}

impl FunctionSignature {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn param(mut self, name: &str, ty: FieldType) -> Self {
        self.params.push(FieldSpec::new(name, ty));
        self
    }

    pub fn param_with_default(mut self, name: &str, ty: FieldType, default: impl Into<Value>) -> Self {
        self.params.push(FieldSpec::new(name, ty).with_default(default));
        self
    }

    pub fn returns(mut self, returns: ReturnAnnotation) -> Self {
        self.returns = returns;
        self
    }
}

/// A callable together with its identifier and signature
pub struct RegisteredFunction {
    id: String,
    signature: FunctionSignature,
    func: Arc<TaskFn>,
}

impl RegisteredFunction {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn signature(&self) -> &FunctionSignature {
        &self.signature
    }

    pub fn call(&self, args: &Arguments) -> Result<Returned> {
        (self.func)(args)
    }
}

impl fmt::Debug for RegisteredFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredFunction")
            .field("id", &self.id)
            .field("signature", &self.signature)
            .finish_non_exhaustive()
    }
}

static GLOBAL_FUNCTIONS: Lazy<FunctionRegistry> = Lazy::new(FunctionRegistry::new);

/// Callables addressable by a stable identifier
#[derive(Default)]
pub struct FunctionRegistry {
    functions: RwLock<HashMap<String, Arc<RegisteredFunction>>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide registry
    pub fn global() -> &'static FunctionRegistry {
        &GLOBAL_FUNCTIONS
    }

    /// Register `func` under `id`, replacing any previous registration
    pub fn register<F>(&self, id: impl Into<String>, signature: FunctionSignature, func: F) -> Arc<RegisteredFunction>
    where
        F: Fn(&Arguments) -> Result<Returned> + Send + Sync + 'static,
    {
        let id = id.into();
        let function = Arc::new(RegisteredFunction {
            id: id.clone(),
            signature,
            func: Arc::new(func),
        });
        if self
            .functions
            .write()
            .insert(id.clone(), Arc::clone(&function))
            .is_some()
        {
            tracing::debug!(function = %id, "replaced registered function");
        }
        function
    }

    pub fn get(&self, id: &str) -> Option<Arc<RegisteredFunction>> {
        self.functions.read().get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.functions.read().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.functions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.read().is_empty()
    }
}

/// Calls a registered function with the task's inputs
#[derive(Debug, Clone)]
pub struct FunctionTask {
    core: TaskCore,
    function: Arc<RegisteredFunction>,
    output: Option<Vec<Value>>,
}

impl FunctionTask {
    pub const KIND: &'static str = "FunctionTask";

    /// Task named after the function, with outputs inferred from its
    /// return annotation unless `output_spec` is given
    ///
    /// Giving an output spec for a function that also declares a return
    /// annotation is a configuration error.
    pub fn new(function: Arc<RegisteredFunction>, output_spec: Option<SpecInfo>) -> Result<Self> {
        let signature = function.signature();
        let output_spec = match output_spec {
            Some(spec) if signature.returns.is_declared() => {
                return Err(Error::configuration(format!(
                    "function '{}' declares its return type; output spec '{}' conflicts with it",
                    function.id(),
                    spec.name
                )));
            }
            Some(spec) => spec,
            None => signature.returns.output_spec(),
        };

        let input_spec = SpecInfo::new("Inputs", SpecBase::Base)
            .fields(signature.params.iter().cloned())
            .field(FieldSpec::new(FUNCTION_FIELD, FieldType::Str).with_default(function.id()));

        let mut core = TaskCore::new(
            Self::KIND,
            function.id(),
            Record::new(input_spec.build()?),
            output_spec.build()?,
        );
        core.pin_input(FUNCTION_FIELD);

        Ok(Self {
            core,
            function,
            output: None,
        })
    }

    /// Resolve `id` in `registry` and build a task around it
    pub fn from_registry(registry: &FunctionRegistry, id: &str, output_spec: Option<SpecInfo>) -> Result<Self> {
        let function = registry
            .get(id)
            .ok_or_else(|| Error::configuration(format!("no function registered as '{id}'")))?;
        Self::new(function, output_spec)
    }

    pub fn function(&self) -> &Arc<RegisteredFunction> {
        &self.function
    }

    /// Current inputs without the `_func` bookkeeping field
    pub fn arguments(&self) -> Arguments {
        self.core
            .inputs()
            .to_map()
            .iter()
            .filter(|(name, _)| name.as_str() != FUNCTION_FIELD)
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }

    /// Fail on required parameters that were never given a value
    fn check_required(&self, arguments: &Arguments) -> Result<()> {
        let missing: Vec<&str> = self
            .function
            .signature()
            .params
            .iter()
            .filter(|param| param.default.is_none() && !matches!(param.ty, FieldType::Optional(_)))
            .filter(|param| arguments.get(&param.name).map_or(true, Value::is_null))
            .map(|param| param.name.as_str())
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::configuration(format!(
                "function '{}' is missing required arguments: {}",
                self.function.id(),
                missing.join(", ")
            )))
        }
    }
}

impl Task for FunctionTask {
    fn core(&self) -> &TaskCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut TaskCore {
        &mut self.core
    }

    fn can_resume(&self) -> bool {
        true
    }

    fn execute(&mut self) -> Result<()> {
        self.output = None;
        let arguments = self.arguments();
        self.check_required(&arguments)?;
        let returned = self.function.call(&arguments)?;
        self.output = Some(returned.into_outputs());
        Ok(())
    }

    fn list_outputs(&self) -> Result<Vec<Value>> {
        Ok(self.output.clone().unwrap_or_default())
    }
}
