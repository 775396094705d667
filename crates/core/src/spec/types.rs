//! Field descriptors and the capability bases records are built on

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Declared type of a record field
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    /// Unconstrained
    Any,
    Bool,
    Int,
    Float,
    Str,
    /// A filesystem path, carried as a string
    File,
    List(Box<FieldType>),
    Optional(Box<FieldType>),
    /// A bind mount: `[host, container, mode?]`
    Binding,
    /// A single word or a list of words
    Words,
}

impl FieldType {
    #[must_use]
    pub fn list(inner: FieldType) -> Self {
        FieldType::List(Box::new(inner))
    }

    #[must_use]
    pub fn optional(inner: FieldType) -> Self {
        FieldType::Optional(Box::new(inner))
    }

    /// Whether `value` fits this type. `null` marks an absent value and fits every type.
    pub fn accepts(&self, value: &Value) -> bool {
        if value.is_null() {
            return true;
        }
        match self {
            FieldType::Any => true,
            FieldType::Bool => value.is_boolean(),
            FieldType::Int => value.is_i64() || value.is_u64(),
            FieldType::Float => value.is_number(),
            FieldType::Str | FieldType::File => value.is_string(),
            FieldType::List(inner) => value
                .as_array()
                .is_some_and(|items| items.iter().all(|item| inner.accepts(item))),
            FieldType::Optional(inner) => inner.accepts(value),
            FieldType::Binding => is_binding(value),
            FieldType::Words => {
                value.is_string()
                    || value
                        .as_array()
                        .is_some_and(|items| items.iter().all(Value::is_string))
            }
        }
    }
}

fn is_binding(value: &Value) -> bool {
    match value {
        Value::Array(parts) => {
            (parts.len() == 2 || parts.len() == 3)
                && parts[0].is_string()
                && parts[1].is_string()
                && parts.get(2).map_or(true, |mode| mode.is_null() || mode.is_string())
        }
        Value::Object(fields) => {
            fields.get("host").is_some_and(Value::is_string)
                && fields.get("container").is_some_and(Value::is_string)
        }
        _ => false,
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Any => write!(f, "any"),
            FieldType::Bool => write!(f, "bool"),
            FieldType::Int => write!(f, "int"),
            FieldType::Float => write!(f, "float"),
            FieldType::Str => write!(f, "str"),
            FieldType::File => write!(f, "file"),
            FieldType::List(inner) => write!(f, "list[{inner}]"),
            FieldType::Optional(inner) => write!(f, "optional[{inner}]"),
            FieldType::Binding => write!(f, "binding"),
            FieldType::Words => write!(f, "words"),
        }
    }
}

/// One named field of a record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: FieldType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub help: Option<String>,
}

impl FieldSpec {
    /// A field with no default
    pub fn new(name: impl Into<String>, ty: FieldType) -> Self {
        Self {
            name: name.into(),
            ty,
            default: None,
            help: None,
        }
    }

    #[must_use]
    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    #[must_use]
    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    /// Value a fresh record holds for this field
    pub fn initial_value(&self) -> Value {
        self.default.clone().unwrap_or(Value::Null)
    }
}

/// Capability base a record type derives from.
///
/// Each base contributes inherited fields ahead of the declared ones.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecBase {
    #[default]
    Base,
    Shell,
    ShellOutput,
    Container,
    Docker,
    Singularity,
}

impl SpecBase {
    /// Fields inherited from this base, in declaration order
    pub fn inherited_fields(self) -> Vec<FieldSpec> {
        let executable = FieldSpec::new("executable", FieldType::Words)
            .with_help("program to run, a single string or a list of words");

        let container_fields = |runtime: Option<&str>| {
            let mut container = FieldSpec::new("container", FieldType::optional(FieldType::Str))
                .with_help("container runtime executable");
            if let Some(runtime) = runtime {
                container = container.with_default(runtime);
            }
            vec![
                executable.clone(),
                container,
                FieldSpec::new("image", FieldType::optional(FieldType::Str))
                    .with_help("image reference passed to the runtime"),
                FieldSpec::new("container_xargs", FieldType::optional(FieldType::list(FieldType::Str)))
                    .with_help("extra flags placed after `run`"),
                FieldSpec::new("bindings", FieldType::list(FieldType::Binding))
                    .with_default(Value::Array(Vec::new()))
                    .with_help("bind mounts as (host, container, mode)"),
            ]
        };

        match self {
            SpecBase::Base => Vec::new(),
            SpecBase::Shell => vec![executable.clone()],
            SpecBase::ShellOutput => vec![
                FieldSpec::new("return_code", FieldType::Int),
                FieldSpec::new("stdout", FieldType::Str),
                FieldSpec::new("stderr", FieldType::Str),
            ],
            SpecBase::Container => container_fields(None),
            SpecBase::Docker => container_fields(Some("docker")),
            SpecBase::Singularity => container_fields(Some("singularity")),
        }
    }
}
