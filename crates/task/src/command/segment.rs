//! Command lines assembled from independently rendered segments
//!
//! Each task variant lists the segments it uses; they are rendered in
//! that order and concatenated. A container variant with bind mounts uses
//! `[Runtime, ExtraFlags, Binds, Image, Program]`, which keeps the bind
//! flags directly in front of the image reference.

use cairn_core::{Error, Record, Result};
use serde_json::Value;

/// One contiguous slice of a command line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment {
    /// `<container> run`
    Runtime,
    /// `container_xargs`, verbatim
    ExtraFlags,
    /// One `<flag> host:container:mode` pair per binding
    Binds(&'static str),
    /// The image reference
    Image,
    /// `executable` followed by `args`
    Program,
}

impl Segment {
    pub fn render(self, inputs: &Record) -> Result<Vec<String>> {
        match self {
            Segment::Runtime => {
                let runtime = required_str(inputs, "container", "Container software is not specified")?;
                Ok(vec![runtime, "run".to_string()])
            }
            Segment::ExtraFlags => words(inputs, "container_xargs"),
            Segment::Binds(flag) => {
                let mut args = Vec::new();
                for binding in bindings(inputs)? {
                    args.push(flag.to_string());
                    args.push(binding.render());
                }
                Ok(args)
            }
            Segment::Image => {
                let image = required_str(inputs, "image", "Container image is not specified")?;
                Ok(vec![image])
            }
            Segment::Program => {
                let mut args = words(inputs, "executable")?;
                args.extend(words(inputs, "args")?);
                Ok(args)
            }
        }
    }
}

/// Render `segments` in order into one command line
pub fn compose(segments: &[Segment], inputs: &Record) -> Result<Vec<String>> {
    let mut line = Vec::new();
    for segment in segments {
        line.extend(segment.render(inputs)?);
    }
    Ok(line)
}

/// A host path mounted into a container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub host: String,
    pub container: String,
    /// Defaults to `rw` when rendered
    pub mode: Option<String>,
}

impl Binding {
    pub fn new(host: impl Into<String>, container: impl Into<String>, mode: Option<&str>) -> Self {
        Self {
            host: host.into(),
            container: container.into(),
            mode: mode.map(str::to_string),
        }
    }

    /// Accepts `[host, container]`, `[host, container, mode]` or an object
    /// with `host`, `container` and optional `mode`
    pub fn from_value(value: &Value) -> Result<Self> {
        let invalid = || Error::configuration(format!("invalid binding: {value}"));
        let text = |v: Option<&Value>| v.and_then(Value::as_str).map(str::to_string);

        match value {
            Value::Array(parts) if parts.len() == 2 || parts.len() == 3 => Ok(Self {
                host: text(parts.first()).ok_or_else(invalid)?,
                container: text(parts.get(1)).ok_or_else(invalid)?,
                mode: text(parts.get(2)),
            }),
            Value::Object(fields) => Ok(Self {
                host: text(fields.get("host")).ok_or_else(invalid)?,
                container: text(fields.get("container")).ok_or_else(invalid)?,
                mode: text(fields.get("mode")),
            }),
            _ => Err(invalid()),
        }
    }

    pub fn to_value(&self) -> Value {
        match &self.mode {
            Some(mode) => Value::from(vec![self.host.as_str(), self.container.as_str(), mode.as_str()]),
            None => Value::from(vec![self.host.as_str(), self.container.as_str()]),
        }
    }

    pub fn render(&self) -> String {
        format!(
            "{}:{}:{}",
            self.host,
            self.container,
            self.mode.as_deref().unwrap_or("rw")
        )
    }
}

/// Declared bindings, in order
pub fn bindings(inputs: &Record) -> Result<Vec<Binding>> {
    match inputs.get("bindings") {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items.iter().map(Binding::from_value).collect(),
        Some(other) => Err(Error::configuration(format!(
            "bindings must be a list, got {other}"
        ))),
    }
}

fn required_str(inputs: &Record, field: &str, missing: &str) -> Result<String> {
    match inputs.get(field) {
        Some(Value::String(value)) => Ok(value.clone()),
        _ => Err(Error::configuration(missing)),
    }
}

/// A field as command words: a string is one word, a list is many
fn words(inputs: &Record, field: &str) -> Result<Vec<String>> {
    let value = match inputs.get(field) {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(value) => value,
    };
    match value {
        Value::Array(items) => items.iter().map(|item| word(field, item)).collect(),
        scalar => Ok(vec![word(field, scalar)?]),
    }
}

fn word(field: &str, value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(Error::configuration(format!(
            "field '{field}' holds {other}, which is not a command word"
        ))),
    }
}
