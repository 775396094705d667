//! Record types and their values

use super::{FieldSpec, SpecInfo};
use crate::errors::{Error, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// A concrete record type: resolved fields of one [`SpecInfo`]
#[derive(Debug)]
pub struct RecordType {
    info: SpecInfo,
    fields: Vec<FieldSpec>,
    identity: String,
}

impl RecordType {
    pub(crate) fn new(info: SpecInfo, fields: Vec<FieldSpec>, identity: String) -> Self {
        Self {
            info,
            fields,
            identity,
        }
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn info(&self) -> &SpecInfo {
        &self.info
    }

    /// Resolved fields, inherited ones first
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// One line per field: `name: type [= default]  help`
    pub fn help_lines(&self) -> Vec<String> {
        self.fields
            .iter()
            .map(|field| {
                let mut line = format!("- {}: {}", field.name, field.ty);
                if let Some(default) = &field.default {
                    line.push_str(&format!(" (default: {default})"));
                }
                if let Some(help) = &field.help {
                    line.push_str(&format!("\n    {help}"));
                }
                line
            })
            .collect()
    }
}

/// An instance of a [`RecordType`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "RecordRepr", into = "RecordRepr")]
pub struct Record {
    ty: Arc<RecordType>,
    values: IndexMap<String, Value>,
}

impl Record {
    /// A record holding every field's default (or `null`)
    pub fn new(ty: Arc<RecordType>) -> Self {
        let values = ty
            .fields()
            .iter()
            .map(|f| (f.name.clone(), f.initial_value()))
            .collect();
        Self { ty, values }
    }

    /// A record with every field `null`, defaults ignored
    pub fn absent(ty: Arc<RecordType>) -> Self {
        let values = ty
            .fields()
            .iter()
            .map(|f| (f.name.clone(), Value::Null))
            .collect();
        Self { ty, values }
    }

    /// Defaults overlaid with `values`
    pub fn with_values<I, K>(ty: Arc<RecordType>, values: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Self::new(ty).replace(values)
    }

    pub fn record_type(&self) -> &Arc<RecordType> {
        &self.ty
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Typed accessor; `None` when the field is missing, `null` or of another shape
    pub fn get_as<T: serde::de::DeserializeOwned>(&self, name: &str) -> Option<T> {
        self.values
            .get(name)
            .filter(|v| !v.is_null())
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// A new record with the named fields' values replaced wholesale
    pub fn replace<I, K>(&self, overrides: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let mut values = self.values.clone();
        for (name, value) in overrides {
            let name = name.into();
            let field = self.ty.field(&name).ok_or_else(|| {
                Error::schema(self.ty.name(), &name, "no such field")
            })?;
            if !field.ty.accepts(&value) {
                return Err(Error::schema(
                    self.ty.name(),
                    &name,
                    format!("{value} is not a valid {}", field.ty),
                ));
            }
            values.insert(name, value);
        }
        Ok(Self {
            ty: Arc::clone(&self.ty),
            values,
        })
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.ty.field_names()
    }

    /// Declared defaults, `null` where a field has none
    pub fn defaults(&self) -> IndexMap<String, Value> {
        self.ty
            .fields()
            .iter()
            .map(|f| (f.name.clone(), f.initial_value()))
            .collect()
    }

    /// Every field in schema order
    pub fn to_map(&self) -> &IndexMap<String, Value> {
        &self.values
    }

    /// Every field as a JSON object
    pub fn to_value(&self) -> Value {
        Value::Object(
            self.values
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.ty.identity() == other.ty.identity() && self.values == other.values
    }
}

/// On-disk form of a record: its spec travels with the values
#[derive(Serialize, Deserialize)]
struct RecordRepr {
    spec: SpecInfo,
    values: IndexMap<String, Value>,
}

impl From<Record> for RecordRepr {
    fn from(record: Record) -> Self {
        Self {
            spec: record.ty.info().clone(),
            values: record.values,
        }
    }
}

impl TryFrom<RecordRepr> for Record {
    type Error = Error;

    fn try_from(repr: RecordRepr) -> Result<Self> {
        let ty = repr.spec.build()?;
        Record::with_values(ty, repr.values)
    }
}
