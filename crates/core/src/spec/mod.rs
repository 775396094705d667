//! Structured input/output records built from field descriptors
//!
//! A [`SpecInfo`] names an ordered list of [`FieldSpec`]s plus a
//! [`SpecBase`]. Building it through the [`SpecRegistry`] yields a shared
//! [`RecordType`]; [`Record`] values are instances of such a type.
//! Records are never mutated in place: [`Record::replace`] returns a new
//! record with whole values swapped for the named fields.

mod record;
mod registry;
mod types;

pub use record::{Record, RecordType};
pub use registry::SpecRegistry;
pub use types::{FieldSpec, FieldType, SpecBase};

use crate::errors::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

/// Declarative description of a record type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecInfo {
    pub name: String,
    #[serde(default)]
    pub fields: Vec<FieldSpec>,
    #[serde(default)]
    pub base: SpecBase,
}

impl SpecInfo {
    pub fn new(name: impl Into<String>, base: SpecBase) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            base,
        }
    }

    /// Append a declared field
    #[must_use]
    pub fn field(mut self, field: FieldSpec) -> Self {
        self.fields.push(field);
        self
    }

    /// Append several declared fields
    #[must_use]
    pub fn fields(mut self, fields: impl IntoIterator<Item = FieldSpec>) -> Self {
        self.fields.extend(fields);
        self
    }

    /// Build (or fetch) the record type through the process-wide registry
    pub fn build(&self) -> Result<Arc<RecordType>> {
        SpecRegistry::global().resolve(self)
    }

    /// Inherited fields followed by declared ones.
    ///
    /// A declared field that shares a name with an inherited one takes its
    /// slot, so redeclaring a base field only changes its type or default.
    pub(crate) fn resolved_fields(&self) -> Result<Vec<FieldSpec>> {
        let mut seen = HashSet::new();
        for field in &self.fields {
            if field.name.is_empty() {
                return Err(Error::schema(&self.name, "", "field name must not be empty"));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(Error::schema(
                    &self.name,
                    &field.name,
                    "declared more than once",
                ));
            }
            if let Some(default) = &field.default {
                if !field.ty.accepts(default) {
                    return Err(Error::schema(
                        &self.name,
                        &field.name,
                        format!("default {default} is not a valid {}", field.ty),
                    ));
                }
            }
        }

        let mut resolved = self.base.inherited_fields();
        for field in &self.fields {
            match resolved.iter_mut().find(|f| f.name == field.name) {
                Some(slot) => *slot = field.clone(),
                None => resolved.push(field.clone()),
            }
        }
        Ok(resolved)
    }
}
