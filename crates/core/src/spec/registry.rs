//! Registry of record types keyed by schema identity

use super::{RecordType, SpecInfo};
use crate::errors::{Error, Result};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;

static GLOBAL_REGISTRY: Lazy<SpecRegistry> = Lazy::new(SpecRegistry::new);

/// Interns record types so that equal specs share one [`RecordType`]
#[derive(Debug, Default)]
pub struct SpecRegistry {
    types: RwLock<HashMap<String, Arc<RecordType>>>,
}

impl SpecRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry shared by the whole process
    pub fn global() -> &'static SpecRegistry {
        &GLOBAL_REGISTRY
    }

    /// Schema identity: a digest of the canonical spec encoding
    pub fn identity(spec: &SpecInfo) -> Result<String> {
        let encoded = serde_json::to_vec(spec)
            .map_err(|e| Error::json(format!("failed to encode spec '{}'", spec.name), e))?;
        Ok(format!("{:x}", Sha256::digest(&encoded)))
    }

    /// Return the record type for `spec`, building it on first use
    pub fn resolve(&self, spec: &SpecInfo) -> Result<Arc<RecordType>> {
        let identity = Self::identity(spec)?;
        if let Some(existing) = self.types.read().get(&identity) {
            return Ok(Arc::clone(existing));
        }

        let fields = spec.resolved_fields()?;
        let built = Arc::new(RecordType::new(spec.clone(), fields, identity.clone()));

        let mut types = self.types.write();
        let entry = types.entry(identity).or_insert(built);
        tracing::trace!(spec = %spec.name, "record type registered");
        Ok(Arc::clone(entry))
    }

    pub fn len(&self) -> usize {
        self.types.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.read().is_empty()
    }
}
