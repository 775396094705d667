//! Deterministic task fingerprints
//!
//! A fingerprint covers the task kind and name, its implementation
//! version, and every input value keyed by field name. Inputs are hashed
//! as canonical JSON (object keys sorted at every level), so field
//! position never matters, only field names and values. Inputs declared as
//! files also contribute the digest of the file's content when the file
//! exists.

use cairn_core::{Error, FieldType, Record, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::io::{BufReader, Read};
use std::path::Path;

/// Content hasher that records what went into a digest
#[derive(Debug)]
pub struct ContentHasher {
    hasher: Sha256,
    manifest: HashManifest,
}

/// Manifest describing the hashed material, useful when debugging cache misses
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct HashManifest {
    pub label: String,
    pub inputs: Vec<String>,
    pub files: BTreeMap<String, String>,
}

impl ContentHasher {
    pub fn new(label: &str) -> Self {
        Self {
            hasher: Sha256::new(),
            manifest: HashManifest {
                label: label.to_string(),
                ..HashManifest::default()
            },
        }
    }

    /// Hash the canonical JSON encoding of `content`
    pub fn hash_content<T: Serialize + ?Sized>(&mut self, name: &str, content: &T) -> Result<()> {
        let value = serde_json::to_value(content)
            .map_err(|e| Error::json(format!("failed to encode '{name}' for hashing"), e))?;
        let serialized = canonical_json(&value);
        self.hasher.update(serialized.as_bytes());
        self.manifest
            .inputs
            .push(format!("{name}:{}", serialized.len()));
        Ok(())
    }

    /// Digest a file's content in streaming fashion and return that digest
    pub fn hash_file(&mut self, file_path: &Path) -> Result<String> {
        let file = fs::File::open(file_path)
            .map_err(|e| Error::file_system(file_path, "open file for hashing", e))?;

        let mut reader = BufReader::with_capacity(8192, file);
        let mut file_hasher = Sha256::new();
        let mut buffer = [0u8; 8192];

        loop {
            let bytes_read = reader
                .read(&mut buffer)
                .map_err(|e| Error::file_system(file_path, "read file chunk for hashing", e))?;
            if bytes_read == 0 {
                break;
            }
            file_hasher.update(&buffer[..bytes_read]);
        }

        let file_hash = format!("{:x}", file_hasher.finalize());
        let path_str = file_path.to_string_lossy().to_string();
        self.hasher.update(path_str.as_bytes());
        self.hasher.update(file_hash.as_bytes());
        self.manifest.files.insert(path_str, file_hash.clone());
        Ok(file_hash)
    }

    pub fn manifest(&self) -> &HashManifest {
        &self.manifest
    }

    /// Hex digest of everything hashed so far
    pub fn finish(self) -> String {
        format!("{:x}", self.hasher.finalize())
    }
}

/// JSON text with object keys sorted at every depth
pub fn canonical_json(value: &Value) -> String {
    canonicalize(value).to_string()
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(fields) => {
            let mut keys: Vec<_> = fields.keys().collect();
            keys.sort();
            let mut sorted = Map::new();
            for key in keys {
                sorted.insert(key.clone(), canonicalize(&fields[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// What a fingerprint is computed from
#[derive(Debug, Clone, Copy)]
pub struct FingerprintSource<'a> {
    /// Concrete task type, also the fingerprint's readable prefix
    pub kind: &'a str,
    pub name: &'a str,
    pub version: Option<&'a str>,
    pub inputs: &'a Record,
}

#[derive(Serialize)]
struct FingerprintDocument<'a> {
    kind: &'a str,
    name: &'a str,
    version: Option<&'a str>,
    inputs: BTreeMap<&'a str, &'a Value>,
}

/// Compute `<kind>_<sha256>` for a task's current identity and inputs
pub fn fingerprint(source: FingerprintSource<'_>) -> Result<String> {
    let mut hasher = ContentHasher::new(source.name);

    let inputs: BTreeMap<&str, &Value> = source
        .inputs
        .to_map()
        .iter()
        .map(|(name, value)| (name.as_str(), value))
        .collect();

    hasher.hash_content(
        "task",
        &FingerprintDocument {
            kind: source.kind,
            name: source.name,
            version: source.version,
            inputs,
        },
    )?;

    for field in source.inputs.record_type().fields() {
        if field.ty != FieldType::File {
            continue;
        }
        if let Some(path) = source.inputs.get(&field.name).and_then(Value::as_str) {
            let path = Path::new(path);
            if path.is_file() {
                hasher.hash_file(path)?;
            }
        }
    }

    Ok(format!("{}_{}", source.kind, hasher.finish()))
}
