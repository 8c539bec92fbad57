//! The DuDraw function catalog: the fixed reference data the retrieval store is built from.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

const BUILTIN_CATALOG: &str = include_str!("../data/dudraw_functions.json");

/// Name reported for the catalog compiled into the binary
pub const BUILTIN_SOURCE: &str = "dudraw_functions.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionRecord {
    pub id: String,
    pub description: String,
    pub syntax: String,
    pub params: String,
    pub example: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl FunctionRecord {
    /// The text that gets embedded for similarity search
    pub fn document(&self) -> String {
        format!(
            "{}. Keywords: {}",
            self.description,
            self.keywords.join(", ")
        )
    }

    /// Metadata stored next to the document, with list fields flattened to strings
    pub fn metadata(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("id".to_string(), self.id.clone()),
            ("description".to_string(), self.description.clone()),
            ("syntax".to_string(), self.syntax.clone()),
            ("params".to_string(), self.params.clone()),
            ("example".to_string(), self.example.clone()),
            ("keywords".to_string(), self.keywords.join(", ")),
        ])
    }
}

#[derive(Debug, Clone)]
pub struct Catalog {
    records: Vec<FunctionRecord>,
    source: String,
}

impl Catalog {
    /// Load the catalog compiled into the crate
    pub fn builtin() -> Result<Self> {
        Self::parse(BUILTIN_CATALOG, BUILTIN_SOURCE)
    }

    /// Load a catalog from a JSON file holding an array of records
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read catalog file {}", path.display()))?;
        Self::parse(&raw, &path.display().to_string())
    }

    pub fn parse(raw: &str, source: &str) -> Result<Self> {
        let records: Vec<FunctionRecord> = serde_json::from_str(raw)
            .with_context(|| format!("Failed to parse catalog {}", source))?;

        let mut seen = HashSet::new();
        for record in &records {
            if !seen.insert(record.id.as_str()) {
                return Err(anyhow!("Duplicate function id in catalog: {}", record.id));
            }
        }

        Ok(Self {
            records,
            source: source.to_string(),
        })
    }

    pub fn records(&self) -> &[FunctionRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// SHA-256 of the serialized records, used to stamp a populated collection
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for record in &self.records {
            // serializing a plain struct of strings cannot fail
            if let Ok(bytes) = serde_json::to_vec(record) {
                hasher.update(&bytes);
            }
            hasher.update(b"\n");
        }
        format!("{:x}", hasher.finalize())
    }
}
