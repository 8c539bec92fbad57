use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use usearch::{Index, IndexOptions, MetricKind, ScalarKind};

use super::embedding::Embedder;

pub type Metadata = BTreeMap<String, String>;

/// A document to be embedded and stored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub text: String,
    pub metadata: Metadata,
}

impl Document {
    pub fn new<I: Into<String>, T: Into<String>>(id: I, text: T, metadata: Metadata) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            metadata,
        }
    }
}

/// A persistent nearest-neighbour collection of documents
#[async_trait]
pub trait Collection: Send + Sync {
    fn name(&self) -> &str;

    async fn count(&self) -> Result<usize>;

    /// Insert documents, replacing any stored entry with the same id
    async fn upsert(&self, documents: Vec<Document>) -> Result<()>;

    /// Metadata of up to `k` stored documents, nearest to `text` first
    async fn query(&self, text: &str, k: usize) -> Result<Vec<Metadata>>;

    async fn clear(&self) -> Result<()>;

    /// The catalog stamp recorded when the collection was last populated
    async fn fingerprint(&self) -> Result<Option<String>>;

    async fn set_fingerprint(&self, fingerprint: &str) -> Result<()>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredEntry {
    key: u64,
    id: String,
    text: String,
    metadata: Metadata,
}

/// Everything but the vectors, persisted as JSON next to the index
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Manifest {
    #[serde(default)]
    fingerprint: Option<String>,
    #[serde(default)]
    dimensions: Option<usize>,
    #[serde(default)]
    next_key: u64,
    #[serde(default)]
    entries: Vec<StoredEntry>,
}

struct State {
    manifest: Manifest,
    index: Option<Index>,
}

/// A collection persisted under `dir` as `{name}.json` (documents and metadata) and
/// `{name}.usearch` (a cosine HNSW index over their embeddings)
pub struct LocalCollection {
    name: String,
    path: PathBuf,
    index_path: PathBuf,
    embedder: Arc<dyn Embedder>,
    state: RwLock<State>,
}

fn new_index(dimensions: usize) -> Result<Index> {
    let options = IndexOptions {
        dimensions,
        metric: MetricKind::Cos,
        quantization: ScalarKind::F32,
        connectivity: 0,
        expansion_add: 0,
        expansion_search: 0,
        multi: false,
    };
    Index::new(&options).map_err(|e| anyhow!("Failed to create vector index: {}", e))
}

fn index_for(slot: &mut Option<Index>, dimensions: usize) -> Result<&Index> {
    if slot.is_none() {
        *slot = Some(new_index(dimensions)?);
    }
    slot.as_ref()
        .ok_or_else(|| anyhow!("Vector index is unavailable"))
}

fn path_str(path: &Path) -> Result<&str> {
    path.to_str()
        .ok_or_else(|| anyhow!("Store path {} is not valid UTF-8", path.display()))
}

impl LocalCollection {
    /// Open the named collection under `dir`, creating the directory if needed.
    /// A missing manifest is an empty collection.
    pub async fn open(
        dir: impl AsRef<Path>,
        name: &str,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self> {
        let dir = dir.as_ref();
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create store directory {}", dir.display()))?;

        let path = dir.join(format!("{}.json", name));
        let index_path = dir.join(format!("{}.usearch", name));
        let manifest: Manifest = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .with_context(|| format!("Failed to parse collection {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Manifest::default(),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read collection {}", path.display()))
            }
        };

        let index = match manifest.dimensions {
            Some(dimensions) if !manifest.entries.is_empty() => {
                let index = new_index(dimensions)?;
                index
                    .load(path_str(&index_path)?)
                    .map_err(|e| anyhow!("Failed to load vector index {}: {}", index_path.display(), e))?;
                Some(index)
            }
            _ => None,
        };

        tracing::debug!(
            collection = name,
            path = %path.display(),
            entries = manifest.entries.len(),
            vectors = index.as_ref().map_or(0, |index| index.size()),
            "opened collection"
        );

        Ok(Self {
            name: name.to_string(),
            path,
            index_path,
            embedder,
            state: RwLock::new(State { manifest, index }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    async fn persist(&self, state: &State) -> Result<()> {
        match &state.index {
            Some(index) => index
                .save(path_str(&self.index_path)?)
                .map_err(|e| anyhow!("Failed to write vector index {}: {}", self.index_path.display(), e))?,
            None => match tokio::fs::remove_file(&self.index_path).await {
                Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
                    return Err(e).with_context(|| {
                        format!("Failed to remove vector index {}", self.index_path.display())
                    })
                }
                _ => {}
            },
        }

        let bytes = serde_json::to_vec(&state.manifest)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes)
            .await
            .with_context(|| format!("Failed to write collection {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("Failed to write collection {}", self.path.display()))?;
        Ok(())
    }

    fn check_dimensions(&self, expected: Option<usize>, actual: usize) -> Result<()> {
        match expected {
            Some(expected) if expected != actual => Err(anyhow!(
                "Collection {} holds {}-dimension vectors but the embedder produced {}",
                self.name,
                expected,
                actual
            )),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl Collection for LocalCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.state.read().await.manifest.entries.len())
    }

    async fn upsert(&self, documents: Vec<Document>) -> Result<()> {
        if documents.is_empty() {
            return Ok(());
        }

        let texts: Vec<String> = documents.iter().map(|d| d.text.clone()).collect();
        let embeddings = self.embedder.embed(&texts).await?;
        if embeddings.len() != documents.len() {
            bail!(
                "Expected {} embeddings, got {}",
                documents.len(),
                embeddings.len()
            );
        }
        let dimensions = embeddings.first().map_or(0, Vec::len);

        let mut state = self.state.write().await;
        self.check_dimensions(state.manifest.dimensions, dimensions)?;
        let State { manifest, index } = &mut *state;
        let index = index_for(index, dimensions)?;
        manifest.dimensions = Some(dimensions);

        index
            .reserve(index.capacity() + documents.len())
            .map_err(|e| anyhow!("Failed to grow vector index: {}", e))?;
        for (document, embedding) in documents.into_iter().zip(embeddings) {
            self.check_dimensions(Some(dimensions), embedding.len())?;
            if let Some(position) = manifest.entries.iter().position(|e| e.id == document.id) {
                let replaced = manifest.entries.remove(position);
                index
                    .remove(replaced.key)
                    .map_err(|e| anyhow!("Failed to replace {}: {}", replaced.id, e))?;
            }

            let key = manifest.next_key;
            manifest.next_key += 1;
            index
                .add(key, embedding.as_slice())
                .map_err(|e| anyhow!("Failed to index {}: {}", document.id, e))?;
            manifest.entries.push(StoredEntry {
                key,
                id: document.id,
                text: document.text,
                metadata: document.metadata,
            });
        }

        self.persist(&state).await
    }

    async fn query(&self, text: &str, k: usize) -> Result<Vec<Metadata>> {
        let state = self.state.read().await;
        let Some(index) = &state.index else {
            return Ok(Vec::new());
        };
        if state.manifest.entries.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let query = self
            .embedder
            .embed(&[text.to_string()])
            .await?
            .pop()
            .unwrap_or_default();
        self.check_dimensions(state.manifest.dimensions, query.len())?;

        let matches = index
            .search(query.as_slice(), k)
            .map_err(|e| anyhow!("Vector search failed: {}", e))?;

        Ok(matches
            .keys
            .iter()
            .filter_map(|key| state.manifest.entries.iter().find(|e| e.key == *key))
            .map(|entry| entry.metadata.clone())
            .collect())
    }

    async fn clear(&self) -> Result<()> {
        let mut state = self.state.write().await;
        state.index = None;
        state.manifest = Manifest::default();
        self.persist(&state).await
    }

    async fn fingerprint(&self) -> Result<Option<String>> {
        Ok(self.state.read().await.manifest.fingerprint.clone())
    }

    async fn set_fingerprint(&self, fingerprint: &str) -> Result<()> {
        let mut state = self.state.write().await;
        state.manifest.fingerprint = Some(fingerprint.to_string());
        self.persist(&state).await
    }
}
