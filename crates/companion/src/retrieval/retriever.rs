use anyhow::Result;
use std::sync::Arc;
use tokio::sync::OnceCell;

use super::collection::{Collection, Document, Metadata};
use crate::catalog::Catalog;

pub const DEFAULT_TOP_K: usize = 6;

pub const NO_FUNCTIONS_FOUND: &str = "No specific DuDraw functions were found for this request.";

/// What `ensure_populated` found or did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopulateOutcome {
    /// The collection was empty and has been filled from the catalog
    Populated,
    /// The collection already held entries built from this catalog
    AlreadyPopulated,
    /// The collection holds entries built from a different catalog and was left alone
    Stale,
    /// The collection held entries from a different catalog and was rebuilt
    Rebuilt,
}

/// Answers natural-language queries with the closest catalog records, rendered as text
pub struct FunctionRetriever {
    collection: Arc<dyn Collection>,
    catalog: Arc<Catalog>,
    top_k: usize,
    rebuild_on_catalog_change: bool,
    populated: OnceCell<PopulateOutcome>,
}

impl FunctionRetriever {
    pub fn new(collection: Arc<dyn Collection>, catalog: Arc<Catalog>) -> Self {
        Self {
            collection,
            catalog,
            top_k: DEFAULT_TOP_K,
            rebuild_on_catalog_change: false,
            populated: OnceCell::new(),
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_rebuild_on_catalog_change(mut self, rebuild: bool) -> Self {
        self.rebuild_on_catalog_change = rebuild;
        self
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Fill the collection from the catalog unless it already holds entries.
    ///
    /// Succeeds at most once per retriever; concurrent callers wait on the same attempt,
    /// and a failed attempt is retried by the next caller.
    pub async fn ensure_populated(&self) -> Result<PopulateOutcome> {
        self.populated
            .get_or_try_init(|| self.populate())
            .await
            .copied()
    }

    async fn populate(&self) -> Result<PopulateOutcome> {
        let fingerprint = self.catalog.fingerprint();
        let count = self.collection.count().await?;

        if count > 0 {
            let stamp = self.collection.fingerprint().await?;
            if stamp.as_deref() == Some(fingerprint.as_str()) {
                tracing::debug!(
                    collection = self.collection.name(),
                    entries = count,
                    "collection already populated"
                );
                return Ok(PopulateOutcome::AlreadyPopulated);
            }

            if !self.rebuild_on_catalog_change {
                tracing::warn!(
                    collection = self.collection.name(),
                    entries = count,
                    stored = stamp.as_deref().unwrap_or("none"),
                    current = %fingerprint,
                    "collection was built from a different catalog; keeping existing entries"
                );
                return Ok(PopulateOutcome::Stale);
            }

            tracing::info!(
                collection = self.collection.name(),
                "catalog changed, rebuilding collection"
            );
            self.collection.clear().await?;
            self.insert_catalog(&fingerprint).await?;
            return Ok(PopulateOutcome::Rebuilt);
        }

        self.insert_catalog(&fingerprint).await?;
        Ok(PopulateOutcome::Populated)
    }

    async fn insert_catalog(&self, fingerprint: &str) -> Result<()> {
        let documents: Vec<Document> = self
            .catalog
            .records()
            .iter()
            .map(|record| Document::new(&record.id, record.document(), record.metadata()))
            .collect();
        let inserted = documents.len();

        self.collection.upsert(documents).await?;
        self.collection.set_fingerprint(fingerprint).await?;

        tracing::info!(
            collection = self.collection.name(),
            source = self.catalog.source(),
            inserted,
            "populated collection from catalog"
        );
        Ok(())
    }

    /// Metadata of the `k` nearest records to the query
    pub async fn query(&self, query: &str, k: usize) -> Result<Vec<Metadata>> {
        self.ensure_populated().await?;
        self.collection.query(query, k).await
    }

    /// Render the nearest records as reference text for the model.
    ///
    /// Store failures are reported in the returned text rather than as errors, since the
    /// result is handed straight back to the model as a tool observation.
    pub async fn retrieve(&self, query: &str, k: usize) -> String {
        match self.query(query, k).await {
            Ok(hits) if hits.is_empty() => NO_FUNCTIONS_FOUND.to_string(),
            Ok(hits) => hits
                .iter()
                .map(format_function)
                .collect::<Vec<_>>()
                .join("\n"),
            Err(e) => {
                tracing::error!(error = %e, "function retrieval failed");
                format!("Error: Could not retrieve functions: {}", e)
            }
        }
    }

    /// Number of records held by the collection, populating it first if needed
    pub async fn function_count(&self) -> Result<usize> {
        self.ensure_populated().await?;
        self.collection.count().await
    }
}

fn format_function(metadata: &Metadata) -> String {
    let field = |key: &str| metadata.get(key).map(String::as_str).unwrap_or("N/A");
    format!(
        "Function ID: {}\nDescription: {}\nSyntax: {}\nParameters: {}\nExample: {}\n---",
        field("id"),
        field("description"),
        field("syntax"),
        field("params"),
        field("example"),
    )
}
