use anyhow::Result;
use companion::{
    agent::Agent,
    catalog::Catalog,
    providers::openai::OpenAiProvider,
    retrieval::{Embedder, FunctionRetriever, LocalCollection, LocalEmbedder, OpenAiEmbedder},
    tools::ToolRegistry,
};
use std::sync::Arc;

use crate::configuration::{EmbedderKind, Settings};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub agent: Arc<Agent>,
    pub retriever: Arc<FunctionRetriever>,
    pub data_source: String,
}

impl AppState {
    pub fn new(agent: Agent, retriever: Arc<FunctionRetriever>, data_source: String) -> Self {
        Self {
            agent: Arc::new(agent),
            retriever,
            data_source,
        }
    }

    /// Build the agent once, opening (and if needed filling) the retrieval store
    pub async fn from_settings(settings: &Settings) -> Result<Self> {
        let embedder = embedder(settings).await?;
        Self::with_embedder(settings, embedder).await
    }

    pub async fn with_embedder(settings: &Settings, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let retriever = Arc::new(open_retriever(settings, embedder).await?);
        let outcome = retriever.ensure_populated().await?;
        tracing::info!(?outcome, "retrieval store ready");

        let provider = OpenAiProvider::new(settings.provider.chat_config()?)?;
        let tools = ToolRegistry::standard(retriever.clone())?;
        let mut agent =
            Agent::new(Box::new(provider), tools)?.with_config(settings.agent.agent_config());
        if let Some(path) = &settings.agent.system_prompt_path {
            agent = agent.with_system_prompt_file(path)?;
        }

        Ok(Self::new(
            agent,
            retriever,
            settings.retrieval.data_source(),
        ))
    }
}

async fn embedder(settings: &Settings) -> Result<Arc<dyn Embedder>> {
    Ok(match settings.retrieval.embedder {
        EmbedderKind::OpenAi => Arc::new(OpenAiEmbedder::new(
            settings.provider.embedding_config()?,
        )?),
        EmbedderKind::Local => {
            Arc::new(LocalEmbedder::load(settings.retrieval.model_cache_dir()).await?)
        }
    })
}

async fn open_retriever(
    settings: &Settings,
    embedder: Arc<dyn Embedder>,
) -> Result<FunctionRetriever> {
    let retrieval = &settings.retrieval;
    let collection = LocalCollection::open(&retrieval.path, &retrieval.collection, embedder).await?;

    let catalog = match &retrieval.catalog_path {
        Some(path) => Catalog::from_path(path)?,
        None => Catalog::builtin()?,
    };

    Ok(
        FunctionRetriever::new(Arc::new(collection), Arc::new(catalog))
            .with_top_k(retrieval.top_k)
            .with_rebuild_on_catalog_change(retrieval.rebuild_on_catalog_change),
    )
}
