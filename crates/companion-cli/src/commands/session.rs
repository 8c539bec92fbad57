use anyhow::{Context, Result};
use cliclack::spinner;
use companion::agent::{Agent, AgentConfig};
use companion::catalog::Catalog;
use companion::providers::configs::{OpenAiEmbeddingConfig, OpenAiProviderConfig};
use companion::providers::openai::OpenAiProvider;
use companion::retrieval::{
    Embedder, FunctionRetriever, LocalCollection, LocalEmbedder, OpenAiEmbedder,
    PopulateOutcome, DEFAULT_COLLECTION,
};
use companion::tools::ToolRegistry;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::prompt::cliclack::CliclackPrompt;
use crate::session::Session;
use crate::{AgentArgs, EmbedderVariant};

const API_KEY_ENV_VAR: &str = "OPENAI_API_KEY";

pub async fn execute(args: &AgentArgs) -> Result<()> {
    let agent = build_agent(args).await?;
    let mut session = Session::new(agent, Box::new(CliclackPrompt::new()));
    session.start().await
}

pub async fn build_agent(args: &AgentArgs) -> Result<Agent> {
    let retriever = build_retriever(args).await?;

    let provider = OpenAiProvider::new(OpenAiProviderConfig {
        model: args.model.clone(),
        ..OpenAiProviderConfig::new(api_key(args)?)
    })?;
    let config = AgentConfig {
        max_steps: args.max_steps,
        ..AgentConfig::default()
    };

    let mut agent = Agent::new(Box::new(provider), ToolRegistry::standard(retriever)?)?
        .with_config(config);
    if let Some(path) = &args.system_prompt {
        agent = agent.with_system_prompt_file(path)?;
    }
    Ok(agent)
}

/// Open the function store and make sure it holds the catalog
pub async fn build_retriever(args: &AgentArgs) -> Result<Arc<FunctionRetriever>> {
    let store = args.store.clone().unwrap_or_else(default_store_dir);
    let (embedder, collection_name): (Arc<dyn Embedder>, String) = match args.embedder {
        EmbedderVariant::OpenAi => (
            Arc::new(OpenAiEmbedder::new(OpenAiEmbeddingConfig::new(api_key(
                args,
            )?))?),
            DEFAULT_COLLECTION.to_string(),
        ),
        // Vectors from different embedders are not comparable, so keep them apart
        EmbedderVariant::Local => (
            Arc::new(load_local_embedder(&store).await?),
            format!("{}_local", DEFAULT_COLLECTION),
        ),
    };

    let collection = LocalCollection::open(&store, &collection_name, embedder).await?;
    let catalog = match &args.catalog {
        Some(path) => Catalog::from_path(path)?,
        None => Catalog::builtin()?,
    };

    let retriever = FunctionRetriever::new(Arc::new(collection), Arc::new(catalog))
        .with_rebuild_on_catalog_change(args.rebuild);

    let spin = spinner();
    spin.start("Preparing the DuDraw function store");
    let outcome = retriever.ensure_populated().await;
    spin.stop(match &outcome {
        Ok(PopulateOutcome::Populated) => "Function store created",
        Ok(PopulateOutcome::Rebuilt) => "Function store rebuilt from the updated catalog",
        Ok(PopulateOutcome::Stale) => {
            "Function store was built from a different catalog (use --rebuild to refresh it)"
        }
        Ok(PopulateOutcome::AlreadyPopulated) => "Function store ready",
        Err(_) => "Function store unavailable",
    });
    outcome.with_context(|| format!("Failed to prepare function store in {}", store.display()))?;

    Ok(Arc::new(retriever))
}

async fn load_local_embedder(store: &Path) -> Result<LocalEmbedder> {
    let spin = spinner();
    spin.start("Loading the local embedding model");
    let embedder = LocalEmbedder::load(store.join("models")).await;
    spin.stop(if embedder.is_ok() {
        "Embedding model loaded"
    } else {
        "Embedding model unavailable"
    });
    embedder
}

pub fn default_store_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("companion")
}

fn api_key(args: &AgentArgs) -> Result<String> {
    args.api_key
        .clone()
        .or_else(|| std::env::var(API_KEY_ENV_VAR).ok())
        .filter(|key| !key.is_empty())
        .context("API key must be provided via --api-key or OPENAI_API_KEY environment variable")
}
