use anyhow::{anyhow, Result};
use async_trait::async_trait;
use companion::{
    agent::Agent,
    catalog::Catalog,
    models::{message::Message, tool::Tool},
    providers::base::{Provider, Usage},
    retrieval::{
        Collection, Document, FunctionRetriever, LocalCollection, Metadata, MockEmbedder,
        DEFAULT_COLLECTION,
    },
    tools::ToolRegistry,
};
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::state::AppState;

/// Replays canned assistant messages, one per completion
pub struct ScriptedProvider {
    responses: Mutex<Vec<Message>>,
}

impl ScriptedProvider {
    pub fn new(responses: Vec<Message>) -> Self {
        Self {
            responses: Mutex::new(responses),
        }
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    async fn complete(&self, _messages: &[Message], _tools: &[Tool]) -> Result<(Message, Usage)> {
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            return Err(anyhow!("no scripted response left"));
        }
        Ok((responses.remove(0), Usage::default()))
    }
}

/// A collection whose every operation fails
pub struct BrokenCollection;

#[async_trait]
impl Collection for BrokenCollection {
    fn name(&self) -> &str {
        "broken"
    }

    async fn count(&self) -> Result<usize> {
        Err(anyhow!("store unavailable"))
    }

    async fn upsert(&self, _documents: Vec<Document>) -> Result<()> {
        Err(anyhow!("store unavailable"))
    }

    async fn query(&self, _text: &str, _k: usize) -> Result<Vec<Metadata>> {
        Err(anyhow!("store unavailable"))
    }

    async fn clear(&self) -> Result<()> {
        Err(anyhow!("store unavailable"))
    }

    async fn fingerprint(&self) -> Result<Option<String>> {
        Err(anyhow!("store unavailable"))
    }

    async fn set_fingerprint(&self, _fingerprint: &str) -> Result<()> {
        Err(anyhow!("store unavailable"))
    }
}

pub fn state_with_collection(
    collection: Arc<dyn Collection>,
    responses: Vec<Message>,
) -> AppState {
    let retriever = Arc::new(FunctionRetriever::new(
        collection,
        Arc::new(Catalog::builtin().unwrap()),
    ));
    let tools = ToolRegistry::standard(retriever.clone()).unwrap();
    let agent = Agent::new(Box::new(ScriptedProvider::new(responses)), tools).unwrap();
    AppState::new(agent, retriever, "dudraw_functions.json".to_string())
}

/// App state over a store in `dir` filled by the mock embedder
pub async fn test_state(dir: &Path, responses: Vec<Message>) -> AppState {
    let collection =
        LocalCollection::open(dir, DEFAULT_COLLECTION, Arc::new(MockEmbedder::default()))
            .await
            .unwrap();
    state_with_collection(Arc::new(collection), responses)
}
