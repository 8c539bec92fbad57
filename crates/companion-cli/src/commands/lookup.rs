use anyhow::Result;

use super::session::build_retriever;
use crate::AgentArgs;

/// Print what the agent would be told for `query`
pub async fn execute(args: &AgentArgs, query: &str, k: Option<usize>) -> Result<()> {
    let retriever = build_retriever(args).await?;
    let k = k.unwrap_or_else(|| retriever.top_k());
    println!("{}", retriever.retrieve(query, k).await);
    Ok(())
}
