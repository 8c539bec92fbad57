use anyhow::Result;

use super::session::build_agent;
use crate::prompt::cliclack::CliclackPrompt;
use crate::session::Session;
use crate::AgentArgs;

pub async fn execute(args: &AgentArgs, text: &str, json: bool) -> Result<()> {
    let agent = build_agent(args).await?;

    if json {
        // Keep stdout for the trace alone
        let trace = agent.run(text).await;
        println!("{}", serde_json::to_string_pretty(&trace)?);
    } else {
        let mut session = Session::new(agent, Box::new(CliclackPrompt::new()));
        session.headless_start(text).await;
    }
    Ok(())
}
