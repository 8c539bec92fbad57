use anyhow::Result;
use companion::agent::Agent;
use companion::models::display::{DisplayKind, DisplayMessage};
use futures::StreamExt;

use crate::prompt::{InputType, Prompt};

pub struct Session<'a> {
    agent: Agent,
    prompt: Box<dyn Prompt + 'a>,
}

impl<'a> Session<'a> {
    pub fn new(agent: Agent, prompt: Box<impl Prompt + 'a>) -> Self {
        Session { agent, prompt }
    }

    pub async fn start(&mut self) -> Result<()> {
        self.prompt.notice("Starting session...");
        self.prompt.notice(&format!(
            "Connected tools: {}",
            self.tool_names().join(", ")
        ));
        self.prompt.companion_ready();

        loop {
            let input = self.prompt.get_input()?;
            let request = match input.input_type {
                InputType::Message => match input.content {
                    Some(content) => content,
                    None => continue,
                },
                InputType::Exit => break,
                InputType::AskAgain => continue,
            };

            self.process_request(&request).await;
        }

        self.prompt.notice("Closing session.");
        self.prompt.close();
        Ok(())
    }

    /// Run a single request and return its trace
    pub async fn headless_start(&mut self, request: &str) -> Vec<DisplayMessage> {
        let trace = self.process_request(request).await;
        self.prompt.close();
        trace
    }

    async fn process_request(&mut self, request: &str) -> Vec<DisplayMessage> {
        let mut trace = Vec::new();
        let mut stream = self.agent.reply(request);

        self.prompt.show_busy();
        loop {
            tokio::select! {
                message = stream.next() => {
                    let Some(message) = message else {
                        break;
                    };
                    self.prompt.hide_busy();
                    self.prompt.render(&message);
                    let finished = matches!(message.kind, DisplayKind::Final | DisplayKind::Error);
                    trace.push(message);
                    if !finished {
                        self.prompt.show_busy();
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    self.prompt.hide_busy();
                    self.prompt.notice("Interrupt: abandoning the current request.");
                    break;
                }
            }
        }
        self.prompt.hide_busy();

        trace
    }

    fn tool_names(&self) -> Vec<String> {
        self.agent
            .tools()
            .tools()
            .into_iter()
            .map(|tool| tool.name)
            .collect()
    }
}
