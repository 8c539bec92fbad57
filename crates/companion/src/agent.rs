use futures::stream::{BoxStream, StreamExt};
use std::path::Path;
use tracing::Instrument;
use uuid::Uuid;

use crate::errors::{AgentError, AgentResult};
use crate::models::display::DisplayMessage;
use crate::models::message::Message;
use crate::models::role::Role;
use crate::prompt_template::system_prompt;
use crate::providers::base::Provider;
use crate::tools::ToolRegistry;

/// Model calls allowed per run
pub const MAX_STEPS: usize = 5;

/// Messages kept in the conversation replayed to the model
pub const HISTORY_LIMIT: usize = 20;

const THOUGHT_PREFIX: &str = "Thought:";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentConfig {
    pub max_steps: usize,
    pub history_limit: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: MAX_STEPS,
            history_limit: HISTORY_LIMIT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Final,
    Failed,
}

/// The state of one run, created fresh for every request
#[derive(Debug, Clone)]
pub struct AgentRunState {
    conversation: Vec<Message>,
    steps_taken: usize,
    status: RunStatus,
    history_limit: usize,
}

impl AgentRunState {
    /// Seed the conversation with the user's goal followed by the system prompt
    pub fn new(user_goal: &str, system_prompt: &str, history_limit: usize) -> Self {
        let mut state = Self {
            conversation: Vec::new(),
            steps_taken: 0,
            status: RunStatus::Running,
            history_limit,
        };
        state.extend([
            Message::user().with_text(user_goal),
            Message::system().with_text(system_prompt),
        ]);
        state
    }

    pub fn conversation(&self) -> &[Message] {
        &self.conversation
    }

    pub fn steps_taken(&self) -> usize {
        self.steps_taken
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn push(&mut self, message: Message) {
        self.extend([message]);
    }

    pub fn extend(&mut self, messages: impl IntoIterator<Item = Message>) {
        self.conversation.extend(messages);
        self.enforce_window();
    }

    /// Drop the oldest messages beyond the history limit, then any tool results whose
    /// requesting assistant message went with them
    fn enforce_window(&mut self) {
        if self.conversation.len() > self.history_limit {
            let excess = self.conversation.len() - self.history_limit;
            self.conversation.drain(..excess);
        }
        let orphans = self
            .conversation
            .iter()
            .take_while(|message| message.role == Role::Tool)
            .count();
        if orphans > 0 {
            self.conversation.drain(..orphans);
        }
    }
}

/// Agent drives the model through a bounded reason/act loop over the registered tools
pub struct Agent {
    provider: Box<dyn Provider>,
    tools: ToolRegistry,
    system_prompt: String,
    config: AgentConfig,
}

impl Agent {
    /// Create an agent using the built-in system prompt
    pub fn new(provider: Box<dyn Provider>, tools: ToolRegistry) -> AgentResult<Self> {
        let system_prompt = system_prompt(&tools.tools(), None)
            .map_err(|e| AgentError::Internal(e.to_string()))?;
        Ok(Self {
            provider,
            tools,
            system_prompt,
            config: AgentConfig::default(),
        })
    }

    pub fn with_config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the system prompt with one rendered from a template file
    pub fn with_system_prompt_file(mut self, path: &Path) -> AgentResult<Self> {
        self.system_prompt = system_prompt(&self.tools.tools(), Some(path))
            .map_err(|e| AgentError::Internal(e.to_string()))?;
        Ok(self)
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Work on a request, yielding each display message as soon as it is produced.
    ///
    /// The stream always ends with either a `final` or an `error` message, after at most
    /// `max_steps` model calls. Dropping it abandons the run.
    pub fn reply(&self, user_goal: &str) -> BoxStream<'_, DisplayMessage> {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("agent_run", %run_id);
        let mut state = AgentRunState::new(user_goal, &self.system_prompt, self.config.history_limit);
        let tools = self.tools.tools();

        Box::pin(async_stream::stream! {
            let mut thought_shown = false;

            while state.status == RunStatus::Running && state.steps_taken < self.config.max_steps {
                state.steps_taken += 1;

                let completion = self
                    .provider
                    .complete(state.conversation(), &tools)
                    .instrument(span.clone())
                    .await;
                let response = match completion {
                    Ok((response, usage)) => {
                        tracing::debug!(
                            parent: &span,
                            step = state.steps_taken,
                            input_tokens = ?usage.input_tokens,
                            output_tokens = ?usage.output_tokens,
                            "model responded"
                        );
                        response
                    }
                    Err(e) => {
                        tracing::error!(parent: &span, step = state.steps_taken, error = %e, "model call failed");
                        state.status = RunStatus::Failed;
                        yield DisplayMessage::error(format!("An error occurred: {}", e));
                        break;
                    }
                };
                state.push(response.clone());

                let text = response.text().filter(|text| !text.is_empty());
                let requests = response.tool_requests();

                if let Some(text) = text {
                    if text.trim_start().starts_with(THOUGHT_PREFIX) {
                        thought_shown = true;
                        yield DisplayMessage::thought(text.replace(THOUGHT_PREFIX, "").trim());
                    } else if requests.is_empty() {
                        state.status = RunStatus::Final;
                        yield DisplayMessage::final_answer(text);
                        break;
                    }
                }

                if requests.is_empty() {
                    if !thought_shown {
                        yield DisplayMessage::thought(text.unwrap_or("Processing..."));
                    }
                    continue;
                }

                let mut results = Vec::with_capacity(requests.len());
                for request in requests {
                    let tool_call = match &request.tool_call {
                        Ok(tool_call) => tool_call,
                        Err(e) => {
                            tracing::warn!(parent: &span, id = %request.id, error = %e, "malformed tool request");
                            state.status = RunStatus::Failed;
                            yield DisplayMessage::error(format!("An error occurred: {}", e));
                            break;
                        }
                    };

                    yield DisplayMessage::tool_call(
                        self.tools.summary(tool_call),
                        tool_call.name.clone(),
                        tool_call.arguments.clone(),
                    );

                    let output = self
                        .tools
                        .dispatch(tool_call)
                        .instrument(span.clone())
                        .await;
                    if let Some(observation) = self.tools.observation(&tool_call.name, &output) {
                        yield DisplayMessage::tool_observation(observation);
                    }
                    results.push(Message::tool().with_tool_response(
                        request.id.clone(),
                        tool_call.name.clone(),
                        output,
                    ));
                }

                if state.status == RunStatus::Running {
                    state.extend(results);
                }
            }

            if state.status == RunStatus::Running {
                state.status = RunStatus::Failed;
                yield DisplayMessage::error(format!(
                    "Agent failed to generate a final output after {} steps.",
                    self.config.max_steps
                ));
            }

            tracing::info!(
                parent: &span,
                steps = state.steps_taken,
                status = ?state.status,
                "agent run finished"
            );
        })
    }

    /// Work on a request and collect the whole display trace
    pub async fn run(&self, user_goal: &str) -> Vec<DisplayMessage> {
        self.reply(user_goal).collect().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::models::display::DisplayKind;
    use crate::models::tool::{Tool, ToolCall};
    use crate::providers::base::Usage;
    use crate::providers::mock::MockProvider;
    use crate::retrieval::{FunctionRetriever, LocalCollection, MockEmbedder};
    use crate::tools::CalculateExpression;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    type Requests = Arc<Mutex<Vec<Vec<Message>>>>;

    fn calculator_agent(responses: Vec<Message>) -> (Agent, Requests) {
        let provider = MockProvider::new(responses);
        let requests = provider.requests();
        let mut tools = ToolRegistry::new();
        tools.register(CalculateExpression::new()).unwrap();
        let agent = Agent::new(Box::new(provider), tools).unwrap();
        (agent, requests)
    }

    fn kinds(messages: &[DisplayMessage]) -> Vec<DisplayKind> {
        messages.iter().map(|m| m.kind).collect()
    }

    fn tool_request(id: &str, name: &str, args: serde_json::Value) -> Message {
        Message::assistant().with_tool_request(id, Ok(ToolCall::new(name, args)))
    }

    struct FailingProvider;

    #[async_trait]
    impl Provider for FailingProvider {
        async fn complete(
            &self,
            _messages: &[Message],
            _tools: &[Tool],
        ) -> anyhow::Result<(Message, Usage)> {
            Err(anyhow!("connection refused"))
        }
    }

    #[tokio::test]
    async fn test_draws_red_circle_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let collection = LocalCollection::open(
            dir.path(),
            "dudraw_functions_collection",
            Arc::new(MockEmbedder::default()),
        )
        .await
        .unwrap();
        let retriever = FunctionRetriever::new(
            Arc::new(collection),
            Arc::new(Catalog::builtin().unwrap()),
        );
        let tools = ToolRegistry::standard(Arc::new(retriever)).unwrap();

        let code = "```python\n# Program Description: A red circle\nimport dudraw\n\ndudraw.set_canvas_size(500, 500)\ndudraw.set_pen_color(dudraw.RED)\ndudraw.filled_circle(0.5, 0.5, 0.1)\ndudraw.show(0)\n```\n---\n**Explanation:**\n- Draws a red circle in the center.";
        let provider = MockProvider::new(vec![
            Message::assistant()
                .with_text("Thought: I need the syntax for drawing a filled circle.")
                .with_tool_request(
                    "call_1",
                    Ok(ToolCall::new(
                        "retrieve_dudraw_functions",
                        json!({"query": "draw filled circle"}),
                    )),
                ),
            Message::assistant().with_text(code),
        ]);
        let requests = provider.requests();
        let agent = Agent::new(Box::new(provider), tools).unwrap();

        let trace = agent.run("draw a red circle at the center").await;

        assert_eq!(
            kinds(&trace),
            vec![
                DisplayKind::Thought,
                DisplayKind::ToolCall,
                DisplayKind::ToolObservation,
                DisplayKind::Final,
            ]
        );
        assert_eq!(
            trace[0].content,
            "I need the syntax for drawing a filled circle."
        );
        assert_eq!(
            trace[1].content,
            "Looking up DuDraw functions: draw filled circle"
        );
        assert_eq!(
            trace[1].tool_name.as_deref(),
            Some("retrieve_dudraw_functions")
        );
        assert_eq!(
            trace[1].tool_args,
            Some(json!({"query": "draw filled circle"}))
        );
        assert!(trace[2]
            .content
            .starts_with("Found DuDraw function information:\nFunction ID: dudraw.filled_circle"));
        assert!(trace[3].content.contains("```python"));
        assert_eq!(trace[3].content, code);

        let requests = requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        let first = &requests[0];
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].role, Role::User);
        assert_eq!(first[0].text(), Some("draw a red circle at the center"));
        assert_eq!(first[1].role, Role::System);
        assert_eq!(first[1].text(), Some(agent.system_prompt()));

        let second = &requests[1];
        assert_eq!(second.len(), 4);
        assert_eq!(second[2].role, Role::Assistant);
        let result = second[3].content[0].as_tool_response().unwrap();
        assert_eq!(result.id, "call_1");
        assert_eq!(result.tool_name, "retrieve_dudraw_functions");
        assert!(result.output.contains("Function ID: dudraw.filled_circle"));
    }

    #[tokio::test]
    async fn test_budget_exhaustion() {
        let responses = (0..MAX_STEPS + 2)
            .map(|_| Message::assistant().with_text("Thought: still thinking"))
            .collect();
        let (agent, requests) = calculator_agent(responses);

        let trace = agent.run("draw something").await;

        assert_eq!(trace.len(), MAX_STEPS + 1);
        assert!(trace[..MAX_STEPS]
            .iter()
            .all(|m| m.kind == DisplayKind::Thought && m.content == "still thinking"));
        let last = trace.last().unwrap();
        assert_eq!(last.kind, DisplayKind::Error);
        assert_eq!(
            last.content,
            "Agent failed to generate a final output after 5 steps."
        );
        assert_eq!(requests.lock().unwrap().len(), MAX_STEPS);
    }

    #[tokio::test]
    async fn test_custom_step_budget() {
        let (agent, requests) = calculator_agent(vec![]);
        let agent = agent.with_config(AgentConfig {
            max_steps: 2,
            ..AgentConfig::default()
        });

        let trace = agent.run("hello").await;

        // every empty response gets a placeholder until a real thought has been shown
        assert_eq!(
            kinds(&trace),
            vec![DisplayKind::Thought, DisplayKind::Thought, DisplayKind::Error]
        );
        assert_eq!(trace[0].content, "Processing...");
        assert_eq!(trace[1].content, "Processing...");
        assert_eq!(
            trace[2].content,
            "Agent failed to generate a final output after 2 steps."
        );
        assert_eq!(requests.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_model_error_ends_run() {
        let agent = Agent::new(Box::new(FailingProvider), ToolRegistry::new()).unwrap();

        let trace = agent.run("draw a square").await;

        assert_eq!(trace.len(), 1);
        assert_eq!(trace[0].kind, DisplayKind::Error);
        assert_eq!(trace[0].content, "An error occurred: connection refused");
    }

    #[tokio::test]
    async fn test_plain_text_is_final() {
        let (agent, requests) = calculator_agent(vec![
            Message::assistant().with_text("Here is your program."),
            Message::assistant().with_text("never requested"),
        ]);

        let trace = agent.run("draw").await;

        assert_eq!(kinds(&trace), vec![DisplayKind::Final]);
        assert_eq!(trace[0].content, "Here is your program.");
        assert_eq!(requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_calculator_call_and_results_replayed() {
        let (agent, requests) = calculator_agent(vec![
            tool_request("call_1", "calculate_expression", json!({"expression": "15 * 3 / 2"}))
                .with_tool_request(
                    "call_2",
                    Ok(ToolCall::new("calculate_expression", json!({"expression": "2 ** 8"}))),
                ),
            Message::assistant().with_text("The results are 22.5 and 256."),
        ]);

        let trace = agent.run("what is 15 * 3 / 2 and 2 ** 8").await;

        assert_eq!(
            kinds(&trace),
            vec![DisplayKind::ToolCall, DisplayKind::ToolCall, DisplayKind::Final]
        );
        assert_eq!(trace[0].content, "Calculating: 15 * 3 / 2");
        assert_eq!(trace[1].content, "Calculating: 2 ** 8");

        let requests = requests.lock().unwrap();
        let second = &requests[1];
        assert_eq!(second.len(), 5);
        let outputs: Vec<(&str, &str)> = second[3..]
            .iter()
            .map(|m| {
                let response = m.content[0].as_tool_response().unwrap();
                (response.id.as_str(), response.output.as_str())
            })
            .collect();
        assert_eq!(
            outputs,
            vec![
                ("call_1", "Calculation Result: 22.5"),
                ("call_2", "Calculation Result: 256"),
            ]
        );
    }

    #[tokio::test]
    async fn test_unknown_tool_is_reported_to_model() {
        let (agent, requests) = calculator_agent(vec![
            tool_request("call_1", "draw_picture", json!({"shape": "circle"})),
            Message::assistant().with_text("Done."),
        ]);

        let trace = agent.run("draw").await;

        assert_eq!(kinds(&trace), vec![DisplayKind::ToolCall, DisplayKind::Final]);
        assert_eq!(trace[0].tool_name.as_deref(), Some("draw_picture"));

        let requests = requests.lock().unwrap();
        let result = requests[1][3].content[0].as_tool_response().unwrap();
        assert_eq!(result.output, "Error: Tool 'draw_picture' not found.");
    }

    #[tokio::test]
    async fn test_malformed_arguments_fail_the_run() {
        let (agent, requests) = calculator_agent(vec![
            Message::assistant()
                .with_tool_request(
                    "call_1",
                    Ok(ToolCall::new("calculate_expression", json!({"expression": "1 + 1"}))),
                )
                .with_tool_request(
                    "call_2",
                    Err(AgentError::InvalidParameters(
                        "Could not interpret tool use parameters for id call_2".to_string(),
                    )),
                ),
            Message::assistant().with_text("never requested"),
        ]);

        let trace = agent.run("add").await;

        assert_eq!(kinds(&trace), vec![DisplayKind::ToolCall, DisplayKind::Error]);
        assert_eq!(
            trace[1].content,
            "An error occurred: Invalid parameters: Could not interpret tool use parameters for id call_2"
        );
        assert_eq!(requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_fallback_thought_only_before_first_thought() {
        let (agent, _) = calculator_agent(vec![
            Message::assistant().with_text("Thought: planning"),
            Message::assistant(),
            Message::assistant().with_text("Final program"),
        ]);

        let trace = agent.run("draw").await;

        // the empty second response emits nothing since a thought was already shown
        assert_eq!(kinds(&trace), vec![DisplayKind::Thought, DisplayKind::Final]);
        assert_eq!(trace[0].content, "planning");
    }

    #[tokio::test]
    async fn test_thought_prefix_removed_everywhere() {
        let (agent, _) = calculator_agent(vec![
            Message::assistant().with_text("  Thought: first. Thought: second.  "),
            Message::assistant().with_text("ok"),
        ]);

        let trace = agent.run("draw").await;
        assert_eq!(trace[0].content, "first.  second.");
    }

    #[test]
    fn test_run_state_window() {
        let mut state = AgentRunState::new("goal", "system", 4);
        assert_eq!(state.conversation().len(), 2);
        assert_eq!(state.status(), RunStatus::Running);

        state.push(tool_request("a", "calculate_expression", json!({})));
        state.push(Message::tool().with_tool_response("a", "calculate_expression", "1"));
        assert_eq!(state.conversation().len(), 4);
        assert_eq!(state.conversation()[0].role, Role::User);

        // dropping the user message leaves the system prompt first
        state.push(Message::assistant().with_text("next"));
        assert_eq!(state.conversation().len(), 4);
        assert_eq!(state.conversation()[0].role, Role::System);

        // dropping the assistant request drops its orphaned result too
        state.push(Message::assistant().with_text("one"));
        state.push(Message::assistant().with_text("two"));
        let roles: Vec<Role> = state.conversation().iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::Assistant, Role::Assistant, Role::Assistant]);
        assert_eq!(state.conversation()[0].text(), Some("next"));
    }

    #[tokio::test]
    async fn test_run_keeps_requests_within_window() {
        const STEPS: usize = 8;
        // one assistant message and four tool results per step
        let responses = (0..STEPS)
            .map(|step| {
                (0..4).fold(Message::assistant(), |message, call| {
                    message.with_tool_request(
                        format!("call_{}_{}", step, call),
                        Ok(ToolCall::new(
                            "calculate_expression",
                            json!({"expression": format!("{} + {}", step, call)}),
                        )),
                    )
                })
            })
            .collect();
        let (agent, requests) = calculator_agent(responses);
        let agent = agent.with_config(AgentConfig {
            max_steps: STEPS,
            ..AgentConfig::default()
        });

        let trace = agent.run("add some numbers").await;
        assert_eq!(
            trace.last().map(|m| m.content.as_str()),
            Some("Agent failed to generate a final output after 8 steps.")
        );

        let requests = requests.lock().unwrap();
        assert_eq!(requests.len(), STEPS);
        for conversation in requests.iter() {
            assert!(conversation.len() <= HISTORY_LIMIT);
            assert_ne!(conversation[0].role, Role::Tool);
        }
        assert!(requests.iter().any(|c| c.len() == HISTORY_LIMIT));
        // the user goal and system prompt eventually fall out of the window
        assert_ne!(requests[STEPS - 1][0].role, Role::User);
    }
}
