//! Conversation Loop
//!
//! Drives one user turn: ask the model, run the file tools it asked for
//! through markup, and record everything in the session history.

use std::future::Future;
use std::sync::Arc;

use crate::error::{AgentError, Result};
use crate::markup;
use crate::message::{Conversation, Message};
use crate::provider::{GenerationOptions, LlmProvider};
use crate::session::Session;
use crate::tool::{FileTools, ToolExecution};

/// Agent configuration
#[derive(Clone, Debug)]
pub struct AgentConfig {
    /// System prompt sent as the first message of every request
    pub system_prompt: String,

    /// Generation options
    pub generation: GenerationOptions,

    /// Extra inference rounds allowed per turn after tool use.
    /// Zero means tool results only reach the model on the next user turn.
    pub max_follow_ups: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.into(),
            generation: GenerationOptions::default(),
            max_follow_ups: 0,
        }
    }
}

pub const DEFAULT_SYSTEM_PROMPT: &str = r"You are a helpful coding assistant. You can read and write files to help with coding tasks.

Available tools:
1. <read_file><path>filepath</path></read_file> - Read the contents of a file
2. <write_to_file><path>filepath</path><content>file content</content></write_to_file> - Write content to a file

When using tools:
- Always use the exact XML format shown above
- Use relative paths from the current working directory
- For write_to_file, include the complete file content
- Only use these two tools, no others

Tool results come back in messages starting with [read_file ...] or [write_to_file ...].
Always explain what you're doing before using a tool.";

/// What a finished turn produced
#[derive(Clone, Debug)]
pub struct TurnOutcome {
    /// Final response with tool markup removed, for display
    pub reply: String,

    /// Final response exactly as the model sent it
    pub response: String,

    /// Every tool run during the turn, in order
    pub executions: Vec<ToolExecution>,

    /// Inference calls made
    pub rounds: usize,
}

/// The main Agent struct
pub struct Agent {
    provider: Arc<dyn LlmProvider>,
    tools: FileTools,
    config: AgentConfig,
}

impl Agent {
    /// Create a new agent
    pub fn new(provider: Arc<dyn LlmProvider>, tools: FileTools, config: AgentConfig) -> Self {
        Self {
            provider,
            tools,
            config,
        }
    }

    /// Fresh session seeded with this agent's system prompt
    pub fn new_session(&self) -> Session {
        Session::new(self.config.system_prompt.clone())
    }

    /// Run one user turn to completion.
    ///
    /// On error the session is rolled back to how it was before `input`
    /// was added. Tool side effects that already happened are not undone.
    /// Dropping the returned future mid-turn leaves a partial turn in the
    /// history; use [`run_turn_until`](Self::run_turn_until) to cancel.
    pub async fn run_turn(&self, session: &mut Session, input: &str) -> Result<TurnOutcome> {
        let checkpoint = session.checkpoint();

        match self.drive(&mut session.conversation, input).await {
            Ok(outcome) => {
                session.record_turn();
                tracing::info!(
                    session = %session.id,
                    rounds = outcome.rounds,
                    tools = outcome.executions.len(),
                    "turn complete"
                );
                Ok(outcome)
            }
            Err(e) => {
                session.rollback(checkpoint);
                tracing::warn!(
                    session = %session.id,
                    error = %e,
                    "turn aborted, history rolled back"
                );
                Err(e)
            }
        }
    }

    /// Run one user turn unless `cancel` resolves first.
    ///
    /// Returns `None` when cancelled: the pending request is dropped and
    /// the session goes back to how it was before `input` was added.
    pub async fn run_turn_until<F>(
        &self,
        session: &mut Session,
        input: &str,
        cancel: F,
    ) -> Option<Result<TurnOutcome>>
    where
        F: Future<Output = ()>,
    {
        let checkpoint = session.checkpoint();

        let result = tokio::select! {
            result = self.run_turn(session, input) => Some(result),
            () = cancel => None,
        };

        if result.is_none() {
            session.rollback(checkpoint);
            tracing::info!(session = %session.id, "turn cancelled, history rolled back");
        }
        result
    }

    async fn drive(&self, conversation: &mut Conversation, input: &str) -> Result<TurnOutcome> {
        conversation.push(Message::user(input));

        let mut executions = Vec::new();
        let mut rounds = 0;

        loop {
            rounds += 1;

            let completion = self
                .provider
                .complete(conversation.messages(), &self.config.generation)
                .await?;
            if let Some(usage) = &completion.usage {
                tracing::debug!(
                    prompt_tokens = usage.prompt_tokens,
                    completion_tokens = usage.completion_tokens,
                    "completion received"
                );
            }

            let response = completion.content;
            conversation.push(Message::assistant(&response));

            let invocations = markup::extract(&response);
            let invoked = !invocations.is_empty();

            for invocation in invocations {
                tracing::debug!(
                    tool = invocation.name(),
                    path = invocation.path(),
                    "executing tool"
                );
                let result = self.tools.dispatch(&invocation);
                let execution = ToolExecution { invocation, result };
                conversation.push(Message::tool(execution.to_message_content()));
                executions.push(execution);
            }

            if invoked && rounds <= self.config.max_follow_ups {
                continue;
            }

            return Ok(TurnOutcome {
                reply: markup::strip_markup(&response),
                response,
                executions,
                rounds,
            });
        }
    }

    /// Get configuration
    pub const fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Name of the provider behind this agent
    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }
}

/// Builder for Agent configuration
pub struct AgentBuilder {
    provider: Option<Arc<dyn LlmProvider>>,
    tools: FileTools,
    config: AgentConfig,
}

impl Default for AgentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentBuilder {
    pub fn new() -> Self {
        Self {
            provider: None,
            tools: FileTools::new(),
            config: AgentConfig::default(),
        }
    }

    pub fn provider(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn tools(mut self, tools: FileTools) -> Self {
        self.tools = tools;
        self
    }

    pub fn generation(mut self, generation: GenerationOptions) -> Self {
        self.config.generation = generation;
        self
    }

    pub const fn max_follow_ups(mut self, max: usize) -> Self {
        self.config.max_follow_ups = max;
        self
    }

    pub fn build(self) -> Result<Agent> {
        let provider = self
            .provider
            .ok_or_else(|| AgentError::Config("Provider is required".into()))?;

        Ok(Agent::new(provider, self.tools, self.config))
    }
}
