// ABOUTME: Interactive assistant session over one remote thread
// Drives the created -> awaiting-input -> dispatched -> polling -> displaying cycle

use crate::api::client::AssistantApi;
use crate::api::types::{
    Assistant, CreateAssistantRequest, CreateMessageRequest, CreateRunRequest, ListMessagesQuery,
    Role, Run, RunStatus, Thread, ToolSpec,
};
use crate::app::config::AssistantConfig;
use crate::app::state::{is_exit_command, SessionState};
use crate::ui::report::{render_reply, CostReport};
use crate::utils::cost_calculator::{CostBreakdown, CostCalculator, ToolCost};
use crate::utils::error::{ExamError, Result};
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::{sleep, Instant};

pub const PROMPT: &str = "You: ";

/// Outcome of one user message
#[derive(Debug, Clone)]
pub struct Turn {
    pub run_id: String,
    pub status: RunStatus,
    pub replies: Vec<String>,
    /// None when the run reported no usage
    pub cost: Option<CostBreakdown>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    pub turns: usize,
    pub token_cost: CostBreakdown,
    pub tool_cost: Decimal,
}

pub struct AssistantSession {
    api: Box<dyn AssistantApi>,
    calculator: Arc<CostCalculator>,
    settings: AssistantConfig,
    assistant: Assistant,
    thread: Thread,
    state: SessionState,
    poll_interval: Duration,
    poll_timeout: Duration,
    /// Id of the newest thread message already accounted for
    last_seen_message: Option<String>,
    turns: usize,
    token_cost: CostBreakdown,
}

impl AssistantSession {
    /// Provision the remote assistant and thread.
    ///
    /// The model is checked against the pricing table first, so an unpriced
    /// model fails without touching the network.
    pub async fn create(
        api: Box<dyn AssistantApi>,
        calculator: Arc<CostCalculator>,
        settings: AssistantConfig,
    ) -> Result<Self> {
        calculator.pricing(&settings.model)?;

        let request = CreateAssistantRequest {
            model: settings.model.clone(),
            name: settings.name.clone(),
            instructions: settings.instructions.clone(),
            tools: settings.tools.iter().copied().map(ToolSpec::from).collect(),
        };
        let assistant = api.create_assistant(&request).await?;
        let thread = api.create_thread().await?;

        tracing::info!(
            assistant_id = %assistant.id,
            thread_id = %thread.id,
            model = %settings.model,
            "assistant session created"
        );

        let mut session = Self {
            api,
            calculator,
            poll_interval: settings.poll_interval(),
            poll_timeout: settings.poll_timeout(),
            settings,
            assistant,
            thread,
            state: SessionState::Created,
            last_seen_message: None,
            turns: 0,
            token_cost: CostBreakdown::default(),
        };
        session.state.advance(SessionState::AwaitingInput)?;
        Ok(session)
    }

    pub fn with_polling(mut self, interval: Duration, timeout: Duration) -> Self {
        self.poll_interval = interval;
        self.poll_timeout = timeout;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn assistant_id(&self) -> &str {
        &self.assistant.id
    }

    pub fn thread_id(&self) -> &str {
        &self.thread.id
    }

    /// Add context to the thread. Threads have no system role, so it goes in as a user message.
    pub async fn add_system_message(&mut self, content: &str) -> Result<()> {
        if self.state != SessionState::AwaitingInput {
            return Err(ExamError::InvalidTransition {
                from: self.state.to_string(),
                to: "context message".to_string(),
            });
        }
        let message = self
            .api
            .create_message(
                &self.thread.id,
                &CreateMessageRequest {
                    role: Role::User,
                    content: content.to_string(),
                },
            )
            .await?;
        self.last_seen_message = Some(message.id);
        Ok(())
    }

    /// Send one user message and wait for the assistant's answer
    pub async fn send(&mut self, input: &str) -> Result<Turn> {
        self.state.advance(SessionState::Dispatched)?;

        match self.dispatch(input).await {
            Ok(turn) => {
                self.state.advance(SessionState::AwaitingInput)?;
                Ok(turn)
            }
            Err(err) => {
                self.state.advance(SessionState::AwaitingInput)?;
                Err(err)
            }
        }
    }

    async fn dispatch(&mut self, input: &str) -> Result<Turn> {
        let message = self
            .api
            .create_message(
                &self.thread.id,
                &CreateMessageRequest {
                    role: Role::User,
                    content: input.to_string(),
                },
            )
            .await?;
        self.last_seen_message = Some(message.id);

        let run = self
            .api
            .create_run(
                &self.thread.id,
                &CreateRunRequest {
                    assistant_id: self.assistant.id.clone(),
                    instructions: self.settings.run_instructions.clone(),
                },
            )
            .await?;

        self.state.advance(SessionState::Polling)?;
        let run = self.wait_for_run(run).await?;

        if !run.status.has_output() {
            let message = run
                .last_error
                .as_ref()
                .map(|e| e.message.clone())
                .unwrap_or_else(|| match run.status {
                    RunStatus::RequiresAction => "run requested function tool output".to_string(),
                    _ => "no error detail provided".to_string(),
                });
            return Err(ExamError::RunFailed {
                run_id: run.id,
                status: run.status.as_str().to_string(),
                message,
            });
        }

        self.state.advance(SessionState::Displaying)?;

        // Account for the run before listing replies so a listing failure keeps its cost
        let cost = match run.usage {
            Some(usage) => {
                let cost = self.calculator.estimate_usage(&self.settings.model, &usage)?;
                self.token_cost += cost;
                Some(cost)
            }
            None => {
                tracing::warn!(run_id = %run.id, "run finished without usage; cost not estimated");
                None
            }
        };
        self.turns += 1;

        let replies = self.collect_replies().await?;

        Ok(Turn {
            run_id: run.id,
            status: run.status,
            replies,
            cost,
        })
    }

    /// Poll until the run reaches a terminal status or the timeout passes.
    /// The first status check happens one interval after the run starts.
    /// A run that times out is cancelled; if it completes before the cancel
    /// lands, its reply and usage are not picked up by later turns.
    async fn wait_for_run(&self, run: Run) -> Result<Run> {
        let started = Instant::now();
        let deadline = started + self.poll_timeout;
        let mut current = run;

        loop {
            if current.status.is_terminal() {
                tracing::debug!(run_id = %current.id, status = current.status.as_str(), "run finished");
                return Ok(current);
            }
            if Instant::now() >= deadline {
                if let Err(err) = self.api.cancel_run(&self.thread.id, &current.id).await {
                    tracing::warn!(run_id = %current.id, error = %err, "could not cancel timed-out run");
                }
                return Err(ExamError::RunTimeout {
                    run_id: current.id,
                    waited_secs: started.elapsed().as_secs(),
                });
            }

            sleep(self.poll_interval).await;
            current = self.api.retrieve_run(&self.thread.id, &current.id).await?;
            tracing::debug!(run_id = %current.id, status = current.status.as_str(), "polled run");
        }
    }

    /// Assistant-authored text newer than the cursor, or the whole thread when replaying
    async fn collect_replies(&mut self) -> Result<Vec<String>> {
        let mut cursor = if self.settings.replay_history {
            None
        } else {
            self.last_seen_message.clone()
        };
        let mut replies = Vec::new();

        loop {
            let page = self
                .api
                .list_messages(&self.thread.id, &ListMessagesQuery::after(cursor.clone()))
                .await?;

            for message in page.data.iter().filter(|m| m.role == Role::Assistant) {
                let text = message.text();
                if !text.is_empty() {
                    replies.push(text);
                }
            }

            if let Some(last) = page.data.last() {
                cursor = Some(last.id.clone());
            }
            if !page.has_more || page.data.is_empty() {
                break;
            }
        }

        if cursor.is_some() {
            self.last_seen_message = cursor;
        }
        Ok(replies)
    }

    /// Read lines from `input` until an exit keyword or end of input, writing
    /// replies and per-turn costs to `output`. Failed turns are reported and
    /// the prompt comes back.
    pub async fn run_interactive<R, W>(&mut self, input: R, mut output: W) -> Result<SessionSummary>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = input.lines();

        loop {
            output.write_all(PROMPT.as_bytes()).await?;
            output.flush().await?;

            let line = match lines.next_line().await? {
                Some(line) => line,
                None => {
                    output.write_all(b"\n").await?;
                    break;
                }
            };

            if is_exit_command(&line) {
                break;
            }
            if line.trim().is_empty() {
                continue;
            }

            match self.send(line.trim()).await {
                Ok(turn) => {
                    let mut rendered = String::new();
                    for reply in &turn.replies {
                        rendered.push_str(&render_reply(reply));
                        rendered.push('\n');
                    }
                    if let Some(cost) = &turn.cost {
                        let pricing = self.calculator.pricing(&self.settings.model)?;
                        rendered.push_str(&CostReport::new(pricing, cost).to_string());
                        rendered.push('\n');
                    }
                    output.write_all(rendered.as_bytes()).await?;
                }
                Err(err) if err.is_turn_error() => {
                    tracing::warn!(error = %err, "turn failed");
                    output.write_all(format!("Error: {}\n", err).as_bytes()).await?;
                }
                Err(err) => return Err(err),
            }
        }

        output.flush().await?;
        self.state.advance(SessionState::Terminated)?;
        Ok(self.summary())
    }

    /// Turn count, accumulated token cost and per-session tool fees so far.
    /// Tool fees only apply once a turn has actually run.
    pub fn summary(&self) -> SessionSummary {
        let tool_cost = if self.turns == 0 {
            Decimal::ZERO
        } else {
            let fees: HashSet<ToolCost> = self
                .settings
                .tools
                .iter()
                .filter_map(|tool| tool.session_fee())
                .collect();
            fees.iter().map(|fee| fee.rate()).sum()
        };

        SessionSummary {
            turns: self.turns,
            token_cost: self.token_cost,
            tool_cost,
        }
    }
}
