//! ReAct pattern: Thought → Action → Observation loop.
//!
//! One [`ReactAgent::run`] call handles one question:
//!
//! 1. Seed the history: system instruction, worked example, the question.
//! 2. Render the history and call the model.
//! 3. Append the (cleaned) reply and parse it.
//! 4. A tool call on a registered tool is executed and its result appended
//!    as an `Observation:`; then back to 2.
//! 5. A final answer, an unknown tool, a transport failure, or the step
//!    budget ends the question.
//!
//! The history lives only for the duration of `run`.

use clinreact_config::{AppConfig, RenderPolicy};
use clinreact_core::clinical::PatientCandidate;
use clinreact_core::error::{ProviderError, ToolError};
use clinreact_core::message::{Message, MessageStore, SessionId};
use clinreact_core::provider::{Provider, ProviderRequest};
use clinreact_core::tool::{ToolRegistry, ToolResult};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::disambiguation::{CandidateSelector, Resolution, SelectionError, disambiguate};
use crate::parser::{Directive, ResponseCleanup, ResponseParser};
use crate::prompts;
use crate::render::{flatten, render};

/// How a question ended.
#[derive(Debug, Clone)]
pub enum ReactOutcome {
    /// The model produced an answer (explicit or implicit).
    Answered(String),
    /// The model returned nothing usable.
    NoResponse,
    /// The model asked for a tool outside the whitelist.
    UnknownTool(String),
    /// The step budget ran out before a final answer.
    StepBudgetExhausted { max_steps: u32 },
    /// The chat transport failed.
    TransportFailure(ProviderError),
    /// The wall-clock budget for the question ran out.
    TimedOut { after_secs: u64 },
    /// The patient search found nobody.
    PatientNotFound { query: String },
    /// The user's candidate selection was unusable.
    DisambiguationAborted(SelectionError),
}

impl ReactOutcome {
    pub fn answer(&self) -> Option<&str> {
        match self {
            ReactOutcome::Answered(text) => Some(text),
            _ => None,
        }
    }

    /// Whether the patient-specific path was abandoned, so a general
    /// answer may still help.
    pub fn abandoned_patient_path(&self) -> bool {
        matches!(
            self,
            ReactOutcome::PatientNotFound { .. } | ReactOutcome::DisambiguationAborted(_)
        )
    }
}

impl std::fmt::Display for ReactOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReactOutcome::Answered(text) => write!(f, "{text}"),
            ReactOutcome::NoResponse => write!(f, "No response from model."),
            ReactOutcome::UnknownTool(name) => write!(f, "Unknown or disallowed tool: {name}"),
            ReactOutcome::StepBudgetExhausted { max_steps } => {
                write!(f, "No conclusive answer after {max_steps} steps.")
            }
            ReactOutcome::TransportFailure(e) => write!(f, "No answer: {e}"),
            ReactOutcome::TimedOut { after_secs } => {
                write!(f, "No answer: the question timed out after {after_secs}s.")
            }
            ReactOutcome::PatientNotFound { query } => {
                write!(f, "No patient found matching '{query}'.")
            }
            ReactOutcome::DisambiguationAborted(e) => write!(f, "Invalid selection: {e}."),
        }
    }
}

/// The result of a ReAct execution.
#[derive(Debug, Clone)]
pub struct ReactResult {
    pub outcome: ReactOutcome,
    /// Model calls made.
    pub cycles: u32,
    /// Tool invocations made.
    pub tool_calls_made: usize,
    pub session_id: SessionId,
}

/// The tool-augmented reasoning loop.
pub struct ReactAgent {
    provider: Arc<dyn Provider>,
    model: String,
    tools: Arc<ToolRegistry>,
    max_steps: u32,
    render_policy: RenderPolicy,
    parser: ResponseParser,
    system_instruction: String,
    few_shot: Vec<Message>,
    selector: Option<Arc<dyn CandidateSelector>>,
    disambiguate: bool,
    name_resolution_tool: String,
    tool_timeout: Duration,
    session_timeout: Duration,
}

/// Whether the loop keeps going after a tool result.
enum AfterTool {
    Continue(ToolResult),
    Stop(ReactOutcome),
}

impl ReactAgent {
    /// Create a new ReAct agent with default limits.
    ///
    /// The system instruction is generated from `tools`.
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>, tools: Arc<ToolRegistry>) -> Self {
        let system_instruction = prompts::system_instruction(&tools);
        Self {
            provider,
            model: model.into(),
            tools,
            max_steps: 6,
            render_policy: RenderPolicy::default(),
            parser: ResponseParser::default(),
            system_instruction,
            few_shot: prompts::few_shot(),
            selector: None,
            disambiguate: true,
            name_resolution_tool: "GetPatientByName".into(),
            tool_timeout: Duration::from_secs(30),
            session_timeout: Duration::from_secs(300),
        }
    }

    /// Create from configuration (`[provider].model` and `[agent]`).
    pub fn from_config(
        provider: Arc<dyn Provider>,
        tools: Arc<ToolRegistry>,
        config: &AppConfig,
    ) -> Result<Self, regex_lite::Error> {
        let agent = &config.agent;
        let cleanup = ResponseCleanup::with_patterns(&agent.signature_patterns)?;
        let mut react = Self::new(provider, config.provider.model.clone(), tools)
            .with_max_steps(agent.max_steps)
            .with_render_policy(agent.render_policy)
            .with_cleanup(cleanup)
            .with_tool_timeout(Duration::from_secs(agent.tool_timeout_secs))
            .with_session_timeout(Duration::from_secs(agent.session_timeout_secs));
        react.disambiguate = agent.disambiguate;
        react.name_resolution_tool = agent.name_resolution_tool.clone();
        Ok(react)
    }

    /// Set the maximum number of model calls per question.
    pub fn with_max_steps(mut self, max: u32) -> Self {
        self.max_steps = max;
        self
    }

    pub fn with_render_policy(mut self, policy: RenderPolicy) -> Self {
        self.render_policy = policy;
        self
    }

    /// Replace the trailing-signature cleanup rules.
    pub fn with_cleanup(mut self, cleanup: ResponseCleanup) -> Self {
        self.parser = ResponseParser::new(cleanup);
        self
    }

    /// Attach a selector used when a name search is ambiguous.
    pub fn with_selector(mut self, selector: Arc<dyn CandidateSelector>) -> Self {
        self.selector = Some(selector);
        self
    }

    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = timeout;
        self
    }

    /// Set the wall-clock budget per question. Time spent waiting for a
    /// candidate selection does not count.
    pub fn with_session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout = timeout;
        self
    }

    pub fn system_instruction(&self) -> &str {
        &self.system_instruction
    }

    /// Answer one question.
    pub async fn run(&self, question: &str) -> ReactResult {
        let session_id = SessionId::new();
        let span = info_span!("react", session = %session_id);
        let mut result = ReactResult {
            outcome: ReactOutcome::NoResponse,
            cycles: 0,
            tool_calls_made: 0,
            session_id,
        };

        async {
            info!(model = %self.model, max_steps = self.max_steps, "ReAct loop starting");
            result.outcome = self.drive(question, &mut result.cycles, &mut result.tool_calls_made).await;
            info!(
                cycles = result.cycles,
                tool_calls = result.tool_calls_made,
                outcome = ?result.outcome,
                "ReAct loop finished"
            );
        }
        .instrument(span)
        .await;

        result
    }

    async fn drive(&self, question: &str, cycles: &mut u32, tool_calls: &mut usize) -> ReactOutcome {
        let mut deadline = Instant::now() + self.session_timeout;
        let timed_out = ReactOutcome::TimedOut {
            after_secs: self.session_timeout.as_secs(),
        };

        let mut store = MessageStore::new();
        store.append(Message::system(self.system_instruction.clone()));
        store.extend(self.few_shot.iter().cloned());
        store.append(Message::user(question.trim()));

        while *cycles < self.max_steps {
            *cycles += 1;
            debug!(
                step = *cycles,
                messages = store.len(),
                prompt = %flatten(store.snapshot()),
                "Rendering prompt"
            );

            let request = ProviderRequest {
                model: self.model.clone(),
                messages: render(self.render_policy, store.snapshot()),
                stream: false,
            };

            let response = match tokio::time::timeout_at(deadline, self.provider.complete(request)).await {
                Ok(Ok(response)) => response,
                Ok(Err(e)) => {
                    warn!(provider = %self.provider.name(), error = %e, "Transport failure");
                    return ReactOutcome::TransportFailure(e);
                }
                Err(_) => return timed_out,
            };

            let reply = self.parser.cleanup().clean(&response.content);
            debug!(step = *cycles, reply = %reply, "Model reply");
            store.append(Message::assistant(reply.clone()));

            let (name, argument) = match self.parser.parse(&reply) {
                Directive::FinalAnswer { text } if text.is_empty() => return ReactOutcome::NoResponse,
                Directive::FinalAnswer { text } => return ReactOutcome::Answered(text),
                Directive::Unparseable { raw_text } => {
                    let text = raw_text.trim();
                    return if text.is_empty() {
                        ReactOutcome::NoResponse
                    } else {
                        ReactOutcome::Answered(text.to_string())
                    };
                }
                Directive::ToolCall { name, argument } => (name, argument),
            };

            debug!(tool = %name, argument = %argument, "Action");
            let tool_deadline = (Instant::now() + self.tool_timeout).min(deadline);
            let result = match tokio::time::timeout_at(tool_deadline, self.tools.invoke(&name, &argument)).await {
                Ok(Ok(result)) => result,
                Ok(Err(_)) => {
                    warn!(tool = %name, allowed = ?self.tools.names(), "Model requested a tool outside the whitelist");
                    return ReactOutcome::UnknownTool(name);
                }
                Err(_) if Instant::now() >= deadline => return timed_out,
                Err(_) => ToolResult::Error(
                    ToolError::Timeout {
                        tool_name: name.clone(),
                        timeout_secs: self.tool_timeout.as_secs(),
                    }
                    .to_string(),
                ),
            };
            *tool_calls += 1;

            if let ToolResult::Error(e) = &result {
                warn!(tool = %name, error = %e, "Tool failed; reporting to model");
            }

            let result = match self.after_tool(&name, &argument, result, &mut deadline).await {
                AfterTool::Continue(result) => result,
                AfterTool::Stop(outcome) => return outcome,
            };

            store.append(Message::observation(result.to_observation()));
        }

        warn!(max_steps = self.max_steps, "Step budget exhausted");
        ReactOutcome::StepBudgetExhausted {
            max_steps: self.max_steps,
        }
    }

    /// Narrow a name search to one patient when a selector is attached.
    async fn after_tool(
        &self,
        name: &str,
        argument: &str,
        result: ToolResult,
        deadline: &mut Instant,
    ) -> AfterTool {
        let selector = match &self.selector {
            Some(selector) if self.disambiguate && name == self.name_resolution_tool => selector,
            _ => return AfterTool::Continue(result),
        };
        let ToolResult::Data(value) = &result else {
            return AfterTool::Continue(result);
        };
        let candidates: Vec<PatientCandidate> = match serde_json::from_value(value.clone()) {
            Ok(candidates) => candidates,
            Err(e) => {
                debug!(error = %e, "Name search result is not a candidate list");
                return AfterTool::Continue(result);
            }
        };

        let waiting = Instant::now();
        let resolution = disambiguate(candidates, selector.as_ref()).await;
        *deadline += waiting.elapsed();

        match resolution {
            Resolution::Selected(patient) => {
                info!(patient_id = %patient.id, "Patient resolved");
                AfterTool::Continue(ToolResult::Data(serde_json::json!([patient])))
            }
            Resolution::NotFound => AfterTool::Stop(ReactOutcome::PatientNotFound {
                query: argument.to_string(),
            }),
            Resolution::Aborted(e) => {
                warn!(error = %e, "Disambiguation aborted");
                AfterTool::Stop(ReactOutcome::DisambiguationAborted(e))
            }
        }
    }
}
