//! Shared test helpers for pattern tests.

use crate::disambiguation::CandidateSelector;
use async_trait::async_trait;
use clinreact_core::clinical::PatientCandidate;
use clinreact_core::error::{ProviderError, ToolError};
use clinreact_core::provider::{Provider, ProviderRequest, ProviderResponse};
use clinreact_core::tool::Tool;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Arguments a mock tool was invoked with, shared with the test body.
pub type CallLog = Arc<Mutex<Vec<String>>>;

/// A mock provider that returns a sequence of scripted responses.
///
/// Each call to `complete` returns the next response in the queue and
/// records the request it was given.
/// Panics if more calls are made than responses provided.
pub struct SequentialMockProvider {
    responses: Mutex<VecDeque<Result<ProviderResponse, ProviderError>>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl SequentialMockProvider {
    pub fn new(replies: &[&str]) -> Self {
        Self::with_results(replies.iter().map(|r| Ok(make_text_response(r))).collect())
    }

    pub fn with_results(results: Vec<Result<ProviderResponse, ProviderError>>) -> Self {
        Self {
            responses: Mutex::new(results.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Every request received so far, in order.
    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for SequentialMockProvider {
    fn name(&self) -> &str {
        "sequential_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let mut requests = self.requests.lock().unwrap();
        requests.push(request);
        let call = requests.len();

        self.responses.lock().unwrap().pop_front().unwrap_or_else(|| {
            panic!("SequentialMockProvider: no more responses (call #{call})")
        })
    }
}

/// A provider that never answers.
pub struct HangingProvider;

#[async_trait]
impl Provider for HangingProvider {
    fn name(&self) -> &str {
        "hanging"
    }

    async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        unreachable!()
    }
}

/// Create a simple text response.
pub fn make_text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        content: text.into(),
        model: "mock-model".into(),
    }
}

pub fn candidate(id: &str, name: &str) -> PatientCandidate {
    PatientCandidate {
        id: id.into(),
        name: name.into(),
        gender: "male".into(),
        birth_date: "1970-01-01".into(),
    }
}

/// `GetPatientByName` returning a fixed candidate list.
pub struct MockPatientTool {
    candidates: Vec<PatientCandidate>,
    arguments: CallLog,
}

impl MockPatientTool {
    pub fn new(candidates: Vec<PatientCandidate>) -> Self {
        Self {
            candidates,
            arguments: CallLog::default(),
        }
    }

    pub fn call_log(&self) -> CallLog {
        self.arguments.clone()
    }
}

#[async_trait]
impl Tool for MockPatientTool {
    fn name(&self) -> &str {
        "GetPatientByName"
    }
    fn description(&self) -> &str {
        "Search patients by name."
    }
    fn argument_hint(&self) -> &str {
        "patient name"
    }
    async fn execute(&self, argument: &str) -> Result<serde_json::Value, ToolError> {
        self.arguments.lock().unwrap().push(argument.to_string());
        Ok(serde_json::to_value(&self.candidates).unwrap())
    }
}

/// `GetAllImmunizations` returning a fixed record list.
pub struct MockImmunizationsTool {
    records: serde_json::Value,
    calls: CallLog,
}

impl MockImmunizationsTool {
    pub fn covid() -> Self {
        Self {
            records: serde_json::json!([{
                "cvx_code": "208",
                "description": "COVID-19 mRNA",
                "date": "2022-02-01",
                "status": "completed"
            }]),
            calls: CallLog::default(),
        }
    }

    pub fn call_log(&self) -> CallLog {
        self.calls.clone()
    }
}

#[async_trait]
impl Tool for MockImmunizationsTool {
    fn name(&self) -> &str {
        "GetAllImmunizations"
    }
    fn description(&self) -> &str {
        "List a patient's immunizations."
    }
    fn argument_hint(&self) -> &str {
        "patient id"
    }
    async fn execute(&self, argument: &str) -> Result<serde_json::Value, ToolError> {
        self.calls.lock().unwrap().push(argument.to_string());
        Ok(self.records.clone())
    }
}

/// A tool that always reports an upstream failure.
pub struct FailingTool;

#[async_trait]
impl Tool for FailingTool {
    fn name(&self) -> &str {
        "GetAllImmunizations"
    }
    fn description(&self) -> &str {
        "Always fails."
    }
    fn argument_hint(&self) -> &str {
        "anything"
    }
    async fn execute(&self, _argument: &str) -> Result<serde_json::Value, ToolError> {
        Err(ToolError::Upstream {
            tool_name: "GetAllImmunizations".into(),
            status_code: 503,
        })
    }
}

/// A tool that never finishes.
pub struct SlowTool;

#[async_trait]
impl Tool for SlowTool {
    fn name(&self) -> &str {
        "GetAllImmunizations"
    }
    fn description(&self) -> &str {
        "Never returns."
    }
    fn argument_hint(&self) -> &str {
        "anything"
    }
    async fn execute(&self, _argument: &str) -> Result<serde_json::Value, ToolError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        unreachable!()
    }
}

/// A selector that replays scripted answers and counts prompts.
pub struct ScriptedSelector {
    answers: Mutex<VecDeque<String>>,
    asked: Mutex<Vec<Vec<PatientCandidate>>>,
}

impl ScriptedSelector {
    pub fn new(answers: &[&str]) -> Self {
        Self {
            answers: Mutex::new(answers.iter().map(|a| a.to_string()).collect()),
            asked: Mutex::new(Vec::new()),
        }
    }

    pub fn times_asked(&self) -> usize {
        self.asked.lock().unwrap().len()
    }

    /// The candidate lists presented, in order.
    pub fn presented(&self) -> Vec<Vec<PatientCandidate>> {
        self.asked.lock().unwrap().clone()
    }
}

#[async_trait]
impl CandidateSelector for ScriptedSelector {
    async fn choose(&self, candidates: &[PatientCandidate]) -> Option<String> {
        self.asked.lock().unwrap().push(candidates.to_vec());
        self.answers.lock().unwrap().pop_front()
    }
}
