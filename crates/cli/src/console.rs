//! Console input shared by the question loop and the patient selector.

use async_trait::async_trait;
use clinreact_agent::CandidateSelector;
use clinreact_agent::disambiguation::format_candidates;
use clinreact_core::clinical::PatientCandidate;
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::Mutex;

pub const QUESTION_PROMPT: &str = "Ask your question (or type 'exit'): ";
pub const SELECTION_PROMPT: &str = "Select a patient by number: ";

/// Line reader over any buffered input, stdin in production.
pub struct Console<R> {
    lines: Mutex<Lines<R>>,
}

impl Console<BufReader<Stdin>> {
    pub fn stdin() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()))
    }
}

impl<R: AsyncBufRead + Unpin + Send> Console<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: Mutex::new(reader.lines()),
        }
    }

    /// Print `prompt` and read one line. `None` at end of input.
    pub async fn prompt(&self, prompt: &str) -> std::io::Result<Option<String>> {
        print!("{prompt}");
        std::io::stdout().flush()?;
        self.lines.lock().await.next_line().await
    }
}

/// `exit` or `quit`, any case.
pub fn is_exit_command(line: &str) -> bool {
    let line = line.trim();
    line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("quit")
}

/// Asks the console user to pick one of several patients.
pub struct ConsoleSelector<R> {
    console: Arc<Console<R>>,
}

impl<R> ConsoleSelector<R> {
    pub fn new(console: Arc<Console<R>>) -> Self {
        Self { console }
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> CandidateSelector for ConsoleSelector<R> {
    async fn choose(&self, candidates: &[PatientCandidate]) -> Option<String> {
        println!();
        println!("Multiple patients found:");
        for line in format_candidates(candidates) {
            println!("  {line}");
        }
        match self.console.prompt(SELECTION_PROMPT).await {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read selection");
                None
            }
        }
    }
}
