//! The interactive question loop.

use anyhow::Context;
use clinreact_agent::{
    CandidateSelector, GeneralAssistant, ReactAgent, ReactOutcome, VaccinationCheck,
};
use clinreact_config::{AnswerMode, AppConfig};
use clinreact_tools::FhirClient;
use std::io::{self, Write};
use std::sync::Arc;
use tokio::io::AsyncBufRead;

use crate::console::{Console, ConsoleSelector, QUESTION_PROMPT, is_exit_command};

pub async fn run(config: AppConfig) -> anyhow::Result<()> {
    let console = Arc::new(Console::stdin());
    let session = Session::from_config(&config, console.clone()).await?;
    let mut out = io::stdout();
    session.banner(&config, &mut out)?;
    question_loop(&console, &session, &mut out).await
}

enum Strategy {
    React(ReactAgent),
    VaccineCheck(VaccinationCheck),
}

/// The configured answering strategy plus the optional general fallback.
pub struct Session {
    strategy: Strategy,
    general: Option<GeneralAssistant>,
    tool_names: Vec<String>,
}

impl Session {
    pub async fn from_config<R>(config: &AppConfig, console: Arc<Console<R>>) -> anyhow::Result<Self>
    where
        R: AsyncBufRead + Unpin + Send + 'static,
    {
        let provider = clinreact_providers::build_from_config(config)?;
        let fhir = Arc::new(FhirClient::from_config(&config.fhir));
        let vaccine_codes = clinreact_tools::open_vaccine_codes(&config.vaccine_codes).await?;
        let tools = Arc::new(clinreact_tools::registry_with(
            config,
            fhir.clone(),
            vaccine_codes.clone(),
        ));
        let tool_names = tools.names().into_iter().map(String::from).collect();
        let selector: Arc<dyn CandidateSelector> = Arc::new(ConsoleSelector::new(console));

        let strategy = match config.agent.mode {
            AnswerMode::React => {
                let mut agent = ReactAgent::from_config(provider.clone(), tools, config)?;
                if config.agent.disambiguate {
                    agent = agent.with_selector(selector);
                }
                Strategy::React(agent)
            }
            AnswerMode::VaccineCheck => {
                let codes = vaccine_codes.context("Vaccination check needs [vaccine_codes].database")?;
                Strategy::VaccineCheck(VaccinationCheck::from_config(
                    provider.clone(),
                    fhir,
                    codes,
                    selector,
                    config,
                )?)
            }
        };
        let general = config
            .agent
            .general_fallback
            .then(|| GeneralAssistant::from_config(provider, config))
            .transpose()?;

        Ok(Self {
            strategy,
            general,
            tool_names,
        })
    }

    pub fn banner<W: Write>(&self, config: &AppConfig, out: &mut W) -> io::Result<()> {
        let mode = match self.strategy {
            Strategy::React(_) => "reasoning loop",
            Strategy::VaccineCheck(_) => "vaccination check",
        };
        writeln!(out)?;
        writeln!(out, "  clinreact: clinical question answering")?;
        writeln!(out)?;
        writeln!(out, "  Endpoint:  {}", config.provider.base_url)?;
        writeln!(out, "  Model:     {}", config.provider.model)?;
        writeln!(out, "  Mode:      {mode}")?;
        writeln!(out, "  Tools:     {}", self.tool_names.join(", "))?;
        writeln!(out, "  FHIR:      {}", config.fhir.base_url)?;
        writeln!(out)
    }

    /// Answer one question and print the outcome.
    async fn respond<W: Write>(&self, question: &str, out: &mut W) -> io::Result<()> {
        let (text, abandoned) = match &self.strategy {
            Strategy::React(agent) => {
                let result = agent.run(question).await;
                tracing::debug!(
                    session = %result.session_id,
                    cycles = result.cycles,
                    tool_calls = result.tool_calls_made,
                    "Question finished"
                );
                (result.outcome.to_string(), result.outcome.abandoned_patient_path())
            }
            Strategy::VaccineCheck(check) => {
                let outcome = check.run(question).await;
                (outcome.to_string(), outcome.abandoned_patient_path())
            }
        };

        writeln!(out)?;
        writeln!(out, "{text}")?;
        if let (true, Some(general)) = (abandoned, &self.general) {
            writeln!(out, "Answering from general knowledge instead.")?;
            writeln!(out)?;
            match general.answer(question).await {
                Ok(answer) if !answer.is_empty() => writeln!(out, "{answer}")?,
                Ok(_) => writeln!(out, "{}", ReactOutcome::NoResponse)?,
                Err(e) => writeln!(out, "No answer: {e}")?,
            }
        }
        writeln!(out)
    }
}

/// Read questions until `exit`, `quit` or end of input.
///
/// A line that is not valid UTF-8 is reported and skipped. Any other read
/// error ends the session.
pub async fn question_loop<R, W>(console: &Console<R>, session: &Session, out: &mut W) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin + Send,
    W: Write,
{
    loop {
        let line = match console.prompt(QUESTION_PROMPT).await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                tracing::warn!(error = %e, "Discarded unreadable input line");
                writeln!(out, "Input was not valid UTF-8; please retry.")?;
                continue;
            }
            Err(e) => return Err(e).context("Failed to read from the console"),
        };
        if is_exit_command(&line) {
            break;
        }
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        session.respond(question, out).await?;
    }

    writeln!(out, "Goodbye.")?;
    Ok(())
}
