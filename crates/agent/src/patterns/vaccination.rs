//! Vaccination status check: a fixed pipeline instead of the open loop.
//!
//! 1. Ask the model for `{"patient_name", "disease"}` from the question.
//! 2. Search the patient by name and narrow the result to one.
//! 3. Collect the CVX codes whose names mention the disease.
//! 4. Compare the patient's immunizations against those codes.
//! 5. Ask the model for follow-up recommendations on the record.
//!
//! Steps 2 to 4 never involve the model, so the verdict is deterministic.

use clinreact_config::{AppConfig, RenderPolicy};
use clinreact_core::clinical::{Immunization, PatientCandidate};
use clinreact_core::error::{ProviderError, ToolError};
use clinreact_core::message::Message;
use clinreact_core::provider::{Provider, ProviderRequest};
use clinreact_tools::{FhirClient, VaccineCodeTool, family_name_fragment, immunizations, patient_lookup};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::disambiguation::{CandidateSelector, Resolution, SelectionError, disambiguate};
use crate::parser::ResponseCleanup;
use crate::render::render;

/// Patient and disease named in a question.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CheckRequest {
    #[serde(default)]
    pub patient_name: String,
    #[serde(default)]
    pub disease: String,
}

/// Pull the first `{...}` object out of a model reply.
///
/// `None` unless both fields are present and non-blank.
pub fn extract_request(reply: &str) -> Option<CheckRequest> {
    let start = reply.find('{')?;
    let end = reply.rfind('}')?;
    if end < start {
        return None;
    }
    let mut request: CheckRequest = match serde_json::from_str(&reply[start..=end]) {
        Ok(request) => request,
        Err(e) => {
            debug!(error = %e, "Extraction reply is not JSON");
            return None;
        }
    };
    request.patient_name = request.patient_name.trim().to_string();
    request.disease = request.disease.trim().to_string();
    (!request.patient_name.is_empty() && !request.disease.is_empty()).then_some(request)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VaccinationStatus {
    Vaccinated,
    NotVaccinated,
}

#[derive(Debug, Clone)]
pub struct VaccinationReport {
    pub patient: PatientCandidate,
    pub disease: String,
    /// CVX codes considered evidence of vaccination against `disease`.
    pub target_codes: BTreeSet<String>,
    pub immunizations: Vec<Immunization>,
    pub status: VaccinationStatus,
    /// `None` when the recommendation request failed.
    pub recommendation: Option<String>,
}

impl VaccinationReport {
    /// Immunizations whose CVX code is one of the target codes.
    pub fn matching(&self) -> impl Iterator<Item = &Immunization> {
        self.immunizations.iter().filter(|imm| {
            imm.cvx_code
                .as_ref()
                .is_some_and(|code| self.target_codes.contains(code))
        })
    }
}

/// Compare a record against the target codes.
pub fn vaccination_status(immunizations: &[Immunization], target_codes: &BTreeSet<String>) -> VaccinationStatus {
    let vaccinated = immunizations.iter().any(|imm| {
        imm.cvx_code
            .as_ref()
            .is_some_and(|code| target_codes.contains(code))
    });
    if vaccinated {
        VaccinationStatus::Vaccinated
    } else {
        VaccinationStatus::NotVaccinated
    }
}

/// How a vaccination check ended.
#[derive(Debug, Clone)]
pub enum CheckOutcome {
    Reported(Box<VaccinationReport>),
    /// The model did not name both a patient and a disease.
    ExtractionFailed,
    PatientNotFound { query: String },
    DisambiguationAborted(SelectionError),
    TransportFailure(ProviderError),
    /// A FHIR or CVX lookup failed.
    LookupFailed(ToolError),
}

impl CheckOutcome {
    pub fn report(&self) -> Option<&VaccinationReport> {
        match self {
            CheckOutcome::Reported(report) => Some(report.as_ref()),
            _ => None,
        }
    }

    /// Whether the patient-specific path was abandoned, so a general
    /// answer may still help.
    pub fn abandoned_patient_path(&self) -> bool {
        matches!(
            self,
            CheckOutcome::PatientNotFound { .. } | CheckOutcome::DisambiguationAborted(_)
        )
    }
}

impl std::fmt::Display for CheckOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckOutcome::Reported(report) => {
                writeln!(f, "Immunization records for {}:", report.patient.name)?;
                if report.immunizations.is_empty() {
                    writeln!(f, "- none on record")?;
                }
                for imm in &report.immunizations {
                    writeln!(
                        f,
                        "- CVX: {}, Description: {}, Date: {}",
                        imm.cvx_code.as_deref().unwrap_or("none"),
                        imm.description,
                        imm.date
                    )?;
                }
                writeln!(f)?;
                match report.status {
                    VaccinationStatus::Vaccinated => {
                        write!(f, "The patient has been vaccinated for: {}", report.disease)?
                    }
                    VaccinationStatus::NotVaccinated => {
                        write!(f, "No evidence found of vaccination for: {}", report.disease)?
                    }
                }
                if let Some(recommendation) = &report.recommendation {
                    write!(f, "\n\nRecommendation:\n{recommendation}")?;
                }
                Ok(())
            }
            CheckOutcome::ExtractionFailed => {
                write!(f, "Could not identify a patient and a disease in the question. Try again.")
            }
            CheckOutcome::PatientNotFound { query } => {
                write!(f, "No patient found matching '{query}'.")
            }
            CheckOutcome::DisambiguationAborted(e) => write!(f, "Invalid selection: {e}."),
            CheckOutcome::TransportFailure(e) => write!(f, "No answer: {e}"),
            CheckOutcome::LookupFailed(e) => write!(f, "Lookup failed: {e}"),
        }
    }
}

fn extraction_prompt(question: &str) -> String {
    format!(
        "Extract the patient name and the infectious disease name from the question below.\n\
         Return them as JSON with keys 'patient_name' and 'disease'.\n\n\
         Question: {}",
        question.trim()
    )
}

fn recommendation_prompt(immunizations: &[Immunization]) -> String {
    let record = serde_json::to_string_pretty(immunizations).unwrap_or_else(|_| "[]".into());
    format!(
        "Given the patient's current vaccination record shown below, are there any other \
         vaccinations they should consider getting based on typical clinical guidelines?\n\n\
         Vaccination Record:\n{record}"
    )
}

/// Answers "has X been vaccinated for Y?" without the open loop.
pub struct VaccinationCheck {
    provider: Arc<dyn Provider>,
    model: String,
    render_policy: RenderPolicy,
    cleanup: ResponseCleanup,
    fhir: Arc<FhirClient>,
    vaccine_codes: VaccineCodeTool,
    selector: Arc<dyn CandidateSelector>,
}

impl VaccinationCheck {
    pub fn new(
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        fhir: Arc<FhirClient>,
        vaccine_codes: VaccineCodeTool,
        selector: Arc<dyn CandidateSelector>,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            render_policy: RenderPolicy::default(),
            cleanup: ResponseCleanup::default(),
            fhir,
            vaccine_codes,
            selector,
        }
    }

    pub fn from_config(
        provider: Arc<dyn Provider>,
        fhir: Arc<FhirClient>,
        vaccine_codes: VaccineCodeTool,
        selector: Arc<dyn CandidateSelector>,
        config: &AppConfig,
    ) -> Result<Self, regex_lite::Error> {
        let mut check = Self::new(provider, config.provider.model.clone(), fhir, vaccine_codes, selector);
        check.render_policy = config.agent.render_policy;
        check.cleanup = ResponseCleanup::with_patterns(&config.agent.signature_patterns)?;
        Ok(check)
    }

    /// One single-message completion, signatures stripped.
    async fn ask(&self, prompt: String) -> Result<String, ProviderError> {
        let request = ProviderRequest {
            model: self.model.clone(),
            messages: render(self.render_policy, &[Message::user(prompt)]),
            stream: false,
        };
        let response = self.provider.complete(request).await?;
        Ok(self.cleanup.clean(&response.content))
    }

    pub async fn run(&self, question: &str) -> CheckOutcome {
        let reply = match self.ask(extraction_prompt(question)).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(provider = %self.provider.name(), error = %e, "Transport failure");
                return CheckOutcome::TransportFailure(e);
            }
        };
        let Some(request) = extract_request(&reply) else {
            warn!(reply = %reply, "Could not extract patient and disease");
            return CheckOutcome::ExtractionFailed;
        };
        info!(patient = %request.patient_name, disease = %request.disease, "Vaccination check");

        let fragment = family_name_fragment(&request.patient_name);
        let candidates = if fragment.is_empty() {
            Vec::new()
        } else {
            match self.fhir.search_patients(&fragment).await {
                Ok(candidates) => candidates,
                Err(e) => return CheckOutcome::LookupFailed(e.into_tool_error(patient_lookup::NAME)),
            }
        };
        let patient = match disambiguate(candidates, self.selector.as_ref()).await {
            Resolution::Selected(patient) => patient,
            Resolution::NotFound => {
                return CheckOutcome::PatientNotFound {
                    query: request.patient_name,
                };
            }
            Resolution::Aborted(e) => return CheckOutcome::DisambiguationAborted(e),
        };

        let target_codes: BTreeSet<String> = match self.vaccine_codes.search(&request.disease).await {
            Ok(codes) => codes.into_iter().map(|c| c.cvx_code).collect(),
            Err(e) => return CheckOutcome::LookupFailed(e),
        };
        if target_codes.is_empty() {
            warn!(disease = %request.disease, "No CVX codes match the disease");
        }

        let immunizations = match self.fhir.immunizations(&patient.id).await {
            Ok(records) => records,
            Err(e) => return CheckOutcome::LookupFailed(e.into_tool_error(immunizations::NAME)),
        };
        let status = vaccination_status(&immunizations, &target_codes);
        debug!(patient_id = %patient.id, codes = ?target_codes, ?status, "Record compared");

        let recommendation = match self.ask(recommendation_prompt(&immunizations)).await {
            Ok(text) if !text.is_empty() => Some(text),
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "Recommendation request failed");
                None
            }
        };

        CheckOutcome::Reported(Box::new(VaccinationReport {
            patient,
            disease: request.disease,
            target_codes,
            immunizations,
            status,
            recommendation,
        }))
    }
}
