//! `GetPatientByName`: search the FHIR server for patients by name.
//!
//! The server is queried with a short family-name fragment, so the result
//! is a candidate list that may contain several people.

use crate::fhir::FhirClient;
use async_trait::async_trait;
use clinreact_core::error::ToolError;
use clinreact_core::tool::Tool;
use std::sync::Arc;

pub const NAME: &str = "GetPatientByName";

/// Longest family-name fragment sent to the server.
const FRAGMENT_LEN: usize = 4;

pub struct PatientLookupTool {
    fhir: Arc<FhirClient>,
}

impl PatientLookupTool {
    pub fn new(fhir: Arc<FhirClient>) -> Self {
        Self { fhir }
    }
}

/// Normalize a free-text name into a family-name search fragment.
///
/// Takes the last whitespace-separated token, keeps ASCII alphanumerics,
/// and truncates to four characters. Returns an empty string when nothing
/// usable remains.
pub fn family_name_fragment(name: &str) -> String {
    name.split_whitespace()
        .next_back()
        .unwrap_or("")
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .take(FRAGMENT_LEN)
        .collect()
}

#[async_trait]
impl Tool for PatientLookupTool {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Search patients by name. Returns a list of matches with id, name, gender and birthDate."
    }

    fn argument_hint(&self) -> &str {
        "the patient's name, e.g. John Smith"
    }

    async fn execute(&self, argument: &str) -> Result<serde_json::Value, ToolError> {
        let name = crate::strip_quotes(argument);
        let fragment = family_name_fragment(name);
        if fragment.is_empty() {
            tracing::debug!(argument = %name, "No usable family-name fragment");
            return Ok(serde_json::json!([]));
        }

        let patients = self
            .fhir
            .search_patients(&fragment)
            .await
            .map_err(|e| e.into_tool_error(NAME))?;

        tracing::debug!(fragment = %fragment, matches = patients.len(), "Patient search");
        serde_json::to_value(patients).map_err(|e| ToolError::ExecutionFailed {
            tool_name: NAME.into(),
            reason: e.to_string(),
        })
    }
}
