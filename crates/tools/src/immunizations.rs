//! `GetAllImmunizations`: list a patient's recorded vaccinations.

use crate::fhir::FhirClient;
use async_trait::async_trait;
use clinreact_core::error::ToolError;
use clinreact_core::tool::Tool;
use std::sync::Arc;

pub const NAME: &str = "GetAllImmunizations";

pub struct ImmunizationsTool {
    fhir: Arc<FhirClient>,
}

impl ImmunizationsTool {
    pub fn new(fhir: Arc<FhirClient>) -> Self {
        Self { fhir }
    }
}

#[async_trait]
impl Tool for ImmunizationsTool {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Get all immunizations for a patient. Returns cvx_code, description, date and status for each."
    }

    fn argument_hint(&self) -> &str {
        "the patient id returned by GetPatientByName"
    }

    async fn execute(&self, argument: &str) -> Result<serde_json::Value, ToolError> {
        let raw = crate::strip_quotes(argument);
        let patient_id = raw.strip_prefix("Patient/").unwrap_or(raw).trim();
        if patient_id.is_empty() {
            return Err(ToolError::InvalidArguments(
                "GetAllImmunizations needs a patient id".into(),
            ));
        }

        let records = self
            .fhir
            .immunizations(patient_id)
            .await
            .map_err(|e| e.into_tool_error(NAME))?;

        serde_json::to_value(records).map_err(|e| ToolError::ExecutionFailed {
            tool_name: NAME.into(),
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn lists_records_for_patient() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/Immunization"))
            .and(query_param("patient", "Patient/123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "entry": [{ "resource": {
                    "status": "completed",
                    "occurrenceDateTime": "2022-02-01",
                    "vaccineCode": {
                        "text": "COVID-19 mRNA",
                        "coding": [{ "system": "http://hl7.org/fhir/sid/cvx", "code": "208" }]
                    }
                }}]
            })))
            .expect(2)
            .mount(&server)
            .await;

        let tool = ImmunizationsTool::new(Arc::new(FhirClient::new(server.uri())));
        let expected = json!([{
            "cvx_code": "208",
            "description": "COVID-19 mRNA",
            "date": "2022-02-01",
            "status": "completed"
        }]);

        assert_eq!(tool.execute("123").await.unwrap(), expected);
        assert_eq!(tool.execute("Patient/123").await.unwrap(), expected);
    }

    #[tokio::test]
    async fn blank_id_is_invalid() {
        let tool = ImmunizationsTool::new(Arc::new(FhirClient::new("http://127.0.0.1:9")));
        let err = tool.execute("  ").await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}
