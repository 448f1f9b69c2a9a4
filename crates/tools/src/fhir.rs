//! Minimal FHIR R4 client for the patient and immunization lookups.
//!
//! Only two searches are needed: `Patient?family:contains=` and
//! `Immunization?patient=Patient/<id>`. Bundles are reduced to the flat
//! shapes in `clinreact_core::clinical` by pure functions so they can be
//! tested without a server.

use clinreact_core::clinical::{Immunization, PatientCandidate};
use clinreact_core::error::ToolError;
use serde_json::Value;
use tracing::debug;

/// Coding system URI for CDC vaccine codes.
pub const CVX_SYSTEM: &str = "http://hl7.org/fhir/sid/cvx";

const FHIR_JSON: &str = "application/fhir+json";

/// FHIR request failures.
#[derive(Debug, thiserror::Error)]
pub enum FhirError {
    #[error("FHIR server returned status {0}")]
    Status(u16),

    #[error("FHIR request failed: {0}")]
    Transport(String),

    #[error("FHIR response is not JSON: {0}")]
    Decode(String),
}

impl FhirError {
    /// Attribute the failure to the tool that made the request.
    pub fn into_tool_error(self, tool_name: &str) -> ToolError {
        match self {
            FhirError::Status(status_code) => ToolError::Upstream {
                tool_name: tool_name.to_string(),
                status_code,
            },
            other => ToolError::ExecutionFailed {
                tool_name: tool_name.to_string(),
                reason: other.to_string(),
            },
        }
    }
}

/// HTTP client bound to one FHIR base URL.
pub struct FhirClient {
    base_url: String,
    username: Option<String>,
    password: Option<String>,
    client: reqwest::Client,
}

impl FhirClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            username: None,
            password: None,
            client: reqwest::Client::new(),
        }
    }

    /// Use HTTP basic auth on every request.
    pub fn with_basic_auth(mut self, username: impl Into<String>, password: Option<String>) -> Self {
        self.username = Some(username.into());
        self.password = password;
        self
    }

    pub fn from_config(config: &clinreact_config::FhirConfig) -> Self {
        let client = Self::new(config.base_url.clone());
        match &config.username {
            Some(user) => client.with_basic_auth(user.clone(), config.password.clone()),
            None => client,
        }
    }

    /// Patients whose family name contains `fragment`.
    pub async fn search_patients(&self, fragment: &str) -> Result<Vec<PatientCandidate>, FhirError> {
        let bundle = self
            .search("Patient", &[("family:contains", fragment)])
            .await?;
        Ok(parse_patient_bundle(&bundle))
    }

    /// Every immunization recorded for `patient_id`.
    pub async fn immunizations(&self, patient_id: &str) -> Result<Vec<Immunization>, FhirError> {
        let reference = format!("Patient/{patient_id}");
        let bundle = self
            .search("Immunization", &[("patient", reference.as_str())])
            .await?;
        Ok(parse_immunization_bundle(&bundle))
    }

    async fn search(&self, resource: &str, query: &[(&str, &str)]) -> Result<Value, FhirError> {
        let url = format!("{}/{resource}", self.base_url);
        debug!(%url, ?query, "FHIR search");

        let mut request = self
            .client
            .get(&url)
            .query(query)
            .header("Accept", FHIR_JSON)
            .header("Content-Type", FHIR_JSON);
        if let Some(user) = &self.username {
            request = request.basic_auth(user, self.password.as_ref());
        }

        let response = request
            .send()
            .await
            .map_err(|e| FhirError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        if status != 200 {
            return Err(FhirError::Status(status));
        }

        response
            .json()
            .await
            .map_err(|e| FhirError::Decode(e.to_string()))
    }
}

fn bundle_resources(bundle: &Value) -> impl Iterator<Item = &Value> {
    bundle["entry"]
        .as_array()
        .into_iter()
        .flatten()
        .map(|entry| &entry["resource"])
        .filter(|r| r.is_object())
}

fn str_or<'a>(value: &'a Value, default: &'a str) -> &'a str {
    value.as_str().unwrap_or(default)
}

/// Reduce a Patient search bundle to candidates.
pub fn parse_patient_bundle(bundle: &Value) -> Vec<PatientCandidate> {
    bundle_resources(bundle)
        .map(|resource| PatientCandidate {
            id: str_or(&resource["id"], "").to_string(),
            name: display_name(&resource["name"][0]),
            gender: str_or(&resource["gender"], "unknown").to_string(),
            birth_date: str_or(&resource["birthDate"], "unknown").to_string(),
        })
        .collect()
}

/// "Given Given Family" from the first HumanName, or "Unknown".
fn display_name(name: &Value) -> String {
    if !name.is_object() {
        return "Unknown".into();
    }
    let given: Vec<&str> = name["given"]
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .collect();
    let full = format!("{} {}", given.join(" "), str_or(&name["family"], ""));
    let full = full.trim();
    if full.is_empty() {
        "Unknown".into()
    } else {
        full.to_string()
    }
}

/// Reduce an Immunization search bundle to flat records.
pub fn parse_immunization_bundle(bundle: &Value) -> Vec<Immunization> {
    bundle_resources(bundle)
        .map(|resource| {
            let vaccine = &resource["vaccineCode"];
            let cvx = vaccine["coding"]
                .as_array()
                .into_iter()
                .flatten()
                .find(|c| c["system"].as_str() == Some(CVX_SYSTEM));

            let description = vaccine["text"]
                .as_str()
                .filter(|t| !t.is_empty())
                .or_else(|| cvx.and_then(|c| c["display"].as_str()))
                .unwrap_or("Unknown");

            Immunization {
                cvx_code: cvx.and_then(|c| match &c["code"] {
                    Value::String(s) => Some(s.clone()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                }),
                description: description.to_string(),
                date: str_or(&resource["occurrenceDateTime"], "unknown").to_string(),
                status: str_or(&resource["status"], "unknown").to_string(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn smith_bundle() -> Value {
        json!({
            "resourceType": "Bundle",
            "entry": [
                { "resource": {
                    "resourceType": "Patient",
                    "id": "123",
                    "gender": "male",
                    "birthDate": "1970-01-01",
                    "name": [{ "given": ["John", "Q"], "family": "Smith" }]
                }},
                { "resource": {
                    "resourceType": "Patient",
                    "id": "456"
                }}
            ]
        })
    }

    #[test]
    fn patient_bundle_is_flattened() {
        let patients = parse_patient_bundle(&smith_bundle());
        assert_eq!(patients.len(), 2);
        assert_eq!(patients[0].id, "123");
        assert_eq!(patients[0].name, "John Q Smith");
        assert_eq!(patients[0].gender, "male");
        assert_eq!(patients[0].birth_date, "1970-01-01");

        assert_eq!(patients[1].name, "Unknown");
        assert_eq!(patients[1].gender, "unknown");
        assert_eq!(patients[1].birth_date, "unknown");
    }

    #[test]
    fn bundle_without_entries_is_empty() {
        assert!(parse_patient_bundle(&json!({ "resourceType": "Bundle", "total": 0 })).is_empty());
        assert!(parse_immunization_bundle(&json!({})).is_empty());
    }

    #[test]
    fn immunization_prefers_text_then_cvx_display() {
        let bundle = json!({
            "entry": [
                { "resource": {
                    "status": "completed",
                    "occurrenceDateTime": "2022-02-01",
                    "vaccineCode": {
                        "text": "COVID-19 mRNA",
                        "coding": [{ "system": CVX_SYSTEM, "code": "208", "display": "SARS-COV-2" }]
                    }
                }},
                { "resource": {
                    "vaccineCode": {
                        "coding": [
                            { "system": "http://example.org/local", "code": "x", "display": "Local" },
                            { "system": CVX_SYSTEM, "code": "140", "display": "Influenza, seasonal" }
                        ]
                    }
                }},
                { "resource": { "vaccineCode": {} } }
            ]
        });

        let records = parse_immunization_bundle(&bundle);
        assert_eq!(records.len(), 3);

        assert_eq!(records[0].cvx_code.as_deref(), Some("208"));
        assert_eq!(records[0].description, "COVID-19 mRNA");
        assert_eq!(records[0].date, "2022-02-01");
        assert_eq!(records[0].status, "completed");

        assert_eq!(records[1].cvx_code.as_deref(), Some("140"));
        assert_eq!(records[1].description, "Influenza, seasonal");
        assert_eq!(records[1].date, "unknown");
        assert_eq!(records[1].status, "unknown");

        assert_eq!(records[2].cvx_code, None);
        assert_eq!(records[2].description, "Unknown");
    }

    #[tokio::test]
    async fn patient_search_sends_fhir_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/Patient"))
            .and(query_param("family:contains", "Smit"))
            .and(header("accept", "application/fhir+json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(smith_bundle()))
            .expect(1)
            .mount(&server)
            .await;

        let client = FhirClient::new(server.uri()).with_basic_auth("_SYSTEM", Some("pw".into()));
        let patients = client.search_patients("Smit").await.unwrap();
        assert_eq!(patients.len(), 2);
    }

    #[tokio::test]
    async fn immunization_search_uses_patient_reference() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/Immunization"))
            .and(query_param("patient", "Patient/123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "entry": [] })))
            .expect(1)
            .mount(&server)
            .await;

        let records = FhirClient::new(server.uri())
            .immunizations("123")
            .await
            .unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn non_200_is_status_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let err = FhirClient::new(server.uri())
            .search_patients("Smit")
            .await
            .unwrap_err();
        assert!(matches!(err, FhirError::Status(500)));

        let tool_err = err.into_tool_error("GetPatientByName");
        assert!(matches!(tool_err, ToolError::Upstream { status_code: 500, .. }));
    }
}
