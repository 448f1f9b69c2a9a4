//! Clinical record shapes exchanged with the lookup collaborators.
//!
//! Field names follow the JSON the model sees in Observations
//! (`birthDate`, `cvx_code`, ...), so these serialize as-is.

use serde::{Deserialize, Serialize};

/// One match from a patient name search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientCandidate {
    pub id: String,
    pub name: String,
    #[serde(default = "unknown")]
    pub gender: String,
    #[serde(rename = "birthDate", default = "unknown")]
    pub birth_date: String,
}

/// One administered vaccine from a patient's record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Immunization {
    /// CVX code, if the record carries one
    pub cvx_code: Option<String>,
    pub description: String,
    pub date: String,
    pub status: String,
}

/// One row of the CVX vaccine-code reference table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaccineCode {
    pub cvx_code: String,
    pub short_description: String,
    pub full_vaccine_name: String,
}

fn unknown() -> String {
    "unknown".into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidate_uses_camel_case_birth_date() {
        let c = PatientCandidate {
            id: "123".into(),
            name: "John Smith".into(),
            gender: "male".into(),
            birth_date: "1970-01-01".into(),
        };
        let json = serde_json::to_value(&c).unwrap();
        assert_eq!(json["birthDate"], "1970-01-01");
    }

    #[test]
    fn candidate_tolerates_missing_demographics() {
        let c: PatientCandidate =
            serde_json::from_str(r#"{"id": "123", "name": "John Smith"}"#).unwrap();
        assert_eq!(c.gender, "unknown");
        assert_eq!(c.birth_date, "unknown");
    }
}
