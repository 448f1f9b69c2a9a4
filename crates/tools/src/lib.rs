//! Clinical lookup tools for clinreact.
//!
//! Tools give the reasoning loop read access to patient data:
//! search patients by name, list a patient's immunizations, and look up
//! CVX vaccine codes.

pub mod fhir;
pub mod immunizations;
pub mod patient_lookup;
pub mod vaccine_codes;

pub use fhir::FhirClient;
pub use immunizations::ImmunizationsTool;
pub use patient_lookup::{PatientLookupTool, family_name_fragment};
pub use vaccine_codes::{VaccineCodeTool, parse_cvx_export};

use clinreact_core::error::ToolError;
use clinreact_core::tool::ToolRegistry;
use std::sync::Arc;

/// Create the tool registry for a session.
///
/// Registers every tool that can be built from `config`, then restricts the
/// set to `agent.allowed_tools`. The vaccine-code tool is only available when
/// a database is configured.
pub async fn default_registry(config: &clinreact_config::AppConfig) -> Result<ToolRegistry, ToolError> {
    let fhir = Arc::new(FhirClient::from_config(&config.fhir));
    let vaccine_codes = open_vaccine_codes(&config.vaccine_codes).await?;
    Ok(registry_with(config, fhir, vaccine_codes))
}

/// Assemble the registry from already-built collaborators, so they can be
/// shared with code that calls them directly.
pub fn registry_with(
    config: &clinreact_config::AppConfig,
    fhir: Arc<FhirClient>,
    vaccine_codes: Option<VaccineCodeTool>,
) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(PatientLookupTool::new(fhir.clone())));
    registry.register(Box::new(ImmunizationsTool::new(fhir)));
    if let Some(tool) = vaccine_codes {
        registry.register(Box::new(tool));
    }

    let registry = registry.restrict(&config.agent.allowed_tools);
    tracing::debug!(tools = ?registry.names(), "Tool registry assembled");
    registry
}

/// Open the CVX table when `[vaccine_codes].database` is set, importing
/// `import_file` first if one is configured.
pub async fn open_vaccine_codes(
    config: &clinreact_config::VaccineCodeConfig,
) -> Result<Option<VaccineCodeTool>, ToolError> {
    let Some(db) = &config.database else {
        return Ok(None);
    };
    let tool = VaccineCodeTool::connect(db).await?;
    if let Some(file) = &config.import_file {
        tool.import_export(std::path::Path::new(file)).await?;
    }
    Ok(Some(tool))
}

/// Trim whitespace and one layer of matching quotes from a tool argument.
pub(crate) fn strip_quotes(argument: &str) -> &str {
    let trimmed = argument.trim();
    for quote in ['"', '\''] {
        if let Some(inner) = trimmed
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return inner.trim();
        }
    }
    trimmed
}
