//! Answering strategies.
//!
//! 1. **ReAct**: Thought → Action → Observation loop over the clinical tools
//! 2. **General**: a single tool-free completion for non-patient questions
//! 3. **Vaccination check**: a fixed lookup pipeline with a typed verdict

pub mod general;
pub mod react;
pub mod vaccination;

pub use general::GeneralAssistant;
pub use react::{ReactAgent, ReactOutcome, ReactResult};
pub use vaccination::{CheckOutcome, VaccinationCheck, VaccinationReport, VaccinationStatus};

#[cfg(test)]
pub(crate) mod test_helpers;
