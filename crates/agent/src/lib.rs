//! The reasoning loop for clinreact.
//!
//! Each question follows a **Thought → Action → Observation** cycle:
//!
//! 1. **Seed** the history (instructions, worked example, question)
//! 2. **Render** the history and send it to the model
//! 3. **Parse** the reply into a tool call or a final answer
//! 4. **If tool call**: run the whitelisted tool, append the observation,
//!    loop back to step 2
//! 5. **If final answer**: return it to the caller
//!
//! The loop stops at the first final answer, an unknown tool, a transport
//! failure, or the step budget.

pub mod disambiguation;
pub mod parser;
pub mod patterns;
pub mod prompts;
pub mod render;

pub use disambiguation::{CandidateSelector, Resolution, SelectionError};
pub use parser::{Directive, ResponseCleanup, ResponseParser};
pub use patterns::{
    CheckOutcome, GeneralAssistant, ReactAgent, ReactOutcome, ReactResult, VaccinationCheck,
    VaccinationReport, VaccinationStatus,
};
