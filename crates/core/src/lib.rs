//! # clinreact core
//!
//! Domain types, traits, and error definitions for the clinreact
//! tool-augmented reasoning loop. This crate has **no I/O**: it defines the
//! contracts that the transport, the clinical lookup tools and the loop
//! controller implement against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator is a trait here. Implementations live in their
//! respective crates. This enables:
//! - Swapping the chat endpoint or the clinical data source via configuration
//! - Easy testing with scripted/mock implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod clinical;
pub mod error;
pub mod message;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use clinical::{Immunization, PatientCandidate, VaccineCode};
pub use error::{ProviderError, ToolError};
pub use message::{Message, MessageStore, Role, SessionId};
pub use provider::{Provider, ProviderRequest, ProviderResponse};
pub use tool::{Tool, ToolRegistry, ToolResult};
