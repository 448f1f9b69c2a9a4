//! Prompt renderer: message history to transport entries.

use clinreact_config::RenderPolicy;
use clinreact_core::message::{Message, Role};

/// Render the history for the transport under `policy`.
///
/// Order is preserved and nothing is dropped. In flattened mode every
/// message becomes one labelled paragraph of a single `user` entry.
pub fn render(policy: RenderPolicy, messages: &[Message]) -> Vec<Message> {
    match policy {
        RenderPolicy::Structured => messages.to_vec(),
        RenderPolicy::Flattened => vec![Message::user(flatten(messages))],
    }
}

fn label(role: Role) -> &'static str {
    match role {
        Role::System => "Instructions:",
        Role::User => "USER:",
        Role::Assistant => "ASSISTANT:",
    }
}

/// The flattened prompt text, paragraphs separated by a blank line.
pub fn flatten(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|m| format!("{} {}", label(m.role()), m.content()))
        .collect::<Vec<_>>()
        .join("\n\n")
}
