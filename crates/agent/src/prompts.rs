//! Seed messages: the tool-use instruction, the worked example, and the
//! general-knowledge persona.

use clinreact_core::message::Message;
use clinreact_core::tool::ToolRegistry;

/// Build the system instruction for a tool-augmented session.
///
/// The permitted tools are listed from `registry`, so a restricted registry
/// yields a restricted instruction.
pub fn system_instruction(registry: &ToolRegistry) -> String {
    let names = registry.names().join(", ");

    let mut text = String::from(
        "You are an autonomous clinical assistant agent. \
         Reason step by step and use the available tools to answer the user's question. \
         At each step, use exactly this format:\n\n\
         Thought: [what you need to do next]\n\
         Action: [one tool name from the list below]\n\
         Action Input: [the input to pass to the tool, on one line]\n\n\
         You will then receive an Observation with the tool result. \
         Use it in your next Thought. When you have enough information, reply with:\n\
         Final Answer: [your response to the user]\n\n\
         Available tools:\n",
    );

    let tool_lines: Vec<String> = registry
        .iter()
        .map(|tool| {
            format!(
                "- {}: {} Input: {}.",
                tool.name(),
                tool.description(),
                tool.argument_hint()
            )
        })
        .collect();
    text.push_str(&tool_lines.join("\n"));

    text.push_str(&format!(
        "\n\nRULES:\n\
         - You may ONLY use these tools: {names}.\n\
         - Do NOT invent or call tools that are not listed.\n\
         - Do NOT assume tool results. Wait for an Observation before continuing.\n\
         - Do NOT schedule appointments, send messages, or call external services.\n\
         - Stop after giving your Final Answer."
    ));
    text
}

/// The worked example shown before every question.
pub fn few_shot() -> Vec<Message> {
    vec![
        Message::user("Has John Smith been vaccinated for COVID?"),
        Message::assistant(
            "Thought: I need to find John Smith in the patient records.\n\
             Action: GetPatientByName\n\
             Action Input: John Smith",
        ),
        Message::observation(r#"[{"id": "123", "name": "John Smith"}]"#),
        Message::assistant(
            "Thought: I should now check his immunizations.\n\
             Action: GetAllImmunizations\n\
             Action Input: 123",
        ),
        Message::observation(
            r#"[{"cvx_code": "208", "description": "COVID-19 mRNA", "date": "2022-02-01"}]"#,
        ),
        Message::assistant("Final Answer: Yes, John Smith has been vaccinated for COVID-19."),
    ]
}

/// Opening message for the general-knowledge path (sent as `assistant`).
pub const GENERAL_ROLE: &str = "You are a helpful Physician Assistant who provides general \
    information about medical topics.\n\
    If a user asks about a specific patient, include the patient's name in your response and \
    state that you cannot answer due to lack of access to their medical record.\n\
    Avoid adding role signatures like '__Assistant__'.";

/// Example exchanges for the general-knowledge path.
pub fn general_examples() -> Vec<Message> {
    vec![
        Message::user("What is the difference between a cold and flu?"),
        Message::assistant(
            "A cold is caused by rhinoviruses and usually has milder symptoms. Flu, caused by \
             influenza viruses, tends to be more severe and may require antiviral treatment.",
        ),
        Message::user("What is the treatment for bacterial skin infections?"),
        Message::assistant(
            "Bacterial skin infections like impetigo or cellulitis are treated with antibiotics. \
             The specific choice depends on the bacteria and the patient's medical history.",
        ),
        Message::user("What is John Smith's blood glucose level?"),
        Message::assistant(
            "I do not have access to John Smith's medical record, so I cannot provide that \
             information.",
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{Directive, parse};
    use crate::patterns::test_helpers::{MockImmunizationsTool, MockPatientTool};
    use clinreact_core::message::Role;

    #[test]
    fn instruction_lists_only_registered_tools() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(MockPatientTool::new(vec![])));
        let text = system_instruction(&registry);
        assert!(text.contains("You may ONLY use these tools: GetPatientByName."));
        assert!(text.contains("- GetPatientByName:"));
        assert!(!text.contains("GetAllImmunizations:"));
    }

    #[test]
    fn instruction_lists_tools_in_name_order() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(MockPatientTool::new(vec![])));
        registry.register(Box::new(MockImmunizationsTool::covid()));
        let text = system_instruction(&registry);
        assert!(text.contains("GetAllImmunizations, GetPatientByName"));
    }

    #[test]
    fn tool_lines_precede_rules() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(MockPatientTool::new(vec![])));
        registry.register(Box::new(MockImmunizationsTool::covid()));
        let text = system_instruction(&registry);
        assert!(text.contains(
            "- GetAllImmunizations: List a patient's immunizations. Input: patient id.\n\
             - GetPatientByName: Search patients by name. Input: patient name.\n\nRULES:\n"
        ));
    }

    #[test]
    fn few_shot_replies_parse_as_intended() {
        let replies: Vec<Directive> = few_shot()
            .iter()
            .filter(|m| m.role() == Role::Assistant)
            .map(|m| parse(m.content()))
            .collect();
        assert!(matches!(&replies[0], Directive::ToolCall { name, .. } if name == "GetPatientByName"));
        assert!(matches!(&replies[1], Directive::ToolCall { argument, .. } if argument == "123"));
        assert!(matches!(&replies[2], Directive::FinalAnswer { .. }));
    }

    #[test]
    fn general_examples_alternate_roles() {
        let roles: Vec<Role> = general_examples().iter().map(|m| m.role()).collect();
        assert_eq!(roles.len(), 6);
        assert!(roles.chunks(2).all(|p| p == [Role::User, Role::Assistant]));
    }
}
