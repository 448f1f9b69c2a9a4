//! Response parser: model text to a [`Directive`].
//!
//! All pattern-matching rules for model output live here. Parsing is a pure
//! function of the text: tool names are not checked against the registry
//! (the loop does that), and nothing is logged.
//!
//! Rules, in order:
//! 1. `Final Answer:` anywhere wins; everything after it is the answer.
//! 2. Otherwise `Action: <Name>` followed later by `Action Input: <rest of line>`
//!    is a tool call.
//! 3. Anything else is [`Directive::Unparseable`].

use regex_lite::Regex;
use std::sync::LazyLock;

/// The parsed intent of one model reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    ToolCall { name: String, argument: String },
    FinalAnswer { text: String },
    Unparseable { raw_text: String },
}

static FINAL_ANSWER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Final Answer\s*:").expect("valid regex"));

static ACTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Action\s*:\s*(\w+)").expect("valid regex"));

static ACTION_INPUT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Action Input\s*:[ \t]*([^\n]*)").expect("valid regex"));

/// Trailing role signatures some chat templates leak, e.g. `__(Assistant)__`
/// or a bare `(Assistant)`.
const BUILTIN_SIGNATURES: &[&str] = &[
    r"__\s*\(*\s*assistant\s*\)*\s*__",
    r"\(\s*assistant\s*\)",
];

/// Strips trailing role-signature markers from model text.
///
/// Only a marker at the very end of the text (ignoring whitespace) is
/// removed, repeatedly, so the same word mid-sentence is left alone.
#[derive(Debug, Clone)]
pub struct ResponseCleanup {
    patterns: Vec<Regex>,
}

impl ResponseCleanup {
    /// The built-in signature patterns only.
    pub fn new() -> Self {
        Self::with_patterns::<&str>(&[]).expect("built-in signature patterns compile")
    }

    /// Built-in patterns plus `extra` signature regexes.
    pub fn with_patterns<S: AsRef<str>>(extra: &[S]) -> Result<Self, regex_lite::Error> {
        let patterns = BUILTIN_SIGNATURES
            .iter()
            .copied()
            .chain(extra.iter().map(|s| s.as_ref()))
            .map(|p| Regex::new(&format!(r"(?i)\s*(?:{p})\s*$")))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    /// Remove trailing signatures and surrounding whitespace.
    pub fn clean(&self, text: &str) -> String {
        let mut current = text.trim_end();
        loop {
            let stripped = self
                .patterns
                .iter()
                .find_map(|re| re.find(current).map(|m| &current[..m.start()]));
            match stripped {
                Some(rest) if rest.len() < current.len() => current = rest.trim_end(),
                _ => break,
            }
        }
        current.trim().to_string()
    }
}

impl Default for ResponseCleanup {
    fn default() -> Self {
        Self::new()
    }
}

/// Parses model replies, applying a [`ResponseCleanup`] to answer text.
#[derive(Debug, Clone, Default)]
pub struct ResponseParser {
    cleanup: ResponseCleanup,
}

impl ResponseParser {
    pub fn new(cleanup: ResponseCleanup) -> Self {
        Self { cleanup }
    }

    pub fn cleanup(&self) -> &ResponseCleanup {
        &self.cleanup
    }

    pub fn parse(&self, raw_text: &str) -> Directive {
        if raw_text.trim().is_empty() {
            return Directive::Unparseable {
                raw_text: raw_text.to_string(),
            };
        }

        if let Some(marker) = FINAL_ANSWER.find(raw_text) {
            return Directive::FinalAnswer {
                text: self.cleanup.clean(&raw_text[marker.end()..]),
            };
        }

        if let Some(action) = ACTION.captures(raw_text) {
            let (Some(whole), Some(name)) = (action.get(0), action.get(1)) else {
                return Directive::Unparseable {
                    raw_text: raw_text.to_string(),
                };
            };
            let after = &raw_text[whole.end()..];
            if let Some(argument) = ACTION_INPUT.captures(after).and_then(|c| c.get(1)) {
                return Directive::ToolCall {
                    name: name.as_str().to_string(),
                    argument: argument.as_str().trim().to_string(),
                };
            }
        }

        Directive::Unparseable {
            raw_text: raw_text.to_string(),
        }
    }
}

/// Parse with the built-in cleanup rules.
pub fn parse(raw_text: &str) -> Directive {
    static DEFAULT: LazyLock<ResponseParser> = LazyLock::new(ResponseParser::default);
    DEFAULT.parse(raw_text)
}
