//! Patient disambiguation: narrow a name search to one patient.
//!
//! Candidates are presented in lookup order (never re-sorted) and the
//! caller picks one by 1-based index. Zero candidates means "not found" and
//! never prompts; a bad selection aborts without re-prompting.

use async_trait::async_trait;
use clinreact_core::clinical::PatientCandidate;

/// Whoever picks between candidates (usually the console user).
#[async_trait]
pub trait CandidateSelector: Send + Sync {
    /// Present `candidates` and return the raw selection, or `None` if the
    /// caller gave no input.
    async fn choose(&self, candidates: &[PatientCandidate]) -> Option<String>;
}

/// Why a selection was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectionError {
    #[error("no selection was made")]
    NoInput,

    #[error("'{0}' is not a number")]
    NotANumber(String),

    #[error("selection {selected} is out of range 1..={count}")]
    OutOfRange { selected: usize, count: usize },
}

/// How a disambiguation episode ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Selected(PatientCandidate),
    NotFound,
    Aborted(SelectionError),
}

/// Parse a 1-based selection into a 0-based index.
pub fn parse_selection(input: &str, count: usize) -> Result<usize, SelectionError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(SelectionError::NoInput);
    }
    let selected: usize = trimmed
        .parse()
        .map_err(|_| SelectionError::NotANumber(trimmed.to_string()))?;
    if selected == 0 || selected > count {
        return Err(SelectionError::OutOfRange { selected, count });
    }
    Ok(selected - 1)
}

/// Resolve `candidates` to exactly one patient.
///
/// A single candidate is selected without asking.
pub async fn disambiguate(
    candidates: Vec<PatientCandidate>,
    selector: &dyn CandidateSelector,
) -> Resolution {
    match candidates.len() {
        0 => Resolution::NotFound,
        1 => candidates
            .into_iter()
            .next()
            .map_or(Resolution::NotFound, Resolution::Selected),
        count => {
            let Some(input) = selector.choose(&candidates).await else {
                return Resolution::Aborted(SelectionError::NoInput);
            };
            match parse_selection(&input, count) {
                Ok(index) => candidates
                    .into_iter()
                    .nth(index)
                    .map_or(Resolution::NotFound, Resolution::Selected),
                Err(e) => Resolution::Aborted(e),
            }
        }
    }
}

/// One console line per candidate: `N. Name (Gender: g, DOB: d, ID: id)`.
pub fn format_candidates(candidates: &[PatientCandidate]) -> Vec<String> {
    candidates
        .iter()
        .enumerate()
        .map(|(i, c)| {
            format!(
                "{}. {} (Gender: {}, DOB: {}, ID: {})",
                i + 1,
                c.name,
                c.gender,
                c.birth_date,
                c.id
            )
        })
        .collect()
}
