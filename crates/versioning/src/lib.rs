//! proviso-versioning: agreement version comparison.
//!
//! Pipeline: source text for two versions -> parse (async collaborator)
//! -> `compile_to_state` -> `diff_states` -> `classify_diff` ->
//! `ChangeSummary` -> changelog rendering. Only the parse step is
//! asynchronous; diffing and classification are synchronous and
//! CPU-bound.
//!
//! Compiled states are built fresh per comparison and never fed back
//! into execution.

use proviso_core::AgreementParser;

pub mod changelog;
pub mod classify;
pub mod compile;
pub mod diff;

pub use changelog::{
    ChangeLog, ChangelogFormat, ChangelogOptions, ChangelogValidation, generate_changelog,
};
pub use classify::{Change, ChangeSummary, Impact, classify_diff};
pub use compile::{CanonicalElement, CompiledState, compile_to_state};
pub use diff::{DiffResult, ElementModification, FieldChange, diff_states};

/// Errors fatal to a version comparison.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum VersionError {
    #[error("parse error in {which} version: {message}")]
    Parse { which: &'static str, message: String },
}

/// Compare two versions of an agreement's source text.
///
/// Async purely because it awaits the parser for each version; the
/// diff/classify computation itself runs to completion synchronously.
pub async fn compute_change_summary(
    parser: &dyn AgreementParser,
    from_code: &str,
    to_code: &str,
    from_version: u32,
    to_version: u32,
    author: &str,
) -> Result<ChangeSummary, VersionError> {
    let from_program = parse_version(parser, from_code, "from").await?;
    let to_program = parse_version(parser, to_code, "to").await?;

    let before = compile_to_state(&from_program);
    let after = compile_to_state(&to_program);
    let diff = diff_states(&before, &after);
    let changes = classify_diff(&before, &after, &diff);

    Ok(ChangeSummary::new(from_version, to_version, author, changes))
}

async fn parse_version(
    parser: &dyn AgreementParser,
    source: &str,
    which: &'static str,
) -> Result<proviso_core::Program, VersionError> {
    let outcome = parser.parse(source).await;
    match outcome.program {
        Some(program) if outcome.success => Ok(program),
        _ => Err(VersionError::Parse {
            which,
            message: outcome
                .error
                .unwrap_or_else(|| "unknown parse error".to_string()),
        }),
    }
}
