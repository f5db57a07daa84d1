//! Parser collaborator seam.
//!
//! The DSL parser is an external collaborator; this crate defines only the
//! trait it is reached through and the outcome shape it returns. The
//! versioning orchestration awaits `parse` for each version of an
//! agreement; everything downstream of the parse is synchronous.

use async_trait::async_trait;

use crate::program::Program;

/// Outcome of parsing agreement source text.
///
/// A failed parse is fatal to loading that agreement; the error text is
/// surfaced verbatim to the caller.
#[derive(Debug, Clone)]
pub struct ParseOutcome {
    pub success: bool,
    pub program: Option<Program>,
    pub error: Option<String>,
}

impl ParseOutcome {
    pub fn ok(program: Program) -> ParseOutcome {
        ParseOutcome {
            success: true,
            program: Some(program),
            error: None,
        }
    }

    pub fn err(message: impl Into<String>) -> ParseOutcome {
        ParseOutcome {
            success: false,
            program: None,
            error: Some(message.into()),
        }
    }
}

/// Asynchronous parser of ProViso source text.
///
/// Implementations wrap the external parser. The trait is async because
/// real deployments parse out-of-process; the in-memory test
/// implementation resolves immediately.
#[async_trait]
pub trait AgreementParser: Send + Sync {
    async fn parse(&self, source: &str) -> ParseOutcome;
}

/// A parser that returns pre-built programs keyed by exact source text.
///
/// Used in tests and anywhere the AST is already in hand: register each
/// source string with its program, then hand the parser to the versioning
/// orchestration.
#[derive(Default)]
pub struct StaticParser {
    entries: Vec<(String, Program)>,
}

impl StaticParser {
    pub fn new() -> StaticParser {
        StaticParser::default()
    }

    pub fn with(mut self, source: impl Into<String>, program: Program) -> StaticParser {
        self.entries.push((source.into(), program));
        self
    }
}

#[async_trait]
impl AgreementParser for StaticParser {
    async fn parse(&self, source: &str) -> ParseOutcome {
        match self.entries.iter().find(|(s, _)| s == source) {
            Some((_, program)) => ParseOutcome::ok(program.clone()),
            None => ParseOutcome::err(format!(
                "no registered program for source ({} bytes)",
                source.len()
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_parser_returns_registered_program() {
        let parser = StaticParser::new().with("COVENANT X", Program::new());
        let outcome = parser.parse("COVENANT X").await;
        assert!(outcome.success);
        assert!(outcome.program.is_some());
    }

    #[tokio::test]
    async fn static_parser_rejects_unknown_source() {
        let parser = StaticParser::new();
        let outcome = parser.parse("BASKET Y").await;
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("no registered program"));
    }
}
