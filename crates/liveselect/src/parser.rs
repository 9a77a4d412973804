//! The query-parsing contract.
//!
//! The engine does not understand SQL text; the host supplies a parser
//! that decomposes a statement into the supported shape. Parse results
//! are cached per query text, so a parser is consulted once per distinct
//! registration.

use liveselect_core::ParsedQuery;

use crate::error::EngineError;

/// Decomposes a query string into tables, select-list, WHERE, ORDER BY,
/// and LIMIT.
///
/// Queries containing unsupported clauses (OFFSET, aggregates, joins the
/// host cannot reduce) must be rejected here with
/// [`EngineError::Configuration`].
pub trait QueryParser: Send + Sync {
    /// Parses `query`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Configuration`] for unsupported or
    /// malformed statements.
    fn parse(&self, query: &str) -> Result<ParsedQuery, EngineError>;
}

impl<F> QueryParser for F
where
    F: Fn(&str) -> Result<ParsedQuery, EngineError> + Send + Sync,
{
    fn parse(&self, query: &str) -> Result<ParsedQuery, EngineError> {
        self(query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closure_parser() {
        let parser = |query: &str| {
            if query.is_empty() {
                Err(EngineError::Configuration("empty".into()))
            } else {
                Ok(ParsedQuery::select_star(vec!["users".into()]))
            }
        };
        assert!(QueryParser::parse(&parser, "SELECT * FROM users").is_ok());
        assert!(QueryParser::parse(&parser, "").is_err());
    }
}
