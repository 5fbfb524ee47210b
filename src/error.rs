//! Diagnostics produced while turning a descriptor into an archive.
//!
//! Every stage of the pipeline (descriptor parsing, page-tree building,
//! asset expansion, archiving) accumulates problems instead of stopping at
//! the first one. Each problem is a [`Diagnostic`]; a run's diagnostics are
//! collected in order by a [`MultiError`].
//!
//! | Kind | Produced by | Carries |
//! |------|-------------|---------|
//! | [`Diagnostic::Parse`] | descriptor parsers | file, line, column, offending source line |
//! | [`Diagnostic::Generic`] | everything else | a message |
//!
//! Rendering is left to [`crate::printer`].

use std::fmt;

/// A problem located at a specific node of a YAML document.
///
/// `line` and `column` are 1-based. `source_line` is the literal text of
/// the line the node starts on (without its line terminator).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{filepath}:{line}:{column}: {message}")]
pub struct ParseError {
    pub filepath: String,
    pub message: String,
    pub line: usize,
    pub column: usize,
    pub source_line: String,
}

/// One entry of a [`MultiError`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Diagnostic {
    /// A positioned descriptor error.
    #[error(transparent)]
    Parse(#[from] ParseError),
    /// Any other error, reduced to its message.
    #[error("{0}")]
    Generic(String),
}

impl Diagnostic {
    /// Wrap any displayable error as a [`Diagnostic::Generic`].
    pub fn generic(err: impl fmt::Display) -> Self {
        Diagnostic::Generic(err.to_string())
    }

    pub fn message(&self) -> &str {
        match self {
            Diagnostic::Parse(e) => &e.message,
            Diagnostic::Generic(m) => m,
        }
    }

    /// `(line, column)` for positioned diagnostics.
    pub fn location(&self) -> Option<(usize, usize)> {
        match self {
            Diagnostic::Parse(e) => Some((e.line, e.column)),
            Diagnostic::Generic(_) => None,
        }
    }
}

/// Ordered collection of diagnostics from a single pipeline invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultiError {
    diagnostics: Vec<Diagnostic>,
}

impl MultiError {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: impl Into<Diagnostic>) {
        self.diagnostics.push(diagnostic.into());
    }

    /// A collection holding one generic diagnostic.
    pub fn from_error(err: impl fmt::Display) -> Self {
        Diagnostic::generic(err).into()
    }

    /// Record an arbitrary error as a generic diagnostic.
    pub fn push_error(&mut self, err: impl fmt::Display) {
        self.diagnostics.push(Diagnostic::generic(err));
    }

    /// Append every diagnostic of `other`, preserving its order.
    pub fn merge(&mut self, other: MultiError) {
        self.diagnostics.extend(other.diagnostics);
    }

    pub fn has_error(&self) -> bool {
        !self.diagnostics.is_empty()
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.diagnostics.iter()
    }

    /// `Ok(value)` when nothing was recorded, otherwise `Err(self)`.
    pub fn into_result<T>(self, value: T) -> Result<T, MultiError> {
        if self.has_error() {
            Err(self)
        } else {
            Ok(value)
        }
    }

    /// Stable sort: positioned diagnostics by `(line, column)` first, then
    /// unpositioned ones in the order they were recorded.
    pub fn sort_by_location(&mut self) {
        self.diagnostics
            .sort_by_key(|d| d.location().map_or((1, 0, 0), |(l, c)| (0, l, c)));
    }
}

impl fmt::Display for MultiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.diagnostics.len() {
            0 => write!(f, "no errors"),
            1 => write!(f, "{}", self.diagnostics[0]),
            n => {
                write!(f, "{} errors occurred:", n)?;
                for d in &self.diagnostics {
                    write!(f, "\n  {}", d)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for MultiError {}

impl From<Diagnostic> for MultiError {
    fn from(diagnostic: Diagnostic) -> Self {
        Self {
            diagnostics: vec![diagnostic],
        }
    }
}

impl From<ParseError> for MultiError {
    fn from(err: ParseError) -> Self {
        Diagnostic::Parse(err).into()
    }
}

impl IntoIterator for MultiError {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.diagnostics.into_iter()
    }
}

impl<'a> IntoIterator for &'a MultiError {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.diagnostics.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_error(line: usize, column: usize, message: &str) -> ParseError {
        ParseError {
            filepath: ".dodo.yaml".to_string(),
            message: message.to_string(),
            line,
            column,
            source_line: String::new(),
        }
    }

    #[test]
    fn empty_collection_has_no_error() {
        let errors = MultiError::new();
        assert!(!errors.has_error());
        assert_eq!(errors.len(), 0);
        assert_eq!(errors.into_result(7).unwrap(), 7);
    }

    #[test]
    fn push_and_merge_keep_order() {
        let mut a = MultiError::new();
        a.push(parse_error(3, 1, "first"));
        let mut b = MultiError::new();
        b.push_error("second");
        a.merge(b);

        let messages: Vec<&str> = a.iter().map(|d| d.message()).collect();
        assert_eq!(messages, vec!["first", "second"]);
        assert!(a.into_result(()).is_err());
    }

    #[test]
    fn sort_by_location_puts_generic_last() {
        let mut errors = MultiError::new();
        errors.push_error("the `project` field is required");
        errors.push(parse_error(9, 3, "late"));
        errors.push(parse_error(4, 5, "early"));
        errors.push(parse_error(4, 5, "early twin"));
        errors.sort_by_location();

        let messages: Vec<&str> = errors.iter().map(|d| d.message()).collect();
        assert_eq!(
            messages,
            vec!["early", "early twin", "late", "the `project` field is required"]
        );
    }

    #[test]
    fn parse_error_display_has_position() {
        let err = parse_error(2, 4, "bad");
        assert_eq!(err.to_string(), ".dodo.yaml:2:4: bad");
    }
}
