//! Pre-pass that only reads the top-level `version` of a descriptor.

use crate::error::{Diagnostic, MultiError, ParseError};
use crate::yaml::{self, Mark};

/// The declared schema number and where it was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectedVersion {
    pub number: i64,
    pub mark: Mark,
}

/// Read the integer `version` of `source` without validating anything
/// else. Every other shape problem is returned as a diagnostic.
pub fn detect_version(filepath: &str, source: &str) -> Result<DetectedVersion, MultiError> {
    let located = |message: String, mark: Mark| -> MultiError {
        ParseError {
            filepath: filepath.to_string(),
            message,
            line: mark.line,
            column: mark.column,
            source_line: super::source_line(source, mark.line),
        }
        .into()
    };

    let documents = yaml::load(source).map_err(|e| {
        located(
            format!("failed to parse a document config: {}", e.message),
            e.mark,
        )
    })?;
    if documents.len() != 1 {
        return Err(Diagnostic::generic(format!(
            "there should be only one document. Got {}",
            documents.len()
        ))
        .into());
    }

    let root = &documents[0];
    let Some(entries) = root.as_map() else {
        return Err(located(
            "the root node must be of mapping type".to_string(),
            root.mark,
        ));
    };
    let Some((_, value)) = entries.iter().find(|(k, _)| k.key_text() == "version") else {
        return Err(Diagnostic::generic("the `version` field is required").into());
    };
    match value.as_int() {
        Some(number) => Ok(DetectedVersion {
            number,
            mark: value.mark,
        }),
        None => Err(located(
            "`version` must have an integer value".to_string(),
            value.mark,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_integer_version() {
        let v = detect_version("d.yaml", "project: {}\nversion: 2\n").unwrap();
        assert_eq!(v.number, 2);
        assert_eq!(v.mark, Mark { line: 2, column: 10 });
    }

    #[test]
    fn rejects_other_shapes() {
        for source in [
            "- 1\n- 2\n",
            "a: 1\n---\nversion: 1\n",
            "project: {}\n",
            "version: \"1\"\n",
            "version: [\n",
            "",
        ] {
            let err = detect_version("d.yaml", source).unwrap_err();
            assert_eq!(err.len(), 1, "{source:?}");
        }
    }

    #[test]
    fn quoted_version_points_at_value() {
        let err = detect_version("d.yaml", "version: \"1\"\n").unwrap_err();
        let d = err.iter().next().unwrap();
        assert_eq!(d.location(), Some((1, 10)));
        assert_eq!(d.message(), "`version` must have an integer value");
    }
}
