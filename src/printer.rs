//! Human-readable rendering of diagnostics.
//!
//! A positioned diagnostic takes two lines, in the `file:line:col` form
//! editors can jump to:
//!
//! ```text
//!   ⨯ .dodo.yaml:7:5 the `title` field is required
//!     >   - markdown: README.md
//! ```
//!
//! Other diagnostics take only the first line, without a location.

use std::io::{self, Write};

use colored::Colorize;

use crate::error::{Diagnostic, MultiError};

const PADDING: usize = 3;

pub struct ErrorPrinter<W: Write> {
    out: W,
    color: bool,
}

impl ErrorPrinter<io::Stderr> {
    /// Print to stderr; colors only when stderr is a terminal.
    pub fn stderr(no_color: bool) -> Self {
        Self::new(io::stderr(), !no_color && atty::is(atty::Stream::Stderr))
    }
}

impl<W: Write> ErrorPrinter<W> {
    pub fn new(out: W, color: bool) -> Self {
        Self { out, color }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    /// Print every diagnostic of `errors` in order.
    pub fn print_all(&mut self, errors: &MultiError) -> io::Result<()> {
        errors.iter().try_for_each(|d| self.print(d))
    }

    pub fn print(&mut self, diagnostic: &Diagnostic) -> io::Result<()> {
        let icon = self.primary(&format!("{:>width$}", "⨯", width = PADDING));
        match diagnostic {
            Diagnostic::Parse(e) => {
                let message = self.primary(&e.message);
                writeln!(
                    self.out,
                    "{} {}:{}:{} {}",
                    icon, e.filepath, e.line, e.column, message
                )?;
                let arrow = self.secondary(&format!("{:>width$}", ">", width = PADDING + 2));
                writeln!(self.out, "{} {}", arrow, e.source_line)
            }
            Diagnostic::Generic(message) => {
                let message = self.primary(message);
                writeln!(self.out, "{} {}", icon, message)
            }
        }
    }

    /// Print a single error that is not a diagnostic.
    pub fn print_error(&mut self, err: &dyn std::fmt::Display) -> io::Result<()> {
        self.print(&Diagnostic::generic(err))
    }

    fn primary(&self, text: &str) -> String {
        if self.color {
            text.bright_red().to_string()
        } else {
            text.to_string()
        }
    }

    fn secondary(&self, text: &str) -> String {
        if self.color {
            text.bright_yellow().to_string()
        } else {
            text.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ParseError;

    fn render(errors: &MultiError) -> String {
        let mut printer = ErrorPrinter::new(Vec::new(), false);
        printer.print_all(errors).unwrap();
        String::from_utf8(printer.into_inner()).unwrap()
    }

    #[test]
    fn parse_error_has_excerpt_line() {
        let mut errors = MultiError::new();
        errors.push(ParseError {
            filepath: ".dodo.yaml".to_string(),
            message: "the `title` field is required".to_string(),
            line: 7,
            column: 5,
            source_line: "  - markdown: README.md".to_string(),
        });
        errors.push_error("the `project` field is required");
        assert_eq!(
            render(&errors),
            "  ⨯ .dodo.yaml:7:5 the `title` field is required\n    >   - markdown: README.md\n  ⨯ the `project` field is required\n"
        );
    }

    #[test]
    fn colors_wrap_the_message() {
        colored::control::set_override(true);
        let mut printer = ErrorPrinter::new(Vec::new(), true);
        printer.print_error(&"boom").unwrap();
        let out = String::from_utf8(printer.into_inner()).unwrap();
        assert!(out.contains("\u{1b}["));
        assert!(out.contains("boom"));
    }
}
