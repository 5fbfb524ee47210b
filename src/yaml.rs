//! A small positioned YAML tree.
//!
//! Descriptor diagnostics must point at the node that caused them, so the
//! descriptor is not decoded straight into structs. Instead the event stream
//! of `yaml-rust2` is folded into [`Node`]s that remember where they start.
//! Scalars keep their source text and a resolved [`ScalarKind`] (plain
//! scalars follow the YAML 1.2 core schema; quoted and block scalars are
//! always strings). Aliases are expanded to a copy of their anchor.

use std::collections::HashMap;

use yaml_rust2::parser::{Event, MarkedEventReceiver, Parser};
use yaml_rust2::scanner::{Marker, TScalarStyle};

/// 1-based position of a node's first character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Mark {
    pub line: usize,
    pub column: usize,
}

impl From<Marker> for Mark {
    fn from(m: Marker) -> Self {
        Self {
            line: m.line(),
            column: m.col() + 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    Null,
    Bool,
    Int,
    Float,
    Str,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Scalar { text: String, kind: ScalarKind },
    Seq(Vec<Node>),
    Map(Vec<(Node, Node)>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub value: Value,
    pub mark: Mark,
}

impl Node {
    /// The text of a string scalar.
    pub fn as_str(&self) -> Option<&str> {
        match &self.value {
            Value::Scalar {
                text,
                kind: ScalarKind::Str,
            } => Some(text),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match &self.value {
            Value::Scalar {
                text,
                kind: ScalarKind::Int,
            } => parse_int(text),
            _ => None,
        }
    }

    pub fn as_seq(&self) -> Option<&[Node]> {
        match &self.value {
            Value::Seq(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&[(Node, Node)]> {
        match &self.value {
            Value::Map(entries) => Some(entries),
            _ => None,
        }
    }

    /// Text used when this node is a mapping key. Collections have none.
    pub fn key_text(&self) -> &str {
        match &self.value {
            Value::Scalar { text, .. } => text,
            _ => "",
        }
    }
}

/// A syntax error reported by the scanner.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message} at line {} column {}", mark.line, mark.column)]
pub struct YamlError {
    pub message: String,
    pub mark: Mark,
}

/// Parse every document of `source`.
pub fn load(source: &str) -> Result<Vec<Node>, YamlError> {
    let mut builder = TreeBuilder::default();
    let mut parser = Parser::new(source.chars());
    parser.load(&mut builder, true).map_err(|e| YamlError {
        message: e.info().to_string(),
        mark: (*e.marker()).into(),
    })?;
    Ok(builder.documents)
}

enum Frame {
    Seq {
        mark: Mark,
        anchor: usize,
        items: Vec<Node>,
    },
    Map {
        mark: Mark,
        anchor: usize,
        entries: Vec<(Node, Node)>,
        key: Option<Node>,
    },
}

#[derive(Default)]
struct TreeBuilder {
    stack: Vec<Frame>,
    documents: Vec<Node>,
    anchors: HashMap<usize, Node>,
}

impl TreeBuilder {
    fn finish_node(&mut self, node: Node, anchor: usize) {
        if anchor > 0 {
            self.anchors.insert(anchor, node.clone());
        }
        match self.stack.last_mut() {
            None => self.documents.push(node),
            Some(Frame::Seq { items, .. }) => items.push(node),
            Some(Frame::Map { entries, key, .. }) => match key.take() {
                None => *key = Some(node),
                Some(k) => entries.push((k, node)),
            },
        }
    }
}

impl MarkedEventReceiver for TreeBuilder {
    fn on_event(&mut self, ev: Event, marker: Marker) {
        let mark = Mark::from(marker);
        match ev {
            Event::Scalar(text, style, anchor, ..) => {
                let kind = if matches!(style, TScalarStyle::Plain) {
                    resolve_plain(&text)
                } else {
                    ScalarKind::Str
                };
                let node = Node {
                    value: Value::Scalar { text, kind },
                    mark,
                };
                self.finish_node(node, anchor);
            }
            Event::SequenceStart(anchor, ..) => self.stack.push(Frame::Seq {
                mark,
                anchor,
                items: Vec::new(),
            }),
            Event::MappingStart(anchor, ..) => self.stack.push(Frame::Map {
                mark,
                anchor,
                entries: Vec::new(),
                key: None,
            }),
            Event::SequenceEnd | Event::MappingEnd => {
                let (node, anchor) = match self.stack.pop() {
                    Some(Frame::Seq {
                        mark,
                        anchor,
                        items,
                    }) => (
                        Node {
                            value: Value::Seq(items),
                            mark,
                        },
                        anchor,
                    ),
                    Some(Frame::Map {
                        mark,
                        anchor,
                        entries,
                        ..
                    }) => (
                        Node {
                            value: Value::Map(entries),
                            mark,
                        },
                        anchor,
                    ),
                    None => return,
                };
                self.finish_node(node, anchor);
            }
            Event::Alias(id) => {
                let node = match self.anchors.get(&id) {
                    Some(target) => Node {
                        value: target.value.clone(),
                        mark,
                    },
                    None => Node {
                        value: Value::Scalar {
                            text: String::new(),
                            kind: ScalarKind::Null,
                        },
                        mark,
                    },
                };
                self.finish_node(node, 0);
            }
            _ => {}
        }
    }
}

fn resolve_plain(text: &str) -> ScalarKind {
    match text {
        "" | "~" | "null" | "Null" | "NULL" => ScalarKind::Null,
        "true" | "True" | "TRUE" | "false" | "False" | "FALSE" => ScalarKind::Bool,
        ".inf" | ".Inf" | ".INF" | "+.inf" | "+.Inf" | "+.INF" | "-.inf" | "-.Inf" | "-.INF"
        | ".nan" | ".NaN" | ".NAN" => ScalarKind::Float,
        _ if parse_int(text).is_some() => ScalarKind::Int,
        _ if looks_like_float(text) => ScalarKind::Float,
        _ => ScalarKind::Str,
    }
}

fn parse_int(text: &str) -> Option<i64> {
    if let Some(hex) = text.strip_prefix("0x") {
        return i64::from_str_radix(hex, 16).ok();
    }
    if let Some(oct) = text.strip_prefix("0o") {
        return i64::from_str_radix(oct, 8).ok();
    }
    let digits = text.strip_prefix(['-', '+']).unwrap_or(text);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}

fn looks_like_float(text: &str) -> bool {
    let body = text.strip_prefix(['-', '+']).unwrap_or(text);
    body.bytes().next().is_some_and(|b| b.is_ascii_digit() || b == b'.')
        && body
            .bytes()
            .all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'e' | b'E' | b'-' | b'+'))
        && text.parse::<f64>().is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single(source: &str) -> Node {
        let mut docs = load(source).unwrap();
        assert_eq!(docs.len(), 1);
        docs.remove(0)
    }

    #[test]
    fn records_positions_of_keys_and_values() {
        let root = single("version: 1\nproject:\n  name: docs\n");
        let entries = root.as_map().unwrap();
        assert_eq!(entries[0].0.key_text(), "version");
        assert_eq!(entries[0].0.mark, Mark { line: 1, column: 1 });
        assert_eq!(entries[0].1.as_int(), Some(1));

        let project = entries[1].1.as_map().unwrap();
        assert_eq!(project[0].0.mark, Mark { line: 3, column: 3 });
        assert_eq!(project[0].1.as_str(), Some("docs"));
        assert_eq!(project[0].1.mark, Mark { line: 3, column: 9 });
    }

    #[test]
    fn plain_scalars_are_typed() {
        let root = single("a: 1\nb: \"1\"\nc: true\nd: 1.5\ne:\nf: hello\n");
        let kinds: Vec<_> = root
            .as_map()
            .unwrap()
            .iter()
            .map(|(_, v)| match &v.value {
                Value::Scalar { kind, .. } => *kind,
                _ => panic!("not a scalar"),
            })
            .collect();
        assert_eq!(
            kinds,
            vec![
                ScalarKind::Int,
                ScalarKind::Str,
                ScalarKind::Bool,
                ScalarKind::Float,
                ScalarKind::Null,
                ScalarKind::Str
            ]
        );
    }

    #[test]
    fn counts_documents() {
        assert_eq!(load("a: 1\n---\nb: 2\n").unwrap().len(), 2);
        assert_eq!(load("").unwrap().len(), 0);
    }

    #[test]
    fn expands_aliases() {
        let root = single("base: &b\n  x: 1\ncopy: *b\n");
        let entries = root.as_map().unwrap();
        assert_eq!(entries[1].1.as_map().unwrap()[0].0.key_text(), "x");
    }

    #[test]
    fn syntax_error_has_position() {
        let err = load("a: [1, 2\n").unwrap_err();
        assert!(err.mark.line >= 1);
    }
}
