use std::sync::Arc;

use serde_json::{Map, Value};

/// Whether an operation reads or writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Query,
    Mutation,
}

impl OperationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            OperationKind::Query => "query",
            OperationKind::Mutation => "mutation",
        }
    }
}

/// One GraphQL call as submitted to the request pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub kind: OperationKind,
    pub name: Option<String>,
    pub document: Arc<str>,
    pub variables: Value,
}

impl Operation {
    /// Build an operation from its document text.
    ///
    /// The kind and name come from the leading definition: `mutation Foo(...)`
    /// is a mutation named `Foo`, while anonymous `{ ... }` shorthand is a
    /// query.
    pub fn from_document(document: impl Into<Arc<str>>, variables: Value) -> Self {
        let document = document.into();
        let (kind, name) = parse_header(&document);
        let variables = match variables {
            Value::Null => Value::Object(Map::new()),
            other => other,
        };
        Self {
            kind,
            name,
            document,
            variables,
        }
    }

    pub fn is_mutation(&self) -> bool {
        self.kind == OperationKind::Mutation
    }

    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or("anonymous")
    }

    /// Document with insignificant whitespace and comments removed, used
    /// when a query travels in the URL.
    pub fn compact_document(&self) -> String {
        compact(&self.document)
    }
}

fn parse_header(document: &str) -> (OperationKind, Option<String>) {
    let mut words = document
        .lines()
        .map(|line| line.split('#').next().unwrap_or_default())
        .flat_map(|line| line.split(|c: char| c.is_whitespace() || matches!(c, '(' | '{' | '@')))
        .filter(|word| !word.is_empty());

    let kind = match words.next() {
        Some("mutation") => OperationKind::Mutation,
        Some("query") => OperationKind::Query,
        _ => return (OperationKind::Query, None),
    };
    let name = words
        .next()
        .filter(|word| word.chars().all(|c| c.is_alphanumeric() || c == '_'))
        .map(str::to_string);
    (kind, name)
}

fn compact(document: &str) -> String {
    let mut out = String::with_capacity(document.len());
    let mut in_string = false;
    let mut in_comment = false;
    let mut pending_space = false;
    let mut escaped = false;

    for c in document.chars() {
        if in_comment {
            if c == '\n' {
                in_comment = false;
                pending_space = true;
            }
            continue;
        }
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '#' => in_comment = true,
            ',' => pending_space = true,
            c if c.is_whitespace() => pending_space = true,
            _ => {
                if pending_space && needs_separator(out.chars().last(), c) {
                    out.push(' ');
                }
                pending_space = false;
                if c == '"' {
                    in_string = true;
                }
                out.push(c);
            }
        }
    }

    out
}

fn needs_separator(before: Option<char>, after: char) -> bool {
    let is_word = |c: char| c.is_alphanumeric() || matches!(c, '_' | '$' | '"');
    matches!(before, Some(b) if is_word(b)) && (is_word(after) || after == '.')
}
