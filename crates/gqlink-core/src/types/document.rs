//! GraphQL document classification.
//!
//! Only the top level of an executable document is inspected: enough to find
//! the operation definitions, their kinds and names. Selection sets,
//! arguments and fragments are skipped without validation.

use std::iter::Peekable;
use std::str::CharIndices;

use crate::error::{Error, InvalidInputError};

use super::OperationKind;

/// An operation definition found at the top level of a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationDefinition {
    /// The operation kind.
    pub kind: OperationKind,
    /// The operation name, absent for anonymous operations.
    pub name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token<'a> {
    Name(&'a str),
    /// An opening bracket; true for `{`.
    Open(bool),
    /// A closing bracket; true for `}`.
    Close(bool),
    Other,
}

struct Lexer<'a> {
    src: &'a str,
    chars: Peekable<CharIndices<'a>>,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            chars: src.char_indices().peekable(),
        }
    }

    fn next_token(&mut self) -> Result<Option<Token<'a>>, Error> {
        while let Some(&(start, c)) = self.chars.peek() {
            match c {
                c if c.is_whitespace() || c == ',' || c == '\u{feff}' => {
                    self.chars.next();
                }
                '#' => {
                    while let Some((_, c)) = self.chars.next() {
                        if c == '\n' || c == '\r' {
                            break;
                        }
                    }
                }
                '"' => {
                    self.chars.next();
                    self.skip_string(start)?;
                    return Ok(Some(Token::Other));
                }
                '{' | '(' | '[' => {
                    self.chars.next();
                    return Ok(Some(Token::Open(c == '{')));
                }
                '}' | ')' | ']' => {
                    self.chars.next();
                    return Ok(Some(Token::Close(c == '}')));
                }
                c if c == '_' || c.is_ascii_alphabetic() => {
                    let mut end = start;
                    while let Some(&(i, c)) = self.chars.peek() {
                        if c == '_' || c.is_ascii_alphanumeric() {
                            end = i + c.len_utf8();
                            self.chars.next();
                        } else {
                            break;
                        }
                    }
                    return Ok(Some(Token::Name(&self.src[start..end])));
                }
                c if c.is_ascii_digit() || c == '-' => {
                    self.chars.next();
                    while let Some(&(_, c)) = self.chars.peek() {
                        if c.is_ascii_alphanumeric() || c == '.' || c == '+' || c == '-' {
                            self.chars.next();
                        } else {
                            break;
                        }
                    }
                    return Ok(Some(Token::Other));
                }
                _ => {
                    self.chars.next();
                    return Ok(Some(Token::Other));
                }
            }
        }
        Ok(None)
    }

    /// Skips a string literal whose opening quote at `start` was consumed.
    fn skip_string(&mut self, start: usize) -> Result<(), Error> {
        if self.src[start..].starts_with("\"\"\"") {
            self.chars.next();
            self.chars.next();
            while let Some((i, c)) = self.chars.next() {
                if c == '\\' && self.src[i..].starts_with("\\\"\"\"") {
                    for _ in 0..3 {
                        self.chars.next();
                    }
                } else if c == '"' && self.src[i..].starts_with("\"\"\"") {
                    self.chars.next();
                    self.chars.next();
                    return Ok(());
                }
            }
        } else {
            while let Some((_, c)) = self.chars.next() {
                match c {
                    '\\' => {
                        self.chars.next();
                    }
                    '"' => return Ok(()),
                    '\n' | '\r' => break,
                    _ => {}
                }
            }
        }

        Err(InvalidInputError::Document {
            reason: format!("unterminated string starting at byte {}", start),
        }
        .into())
    }
}

/// Returns every operation definition in the document, in source order.
///
/// Fragment and type-system definitions are skipped.
///
/// # Errors
///
/// Returns [`InvalidInputError::Document`] for unterminated strings or
/// unbalanced brackets.
pub fn operation_definitions(document: &str) -> Result<Vec<OperationDefinition>, Error> {
    let mut lexer = Lexer::new(document);
    let mut definitions: Vec<OperationDefinition> = Vec::new();
    let mut depth = 0usize;
    let mut at_definition_start = true;
    // Set right after an operation keyword: the next name is its name.
    let mut naming: Option<usize> = None;

    while let Some(token) = lexer.next_token()? {
        if let Some(index) = naming.take()
            && depth == 0
            && let Token::Name(name) = token
        {
            definitions[index].name = Some(name.to_string());
            continue;
        }

        match token {
            Token::Open(brace) => {
                if depth == 0 && brace && at_definition_start {
                    // Query shorthand: `{ field }`.
                    definitions.push(OperationDefinition {
                        kind: OperationKind::Query,
                        name: None,
                    });
                    at_definition_start = false;
                }
                depth += 1;
            }
            Token::Close(brace) => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| InvalidInputError::Document {
                        reason: "unbalanced closing bracket".to_string(),
                    })?;
                // Only a top-level selection set ends a definition; variable
                // and argument lists do not.
                if depth == 0 && brace {
                    at_definition_start = true;
                }
            }
            Token::Name(name) if depth == 0 && at_definition_start => {
                at_definition_start = false;
                if let Some(kind) = OperationKind::from_keyword(name) {
                    definitions.push(OperationDefinition { kind, name: None });
                    naming = Some(definitions.len() - 1);
                }
            }
            _ => {}
        }
    }

    if depth != 0 {
        return Err(InvalidInputError::Document {
            reason: "unbalanced opening bracket".to_string(),
        }
        .into());
    }

    Ok(definitions)
}

/// Returns the definition an operation executes.
///
/// With an operation name, the definition carrying that name; otherwise the
/// first operation definition in the document.
///
/// # Errors
///
/// Returns [`InvalidInputError::UnknownOperation`] if no definition carries
/// the requested name, and [`InvalidInputError::Document`] if the document
/// has no operation definition at all.
pub fn main_definition(
    document: &str,
    operation_name: Option<&str>,
) -> Result<OperationDefinition, Error> {
    let definitions = operation_definitions(document)?;

    match operation_name {
        Some(wanted) => definitions
            .into_iter()
            .find(|d| d.name.as_deref() == Some(wanted))
            .ok_or_else(|| {
                InvalidInputError::UnknownOperation {
                    name: wanted.to_string(),
                }
                .into()
            }),
        None => definitions.into_iter().next().ok_or_else(|| {
            InvalidInputError::Document {
                reason: "no operation definition".to_string(),
            }
            .into()
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kind_of(doc: &str) -> OperationKind {
        main_definition(doc, None).unwrap().kind
    }

    #[test]
    fn classifies_each_kind() {
        assert_eq!(kind_of("query Q { a }"), OperationKind::Query);
        assert_eq!(kind_of("mutation M { a }"), OperationKind::Mutation);
        assert_eq!(
            kind_of("subscription S { a }"),
            OperationKind::Subscription
        );
    }

    #[test]
    fn shorthand_is_query() {
        assert_eq!(kind_of("{ users { id } }"), OperationKind::Query);
    }

    #[test]
    fn skips_leading_fragments() {
        let doc = r#"
            fragment UserFields on User { id name }
            subscription OnUser($id: ID!) { user(id: $id) { ...UserFields } }
        "#;
        let def = main_definition(doc, None).unwrap();
        assert_eq!(def.kind, OperationKind::Subscription);
        assert_eq!(def.name.as_deref(), Some("OnUser"));
    }

    #[test]
    fn ignores_keywords_in_comments_and_strings() {
        let doc = r#"
            # subscription Fake { x }
            query Real { search(text: "subscription { x }") { id } }
        "#;
        assert_eq!(kind_of(doc), OperationKind::Query);

        let block = r#"query Q { a(doc: """subscription \""" { }""") }"#;
        assert_eq!(kind_of(block), OperationKind::Query);
    }

    #[test]
    fn nested_keywords_do_not_start_definitions() {
        let doc = "query Q { subscription { mutation } }";
        let defs = operation_definitions(doc).unwrap();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].kind, OperationKind::Query);
    }

    #[test]
    fn selects_by_operation_name() {
        let doc = "query A { a } subscription B { b } mutation C { c }";
        assert_eq!(
            main_definition(doc, Some("B")).unwrap().kind,
            OperationKind::Subscription
        );
        assert_eq!(
            main_definition(doc, Some("C")).unwrap().kind,
            OperationKind::Mutation
        );
        assert!(matches!(
            main_definition(doc, Some("D")),
            Err(Error::InvalidInput(InvalidInputError::UnknownOperation { .. }))
        ));
    }

    #[test]
    fn anonymous_keyword_operation_has_no_name() {
        let def = main_definition("subscription { ticks }", None).unwrap();
        assert_eq!(def.kind, OperationKind::Subscription);
        assert_eq!(def.name, None);
    }

    #[test]
    fn variables_with_defaults_are_skipped() {
        let doc = "query Q($n: Int = -1e10, $s: String = \"x\") @cached { a }";
        let def = main_definition(doc, None).unwrap();
        assert_eq!(def.kind, OperationKind::Query);
        assert_eq!(def.name.as_deref(), Some("Q"));
    }

    #[test]
    fn variable_list_does_not_start_a_definition() {
        let defs = operation_definitions("query Q($x: Int) { a }").unwrap();
        assert_eq!(
            defs,
            vec![OperationDefinition {
                kind: OperationKind::Query,
                name: Some("Q".to_string()),
            }]
        );

        let defs = operation_definitions("subscription S($id: ID!) @live(on: true) { a }").unwrap();
        assert_eq!(defs.len(), 1);
    }

    #[test]
    fn fragment_with_directive_arguments_is_skipped() {
        let doc = "fragment F on User @include(if: true) { id } subscription S { user { ...F } }";
        let def = main_definition(doc, None).unwrap();
        assert_eq!(def.kind, OperationKind::Subscription);
        assert_eq!(def.name.as_deref(), Some("S"));
    }

    #[test]
    fn fragment_only_document_has_no_operation() {
        assert!(main_definition("fragment F on User { id }", None).is_err());
    }

    #[test]
    fn rejects_unbalanced_and_unterminated() {
        assert!(operation_definitions("query Q { a").is_err());
        assert!(operation_definitions("query Q { a } }").is_err());
        assert!(operation_definitions("query Q { a(s: \"open) }").is_err());
    }
}
