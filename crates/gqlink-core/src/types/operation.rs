//! Outbound operations and their responses.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::Result;

use super::document::{OperationDefinition, main_definition};

/// The kind of an operation's main definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Query,
    Mutation,
    Subscription,
}

impl OperationKind {
    /// Maps a definition keyword to its kind.
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "query" => Some(Self::Query),
            "mutation" => Some(Self::Mutation),
            "subscription" => Some(Self::Subscription),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::Mutation => "mutation",
            Self::Subscription => "subscription",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A GraphQL operation: document, variables and optional operation name.
///
/// Serializes to the GraphQL-over-HTTP request body shape, which is also the
/// payload of a WebSocket `subscribe`/`start` message.
///
/// # Example
///
/// ```
/// use gqlink_core::{Operation, OperationKind};
///
/// let op = Operation::new("subscription OnMessage { messages { id } }");
/// assert_eq!(op.kind().unwrap(), OperationKind::Subscription);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    /// The GraphQL document.
    pub query: String,

    /// Variables for the operation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables: Option<Map<String, Value>>,

    /// Selects the operation to run in a multi-operation document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<String>,
}

impl Operation {
    /// Create an operation with no variables.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            variables: None,
            operation_name: None,
        }
    }

    /// Set the variables.
    pub fn with_variables(mut self, variables: Map<String, Value>) -> Self {
        self.variables = Some(variables);
        self
    }

    /// Set the operation name.
    pub fn with_operation_name(mut self, name: impl Into<String>) -> Self {
        self.operation_name = Some(name.into());
        self
    }

    /// Returns the definition this operation executes.
    pub fn main_definition(&self) -> Result<OperationDefinition> {
        main_definition(&self.query, self.operation_name.as_deref())
    }

    /// Returns the kind of the definition this operation executes.
    pub fn kind(&self) -> Result<OperationKind> {
        self.main_definition().map(|d| d.kind)
    }
}

/// A location in the GraphQL document an error refers to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorLocation {
    pub line: u32,
    pub column: u32,
}

/// A GraphQL error as returned in a response's `errors` array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphqlError {
    /// Error message.
    pub message: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub locations: Vec<ErrorLocation>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<Value>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Map<String, Value>>,
}

impl fmt::Display for GraphqlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// A single GraphQL response.
///
/// GraphQL-level errors are part of the response, not transport failures.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Response {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<GraphqlError>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Value>,
}

impl Response {
    /// Create a response carrying only errors.
    pub fn from_errors(errors: Vec<GraphqlError>) -> Self {
        Self {
            data: None,
            errors,
            extensions: None,
        }
    }

    /// Returns true if the response carries GraphQL errors.
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serializes_http_body_shape() {
        let mut vars = Map::new();
        vars.insert("id".to_string(), json!(1));
        let op = Operation::new("query Q($id: Int) { a(id: $id) }")
            .with_variables(vars)
            .with_operation_name("Q");

        assert_eq!(
            serde_json::to_value(&op).unwrap(),
            json!({
                "query": "query Q($id: Int) { a(id: $id) }",
                "variables": {"id": 1},
                "operationName": "Q"
            })
        );
    }

    #[test]
    fn omits_absent_fields() {
        let op = Operation::new("{ a }");
        assert_eq!(serde_json::to_value(&op).unwrap(), json!({"query": "{ a }"}));
    }

    #[test]
    fn kind_follows_operation_name() {
        let op = Operation::new("query A { a } subscription B { b }").with_operation_name("B");
        assert_eq!(op.kind().unwrap(), OperationKind::Subscription);
    }

    #[test]
    fn response_with_errors_deserializes() {
        let response: Response = serde_json::from_value(json!({
            "data": null,
            "errors": [{"message": "field 'x' not found", "locations": [{"line": 1, "column": 3}]}]
        }))
        .unwrap();

        assert!(response.has_errors());
        assert_eq!(response.errors[0].locations[0].column, 3);
    }
}
