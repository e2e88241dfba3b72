//! Mock server errors.

use async_graphql::ErrorExtensions;
use displaydoc::Display;
use thiserror::Error;

/// Errors raised while fabricating mock data.
///
/// These are not fatal to a request: they surface as field-level GraphQL
/// errors next to whatever partial data resolved, with the variant's code in
/// the error's `extensions.code`.
#[derive(Error, Display, Debug, Clone, PartialEq, Eq)]
pub enum MockError {
    /// fabricator for type '{type_name}' failed: {reason}
    FabricationError {
        /// The registered type name.
        type_name: String,
        /// The failure reason.
        reason: String,
    },

    /// batch fetch for entity '{entity}' failed: {reason}
    BatchFetchFailed {
        /// The entity the loader was fetching.
        entity: String,
        /// The failure reason.
        reason: String,
    },

    /// batch fetch for entity '{entity}' returned {returned} results for {requested} keys
    BatchResultShapeMismatch {
        /// The entity the loader was fetching.
        entity: String,
        /// How many distinct keys were submitted.
        requested: usize,
        /// How many results came back.
        returned: usize,
    },

    /// duplicate registration for type '{type_name}'
    DuplicateTypeRegistration {
        /// The type name registered twice.
        type_name: String,
    },
}

impl MockError {
    /// Machine-readable code surfaced in the GraphQL error's `extensions.code`.
    pub fn extension_code(&self) -> &'static str {
        match self {
            MockError::FabricationError { .. } => "FABRICATION_ERROR",
            MockError::BatchFetchFailed { .. } => "BATCH_FETCH_FAILED",
            MockError::BatchResultShapeMismatch { .. } => "BATCH_RESULT_SHAPE_MISMATCH",
            MockError::DuplicateTypeRegistration { .. } => "DUPLICATE_TYPE_REGISTRATION",
        }
    }

    /// Convert into an engine error with the extension code attached.
    ///
    /// The engine's blanket `From<impl Display>` conversion would lose the
    /// code, so resolvers go through this instead of `?`.
    pub fn to_graphql(&self) -> async_graphql::Error {
        self.extend_with(|_, extensions| extensions.set("code", self.extension_code()))
    }
}

/// Errors raised while turning a schema document into an executable mock schema.
///
/// These happen once at startup and are fatal: the server refuses to bind
/// rather than serve a schema it cannot mock.
#[derive(Error, Display, Debug)]
pub enum SchemaBuildError {
    /// failed to parse schema document: {0}
    Parse(#[from] async_graphql::parser::Error),

    /// failed to assemble executable schema: {0}
    Assemble(#[from] async_graphql::dynamic::SchemaError),

    /// schema document defines no object type named '{0}' to serve as the query root
    MissingQueryRoot(String),

    /// subscription roots are not supported by the mock engine
    SubscriptionsUnsupported,

    /// registry setup failed: {0}
    Registry(#[from] MockError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_codes_are_stable() {
        let error = MockError::BatchResultShapeMismatch {
            entity: "Product".to_string(),
            requested: 3,
            returned: 2,
        };
        assert_eq!(error.extension_code(), "BATCH_RESULT_SHAPE_MISMATCH");
        assert_eq!(
            error.to_string(),
            "batch fetch for entity 'Product' returned 2 results for 3 keys"
        );
    }

    #[test]
    fn graphql_conversion_carries_the_code() {
        let error = MockError::FabricationError {
            type_name: "Money".to_string(),
            reason: "boom".to_string(),
        };
        let graphql = error.to_graphql();
        assert_eq!(graphql.message, "fabricator for type 'Money' failed: boom");
        let extensions = graphql.extensions.expect("extensions are set");
        let extensions = serde_json::to_value(&extensions).expect("extensions serialize");
        assert_eq!(extensions["code"], "FABRICATION_ERROR");
    }
}
