//! Named field resolvers.
//!
//! Explicit resolvers bound to exact (type, field) coordinates. The binder
//! consults this registry first, so a named resolver always beats fallback
//! fabrication for its field.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_graphql::Value;
use futures::future::BoxFuture;

use crate::error::MockError;
use crate::factory::FabricateContext;

/// Default delay for the built-in latency override on `Product.name`.
pub const DEFAULT_RESOLVER_LATENCY: Duration = Duration::from_secs(1);

/// The default named resolver set: `Product.name` answered after `delay`.
pub fn default_overrides(delay: Duration) -> NamedResolvers {
    let mut resolvers = NamedResolvers::new();
    resolvers.insert("Product", "name", Latency::new(delay));
    resolvers
}

/// A schema coordinate: one field on one type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldCoordinate {
    pub type_name: String,
    pub field_name: String,
}

impl FieldCoordinate {
    pub fn new(type_name: impl Into<String>, field_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            field_name: field_name.into(),
        }
    }
}

impl fmt::Display for FieldCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.type_name, self.field_name)
    }
}

/// An explicit resolver for one schema coordinate.
///
/// Receives the same context a fabricator would, so it can read the seed,
/// the field's arguments, the provider and the request's loaders.
pub trait NamedResolver: Send + Sync {
    fn resolve(
        &self,
        coordinate: &FieldCoordinate,
        cx: FabricateContext,
    ) -> BoxFuture<'static, Result<Value, MockError>>;
}

impl<F, Fut> NamedResolver for F
where
    F: Fn(&FieldCoordinate, FabricateContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, MockError>> + Send + 'static,
{
    fn resolve(
        &self,
        coordinate: &FieldCoordinate,
        cx: FabricateContext,
    ) -> BoxFuture<'static, Result<Value, MockError>> {
        Box::pin((self)(coordinate, cx))
    }
}

/// Registry of named resolvers, keyed by coordinate.
#[derive(Default)]
pub struct NamedResolvers {
    resolvers: HashMap<FieldCoordinate, Arc<dyn NamedResolver>>,
}

impl NamedResolvers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `resolver` to `type_name.field_name`, displacing any previous
    /// binding for that coordinate.
    pub fn insert(
        &mut self,
        type_name: impl Into<String>,
        field_name: impl Into<String>,
        resolver: impl NamedResolver + 'static,
    ) {
        self.resolvers.insert(
            FieldCoordinate::new(type_name, field_name),
            Arc::new(resolver),
        );
    }

    /// The resolver bound to `coordinate`, if any.
    pub fn get(&self, coordinate: &FieldCoordinate) -> Option<Arc<dyn NamedResolver>> {
        self.resolvers.get(coordinate).cloned()
    }

    pub fn len(&self) -> usize {
        self.resolvers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolvers.is_empty()
    }
}

/// Returns the parent's value for the field after a fixed delay.
///
/// Simulates a slow per-field backend so clients can exercise batching and
/// concurrency behavior against realistic timings.
pub struct Latency {
    delay: Duration,
}

impl Latency {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl NamedResolver for Latency {
    fn resolve(
        &self,
        coordinate: &FieldCoordinate,
        cx: FabricateContext,
    ) -> BoxFuture<'static, Result<Value, MockError>> {
        let delay = self.delay;
        let coordinate = coordinate.clone();
        Box::pin(async move {
            tracing::debug!(field = %coordinate, ?delay, "delayed resolver suspending");
            tokio::time::sleep(delay).await;
            Ok(cx.seed.into_value())
        })
    }
}
