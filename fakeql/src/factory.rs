//! The factory registry: one fabrication function per GraphQL type name.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_graphql::Name;
use async_graphql::Value;
use futures::future::BoxFuture;
use indexmap::IndexMap;

use crate::error::MockError;
use crate::loader::LoaderSet;
use crate::provider::FakeProvider;

/// The preceding value a field carries into fabrication.
///
/// The binder classifies the parent's entry for the field once; fabricators
/// match on the tag instead of re-inspecting the value's kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Seed {
    /// The parent produced no value for this field.
    Unset,
    /// A raw scalar-ish seed that still needs structuring.
    Raw(Value),
    /// Already shaped like the target type; fabrication passes it through.
    Structured(Value),
}

impl Seed {
    /// Classify a parent-provided value.
    pub fn classify(value: Option<Value>) -> Self {
        match value {
            None | Some(Value::Null) => Seed::Unset,
            Some(object @ Value::Object(_)) => Seed::Structured(object),
            Some(raw) => Seed::Raw(raw),
        }
    }

    pub fn is_unset(&self) -> bool {
        matches!(self, Seed::Unset)
    }

    /// The already-shaped value, if there is one.
    pub fn structured(&self) -> Option<&Value> {
        match self {
            Seed::Structured(value) => Some(value),
            _ => None,
        }
    }

    /// The raw numeric seed, if there is one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Seed::Raw(Value::Number(number)) => number.as_f64(),
            _ => None,
        }
    }

    /// The seed's value regardless of tag, `Null` when unset.
    pub fn into_value(self) -> Value {
        match self {
            Seed::Unset => Value::Null,
            Seed::Raw(value) | Seed::Structured(value) => value,
        }
    }
}

/// Object value from name/value pairs.
pub(crate) fn object(entries: Vec<(&str, Value)>) -> Value {
    Value::Object(
        entries
            .into_iter()
            .map(|(name, value)| (Name::new(name), value))
            .collect(),
    )
}

/// Number value from a float, `Null` for the non-finite.
pub(crate) fn number(value: f64) -> Value {
    serde_json::Number::from_f64(value)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

/// Everything a fabricator gets to work with.
///
/// Arguments arrive keyed by their declared names with the field's declared
/// defaults already applied, so fabricators never inspect signatures or
/// re-derive defaults.
pub struct FabricateContext {
    /// The field's preceding value.
    pub seed: Seed,
    /// The field's arguments, defaults applied.
    pub args: IndexMap<Name, Value>,
    /// Primitive fake scalars.
    pub provider: Arc<dyn FakeProvider>,
    /// The request's entity loaders.
    pub loaders: Arc<LoaderSet>,
}

impl FabricateContext {
    /// Integer argument by declared name.
    pub fn arg_i64(&self, name: &str) -> Option<i64> {
        match self.args.get(name) {
            Some(Value::Number(number)) => number.as_i64(),
            _ => None,
        }
    }

    /// String argument by declared name.
    pub fn arg_str(&self, name: &str) -> Option<&str> {
        match self.args.get(name) {
            Some(Value::String(value)) => Some(value),
            _ => None,
        }
    }
}

/// A fabrication function registered for one type name.
///
/// Plain `async fn(FabricateContext) -> Result<Value, MockError>` implements
/// this, so factories read as ordinary functions.
pub trait Fabricator: Send + Sync {
    fn fabricate(&self, cx: FabricateContext) -> BoxFuture<'static, Result<Value, MockError>>;
}

impl<F, Fut> Fabricator for F
where
    F: Fn(FabricateContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, MockError>> + Send + 'static,
{
    fn fabricate(&self, cx: FabricateContext) -> BoxFuture<'static, Result<Value, MockError>> {
        Box::pin((self)(cx))
    }
}

/// Registry mapping a GraphQL type name to its fabricator.
///
/// Built once at startup, then shared immutably with the schema. Duplicate
/// registrations are rejected so a typo'd type name fails fast instead of
/// silently shadowing an earlier factory.
#[derive(Default)]
pub struct FactoryMap {
    factories: HashMap<String, Arc<dyn Fabricator>>,
}

impl FactoryMap {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `fabricator` for `type_name`.
    pub fn register(
        &mut self,
        type_name: impl Into<String>,
        fabricator: impl Fabricator + 'static,
    ) -> Result<(), MockError> {
        let type_name = type_name.into();
        if self.factories.contains_key(&type_name) {
            return Err(MockError::DuplicateTypeRegistration { type_name });
        }
        self.factories.insert(type_name, Arc::new(fabricator));
        Ok(())
    }

    /// The fabricator registered for `type_name`, if any.
    pub fn lookup(&self, type_name: &str) -> Option<Arc<dyn Fabricator>> {
        self.factories.get(type_name).cloned()
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    async fn echo(cx: FabricateContext) -> Result<Value, MockError> {
        Ok(cx.seed.into_value())
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut map = FactoryMap::new();
        map.register("Money", echo).unwrap();
        let err = map.register("Money", echo).unwrap_err();
        assert_eq!(
            err,
            MockError::DuplicateTypeRegistration {
                type_name: "Money".to_string(),
            }
        );
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn lookup_misses_return_none() {
        let map = FactoryMap::new();
        assert!(map.lookup("Product").is_none());
    }

    #[tokio::test]
    async fn registered_functions_are_invocable() {
        let mut map = FactoryMap::new();
        map.register("Echo", echo).unwrap();
        let fabricator = map.lookup("Echo").unwrap();
        let value = fabricator
            .fabricate(testing::context(Seed::Raw(Value::from(7))))
            .await
            .unwrap();
        assert_eq!(value, Value::from(7));
    }

    #[test]
    fn seeds_classify_by_shape() {
        assert_eq!(Seed::classify(None), Seed::Unset);
        assert_eq!(Seed::classify(Some(Value::Null)), Seed::Unset);
        assert_eq!(
            Seed::classify(Some(Value::from(3))),
            Seed::Raw(Value::from(3))
        );
        let object = Value::from_json(serde_json::json!({"a": 1})).unwrap();
        assert_eq!(
            Seed::classify(Some(object.clone())),
            Seed::Structured(object)
        );
    }
}
