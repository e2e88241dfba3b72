//! The mock resolver binder.
//!
//! Walks a parsed schema document and builds an executable schema in which
//! every field resolves through the same fallback chain:
//!
//! 1. a named resolver bound to the exact (type, field) coordinate,
//! 2. the factory registered for the field's named return type, invoked
//!    with the field's seed and arguments,
//! 3. the seed itself, passed through when the parent already produced a
//!    value for the field,
//! 4. a structural default derived from the declared type: fake scalars by
//!    kind, a random variant for enums, a short list of fabricated
//!    elements, an empty mapping for objects so nested fields fabricate
//!    independently.
//!
//! Factories see arguments with the schema's declared defaults already
//! applied, and reach the request's entity loaders through the context the
//! binder hands them.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_graphql::Name;
use async_graphql::Request;
use async_graphql::Response;
use async_graphql::Value;
use async_graphql::dynamic::Enum;
use async_graphql::dynamic::EnumItem;
use async_graphql::dynamic::Field;
use async_graphql::dynamic::FieldFuture;
use async_graphql::dynamic::FieldValue;
use async_graphql::dynamic::InputObject;
use async_graphql::dynamic::InputValue;
use async_graphql::dynamic::Interface;
use async_graphql::dynamic::InterfaceField;
use async_graphql::dynamic::Object;
use async_graphql::dynamic::ResolverContext;
use async_graphql::dynamic::Scalar;
use async_graphql::dynamic::Schema;
use async_graphql::dynamic::TypeRef;
use async_graphql::dynamic::Union;
use async_graphql::parser::parse_schema;
use async_graphql::parser::types::BaseType;
use async_graphql::parser::types::FieldDefinition;
use async_graphql::parser::types::InputValueDefinition;
use async_graphql::parser::types::ServiceDocument;
use async_graphql::parser::types::Type;
use async_graphql::parser::types::TypeKind;
use async_graphql::parser::types::TypeSystemDefinition;

use crate::builtin::DEFAULT_FETCH_LATENCY;
use crate::builtin::default_batchers;
use crate::builtin::default_factories;
use crate::error::SchemaBuildError;
use crate::factory::FabricateContext;
use crate::factory::FactoryMap;
use crate::factory::Seed;
use crate::factory::number;
use crate::loader::BatchMap;
use crate::loader::DEFAULT_WINDOW;
use crate::loader::LoaderSet;
use crate::overrides::DEFAULT_RESOLVER_LATENCY;
use crate::overrides::FieldCoordinate;
use crate::overrides::NamedResolver;
use crate::overrides::NamedResolvers;
use crate::overrides::default_overrides;
use crate::provider::FakeProvider;
use crate::provider::Faker;

/// The canned storefront schema served when no schema document is supplied.
///
/// It can be found in the repository at `fakeql/testing_schema.graphql`.
pub const DEFAULT_SCHEMA: &str = include_str!("../testing_schema.graphql");

/// A field's declared type with nullability erased.
///
/// Structural defaults and output shaping only care about list depth and
/// the innermost name; the exact wrapping stays on the registered field.
#[derive(Debug, Clone, PartialEq, Eq)]
enum TypeShape {
    Named(String),
    List(Box<TypeShape>),
}

impl TypeShape {
    fn of(ty: &Type) -> Self {
        match &ty.base {
            BaseType::Named(name) => TypeShape::Named(name.to_string()),
            BaseType::List(inner) => TypeShape::List(Box::new(TypeShape::of(inner))),
        }
    }

    /// The innermost named type, the factory lookup key.
    fn named(&self) -> &str {
        match self {
            TypeShape::Named(name) => name,
            TypeShape::List(inner) => inner.named(),
        }
    }
}

fn type_ref_of(ty: &Type) -> TypeRef {
    let base = match &ty.base {
        BaseType::Named(name) => TypeRef::Named(name.to_string().into()),
        BaseType::List(inner) => TypeRef::List(Box::new(type_ref_of(inner))),
    };
    if ty.nullable {
        base
    } else {
        TypeRef::NonNull(Box::new(base))
    }
}

/// What a name in the schema document denotes.
#[derive(Debug, Clone, PartialEq, Eq)]
enum NamedKind {
    Id,
    String,
    Int,
    Float,
    Boolean,
    /// A custom scalar.
    Scalar,
    /// An enum and its declared variants.
    Enum(Vec<String>),
    Object,
    /// An interface and its first declared implementor, which answers for
    /// values that do not carry a `__typename` entry.
    Interface { implementor: Option<String> },
    /// A union and its first declared member, likewise.
    Union { member: Option<String> },
    InputObject,
}

/// Name classification for every type the document declares, built once at
/// schema assembly and shared read-only with every resolver.
struct SchemaIndex {
    kinds: HashMap<String, NamedKind>,
}

impl SchemaIndex {
    fn build(document: &ServiceDocument) -> Self {
        let mut kinds = HashMap::new();
        kinds.insert("ID".to_string(), NamedKind::Id);
        kinds.insert("String".to_string(), NamedKind::String);
        kinds.insert("Int".to_string(), NamedKind::Int);
        kinds.insert("Float".to_string(), NamedKind::Float);
        kinds.insert("Boolean".to_string(), NamedKind::Boolean);
        for definition in &document.definitions {
            let TypeSystemDefinition::Type(type_definition) = definition else {
                continue;
            };
            let type_definition = &type_definition.node;
            let kind = match &type_definition.kind {
                TypeKind::Scalar => NamedKind::Scalar,
                TypeKind::Object(_) => NamedKind::Object,
                TypeKind::Interface(_) => NamedKind::Interface { implementor: None },
                TypeKind::Union(union_type) => NamedKind::Union {
                    member: union_type
                        .members
                        .first()
                        .map(|member| member.node.to_string()),
                },
                TypeKind::Enum(enum_type) => NamedKind::Enum(
                    enum_type
                        .values
                        .iter()
                        .map(|value| value.node.value.node.to_string())
                        .collect(),
                ),
                TypeKind::InputObject(_) => NamedKind::InputObject,
            };
            kinds.insert(type_definition.name.node.to_string(), kind);
        }
        for definition in &document.definitions {
            let TypeSystemDefinition::Type(type_definition) = definition else {
                continue;
            };
            let type_definition = &type_definition.node;
            let TypeKind::Object(object_type) = &type_definition.kind else {
                continue;
            };
            for interface in &object_type.implements {
                if let Some(NamedKind::Interface { implementor }) =
                    kinds.get_mut(interface.node.as_str())
                {
                    if implementor.is_none() {
                        *implementor = Some(type_definition.name.node.to_string());
                    }
                }
            }
        }
        Self { kinds }
    }

    fn kind(&self, name: &str) -> Option<&NamedKind> {
        self.kinds.get(name)
    }

    fn is_object(&self, name: &str) -> bool {
        matches!(self.kinds.get(name), Some(NamedKind::Object))
    }
}

/// A typed default for a field no factory or seed answered.
fn structural_default(shape: &TypeShape, index: &SchemaIndex, provider: &dyn FakeProvider) -> Value {
    match shape {
        TypeShape::List(inner) => Value::List(
            (0..provider.list_len())
                .map(|_| structural_default(inner, index, provider))
                .collect(),
        ),
        TypeShape::Named(name) => match index.kind(name) {
            Some(NamedKind::String) => Value::from(provider.sentence()),
            Some(NamedKind::Int) => Value::from(provider.integer()),
            Some(NamedKind::Float) => number(provider.amount()),
            Some(NamedKind::Boolean) => Value::from(provider.boolean()),
            Some(NamedKind::Enum(values)) => match values.get(provider.pick(values.len())) {
                Some(value) => Value::Enum(Name::new(value)),
                None => Value::Null,
            },
            Some(
                NamedKind::Object
                | NamedKind::Interface { .. }
                | NamedKind::Union { .. }
                | NamedKind::InputObject,
            ) => Value::Object(Default::default()),
            Some(NamedKind::Id | NamedKind::Scalar) | None => Value::from(provider.token()),
        },
    }
}

/// The engine resolves abstract values through an explicit concrete type
/// tag: honor a `__typename` entry when the value carries one, otherwise
/// fall back to the first declared implementor or member.
fn concrete_type(value: &Value, kind: Option<&NamedKind>) -> Option<String> {
    let declared = match kind {
        Some(NamedKind::Interface { implementor }) => implementor,
        Some(NamedKind::Union { member }) => member,
        _ => return None,
    };
    if let Value::Object(entries) = value {
        if let Some(Value::String(type_name)) = entries.get("__typename") {
            return Some(type_name.clone());
        }
    }
    declared.clone()
}

/// Wrap a resolved value to fit the field's declared shape.
///
/// A non-list value on a list field coerces to a one-element list, and list
/// elements are shaped recursively so each becomes its own parent value.
fn shape_output(value: Value, shape: &TypeShape, index: &SchemaIndex) -> FieldValue<'static> {
    match shape {
        TypeShape::List(inner) => match value {
            Value::List(items) => FieldValue::list(
                items
                    .into_iter()
                    .map(|item| shape_output(item, inner, index)),
            ),
            other => FieldValue::list(vec![shape_output(other, inner, index)]),
        },
        TypeShape::Named(name) => match concrete_type(&value, index.kind(name)) {
            Some(type_name) => FieldValue::value(value).with_type(type_name),
            None => FieldValue::value(value),
        },
    }
}

/// Everything resolvers share for the schema's lifetime.
struct MockRuntime {
    factories: FactoryMap,
    overrides: NamedResolvers,
    batchers: BatchMap,
    provider: Arc<dyn FakeProvider>,
    index: SchemaIndex,
}

/// Per-field data captured by a resolver closure at assembly time.
struct MockField {
    coordinate: FieldCoordinate,
    shape: TypeShape,
}

/// The parent's entry for the field, when the parent is a mapping.
fn parent_entry(parent: &FieldValue<'_>, field_name: &str) -> Option<Value> {
    let Some(Value::Object(entries)) = parent.as_value() else {
        return None;
    };
    entries.get(field_name).cloned()
}

async fn resolve_mock(
    runtime: Arc<MockRuntime>,
    mock: Arc<MockField>,
    resolver: Option<Arc<dyn NamedResolver>>,
    ctx: ResolverContext<'_>,
) -> async_graphql::Result<Option<FieldValue<'static>>> {
    let seed = Seed::classify(parent_entry(ctx.parent_value, &mock.coordinate.field_name));
    let loaders = ctx.data::<Arc<LoaderSet>>()?.clone();
    let cx = FabricateContext {
        seed,
        args: ctx.args.as_index_map().clone(),
        provider: runtime.provider.clone(),
        loaders,
    };
    let value = if let Some(resolver) = resolver {
        resolver
            .resolve(&mock.coordinate, cx)
            .await
            .map_err(|error| error.to_graphql())?
    } else if let Some(factory) = runtime.factories.lookup(mock.shape.named()) {
        factory
            .fabricate(cx)
            .await
            .map_err(|error| error.to_graphql())?
    } else if !cx.seed.is_unset() {
        cx.seed.into_value()
    } else {
        structural_default(&mock.shape, &runtime.index, runtime.provider.as_ref())
    };
    if value == Value::Null {
        return Ok(None);
    }
    Ok(Some(shape_output(value, &mock.shape, &runtime.index)))
}

fn mock_field(runtime: &Arc<MockRuntime>, type_name: &str, definition: &FieldDefinition) -> Field {
    let mock = Arc::new(MockField {
        coordinate: FieldCoordinate::new(type_name, definition.name.node.as_str()),
        shape: TypeShape::of(&definition.ty.node),
    });
    // Coordinates are fixed at assembly, so the override lookup happens once
    // here instead of on every resolution.
    let resolver = runtime.overrides.get(&mock.coordinate);
    let runtime = Arc::clone(runtime);
    let mut field = Field::new(
        definition.name.node.to_string(),
        type_ref_of(&definition.ty.node),
        move |ctx| {
            let runtime = Arc::clone(&runtime);
            let mock = Arc::clone(&mock);
            let resolver = resolver.clone();
            FieldFuture::new(async move { resolve_mock(runtime, mock, resolver, ctx).await })
        },
    );
    for argument in &definition.arguments {
        field = field.argument(input_value_of(&argument.node));
    }
    field
}

fn input_value_of(definition: &InputValueDefinition) -> InputValue {
    let mut input = InputValue::new(
        definition.name.node.to_string(),
        type_ref_of(&definition.ty.node),
    );
    if let Some(default) = &definition.default_value {
        input = input.default_value(default.node.clone());
    }
    input
}

fn assemble(
    document: &ServiceDocument,
    runtime: &Arc<MockRuntime>,
) -> Result<Schema, SchemaBuildError> {
    let mut query_root = "Query".to_string();
    let mut mutation_root = None;
    let mut has_schema_definition = false;
    for definition in &document.definitions {
        let TypeSystemDefinition::Schema(schema_definition) = definition else {
            continue;
        };
        has_schema_definition = true;
        let schema_definition = &schema_definition.node;
        if schema_definition.subscription.is_some() {
            return Err(SchemaBuildError::SubscriptionsUnsupported);
        }
        if let Some(name) = &schema_definition.query {
            query_root = name.node.to_string();
        }
        if let Some(name) = &schema_definition.mutation {
            mutation_root = Some(name.node.to_string());
        }
    }
    if !has_schema_definition {
        // Roots by convention when the document has no schema definition.
        if runtime.index.is_object("Subscription") {
            return Err(SchemaBuildError::SubscriptionsUnsupported);
        }
        if runtime.index.is_object("Mutation") {
            mutation_root = Some("Mutation".to_string());
        }
    }
    if !runtime.index.is_object(&query_root) {
        return Err(SchemaBuildError::MissingQueryRoot(query_root));
    }

    let mut builder = Schema::build(query_root.as_str(), mutation_root.as_deref(), None);
    for definition in &document.definitions {
        let TypeSystemDefinition::Type(type_definition) = definition else {
            continue;
        };
        let type_definition = &type_definition.node;
        let name = type_definition.name.node.as_str();
        match &type_definition.kind {
            TypeKind::Scalar => {
                builder = builder.register(Scalar::new(name.to_string()));
            }
            TypeKind::Object(object_type) => {
                let mut object = Object::new(name.to_string());
                for interface in &object_type.implements {
                    object = object.implement(interface.node.to_string());
                }
                for field in &object_type.fields {
                    object = object.field(mock_field(runtime, name, &field.node));
                }
                builder = builder.register(object);
            }
            TypeKind::Interface(interface_type) => {
                let mut interface = Interface::new(name.to_string());
                for field in &interface_type.fields {
                    let definition = &field.node;
                    let mut interface_field = InterfaceField::new(
                        definition.name.node.to_string(),
                        type_ref_of(&definition.ty.node),
                    );
                    for argument in &definition.arguments {
                        interface_field = interface_field.argument(input_value_of(&argument.node));
                    }
                    interface = interface.field(interface_field);
                }
                builder = builder.register(interface);
            }
            TypeKind::Union(union_type) => {
                let mut members = Union::new(name.to_string());
                for member in &union_type.members {
                    members = members.possible_type(member.node.to_string());
                }
                builder = builder.register(members);
            }
            TypeKind::Enum(enum_type) => {
                let mut variants = Enum::new(name.to_string());
                for value in &enum_type.values {
                    variants = variants.item(EnumItem::new(value.node.value.node.to_string()));
                }
                builder = builder.register(variants);
            }
            TypeKind::InputObject(input_object_type) => {
                let mut input_object = InputObject::new(name.to_string());
                for field in &input_object_type.fields {
                    input_object = input_object.field(input_value_of(&field.node));
                }
                builder = builder.register(input_object);
            }
        }
    }
    Ok(builder.finish()?)
}

/// Builds a [`MockSchema`].
///
/// Every knob is optional: an unset schema falls back to the canned
/// storefront document, unset registries fall back to the built-in
/// factories, the `Product.name` latency override and the batched product
/// fetcher. The latency and window knobs shape those defaults and are
/// ignored when the corresponding registry is supplied explicitly.
pub struct MockSchemaBuilder {
    schema: Option<String>,
    factories: Option<FactoryMap>,
    overrides: Option<NamedResolvers>,
    batchers: Option<BatchMap>,
    provider: Option<Arc<dyn FakeProvider>>,
    resolver_latency: Option<Duration>,
    fetch_latency: Option<Duration>,
    batch_window: Option<Duration>,
}

// Not using buildstructor because every default needs wiring through the
// latency and window knobs.
impl MockSchemaBuilder {
    fn new() -> Self {
        Self {
            schema: None,
            factories: None,
            overrides: None,
            batchers: None,
            provider: None,
            resolver_latency: None,
            fetch_latency: None,
            batch_window: None,
        }
    }

    /// Specifies the schema document to mock.
    ///
    /// Panics if called more than once.
    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        assert!(self.schema.is_none(), "schema was specified twice");
        self.schema = Some(schema.into());
        self
    }

    /// Specifies the factory registry.
    pub fn factories(mut self, factories: FactoryMap) -> Self {
        assert!(self.factories.is_none(), "factories were specified twice");
        self.factories = Some(factories);
        self
    }

    /// Specifies the named resolver set.
    pub fn overrides(mut self, overrides: NamedResolvers) -> Self {
        assert!(self.overrides.is_none(), "overrides were specified twice");
        self.overrides = Some(overrides);
        self
    }

    /// Specifies the batch fetcher registry.
    pub fn batchers(mut self, batchers: BatchMap) -> Self {
        assert!(self.batchers.is_none(), "batchers were specified twice");
        self.batchers = Some(batchers);
        self
    }

    /// Specifies the fake value provider shared by every fabricator.
    pub fn provider(mut self, provider: impl FakeProvider + 'static) -> Self {
        assert!(self.provider.is_none(), "provider was specified twice");
        self.provider = Some(Arc::new(provider));
        self
    }

    /// Delay of the default `Product.name` resolver.
    pub fn resolver_latency(mut self, delay: Duration) -> Self {
        assert!(
            self.resolver_latency.is_none(),
            "resolver latency was specified twice"
        );
        self.resolver_latency = Some(delay);
        self
    }

    /// Simulated backend latency of the default product fetcher.
    pub fn fetch_latency(mut self, delay: Duration) -> Self {
        assert!(
            self.fetch_latency.is_none(),
            "fetch latency was specified twice"
        );
        self.fetch_latency = Some(delay);
        self
    }

    /// How long the default batchers collect keys before flushing.
    pub fn batch_window(mut self, window: Duration) -> Self {
        assert!(
            self.batch_window.is_none(),
            "batch window was specified twice"
        );
        self.batch_window = Some(window);
        self
    }

    /// Parse, index and assemble the executable mock schema.
    pub fn build(self) -> Result<MockSchema, SchemaBuildError> {
        let sdl = self
            .schema
            .unwrap_or_else(|| DEFAULT_SCHEMA.to_string());
        let document = parse_schema(sdl)?;
        let factories = match self.factories {
            Some(factories) => factories,
            None => default_factories()?,
        };
        let overrides = self.overrides.unwrap_or_else(|| {
            default_overrides(self.resolver_latency.unwrap_or(DEFAULT_RESOLVER_LATENCY))
        });
        let batchers = match self.batchers {
            Some(batchers) => batchers,
            None => default_batchers(
                self.batch_window.unwrap_or(DEFAULT_WINDOW),
                self.fetch_latency.unwrap_or(DEFAULT_FETCH_LATENCY),
            )?,
        };
        let provider = self
            .provider
            .unwrap_or_else(|| Arc::new(Faker::new()));
        let runtime = Arc::new(MockRuntime {
            factories,
            overrides,
            batchers,
            provider,
            index: SchemaIndex::build(&document),
        });
        let schema = assemble(&document, &runtime)?;
        Ok(MockSchema { schema, runtime })
    }
}

/// An executable schema that fabricates every response.
///
/// ```rust
/// use fakeql::MockSchema;
///
/// # async fn demo() -> Result<(), fakeql::SchemaBuildError> {
/// let schema = MockSchema::builder().build()?;
/// let response = schema.execute("{ shop { name } }").await;
/// assert!(response.errors.is_empty());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct MockSchema {
    schema: Schema,
    runtime: Arc<MockRuntime>,
}

impl fmt::Debug for MockSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockSchema").finish_non_exhaustive()
    }
}

impl MockSchema {
    /// Creates a new builder.
    pub fn builder() -> MockSchemaBuilder {
        MockSchemaBuilder::new()
    }

    /// Execute one request against a fresh set of entity loaders, so batch
    /// caches never leak across requests.
    pub async fn execute(&self, request: impl Into<Request>) -> Response {
        let loaders = Arc::new(self.runtime.batchers.for_request());
        self.schema.execute(request.into().data(loaders)).await
    }

    /// The assembled schema's SDL rendering.
    pub fn sdl(&self) -> String {
        self.schema.sdl()
    }
}
