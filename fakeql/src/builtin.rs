//! The built-in factory set.
//!
//! Fabricates a small storefront backend: monetary composites, images,
//! paginated product connections, batch-loaded products and VAT rates.
//! Every factory passes an already-shaped seed through unchanged, so
//! fabricating a fabricated value is a no-op.

use std::time::Duration;

use async_graphql::Value;
use futures::future::BoxFuture;

use crate::error::MockError;
use crate::factory::FabricateContext;
use crate::factory::FactoryMap;
use crate::factory::number;
use crate::factory::object;
use crate::loader::BatchFn;
use crate::loader::BatchMap;
use crate::loader::BoxError;
use crate::provider::FakeProvider;
use crate::provider::Faker;
use crate::provider::stable_seed;

/// Entity name the default product fetcher registers under.
pub const PRODUCT_ENTITY: &str = "Product";

/// Default simulated backend latency for the product batch fetch.
pub const DEFAULT_FETCH_LATENCY: Duration = Duration::from_secs(1);

/// A registry holding every built-in factory.
pub fn default_factories() -> Result<FactoryMap, MockError> {
    let mut map = FactoryMap::new();
    register_defaults(&mut map)?;
    Ok(map)
}

/// A batch registry holding the default product fetcher.
pub fn default_batchers(window: Duration, fetch_latency: Duration) -> Result<BatchMap, MockError> {
    let mut batchers = BatchMap::new();
    batchers.register(PRODUCT_ENTITY, window, ProductFetcher::new(fetch_latency))?;
    Ok(batchers)
}

/// Register the default factories into `map`.
pub fn register_defaults(map: &mut FactoryMap) -> Result<(), MockError> {
    map.register("Money", money)?;
    map.register("TaxedMoney", taxed_money)?;
    map.register("TaxedMoneyRange", taxed_money_range)?;
    map.register("Image", image)?;
    map.register("PageInfo", page_info)?;
    map.register("ProductCountableConnection", product_connection)?;
    map.register("Product", product)?;
    map.register("VAT", vat)?;
    Ok(())
}

fn money_value(amount: Option<f64>, provider: &dyn FakeProvider) -> Value {
    let amount = amount.unwrap_or_else(|| provider.amount());
    object(vec![
        ("currency", Value::from("USD")),
        ("amount", number(amount)),
    ])
}

/// `{currency: "USD", amount}`, taking a numeric seed as the amount.
async fn money(cx: FabricateContext) -> Result<Value, MockError> {
    if let Some(shaped) = cx.seed.structured() {
        return Ok(shaped.clone());
    }
    Ok(money_value(cx.seed.as_f64(), cx.provider.as_ref()))
}

fn taxed_money_value(amount: Option<f64>, provider: &dyn FakeProvider) -> Value {
    object(vec![
        ("net", money_value(amount, provider)),
        ("gross", money_value(amount, provider)),
        // A raw seed: the child Money fabricator structures it when selected.
        ("tax", Value::from(0)),
    ])
}

async fn taxed_money(cx: FabricateContext) -> Result<Value, MockError> {
    if let Some(shaped) = cx.seed.structured() {
        return Ok(shaped.clone());
    }
    Ok(taxed_money_value(cx.seed.as_f64(), cx.provider.as_ref()))
}

fn gross_amount(taxed: &Value) -> f64 {
    let Value::Object(taxed) = taxed else {
        return 0.0;
    };
    let Some(Value::Object(gross)) = taxed.get("gross") else {
        return 0.0;
    };
    match gross.get("amount") {
        Some(Value::Number(amount)) => amount.as_f64().unwrap_or(0.0),
        _ => 0.0,
    }
}

/// Two fabricated TaxedMoney values, ordered into `{start, stop}` by gross
/// amount at construction.
async fn taxed_money_range(cx: FabricateContext) -> Result<Value, MockError> {
    if let Some(shaped) = cx.seed.structured() {
        return Ok(shaped.clone());
    }
    let amount = cx.seed.as_f64();
    let mut start = taxed_money_value(amount, cx.provider.as_ref());
    let mut stop = taxed_money_value(amount, cx.provider.as_ref());
    if gross_amount(&stop) < gross_amount(&start) {
        std::mem::swap(&mut start, &mut stop);
    }
    Ok(object(vec![("start", start), ("stop", stop)]))
}

async fn image(cx: FabricateContext) -> Result<Value, MockError> {
    if let Some(shaped) = cx.seed.structured() {
        return Ok(shaped.clone());
    }
    let size = cx.arg_i64("size").unwrap_or(200);
    Ok(object(vec![
        (
            "url",
            Value::from(format!("https://placekitten.com/{size}/{size}")),
        ),
        ("alt", Value::from(cx.provider.sentence())),
    ]))
}

async fn page_info(cx: FabricateContext) -> Result<Value, MockError> {
    if let Some(shaped) = cx.seed.structured() {
        return Ok(shaped.clone());
    }
    Ok(object(vec![
        ("hasNextPage", Value::from(false)),
        ("hasPreviousPage", Value::from(false)),
    ]))
}

/// `last` wins over `first` when both are given; the schema supplies the
/// default `first` of 10. Edges are raw integer seeds whose `node` and
/// `cursor` children fabricate independently.
async fn product_connection(cx: FabricateContext) -> Result<Value, MockError> {
    if let Some(shaped) = cx.seed.structured() {
        return Ok(shaped.clone());
    }
    let count = cx
        .arg_i64("last")
        .or_else(|| cx.arg_i64("first"))
        .unwrap_or(10)
        .max(0);
    let edges: Vec<Value> = (0..count).map(Value::from).collect();
    Ok(object(vec![
        ("edges", Value::List(edges)),
        ("totalCount", Value::from(count)),
    ]))
}

/// Resolves through the request's Product loader, so several product fields
/// in one query collapse into a single batch fetch.
async fn product(cx: FabricateContext) -> Result<Value, MockError> {
    if let Some(shaped) = cx.seed.structured() {
        return Ok(shaped.clone());
    }
    let id = match cx.args.get("id") {
        Some(Value::String(id)) => id.clone(),
        Some(Value::Number(id)) => id.to_string(),
        _ => cx.provider.token(),
    };
    let loader = cx
        .loaders
        .entity(PRODUCT_ENTITY)
        .ok_or_else(|| MockError::FabricationError {
            type_name: "Product".to_string(),
            reason: "no batch fetcher is registered for entity 'Product'".to_string(),
        })?;
    loader.load(id).await
}

async fn vat(cx: FabricateContext) -> Result<Value, MockError> {
    if let Some(shaped) = cx.seed.structured() {
        return Ok(shaped.clone());
    }
    let rates: Vec<Value> = (0..10).map(Value::from).collect();
    Ok(object(vec![("reducedRates", Value::List(rates))]))
}

/// The default Product batch fetch: simulates a slow backend, then derives
/// each product from its key, so a given ID always maps to the same product.
pub struct ProductFetcher {
    latency: Duration,
}

impl ProductFetcher {
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }
}

impl BatchFn for ProductFetcher {
    fn fetch(&self, keys: Vec<String>) -> BoxFuture<'static, Result<Vec<Value>, BoxError>> {
        let latency = self.latency;
        Box::pin(async move {
            tracing::debug!(?keys, "product batch fetch starting");
            tokio::time::sleep(latency).await;
            let products = keys
                .into_iter()
                .map(|id| {
                    let faker = Faker::seeded(stable_seed(&id));
                    object(vec![
                        ("id", Value::from(id)),
                        ("name", Value::from(faker.company())),
                    ])
                })
                .collect();
            tracing::debug!("product batch fetch finished");
            Ok(products)
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::factory::Seed;
    use crate::factory::testing::context;
    use crate::factory::testing::context_with_args;
    use crate::factory::testing::entropy_context;
    use crate::loader::DEFAULT_WINDOW;

    fn json_of(value: Value) -> serde_json::Value {
        value.into_json().expect("fabricated values are plain JSON")
    }

    #[tokio::test]
    async fn money_takes_a_numeric_seed_as_the_amount() {
        let value = money(context(Seed::Raw(Value::from(12.34)))).await.unwrap();
        let json = json_of(value);
        assert_eq!(json["currency"], "USD");
        assert_eq!(json["amount"].as_f64(), Some(12.34));
    }

    #[tokio::test]
    async fn money_fabricates_a_quantized_amount_without_a_seed() {
        for _ in 0..25 {
            let json = json_of(money(entropy_context(Seed::Unset)).await.unwrap());
            assert_eq!(json["currency"], "USD");
            let amount = json["amount"].as_f64().unwrap();
            assert_eq!(amount, (amount * 100.0).round() / 100.0);
        }
    }

    #[tokio::test]
    async fn structured_seeds_pass_through_unchanged() {
        let shaped = Value::from_json(serde_json::json!({"currency": "EUR", "amount": 1.0})).unwrap();
        let value = money(context(Seed::Structured(shaped.clone()))).await.unwrap();
        assert_eq!(value, shaped);
    }

    #[tokio::test]
    async fn taxed_money_shares_the_seed_between_net_and_gross() {
        let json = json_of(
            taxed_money(context(Seed::Raw(Value::from(5.5))))
                .await
                .unwrap(),
        );
        assert_eq!(json["net"]["amount"].as_f64(), Some(5.5));
        assert_eq!(json["gross"]["amount"].as_f64(), Some(5.5));
        assert_eq!(json["tax"], 0);
    }

    #[tokio::test]
    async fn ranges_are_ordered_at_construction() {
        for _ in 0..25 {
            let json = json_of(taxed_money_range(entropy_context(Seed::Unset)).await.unwrap());
            let start = json["start"]["gross"]["amount"].as_f64().unwrap();
            let stop = json["stop"]["gross"]["amount"].as_f64().unwrap();
            assert!(start <= stop, "expected {start} <= {stop}");
        }
    }

    #[tokio::test]
    async fn image_reads_its_size_argument() {
        let json = json_of(
            image(context_with_args(Seed::Unset, &[("size", Value::from(64))]))
                .await
                .unwrap(),
        );
        assert_eq!(json["url"], "https://placekitten.com/64/64");
        assert!(json["alt"].as_str().unwrap().ends_with('.'));

        let json = json_of(image(context(Seed::Unset)).await.unwrap());
        assert_eq!(json["url"], "https://placekitten.com/200/200");
    }

    #[tokio::test]
    async fn connection_counts_follow_first_and_last() {
        let json = json_of(
            product_connection(context_with_args(Seed::Unset, &[("first", Value::from(5))]))
                .await
                .unwrap(),
        );
        assert_eq!(json["totalCount"], 5);
        assert_eq!(json["edges"].as_array().unwrap().len(), 5);

        let json = json_of(
            product_connection(context_with_args(
                Seed::Unset,
                &[("first", Value::from(10)), ("last", Value::from(3))],
            ))
            .await
            .unwrap(),
        );
        assert_eq!(json["totalCount"], 3);
        assert_eq!(json["edges"].as_array().unwrap().len(), 3);

        let json = json_of(product_connection(context(Seed::Unset)).await.unwrap());
        assert_eq!(json["totalCount"], 10);
    }

    #[tokio::test]
    async fn product_without_a_fetcher_is_a_fabrication_error() {
        let err = product(context(Seed::Unset)).await.unwrap_err();
        assert!(matches!(err, MockError::FabricationError { type_name, .. } if type_name == "Product"));
    }

    #[tokio::test(start_paused = true)]
    async fn product_echoes_its_id_and_derives_a_stable_name() {
        let mut batchers = BatchMap::new();
        batchers
            .register(
                PRODUCT_ENTITY,
                DEFAULT_WINDOW,
                ProductFetcher::new(Duration::ZERO),
            )
            .unwrap();
        let mut cx = context_with_args(Seed::Unset, &[("id", Value::from("abc"))]);
        cx.loaders = Arc::new(batchers.for_request());

        let json = json_of(product(cx).await.unwrap());
        assert_eq!(json["id"], "abc");
        let expected = Faker::seeded(stable_seed("abc")).company();
        assert_eq!(json["name"], serde_json::Value::from(expected));
    }

    #[tokio::test]
    async fn vat_seeds_ten_reduced_rates() {
        let json = json_of(vat(context(Seed::Unset)).await.unwrap());
        let rates = json["reducedRates"].as_array().unwrap();
        assert_eq!(rates.len(), 10);
        assert!(rates.iter().all(serde_json::Value::is_number));
    }

    #[tokio::test]
    async fn fabrication_is_structurally_idempotent() {
        let first = json_of(money(context(Seed::Unset)).await.unwrap());
        let second = json_of(money(context(Seed::Unset)).await.unwrap());
        let keys = |json: &serde_json::Value| {
            json.as_object()
                .unwrap()
                .keys()
                .cloned()
                .collect::<Vec<_>>()
        };
        assert_eq!(keys(&first), keys(&second));
    }
}
