//! The HTTP surface: a GraphQL endpoint with GraphiQL on GET, plus a
//! health check.

use std::net::SocketAddr;

use anyhow::Result;
use async_graphql::http::GraphiQLSource;
use async_graphql_axum::GraphQLRequest;
use async_graphql_axum::GraphQLResponse;
use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::response::Html;
use axum::response::IntoResponse;
use axum::routing::get;
use serde::Serialize;
use tokio::net::TcpListener;

use crate::binder::MockSchema;

#[derive(Debug, Serialize)]
#[serde(rename_all = "UPPERCASE")]
enum HealthStatus {
    Up,
}

#[derive(Debug, Serialize)]
struct Health {
    status: HealthStatus,
}

/// An HTTP server fabricating responses for one [`MockSchema`].
pub struct MockServer {
    schema: MockSchema,
    listen_address: SocketAddr,
}

#[buildstructor::buildstructor]
impl MockServer {
    /// Returns a builder for a mock server.
    ///
    /// Builder methods:
    ///
    /// * `.schema(`[`MockSchema`]`)`
    ///   Required.
    ///   The schema to serve.
    ///
    /// * `.listen_address(SocketAddr)`
    ///   Optional.
    ///   Defaults to `127.0.0.1:4000`.
    ///
    /// * `.build()`
    ///   Finishes the builder.
    #[builder(visibility = "pub", entry = "builder", exit = "build")]
    fn new(schema: MockSchema, listen_address: Option<SocketAddr>) -> MockServer {
        MockServer {
            schema,
            listen_address: listen_address
                .unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 4000))),
        }
    }

    /// The router behind the server: `POST /graphql` executes queries,
    /// `GET /graphql` serves GraphiQL, `GET /health` reports liveness.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/graphql", get(graphiql).post(graphql_handler))
            .route("/health", get(health_check))
            .with_state(self.schema.clone())
    }

    /// Bind the listen address and serve until interrupted.
    pub async fn serve(self) -> Result<()> {
        let listener = TcpListener::bind(self.listen_address).await?;
        let address = listener.local_addr()?;
        tracing::info!("GraphQL endpoint exposed at http://{address}/graphql 🚀");
        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        Ok(())
    }
}

async fn graphql_handler(
    State(schema): State<MockSchema>,
    request: GraphQLRequest,
) -> GraphQLResponse {
    schema.execute(request.into_inner()).await.into()
}

async fn graphiql() -> impl IntoResponse {
    Html(GraphiQLSource::build().endpoint("/graphql").finish())
}

async fn health_check() -> Json<Health> {
    Json(Health {
        status: HealthStatus::Up,
    })
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("shutting down"),
        Err(error) => {
            // Without a working interrupt handler the server can only be
            // stopped by killing the process.
            tracing::error!(%error, "failed to install the interrupt handler");
            std::future::pending::<()>().await;
        }
    }
}
