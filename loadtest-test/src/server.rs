//! Exposes an in-process mock of the product services for use in integration tests.
//!
//! ```
//! use loadtest_test::server::TestServer;
//!
//! #[tokio::main]
//! async fn main() {
//!    let server = TestServer::new().await;
//!    let host = server.base_url();
//!    // point the load generator at `host`...
//! }
//! ```

use std::collections::HashMap;
use std::net::{SocketAddr, TcpListener};
use std::sync::{Arc, Mutex, PoisonError};

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};

/// Shared state of the mock services.
#[derive(Clone, Debug, Default)]
struct Catalog {
    products: Arc<Mutex<HashMap<u64, Value>>>,
    /// Status returned for every write instead of storing the product.
    write_failure: Option<StatusCode>,
}

impl Catalog {
    fn products(&self) -> std::sync::MutexGuard<'_, HashMap<u64, Value>> {
        self.products.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// An in-process mock of the product catalog and search services.
///
/// Serves `POST /products/{id}/details`, `GET /products/{id}`, `GET /products/search` and
/// `GET /health` from memory. It listens on a random available port on localhost and stops when
/// dropped.
#[derive(Debug)]
pub struct TestServer {
    handle: tokio::task::JoinHandle<()>,
    socket: SocketAddr,
    catalog: Catalog,
}

impl TestServer {
    /// Starts a server that accepts all valid writes.
    pub async fn new() -> Self {
        Self::start(Catalog::default()).await
    }

    /// Starts a server that answers every write with `status` and never stores anything.
    pub async fn failing_writes(status: u16) -> Self {
        let status = StatusCode::from_u16(status).unwrap();
        Self::start(Catalog {
            write_failure: Some(status),
            ..Default::default()
        })
        .await
    }

    async fn start(catalog: Catalog) -> Self {
        let addr = SocketAddr::from(([127, 0, 0, 1], 0));
        let listener = TcpListener::bind(addr).unwrap();
        listener.set_nonblocking(true).unwrap();
        let socket = listener.local_addr().unwrap();

        let app = Router::new()
            .route("/health", get(health))
            .route("/products/search", get(search))
            .route("/products/{id}", get(get_product))
            .route("/products/{id}/details", post(post_product))
            .with_state(catalog.clone());

        let handle = tokio::spawn(async move {
            let listener = tokio::net::TcpListener::from_std(listener).unwrap();
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            handle,
            socket,
            catalog,
        }
    }

    /// Returns the base URL of the server, e.g. `http://127.0.0.1:1234`.
    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.socket.port())
    }

    /// Returns the stored product with the given identifier.
    pub fn product(&self, id: u64) -> Option<Value> {
        self.catalog.products().get(&id).cloned()
    }

    /// Returns the number of stored products.
    pub fn product_count(&self) -> usize {
        self.catalog.products().len()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn health() -> &'static str {
    "OK"
}

async fn get_product(State(catalog): State<Catalog>, Path(id): Path<u64>) -> Response {
    match catalog.products().get(&id) {
        Some(product) => Json(product.clone()).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn post_product(
    State(catalog): State<Catalog>,
    Path(id): Path<u64>,
    Json(product): Json<Value>,
) -> StatusCode {
    if let Some(status) = catalog.write_failure {
        return status;
    }
    if product.get("product_id").and_then(Value::as_u64) != Some(id) {
        return StatusCode::BAD_REQUEST;
    }

    catalog.products().insert(id, product);
    StatusCode::NO_CONTENT
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    q: String,
}

async fn search(State(catalog): State<Catalog>, Query(params): Query<SearchParams>) -> Json<Value> {
    let query = params.q.to_lowercase();
    let products: Vec<Value> = catalog
        .products()
        .values()
        .filter(|product| {
            product
                .get("manufacturer")
                .and_then(Value::as_str)
                .is_some_and(|name| name.to_lowercase().contains(&query))
        })
        .cloned()
        .collect();

    Json(json!({
        "total_found": products.len(),
        "products": products,
    }))
}
