// StockLedger Gateway - HTTP entry point
// Exposes product CRUD and the stock ledger API over axum, embedding
// the ledger engine directly.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use stockledger_core::{
    Config, Error, Ledger, LineInput, NewProduct, Product, ProductUpdate, StockTransaction,
    TransactionKind,
};
use tracing::info;
use uuid::Uuid;

mod metrics;

use metrics::METRICS;

#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<Ledger>,
}

// Error handling

pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::EmptyTransaction
            | Error::InvalidQuantity { .. }
            | Error::InvalidProduct(_)
            | Error::DuplicateName(_)
            | Error::InsufficientStock { .. }
            | Error::StockOverflow { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Error::ProductNotFound(_) | Error::TransactionNotFound(_) => StatusCode::NOT_FOUND,
            Error::LockTimeout { .. } | Error::ProductInUse(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let detail = match &self.0 {
            Error::InsufficientStock {
                product_id,
                requested,
                available,
            } => Some(serde_json::json!({
                "product_id": product_id,
                "requested": requested,
                "available": available,
            })),
            Error::InvalidQuantity { line, quantity } => Some(serde_json::json!({
                "line": line,
                "quantity": quantity,
            })),
            _ => None,
        };

        METRICS.track_error(self.0.reason());

        (
            status,
            Json(serde_json::json!({
                "error": {
                    "reason": self.0.reason(),
                    "message": self.0.to_string(),
                    "detail": detail,
                },
                "timestamp": Utc::now(),
            })),
        )
            .into_response()
    }
}

// Request/response payloads

#[derive(Debug, Deserialize)]
pub struct CreateProductRequest {
    pub name: String,
    pub sku: String,
    #[serde(default)]
    pub description: Option<String>,
    pub price: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProductRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub sku: Option<String>,
    /// Absent means unchanged; an explicit `null` clears the field.
    #[serde(default, deserialize_with = "deserialize_clearable")]
    pub description: Option<Option<String>>,
    #[serde(default)]
    pub price: Option<Decimal>,
}

// Only invoked when the key is present, so `null` becomes Some(None)
// while a missing key stays None via the field default.
fn deserialize_clearable<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Deserialize)]
pub struct RecordTransactionRequest {
    pub transaction_type: TransactionKind,
    #[serde(default)]
    pub remarks: Option<String>,
    pub lines: Vec<LineRequest>,
}

#[derive(Debug, Deserialize)]
pub struct LineRequest {
    pub product_id: Uuid,
    pub quantity: i64,
}

#[derive(Debug, Serialize)]
pub struct DashboardRow {
    pub id: Uuid,
    pub name: String,
    pub sku: String,
    pub price: Decimal,
    pub current_stock: i64,
}

#[derive(Debug, Serialize)]
pub struct InventoryRow {
    pub name: String,
    pub sku: String,
    pub current_stock: i64,
}

#[derive(Debug, Serialize)]
pub struct ProductSummary {
    pub id: Uuid,
    pub name: String,
    pub sku: String,
    pub price: Decimal,
}

#[derive(Debug, Serialize)]
pub struct TransactionSummary {
    pub transaction_type: TransactionKind,
    pub date: DateTime<Utc>,
    pub remarks: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    pub total_products: u64,
    pub total_transactions: u64,
}

// Dashboard

async fn dashboard(State(state): State<AppState>) -> Result<Json<Vec<DashboardRow>>, ApiError> {
    METRICS.track_request("/");

    let rows = state
        .ledger
        .dashboard()?
        .into_iter()
        .map(|row| DashboardRow {
            id: row.product.id,
            name: row.product.name,
            sku: row.product.sku,
            price: row.product.price,
            current_stock: row.current_stock,
        })
        .collect();

    Ok(Json(rows))
}

async fn api_dashboard(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    METRICS.track_request("/api/dashboard");

    let inventory: Vec<InventoryRow> = state
        .ledger
        .dashboard()?
        .into_iter()
        .map(|row| InventoryRow {
            name: row.product.name,
            sku: row.product.sku,
            current_stock: row.current_stock,
        })
        .collect();

    Ok(Json(serde_json::json!({ "inventory": inventory })))
}

// Product CRUD

async fn list_products(State(state): State<AppState>) -> Result<Json<Vec<Product>>, ApiError> {
    METRICS.track_request("/products");
    Ok(Json(state.ledger.list_products()?))
}

async fn api_products(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    METRICS.track_request("/api/products");

    let products: Vec<ProductSummary> = state
        .ledger
        .list_products()?
        .into_iter()
        .map(|p| ProductSummary {
            id: p.id,
            name: p.name,
            sku: p.sku,
            price: p.price,
        })
        .collect();

    Ok(Json(serde_json::json!({ "products": products })))
}

async fn create_product(
    State(state): State<AppState>,
    Json(req): Json<CreateProductRequest>,
) -> Result<(StatusCode, Json<Product>), ApiError> {
    METRICS.track_request("/products");

    let product = state.ledger.create_product(NewProduct {
        name: req.name,
        sku: req.sku,
        description: req.description,
        price: req.price,
    })?;

    Ok((StatusCode::CREATED, Json(product)))
}

async fn update_product(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
    Json(req): Json<UpdateProductRequest>,
) -> Result<Json<Product>, ApiError> {
    METRICS.track_request("/products/{id}");

    let product = state.ledger.update_product(
        product_id,
        ProductUpdate {
            name: req.name,
            sku: req.sku,
            description: req.description,
            price: req.price,
        },
    )?;

    Ok(Json(product))
}

async fn delete_product(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    METRICS.track_request("/products/{id}");

    state.ledger.delete_product(product_id).await?;

    Ok(StatusCode::NO_CONTENT)
}

// Stock transactions

async fn list_transactions(
    State(state): State<AppState>,
) -> Result<Json<Vec<StockTransaction>>, ApiError> {
    METRICS.track_request("/transactions");
    Ok(Json(state.ledger.list_transactions()?))
}

async fn api_transactions(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    METRICS.track_request("/api/transactions");

    let transactions: Vec<TransactionSummary> = state
        .ledger
        .list_transactions()?
        .into_iter()
        .map(|t| TransactionSummary {
            transaction_type: t.transaction_type,
            date: t.date,
            remarks: t.remarks,
        })
        .collect();

    Ok(Json(serde_json::json!({ "transactions": transactions })))
}

async fn record_transaction(
    State(state): State<AppState>,
    Json(req): Json<RecordTransactionRequest>,
) -> Result<(StatusCode, Json<StockTransaction>), ApiError> {
    METRICS.track_request("/transactions");
    let start = std::time::Instant::now();

    let lines: Vec<LineInput> = req
        .lines
        .iter()
        .map(|l| LineInput {
            product_id: l.product_id,
            quantity: l.quantity,
        })
        .collect();

    let transaction = state
        .ledger
        .record_transaction(req.transaction_type, req.remarks, &lines)
        .await?;

    METRICS
        .http_request_duration_seconds
        .with_label_values(&["/transactions"])
        .observe(start.elapsed().as_secs_f64());

    Ok((StatusCode::CREATED, Json(transaction)))
}

// Health & metrics

async fn health_check(State(state): State<AppState>) -> Result<Json<HealthResponse>, ApiError> {
    let stats = state.ledger.stats()?;

    Ok(Json(HealthResponse {
        status: "healthy",
        service: "stockledger-gateway",
        version: env!("CARGO_PKG_VERSION"),
        total_products: stats.total_products,
        total_transactions: stats.total_transactions,
    }))
}

async fn metrics_handler(State(state): State<AppState>) -> Result<String, ApiError> {
    let gateway = METRICS
        .export()
        .map_err(|e| Error::Config(format!("Failed to export metrics: {}", e)))?;
    let ledger = state
        .ledger
        .metrics()
        .export()
        .map_err(|e| Error::Config(format!("Failed to export metrics: {}", e)))?;

    Ok(format!("{}{}", gateway, ledger))
}

pub fn build_router(state: AppState) -> Router {
    use tower_http::cors::{Any, CorsLayer};

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(dashboard))
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler))
        .route("/products", get(list_products).post(create_product))
        .route(
            "/products/:id",
            post(update_product).put(update_product).delete(delete_product),
        )
        .route("/transactions", get(list_transactions).post(record_transaction))
        .route("/api/dashboard", get(api_dashboard))
        .route("/api/products", get(api_products))
        .route("/api/transactions", get(api_transactions))
        .layer(cors)
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("Starting StockLedger Gateway");

    let config = Config::from_env()?;
    let bind_addr = config.http_listen_addr.clone();

    let ledger = Arc::new(Ledger::open(config)?);
    info!("Ledger opened");

    let app = build_router(AppState { ledger });

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("Gateway listening on: {}", bind_addr);
    info!("   GET  /              - dashboard (products + current stock)");
    info!("   GET  /products      - list products");
    info!("   POST /products      - register product");
    info!("   POST /products/:id  - update product");
    info!("   DEL  /products/:id  - delete product (refused while referenced)");
    info!("   GET  /transactions  - list transactions (date descending)");
    info!("   POST /transactions  - record stock transaction");
    info!("   GET  /api/dashboard - inventory summary");
    info!("   GET  /health        - health check");
    info!("   GET  /metrics       - Prometheus metrics");

    axum::serve(listener, app).await?;

    Ok(())
}
