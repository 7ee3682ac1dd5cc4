use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{Router, middleware, routing::get};
use catalog_storage::DynProductStore;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

use crate::cache::{DynCacheLayer, create_cache_backend};
use crate::catalog::{CatalogService, CatalogSettings};
use crate::config::{AppConfig, StorageBackend};
use crate::events::{
    EventDispatcher, EventLogConsumer, EventPublisher, EventWorkerHandle, NoopEventPublisher,
    RedisEventPublisher,
};
use crate::{handlers, middleware as app_middleware};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub catalog: CatalogService,
}

pub struct CatalogServer {
    addr: SocketAddr,
    app: Router,
    events: EventWorkerHandle,
}

/// Connect the record store selected by `storage.backend`.
pub async fn create_store(cfg: &AppConfig) -> anyhow::Result<DynProductStore> {
    match cfg.storage.backend {
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory record store; data is lost on restart");
            Ok(catalog_db_memory::create_product_store())
        }
        StorageBackend::Postgres => {
            let store: DynProductStore =
                catalog_db_postgres::create_product_store(cfg.storage.postgres.to_store_config())
                    .await?;
            Ok(store)
        }
    }
}

/// Create the change-event dispatcher and spawn its worker (and the log
/// consumer when configured).
pub fn create_event_dispatcher(
    cfg: &AppConfig,
) -> anyhow::Result<(EventDispatcher, EventWorkerHandle)> {
    let events = &cfg.events;
    let publisher: Arc<dyn EventPublisher> = match (events.enabled, events.broker_url()) {
        (true, Some(url)) => {
            let publisher =
                RedisEventPublisher::connect(&url, cfg.redis.pool_size, events.publish_timeout_ms)?;
            if events.log_consumer {
                tokio::spawn(EventLogConsumer::new(url, events.topic.clone()).run());
            }
            tracing::info!(topic = %events.topic, "Change events enabled");
            Arc::new(publisher)
        }
        _ => {
            tracing::info!("Change events disabled");
            Arc::new(NoopEventPublisher)
        }
    };

    Ok(EventDispatcher::spawn(
        publisher,
        events.topic.clone(),
        events.queue_capacity,
        Duration::from_millis(events.publish_timeout_ms),
    ))
}

/// Wire the store, cache and event dispatcher into the handler state.
///
/// The event worker runs until every clone of the state is dropped; drain
/// the returned handle after that to flush queued events.
pub async fn build_state(cfg: &AppConfig) -> anyhow::Result<(AppState, EventWorkerHandle)> {
    let store = create_store(cfg).await?;
    let cache: DynCacheLayer = Arc::new(create_cache_backend(&cfg.redis).await);
    let (events, worker) = create_event_dispatcher(cfg)?;

    let catalog = CatalogService::new(store, cache, events, CatalogSettings::from_config(cfg));
    Ok((AppState { catalog }, worker))
}

/// Router plus its event worker.
pub async fn build_app(cfg: &AppConfig) -> anyhow::Result<(Router, EventWorkerHandle)> {
    let (state, worker) = build_state(cfg).await?;
    Ok((router(state, cfg), worker))
}

pub fn router(state: AppState, cfg: &AppConfig) -> Router {
    let body_limit = cfg.server.body_limit_bytes;
    Router::new()
        // Health and info endpoints
        .route("/", get(handlers::root))
        .route("/healthz", get(handlers::healthz))
        .route("/readyz", get(handlers::readyz))
        .route("/metrics", get(handlers::metrics))
        // Products
        .route(
            "/api/products",
            get(handlers::list_products).post(handlers::create_product),
        )
        .route(
            "/api/products/{id}",
            get(handlers::get_product)
                .put(handlers::update_product)
                .delete(handlers::delete_product),
        )
        // Runs after routing so the matched route is known
        .route_layer(middleware::from_fn(app_middleware::track_metrics))
        .with_state(state)
        // Middleware stack, innermost first: cors -> compression -> trace -> request id -> body limit
        .layer(CorsLayer::permissive())
        .layer(CompressionLayer::new())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let req_id = req
                        .extensions()
                        .get::<axum::http::HeaderValue>()
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("")
                        .to_string();
                    tracing::info_span!(
                        "http.request",
                        http.method = %req.method(),
                        http.target = %req.uri(),
                        http.status_code = tracing::field::Empty,
                        request_id = %req_id
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &tracing::Span| {
                        span.record(
                            "http.status_code",
                            tracing::field::display(res.status().as_u16()),
                        );
                        tracing::info!(
                            http.status = %res.status().as_u16(),
                            elapsed_ms = %latency.as_millis(),
                            "request handled"
                        );
                    },
                ),
        )
        // Outside the trace layer so the span sees the id
        .layer(middleware::from_fn(app_middleware::request_id))
        .layer(axum::extract::DefaultBodyLimit::max(body_limit))
}

pub struct ServerBuilder {
    addr: SocketAddr,
    config: AppConfig,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        let cfg = AppConfig::default();
        Self {
            addr: cfg.addr(),
            config: cfg,
        }
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.addr = cfg.addr();
        self.config = cfg;
        self
    }

    pub async fn build(self) -> anyhow::Result<CatalogServer> {
        crate::metrics::init_metrics();
        let (app, events) = build_app(&self.config).await?;

        Ok(CatalogServer {
            addr: self.addr,
            app,
            events,
        })
    }
}

impl CatalogServer {
    pub async fn run(self) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);
        self.serve(listener, shutdown_signal()).await
    }

    /// Serve until `signal` resolves, then flush queued change events.
    pub async fn serve(
        self,
        listener: tokio::net::TcpListener,
        signal: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let CatalogServer { app, events, .. } = self;
        let served = axum::serve(listener, app)
            .with_graceful_shutdown(signal)
            .await;

        // The router and every connection are gone, so the queue is closed
        tracing::info!(
            timeout_ms = events.drain_timeout().as_millis() as u64,
            "draining change events"
        );
        events.drain().await;
        served?;
        Ok(())
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
