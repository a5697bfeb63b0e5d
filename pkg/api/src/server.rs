use axum::{
    Router, middleware,
    routing::{get, post, put},
};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::info;
use uuid::Uuid;

use crate::AppState;
use crate::auth::auth_middleware;
use crate::handlers::{metrics, namespaces, probes, quotas, tenants, watch};
use crate::request_id::request_id_middleware;
use pkg_admission::QuotaValidator;
use pkg_constants::meta::CONTROLLER_IDENTITY;
use pkg_controllers::{TenantQuotaController, TenantQuotaReconciler};
use pkg_ledger::Ledger;
use pkg_state::client::StateStore;
use pkg_state::leader::LeaderElection;

/// Server configuration passed from the binary's CLI.
pub struct ServerConfig {
    pub addr: SocketAddr,
    pub data_dir: String,
    pub token: String,
    pub resync_interval: Duration,
}

pub async fn start_server(config: ServerConfig) -> anyhow::Result<()> {
    // Initialize core subsystems
    let store = StateStore::new(&config.data_dir).await?;
    let ledger = Ledger::new(store.clone());
    let validator = QuotaValidator::new(ledger.clone());

    let state = AppState {
        ledger: ledger.clone(),
        validator,
        token: config.token,
    };

    // Reconciliation runs only on the instance holding the leader
    // lease; the API serves on every instance.
    let holder = format!("{}-{}", CONTROLLER_IDENTITY, Uuid::new_v4());
    let (leader_handle, leader_rx) = LeaderElection::new(store.clone(), holder).start();

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let controller = TenantQuotaController::new(
        TenantQuotaReconciler::new(ledger),
        config.resync_interval,
        leader_rx,
        shutdown_rx,
    );
    let controller_handle = controller.start();

    // Protected API routes
    let api_routes = Router::new()
        // Tenant quotas
        .route(
            "/api/v1/tenantquotas",
            post(tenants::create_tenant).get(tenants::list_tenants),
        )
        .route(
            "/api/v1/tenantquotas/{name}",
            get(tenants::get_tenant)
                .put(tenants::update_tenant)
                .delete(tenants::delete_tenant),
        )
        // Namespaces
        .route(
            "/api/v1/namespaces",
            post(namespaces::create_namespace).get(namespaces::list_namespaces),
        )
        .route(
            "/api/v1/namespaces/{name}",
            get(namespaces::get_namespace).put(namespaces::update_namespace),
        )
        // Resource quotas, admission checked
        .route(
            "/api/v1/namespaces/{ns}/resourcequotas",
            post(quotas::create_quota).get(quotas::list_quotas),
        )
        .route(
            "/api/v1/namespaces/{ns}/resourcequotas/{name}",
            get(quotas::get_quota).put(quotas::update_quota),
        )
        .route(
            "/api/v1/namespaces/{ns}/resourcequotas/{name}/used",
            put(quotas::update_quota_used),
        )
        // Watch stream
        .route("/api/v1/watch", get(watch::watch_events))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    // Public probes and metrics + merged
    let app = Router::new()
        .route("/healthz", get(probes::healthz))
        .route("/readyz", get(probes::readyz))
        .route("/metrics", get(metrics::scrape))
        .merge(api_routes)
        .layer(middleware::from_fn(request_id_middleware))
        .with_state(state);

    info!("Starting API server on {}", config.addr);
    let listener = TcpListener::bind(config.addr).await?;
    tokio::select! {
        result = axum::serve(listener, app) => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received, stopping controller");
        }
    }

    // Let in-flight reconcile passes finish before the store goes away.
    let _ = shutdown_tx.send(true);
    let _ = controller_handle.await;
    leader_handle.abort();
    store.close().await?;

    Ok(())
}
