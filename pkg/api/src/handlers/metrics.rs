use axum::{
    extract::State,
    http::{StatusCode, header},
    response::IntoResponse,
};
use tracing::warn;

use crate::AppState;

/// GET /metrics: Prometheus text exposition, rendered from a fresh
/// tenant list on every scrape. A failed list logs and renders empty
/// rather than failing the scrape.
pub async fn scrape(State(state): State<AppState>) -> impl IntoResponse {
    let tenants = match state.ledger.list_tenants().await {
        Ok(tenants) => tenants,
        Err(e) => {
            warn!("Metrics scrape could not list tenants: {}", e);
            Vec::new()
        }
    };
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        pkg_metrics::render(&tenants),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use pkg_admission::QuotaValidator;
    use pkg_ledger::Ledger;
    use pkg_state::client::StateStore;
    use pkg_types::tenant::{TenantQuota, TenantQuotaSpec};

    #[tokio::test]
    async fn scrape_reflects_stored_tenants() {
        let ledger = Ledger::new(StateStore::new_in_memory().await.unwrap());
        let tenant = TenantQuota::new(
            "team-a",
            TenantQuotaSpec {
                hard: [("limits.cpu".to_string(), "1".parse().unwrap())].into(),
                namespace_selector: None,
            },
        );
        ledger.put_tenant(&tenant).await.unwrap();
        let state = AppState {
            validator: QuotaValidator::new(ledger.clone()),
            ledger,
            token: "test-token".to_string(),
        };

        let res = scrape(State(state)).await.into_response();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(
            res.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/plain; version=0.0.4"
        );
        let body = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains(
            "quotient_tenantquota{tenant=\"team-a\",resource=\"limits.cpu\",kind=\"hard\"} 1"
        ));
    }
}
