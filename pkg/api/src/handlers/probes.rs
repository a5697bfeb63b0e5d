use axum::{extract::State, http::StatusCode, response::IntoResponse};
use tracing::warn;

use crate::AppState;

/// GET /healthz: process liveness.
pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// GET /readyz: ready once the state store answers reads.
pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    match state.ledger.list_tenants().await {
        Ok(_) => (StatusCode::OK, "ok").into_response(),
        Err(e) => {
            warn!("Readiness probe failed: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, "state store unavailable").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pkg_admission::QuotaValidator;
    use pkg_ledger::Ledger;
    use pkg_state::client::StateStore;

    #[tokio::test]
    async fn probes_answer_on_a_live_store() {
        let ledger = Ledger::new(StateStore::new_in_memory().await.unwrap());
        let state = AppState {
            validator: QuotaValidator::new(ledger.clone()),
            ledger,
            token: "test-token".to_string(),
        };

        let res = healthz().await.into_response();
        assert_eq!(res.status(), StatusCode::OK);

        let res = readyz(State(state)).await.into_response();
        assert_eq!(res.status(), StatusCode::OK);
    }
}
