use axum::{
    Json,
    extract::{Path as AxumPath, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use tracing::{info, warn};

use pkg_types::namespace::Namespace;
use pkg_types::validate::validate_name;

use crate::AppState;

// Namespaces are external inputs: the controller never creates or
// relabels them itself, it only reacts to what arrives here.

pub async fn create_namespace(
    State(state): State<AppState>,
    Json(mut ns): Json<Namespace>,
) -> impl IntoResponse {
    if let Err(e) = validate_name(&ns.name) {
        return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
    }
    match state.ledger.get_namespace(&ns.name).await {
        Ok(Some(_)) => {
            return (StatusCode::CONFLICT, "namespace already exists").into_response();
        }
        Ok(None) => {}
        Err(e) => {
            warn!("Failed to read namespace {}: {}", ns.name, e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    }

    ns.created_at = Utc::now();
    if let Err(e) = state.ledger.put_namespace(&ns).await {
        warn!("Failed to create namespace {}: {}", ns.name, e);
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    info!("Created namespace {}", ns.name);
    (StatusCode::CREATED, Json(ns)).into_response()
}

pub async fn list_namespaces(State(state): State<AppState>) -> impl IntoResponse {
    match state.ledger.list_namespaces().await {
        Ok(namespaces) => (StatusCode::OK, Json(namespaces)).into_response(),
        Err(e) => {
            warn!("Failed to list namespaces: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub async fn get_namespace(
    State(state): State<AppState>,
    AxumPath(name): AxumPath<String>,
) -> impl IntoResponse {
    match state.ledger.get_namespace(&name).await {
        Ok(Some(ns)) => (StatusCode::OK, Json(ns)).into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => {
            warn!("Failed to read namespace {}: {}", name, e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// PUT supports relabeling; a label change here is what moves a
/// namespace into or out of a tenant's selection.
pub async fn update_namespace(
    State(state): State<AppState>,
    AxumPath(name): AxumPath<String>,
    Json(mut ns): Json<Namespace>,
) -> impl IntoResponse {
    let current = match state.ledger.get_namespace(&name).await {
        Ok(Some(ns)) => ns,
        Ok(None) => return StatusCode::NOT_FOUND.into_response(),
        Err(e) => {
            warn!("Failed to read namespace {}: {}", name, e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    ns.name = name;
    ns.created_at = current.created_at;

    if let Err(e) = state.ledger.put_namespace(&ns).await {
        warn!("Failed to update namespace {}: {}", ns.name, e);
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    info!("Updated namespace {}", ns.name);
    (StatusCode::OK, Json(ns)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pkg_admission::QuotaValidator;
    use pkg_ledger::Ledger;
    use pkg_state::client::StateStore;
    use std::collections::HashMap;

    async fn test_state() -> AppState {
        let ledger = Ledger::new(StateStore::new_in_memory().await.unwrap());
        AppState {
            validator: QuotaValidator::new(ledger.clone()),
            ledger,
            token: "test-token".to_string(),
        }
    }

    #[tokio::test]
    async fn create_then_relabel() {
        let state = test_state().await;

        let ns = Namespace::new("ns1", HashMap::from([("env".to_string(), "dev".to_string())]));
        let res = create_namespace(State(state.clone()), Json(ns))
            .await
            .into_response();
        assert_eq!(res.status(), StatusCode::CREATED);

        let before = state.ledger.get_namespace("ns1").await.unwrap().unwrap();

        let relabeled = Namespace::new(
            "ns1",
            HashMap::from([("env".to_string(), "prod".to_string())]),
        );
        let res = update_namespace(
            State(state.clone()),
            AxumPath("ns1".to_string()),
            Json(relabeled),
        )
        .await
        .into_response();
        assert_eq!(res.status(), StatusCode::OK);

        let after = state.ledger.get_namespace("ns1").await.unwrap().unwrap();
        assert_eq!(after.labels["env"], "prod");
        assert_eq!(after.created_at, before.created_at);
    }

    #[tokio::test]
    async fn update_of_missing_namespace_is_not_an_upsert() {
        let state = test_state().await;
        let res = update_namespace(
            State(state.clone()),
            AxumPath("ghost".to_string()),
            Json(Namespace::new("ghost", HashMap::new())),
        )
        .await
        .into_response();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        assert!(state.ledger.get_namespace("ghost").await.unwrap().is_none());
    }
}
