use axum::{
    Extension, Json,
    extract::{Path as AxumPath, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::{info, warn};

use pkg_admission::AdmissionError;
use pkg_ledger::apply::transfer_changed_owners;
use pkg_types::quantity::Quantity;
use pkg_types::quota::ResourceQuota;
use pkg_types::validate::{validate_name, validate_resource_list};

use crate::AppState;
use crate::auth::AuthUser;

/// Optional override for the write identity recorded in field
/// ownership, the way server-side apply lets a client name its manager.
#[derive(Debug, Deserialize)]
pub struct ManagerQuery {
    #[serde(rename = "fieldManager")]
    pub field_manager: Option<String>,
}

/// Every create/update is dispatched through the admission validator
/// before it is persisted; a policy violation surfaces as 422 with the
/// full structured violation list, an unanswerable check as 503.
fn admission_rejection(err: AdmissionError) -> Response {
    match err {
        AdmissionError::Invalid(errors) => {
            info!("Admission rejected {} {}: {}", errors.kind, errors.name, errors);
            (StatusCode::UNPROCESSABLE_ENTITY, Json(errors)).into_response()
        }
        AdmissionError::Unavailable(reason) => {
            warn!("Admission unavailable, failing closed: {}", reason);
            (StatusCode::SERVICE_UNAVAILABLE, reason).into_response()
        }
    }
}

pub async fn create_quota(
    State(state): State<AppState>,
    AxumPath(ns): AxumPath<String>,
    Query(query): Query<ManagerQuery>,
    Extension(user): Extension<AuthUser>,
    Json(mut quota): Json<ResourceQuota>,
) -> impl IntoResponse {
    if let Err(e) = validate_name(&quota.name) {
        return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
    }
    if let Err(e) = validate_resource_list(&quota.hard) {
        return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
    }
    match state.ledger.get_namespace(&ns).await {
        Ok(Some(_)) => {}
        Ok(None) => return (StatusCode::NOT_FOUND, "namespace not found").into_response(),
        Err(e) => {
            warn!("Failed to read namespace {}: {}", ns, e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    }
    match state.ledger.get_resource_quota(&ns, &quota.name).await {
        Ok(Some(_)) => {
            return (StatusCode::CONFLICT, "resource quota already exists").into_response();
        }
        Ok(None) => {}
        Err(e) => {
            warn!("Failed to read quota {}/{}: {}", ns, quota.name, e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    }

    let manager = query.field_manager.unwrap_or_else(|| user.name.clone());
    quota.namespace = ns;
    // Usage arrives through the /used subresource, never on create.
    quota.used.clear();
    quota.created_at = Utc::now();
    // A fresh object's fields all belong to whoever wrote them.
    transfer_changed_owners(None, &mut quota, &manager);

    if let Err(err) = state.validator.validate_create(&quota).await {
        return admission_rejection(err);
    }

    if let Err(e) = state.ledger.put_resource_quota(&quota).await {
        warn!("Failed to create quota {}/{}: {}", quota.namespace, quota.name, e);
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    info!(
        "Created resource quota {}/{} (manager={})",
        quota.namespace, quota.name, manager
    );
    (StatusCode::CREATED, Json(quota)).into_response()
}

pub async fn list_quotas(
    State(state): State<AppState>,
    AxumPath(ns): AxumPath<String>,
) -> impl IntoResponse {
    match state.ledger.list_resource_quotas(&ns).await {
        Ok(quotas) => (StatusCode::OK, Json(quotas)).into_response(),
        Err(e) => {
            warn!("Failed to list quotas in {}: {}", ns, e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub async fn get_quota(
    State(state): State<AppState>,
    AxumPath((ns, name)): AxumPath<(String, String)>,
) -> impl IntoResponse {
    match state.ledger.get_resource_quota(&ns, &name).await {
        Ok(Some(quota)) => (StatusCode::OK, Json(quota)).into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => {
            warn!("Failed to read quota {}/{}: {}", ns, name, e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub async fn update_quota(
    State(state): State<AppState>,
    AxumPath((ns, name)): AxumPath<(String, String)>,
    Query(query): Query<ManagerQuery>,
    Extension(user): Extension<AuthUser>,
    Json(mut quota): Json<ResourceQuota>,
) -> impl IntoResponse {
    if let Err(e) = validate_resource_list(&quota.hard) {
        return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
    }
    let current = match state.ledger.get_resource_quota(&ns, &name).await {
        Ok(Some(q)) => q,
        Ok(None) => return StatusCode::NOT_FOUND.into_response(),
        Err(e) => {
            warn!("Failed to read quota {}/{}: {}", ns, name, e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let manager = query.field_manager.unwrap_or_else(|| user.name.clone());
    quota.namespace = ns;
    quota.name = name;
    quota.used = current.used.clone();
    quota.created_at = current.created_at;
    // A plain update claims only the keys it changed; untouched keys
    // keep their previous owner.
    transfer_changed_owners(Some(&current), &mut quota, &manager);

    if let Err(err) = state.validator.validate_update(&manager, &current, &quota).await {
        return admission_rejection(err);
    }

    if let Err(e) = state.ledger.put_resource_quota(&quota).await {
        warn!("Failed to update quota {}/{}: {}", quota.namespace, quota.name, e);
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    info!(
        "Updated resource quota {}/{} (manager={})",
        quota.namespace, quota.name, manager
    );
    (StatusCode::OK, Json(quota)).into_response()
}

/// Usage reports come from the enforcement side. They never change
/// `hard`, labels, or ownership, and are not admission checked, so
/// reporting keeps working even when the owning tenant is gone.
pub async fn update_quota_used(
    State(state): State<AppState>,
    AxumPath((ns, name)): AxumPath<(String, String)>,
    Json(used): Json<BTreeMap<String, Quantity>>,
) -> impl IntoResponse {
    match state.ledger.update_resource_quota_used(&ns, &name, used).await {
        Ok(Some(quota)) => (StatusCode::OK, Json(quota)).into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => {
            warn!("Failed to record usage for {}/{}: {}", ns, name, e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
