use axum::{
    Json,
    extract::{Path as AxumPath, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use tracing::{info, warn};

use pkg_constants::meta::FINALIZER;
use pkg_types::tenant::{TenantQuota, TenantQuotaStatus};
use pkg_types::validate::{validate_name, validate_resource_list};

use crate::AppState;

pub async fn create_tenant(
    State(state): State<AppState>,
    Json(mut tenant): Json<TenantQuota>,
) -> impl IntoResponse {
    if let Err(e) = validate_name(&tenant.name) {
        return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
    }
    if let Err(e) = validate_resource_list(&tenant.spec.hard) {
        return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
    }
    match state.ledger.get_tenant(&tenant.name).await {
        Ok(Some(_)) => {
            return (StatusCode::CONFLICT, "tenant quota already exists").into_response();
        }
        Ok(None) => {}
        Err(e) => {
            warn!("Failed to read tenant {}: {}", tenant.name, e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    }

    // Create-time defaulting. An update that removes the finalizer again
    // is honored; only creation adds it.
    tenant.add_finalizer(FINALIZER);
    tenant.status = TenantQuotaStatus::default();
    tenant.deletion_timestamp = None;
    tenant.created_at = Utc::now();

    if let Err(e) = state.ledger.put_tenant(&tenant).await {
        warn!("Failed to create tenant {}: {}", tenant.name, e);
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    info!("Created tenant quota {}", tenant.name);
    (StatusCode::CREATED, Json(tenant)).into_response()
}

pub async fn list_tenants(State(state): State<AppState>) -> impl IntoResponse {
    match state.ledger.list_tenants().await {
        Ok(tenants) => (StatusCode::OK, Json(tenants)).into_response(),
        Err(e) => {
            warn!("Failed to list tenants: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub async fn get_tenant(
    State(state): State<AppState>,
    AxumPath(name): AxumPath<String>,
) -> impl IntoResponse {
    match state.ledger.get_tenant(&name).await {
        Ok(Some(tenant)) => (StatusCode::OK, Json(tenant)).into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => {
            warn!("Failed to read tenant {}: {}", name, e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub async fn update_tenant(
    State(state): State<AppState>,
    AxumPath(name): AxumPath<String>,
    Json(mut tenant): Json<TenantQuota>,
) -> impl IntoResponse {
    if let Err(e) = validate_resource_list(&tenant.spec.hard) {
        return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
    }
    let current = match state.ledger.get_tenant(&name).await {
        Ok(Some(t)) => t,
        Ok(None) => return StatusCode::NOT_FOUND.into_response(),
        Err(e) => {
            warn!("Failed to read tenant {}: {}", name, e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    // Spec and finalizers come from the caller; identity and the
    // server-owned fields do not.
    tenant.name = name;
    tenant.status = current.status;
    tenant.deletion_timestamp = current.deletion_timestamp;
    tenant.created_at = current.created_at;

    if let Err(e) = state.ledger.put_tenant(&tenant).await {
        warn!("Failed to update tenant {}: {}", tenant.name, e);
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    info!("Updated tenant quota {}", tenant.name);
    (StatusCode::OK, Json(tenant)).into_response()
}

/// Two-phase delete: the tenant is marked with a deletion timestamp and
/// stays visible until the reconciler has released its quotas and
/// removed the finalizer.
pub async fn delete_tenant(
    State(state): State<AppState>,
    AxumPath(name): AxumPath<String>,
) -> impl IntoResponse {
    match state.ledger.mark_tenant_deleting(&name).await {
        Ok(Some(tenant)) => {
            info!("Deletion requested for tenant quota {}", name);
            (StatusCode::ACCEPTED, Json(tenant)).into_response()
        }
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => {
            warn!("Failed to delete tenant {}: {}", name, e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
