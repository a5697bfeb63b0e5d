pub mod auth;
pub mod handlers;
pub mod request_id;
pub mod server;

use pkg_admission::QuotaValidator;
use pkg_ledger::Ledger;

/// Shared application state injected into all Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub ledger: Ledger,
    pub validator: QuotaValidator,
    pub token: String,
}
