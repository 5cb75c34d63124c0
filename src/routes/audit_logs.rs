//! Audit trail routes (system administrators)
//!
//! - GET /api/audit-logs                           - List (filter actor_id, entity_type, action, from, to)
//! - GET /api/audit-logs/{entity_type}/{entity_id} - History of one record, oldest first

use hyper::Method;

use super::response::{self, ApiResponse};
use super::{authenticate, route_not_found, ApiRequest};
use crate::server::AppState;
use crate::services::AuditFilter;
use crate::types::{ApiError, Result};

pub async fn handle(state: &AppState, req: &ApiRequest, rest: &[&str]) -> Result<ApiResponse> {
    let caller = authenticate(state, req).await?;
    if !caller.actor.is_system_admin() {
        return Err(ApiError::Forbidden(
            "Μόνο οι διαχειριστές συστήματος έχουν πρόσβαση στο ιστορικό ενεργειών.".into(),
        ));
    }
    let audit = &state.services.audit;

    match (&req.method, rest) {
        (&Method::GET, []) => {
            let filter: AuditFilter = req.query()?;
            response::paginated("OK", audit.list(&filter, req.page(state)?).await?)
        }
        (&Method::GET, [entity_type, entity_id]) => {
            response::ok("OK", audit.history(entity_type, entity_id).await?)
        }
        _ => Err(route_not_found()),
    }
}
