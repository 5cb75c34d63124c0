//! Shift routes
//!
//! Shifts are created under their mission (`POST /api/missions/{id}/shifts`).
//!
//! - GET    /api/shifts/{id}             - Show
//! - PUT    /api/shifts/{id}             - Update
//! - DELETE /api/shifts/{id}             - Soft delete (only while empty)
//! - POST   /api/shifts/{id}/lock        - Stop accepting approvals
//! - POST   /api/shifts/{id}/unlock      - Reopen
//! - GET    /api/shifts/{id}/volunteers  - Approved participants

use hyper::Method;

use super::response::{self, ApiResponse};
use super::{authenticate, route_not_found, ApiRequest};
use crate::server::AppState;
use crate::services::shift_service::ShiftInput;
use crate::types::Result;

pub async fn handle(state: &AppState, req: &ApiRequest, rest: &[&str]) -> Result<ApiResponse> {
    let caller = authenticate(state, req).await?;
    let shifts = &state.services.shifts;

    match (&req.method, rest) {
        (&Method::GET, [id]) => response::ok("OK", shifts.get(&caller, id).await?),
        (&Method::PUT, [id]) | (&Method::PATCH, [id]) => {
            let input: ShiftInput = req.json()?;
            response::ok("Η βάρδια ενημερώθηκε.", shifts.update(&caller, id, input).await?)
        }
        (&Method::DELETE, [id]) => {
            shifts.delete(&caller, id).await?;
            Ok(response::message("Η βάρδια διαγράφηκε."))
        }
        (&Method::POST, [id, "lock"]) => {
            response::ok("Η βάρδια κλειδώθηκε.", shifts.lock(&caller, id).await?)
        }
        (&Method::POST, [id, "unlock"]) => {
            response::ok("Η βάρδια ξεκλειδώθηκε.", shifts.unlock(&caller, id).await?)
        }
        (&Method::GET, [id, "volunteers"]) => {
            response::ok("OK", shifts.volunteers(&caller, id).await?)
        }
        _ => Err(route_not_found()),
    }
}
