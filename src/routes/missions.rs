//! Mission routes
//!
//! - GET    /api/missions                 - List (filter status, department_id, search)
//! - POST   /api/missions                 - Create as DRAFT
//! - GET    /api/missions/{id}            - Show
//! - PUT    /api/missions/{id}            - Update
//! - DELETE /api/missions/{id}            - Delete a draft
//! - POST   /api/missions/{id}/publish    - DRAFT -> PUBLISHED
//! - POST   /api/missions/{id}/close      - PUBLISHED -> CLOSED
//! - POST   /api/missions/{id}/cancel     - Cancel with cascade
//! - GET    /api/missions/{id}/stats      - Capacity and request figures
//! - GET    /api/missions/{id}/shifts     - Shifts of the mission
//! - POST   /api/missions/{id}/shifts     - Add a shift

use hyper::Method;

use super::response::{self, ApiResponse};
use super::{authenticate, route_not_found, ApiRequest};
use crate::server::AppState;
use crate::services::mission_service::{CancelInput, MissionFilter, MissionInput};
use crate::services::shift_service::ShiftInput;
use crate::types::Result;

pub async fn handle(state: &AppState, req: &ApiRequest, rest: &[&str]) -> Result<ApiResponse> {
    let caller = authenticate(state, req).await?;
    let missions = &state.services.missions;

    match (&req.method, rest) {
        (&Method::GET, []) => {
            let filter: MissionFilter = req.query()?;
            response::paginated("OK", missions.list(&caller, &filter, req.page(state)?).await?)
        }
        (&Method::POST, []) => {
            let input: MissionInput = req.json()?;
            response::created("Η αποστολή δημιουργήθηκε.", missions.create(&caller, input).await?)
        }
        (&Method::GET, [id]) => response::ok("OK", missions.get(&caller, id).await?),
        (&Method::PUT, [id]) | (&Method::PATCH, [id]) => {
            let input: MissionInput = req.json()?;
            response::ok("Η αποστολή ενημερώθηκε.", missions.update(&caller, id, input).await?)
        }
        (&Method::DELETE, [id]) => {
            missions.delete(&caller, id).await?;
            Ok(response::message("Η αποστολή διαγράφηκε."))
        }
        (&Method::POST, [id, "publish"]) => {
            response::ok("Η αποστολή δημοσιεύτηκε.", missions.publish(&caller, id).await?)
        }
        (&Method::POST, [id, "close"]) => {
            response::ok("Η αποστολή έκλεισε.", missions.close(&caller, id).await?)
        }
        (&Method::POST, [id, "cancel"]) => {
            let input: CancelInput = req.json()?;
            response::ok("Η αποστολή ακυρώθηκε.", missions.cancel(&caller, id, input).await?)
        }
        (&Method::GET, [id, "stats"]) => response::ok("OK", missions.stats(&caller, id).await?),
        (&Method::GET, [id, "shifts"]) => {
            response::ok("OK", state.services.shifts.list(&caller, id).await?)
        }
        (&Method::POST, [id, "shifts"]) => {
            let input: ShiftInput = req.json()?;
            let shift = state.services.shifts.create(&caller, id, input).await?;
            response::created("Η βάρδια δημιουργήθηκε.", shift)
        }
        _ => Err(route_not_found()),
    }
}
