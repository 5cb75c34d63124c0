//! Participation request routes
//!
//! - GET  /api/participations               - List (filter shift_id, mission_id, status, volunteer_id)
//! - POST /api/participations               - Apply for a shift
//! - GET  /api/participations/{id}          - Show
//! - POST /api/participations/{id}/approve  - Approve (takes a place)
//! - POST /api/participations/{id}/reject   - Reject with optional reason
//! - POST /api/participations/{id}/cancel   - Cancel (volunteer or manager)

use hyper::Method;

use super::response::{self, ApiResponse};
use super::{authenticate, route_not_found, ApiRequest};
use crate::server::AppState;
use crate::services::participation_service::{ApplyInput, DecisionInput, ParticipationFilter};
use crate::types::Result;

pub async fn handle(state: &AppState, req: &ApiRequest, rest: &[&str]) -> Result<ApiResponse> {
    let caller = authenticate(state, req).await?;
    let participations = &state.services.participations;

    match (&req.method, rest) {
        (&Method::GET, []) => {
            let filter: ParticipationFilter = req.query()?;
            let page = participations.list(&caller, &filter, req.page(state)?).await?;
            response::paginated("OK", page)
        }
        (&Method::POST, []) => {
            let input: ApplyInput = req.json()?;
            let request = participations.apply(&caller, input).await?;
            response::created("Το αίτημα συμμετοχής υποβλήθηκε.", request)
        }
        (&Method::GET, [id]) => response::ok("OK", participations.get(&caller, id).await?),
        (&Method::POST, [id, "approve"]) => {
            let request = participations.approve(&caller, id).await?;
            response::ok("Το αίτημα εγκρίθηκε.", request)
        }
        (&Method::POST, [id, "reject"]) => {
            let input: DecisionInput = req.json()?;
            let request = participations.reject(&caller, id, input).await?;
            response::ok("Το αίτημα απορρίφθηκε.", request)
        }
        (&Method::POST, [id, "cancel"]) => {
            let input: DecisionInput = req.json()?;
            let request = participations.cancel(&caller, id, input).await?;
            response::ok("Το αίτημα ακυρώθηκε.", request)
        }
        _ => Err(route_not_found()),
    }
}
