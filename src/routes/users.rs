//! User administration routes (system administrators)
//!
//! - GET    /api/users                     - List, filter by role/department/is_active/search
//! - POST   /api/users                     - Create
//! - GET    /api/users/{id}                - Show (self or admin)
//! - PUT    /api/users/{id}                - Update
//! - POST   /api/users/{id}/toggle-active  - Activate/deactivate
//! - DELETE /api/users/{id}                - Soft delete

use hyper::Method;

use super::response::{self, ApiResponse};
use super::{authenticate, route_not_found, ApiRequest};
use crate::server::AppState;
use crate::services::user_service::{CreateUserInput, UpdateUserInput, UserFilter};
use crate::types::Result;

pub async fn handle(state: &AppState, req: &ApiRequest, rest: &[&str]) -> Result<ApiResponse> {
    let caller = authenticate(state, req).await?;
    let users = &state.services.users;

    match (&req.method, rest) {
        (&Method::GET, []) => {
            let filter: UserFilter = req.query()?;
            let page = users.list(&caller, &filter, req.page(state)?).await?;
            response::paginated("OK", page)
        }
        (&Method::POST, []) => {
            let input: CreateUserInput = req.json()?;
            response::created("Ο χρήστης δημιουργήθηκε.", users.create(&caller, input).await?)
        }
        (&Method::GET, [id]) => response::ok("OK", users.get(&caller, id).await?),
        (&Method::PUT, [id]) | (&Method::PATCH, [id]) => {
            let input: UpdateUserInput = req.json()?;
            response::ok("Ο χρήστης ενημερώθηκε.", users.update(&caller, id, input).await?)
        }
        (&Method::POST, [id, "toggle-active"]) | (&Method::PATCH, [id, "toggle-active"]) => {
            let user = users.toggle_active(&caller, id).await?;
            let message = if user.is_active {
                "Ο χρήστης ενεργοποιήθηκε."
            } else {
                "Ο χρήστης απενεργοποιήθηκε."
            };
            response::ok(message, user)
        }
        (&Method::DELETE, [id]) => {
            users.delete(&caller, id).await?;
            Ok(response::message("Ο χρήστης διαγράφηκε."))
        }
        _ => Err(route_not_found()),
    }
}
