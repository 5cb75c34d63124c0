//! Notification inbox routes
//!
//! - GET  /api/notifications               - Own notifications (`unread=true` filter)
//! - GET  /api/notifications/unread-count  - Number of unread notifications
//! - POST /api/notifications/read-all      - Mark all read
//! - POST /api/notifications/{id}/read     - Mark one read

use hyper::Method;
use serde_json::json;

use super::response::{self, ApiResponse};
use super::{authenticate, route_not_found, ApiRequest};
use crate::server::AppState;
use crate::services::notification_service::NotificationFilter;
use crate::types::Result;

pub async fn handle(state: &AppState, req: &ApiRequest, rest: &[&str]) -> Result<ApiResponse> {
    let caller = authenticate(state, req).await?;
    let notifications = &state.services.notifications;

    match (&req.method, rest) {
        (&Method::GET, []) => {
            let filter: NotificationFilter = req.query()?;
            let page = notifications.list(&caller, &filter, req.page(state)?).await?;
            response::paginated("OK", page)
        }
        (&Method::GET, ["unread-count"]) => {
            let count = notifications.unread_count(&caller).await?;
            response::ok("OK", json!({ "count": count }))
        }
        (&Method::POST, ["read-all"]) | (&Method::PATCH, ["read-all"]) => {
            let updated = notifications.mark_all_read(&caller).await?;
            response::ok(
                "Όλες οι ειδοποιήσεις σημειώθηκαν ως αναγνωσμένες.",
                json!({ "updated": updated }),
            )
        }
        (&Method::POST, [id, "read"]) | (&Method::PATCH, [id, "read"]) => {
            let notification = notifications.mark_read(&caller, id).await?;
            response::ok("Η ειδοποίηση σημειώθηκε ως αναγνωσμένη.", notification)
        }
        _ => Err(route_not_found()),
    }
}
