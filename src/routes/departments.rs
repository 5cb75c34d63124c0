//! Department routes
//!
//! Every authenticated user may read departments; only system
//! administrators change them.
//!
//! - GET    /api/departments         - List (`tree=true` returns the nested tree)
//! - POST   /api/departments         - Create
//! - GET    /api/departments/{id}    - Show with parent and children
//! - PUT    /api/departments/{id}    - Update
//! - DELETE /api/departments/{id}    - Soft delete

use hyper::Method;

use super::response::{self, ApiResponse};
use super::{authenticate, route_not_found, ApiRequest};
use crate::server::AppState;
use crate::services::department_service::{DepartmentFilter, DepartmentInput};
use crate::types::Result;

pub async fn handle(state: &AppState, req: &ApiRequest, rest: &[&str]) -> Result<ApiResponse> {
    let caller = authenticate(state, req).await?;
    let departments = &state.services.departments;

    match (&req.method, rest) {
        (&Method::GET, []) => {
            let filter: DepartmentFilter = req.query()?;
            if filter.tree {
                response::ok("OK", departments.tree().await?)
            } else {
                response::paginated("OK", departments.list(&filter, req.page(state)?).await?)
            }
        }
        (&Method::POST, []) => {
            let input: DepartmentInput = req.json()?;
            let department = departments.create(&caller, input).await?;
            response::created("Το τμήμα δημιουργήθηκε.", department)
        }
        (&Method::GET, [id]) => response::ok("OK", departments.get(id).await?),
        (&Method::PUT, [id]) | (&Method::PATCH, [id]) => {
            let input: DepartmentInput = req.json()?;
            let department = departments.update(&caller, id, input).await?;
            response::ok("Το τμήμα ενημερώθηκε.", department)
        }
        (&Method::DELETE, [id]) => {
            departments.delete(&caller, id).await?;
            Ok(response::message("Το τμήμα διαγράφηκε."))
        }
        _ => Err(route_not_found()),
    }
}
