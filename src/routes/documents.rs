//! Document routes
//!
//! - GET    /api/documents                - List visible documents
//! - POST   /api/documents                - Upload (JSON with base64 `content`)
//! - GET    /api/documents/{id}           - Metadata
//! - PUT    /api/documents/{id}           - Update metadata
//! - GET    /api/documents/{id}/download  - File bytes
//! - DELETE /api/documents/{id}           - Soft delete

use hyper::Method;

use super::response::{self, ApiResponse};
use super::{authenticate, route_not_found, ApiRequest};
use crate::server::AppState;
use crate::services::document_service::{DocumentFilter, DocumentUpdateInput, UploadInput};
use crate::types::Result;

pub async fn handle(state: &AppState, req: &ApiRequest, rest: &[&str]) -> Result<ApiResponse> {
    let caller = authenticate(state, req).await?;
    let documents = &state.services.documents;

    match (&req.method, rest) {
        (&Method::GET, []) => {
            let filter: DocumentFilter = req.query()?;
            response::paginated("OK", documents.list(&caller, &filter, req.page(state)?).await?)
        }
        (&Method::POST, []) => {
            let input: UploadInput = req.json()?;
            response::created("Το έγγραφο ανέβηκε.", documents.upload(&caller, input).await?)
        }
        (&Method::GET, [id]) => response::ok("OK", documents.get(&caller, id).await?),
        (&Method::PUT, [id]) | (&Method::PATCH, [id]) => {
            let input: DocumentUpdateInput = req.json()?;
            response::ok("Το έγγραφο ενημερώθηκε.", documents.update(&caller, id, input).await?)
        }
        (&Method::GET, [id, "download"]) => {
            let download = documents.download(&caller, id).await?;
            Ok(response::file(
                &download.document.mime_type,
                &download.document.file_name,
                download.bytes,
            ))
        }
        (&Method::DELETE, [id]) => {
            documents.delete(&caller, id).await?;
            Ok(response::message("Το έγγραφο διαγράφηκε."))
        }
        _ => Err(route_not_found()),
    }
}
