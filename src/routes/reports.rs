//! Report routes (system and department administrators)
//!
//! - GET /api/reports/dashboard
//! - GET /api/reports/missions
//! - GET /api/reports/shifts
//! - GET /api/reports/volunteers
//! - GET /api/reports/participations
//! - GET /api/reports/departments
//! - GET /api/reports/export?type=missions|shifts|volunteers|participations|departments
//!
//! Every report accepts `department_id`, `from` and `to` query parameters.

use hyper::Method;
use serde::Deserialize;

use super::response::{self, ApiResponse};
use super::{authenticate, route_not_found, ApiRequest};
use crate::server::AppState;
use crate::services::report_service::{ExportKind, ReportFilter};
use crate::types::{ApiError, Result};

#[derive(Debug, Deserialize)]
struct ExportQuery {
    #[serde(rename = "type")]
    kind: Option<ExportKind>,
}

pub async fn handle(state: &AppState, req: &ApiRequest, rest: &[&str]) -> Result<ApiResponse> {
    if req.method != Method::GET {
        return Err(route_not_found());
    }
    let caller = authenticate(state, req).await?;
    let reports = &state.services.reports;
    let filter: ReportFilter = req.query()?;

    match rest {
        ["dashboard"] => response::ok("OK", reports.dashboard(&caller, &filter).await?),
        ["missions"] => response::ok("OK", reports.missions(&caller, &filter).await?),
        ["shifts"] => response::ok("OK", reports.shifts(&caller, &filter).await?),
        ["volunteers"] => response::ok("OK", reports.volunteers(&caller, &filter).await?),
        ["participations"] => response::ok("OK", reports.participations(&caller, &filter).await?),
        ["departments"] => response::ok("OK", reports.departments(&caller, &filter).await?),
        ["export"] => {
            let query: ExportQuery = req.query().map_err(|_| invalid_export_type())?;
            let kind = query.kind.ok_or_else(invalid_export_type)?;
            let export = reports.export(&caller, kind, &filter).await?;
            Ok(response::csv(&export.file_name, export.body))
        }
        _ => Err(route_not_found()),
    }
}

fn invalid_export_type() -> ApiError {
    ApiError::invalid_field(
        "type",
        "Ο τύπος εξαγωγής πρέπει να είναι missions, shifts, volunteers, participations ή departments.",
    )
}
