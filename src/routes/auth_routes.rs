//! HTTP Routes for Authentication
//!
//! - POST /api/auth/register - Create an account and get tokens
//! - POST /api/auth/login    - Authenticate and get tokens
//! - POST /api/auth/logout   - Invalidate every token of the caller
//! - POST /api/auth/refresh  - Exchange a refresh token
//! - GET  /api/auth/me       - Current user
//! - PUT  /api/auth/profile  - Update own name, email, phone
//! - PUT  /api/auth/password - Change own password

use hyper::Method;

use super::response::{self, ApiResponse};
use super::{authenticate, route_not_found, ApiRequest};
use crate::server::AppState;
use crate::services::auth_service::{
    ChangePasswordInput, LoginInput, ProfileInput, RefreshInput, RegisterInput,
};
use crate::types::Result;

pub async fn handle(state: &AppState, req: &ApiRequest, rest: &[&str]) -> Result<ApiResponse> {
    let auth = &state.services.auth;

    match (&req.method, rest) {
        (&Method::POST, ["register"]) => {
            let input: RegisterInput = req.json()?;
            let result = auth.register(input, req.client_ip()).await?;
            response::created("Η εγγραφή ολοκληρώθηκε με επιτυχία.", result)
        }
        (&Method::POST, ["login"]) => {
            let input: LoginInput = req.json()?;
            let result = auth.login(input, req.client_ip()).await?;
            response::ok("Συνδεθήκατε με επιτυχία.", result)
        }
        (&Method::POST, ["refresh"]) => {
            let input: RefreshInput = req.json()?;
            let result = auth.refresh(input).await?;
            response::ok("Τα διαπιστευτήρια ανανεώθηκαν.", result)
        }
        (&Method::POST, ["logout"]) => {
            let caller = authenticate(state, req).await?;
            auth.logout(&caller).await?;
            Ok(response::message("Αποσυνδεθήκατε με επιτυχία."))
        }
        (&Method::GET, ["me"]) => {
            let caller = authenticate(state, req).await?;
            response::ok("OK", auth.me(&caller).await?)
        }
        (&Method::PUT, ["profile"]) => {
            let caller = authenticate(state, req).await?;
            let input: ProfileInput = req.json()?;
            let user = auth.update_profile(&caller, input).await?;
            response::ok("Το προφίλ ενημερώθηκε.", user)
        }
        (&Method::PUT, ["password"]) => {
            let caller = authenticate(state, req).await?;
            let input: ChangePasswordInput = req.json()?;
            let result = auth.change_password(&caller, input).await?;
            response::ok("Ο κωδικός άλλαξε με επιτυχία.", result)
        }
        _ => Err(route_not_found()),
    }
}
