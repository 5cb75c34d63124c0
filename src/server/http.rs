//! HTTP server implementation
//!
//! hyper http1 with TokioIo; one task per connection. Each request body is
//! read in full (bounded) before routing.

use bytes::Bytes;
use http_body_util::{BodyExt, Full, Limited};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use super::AppState;
use crate::routes::{self, ApiRequest};
use crate::types::{ApiError, Result};

/// Headroom for the JSON wrapping and base64 expansion of uploads
const BODY_OVERHEAD: usize = 64 * 1024;

fn body_limit(state: &AppState) -> usize {
    state.args.max_upload_bytes / 3 * 4 + BODY_OVERHEAD
}

/// Start the HTTP server; returns on Ctrl-C
pub async fn run(state: Arc<AppState>) -> Result<()> {
    let listener = TcpListener::bind(state.args.listen).await?;
    info!("Muster listening on {}", listener.local_addr()?);

    if state.args.dev_mode {
        warn!("Development mode enabled - do not use in production");
    }

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    let state = Arc::clone(&state);
                    tokio::spawn(async move {
                        let io = TokioIo::new(stream);

                        let service = service_fn(move |req| {
                            let state = Arc::clone(&state);
                            async move { handle_request(state, addr, req).await }
                        });

                        if let Err(err) = http1::Builder::new()
                            .serve_connection(io, service)
                            .await
                        {
                            error!("Error serving connection from {}: {:?}", addr, err);
                        }
                    });
                }
                Err(e) => {
                    error!("Error accepting connection: {:?}", e);
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received, stopping listener");
                return Ok(());
            }
        }
    }
}

/// Read the body and route the request
async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> std::result::Result<Response<Full<Bytes>>, Infallible> {
    let started = Instant::now();
    let (parts, body) = req.into_parts();

    let body = match Limited::new(body, body_limit(&state)).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!("[{}] Failed to read request body: {}", addr, e);
            let err = ApiError::BadRequest("Το σώμα του αιτήματος είναι πολύ μεγάλο ή μη έγκυρο.".into());
            return Ok(routes::error_response(&err, state.args.debug));
        }
    };

    let request = ApiRequest {
        method: parts.method,
        path: parts.uri.path().to_string(),
        query: parts.uri.query().map(str::to_string),
        headers: parts.headers,
        body,
        remote_addr: Some(addr),
    };
    let method = request.method.clone();
    let path = request.path.clone();

    let response = routes::dispatch(&state, request).await;

    info!(
        "[{}] {} {} -> {} ({} ms)",
        addr,
        method,
        path,
        response.status().as_u16(),
        started.elapsed().as_millis()
    );
    Ok(response)
}
