//
// Copyright 2025 The Project Oak Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! HTTP/1.1 front end. Bodies are the raw protocol messages.

use std::{convert::Infallible, sync::Arc, time::Duration};

use aca_provisioning::{ProtocolEngine, ProvisioningError};
use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::{
    body::Incoming,
    header::{HeaderValue, CONTENT_TYPE},
    server::conn::http1,
    service::service_fn,
    Method, Request, Response, StatusCode,
};
use hyper_util::rt::{TokioIo, TokioTimer};
use log::{debug, error, warn};
use tokio::net::TcpListener;

pub const IDENTITY_CLAIM_PATH: &str = "/HIRS_AttestationCA/identity-claim-tpm2/process";
pub const CERTIFICATE_REQUEST_PATH: &str = "/HIRS_AttestationCA/request-certificate-tpm2";
pub const IDENTITY_REQUEST_PATH: &str = "/HIRS_AttestationCA/identity-request/process";
pub const PUBLIC_KEY_PATH: &str = "/HIRS_AttestationCA/public-key";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Route {
    IdentityClaim,
    CertificateRequest,
    IdentityRequest,
    PublicKey,
}

impl Route {
    pub fn resolve(method: &Method, path: &str) -> Option<Self> {
        match (method, path) {
            (&Method::POST, IDENTITY_CLAIM_PATH) => Some(Route::IdentityClaim),
            (&Method::POST, CERTIFICATE_REQUEST_PATH) => Some(Route::CertificateRequest),
            (&Method::POST, IDENTITY_REQUEST_PATH) => Some(Route::IdentityRequest),
            (&Method::GET, PUBLIC_KEY_PATH) => Some(Route::PublicKey),
            _ => None,
        }
    }

    fn dispatch(self, engine: &ProtocolEngine, body: &[u8]) -> Result<Vec<u8>, ProvisioningError> {
        match self {
            Route::IdentityClaim => engine.process_identity_claim_tpm2(body),
            Route::CertificateRequest => engine.process_certificate_request(body),
            Route::IdentityRequest => engine.process_identity_request(body),
            Route::PublicKey => engine.public_key_der(),
        }
    }
}

/// Client payload problems are the caller's fault, everything else is ours.
pub fn status_for(err: &ProvisioningError) -> StatusCode {
    if err.is_client_error() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

fn response(
    status: StatusCode,
    body: impl Into<Bytes>,
    content_type: &'static str,
) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

fn text(status: StatusCode, message: String) -> Response<Full<Bytes>> {
    response(status, message, "text/plain; charset=utf-8")
}

async fn handle_request(
    request: Request<Incoming>,
    engine: Arc<ProtocolEngine>,
    timeout: Duration,
    max_body_length: usize,
) -> Response<Full<Bytes>> {
    let Some(route) = Route::resolve(request.method(), request.uri().path()) else {
        let message = format!("no route for {} {}", request.method(), request.uri());
        return text(StatusCode::NOT_FOUND, message);
    };
    let body = match Limited::new(request.into_body(), max_body_length).collect().await {
        Ok(body) => body.to_bytes(),
        Err(err) if err.downcast_ref::<LengthLimitError>().is_some() => {
            let message = format!("request body exceeds {max_body_length} bytes");
            return text(StatusCode::PAYLOAD_TOO_LARGE, message);
        }
        Err(err) => return text(StatusCode::BAD_REQUEST, format!("couldn't read body: {err}")),
    };
    debug!("{route:?}: {} byte request", body.len());

    // Handshakes are synchronous and may block on the collaborators.
    let handshake = tokio::task::spawn_blocking(move || route.dispatch(&engine, &body));
    match tokio::time::timeout(timeout, handshake).await {
        Ok(Ok(Ok(body))) => response(StatusCode::OK, body, "application/octet-stream"),
        Ok(Ok(Err(err))) => text(status_for(&err), err.to_string()),
        Ok(Err(err)) => {
            error!("{route:?} handler panicked: {err:?}");
            text(StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
        }
        Err(_) => {
            warn!("{route:?} timed out after {timeout:?}");
            text(StatusCode::INTERNAL_SERVER_ERROR, "request timed out".to_string())
        }
    }
}

/// Serves every accepted connection on its own task. Request bodies longer
/// than `max_body_length` are refused with 413.
pub async fn serve(
    listener: TcpListener,
    engine: Arc<ProtocolEngine>,
    timeout: Duration,
    max_body_length: usize,
) -> Result<(), anyhow::Error> {
    loop {
        let (tcp, peer) = listener.accept().await?;

        let io = TokioIo::new(tcp);

        let engine = Arc::clone(&engine);

        tokio::task::spawn(async move {
            if let Err(err) = http1::Builder::new()
                .timer(TokioTimer::new())
                .serve_connection(
                    io,
                    service_fn(|request: Request<Incoming>| {
                        let engine = Arc::clone(&engine);
                        async move {
                            let response =
                                handle_request(request, engine, timeout, max_body_length).await;
                            Ok::<_, Infallible>(response)
                        }
                    }),
                )
                .await
            {
                warn!("error serving connection from {peer}: {err:?}");
            }
        });
    }
}
