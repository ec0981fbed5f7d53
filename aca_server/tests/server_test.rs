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

use std::{sync::Arc, time::Duration};

use aca_provisioning::ProtocolEngine;
use aca_server::{parse_private_key, server};
use googletest::prelude::*;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
};

const ACA_KEY: &str = include_str!("../../aca_provisioning/testdata/aca.pem");
const ACA_CERT: &[u8] = include_bytes!("../../aca_provisioning/testdata/aca_cert.der");

const MAX_BODY_LENGTH: usize = 64 * 1024;

async fn start_server_with_limit(
    max_body_length: usize,
) -> (std::net::SocketAddr, Arc<ProtocolEngine>) {
    let key = parse_private_key(ACA_KEY).unwrap();
    let engine = Arc::new(ProtocolEngine::builder(key, ACA_CERT).build().unwrap());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    tokio::spawn(server::serve(
        listener,
        Arc::clone(&engine),
        Duration::from_secs(10),
        max_body_length,
    ));
    (address, engine)
}

async fn start_server() -> (std::net::SocketAddr, Arc<ProtocolEngine>) {
    start_server_with_limit(MAX_BODY_LENGTH).await
}

/// Sends one request and returns the raw response.
async fn exchange(
    address: std::net::SocketAddr,
    method: &str,
    path: &str,
    body: &[u8],
) -> Vec<u8> {
    let mut stream = TcpStream::connect(address).await.unwrap();
    let head = format!(
        "{method} {path} HTTP/1.1\r\nHost: localhost\r\nContent-Length: {}\r\n\
         Connection: close\r\n\r\n",
        body.len()
    );
    stream.write_all(&[head.as_bytes(), body].concat()).await.unwrap();
    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    response
}

fn status_line(response: &[u8]) -> String {
    String::from_utf8_lossy(response).lines().next().unwrap_or_default().to_string()
}

#[tokio::test]
async fn test_public_key_is_served() {
    let (address, engine) = start_server().await;

    let response = exchange(address, "GET", server::PUBLIC_KEY_PATH, b"").await;

    assert_that!(status_line(&response), eq("HTTP/1.1 200 OK"));
    assert!(response.ends_with(&engine.public_key_der().unwrap()));
}

#[tokio::test]
async fn test_malformed_claim_is_bad_request() {
    let (address, _) = start_server().await;

    let response = exchange(address, "POST", server::IDENTITY_CLAIM_PATH, &[0xff, 0xff]).await;

    assert_that!(status_line(&response), eq("HTTP/1.1 400 Bad Request"));
}

#[tokio::test]
async fn test_unknown_nonce_is_server_error() {
    let (address, _) = start_server().await;

    // Field 1 (nonce), length 2.
    let request = [0x0au8, 0x02, 0x01, 0x02];
    let response = exchange(address, "POST", server::CERTIFICATE_REQUEST_PATH, &request).await;

    assert_that!(status_line(&response), eq("HTTP/1.1 500 Internal Server Error"));
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let (address, _) = start_server().await;

    let response = exchange(address, "GET", "/HIRS_AttestationCA/unknown", b"").await;

    assert_that!(status_line(&response), eq("HTTP/1.1 404 Not Found"));
}

#[tokio::test]
async fn test_oversized_body_is_refused() {
    let (address, _) = start_server_with_limit(64).await;

    let response = exchange(address, "POST", server::IDENTITY_CLAIM_PATH, &[0u8; 100]).await;

    assert_that!(status_line(&response), eq("HTTP/1.1 413 Payload Too Large"));
}
