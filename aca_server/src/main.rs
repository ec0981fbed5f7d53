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

use std::sync::Arc;

use aca_server::{create_engine, server, Args};
use clap::Parser;
use log::info;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    env_logger::init();

    let args = Args::parse();
    let engine = Arc::new(create_engine(&args)?);

    let listener = TcpListener::bind(args.socket_address()).await?;
    info!("attestation CA listening on {:?}", listener.local_addr()?);

    server::serve(listener, engine, args.request_timeout(), args.max_request_bytes).await
}
