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

use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::PathBuf,
    sync::Arc,
    time::Duration,
};

use aca_provisioning::{
    issuer::certificate_der, EngineConfig, PolicyValidator, ProtobufLogPolicy, ProtocolEngine,
    ProvisioningPolicy,
};
use anyhow::Context;
use clap::Parser;
use rsa::{pkcs1::DecodeRsaPrivateKey, pkcs8::DecodePrivateKey, RsaPrivateKey};

pub mod server;

#[derive(Parser, Debug)]
pub struct Args {
    #[arg(long, default_value_t = 8443)]
    pub port: u16,
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub listen_address: IpAddr,
    /// PEM encoded RSA private key of the CA, PKCS#8 or PKCS#1.
    #[arg(long, required = true, value_parser = path_exists,)]
    pub aca_key: PathBuf,
    /// PEM or DER encoded certificate of the CA key.
    #[arg(long, required = true, value_parser = path_exists,)]
    pub aca_certificate: PathBuf,
    #[arg(long, default_value_t = 3652)]
    pub validity_days: u32,
    #[arg(long, default_value_t = 300)]
    pub nonce_ttl_seconds: u64,
    #[arg(long, default_value_t = 30)]
    pub reissue_threshold_days: i64,
    #[arg(long)]
    pub ignore_ima_pcr: bool,
    #[arg(long)]
    pub generate_on_expiration: bool,
    #[arg(long)]
    pub disable_issuance: bool,
    #[arg(long, default_value_t = 30)]
    pub ldevid_reissue_threshold_days: i64,
    #[arg(long)]
    pub ldevid_generate_on_expiration: bool,
    #[arg(long)]
    pub disable_ldevid_issuance: bool,
    /// Deny devices that present no endorsement credential.
    #[arg(long)]
    pub require_endorsement: bool,
    #[arg(long, default_value = "never")]
    pub protobuf_log: ProtobufLogPolicy,
    /// Largest accepted request body. Claims carry event logs and reference
    /// manifests, so this is well above the size of the bare messages.
    #[arg(long, default_value_t = 4 * 1024 * 1024)]
    pub max_request_bytes: usize,
    /// Upper bound on a single handshake, including the validation call.
    #[arg(long, default_value_t = 30)]
    pub request_timeout_seconds: u64,
}

impl Args {
    pub fn socket_address(&self) -> SocketAddr {
        SocketAddr::new(self.listen_address, self.port)
    }

    pub fn policy(&self) -> ProvisioningPolicy {
        ProvisioningPolicy {
            issue_attestation_certificate: !self.disable_issuance,
            generate_on_expiration: self.generate_on_expiration,
            reissue_threshold_days: self.reissue_threshold_days,
            issue_ldevid_certificate: !self.disable_ldevid_issuance,
            ldevid_generate_on_expiration: self.ldevid_generate_on_expiration,
            ldevid_reissue_threshold_days: self.ldevid_reissue_threshold_days,
            ignore_ima_pcr: self.ignore_ima_pcr,
            protobuf_log: self.protobuf_log,
        }
    }

    pub fn config(&self) -> EngineConfig {
        EngineConfig {
            valid_days: self.validity_days,
            nonce_ttl: Duration::from_secs(self.nonce_ttl_seconds),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

pub fn path_exists(s: &str) -> Result<PathBuf, String> {
    let path = PathBuf::from(s);
    if !std::fs::metadata(s).map_err(|err| err.to_string())?.is_file() {
        Err(String::from("path does not represent a file"))
    } else {
        Ok(path)
    }
}

pub fn parse_private_key(pem: &str) -> anyhow::Result<RsaPrivateKey> {
    RsaPrivateKey::from_pkcs8_pem(pem)
        .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
        .context("couldn't parse the CA private key as PKCS#8 or PKCS#1 PEM")
}

/// Loads the CA material named in `args` and assembles an engine backed by
/// the in-memory repositories.
pub fn create_engine(args: &Args) -> anyhow::Result<ProtocolEngine> {
    let key = std::fs::read_to_string(&args.aca_key)
        .with_context(|| format!("couldn't read {}", args.aca_key.display()))?;
    let certificate = std::fs::read(&args.aca_certificate)
        .with_context(|| format!("couldn't read {}", args.aca_certificate.display()))?;

    ProtocolEngine::builder(parse_private_key(&key)?, &certificate_der(&certificate)?)
        .set_validator(Arc::new(PolicyValidator::new(args.require_endorsement)))
        .set_policy(args.policy())
        .set_config(args.config())
        .build()
        .context("couldn't create the protocol engine")
}
