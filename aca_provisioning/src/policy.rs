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

//! Knobs of the provisioning flows.

use std::{str::FromStr, time::Duration};

/// Number of PCRs a TPM 2.0 client is asked to quote.
pub const PCR_COUNT: u32 = 24;

/// PCR that carries IMA measurements. Excluded from the mask when IMA
/// measurements are ignored.
pub const IMA_PCR: u32 = 10;

/// When request and response protobufs of TPM 2.0 calls are logged.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ProtobufLogPolicy {
    #[default]
    Never,
    Always,
    OnFailure,
}

impl ProtobufLogPolicy {
    pub fn should_log(&self, failed: bool) -> bool {
        match self {
            ProtobufLogPolicy::Never => false,
            ProtobufLogPolicy::Always => true,
            ProtobufLogPolicy::OnFailure => failed,
        }
    }
}

impl FromStr for ProtobufLogPolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().replace('_', "-").as_str() {
            "never" => Ok(ProtobufLogPolicy::Never),
            "always" => Ok(ProtobufLogPolicy::Always),
            "on-failure" => Ok(ProtobufLogPolicy::OnFailure),
            other => Err(format!("unknown protobuf log policy {other:?}")),
        }
    }
}

/// Switches that mirror the CA's policy settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProvisioningPolicy {
    /// Global switch for issuing attestation certificates.
    pub issue_attestation_certificate: bool,
    /// Reissue only when the current certificate is about to expire.
    pub generate_on_expiration: bool,
    /// Remaining validity, in days, below which a certificate is reissued.
    pub reissue_threshold_days: i64,
    /// Global switch for issuing LDevID certificates.
    pub issue_ldevid_certificate: bool,
    pub ldevid_generate_on_expiration: bool,
    pub ldevid_reissue_threshold_days: i64,
    /// Drop the IMA PCR from the quote mask.
    pub ignore_ima_pcr: bool,
    pub protobuf_log: ProtobufLogPolicy,
}

impl Default for ProvisioningPolicy {
    fn default() -> Self {
        Self {
            issue_attestation_certificate: true,
            generate_on_expiration: false,
            reissue_threshold_days: 30,
            issue_ldevid_certificate: true,
            ldevid_generate_on_expiration: false,
            ldevid_reissue_threshold_days: 30,
            ignore_ima_pcr: false,
            protobuf_log: ProtobufLogPolicy::default(),
        }
    }
}

impl ProvisioningPolicy {
    /// Comma separated PCR indices the client must quote.
    pub fn pcr_mask(&self) -> String {
        (0..PCR_COUNT)
            .filter(|pcr| !(self.ignore_ima_pcr && *pcr == IMA_PCR))
            .map(|pcr| pcr.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Engine settings that aren't policy decisions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    /// Validity of issued certificates.
    pub valid_days: u32,
    /// How long a TPM 2.0 challenge stays redeemable.
    pub nonce_ttl: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { valid_days: 3652, nonce_ttl: Duration::from_secs(300) }
    }
}
