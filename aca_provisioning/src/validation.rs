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

//! The seam to the supply chain validation service.

use std::sync::atomic::{AtomicU64, Ordering};

#[cfg(test)]
use mockall::automock;

use crate::{
    credential::{EndorsementCredential, PlatformCredential},
    device::Device,
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AppraisalStatus {
    Pass,
    Fail,
    #[default]
    Unknown,
    Error,
}

/// Verdict of a validation run. Only the overall status is interpreted here.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SupplyChainValidationSummary {
    pub id: u64,
    pub overall_status: AppraisalStatus,
    pub message: String,
}

impl SupplyChainValidationSummary {
    pub fn passed(&self) -> bool {
        self.overall_status == AppraisalStatus::Pass
    }
}

/// Validates the credentials and firmware state of a device.
#[cfg_attr(test, automock)]
pub trait SupplyChainValidator: Send + Sync {
    /// Full validation performed before a challenge or TPM 1.2 certificate is
    /// issued.
    fn validate_supply_chain(
        &self,
        endorsement: Option<EndorsementCredential>,
        platforms: &[PlatformCredential],
        device: &Device,
    ) -> anyhow::Result<SupplyChainValidationSummary>;

    /// Quote only validation performed before a TPM 2.0 certificate is issued.
    /// `None` means no quote policy is configured.
    fn validate_quote(&self, device: &Device)
        -> anyhow::Result<Option<SupplyChainValidationSummary>>;
}

/// Built in validator: passes every device, or only devices that presented an
/// endorsement credential when `require_endorsement` is set. Has no quote
/// policy.
#[derive(Default)]
pub struct PolicyValidator {
    require_endorsement: bool,
    next_id: AtomicU64,
}

impl PolicyValidator {
    pub fn new(require_endorsement: bool) -> Self {
        Self { require_endorsement, next_id: AtomicU64::new(0) }
    }
}

impl SupplyChainValidator for PolicyValidator {
    fn validate_supply_chain(
        &self,
        endorsement: Option<EndorsementCredential>,
        _platforms: &[PlatformCredential],
        device: &Device,
    ) -> anyhow::Result<SupplyChainValidationSummary> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let summary = if self.require_endorsement && endorsement.is_none() {
            SupplyChainValidationSummary {
                id,
                overall_status: AppraisalStatus::Fail,
                message: format!("{} presented no endorsement credential", device.name),
            }
        } else {
            SupplyChainValidationSummary {
                id,
                overall_status: AppraisalStatus::Pass,
                message: String::new(),
            }
        };
        Ok(summary)
    }

    fn validate_quote(
        &self,
        _device: &Device,
    ) -> anyhow::Result<Option<SupplyChainValidationSummary>> {
        Ok(None)
    }
}
