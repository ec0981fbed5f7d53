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

//! Persistence contracts the engine depends on. Each call must be atomic with
//! respect to its own key; no multi-entity transactions are needed.

use std::time::SystemTime;

#[cfg(test)]
use mockall::automock;

use crate::{
    credential::{
        CertificateAuthorityCredential, CredentialId, EndorsementCredential,
        IssuedAttestationCertificate, PlatformCredential,
    },
    device::{Device, DeviceInfoReport},
};

#[cfg_attr(test, automock)]
pub trait DeviceRepository: Send + Sync {
    /// Creates the device named by the report's hostname, or replaces the
    /// report of the existing one and bumps its last report timestamp.
    fn save_or_update(&self, report: DeviceInfoReport, now: SystemTime) -> anyhow::Result<Device>;

    fn find_by_name(&self, name: &str) -> anyhow::Result<Option<Device>>;

    fn update(&self, device: Device) -> anyhow::Result<Device>;
}

#[cfg_attr(test, automock)]
pub trait CredentialRepository: Send + Sync {
    /// Stores a parsed endorsement credential. Storing the same DER twice
    /// returns the existing record.
    fn store_endorsement(
        &self,
        credential: EndorsementCredential,
    ) -> anyhow::Result<EndorsementCredential>;

    /// Stores a parsed platform credential, idempotent on DER.
    fn store_platform(&self, credential: PlatformCredential) -> anyhow::Result<PlatformCredential>;

    fn store_certificate_authority(
        &self,
        credential: CertificateAuthorityCredential,
    ) -> anyhow::Result<CertificateAuthorityCredential>;

    fn find_endorsement_by_modulus(
        &self,
        modulus: &[u8],
    ) -> anyhow::Result<Option<EndorsementCredential>>;

    fn find_platforms_by_holder_serial(
        &self,
        serial_number: &[u8],
    ) -> anyhow::Result<Vec<PlatformCredential>>;

    fn find_platforms_by_board_serial(
        &self,
        board_serial: &str,
    ) -> anyhow::Result<Vec<PlatformCredential>>;

    /// Newest non-archived certificate issued to the device's AK, or to its
    /// LDevID key when `ldevid` is set.
    fn find_latest_issued(
        &self,
        device_name: &str,
        ldevid: bool,
    ) -> anyhow::Result<Option<IssuedAttestationCertificate>>;

    /// Persists a newly issued certificate. The certificate it supersedes is
    /// archived, not modified.
    fn save_issued(
        &self,
        certificate: IssuedAttestationCertificate,
    ) -> anyhow::Result<IssuedAttestationCertificate>;

    fn archive(&self, id: CredentialId) -> anyhow::Result<()>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RimKind {
    /// Base RIM, a SWID tag.
    Base,
    /// Support RIM, a TCG event log.
    Support,
    /// Live measurement log read from a device.
    Measurement,
}

/// A reference integrity manifest kept as opaque bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReferenceManifest {
    pub id: u64,
    pub kind: RimKind,
    pub content: Vec<u8>,
    pub hash: String,
    pub device_name: Option<String>,
    pub archived: bool,
}

#[cfg_attr(test, automock)]
pub trait RimRepository: Send + Sync {
    fn find_base_by_hash(&self, hash: &str) -> anyhow::Result<Option<ReferenceManifest>>;

    fn save_base(&self, rim: ReferenceManifest) -> anyhow::Result<ReferenceManifest>;

    fn find_support_by_hash(&self, hash: &str) -> anyhow::Result<Option<ReferenceManifest>>;

    fn save_support(&self, rim: ReferenceManifest) -> anyhow::Result<ReferenceManifest>;

    /// Archives the measurements of a device and returns how many there were.
    fn archive_measurements_for_device(&self, device_name: &str) -> anyhow::Result<usize>;

    fn save_measurement(&self, rim: ReferenceManifest) -> anyhow::Result<ReferenceManifest>;
}
