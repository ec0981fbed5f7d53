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

//! Reference repositories kept in process memory.

use std::{
    collections::HashMap,
    sync::{Mutex, PoisonError},
    time::SystemTime,
};

use anyhow::{anyhow, Context};
use log::debug;

use crate::{
    credential::{
        CertificateAuthorityCredential, Credential, CredentialId, EndorsementCredential,
        IssuedAttestationCertificate, PlatformCredential,
    },
    device::{Device, DeviceId, DeviceInfoReport},
    repository::{
        CredentialRepository, DeviceRepository, ReferenceManifest, RimKind, RimRepository,
    },
};

#[derive(Default)]
struct DeviceTable {
    next_id: DeviceId,
    devices: HashMap<String, Device>,
}

#[derive(Default)]
pub struct InMemoryDeviceRepository {
    table: Mutex<DeviceTable>,
}

impl DeviceRepository for InMemoryDeviceRepository {
    fn save_or_update(&self, report: DeviceInfoReport, now: SystemTime) -> anyhow::Result<Device> {
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        let name = report.hostname().to_string();
        let device = match table.devices.remove(&name) {
            Some(mut device) => {
                device.device_info = report;
                device.last_report_timestamp = now;
                device
            }
            None => {
                table.next_id += 1;
                debug!("registering new device {name}");
                Device { id: table.next_id, ..Device::new(report, now) }
            }
        };
        table.devices.insert(name, device.clone());
        Ok(device)
    }

    fn find_by_name(&self, name: &str) -> anyhow::Result<Option<Device>> {
        Ok(self.table.lock().unwrap_or_else(PoisonError::into_inner).devices.get(name).cloned())
    }

    fn update(&self, device: Device) -> anyhow::Result<Device> {
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        let stored = table
            .devices
            .get_mut(&device.name)
            .ok_or_else(|| anyhow!("device {} is not registered", device.name))?;
        *stored = device.clone();
        Ok(device)
    }
}

#[derive(Default)]
struct CredentialTable {
    next_id: CredentialId,
    credentials: Vec<Credential>,
}

impl CredentialTable {
    /// Returns the stored credential with the same kind and DER, or stores
    /// `credential`.
    fn store(&mut self, mut credential: Credential) -> Credential {
        if let Some(existing) = self
            .credentials
            .iter()
            .find(|stored| stored.kind() == credential.kind() && stored.der() == credential.der())
        {
            return existing.clone();
        }
        self.next_id += 1;
        credential.set_id(self.next_id);
        self.credentials.push(credential.clone());
        credential
    }

    fn platforms(&self) -> impl Iterator<Item = &PlatformCredential> {
        self.credentials.iter().filter_map(|credential| match credential {
            Credential::Platform(platform) if !platform.archived => Some(platform),
            _ => None,
        })
    }
}

/// Credential store holding every kind of [`Credential`] in one table.
#[derive(Default)]
pub struct InMemoryCredentialRepository {
    table: Mutex<CredentialTable>,
}

impl InMemoryCredentialRepository {
    /// Snapshot of all stored credentials, archived ones included.
    pub fn credentials(&self) -> Vec<Credential> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner).credentials.clone()
    }

    pub fn issued_certificates(&self) -> Vec<IssuedAttestationCertificate> {
        self.credentials()
            .into_iter()
            .filter_map(|credential| match credential {
                Credential::IssuedAttestation(certificate) => Some(certificate),
                _ => None,
            })
            .collect()
    }
}

impl CredentialRepository for InMemoryCredentialRepository {
    fn store_endorsement(
        &self,
        credential: EndorsementCredential,
    ) -> anyhow::Result<EndorsementCredential> {
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        match table.store(Credential::Endorsement(credential)) {
            Credential::Endorsement(stored) => Ok(stored),
            other => Err(anyhow!("stored credential turned into {:?}", other.kind())),
        }
    }

    fn store_platform(&self, credential: PlatformCredential) -> anyhow::Result<PlatformCredential> {
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        match table.store(Credential::Platform(credential)) {
            Credential::Platform(stored) => Ok(stored),
            other => Err(anyhow!("stored credential turned into {:?}", other.kind())),
        }
    }

    fn store_certificate_authority(
        &self,
        credential: CertificateAuthorityCredential,
    ) -> anyhow::Result<CertificateAuthorityCredential> {
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        match table.store(Credential::CertificateAuthority(credential)) {
            Credential::CertificateAuthority(stored) => Ok(stored),
            other => Err(anyhow!("stored credential turned into {:?}", other.kind())),
        }
    }

    fn find_endorsement_by_modulus(
        &self,
        modulus: &[u8],
    ) -> anyhow::Result<Option<EndorsementCredential>> {
        let table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(table.credentials.iter().find_map(|credential| match credential {
            Credential::Endorsement(endorsement)
                if !endorsement.archived && endorsement.public_key_modulus == modulus =>
            {
                Some(endorsement.clone())
            }
            _ => None,
        }))
    }

    fn find_platforms_by_holder_serial(
        &self,
        serial_number: &[u8],
    ) -> anyhow::Result<Vec<PlatformCredential>> {
        let table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(table
            .platforms()
            .filter(|platform| platform.holder_serial_number == serial_number)
            .cloned()
            .collect())
    }

    fn find_platforms_by_board_serial(
        &self,
        board_serial: &str,
    ) -> anyhow::Result<Vec<PlatformCredential>> {
        let table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(table
            .platforms()
            .filter(|platform| platform.platform_serial.as_deref() == Some(board_serial))
            .cloned()
            .collect())
    }

    fn find_latest_issued(
        &self,
        device_name: &str,
        ldevid: bool,
    ) -> anyhow::Result<Option<IssuedAttestationCertificate>> {
        let table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(table
            .credentials
            .iter()
            .filter_map(|credential| match credential {
                Credential::IssuedAttestation(certificate)
                    if !certificate.archived
                        && certificate.ldevid == ldevid
                        && certificate.device_name == device_name =>
                {
                    Some(certificate)
                }
                _ => None,
            })
            .max_by_key(|certificate| (certificate.not_before, certificate.id))
            .cloned())
    }

    fn save_issued(
        &self,
        certificate: IssuedAttestationCertificate,
    ) -> anyhow::Result<IssuedAttestationCertificate> {
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        for credential in table.credentials.iter_mut() {
            if let Credential::IssuedAttestation(previous) = credential {
                if previous.device_name == certificate.device_name
                    && previous.ldevid == certificate.ldevid
                {
                    previous.archived = true;
                }
            }
        }
        match table.store(Credential::IssuedAttestation(certificate)) {
            Credential::IssuedAttestation(stored) => Ok(stored),
            other => Err(anyhow!("stored credential turned into {:?}", other.kind())),
        }
    }

    fn archive(&self, id: CredentialId) -> anyhow::Result<()> {
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        table
            .credentials
            .iter_mut()
            .find(|credential| credential.id() == id)
            .with_context(|| format!("no credential with id {id}"))?
            .archive();
        Ok(())
    }
}

#[derive(Default)]
struct RimTable {
    next_id: u64,
    rims: Vec<ReferenceManifest>,
}

impl RimTable {
    fn find(&self, kind: RimKind, hash: &str) -> Option<ReferenceManifest> {
        self.rims.iter().find(|rim| rim.kind == kind && rim.hash == hash && !rim.archived).cloned()
    }

    fn save(&mut self, mut rim: ReferenceManifest, kind: RimKind) -> ReferenceManifest {
        self.next_id += 1;
        rim.id = self.next_id;
        rim.kind = kind;
        self.rims.push(rim.clone());
        rim
    }
}

#[derive(Default)]
pub struct InMemoryRimRepository {
    table: Mutex<RimTable>,
}

impl InMemoryRimRepository {
    pub fn manifests(&self) -> Vec<ReferenceManifest> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner).rims.clone()
    }
}

impl RimRepository for InMemoryRimRepository {
    fn find_base_by_hash(&self, hash: &str) -> anyhow::Result<Option<ReferenceManifest>> {
        Ok(self.table.lock().unwrap_or_else(PoisonError::into_inner).find(RimKind::Base, hash))
    }

    fn save_base(&self, rim: ReferenceManifest) -> anyhow::Result<ReferenceManifest> {
        Ok(self.table.lock().unwrap_or_else(PoisonError::into_inner).save(rim, RimKind::Base))
    }

    fn find_support_by_hash(&self, hash: &str) -> anyhow::Result<Option<ReferenceManifest>> {
        Ok(self.table.lock().unwrap_or_else(PoisonError::into_inner).find(RimKind::Support, hash))
    }

    fn save_support(&self, rim: ReferenceManifest) -> anyhow::Result<ReferenceManifest> {
        Ok(self.table.lock().unwrap_or_else(PoisonError::into_inner).save(rim, RimKind::Support))
    }

    fn archive_measurements_for_device(&self, device_name: &str) -> anyhow::Result<usize> {
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        let mut archived = 0;
        for rim in table.rims.iter_mut().filter(|rim| {
            rim.kind == RimKind::Measurement
                && !rim.archived
                && rim.device_name.as_deref() == Some(device_name)
        }) {
            rim.archived = true;
            archived += 1;
        }
        Ok(archived)
    }

    fn save_measurement(&self, rim: ReferenceManifest) -> anyhow::Result<ReferenceManifest> {
        Ok(self
            .table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .save(rim, RimKind::Measurement))
    }
}
