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

//! Reference integrity manifests attached to TPM 2.0 identity claims.

use aca_proto_rust::aca::provisioner::v1::DeviceInfo;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use log::{debug, info};
use sha2::{Digest, Sha256};

use crate::repository::{ReferenceManifest, RimKind, RimRepository};

/// What happened to the attachments of one claim.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RimSummary {
    pub base_saved: usize,
    pub support_saved: usize,
    pub duplicates: usize,
    pub measurement_saved: bool,
}

/// Base RIMs are keyed by the base64 encoded SHA-256 of their content.
pub fn base_rim_hash(content: &[u8]) -> String {
    STANDARD.encode(Sha256::digest(content))
}

/// Support RIMs are keyed by the hex encoded SHA-256 of their content.
pub fn support_rim_hash(content: &[u8]) -> String {
    hex::encode(Sha256::digest(content))
}

fn manifest(kind: RimKind, content: &[u8], hash: String, device_name: &str) -> ReferenceManifest {
    ReferenceManifest {
        id: 0,
        kind,
        content: content.to_vec(),
        hash,
        device_name: Some(device_name.to_string()),
        archived: false,
    }
}

/// Stores the SWID tags, event logs and live measurement log of a claim.
/// Already known SWID tags and event logs are skipped. A new live log
/// archives the previous measurement of the device.
pub fn process_rims(
    repository: &dyn RimRepository,
    device_name: &str,
    info: &DeviceInfo,
) -> anyhow::Result<RimSummary> {
    let mut summary = RimSummary::default();

    for swid in info.swidfile.iter().filter(|swid| !swid.is_empty()) {
        let hash = base_rim_hash(swid);
        if repository.find_base_by_hash(&hash)?.is_some() {
            debug!("base RIM {hash} is already stored");
            summary.duplicates += 1;
            continue;
        }
        repository.save_base(manifest(RimKind::Base, swid, hash, device_name))?;
        summary.base_saved += 1;
    }

    for log in info.logfile.iter().filter(|log| !log.is_empty()) {
        let hash = support_rim_hash(log);
        if repository.find_support_by_hash(&hash)?.is_some() {
            debug!("support RIM {hash} is already stored");
            summary.duplicates += 1;
            continue;
        }
        repository.save_support(manifest(RimKind::Support, log, hash, device_name))?;
        summary.support_saved += 1;
    }

    if !info.livelog.is_empty() {
        let archived = repository.archive_measurements_for_device(device_name)?;
        if archived > 0 {
            debug!("archived {archived} previous measurements of {device_name}");
        }
        let hash = support_rim_hash(&info.livelog);
        repository.save_measurement(manifest(
            RimKind::Measurement,
            &info.livelog,
            hash,
            device_name,
        ))?;
        summary.measurement_saved = true;
    }

    if summary != RimSummary::default() {
        info!(
            "{device_name}: stored {} base and {} support RIMs, skipped {} duplicates",
            summary.base_saved, summary.support_saved, summary.duplicates
        );
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use googletest::prelude::*;

    use super::*;
    use crate::{memory::InMemoryRimRepository, repository::MockRimRepository};

    fn info() -> DeviceInfo {
        DeviceInfo {
            swidfile: vec![b"<SoftwareIdentity/>".to_vec()],
            logfile: vec![b"event log".to_vec(), b"event log".to_vec()],
            livelog: b"live".to_vec(),
            ..Default::default()
        }
    }

    #[googletest::test]
    fn test_rim_hashes() {
        assert_that!(base_rim_hash(b"abc"), eq("ungWv48Bz+pBQUDeXa4iI7ADYaOWF3qctBD/YfIAFa0="));
        assert_that!(
            support_rim_hash(b"abc"),
            eq("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad")
        );
    }

    #[googletest::test]
    fn test_attachments_are_deduplicated() {
        let repository = InMemoryRimRepository::default();

        let first = process_rims(&repository, "node-1", &info()).unwrap();
        let second = process_rims(&repository, "node-1", &info()).unwrap();

        assert_that!(
            first,
            eq(RimSummary { base_saved: 1, support_saved: 1, duplicates: 1, measurement_saved: true })
        );
        assert_that!(
            second,
            eq(RimSummary { base_saved: 0, support_saved: 0, duplicates: 3, measurement_saved: true })
        );
        let manifests = repository.manifests();
        let live: Vec<_> = manifests.iter().filter(|rim| rim.kind == RimKind::Measurement).collect();
        assert_that!(live, len(eq(2)));
        assert_that!(live.iter().filter(|rim| rim.archived).count(), eq(1));
    }

    #[googletest::test]
    fn test_no_attachments_touches_nothing() {
        let repository = MockRimRepository::new();
        let summary = process_rims(&repository, "node-1", &DeviceInfo::default()).unwrap();
        assert_that!(summary, eq(RimSummary::default()));
    }

    #[googletest::test]
    fn test_repository_failure_propagates() {
        let mut repository = MockRimRepository::new();
        repository
            .expect_find_base_by_hash()
            .times(1)
            .returning(|_| Err(anyhow::anyhow!("database is down")));
        assert_that!(process_rims(&repository, "node-1", &info()), err(anything()));
    }
}
