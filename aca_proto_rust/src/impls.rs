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

use crate::aca::provisioner::v1::{
    CertificateResponse, DeviceInfo, IdentityClaim, IdentityClaimResponse, ResponseStatus,
};

impl IdentityClaimResponse {
    /// A response carrying the make-credential challenge.
    pub fn pass(credential_blob: Vec<u8>, pcr_mask: String) -> Self {
        let mut response = Self { credential_blob, pcr_mask, ..Default::default() };
        response.set_status(ResponseStatus::Pass);
        response
    }

    /// A denial: empty credential blob and no PCR mask.
    pub fn fail() -> Self {
        let mut response = Self::default();
        response.set_status(ResponseStatus::Fail);
        response
    }
}

impl CertificateResponse {
    pub fn pass(certificate: Vec<u8>, ldevid_certificate: Vec<u8>) -> Self {
        let mut response = Self { certificate, ldevid_certificate, ..Default::default() };
        response.set_status(ResponseStatus::Pass);
        response
    }

    pub fn fail() -> Self {
        let mut response = Self::default();
        response.set_status(ResponseStatus::Fail);
        response
    }
}

impl DeviceInfo {
    /// Network hostname reported by the device, empty if absent.
    pub fn hostname(&self) -> &str {
        self.nw.as_ref().map(|nw| nw.hostname.as_str()).unwrap_or_default()
    }
}

impl IdentityClaim {
    pub fn hostname(&self) -> &str {
        self.dv.as_ref().map(DeviceInfo::hostname).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use googletest::prelude::*;
    use prost::Message;

    use super::*;
    use crate::aca::provisioner::v1::NetworkInfo;

    #[googletest::test]
    fn test_fail_response_has_no_blob() {
        let response = IdentityClaimResponse::fail();
        assert_that!(response.status(), eq(ResponseStatus::Fail));
        assert_that!(response.credential_blob, is_empty());
        assert_that!(response.pcr_mask, eq(""));
    }

    #[googletest::test]
    fn test_certificate_response_decodes() {
        let response = CertificateResponse::pass(vec![0x30, 0x82], Vec::new());
        let decoded = CertificateResponse::decode(response.encode_to_vec().as_slice()).unwrap();
        assert_that!(decoded.status(), eq(ResponseStatus::Pass));
        assert_that!(decoded.certificate, eq(&vec![0x30, 0x82]));
    }

    #[googletest::test]
    fn test_claim_hostname() {
        let claim = IdentityClaim {
            dv: Some(DeviceInfo {
                nw: Some(NetworkInfo { hostname: "device-01".into(), ..Default::default() }),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_that!(claim.hostname(), eq("device-01"));
        assert_that!(IdentityClaim::default().hostname(), eq(""));
    }
}
