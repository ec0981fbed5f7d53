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

//! The three provisioning handshakes of the attestation CA.
//!
//! Each call runs one handshake to completion on the caller's thread:
//!
//! ```text
//! Received -> CredentialsExtracted -> DeviceRegistered -> Validated(status)
//!          -> ChallengeIssued | CertificateIssued | Denied
//! ```
//!
//! A FAIL verdict is not an error. It produces a denial response: a FAIL
//! status for TPM 2.0 and an empty body for TPM 1.2.

use std::{fmt::Debug, sync::Arc, time::SystemTime};

use aca_crypto::{
    envelope::EnvelopeCrypto,
    make_credential::make_credential,
    public_key::{
        parse_rsa_public_area, rsa_public_key_from_hex_modulus, rsa_public_key_from_modulus,
    },
    tpm12::{
        IdentityProof, IdentityRequestEnvelope, IdentityResponseEnvelope, SymmetricAttestation,
        SymmetricKeyParams, TpmStruct, TPM_ALG_AES128, TPM_ES_SYM_CBC_PKCS5PAD,
    },
    CryptoBackend, CryptoError, OsCryptoBackend,
};
use aca_proto_rust::aca::provisioner::v1::{
    CertificateRequest, CertificateResponse, DeviceInfo, IdentityClaim, IdentityClaimResponse,
};
use log::{debug, error, info, warn};
use prost::Message;
use rsa::{traits::PublicKeyParts, RsaPrivateKey, RsaPublicKey};

use crate::{
    clock::{Clock, SystemTimeClock},
    credential::{EndorsementCredential, IssuedAttestationCertificate, PlatformCredential},
    device::{Device, DeviceInfoReport},
    error::ProvisioningError,
    issuer::{should_reissue, CertificateIssuer, IssuedCertificate},
    memory::{InMemoryCredentialRepository, InMemoryDeviceRepository, InMemoryRimRepository},
    nonce_store::{InMemoryNonceStore, NonceStore},
    policy::{EngineConfig, ProvisioningPolicy},
    quote::TpmQuote,
    repository::{CredentialRepository, DeviceRepository, RimRepository},
    rim::process_rims,
    validation::{
        AppraisalStatus, PolicyValidator, SupplyChainValidationSummary, SupplyChainValidator,
    },
};

/// Length of the secret protected by a TPM 2.0 challenge.
pub const NONCE_LENGTH: usize = 20;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandshakeState {
    Received,
    CredentialsExtracted,
    DeviceRegistered,
    Validated(AppraisalStatus),
    ChallengeIssued,
    CertificateIssued,
    Denied,
}

/// Request scoped progress of one handshake.
struct Handshake {
    flow: &'static str,
    state: HandshakeState,
}

impl Handshake {
    fn new(flow: &'static str) -> Self {
        debug!("{flow}: {:?}", HandshakeState::Received);
        Self { flow, state: HandshakeState::Received }
    }

    fn advance(&mut self, next: HandshakeState) {
        debug!("{}: {:?} -> {next:?}", self.flow, self.state);
        self.state = next;
    }
}

/// Endorsement and platform credentials a handshake is evaluated against.
#[derive(Default)]
struct Credentials {
    endorsement: Option<EndorsementCredential>,
    platforms: Vec<PlatformCredential>,
}

pub struct ProtocolEngine {
    envelope: EnvelopeCrypto,
    issuer: CertificateIssuer,
    backend: Arc<dyn CryptoBackend>,
    devices: Arc<dyn DeviceRepository>,
    credentials: Arc<dyn CredentialRepository>,
    rims: Arc<dyn RimRepository>,
    validator: Arc<dyn SupplyChainValidator>,
    nonces: Arc<dyn NonceStore>,
    clock: Arc<dyn Clock>,
    policy: ProvisioningPolicy,
    config: EngineConfig,
}

impl ProtocolEngine {
    /// Starts assembling an engine around the CA key and its certificate.
    /// Every collaborator defaults to the in-process implementation.
    pub fn builder(private_key: RsaPrivateKey, certificate_der: &[u8]) -> ProtocolEngineBuilder {
        ProtocolEngineBuilder::new(private_key, certificate_der)
    }

    /// DER SubjectPublicKeyInfo of the CA key.
    pub fn public_key_der(&self) -> Result<Vec<u8>, ProvisioningError> {
        self.issuer.public_key_der()
    }

    pub fn policy(&self) -> &ProvisioningPolicy {
        &self.policy
    }

    /// Phase 1 of TPM 2.0 provisioning. Takes an encoded `IdentityClaim` and
    /// returns an encoded `IdentityClaimResponse`.
    pub fn process_identity_claim_tpm2(
        &self,
        request: &[u8],
    ) -> Result<Vec<u8>, ProvisioningError> {
        let mut handshake = Handshake::new("identity claim");
        let result = self.handle_identity_claim(request, &mut handshake);
        finish(&handshake, result)
    }

    /// Phase 2 of TPM 2.0 provisioning. Takes an encoded `CertificateRequest`
    /// and returns an encoded `CertificateResponse`.
    pub fn process_certificate_request(
        &self,
        request: &[u8],
    ) -> Result<Vec<u8>, ProvisioningError> {
        let mut handshake = Handshake::new("certificate request");
        let result = self.handle_certificate_request(request, &mut handshake);
        finish(&handshake, result)
    }

    /// TPM 1.2 provisioning. Takes an identity request envelope and returns
    /// an identity response envelope, or no bytes when the device is denied.
    pub fn process_identity_request(&self, request: &[u8]) -> Result<Vec<u8>, ProvisioningError> {
        let mut handshake = Handshake::new("identity request");
        let result = self.handle_identity_request(request, &mut handshake);
        finish(&handshake, result)
    }

    fn handle_identity_claim(
        &self,
        request: &[u8],
        handshake: &mut Handshake,
    ) -> Result<Vec<u8>, ProvisioningError> {
        if request.is_empty() {
            return Err(ProvisioningError::Input("empty identity claim".to_string()));
        }
        let claim = IdentityClaim::decode(request).map_err(|err| {
            ProvisioningError::Input(format!("couldn't decode identity claim: {err}"))
        })?;
        let info = claim.dv.clone().unwrap_or_default();
        let now = self.clock.now();

        let ek = parse_public_area(&claim.ek_public_area, "EK")?;
        let ak = parse_public_area(&claim.ak_public_area, "AK")?;
        let credentials = self.resolve_credentials(
            &[claim.endorsement_credential.as_deref().unwrap_or_default()],
            &claim.platform_credential,
            Some(&ek),
            true,
        )?;
        handshake.advance(HandshakeState::CredentialsExtracted);

        let report =
            DeviceInfoReport::from_proto(&info, &claim.client_version, &claim.paccor_output)?;
        let device = self.register_device(report, now)?;
        let rims = process_rims(self.rims.as_ref(), &device.name, &info)?;
        debug!("reference manifests of {}: {rims:?}", device.name);
        handshake.advance(HandshakeState::DeviceRegistered);

        let (device, summary) = self.validate_supply_chain(&credentials, device)?;
        handshake.advance(HandshakeState::Validated(summary.overall_status));

        let response = if summary.passed() {
            let nonce = self.backend.random_bytes(NONCE_LENGTH);
            let blob = make_credential(self.backend.as_ref(), &ek, &ak, &nonce).inspect_err(
                |err| error!("couldn't build credential blob for {}: {err:?}", device.name),
            )?;
            self.nonces.insert(nonce, request.to_vec(), now, self.config.nonce_ttl)?;
            handshake.advance(HandshakeState::ChallengeIssued);
            IdentityClaimResponse::pass(blob.into_vec(), self.policy.pcr_mask())
        } else {
            handshake.advance(HandshakeState::Denied);
            IdentityClaimResponse::fail()
        };

        self.log_protobufs(handshake.flow, &claim, Some(&response), !summary.passed());
        Ok(response.encode_to_vec())
    }

    fn handle_certificate_request(
        &self,
        request: &[u8],
        handshake: &mut Handshake,
    ) -> Result<Vec<u8>, ProvisioningError> {
        if request.is_empty() {
            return Err(ProvisioningError::Input("empty certificate request".to_string()));
        }
        let request = CertificateRequest::decode(request).map_err(|err| {
            ProvisioningError::Input(format!("couldn't decode certificate request: {err}"))
        })?;
        if request.nonce.is_empty() {
            return Err(ProvisioningError::Input("certificate request without nonce".to_string()));
        }
        let now = self.clock.now();

        let claim = match self.nonces.take(&request.nonce, now) {
            Ok(claim) => claim,
            Err(err) => {
                warn!("couldn't resolve certificate request: {err}");
                self.log_protobufs(handshake.flow, &request, None::<&CertificateResponse>, true);
                return Err(err);
            }
        };
        let claim = IdentityClaim::decode(claim.as_slice()).map_err(|err| {
            ProvisioningError::Processing(format!("couldn't decode pending identity claim: {err}"))
        })?;

        let ek = parse_public_area(&claim.ek_public_area, "EK")?;
        let ak = parse_public_area(&claim.ak_public_area, "AK")?;
        let credentials = self.resolve_credentials(
            &[claim.endorsement_credential.as_deref().unwrap_or_default()],
            &claim.platform_credential,
            Some(&ek),
            true,
        )?;
        handshake.advance(HandshakeState::CredentialsExtracted);

        let device_name = claim.hostname();
        let mut device = self.devices.find_by_name(device_name)?.ok_or_else(|| {
            ProvisioningError::Processing(format!("device {device_name:?} is not registered"))
        })?;
        if !request.quote.is_empty() {
            match TpmQuote::parse(&request.quote) {
                Some(quote) => {
                    device = self.devices.save_or_update(device.device_info.with_quote(quote), now)?
                }
                None => warn!("ignoring malformed quote from {device_name}"),
            }
        }
        handshake.advance(HandshakeState::DeviceRegistered);

        // No quote policy means there is nothing to fail.
        let status = match self.validator.validate_quote(&device)? {
            Some(summary) => summary.overall_status,
            None => AppraisalStatus::Pass,
        };
        handshake.advance(HandshakeState::Validated(status));

        let response = if status == AppraisalStatus::Pass {
            let certificate = self.issue_if_due(&ak, &credentials, device_name, false, now)?;
            let ldevid_certificate = match claim.ldevid_public_area.as_deref() {
                Some(area) if !area.is_empty() => {
                    let ldevid = parse_public_area(area, "LDevID")?;
                    self.issue_if_due(&ldevid, &credentials, device_name, true, now)?
                }
                _ => Vec::new(),
            };
            handshake.advance(HandshakeState::CertificateIssued);
            CertificateResponse::pass(certificate, ldevid_certificate)
        } else {
            info!("quote validation of {device_name} failed");
            handshake.advance(HandshakeState::Denied);
            CertificateResponse::fail()
        };

        self.log_protobufs(
            handshake.flow,
            &request,
            Some(&response),
            status != AppraisalStatus::Pass,
        );
        Ok(response.encode_to_vec())
    }

    fn handle_identity_request(
        &self,
        request: &[u8],
        handshake: &mut Handshake,
    ) -> Result<Vec<u8>, ProvisioningError> {
        if request.is_empty() {
            return Err(ProvisioningError::Input("empty identity request".to_string()));
        }
        let envelope = IdentityRequestEnvelope::decode(request).map_err(|err| match err {
            CryptoError::Malformed(message) => {
                ProvisioningError::Input(format!("malformed identity request: {message}"))
            }
            other => other.into(),
        })?;
        let now = self.clock.now();

        let proof = self
            .envelope
            .unwrap(&envelope.request)
            .and_then(|proof| IdentityProof::decode(&proof))
            .inspect_err(|err| error!("couldn't unwrap identity request: {err:?}"))?;

        let ek = if envelope.endorsement_credential_modulus.is_empty() {
            None
        } else {
            Some(rsa_public_key_from_hex_modulus(&envelope.endorsement_credential_modulus).map_err(
                |err| ProvisioningError::Input(format!("malformed EK modulus: {err}")),
            )?)
        };
        let platform_ders: Vec<Vec<u8>> =
            [&envelope.platform_credential, &proof.platform_credential]
                .into_iter()
                .find(|der| !der.is_empty())
                .cloned()
                .into_iter()
                .collect();
        let credentials = self.resolve_credentials(
            &[envelope.endorsement_credential.as_slice(), proof.endorsement_credential.as_slice()],
            &platform_ders,
            ek.as_ref(),
            false,
        )?;
        // The response is sealed to the certified key whenever there is one.
        let ek = match (ek, &credentials.endorsement) {
            (Some(ek), Some(endorsement))
                if ek.n().to_bytes_be() != endorsement.public_key_modulus =>
            {
                return Err(ProvisioningError::Input(
                    "EK modulus doesn't match the endorsement credential".to_string(),
                ));
            }
            (_, Some(endorsement)) => endorsement.public_key()?,
            (Some(ek), None) => ek,
            (None, None) => {
                return Err(ProvisioningError::Input(
                    "identity request carries no endorsement key".to_string(),
                ))
            }
        };
        handshake.advance(HandshakeState::CredentialsExtracted);

        let info = DeviceInfo::decode(envelope.device_info_report.as_slice()).map_err(|err| {
            ProvisioningError::Input(format!("couldn't decode device info report: {err}"))
        })?;
        let device = self.register_device(DeviceInfoReport::from_proto(&info, "", "")?, now)?;
        handshake.advance(HandshakeState::DeviceRegistered);

        let (device, summary) = self.validate_supply_chain(&credentials, device)?;
        handshake.advance(HandshakeState::Validated(summary.overall_status));
        if !summary.passed() {
            handshake.advance(HandshakeState::Denied);
            return Ok(Vec::new());
        }

        let identity_key = rsa_public_key_from_modulus(&proof.identity_key.key)?;
        let issued = self.sign(&identity_key, &credentials, &device.name, now)?;

        let session_key = self.envelope.generate_session_key();
        let (asymmetric_contents, credential) = self
            .envelope
            .seal_attestation(&issued.der, &session_key.key)
            .and_then(|credential| {
                let asymmetric_contents = self.envelope.seal_asymmetric(
                    &proof.identity_key.encode(),
                    &session_key.encode(),
                    &ek,
                )?;
                Ok((asymmetric_contents, credential))
            })
            .inspect_err(|err| error!("couldn't seal identity response: {err:?}"))?;
        self.persist(&issued, &credentials, &device.name, false)?;
        handshake.advance(HandshakeState::CertificateIssued);

        Ok(IdentityResponseEnvelope {
            asymmetric_contents,
            symmetric_attestation: SymmetricAttestation {
                algorithm: SymmetricKeyParams {
                    algorithm_id: TPM_ALG_AES128,
                    encryption_scheme: TPM_ES_SYM_CBC_PKCS5PAD,
                    signature_scheme: 0,
                    sub_params: None,
                },
                credential,
            },
        }
        .encode())
    }

    /// Uses the first non-empty endorsement credential, falling back to a
    /// lookup by the endorsement key. Platform credentials supplied by the
    /// device win over stored ones, which are looked up by holder. With
    /// `widen`, a single platform credential pulls in the others issued for
    /// the same board.
    fn resolve_credentials(
        &self,
        endorsement_ders: &[&[u8]],
        platform_ders: &[Vec<u8>],
        ek: Option<&RsaPublicKey>,
        widen: bool,
    ) -> Result<Credentials, ProvisioningError> {
        let endorsement = match endorsement_ders.iter().find(|der| !der.is_empty()) {
            Some(der) => {
                Some(self.credentials.store_endorsement(EndorsementCredential::from_der(der)?)?)
            }
            None => match ek {
                Some(ek) => self.credentials.find_endorsement_by_modulus(&ek.n().to_bytes_be())?,
                None => None,
            },
        };

        let mut platforms = Vec::new();
        for der in platform_ders.iter().filter(|der| !der.is_empty()) {
            platforms.push(self.credentials.store_platform(PlatformCredential::from_der(der)?)?);
        }
        if platforms.is_empty() {
            if let Some(endorsement) = &endorsement {
                platforms =
                    self.credentials.find_platforms_by_holder_serial(&endorsement.serial_number)?;
            }
        }
        if widen && platforms.len() == 1 {
            if let Some(board_serial) = platforms[0].platform_serial.clone() {
                for platform in self.credentials.find_platforms_by_board_serial(&board_serial)? {
                    if platforms.iter().all(|known| known.id != platform.id) {
                        platforms.push(platform);
                    }
                }
            }
        }

        debug!(
            "resolved {} endorsement and {} platform credentials",
            usize::from(endorsement.is_some()),
            platforms.len()
        );
        Ok(Credentials { endorsement, platforms })
    }

    fn register_device(
        &self,
        report: DeviceInfoReport,
        now: SystemTime,
    ) -> Result<Device, ProvisioningError> {
        if report.hostname().is_empty() {
            return Err(ProvisioningError::Input("device info has no hostname".to_string()));
        }
        Ok(self.devices.save_or_update(report, now)?)
    }

    /// Asks for the full supply chain verdict and records it on the device.
    fn validate_supply_chain(
        &self,
        credentials: &Credentials,
        mut device: Device,
    ) -> Result<(Device, SupplyChainValidationSummary), ProvisioningError> {
        let summary = self.validator.validate_supply_chain(
            credentials.endorsement.clone(),
            &credentials.platforms,
            &device,
        )?;
        device.supply_chain_status = summary.overall_status;
        device.summary_id = Some(summary.id);
        let device = self.devices.update(device)?;
        if !summary.passed() {
            info!(
                "supply chain validation of {} returned {:?}: {}",
                device.name, summary.overall_status, summary.message
            );
        }
        Ok((device, summary))
    }

    /// Issues and persists a certificate unless the current one is still
    /// good. Returns the DER, or nothing when no certificate was issued.
    fn issue_if_due(
        &self,
        key: &RsaPublicKey,
        credentials: &Credentials,
        device_name: &str,
        ldevid: bool,
        now: SystemTime,
    ) -> Result<Vec<u8>, ProvisioningError> {
        let existing = self.credentials.find_latest_issued(device_name, ldevid)?;
        if !should_reissue(existing.as_ref(), &self.policy, ldevid, now) {
            info!("keeping the current certificate of {device_name} (ldevid: {ldevid})");
            return Ok(Vec::new());
        }
        let issued = self.sign(key, credentials, device_name, now)?;
        self.persist(&issued, credentials, device_name, ldevid)?;
        Ok(issued.der)
    }

    fn sign(
        &self,
        key: &RsaPublicKey,
        credentials: &Credentials,
        device_name: &str,
        now: SystemTime,
    ) -> Result<IssuedCertificate, ProvisioningError> {
        self.issuer
            .issue(
                key,
                credentials.endorsement.as_ref(),
                &credentials.platforms,
                device_name,
                self.config.valid_days,
                now,
            )
            .inspect_err(|err| error!("couldn't issue certificate for {device_name}: {err:?}"))
    }

    fn persist(
        &self,
        issued: &IssuedCertificate,
        credentials: &Credentials,
        device_name: &str,
        ldevid: bool,
    ) -> Result<IssuedAttestationCertificate, ProvisioningError> {
        let saved = self.credentials.save_issued(IssuedAttestationCertificate {
            id: 0,
            der: issued.der.clone(),
            serial_number: issued.serial_number,
            not_before: issued.not_before,
            not_after: issued.not_after,
            device_name: device_name.to_string(),
            endorsement_credential: credentials.endorsement.as_ref().map(|ek| ek.id),
            platform_credentials: credentials.platforms.iter().map(|pc| pc.id).collect(),
            ldevid,
            archived: false,
        })?;
        info!(
            "issued {} certificate {} to {device_name}",
            if ldevid { "LDevID" } else { "attestation" },
            saved.serial_number
        );
        Ok(saved)
    }

    fn log_protobufs<Req: Debug, Resp: Debug>(
        &self,
        flow: &str,
        request: &Req,
        response: Option<&Resp>,
        failed: bool,
    ) {
        if !self.policy.protobuf_log.should_log(failed) {
            return;
        }
        info!("{flow} request: {request:?}");
        match response {
            Some(response) => info!("{flow} response: {response:?}"),
            None => info!("{flow} produced no response"),
        }
    }
}

fn parse_public_area(area: &[u8], which: &str) -> Result<RsaPublicKey, ProvisioningError> {
    parse_rsa_public_area(area)
        .map_err(|err| ProvisioningError::Input(format!("malformed {which} public area: {err}")))
}

fn finish(
    handshake: &Handshake,
    result: Result<Vec<u8>, ProvisioningError>,
) -> Result<Vec<u8>, ProvisioningError> {
    match &result {
        Ok(_) => debug!("{} finished in {:?}", handshake.flow, handshake.state),
        Err(err) if err.is_client_error() => {
            warn!("{} rejected in {:?}: {err}", handshake.flow, handshake.state)
        }
        Err(err) => error!("{} failed in {:?}: {err:#}", handshake.flow, handshake.state),
    }
    result
}

pub struct ProtocolEngineBuilder {
    private_key: RsaPrivateKey,
    certificate_der: Vec<u8>,
    backend: Arc<dyn CryptoBackend>,
    devices: Arc<dyn DeviceRepository>,
    credentials: Arc<dyn CredentialRepository>,
    rims: Arc<dyn RimRepository>,
    validator: Arc<dyn SupplyChainValidator>,
    nonces: Arc<dyn NonceStore>,
    clock: Arc<dyn Clock>,
    policy: ProvisioningPolicy,
    config: EngineConfig,
}

impl ProtocolEngineBuilder {
    fn new(private_key: RsaPrivateKey, certificate_der: &[u8]) -> Self {
        Self {
            private_key,
            certificate_der: certificate_der.to_vec(),
            backend: Arc::new(OsCryptoBackend),
            devices: Arc::new(InMemoryDeviceRepository::default()),
            credentials: Arc::new(InMemoryCredentialRepository::default()),
            rims: Arc::new(InMemoryRimRepository::default()),
            validator: Arc::new(PolicyValidator::default()),
            nonces: Arc::new(InMemoryNonceStore::default()),
            clock: Arc::new(SystemTimeClock),
            policy: ProvisioningPolicy::default(),
            config: EngineConfig::default(),
        }
    }

    pub fn set_crypto_backend(mut self, backend: Arc<dyn CryptoBackend>) -> Self {
        self.backend = backend;
        self
    }

    pub fn set_device_repository(mut self, devices: Arc<dyn DeviceRepository>) -> Self {
        self.devices = devices;
        self
    }

    pub fn set_credential_repository(mut self, credentials: Arc<dyn CredentialRepository>) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn set_rim_repository(mut self, rims: Arc<dyn RimRepository>) -> Self {
        self.rims = rims;
        self
    }

    pub fn set_validator(mut self, validator: Arc<dyn SupplyChainValidator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn set_nonce_store(mut self, nonces: Arc<dyn NonceStore>) -> Self {
        self.nonces = nonces;
        self
    }

    pub fn set_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn set_policy(mut self, policy: ProvisioningPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn set_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Checks the CA certificate against the key and records it with the
    /// other credentials.
    pub fn build(self) -> Result<ProtocolEngine, ProvisioningError> {
        let issuer = CertificateIssuer::new(self.private_key.clone(), &self.certificate_der)?;
        self.credentials.store_certificate_authority(issuer.authority().clone())?;
        Ok(ProtocolEngine {
            envelope: EnvelopeCrypto::new(self.private_key, self.backend.clone()),
            issuer,
            backend: self.backend,
            devices: self.devices,
            credentials: self.credentials,
            rims: self.rims,
            validator: self.validator,
            nonces: self.nonces,
            clock: self.clock,
            policy: self.policy,
            config: self.config,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use aca_crypto::{
        make_credential::CREDENTIAL_BLOB_LENGTH,
        public_key::{fixed_length_modulus, RSA_MODULUS_LENGTH},
        SeededCryptoBackend,
    };
    use aca_proto_rust::aca::provisioner::v1::{NetworkInfo, ResponseStatus};
    use googletest::prelude::*;
    use rsa::pkcs8::DecodePrivateKey;

    use super::*;
    use crate::{
        clock::FixedClock, credential::CredentialKind, nonce_store::MockNonceStore,
        validation::MockSupplyChainValidator,
    };

    const ACA_KEY: &str = include_str!("../testdata/aca.pem");
    const EK_KEY: &str = include_str!("../testdata/ek.pem");
    const AK_KEY: &str = include_str!("../testdata/ak.pem");
    const ACA_CERT: &[u8] = include_bytes!("../testdata/aca_cert.der");

    fn key(pem: &str) -> RsaPrivateKey {
        RsaPrivateKey::from_pkcs8_pem(pem).unwrap()
    }

    fn public_area(key: &RsaPublicKey) -> Vec<u8> {
        let mut area = vec![0u8; 24];
        area.extend(fixed_length_modulus(key, RSA_MODULUS_LENGTH).unwrap());
        area
    }

    fn claim(hostname: &str) -> IdentityClaim {
        IdentityClaim {
            dv: Some(DeviceInfo {
                nw: Some(NetworkInfo { hostname: hostname.into(), ..Default::default() }),
                ..Default::default()
            }),
            ak_public_area: public_area(&key(AK_KEY).to_public_key()),
            ek_public_area: public_area(&key(EK_KEY).to_public_key()),
            ..Default::default()
        }
    }

    fn summary(overall_status: AppraisalStatus) -> SupplyChainValidationSummary {
        SupplyChainValidationSummary { id: 1, overall_status, message: String::new() }
    }

    fn builder() -> ProtocolEngineBuilder {
        ProtocolEngine::builder(key(ACA_KEY), ACA_CERT)
            .set_crypto_backend(Arc::new(SeededCryptoBackend::from_seed(3)))
            .set_clock(Arc::new(FixedClock::at_unix_millis(1_760_000_000_000)))
    }

    /// Validator passing phase 1 with the given quote verdict.
    fn validator(quote: Option<AppraisalStatus>) -> MockSupplyChainValidator {
        let mut validator = MockSupplyChainValidator::new();
        validator
            .expect_validate_supply_chain()
            .returning(|_, _, _| Ok(summary(AppraisalStatus::Pass)));
        validator.expect_validate_quote().returning(move |_| Ok(quote.map(summary)));
        validator
    }

    /// Nonce store that accepts the challenge and hands `claim` back.
    fn nonces_returning(claim: &IdentityClaim) -> MockNonceStore {
        let claim = claim.encode_to_vec();
        let mut nonces = MockNonceStore::new();
        nonces.expect_insert().returning(|_, _, _, _| Ok(()));
        nonces.expect_take().times(1).returning(move |_, _| Ok(claim.clone()));
        nonces
    }

    fn certificate_request(quote: &[u8]) -> Vec<u8> {
        CertificateRequest { nonce: vec![7; NONCE_LENGTH], quote: quote.to_vec() }.encode_to_vec()
    }

    #[googletest::test]
    fn test_malformed_claims_are_client_errors() {
        let engine = builder().build().unwrap();

        assert!(matches!(engine.process_identity_claim_tpm2(&[]), Err(ProvisioningError::Input(_))));
        assert!(matches!(
            engine.process_identity_claim_tpm2(&[0xff, 0xff]),
            Err(ProvisioningError::Input(_))
        ));
        assert!(matches!(
            engine.process_identity_claim_tpm2(&claim("").encode_to_vec()),
            Err(ProvisioningError::Input(_))
        ));

        let mut short_key = claim("node-1");
        short_key.ek_public_area.truncate(100);
        assert!(matches!(
            engine.process_identity_claim_tpm2(&short_key.encode_to_vec()),
            Err(ProvisioningError::Input(_))
        ));
    }

    #[googletest::test]
    fn test_passing_claim_returns_challenge() {
        let nonces = Arc::new(InMemoryNonceStore::default());
        let devices = Arc::new(InMemoryDeviceRepository::default());
        let engine = builder()
            .set_nonce_store(nonces.clone())
            .set_device_repository(devices.clone())
            .set_policy(ProvisioningPolicy { ignore_ima_pcr: true, ..Default::default() })
            .build()
            .unwrap();

        let response = engine.process_identity_claim_tpm2(&claim("node-1").encode_to_vec()).unwrap();
        let response = IdentityClaimResponse::decode(response.as_slice()).unwrap();

        assert_that!(response.status(), eq(ResponseStatus::Pass));
        assert_that!(response.credential_blob, len(eq(CREDENTIAL_BLOB_LENGTH)));
        assert_that!(response.pcr_mask, eq(&engine.policy().pcr_mask()));
        assert_that!(response.pcr_mask.split(',').any(|pcr| pcr == "10"), eq(false));
        assert_that!(nonces.len(), eq(1));

        let device = devices.find_by_name("node-1").unwrap().unwrap();
        assert_that!(device.supply_chain_status, eq(AppraisalStatus::Pass));
        assert_that!(device.summary_id, some(eq(1)));
    }

    #[googletest::test]
    fn test_abandoned_challenges_expire_from_the_store() {
        let nonces = Arc::new(InMemoryNonceStore::default());
        let clock = Arc::new(FixedClock::at_unix_millis(1_760_000_000_000));
        let engine = builder()
            .set_nonce_store(nonces.clone())
            .set_clock(clock.clone())
            .build()
            .unwrap();
        let request = claim("node-1").encode_to_vec();

        for _ in 0..50 {
            engine.process_identity_claim_tpm2(&request).unwrap();
            clock.advance(Duration::from_secs(3600));
        }
        assert_that!(nonces.len(), eq(1));

        engine.process_identity_claim_tpm2(&request).unwrap();
        clock.advance(Duration::from_secs(60));
        engine.process_identity_claim_tpm2(&request).unwrap();
        assert_that!(nonces.len(), eq(2));
    }

    #[googletest::test]
    fn test_denied_claim_issues_no_challenge() {
        let mut validator = MockSupplyChainValidator::new();
        validator
            .expect_validate_supply_chain()
            .times(1)
            .returning(|_, _, _| Ok(summary(AppraisalStatus::Fail)));
        let mut nonces = MockNonceStore::new();
        nonces.expect_insert().never();
        let engine = builder()
            .set_validator(Arc::new(validator))
            .set_nonce_store(Arc::new(nonces))
            .build()
            .unwrap();

        let response = engine.process_identity_claim_tpm2(&claim("node-1").encode_to_vec()).unwrap();
        let response = IdentityClaimResponse::decode(response.as_slice()).unwrap();

        assert_that!(response.status(), eq(ResponseStatus::Fail));
        assert_that!(response.credential_blob, is_empty());
        assert_that!(response.pcr_mask, eq(""));
    }

    #[googletest::test]
    fn test_validator_failure_aborts_claim() {
        let mut validator = MockSupplyChainValidator::new();
        validator
            .expect_validate_supply_chain()
            .returning(|_, _, _| Err(anyhow::anyhow!("validation service unavailable")));
        let engine = builder().set_validator(Arc::new(validator)).build().unwrap();

        assert!(matches!(
            engine.process_identity_claim_tpm2(&claim("node-1").encode_to_vec()),
            Err(ProvisioningError::Repository(_))
        ));
    }

    #[googletest::test]
    fn test_certificate_request_needs_a_pending_claim() {
        let engine = builder().build().unwrap();

        assert!(matches!(
            engine.process_certificate_request(&certificate_request(b"")),
            Err(ProvisioningError::NonceNotFound)
        ));
        assert!(matches!(
            engine.process_certificate_request(
                &CertificateRequest::default().encode_to_vec()
            ),
            Err(ProvisioningError::Input(_))
        ));
        assert!(matches!(engine.process_certificate_request(&[]), Err(ProvisioningError::Input(_))));
    }

    #[googletest::test]
    fn test_certificate_request_for_unknown_device() {
        let engine = builder()
            .set_nonce_store(Arc::new(nonces_returning(&claim("node-1"))))
            .build()
            .unwrap();

        assert!(matches!(
            engine.process_certificate_request(&certificate_request(b"")),
            Err(ProvisioningError::Processing(_))
        ));
    }

    #[googletest::test]
    fn test_failed_quote_denies_certificate() {
        let claim = claim("node-1");
        let credentials = Arc::new(InMemoryCredentialRepository::default());
        let engine = builder()
            .set_validator(Arc::new(validator(Some(AppraisalStatus::Fail))))
            .set_nonce_store(Arc::new(nonces_returning(&claim)))
            .set_credential_repository(credentials.clone())
            .build()
            .unwrap();
        engine.process_identity_claim_tpm2(&claim.encode_to_vec()).unwrap();

        let response = engine.process_certificate_request(&certificate_request(b"")).unwrap();
        let response = CertificateResponse::decode(response.as_slice()).unwrap();

        assert_that!(response.status(), eq(ResponseStatus::Fail));
        assert_that!(response.certificate, is_empty());
        assert_that!(credentials.issued_certificates(), is_empty());
    }

    #[googletest::test]
    fn test_quote_is_recorded_and_certificate_issued() {
        let claim = claim("node-1");
        let devices = Arc::new(InMemoryDeviceRepository::default());
        let credentials = Arc::new(InMemoryCredentialRepository::default());
        let engine = builder()
            .set_validator(Arc::new(validator(None)))
            .set_nonce_store(Arc::new(nonces_returning(&claim)))
            .set_device_repository(devices.clone())
            .set_credential_repository(credentials.clone())
            .build()
            .unwrap();
        engine.process_identity_claim_tpm2(&claim.encode_to_vec()).unwrap();

        let response = engine
            .process_certificate_request(&certificate_request(
                b"quote:\n 0a0b0c\nsignature:\n 0d0e0f\n",
            ))
            .unwrap();
        let response = CertificateResponse::decode(response.as_slice()).unwrap();

        assert_that!(response.status(), eq(ResponseStatus::Pass));
        assert_that!(response.certificate, not(is_empty()));
        assert_that!(response.ldevid_certificate, is_empty());

        let device = devices.find_by_name("node-1").unwrap().unwrap();
        assert_that!(
            device.device_info.tpm.quote,
            some(eq(&TpmQuote { hash: "0a0b0c".to_string(), signature: "0d0e0f".to_string() }))
        );
        let issued = credentials.issued_certificates();
        assert_that!(issued, len(eq(1)));
        assert_eq!(issued[0].der, response.certificate);
    }

    #[googletest::test]
    fn test_disabled_issuance_passes_without_certificate() {
        let claim = claim("node-1");
        let credentials = Arc::new(InMemoryCredentialRepository::default());
        let engine = builder()
            .set_validator(Arc::new(validator(None)))
            .set_nonce_store(Arc::new(nonces_returning(&claim)))
            .set_credential_repository(credentials.clone())
            .set_policy(ProvisioningPolicy {
                issue_attestation_certificate: false,
                ..Default::default()
            })
            .build()
            .unwrap();
        engine.process_identity_claim_tpm2(&claim.encode_to_vec()).unwrap();

        let response = engine.process_certificate_request(&certificate_request(b"")).unwrap();
        let response = CertificateResponse::decode(response.as_slice()).unwrap();

        assert_that!(response.status(), eq(ResponseStatus::Pass));
        assert_that!(response.certificate, is_empty());
        assert_that!(credentials.issued_certificates(), is_empty());
    }

    #[googletest::test]
    fn test_malformed_identity_requests_are_client_errors() {
        let engine = builder().build().unwrap();

        assert!(matches!(engine.process_identity_request(&[]), Err(ProvisioningError::Input(_))));
        assert!(matches!(
            engine.process_identity_request(&[0, 0, 0, 9, 1]),
            Err(ProvisioningError::Input(_))
        ));
    }

    #[googletest::test]
    fn test_builder_checks_and_records_ca() {
        let credentials = Arc::new(InMemoryCredentialRepository::default());
        let engine =
            builder().set_credential_repository(credentials.clone()).build().unwrap();

        let kinds: Vec<_> = credentials.credentials().iter().map(|c| c.kind()).collect();
        assert_that!(kinds, elements_are![eq(&CredentialKind::CertificateAuthority)]);
        assert_that!(engine.public_key_der(), ok(not(is_empty())));

        assert!(matches!(
            ProtocolEngine::builder(key(EK_KEY), ACA_CERT).build(),
            Err(ProvisioningError::Input(_))
        ));
    }
}
