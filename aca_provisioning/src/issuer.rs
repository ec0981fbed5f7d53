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

//! Signs attestation certificates with the CA key.

use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::{Duration, SystemTime},
};

use const_oid::{AssociatedOid, ObjectIdentifier};
use der::{
    asn1::{Any, OctetString, SetOfVec},
    DecodePem, Encode, Tag,
};
use log::debug;
use rsa::{
    pkcs1v15::{Signature, SigningKey},
    pkcs8::EncodePublicKey,
    traits::PublicKeyParts,
    RsaPrivateKey, RsaPublicKey,
};
use sha2::Sha256;
use x509_cert::{
    attr::AttributeTypeAndValue,
    builder::{Builder, CertificateBuilder, Profile},
    ext::{
        pkix::{
            name::GeneralName, AuthorityKeyIdentifier, BasicConstraints, ExtendedKeyUsage,
            KeyUsage, KeyUsages, SubjectAltName,
        },
        AsExtension, Extension,
    },
    name::{Name, RdnSequence, RelativeDistinguishedName},
    serial_number::SerialNumber,
    spki::SubjectPublicKeyInfoOwned,
    time::{Time, Validity},
    Certificate,
};

use crate::{
    clock::unix_millis,
    credential::{
        CertificateAuthorityCredential, EndorsementCredential, IssuedAttestationCertificate,
        PlatformCredential,
    },
    error::ProvisioningError,
    policy::ProvisioningPolicy,
};

/// tcg-at-tpmIdLabel, carries the device name in the SubjectAltName.
pub const TCG_AT_TPM_ID_LABEL: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.23.133.2.15");

/// tcg-kp-AIKCertificate.
pub const TCG_KP_AIK_CERTIFICATE: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("2.23.133.8.3");

/// id-kp-clientAuth.
pub const ID_KP_CLIENT_AUTH: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.6.1.5.5.7.3.2");

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// Adds `T` as a critical extension.
struct Critical<T>(T);

impl<T: AssociatedOid> AssociatedOid for Critical<T> {
    const OID: ObjectIdentifier = T::OID;
}

impl<T: Encode> Encode for Critical<T> {
    fn encoded_len(&self) -> der::Result<der::Length> {
        self.0.encoded_len()
    }

    fn encode(&self, writer: &mut impl der::Writer) -> der::Result<()> {
        self.0.encode(writer)
    }
}

impl<T: AssociatedOid + Encode> AsExtension for Critical<T> {
    fn critical(&self, _subject: &Name, _extensions: &[Extension]) -> bool {
        true
    }
}

/// A freshly signed certificate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IssuedCertificate {
    pub der: Vec<u8>,
    pub serial_number: u64,
    pub not_before: SystemTime,
    pub not_after: SystemTime,
}

pub struct CertificateIssuer {
    signing_key: SigningKey<Sha256>,
    public_key: RsaPublicKey,
    authority: CertificateAuthorityCredential,
    last_serial: AtomicU64,
}

impl CertificateIssuer {
    /// Fails if the certificate doesn't certify `private_key`.
    pub fn new(
        private_key: RsaPrivateKey,
        certificate_der: &[u8],
    ) -> Result<Self, ProvisioningError> {
        let authority = CertificateAuthorityCredential::from_der(certificate_der)?;
        if authority.public_key_modulus != private_key.n().to_bytes_be() {
            return Err(ProvisioningError::Input(
                "the CA certificate doesn't match the CA private key".to_string(),
            ));
        }
        Ok(Self {
            public_key: private_key.to_public_key(),
            signing_key: SigningKey::<Sha256>::new(private_key),
            authority,
            last_serial: AtomicU64::new(0),
        })
    }

    pub fn authority(&self) -> &CertificateAuthorityCredential {
        &self.authority
    }

    /// DER SubjectPublicKeyInfo of the CA key.
    pub fn public_key_der(&self) -> Result<Vec<u8>, ProvisioningError> {
        Ok(self
            .public_key
            .to_public_key_der()
            .map_err(processing_error("CA public key"))?
            .as_bytes()
            .to_vec())
    }

    /// Signs a certificate for `subject_key` with an empty subject. The device
    /// is identified through the SubjectAltName, which also repeats the
    /// directory names of the endorsement and platform credentials.
    pub fn issue(
        &self,
        subject_key: &RsaPublicKey,
        endorsement: Option<&EndorsementCredential>,
        platforms: &[PlatformCredential],
        device_name: &str,
        valid_days: u32,
        now: SystemTime,
    ) -> Result<IssuedCertificate, ProvisioningError> {
        if device_name.is_empty() {
            return Err(ProvisioningError::Processing(
                "can't issue a certificate without a device name".to_string(),
            ));
        }

        let serial_number = self.next_serial(now);
        let not_after = now + Duration::from_secs(u64::from(valid_days) * SECONDS_PER_DAY);
        let validity = Validity {
            not_before: Time::try_from(now).map_err(processing_error("validity"))?,
            not_after: Time::try_from(not_after).map_err(processing_error("validity"))?,
        };
        let spki = subject_key
            .to_public_key_der()
            .map_err(processing_error("subject public key"))?;
        let spki = SubjectPublicKeyInfoOwned::try_from(spki.as_bytes())
            .map_err(processing_error("subject public key"))?;

        let mut builder = CertificateBuilder::new(
            Profile::Manual { issuer: Some(self.authority.subject.clone()) },
            SerialNumber::from(serial_number),
            validity,
            Name::default(),
            spki,
            &self.signing_key,
        )
        .map_err(processing_error("certificate builder"))?;

        builder
            .add_extension(&Critical(subject_alt_name(endorsement, platforms, device_name)?))
            .map_err(processing_error("subject alternative name"))?;
        if let Some(key_identifier) = &self.authority.subject_key_identifier {
            let authority_key_identifier = AuthorityKeyIdentifier {
                key_identifier: Some(
                    OctetString::new(key_identifier.clone())
                        .map_err(processing_error("authority key identifier"))?,
                ),
                authority_cert_issuer: None,
                authority_cert_serial_number: None,
            };
            builder
                .add_extension(&authority_key_identifier)
                .map_err(processing_error("authority key identifier"))?;
        } else {
            debug!("CA certificate has no subject key identifier, omitting AKI");
        }
        builder
            .add_extension(&Critical(ExtendedKeyUsage(vec![
                TCG_KP_AIK_CERTIFICATE,
                ID_KP_CLIENT_AUTH,
            ])))
            .map_err(processing_error("extended key usage"))?;
        builder
            .add_extension(&Critical(KeyUsage(
                KeyUsages::DigitalSignature | KeyUsages::KeyEncipherment,
            )))
            .map_err(processing_error("key usage"))?;
        builder
            .add_extension(&Critical(BasicConstraints { ca: false, path_len_constraint: None }))
            .map_err(processing_error("basic constraints"))?;

        let certificate =
            builder.build::<Signature>().map_err(processing_error("certificate signature"))?;
        let der = certificate.to_der().map_err(processing_error("certificate encoding"))?;
        debug!("issued certificate {serial_number} for {device_name}");

        Ok(IssuedCertificate { der, serial_number, not_before: now, not_after })
    }

    /// Current epoch milliseconds, bumped when needed so that serials never
    /// repeat within the process.
    fn next_serial(&self, now: SystemTime) -> u64 {
        let millis = unix_millis(now);
        let previous = match self.last_serial.fetch_update(
            Ordering::SeqCst,
            Ordering::SeqCst,
            |last| Some(millis.max(last + 1)),
        ) {
            Ok(previous) | Err(previous) => previous,
        };
        millis.max(previous + 1)
    }
}

fn subject_alt_name(
    endorsement: Option<&EndorsementCredential>,
    platforms: &[PlatformCredential],
    device_name: &str,
) -> Result<SubjectAltName, ProvisioningError> {
    let mut rdns: Vec<RelativeDistinguishedName> = endorsement
        .into_iter()
        .flat_map(|credential| credential.san_directory_names.iter())
        .chain(platforms.iter().flat_map(|credential| credential.san_directory_names.iter()))
        .flat_map(|name| name.0.iter().cloned())
        .collect();

    let label = AttributeTypeAndValue {
        oid: TCG_AT_TPM_ID_LABEL,
        value: Any::new(Tag::Utf8String, device_name.as_bytes().to_vec())
            .map_err(processing_error("device name"))?,
    };
    rdns.push(RelativeDistinguishedName(
        SetOfVec::try_from(vec![label]).map_err(processing_error("device name"))?,
    ));
    Ok(SubjectAltName(vec![GeneralName::DirectoryName(RdnSequence(rdns))]))
}

fn processing_error<E: std::fmt::Display>(
    what: &'static str,
) -> impl FnOnce(E) -> ProvisioningError {
    move |err| ProvisioningError::Processing(format!("couldn't build {what}: {err}"))
}

/// Whether a new certificate should replace `existing`. AK and LDevID
/// certificates follow separate policy switches.
pub fn should_reissue(
    existing: Option<&IssuedAttestationCertificate>,
    policy: &ProvisioningPolicy,
    ldevid: bool,
    now: SystemTime,
) -> bool {
    let (enabled, on_expiration, threshold_days) = if ldevid {
        (
            policy.issue_ldevid_certificate,
            policy.ldevid_generate_on_expiration,
            policy.ldevid_reissue_threshold_days,
        )
    } else {
        (
            policy.issue_attestation_certificate,
            policy.generate_on_expiration,
            policy.reissue_threshold_days,
        )
    };
    if !enabled {
        return false;
    }
    match existing {
        None => true,
        Some(certificate) if on_expiration => {
            certificate.days_until_expiry(now) < threshold_days
        }
        Some(_) => true,
    }
}

/// Accepts a PEM or DER encoded certificate and returns its DER encoding.
pub fn certificate_der(encoded: &[u8]) -> Result<Vec<u8>, ProvisioningError> {
    let trimmed = encoded.trim_ascii_start();
    if !trimmed.starts_with(b"-----BEGIN") {
        return Ok(encoded.to_vec());
    }
    Certificate::from_pem(trimmed)
        .and_then(|certificate| certificate.to_der())
        .map_err(|err| ProvisioningError::Input(format!("couldn't parse PEM certificate: {err}")))
}
