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

//! Durable credential records and the attribute extraction used to match
//! them against devices.

use std::{
    fmt::Display,
    time::{SystemTime, UNIX_EPOCH},
};

use const_oid::{AssociatedOid, ObjectIdentifier};
use der::{asn1::Any, Decode, Encode, Reader, SliceReader, Tag, TagNumber, Tagged};
use rsa::{traits::PublicKeyParts, RsaPublicKey};
use x509_cert::{
    ext::{
        pkix::{name::GeneralName, SubjectAltName, SubjectKeyIdentifier},
        Extension,
    },
    name::Name,
    Certificate,
};

use crate::error::ProvisioningError;

pub type CredentialId = u64;

/// tcg-at-platformSerial, the board serial number of a platform credential.
pub const TCG_AT_PLATFORM_SERIAL: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("2.23.133.5.1.6");

const SECONDS_PER_DAY: i64 = 24 * 60 * 60;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CredentialKind {
    Endorsement,
    Platform,
    CertificateAuthority,
    IssuedAttestation,
}

/// Every credential the CA stores.
#[derive(Clone, Debug, PartialEq)]
pub enum Credential {
    Endorsement(EndorsementCredential),
    Platform(PlatformCredential),
    CertificateAuthority(CertificateAuthorityCredential),
    IssuedAttestation(IssuedAttestationCertificate),
}

impl Credential {
    pub fn kind(&self) -> CredentialKind {
        match self {
            Credential::Endorsement(_) => CredentialKind::Endorsement,
            Credential::Platform(_) => CredentialKind::Platform,
            Credential::CertificateAuthority(_) => CredentialKind::CertificateAuthority,
            Credential::IssuedAttestation(_) => CredentialKind::IssuedAttestation,
        }
    }

    pub fn id(&self) -> CredentialId {
        match self {
            Credential::Endorsement(credential) => credential.id,
            Credential::Platform(credential) => credential.id,
            Credential::CertificateAuthority(credential) => credential.id,
            Credential::IssuedAttestation(certificate) => certificate.id,
        }
    }

    pub fn der(&self) -> &[u8] {
        match self {
            Credential::Endorsement(credential) => &credential.der,
            Credential::Platform(credential) => &credential.der,
            Credential::CertificateAuthority(credential) => &credential.der,
            Credential::IssuedAttestation(certificate) => &certificate.der,
        }
    }

    /// CA credentials are never archived.
    pub fn is_archived(&self) -> bool {
        match self {
            Credential::Endorsement(credential) => credential.archived,
            Credential::Platform(credential) => credential.archived,
            Credential::CertificateAuthority(_) => false,
            Credential::IssuedAttestation(certificate) => certificate.archived,
        }
    }

    pub fn archive(&mut self) {
        match self {
            Credential::Endorsement(credential) => credential.archived = true,
            Credential::Platform(credential) => credential.archived = true,
            Credential::CertificateAuthority(_) => {}
            Credential::IssuedAttestation(certificate) => certificate.archived = true,
        }
    }

    pub(crate) fn set_id(&mut self, id: CredentialId) {
        match self {
            Credential::Endorsement(credential) => credential.id = id,
            Credential::Platform(credential) => credential.id = id,
            Credential::CertificateAuthority(credential) => credential.id = id,
            Credential::IssuedAttestation(certificate) => certificate.id = id,
        }
    }
}

/// An X.509 TPM endorsement key certificate.
#[derive(Clone, Debug, PartialEq)]
pub struct EndorsementCredential {
    pub id: CredentialId,
    pub der: Vec<u8>,
    pub serial_number: Vec<u8>,
    /// Big-endian modulus of the endorsement key, without leading zeros.
    pub public_key_modulus: Vec<u8>,
    pub san_directory_names: Vec<Name>,
    pub archived: bool,
}

impl EndorsementCredential {
    pub fn from_der(der: &[u8]) -> Result<Self, ProvisioningError> {
        let certificate =
            Certificate::from_der(der).map_err(input_error("endorsement credential"))?;
        let tbs = &certificate.tbs_certificate;
        let public_key = rsa_public_key(&certificate)?;
        Ok(Self {
            id: 0,
            der: der.to_vec(),
            serial_number: tbs.serial_number.as_bytes().to_vec(),
            public_key_modulus: public_key.n().to_bytes_be(),
            san_directory_names: directory_names(tbs.extensions.as_deref().unwrap_or_default())
                .map_err(input_error("endorsement credential SAN"))?,
            archived: false,
        })
    }

    pub fn public_key(&self) -> Result<RsaPublicKey, ProvisioningError> {
        Ok(aca_crypto::public_key::rsa_public_key_from_modulus(&self.public_key_modulus)?)
    }
}

/// An RFC 5755 attribute certificate describing the platform a TPM is
/// soldered to. Only the attributes used for matching are extracted.
#[derive(Clone, Debug, PartialEq)]
pub struct PlatformCredential {
    pub id: CredentialId,
    pub der: Vec<u8>,
    pub serial_number: Vec<u8>,
    /// Serial number of the endorsement credential named as the holder.
    pub holder_serial_number: Vec<u8>,
    /// Board serial number, from tcg-at-platformSerial.
    pub platform_serial: Option<String>,
    pub san_directory_names: Vec<Name>,
    pub archived: bool,
}

impl PlatformCredential {
    pub fn from_der(der: &[u8]) -> Result<Self, ProvisioningError> {
        let fields = AttributeCertificateFields::parse(der)
            .map_err(input_error("platform credential"))?;
        Ok(Self {
            id: 0,
            der: der.to_vec(),
            platform_serial: attribute_string(&fields.san_directory_names, TCG_AT_PLATFORM_SERIAL),
            serial_number: fields.serial_number,
            holder_serial_number: fields.holder_serial_number,
            san_directory_names: fields.san_directory_names,
            archived: false,
        })
    }
}

/// The CA's own certificate.
#[derive(Clone, Debug, PartialEq)]
pub struct CertificateAuthorityCredential {
    pub id: CredentialId,
    pub der: Vec<u8>,
    pub subject: Name,
    pub subject_key_identifier: Option<Vec<u8>>,
    pub public_key_modulus: Vec<u8>,
}

impl CertificateAuthorityCredential {
    pub fn from_der(der: &[u8]) -> Result<Self, ProvisioningError> {
        let certificate = Certificate::from_der(der).map_err(input_error("CA certificate"))?;
        let tbs = &certificate.tbs_certificate;
        let subject_key_identifier = tbs
            .extensions
            .as_deref()
            .unwrap_or_default()
            .iter()
            .find(|extension| extension.extn_id == SubjectKeyIdentifier::OID)
            .map(|extension| SubjectKeyIdentifier::from_der(extension.extn_value.as_bytes()))
            .transpose()
            .map_err(input_error("CA subject key identifier"))?
            .map(|ski| ski.0.as_bytes().to_vec());
        Ok(Self {
            id: 0,
            der: der.to_vec(),
            subject: tbs.subject.clone(),
            subject_key_identifier,
            public_key_modulus: rsa_public_key(&certificate)?.n().to_bytes_be(),
        })
    }
}

/// A certificate this CA signed for an attestation key or LDevID key.
#[derive(Clone, Debug, PartialEq)]
pub struct IssuedAttestationCertificate {
    pub id: CredentialId,
    pub der: Vec<u8>,
    pub serial_number: u64,
    pub not_before: SystemTime,
    pub not_after: SystemTime,
    pub device_name: String,
    pub endorsement_credential: Option<CredentialId>,
    pub platform_credentials: Vec<CredentialId>,
    pub ldevid: bool,
    pub archived: bool,
}

impl IssuedAttestationCertificate {
    /// Whole days between `now` and expiry, negative once expired.
    pub fn days_until_expiry(&self, now: SystemTime) -> i64 {
        let remaining = signed_seconds(self.not_after) - signed_seconds(now);
        remaining.div_euclid(SECONDS_PER_DAY)
    }
}

fn signed_seconds(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(after) => after.as_secs() as i64,
        Err(before) => -(before.duration().as_secs() as i64),
    }
}

fn input_error<E: Display>(what: &'static str) -> impl FnOnce(E) -> ProvisioningError {
    move |err| ProvisioningError::Input(format!("couldn't parse {what}: {err}"))
}

fn rsa_public_key(certificate: &Certificate) -> Result<RsaPublicKey, ProvisioningError> {
    let spki = certificate
        .tbs_certificate
        .subject_public_key_info
        .to_der()
        .map_err(input_error("subject public key info"))?;
    let spki = spki::SubjectPublicKeyInfoRef::try_from(spki.as_slice())
        .map_err(input_error("subject public key info"))?;
    RsaPublicKey::try_from(spki).map_err(input_error("RSA subject public key"))
}

/// Directory names listed in the SubjectAltName extensions.
pub(crate) fn directory_names(extensions: &[Extension]) -> der::Result<Vec<Name>> {
    let mut names = Vec::new();
    for extension in extensions.iter().filter(|extension| extension.extn_id == SubjectAltName::OID)
    {
        let san = SubjectAltName::from_der(extension.extn_value.as_bytes())?;
        names.extend(san.0.into_iter().filter_map(|name| match name {
            GeneralName::DirectoryName(name) => Some(name),
            _ => None,
        }));
    }
    Ok(names)
}

/// First value of `oid` in `names`, as text.
pub(crate) fn attribute_string(names: &[Name], oid: ObjectIdentifier) -> Option<String> {
    names
        .iter()
        .flat_map(|name| name.0.iter())
        .flat_map(|rdn| rdn.0.iter())
        .find(|atv| atv.oid == oid)
        .and_then(|atv| std::str::from_utf8(atv.value.value()).ok())
        .map(str::to_owned)
}

/// The parts of an attribute certificate used for matching.
///
/// ```text
/// AttributeCertificateInfo ::= SEQUENCE {
///     version, holder, issuer, signature, serialNumber,
///     attrCertValidityPeriod, attributes,
///     issuerUniqueID OPTIONAL, extensions OPTIONAL }
/// ```
///
/// <https://datatracker.ietf.org/doc/html/rfc5755#section-4.1>
struct AttributeCertificateFields {
    serial_number: Vec<u8>,
    holder_serial_number: Vec<u8>,
    san_directory_names: Vec<Name>,
}

impl AttributeCertificateFields {
    const HOLDER: usize = 1;
    const SERIAL_NUMBER: usize = 4;
    const EXTENSIONS_FROM: usize = 7;

    fn parse(der: &[u8]) -> der::Result<Self> {
        let certificate = Vec::<Any>::from_der(der)?;
        let info = match certificate.as_slice() {
            [info, _signature_algorithm, _signature] => sequence_elements(info)?,
            _ => return Err(Tag::Sequence.value_error()),
        };
        if info.len() < Self::EXTENSIONS_FROM {
            return Err(Tag::Sequence.length_error());
        }

        // Holder ::= SEQUENCE { baseCertificateID [0] IssuerSerial OPTIONAL, ... }
        // IssuerSerial ::= SEQUENCE { issuer GeneralNames, serial CertificateSerialNumber, ... }
        let base_certificate_id = sequence_elements(&info[Self::HOLDER])?
            .into_iter()
            .find(|element| {
                element.tag().is_context_specific() && element.tag().number() == TagNumber::N0
            })
            .ok_or_else(|| Tag::Sequence.value_error())?;
        let mut reader = SliceReader::new(base_certificate_id.value())?;
        let _issuer: Any = reader.decode()?;
        let holder_serial: Any = reader.decode()?;
        holder_serial.tag().assert_eq(Tag::Integer)?;

        let serial_number = &info[Self::SERIAL_NUMBER];
        serial_number.tag().assert_eq(Tag::Integer)?;

        let san_directory_names = match info
            .iter()
            .skip(Self::EXTENSIONS_FROM)
            .find(|element| element.tag() == Tag::Sequence)
        {
            Some(extensions) => {
                directory_names(&Vec::<Extension>::from_der(&extensions.to_der()?)?)?
            }
            None => Vec::new(),
        };

        Ok(Self {
            serial_number: serial_number.value().to_vec(),
            holder_serial_number: holder_serial.value().to_vec(),
            san_directory_names,
        })
    }
}

fn sequence_elements(element: &Any) -> der::Result<Vec<Any>> {
    Vec::<Any>::from_der(&element.to_der()?)
}

#[cfg(test)]
mod tests {
    use googletest::prelude::*;
    use rsa::{pkcs8::DecodePrivateKey, RsaPrivateKey};

    use super::*;

    const EK_CERT: &[u8] = include_bytes!("../testdata/ek_cert.der");
    const PLATFORM_CERT: &[u8] = include_bytes!("../testdata/platform_cert.der");
    const ACA_CERT: &[u8] = include_bytes!("../testdata/aca_cert.der");

    const TCG_AT_TPM_MANUFACTURER: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.23.133.2.1");

    #[googletest::test]
    fn test_parse_endorsement_credential() {
        let credential = EndorsementCredential::from_der(EK_CERT).unwrap();
        let ek = RsaPrivateKey::from_pkcs8_pem(include_str!("../testdata/ek.pem")).unwrap();

        assert_eq!(credential.serial_number, vec![0x0a, 0x1b, 0x2c, 0x3d]);
        assert_eq!(credential.public_key_modulus, ek.n().to_bytes_be());
        assert_that!(credential.san_directory_names, len(eq(1)));
        assert_that!(
            attribute_string(&credential.san_directory_names, TCG_AT_TPM_MANUFACTURER),
            some(eq("id:53544D20"))
        );
    }

    #[googletest::test]
    fn test_parse_platform_credential() {
        let credential = PlatformCredential::from_der(PLATFORM_CERT).unwrap();

        assert_eq!(credential.holder_serial_number, vec![0x0a, 0x1b, 0x2c, 0x3d]);
        assert_eq!(credential.serial_number, vec![0x07]);
        assert_that!(credential.platform_serial, some(eq("BOARD-0001")));
        assert_that!(credential.san_directory_names[0].0, len(eq(3)));
    }

    #[googletest::test]
    fn test_parse_ca_credential() {
        let credential = CertificateAuthorityCredential::from_der(ACA_CERT).unwrap();
        assert_that!(
            credential.subject_key_identifier.map(hex::encode),
            some(eq("2069602db4ba7d0d6185e7297035844148f1e681"))
        );
        assert_that!(credential.subject.to_string(), contains_substring("Example Attestation CA"));
    }

    #[googletest::test]
    fn test_garbage_is_input_error() {
        assert!(matches!(
            EndorsementCredential::from_der(b"not a certificate"),
            Err(ProvisioningError::Input(_))
        ));
        assert!(matches!(
            PlatformCredential::from_der(EK_CERT),
            Err(ProvisioningError::Input(_))
        ));
    }

    #[googletest::test]
    fn test_credential_variant_accessors() {
        let mut credential =
            Credential::Platform(PlatformCredential::from_der(PLATFORM_CERT).unwrap());
        credential.set_id(5);
        credential.archive();

        assert_that!(credential.kind(), eq(CredentialKind::Platform));
        assert_that!(credential.id(), eq(5));
        assert_that!(credential.is_archived(), eq(true));
        assert_eq!(credential.der(), PLATFORM_CERT);
    }

    #[googletest::test]
    fn test_days_until_expiry() {
        let now = UNIX_EPOCH + std::time::Duration::from_secs(1_700_000_000);
        let day = std::time::Duration::from_secs(86_400);
        let certificate = IssuedAttestationCertificate {
            id: 1,
            der: Vec::new(),
            serial_number: 1,
            not_before: now,
            not_after: now + day * 10,
            device_name: "host".to_string(),
            endorsement_credential: None,
            platform_credentials: Vec::new(),
            ldevid: false,
            archived: false,
        };
        assert_that!(certificate.days_until_expiry(now), eq(10));
        assert_that!(certificate.days_until_expiry(now + day * 11), eq(-1));
    }
}
