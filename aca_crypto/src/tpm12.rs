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

//! Wire codecs for the TPM 1.2 identity structures exchanged during
//! TPM_CollateIdentityRequest / TPM_ActivateIdentity.
//! <https://trustedcomputinggroup.org/resource/tpm-main-specification/>
//!
//! All integers are big-endian. Variable length fields are preceded by a
//! size field, which may appear earlier in the structure than the data it
//! describes (e.g. [`IdentityRequest`]).

use crate::CryptoError;

pub const TPM_ALG_RSA: u32 = 0x0000_0001;
pub const TPM_ALG_AES128: u32 = 0x0000_0006;

pub const TPM_ES_RSAESPKCSV15: u16 = 0x0002;
pub const TPM_ES_RSAESOAEP_SHA1_MGF1: u16 = 0x0003;
pub const TPM_ES_SYM_CBC_PKCS5PAD: u16 = 0x00ff;

/// Asymmetric scheme used by the client to wrap the session key of an
/// identity request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AsymmetricScheme {
    /// RSAES-OAEP with SHA-1 and MGF1-SHA-1.
    Oaep,
    /// Legacy RSAES-PKCS1-v1_5.
    Pkcs1v15,
}

impl TryFrom<u16> for AsymmetricScheme {
    type Error = CryptoError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            TPM_ES_RSAESOAEP_SHA1_MGF1 => Ok(AsymmetricScheme::Oaep),
            TPM_ES_RSAESPKCSV15 => Ok(AsymmetricScheme::Pkcs1v15),
            other => Err(CryptoError::UnsupportedScheme(other)),
        }
    }
}

/// Binary encoding shared by every structure in this module.
pub trait TpmStruct: Sized {
    fn read_from(reader: &mut Reader<'_>) -> Result<Self, CryptoError>;

    fn write_to(&self, writer: &mut Writer);

    /// Decodes a structure that must span all of `bytes`.
    fn decode(bytes: &[u8]) -> Result<Self, CryptoError> {
        let mut reader = Reader::new(bytes);
        let value = Self::read_from(&mut reader)?;
        reader.finish()?;
        Ok(value)
    }

    fn encode(&self) -> Vec<u8> {
        let mut writer = Writer::default();
        self.write_to(&mut writer);
        writer.into_bytes()
    }
}

/// Bounds checked big-endian cursor.
pub struct Reader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    pub fn bytes(&mut self, len: usize) -> Result<&'a [u8], CryptoError> {
        let end = self
            .offset
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| {
                CryptoError::Malformed(format!(
                    "needed {len} bytes at offset {} but only {} remain",
                    self.offset,
                    self.data.len() - self.offset
                ))
            })?;
        let slice = &self.data[self.offset..end];
        self.offset = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], CryptoError> {
        let mut array = [0u8; N];
        array.copy_from_slice(self.bytes(N)?);
        Ok(array)
    }

    pub fn u16(&mut self) -> Result<u16, CryptoError> {
        Ok(u16::from_be_bytes(self.array()?))
    }

    pub fn u32(&mut self) -> Result<u32, CryptoError> {
        Ok(u32::from_be_bytes(self.array()?))
    }

    /// Reads a length that was announced by a preceding size field.
    pub fn sized(&mut self, len: u32) -> Result<&'a [u8], CryptoError> {
        self.bytes(len as usize)
    }

    /// Reads a `u32` size followed by that many bytes.
    pub fn prefixed(&mut self) -> Result<&'a [u8], CryptoError> {
        let len = self.u32()?;
        self.sized(len)
    }

    /// Reads a `u32` size followed by a nested structure of exactly that size.
    pub fn prefixed_struct<T: TpmStruct>(&mut self) -> Result<T, CryptoError> {
        T::decode(self.prefixed()?)
    }

    pub fn finish(&self) -> Result<(), CryptoError> {
        if self.offset == self.data.len() {
            Ok(())
        } else {
            Err(CryptoError::Malformed(format!(
                "{} trailing bytes after structure",
                self.data.len() - self.offset
            )))
        }
    }
}

#[derive(Default)]
pub struct Writer {
    bytes: Vec<u8>,
}

impl Writer {
    pub fn u16(&mut self, value: u16) {
        self.bytes.extend_from_slice(&value.to_be_bytes());
    }

    pub fn u32(&mut self, value: u32) {
        self.bytes.extend_from_slice(&value.to_be_bytes());
    }

    pub fn raw(&mut self, bytes: &[u8]) {
        self.bytes.extend_from_slice(bytes);
    }

    pub fn size_of(&mut self, bytes: &[u8]) {
        self.u32(bytes.len() as u32);
    }

    pub fn prefixed(&mut self, bytes: &[u8]) {
        self.size_of(bytes);
        self.raw(bytes);
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// TPM_KEY_PARMS for an asymmetric key. The algorithm specific parameters are
/// kept opaque.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AsymmetricKeyParams {
    pub algorithm_id: u32,
    pub encryption_scheme: u16,
    pub signature_scheme: u16,
    pub params: Vec<u8>,
}

impl TpmStruct for AsymmetricKeyParams {
    fn read_from(reader: &mut Reader<'_>) -> Result<Self, CryptoError> {
        Ok(Self {
            algorithm_id: reader.u32()?,
            encryption_scheme: reader.u16()?,
            signature_scheme: reader.u16()?,
            params: reader.prefixed()?.to_vec(),
        })
    }

    fn write_to(&self, writer: &mut Writer) {
        writer.u32(self.algorithm_id);
        writer.u16(self.encryption_scheme);
        writer.u16(self.signature_scheme);
        writer.prefixed(&self.params);
    }
}

/// TPM_SYMMETRIC_KEY_PARMS.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SymmetricSubParams {
    pub key_length: u32,
    pub block_size: u32,
    pub iv: Vec<u8>,
}

impl TpmStruct for SymmetricSubParams {
    fn read_from(reader: &mut Reader<'_>) -> Result<Self, CryptoError> {
        Ok(Self {
            key_length: reader.u32()?,
            block_size: reader.u32()?,
            iv: reader.prefixed()?.to_vec(),
        })
    }

    fn write_to(&self, writer: &mut Writer) {
        writer.u32(self.key_length);
        writer.u32(self.block_size);
        writer.prefixed(&self.iv);
    }
}

/// TPM_KEY_PARMS for a symmetric algorithm. `sub_params` is absent when the
/// size field is zero.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SymmetricKeyParams {
    pub algorithm_id: u32,
    pub encryption_scheme: u16,
    pub signature_scheme: u16,
    pub sub_params: Option<SymmetricSubParams>,
}

impl SymmetricKeyParams {
    /// Explicit IV carried in the parameters, if any.
    pub fn iv(&self) -> Option<&[u8]> {
        self.sub_params.as_ref().map(|params| params.iv.as_slice()).filter(|iv| !iv.is_empty())
    }
}

impl TpmStruct for SymmetricKeyParams {
    fn read_from(reader: &mut Reader<'_>) -> Result<Self, CryptoError> {
        let algorithm_id = reader.u32()?;
        let encryption_scheme = reader.u16()?;
        let signature_scheme = reader.u16()?;
        let params = reader.prefixed()?;
        let sub_params =
            if params.is_empty() { None } else { Some(SymmetricSubParams::decode(params)?) };
        Ok(Self { algorithm_id, encryption_scheme, signature_scheme, sub_params })
    }

    fn write_to(&self, writer: &mut Writer) {
        writer.u32(self.algorithm_id);
        writer.u16(self.encryption_scheme);
        writer.u16(self.signature_scheme);
        match &self.sub_params {
            Some(sub_params) => writer.prefixed(&sub_params.encode()),
            None => writer.u32(0),
        }
    }
}

/// TPM_SYMMETRIC_KEY: the session key wrapped inside the asymmetric blobs.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SymmetricKey {
    pub algorithm_id: u32,
    pub encryption_scheme: u16,
    pub key: Vec<u8>,
}

impl SymmetricKey {
    /// An AES-128 CBC/PKCS#5 key, the only kind this CA hands out.
    pub fn aes_cbc(key: Vec<u8>) -> Self {
        Self { algorithm_id: TPM_ALG_AES128, encryption_scheme: TPM_ES_SYM_CBC_PKCS5PAD, key }
    }
}

impl TpmStruct for SymmetricKey {
    fn read_from(reader: &mut Reader<'_>) -> Result<Self, CryptoError> {
        let algorithm_id = reader.u32()?;
        let encryption_scheme = reader.u16()?;
        let key_size = reader.u16()?;
        let key = reader.bytes(key_size as usize)?.to_vec();
        Ok(Self { algorithm_id, encryption_scheme, key })
    }

    fn write_to(&self, writer: &mut Writer) {
        writer.u32(self.algorithm_id);
        writer.u16(self.encryption_scheme);
        writer.u16(self.key.len() as u16);
        writer.raw(&self.key);
    }
}

/// TPM_PUBKEY. For RSA keys `key` holds the big-endian modulus.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AsymmetricPublicKey {
    pub params: AsymmetricKeyParams,
    pub key: Vec<u8>,
}

impl TpmStruct for AsymmetricPublicKey {
    fn read_from(reader: &mut Reader<'_>) -> Result<Self, CryptoError> {
        let params = AsymmetricKeyParams::read_from(reader)?;
        Ok(Self { params, key: reader.prefixed()?.to_vec() })
    }

    fn write_to(&self, writer: &mut Writer) {
        self.params.write_to(writer);
        writer.prefixed(&self.key);
    }
}

/// TPM_IDENTITY_REQ.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IdentityRequest {
    pub asymmetric_algorithm: AsymmetricKeyParams,
    pub symmetric_algorithm: SymmetricKeyParams,
    pub asymmetric_blob: Vec<u8>,
    pub symmetric_blob: Vec<u8>,
}

impl TpmStruct for IdentityRequest {
    fn read_from(reader: &mut Reader<'_>) -> Result<Self, CryptoError> {
        let asymmetric_size = reader.u32()?;
        let symmetric_size = reader.u32()?;
        let asymmetric_algorithm = AsymmetricKeyParams::read_from(reader)?;
        let symmetric_algorithm = SymmetricKeyParams::read_from(reader)?;
        Ok(Self {
            asymmetric_algorithm,
            symmetric_algorithm,
            asymmetric_blob: reader.sized(asymmetric_size)?.to_vec(),
            symmetric_blob: reader.sized(symmetric_size)?.to_vec(),
        })
    }

    fn write_to(&self, writer: &mut Writer) {
        writer.size_of(&self.asymmetric_blob);
        writer.size_of(&self.symmetric_blob);
        self.asymmetric_algorithm.write_to(writer);
        self.symmetric_algorithm.write_to(writer);
        writer.raw(&self.asymmetric_blob);
        writer.raw(&self.symmetric_blob);
    }
}

/// TPM_IDENTITY_PROOF, the plaintext of the symmetric blob of an
/// [`IdentityRequest`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IdentityProof {
    pub version: [u8; 4],
    pub identity_key: AsymmetricPublicKey,
    pub label: Vec<u8>,
    pub identity_binding: Vec<u8>,
    pub endorsement_credential: Vec<u8>,
    pub platform_credential: Vec<u8>,
    pub conformance_credential: Vec<u8>,
}

impl TpmStruct for IdentityProof {
    fn read_from(reader: &mut Reader<'_>) -> Result<Self, CryptoError> {
        let version = reader.array()?;
        let label_size = reader.u32()?;
        let identity_binding_size = reader.u32()?;
        let endorsement_size = reader.u32()?;
        let platform_size = reader.u32()?;
        let conformance_size = reader.u32()?;
        let identity_key = AsymmetricPublicKey::read_from(reader)?;
        Ok(Self {
            version,
            identity_key,
            label: reader.sized(label_size)?.to_vec(),
            identity_binding: reader.sized(identity_binding_size)?.to_vec(),
            endorsement_credential: reader.sized(endorsement_size)?.to_vec(),
            platform_credential: reader.sized(platform_size)?.to_vec(),
            conformance_credential: reader.sized(conformance_size)?.to_vec(),
        })
    }

    fn write_to(&self, writer: &mut Writer) {
        writer.raw(&self.version);
        writer.size_of(&self.label);
        writer.size_of(&self.identity_binding);
        writer.size_of(&self.endorsement_credential);
        writer.size_of(&self.platform_credential);
        writer.size_of(&self.conformance_credential);
        self.identity_key.write_to(writer);
        writer.raw(&self.label);
        writer.raw(&self.identity_binding);
        writer.raw(&self.endorsement_credential);
        writer.raw(&self.platform_credential);
        writer.raw(&self.conformance_credential);
    }
}

/// Transport envelope around an [`IdentityRequest`] as sent by the TPM 1.2
/// provisioning client.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IdentityRequestEnvelope {
    pub request: IdentityRequest,
    /// ASCII hex of the endorsement key modulus.
    pub endorsement_credential_modulus: Vec<u8>,
    pub endorsement_credential: Vec<u8>,
    pub platform_credential: Vec<u8>,
    /// Encoded device info report.
    pub device_info_report: Vec<u8>,
}

impl TpmStruct for IdentityRequestEnvelope {
    fn read_from(reader: &mut Reader<'_>) -> Result<Self, CryptoError> {
        Ok(Self {
            request: reader.prefixed_struct()?,
            endorsement_credential_modulus: reader.prefixed()?.to_vec(),
            endorsement_credential: reader.prefixed()?.to_vec(),
            platform_credential: reader.prefixed()?.to_vec(),
            device_info_report: reader.prefixed()?.to_vec(),
        })
    }

    fn write_to(&self, writer: &mut Writer) {
        writer.prefixed(&self.request.encode());
        writer.prefixed(&self.endorsement_credential_modulus);
        writer.prefixed(&self.endorsement_credential);
        writer.prefixed(&self.platform_credential);
        writer.prefixed(&self.device_info_report);
    }
}

/// TPM_SYM_CA_ATTESTATION: the issued credential encrypted under the session key.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SymmetricAttestation {
    pub algorithm: SymmetricKeyParams,
    /// IV followed by the AES-CBC ciphertext.
    pub credential: Vec<u8>,
}

impl TpmStruct for SymmetricAttestation {
    fn read_from(reader: &mut Reader<'_>) -> Result<Self, CryptoError> {
        let credential_size = reader.u32()?;
        let algorithm = SymmetricKeyParams::read_from(reader)?;
        Ok(Self { algorithm, credential: reader.sized(credential_size)?.to_vec() })
    }

    fn write_to(&self, writer: &mut Writer) {
        writer.size_of(&self.credential);
        self.algorithm.write_to(writer);
        writer.raw(&self.credential);
    }
}

/// Response to a TPM 1.2 identity request, consumed by TPM_ActivateIdentity.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IdentityResponseEnvelope {
    pub asymmetric_contents: Vec<u8>,
    pub symmetric_attestation: SymmetricAttestation,
}

impl TpmStruct for IdentityResponseEnvelope {
    fn read_from(reader: &mut Reader<'_>) -> Result<Self, CryptoError> {
        Ok(Self {
            asymmetric_contents: reader.prefixed()?.to_vec(),
            symmetric_attestation: SymmetricAttestation::read_from(reader)?,
        })
    }

    fn write_to(&self, writer: &mut Writer) {
        writer.prefixed(&self.asymmetric_contents);
        self.symmetric_attestation.write_to(writer);
    }
}
