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

//! Server side of TPM2_MakeCredential (TPM 2.0 Part 1, section 24) for RSA
//! 2048 endorsement keys, producing the blob that TPM2_ActivateCredential
//! consumes on the device.

use aes::Aes128;
use cfb_mode::{Decryptor, Encryptor};
use cipher::{AsyncStreamCipher, KeyIvInit};
use hmac::{Hmac, Mac};
use rsa::{traits::PublicKeyParts, Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};
use static_assertions::const_assert_eq;
use zeroize::Zeroizing;

use crate::{
    backend::BackendRng,
    kdf::kdfa_sha256,
    public_key::{fixed_length_modulus, RSA_MODULUS_LENGTH},
    CryptoBackend, CryptoError, AES_BLOCK_SIZE,
};

type HmacSha256 = Hmac<Sha256>;

pub const SEED_LENGTH: usize = 32;
pub const MAX_SECRET_LENGTH: usize = 32;
const AES_KEY_LENGTH: usize = 16;
const HMAC_KEY_LENGTH: usize = 32;
const HMAC_SIZE_LENGTH: usize = 2;

/// OAEP label required by the TPM for credential seeds.
const IDENTITY_LABEL: &str = "IDENTITY\0";

/// nameAlg (TPM_ALG_SHA256) prepended to the digest in a TPM2 name.
pub const AK_NAME_PREFIX: [u8; 2] = [0x00, 0x0b];

/// TPMT_PUBLIC header of the RSA 2048 restricted signing key template used by
/// the provisioning client, up to (but excluding) the modulus.
pub const AK_NAME_HASH_PREFIX: [u8; 24] = [
    0x00, 0x01, 0x00, 0x0b, 0x00, 0x05, 0x00, 0x72, 0x00, 0x00, 0x00, 0x10, 0x00, 0x14, 0x00, 0x0b,
    0x08, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00,
];

pub const AK_NAME_LENGTH: usize = AK_NAME_PREFIX.len() + 32;

/// A byte range inside the credential blob.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlobField {
    pub offset: usize,
    pub len: usize,
}

impl BlobField {
    const fn after(previous: BlobField, len: usize) -> Self {
        Self { offset: previous.end(), len }
    }

    pub const fn end(&self) -> usize {
        self.offset + self.len
    }

    pub fn range(&self) -> std::ops::Range<usize> {
        self.offset..self.end()
    }
}

/// Size of the outer credential, stored with its two bytes swapped.
pub const TOP_SIZE: BlobField = BlobField { offset: 0, len: 2 };
/// Size of the integrity digest.
pub const HMAC_SIZE: BlobField = BlobField::after(TOP_SIZE, HMAC_SIZE_LENGTH);
pub const INTEGRITY: BlobField = BlobField::after(HMAC_SIZE, 32);
/// Encrypted secret, zero filled after its end.
pub const ENC_IDENTITY: BlobField = BlobField::after(INTEGRITY, 98);
/// Marker preceding the encrypted seed.
pub const SEED_MARKER: BlobField = BlobField::after(ENC_IDENTITY, 2);
pub const ENC_SEED: BlobField = BlobField::after(SEED_MARKER, RSA_MODULUS_LENGTH);

pub const CREDENTIAL_BLOB_LENGTH: usize = 392;

const_assert_eq!(ENC_SEED.end(), CREDENTIAL_BLOB_LENGTH);
const_assert_eq!(INTEGRITY.offset, 4);
const_assert_eq!(ENC_IDENTITY.offset, 36);
const_assert_eq!(SEED_MARKER.offset, 134);
const_assert_eq!(ENC_SEED.offset, 136);
// The size-prefixed maximal secret must fit the encrypted identity region.
static_assertions::const_assert!(HMAC_SIZE_LENGTH + MAX_SECRET_LENGTH <= ENC_IDENTITY.len);

/// The 392 byte credential blob.
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialBlob([u8; CREDENTIAL_BLOB_LENGTH]);

impl CredentialBlob {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn field(&self, field: BlobField) -> &[u8] {
        &self.0[field.range()]
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.0.to_vec()
    }
}

impl TryFrom<&[u8]> for CredentialBlob {
    type Error = CryptoError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let blob = bytes.try_into().map_err(|_| {
            CryptoError::Malformed(format!(
                "credential blob is {} bytes, expected {CREDENTIAL_BLOB_LENGTH}",
                bytes.len()
            ))
        })?;
        Ok(Self(blob))
    }
}

impl std::fmt::Debug for CredentialBlob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("CredentialBlob").field(&hex::encode(self.0)).finish()
    }
}

/// Writes fields into a zeroed blob, rejecting data that doesn't fit.
struct CredentialBlobBuilder {
    blob: [u8; CREDENTIAL_BLOB_LENGTH],
}

impl CredentialBlobBuilder {
    fn new() -> Self {
        Self { blob: [0u8; CREDENTIAL_BLOB_LENGTH] }
    }

    /// Fills `field` completely.
    fn exact(mut self, field: BlobField, bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != field.len {
            return Err(CryptoError::InvalidInput(format!(
                "field at offset {} takes {} bytes, got {}",
                field.offset,
                field.len,
                bytes.len()
            )));
        }
        self.blob[field.range()].copy_from_slice(bytes);
        Ok(self)
    }

    /// Writes `bytes` at the start of `field`, leaving the rest zero.
    fn leading(mut self, field: BlobField, bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() > field.len {
            return Err(CryptoError::InvalidInput(format!(
                "field at offset {} holds at most {} bytes, got {}",
                field.offset,
                field.len,
                bytes.len()
            )));
        }
        self.blob[field.offset..field.offset + bytes.len()].copy_from_slice(bytes);
        Ok(self)
    }

    fn build(self) -> CredentialBlob {
        CredentialBlob(self.blob)
    }
}

/// Computes the TPM2 name of an RSA 2048 attestation key:
/// `nameAlg || SHA256(template header || modulus)`.
pub fn ak_name(ak: &RsaPublicKey) -> Result<[u8; AK_NAME_LENGTH], CryptoError> {
    let modulus = fixed_length_modulus(ak, RSA_MODULUS_LENGTH)?;
    let digest = Sha256::new().chain_update(AK_NAME_HASH_PREFIX).chain_update(&modulus).finalize();
    let mut name = [0u8; AK_NAME_LENGTH];
    name[..AK_NAME_PREFIX.len()].copy_from_slice(&AK_NAME_PREFIX);
    name[AK_NAME_PREFIX.len()..].copy_from_slice(&digest);
    Ok(name)
}

/// Builds a credential blob protecting `secret` for the TPM that holds `ek`
/// and has `ak` loaded.
pub fn make_credential(
    backend: &dyn CryptoBackend,
    ek: &RsaPublicKey,
    ak: &RsaPublicKey,
    secret: &[u8],
) -> Result<CredentialBlob, CryptoError> {
    let mut seed = Zeroizing::new([0u8; SEED_LENGTH]);
    backend.fill_random(seed.as_mut());
    make_credential_with_seed(backend, ek, ak, secret, &seed)
}

/// [`make_credential`] with a caller chosen seed. The backend still supplies
/// the OAEP padding randomness.
pub fn make_credential_with_seed(
    backend: &dyn CryptoBackend,
    ek: &RsaPublicKey,
    ak: &RsaPublicKey,
    secret: &[u8],
    seed: &[u8; SEED_LENGTH],
) -> Result<CredentialBlob, CryptoError> {
    if secret.len() > MAX_SECRET_LENGTH {
        return Err(CryptoError::InvalidInput(format!(
            "secret is {} bytes, at most {MAX_SECRET_LENGTH} are allowed",
            secret.len()
        )));
    }
    if ek.size() != RSA_MODULUS_LENGTH {
        return Err(CryptoError::InvalidInput(format!(
            "endorsement key is {} bits, only 2048 bit keys are supported",
            ek.size() * 8
        )));
    }

    let enc_seed = ek
        .encrypt(
            &mut BackendRng(backend),
            Oaep::new_with_label::<Sha256, _>(IDENTITY_LABEL),
            seed,
        )
        .map_err(|err| CryptoError::Encryption(format!("couldn't encrypt seed: {err}")))?;

    let name = ak_name(ak)?;
    let aes_key = Zeroizing::new(kdfa_sha256(seed, "STORAGE", Some(&name), AES_KEY_LENGTH)?);
    let hmac_key = Zeroizing::new(kdfa_sha256(seed, "INTEGRITY", None, HMAC_KEY_LENGTH)?);

    let mut enc_secret = Vec::with_capacity(HMAC_SIZE_LENGTH + secret.len());
    enc_secret.extend_from_slice(&(secret.len() as u16).to_be_bytes());
    enc_secret.extend_from_slice(secret);
    Encryptor::<Aes128>::new_from_slices(&aes_key, &[0u8; AES_BLOCK_SIZE])
        .map_err(|err| CryptoError::KeySpec(format!("couldn't init AES-CFB: {err}")))?
        .encrypt(&mut enc_secret);

    let integrity = integrity_hmac(&hmac_key, &enc_secret, &name)?;
    let top_size = (HMAC_SIZE_LENGTH + HMAC_KEY_LENGTH + enc_secret.len()) as u16;

    Ok(CredentialBlobBuilder::new()
        .exact(TOP_SIZE, &top_size.to_le_bytes())?
        .exact(HMAC_SIZE, &(HMAC_KEY_LENGTH as u16).to_be_bytes())?
        .exact(INTEGRITY, &integrity)?
        .leading(ENC_IDENTITY, &enc_secret)?
        .exact(SEED_MARKER, &[0x00, 0x01])?
        .exact(ENC_SEED, &enc_seed)?
        .build())
}

fn integrity_hmac(key: &[u8], enc_secret: &[u8], name: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key)
        .map_err(|err| CryptoError::KeySpec(format!("couldn't key integrity HMAC: {err}")))?;
    mac.update(enc_secret);
    mac.update(name);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// TPM side inverse of [`make_credential`], as TPM2_ActivateCredential
/// performs it. Used by provisioning clients that hold the endorsement key in
/// software and by tests.
pub fn activate_credential(
    ek: &RsaPrivateKey,
    ak: &RsaPublicKey,
    blob: &CredentialBlob,
) -> Result<Vec<u8>, CryptoError> {
    let seed = Zeroizing::new(
        ek.decrypt(Oaep::new_with_label::<Sha256, _>(IDENTITY_LABEL), blob.field(ENC_SEED))
            .map_err(|err| CryptoError::Decryption(format!("couldn't decrypt seed: {err}")))?,
    );
    let name = ak_name(ak)?;
    let aes_key = Zeroizing::new(kdfa_sha256(&seed, "STORAGE", Some(&name), AES_KEY_LENGTH)?);
    let hmac_key = Zeroizing::new(kdfa_sha256(&seed, "INTEGRITY", None, HMAC_KEY_LENGTH)?);

    let top_size = u16::from_le_bytes([blob.field(TOP_SIZE)[0], blob.field(TOP_SIZE)[1]]) as usize;
    let enc_len = top_size
        .checked_sub(HMAC_SIZE_LENGTH + HMAC_KEY_LENGTH)
        .filter(|len| *len >= HMAC_SIZE_LENGTH && *len <= ENC_IDENTITY.len)
        .ok_or_else(|| CryptoError::Malformed(format!("invalid credential size {top_size}")))?;
    let enc_secret = &blob.field(ENC_IDENTITY)[..enc_len];

    let mut mac = <HmacSha256 as Mac>::new_from_slice(&hmac_key)
        .map_err(|err| CryptoError::KeySpec(format!("couldn't key integrity HMAC: {err}")))?;
    mac.update(enc_secret);
    mac.update(&name);
    mac.verify_slice(blob.field(INTEGRITY)).map_err(|_| CryptoError::IntegrityMismatch)?;

    let mut plaintext = Zeroizing::new(enc_secret.to_vec());
    Decryptor::<Aes128>::new_from_slices(&aes_key, &[0u8; AES_BLOCK_SIZE])
        .map_err(|err| CryptoError::KeySpec(format!("couldn't init AES-CFB: {err}")))?
        .decrypt(&mut plaintext);

    let secret_len = u16::from_be_bytes([plaintext[0], plaintext[1]]) as usize;
    if secret_len != plaintext.len() - HMAC_SIZE_LENGTH {
        return Err(CryptoError::Malformed(format!(
            "secret size prefix {secret_len} doesn't match {} encrypted bytes",
            plaintext.len() - HMAC_SIZE_LENGTH
        )));
    }
    Ok(plaintext[HMAC_SIZE_LENGTH..].to_vec())
}
