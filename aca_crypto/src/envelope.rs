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

//! Hybrid RSA/AES envelopes of the TPM 1.2 identity protocol.

use std::sync::Arc;

use aes::{Aes128, Aes192, Aes256};
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rsa::{Oaep, Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};
use sha1::{Digest, Sha1};
use zeroize::Zeroizing;

use crate::{
    backend::BackendRng,
    tpm12::{AsymmetricScheme, IdentityRequest, SymmetricKey, TpmStruct},
    CryptoBackend, CryptoError, AES_BLOCK_SIZE,
};

/// OAEP label the TPM requires on data it decrypts with its endorsement key.
const TCPA_LABEL: &str = "TCPA";

/// Length of the session keys generated for identity responses.
pub const SESSION_KEY_LENGTH: usize = 16;

/// Holds the CA private key and unwraps/wraps TPM 1.2 identity envelopes.
pub struct EnvelopeCrypto {
    private_key: RsaPrivateKey,
    backend: Arc<dyn CryptoBackend>,
}

impl EnvelopeCrypto {
    pub fn new(private_key: RsaPrivateKey, backend: Arc<dyn CryptoBackend>) -> Self {
        Self { private_key, backend }
    }

    /// Recovers the plaintext identity proof from an identity request.
    ///
    /// The asymmetric blob holds a [`SymmetricKey`] encrypted to the CA key.
    /// The IV comes from the symmetric parameters when present, otherwise it
    /// is the first block of the symmetric blob.
    pub fn unwrap(&self, request: &IdentityRequest) -> Result<Vec<u8>, CryptoError> {
        let (iv, ciphertext) = match request.symmetric_algorithm.iv() {
            Some(iv) => (iv, request.symmetric_blob.as_slice()),
            None => {
                if request.symmetric_blob.len() < AES_BLOCK_SIZE {
                    return Err(CryptoError::Malformed(format!(
                        "symmetric blob of {} bytes can't carry an IV",
                        request.symmetric_blob.len()
                    )));
                }
                request.symmetric_blob.split_at(AES_BLOCK_SIZE)
            }
        };

        let scheme = AsymmetricScheme::try_from(request.asymmetric_algorithm.encryption_scheme)?;
        let key_bytes = Zeroizing::new(self.decrypt_asymmetric(&request.asymmetric_blob, scheme)?);
        let symmetric_key = SymmetricKey::decode(&key_bytes)?;
        let key = Zeroizing::new(symmetric_key.key);

        aes_cbc_decrypt(&key, iv, ciphertext)
    }

    fn decrypt_asymmetric(
        &self,
        blob: &[u8],
        scheme: AsymmetricScheme,
    ) -> Result<Vec<u8>, CryptoError> {
        let mut rng = BackendRng(self.backend.as_ref());
        match scheme {
            AsymmetricScheme::Oaep => {
                self.private_key.decrypt_blinded(&mut rng, Oaep::new::<Sha1>(), blob)
            }
            AsymmetricScheme::Pkcs1v15 => {
                self.private_key.decrypt_blinded(&mut rng, Pkcs1v15Encrypt, blob)
            }
        }
        .map_err(|err| {
            CryptoError::Decryption(format!("couldn't decrypt asymmetric blob ({scheme:?}): {err}"))
        })
    }

    /// Produces the asymmetric contents of an identity response:
    /// `RSA-OAEP(SHA-1, "TCPA")(session key || SHA-1(identity key))`, readable
    /// only by the TPM owning `recipient`.
    pub fn seal_asymmetric(
        &self,
        identity_key: &[u8],
        session_key: &[u8],
        recipient: &RsaPublicKey,
    ) -> Result<Vec<u8>, CryptoError> {
        let mut contents = Zeroizing::new(session_key.to_vec());
        contents.extend_from_slice(&Sha1::digest(identity_key));
        recipient
            .encrypt(
                &mut BackendRng(self.backend.as_ref()),
                Oaep::new_with_label::<Sha1, _>(TCPA_LABEL),
                &contents,
            )
            .map_err(|err| CryptoError::Encryption(format!("couldn't seal session key: {err}")))
    }

    /// Encrypts a certificate under the session key with a fresh IV and
    /// returns `IV || ciphertext`.
    pub fn seal_attestation(
        &self,
        certificate: &[u8],
        session_key: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        let iv = self.backend.random_bytes(AES_BLOCK_SIZE);
        let mut sealed = iv.clone();
        sealed.extend(aes_cbc_encrypt(session_key, &iv, certificate)?);
        Ok(sealed)
    }

    /// A new AES-128 CBC session key.
    pub fn generate_session_key(&self) -> SymmetricKey {
        SymmetricKey::aes_cbc(self.backend.random_bytes(SESSION_KEY_LENGTH))
    }
}

/// AES-CBC with PKCS#5 padding, key size picked from the key length.
pub fn aes_cbc_encrypt(key: &[u8], iv: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let key_error = |err| CryptoError::KeySpec(format!("couldn't init AES-CBC: {err}"));
    Ok(match key.len() {
        16 => cbc::Encryptor::<Aes128>::new_from_slices(key, iv)
            .map_err(key_error)?
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext),
        24 => cbc::Encryptor::<Aes192>::new_from_slices(key, iv)
            .map_err(key_error)?
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext),
        32 => cbc::Encryptor::<Aes256>::new_from_slices(key, iv)
            .map_err(key_error)?
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext),
        other => return Err(CryptoError::KeySpec(format!("{other} byte AES key"))),
    })
}

pub fn aes_cbc_decrypt(key: &[u8], iv: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let key_error = |err| CryptoError::KeySpec(format!("couldn't init AES-CBC: {err}"));
    let padding_error =
        |err| CryptoError::Decryption(format!("couldn't decrypt symmetric blob: {err}"));
    match key.len() {
        16 => cbc::Decryptor::<Aes128>::new_from_slices(key, iv)
            .map_err(key_error)?
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(padding_error),
        24 => cbc::Decryptor::<Aes192>::new_from_slices(key, iv)
            .map_err(key_error)?
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(padding_error),
        32 => cbc::Decryptor::<Aes256>::new_from_slices(key, iv)
            .map_err(key_error)?
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(padding_error),
        other => Err(CryptoError::KeySpec(format!("{other} byte AES key"))),
    }
}
