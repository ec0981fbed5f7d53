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

use std::sync::Arc;

use googletest::prelude::*;
use rsa::{pkcs8::DecodePrivateKey, Oaep, RsaPrivateKey, RsaPublicKey};
use sha1::{Digest, Sha1};

use crate::{
    envelope::{aes_cbc_decrypt, aes_cbc_encrypt, EnvelopeCrypto},
    kdf::kdfa_sha256,
    make_credential::{
        activate_credential, ak_name, make_credential, make_credential_with_seed, CredentialBlob,
        CREDENTIAL_BLOB_LENGTH, ENC_IDENTITY, ENC_SEED, HMAC_SIZE, INTEGRITY, SEED_MARKER,
        TOP_SIZE,
    },
    tpm12::{
        AsymmetricKeyParams, IdentityRequest, SymmetricKey, SymmetricKeyParams,
        SymmetricSubParams, TpmStruct, TPM_ALG_AES128, TPM_ALG_RSA, TPM_ES_RSAESOAEP_SHA1_MGF1,
        TPM_ES_RSAESPKCSV15, TPM_ES_SYM_CBC_PKCS5PAD,
    },
    CryptoBackend, CryptoError, SeededCryptoBackend,
};

const TEST_ACA_KEY: &str = include_str!("../testdata/aca.pem");
const TEST_EK_KEY: &str = include_str!("../testdata/ek.pem");
const TEST_AK_KEY: &str = include_str!("../testdata/ak.pem");

const TEST_SEED: [u8; 32] = [
    0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0a, 0x0b, 0x0c, 0x0d, 0x0e, 0x0f,
    0x10, 0x11, 0x12, 0x13, 0x14, 0x15, 0x16, 0x17, 0x18, 0x19, 0x1a, 0x1b, 0x1c, 0x1d, 0x1e, 0x1f,
];
const TEST_SECRET: [u8; 20] = [
    0xa0, 0xa1, 0xa2, 0xa3, 0xa4, 0xa5, 0xa6, 0xa7, 0xa8, 0xa9, 0xaa, 0xab, 0xac, 0xad, 0xae, 0xaf,
    0xb0, 0xb1, 0xb2, 0xb3,
];

// Known answers for the AK in testdata/ak.pem, computed independently.
const EXPECTED_AK_NAME: &str = "000b56f88082d013528c576a814b54b64204932854dda9cbfa8bc2a3a1961b0649e0";
const EXPECTED_STORAGE_KEY: &str = "e08bd416dab74312ed973f3678b2d240";
const EXPECTED_INTEGRITY_KEY: &str =
    "bacf689f634ece301e1f1b15b072d9c87db6a69585db42b1a0cb8f73ebe2692e";
const EXPECTED_ENC_SECRET: &str = "ab2f762cc6f5b7fcf907d841d6807b23f35a21809a59";
const EXPECTED_INTEGRITY: &str = "bcfaf90d2c81a8b029ba903abeebbd69ad914171438d06d3a077061c89b6bf61";

fn private_key(pem: &str) -> RsaPrivateKey {
    RsaPrivateKey::from_pkcs8_pem(pem).expect("couldn't parse test key")
}

fn public_key(pem: &str) -> RsaPublicKey {
    private_key(pem).to_public_key()
}

fn backend() -> Arc<dyn CryptoBackend> {
    Arc::new(SeededCryptoBackend::from_seed(42))
}

#[googletest::test]
fn test_ak_name_known_answer() {
    let name = ak_name(&public_key(TEST_AK_KEY)).unwrap();
    assert_that!(hex::encode(name), eq(EXPECTED_AK_NAME));
}

#[googletest::test]
fn test_kdfa_known_answers() {
    let name = hex::decode(EXPECTED_AK_NAME).unwrap();
    let storage = kdfa_sha256(&TEST_SEED, "STORAGE", Some(&name), 16).unwrap();
    let integrity = kdfa_sha256(&TEST_SEED, "INTEGRITY", None, 32).unwrap();
    assert_that!(hex::encode(storage), eq(EXPECTED_STORAGE_KEY));
    assert_that!(hex::encode(integrity), eq(EXPECTED_INTEGRITY_KEY));
}

#[googletest::test]
fn test_make_credential_fixed_seed_layout() {
    let backend = backend();
    let blob = make_credential_with_seed(
        backend.as_ref(),
        &public_key(TEST_EK_KEY),
        &public_key(TEST_AK_KEY),
        &TEST_SECRET,
        &TEST_SEED,
    )
    .unwrap();

    let enc_secret = hex::decode(EXPECTED_ENC_SECRET).unwrap();
    assert_that!(blob.as_bytes().len(), eq(CREDENTIAL_BLOB_LENGTH));
    // 2 + 32 + 22 = 56, stored low byte first.
    assert_eq!(blob.field(TOP_SIZE), &[0x38, 0x00]);
    assert_eq!(blob.field(HMAC_SIZE), &[0x00, 0x20]);
    assert_that!(hex::encode(blob.field(INTEGRITY)), eq(EXPECTED_INTEGRITY));
    assert_eq!(&blob.field(ENC_IDENTITY)[..enc_secret.len()], enc_secret.as_slice());
    assert_that!(blob.field(ENC_IDENTITY)[enc_secret.len()..].iter().all(|b| *b == 0), eq(true));
    assert_eq!(blob.field(SEED_MARKER), &[0x00, 0x01]);

    let seed = private_key(TEST_EK_KEY)
        .decrypt(Oaep::new_with_label::<sha2::Sha256, _>("IDENTITY\0"), blob.field(ENC_SEED))
        .unwrap();
    assert_eq!(seed, TEST_SEED.to_vec());
}

#[googletest::test]
fn test_make_credential_is_deterministic_for_fixed_inputs() {
    let make = || {
        make_credential(
            &SeededCryptoBackend::from_seed(9),
            &public_key(TEST_EK_KEY),
            &public_key(TEST_AK_KEY),
            &TEST_SECRET,
        )
        .unwrap()
    };
    assert_eq!(make(), make());
}

#[googletest::test]
fn test_activate_credential_recovers_secret() {
    let backend = backend();
    let ek = private_key(TEST_EK_KEY);
    let ak = public_key(TEST_AK_KEY);
    let secret = backend.random_bytes(20);

    let blob = make_credential(backend.as_ref(), &ek.to_public_key(), &ak, &secret).unwrap();

    assert_that!(blob.as_bytes().len(), eq(392));
    assert_eq!(activate_credential(&ek, &ak, &blob).unwrap(), secret);
}

#[googletest::test]
fn test_activate_credential_detects_wrong_ak() {
    let backend = backend();
    let ek = private_key(TEST_EK_KEY);
    let blob =
        make_credential(backend.as_ref(), &ek.to_public_key(), &public_key(TEST_AK_KEY), &TEST_SECRET)
            .unwrap();

    let result = activate_credential(&ek, &public_key(TEST_ACA_KEY), &blob);
    assert!(matches!(result, Err(CryptoError::IntegrityMismatch)));
}

#[googletest::test]
fn test_make_credential_rejects_oversized_secret() {
    let result = make_credential(
        backend().as_ref(),
        &public_key(TEST_EK_KEY),
        &public_key(TEST_AK_KEY),
        &[0u8; 33],
    );
    assert!(matches!(result, Err(CryptoError::InvalidInput(_))));
}

#[googletest::test]
fn test_make_credential_accepts_maximal_secret() {
    let backend = backend();
    let ek = private_key(TEST_EK_KEY);
    let ak = public_key(TEST_AK_KEY);
    let secret = [0x5au8; 32];
    let blob = make_credential(backend.as_ref(), &ek.to_public_key(), &ak, &secret).unwrap();
    assert_eq!(blob.field(HMAC_SIZE), &[0x00, 0x20]);
    assert_eq!(activate_credential(&ek, &ak, &blob).unwrap(), secret.to_vec());
}

#[googletest::test]
fn test_credential_blob_length_is_checked() {
    assert!(CredentialBlob::try_from(&[0u8; 391][..]).is_err());
    assert!(CredentialBlob::try_from(&[0u8; 392][..]).is_ok());
}

/// Builds an identity request the way a TPM 1.2 client does.
fn client_request(
    aca: &RsaPublicKey,
    scheme: u16,
    key: &[u8],
    iv: &[u8],
    explicit_iv: bool,
    payload: &[u8],
) -> IdentityRequest {
    let backend = backend();
    let mut rng = crate::backend::BackendRng(backend.as_ref());
    let symmetric_key = SymmetricKey::aes_cbc(key.to_vec()).encode();
    let asymmetric_blob = match scheme {
        TPM_ES_RSAESPKCSV15 => aca.encrypt(&mut rng, rsa::Pkcs1v15Encrypt, &symmetric_key),
        _ => aca.encrypt(&mut rng, Oaep::new::<Sha1>(), &symmetric_key),
    }
    .unwrap();
    let ciphertext = aes_cbc_encrypt(key, iv, payload).unwrap();
    let (sub_params, symmetric_blob) = if explicit_iv {
        (Some(SymmetricSubParams { key_length: 128, block_size: 128, iv: iv.to_vec() }), ciphertext)
    } else {
        (None, [iv, ciphertext.as_slice()].concat())
    };
    IdentityRequest {
        asymmetric_algorithm: AsymmetricKeyParams {
            algorithm_id: TPM_ALG_RSA,
            encryption_scheme: scheme,
            signature_scheme: 0x0001,
            params: Vec::new(),
        },
        symmetric_algorithm: SymmetricKeyParams {
            algorithm_id: TPM_ALG_AES128,
            encryption_scheme: TPM_ES_SYM_CBC_PKCS5PAD,
            signature_scheme: 0,
            sub_params,
        },
        asymmetric_blob,
        symmetric_blob,
    }
}

#[googletest::test]
fn test_unwrap_round_trip() {
    let aca = private_key(TEST_ACA_KEY);
    let crypto = EnvelopeCrypto::new(aca.clone(), backend());
    let payload = b"identity proof bytes that span more than one block".to_vec();
    let key = [0x42u8; 16];
    let iv = [0x24u8; 16];

    for (scheme, explicit_iv) in [
        (TPM_ES_RSAESOAEP_SHA1_MGF1, true),
        (TPM_ES_RSAESOAEP_SHA1_MGF1, false),
        (TPM_ES_RSAESPKCSV15, true),
        (TPM_ES_RSAESPKCSV15, false),
    ] {
        let request = client_request(&aca.to_public_key(), scheme, &key, &iv, explicit_iv, &payload);
        assert_eq!(crypto.unwrap(&request).unwrap(), payload, "scheme {scheme:#x} explicit IV {explicit_iv}");
    }
}

#[googletest::test]
fn test_unwrap_with_wrong_ca_key_fails() {
    let request = client_request(
        &public_key(TEST_EK_KEY),
        TPM_ES_RSAESOAEP_SHA1_MGF1,
        &[1u8; 16],
        &[2u8; 16],
        true,
        b"payload",
    );
    let crypto = EnvelopeCrypto::new(private_key(TEST_ACA_KEY), backend());
    assert!(matches!(crypto.unwrap(&request), Err(CryptoError::Decryption(_))));
}

#[googletest::test]
fn test_unwrap_unknown_scheme_fails() {
    let aca = private_key(TEST_ACA_KEY);
    let mut request =
        client_request(&aca.to_public_key(), TPM_ES_RSAESOAEP_SHA1_MGF1, &[1u8; 16], &[2u8; 16], true, b"x");
    request.asymmetric_algorithm.encryption_scheme = 0x0004;
    let crypto = EnvelopeCrypto::new(aca, backend());
    assert!(matches!(crypto.unwrap(&request), Err(CryptoError::UnsupportedScheme(0x0004))));
}

#[googletest::test]
fn test_seal_asymmetric_is_readable_by_tpm() {
    let crypto = EnvelopeCrypto::new(private_key(TEST_ACA_KEY), backend());
    let ek = private_key(TEST_EK_KEY);
    let session_key = crypto.generate_session_key().encode();
    let identity_key = b"serialized TPM_PUBKEY";

    let sealed = crypto.seal_asymmetric(identity_key, &session_key, &ek.to_public_key()).unwrap();

    let opened = ek.decrypt(Oaep::new_with_label::<Sha1, _>("TCPA"), &sealed).unwrap();
    let mut expected = session_key.clone();
    expected.extend_from_slice(&Sha1::digest(identity_key));
    assert_eq!(opened, expected);
}

#[googletest::test]
fn test_seal_attestation_prepends_iv() {
    let crypto = EnvelopeCrypto::new(private_key(TEST_ACA_KEY), backend());
    let session_key = crypto.generate_session_key();
    let certificate = vec![0x30u8; 700];

    let sealed = crypto.seal_attestation(&certificate, &session_key.key).unwrap();

    // 700 bytes pad to 704, plus the IV.
    assert_that!(sealed.len(), eq(16 + 704));
    let (iv, ciphertext) = sealed.split_at(16);
    assert_eq!(aes_cbc_decrypt(&session_key.key, iv, ciphertext).unwrap(), certificate);
}

#[googletest::test]
fn test_session_key_shape() {
    let crypto = EnvelopeCrypto::new(private_key(TEST_ACA_KEY), backend());
    let key = crypto.generate_session_key();
    assert_that!(key.algorithm_id, eq(TPM_ALG_AES128));
    assert_that!(key.encryption_scheme, eq(TPM_ES_SYM_CBC_PKCS5PAD));
    assert_that!(key.key.len(), eq(16));
}

#[googletest::test]
fn test_cbc_rejects_bad_padding() {
    let ciphertext = aes_cbc_encrypt(&[7u8; 16], &[0u8; 16], b"payload").unwrap();
    let result = aes_cbc_decrypt(&[8u8; 16], &[0u8; 16], &ciphertext);
    assert!(matches!(result, Err(CryptoError::Decryption(_))));
    assert!(matches!(aes_cbc_encrypt(&[7u8; 15], &[0u8; 16], b"x"), Err(CryptoError::KeySpec(_))));
}
