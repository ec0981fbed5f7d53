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

//! Conversions between TPM key encodings and [`RsaPublicKey`].

use rsa::{traits::PublicKeyParts, BigUint, RsaPublicKey};

use crate::CryptoError;

/// Public exponent of every TPM RSA key this CA accepts.
pub const RSA_EXPONENT: u32 = 65537;

/// Size in bytes of a 2048-bit RSA modulus.
pub const RSA_MODULUS_LENGTH: usize = 256;

/// Extracts the RSA public key from a TPM2B_PUBLIC area.
///
/// The unique field of an RSA TPMT_PUBLIC is the last member of the
/// structure, so for 2048-bit keys the modulus is the trailing 256 bytes.
pub fn parse_rsa_public_area(public_area: &[u8]) -> Result<RsaPublicKey, CryptoError> {
    if public_area.len() < RSA_MODULUS_LENGTH {
        return Err(CryptoError::InvalidInput(format!(
            "public area is {} bytes, shorter than a {RSA_MODULUS_LENGTH} byte modulus",
            public_area.len()
        )));
    }
    rsa_public_key_from_modulus(&public_area[public_area.len() - RSA_MODULUS_LENGTH..])
}

/// Builds a public key from a big-endian modulus and the default exponent.
pub fn rsa_public_key_from_modulus(modulus: &[u8]) -> Result<RsaPublicKey, CryptoError> {
    RsaPublicKey::new(BigUint::from_bytes_be(modulus), BigUint::from(RSA_EXPONENT))
        .map_err(|err| CryptoError::KeySpec(format!("couldn't assemble RSA public key: {err}")))
}

/// Builds a public key from the ASCII hex modulus carried by TPM 1.2 envelopes.
pub fn rsa_public_key_from_hex_modulus(modulus: &[u8]) -> Result<RsaPublicKey, CryptoError> {
    let text = std::str::from_utf8(modulus)
        .map_err(|err| CryptoError::KeySpec(format!("modulus is not ASCII hex: {err}")))?;
    let modulus = hex::decode(text.trim())
        .map_err(|err| CryptoError::KeySpec(format!("modulus is not ASCII hex: {err}")))?;
    rsa_public_key_from_modulus(&modulus)
}

/// Returns the modulus left-padded or stripped of sign bytes to exactly
/// `len` bytes.
pub fn fixed_length_modulus(key: &RsaPublicKey, len: usize) -> Result<Vec<u8>, CryptoError> {
    let modulus = key.n().to_bytes_be();
    let significant = match modulus.iter().position(|byte| *byte != 0) {
        Some(first) => &modulus[first..],
        None => &[][..],
    };
    if significant.len() > len {
        return Err(CryptoError::InvalidInput(format!(
            "modulus is {} bytes, expected at most {len}",
            significant.len()
        )));
    }
    let mut fixed = vec![0u8; len - significant.len()];
    fixed.extend_from_slice(significant);
    Ok(fixed)
}
