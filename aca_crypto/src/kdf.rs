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

//! KDFa from TPM 2.0 Part 1, section 11.4.10.2, restricted to a single
//! HMAC-SHA256 iteration.
//! <https://trustedcomputinggroup.org/resource/tpm-library-specification/>

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::CryptoError;

type HmacSha256 = Hmac<Sha256>;

/// Largest output a single iteration can produce.
pub const MAX_KDF_OUTPUT_LENGTH: usize = 32;

/// Derives `size_bytes` of key material from `seed`.
///
/// The counter is fixed at 1, so callers must request the whole key in one
/// call. The label is NUL terminated unless it already ends with a NUL.
pub fn kdfa_sha256(
    seed: &[u8],
    label: &str,
    context: Option<&[u8]>,
    size_bytes: usize,
) -> Result<Vec<u8>, CryptoError> {
    if size_bytes == 0 || size_bytes > MAX_KDF_OUTPUT_LENGTH {
        return Err(CryptoError::InvalidInput(format!(
            "KDFa output must be between 1 and {MAX_KDF_OUTPUT_LENGTH} bytes, got {size_bytes}"
        )));
    }

    let mut mac = <HmacSha256 as Mac>::new_from_slice(seed)
        .map_err(|err| CryptoError::KeySpec(format!("couldn't key KDFa HMAC: {err}")))?;
    mac.update(&1u32.to_be_bytes());
    mac.update(label.as_bytes());
    if !label.ends_with('\0') {
        mac.update(&[0]);
    }
    if let Some(context) = context {
        mac.update(context);
    }
    mac.update(&((size_bytes * 8) as u32).to_be_bytes());

    let mut output = mac.finalize().into_bytes().to_vec();
    output.truncate(size_bytes);
    Ok(output)
}

#[cfg(test)]
mod tests {
    use googletest::prelude::*;

    use super::*;

    #[googletest::test]
    fn test_existing_terminator_is_not_doubled() {
        let seed = [0x11u8; 32];
        assert_eq!(
            kdfa_sha256(&seed, "STORAGE", None, 16).unwrap(),
            kdfa_sha256(&seed, "STORAGE\0", None, 16).unwrap()
        );
    }

    #[googletest::test]
    fn test_output_is_prefix_of_full_hmac() {
        let seed = [0x22u8; 32];
        // The requested bit length is part of the message, so a shorter output
        // is not a prefix of a longer one.
        let short = kdfa_sha256(&seed, "INTEGRITY", None, 16).unwrap();
        let long = kdfa_sha256(&seed, "INTEGRITY", None, 32).unwrap();
        assert_that!(short.len(), eq(16));
        assert_that!(long.len(), eq(32));
        assert_ne!(short[..], long[..16]);
    }

    #[googletest::test]
    fn test_oversized_output_is_rejected() {
        assert_that!(
            kdfa_sha256(&[0u8; 32], "STORAGE", None, 33),
            err(displays_as(contains_substring("between 1 and 32 bytes")))
        );
        assert_that!(kdfa_sha256(&[0u8; 32], "STORAGE", None, 0), err(anything()));
    }
}
