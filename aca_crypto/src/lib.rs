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

//! Cryptographic building blocks of the attestation certificate authority:
//! TPM 1.2 identity envelopes, the TPM 2.0 KDFa and the server side of
//! TPM2_MakeCredential.

extern crate static_assertions;

pub mod backend;
pub mod envelope;
pub mod error;
pub mod kdf;
pub mod make_credential;
pub mod public_key;
#[cfg(test)]
mod tests;
pub mod tpm12;

pub use backend::{CryptoBackend, OsCryptoBackend, SeededCryptoBackend};
pub use error::CryptoError;

/// Size of the AES block and of every IV this crate produces.
pub const AES_BLOCK_SIZE: usize = 16;
