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

#[derive(thiserror::Error, Debug)]
pub enum CryptoError {
    /// Caller supplied data that can never be processed, e.g. an oversized secret.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    /// A TPM structure was truncated or carried trailing bytes.
    #[error("Malformed structure: {0}")]
    Malformed(String),
    #[error("Unsupported asymmetric encryption scheme: {0:#06x}")]
    UnsupportedScheme(u16),
    #[error("Invalid key: {0}")]
    KeySpec(String),
    #[error("Decryption failed: {0}")]
    Decryption(String),
    #[error("Encryption failed: {0}")]
    Encryption(String),
    #[error("Integrity check failed")]
    IntegrityMismatch,
}
