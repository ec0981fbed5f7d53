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

use aca_crypto::CryptoError;

/// Errors that abort a handshake. A supply-chain FAIL verdict is not an error:
/// it is reported as a denial response.
#[derive(thiserror::Error, Debug)]
pub enum ProvisioningError {
    /// Empty or malformed wire payload. Never retried.
    #[error("Invalid request: {0}")]
    Input(String),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error("Processing failed: {0}")]
    Processing(String),
    #[error("No pending identity claim matches the nonce")]
    NonceNotFound,
    #[error("The nonce has expired")]
    NonceExpired,
    #[error("Repository failure: {0:#}")]
    Repository(#[from] anyhow::Error),
}

impl ProvisioningError {
    /// Whether the failure was caused by the caller's payload.
    pub fn is_client_error(&self) -> bool {
        matches!(self, ProvisioningError::Input(_))
    }

    /// Whether the failure means the correlation state of a certificate
    /// request couldn't be resolved.
    pub fn is_nonce_error(&self) -> bool {
        matches!(self, ProvisioningError::NonceNotFound | ProvisioningError::NonceExpired)
    }
}
