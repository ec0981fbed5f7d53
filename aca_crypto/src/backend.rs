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

use std::sync::{Mutex, PoisonError};

use rand_chacha::ChaCha20Rng;
use rand_core::{CryptoRng, OsRng, RngCore, SeedableRng};

/// Source of randomness for every operation that needs it: session keys, IVs,
/// seeds, nonces and OAEP padding.
///
/// A backend is handed to each component when it is constructed, so tests can
/// substitute a deterministic one.
pub trait CryptoBackend: Send + Sync {
    fn fill_random(&self, dest: &mut [u8]);

    fn random_bytes(&self, len: usize) -> Vec<u8> {
        let mut bytes = vec![0u8; len];
        self.fill_random(&mut bytes);
        bytes
    }
}

/// Operating system randomness.
#[derive(Default)]
pub struct OsCryptoBackend;

impl CryptoBackend for OsCryptoBackend {
    fn fill_random(&self, dest: &mut [u8]) {
        OsRng.fill_bytes(dest);
    }
}

/// A reproducible ChaCha20 stream. Only meant for tests.
pub struct SeededCryptoBackend {
    rng: Mutex<ChaCha20Rng>,
}

impl SeededCryptoBackend {
    pub fn from_seed(seed: u64) -> Self {
        Self { rng: Mutex::new(ChaCha20Rng::seed_from_u64(seed)) }
    }
}

impl CryptoBackend for SeededCryptoBackend {
    fn fill_random(&self, dest: &mut [u8]) {
        self.rng.lock().unwrap_or_else(PoisonError::into_inner).fill_bytes(dest);
    }
}

/// Adapts a [`CryptoBackend`] to the `rand_core` traits that `rsa` expects.
pub(crate) struct BackendRng<'a>(pub(crate) &'a dyn CryptoBackend);

impl RngCore for BackendRng<'_> {
    fn next_u32(&mut self) -> u32 {
        rand_core::impls::next_u32_via_fill(self)
    }

    fn next_u64(&mut self) -> u64 {
        rand_core::impls::next_u64_via_fill(self)
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.0.fill_random(dest);
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand_core::Error> {
        self.0.fill_random(dest);
        Ok(())
    }
}

impl CryptoRng for BackendRng<'_> {}
