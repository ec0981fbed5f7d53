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

//! Correlation between TPM 2.0 challenges and the claims they answer.

use std::{
    collections::HashMap,
    sync::{Mutex, PoisonError},
    time::{Duration, SystemTime},
};

use log::debug;
#[cfg(test)]
use mockall::automock;

use crate::error::ProvisioningError;

/// Single use, time bounded map from challenge nonces to identity claims.
#[cfg_attr(test, automock)]
pub trait NonceStore: Send + Sync {
    /// Records `claim` under `nonce` until `now + ttl`. Records that expired
    /// by `now` are dropped.
    fn insert(
        &self,
        nonce: Vec<u8>,
        claim: Vec<u8>,
        now: SystemTime,
        ttl: Duration,
    ) -> anyhow::Result<()>;

    /// Removes the record for `nonce` and returns its claim. Expired records
    /// are removed too, but reported as [`ProvisioningError::NonceExpired`].
    fn take(&self, nonce: &[u8], now: SystemTime) -> Result<Vec<u8>, ProvisioningError>;
}

struct PendingClaim {
    claim: Vec<u8>,
    expires_at: SystemTime,
}

#[derive(Default)]
pub struct InMemoryNonceStore {
    pending: Mutex<HashMap<Vec<u8>, PendingClaim>>,
}

impl InMemoryNonceStore {
    pub fn len(&self) -> usize {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl NonceStore for InMemoryNonceStore {
    fn insert(
        &self,
        nonce: Vec<u8>,
        claim: Vec<u8>,
        now: SystemTime,
        ttl: Duration,
    ) -> anyhow::Result<()> {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        pending.retain(|_, record| record.expires_at > now);
        if pending.insert(nonce, PendingClaim { claim, expires_at: now + ttl }).is_some() {
            debug!("replaced a pending claim with a colliding nonce");
        }
        Ok(())
    }

    fn take(&self, nonce: &[u8], now: SystemTime) -> Result<Vec<u8>, ProvisioningError> {
        let record = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(nonce)
            .ok_or(ProvisioningError::NonceNotFound)?;
        if record.expires_at <= now {
            return Err(ProvisioningError::NonceExpired);
        }
        Ok(record.claim)
    }
}

#[cfg(test)]
mod tests {
    use std::time::UNIX_EPOCH;

    use googletest::prelude::*;

    use super::*;

    fn at(seconds: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(seconds)
    }

    fn secs(seconds: u64) -> Duration {
        Duration::from_secs(seconds)
    }

    #[googletest::test]
    fn test_take_is_single_use() {
        let store = InMemoryNonceStore::default();
        store.insert(vec![1, 2, 3], b"claim".to_vec(), at(0), secs(100)).unwrap();

        assert_that!(store.take(&[1, 2, 3], at(50)), ok(eq(&b"claim".to_vec())));
        assert!(matches!(store.take(&[1, 2, 3], at(50)), Err(ProvisioningError::NonceNotFound)));
    }

    #[googletest::test]
    fn test_unknown_nonce() {
        let store = InMemoryNonceStore::default();
        assert!(matches!(store.take(&[9], at(0)), Err(ProvisioningError::NonceNotFound)));
    }

    #[googletest::test]
    fn test_expired_nonce_is_consumed() {
        let store = InMemoryNonceStore::default();
        store.insert(vec![1], b"claim".to_vec(), at(0), secs(100)).unwrap();

        assert!(matches!(store.take(&[1], at(100)), Err(ProvisioningError::NonceExpired)));
        assert!(matches!(store.take(&[1], at(10)), Err(ProvisioningError::NonceNotFound)));
    }

    #[googletest::test]
    fn test_insert_drops_expired_claims() {
        let store = InMemoryNonceStore::default();
        store.insert(vec![1], Vec::new(), at(0), secs(300)).unwrap();
        store.insert(vec![2], Vec::new(), at(200), secs(300)).unwrap();

        store.insert(vec![3], Vec::new(), at(400), secs(300)).unwrap();

        assert_that!(store.len(), eq(2));
        assert!(matches!(store.take(&[1], at(400)), Err(ProvisioningError::NonceNotFound)));
        assert_that!(store.take(&[2], at(400)), ok(anything()));
    }
}
