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

use std::{
    sync::{Mutex, PoisonError},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

/// A time source. Object safe so that it can be injected as `Arc<dyn Clock>`.
pub trait Clock: Send + Sync {
    fn now(&self) -> SystemTime;
}

/// Wall clock time.
#[derive(Default)]
pub struct SystemTimeClock;

impl Clock for SystemTimeClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// A `Clock` that returns a pre-configured time until it is explicitly moved.
pub struct FixedClock {
    time: Mutex<SystemTime>,
}

impl FixedClock {
    pub fn at(time: SystemTime) -> Self {
        FixedClock { time: Mutex::new(time) }
    }

    pub fn at_unix_millis(millis: u64) -> Self {
        Self::at(UNIX_EPOCH + Duration::from_millis(millis))
    }

    pub fn advance(&self, by: Duration) {
        let mut time = self.time.lock().unwrap_or_else(PoisonError::into_inner);
        *time += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> SystemTime {
        *self.time.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Milliseconds since the Unix epoch, zero for times before it.
pub fn unix_millis(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or_default()
}
