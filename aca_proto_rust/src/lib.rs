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

// Prost generated code for the provisioning protocol lives in `generated/` and
// is checked in, so building this crate does not require `protoc`. The source
// of truth is `proto/provisioner/provisioner.proto`.

mod impls;

pub mod aca {
    pub mod provisioner {
        pub mod v1 {
            // Do not lint generated code.
            #![allow(clippy::all, clippy::pedantic, clippy::nursery)]

            include!("../generated/aca.provisioner.v1.rs");
        }
    }
}
