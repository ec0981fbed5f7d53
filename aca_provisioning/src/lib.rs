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

//! Protocol engine of a TPM attestation certificate authority.
//!
//! [`ProtocolEngine`] runs the TPM 1.2 identity request flow and the two
//! phases of TPM 2.0 provisioning. Persistence and supply chain validation
//! are reached through the traits in [`repository`], [`validation`] and
//! [`nonce_store`]; in-process implementations live in [`memory`].

pub mod clock;
pub mod credential;
pub mod device;
pub mod engine;
pub mod error;
pub mod issuer;
pub mod memory;
pub mod nonce_store;
pub mod policy;
pub mod quote;
pub mod repository;
pub mod rim;
pub mod validation;

pub use engine::{HandshakeState, ProtocolEngine, ProtocolEngineBuilder};
pub use error::ProvisioningError;
pub use issuer::{should_reissue, CertificateIssuer};
pub use policy::{EngineConfig, ProtobufLogPolicy, ProvisioningPolicy};
pub use validation::{AppraisalStatus, PolicyValidator, SupplyChainValidator};
