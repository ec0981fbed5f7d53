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

//! Device records and the device-info report built from client data.

use std::time::SystemTime;

use aca_proto_rust::aca::provisioner::v1::DeviceInfo;

use crate::{error::ProvisioningError, quote::TpmQuote, validation::AppraisalStatus};

/// Placeholder for fields the client didn't report.
pub const NOT_SPECIFIED: &str = "Not Specified";

pub type DeviceId = u64;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NetworkDetails {
    pub hostname: String,
    pub ip_address: Option<String>,
    pub mac_address: Option<[u8; 6]>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OsDetails {
    pub os_name: String,
    pub os_version: String,
    pub os_arch: String,
    pub distribution: String,
    pub distribution_release: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FirmwareDetails {
    pub bios_vendor: String,
    pub bios_version: String,
    pub bios_release_date: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HardwareDetails {
    pub manufacturer: String,
    pub product_name: String,
    pub version: String,
    pub system_serial: String,
    pub chassis_serial: String,
    pub baseboard_serial: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TpmDetails {
    /// Text dump of the PCR values reported with the claim.
    pub pcr_values: String,
    pub quote: Option<TpmQuote>,
}

/// Everything a device reported about itself in its latest handshake.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceInfoReport {
    pub network: NetworkDetails,
    pub os: OsDetails,
    pub firmware: FirmwareDetails,
    pub hardware: HardwareDetails,
    pub tpm: TpmDetails,
    pub client_version: String,
    pub paccor_output: String,
}

impl DeviceInfoReport {
    pub fn from_proto(
        info: &DeviceInfo,
        client_version: &str,
        paccor_output: &str,
    ) -> Result<Self, ProvisioningError> {
        let nw = info.nw.clone().unwrap_or_default();
        let os = info.os.clone().unwrap_or_default();
        let fw = info.fw.clone().unwrap_or_default();
        let hw = info.hw.clone().unwrap_or_default();

        let network = NetworkDetails {
            hostname: nw.hostname,
            ip_address: Some(nw.ip_address).filter(|ip| !ip.is_empty()),
            mac_address: parse_mac_address(&nw.mac_address)?,
        };
        let os = OsDetails {
            os_name: specified(os.os_name),
            os_version: specified(os.os_version),
            os_arch: specified(os.os_arch),
            distribution: specified(os.distribution),
            distribution_release: specified(os.distribution_release),
        };
        let firmware = FirmwareDetails {
            bios_vendor: specified(fw.bios_vendor),
            bios_version: specified(fw.bios_version),
            bios_release_date: specified(fw.bios_release_date),
        };
        let hardware = HardwareDetails {
            manufacturer: specified(hw.manufacturer),
            product_name: specified(hw.product_name),
            version: specified(hw.product_version),
            system_serial: specified(hw.system_serial),
            chassis_serial: specified(
                hw.chassis_info.first().map(|chassis| chassis.serial.clone()).unwrap_or_default(),
            ),
            baseboard_serial: specified(
                hw.baseboard_info.first().map(|board| board.serial.clone()).unwrap_or_default(),
            ),
        };
        let tpm = TpmDetails {
            pcr_values: String::from_utf8_lossy(&info.pcrslist).into_owned(),
            quote: None,
        };

        Ok(Self {
            network,
            os,
            firmware,
            hardware,
            tpm,
            client_version: client_version.to_string(),
            paccor_output: paccor_output.to_string(),
        })
    }

    pub fn hostname(&self) -> &str {
        &self.network.hostname
    }

    pub fn with_quote(mut self, quote: TpmQuote) -> Self {
        self.tpm.quote = Some(quote);
        self
    }
}

fn specified(value: String) -> String {
    if value.trim().is_empty() {
        NOT_SPECIFIED.to_string()
    } else {
        value
    }
}

/// Parses a colon separated MAC address. An empty string means the device
/// didn't report one.
pub fn parse_mac_address(mac: &str) -> Result<Option<[u8; 6]>, ProvisioningError> {
    let mac = mac.trim();
    if mac.is_empty() {
        return Ok(None);
    }
    let invalid = || ProvisioningError::Input(format!("invalid MAC address {mac:?}"));
    let octets = mac
        .split(':')
        .map(|octet| match octet.len() {
            1 | 2 => u8::from_str_radix(octet, 16).map_err(|_| invalid()),
            _ => Err(invalid()),
        })
        .collect::<Result<Vec<u8>, _>>()?;
    octets.try_into().map(Some).map_err(|_| invalid())
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum HealthStatus {
    Trusted,
    Untrusted,
    #[default]
    Unknown,
}

/// Durable identity record of a device, keyed by hostname.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Device {
    pub id: DeviceId,
    pub name: String,
    pub device_info: DeviceInfoReport,
    pub health_status: HealthStatus,
    pub supply_chain_status: AppraisalStatus,
    pub last_report_timestamp: SystemTime,
    /// Latest supply chain validation summary.
    pub summary_id: Option<u64>,
}

impl Device {
    pub fn new(device_info: DeviceInfoReport, now: SystemTime) -> Self {
        Self {
            id: 0,
            name: device_info.hostname().to_string(),
            device_info,
            health_status: HealthStatus::default(),
            supply_chain_status: AppraisalStatus::Unknown,
            last_report_timestamp: now,
            summary_id: None,
        }
    }
}
