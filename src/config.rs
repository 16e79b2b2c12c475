//! Peripheral configuration.
//!
//! [`Config`] is a plain serde structure. Every field has a default, so a
//! configuration file only needs to name the values it changes.

use std::path::Path;
use std::time::Duration;
use std::{fs, io};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::compat::{CompatStrategy, HostKind};
use crate::gap::Appearance;
use crate::gatt::NotifyParams;
use crate::le::TxPower;
use crate::profile::dis::{PnpId, VendorId};
use crate::profile::hid::Timing;

/// Configuration loading error.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("config I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("config parse error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Peripheral configuration.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct Config {
    /// Name advertised in the scan response.
    pub device_name: String,
    /// Enabled HID device classes.
    pub classes: Classes,
    /// Report IDs of the device classes. Must be distinct.
    pub report_ids: ReportIds,
    /// Host compatibility strategy.
    pub host: HostKind,
    /// Restart advertising after the central disconnects.
    pub advertise_on_disconnect: bool,
    /// Accept pairing requests without asking the pairing listener.
    pub trusted_pairing: bool,
    /// Company ID used for manufacturer-specific advertising data.
    pub company_id: u16,
    /// Advertising TX power in dBm.
    pub tx_power: i8,
    pub appearance: Appearance,
    /// Value of the Battery Level characteristic.
    pub battery_level: u8,
    pub manufacturer: String,
    pub model: String,
    pub pnp: Pnp,
    pub notify: Notify,
    /// Require an encrypted link for all HID attributes.
    pub encrypt: bool,
    /// Delay between the press and release reports of a tap, in ms.
    pub key_delay_ms: u64,
    /// HID Information country code.
    pub country_code: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device_name: "Android BLE HID".to_owned(),
            classes: Classes::default(),
            report_ids: ReportIds::default(),
            host: HostKind::default(),
            advertise_on_disconnect: true,
            trusted_pairing: true,
            company_id: 0x00E0,
            tx_power: i8::from(TxPower::default()),
            appearance: Appearance::default(),
            battery_level: 100,
            manufacturer: "blehid".to_owned(),
            model: "BLE HID".to_owned(),
            pnp: Pnp::default(),
            notify: Notify::default(),
            encrypt: true,
            key_delay_ms: 20,
            country_code: 0,
        }
    }
}

impl Config {
    /// Per-user configuration file name.
    #[cfg(any(feature = "fs", test))]
    const FILE: &'static str = "config.json";

    /// Loads the configuration from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        debug!("Loading config from {}", path.display());
        Ok(serde_json::from_slice(&fs::read(path)?)?)
    }

    /// Saves the configuration to a JSON file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Error> {
        let path = path.as_ref();
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(path, serde_json::to_vec_pretty(self)?)?;
        Ok(())
    }

    /// Loads the configuration from the current user's config directory,
    /// returning the defaults if the file does not exist.
    ///
    /// # Panics
    ///
    /// Panics if it cannot determine the user directory.
    #[cfg(feature = "fs")]
    pub fn per_user(app: impl AsRef<Path>) -> Result<Self, Error> {
        let path = (dirs::config_dir())
            .expect("user config directory not found")
            .join(app)
            .join(Self::FILE);
        Self::load_or_default(path)
    }

    /// Loads the configuration from `path`, returning the defaults if the
    /// file does not exist.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, Error> {
        match Self::load(path.as_ref()) {
            Err(Error::Io(e)) if e.kind() == io::ErrorKind::NotFound => {
                info!("No config at {}, using defaults", path.as_ref().display());
                Ok(Self::default())
            }
            r => r,
        }
    }

    /// Returns the device-class timing parameters.
    #[must_use]
    pub const fn timing(&self) -> Timing {
        Timing {
            key_delay: Duration::from_millis(self.key_delay_ms),
            priming: self.notify.priming,
            priming_interval: Duration::from_millis(self.notify.priming_interval_ms),
        }
    }

    /// Returns the notification flow control parameters.
    #[must_use]
    pub const fn notify_params(&self) -> NotifyParams {
        NotifyParams {
            attempts: self.notify.retries,
            backoff: Duration::from_millis(self.notify.backoff_ms),
            timeout: Duration::from_millis(self.notify.timeout_ms),
        }
    }

    /// Returns the advertising TX power.
    #[inline]
    #[must_use]
    pub const fn tx_power(&self) -> TxPower {
        TxPower::new(self.tx_power)
    }

    /// Returns the host compatibility strategy.
    #[inline]
    #[must_use]
    pub fn compat(&self) -> std::sync::Arc<dyn CompatStrategy> {
        self.host.strategy(self.company_id)
    }

    /// Returns the PnP ID characteristic value, or [`None`] if the version
    /// cannot be encoded.
    #[must_use]
    pub const fn pnp_id(&self) -> Option<PnpId> {
        PnpId::new(
            VendorId::USB(self.pnp.vid),
            self.pnp.pid,
            self.pnp.version,
        )
    }
}

/// Enabled HID device classes.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct Classes {
    pub mouse: bool,
    pub keyboard: bool,
    pub media: bool,
}

impl Default for Classes {
    fn default() -> Self {
        Self {
            mouse: true,
            keyboard: true,
            media: true,
        }
    }
}

/// Report IDs of the device classes.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct ReportIds {
    pub mouse: u8,
    pub keyboard: u8,
    pub media: u8,
}

impl Default for ReportIds {
    fn default() -> Self {
        Self {
            mouse: 1,
            keyboard: 2,
            media: 3,
        }
    }
}

/// USB vendor and product identification exposed in the PnP ID.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct Pnp {
    pub vid: u16,
    pub pid: u16,
    /// Major, minor, and patch version. Minor and patch must be `<= 15`.
    pub version: (u8, u8, u8),
}

impl Default for Pnp {
    fn default() -> Self {
        Self {
            vid: 0x18D1,
            pid: 0x0001,
            version: (1, 0, 0),
        }
    }
}

/// Notification tuning.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct Notify {
    /// Send attempts for transient failures.
    pub retries: u32,
    pub backoff_ms: u64,
    pub timeout_ms: u64,
    /// Neutral reports sent after notifications are enabled.
    pub priming: u32,
    pub priming_interval_ms: u64,
}

impl Default for Notify {
    fn default() -> Self {
        Self {
            retries: 3,
            backoff_ms: 20,
            timeout_ms: 250,
            priming: 2,
            priming_interval_ms: 20,
        }
    }
}
