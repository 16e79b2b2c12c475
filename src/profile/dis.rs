//! Device Information Service ([DIS]).
//!
//! Exposes the manufacturer, model, and PnP ID of the peripheral. Hosts use
//! the PnP ID to pick a HID driver, so it is always present.
//!
//! [DIS]: https://www.bluetooth.com/specifications/specs/device-information-service-1-1/

use crate::config::Config;
use crate::gap::{Characteristic, Service};
use crate::gatt::{Builder, Handle, Perms};

/// Device Information Service contents.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DeviceInfo {
    pub manufacturer: String,
    pub model: String,
    pub pnp_id: PnpId,
}

impl DeviceInfo {
    /// Returns the device information from `cfg`. An unencodable PnP version
    /// is replaced with 0.0.0.
    #[must_use]
    pub fn from_config(cfg: &Config) -> Self {
        let pnp_id = cfg.pnp_id().unwrap_or(PnpId {
            vid: VendorId::USB(cfg.pnp.vid),
            pid: cfg.pnp.pid,
            ver: 0,
        });
        Self {
            manufacturer: cfg.manufacturer.clone(),
            model: cfg.model.clone(),
            pnp_id,
        }
    }

    /// Defines the service and returns its declaration handle. Empty strings
    /// are left out.
    pub fn define(&self, b: &mut Builder, p: Perms) -> Handle {
        let (hdl, ()) = b.primary_service(Service::DeviceInformation, |s| {
            use Characteristic::*;
            if !self.manufacturer.is_empty() {
                s.ro_characteristic(ManufacturerNameString, p, &self.manufacturer);
            }
            if !self.model.is_empty() {
                s.ro_characteristic(ModelNumberString, p, &self.model);
            }
            s.ro_characteristic(PnpId, p, self.pnp_id.to_bytes());
        });
        hdl
    }
}

/// Plug and Play device ID ([DIS] Section 3.9).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PnpId {
    pub vid: VendorId,
    pub pid: u16,
    /// Binary-coded version `0xJJMN`.
    pub ver: u16,
}

impl PnpId {
    /// Creates a PnP ID from vendor ID, product ID, and `(major, minor,
    /// patch)` version. Returns [`None`] if `minor` or `patch` is above 15.
    #[must_use]
    pub const fn new(vid: VendorId, pid: u16, ver: (u8, u8, u8)) -> Option<Self> {
        if ver.1 > 0xF || ver.2 > 0xF {
            return None;
        }
        let ver = (ver.0 as u16) << 8 | (ver.1 as u16) << 4 | ver.2 as u16;
        Some(Self { vid, pid, ver })
    }

    /// Returns the characteristic value.
    #[must_use]
    pub fn to_bytes(self) -> [u8; 7] {
        let (src, vid) = match self.vid {
            VendorId::Bluetooth(v) => (0x01, v),
            VendorId::USB(v) => (0x02, v),
        };
        let mut v = [src, 0, 0, 0, 0, 0, 0];
        v[1..3].copy_from_slice(&vid.to_le_bytes());
        v[3..5].copy_from_slice(&self.pid.to_le_bytes());
        v[5..7].copy_from_slice(&self.ver.to_le_bytes());
        v
    }
}

/// Namespaced vendor ID.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum VendorId {
    Bluetooth(u16),
    USB(u16),
}
