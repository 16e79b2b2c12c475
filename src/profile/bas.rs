//! Battery Service ([BAS]).
//!
//! [BAS]: https://www.bluetooth.com/specifications/specs/battery-service/

use crate::gap::{Characteristic, Service};
use crate::gatt::{Builder, Handle, Perms};

/// Maximum battery level in percent.
pub const MAX_LEVEL: u8 = 100;

/// Defines a Battery Service with a fixed battery level and returns the
/// Battery Level value handle. Levels above 100 are clamped.
pub fn define(b: &mut Builder, p: Perms, level: u8) -> Handle {
    let (_, hdl) = b.primary_service(Service::Battery, |s| {
        s.ro_characteristic(Characteristic::BatteryLevel, p, [level.min(MAX_LEVEL)])
    });
    hdl
}
