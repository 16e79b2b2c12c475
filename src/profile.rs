//! GATT profiles exposed by the peripheral.

pub mod bas;
pub mod dis;
pub mod hid;
