//! Platform BLE stack interface.
//!
//! The platform owns the radio, the attribute server transport, and the bond
//! store. It receives commands through the [`Platform`] trait and reports
//! everything that happens asynchronously as an [`Event`] posted to the
//! channel registered with [`Platform::attach`].

use std::fmt::Debug;

use tokio::sync::mpsc;

use crate::adv::{AdvError, AdvParams};
use crate::gatt::{ErrorCode, Handle, ServiceDef};
use crate::le::{Addr, Peer};

#[cfg(test)]
pub(crate) mod mock;

/// Sending half of the platform event channel.
pub type EventSender = mpsc::UnboundedSender<Event>;

/// Receiving half of the platform event channel.
pub type EventReceiver = mpsc::UnboundedReceiver<Event>;

/// Generic platform operation failure.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[error("{0}")]
pub struct PlatformError(pub String);

impl From<&str> for PlatformError {
    #[inline]
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Notification submission failure.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum SendError {
    /// The platform cannot accept another notification yet.
    #[error("platform busy")]
    Busy,
    /// The central is no longer connected.
    #[error("disconnected")]
    Disconnected,
    #[error("{0}")]
    Failed(String),
}

/// Platform BLE peripheral stack.
///
/// Methods are synchronous and must not block. Results that the platform
/// delivers later (notification completion, advertising start, bonding
/// progress) are posted as events.
pub trait Platform: Debug + Send + Sync {
    /// Registers the event channel. Called once during initialization.
    fn attach(&self, tx: EventSender);

    /// Returns whether the adapter supports the peripheral role.
    fn supports_peripheral(&self) -> bool;

    /// Opens the GATT server.
    fn open_server(&self) -> Result<(), PlatformError>;

    /// Registers a primary service with the open server.
    fn add_service(&self, svc: &ServiceDef) -> Result<(), PlatformError>;

    /// Closes the GATT server and removes all services.
    fn close_server(&self);

    /// Answers a read or write request.
    fn send_response(
        &self,
        peer: Addr,
        id: u32,
        rsp: Result<&[u8], ErrorCode>,
    ) -> Result<(), PlatformError>;

    /// Submits a characteristic value notification. Completion is reported
    /// by [`Event::NotificationSent`].
    fn notify(&self, peer: Addr, hdl: Handle, val: &[u8]) -> Result<(), SendError>;

    /// Terminates the connection with `peer`.
    fn disconnect(&self, peer: Addr);

    /// Starts legacy advertising. The result is reported by
    /// [`Event::AdvertisingStarted`] or [`Event::AdvertisingFailed`].
    fn start_advertising(&self, params: &AdvParams, ad: &[u8], sr: &[u8])
        -> Result<(), AdvError>;

    /// Stops advertising. Has no effect if advertising is stopped.
    fn stop_advertising(&self);

    /// Initiates bonding with `peer`.
    fn create_bond(&self, peer: Addr) -> Result<(), PlatformError>;

    /// Removes the bond with `peer` from the bond store.
    fn remove_bond(&self, peer: Addr) -> Result<(), PlatformError>;

    /// Aborts an ongoing bonding procedure.
    fn cancel_bond(&self, peer: Addr);

    /// Answers a pairing request.
    fn set_pairing_confirmation(&self, peer: Addr, accept: bool) -> Result<(), PlatformError>;

    /// Returns the devices in the platform bond store.
    fn bonded_devices(&self) -> Vec<Peer>;
}

/// Platform bond state of a remote device.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BondState {
    None,
    Bonding,
    Bonded,
}

/// Pairing method requested by the platform.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum PairingVariant {
    /// Just Works consent.
    Consent,
    /// Numeric comparison of a six-digit value.
    NumericComparison(u32),
    /// Passkey entry on the remote device.
    PasskeyEntry,
}

/// Asynchronous platform event.
#[derive(Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum Event {
    Connected {
        peer: Peer,
    },
    Disconnected {
        peer: Addr,
    },
    /// Attribute read. Must be answered with [`Platform::send_response`].
    ReadRequest {
        peer: Addr,
        id: u32,
        hdl: Handle,
        off: u16,
    },
    /// Attribute write. Must be answered if `rsp` is set.
    WriteRequest {
        peer: Addr,
        id: u32,
        hdl: Handle,
        off: u16,
        val: Vec<u8>,
        rsp: bool,
    },
    /// Completion of the last [`Platform::notify`] call.
    NotificationSent {
        peer: Addr,
        ok: bool,
    },
    AdvertisingStarted,
    AdvertisingFailed(AdvError),
    BondStateChanged {
        peer: Addr,
        state: BondState,
    },
    PairingRequest {
        peer: Addr,
        variant: PairingVariant,
    },
    MtuChanged {
        peer: Addr,
        mtu: u16,
    },
}
