//! Recording platform used by unit and scenario tests.

use std::sync::Arc;

use crate::adv::{AdvError, AdvParams};
use crate::gap::Uuid16;
use crate::gatt::{ErrorCode, Handle, ServiceDef};
use crate::le::{Addr, Peer, RawAddr};
use crate::SyncMutex;

use super::*;

/// Platform call recorded by [`MockPlatform`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Call {
    OpenServer,
    AddService(Uuid16),
    CloseServer,
    Respond {
        peer: Addr,
        id: u32,
        rsp: Result<Vec<u8>, ErrorCode>,
    },
    Notify {
        peer: Addr,
        hdl: Handle,
        val: Vec<u8>,
    },
    Disconnect(Addr),
    StartAdvertising {
        params: AdvParams,
        ad: Vec<u8>,
        sr: Vec<u8>,
    },
    StopAdvertising,
    CreateBond(Addr),
    RemoveBond(Addr),
    CancelBond(Addr),
    Confirm(Addr, bool),
}

#[derive(Debug)]
struct State {
    tx: Option<EventSender>,
    calls: Vec<Call>,
    peripheral: bool,
    busy: usize,
    failed: usize,
    withhold: bool,
    adv_err: Option<AdvError>,
    adv_silent: bool,
    bonded: Vec<Peer>,
}

/// Platform that records every call and completes asynchronous operations
/// immediately through the attached event channel.
#[derive(Debug)]
pub struct MockPlatform(SyncMutex<State>);

impl MockPlatform {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self(SyncMutex::new(State {
            tx: None,
            calls: Vec::new(),
            peripheral: true,
            busy: 0,
            failed: 0,
            withhold: false,
            adv_err: None,
            adv_silent: false,
            bonded: Vec::new(),
        })))
    }

    /// Posts an event as if it came from the platform.
    pub fn emit(&self, e: Event) {
        let tx = self.0.lock().tx.clone();
        if let Some(tx) = tx {
            let _ = tx.send(e);
        }
    }

    /// Returns all recorded calls.
    #[must_use]
    pub fn calls(&self) -> Vec<Call> {
        self.0.lock().calls.clone()
    }

    /// Removes all recorded calls.
    pub fn clear(&self) {
        self.0.lock().calls.clear();
    }

    /// Returns the values of all accepted notifications.
    #[must_use]
    pub fn notifications(&self) -> Vec<Vec<u8>> {
        (self.calls().into_iter())
            .filter_map(|c| match c {
                Call::Notify { val, .. } => Some(val),
                _ => None,
            })
            .collect()
    }

    /// Returns all responses sent for request `id`.
    #[must_use]
    pub fn responses(&self, id: u32) -> Vec<Result<Vec<u8>, ErrorCode>> {
        (self.calls().into_iter())
            .filter_map(|c| match c {
                Call::Respond { id: i, rsp, .. } if i == id => Some(rsp),
                _ => None,
            })
            .collect()
    }

    /// Rejects the next `n` notifications with [`SendError::Busy`].
    pub fn set_busy(&self, n: usize) {
        self.0.lock().busy = n;
    }

    /// Completes the next `n` notifications with a failure status.
    pub fn set_failed(&self, n: usize) {
        self.0.lock().failed = n;
    }

    /// Stops posting notification completion events.
    pub fn withhold_completions(&self, v: bool) {
        self.0.lock().withhold = v;
    }

    /// Sets the result of the next advertising start requests.
    pub fn set_adv_error(&self, e: Option<AdvError>) {
        self.0.lock().adv_err = e;
    }

    /// Stops posting advertising result events.
    pub fn set_adv_silent(&self, v: bool) {
        self.0.lock().adv_silent = v;
    }

    pub fn set_peripheral(&self, v: bool) {
        self.0.lock().peripheral = v;
    }

    pub fn set_bonded(&self, v: Vec<Peer>) {
        self.0.lock().bonded = v;
    }

    fn post(st: &State, e: Event) {
        if let Some(ref tx) = st.tx {
            let _ = tx.send(e);
        }
    }
}

impl Platform for MockPlatform {
    fn attach(&self, tx: EventSender) {
        self.0.lock().tx = Some(tx);
    }

    fn supports_peripheral(&self) -> bool {
        self.0.lock().peripheral
    }

    fn open_server(&self) -> Result<(), PlatformError> {
        self.0.lock().calls.push(Call::OpenServer);
        Ok(())
    }

    fn add_service(&self, svc: &ServiceDef) -> Result<(), PlatformError> {
        self.0.lock().calls.push(Call::AddService(svc.uuid));
        Ok(())
    }

    fn close_server(&self) {
        self.0.lock().calls.push(Call::CloseServer);
    }

    fn send_response(
        &self,
        peer: Addr,
        id: u32,
        rsp: Result<&[u8], ErrorCode>,
    ) -> Result<(), PlatformError> {
        let rsp = rsp.map(<[u8]>::to_vec);
        self.0.lock().calls.push(Call::Respond { peer, id, rsp });
        Ok(())
    }

    fn notify(&self, peer: Addr, hdl: Handle, val: &[u8]) -> Result<(), SendError> {
        let mut st = self.0.lock();
        if st.busy > 0 {
            st.busy -= 1;
            return Err(SendError::Busy);
        }
        let val = val.to_vec();
        st.calls.push(Call::Notify { peer, hdl, val });
        if !st.withhold {
            let ok = st.failed == 0;
            st.failed = st.failed.saturating_sub(1);
            Self::post(&st, Event::NotificationSent { peer, ok });
        }
        Ok(())
    }

    fn disconnect(&self, peer: Addr) {
        self.0.lock().calls.push(Call::Disconnect(peer));
    }

    fn start_advertising(
        &self,
        params: &AdvParams,
        ad: &[u8],
        sr: &[u8],
    ) -> Result<(), AdvError> {
        let mut st = self.0.lock();
        st.calls.push(Call::StartAdvertising {
            params: *params,
            ad: ad.to_vec(),
            sr: sr.to_vec(),
        });
        if st.adv_silent {
            return Ok(());
        }
        let e = match st.adv_err {
            Some(e) => Event::AdvertisingFailed(e),
            None => Event::AdvertisingStarted,
        };
        Self::post(&st, e);
        Ok(())
    }

    fn stop_advertising(&self) {
        self.0.lock().calls.push(Call::StopAdvertising);
    }

    fn create_bond(&self, peer: Addr) -> Result<(), PlatformError> {
        self.0.lock().calls.push(Call::CreateBond(peer));
        Ok(())
    }

    fn remove_bond(&self, peer: Addr) -> Result<(), PlatformError> {
        self.0.lock().calls.push(Call::RemoveBond(peer));
        Ok(())
    }

    fn cancel_bond(&self, peer: Addr) {
        self.0.lock().calls.push(Call::CancelBond(peer));
    }

    fn set_pairing_confirmation(&self, peer: Addr, accept: bool) -> Result<(), PlatformError> {
        self.0.lock().calls.push(Call::Confirm(peer, accept));
        Ok(())
    }

    fn bonded_devices(&self) -> Vec<Peer> {
        self.0.lock().bonded.clone()
    }
}

/// Returns a test central address.
#[must_use]
pub fn central(n: u8) -> Addr {
    Addr::Random(RawAddr::from_le_bytes([n, 0, 0, 0, 0xC0, 0xC0]))
}
