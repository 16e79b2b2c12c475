//! Pairing and bonding state machine.
//!
//! The platform runs the Security Manager Protocol. This module tracks its
//! progress for one device at a time, answers pairing requests, and reports
//! every transition to an optional [`PairingListener`].

use std::collections::BTreeSet;
use std::fmt::{Debug, Display, Formatter};
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::gatt::GattOp;
use crate::host::{BondState, Platform, PairingVariant};
use crate::le::{Addr, Peer};
use crate::{Error, Result, SyncMutex};

/// Pairing progress of the tracked device.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum PairingState {
    #[default]
    Idle,
    PairingRequested,
    PairingStarted,
    WaitingForBond,
    Bonded,
    PairingFailed,
    Unpairing,
}

impl PairingState {
    /// Returns whether a pairing procedure is in progress.
    #[inline]
    #[must_use]
    pub const fn in_progress(self) -> bool {
        matches!(
            self,
            Self::PairingRequested | Self::PairingStarted | Self::WaitingForBond
        )
    }
}

impl Display for PairingState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match *self {
            Self::Idle => "idle",
            Self::PairingRequested => "pairing requested",
            Self::PairingStarted => "pairing started",
            Self::WaitingForBond => "waiting for bond",
            Self::Bonded => "bonded",
            Self::PairingFailed => "pairing failed",
            Self::Unpairing => "unpairing",
        })
    }
}

/// Application callbacks for pairing events. All methods have empty default
/// implementations.
pub trait PairingListener: Send + Sync {
    /// Called when the platform asks to confirm a pairing request that is not
    /// accepted automatically. Returning [`None`] defers the answer to
    /// [`Pairing::confirm`].
    fn on_pairing_requested(&self, _peer: Addr, _variant: PairingVariant) -> Option<bool> {
        None
    }

    /// Called on every state transition.
    fn on_progress(&self, _peer: Addr, _state: PairingState, _msg: &str) {}

    /// Called when pairing or unpairing finishes.
    fn on_complete(&self, _peer: Addr, _success: bool, _msg: &str) {}
}

/// Listener notification collected under the state lock.
#[derive(Clone, Copy, Debug)]
struct Note {
    peer: Addr,
    state: PairingState,
    msg: &'static str,
    done: Option<bool>,
}

#[derive(Debug, Default)]
struct State {
    peer: Option<Addr>,
    bonded: BTreeSet<Addr>,
}

/// Pairing and bonding coordinator.
pub struct Pairing {
    platform: Arc<dyn Platform>,
    trusted: bool,
    st: SyncMutex<State>,
    state: watch::Sender<PairingState>,
    listener: SyncMutex<Option<Arc<dyn PairingListener>>>,
}

impl Debug for Pairing {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pairing")
            .field("trusted", &self.trusted)
            .field("state", &*self.state.borrow())
            .field("st", &*self.st.lock())
            .finish_non_exhaustive()
    }
}

impl Pairing {
    /// Creates a pairing coordinator. Pairing requests are accepted without
    /// asking the listener if `trusted` is set.
    #[must_use]
    pub fn new(platform: Arc<dyn Platform>, trusted: bool) -> Self {
        Self {
            platform,
            trusted,
            st: SyncMutex::default(),
            state: watch::channel(PairingState::Idle).0,
            listener: SyncMutex::default(),
        }
    }

    /// Sets or clears the listener.
    pub fn set_listener(&self, l: Option<Arc<dyn PairingListener>>) {
        *self.listener.lock() = l;
    }

    /// Returns the current state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> PairingState {
        *self.state.borrow()
    }

    /// Returns a receiver of state changes.
    #[inline]
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<PairingState> {
        self.state.subscribe()
    }

    /// Returns the device of the current or last procedure.
    #[inline]
    #[must_use]
    pub fn peer(&self) -> Option<Addr> {
        self.st.lock().peer
    }

    /// Returns whether `peer` is in the bond store.
    #[inline]
    #[must_use]
    pub fn is_bonded(&self, peer: Addr) -> bool {
        self.st.lock().bonded.contains(&peer)
    }

    /// Returns the known bonded devices.
    #[must_use]
    pub fn bonded(&self) -> Vec<Addr> {
        self.st.lock().bonded.iter().copied().collect()
    }

    /// Replaces the known bonded devices with the platform bond store
    /// contents.
    pub fn load_bonded(&self, peers: impl IntoIterator<Item = Peer>) {
        let mut st = self.st.lock();
        st.bonded = peers.into_iter().map(|p| p.addr).collect();
        debug!("{} bonded device(s)", st.bonded.len());
    }

    /// Starts bonding with `peer`. Fails with [`Error::PairingInProgress`] if
    /// another device is being paired.
    pub fn create_bond(&self, peer: Addr) -> Result<()> {
        let note = {
            let mut st = self.st.lock();
            let cur = self.state();
            if cur.in_progress() {
                return match st.peer {
                    Some(p) if p == peer => Ok(()),
                    Some(p) => Err(Error::PairingInProgress(p)),
                    None => Err(Error::InvalidState("pairing without a device")),
                };
            }
            if st.bonded.contains(&peer) {
                info!("{peer} is already bonded");
                self.transition(&mut st, peer, PairingState::Bonded, "already bonded", Some(true))
            } else if let Err(e) = self.platform.create_bond(peer) {
                warn!("Failed to create bond with {peer}: {e}");
                let n = self.transition(
                    &mut st,
                    peer,
                    PairingState::PairingFailed,
                    "bonding failed",
                    Some(false),
                );
                drop(st);
                self.emit([n]);
                return Err(Error::Gatt {
                    op: GattOp::CreateBond,
                    reason: e.0,
                });
            } else {
                self.transition(
                    &mut st,
                    peer,
                    PairingState::PairingStarted,
                    "bonding started",
                    None,
                )
            }
        };
        self.emit([note]);
        Ok(())
    }

    /// Handles a platform pairing request. Requests from a second device are
    /// rejected while a pairing is in progress.
    pub fn on_pairing_request(&self, peer: Addr, variant: PairingVariant) {
        let mut notes = Vec::with_capacity(2);
        {
            let mut st = self.st.lock();
            let cur = self.state();
            if cur.in_progress() && st.peer != Some(peer) {
                drop(st);
                warn!("Rejecting pairing request from {peer} while pairing is in progress");
                self.confirm_platform(peer, false);
                return;
            }
            if !cur.in_progress() {
                notes.push(self.transition(
                    &mut st,
                    peer,
                    PairingState::PairingStarted,
                    "host initiated pairing",
                    None,
                ));
            }
            notes.push(self.transition(
                &mut st,
                peer,
                PairingState::PairingRequested,
                "pairing requested",
                None,
            ));
        }
        self.emit(notes);
        info!("Pairing request from {peer}: {variant:?}");

        let answer = if self.trusted {
            Some(true)
        } else {
            let l = self.listener.lock().clone();
            l.and_then(|l| l.on_pairing_requested(peer, variant))
        };
        match answer {
            Some(accept) => {
                if let Err(e) = self.confirm(accept) {
                    warn!("Failed to answer pairing request from {peer}: {e}");
                }
            }
            None => debug!("Waiting for pairing confirmation"),
        }
    }

    /// Answers the pending pairing request.
    pub fn confirm(&self, accept: bool) -> Result<()> {
        let peer = {
            let st = self.st.lock();
            match st.peer {
                Some(p) if self.state() == PairingState::PairingRequested => p,
                _ => return Err(Error::InvalidState("no pending pairing request")),
            }
        };
        if let Err(e) = self.platform.set_pairing_confirmation(peer, accept) {
            self.fail(peer, "pairing confirmation failed");
            return Err(Error::Gatt {
                op: GattOp::ConfirmPairing,
                reason: e.0,
            });
        }
        let note = {
            let mut st = self.st.lock();
            if accept {
                self.transition(
                    &mut st,
                    peer,
                    PairingState::WaitingForBond,
                    "pairing accepted",
                    None,
                )
            } else {
                self.transition(
                    &mut st,
                    peer,
                    PairingState::PairingFailed,
                    "pairing rejected",
                    Some(false),
                )
            }
        };
        self.emit([note]);
        Ok(())
    }

    /// Handles a platform bond state change.
    pub fn on_bond_state(&self, peer: Addr, bond: BondState) {
        let note = {
            let mut st = self.st.lock();
            let cur = self.state();
            let current = st.peer == Some(peer);
            match bond {
                BondState::Bonding if !cur.in_progress() => {
                    Some(self.transition(
                        &mut st,
                        peer,
                        PairingState::PairingStarted,
                        "host initiated bonding",
                        None,
                    ))
                }
                BondState::Bonding => None,
                BondState::Bonded => {
                    st.bonded.insert(peer);
                    (current || !cur.in_progress()).then(|| {
                        self.transition(&mut st, peer, PairingState::Bonded, "bonded", Some(true))
                    })
                }
                BondState::None => {
                    st.bonded.remove(&peer);
                    match cur {
                        PairingState::Unpairing if current => Some(self.transition(
                            &mut st,
                            peer,
                            PairingState::Idle,
                            "bond removed",
                            Some(true),
                        )),
                        s if s.in_progress() && current => Some(self.transition(
                            &mut st,
                            peer,
                            PairingState::PairingFailed,
                            "bonding failed",
                            Some(false),
                        )),
                        _ => None,
                    }
                }
            }
        };
        if note.is_none() {
            debug!("Bond state of {peer}: {bond:?}");
        }
        self.emit(note);
    }

    /// Removes the bond with `peer`.
    pub fn remove_bond(&self, peer: Addr) -> Result<()> {
        let (note, prev) = {
            let mut st = self.st.lock();
            let cur = self.state();
            if cur.in_progress() {
                return Err(Error::PairingInProgress(st.peer.unwrap_or(peer)));
            }
            let prev = (cur, st.peer);
            (self.transition(&mut st, peer, PairingState::Unpairing, "removing bond", None), prev)
        };
        self.emit([note]);
        if let Err(e) = self.platform.remove_bond(peer) {
            warn!("Failed to remove bond with {peer}: {e}");
            let mut st = self.st.lock();
            st.peer = prev.1;
            self.state.send_replace(prev.0);
            return Err(Error::Gatt {
                op: GattOp::RemoveBond,
                reason: e.0,
            });
        }
        Ok(())
    }

    /// Cancels the pairing in progress. Returns whether there was one.
    pub fn cancel(&self) -> bool {
        let (peer, note) = {
            let mut st = self.st.lock();
            let (cur, Some(peer)) = (self.state(), st.peer) else {
                return false;
            };
            if !cur.in_progress() {
                return false;
            }
            let n = self.transition(
                &mut st,
                peer,
                PairingState::Idle,
                "pairing cancelled",
                Some(false),
            );
            (peer, n)
        };
        self.platform.cancel_bond(peer);
        self.emit([note]);
        true
    }

    /// Moves to [`PairingState::PairingFailed`].
    fn fail(&self, peer: Addr, msg: &'static str) {
        let note = {
            let mut st = self.st.lock();
            self.transition(&mut st, peer, PairingState::PairingFailed, msg, Some(false))
        };
        self.emit([note]);
    }

    /// Sends a pairing confirmation, logging any failure.
    fn confirm_platform(&self, peer: Addr, accept: bool) {
        if let Err(e) = self.platform.set_pairing_confirmation(peer, accept) {
            warn!("Failed to answer pairing request from {peer}: {e}");
        }
    }

    /// Updates the state. The returned note must be emitted after the state
    /// lock is released.
    fn transition(
        &self,
        st: &mut State,
        peer: Addr,
        s: PairingState,
        msg: &'static str,
        done: Option<bool>,
    ) -> Note {
        let prev = self.state.send_replace(s);
        st.peer = Some(peer);
        debug!("Pairing with {peer}: {prev} -> {s}");
        Note {
            peer,
            state: s,
            msg,
            done,
        }
    }

    /// Delivers notes to the listener.
    fn emit(&self, notes: impl IntoIterator<Item = Note>) {
        let Some(l) = self.listener.lock().clone() else {
            return;
        };
        for n in notes {
            l.on_progress(n.peer, n.state, n.msg);
            if let Some(ok) = n.done {
                l.on_complete(n.peer, ok, n.msg);
            }
        }
    }
}
