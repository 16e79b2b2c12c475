use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

use crate::host::{Platform, SendError};
use crate::le::Addr;
use crate::{Error, Hex, Result, SyncMutex};

use super::{cccd, GattOp, Handle};

/// Notification state of one characteristic for the connected central.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum CccdState {
    /// Notifications are disabled.
    #[default]
    Disabled,
    /// Notifications were enabled, but the owning device class has not
    /// finished sending its priming reports.
    Priming,
    /// Notifications are enabled and application reports can be sent.
    Enabled,
}

/// Notification flow control parameters.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct NotifyParams {
    /// Number of send attempts for transient failures. Values below 1 are
    /// treated as 1.
    pub attempts: u32,
    /// Backoff unit. Attempt `n` is followed by a delay of `n * backoff`.
    pub backoff: Duration,
    /// Maximum time to wait for the platform completion event.
    pub timeout: Duration,
}

impl Default for NotifyParams {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Duration::from_millis(20),
            timeout: Duration::from_millis(250),
        }
    }
}

/// Sender of the only outbound notification path. Sends are serialized and
/// each one waits for the platform completion event before the next one is
/// started.
#[derive(Debug)]
pub struct Notifier {
    platform: Arc<dyn Platform>,
    params: NotifyParams,
    st: SyncMutex<State>,
    tx: tokio::sync::Mutex<()>,
}

#[derive(Debug, Default)]
struct State {
    peer: Option<Addr>,
    cccd: BTreeMap<Handle, CccdState>,
    /// Epoch of each characteristic in the `Priming` state.
    epoch: BTreeMap<Handle, u64>,
    /// Last assigned priming epoch. Never reset.
    last_epoch: u64,
    inflight: Option<oneshot::Sender<bool>>,
    /// Completion receiver of a send that timed out.
    late: Option<oneshot::Receiver<bool>>,
}

impl State {
    fn clear(&mut self) {
        self.cccd.clear();
        self.epoch.clear();
        self.inflight = None;
        self.late = None;
    }
}

/// Report class used to decide which CCCD states permit a send.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Need {
    /// Priming report for the given epoch.
    Priming(u64),
    Enabled,
}

impl Notifier {
    /// Creates a notifier that sends through `platform`.
    #[must_use]
    pub fn new(platform: Arc<dyn Platform>, params: NotifyParams) -> Self {
        let params = NotifyParams {
            attempts: params.attempts.max(1),
            ..params
        };
        Self {
            platform,
            params,
            st: SyncMutex::default(),
            tx: tokio::sync::Mutex::new(()),
        }
    }

    /// Sets the connected central. Clears all notification state.
    pub fn connect(&self, peer: Addr) {
        let mut st = self.st.lock();
        st.clear();
        st.peer = Some(peer);
    }

    /// Clears the connected central, notification state, and fails any
    /// in-flight send.
    pub fn reset(&self) {
        let mut st = self.st.lock();
        st.peer = None;
        st.clear();
    }

    /// Returns the connected central.
    #[inline]
    #[must_use]
    pub fn peer(&self) -> Option<Addr> {
        self.st.lock().peer
    }

    /// Returns the notification state of the characteristic value `hdl`.
    #[inline]
    #[must_use]
    pub fn state(&self, hdl: Handle) -> CccdState {
        self.st.lock().cccd.get(&hdl).copied().unwrap_or_default()
    }

    /// Returns the current CCCD value of characteristic value `hdl`.
    #[must_use]
    pub fn cccd_value(&self, hdl: Handle) -> [u8; 2] {
        match self.state(hdl) {
            CccdState::Disabled => cccd::DISABLE,
            CccdState::Priming | CccdState::Enabled => cccd::NOTIFY,
        }
    }

    /// Updates the notification state of characteristic value `hdl` after a
    /// CCCD write. Characteristics that need priming enter
    /// [`CccdState::Priming`]. Returns whether the state changed.
    pub fn set_cccd(&self, hdl: Handle, enable: bool, priming: bool) -> bool {
        let mut st = self.st.lock();
        let prev = st.cccd.get(&hdl).copied().unwrap_or_default();
        let next = match (enable, priming) {
            (false, _) => CccdState::Disabled,
            (true, _) if prev != CccdState::Disabled => prev,
            (true, true) => CccdState::Priming,
            (true, false) => CccdState::Enabled,
        };
        if next == CccdState::Disabled {
            st.cccd.remove(&hdl);
        } else {
            st.cccd.insert(hdl, next);
        }
        if prev != CccdState::Priming && next == CccdState::Priming {
            st.last_epoch += 1;
            let e = st.last_epoch;
            st.epoch.insert(hdl, e);
        } else if next != CccdState::Priming {
            st.epoch.remove(&hdl);
        }
        if prev != next {
            debug!("Notifications for {hdl}: {prev:?} -> {next:?}");
        }
        prev != next
    }

    /// Returns the epoch of the priming started by the last CCCD enable of
    /// `hdl`, or `None` if the characteristic is not priming. Priming
    /// reports and [`Self::finish_priming`] are only accepted for the
    /// current epoch, so a disable or reconnect invalidates older priming.
    #[must_use]
    pub fn priming_epoch(&self, hdl: Handle) -> Option<u64> {
        self.st.lock().epoch.get(&hdl).copied()
    }

    /// Moves a characteristic priming in `epoch` to [`CccdState::Enabled`].
    /// Returns `false` if the priming was superseded.
    pub fn finish_priming(&self, hdl: Handle, epoch: u64) -> bool {
        let mut st = self.st.lock();
        if st.epoch.get(&hdl) != Some(&epoch) {
            return false;
        }
        st.epoch.remove(&hdl);
        st.cccd.insert(hdl, CccdState::Enabled);
        debug!("Notifications for {hdl}: primed");
        true
    }

    /// Returns an error if an application report for `hdl` cannot be sent.
    #[inline]
    pub fn check(&self, hdl: Handle) -> Result<()> {
        self.check_need(hdl, Need::Enabled).map(|_| ())
    }

    /// Sends an application report. Fails with [`Error::NoConnection`] if no
    /// central is connected and with [`Error::NotReady`] if notifications are
    /// not enabled and primed.
    pub async fn send(&self, hdl: Handle, val: &[u8]) -> Result<()> {
        self.check_need(hdl, Need::Enabled)?;
        let _g = self.tx.lock().await;
        self.transmit(hdl, val, Need::Enabled).await
    }

    /// Sends a priming report while the characteristic is in the
    /// [`CccdState::Priming`] state of `epoch`.
    pub async fn send_priming(&self, hdl: Handle, epoch: u64, val: &[u8]) -> Result<()> {
        let need = Need::Priming(epoch);
        self.check_need(hdl, need)?;
        let _g = self.tx.lock().await;
        self.transmit(hdl, val, need).await
    }

    /// Sends a relative movement report that may be coalesced. If another move
    /// sharing `seq` is queued while this one waits for the send path, this
    /// one is dropped and `Ok(false)` is returned.
    pub async fn send_move(&self, hdl: Handle, val: &[u8], seq: &AtomicU64) -> Result<bool> {
        self.check_need(hdl, Need::Enabled)?;
        let my = seq.fetch_add(1, Ordering::AcqRel) + 1;
        let _g = self.tx.lock().await;
        if seq.load(Ordering::Acquire) != my {
            trace!("Coalesced move on {hdl}: {}", Hex(val));
            return Ok(false);
        }
        self.transmit(hdl, val, Need::Enabled).await.map(|_| true)
    }

    /// Completes the in-flight send with the platform status.
    pub fn complete(&self, ok: bool) {
        match self.st.lock().inflight.take() {
            Some(tx) => {
                let _ = tx.send(ok);
            }
            None => debug!("Notification completion without a pending send"),
        }
    }

    /// Returns the connected peer if `hdl` permits the send.
    fn check_need(&self, hdl: Handle, need: Need) -> Result<Addr> {
        let st = self.st.lock();
        let peer = st.peer.ok_or(Error::NoConnection)?;
        match (st.cccd.get(&hdl).copied().unwrap_or_default(), need) {
            (CccdState::Enabled, Need::Enabled) => Ok(peer),
            (CccdState::Priming, Need::Priming(e)) if st.epoch.get(&hdl) == Some(&e) => Ok(peer),
            _ => Err(Error::NotReady(hdl)),
        }
    }

    /// Sends the value, retrying platform rejections and failed completions.
    /// A completion timeout is not retried because the notification may
    /// still be delivered. Must be called with the send lock held.
    async fn transmit(&self, hdl: Handle, val: &[u8], need: Need) -> Result<()> {
        self.drain_late(hdl).await;
        let mut reason = String::new();
        for attempt in 1..=self.params.attempts {
            let (peer, mut rx) = {
                let peer = self.check_need(hdl, need)?;
                let (tx, rx) = oneshot::channel();
                self.st.lock().inflight = Some(tx);
                (peer, rx)
            };
            match self.platform.notify(peer, hdl, val) {
                Ok(()) => match tokio::time::timeout(self.params.timeout, &mut rx).await {
                    Ok(Ok(true)) => {
                        trace!("Notified {hdl}: {}", Hex(val));
                        return Ok(());
                    }
                    Ok(Ok(false)) => reason = "platform reported failure".into(),
                    Ok(Err(_)) => {
                        debug!("Connection lost while notifying {hdl}");
                        return Err(Error::NoConnection);
                    }
                    Err(_) => {
                        warn!("Notify {hdl} completion timeout [{}]", Hex(val));
                        self.st.lock().late = Some(rx);
                        return Err(Error::Gatt {
                            op: GattOp::Notify,
                            reason: "completion timeout".into(),
                        });
                    }
                },
                Err(SendError::Disconnected) => {
                    self.st.lock().inflight = None;
                    return Err(Error::NoConnection);
                }
                Err(e) => reason = e.to_string(),
            }
            self.st.lock().inflight = None;
            warn!(
                "Notify {hdl} attempt {attempt}/{} failed: {reason} [{}]",
                self.params.attempts,
                Hex(val)
            );
            if attempt < self.params.attempts {
                tokio::time::sleep(self.params.backoff * attempt).await;
            }
        }
        Err(Error::Gatt {
            op: GattOp::Notify,
            reason,
        })
    }

    /// Waits for the completion of a previously timed out send so that it is
    /// not credited to the next one.
    async fn drain_late(&self, hdl: Handle) {
        let Some(rx) = self.st.lock().late.take() else {
            return;
        };
        match tokio::time::timeout(self.params.timeout, rx).await {
            Ok(Ok(ok)) => debug!("Late completion before notifying {hdl}: {ok}"),
            Ok(Err(_)) => {}
            Err(_) => {
                debug!("No late completion before notifying {hdl}");
                self.st.lock().inflight = None;
            }
        }
    }
}

#[cfg(test)]
mod tests;
