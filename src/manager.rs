use std::fmt::{Debug, Formatter};
use std::sync::{Arc, Weak};

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::adv::{AdvConfig, AdvError, AdvState, Advertiser};
use crate::compat::CompatStrategy;
use crate::config::Config;
use crate::gatt::{CccdWrite, Db, Notifier, Perms, Server, ServerState};
use crate::hid::kbd::{KeyMod, LedState};
use crate::hid::mouse::Button;
use crate::hid::usage::{Consumer, Key};
use crate::host::{BondState, Event, EventReceiver, Platform};
use crate::le::{Addr, Peer};
use crate::profile::bas;
use crate::profile::dis::DeviceInfo;
use crate::profile::hid::{Class, HidService, HidState};
use crate::smp::{Pairing, PairingListener, PairingState};
use crate::{Error, Result, SyncMutex};

/// Application callbacks for connection events. All methods have empty
/// default implementations.
pub trait ConnectionListener: Send + Sync {
    /// Called when a central is accepted.
    fn on_connected(&self, _peer: &Peer) {}

    /// Called when the central disconnects.
    fn on_disconnected(&self, _peer: Addr) {}

    /// Called when input reports of class `c` can be sent.
    fn on_ready(&self, _c: Class) {}
}

/// BLE HID peripheral. Cloning returns another handle to the same
/// peripheral.
#[derive(Clone, Debug)]
pub struct BleHidManager(Arc<Inner>);

struct Inner {
    cfg: Config,
    platform: Arc<dyn Platform>,
    compat: Arc<dyn CompatStrategy>,
    notifier: Arc<Notifier>,
    server: Server,
    hid: HidService,
    adv: Advertiser,
    smp: Pairing,
    listener: SyncMutex<Option<Arc<dyn ConnectionListener>>>,
    task: SyncMutex<Option<JoinHandle<()>>>,
    cancel: CancellationToken,
}

impl Debug for Inner {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BleHidManager")
            .field("compat", &self.compat.name())
            .field("server", &self.server.state())
            .field("adv", &self.adv.state())
            .field("hid", &self.hid.state())
            .field("pairing", &self.smp.state())
            .finish_non_exhaustive()
    }
}

impl BleHidManager {
    /// Creates a peripheral with the compatibility strategy selected by
    /// `cfg`. Fails with [`Error::Config`] if the HID service cannot be
    /// defined.
    pub fn new(platform: Arc<dyn Platform>, cfg: Config) -> Result<Self> {
        let compat = cfg.compat();
        Self::with_compat(platform, cfg, compat)
    }

    /// Creates a peripheral with a custom compatibility strategy.
    pub fn with_compat(
        platform: Arc<dyn Platform>,
        cfg: Config,
        compat: Arc<dyn CompatStrategy>,
    ) -> Result<Self> {
        let notifier = Arc::new(Notifier::new(Arc::clone(&platform), cfg.notify_params()));
        let mut b = Db::build();
        let hid = HidService::define(&mut b, &cfg, compat.as_ref(), &notifier)?;
        let p = Perms::ro(cfg.encrypt);
        bas::define(&mut b, p, cfg.battery_level);
        DeviceInfo::from_config(&cfg).define(&mut b, p);
        let server = Server::new(
            Arc::clone(&platform),
            b.freeze(),
            Arc::clone(&notifier),
            hid.priming_handles(),
        );
        info!("BLE HID peripheral using {} host strategy", compat.name());
        Ok(Self(Arc::new(Inner {
            adv: Advertiser::new(Arc::clone(&platform)),
            smp: Pairing::new(Arc::clone(&platform), cfg.trusted_pairing),
            cfg,
            platform,
            compat,
            notifier,
            server,
            hid,
            listener: SyncMutex::default(),
            task: SyncMutex::default(),
            cancel: CancellationToken::new(),
        })))
    }

    /// Opens the GATT server, loads the bond store, and starts the event
    /// loop. Must be called from within a Tokio runtime.
    pub fn initialize(&self) -> Result<()> {
        let s = &self.0;
        let mut task = s.task.lock();
        if s.cancel.is_cancelled() {
            return Err(Error::InvalidState("peripheral closed"));
        }
        if task.is_some() {
            return Err(Error::InvalidState("already initialized"));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        s.platform.attach(tx);
        s.server.open()?;
        s.smp.load_bonded(s.platform.bonded_devices());
        let (this, cancel) = (Arc::downgrade(&self.0), s.cancel.clone());
        *task = Some(tokio::spawn(run(this, rx, cancel)));
        Ok(())
    }

    /// Tears down the peripheral: stops advertising, disconnects the central,
    /// closes the GATT server, and stops the event loop. Safe to call more
    /// than once.
    pub fn close(&self) {
        let s = &self.0;
        if s.cancel.is_cancelled() {
            return;
        }
        s.adv.stop();
        s.server.close();
        s.hid.set_connected(false);
        s.notifier.reset();
        s.cancel.cancel();
        s.task.lock().take();
        info!("BLE HID peripheral closed");
    }

    /// Returns the configuration.
    #[inline(always)]
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.0.cfg
    }

    /// Returns the HID service.
    #[inline(always)]
    #[must_use]
    pub fn hid(&self) -> &HidService {
        &self.0.hid
    }

    /// Returns the GATT server.
    #[inline(always)]
    #[must_use]
    pub fn server(&self) -> &Server {
        &self.0.server
    }

    /// Sets or clears the connection listener.
    pub fn set_connection_listener(&self, l: Option<Arc<dyn ConnectionListener>>) {
        *self.0.listener.lock() = l;
    }

    /// Sets or clears the pairing listener.
    pub fn set_pairing_listener(&self, l: Option<Arc<dyn PairingListener>>) {
        self.0.smp.set_listener(l);
    }

    // Advertising

    /// Returns the advertising configuration adapted for the host.
    #[must_use]
    pub fn adv_config(&self) -> AdvConfig {
        let s = &self.0;
        let mut cfg = AdvConfig::new(s.compat.device_name(&s.cfg.device_name));
        cfg.tx_power = s.cfg.tx_power();
        cfg.appearance = s.cfg.appearance;
        s.compat.adapt_advertising(cfg)
    }

    /// Starts advertising. Returns whether advertising started. The failure
    /// reason is available from [`Self::advertising_error`].
    pub async fn start_advertising(&self) -> bool {
        let s = &self.0;
        if s.cancel.is_cancelled() || s.server.state() == ServerState::Idle {
            warn!("Cannot advertise before initialization or after close");
            return false;
        }
        if s.server.is_connected() {
            debug!("Not advertising while connected");
            return false;
        }
        let ok = s.adv.start(&self.adv_config()).await;
        if ok {
            s.server.set_advertising(true);
        }
        ok
    }

    /// Stops advertising. Has no effect if advertising is not active.
    pub fn stop_advertising(&self) {
        self.0.adv.stop();
        self.0.server.set_advertising(false);
    }

    /// Returns whether advertising is active.
    #[inline]
    #[must_use]
    pub fn is_advertising(&self) -> bool {
        self.0.adv.is_advertising()
    }

    /// Returns the advertiser state.
    #[inline]
    #[must_use]
    pub fn advertising_state(&self) -> AdvState {
        self.0.adv.state()
    }

    /// Returns the last advertising failure.
    #[inline]
    #[must_use]
    pub fn advertising_error(&self) -> Option<AdvError> {
        self.0.adv.last_error()
    }

    // Connection

    /// Returns whether a central is connected.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.0.server.is_connected()
    }

    /// Returns the connected central.
    #[inline]
    #[must_use]
    pub fn connected_device(&self) -> Option<Peer> {
        self.0.server.connection().map(|c| c.peer)
    }

    /// Disconnects the central, if any.
    pub fn disconnect(&self) {
        if let Some(c) = self.0.server.connection() {
            info!("Disconnecting {}", c.peer);
            self.0.platform.disconnect(c.peer.addr);
        }
    }

    /// Returns the connection and readiness state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> HidState {
        self.0.hid.state()
    }

    /// Returns a receiver of connection and readiness state changes.
    #[inline]
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<HidState> {
        self.0.hid.subscribe()
    }

    /// Returns the keyboard LED state set by the host.
    #[inline]
    #[must_use]
    pub fn leds(&self) -> LedState {
        self.0.hid.leds()
    }

    /// Returns a receiver of keyboard LED state changes.
    pub fn subscribe_leds(&self) -> Result<watch::Receiver<LedState>> {
        Ok(self.0.hid.kbd()?.subscribe_leds())
    }

    // Mouse

    /// Moves the pointer by `(dx, dy)`, each in `[-127, 127]`.
    pub async fn move_mouse(&self, dx: i32, dy: i32) -> Result<()> {
        self.0.hid.mouse()?.move_by(dx, dy).await
    }

    /// Moves the pointer by an arbitrary distance using as many reports as
    /// needed.
    pub async fn move_mouse_by(&self, dx: i32, dy: i32) -> Result<()> {
        self.0.hid.mouse()?.move_chunked(dx, dy).await
    }

    /// Presses mouse buttons `btn`.
    pub async fn press_mouse_button(&self, btn: Button) -> Result<()> {
        self.0.hid.mouse()?.press(btn).await
    }

    /// Releases all mouse buttons.
    pub async fn release_mouse_buttons(&self) -> Result<()> {
        self.0.hid.mouse()?.release_all().await
    }

    /// Presses and releases mouse buttons `btn`.
    pub async fn click_mouse_button(&self, btn: Button) -> Result<()> {
        self.0.hid.mouse()?.click(btn).await
    }

    /// Scrolls the wheel by `v` in `[-127, 127]`.
    pub async fn scroll_mouse_wheel(&self, v: i32) -> Result<()> {
        self.0.hid.mouse()?.scroll(v).await
    }

    // Keyboard

    /// Presses and releases `key`.
    pub async fn send_key(&self, key: Key) -> Result<()> {
        self.0.hid.kbd()?.send_key(key).await
    }

    /// Holds `keys` until the next keyboard report. An empty slice releases
    /// all keys.
    pub async fn send_keys(&self, keys: &[Key]) -> Result<()> {
        self.0.hid.kbd()?.send_keys(keys).await
    }

    /// Holds `key` with modifiers `mods` until the next keyboard report.
    pub async fn send_key_with_modifiers(&self, key: Key, mods: KeyMod) -> Result<()> {
        self.0.hid.kbd()?.send_key_with_modifiers(key, mods).await
    }

    /// Releases all keys and modifiers.
    pub async fn release_all_keys(&self) -> Result<()> {
        self.0.hid.kbd()?.release_all().await
    }

    /// Types ASCII `text` with the US keyboard layout.
    pub async fn type_text(&self, text: &str) -> Result<()> {
        self.0.hid.kbd()?.type_text(text).await
    }

    // Media

    /// Presses and releases consumer control usage `code`.
    pub async fn send_consumer_control(&self, code: u8) -> Result<()> {
        self.0.hid.media()?.send(code).await
    }

    pub async fn play_pause(&self) -> Result<()> {
        self.consumer(Consumer::PlayPause).await
    }

    pub async fn next_track(&self) -> Result<()> {
        self.consumer(Consumer::ScanNextTrack).await
    }

    pub async fn previous_track(&self) -> Result<()> {
        self.consumer(Consumer::ScanPreviousTrack).await
    }

    pub async fn volume_up(&self) -> Result<()> {
        self.consumer(Consumer::VolumeIncrement).await
    }

    pub async fn volume_down(&self) -> Result<()> {
        self.consumer(Consumer::VolumeDecrement).await
    }

    pub async fn mute(&self) -> Result<()> {
        self.consumer(Consumer::Mute).await
    }

    async fn consumer(&self, c: Consumer) -> Result<()> {
        self.0.hid.media()?.press(c).await
    }

    // Pairing

    /// Returns the pairing state.
    #[inline]
    #[must_use]
    pub fn pairing_state(&self) -> PairingState {
        self.0.smp.state()
    }

    /// Returns a receiver of pairing state changes.
    #[inline]
    #[must_use]
    pub fn subscribe_pairing(&self) -> watch::Receiver<PairingState> {
        self.0.smp.subscribe()
    }

    /// Starts bonding with `peer`.
    pub fn create_bond(&self, peer: Addr) -> Result<()> {
        self.0.smp.create_bond(peer)
    }

    /// Answers a pending pairing request.
    pub fn confirm_pairing(&self, accept: bool) -> Result<()> {
        self.0.smp.confirm(accept)
    }

    /// Removes the bond with `peer`.
    pub fn remove_bond(&self, peer: Addr) -> Result<()> {
        self.0.smp.remove_bond(peer)
    }

    /// Cancels the pairing in progress. Returns whether there was one.
    pub fn cancel_pairing(&self) -> bool {
        self.0.smp.cancel()
    }

    /// Returns the bonded devices.
    #[must_use]
    pub fn bonded_devices(&self) -> Vec<Addr> {
        self.0.smp.bonded()
    }

    // Events

    /// Handles one platform event. Called by the event loop.
    pub fn handle_event(&self, e: Event) {
        let s = &self.0;
        match e {
            Event::Connected { peer } => self.on_connect(peer),
            Event::Disconnected { peer } => self.on_disconnect(peer),
            Event::ReadRequest { peer, id, hdl, off } => {
                let r = s.server.read(peer, hdl, off);
                s.server.respond(peer, id, r.as_deref().map_err(|&e| e));
            }
            Event::WriteRequest {
                peer,
                id,
                hdl,
                off,
                val,
                rsp,
            } => {
                let r = s.server.write(peer, hdl, off, &val);
                if rsp {
                    s.server.respond(peer, id, r.map(|_| &[][..]));
                } else if let Err(e) = r {
                    debug!("Write command to {hdl} from {peer} failed: {e}");
                }
                if let Ok(Some(w)) = r {
                    self.on_cccd(w);
                }
            }
            Event::NotificationSent { peer, ok } => {
                if s.notifier.peer() == Some(peer) {
                    s.notifier.complete(ok);
                }
            }
            Event::AdvertisingStarted => s.adv.on_result(Ok(())),
            Event::AdvertisingFailed(e) => s.adv.on_result(Err(e)),
            Event::BondStateChanged { peer, state } => {
                s.server.set_bonded(peer, state == BondState::Bonded);
                s.smp.on_bond_state(peer, state);
            }
            Event::PairingRequest { peer, variant } => s.smp.on_pairing_request(peer, variant),
            Event::MtuChanged { peer, mtu } => s.server.set_mtu(peer, mtu),
        }
    }

    fn on_connect(&self, peer: Peer) {
        let s = &self.0;
        let addr = peer.addr;
        if !s.server.on_connect(peer.clone()) {
            return;
        }
        s.adv.on_stopped();
        s.server.set_bonded(addr, s.smp.is_bonded(addr));
        s.hid.set_connected(true);
        if let Some(l) = self.listener() {
            l.on_connected(&peer);
        }
    }

    fn on_disconnect(&self, addr: Addr) {
        let s = &self.0;
        if !s.server.on_disconnect(addr) {
            return;
        }
        s.hid.set_connected(false);
        if let Some(l) = self.listener() {
            l.on_disconnected(addr);
        }
        if s.cfg.advertise_on_disconnect && !s.cancel.is_cancelled() {
            let this = self.clone();
            tokio::spawn(async move {
                if !this.start_advertising().await {
                    warn!("Failed to restart advertising: {:?}", this.advertising_error());
                }
            });
        }
    }

    fn on_cccd(&self, w: CccdWrite) {
        let s = &self.0;
        let Some(c) = s.hid.class_of(w.hdl) else {
            debug!("CCCD write for {} ignored", w.hdl);
            return;
        };
        if w.enable && w.changed && c != Class::Media {
            let Some(epoch) = s.notifier.priming_epoch(w.hdl) else {
                debug!("{c} enabled without priming");
                return;
            };
            let this = self.clone();
            tokio::spawn(async move { this.prime(c, epoch).await });
            return;
        }
        s.hid.on_cccd(c, w.enable);
        if w.enable && w.changed {
            self.ready(c);
        }
    }

    /// Sends the priming reports of class `c`. Priming superseded by a later
    /// CCCD write or reconnect ends with a not-ready error.
    async fn prime(&self, c: Class, epoch: u64) {
        match self.0.hid.prime(c, epoch).await {
            Ok(()) => self.ready(c),
            Err(e) if e.is_not_ready() => debug!("Priming {c} aborted: {e}"),
            Err(e) => error!("Priming {c} failed: {e}"),
        }
    }

    fn ready(&self, c: Class) {
        info!("{c} input reports ready");
        if let Some(l) = self.listener() {
            l.on_ready(c);
        }
    }

    #[inline]
    fn listener(&self) -> Option<Arc<dyn ConnectionListener>> {
        self.0.listener.lock().clone()
    }
}

/// Event loop. Exits when the manager is closed or dropped.
async fn run(this: Weak<Inner>, mut rx: EventReceiver, cancel: CancellationToken) {
    debug!("Event loop started");
    loop {
        let e = tokio::select! {
            () = cancel.cancelled() => break,
            e = rx.recv() => match e {
                Some(e) => e,
                None => break,
            },
        };
        let Some(inner) = this.upgrade() else { break };
        BleHidManager(inner).handle_event(e);
    }
    debug!("Event loop stopped");
}
