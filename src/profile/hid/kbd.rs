use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, trace};

use crate::gatt::{Handle, Io, IoReq, IoResult, Notifier};
use crate::hid::kbd::{self, KbdReport, KeyMod, Keystroke, LedState, MAX_KEYS};
use crate::hid::usage::Key;
use crate::{Error, Result};

use super::{ReportCell, Timing};

/// Keyboard with an LED output report.
#[derive(Debug)]
pub struct KbdService {
    n: Arc<Notifier>,
    hdl: Handle,
    id: u8,
    buf: ReportCell<9>,
    leds: Arc<watch::Sender<LedState>>,
    t: Timing,
}

impl KbdService {
    pub(super) fn new(
        n: Arc<Notifier>,
        hdl: Handle,
        id: u8,
        buf: ReportCell<9>,
        leds: Arc<watch::Sender<LedState>>,
        t: Timing,
    ) -> Self {
        Self {
            n,
            hdl,
            id,
            buf,
            leds,
            t,
        }
    }

    /// Returns the Input Report value handle.
    #[inline(always)]
    #[must_use]
    pub const fn handle(&self) -> Handle {
        self.hdl
    }

    /// Returns the last report.
    #[inline]
    #[must_use]
    pub fn report(&self) -> KbdReport {
        self.buf.get()
    }

    /// Returns the LED state set by the host.
    #[inline]
    #[must_use]
    pub fn leds(&self) -> LedState {
        *self.leds.borrow()
    }

    /// Returns a receiver of LED state changes.
    #[inline]
    #[must_use]
    pub fn subscribe_leds(&self) -> watch::Receiver<LedState> {
        self.leds.subscribe()
    }

    /// Presses and releases `key`.
    pub async fn send_key(&self, key: Key) -> Result<()> {
        self.tap(Keystroke::from(key)).await
    }

    /// Presses and releases a key with modifiers.
    pub async fn tap(&self, k: Keystroke) -> Result<()> {
        self.n.check(self.hdl)?;
        self.send(k.encode(self.id)).await?;
        tokio::time::sleep(self.t.key_delay).await;
        self.send(kbd::released(self.id)).await
    }

    /// Holds `keys` until the next report. Modifier keys in `keys` are moved
    /// to the modifier byte. An empty set releases all keys.
    pub async fn send_keys(&self, keys: &[Key]) -> Result<()> {
        self.hold(KeyMod::empty(), keys).await
    }

    /// Holds `key` together with `mods` until the next report.
    pub async fn send_key_with_modifiers(&self, key: Key, mods: KeyMod) -> Result<()> {
        self.hold(mods, &[key]).await
    }

    /// Releases all keys and modifiers.
    pub async fn release_all(&self) -> Result<()> {
        self.n.check(self.hdl)?;
        self.send(kbd::released(self.id)).await
    }

    /// Types `text` using the US keyboard layout. All characters are mapped
    /// before the first report is sent.
    pub async fn type_text(&self, text: &str) -> Result<()> {
        let mut strokes = Vec::with_capacity(text.len());
        for c in text.chars() {
            let Some(k) = kbd::us_keystroke(c) else {
                debug!("Unmappable character: {c:?}");
                return Err(Error::OutOfRange {
                    what: "character",
                    value: i64::from(u32::from(c)),
                    min: 0x20,
                    max: 0x7E,
                });
            };
            strokes.push(k);
        }
        self.n.check(self.hdl)?;
        for (i, k) in strokes.into_iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.t.key_delay).await;
            }
            self.tap(k).await?;
        }
        Ok(())
    }

    /// Sends the neutral reports that follow the CCCD enable of priming
    /// `epoch` and marks the report ready. Fails with [`Error::NotReady`] if
    /// the priming was superseded by a later CCCD write or connection.
    pub async fn prime(&self, epoch: u64) -> Result<()> {
        let r = kbd::released(self.id);
        for i in 0..self.t.priming {
            if i > 0 {
                tokio::time::sleep(self.t.priming_interval).await;
            }
            self.n.send_priming(self.hdl, epoch, &r).await?;
            self.buf.set(r);
        }
        if self.n.finish_priming(self.hdl, epoch) {
            Ok(())
        } else {
            Err(Error::NotReady(self.hdl))
        }
    }

    /// Clears the report and LED state.
    pub fn reset(&self) {
        debug!("Keyboard report reset");
        self.buf.set(kbd::released(self.id));
        self.leds.send_replace(LedState::empty());
    }

    async fn hold(&self, mods: KeyMod, keys: &[Key]) -> Result<()> {
        let n = keys.iter().filter(|k| !k.is_none() && !k.is_modifier()).count();
        Error::check_range("keys", i64::try_from(n).unwrap_or(i64::MAX), 0, MAX_KEYS as _)?;
        self.n.check(self.hdl)?;
        self.send(kbd::encode(self.id, mods, keys)).await
    }

    async fn send(&self, r: KbdReport) -> Result<()> {
        self.buf.set(r);
        self.n.send(self.hdl, &r).await
    }
}

/// Output report I/O handler. Accepts the LED byte with or without the
/// report ID prefix. Empty writes, writes for other report IDs and
/// oversized writes are acknowledged and ignored.
pub(super) fn led_io(leds: &Arc<watch::Sender<LedState>>, id: u8) -> Io {
    Io::with(leds, move |leds, req| match req {
        IoReq::Read(r) => r.complete([id, leds.borrow().bits()]),
        IoReq::Write(w) => set_leds(leds, id, w.value()),
    })
}

fn set_leds(leds: &watch::Sender<LedState>, id: u8, v: &[u8]) -> IoResult {
    let b = match *v {
        [] => return Ok(()),
        [b] => b,
        [i, b] if i == id => b,
        [i, _] => {
            debug!("Ignoring output report for ID {i}");
            return Ok(());
        }
        _ => {
            debug!("Ignoring {}-byte output report", v.len());
            return Ok(());
        }
    };
    let s = LedState::from_bits_truncate(b);
    trace!("LED state: {s:?}");
    leds.send_if_modified(|v| {
        let changed = *v != s;
        *v = s;
        changed
    });
    Ok(())
}
