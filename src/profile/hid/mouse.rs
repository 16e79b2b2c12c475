use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use tracing::debug;

use crate::gatt::{Handle, Notifier};
use crate::hid::mouse::{self, Button, MouseReport, AXIS_MAX, AXIS_MIN};
use crate::{Error, Result};

use super::{ReportCell, Timing};

/// Relative pointing device.
#[derive(Debug)]
pub struct MouseService {
    n: Arc<Notifier>,
    hdl: Handle,
    id: u8,
    buf: ReportCell<5>,
    seq: AtomicU64,
    t: Timing,
}

impl MouseService {
    pub(super) fn new(
        n: Arc<Notifier>,
        hdl: Handle,
        id: u8,
        buf: ReportCell<5>,
        t: Timing,
    ) -> Self {
        Self {
            n,
            hdl,
            id,
            buf,
            seq: AtomicU64::new(0),
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
    pub fn report(&self) -> MouseReport {
        self.buf.get()
    }

    /// Moves the pointer by `(dx, dy)`. Both values must be in `[-127, 127]`.
    /// Moves queued behind a busy send may be replaced by newer moves.
    pub async fn move_by(&self, dx: i32, dy: i32) -> Result<()> {
        let (dx, dy) = (axis("dx", dx)?, axis("dy", dy)?);
        self.n.check(self.hdl)?;
        let r = self.buf.update(|r| *r = mouse::encode(self.id, buttons(r), dx, dy, 0));
        self.n.send_move(self.hdl, &r, &self.seq).await.map(|_| ())
    }

    /// Moves the pointer by an arbitrary distance, split into reports of at
    /// most 127 units per axis. None of the reports are coalesced.
    pub async fn move_chunked(&self, mut dx: i32, mut dy: i32) -> Result<()> {
        self.n.check(self.hdl)?;
        let step = |v: i32| {
            let v = v.clamp(i32::from(AXIS_MIN), i32::from(AXIS_MAX));
            i8::try_from(v).unwrap_or_default()
        };
        loop {
            let (sx, sy) = (step(dx), step(dy));
            let r = self.buf.update(|r| *r = mouse::encode(self.id, buttons(r), sx, sy, 0));
            self.n.send(self.hdl, &r).await?;
            (dx, dy) = (dx - i32::from(sx), dy - i32::from(sy));
            if dx == 0 && dy == 0 {
                return Ok(());
            }
        }
    }

    /// Presses `btn` in addition to any buttons already held.
    pub async fn press(&self, btn: Button) -> Result<()> {
        self.send_buttons(|b| b | btn).await
    }

    /// Releases `btn`.
    pub async fn release(&self, btn: Button) -> Result<()> {
        self.send_buttons(|b| b - btn).await
    }

    /// Releases all buttons.
    #[inline]
    pub async fn release_all(&self) -> Result<()> {
        self.release(Button::all()).await
    }

    /// Presses and releases `btn`.
    pub async fn click(&self, btn: Button) -> Result<()> {
        self.press(btn).await?;
        tokio::time::sleep(self.t.key_delay).await;
        self.release(btn).await
    }

    /// Scrolls the wheel by `v` detents. Positive values scroll up.
    pub async fn scroll(&self, v: i32) -> Result<()> {
        let v = axis("wheel", v)?;
        self.n.check(self.hdl)?;
        let r = self.buf.update(|r| *r = mouse::encode(self.id, buttons(r), 0, 0, v));
        self.n.send(self.hdl, &r).await
    }

    /// Sends the neutral reports that follow the CCCD enable of priming
    /// `epoch` and marks the report ready. Fails with [`Error::NotReady`] if
    /// the priming was superseded by a later CCCD write or connection.
    pub async fn prime(&self, epoch: u64) -> Result<()> {
        let r = mouse::neutral(self.id);
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

    /// Clears the report state.
    pub fn reset(&self) {
        debug!("Mouse report reset");
        self.buf.set(mouse::neutral(self.id));
    }

    async fn send_buttons(&self, f: impl FnOnce(Button) -> Button) -> Result<()> {
        self.n.check(self.hdl)?;
        let r = self.buf.update(|r| *r = mouse::encode(self.id, f(buttons(r)), 0, 0, 0));
        self.n.send(self.hdl, &r).await
    }
}

/// Returns the buttons held in report `r`.
#[inline]
fn buttons(r: &MouseReport) -> Button {
    Button::from_bits_truncate(r[1])
}

/// Validates one axis value.
#[inline]
fn axis(what: &'static str, v: i32) -> Result<i8> {
    Error::check_range(what, v.into(), AXIS_MIN.into(), AXIS_MAX.into())?;
    i8::try_from(v).map_err(|_| Error::InvalidState("axis"))
}
