use std::sync::Arc;

use tracing::debug;

use crate::gatt::{Handle, Notifier};
use crate::hid::consumer::{self, ConsumerReport};
use crate::hid::usage::Consumer;
use crate::Result;

use super::{ReportCell, Timing};

/// Consumer control device for media keys. Notifications are usable as soon
/// as the host enables them.
#[derive(Debug)]
pub struct MediaService {
    n: Arc<Notifier>,
    hdl: Handle,
    id: u8,
    buf: ReportCell<2>,
    t: Timing,
}

impl MediaService {
    pub(super) fn new(
        n: Arc<Notifier>,
        hdl: Handle,
        id: u8,
        buf: ReportCell<2>,
        t: Timing,
    ) -> Self {
        Self {
            n,
            hdl,
            id,
            buf,
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
    pub fn report(&self) -> ConsumerReport {
        self.buf.get()
    }

    /// Presses and releases the consumer control `code`.
    pub async fn send(&self, code: u8) -> Result<()> {
        self.n.check(self.hdl)?;
        self.report_code(code).await?;
        tokio::time::sleep(self.t.key_delay).await;
        self.report_code(0).await
    }

    /// Presses and releases a known consumer control.
    #[inline]
    pub async fn press(&self, c: Consumer) -> Result<()> {
        self.send(c.into()).await
    }

    /// Clears the report state.
    pub fn reset(&self) {
        debug!("Consumer report reset");
        self.buf.set(consumer::encode(self.id, 0));
    }

    async fn report_code(&self, code: u8) -> Result<()> {
        let r = consumer::encode(self.id, code);
        self.buf.set(r);
        self.n.send(self.hdl, &r).await
    }
}
