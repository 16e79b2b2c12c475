use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, trace};

use crate::compat::CompatStrategy;
use crate::config::Config;
use crate::gap::{Characteristic, Descriptor, Service};
use crate::gatt::{Builder, ErrorCode, Handle, Io, IoReq, Notifier, Perms, Prop, ServiceBuilder};
use crate::hid::descriptor::ReportDescriptor;
use crate::hid::kbd::LedState;
use crate::hid::{consumer, kbd, mouse, ReportRef};
use crate::{Error, Result};

use super::kbd::led_io;
use super::*;

/// Maximum Report Map length ([HIDS] Section 3.3.1).
pub const MAX_REPORT_MAP: usize = 512;

/// HID Information value: bcdHID 1.11, country code placeholder, and the
/// NormallyConnectable flag ([HIDS] Section 3.3).
const HID_INFO: [u8; 4] = [0x11, 0x01, 0x00, 0b10];

/// HID Control Point commands ([HIDS] Section 3.5).
const SUSPEND: u8 = 0x00;
const EXIT_SUSPEND: u8 = 0x01;

/// Human Interface Device service with all enabled device classes
/// registered as one composite service.
#[derive(Debug)]
pub struct HidService {
    mouse: Option<MouseService>,
    kbd: Option<KbdService>,
    media: Option<MediaService>,
    report_map: ReportDescriptor,
    state: Arc<watch::Sender<HidState>>,
}

impl HidService {
    /// Defines the HID service for the classes enabled in `cfg`. Fails with
    /// [`Error::Config`] if no class is enabled, report IDs collide, or the
    /// report map is too long.
    pub fn define(
        b: &mut Builder,
        cfg: &Config,
        compat: &dyn CompatStrategy,
        n: &Arc<Notifier>,
    ) -> Result<Self> {
        let (c, ids) = (&cfg.classes, &cfg.report_ids);
        if !(c.mouse || c.keyboard || c.media) {
            return Err(Error::Config("no HID device class enabled".into()));
        }
        let mut parts = Vec::with_capacity(3);
        if c.mouse {
            parts.push(mouse::report_descriptor(ids.mouse));
        }
        if c.keyboard {
            parts.push(kbd::report_descriptor(ids.keyboard));
        }
        if c.media {
            parts.push(consumer::report_descriptor(ids.media));
        }
        let rd = (ReportDescriptor::composite(&parts))
            .map_err(|e| Error::Config(format!("invalid report map: {e}")))?;
        let rd = compat.adapt_report_map(rd);
        if rd.as_ref().len() > MAX_REPORT_MAP {
            return Err(Error::Config(format!(
                "report map is {} bytes (max {MAX_REPORT_MAP})",
                rd.as_ref().len()
            )));
        }

        let state = Arc::new(watch::channel(HidState::empty()).0);
        let leds = Arc::new(watch::channel(LedState::empty()).0);
        let mouse_buf = ReportCell::new(mouse::neutral(ids.mouse));
        let kbd_buf = ReportCell::new(kbd::released(ids.keyboard));
        let media_buf = ReportCell::new(consumer::encode(ids.media, 0));
        let (ro, rw) = (Perms::ro(cfg.encrypt), Perms::rw(cfg.encrypt));
        let mut info = HID_INFO;
        info[2] = cfg.country_code;

        let (hdl, (m, k, x)) = b.primary_service(Service::HumanInterfaceDevice, |s| {
            use Characteristic::*;
            s.ro_characteristic(HidInformation, ro, info);
            s.ro_characteristic(ReportMap, ro, &rd);
            s.characteristic(
                HidControlPoint,
                Prop::WRITE_CMD,
                Perms::wo(cfg.encrypt),
                control_point(&state),
                |_| {},
            );
            let m = (c.mouse).then(|| input_report(s, ids.mouse, mouse_buf.io(), ro, rw));
            let k = (c.keyboard).then(|| {
                let inp = input_report(s, ids.keyboard, kbd_buf.io(), ro, rw);
                let out = ReportRef::output(ids.keyboard).to_bytes();
                s.characteristic(
                    Report,
                    Prop::READ | Prop::WRITE | Prop::WRITE_CMD,
                    rw,
                    led_io(&leds, ids.keyboard),
                    |d| {
                        d.ro_descriptor(Descriptor::ReportReference, ro, out);
                    },
                );
                inp
            });
            let x = (c.media).then(|| input_report(s, ids.media, media_buf.io(), ro, rw));
            (m, k, x)
        });
        info!(
            "HID service at {hdl}: {} byte report map, reports {:?}",
            rd.as_ref().len(),
            rd.reports()
        );

        let t = cfg.timing();
        Ok(Self {
            mouse: m.map(|h| MouseService::new(Arc::clone(n), h, ids.mouse, mouse_buf, t)),
            kbd: k.map(|h| KbdService::new(Arc::clone(n), h, ids.keyboard, kbd_buf, leds, t)),
            media: x.map(|h| MediaService::new(Arc::clone(n), h, ids.media, media_buf, t)),
            report_map: rd,
            state,
        })
    }

    /// Returns the mouse service.
    #[inline]
    pub fn mouse(&self) -> Result<&MouseService> {
        self.mouse.as_ref().ok_or(Error::ClassDisabled(Class::Mouse))
    }

    /// Returns the keyboard service.
    #[inline]
    pub fn kbd(&self) -> Result<&KbdService> {
        self.kbd.as_ref().ok_or(Error::ClassDisabled(Class::Keyboard))
    }

    /// Returns the consumer control service.
    #[inline]
    pub fn media(&self) -> Result<&MediaService> {
        self.media.as_ref().ok_or(Error::ClassDisabled(Class::Media))
    }

    /// Returns the composite report map.
    #[inline(always)]
    #[must_use]
    pub const fn report_map(&self) -> &ReportDescriptor {
        &self.report_map
    }

    /// Returns the Input Report handles that require priming after a CCCD
    /// enable.
    #[must_use]
    pub fn priming_handles(&self) -> Vec<Handle> {
        let m = self.mouse.as_ref().map(MouseService::handle);
        let k = self.kbd.as_ref().map(KbdService::handle);
        m.into_iter().chain(k).collect()
    }

    /// Returns the class owning Input Report value handle `hdl`.
    #[must_use]
    pub fn class_of(&self, hdl: Handle) -> Option<Class> {
        if self.mouse.as_ref().map(MouseService::handle) == Some(hdl) {
            Some(Class::Mouse)
        } else if self.kbd.as_ref().map(KbdService::handle) == Some(hdl) {
            Some(Class::Keyboard)
        } else if self.media.as_ref().map(MediaService::handle) == Some(hdl) {
            Some(Class::Media)
        } else {
            None
        }
    }

    /// Returns the current state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> HidState {
        *self.state.borrow()
    }

    /// Returns a receiver of state changes.
    #[inline]
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<HidState> {
        self.state.subscribe()
    }

    /// Returns the keyboard LED state.
    #[inline]
    #[must_use]
    pub fn leds(&self) -> LedState {
        self.kbd.as_ref().map_or(LedState::empty(), KbdService::leds)
    }

    /// Updates the connection flag. Disconnecting clears all report buffers,
    /// readiness flags, and the suspend state.
    pub fn set_connected(&self, on: bool) {
        if on {
            self.modify(|s| s.insert(HidState::CONNECTED));
        } else {
            self.reset();
            self.state.send_replace(HidState::empty());
        }
    }

    /// Handles a CCCD write on the Input Report of class `c`. Consumer
    /// control becomes ready immediately. Mouse and keyboard become ready
    /// after [`Self::prime`].
    pub fn on_cccd(&self, c: Class, enable: bool) {
        if !enable || c == Class::Media {
            self.set_ready(c, enable);
        }
    }

    /// Sends the priming reports of class `c` for priming `epoch` and marks
    /// it ready.
    pub async fn prime(&self, c: Class, epoch: u64) -> Result<()> {
        match c {
            Class::Mouse => self.mouse()?.prime(epoch).await?,
            Class::Keyboard => self.kbd()?.prime(epoch).await?,
            Class::Media => {}
        }
        self.set_ready(c, true);
        Ok(())
    }

    /// Sets the readiness flag of class `c`.
    pub fn set_ready(&self, c: Class, ready: bool) {
        let f = HidState::ready_flag(c);
        self.modify(|s| s.set(f, ready));
    }

    /// Clears all report buffers.
    pub fn reset(&self) {
        if let Some(ref m) = self.mouse {
            m.reset();
        }
        if let Some(ref k) = self.kbd {
            k.reset();
        }
        if let Some(ref x) = self.media {
            x.reset();
        }
    }

    fn modify(&self, f: impl FnOnce(&mut HidState)) {
        self.state.send_if_modified(|s| {
            let prev = *s;
            f(s);
            if prev != *s {
                debug!("HID state: {prev:?} -> {s:?}");
            }
            prev != *s
        });
    }
}

/// Defines an Input Report characteristic with its CCCD and Report
/// Reference descriptors.
fn input_report(s: &mut ServiceBuilder, id: u8, io: Io, ro: Perms, rw: Perms) -> Handle {
    s.characteristic(
        Characteristic::Report,
        Prop::READ | Prop::NOTIFY,
        ro,
        io,
        |d| {
            d.cccd(rw);
            d.ro_descriptor(
                Descriptor::ReportReference,
                ro,
                ReportRef::input(id).to_bytes(),
            );
        },
    )
}

/// HID Control Point handler. Unknown commands are ignored.
fn control_point(state: &Arc<watch::Sender<HidState>>) -> Io {
    Io::with(state, |st, req| {
        let IoReq::Write(w) = req else {
            return Err(ErrorCode::ReadNotPermitted);
        };
        match *w.value() {
            [SUSPEND] => {
                st.send_modify(|s| s.insert(HidState::SUSPENDED));
                info!("Host suspended");
            }
            [EXIT_SUSPEND] => {
                st.send_modify(|s| s.remove(HidState::SUSPENDED));
                info!("Host exited suspend");
            }
            ref v => trace!("Ignoring control point write: {v:?}"),
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests;
