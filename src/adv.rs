//! Legacy advertising manager.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::gap::{AdvFlag, Appearance, Overflow, ResponseDataMut, Service, Uuid16};
use crate::host::Platform;
use crate::le::TxPower;
use crate::{Hex, SyncMutex};

/// Maximum time to wait for the platform start result.
pub const START_TIMEOUT: Duration = Duration::from_secs(2);

/// Advertising failure reported by the platform or detected locally.
#[derive(
    Clone,
    Copy,
    Debug,
    Eq,
    Hash,
    PartialEq,
    num_enum::IntoPrimitive,
    num_enum::TryFromPrimitive,
    thiserror::Error,
)]
#[non_exhaustive]
#[repr(u8)]
pub enum AdvError {
    #[error("advertising data too large")]
    DataTooLarge = 1,
    #[error("too many advertisers")]
    TooManyAdvertisers = 2,
    #[error("advertising already started")]
    AlreadyStarted = 3,
    #[error("internal advertising error")]
    InternalError = 4,
    #[error("peripheral role not supported")]
    FeatureUnsupported = 5,
}

/// Advertiser state.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum AdvState {
    #[default]
    Stopped,
    Starting,
    Advertising,
    Failed,
}

/// Advertising configuration snapshot used for one start request.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AdvConfig {
    pub name: String,
    /// Service UUIDs. The first one is placed in the advertisement and the
    /// rest in the scan response.
    pub services: Vec<Uuid16>,
    /// Company ID and payload of the manufacturer-specific data field.
    pub manufacturer: Option<(u16, Vec<u8>)>,
    pub tx_power: TxPower,
    pub appearance: Appearance,
    pub connectable: bool,
    pub discoverable: bool,
}

impl AdvConfig {
    /// Creates a connectable, discoverable HID configuration.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            services: vec![
                Service::HumanInterfaceDevice.into(),
                Service::Battery.into(),
                Service::DeviceInformation.into(),
            ],
            manufacturer: None,
            tx_power: TxPower::default(),
            appearance: Appearance::default(),
            connectable: true,
            discoverable: true,
        }
    }

    /// Returns the platform advertising parameters.
    #[inline]
    #[must_use]
    pub const fn params(&self) -> AdvParams {
        AdvParams {
            connectable: self.connectable,
            tx_power: self.tx_power,
        }
    }

    /// Builds the advertising and scan response payloads. Optional fields
    /// that do not fit are left out.
    pub fn payload(&self) -> Result<(Vec<u8>, Vec<u8>), AdvError> {
        let too_large = |e: Overflow| {
            warn!("Advertising payload: {e}");
            AdvError::DataTooLarge
        };
        let (first, extra) = self.services.split_first().map_or((&[][..], &[][..]), |(f, e)| {
            (std::slice::from_ref(f), e)
        });

        let mut ad = ResponseDataMut::new();
        let mut flags = AdvFlag::NO_BREDR;
        flags.set(AdvFlag::LE_GENERAL, self.discoverable);
        ad.flags(flags).map_err(too_large)?;
        if !first.is_empty() {
            ad.service_class(extra.is_empty(), first).map_err(too_large)?;
        }
        ad.appearance(self.appearance).map_err(too_large)?;
        if let Some((id, ref v)) = self.manufacturer {
            if let Err(e) = ad.manufacturer_data(id, v) {
                debug!("Manufacturer data left out: {e}");
            }
        }

        let mut sr = ResponseDataMut::new();
        let n = sr.fit_local_name(&self.name).map_err(too_large)?;
        if n < self.name.len() {
            debug!("Local name shortened to {:?}", &self.name[..n]);
        }
        if let Err(e) = sr.service_class(false, extra) {
            debug!("Additional service UUIDs left out: {e}");
        }
        Ok((ad.get().to_vec(), sr.get().to_vec()))
    }
}

/// Platform advertising parameters.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct AdvParams {
    pub connectable: bool,
    pub tx_power: TxPower,
}

/// Legacy advertising manager.
#[derive(Debug)]
pub struct Advertiser {
    platform: Arc<dyn Platform>,
    timeout: Duration,
    st: SyncMutex<State>,
}

#[derive(Debug, Default)]
struct State {
    state: AdvState,
    last_error: Option<AdvError>,
    supported: Option<bool>,
    pending: Option<oneshot::Sender<Result<(), AdvError>>>,
}

impl Advertiser {
    /// Creates an advertiser using the default start timeout.
    #[inline]
    #[must_use]
    pub fn new(platform: Arc<dyn Platform>) -> Self {
        Self::with_timeout(platform, START_TIMEOUT)
    }

    /// Creates an advertiser that waits at most `timeout` for start results.
    #[must_use]
    pub fn with_timeout(platform: Arc<dyn Platform>, timeout: Duration) -> Self {
        Self {
            platform,
            timeout,
            st: SyncMutex::default(),
        }
    }

    /// Returns the current state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> AdvState {
        self.st.lock().state
    }

    /// Returns whether advertising is active.
    #[inline]
    #[must_use]
    pub fn is_advertising(&self) -> bool {
        self.state() == AdvState::Advertising
    }

    /// Returns the error of the last failed start.
    #[inline]
    #[must_use]
    pub fn last_error(&self) -> Option<AdvError> {
        self.st.lock().last_error
    }

    /// Starts advertising and waits for the platform result. Returns whether
    /// advertising started. Failures are recorded in [`Self::last_error`].
    pub async fn start(&self, cfg: &AdvConfig) -> bool {
        let rx = {
            let mut st = self.st.lock();
            match st.state {
                AdvState::Advertising => {
                    debug!("Already advertising");
                    return true;
                }
                AdvState::Starting => {
                    warn!("Advertising start already in progress");
                    st.last_error = Some(AdvError::AlreadyStarted);
                    return false;
                }
                AdvState::Stopped | AdvState::Failed => {}
            }
            let platform = &self.platform;
            let supported = *(st.supported).get_or_insert_with(|| platform.supports_peripheral());
            if !supported {
                return Self::fail(&mut st, AdvError::FeatureUnsupported);
            }
            let (ad, sr) = match cfg.payload() {
                Ok(v) => v,
                Err(e) => return Self::fail(&mut st, e),
            };
            debug!("AD: {}", Hex(&ad));
            debug!("SR: {}", Hex(&sr));
            let (tx, rx) = oneshot::channel();
            st.state = AdvState::Starting;
            st.pending = Some(tx);
            if let Err(e) = self.platform.start_advertising(&cfg.params(), &ad, &sr) {
                st.pending = None;
                return Self::fail(&mut st, e);
            }
            rx
        };
        let r = tokio::time::timeout(self.timeout, rx).await;
        let mut st = self.st.lock();
        match r {
            Ok(Ok(Ok(()))) => {
                st.state = AdvState::Advertising;
                st.last_error = None;
                info!("Advertising as {:?}", cfg.name);
                true
            }
            Ok(Ok(Err(e))) => Self::fail(&mut st, e),
            // Stopped while starting
            Ok(Err(_)) => false,
            Err(_) => {
                warn!("No advertising start result after {:?}", self.timeout);
                st.pending = None;
                self.platform.stop_advertising();
                Self::fail(&mut st, AdvError::InternalError)
            }
        }
    }

    /// Delivers the platform start result.
    pub fn on_result(&self, r: Result<(), AdvError>) {
        match self.st.lock().pending.take() {
            Some(tx) => {
                let _ = tx.send(r);
            }
            None => debug!("Ignoring advertising result: {r:?}"),
        }
    }

    /// Stops advertising. Has no effect if advertising is not active.
    pub fn stop(&self) {
        let mut st = self.st.lock();
        if matches!(st.state, AdvState::Advertising | AdvState::Starting) {
            self.platform.stop_advertising();
            st.pending = None;
            st.state = AdvState::Stopped;
            info!("Advertising stopped");
        }
    }

    /// Marks advertising as stopped by the platform, which happens when a
    /// central connects.
    pub fn on_stopped(&self) {
        let mut st = self.st.lock();
        st.pending = None;
        st.state = AdvState::Stopped;
    }

    fn fail(st: &mut State, e: AdvError) -> bool {
        warn!("Advertising failed: {e}");
        st.state = AdvState::Failed;
        st.last_error = Some(e);
        false
    }
}
