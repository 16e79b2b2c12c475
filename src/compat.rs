//! Host compatibility strategies.
//!
//! Some hosts are stricter than others about advertising contents and device
//! names. A [`CompatStrategy`] adapts the advertising configuration, report
//! map, and device name before they are handed to the platform.

use std::fmt::Debug;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::adv::AdvConfig;
use crate::hid::descriptor::ReportDescriptor;

/// Maximum device name length used for Apple hosts.
const APPLE_NAME_MAX: usize = 15;

/// Host-specific adjustments applied by the manager.
pub trait CompatStrategy: Debug + Send + Sync {
    /// Returns the strategy name for logging.
    fn name(&self) -> &'static str;

    /// Adapts the advertising configuration.
    #[inline(always)]
    fn adapt_advertising(&self, cfg: AdvConfig) -> AdvConfig {
        cfg
    }

    /// Adapts the composite report map.
    #[inline(always)]
    fn adapt_report_map(&self, rd: ReportDescriptor) -> ReportDescriptor {
        rd
    }

    /// Returns the device name presented to the host.
    #[inline(always)]
    fn device_name(&self, name: &str) -> String {
        name.to_owned()
    }
}

/// Strategy that leaves everything unchanged.
#[derive(Clone, Copy, Debug, Default)]
#[non_exhaustive]
pub struct Generic;

impl CompatStrategy for Generic {
    #[inline(always)]
    fn name(&self) -> &'static str {
        "generic"
    }
}

/// Strategy for macOS and iOS hosts. Adds manufacturer data, forces a
/// connectable general discoverable advertisement, and shortens the name.
#[derive(Clone, Copy, Debug)]
pub struct Apple {
    pub company_id: u16,
}

impl CompatStrategy for Apple {
    #[inline(always)]
    fn name(&self) -> &'static str {
        "apple"
    }

    fn adapt_advertising(&self, mut cfg: AdvConfig) -> AdvConfig {
        if cfg.manufacturer.is_none() {
            cfg.manufacturer = Some((self.company_id, Vec::new()));
        }
        cfg.connectable = true;
        cfg.discoverable = true;
        cfg.name = self.device_name(&cfg.name);
        cfg
    }

    fn device_name(&self, name: &str) -> String {
        let n = truncate(name, APPLE_NAME_MAX);
        if n.len() < name.len() {
            debug!("Device name shortened to {n:?}");
        }
        n.to_owned()
    }
}

/// Host kind selected by the configuration.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HostKind {
    #[default]
    Generic,
    Apple,
}

impl HostKind {
    /// Returns the strategy for this host kind.
    #[must_use]
    pub fn strategy(self, company_id: u16) -> Arc<dyn CompatStrategy> {
        match self {
            Self::Generic => Arc::new(Generic),
            Self::Apple => Arc::new(Apple { company_id }),
        }
    }
}

/// Truncates `s` to at most `max` bytes at a character boundary.
fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut i = max;
    while !s.is_char_boundary(i) {
        i -= 1;
    }
    &s[..i]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generic() {
        let s = HostKind::Generic.strategy(0x00E0);
        assert_eq!(s.name(), "generic");
        let cfg = AdvConfig::new("A very long device name");
        assert_eq!(s.adapt_advertising(cfg.clone()), cfg);
        assert_eq!(s.device_name("x"), "x");
    }

    #[test]
    fn apple() {
        let s = HostKind::Apple.strategy(0x004C);
        let mut cfg = AdvConfig::new("Android HID Mouse Pad");
        cfg.discoverable = false;
        cfg.connectable = false;
        let cfg = s.adapt_advertising(cfg);
        assert_eq!(cfg.manufacturer, Some((0x004C, vec![])));
        assert!(cfg.connectable && cfg.discoverable);
        assert_eq!(cfg.name, "Android HID Mou");

        let mut cfg = AdvConfig::new("Pad");
        cfg.manufacturer = Some((0x00E0, vec![1]));
        let cfg = s.adapt_advertising(cfg);
        assert_eq!(cfg.manufacturer, Some((0x00E0, vec![1])));
        assert_eq!(cfg.name, "Pad");
    }

    #[test]
    fn char_boundary() {
        assert_eq!(truncate("ééééééééé", 15), "ééééééé");
        assert_eq!(truncate("abc", 15), "abc");
    }

    #[test]
    fn host_kind_serde() {
        let k: HostKind = serde_json::from_str("\"apple\"").unwrap();
        assert_eq!(k, HostKind::Apple);
        assert_eq!(serde_json::to_string(&HostKind::Generic).unwrap(), "\"generic\"");
    }
}
