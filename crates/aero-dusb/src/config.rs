//! Construction-time configuration.
//!
//! Everything here is already parsed by the time the device sees it; `from_json` exists for the
//! simulator binary and tests.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::profile::{DeviceProfile, ProfileKind};
use crate::timer::NS_PER_MS;
use crate::usb::UsbSpeed;

pub const DEFAULT_DATA_INTERVAL_MS: u64 = 30_000;
pub const DEFAULT_WAKEUP_INTERVAL_MS: u64 = 10_000;
/// Largest interval whose nanosecond form fits in the device clock.
pub const MAX_INTERVAL_MS: u64 = u64::MAX / NS_PER_MS;

/// `bLength` is a byte: (255 - 2) / 2 UTF-16 units fit after the header.
pub const MAX_STRING_UNITS: usize = 126;

/// Identification metadata echoed into the device and string descriptors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeviceIdentity {
    pub vendor_id: u16,
    pub product_id: u16,
    pub device_release: u16,
    pub manufacturer: String,
    pub product: String,
    pub serial: String,
}

impl Default for DeviceIdentity {
    fn default() -> Self {
        Self {
            vendor_id: 0x0069,
            product_id: 0x0420,
            device_release: 0x0089,
            manufacturer: "Aero".to_string(),
            product: "DUSB Device".to_string(),
            serial: "69-420".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DusbConfig {
    /// Highest link speed the device advertises.
    pub max_speed: UsbSpeed,
    pub layout: ProfileKind,
    pub data_interval_ms: u64,
    pub wakeup_interval_ms: u64,
    pub identity: DeviceIdentity,
}

impl Default for DusbConfig {
    fn default() -> Self {
        Self {
            max_speed: UsbSpeed::Super,
            layout: ProfileKind::PerClass,
            data_interval_ms: DEFAULT_DATA_INTERVAL_MS,
            wakeup_interval_ms: DEFAULT_WAKEUP_INTERVAL_MS,
            identity: DeviceIdentity::default(),
        }
    }
}

impl DusbConfig {
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (which, ms) in [
            ("data generation", self.data_interval_ms),
            ("remote wakeup", self.wakeup_interval_ms),
        ] {
            if ms == 0 {
                return Err(ConfigError::ZeroInterval { which });
            }
            if ms > MAX_INTERVAL_MS {
                return Err(ConfigError::IntervalTooLarge {
                    which,
                    ms,
                    max: MAX_INTERVAL_MS,
                });
            }
        }

        // The layout is speed-independent in shape; checking one speed catches bad counts.
        DeviceProfile::select(self.layout, self.max_speed)?;

        for (field, value) in [
            ("manufacturer", &self.identity.manufacturer),
            ("product", &self.identity.product),
            ("serial", &self.identity.serial),
        ] {
            let units = value.encode_utf16().count();
            if units > MAX_STRING_UNITS {
                return Err(ConfigError::StringTooLong {
                    field,
                    units,
                    max: MAX_STRING_UNITS,
                });
            }
        }
        Ok(())
    }

    pub fn data_interval_ns(&self) -> u64 {
        self.data_interval_ms.saturating_mul(NS_PER_MS)
    }

    pub fn wakeup_interval_ns(&self) -> u64 {
        self.wakeup_interval_ms.saturating_mul(NS_PER_MS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProfileError;

    #[test]
    fn empty_object_yields_defaults() {
        let config = DusbConfig::from_json("{}").unwrap();
        assert_eq!(config, DusbConfig::default());
        assert_eq!(config.data_interval_ns(), 30_000 * NS_PER_MS);
        assert_eq!(config.wakeup_interval_ns(), 10_000 * NS_PER_MS);
    }

    #[test]
    fn parses_triplet_layout_and_partial_identity() {
        let config = DusbConfig::from_json(
            r#"{
                "max_speed": "high",
                "layout": { "kind": "triplet", "interfaces": 2 },
                "data_interval_ms": 5,
                "identity": { "serial": "abc" }
            }"#,
        )
        .unwrap();
        assert_eq!(config.max_speed, UsbSpeed::High);
        assert_eq!(config.layout, ProfileKind::Triplet { interfaces: 2 });
        assert_eq!(config.data_interval_ms, 5);
        assert_eq!(config.identity.serial, "abc");
        assert_eq!(config.identity.vendor_id, 0x0069);
    }

    #[test]
    fn rejects_invalid_values() {
        let err = DusbConfig::from_json(r#"{"wakeup_interval_ms": 0}"#).unwrap_err();
        assert!(matches!(err, ConfigError::ZeroInterval { which: "remote wakeup" }));

        let err = DusbConfig::from_json(r#"{"layout": {"kind": "triplet", "interfaces": 6}}"#)
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Layout(ProfileError::InterfaceCount { requested: 6, .. })
        ));

        let err = DusbConfig::from_json(&format!(r#"{{"data_interval_ms": {}}}"#, u64::MAX))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::IntervalTooLarge { which: "data generation", .. }
        ));
        let mut config = DusbConfig::default();
        config.wakeup_interval_ms = MAX_INTERVAL_MS;
        assert!(config.validate().is_ok());
        assert_eq!(config.wakeup_interval_ns(), MAX_INTERVAL_MS * NS_PER_MS);

        let err = DusbConfig::from_json(r#"{"bogus": 1}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));

        let mut config = DusbConfig::default();
        config.identity.product = "x".repeat(MAX_STRING_UNITS + 1);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::StringTooLong { field: "product", .. })
        ));
    }
}
