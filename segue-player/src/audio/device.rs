//! Output device queries
//!
//! Device enumeration is a service injected into the engine at construction;
//! nothing here is a process-wide singleton.

use crate::error::Result;
use serde::{Deserialize, Serialize};

/// An output device as reported by the device service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputDevice {
    /// Stable identifier used to select the device
    pub id: String,
    /// Display name
    pub name: String,
    /// Nominal sample rate in Hz
    pub sample_rate: u32,
    /// Output channel count
    pub channels: u16,
}

/// Output device enumeration
pub trait DeviceQuery: Send + Sync {
    fn output_devices(&self) -> Result<Vec<OutputDevice>>;

    fn default_output_device(&self) -> Result<Option<OutputDevice>>;

    /// Look a device up by id
    fn find(&self, id: &str) -> Result<Option<OutputDevice>> {
        Ok(self.output_devices()?.into_iter().find(|d| d.id == id))
    }
}

/// A fixed device list (first entry is the default)
#[derive(Debug, Clone, Default)]
pub struct StaticDevices {
    devices: Vec<OutputDevice>,
}

impl StaticDevices {
    pub fn new(devices: Vec<OutputDevice>) -> Self {
        Self { devices }
    }

    /// A single device named "default"
    pub fn single(sample_rate: u32, channels: u16) -> Self {
        Self::new(vec![OutputDevice {
            id: "default".to_string(),
            name: "Default Output".to_string(),
            sample_rate,
            channels,
        }])
    }
}

impl DeviceQuery for StaticDevices {
    fn output_devices(&self) -> Result<Vec<OutputDevice>> {
        Ok(self.devices.clone())
    }

    fn default_output_device(&self) -> Result<Option<OutputDevice>> {
        Ok(self.devices.first().cloned())
    }
}

#[cfg(feature = "cpal")]
pub use self::cpal_devices::CpalDevices;

#[cfg(feature = "cpal")]
mod cpal_devices {
    use super::{DeviceQuery, OutputDevice};
    use crate::error::{Error, Result};
    use cpal::traits::{DeviceTrait, HostTrait};
    use tracing::{debug, warn};

    /// Devices of the default cpal host
    #[derive(Default)]
    pub struct CpalDevices;

    impl CpalDevices {
        fn describe(device: &cpal::Device) -> Option<OutputDevice> {
            let name = device.name().ok()?;
            match device.default_output_config() {
                Ok(config) => Some(OutputDevice {
                    id: name.clone(),
                    name,
                    sample_rate: config.sample_rate().0,
                    channels: config.channels(),
                }),
                Err(e) => {
                    warn!("Skipping output device '{}': {}", name, e);
                    None
                }
            }
        }
    }

    impl DeviceQuery for CpalDevices {
        fn output_devices(&self) -> Result<Vec<OutputDevice>> {
            let host = cpal::default_host();
            let devices: Vec<OutputDevice> = host
                .output_devices()
                .map_err(|e| Error::Graph(format!("Failed to enumerate devices: {}", e)))?
                .filter_map(|device| Self::describe(&device))
                .collect();

            debug!("Found {} output devices", devices.len());
            Ok(devices)
        }

        fn default_output_device(&self) -> Result<Option<OutputDevice>> {
            let host = cpal::default_host();
            Ok(host
                .default_output_device()
                .and_then(|device| Self::describe(&device)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_devices_default_and_find() {
        let devices = StaticDevices::new(vec![
            OutputDevice {
                id: "speakers".into(),
                name: "Speakers".into(),
                sample_rate: 44100,
                channels: 2,
            },
            OutputDevice {
                id: "dac".into(),
                name: "USB DAC".into(),
                sample_rate: 96000,
                channels: 2,
            },
        ]);

        assert_eq!(devices.default_output_device().unwrap().unwrap().id, "speakers");
        assert_eq!(devices.find("dac").unwrap().unwrap().sample_rate, 96000);
        assert!(devices.find("hdmi").unwrap().is_none());
    }
}
