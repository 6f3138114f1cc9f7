//! Audio-output device selection for publisher mode.
//!
//! When the backend supports switching the output device and more than one
//! output exists, the shell is offered the list with the current device
//! marked. The list is rebuilt on every device-list change.

use crate::engine::events::Subscription;
use crate::engine::{DeviceEvent, DeviceInfo, DeviceKind, MediaDevices};
use crate::errors::ClientError;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

/// One selectable audio output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AudioOutputOption {
    pub device_id: String,
    pub label: String,
    pub selected: bool,
}

/// Build the option list from a device enumeration. Empty unless there is
/// more than one audio output to choose from.
#[must_use]
pub fn audio_output_options(
    devices: &[DeviceInfo],
    selected: Option<&str>,
) -> Vec<AudioOutputOption> {
    let outputs: Vec<_> = devices
        .iter()
        .filter(|d| d.kind == DeviceKind::AudioOutput)
        .collect();
    if outputs.len() <= 1 {
        return Vec::new();
    }
    outputs
        .into_iter()
        .map(|d| AudioOutputOption {
            device_id: d.device_id.clone(),
            label: d.label.clone(),
            selected: selected == Some(d.device_id.as_str()),
        })
        .collect()
}

pub struct AudioOutputSelector {
    devices: Arc<dyn MediaDevices>,
}

impl AudioOutputSelector {
    #[must_use]
    pub fn new(devices: Arc<dyn MediaDevices>) -> Self {
        Self { devices }
    }

    /// Whether the backend can switch the output device at all.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.devices.is_output_change_available()
    }

    /// Options for the given device list. Empty when switching is unavailable.
    #[must_use]
    pub fn options_for(&self, devices: &[DeviceInfo]) -> Vec<AudioOutputOption> {
        if !self.is_available() {
            return Vec::new();
        }
        let current = self.devices.audio_output_device();
        let options = audio_output_options(devices, current.as_deref());
        debug!(
            target: "client.devices",
            devices = devices.len(),
            options = options.len(),
            "Audio output options rebuilt"
        );
        options
    }

    /// Enumerate devices and build the options.
    ///
    /// # Errors
    ///
    /// Enumeration failures from the backend.
    pub async fn refresh(&self) -> Result<Vec<AudioOutputOption>, ClientError> {
        if !self.is_available() {
            return Ok(Vec::new());
        }
        let devices = self.devices.enumerate_devices().await?;
        Ok(self.options_for(&devices))
    }

    /// Subscribe to device-list changes.
    #[must_use]
    pub fn events(&self) -> Subscription<DeviceEvent> {
        self.devices.events()
    }

    /// Switch to `device_id`.
    ///
    /// # Errors
    ///
    /// `WrongMode` when switching is unavailable, or the backend's rejection.
    pub fn select(&self, device_id: &str) -> Result<(), ClientError> {
        if !self.is_available() {
            return Err(ClientError::WrongMode("select_audio_output"));
        }
        self.devices.set_audio_output_device(device_id)?;
        info!(
            target: "client.devices",
            device_id = %device_id,
            "Audio output device selected"
        );
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::engine::loopback::LoopbackEngine;
    use crate::engine::EngineOptions;
    use crate::errors::EngineError;

    fn device(id: &str, kind: DeviceKind) -> DeviceInfo {
        DeviceInfo {
            device_id: id.to_string(),
            label: format!("{id} label"),
            kind,
        }
    }

    fn engine() -> LoopbackEngine {
        LoopbackEngine::new(EngineOptions {
            domain: "meet.jitsi".to_string(),
            muc_domain: "muc.meet.jitsi".to_string(),
            service_url: "wss://localhost/xmpp-websocket".to_string(),
            disable_audio_levels: true,
        })
    }

    #[test]
    fn test_single_output_offers_nothing() {
        let devices = vec![
            device("mic", DeviceKind::AudioInput),
            device("speaker", DeviceKind::AudioOutput),
        ];
        assert!(audio_output_options(&devices, Some("speaker")).is_empty());
    }

    #[test]
    fn test_multiple_outputs_mark_selected() {
        let devices = vec![
            device("speaker", DeviceKind::AudioOutput),
            device("cam", DeviceKind::VideoInput),
            device("headset", DeviceKind::AudioOutput),
        ];
        let options = audio_output_options(&devices, Some("headset"));

        let selected: Vec<_> = options
            .iter()
            .map(|o| (o.device_id.as_str(), o.selected))
            .collect();
        assert_eq!(selected, vec![("speaker", false), ("headset", true)]);
    }

    #[tokio::test]
    async fn test_refresh_and_select_on_loopback() {
        let engine = engine();
        let selector = AudioOutputSelector::new(engine.devices());
        engine.set_devices(vec![
            device("default-speaker", DeviceKind::AudioOutput),
            device("headset", DeviceKind::AudioOutput),
        ]);

        let options = selector.refresh().await.unwrap();
        assert_eq!(options.len(), 2);
        assert!(options
            .iter()
            .any(|o| o.device_id == "default-speaker" && o.selected));

        selector.select("headset").unwrap();
        let options = selector.refresh().await.unwrap();
        assert!(options.iter().any(|o| o.device_id == "headset" && o.selected));
    }

    #[test]
    fn test_select_unknown_device_rejected() {
        let selector = AudioOutputSelector::new(engine().devices());
        let err = selector.select("nowhere").unwrap_err();
        assert!(matches!(err, ClientError::Engine(EngineError::Rejected(_))));
    }
}
