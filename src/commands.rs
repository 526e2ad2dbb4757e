//! Typed camera commands.
//!
//! Thin wrappers over the outgoing control characteristic: each setter
//! clamps out-of-range input to the protocol's valid band (matching camera
//! firmware expectations) and fails fast with
//! [`Error::NotConnected`](crate::error::Error::NotConnected) when no
//! session is established. Recording state is read back only from confirmed
//! camera reports, never flipped optimistically.

use tracing::debug;

use crate::connection::ConnectionManager;
use crate::error::Result;
use crate::protocol::{float_to_fixed16, Category, DataType, OperationType};

/// Well-known parameter ids used by the typed setters.
pub mod params {
    pub mod lens {
        pub const FOCUS: u8 = 0x00;
        pub const AUTO_FOCUS: u8 = 0x01;
        pub const IRIS_NORMALIZED: u8 = 0x03;
        pub const AUTO_APERTURE: u8 = 0x05;
    }

    pub mod video {
        pub const WHITE_BALANCE: u8 = 0x02;
        pub const AUTO_WHITE_BALANCE: u8 = 0x03;
        pub const SHUTTER_ANGLE: u8 = 0x0B;
        pub const GAIN: u8 = 0x0D;
        pub const ISO: u8 = 0x0E;
    }

    pub mod transport {
        pub const MODE: u8 = 0x01;
    }
}

/// Raw focus span: 0 (near) to 2048 (infinity).
pub const FOCUS_RAW_MAX: u16 = 2048;
/// Supported manual white balance band in Kelvin.
pub const WHITE_BALANCE_KELVIN: std::ops::RangeInclusive<i16> = 2500..=10_000;
/// Supported white balance tint adjustment.
pub const WHITE_BALANCE_TINT: std::ops::RangeInclusive<i16> = -50..=50;
/// Supported shutter angle in degrees.
pub const SHUTTER_ANGLE_DEGREES: std::ops::RangeInclusive<f32> = 5.0..=360.0;
/// Supported ISO band.
pub const ISO_RANGE: std::ops::RangeInclusive<u32> = 100..=25_600;

/// Transport mode values for the record parameter.
const MODE_PREVIEW: i8 = 0;
const MODE_RECORD: i8 = 2;

/// Command surface borrowed from a [`ConnectionManager`].
pub struct CommandDispatcher<'a> {
    conn: &'a mut ConnectionManager,
}

impl<'a> CommandDispatcher<'a> {
    pub(crate) fn new(conn: &'a mut ConnectionManager) -> Self {
        Self { conn }
    }

    // --- Lens ---------------------------------------------------------

    /// Set focus from a normalized 0.0 (near) to 1.0 (infinity) value.
    /// Out-of-range input clamps.
    pub async fn set_focus(&mut self, normalized: f32) -> Result<()> {
        let normalized = normalized.clamp(0.0, 1.0);
        self.set_focus_raw((normalized * FOCUS_RAW_MAX as f32).round() as u16)
            .await
    }

    /// Set focus from the raw 0..=2048 fixed-point span. Values above the
    /// span clamp to infinity.
    pub async fn set_focus_raw(&mut self, raw: u16) -> Result<()> {
        let raw = raw.min(FOCUS_RAW_MAX) as i16;
        self.conn
            .send_command(
                Category::Lens,
                params::lens::FOCUS,
                DataType::Fixed16,
                OperationType::Assign,
                &raw.to_le_bytes(),
            )
            .await
    }

    /// Trigger the camera's one-shot auto focus.
    pub async fn trigger_auto_focus(&mut self) -> Result<()> {
        self.conn
            .send_command(
                Category::Lens,
                params::lens::AUTO_FOCUS,
                DataType::Void,
                OperationType::Assign,
                &[],
            )
            .await
    }

    /// Set the iris from a normalized 0.0 (open) to 1.0 (closed) value.
    /// Out-of-range input clamps.
    pub async fn set_iris(&mut self, normalized: f32) -> Result<()> {
        let raw = float_to_fixed16(normalized.clamp(0.0, 1.0));
        self.conn
            .send_command(
                Category::Lens,
                params::lens::IRIS_NORMALIZED,
                DataType::Fixed16,
                OperationType::Assign,
                &raw.to_le_bytes(),
            )
            .await
    }

    /// Trigger the camera's one-shot auto aperture.
    pub async fn trigger_auto_aperture(&mut self) -> Result<()> {
        self.conn
            .send_command(
                Category::Lens,
                params::lens::AUTO_APERTURE,
                DataType::Void,
                OperationType::Assign,
                &[],
            )
            .await
    }

    // --- Video --------------------------------------------------------

    /// Set manual white balance. Kelvin clamps to 2500..=10000, tint to
    /// -50..=50.
    pub async fn set_white_balance(&mut self, kelvin: i16, tint: i16) -> Result<()> {
        let kelvin = kelvin.clamp(*WHITE_BALANCE_KELVIN.start(), *WHITE_BALANCE_KELVIN.end());
        let tint = tint.clamp(*WHITE_BALANCE_TINT.start(), *WHITE_BALANCE_TINT.end());
        let mut payload = [0u8; 4];
        payload[..2].copy_from_slice(&kelvin.to_le_bytes());
        payload[2..].copy_from_slice(&tint.to_le_bytes());
        self.conn
            .send_command(
                Category::Video,
                params::video::WHITE_BALANCE,
                DataType::SignedInt16,
                OperationType::Assign,
                &payload,
            )
            .await
    }

    /// Trigger automatic white balance measurement.
    pub async fn trigger_auto_white_balance(&mut self) -> Result<()> {
        self.conn
            .send_command(
                Category::Video,
                params::video::AUTO_WHITE_BALANCE,
                DataType::Void,
                OperationType::Assign,
                &[],
            )
            .await
    }

    /// Set the shutter angle in degrees, clamped to 5.0..=360.0.
    pub async fn set_shutter_angle(&mut self, degrees: f32) -> Result<()> {
        let degrees = degrees.clamp(*SHUTTER_ANGLE_DEGREES.start(), *SHUTTER_ANGLE_DEGREES.end());
        let hundredths = (degrees * 100.0).round() as i32;
        self.conn
            .send_command(
                Category::Video,
                params::video::SHUTTER_ANGLE,
                DataType::SignedInt32,
                OperationType::Assign,
                &hundredths.to_le_bytes(),
            )
            .await
    }

    /// Set sensor gain in decibels.
    pub async fn set_gain(&mut self, db: i8) -> Result<()> {
        self.conn
            .send_command(
                Category::Video,
                params::video::GAIN,
                DataType::SignedByte,
                OperationType::Assign,
                &[db as u8],
            )
            .await
    }

    /// Set ISO, clamped to 100..=25600.
    pub async fn set_iso(&mut self, iso: u32) -> Result<()> {
        let iso = iso.clamp(*ISO_RANGE.start(), *ISO_RANGE.end()) as i32;
        self.conn
            .send_command(
                Category::Video,
                params::video::ISO,
                DataType::SignedInt32,
                OperationType::Assign,
                &iso.to_le_bytes(),
            )
            .await
    }

    // --- Transport ----------------------------------------------------

    pub async fn start_recording(&mut self) -> Result<()> {
        self.set_transport_mode(MODE_RECORD).await
    }

    pub async fn stop_recording(&mut self) -> Result<()> {
        self.set_transport_mode(MODE_PREVIEW).await
    }

    /// Whether the camera last reported itself recording. Reflects only
    /// confirmed reports; a just-sent `start_recording` does not flip it.
    pub fn is_recording(&self) -> bool {
        self.conn
            .parameters()
            .get(Category::Transport, params::transport::MODE)
            .and_then(|entry| entry.to_i64().ok())
            .is_some_and(|mode| mode == MODE_RECORD as i64)
    }

    /// Start or stop recording based on the last confirmed transport mode.
    pub async fn toggle_recording(&mut self) -> Result<()> {
        if self.is_recording() {
            self.stop_recording().await
        } else {
            self.start_recording().await
        }
    }

    async fn set_transport_mode(&mut self, mode: i8) -> Result<()> {
        debug!("setting transport mode {mode}");
        self.conn
            .send_command(
                Category::Transport,
                params::transport::MODE,
                DataType::SignedByte,
                OperationType::Assign,
                &[mode as u8],
            )
            .await
    }

    // --- Generic ------------------------------------------------------

    /// Ask the camera to report a parameter's current value.
    pub async fn request_parameter(
        &mut self,
        category: Category,
        parameter: u8,
        data_type: DataType,
    ) -> Result<()> {
        self.conn
            .send_command(category, parameter, data_type, OperationType::Report, &[])
            .await
    }

    /// Send an arbitrary category/parameter/type/operation command.
    pub async fn send_raw(
        &mut self,
        category: Category,
        parameter: u8,
        data_type: DataType,
        operation: OperationType,
        payload: &[u8],
    ) -> Result<()> {
        self.conn
            .send_command(category, parameter, data_type, operation, payload)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::protocol::{decode_packet, uuids};
    use crate::settings::ControllerSettings;
    use crate::test_support::{connected_harness, harness, MockInner};
    use crate::transport::TransportEvent;
    use uuid::Uuid;

    fn control_writes(writes: &[(Uuid, Vec<u8>)]) -> Vec<Vec<u8>> {
        writes
            .iter()
            .filter(|(c, _)| *c == uuids::OUTGOING_CONTROL)
            .map(|(_, p)| p.clone())
            .collect()
    }

    #[tokio::test]
    async fn commands_fail_fast_when_not_connected() {
        let mut h = harness(MockInner::default(), ControllerSettings::default());
        let err = h.manager.commands().set_focus(0.5).await.unwrap_err();
        assert!(matches!(err, Error::NotConnected));
        assert!(h.inner.lock().unwrap().writes.is_empty());
    }

    #[tokio::test]
    async fn focus_clamps_to_valid_range() {
        let mut h = connected_harness().await;

        h.manager.commands().set_focus(-0.5).await.unwrap();
        h.manager.commands().set_focus(0.0).await.unwrap();
        h.manager.commands().set_focus(1.5).await.unwrap();
        h.manager.commands().set_focus(1.0).await.unwrap();
        h.manager.commands().set_focus_raw(9999).await.unwrap();

        let writes = control_writes(&h.inner.lock().unwrap().writes);
        assert_eq!(writes[0], writes[1], "below-range focus equals 0.0");
        assert_eq!(writes[2], writes[3], "above-range focus equals 1.0");
        assert_eq!(writes[4], writes[3], "raw overflow clamps to 2048");

        let packet = decode_packet(&writes[3]).unwrap();
        assert_eq!(packet.category, Category::Lens);
        assert_eq!(packet.parameter, params::lens::FOCUS);
        assert_eq!(packet.data_type, DataType::Fixed16);
        assert_eq!(packet.payload, vec![0x00, 0x08]); // 2048
    }

    #[tokio::test]
    async fn white_balance_clamps_to_kelvin_band() {
        let mut h = connected_harness().await;

        h.manager.commands().set_white_balance(1000, 200).await.unwrap();
        let writes = control_writes(&h.inner.lock().unwrap().writes);
        let packet = decode_packet(&writes[0]).unwrap();
        assert_eq!(packet.category, Category::Video);
        assert_eq!(packet.parameter, params::video::WHITE_BALANCE);
        // 2500 = 0x09C4, tint 50
        assert_eq!(packet.payload, vec![0xC4, 0x09, 0x32, 0x00]);
    }

    #[tokio::test]
    async fn auto_triggers_are_empty_void_commands() {
        let mut h = connected_harness().await;
        h.manager.commands().trigger_auto_focus().await.unwrap();
        h.manager
            .commands()
            .trigger_auto_white_balance()
            .await
            .unwrap();

        let writes = control_writes(&h.inner.lock().unwrap().writes);
        let af = decode_packet(&writes[0]).unwrap();
        assert_eq!(af.category, Category::Lens);
        assert_eq!(af.parameter, params::lens::AUTO_FOCUS);
        assert_eq!(af.data_type, DataType::Void);
        assert!(af.payload.is_empty());

        let awb = decode_packet(&writes[1]).unwrap();
        assert_eq!(awb.category, Category::Video);
        assert_eq!(awb.parameter, params::video::AUTO_WHITE_BALANCE);
    }

    #[tokio::test]
    async fn shutter_angle_and_iso_clamp() {
        let mut h = connected_harness().await;
        h.manager.commands().set_shutter_angle(1.0).await.unwrap();
        h.manager.commands().set_iso(50).await.unwrap();

        let writes = control_writes(&h.inner.lock().unwrap().writes);
        let angle = decode_packet(&writes[0]).unwrap();
        assert_eq!(angle.parameter, params::video::SHUTTER_ANGLE);
        assert_eq!(angle.payload, 500i32.to_le_bytes().to_vec()); // 5.00 degrees

        let iso = decode_packet(&writes[1]).unwrap();
        assert_eq!(iso.parameter, params::video::ISO);
        assert_eq!(iso.payload, 100i32.to_le_bytes().to_vec());
    }

    #[tokio::test]
    async fn recording_state_comes_from_confirmed_reports_only() {
        let mut h = connected_harness().await;

        assert!(!h.manager.commands().is_recording());
        h.manager.commands().toggle_recording().await.unwrap();

        // The camera has not confirmed anything yet, so a second toggle
        // still sends the record command.
        assert!(!h.manager.commands().is_recording());

        // Camera confirms: transport mode report = 2 (record).
        h.sender
            .send(TransportEvent::Notification {
                characteristic: uuids::INCOMING_CONTROL,
                data: vec![
                    0xFF, 0x07, 0x00, 0x00, 0x0A, 0x01, 0x01, 0x02, 0x02, 0x00, 0x00, 0x00,
                ],
            })
            .unwrap();
        h.manager.process_events().await;
        assert!(h.manager.commands().is_recording());

        h.manager.commands().toggle_recording().await.unwrap();

        let writes = control_writes(&h.inner.lock().unwrap().writes);
        let first = decode_packet(&writes[0]).unwrap();
        assert_eq!(first.payload, vec![0x02]); // start
        let second = decode_packet(&writes[1]).unwrap();
        assert_eq!(second.payload, vec![0x00]); // stop after confirmation
    }

    #[tokio::test]
    async fn request_parameter_sends_empty_report() {
        let mut h = connected_harness().await;
        h.manager
            .commands()
            .request_parameter(Category::Video, 0x02, DataType::SignedInt16)
            .await
            .unwrap();

        let writes = control_writes(&h.inner.lock().unwrap().writes);
        let packet = decode_packet(&writes[0]).unwrap();
        assert_eq!(packet.operation, OperationType::Report);
        assert!(packet.payload.is_empty());
    }
}
