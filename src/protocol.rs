//! Camera control wire protocol.
//!
//! Pure codec for the BLE camera control protocol: packet framing, typed
//! payload encoding/decoding, the 5.11 fixed-point format, and the small
//! side formats carried on the timecode and camera status characteristics.
//! No I/O and no state lives here.

use uuid::{uuid, Uuid};

/// Service and characteristic UUIDs exposed by the camera.
pub mod uuids {
    use super::*;

    /// Primary camera control service.
    pub const CAMERA_SERVICE: Uuid = uuid!("291d567a-6d75-11e6-8b77-86f30ca893d3");
    /// Outgoing camera control characteristic (write).
    pub const OUTGOING_CONTROL: Uuid = uuid!("5dd3465f-1aee-4299-8493-d2eca2f8e1bb");
    /// Incoming camera control characteristic (indicate).
    pub const INCOMING_CONTROL: Uuid = uuid!("b864e140-76a0-416a-bf30-5876504537d9");
    /// Timecode characteristic (notify, 4-byte BCD payload).
    pub const TIMECODE: Uuid = uuid!("6d8f2110-86f1-41bf-9afb-451d87e976c8");
    /// Camera status characteristic (notify, 1-byte flags).
    pub const CAMERA_STATUS: Uuid = uuid!("7fe8691d-95dc-4fc5-8abd-ca74339b51b9");
    /// Device name characteristic (write). The controller pushes its own
    /// display name here so the camera can show who is connected.
    pub const DEVICE_NAME: Uuid = uuid!("ffac0c52-c9fb-41a0-b063-cc76282eb89c");
}

/// Destination byte addressing all cameras on the link.
pub const BROADCAST_DESTINATION: u8 = 0xFF;

/// Fixed header size: destination, length, command id, reserved, category,
/// parameter, data type, operation.
pub const HEADER_LEN: usize = 8;

/// Practical per-packet payload ceiling.
pub const MAX_PAYLOAD: usize = 64;

/// Functional group a command or report addresses.
///
/// Values are wire-visible and must serialize exactly as listed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Category {
    Lens = 0x00,
    Video = 0x01,
    Audio = 0x02,
    Output = 0x03,
    Display = 0x04,
    Tally = 0x05,
    Reference = 0x06,
    Configuration = 0x07,
    ColorCorrection = 0x08,
    Status = 0x09,
    Transport = 0x0A,
    ExtendedLens = 0x0C,
}

impl Category {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Self::Lens),
            0x01 => Some(Self::Video),
            0x02 => Some(Self::Audio),
            0x03 => Some(Self::Output),
            0x04 => Some(Self::Display),
            0x05 => Some(Self::Tally),
            0x06 => Some(Self::Reference),
            0x07 => Some(Self::Configuration),
            0x08 => Some(Self::ColorCorrection),
            0x09 => Some(Self::Status),
            0x0A => Some(Self::Transport),
            0x0C => Some(Self::ExtendedLens),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Lens => "Lens",
            Self::Video => "Video",
            Self::Audio => "Audio",
            Self::Output => "Output",
            Self::Display => "Display",
            Self::Tally => "Tally",
            Self::Reference => "Reference",
            Self::Configuration => "Configuration",
            Self::ColorCorrection => "Color Correction",
            Self::Status => "Status",
            Self::Transport => "Transport",
            Self::ExtendedLens => "Extended Lens",
        }
    }
}

/// How a payload's bytes are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DataType {
    /// Empty trigger or one boolean byte (non-zero = true).
    Void = 0x00,
    SignedByte = 0x01,
    SignedInt16 = 0x02,
    SignedInt32 = 0x03,
    SignedInt64 = 0x04,
    Utf8String = 0x05,
    /// 16-bit little-endian two's-complement, 5 integer + 11 fractional bits.
    Fixed16 = 0x80,
}

impl DataType {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Self::Void),
            0x01 => Some(Self::SignedByte),
            0x02 => Some(Self::SignedInt16),
            0x03 => Some(Self::SignedInt32),
            0x04 => Some(Self::SignedInt64),
            0x05 => Some(Self::Utf8String),
            0x80 => Some(Self::Fixed16),
            _ => None,
        }
    }

    /// Width in bytes of a single element, where the type has one.
    pub fn element_width(&self) -> Option<usize> {
        match self {
            Self::Void | Self::Utf8String => None,
            Self::SignedByte => Some(1),
            Self::SignedInt16 | Self::Fixed16 => Some(2),
            Self::SignedInt32 => Some(4),
            Self::SignedInt64 => Some(8),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Void => "Void",
            Self::SignedByte => "Signed Byte",
            Self::SignedInt16 => "Signed Int16",
            Self::SignedInt32 => "Signed Int32",
            Self::SignedInt64 => "Signed Int64",
            Self::Utf8String => "UTF-8 String",
            Self::Fixed16 => "Fixed16",
        }
    }
}

/// What a packet does with the addressed parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OperationType {
    /// Set the parameter to the payload value.
    Assign = 0x00,
    /// Adjust the parameter by the payload value.
    Offset = 0x01,
    /// Request the current value, or (inbound) report it.
    Report = 0x02,
}

impl OperationType {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Self::Assign),
            0x01 => Some(Self::Offset),
            0x02 => Some(Self::Report),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Assign => "Assign",
            Self::Offset => "Offset",
            Self::Report => "Report",
        }
    }
}

/// Failure to validate or parse an inbound packet. Non-fatal to a session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("packet too short: {len} bytes")]
    TooShort { len: usize },
    #[error("bad destination byte {found:#04x}")]
    BadDestination { found: u8 },
    #[error("declared length {declared} inconsistent with {actual}-byte packet")]
    LengthMismatch { declared: u8, actual: usize },
    #[error("command id/reserved bytes are not zero")]
    ReservedNonZero,
    #[error("unknown category {0:#04x}")]
    UnknownCategory(u8),
    #[error("unknown data type {0:#04x}")]
    UnknownDataType(u8),
    #[error("unknown operation {0:#04x}")]
    UnknownOperation(u8),
    #[error("payload of {len} bytes exceeds the {MAX_PAYLOAD}-byte ceiling")]
    PayloadTooLarge { len: usize },
    #[error("expected a {expected}-byte value, got {actual}")]
    UnexpectedLength { expected: usize, actual: usize },
    #[error("invalid BCD byte {0:#04x}")]
    InvalidBcd(u8),
}

/// Failure to encode an outgoing command. Fatal to that call only.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodingError {
    #[error("{data_type:?} payload must be a multiple of {width} bytes, got {len}")]
    PayloadWidth {
        data_type: DataType,
        width: usize,
        len: usize,
    },
    #[error("void payload is at most one byte, got {len}")]
    VoidPayload { len: usize },
    #[error("payload of {len} bytes exceeds the {MAX_PAYLOAD}-byte ceiling")]
    PayloadTooLarge { len: usize },
}

/// A validated inbound parameter packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedPacket {
    pub category: Category,
    pub parameter: u8,
    pub data_type: DataType,
    pub operation: OperationType,
    /// Payload bytes with trailing alignment padding stripped.
    pub payload: Vec<u8>,
}

fn pad4(len: usize) -> usize {
    (len + 3) & !3
}

/// Build an outgoing command packet.
///
/// # Wire layout
///
/// ```text
/// offset 0   : destination          (0xFF = broadcast)
/// offset 1   : length               (bytes following this field, pre-padding)
/// offset 2-3 : command id, reserved (always 0x00 0x00)
/// offset 4   : category
/// offset 5   : parameter id
/// offset 6   : data type
/// offset 7   : operation
/// offset 8.. : payload
/// ...        : zero padding to a 4-byte total-length boundary
/// ```
///
/// The declared length covers the six header bytes after the length field
/// plus the payload, excluding padding; a white balance report of two bytes
/// therefore declares 8 inside a 12-byte packet.
pub fn encode_command(
    category: Category,
    parameter: u8,
    data_type: DataType,
    operation: OperationType,
    payload: &[u8],
) -> Result<Vec<u8>, EncodingError> {
    if payload.len() > MAX_PAYLOAD {
        return Err(EncodingError::PayloadTooLarge { len: payload.len() });
    }
    match data_type {
        DataType::Void => {
            if payload.len() > 1 {
                return Err(EncodingError::VoidPayload { len: payload.len() });
            }
        }
        DataType::Utf8String => {}
        fixed => {
            // An empty payload is a report request; otherwise the packet
            // carries one or more elements of the declared width.
            let width = fixed.element_width().unwrap_or(1);
            if !payload.is_empty() && payload.len() % width != 0 {
                return Err(EncodingError::PayloadWidth {
                    data_type,
                    width,
                    len: payload.len(),
                });
            }
        }
    }

    let declared = (HEADER_LEN - 2 + payload.len()) as u8;
    let mut packet = Vec::with_capacity(pad4(HEADER_LEN + payload.len()));
    packet.push(BROADCAST_DESTINATION);
    packet.push(declared);
    packet.push(0x00);
    packet.push(0x00);
    packet.push(category as u8);
    packet.push(parameter);
    packet.push(data_type as u8);
    packet.push(operation as u8);
    packet.extend_from_slice(payload);
    while packet.len() % 4 != 0 {
        packet.push(0x00);
    }
    Ok(packet)
}

/// Validate and parse an inbound packet.
///
/// Never indexes out of bounds: every length is checked before slicing, so
/// arbitrarily truncated input yields a [`DecodeError`].
pub fn decode_packet(bytes: &[u8]) -> Result<DecodedPacket, DecodeError> {
    if bytes.len() < HEADER_LEN {
        return Err(DecodeError::TooShort { len: bytes.len() });
    }
    if bytes[0] != BROADCAST_DESTINATION {
        return Err(DecodeError::BadDestination { found: bytes[0] });
    }

    // The declared length excludes padding, so the packet is exactly the
    // declared content rounded up to the next 4-byte boundary.
    let declared = bytes[1];
    let content_end = 2 + declared as usize;
    if content_end < HEADER_LEN || pad4(content_end) != bytes.len() {
        return Err(DecodeError::LengthMismatch {
            declared,
            actual: bytes.len(),
        });
    }
    if bytes[2] != 0x00 || bytes[3] != 0x00 {
        return Err(DecodeError::ReservedNonZero);
    }

    let category = Category::from_byte(bytes[4]).ok_or(DecodeError::UnknownCategory(bytes[4]))?;
    let data_type = DataType::from_byte(bytes[6]).ok_or(DecodeError::UnknownDataType(bytes[6]))?;
    let operation =
        OperationType::from_byte(bytes[7]).ok_or(DecodeError::UnknownOperation(bytes[7]))?;

    let payload = &bytes[HEADER_LEN..content_end];
    if payload.len() > MAX_PAYLOAD {
        return Err(DecodeError::PayloadTooLarge { len: payload.len() });
    }

    Ok(DecodedPacket {
        category,
        parameter: bytes[5],
        data_type,
        operation,
        payload: payload.to_vec(),
    })
}

/// Convert a raw 5.11 fixed-point value to a float.
pub fn fixed16_to_float(raw: i16) -> f32 {
    raw as f32 / 2048.0
}

/// Convert a float to 5.11 fixed point, saturating at the representable
/// range instead of wrapping (an out-of-range input clamps to the nearest
/// raw extreme, never flipping sign).
pub fn float_to_fixed16(value: f32) -> i16 {
    let scaled = (value * 2048.0).round();
    if scaled.is_nan() {
        0
    } else if scaled >= i16::MAX as f32 {
        i16::MAX
    } else if scaled <= i16::MIN as f32 {
        i16::MIN
    } else {
        scaled as i16
    }
}

/// A decoded timecode report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timecode {
    pub hours: u8,
    pub minutes: u8,
    pub seconds: u8,
    pub frames: u8,
    pub drop_frame: bool,
}

impl std::fmt::Display for Timecode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sep = if self.drop_frame { ';' } else { ':' };
        write!(
            f,
            "{:02}:{:02}:{:02}{}{:02}",
            self.hours, self.minutes, self.seconds, sep, self.frames
        )
    }
}

fn from_bcd(byte: u8) -> Result<u8, DecodeError> {
    let high = byte >> 4;
    let low = byte & 0x0F;
    if high > 9 || low > 9 {
        return Err(DecodeError::InvalidBcd(byte));
    }
    Ok(high * 10 + low)
}

/// Decode the 4-byte BCD timecode payload.
///
/// Bytes run least-significant first, matching every multi-byte field in
/// the protocol: frames, seconds, minutes, hours. The top bit of the hours
/// byte flags drop-frame counting.
pub fn decode_timecode(data: &[u8]) -> Result<Timecode, DecodeError> {
    if data.len() != 4 {
        return Err(DecodeError::UnexpectedLength {
            expected: 4,
            actual: data.len(),
        });
    }
    let drop_frame = data[3] & 0x80 != 0;
    Ok(Timecode {
        frames: from_bcd(data[0])?,
        seconds: from_bcd(data[1])?,
        minutes: from_bcd(data[2])?,
        hours: from_bcd(data[3] & 0x3F)?,
        drop_frame,
    })
}

/// Camera status flags delivered on the status characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CameraStatus(u8);

impl CameraStatus {
    pub fn raw(&self) -> u8 {
        self.0
    }

    pub fn is_powered_on(&self) -> bool {
        self.0 & 0x01 != 0
    }

    pub fn is_connected(&self) -> bool {
        self.0 & 0x02 != 0
    }

    pub fn is_paired(&self) -> bool {
        self.0 & 0x04 != 0
    }

    pub fn versions_verified(&self) -> bool {
        self.0 & 0x08 != 0
    }

    pub fn initial_payload_received(&self) -> bool {
        self.0 & 0x10 != 0
    }

    pub fn is_ready(&self) -> bool {
        self.0 & 0x20 != 0
    }
}

/// Decode the 1-byte camera status payload.
pub fn decode_status(data: &[u8]) -> Result<CameraStatus, DecodeError> {
    match data.first() {
        Some(&byte) => Ok(CameraStatus(byte)),
        None => Err(DecodeError::UnexpectedLength {
            expected: 1,
            actual: 0,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_every_data_type() {
        let cases: &[(DataType, &[u8])] = &[
            (DataType::Void, &[]),
            (DataType::Void, &[0x01]),
            (DataType::SignedByte, &[0x7F]),
            (DataType::SignedInt16, &[0x20, 0x1C]),
            (DataType::SignedInt16, &[0x20, 0x1C, 0x00, 0x00]), // two elements
            (DataType::SignedInt32, &[0x01, 0x02, 0x03, 0x04]),
            (
                DataType::SignedInt64,
                &[0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08],
            ),
            (DataType::Utf8String, b"Camera 1"),
            (DataType::Fixed16, &[0x00, 0x08]),
        ];

        for (data_type, payload) in cases {
            let packet = encode_command(
                Category::Video,
                0x02,
                *data_type,
                OperationType::Assign,
                payload,
            )
            .unwrap();
            let decoded = decode_packet(&packet).unwrap();
            assert_eq!(decoded.category, Category::Video);
            assert_eq!(decoded.parameter, 0x02);
            assert_eq!(decoded.data_type, *data_type);
            assert_eq!(decoded.operation, OperationType::Assign);
            assert_eq!(decoded.payload, *payload, "payload for {data_type:?}");
        }
    }

    #[test]
    fn packets_are_padded_to_four_bytes() {
        for len in [0usize, 1, 2, 3, 4, 5, 8, 13] {
            let payload = vec![0xAA; len];
            let packet = encode_command(
                Category::Lens,
                0x00,
                DataType::Utf8String,
                OperationType::Assign,
                &payload,
            )
            .unwrap();
            assert_eq!(packet.len() % 4, 0, "len {len}");
            assert_eq!(packet[1] as usize, HEADER_LEN - 2 + len);
        }
    }

    #[test]
    fn rejects_width_mismatch() {
        let err = encode_command(
            Category::Video,
            0x0B,
            DataType::SignedInt32,
            OperationType::Assign,
            &[0x01, 0x02, 0x03],
        )
        .unwrap_err();
        assert!(matches!(err, EncodingError::PayloadWidth { .. }));

        // An empty payload is a report request and always allowed.
        encode_command(
            Category::Video,
            0x0B,
            DataType::SignedInt32,
            OperationType::Report,
            &[],
        )
        .unwrap();
    }

    #[test]
    fn rejects_oversized_payload() {
        let payload = vec![0x00; MAX_PAYLOAD + 1];
        let err = encode_command(
            Category::Configuration,
            0x00,
            DataType::Utf8String,
            OperationType::Assign,
            &payload,
        )
        .unwrap_err();
        assert!(matches!(err, EncodingError::PayloadTooLarge { .. }));
    }

    #[test]
    fn decodes_white_balance_report() {
        // 0x1C20 = 7200 K
        let bytes = [
            0xFF, 0x08, 0x00, 0x00, 0x01, 0x02, 0x02, 0x02, 0x20, 0x1C, 0x00, 0x00,
        ];
        let decoded = decode_packet(&bytes).unwrap();
        assert_eq!(decoded.category, Category::Video);
        assert_eq!(decoded.parameter, 0x02);
        assert_eq!(decoded.data_type, DataType::SignedInt16);
        assert_eq!(decoded.operation, OperationType::Report);
        assert_eq!(decoded.payload, vec![0x20, 0x1C]);
    }

    #[test]
    fn short_input_never_panics() {
        let long = [0u8; 8];
        for len in 0..8 {
            let err = decode_packet(&long[..len]).unwrap_err();
            assert!(matches!(err, DecodeError::TooShort { .. }), "len {len}");
        }
    }

    #[test]
    fn rejects_inconsistent_declared_length() {
        let mut packet = encode_command(
            Category::Video,
            0x02,
            DataType::SignedInt16,
            OperationType::Report,
            &[0x20, 0x1C],
        )
        .unwrap();
        packet[1] = packet[1].wrapping_add(4);
        assert!(matches!(
            decode_packet(&packet),
            Err(DecodeError::LengthMismatch { .. })
        ));

        // Truncating the buffer without fixing the length field fails too.
        let packet = encode_command(
            Category::Video,
            0x02,
            DataType::SignedInt16,
            OperationType::Report,
            &[0x20, 0x1C],
        )
        .unwrap();
        assert!(decode_packet(&packet[..packet.len() - 4]).is_err());
    }

    #[test]
    fn rejects_bad_destination_and_reserved_bytes() {
        let good = encode_command(
            Category::Lens,
            0x00,
            DataType::Fixed16,
            OperationType::Assign,
            &[0x00, 0x08],
        )
        .unwrap();

        let mut bad = good.clone();
        bad[0] = 0x01;
        assert!(matches!(
            decode_packet(&bad),
            Err(DecodeError::BadDestination { found: 0x01 })
        ));

        let mut bad = good;
        bad[2] = 0x01;
        assert!(matches!(
            decode_packet(&bad),
            Err(DecodeError::ReservedNonZero)
        ));
    }

    #[test]
    fn rejects_unknown_enum_bytes() {
        let template = encode_command(
            Category::Lens,
            0x00,
            DataType::Fixed16,
            OperationType::Assign,
            &[0x00, 0x08],
        )
        .unwrap();

        let mut bad = template.clone();
        bad[4] = 0x0B; // gap in the category numbering
        assert_eq!(decode_packet(&bad), Err(DecodeError::UnknownCategory(0x0B)));

        let mut bad = template.clone();
        bad[6] = 0x42;
        assert_eq!(decode_packet(&bad), Err(DecodeError::UnknownDataType(0x42)));

        let mut bad = template;
        bad[7] = 0x03;
        assert_eq!(
            decode_packet(&bad),
            Err(DecodeError::UnknownOperation(0x03))
        );
    }

    #[test]
    fn fixed16_round_trip_within_half_lsb() {
        for value in [-15.9995, -4.25, -0.5, 0.0, 0.25, 0.999, 7.125, 15.9995] {
            let raw = float_to_fixed16(value);
            let back = fixed16_to_float(raw);
            assert!(
                (back - value).abs() <= 1.0 / 2048.0,
                "{value} -> {raw} -> {back}"
            );
        }
    }

    #[test]
    fn fixed16_saturates_instead_of_wrapping() {
        assert_eq!(float_to_fixed16(20.0), i16::MAX);
        assert_eq!(float_to_fixed16(1000.0), i16::MAX);
        assert_eq!(float_to_fixed16(-20.0), i16::MIN);
        assert!(fixed16_to_float(float_to_fixed16(20.0)) > 0.0);
        assert_eq!(float_to_fixed16(f32::NAN), 0);
    }

    #[test]
    fn decodes_timecode_bcd() {
        // 12:34:56:18, little-endian significance
        let tc = decode_timecode(&[0x18, 0x56, 0x34, 0x12]).unwrap();
        assert_eq!(tc.hours, 12);
        assert_eq!(tc.minutes, 34);
        assert_eq!(tc.seconds, 56);
        assert_eq!(tc.frames, 18);
        assert!(!tc.drop_frame);
        assert_eq!(tc.to_string(), "12:34:56:18");

        let tc = decode_timecode(&[0x02, 0x00, 0x01, 0x81]).unwrap();
        assert!(tc.drop_frame);
        assert_eq!(tc.hours, 1);
        assert_eq!(tc.to_string(), "01:01:00;02");
    }

    #[test]
    fn rejects_invalid_timecode() {
        assert!(matches!(
            decode_timecode(&[0x00, 0x00, 0x00]),
            Err(DecodeError::UnexpectedLength { .. })
        ));
        assert_eq!(
            decode_timecode(&[0x1A, 0x00, 0x00, 0x00]),
            Err(DecodeError::InvalidBcd(0x1A))
        );
    }

    #[test]
    fn decodes_status_flags() {
        let status = decode_status(&[0x23]).unwrap();
        assert!(status.is_powered_on());
        assert!(status.is_connected());
        assert!(!status.is_paired());
        assert!(status.is_ready());
        assert_eq!(status.raw(), 0x23);
        assert!(decode_status(&[]).is_err());
    }
}
