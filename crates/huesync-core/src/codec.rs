//! Entertainment stream frame encoding.
//!
//! Frame format (API v2):
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ Bytes 0-8:   Protocol name, ASCII "HueStream"                │
//! │ Bytes 9-10:  Version 0x02 0x00                               │
//! │ Byte 11:     Sequence id (ignored by the bridge)             │
//! │ Bytes 12-13: Reserved                                        │
//! │ Byte 14:     Color space (0 = RGB, 1 = XY + brightness)      │
//! │ Byte 15:     Reserved                                        │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Entertainment area id, ASCII (36 bytes for a UUID)           │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Per channel, 7 bytes:                                        │
//! │   channel id, R R, G G, B B                                  │
//! │   each 16-bit component is the 8-bit value written twice     │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Channel blocks follow the order of the area's channel list.

use bytes::{BufMut, Bytes, BytesMut};

use crate::color::Rgb;

pub const PROTOCOL_NAME: &[u8; 9] = b"HueStream";
pub const PROTOCOL_VERSION: [u8; 2] = [0x02, 0x00];

/// Header length including reserved bytes.
pub const HEADER_LEN: usize = 16;

/// One channel block: id + three duplicated components.
pub const CHANNEL_BLOCK_LEN: usize = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, strum::Display)]
#[strum(serialize_all = "lowercase")]
#[repr(u8)]
pub enum ColorSpace {
    #[default]
    Rgb = 0,
    XyBrightness = 1,
}

impl ColorSpace {
    pub fn to_byte(self) -> u8 {
        match self {
            Self::Rgb => 0,
            Self::XyBrightness => 1,
        }
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Rgb),
            1 => Some(Self::XyBrightness),
            _ => None,
        }
    }
}

/// Build the fixed header.
pub fn build_header(mode: ColorSpace, sequence: u8) -> [u8; HEADER_LEN] {
    let mut header = [0u8; HEADER_LEN];
    header[..9].copy_from_slice(PROTOCOL_NAME);
    header[9..11].copy_from_slice(&PROTOCOL_VERSION);
    header[11] = sequence;
    header[14] = mode.to_byte();
    header
}

/// Build one channel block.
pub fn build_channel_block(channel_id: u8, r: u8, g: u8, b: u8) -> [u8; CHANNEL_BLOCK_LEN] {
    [channel_id, r, r, g, g, b, b]
}

/// Length of a frame for `area_id` carrying `channels` blocks.
pub fn frame_len(area_id: &str, channels: usize) -> usize {
    HEADER_LEN + area_id.len() + CHANNEL_BLOCK_LEN * channels
}

/// Assemble a complete frame: header, area id, one block per channel.
pub fn build_frame(mode: ColorSpace, sequence: u8, area_id: &str, channels: &[(u8, Rgb)]) -> Bytes {
    let mut buf = BytesMut::with_capacity(frame_len(area_id, channels.len()));
    buf.put_slice(&build_header(mode, sequence));
    buf.put_slice(area_id.as_bytes());
    for &(id, color) in channels {
        buf.put_slice(&build_channel_block(id, color.r, color.g, color.b));
    }
    buf.freeze()
}

/// Decoded view of a frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub version: [u8; 2],
    pub sequence: u8,
    pub mode: ColorSpace,
}

/// Parse the fixed header at the start of `frame`.
pub fn parse_header(frame: &[u8]) -> Option<FrameHeader> {
    let header = frame.get(..HEADER_LEN)?;
    if &header[..9] != PROTOCOL_NAME {
        return None;
    }
    Some(FrameHeader {
        version: [header[9], header[10]],
        sequence: header[11],
        mode: ColorSpace::from_byte(header[14])?,
    })
}
