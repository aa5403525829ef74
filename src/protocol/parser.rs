//! Payload parsing for panel frames.
//!
//! Every function takes the payload that follows the return code byte.

use bytes::Buf;

use crate::error::FrameError;
use crate::protocol::ReturnCode;
use crate::types::{TouchCoordinate, TouchEvent};

fn require(code: ReturnCode, data: &[u8], expected: usize) -> Result<(), FrameError> {
    if data.len() < expected {
        return Err(FrameError::Truncated {
            opcode: code.into(),
            expected,
            got: data.len(),
        });
    }
    Ok(())
}

/// Parses a touch event.
///
/// Format: `[page:1] [component:1] [event:1]`, event `0x01` press, `0x00` release.
pub fn parse_touch_event(data: &[u8]) -> Result<TouchEvent, FrameError> {
    require(ReturnCode::TouchEvent, data, 3)?;
    Ok(TouchEvent {
        page: data[0],
        component: data[1],
        press: data[2],
    })
}

/// Parses a current page report. Format: `[page:1]`.
pub fn parse_current_page(data: &[u8]) -> Result<u8, FrameError> {
    require(ReturnCode::CurrentPage, data, 1)?;
    Ok(data[0])
}

/// Parses a touch coordinate.
///
/// Format: `[x:2BE] [y:2BE] [event:1]`.
pub fn parse_touch_coordinate(code: ReturnCode, data: &[u8]) -> Result<TouchCoordinate, FrameError> {
    require(code, data, 5)?;
    let mut cursor = data;
    let x = cursor.get_u16();
    let y = cursor.get_u16();
    let pressed = cursor.get_u8() != 0;
    Ok(TouchCoordinate {
        x,
        y,
        pressed,
        woke: code == ReturnCode::TouchCoordinateSleep,
    })
}

/// Parses string data; each byte is one character.
#[must_use]
pub fn parse_string_data(data: &[u8]) -> String {
    String::from_utf8_lossy(data).into_owned()
}

/// Parses numeric data. Format: `[value:4LE]`.
pub fn parse_numeric_data(data: &[u8]) -> Result<u32, FrameError> {
    require(ReturnCode::NumericData, data, 4)?;
    let mut cursor = data;
    Ok(cursor.get_u32_le())
}

/// Returns true if a `0x00` frame payload is the startup preamble
/// (`00 00 00`) rather than an invalid-instruction failure.
#[must_use]
pub fn is_startup_preamble(data: &[u8]) -> bool {
    data.len() >= 2 && data[..2] == [0x00, 0x00]
}
