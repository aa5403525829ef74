//! Protocol definitions for Nextion panel communication.
//!
//! This module contains the low-level protocol types including:
//! - Frame encoding/decoding
//! - Return code definitions
//! - Panel commands
//! - Payload parsing

pub mod command;
pub mod frame;
pub mod packet;
pub mod parser;

pub use command::{Attribute, PanelCommand};
pub use frame::{FrameDecoder, MAX_FRAME_SIZE, TERMINATOR, encode as encode_frame};
pub use packet::ReturnCode;
pub use parser::{
    is_startup_preamble, parse_current_page, parse_numeric_data, parse_string_data,
    parse_touch_coordinate, parse_touch_event,
};
