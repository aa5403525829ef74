//! Return codes sent by the panel.
//!
//! The return code is the first byte of every frame the panel sends and
//! selects how the rest of the frame is interpreted.

/// Return codes and notifications sent by the panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ReturnCode {
    // Instruction results (0x00-0x24)
    /// Instruction failed. `00 00 00` is the startup preamble instead.
    InvalidInstruction = 0x00,
    /// Instruction succeeded.
    InstructionSuccessful = 0x01,
    /// Invalid component ID or name.
    InvalidComponentId = 0x02,
    /// Invalid page ID or name.
    InvalidPageId = 0x03,
    /// Invalid picture ID.
    InvalidPictureId = 0x04,
    /// Invalid font ID.
    InvalidFontId = 0x05,
    /// File operation failed.
    InvalidFileOperation = 0x06,
    /// CRC validation failed.
    InvalidCrc = 0x09,
    /// Invalid baud rate setting.
    InvalidBaudRate = 0x11,
    /// Invalid waveform ID or channel.
    InvalidWaveform = 0x12,
    /// Invalid variable name or attribute.
    InvalidVariableName = 0x1A,
    /// Invalid variable operation.
    InvalidVariableOperation = 0x1B,
    /// Attribute assignment failed.
    AssignmentFailed = 0x1C,
    /// EEPROM operation failed.
    EepromOperationFailed = 0x1D,
    /// Invalid quantity of parameters.
    InvalidParameterCount = 0x1E,
    /// IO operation failed.
    IoOperationFailed = 0x1F,
    /// Unsupported escape character.
    InvalidEscapeCharacter = 0x20,
    /// Variable name too long.
    VariableNameTooLong = 0x23,
    /// Serial receive buffer overflowed.
    SerialBufferOverflow = 0x24,

    // Events and data (0x65-0x71)
    /// Touch event on a component.
    TouchEvent = 0x65,
    /// Current page number.
    CurrentPage = 0x66,
    /// Touch coordinate while awake.
    TouchCoordinateAwake = 0x67,
    /// Touch coordinate that woke the panel.
    TouchCoordinateSleep = 0x68,
    /// String data reply to a `get`.
    StringData = 0x70,
    /// Numeric data reply to a `get`.
    NumericData = 0x71,

    // Device notifications (0x86-0xFE)
    /// Panel entered sleep automatically.
    AutoSleep = 0x86,
    /// Panel woke from sleep automatically.
    AutoWake = 0x87,
    /// Panel powered up and is ready.
    Ready = 0x88,
    /// Panel started a microSD upgrade.
    StartSdUpgrade = 0x89,
    /// Transparent data transfer finished.
    TransparentDataFinished = 0xFD,
    /// Panel ready to receive transparent data.
    TransparentDataReady = 0xFE,
}

impl ReturnCode {
    /// Attempts to parse a return code from a byte.
    #[must_use]
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Self::InvalidInstruction),
            0x01 => Some(Self::InstructionSuccessful),
            0x02 => Some(Self::InvalidComponentId),
            0x03 => Some(Self::InvalidPageId),
            0x04 => Some(Self::InvalidPictureId),
            0x05 => Some(Self::InvalidFontId),
            0x06 => Some(Self::InvalidFileOperation),
            0x09 => Some(Self::InvalidCrc),
            0x11 => Some(Self::InvalidBaudRate),
            0x12 => Some(Self::InvalidWaveform),
            0x1A => Some(Self::InvalidVariableName),
            0x1B => Some(Self::InvalidVariableOperation),
            0x1C => Some(Self::AssignmentFailed),
            0x1D => Some(Self::EepromOperationFailed),
            0x1E => Some(Self::InvalidParameterCount),
            0x1F => Some(Self::IoOperationFailed),
            0x20 => Some(Self::InvalidEscapeCharacter),
            0x23 => Some(Self::VariableNameTooLong),
            0x24 => Some(Self::SerialBufferOverflow),
            0x65 => Some(Self::TouchEvent),
            0x66 => Some(Self::CurrentPage),
            0x67 => Some(Self::TouchCoordinateAwake),
            0x68 => Some(Self::TouchCoordinateSleep),
            0x70 => Some(Self::StringData),
            0x71 => Some(Self::NumericData),
            0x86 => Some(Self::AutoSleep),
            0x87 => Some(Self::AutoWake),
            0x88 => Some(Self::Ready),
            0x89 => Some(Self::StartSdUpgrade),
            0xFD => Some(Self::TransparentDataFinished),
            0xFE => Some(Self::TransparentDataReady),
            _ => None,
        }
    }

    /// All return codes, in table order.
    pub const ALL: [Self; 31] = [
        Self::InvalidInstruction,
        Self::InstructionSuccessful,
        Self::InvalidComponentId,
        Self::InvalidPageId,
        Self::InvalidPictureId,
        Self::InvalidFontId,
        Self::InvalidFileOperation,
        Self::InvalidCrc,
        Self::InvalidBaudRate,
        Self::InvalidWaveform,
        Self::InvalidVariableName,
        Self::InvalidVariableOperation,
        Self::AssignmentFailed,
        Self::EepromOperationFailed,
        Self::InvalidParameterCount,
        Self::IoOperationFailed,
        Self::InvalidEscapeCharacter,
        Self::VariableNameTooLong,
        Self::SerialBufferOverflow,
        Self::TouchEvent,
        Self::CurrentPage,
        Self::TouchCoordinateAwake,
        Self::TouchCoordinateSleep,
        Self::StringData,
        Self::NumericData,
        Self::AutoSleep,
        Self::AutoWake,
        Self::Ready,
        Self::StartSdUpgrade,
        Self::TransparentDataFinished,
        Self::TransparentDataReady,
    ];

    /// Returns true if this code reports a failed instruction.
    ///
    /// A failure answers the outstanding query in place of its reply.
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(
            self,
            Self::InvalidInstruction
                | Self::InvalidComponentId
                | Self::InvalidPageId
                | Self::InvalidPictureId
                | Self::InvalidFontId
                | Self::InvalidFileOperation
                | Self::InvalidCrc
                | Self::InvalidBaudRate
                | Self::InvalidWaveform
                | Self::InvalidVariableName
                | Self::InvalidVariableOperation
                | Self::AssignmentFailed
                | Self::EepromOperationFailed
                | Self::InvalidParameterCount
                | Self::IoOperationFailed
                | Self::InvalidEscapeCharacter
                | Self::VariableNameTooLong
        )
    }

    /// Payload length of frames that always have the same size.
    ///
    /// These payloads are binary and may hold `0xFF` anywhere, so the frame
    /// decoder cuts them by length rather than at the first terminator.
    #[must_use]
    pub const fn fixed_payload_len(&self) -> Option<usize> {
        match self {
            Self::CurrentPage => Some(1),
            Self::TouchEvent => Some(3),
            Self::NumericData => Some(4),
            Self::TouchCoordinateAwake | Self::TouchCoordinateSleep => Some(5),
            _ => None,
        }
    }

    /// Human readable description used in logs.
    #[must_use]
    pub const fn description(&self) -> &'static str {
        match self {
            Self::InvalidInstruction => "instruction sent by the bridge failed",
            Self::InstructionSuccessful => "instruction sent by the bridge succeeded",
            Self::InvalidComponentId => "invalid component ID or name",
            Self::InvalidPageId => "invalid page ID or name",
            Self::InvalidPictureId => "invalid picture ID",
            Self::InvalidFontId => "invalid font ID",
            Self::InvalidFileOperation => "file operation failed",
            Self::InvalidCrc => "CRC check failed",
            Self::InvalidBaudRate => "invalid baud rate",
            Self::InvalidWaveform => "invalid waveform ID or channel",
            Self::InvalidVariableName => "invalid variable name or attribute",
            Self::InvalidVariableOperation => "invalid variable operation",
            Self::AssignmentFailed => "attribute assignment failed",
            Self::EepromOperationFailed => "EEPROM operation failed",
            Self::InvalidParameterCount => "invalid number of instruction parameters",
            Self::IoOperationFailed => "IO operation failed",
            Self::InvalidEscapeCharacter => "unsupported escape character",
            Self::VariableNameTooLong => "variable name too long",
            Self::SerialBufferOverflow => "serial buffer overflow",
            Self::TouchEvent => "touch event",
            Self::CurrentPage => "current page number",
            Self::TouchCoordinateAwake => "touch coordinate",
            Self::TouchCoordinateSleep => "touch coordinate on wake",
            Self::StringData => "string data",
            Self::NumericData => "numeric data",
            Self::AutoSleep => "entered sleep",
            Self::AutoWake => "woke from sleep",
            Self::Ready => "panel ready",
            Self::StartSdUpgrade => "microSD upgrade started",
            Self::TransparentDataFinished => "transparent data finished",
            Self::TransparentDataReady => "transparent data ready",
        }
    }
}

impl From<ReturnCode> for u8 {
    fn from(code: ReturnCode) -> Self {
        code as Self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_return_code_from_byte() {
        assert_eq!(ReturnCode::from_byte(0x1A), Some(ReturnCode::InvalidVariableName));
        assert_eq!(ReturnCode::from_byte(0x65), Some(ReturnCode::TouchEvent));
        assert_eq!(ReturnCode::from_byte(0x07), None);
        assert_eq!(ReturnCode::from_byte(0xFF), None);
    }

    #[test]
    fn test_table_round_trips_through_byte() {
        for code in ReturnCode::ALL {
            assert_eq!(ReturnCode::from_byte(u8::from(code)), Some(code));
        }
    }

    #[test]
    fn test_sixteen_failure_reasons() {
        // 0x00 is the generic failure; the rest are specific reasons.
        let specific = ReturnCode::ALL
            .iter()
            .filter(|c| c.is_failure() && **c != ReturnCode::InvalidInstruction)
            .count();
        assert_eq!(specific, 16);
        assert!(!ReturnCode::InstructionSuccessful.is_failure());
        assert!(!ReturnCode::SerialBufferOverflow.is_failure());
        assert!(!ReturnCode::StringData.is_failure());
    }

    #[test]
    fn test_fixed_payload_lengths() {
        assert_eq!(ReturnCode::NumericData.fixed_payload_len(), Some(4));
        assert_eq!(ReturnCode::TouchCoordinateSleep.fixed_payload_len(), Some(5));
        assert_eq!(ReturnCode::StringData.fixed_payload_len(), None);
        // 0x00 is either the bare failure or the startup preamble.
        assert_eq!(ReturnCode::InvalidInstruction.fixed_payload_len(), None);
    }
}
