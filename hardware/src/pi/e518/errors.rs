//! PI controller error codes, as reported by `ERR?`.

use std::fmt;

/// Decoded GCS controller error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PiErrorCode {
    NoError,
    ParameterSyntax,
    UnknownCommand,
    CommandTooLong,
    ScanError,
    MoveWithoutReferenceOrServoOff,
    InvalidSgaParameter,
    PositionOutOfLimits,
    VelocityOutOfLimits,
    ControllerStopped,
    InvalidAxisIdentifier,
    ParameterOutOfRange,
    IllegalAxis,
    IncorrectNumberOfParameters,
    InvalidRealNumber,
    MissingParameter,
    UnknownParameter,
    SendBufferOverflow,
    VoltageOutOfLimits,
    OpenLoopMotionWhenServoOn,
    ReceivingBufferOverflow,
    UnknownError,
}

const ERROR_TABLE: [(i32, PiErrorCode, &str); 22] = [
    (0, PiErrorCode::NoError, "No error"),
    (1, PiErrorCode::ParameterSyntax, "Parameter syntax error"),
    (2, PiErrorCode::UnknownCommand, "Unknown command"),
    (3, PiErrorCode::CommandTooLong, "Command length out of limits or command buffer overrun"),
    (4, PiErrorCode::ScanError, "Error while scanning"),
    (5, PiErrorCode::MoveWithoutReferenceOrServoOff, "Unallowable move attempted on unreferenced axis, or move attempted with servo off"),
    (6, PiErrorCode::InvalidSgaParameter, "Parameter for SGA not valid"),
    (7, PiErrorCode::PositionOutOfLimits, "Position out of limits"),
    (8, PiErrorCode::VelocityOutOfLimits, "Velocity out of limits"),
    (10, PiErrorCode::ControllerStopped, "Controller was stopped by command"),
    (15, PiErrorCode::InvalidAxisIdentifier, "Invalid axis identifier"),
    (17, PiErrorCode::ParameterOutOfRange, "Parameter out of range"),
    (23, PiErrorCode::IllegalAxis, "Illegal axis"),
    (24, PiErrorCode::IncorrectNumberOfParameters, "Incorrect number of parameters"),
    (25, PiErrorCode::InvalidRealNumber, "Invalid floating point number"),
    (26, PiErrorCode::MissingParameter, "Parameter missing"),
    (54, PiErrorCode::UnknownParameter, "Unknown parameter"),
    (301, PiErrorCode::SendBufferOverflow, "Send buffer overflow"),
    (302, PiErrorCode::VoltageOutOfLimits, "Voltage out of limits"),
    (303, PiErrorCode::OpenLoopMotionWhenServoOn, "Open-loop motion attempted when servo ON"),
    (304, PiErrorCode::ReceivingBufferOverflow, "Received command is too long"),
    (555, PiErrorCode::UnknownError, "Unknown controller error"),
];

impl PiErrorCode {
    /// Decode a raw controller error code.
    pub fn from_code(code: i32) -> Option<Self> {
        ERROR_TABLE
            .iter()
            .find(|(c, _, _)| *c == code)
            .map(|(_, err, _)| *err)
    }

    /// The raw controller error code.
    pub fn code(self) -> i32 {
        self.entry().0
    }

    /// Human-readable description from the GCS error table.
    pub fn description(self) -> &'static str {
        self.entry().2
    }

    fn entry(self) -> &'static (i32, PiErrorCode, &'static str) {
        // Every variant has exactly one table row.
        ERROR_TABLE
            .iter()
            .find(|(_, err, _)| *err == self)
            .unwrap_or(&ERROR_TABLE[ERROR_TABLE.len() - 1])
    }
}

impl fmt::Display for PiErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} ({})", self.description(), self.code())
    }
}
