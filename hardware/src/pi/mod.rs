//! PI piezo controllers over the General Command Set (GCS).

pub mod command_set;
mod e518;
mod gcs;
pub mod recorder;
mod session;
pub mod sim;
pub mod tip_tilt;

pub use command_set::{
    AxisId, Channel, ChannelMode, CommandSet, SinusoidalWaveform, WaveTableMode,
    MAX_WAVE_TABLE_POINTS,
};
pub use e518::{PiErrorCode, E518, SERVO_UPDATE_TIME_PARAM};
pub use gcs::{GcsDevice, GcsError, GcsResult, DEFAULT_PORT};
pub use recorder::{
    DataRecorderConfiguration, RecordOption, RecordSource, RecorderTrigger, SourceKind,
};
pub use sim::SimulatedCommandSet;
pub use tip_tilt::{
    AxisCalibration, SessionState, TipTilt2Axis, TipTiltArgs, TipTiltAxis, TipTiltConfiguration,
    TipTiltStatus,
};
