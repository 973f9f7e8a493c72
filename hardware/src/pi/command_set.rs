//! Command-set contract shared by the real controller client and the simulator.
//!
//! The tip-tilt controller only talks to hardware through [`CommandSet`]. Axes
//! are addressed by name ([`AxisId`]), amplifier channels by number
//! ([`Channel`]). Multi-item calls take parallel slices; a length mismatch is
//! an [`GcsError::InvalidConfiguration`].

use std::fmt;
use std::str::FromStr;

use ndarray::Array2;

use super::gcs::{GcsError, GcsResult};
use super::recorder::{DataRecorderConfiguration, RecorderTrigger};

/// Wave table capacity assumed when a controller does not report its own.
pub const MAX_WAVE_TABLE_POINTS: usize = 65_536;

/// A validated axis identifier such as `A` or `1`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AxisId(String);

impl AxisId {
    /// Validate an axis identifier: non-empty, ASCII alphanumeric or `_`.
    pub fn new(id: &str) -> GcsResult<Self> {
        if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(GcsError::InvalidArgument(format!(
                "Invalid axis identifier '{id}'"
            )));
        }
        Ok(Self(id.to_string()))
    }

    /// Parse a space-separated axis list such as `"A B"`.
    pub fn parse_list(axes: &str) -> GcsResult<Vec<AxisId>> {
        let ids = axes
            .split_whitespace()
            .map(AxisId::new)
            .collect::<GcsResult<Vec<_>>>()?;
        if ids.is_empty() {
            return Err(GcsError::InvalidArgument("Empty axis list".to_string()));
        }
        Ok(ids)
    }

    pub(crate) fn from_static(id: &'static str) -> Self {
        debug_assert!(Self::new(id).is_ok(), "invalid built-in axis id {id}");
        Self(id.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for AxisId {
    type Err = GcsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AxisId::new(s.trim())
    }
}

impl fmt::Display for AxisId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A 1-based amplifier / signal channel number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Channel(u32);

impl Channel {
    pub fn new(number: u32) -> GcsResult<Self> {
        if number == 0 {
            return Err(GcsError::InvalidArgument(
                "Channel numbers start at 1".to_string(),
            ));
        }
        Ok(Self(number))
    }

    pub(crate) const fn from_raw(number: u32) -> Self {
        Self(number)
    }

    pub fn number(self) -> u32 {
        self.0
    }

    /// Zero-based index of this channel.
    pub fn index(self) -> usize {
        (self.0 - 1) as usize
    }
}

impl FromStr for Channel {
    type Err = GcsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let number = s
            .trim()
            .parse()
            .map_err(|_| GcsError::InvalidArgument(format!("Invalid channel '{s}'")))?;
        Channel::new(number)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Whether a channel accepts remote (host) commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelMode {
    #[default]
    Offline,
    Online,
}

impl ChannelMode {
    pub fn gcs_value(self) -> u8 {
        match self {
            ChannelMode::Offline => 0,
            ChannelMode::Online => 1,
        }
    }

    pub fn from_gcs_value(value: f64) -> GcsResult<Self> {
        if value == 0.0 {
            Ok(ChannelMode::Offline)
        } else if value == 1.0 {
            Ok(ChannelMode::Online)
        } else {
            Err(GcsError::ParseError(format!("Invalid control mode {value}")))
        }
    }
}

/// How a waveform is written into a wave table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaveTableMode {
    /// Clear the table and write from the first point.
    Clear,
    /// Append after the existing table content.
    Append,
}

impl WaveTableMode {
    pub fn gcs_token(self) -> &'static str {
        match self {
            WaveTableMode::Clear => "X",
            WaveTableMode::Append => "&",
        }
    }
}

/// Parameters of one sine-ramp wave table segment (GCS `WAV ... SIN_P`).
///
/// One period of `wavelength_in_points` samples rises from `offset` to
/// `offset + amplitude` over `[0, curve_center_point)` along a half sine and
/// falls back along a mirrored half sine over the remaining samples. The period
/// is then shifted right by `start_point` within a segment of
/// `length_in_points` samples.
#[derive(Debug, Clone, PartialEq)]
pub struct SinusoidalWaveform {
    pub length_in_points: usize,
    pub amplitude: f64,
    pub offset: f64,
    pub wavelength_in_points: usize,
    pub start_point: usize,
    pub curve_center_point: usize,
}

impl SinusoidalWaveform {
    pub fn validate(&self) -> GcsResult<()> {
        let invalid = |msg: String| Err(GcsError::InvalidConfiguration(msg));

        if !self.amplitude.is_finite() || !self.offset.is_finite() {
            return invalid(format!(
                "Waveform amplitude/offset must be finite (got {}, {})",
                self.amplitude, self.offset
            ));
        }
        if self.wavelength_in_points == 0 || self.length_in_points == 0 {
            return invalid("Waveform length and wavelength must be at least one point".to_string());
        }
        if self.start_point >= self.wavelength_in_points || self.start_point >= self.length_in_points
        {
            return invalid(format!(
                "Start point {} must be below wavelength {} and length {}",
                self.start_point, self.wavelength_in_points, self.length_in_points
            ));
        }
        let peak = self.start_point + self.curve_center_point;
        if peak >= self.wavelength_in_points || peak >= self.length_in_points {
            return invalid(format!(
                "Start point + curve center ({} + {}) must be below wavelength {} and length {}",
                self.start_point,
                self.curve_center_point,
                self.wavelength_in_points,
                self.length_in_points
            ));
        }
        Ok(())
    }
}

/// Fail with `InvalidConfiguration` if a wave table would exceed `max` points.
pub(crate) fn check_wave_table_length(table_id: u32, points: usize, max: usize) -> GcsResult<()> {
    if points > max {
        return Err(GcsError::InvalidConfiguration(format!(
            "Wave table {table_id} needs {points} points, controller holds at most {max}"
        )));
    }
    Ok(())
}

/// Fail with `InvalidConfiguration` unless two parallel slices line up.
pub(crate) fn check_lengths(what: &str, expected: usize, actual: usize) -> GcsResult<()> {
    if expected != actual {
        return Err(GcsError::InvalidConfiguration(format!(
            "{what}: expected {expected} values, got {actual}"
        )));
    }
    Ok(())
}

/// Capabilities of a GCS motion controller used by the tip-tilt layer.
///
/// Every call is a blocking round trip. Implementations never retry; any
/// failure is returned as-is.
pub trait CommandSet {
    // ==================== Connection ====================

    fn connect_tcpip(&mut self, hostname: &str, port: u16) -> GcsResult<()>;

    fn close_connection(&mut self) -> GcsResult<()>;

    /// Controller / firmware version string.
    fn get_version(&mut self) -> GcsResult<String>;

    /// Send a raw GCS line. Queries (first word ending in `?`) return the
    /// answer; commands return an empty string once `ERR?` reports no error.
    fn gcs_command(&mut self, command: &str) -> GcsResult<String>;

    /// Have the controller send `message` back (`ECO?`).
    fn echo(&mut self, message: &str) -> GcsResult<String>;

    // ==================== Geometry ====================

    /// Axis identifiers in controller order.
    fn get_axes_identifiers(&mut self) -> GcsResult<Vec<AxisId>>;

    fn get_number_of_input_signal_channels(&mut self) -> GcsResult<usize>;

    fn get_number_of_output_signal_channels(&mut self) -> GcsResult<usize>;

    // ==================== Channel Control ====================

    fn get_control_mode(&mut self, channels: &[Channel]) -> GcsResult<Vec<ChannelMode>>;

    fn set_control_mode(&mut self, channels: &[Channel], modes: &[ChannelMode]) -> GcsResult<()>;

    /// Put channels online (accepting remote commands).
    fn enable_control_mode(&mut self, channels: &[Channel]) -> GcsResult<()> {
        self.set_control_mode(channels, &vec![ChannelMode::Online; channels.len()])
    }

    fn disable_control_mode(&mut self, channels: &[Channel]) -> GcsResult<()> {
        self.set_control_mode(channels, &vec![ChannelMode::Offline; channels.len()])
    }

    fn get_lower_voltage_limit(&mut self, channels: &[Channel]) -> GcsResult<Vec<f64>>;

    fn set_lower_voltage_limit(&mut self, channels: &[Channel], volts: &[f64]) -> GcsResult<()>;

    fn get_upper_voltage_limit(&mut self, channels: &[Channel]) -> GcsResult<Vec<f64>>;

    fn set_upper_voltage_limit(&mut self, channels: &[Channel], volts: &[f64]) -> GcsResult<()>;

    /// Present output voltage of each channel.
    fn get_voltages(&mut self, channels: &[Channel]) -> GcsResult<Vec<f64>>;

    // ==================== Servo and Open Loop ====================

    /// Closed-loop (servo) state per axis.
    fn get_servo_control_mode(&mut self, axes: &[AxisId]) -> GcsResult<Vec<bool>>;

    fn set_servo_control_mode(&mut self, axes: &[AxisId], closed_loop: &[bool]) -> GcsResult<()>;

    fn get_open_loop_axis_value(&mut self, axes: &[AxisId]) -> GcsResult<Vec<f64>>;

    /// Drive axes directly in open loop. Fails if any addressed axis has its
    /// servo enabled.
    fn set_open_loop_axis_value(&mut self, axes: &[AxisId], values: &[f64]) -> GcsResult<()>;

    fn set_relative_open_loop_axis_value(&mut self, axes: &[AxisId], offsets: &[f64])
        -> GcsResult<()>;

    // ==================== Position ====================

    /// Measured position per axis, in controller units.
    fn get_position(&mut self, axes: &[AxisId]) -> GcsResult<Vec<f64>>;

    fn get_target_position(&mut self, axes: &[AxisId]) -> GcsResult<Vec<f64>>;

    fn set_target_position(&mut self, axes: &[AxisId], positions: &[f64]) -> GcsResult<()>;

    fn set_target_relative_to_current_position(
        &mut self,
        axes: &[AxisId],
        offsets: &[f64],
    ) -> GcsResult<()>;

    // ==================== Wave Generator ====================

    fn get_number_of_wave_generators(&mut self) -> GcsResult<usize>;

    /// Running flag of every wave generator, in generator order.
    fn get_wave_generator_start_stop_mode(&mut self) -> GcsResult<Vec<bool>>;

    /// Start (`true`) or stop (`false`) every wave generator; one flag per generator.
    fn set_wave_generator_start_stop_mode(&mut self, running: &[bool]) -> GcsResult<()>;

    fn clear_wave_table_data(&mut self, table_ids: &[u32]) -> GcsResult<()>;

    fn get_connection_of_wave_table_to_wave_generator(
        &mut self,
        generator_ids: &[u32],
    ) -> GcsResult<Vec<u32>>;

    fn set_connection_of_wave_table_to_wave_generator(
        &mut self,
        generator_ids: &[u32],
        table_ids: &[u32],
    ) -> GcsResult<()>;

    fn set_sinusoidal_waveform(
        &mut self,
        table_id: u32,
        mode: WaveTableMode,
        waveform: &SinusoidalWaveform,
    ) -> GcsResult<()>;

    /// Write explicit points into a wave table.
    fn set_point_waveform(&mut self, table_id: u32, mode: WaveTableMode, points: &[f64])
        -> GcsResult<()>;

    /// Servo cycles per wave table point, per wave generator.
    fn get_wave_generator_table_rate(&mut self) -> GcsResult<Vec<u32>>;

    fn set_wave_generator_table_rate(&mut self, servo_cycles: u32) -> GcsResult<()>;

    /// Duration of one servo cycle.
    fn get_servo_update_time_in_seconds(&mut self) -> GcsResult<f64>;

    /// Largest number of points a single wave table holds.
    fn get_maximum_wave_table_length(&mut self) -> GcsResult<usize> {
        Ok(MAX_WAVE_TABLE_POINTS)
    }

    // ==================== Data Recorder ====================

    /// Servo cycles per recorded point.
    fn get_record_table_rate(&mut self) -> GcsResult<u32>;

    fn set_record_table_rate(&mut self, servo_cycles: u32) -> GcsResult<()>;

    fn get_number_of_recorder_tables(&mut self) -> GcsResult<usize>;

    fn get_data_recorder_configuration(&mut self) -> GcsResult<DataRecorderConfiguration>;

    fn set_data_recorder_configuration(
        &mut self,
        configuration: &DataRecorderConfiguration,
    ) -> GcsResult<()>;

    /// Record option codes the controller supports, with their descriptions
    /// (`HDR?`).
    fn get_all_data_recorder_options(&mut self) -> GcsResult<Vec<(u32, String)>>;

    /// Event that starts recording on every table, and its argument.
    fn set_data_recorder_trigger_source(
        &mut self,
        source: RecorderTrigger,
        value: u32,
    ) -> GcsResult<()>;

    fn get_data_recorder_trigger_source(&mut self) -> GcsResult<(RecorderTrigger, u32)>;

    /// Arm the recorder so that it starts with the next wave generator cycle.
    fn start_recording_in_sync_with_wave_generator(&mut self) -> GcsResult<()>;

    /// Recorded samples, one row per recorder table (table 1 first).
    ///
    /// `start_point` is 1-based.
    fn get_recorded_data_values(
        &mut self,
        number_of_points: usize,
        start_point: usize,
    ) -> GcsResult<Array2<f64>>;

    // ==================== Status ====================

    /// Sensor/amplifier overflow flag per axis.
    fn get_overflow_state(&mut self, axes: &[AxisId]) -> GcsResult<Vec<bool>>;
}
