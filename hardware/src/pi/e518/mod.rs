//! PI E-518 Piezo Controller Client
//!
//! [`E518`] implements [`CommandSet`] by translating every call into GCS ASCII
//! commands sent over TCP (port 50000).
//!
//! # Axes and Channels
//!
//! The E-518 drives three piezo channels. Its axes are reported by `SAI?`
//! (`A`, `B`, `C` on a tip-tilt platform). Commands address axes by
//! identifier and channels by number.
//!
//! # Error Checking
//!
//! Setter commands are followed by `ERR?`; a non-zero code is returned as
//! [`GcsError::ControllerError`] and decoded through [`PiErrorCode`].
//!
//! # Wave Generator and Recorder
//!
//! Wave tables are written with `WAV` (`SIN_P` segments or explicit `PNT`
//! point lists), connected with `WSL` and started with `WGO`. The data
//! recorder is configured with `DRC`, armed with `WGR` and read back with
//! `DRR?`.

mod errors;

pub use errors::PiErrorCode;

use std::fmt::Display;
use std::str::FromStr;

use ndarray::Array2;
use tracing::{debug, info};

use super::command_set::{
    check_lengths, check_wave_table_length, AxisId, Channel, ChannelMode, CommandSet,
    SinusoidalWaveform, WaveTableMode,
};
use super::gcs::{GcsDevice, GcsError, GcsResult};
use super::recorder::{
    DataRecorderConfiguration, RecordOption, RecordSource, RecorderTrigger, SourceKind,
};

/// `SPA` parameter holding the servo update time in seconds.
pub const SERVO_UPDATE_TIME_PARAM: u32 = 0x0E00_0200;

/// Points written per `WAV ... PNT` command.
const WAVE_POINTS_PER_COMMAND: usize = 32;

/// GCS client for the PI E-518 controller.
///
/// Created disconnected; [`CommandSet::connect_tcpip`] opens the session.
#[derive(Default)]
pub struct E518 {
    device: Option<GcsDevice>,
}

impl E518 {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_connected(&self) -> bool {
        self.device.is_some()
    }

    /// Low-level access for GCS commands not covered by [`CommandSet`].
    pub fn device_mut(&mut self) -> GcsResult<&mut GcsDevice> {
        self.device.as_mut().ok_or(GcsError::NotConnected)
    }

    /// Query device identification string.
    pub fn idn(&mut self) -> GcsResult<String> {
        let response = self.device_mut()?.query("*IDN?")?;
        Ok(response.trim().to_string())
    }

    fn command(&mut self, command: &str) -> GcsResult<()> {
        self.device_mut()?.command(command)
    }

    fn query(&mut self, query: &str) -> GcsResult<String> {
        self.device_mut()?.query(query)
    }

    /// Query one value per requested item, e.g. `POS? A B`.
    fn query_values<T: Display>(&mut self, command: &str, ids: &[T]) -> GcsResult<Vec<f64>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let response = self.query(&format!("{command} {}", join_ids(ids)))?;
        GcsDevice::parse_values(&response, ids.len())
    }

    fn query_bools<T: Display>(&mut self, command: &str, ids: &[T]) -> GcsResult<Vec<bool>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let response = self.query(&format!("{command} {}", join_ids(ids)))?;
        GcsDevice::parse_bools(&response, ids.len())
    }

    /// Send `command` with `id value` pairs, e.g. `MOV A 1.5 B 2`.
    fn command_pairs<K: Display, V: Display>(
        &mut self,
        command: &str,
        ids: &[K],
        values: &[V],
    ) -> GcsResult<()> {
        check_lengths(command, ids.len(), values.len())?;
        if ids.is_empty() {
            return Ok(());
        }
        self.command(&format!("{command} {}", pair_args(ids, values)))
    }

    fn count(&mut self, query: &str) -> GcsResult<usize> {
        let response = self.query(query)?;
        GcsDevice::parse_count(&response)
    }

    fn generator_ids(&mut self) -> GcsResult<Vec<u32>> {
        let count = self.get_number_of_wave_generators()? as u32;
        Ok((1..=count).collect())
    }
}

// ==================== Command Formatting ====================

/// Space-separated item list: `A B C`.
fn join_ids<T: Display>(ids: &[T]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Interleaved `id value` list: `A 1 B 0`.
fn pair_args<K: Display, V: Display>(ids: &[K], values: &[V]) -> String {
    ids.iter()
        .zip(values)
        .map(|(id, value)| format!("{id} {value}"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn flag(on: bool) -> u8 {
    u8::from(on)
}

fn sinusoid_command(table_id: u32, mode: WaveTableMode, waveform: &SinusoidalWaveform) -> String {
    format!(
        "WAV {table_id} {} SIN_P {} {} {} {} {} {}",
        mode.gcs_token(),
        waveform.length_in_points,
        waveform.amplitude,
        waveform.offset,
        waveform.wavelength_in_points,
        waveform.start_point,
        waveform.curve_center_point
    )
}

/// `WAV ... PNT` commands; every chunk after the first is appended.
fn point_commands(table_id: u32, mode: WaveTableMode, points: &[f64]) -> Vec<String> {
    points
        .chunks(WAVE_POINTS_PER_COMMAND)
        .enumerate()
        .map(|(i, chunk)| {
            let token = if i == 0 {
                mode.gcs_token()
            } else {
                WaveTableMode::Append.gcs_token()
            };
            format!(
                "WAV {table_id} {token} PNT 1 {} {}",
                chunk.len(),
                join_ids(chunk)
            )
        })
        .collect()
}

/// A line is a query when its command word ends in `?`.
fn is_query(line: &str) -> bool {
    line.split_whitespace()
        .next()
        .is_some_and(|word| word.ends_with('?'))
}

/// `DRT` for table 0, which addresses every recorder table.
fn trigger_command(source: RecorderTrigger, value: u32) -> GcsResult<String> {
    Ok(format!("DRT 0 {} {value}", source.require_code()?))
}

// ==================== Response Parsing ====================

/// Parse the record option section of an `HDR?` answer.
///
/// The answer is split into `#`-headed sections (`#RecordOptions`,
/// `#TriggerOptions`, ...); only `code=description` lines of the record option
/// section are returned.
fn parse_recorder_options(response: &str) -> GcsResult<Vec<(u32, String)>> {
    let mut in_record_options = false;
    let mut options = Vec::new();
    for line in response.lines().map(str::trim) {
        if let Some(header) = line.strip_prefix('#') {
            in_record_options = header
                .trim()
                .to_ascii_lowercase()
                .starts_with("recordoption");
            continue;
        }
        if !in_record_options || line.is_empty() {
            continue;
        }
        let Some((code, description)) = line.split_once('=') else {
            continue;
        };
        let code = code
            .trim()
            .parse()
            .map_err(|_| GcsError::ParseError(format!("Invalid record option '{line}'")))?;
        options.push((code, description.trim().to_string()));
    }
    if options.is_empty() {
        return Err(GcsError::InvalidResponse(
            "No record options in HDR? answer".to_string(),
        ));
    }
    Ok(options)
}

/// Parse a `DRT?` answer such as `1=0 0`; every table shares the trigger, so
/// the first entry is used.
fn parse_trigger_source(response: &str) -> GcsResult<(RecorderTrigger, u32)> {
    let pairs = GcsDevice::parse_key_values(response)?;
    let (table, value) = pairs
        .first()
        .ok_or_else(|| GcsError::InvalidResponse("Empty DRT? answer".to_string()))?;
    let fields: Vec<u32> = value
        .split_whitespace()
        .map(|f| {
            f.parse()
                .map_err(|_| GcsError::ParseError(format!("Invalid trigger field '{f}'")))
        })
        .collect::<GcsResult<_>>()?;
    match fields.as_slice() {
        [source, value] => Ok((RecorderTrigger::from_code(*source), *value)),
        [source] => Ok((RecorderTrigger::from_code(*source), 0)),
        _ => Err(GcsError::ParseError(format!(
            "Expected '<source> <value>' for table {table}, got '{value}'"
        ))),
    }
}

/// Parse the `SAI?` answer: one identifier per line.
fn parse_axes(response: &str) -> GcsResult<Vec<AxisId>> {
    response
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(AxisId::from_str)
        .collect()
}

/// Parse a `DRC?` answer such as `1=A 2`.
///
/// Tables reported with option 0 are unused and skipped. Unknown option codes
/// are kept as [`RecordOption::Unknown`].
fn parse_recorder_configuration(response: &str) -> GcsResult<DataRecorderConfiguration> {
    let mut cfg = DataRecorderConfiguration::new();
    for (key, value) in GcsDevice::parse_key_values(response)? {
        let table: u32 = key
            .parse()
            .map_err(|_| GcsError::ParseError(format!("Invalid recorder table '{key}'")))?;
        let mut fields = value.split_whitespace();
        let (Some(source), Some(code)) = (fields.next(), fields.next()) else {
            return Err(GcsError::ParseError(format!(
                "Expected '<source> <option>' for table {table}, got '{value}'"
            )));
        };
        let code: u32 = code
            .parse()
            .map_err(|_| GcsError::ParseError(format!("Invalid record option '{code}'")))?;
        if code == 0 {
            continue;
        }
        let option = RecordOption::from_code(code);
        let source = match option.source_kind() {
            Some(SourceKind::Channel) => RecordSource::Channel(source.parse()?),
            _ => RecordSource::Axis(source.parse()?),
        };
        cfg.record_from_device(table, source, option);
    }
    Ok(cfg)
}

/// Parse a `DRR?` answer into one row per table.
///
/// The answer starts with `#` header lines followed by one line per sample
/// holding one column per requested table.
fn parse_recorded_data(response: &str, tables: usize, points: usize) -> GcsResult<Array2<f64>> {
    let mut data = Array2::zeros((tables, points));
    let mut sample = 0;
    for line in response.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if sample >= points {
            return Err(GcsError::InvalidResponse(format!(
                "More than {points} samples in DRR? answer"
            )));
        }
        let values = line
            .split_whitespace()
            .map(|v| {
                v.parse::<f64>()
                    .map_err(|_| GcsError::ParseError(format!("Invalid sample '{v}'")))
            })
            .collect::<GcsResult<Vec<_>>>()?;
        check_lengths("DRR? columns", tables, values.len())?;
        for (table, value) in values.into_iter().enumerate() {
            data[[table, sample]] = value;
        }
        sample += 1;
    }
    if sample != points {
        return Err(GcsError::InvalidResponse(format!(
            "Expected {points} samples, got {sample}"
        )));
    }
    Ok(data)
}

impl CommandSet for E518 {
    fn connect_tcpip(&mut self, hostname: &str, port: u16) -> GcsResult<()> {
        let mut device = GcsDevice::connect(format!("{hostname}:{port}"))?;
        let idn = device.query("*IDN?")?;
        info!("Connected to: {}", idn.trim());
        self.device = Some(device);
        Ok(())
    }

    fn close_connection(&mut self) -> GcsResult<()> {
        if let Some(device) = self.device.take() {
            info!("Closing connection to {}", device.addr());
        }
        Ok(())
    }

    fn get_version(&mut self) -> GcsResult<String> {
        let response = self.query("VER?")?;
        Ok(response.trim().to_string())
    }

    fn gcs_command(&mut self, command: &str) -> GcsResult<String> {
        if is_query(command) {
            self.query(command)
        } else {
            self.command(command)?;
            Ok(String::new())
        }
    }

    fn echo(&mut self, message: &str) -> GcsResult<String> {
        let response = self.query(&format!("ECO? {message}"))?;
        Ok(response.trim().to_string())
    }

    fn get_axes_identifiers(&mut self) -> GcsResult<Vec<AxisId>> {
        let response = self.query("SAI?")?;
        parse_axes(&response)
    }

    fn get_number_of_input_signal_channels(&mut self) -> GcsResult<usize> {
        self.count("TSC?")
    }

    fn get_number_of_output_signal_channels(&mut self) -> GcsResult<usize> {
        self.count("TPC?")
    }

    fn get_control_mode(&mut self, channels: &[Channel]) -> GcsResult<Vec<ChannelMode>> {
        self.query_values("ONL?", channels)?
            .into_iter()
            .map(ChannelMode::from_gcs_value)
            .collect()
    }

    fn set_control_mode(&mut self, channels: &[Channel], modes: &[ChannelMode]) -> GcsResult<()> {
        let values: Vec<u8> = modes.iter().map(|m| m.gcs_value()).collect();
        self.command_pairs("ONL", channels, &values)
    }

    fn get_lower_voltage_limit(&mut self, channels: &[Channel]) -> GcsResult<Vec<f64>> {
        self.query_values("VMI?", channels)
    }

    fn set_lower_voltage_limit(&mut self, channels: &[Channel], volts: &[f64]) -> GcsResult<()> {
        self.command_pairs("VMI", channels, volts)
    }

    fn get_upper_voltage_limit(&mut self, channels: &[Channel]) -> GcsResult<Vec<f64>> {
        self.query_values("VMA?", channels)
    }

    fn set_upper_voltage_limit(&mut self, channels: &[Channel], volts: &[f64]) -> GcsResult<()> {
        self.command_pairs("VMA", channels, volts)
    }

    fn get_voltages(&mut self, channels: &[Channel]) -> GcsResult<Vec<f64>> {
        self.query_values("VOL?", channels)
    }

    fn get_servo_control_mode(&mut self, axes: &[AxisId]) -> GcsResult<Vec<bool>> {
        self.query_bools("SVO?", axes)
    }

    fn set_servo_control_mode(&mut self, axes: &[AxisId], closed_loop: &[bool]) -> GcsResult<()> {
        let flags: Vec<u8> = closed_loop.iter().map(|on| flag(*on)).collect();
        self.command_pairs("SVO", axes, &flags)
    }

    fn get_open_loop_axis_value(&mut self, axes: &[AxisId]) -> GcsResult<Vec<f64>> {
        self.query_values("SVA?", axes)
    }

    fn set_open_loop_axis_value(&mut self, axes: &[AxisId], values: &[f64]) -> GcsResult<()> {
        self.command_pairs("SVA", axes, values)
    }

    fn set_relative_open_loop_axis_value(
        &mut self,
        axes: &[AxisId],
        offsets: &[f64],
    ) -> GcsResult<()> {
        self.command_pairs("SVR", axes, offsets)
    }

    fn get_position(&mut self, axes: &[AxisId]) -> GcsResult<Vec<f64>> {
        self.query_values("POS?", axes)
    }

    fn get_target_position(&mut self, axes: &[AxisId]) -> GcsResult<Vec<f64>> {
        self.query_values("MOV?", axes)
    }

    fn set_target_position(&mut self, axes: &[AxisId], positions: &[f64]) -> GcsResult<()> {
        self.command_pairs("MOV", axes, positions)
    }

    fn set_target_relative_to_current_position(
        &mut self,
        axes: &[AxisId],
        offsets: &[f64],
    ) -> GcsResult<()> {
        self.command_pairs("MVR", axes, offsets)
    }

    fn get_number_of_wave_generators(&mut self) -> GcsResult<usize> {
        self.count("TWG?")
    }

    fn get_wave_generator_start_stop_mode(&mut self) -> GcsResult<Vec<bool>> {
        let ids = self.generator_ids()?;
        // WGO? reports a start-mode bit mask; any set bit means running.
        Ok(self
            .query_values("WGO?", &ids)?
            .into_iter()
            .map(|mode| mode != 0.0)
            .collect())
    }

    fn set_wave_generator_start_stop_mode(&mut self, running: &[bool]) -> GcsResult<()> {
        let ids = self.generator_ids()?;
        let flags: Vec<u8> = running.iter().map(|on| flag(*on)).collect();
        self.command_pairs("WGO", &ids, &flags)
    }

    fn clear_wave_table_data(&mut self, table_ids: &[u32]) -> GcsResult<()> {
        if table_ids.is_empty() {
            return Ok(());
        }
        self.command(&format!("WCL {}", join_ids(table_ids)))
    }

    fn get_connection_of_wave_table_to_wave_generator(
        &mut self,
        generator_ids: &[u32],
    ) -> GcsResult<Vec<u32>> {
        Ok(self
            .query_values("WSL?", generator_ids)?
            .into_iter()
            .map(|table| table as u32)
            .collect())
    }

    fn set_connection_of_wave_table_to_wave_generator(
        &mut self,
        generator_ids: &[u32],
        table_ids: &[u32],
    ) -> GcsResult<()> {
        self.command_pairs("WSL", generator_ids, table_ids)
    }

    fn set_sinusoidal_waveform(
        &mut self,
        table_id: u32,
        mode: WaveTableMode,
        waveform: &SinusoidalWaveform,
    ) -> GcsResult<()> {
        waveform.validate()?;
        let max = self.get_maximum_wave_table_length()?;
        check_wave_table_length(table_id, waveform.length_in_points, max)?;
        self.command(&sinusoid_command(table_id, mode, waveform))
    }

    fn set_point_waveform(
        &mut self,
        table_id: u32,
        mode: WaveTableMode,
        points: &[f64],
    ) -> GcsResult<()> {
        if points.is_empty() {
            return Err(GcsError::InvalidConfiguration(
                "A point waveform needs at least one point".to_string(),
            ));
        }
        let max = self.get_maximum_wave_table_length()?;
        check_wave_table_length(table_id, points.len(), max)?;
        let commands = point_commands(table_id, mode, points);
        debug!(
            "Writing {} points to wave table {table_id} in {} commands",
            points.len(),
            commands.len()
        );
        for command in commands {
            self.command(&command)?;
        }
        Ok(())
    }

    fn get_wave_generator_table_rate(&mut self) -> GcsResult<Vec<u32>> {
        let ids = self.generator_ids()?;
        Ok(self
            .query_values("WTR?", &ids)?
            .into_iter()
            .map(|rate| rate as u32)
            .collect())
    }

    fn set_wave_generator_table_rate(&mut self, servo_cycles: u32) -> GcsResult<()> {
        for id in self.generator_ids()? {
            // Interpolation type 0: none.
            self.command(&format!("WTR {id} {servo_cycles} 0"))?;
        }
        Ok(())
    }

    fn get_servo_update_time_in_seconds(&mut self) -> GcsResult<f64> {
        let response = self.query(&format!("SPA? 1 0x{SERVO_UPDATE_TIME_PARAM:08X}"))?;
        GcsDevice::parse_single_value(&response)
    }

    fn get_record_table_rate(&mut self) -> GcsResult<u32> {
        Ok(self.count("RTR?")? as u32)
    }

    fn set_record_table_rate(&mut self, servo_cycles: u32) -> GcsResult<()> {
        self.command(&format!("RTR {servo_cycles}"))
    }

    fn get_number_of_recorder_tables(&mut self) -> GcsResult<usize> {
        self.count("TNR?")
    }

    fn get_data_recorder_configuration(&mut self) -> GcsResult<DataRecorderConfiguration> {
        let response = self.query("DRC?")?;
        parse_recorder_configuration(&response)
    }

    fn set_data_recorder_configuration(
        &mut self,
        configuration: &DataRecorderConfiguration,
    ) -> GcsResult<()> {
        for (table, source, option) in configuration.iter() {
            let code = option.code().ok_or_else(|| {
                GcsError::InvalidConfiguration(format!(
                    "Recorder table {table} has an unknown record option"
                ))
            })?;
            self.command(&format!("DRC {table} {source} {code}"))?;
        }
        debug!("Configured {} recorder tables", configuration.len());
        Ok(())
    }

    fn get_all_data_recorder_options(&mut self) -> GcsResult<Vec<(u32, String)>> {
        let response = self.query("HDR?")?;
        parse_recorder_options(&response)
    }

    fn set_data_recorder_trigger_source(
        &mut self,
        source: RecorderTrigger,
        value: u32,
    ) -> GcsResult<()> {
        self.command(&trigger_command(source, value)?)
    }

    fn get_data_recorder_trigger_source(&mut self) -> GcsResult<(RecorderTrigger, u32)> {
        let response = self.query("DRT?")?;
        parse_trigger_source(&response)
    }

    fn start_recording_in_sync_with_wave_generator(&mut self) -> GcsResult<()> {
        self.command("WGR")
    }

    fn get_recorded_data_values(
        &mut self,
        number_of_points: usize,
        start_point: usize,
    ) -> GcsResult<Array2<f64>> {
        let tables = self.get_number_of_recorder_tables()?;
        let ids: Vec<usize> = (1..=tables).collect();
        let response = self.query(&format!(
            "DRR? {start_point} {number_of_points} {}",
            join_ids(&ids)
        ))?;
        let data = parse_recorded_data(&response, tables, number_of_points)?;
        debug!("Read recording: {tables} tables x {number_of_points} samples");
        Ok(data)
    }

    fn get_overflow_state(&mut self, axes: &[AxisId]) -> GcsResult<Vec<bool>> {
        self.query_bools("OVF?", axes)
    }
}
