//! In-memory GCS controller for running the tip-tilt layer without hardware.
//!
//! `SimulatedCommandSet` keeps axis, channel, wave generator and recorder state
//! in plain collections and answers every [`CommandSet`] call from them. It
//! reports the same controller error codes a real device would (15 for an
//! unknown axis, 17 for an out-of-range id, 303 for open-loop motion on a
//! servo-controlled axis).
//!
//! Wave generator `n` drives the `n`-th axis reported by `SAI?`. Recorded data
//! replays the running wave tables (or the static targets) so acquisitions
//! look like the motion that was commanded.

use std::collections::HashMap;
use std::f64::consts::FRAC_PI_2;

use ndarray::Array2;
use strum::IntoEnumIterator;
use tracing::debug;

use super::command_set::{
    check_lengths, check_wave_table_length, AxisId, Channel, ChannelMode, CommandSet,
    SinusoidalWaveform, WaveTableMode, MAX_WAVE_TABLE_POINTS,
};
use super::gcs::{GcsError, GcsResult};
use super::recorder::{DataRecorderConfiguration, RecordOption, RecordSource, RecorderTrigger};

/// Servo cycle of the simulated controller.
pub const SIM_SERVO_UPDATE_TIME: f64 = 40e-6;

/// Recorder tables reported by default.
pub const SIM_RECORDER_TABLES: usize = 8;

const SIM_WAVE_GENERATORS: usize = 3;
const SIM_VERSION: &str = "Simulated GCS controller, FW 0.0.0";

const ERR_UNKNOWN_COMMAND: i32 = 2;
const ERR_INVALID_AXIS: i32 = 15;
const ERR_PARAMETER_OUT_OF_RANGE: i32 = 17;
const ERR_OPEN_LOOP_WITH_SERVO_ON: i32 = 303;

#[derive(Debug, Clone, Default)]
struct AxisState {
    servo: bool,
    open_loop_value: f64,
    target: f64,
}

#[derive(Debug, Clone, Default)]
struct ChannelState {
    mode: ChannelMode,
    lower_limit: f64,
    upper_limit: f64,
}

#[derive(Debug, Clone)]
struct WaveGenerator {
    running: bool,
    table: u32,
    rate: u32,
}

pub struct SimulatedCommandSet {
    hostname: Option<String>,
    axes: Vec<AxisId>,
    axis_state: HashMap<AxisId, AxisState>,
    input_channels: usize,
    output_channels: usize,
    channels: Vec<ChannelState>,
    generators: Vec<WaveGenerator>,
    wave_tables: HashMap<u32, Vec<f64>>,
    servo_update_time: f64,
    record_table_rate: u32,
    recorder_tables: usize,
    recorder_config: DataRecorderConfiguration,
    recorder_trigger: (RecorderTrigger, u32),
    recording_triggers: usize,
    max_wave_table_points: usize,
}

impl Default for SimulatedCommandSet {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedCommandSet {
    /// Three axes (`A`, `B`, `C`) on three channels, all at zero with servo off.
    pub fn new() -> Self {
        let axes: Vec<AxisId> = ["A", "B", "C"].into_iter().map(AxisId::from_static).collect();
        let axis_state = axes
            .iter()
            .map(|axis| (axis.clone(), AxisState::default()))
            .collect();
        let generators = (1..=SIM_WAVE_GENERATORS as u32)
            .map(|table| WaveGenerator {
                running: false,
                table,
                rate: 1,
            })
            .collect();

        Self {
            hostname: None,
            axes,
            axis_state,
            input_channels: 3,
            output_channels: 3,
            channels: vec![ChannelState::default(); 3],
            generators,
            wave_tables: HashMap::new(),
            servo_update_time: SIM_SERVO_UPDATE_TIME,
            record_table_rate: 1,
            recorder_tables: SIM_RECORDER_TABLES,
            recorder_config: DataRecorderConfiguration::tip_tilt_monitoring(),
            recorder_trigger: (RecorderTrigger::Default, 0),
            recording_triggers: 0,
            max_wave_table_points: MAX_WAVE_TABLE_POINTS,
        }
    }

    pub fn with_recorder_tables(mut self, tables: usize) -> Self {
        self.recorder_tables = tables;
        self
    }

    /// Report a different channel geometry, e.g. to exercise set-up checks.
    pub fn with_signal_channels(mut self, inputs: usize, outputs: usize) -> Self {
        self.input_channels = inputs;
        self.output_channels = outputs;
        self.channels = vec![ChannelState::default(); inputs.max(outputs)];
        self
    }

    pub fn with_servo_update_time(mut self, seconds: f64) -> Self {
        self.servo_update_time = seconds;
        self
    }

    /// Cap the number of points a single wave table holds.
    pub fn with_max_wave_table_points(mut self, points: usize) -> Self {
        self.max_wave_table_points = points;
        self
    }

    /// Give one wave generator its own table rate, as `WTR <generator> <rate>` would.
    pub fn set_generator_table_rate(&mut self, generator_id: u32, servo_cycles: u32) -> GcsResult<()> {
        Self::check_rate(servo_cycles, "WTR")?;
        let index = self.generator_index(generator_id, "WTR")?;
        self.generators[index].rate = servo_cycles;
        Ok(())
    }

    /// How many times recording was armed in sync with the wave generator.
    pub fn recording_trigger_count(&self) -> usize {
        self.recording_triggers
    }

    /// Content of a wave table, if anything was written to it.
    pub fn waveform(&self, table_id: u32) -> Option<&[f64]> {
        self.wave_tables.get(&table_id).map(Vec::as_slice)
    }

    pub fn hostname(&self) -> Option<&str> {
        self.hostname.as_deref()
    }

    pub fn is_connected(&self) -> bool {
        self.hostname.is_some()
    }

    // ==================== Lookup Helpers ====================

    fn axis(&self, axis: &AxisId, command: &str) -> GcsResult<&AxisState> {
        self.axis_state
            .get(axis)
            .ok_or_else(|| GcsError::controller(ERR_INVALID_AXIS, format!("{command} {axis}")))
    }

    fn axis_mut(&mut self, axis: &AxisId, command: &str) -> GcsResult<&mut AxisState> {
        self.axis_state
            .get_mut(axis)
            .ok_or_else(|| GcsError::controller(ERR_INVALID_AXIS, format!("{command} {axis}")))
    }

    fn axis_entry(&mut self, axis: &AxisId) -> &mut AxisState {
        if !self.axes.contains(axis) {
            self.axes.push(axis.clone());
        }
        self.axis_state.entry(axis.clone()).or_default()
    }

    fn read_axes<T>(
        &self,
        axes: &[AxisId],
        command: &str,
        f: impl Fn(&AxisState) -> T,
    ) -> GcsResult<Vec<T>> {
        axes.iter()
            .map(|axis| self.axis(axis, command).map(&f))
            .collect()
    }

    fn channel(&self, channel: Channel, command: &str) -> GcsResult<&ChannelState> {
        self.channels.get(channel.index()).ok_or_else(|| {
            GcsError::controller(ERR_PARAMETER_OUT_OF_RANGE, format!("{command} {channel}"))
        })
    }

    fn channel_mut(&mut self, channel: Channel, command: &str) -> GcsResult<&mut ChannelState> {
        self.channels.get_mut(channel.index()).ok_or_else(|| {
            GcsError::controller(ERR_PARAMETER_OUT_OF_RANGE, format!("{command} {channel}"))
        })
    }

    fn check_channels(&self, channels: &[Channel], command: &str) -> GcsResult<()> {
        channels
            .iter()
            .try_for_each(|ch| self.channel(*ch, command).map(|_| ()))
    }

    fn generator_index(&self, generator_id: u32, command: &str) -> GcsResult<usize> {
        let index = (generator_id as usize).wrapping_sub(1);
        if index < self.generators.len() {
            Ok(index)
        } else {
            Err(GcsError::controller(
                ERR_PARAMETER_OUT_OF_RANGE,
                format!("{command} {generator_id}"),
            ))
        }
    }

    fn check_wave_table(&self, table_id: u32, command: &str) -> GcsResult<()> {
        if table_id == 0 || table_id as usize > self.generators.len() {
            return Err(GcsError::controller(
                ERR_PARAMETER_OUT_OF_RANGE,
                format!("{command} {table_id}"),
            ));
        }
        Ok(())
    }

    fn check_rate(rate: u32, command: &str) -> GcsResult<()> {
        if rate == 0 {
            return Err(GcsError::controller(
                ERR_PARAMETER_OUT_OF_RANGE,
                format!("{command} {rate}"),
            ));
        }
        Ok(())
    }

    /// Voltage on a channel follows the axis of the same index, clipped to
    /// the channel limits.
    fn output_voltage(&self, channel: Channel) -> GcsResult<f64> {
        let state = self.channel(channel, "VOL?")?;
        let raw = self
            .axes
            .get(channel.index())
            .and_then(|axis| self.axis_state.get(axis))
            .map_or(0.0, |axis| {
                if axis.servo {
                    axis.target
                } else {
                    axis.open_loop_value
                }
            });
        Ok(raw.max(state.lower_limit).min(state.upper_limit.max(state.lower_limit)))
    }

    /// Wave table played back on `axis`, if its generator is running.
    fn running_table_for(&self, axis: &AxisId) -> Option<&[f64]> {
        let index = self.axes.iter().position(|a| a == axis)?;
        let generator = self.generators.get(index).filter(|g| g.running)?;
        self.wave_tables
            .get(&generator.table)
            .filter(|t| !t.is_empty())
            .map(Vec::as_slice)
    }

    fn recorded_sample(&self, source: &RecordSource, option: RecordOption, point: usize) -> f64 {
        match (source, option) {
            (
                RecordSource::Axis(axis),
                RecordOption::TargetPosition | RecordOption::RealPosition,
            ) => match self.running_table_for(axis) {
                Some(table) => table[point % table.len()],
                None => self.axis_state.get(axis).map_or(0.0, |s| s.target),
            },
            (RecordSource::Axis(axis), RecordOption::ControlOutput) => self
                .axis_state
                .get(axis)
                .map_or(0.0, |s| s.open_loop_value),
            (RecordSource::Channel(channel), _) => self.output_voltage(*channel).unwrap_or(0.0),
            _ => 0.0,
        }
    }
}

/// Render a `SIN_P` wave table segment.
///
/// The buffer is pre-filled with `offset`, one period is written from index 0
/// and the buffer is then rotated right by `start_point`.
fn render_sinusoid(waveform: &SinusoidalWaveform) -> Vec<f64> {
    let SinusoidalWaveform {
        length_in_points: length,
        amplitude,
        offset,
        wavelength_in_points: wavelength,
        start_point,
        curve_center_point: center,
    } = *waveform;

    let mut points = vec![offset; length];

    let half_up = 0.5 * center as f64;
    let half_down = 0.5 * (wavelength - center) as f64;
    for (i, point) in points.iter_mut().enumerate().take(wavelength) {
        *point = if i < center {
            let x = i as f64 - half_up;
            offset + 0.5 * amplitude * (1.0 + (x / half_up * FRAC_PI_2).sin())
        } else {
            let x = (i - center) as f64 - half_down;
            offset + 0.5 * amplitude * (1.0 - (x / half_down * FRAC_PI_2).sin())
        };
    }

    points.rotate_right(start_point % length);
    points
}

impl CommandSet for SimulatedCommandSet {
    fn connect_tcpip(&mut self, hostname: &str, port: u16) -> GcsResult<()> {
        debug!("Simulated controller connected as {hostname}:{port}");
        self.hostname = Some(hostname.to_string());
        Ok(())
    }

    fn close_connection(&mut self) -> GcsResult<()> {
        self.hostname = None;
        Ok(())
    }

    fn get_version(&mut self) -> GcsResult<String> {
        Ok(SIM_VERSION.to_string())
    }

    /// Answers `VER?`, `ECO?` and `ERR?`; setting commands are accepted and
    /// ignored, any other query fails with the unknown-command error.
    fn gcs_command(&mut self, command: &str) -> GcsResult<String> {
        let line = command.trim();
        let (word, rest) = line.split_once(' ').unwrap_or((line, ""));
        match word {
            "VER?" => self.get_version(),
            "ECO?" => self.echo(rest.trim_start()),
            "ERR?" => Ok("0".to_string()),
            query if query.ends_with('?') => {
                Err(GcsError::controller(ERR_UNKNOWN_COMMAND, line))
            }
            _ => {
                debug!("Simulated controller ignores '{line}'");
                Ok(String::new())
            }
        }
    }

    fn echo(&mut self, message: &str) -> GcsResult<String> {
        Ok(message.to_string())
    }

    fn get_axes_identifiers(&mut self) -> GcsResult<Vec<AxisId>> {
        Ok(self.axes.clone())
    }

    fn get_number_of_input_signal_channels(&mut self) -> GcsResult<usize> {
        Ok(self.input_channels)
    }

    fn get_number_of_output_signal_channels(&mut self) -> GcsResult<usize> {
        Ok(self.output_channels)
    }

    fn get_control_mode(&mut self, channels: &[Channel]) -> GcsResult<Vec<ChannelMode>> {
        channels
            .iter()
            .map(|ch| self.channel(*ch, "ONL?").map(|s| s.mode))
            .collect()
    }

    fn set_control_mode(&mut self, channels: &[Channel], modes: &[ChannelMode]) -> GcsResult<()> {
        check_lengths("ONL", channels.len(), modes.len())?;
        self.check_channels(channels, "ONL")?;
        for (ch, mode) in channels.iter().zip(modes) {
            self.channel_mut(*ch, "ONL")?.mode = *mode;
        }
        Ok(())
    }

    fn get_lower_voltage_limit(&mut self, channels: &[Channel]) -> GcsResult<Vec<f64>> {
        channels
            .iter()
            .map(|ch| self.channel(*ch, "VMI?").map(|s| s.lower_limit))
            .collect()
    }

    fn set_lower_voltage_limit(&mut self, channels: &[Channel], volts: &[f64]) -> GcsResult<()> {
        check_lengths("VMI", channels.len(), volts.len())?;
        self.check_channels(channels, "VMI")?;
        for (ch, v) in channels.iter().zip(volts) {
            self.channel_mut(*ch, "VMI")?.lower_limit = *v;
        }
        Ok(())
    }

    fn get_upper_voltage_limit(&mut self, channels: &[Channel]) -> GcsResult<Vec<f64>> {
        channels
            .iter()
            .map(|ch| self.channel(*ch, "VMA?").map(|s| s.upper_limit))
            .collect()
    }

    fn set_upper_voltage_limit(&mut self, channels: &[Channel], volts: &[f64]) -> GcsResult<()> {
        check_lengths("VMA", channels.len(), volts.len())?;
        self.check_channels(channels, "VMA")?;
        for (ch, v) in channels.iter().zip(volts) {
            self.channel_mut(*ch, "VMA")?.upper_limit = *v;
        }
        Ok(())
    }

    fn get_voltages(&mut self, channels: &[Channel]) -> GcsResult<Vec<f64>> {
        channels.iter().map(|ch| self.output_voltage(*ch)).collect()
    }

    fn get_servo_control_mode(&mut self, axes: &[AxisId]) -> GcsResult<Vec<bool>> {
        self.read_axes(axes, "SVO?", |s| s.servo)
    }

    fn set_servo_control_mode(&mut self, axes: &[AxisId], closed_loop: &[bool]) -> GcsResult<()> {
        check_lengths("SVO", axes.len(), closed_loop.len())?;
        for (axis, on) in axes.iter().zip(closed_loop) {
            self.axis_entry(axis).servo = *on;
        }
        Ok(())
    }

    fn get_open_loop_axis_value(&mut self, axes: &[AxisId]) -> GcsResult<Vec<f64>> {
        self.read_axes(axes, "SVA?", |s| s.open_loop_value)
    }

    fn set_open_loop_axis_value(&mut self, axes: &[AxisId], values: &[f64]) -> GcsResult<()> {
        check_lengths("SVA", axes.len(), values.len())?;
        if let Some(axis) = axes
            .iter()
            .find(|a| self.axis_state.get(*a).is_some_and(|s| s.servo))
        {
            return Err(GcsError::controller(
                ERR_OPEN_LOOP_WITH_SERVO_ON,
                format!("SVA {axis}"),
            ));
        }
        for (axis, value) in axes.iter().zip(values) {
            self.axis_entry(axis).open_loop_value = *value;
        }
        Ok(())
    }

    fn set_relative_open_loop_axis_value(
        &mut self,
        axes: &[AxisId],
        offsets: &[f64],
    ) -> GcsResult<()> {
        check_lengths("SVR", axes.len(), offsets.len())?;
        for axis in axes {
            if self.axis(axis, "SVR")?.servo {
                return Err(GcsError::controller(
                    ERR_OPEN_LOOP_WITH_SERVO_ON,
                    format!("SVR {axis}"),
                ));
            }
        }
        for (axis, offset) in axes.iter().zip(offsets) {
            self.axis_mut(axis, "SVR")?.open_loop_value += offset;
        }
        Ok(())
    }

    fn get_position(&mut self, axes: &[AxisId]) -> GcsResult<Vec<f64>> {
        self.read_axes(axes, "POS?", |s| {
            if s.servo {
                s.target
            } else {
                s.open_loop_value
            }
        })
    }

    fn get_target_position(&mut self, axes: &[AxisId]) -> GcsResult<Vec<f64>> {
        self.read_axes(axes, "MOV?", |s| s.target)
    }

    fn set_target_position(&mut self, axes: &[AxisId], positions: &[f64]) -> GcsResult<()> {
        check_lengths("MOV", axes.len(), positions.len())?;
        for (axis, position) in axes.iter().zip(positions) {
            self.axis_entry(axis).target = *position;
        }
        Ok(())
    }

    fn set_target_relative_to_current_position(
        &mut self,
        axes: &[AxisId],
        offsets: &[f64],
    ) -> GcsResult<()> {
        check_lengths("MVR", axes.len(), offsets.len())?;
        for axis in axes {
            self.axis(axis, "MVR")?;
        }
        for (axis, offset) in axes.iter().zip(offsets) {
            self.axis_mut(axis, "MVR")?.target += offset;
        }
        Ok(())
    }

    fn get_number_of_wave_generators(&mut self) -> GcsResult<usize> {
        Ok(self.generators.len())
    }

    fn get_wave_generator_start_stop_mode(&mut self) -> GcsResult<Vec<bool>> {
        Ok(self.generators.iter().map(|g| g.running).collect())
    }

    fn set_wave_generator_start_stop_mode(&mut self, running: &[bool]) -> GcsResult<()> {
        check_lengths("WGO", self.generators.len(), running.len())?;
        for (index, run) in running.iter().enumerate() {
            let starting = *run && !self.generators[index].running;
            self.generators[index].running = *run;
            if !starting {
                continue;
            }
            // The generator output becomes the axis target.
            let first = self
                .wave_tables
                .get(&self.generators[index].table)
                .and_then(|t| t.first().copied());
            if let (Some(value), Some(axis)) = (first, self.axes.get(index).cloned()) {
                self.axis_entry(&axis).target = value;
            }
        }
        Ok(())
    }

    fn clear_wave_table_data(&mut self, table_ids: &[u32]) -> GcsResult<()> {
        for id in table_ids {
            self.check_wave_table(*id, "WCL")?;
        }
        for id in table_ids {
            self.wave_tables.remove(id);
        }
        Ok(())
    }

    fn get_connection_of_wave_table_to_wave_generator(
        &mut self,
        generator_ids: &[u32],
    ) -> GcsResult<Vec<u32>> {
        generator_ids
            .iter()
            .map(|id| {
                self.generator_index(*id, "WSL?")
                    .map(|i| self.generators[i].table)
            })
            .collect()
    }

    fn set_connection_of_wave_table_to_wave_generator(
        &mut self,
        generator_ids: &[u32],
        table_ids: &[u32],
    ) -> GcsResult<()> {
        check_lengths("WSL", generator_ids.len(), table_ids.len())?;
        for (generator, table) in generator_ids.iter().zip(table_ids) {
            let index = self.generator_index(*generator, "WSL")?;
            self.check_wave_table(*table, "WSL")?;
            self.generators[index].table = *table;
        }
        Ok(())
    }

    fn set_sinusoidal_waveform(
        &mut self,
        table_id: u32,
        mode: WaveTableMode,
        waveform: &SinusoidalWaveform,
    ) -> GcsResult<()> {
        self.check_wave_table(table_id, "WAV")?;
        if mode != WaveTableMode::Clear {
            return Err(GcsError::InvalidArgument(
                "Simulated SIN_P only supports clearing the wave table".to_string(),
            ));
        }
        check_wave_table_length(table_id, waveform.length_in_points, self.max_wave_table_points)?;
        waveform.validate()?;
        debug!("Simulated SIN_P on wave table {table_id}: {waveform:?}");
        self.wave_tables.insert(table_id, render_sinusoid(waveform));
        Ok(())
    }

    fn set_point_waveform(
        &mut self,
        table_id: u32,
        mode: WaveTableMode,
        points: &[f64],
    ) -> GcsResult<()> {
        self.check_wave_table(table_id, "WAV")?;
        if points.is_empty() {
            return Err(GcsError::InvalidConfiguration(
                "A point waveform needs at least one point".to_string(),
            ));
        }
        let kept = match mode {
            WaveTableMode::Clear => 0,
            _ => self.wave_tables.get(&table_id).map_or(0, Vec::len),
        };
        check_wave_table_length(
            table_id,
            kept.saturating_add(points.len()),
            self.max_wave_table_points,
        )?;
        let table = self.wave_tables.entry(table_id).or_default();
        if mode == WaveTableMode::Clear {
            table.clear();
        }
        table.extend_from_slice(points);
        Ok(())
    }

    fn get_wave_generator_table_rate(&mut self) -> GcsResult<Vec<u32>> {
        Ok(self.generators.iter().map(|g| g.rate).collect())
    }

    fn set_wave_generator_table_rate(&mut self, servo_cycles: u32) -> GcsResult<()> {
        Self::check_rate(servo_cycles, "WTR")?;
        for generator in &mut self.generators {
            generator.rate = servo_cycles;
        }
        Ok(())
    }

    fn get_servo_update_time_in_seconds(&mut self) -> GcsResult<f64> {
        Ok(self.servo_update_time)
    }

    fn get_maximum_wave_table_length(&mut self) -> GcsResult<usize> {
        Ok(self.max_wave_table_points)
    }

    fn get_record_table_rate(&mut self) -> GcsResult<u32> {
        Ok(self.record_table_rate)
    }

    fn set_record_table_rate(&mut self, servo_cycles: u32) -> GcsResult<()> {
        Self::check_rate(servo_cycles, "RTR")?;
        self.record_table_rate = servo_cycles;
        Ok(())
    }

    fn get_number_of_recorder_tables(&mut self) -> GcsResult<usize> {
        Ok(self.recorder_tables)
    }

    fn get_data_recorder_configuration(&mut self) -> GcsResult<DataRecorderConfiguration> {
        Ok(self.recorder_config.clone())
    }

    fn set_data_recorder_configuration(
        &mut self,
        configuration: &DataRecorderConfiguration,
    ) -> GcsResult<()> {
        if let Some(id) = configuration
            .get_table_ids()
            .into_iter()
            .find(|id| *id as usize > self.recorder_tables)
        {
            return Err(GcsError::InvalidConfiguration(format!(
                "Recorder table {id} does not exist (controller has {})",
                self.recorder_tables
            )));
        }
        self.recorder_config = configuration.clone();
        Ok(())
    }

    fn get_all_data_recorder_options(&mut self) -> GcsResult<Vec<(u32, String)>> {
        Ok(RecordOption::iter()
            .filter_map(|option| option.code().map(|code| (code, option.to_string())))
            .collect())
    }

    fn set_data_recorder_trigger_source(
        &mut self,
        source: RecorderTrigger,
        value: u32,
    ) -> GcsResult<()> {
        source.require_code()?;
        self.recorder_trigger = (source, value);
        Ok(())
    }

    fn get_data_recorder_trigger_source(&mut self) -> GcsResult<(RecorderTrigger, u32)> {
        Ok(self.recorder_trigger)
    }

    fn start_recording_in_sync_with_wave_generator(&mut self) -> GcsResult<()> {
        self.recording_triggers += 1;
        Ok(())
    }

    fn get_recorded_data_values(
        &mut self,
        number_of_points: usize,
        start_point: usize,
    ) -> GcsResult<Array2<f64>> {
        if start_point == 0 {
            return Err(GcsError::controller(
                ERR_PARAMETER_OUT_OF_RANGE,
                "DRR? start point 0",
            ));
        }
        let mut data = Array2::zeros((self.recorder_tables, number_of_points));
        for (table_id, source, option) in self.recorder_config.iter() {
            let row = match (table_id as usize).checked_sub(1) {
                Some(row) if row < self.recorder_tables => row,
                _ => continue,
            };
            for (i, value) in data.row_mut(row).iter_mut().enumerate() {
                *value = self.recorded_sample(source, option, start_point - 1 + i);
            }
        }
        Ok(data)
    }

    fn get_overflow_state(&mut self, axes: &[AxisId]) -> GcsResult<Vec<bool>> {
        self.read_axes(axes, "OVF?", |_| false)
    }
}
