//! Two-axis tip-tilt platform on a three-channel PI piezo controller.
//!
//! [`TipTilt2Axis`] drives axes `A` and `B` in milliradians while the third
//! axis is parked as a fixed pivot. It works with any [`CommandSet`]: the
//! [`E518`](super::E518) client for hardware or
//! [`SimulatedCommandSet`](super::SimulatedCommandSet) for tests.
//!
//! # Session
//!
//! A session starts `Uninitialized` and reaches `Ready` through
//! [`set_up`](TipTilt2Axis::set_up):
//!
//! 1. connect to the configured host
//! 2. check for 3 input and 3 output channels
//! 3. bring all channels online
//! 4. stop every wave generator
//! 5. apply the voltage limits
//! 6. open the servo loop on `A` and `B`
//! 7. park the third axis at the pivot value (servo off, open loop)
//! 8. close the servo loop on `A` and `B`
//!
//! A failing step aborts set-up; the session must be set up again.
//!
//! # Modulation
//!
//! [`start_sinusoidal_modulation`](TipTilt2Axis::start_sinusoidal_modulation)
//! loads one `SIN_P` period per axis into wave tables 1 and 2 and starts wave
//! generators 1 and 2. The target active before the first modulation is
//! restored by [`stop_modulation`](TipTilt2Axis::stop_modulation).
//!
//! Phases are given in radians. A phase is rounded to the nearest wave table
//! point, and that start point plus half a period must stay inside the period:
//! `round(phase / 2π · N) + N / 2 < N` for an `N`-point period. This is just
//! below π; at 250 points 3.12 rad is accepted and 3.13 rad is not.
//!
//! A period may not exceed
//! [`get_maximum_wave_table_length`](CommandSet::get_maximum_wave_table_length)
//! points, which puts a floor under the modulation frequency.
//!
//! # Safety
//!
//! Open-loop values are only accepted while the servo loop is open. A running
//! modulation is stopped when the controller is dropped.

pub mod config;

pub use config::{AxisCalibration, TipTiltArgs, TipTiltAxis, TipTiltConfiguration, TIP_TILT_CHANNELS};

use std::f64::consts::TAU;

use ndarray::{s, Array1, Array2};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::command_set::{
    check_wave_table_length, AxisId, Channel, CommandSet, SinusoidalWaveform, WaveTableMode,
};
use super::gcs::{GcsError, GcsResult};
use super::recorder::{DataRecorderConfiguration, RecordOption};

pub use super::session::SessionState;

const ALL_CHANNELS: [Channel; TIP_TILT_CHANNELS] =
    [Channel::from_raw(1), Channel::from_raw(2), Channel::from_raw(3)];

/// Wave tables cleared before loading a new modulation.
const WAVE_TABLES: [u32; 3] = [1, 2, 3];

/// Wave tables (and generators) driving axes A and B.
const MODULATION_TABLES: [u32; 2] = [1, 2];

/// Shortest wave table period accepted for a sinusoid.
const MIN_WAVELENGTH_POINTS: usize = 2;

/// Snapshot of the platform, in milliradians and volts.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct TipTiltStatus {
    /// Measured `[A, B]` position.
    pub position: [f64; 2],
    /// Commanded `[A, B]` position.
    pub target: [f64; 2],
    /// Output voltage of channels 1 to 3.
    pub output_voltage: [f64; TIP_TILT_CHANNELS],
    pub control_loop_closed: bool,
    /// `[A, B]` sensor overflow flags.
    pub overflow: [bool; 2],
}

/// Tip-tilt controller for axes A and B.
pub struct TipTilt2Axis<C: CommandSet> {
    ctrl: C,
    cfg: TipTiltConfiguration,
    state: SessionState,
    axes: [AxisId; 2],
    target_before_modulation: Option<[f64; 2]>,
    modulation_enabled: bool,
    control_loop_enabled: bool,
}

fn fixed<T, const N: usize>(values: Vec<T>, what: &'static str) -> GcsResult<[T; N]> {
    let actual = values.len();
    values.try_into().map_err(|_| GcsError::GeometryMismatch {
        what,
        expected: N,
        actual,
    })
}

fn check_finite(what: &str, values: &[f64]) -> GcsResult<()> {
    if let Some(v) = values.iter().find(|v| !v.is_finite()) {
        return Err(GcsError::InvalidConfiguration(format!(
            "{what} must be finite, got {v}"
        )));
    }
    Ok(())
}

impl<C: CommandSet> TipTilt2Axis<C> {
    /// Wrap a command set. No device I/O happens until [`set_up`](Self::set_up).
    pub fn new(ctrl: C, cfg: TipTiltConfiguration) -> Self {
        Self {
            ctrl,
            cfg,
            state: SessionState::Uninitialized,
            axes: TipTiltAxis::BOTH.map(TipTiltAxis::axis_id),
            target_before_modulation: None,
            modulation_enabled: false,
            control_loop_enabled: false,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn configuration(&self) -> &TipTiltConfiguration {
        &self.cfg
    }

    pub fn command_set(&self) -> &C {
        &self.ctrl
    }

    pub fn command_set_mut(&mut self) -> &mut C {
        &mut self.ctrl
    }

    fn require_ready(&self) -> GcsResult<()> {
        if self.state != SessionState::Ready {
            return Err(GcsError::InvalidState {
                state: self.state,
                required: SessionState::Ready,
            });
        }
        Ok(())
    }

    // ==================== Set-up ====================

    /// Connect and configure the controller for tip-tilt operation.
    pub fn set_up(&mut self) -> GcsResult<()> {
        self.cfg.validate()?;
        let hostname = self
            .cfg
            .hostname()
            .ok_or_else(|| {
                GcsError::InvalidConfiguration("No controller hostname configured".to_string())
            })?
            .to_string();
        let port = self.cfg.port();

        self.state = SessionState::Uninitialized;
        self.modulation_enabled = false;
        self.control_loop_enabled = false;

        info!("Setting up tip-tilt controller at {hostname}:{port}...");
        self.ctrl.connect_tcpip(&hostname, port)?;
        self.state = SessionState::Connected;

        self.check_number_of_channels()?;

        self.ctrl.enable_control_mode(&ALL_CHANNELS)?;
        self.stop_wave_generators()?;

        let lower = self.cfg.lower_voltage_limit();
        let upper = self.cfg.upper_voltage_limit();
        info!("Voltage limits: lower {lower:?} V, upper {upper:?} V");
        self.ctrl.set_lower_voltage_limit(&ALL_CHANNELS, &lower)?;
        self.ctrl.set_upper_voltage_limit(&ALL_CHANNELS, &upper)?;
        self.state = SessionState::Configured;

        self.write_servo(false)?;
        self.configure_pivot()?;
        self.write_servo(true)?;

        self.state = SessionState::Ready;
        info!("Tip-tilt set-up complete, control loop closed");
        Ok(())
    }

    fn check_number_of_channels(&mut self) -> GcsResult<()> {
        let inputs = self.ctrl.get_number_of_input_signal_channels()?;
        if inputs != TIP_TILT_CHANNELS {
            return Err(GcsError::GeometryMismatch {
                what: "input signal channels",
                expected: TIP_TILT_CHANNELS,
                actual: inputs,
            });
        }
        let outputs = self.ctrl.get_number_of_output_signal_channels()?;
        if outputs != TIP_TILT_CHANNELS {
            return Err(GcsError::GeometryMismatch {
                what: "output signal channels",
                expected: TIP_TILT_CHANNELS,
                actual: outputs,
            });
        }
        Ok(())
    }

    /// Third axis: servo off, open-loop value held at the pivot value.
    fn configure_pivot(&mut self) -> GcsResult<()> {
        let axes = self.ctrl.get_axes_identifiers()?;
        let pivot = axes
            .get(TIP_TILT_CHANNELS - 1)
            .cloned()
            .ok_or(GcsError::GeometryMismatch {
                what: "axes",
                expected: TIP_TILT_CHANNELS,
                actual: axes.len(),
            })?;
        let value = self.cfg.pivot_value();
        info!("Parking axis {pivot} as pivot at {value}");
        let pivot = [pivot];
        self.ctrl.set_servo_control_mode(&pivot, &[false])?;
        self.ctrl.set_open_loop_axis_value(&pivot, &[value])
    }

    fn stop_wave_generators(&mut self) -> GcsResult<()> {
        let generators = self.ctrl.get_number_of_wave_generators()?;
        self.ctrl
            .set_wave_generator_start_stop_mode(&vec![false; generators])
    }

    fn write_servo(&mut self, closed: bool) -> GcsResult<()> {
        self.ctrl
            .set_servo_control_mode(&self.axes, &[closed, closed])?;
        self.control_loop_enabled = closed;
        Ok(())
    }

    /// Release the session: stop the wave generators and disconnect.
    pub fn close(&mut self) -> GcsResult<()> {
        if self.state == SessionState::Uninitialized {
            return Ok(());
        }
        self.stop_wave_generators()?;
        self.modulation_enabled = false;
        self.ctrl.close_connection()?;
        self.state = SessionState::Uninitialized;
        info!("Tip-tilt session closed");
        Ok(())
    }

    // ==================== Control Loop ====================

    pub fn enable_control_loop(&mut self) -> GcsResult<()> {
        self.require_ready()?;
        self.write_servo(true)?;
        debug!("Control loop closed on A and B");
        Ok(())
    }

    pub fn disable_control_loop(&mut self) -> GcsResult<()> {
        self.require_ready()?;
        self.write_servo(false)?;
        debug!("Control loop opened on A and B");
        Ok(())
    }

    /// True only if both A and B report closed-loop operation.
    pub fn is_control_loop_enabled(&mut self) -> GcsResult<bool> {
        self.require_ready()?;
        let servo = self.ctrl.get_servo_control_mode(&self.axes)?;
        self.control_loop_enabled = servo.iter().all(|on| *on);
        Ok(self.control_loop_enabled)
    }

    // ==================== Position ====================

    /// Measured `[A, B]` position in milliradians.
    pub fn get_position(&mut self) -> GcsResult<[f64; 2]> {
        self.require_ready()?;
        let native = fixed(self.ctrl.get_position(&self.axes)?, "positions")?;
        Ok(self.cfg.native_to_physical(native))
    }

    /// Commanded `[A, B]` position in milliradians.
    pub fn get_target_position(&mut self) -> GcsResult<[f64; 2]> {
        self.require_ready()?;
        let native = fixed(self.ctrl.get_target_position(&self.axes)?, "targets")?;
        Ok(self.cfg.native_to_physical(native))
    }

    pub fn set_target_position(&mut self, position: [f64; 2]) -> GcsResult<()> {
        self.require_ready()?;
        check_finite("Target position", &position)?;
        let native = self.cfg.physical_to_native(position);
        debug!("Target {position:?} mrad -> {native:?}");
        self.ctrl.set_target_position(&self.axes, &native)
    }

    /// Output voltage of channels 1 to 3.
    pub fn get_voltages(&mut self) -> GcsResult<[f64; TIP_TILT_CHANNELS]> {
        self.require_ready()?;
        fixed(self.ctrl.get_voltages(&ALL_CHANNELS)?, "voltages")
    }

    // ==================== Open Loop ====================

    /// Drive A and B directly, in controller open-loop units.
    ///
    /// # Errors
    ///
    /// [`GcsError::UnsafeOperation`] while the control loop is closed.
    pub fn set_open_loop_value(&mut self, value: [f64; 2]) -> GcsResult<()> {
        if self.is_control_loop_enabled()? {
            return Err(GcsError::UnsafeOperation(
                "Open-loop value rejected while the control loop is closed".to_string(),
            ));
        }
        check_finite("Open-loop value", &value)?;
        self.ctrl.set_open_loop_axis_value(&self.axes, &value)
    }

    pub fn get_open_loop_value(&mut self) -> GcsResult<[f64; 2]> {
        self.require_ready()?;
        fixed(self.ctrl.get_open_loop_axis_value(&self.axes)?, "open-loop values")
    }

    // ==================== Modulation ====================

    /// Start a periodic sine-ramp motion of both axes.
    ///
    /// Each axis swings between `center - radius` and `center + radius`
    /// (milliradians) at `frequency_hz`. `phases` (radians) shift each axis
    /// within the period; the phase rounded to a wave table point plus half a
    /// period must fall before the end of the period, which is just below π.
    pub fn start_sinusoidal_modulation(
        &mut self,
        radii: [f64; 2],
        frequency_hz: f64,
        phases: [f64; 2],
        centers: [f64; 2],
    ) -> GcsResult<()> {
        self.require_ready()?;
        check_finite("Radius", &radii)?;
        check_finite("Phase", &phases)?;
        check_finite("Center", &centers)?;
        if !frequency_hz.is_finite() || frequency_hz <= 0.0 {
            return Err(GcsError::InvalidConfiguration(format!(
                "Modulation frequency must be positive, got {frequency_hz} Hz"
            )));
        }

        let sample_period = self.wave_generator_sample_period()?;
        let period_points = 1.0 / frequency_hz / sample_period;
        if !period_points.is_finite() || period_points.round() < MIN_WAVELENGTH_POINTS as f64 {
            return Err(GcsError::InvalidConfiguration(format!(
                "{frequency_hz} Hz is too fast for a {sample_period} s wave table sample period"
            )));
        }
        let max_points = self.ctrl.get_maximum_wave_table_length()?;
        if period_points.round() > max_points as f64 {
            return Err(GcsError::InvalidConfiguration(format!(
                "{frequency_hz} Hz is too slow: one period needs {period_points:.0} points, \
                 wave tables hold at most {max_points}"
            )));
        }
        let wavelength = period_points.round() as usize;
        let curve_center = wavelength / 2;
        debug!(
            "Sinusoid: {period_points:.3} points per period, rounded to {wavelength}, center {curve_center}"
        );

        let mut waveforms = Vec::with_capacity(2);
        for axis in TipTiltAxis::BOTH {
            let i = axis.index();
            let cal = self.cfg.calibration(axis);
            let valley = cal.to_native(centers[i] - radii[i]);
            let peak = cal.to_native(centers[i] + radii[i]);
            let start = (phases[i].rem_euclid(TAU) / TAU * wavelength as f64).round() as usize
                % wavelength;

            let waveform = SinusoidalWaveform {
                length_in_points: wavelength,
                amplitude: peak - valley,
                offset: valley,
                wavelength_in_points: wavelength,
                start_point: start,
                curve_center_point: curve_center,
            };
            waveform.validate().map_err(|_| {
                GcsError::InvalidConfiguration(format!(
                    "Phase {} rad of axis {} puts the peak outside the period \
                     (start {start} + center {curve_center} >= {wavelength} points; \
                     the phase must round to a start point before half the period)",
                    phases[i],
                    axis.identifier()
                ))
            })?;
            debug!("Axis {}: {waveform:?}", axis.identifier());
            waveforms.push(waveform);
        }

        self.run_modulation(|ctrl| {
            for (table, waveform) in MODULATION_TABLES.iter().zip(&waveforms) {
                ctrl.set_sinusoidal_waveform(*table, WaveTableMode::Clear, waveform)?;
            }
            Ok(())
        })?;
        info!(
            "Sinusoidal modulation started: radii {radii:?} mrad, {frequency_hz} Hz, \
             phases {phases:?} rad, centers {centers:?} mrad"
        );
        Ok(())
    }

    /// Play back explicit `A` and `B` trajectories, in milliradians, one point
    /// per wave table sample.
    pub fn start_freeform_modulation(
        &mut self,
        trajectory_a: &[f64],
        trajectory_b: &[f64],
    ) -> GcsResult<()> {
        self.require_ready()?;
        if trajectory_a.is_empty() || trajectory_b.is_empty() {
            return Err(GcsError::InvalidConfiguration(
                "Freeform trajectories must not be empty".to_string(),
            ));
        }
        check_finite("Trajectory A", trajectory_a)?;
        check_finite("Trajectory B", trajectory_b)?;
        let max_points = self.ctrl.get_maximum_wave_table_length()?;
        for (table, trajectory) in MODULATION_TABLES.iter().zip([trajectory_a, trajectory_b]) {
            check_wave_table_length(*table, trajectory.len(), max_points)?;
        }

        let native: Vec<Vec<f64>> = [(TipTiltAxis::A, trajectory_a), (TipTiltAxis::B, trajectory_b)]
            .into_iter()
            .map(|(axis, trajectory)| {
                let cal = self.cfg.calibration(axis);
                trajectory.iter().map(|p| cal.to_native(*p)).collect()
            })
            .collect();

        self.run_modulation(|ctrl| {
            for (table, points) in MODULATION_TABLES.iter().zip(&native) {
                ctrl.set_point_waveform(*table, WaveTableMode::Clear, points)?;
            }
            Ok(())
        })?;
        info!(
            "Freeform modulation started: {} points on A, {} points on B",
            trajectory_a.len(),
            trajectory_b.len()
        );
        Ok(())
    }

    /// Seconds per wave table point; every generator must use the same rate.
    fn wave_generator_sample_period(&mut self) -> GcsResult<f64> {
        let rates = self.ctrl.get_wave_generator_table_rate()?;
        let rate = *rates.first().ok_or_else(|| {
            GcsError::InvalidResponse("No wave generator table rates reported".to_string())
        })?;
        if rates.iter().any(|r| *r != rate) {
            return Err(GcsError::InvalidConfiguration(format!(
                "Wave generator table rates differ: {rates:?}"
            )));
        }
        let servo = self.ctrl.get_servo_update_time_in_seconds()?;
        Ok(servo * f64::from(rate))
    }

    /// Shared wave generator sequence: remember the rest position, stop the
    /// generators, reload tables 1 and 2, connect them 1:1 and start
    /// generators 1 and 2 only.
    fn run_modulation(&mut self, load: impl FnOnce(&mut C) -> GcsResult<()>) -> GcsResult<()> {
        if !self.modulation_enabled {
            self.target_before_modulation = Some(self.get_target_position()?);
        }

        let generators = self.ctrl.get_number_of_wave_generators()?;
        if generators < MODULATION_TABLES.len() {
            return Err(GcsError::GeometryMismatch {
                what: "wave generators",
                expected: MODULATION_TABLES.len(),
                actual: generators,
            });
        }
        self.ctrl
            .set_wave_generator_start_stop_mode(&vec![false; generators])?;
        self.modulation_enabled = false;

        self.ctrl.clear_wave_table_data(&WAVE_TABLES)?;
        load(&mut self.ctrl)?;
        self.ctrl
            .set_connection_of_wave_table_to_wave_generator(&MODULATION_TABLES, &MODULATION_TABLES)?;

        let running: Vec<bool> = (0..generators)
            .map(|i| i < MODULATION_TABLES.len())
            .collect();
        self.ctrl.set_wave_generator_start_stop_mode(&running)?;
        self.modulation_enabled = true;
        Ok(())
    }

    /// Stop the wave generators and return to the pre-modulation target.
    pub fn stop_modulation(&mut self) -> GcsResult<()> {
        self.require_ready()?;
        self.stop_wave_generators()?;
        self.modulation_enabled = false;
        if let Some(target) = self.target_before_modulation {
            self.set_target_position(target)?;
            self.target_before_modulation = None;
            info!("Modulation stopped, target restored to {target:?} mrad");
        }
        Ok(())
    }

    pub fn is_modulation_enabled(&self) -> bool {
        self.modulation_enabled
    }

    // ==================== Data Recording ====================

    pub fn get_data_recorder_configuration(&mut self) -> GcsResult<DataRecorderConfiguration> {
        self.require_ready()?;
        self.ctrl.get_data_recorder_configuration()
    }

    /// Seconds between recorded samples.
    pub fn get_recorded_data_time_step(&mut self) -> GcsResult<f64> {
        self.require_ready()?;
        let servo = self.ctrl.get_servo_update_time_in_seconds()?;
        let rate = self.ctrl.get_record_table_rate()?;
        Ok(servo * f64::from(rate))
    }

    /// Record `number_of_points` samples in sync with the wave generator.
    ///
    /// Without a configuration the A/B monitoring layout
    /// ([`DataRecorderConfiguration::tip_tilt_monitoring`]) is used. Row 0 of
    /// the result is time in seconds; row `k` is recorder table `k`. Position
    /// tables of axes A and B are converted to milliradians (position error is
    /// only scaled), everything else is returned as recorded.
    pub fn get_recorded_data(
        &mut self,
        number_of_points: usize,
        configuration: Option<&DataRecorderConfiguration>,
    ) -> GcsResult<Array2<f64>> {
        self.require_ready()?;
        if number_of_points == 0 {
            return Err(GcsError::InvalidConfiguration(
                "At least one recorded point is required".to_string(),
            ));
        }
        let default_cfg;
        let cfg = match configuration {
            Some(cfg) => cfg,
            None => {
                default_cfg = DataRecorderConfiguration::tip_tilt_monitoring();
                &default_cfg
            }
        };

        self.ctrl.set_data_recorder_configuration(cfg)?;
        self.ctrl.start_recording_in_sync_with_wave_generator()?;
        let time_step = self.get_recorded_data_time_step()?;
        let recorded = self.ctrl.get_recorded_data_values(number_of_points, 1)?;
        if recorded.ncols() != number_of_points {
            return Err(GcsError::InvalidResponse(format!(
                "Requested {number_of_points} samples, controller returned {}",
                recorded.ncols()
            )));
        }

        let tables = recorded.nrows();
        let mut data = Array2::zeros((tables + 1, number_of_points));
        data.row_mut(0)
            .assign(&Array1::from_shape_fn(number_of_points, |i| {
                i as f64 * time_step
            }));
        data.slice_mut(s![1.., ..]).assign(&recorded);

        for (table, source, option) in cfg.iter() {
            let row = table as usize;
            if !option.is_position() || row > tables {
                continue;
            }
            let Some(axis) = source.axis().and_then(TipTiltAxis::from_axis_id) else {
                continue;
            };
            let cal = *self.cfg.calibration(axis);
            if option == RecordOption::PositionError {
                data.row_mut(row).mapv_inplace(|v| v * cal.linear());
            } else {
                data.row_mut(row).mapv_inplace(|v| cal.to_physical(v));
            }
        }

        debug!("Recorded {number_of_points} samples from {tables} tables, dt {time_step} s");
        Ok(data)
    }

    // ==================== Status ====================

    pub fn status(&mut self) -> GcsResult<TipTiltStatus> {
        let position = self.get_position()?;
        let target = self.get_target_position()?;
        let output_voltage = self.get_voltages()?;
        let control_loop_closed = self.is_control_loop_enabled()?;
        let overflow = fixed(self.ctrl.get_overflow_state(&self.axes)?, "overflow flags")?;
        Ok(TipTiltStatus {
            position,
            target,
            output_voltage,
            control_loop_closed,
            overflow,
        })
    }
}

impl<C: CommandSet> Drop for TipTilt2Axis<C> {
    fn drop(&mut self) {
        if self.state == SessionState::Ready && self.modulation_enabled {
            if let Err(e) = self.stop_wave_generators() {
                warn!("Failed to stop tip-tilt modulation on drop: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pi::sim::SimulatedCommandSet;
    use approx::assert_relative_eq;

    fn ready_on(sim: SimulatedCommandSet) -> TipTilt2Axis<SimulatedCommandSet> {
        let mut cfg = TipTiltConfiguration::new();
        cfg.set_hostname("sim");
        cfg.set_calibration(TipTiltAxis::A, AxisCalibration::new(0.5, -2.0).unwrap());
        cfg.set_calibration(TipTiltAxis::B, AxisCalibration::new(-0.25, 1.0).unwrap());
        let mut tt = TipTilt2Axis::new(sim, cfg);
        tt.set_up().unwrap();
        tt
    }

    fn ready() -> TipTilt2Axis<SimulatedCommandSet> {
        ready_on(SimulatedCommandSet::new())
    }

    #[test]
    fn test_set_up_reaches_ready() {
        let tt = ready();
        assert_eq!(tt.state(), SessionState::Ready);
        assert_eq!(tt.command_set().hostname(), Some("sim"));
    }

    #[test]
    fn test_waveform_parameters() {
        let mut tt = ready();
        // 40 us servo cycle: 100 Hz is 250 points per period.
        let phases = [0.0, 0.5 * std::f64::consts::PI];
        tt.start_sinusoidal_modulation([1.0, 2.0], 100.0, phases, [3.0, -4.0])
            .unwrap();

        let a = tt.command_set().waveform(1).unwrap().to_vec();
        let b = tt.command_set().waveform(2).unwrap().to_vec();
        assert_eq!(a.len(), 250);
        assert_eq!(b.len(), 250);

        // A: valley (3 - 1 + 2) / 0.5 = 8, peak (3 + 1 + 2) / 0.5 = 12.
        assert_relative_eq!(a[0], 8.0, epsilon = 1e-9);
        assert_relative_eq!(a[125], 12.0, epsilon = 1e-9);
        // B: quarter-period shift, negative calibration inverts the swing.
        let valley_b = (-4.0 - 2.0 - 1.0) / -0.25;
        let peak_b = (-4.0 + 2.0 - 1.0) / -0.25;
        assert_relative_eq!(b[63], valley_b, epsilon = 1e-9);
        assert_relative_eq!(b[63 + 125], peak_b, epsilon = 1e-9);
    }

    #[test]
    fn test_phase_beyond_half_period_is_rejected() {
        let mut tt = ready();
        let err = tt
            .start_sinusoidal_modulation([1.0, 1.0], 100.0, [0.0, 4.0], [0.0, 0.0])
            .unwrap_err();
        assert!(matches!(err, GcsError::InvalidConfiguration(_)));
        assert!(!tt.is_modulation_enabled());
        assert!(tt.command_set().waveform(1).is_none());
    }

    #[test]
    fn test_phase_bound_follows_rounding() {
        let mut tt = ready();
        // 250 points: 3.12 rad starts at point 124, 3.13 rad rounds up to 125.
        tt.start_sinusoidal_modulation([1.0, 1.0], 100.0, [0.0, 3.12], [0.0, 0.0])
            .unwrap();
        tt.stop_modulation().unwrap();
        assert!(matches!(
            tt.start_sinusoidal_modulation([1.0, 1.0], 100.0, [0.0, 3.13], [0.0, 0.0]),
            Err(GcsError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_very_low_frequency_is_rejected() {
        let mut tt = ready();
        let err = tt
            .start_sinusoidal_modulation([1.0, 1.0], 1e-15, [0.0, 0.0], [0.0, 0.0])
            .unwrap_err();
        assert!(matches!(err, GcsError::InvalidConfiguration(_)));
        assert!(!tt.is_modulation_enabled());
        assert!(tt.command_set().waveform(1).is_none());
    }

    #[test]
    fn test_period_limited_by_wave_table_length() {
        let mut tt = ready_on(SimulatedCommandSet::new().with_max_wave_table_points(100));
        // 100 Hz needs 250 points per period.
        assert!(matches!(
            tt.start_sinusoidal_modulation([1.0, 1.0], 100.0, [0.0, 0.0], [0.0, 0.0]),
            Err(GcsError::InvalidConfiguration(_))
        ));
        assert!(tt.command_set().waveform(1).is_none());

        tt.start_sinusoidal_modulation([1.0, 1.0], 250.0, [0.0, 0.0], [0.0, 0.0])
            .unwrap();
        assert_eq!(tt.command_set().waveform(1).unwrap().len(), 100);
    }

    #[test]
    fn test_freeform_limited_by_wave_table_length() {
        let mut tt = ready_on(SimulatedCommandSet::new().with_max_wave_table_points(100));
        assert!(matches!(
            tt.start_freeform_modulation(&[0.0; 10], &[0.0; 101]),
            Err(GcsError::InvalidConfiguration(_))
        ));
        assert!(!tt.is_modulation_enabled());
        assert!(tt.command_set().waveform(1).is_none());

        tt.start_freeform_modulation(&[0.0; 100], &[0.0; 100])
            .unwrap();
        assert!(tt.is_modulation_enabled());
    }

    #[test]
    fn test_frequency_validation() {
        let mut tt = ready();
        for f in [0.0, -5.0, f64::NAN, 20_000.0] {
            assert!(tt
                .start_sinusoidal_modulation([1.0, 1.0], f, [0.0, 0.0], [0.0, 0.0])
                .is_err());
        }
    }

    #[test]
    fn test_divergent_table_rates_rejected() {
        let mut tt = ready();
        tt.command_set_mut()
            .set_generator_table_rate(2, 4)
            .unwrap();
        assert!(matches!(
            tt.start_sinusoidal_modulation([1.0, 1.0], 100.0, [0.0, 0.0], [0.0, 0.0]),
            Err(GcsError::InvalidConfiguration(_))
        ));
        assert!(!tt.is_modulation_enabled());
    }

    #[test]
    fn test_table_rate_stretches_period() {
        let mut tt = ready();
        tt.command_set_mut()
            .set_wave_generator_table_rate(5)
            .unwrap();
        tt.start_sinusoidal_modulation([1.0, 1.0], 100.0, [0.0, 0.0], [0.0, 0.0])
            .unwrap();
        assert_eq!(tt.command_set().waveform(1).unwrap().len(), 50);
    }

    #[test]
    fn test_recorded_positions_are_converted() {
        let mut tt = ready();
        tt.set_target_position([3.0, -4.0]).unwrap();

        let data = tt.get_recorded_data(4, None).unwrap();
        assert_eq!(data.dim(), (9, 4));
        assert_relative_eq!(data[[0, 3]], 3.0 * 40e-6, epsilon = 1e-15);
        // Real and target positions (tables 1, 2, 5, 6) come back in mrad.
        for row in [1, 5] {
            assert_relative_eq!(data[[row, 2]], 3.0, epsilon = 1e-9);
        }
        for row in [2, 6] {
            assert_relative_eq!(data[[row, 2]], -4.0, epsilon = 1e-9);
        }
        // Position error is zero in the simulator, before and after scaling.
        assert_eq!(data[[3, 0]], 0.0);
        // Table 7 is not configured.
        assert_eq!(data[[7, 0]], 0.0);
    }

    #[test]
    fn test_status_serializes_with_upper_case_fields() {
        let mut tt = ready();
        let status = tt.status().unwrap();
        assert!(status.control_loop_closed);
        assert_eq!(status.overflow, [false, false]);

        let json = serde_json::to_value(&status).unwrap();
        for key in ["POSITION", "TARGET", "OUTPUT_VOLTAGE", "CONTROL_LOOP_CLOSED", "OVERFLOW"] {
            assert!(json.get(key).is_some(), "missing {key}");
        }
    }

    #[test]
    fn test_close_returns_to_uninitialized() {
        let mut tt = ready();
        tt.start_sinusoidal_modulation([1.0, 1.0], 100.0, [0.0, 0.0], [0.0, 0.0])
            .unwrap();
        tt.close().unwrap();
        assert_eq!(tt.state(), SessionState::Uninitialized);
        assert!(!tt.is_modulation_enabled());
        assert!(!tt.command_set().is_connected());
        assert!(matches!(
            tt.get_position(),
            Err(GcsError::InvalidState { .. })
        ));
    }
}
