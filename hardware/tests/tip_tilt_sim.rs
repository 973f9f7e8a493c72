//! Tip-tilt controller against the simulated GCS controller.

use approx::assert_relative_eq;
use pi_tiptilt::pi::{
    AxisCalibration, AxisId, Channel, CommandSet, DataRecorderConfiguration, GcsError,
    RecordOption, RecorderTrigger, SessionState, SimulatedCommandSet, TipTilt2Axis, TipTiltAxis,
    TipTiltConfiguration,
};

fn configuration() -> TipTiltConfiguration {
    let mut cfg = TipTiltConfiguration::new();
    cfg.set_hostname("tiptilt.local");
    cfg
}

fn ready_with(cfg: TipTiltConfiguration) -> TipTilt2Axis<SimulatedCommandSet> {
    let mut tt = TipTilt2Axis::new(SimulatedCommandSet::new(), cfg);
    tt.set_up().unwrap();
    tt
}

fn ready() -> TipTilt2Axis<SimulatedCommandSet> {
    ready_with(configuration())
}

fn axes(ids: &str) -> Vec<AxisId> {
    AxisId::parse_list(ids).unwrap()
}

fn all_channels() -> Vec<Channel> {
    (1..=3).map(|n| Channel::new(n).unwrap()).collect()
}

#[test]
fn test_set_up_applies_limits_and_pivot() {
    let mut cfg = configuration();
    cfg.set_voltage_limits([-10.0, -10.0, 0.0], [110.0, 110.0, 100.0])
        .unwrap();
    cfg.set_pivot_value(55.0).unwrap();
    let mut tt = ready_with(cfg);

    assert_eq!(tt.state(), SessionState::Ready);
    let sim = tt.command_set_mut();
    assert_eq!(sim.hostname(), Some("tiptilt.local"));
    assert_eq!(
        sim.get_lower_voltage_limit(&all_channels()).unwrap(),
        vec![-10.0, -10.0, 0.0]
    );
    assert_eq!(
        sim.get_upper_voltage_limit(&all_channels()).unwrap(),
        vec![110.0, 110.0, 100.0]
    );
    assert_eq!(sim.get_open_loop_axis_value(&axes("C")).unwrap(), vec![55.0]);
    assert_eq!(
        sim.get_servo_control_mode(&axes("A B C")).unwrap(),
        vec![true, true, false]
    );
    assert_eq!(
        sim.get_wave_generator_start_stop_mode().unwrap(),
        vec![false, false, false]
    );
}

#[test]
fn test_operations_require_set_up() {
    let mut tt = TipTilt2Axis::new(SimulatedCommandSet::new(), configuration());
    assert_eq!(tt.state(), SessionState::Uninitialized);

    let err = tt.set_target_position([0.0, 0.0]).unwrap_err();
    assert!(matches!(
        err,
        GcsError::InvalidState {
            state: SessionState::Uninitialized,
            required: SessionState::Ready,
        }
    ));
    assert!(tt.get_position().is_err());
    assert!(tt.enable_control_loop().is_err());
    assert!(tt.get_recorded_data(10, None).is_err());
    assert!(tt
        .start_sinusoidal_modulation([1.0, 1.0], 10.0, [0.0, 0.0], [0.0, 0.0])
        .is_err());
}

#[test]
fn test_set_up_without_hostname_fails() {
    let mut tt = TipTilt2Axis::new(SimulatedCommandSet::new(), TipTiltConfiguration::new());
    assert!(matches!(
        tt.set_up(),
        Err(GcsError::InvalidConfiguration(_))
    ));
    assert_eq!(tt.state(), SessionState::Uninitialized);
    assert!(!tt.command_set().is_connected());
}

#[test]
fn test_set_up_rejects_channel_geometry() {
    let sim = SimulatedCommandSet::new().with_signal_channels(2, 3);
    let mut tt = TipTilt2Axis::new(sim, configuration());

    let err = tt.set_up().unwrap_err();
    assert!(matches!(
        err,
        GcsError::GeometryMismatch {
            expected: 3,
            actual: 2,
            ..
        }
    ));
    assert_eq!(tt.state(), SessionState::Connected);
    assert!(tt.get_position().is_err());
}

#[test]
fn test_control_loop_toggle() {
    let mut tt = ready();
    assert!(tt.is_control_loop_enabled().unwrap());

    tt.disable_control_loop().unwrap();
    assert!(!tt.is_control_loop_enabled().unwrap());
    assert_eq!(
        tt.command_set_mut()
            .get_servo_control_mode(&axes("A B"))
            .unwrap(),
        vec![false, false]
    );

    tt.enable_control_loop().unwrap();
    assert!(tt.is_control_loop_enabled().unwrap());
}

#[test]
fn test_target_round_trip_through_calibration() {
    let mut cfg = configuration();
    cfg.set_calibration(TipTiltAxis::A, AxisCalibration::new(2.0, 1.0).unwrap());
    cfg.set_calibration(TipTiltAxis::B, AxisCalibration::new(-0.5, 0.0).unwrap());
    let mut tt = ready_with(cfg);

    tt.set_target_position([5.0, -3.0]).unwrap();

    let native = tt
        .command_set_mut()
        .get_target_position(&axes("A B"))
        .unwrap();
    assert_relative_eq!(native[0], 2.0, epsilon = 1e-12);
    assert_relative_eq!(native[1], 6.0, epsilon = 1e-12);

    let target = tt.get_target_position().unwrap();
    assert_relative_eq!(target[0], 5.0, epsilon = 1e-12);
    assert_relative_eq!(target[1], -3.0, epsilon = 1e-12);

    // Closed loop: the simulated axis sits on its target.
    let position = tt.get_position().unwrap();
    assert_relative_eq!(position[0], 5.0, epsilon = 1e-12);
    assert_relative_eq!(position[1], -3.0, epsilon = 1e-12);

    assert!(tt.set_target_position([f64::NAN, 0.0]).is_err());
}

#[test]
fn test_open_loop_requires_open_servo_loop() {
    let mut tt = ready();
    assert!(matches!(
        tt.set_open_loop_value([10.0, 20.0]),
        Err(GcsError::UnsafeOperation(_))
    ));

    tt.disable_control_loop().unwrap();
    tt.set_open_loop_value([10.0, 20.0]).unwrap();
    assert_eq!(tt.get_open_loop_value().unwrap(), [10.0, 20.0]);
    assert_eq!(tt.get_voltages().unwrap(), [10.0, 20.0, 100.0]);
}

#[test]
fn test_modulation_starts_generators_one_and_two() {
    let mut tt = ready();
    tt.start_sinusoidal_modulation([1.0, 1.0], 50.0, [0.0, 1.0], [0.0, 0.0])
        .unwrap();
    assert!(tt.is_modulation_enabled());

    let sim = tt.command_set_mut();
    assert_eq!(
        sim.get_wave_generator_start_stop_mode().unwrap(),
        vec![true, true, false]
    );
    assert_eq!(
        sim.get_connection_of_wave_table_to_wave_generator(&[1, 2])
            .unwrap(),
        vec![1, 2]
    );
    // 50 Hz at 40 us per point.
    assert_eq!(sim.waveform(1).map(<[f64]>::len), Some(500));
    assert_eq!(sim.waveform(2).map(<[f64]>::len), Some(500));
    assert!(sim.waveform(3).is_none());
}

#[test]
fn test_stop_modulation_restores_rest_target() {
    let mut tt = ready();
    tt.set_target_position([1.0, 2.0]).unwrap();

    tt.start_sinusoidal_modulation([1.0, 1.0], 100.0, [0.0, 0.0], [0.0, 0.0])
        .unwrap();
    // The generator output (the valley of the swing) is now the target.
    assert_relative_eq!(tt.get_target_position().unwrap()[0], -1.0, epsilon = 1e-12);

    // Restarting keeps the original rest target.
    tt.start_sinusoidal_modulation([0.5, 0.5], 100.0, [0.0, 0.0], [0.0, 0.0])
        .unwrap();

    tt.stop_modulation().unwrap();
    assert!(!tt.is_modulation_enabled());
    assert_eq!(tt.get_target_position().unwrap(), [1.0, 2.0]);
    assert_eq!(
        tt.command_set_mut()
            .get_wave_generator_start_stop_mode()
            .unwrap(),
        vec![false, false, false]
    );

    // Nothing left to restore.
    tt.set_target_position([4.0, 4.0]).unwrap();
    tt.stop_modulation().unwrap();
    assert_eq!(tt.get_target_position().unwrap(), [4.0, 4.0]);
}

#[test]
fn test_freeform_modulation_is_converted_to_native() {
    let mut cfg = configuration();
    cfg.set_calibration(TipTiltAxis::A, AxisCalibration::new(2.0, 0.0).unwrap());
    let mut tt = ready_with(cfg);

    tt.start_freeform_modulation(&[0.0, 2.0, 4.0], &[3.0])
        .unwrap();
    assert!(tt.is_modulation_enabled());
    assert_eq!(tt.command_set().waveform(1), Some(&[0.0, 1.0, 2.0][..]));
    assert_eq!(tt.command_set().waveform(2), Some(&[3.0][..]));

    // Recording replays the running tables, back in milliradians.
    let data = tt.get_recorded_data(5, None).unwrap();
    assert_eq!(data.row(1).to_vec(), vec![0.0, 2.0, 4.0, 0.0, 2.0]);
    assert_eq!(data.row(2).to_vec(), vec![3.0; 5]);

    assert!(tt.start_freeform_modulation(&[], &[1.0]).is_err());
}

#[test]
fn test_recorded_data_shape_and_trigger() {
    let mut tt = ready();
    assert_eq!(tt.command_set().recording_trigger_count(), 0);

    let data = tt.get_recorded_data(10, None).unwrap();
    assert_eq!(data.dim(), (9, 10));
    assert_eq!(tt.command_set().recording_trigger_count(), 1);

    let dt = tt.get_recorded_data_time_step().unwrap();
    assert_relative_eq!(dt, 40e-6, epsilon = 1e-15);
    for i in 0..10 {
        assert_relative_eq!(data[[0, i]], i as f64 * dt, epsilon = 1e-15);
    }

    assert!(matches!(
        tt.get_recorded_data(0, None),
        Err(GcsError::InvalidConfiguration(_))
    ));
}

#[test]
fn test_recorded_voltages_are_not_converted() {
    let mut cfg = configuration();
    cfg.set_calibration(TipTiltAxis::A, AxisCalibration::new(2.0, 0.0).unwrap());
    let mut tt = ready_with(cfg);
    tt.set_target_position([84.0, 0.0]).unwrap();

    let mut layout = DataRecorderConfiguration::new();
    layout
        .set_table(1, Channel::new(1).unwrap(), RecordOption::OutputVoltage)
        .unwrap();
    layout
        .set_table(2, AxisId::new("A").unwrap(), RecordOption::TargetPosition)
        .unwrap();

    let data = tt.get_recorded_data(3, Some(&layout)).unwrap();
    assert_eq!(data.row(1).to_vec(), vec![42.0; 3]);
    assert_eq!(data.row(2).to_vec(), vec![84.0; 3]);
    assert_eq!(tt.get_data_recorder_configuration().unwrap(), layout);
}

#[test]
fn test_status_snapshot() {
    let mut cfg = configuration();
    cfg.set_pivot_value(30.0).unwrap();
    let mut tt = ready_with(cfg);
    tt.set_target_position([12.0, 7.5]).unwrap();

    let status = tt.status().unwrap();
    assert_eq!(status.position, [12.0, 7.5]);
    assert_eq!(status.target, [12.0, 7.5]);
    assert_eq!(status.output_voltage, [12.0, 7.5, 30.0]);
    assert!(status.control_loop_closed);

    let json = serde_json::to_value(&status).unwrap();
    assert_eq!(json["CONTROL_LOOP_CLOSED"], serde_json::json!(true));
    assert_eq!(json["TARGET"], serde_json::json!([12.0, 7.5]));
}

#[test]
fn test_recorder_trigger_and_echo_through_command_set() {
    let mut tt = ready();
    let sim = tt.command_set_mut();

    sim.set_data_recorder_trigger_source(RecorderTrigger::PositionChange, 0)
        .unwrap();
    assert_eq!(
        sim.get_data_recorder_trigger_source().unwrap(),
        (RecorderTrigger::PositionChange, 0)
    );
    assert_eq!(sim.echo("tip-tilt").unwrap(), "tip-tilt");
    assert_eq!(sim.gcs_command("VER?").unwrap(), sim.get_version().unwrap());
    assert!(sim
        .get_all_data_recorder_options()
        .unwrap()
        .iter()
        .any(|(code, _)| *code == 1));
}

#[test]
fn test_tiny_frequency_fails_cleanly() {
    let mut tt = ready();
    assert!(matches!(
        tt.start_sinusoidal_modulation([1.0, 1.0], 1e-15, [0.0, 0.0], [0.0, 0.0]),
        Err(GcsError::InvalidConfiguration(_))
    ));
    assert!(!tt.is_modulation_enabled());
    assert_eq!(tt.state(), SessionState::Ready);
}
