//! Tip-tilt calibration and connection settings.
//!
//! Positions are converted between controller units and milliradians with a
//! per-axis affine map: `mrad = linear * native + offset`.

use std::path::{Path, PathBuf};

use clap::Args;
use serde::{Deserialize, Serialize};

use crate::pi::command_set::AxisId;
use crate::pi::gcs::{GcsError, GcsResult, DEFAULT_PORT};

/// Number of amplifier channels on a tip-tilt controller.
pub const TIP_TILT_CHANNELS: usize = 3;

/// The two driven axes of the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TipTiltAxis {
    A,
    B,
}

impl TipTiltAxis {
    pub const BOTH: [TipTiltAxis; 2] = [TipTiltAxis::A, TipTiltAxis::B];

    pub fn identifier(self) -> &'static str {
        match self {
            TipTiltAxis::A => "A",
            TipTiltAxis::B => "B",
        }
    }

    pub fn axis_id(self) -> AxisId {
        AxisId::from_static(self.identifier())
    }

    pub fn from_axis_id(axis: &AxisId) -> Option<Self> {
        Self::BOTH.into_iter().find(|a| a.identifier() == axis.as_str())
    }

    pub fn index(self) -> usize {
        match self {
            TipTiltAxis::A => 0,
            TipTiltAxis::B => 1,
        }
    }
}

/// Affine conversion between controller units and milliradians.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisCalibration {
    linear: f64,
    offset: f64,
}

impl Default for AxisCalibration {
    fn default() -> Self {
        Self::identity()
    }
}

impl AxisCalibration {
    pub fn new(linear: f64, offset: f64) -> GcsResult<Self> {
        let calibration = Self { linear, offset };
        calibration.validate()?;
        Ok(calibration)
    }

    pub const fn identity() -> Self {
        Self {
            linear: 1.0,
            offset: 0.0,
        }
    }

    pub fn linear(&self) -> f64 {
        self.linear
    }

    pub fn offset(&self) -> f64 {
        self.offset
    }

    fn validate(&self) -> GcsResult<()> {
        if !self.linear.is_finite() || !self.offset.is_finite() || self.linear == 0.0 {
            return Err(GcsError::InvalidConfiguration(format!(
                "Calibration needs a finite non-zero linear coefficient and finite offset \
                 (got linear={}, offset={})",
                self.linear, self.offset
            )));
        }
        Ok(())
    }

    pub fn to_physical(&self, native: f64) -> f64 {
        self.linear * native + self.offset
    }

    pub fn to_native(&self, physical: f64) -> f64 {
        (physical - self.offset) / self.linear
    }
}

/// Settings consumed by `TipTilt2Axis::set_up`.
///
/// Defaults: voltage limits 0 V to 100 V on every channel, pivot 100, unit
/// calibration on both axes, no hostname.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TipTiltConfiguration {
    hostname: Option<String>,
    port: u16,
    lower_voltage_limit: [f64; TIP_TILT_CHANNELS],
    upper_voltage_limit: [f64; TIP_TILT_CHANNELS],
    pivot_value: f64,
    axis_a: AxisCalibration,
    axis_b: AxisCalibration,
}

impl Default for TipTiltConfiguration {
    fn default() -> Self {
        Self {
            hostname: None,
            port: DEFAULT_PORT,
            lower_voltage_limit: [0.0; TIP_TILT_CHANNELS],
            upper_voltage_limit: [100.0; TIP_TILT_CHANNELS],
            pivot_value: 100.0,
            axis_a: AxisCalibration::identity(),
            axis_b: AxisCalibration::identity(),
        }
    }
}

impl TipTiltConfiguration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hostname(&self) -> Option<&str> {
        self.hostname.as_deref()
    }

    pub fn set_hostname(&mut self, hostname: impl Into<String>) {
        self.hostname = Some(hostname.into());
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn set_port(&mut self, port: u16) {
        self.port = port;
    }

    pub fn lower_voltage_limit(&self) -> [f64; TIP_TILT_CHANNELS] {
        self.lower_voltage_limit
    }

    pub fn upper_voltage_limit(&self) -> [f64; TIP_TILT_CHANNELS] {
        self.upper_voltage_limit
    }

    /// Set both voltage limit triples; each lower limit must not exceed its upper limit.
    pub fn set_voltage_limits(
        &mut self,
        lower: [f64; TIP_TILT_CHANNELS],
        upper: [f64; TIP_TILT_CHANNELS],
    ) -> GcsResult<()> {
        check_limits(&lower, &upper)?;
        self.lower_voltage_limit = lower;
        self.upper_voltage_limit = upper;
        Ok(())
    }

    pub fn pivot_value(&self) -> f64 {
        self.pivot_value
    }

    pub fn set_pivot_value(&mut self, value: f64) -> GcsResult<()> {
        if !value.is_finite() {
            return Err(GcsError::InvalidConfiguration(format!(
                "Pivot value must be finite, got {value}"
            )));
        }
        self.pivot_value = value;
        Ok(())
    }

    pub fn calibration(&self, axis: TipTiltAxis) -> &AxisCalibration {
        match axis {
            TipTiltAxis::A => &self.axis_a,
            TipTiltAxis::B => &self.axis_b,
        }
    }

    pub fn set_calibration(&mut self, axis: TipTiltAxis, calibration: AxisCalibration) {
        match axis {
            TipTiltAxis::A => self.axis_a = calibration,
            TipTiltAxis::B => self.axis_b = calibration,
        }
    }

    /// Convert an `[A, B]` pair from controller units to milliradians.
    pub fn native_to_physical(&self, native: [f64; 2]) -> [f64; 2] {
        TipTiltAxis::BOTH.map(|axis| self.calibration(axis).to_physical(native[axis.index()]))
    }

    /// Convert an `[A, B]` pair from milliradians to controller units.
    pub fn physical_to_native(&self, physical: [f64; 2]) -> [f64; 2] {
        TipTiltAxis::BOTH.map(|axis| self.calibration(axis).to_native(physical[axis.index()]))
    }

    pub fn validate(&self) -> GcsResult<()> {
        check_limits(&self.lower_voltage_limit, &self.upper_voltage_limit)?;
        if !self.pivot_value.is_finite() {
            return Err(GcsError::InvalidConfiguration(format!(
                "Pivot value must be finite, got {}",
                self.pivot_value
            )));
        }
        self.axis_a.validate()?;
        self.axis_b.validate()
    }

    /// Parse and validate a JSON document. Missing fields keep their defaults.
    pub fn from_json(json: &str) -> GcsResult<Self> {
        let cfg: Self = serde_json::from_str(json).map_err(|e| {
            GcsError::InvalidConfiguration(format!("Invalid tip-tilt configuration: {e}"))
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load_from_file(path: &Path) -> GcsResult<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}

fn check_limits(
    lower: &[f64; TIP_TILT_CHANNELS],
    upper: &[f64; TIP_TILT_CHANNELS],
) -> GcsResult<()> {
    for (channel, (lo, hi)) in lower.iter().zip(upper).enumerate() {
        if !lo.is_finite() || !hi.is_finite() || lo > hi {
            return Err(GcsError::InvalidConfiguration(format!(
                "Channel {} voltage limits [{lo}, {hi}] are invalid",
                channel + 1
            )));
        }
    }
    Ok(())
}

/// Command-line arguments for a tip-tilt controller connection.
///
/// Use with `#[command(flatten)]` in your CLI args struct.
#[derive(Args, Debug, Clone, Default)]
pub struct TipTiltArgs {
    /// Controller hostname or IP address.
    #[arg(
        long,
        help = "Tip-tilt controller hostname or IP address",
        long_help = "Hostname or IP address of the PI piezo controller driving the tip-tilt \
            platform. Overrides the hostname from --config."
    )]
    pub host: Option<String>,

    /// GCS TCP port.
    #[arg(long, help = "GCS TCP port (default 50000)")]
    pub port: Option<u16>,

    /// JSON calibration file.
    #[arg(
        long,
        help = "Tip-tilt configuration JSON file",
        long_help = "JSON file with voltage limits, pivot value and per-axis calibration \
            (linear/offset coefficients converting controller units to milliradians). \
            Fields that are left out keep their defaults."
    )]
    pub config: Option<PathBuf>,

    /// Run against the in-memory simulated controller.
    #[arg(long, help = "Use the simulated controller instead of hardware")]
    pub simulate: bool,
}

impl TipTiltArgs {
    /// Effective configuration: the `--config` file (or defaults), then
    /// `--host`/`--port` overrides.
    pub fn configuration(&self) -> GcsResult<TipTiltConfiguration> {
        let mut cfg = match &self.config {
            Some(path) => TipTiltConfiguration::load_from_file(path)?,
            None => TipTiltConfiguration::default(),
        };
        if let Some(host) = &self.host {
            cfg.set_hostname(host.clone());
        }
        if let Some(port) = self.port {
            cfg.set_port(port);
        }
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        tip_tilt: TipTiltArgs,
    }

    #[test]
    fn test_defaults() {
        let cfg = TipTiltConfiguration::default();
        assert_eq!(cfg.hostname(), None);
        assert_eq!(cfg.port(), 50000);
        assert_eq!(cfg.lower_voltage_limit(), [0.0; 3]);
        assert_eq!(cfg.upper_voltage_limit(), [100.0; 3]);
        assert_eq!(cfg.pivot_value(), 100.0);
        assert_eq!(cfg.calibration(TipTiltAxis::A), &AxisCalibration::identity());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_setters() {
        let mut cfg = TipTiltConfiguration::new();
        cfg.set_hostname("asdf");
        cfg.set_calibration(TipTiltAxis::A, AxisCalibration::new(12.2, -123.0).unwrap());
        cfg.set_calibration(TipTiltAxis::B, AxisCalibration::new(33e-3, 4.4).unwrap());

        assert_eq!(cfg.hostname(), Some("asdf"));
        assert_eq!(cfg.calibration(TipTiltAxis::A).linear(), 12.2);
        assert_eq!(cfg.calibration(TipTiltAxis::A).offset(), -123.0);
        assert_eq!(cfg.calibration(TipTiltAxis::B).linear(), 33e-3);
        assert_eq!(cfg.calibration(TipTiltAxis::B).offset(), 4.4);

        assert!(cfg.set_voltage_limits([0.0; 3], [100.0, -1.0, 100.0]).is_err());
        assert!(cfg.set_pivot_value(f64::NAN).is_err());
        assert_eq!(cfg.upper_voltage_limit(), [100.0; 3]);
    }

    #[test]
    fn test_zero_linear_coefficient_rejected() {
        assert!(matches!(
            AxisCalibration::new(0.0, 1.0),
            Err(GcsError::InvalidConfiguration(_))
        ));
        assert!(AxisCalibration::new(f64::INFINITY, 0.0).is_err());
    }

    #[test]
    fn test_conversion_round_trip() {
        let cal = AxisCalibration::new(33e-3, 4.4).unwrap();
        for x in [-250.0, -1.5, 0.0, 0.1, 12.5, 1e4] {
            assert_relative_eq!(cal.to_physical(cal.to_native(x)), x, epsilon = 1e-9);
            assert_relative_eq!(cal.to_native(cal.to_physical(x)), x, epsilon = 1e-9);
        }
        assert_relative_eq!(cal.to_physical(100.0), 7.7, epsilon = 1e-12);
    }

    #[test]
    fn test_pair_conversion() {
        let mut cfg = TipTiltConfiguration::new();
        cfg.set_calibration(TipTiltAxis::A, AxisCalibration::new(2.0, 1.0).unwrap());
        cfg.set_calibration(TipTiltAxis::B, AxisCalibration::new(-0.5, 0.0).unwrap());

        assert_eq!(cfg.native_to_physical([10.0, 10.0]), [21.0, -5.0]);
        assert_eq!(cfg.physical_to_native([21.0, -5.0]), [10.0, 10.0]);
    }

    #[test]
    fn test_from_json_partial_document() {
        let json = r#"{
            "hostname": "192.168.29.117",
            "axis_b": { "linear": 0.02, "offset": -1.0 },
            "upper_voltage_limit": [80.0, 80.0, 100.0]
        }"#;
        let cfg = TipTiltConfiguration::from_json(json).unwrap();
        assert_eq!(cfg.hostname(), Some("192.168.29.117"));
        assert_eq!(cfg.port(), DEFAULT_PORT);
        assert_eq!(cfg.upper_voltage_limit(), [80.0, 80.0, 100.0]);
        assert_eq!(cfg.calibration(TipTiltAxis::B).linear(), 0.02);
        assert_eq!(cfg.calibration(TipTiltAxis::A), &AxisCalibration::identity());
    }

    #[test]
    fn test_from_json_rejects_bad_values() {
        assert!(TipTiltConfiguration::from_json(r#"{"axis_a": {"linear": 0.0, "offset": 0.0}}"#)
            .is_err());
        assert!(
            TipTiltConfiguration::from_json(r#"{"lower_voltage_limit": [50.0, 0.0, 0.0], "upper_voltage_limit": [10.0, 100.0, 100.0]}"#)
                .is_err()
        );
        assert!(TipTiltConfiguration::from_json("not json").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("tiptilt_cfg_{}.json", std::process::id()));
        std::fs::write(&path, r#"{"pivot_value": 42.0, "port": 50001}"#).unwrap();
        let cfg = TipTiltConfiguration::load_from_file(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(cfg.pivot_value(), 42.0);
        assert_eq!(cfg.port(), 50001);
        assert!(TipTiltConfiguration::load_from_file(&path).is_err());
    }

    #[test]
    fn test_args_override() {
        let cli = TestCli::parse_from(["test", "--host", "tt-ctrl", "--port", "50010"]);
        let cfg = cli.tip_tilt.configuration().unwrap();
        assert_eq!(cfg.hostname(), Some("tt-ctrl"));
        assert_eq!(cfg.port(), 50010);
        assert!(!cli.tip_tilt.simulate);

        let cli = TestCli::parse_from(["test", "--simulate"]);
        assert!(cli.tip_tilt.simulate);
        assert_eq!(cli.tip_tilt.configuration().unwrap().hostname(), None);
    }

    #[test]
    fn test_axis_identifiers() {
        assert_eq!(TipTiltAxis::A.axis_id().as_str(), "A");
        assert_eq!(
            TipTiltAxis::from_axis_id(&AxisId::new("B").unwrap()),
            Some(TipTiltAxis::B)
        );
        assert_eq!(TipTiltAxis::from_axis_id(&AxisId::new("C").unwrap()), None);
    }
}
