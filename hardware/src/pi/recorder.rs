//! Data recorder configuration.
//!
//! A recorder table samples one quantity ([`RecordOption`]) of one source
//! (an axis or a channel) every record-rate servo cycles. Table ids are
//! 1-based, as on the controller.

use std::fmt;

use strum::{Display, EnumIter, IntoEnumIterator};

use super::command_set::{AxisId, Channel};
use super::gcs::{GcsError, GcsResult};

/// Quantities the recorder can sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum RecordOption {
    #[strum(to_string = "target position")]
    TargetPosition,
    #[strum(to_string = "real position")]
    RealPosition,
    #[strum(to_string = "position error")]
    PositionError,
    #[strum(to_string = "control voltage")]
    ControlVoltage,
    #[strum(to_string = "control output")]
    ControlOutput,
    #[strum(to_string = "output voltage")]
    OutputVoltage,
    /// A device-reported option code outside this enumeration.
    #[strum(to_string = "unknown")]
    Unknown,
}

/// Whether a record option samples an axis or a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Axis,
    Channel,
}

impl RecordOption {
    /// GCS record option code (`DRC` argument).
    pub fn code(self) -> Option<u32> {
        match self {
            RecordOption::TargetPosition => Some(1),
            RecordOption::RealPosition => Some(2),
            RecordOption::PositionError => Some(3),
            RecordOption::ControlVoltage => Some(7),
            RecordOption::ControlOutput => Some(15),
            RecordOption::OutputVoltage => Some(16),
            RecordOption::Unknown => None,
        }
    }

    /// Decode a device-reported code; unrecognised codes become `Unknown`.
    pub fn from_code(code: u32) -> Self {
        Self::iter()
            .find(|opt| opt.code() == Some(code))
            .unwrap_or(RecordOption::Unknown)
    }

    /// Strict decode, used when the caller supplies the code.
    pub fn try_from_code(code: u32) -> GcsResult<Self> {
        match Self::from_code(code) {
            RecordOption::Unknown => Err(GcsError::InvalidConfiguration(format!(
                "Unknown record option {code}. Valid options: {}",
                Self::known_codes()
            ))),
            opt => Ok(opt),
        }
    }

    fn known_codes() -> String {
        Self::iter()
            .filter_map(RecordOption::code)
            .map(|c| c.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn source_kind(self) -> Option<SourceKind> {
        match self {
            RecordOption::ControlVoltage | RecordOption::OutputVoltage => Some(SourceKind::Channel),
            RecordOption::Unknown => None,
            _ => Some(SourceKind::Axis),
        }
    }

    /// Target, real position and position error are expressed in axis
    /// position units.
    pub fn is_position(self) -> bool {
        matches!(
            self,
            RecordOption::TargetPosition | RecordOption::RealPosition | RecordOption::PositionError
        )
    }
}

/// Event that starts a recording (`DRT` trigger source).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum RecorderTrigger {
    /// Wave generator start (`WGO`/`WGR`) or a step/impulse command.
    #[strum(to_string = "default")]
    Default,
    /// Any command that changes a position (`MOV`, `MVR`, `SVA`, `SVR`, ...).
    #[strum(to_string = "position change")]
    PositionChange,
    /// The next command; the trigger resets after it ran.
    #[strum(to_string = "next command")]
    NextCommand,
    /// A device-reported trigger code outside this enumeration.
    #[strum(to_string = "unknown")]
    Unknown,
}

impl RecorderTrigger {
    pub fn code(self) -> Option<u32> {
        match self {
            RecorderTrigger::Default => Some(0),
            RecorderTrigger::PositionChange => Some(1),
            RecorderTrigger::NextCommand => Some(2),
            RecorderTrigger::Unknown => None,
        }
    }

    pub fn from_code(code: u32) -> Self {
        Self::iter()
            .find(|t| t.code() == Some(code))
            .unwrap_or(RecorderTrigger::Unknown)
    }

    /// Code to send with `DRT`; `Unknown` cannot be sent.
    pub(crate) fn require_code(self) -> GcsResult<u32> {
        self.code().ok_or_else(|| {
            GcsError::InvalidConfiguration("Unknown recorder trigger source".to_string())
        })
    }
}

/// What a recorder table samples from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RecordSource {
    Axis(AxisId),
    Channel(Channel),
}

impl RecordSource {
    pub fn kind(&self) -> SourceKind {
        match self {
            RecordSource::Axis(_) => SourceKind::Axis,
            RecordSource::Channel(_) => SourceKind::Channel,
        }
    }

    pub fn axis(&self) -> Option<&AxisId> {
        match self {
            RecordSource::Axis(axis) => Some(axis),
            RecordSource::Channel(_) => None,
        }
    }
}

impl From<AxisId> for RecordSource {
    fn from(axis: AxisId) -> Self {
        RecordSource::Axis(axis)
    }
}

impl From<Channel> for RecordSource {
    fn from(channel: Channel) -> Self {
        RecordSource::Channel(channel)
    }
}

impl fmt::Display for RecordSource {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RecordSource::Axis(axis) => write!(f, "{axis}"),
            RecordSource::Channel(channel) => write!(f, "{channel}"),
        }
    }
}

/// Mapping from recorder table id to `(source, option)`, in insertion order.
///
/// The default configuration is [`DataRecorderConfiguration::tip_tilt_monitoring`].
#[derive(Debug, Clone, PartialEq)]
pub struct DataRecorderConfiguration {
    tables: Vec<(u32, RecordSource, RecordOption)>,
}

impl DataRecorderConfiguration {
    /// An empty configuration.
    pub fn new() -> Self {
        Self { tables: Vec::new() }
    }

    /// Real position, position error and target position of axes A and B
    /// in tables 1 to 6.
    pub fn tip_tilt_monitoring() -> Self {
        let a = AxisId::from_static("A");
        let b = AxisId::from_static("B");
        let layout = [
            (1, &a, RecordOption::RealPosition),
            (2, &b, RecordOption::RealPosition),
            (3, &a, RecordOption::PositionError),
            (4, &b, RecordOption::PositionError),
            (5, &a, RecordOption::TargetPosition),
            (6, &b, RecordOption::TargetPosition),
        ];
        Self {
            tables: layout
                .into_iter()
                .map(|(id, axis, opt)| (id, RecordSource::Axis(axis.clone()), opt))
                .collect(),
        }
    }

    /// Configure one table, replacing any previous entry for `table_id`.
    pub fn set_table(
        &mut self,
        table_id: u32,
        source: impl Into<RecordSource>,
        option: RecordOption,
    ) -> GcsResult<()> {
        let source = source.into();
        if table_id == 0 {
            return Err(GcsError::InvalidConfiguration(
                "Recorder table ids start at 1".to_string(),
            ));
        }
        let kind = option.source_kind().ok_or_else(|| {
            GcsError::InvalidConfiguration(format!(
                "Unknown record option for table {table_id}. Valid options: {}",
                RecordOption::known_codes()
            ))
        })?;
        if kind != source.kind() {
            return Err(GcsError::InvalidConfiguration(format!(
                "Record option '{option}' needs a {kind:?} source, got '{source}'"
            )));
        }
        self.insert(table_id, source, option);
        Ok(())
    }

    /// Configure one table from a numeric GCS option code.
    pub fn set_table_code(
        &mut self,
        table_id: u32,
        source: impl Into<RecordSource>,
        option_code: u32,
    ) -> GcsResult<()> {
        let option = RecordOption::try_from_code(option_code)?;
        self.set_table(table_id, source, option)
    }

    /// Store a configuration read back from a controller without validation.
    pub(crate) fn record_from_device(
        &mut self,
        table_id: u32,
        source: RecordSource,
        option: RecordOption,
    ) {
        self.insert(table_id, source, option);
    }

    fn insert(&mut self, table_id: u32, source: RecordSource, option: RecordOption) {
        match self.tables.iter_mut().find(|(id, _, _)| *id == table_id) {
            Some(entry) => *entry = (table_id, source, option),
            None => self.tables.push((table_id, source, option)),
        }
    }

    fn entry(&self, table_id: u32) -> GcsResult<&(u32, RecordSource, RecordOption)> {
        self.tables
            .iter()
            .find(|(id, _, _)| *id == table_id)
            .ok_or_else(|| {
                GcsError::InvalidConfiguration(format!("Recorder table {table_id} is not configured"))
            })
    }

    pub fn get_record_source(&self, table_id: u32) -> GcsResult<&RecordSource> {
        self.entry(table_id).map(|(_, source, _)| source)
    }

    pub fn get_record_option(&self, table_id: u32) -> GcsResult<RecordOption> {
        self.entry(table_id).map(|(_, _, option)| *option)
    }

    pub fn get_table_ids(&self) -> Vec<u32> {
        self.tables.iter().map(|(id, _, _)| *id).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &RecordSource, RecordOption)> {
        self.tables.iter().map(|(id, source, opt)| (*id, source, *opt))
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

impl Default for DataRecorderConfiguration {
    fn default() -> Self {
        Self::tip_tilt_monitoring()
    }
}
