//! Command-line tool for a PI tip-tilt platform.
//!
//! Subcommands:
//! - `status`: Print position, target, voltages and loop state as JSON
//! - `info`: Controller version, axes and recorder layout
//! - `move`: Command an absolute or relative A/B target
//! - `loop`: Open or close the servo loop on A and B
//! - `open-loop`: Drive A and B directly while the loop is open
//! - `modulate`: Run a sinusoidal modulation for a fixed duration
//! - `stop`: Stop any running wave generator output
//! - `record`: Record A/B positions and write them as CSV
//!
//! Every subcommand runs the full set-up sequence first. Pass `--simulate` to
//! run against the in-memory controller.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use pi_tiptilt::pi::{
    CommandSet, DataRecorderConfiguration, SimulatedCommandSet, TipTilt2Axis, TipTiltArgs, E518,
};
use tracing::info;

/// Hostname reported by the simulated controller when none is configured.
const SIM_HOST: &str = "simulator";

/// PI tip-tilt platform control tool
#[derive(Parser, Debug)]
#[command(name = "tiptilt_tool")]
#[command(about = "Control a two-axis PI tip-tilt platform")]
#[command(version)]
struct Args {
    #[command(flatten)]
    tip_tilt: TipTiltArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LoopState {
    Open,
    Close,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the platform status as JSON
    Status,

    /// Query controller version, axes and data recorder configuration
    Info,

    /// Move A and B (milliradians)
    Move {
        /// Target (or offset with --relative) for axis A
        #[arg(allow_negative_numbers = true)]
        a: f64,

        /// Target (or offset with --relative) for axis B
        #[arg(allow_negative_numbers = true)]
        b: f64,

        /// Move relative to the current target
        #[arg(short, long)]
        relative: bool,
    },

    /// Open or close the servo loop on A and B
    Loop {
        #[arg(value_enum)]
        state: LoopState,
    },

    /// Set open-loop values on A and B (servo loop must be open)
    OpenLoop {
        #[arg(allow_negative_numbers = true)]
        a: f64,

        #[arg(allow_negative_numbers = true)]
        b: f64,
    },

    /// Run a sinusoidal modulation, then return to the rest position
    Modulate {
        /// Modulation radius of both axes in milliradians
        #[arg(short, long, default_value = "1.0")]
        radius: f64,

        /// Modulation frequency in Hz
        #[arg(short, long, default_value = "100.0")]
        frequency: f64,

        /// Phase of axis B relative to axis A in radians (just below π, rounded to a wave table point)
        #[arg(short, long, default_value = "1.5707963267948966")]
        phase: f64,

        /// Modulation center of axis A in milliradians
        #[arg(long, default_value = "0.0", allow_negative_numbers = true)]
        center_a: f64,

        /// Modulation center of axis B in milliradians
        #[arg(long, default_value = "0.0", allow_negative_numbers = true)]
        center_b: f64,

        /// How long to modulate, in seconds
        #[arg(short, long, default_value = "10.0")]
        duration: f64,
    },

    /// Stop any wave generator output
    Stop,

    /// Record A/B positions in sync with the wave generator
    Record {
        /// Number of samples per table
        #[arg(short = 'n', long, default_value = "1000")]
        points: usize,

        /// Output CSV file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let mut cfg = args
        .tip_tilt
        .configuration()
        .context("Failed to load tip-tilt configuration")?;

    if args.tip_tilt.simulate {
        if cfg.hostname().is_none() {
            cfg.set_hostname(SIM_HOST);
        }
        run(TipTilt2Axis::new(SimulatedCommandSet::new(), cfg), args.command)
    } else {
        if cfg.hostname().is_none() {
            bail!("No controller host given; use --host, a --config file or --simulate");
        }
        run(TipTilt2Axis::new(E518::new(), cfg), args.command)
    }
}

fn run<C: CommandSet>(mut tt: TipTilt2Axis<C>, command: Command) -> Result<()> {
    tt.set_up().context("Tip-tilt set-up failed")?;

    match command {
        Command::Status => {
            let status = tt.status()?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Command::Info => print_info(&mut tt)?,
        Command::Move { a, b, relative } => {
            let target = if relative {
                let current = tt.get_target_position()?;
                [current[0] + a, current[1] + b]
            } else {
                [a, b]
            };
            tt.set_target_position(target)?;
            info!("Target set to A={:.4} B={:.4} mrad", target[0], target[1]);
        }
        Command::Loop { state } => match state {
            LoopState::Open => tt.disable_control_loop()?,
            LoopState::Close => tt.enable_control_loop()?,
        },
        Command::OpenLoop { a, b } => {
            tt.set_open_loop_value([a, b])?;
            let value = tt.get_open_loop_value()?;
            info!("Open-loop value A={} B={}", value[0], value[1]);
        }
        Command::Modulate {
            radius,
            frequency,
            phase,
            center_a,
            center_b,
            duration,
        } => {
            if !duration.is_finite() || duration < 0.0 {
                bail!("Duration must be a non-negative number of seconds, got {duration}");
            }
            tt.start_sinusoidal_modulation(
                [radius, radius],
                frequency,
                [0.0, phase],
                [center_a, center_b],
            )?;
            info!("Modulating for {duration} s...");
            thread::sleep(Duration::from_secs_f64(duration));
            tt.stop_modulation()?;
        }
        Command::Stop => {
            tt.stop_modulation()?;
            info!("Wave generators stopped");
        }
        Command::Record { points, output } => {
            if points == 0 {
                bail!("Number of points must be positive");
            }
            let layout = DataRecorderConfiguration::tip_tilt_monitoring();
            let data = tt.get_recorded_data(points, Some(&layout))?;
            let headers = column_headers(&layout, data.nrows());
            match &output {
                Some(path) => {
                    let file = File::create(path)
                        .with_context(|| format!("Failed to create {}", path.display()))?;
                    write_csv(BufWriter::new(file), &headers, &data)?;
                    info!("Wrote {points} samples to {}", path.display());
                }
                None => write_csv(io::stdout().lock(), &headers, &data)?,
            }
        }
    }

    tt.close()?;
    Ok(())
}

fn print_info<C: CommandSet>(tt: &mut TipTilt2Axis<C>) -> Result<()> {
    let recorder = tt.get_data_recorder_configuration()?;
    let time_step = tt.get_recorded_data_time_step()?;
    let ctrl = tt.command_set_mut();
    let version = ctrl.get_version()?;
    let axes = ctrl.get_axes_identifiers()?;
    let tables = ctrl.get_number_of_recorder_tables()?;

    println!("Controller: {}", version.trim());
    println!(
        "Axes: {}",
        axes.iter().map(|a| a.as_str()).collect::<Vec<_>>().join(" ")
    );
    println!("Recorder: {tables} tables, {:.1} us per sample", time_step * 1e6);
    for (table, source, option) in recorder.iter() {
        println!("  table {table}: {option} of {source}");
    }
    Ok(())
}

/// `time_s` followed by one column per recorder table.
fn column_headers(layout: &DataRecorderConfiguration, rows: usize) -> Vec<String> {
    let mut headers = vec!["time_s".to_string()];
    for table in 1..rows as u32 {
        let name = match (
            layout.get_record_source(table),
            layout.get_record_option(table),
        ) {
            (Ok(source), Ok(option)) => {
                format!("{}_{}", option.to_string().replace(' ', "_"), source)
            }
            _ => format!("table_{table}"),
        };
        headers.push(name);
    }
    headers
}

fn write_csv<W: Write>(mut out: W, headers: &[String], data: &ndarray::Array2<f64>) -> Result<()> {
    writeln!(out, "{}", headers.join(","))?;
    for sample in data.columns() {
        let line = sample
            .iter()
            .map(|v| format!("{v:.9}"))
            .collect::<Vec<_>>()
            .join(",");
        writeln!(out, "{line}")?;
    }
    out.flush()?;
    Ok(())
}
