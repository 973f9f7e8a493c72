//! PI General Command Set (GCS) transport.
//!
//! GCS controllers speak a line-oriented ASCII protocol over TCP. Commands are
//! single lines; queries end in `?` and are answered with one or more lines.
//! Every line of a multi-line answer except the last ends with a space before
//! the line feed, which is how the end of an answer is detected.
//!
//! Commands do not acknowledge anything themselves. [`GcsDevice::command`]
//! follows each command with `ERR?` and turns a non-zero code into
//! [`GcsError::ControllerError`].

use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

use super::e518::PiErrorCode;
use super::session::SessionState;

/// Default GCS TCP port.
pub const DEFAULT_PORT: u16 = 50000;

/// Default timeout for connecting and for each controller answer.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(7);

/// Errors raised anywhere between the tip-tilt controller and the device.
#[derive(Error, Debug)]
pub enum GcsError {
    /// The controller could not be reached.
    #[error("Failed to connect to {addr}: {reason}")]
    Connection { addr: String, reason: String },

    /// A device operation was attempted before connecting.
    #[error("Not connected to a controller")]
    NotConnected,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The controller reported a non-zero error code after a command.
    #[error(
        "Controller error {code} ({}) after '{command}'",
        .error.map(PiErrorCode::description).unwrap_or("unknown error code")
    )]
    ControllerError {
        code: i32,
        error: Option<PiErrorCode>,
        command: String,
    },

    #[error("Timed out waiting for the controller")]
    Timeout,

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// A malformed identifier or value was passed in.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Parameters are individually well-formed but do not fit together.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The request would drive the actuator in a physically unsafe way.
    #[error("Unsafe operation: {0}")]
    UnsafeOperation(String),

    /// The controller does not have the tip-tilt channel/axis layout.
    #[error("Geometry mismatch: expected {expected} {what}, controller reports {actual}")]
    GeometryMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Tip-tilt session is {state}, operation requires {required}")]
    InvalidState {
        state: SessionState,
        required: SessionState,
    },
}

/// Result type for GCS operations.
pub type GcsResult<T> = Result<T, GcsError>;

impl GcsError {
    /// Build a [`GcsError::ControllerError`] from a raw controller code.
    pub fn controller(code: i32, command: impl Into<String>) -> Self {
        GcsError::ControllerError {
            code,
            error: PiErrorCode::from_code(code),
            command: command.into(),
        }
    }

    /// The decoded controller error, if this is a controller error.
    pub fn pi_error(&self) -> Option<PiErrorCode> {
        match self {
            GcsError::ControllerError { error, .. } => *error,
            _ => None,
        }
    }
}

/// A TCP connection to a GCS controller.
pub struct GcsDevice {
    addr: String,
    reader: BufReader<TcpStream>,
    writer: TcpStream,
    timeout: Duration,
}

impl GcsDevice {
    /// Connect to a controller at the given socket address (`host:port`).
    pub fn connect<A: ToSocketAddrs + ToString>(addr: A) -> GcsResult<Self> {
        let addr = addr.to_string();
        let (reader, writer) = Self::open(&addr, DEFAULT_TIMEOUT)?;
        debug!("GCS connection open to {addr}");
        Ok(Self {
            addr,
            reader,
            writer,
            timeout: DEFAULT_TIMEOUT,
        })
    }

    /// Connect to a controller on the default GCS port.
    pub fn connect_default_port(host: &str) -> GcsResult<Self> {
        Self::connect(format!("{host}:{DEFAULT_PORT}"))
    }

    fn open(addr: &str, timeout: Duration) -> GcsResult<(BufReader<TcpStream>, TcpStream)> {
        let connection_error = |reason: String| GcsError::Connection {
            addr: addr.to_string(),
            reason,
        };

        let socket_addr = addr
            .to_socket_addrs()
            .map_err(|e| connection_error(e.to_string()))?
            .next()
            .ok_or_else(|| connection_error("address did not resolve".to_string()))?;

        let stream = TcpStream::connect_timeout(&socket_addr, timeout)
            .map_err(|e| connection_error(e.to_string()))?;
        stream.set_read_timeout(Some(timeout))?;
        stream.set_write_timeout(Some(timeout))?;
        stream.set_nodelay(true)?;

        let reader = BufReader::new(stream.try_clone()?);
        Ok((reader, stream))
    }

    /// The address this device is connected to.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Set the timeout for each controller answer.
    pub fn set_timeout(&mut self, timeout: Duration) -> GcsResult<()> {
        self.writer.set_read_timeout(Some(timeout))?;
        self.writer.set_write_timeout(Some(timeout))?;
        self.timeout = timeout;
        Ok(())
    }

    /// Drop the socket and connect again to the same address.
    pub fn reconnect(&mut self) -> GcsResult<()> {
        let (reader, writer) = Self::open(&self.addr, self.timeout)?;
        self.reader = reader;
        self.writer = writer;
        debug!("GCS connection reopened to {}", self.addr);
        Ok(())
    }

    /// Send one line without reading anything back.
    pub fn send(&mut self, line: &str) -> GcsResult<()> {
        debug!("GCS >> {line}");
        self.writer.write_all(line.as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }

    /// Read one complete (possibly multi-line) answer.
    pub fn read(&mut self) -> GcsResult<String> {
        let mut response = String::new();
        loop {
            let mut line = String::new();
            let n = self.reader.read_line(&mut line).map_err(|e| match e.kind() {
                ErrorKind::WouldBlock | ErrorKind::TimedOut => GcsError::Timeout,
                _ => GcsError::Io(e),
            })?;
            if n == 0 {
                return Err(GcsError::InvalidResponse(
                    "connection closed by controller".to_string(),
                ));
            }

            let continues = line.ends_with(" \n");
            response.push_str(line.trim_end());
            response.push('\n');
            if !continues {
                break;
            }
        }
        debug!("GCS << {}", response.trim_end());
        Ok(response)
    }

    /// Send a query and return its answer.
    pub fn query(&mut self, query: &str) -> GcsResult<String> {
        self.send(query)?;
        self.read()
    }

    /// Send a command and check the controller error register afterwards.
    pub fn command(&mut self, command: &str) -> GcsResult<()> {
        self.send(command)?;
        let response = self.query("ERR?")?;
        let code = Self::parse_error_code(&response)?;
        if code == 0 {
            Ok(())
        } else {
            Err(GcsError::controller(code, command))
        }
    }

    // ==================== Response Parsing ====================

    /// Parse the answer to `ERR?`.
    pub fn parse_error_code(response: &str) -> GcsResult<i32> {
        response
            .trim()
            .parse()
            .map_err(|_| GcsError::InvalidResponse(format!("Invalid error code: {response}")))
    }

    /// Parse a single numeric answer such as `3`, `A=1.25` or `1 0x0E000200=4e-05`.
    pub fn parse_single_value(response: &str) -> GcsResult<f64> {
        let line = response
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .ok_or_else(|| GcsError::ParseError("Empty response".to_string()))?;
        let value = line.rsplit_once('=').map_or(line, |(_, v)| v);
        Self::parse_number(value)
    }

    /// Parse a single non-negative integer answer (counts, rates).
    pub fn parse_count(response: &str) -> GcsResult<usize> {
        let line = response.trim();
        let value = line.rsplit_once('=').map_or(line, |(_, v)| v).trim();
        value
            .parse()
            .map_err(|_| GcsError::ParseError(format!("Invalid count: {response}")))
    }

    /// Split an answer into `key=value` pairs, in answer order.
    ///
    /// Comment lines (starting with `#`) and blank lines are skipped.
    pub fn parse_key_values(response: &str) -> GcsResult<Vec<(String, String)>> {
        response
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .map(|l| {
                l.split_once('=')
                    .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
                    .ok_or_else(|| GcsError::ParseError(format!("Expected key=value, got '{l}'")))
            })
            .collect()
    }

    /// Parse one numeric value per requested item.
    ///
    /// Only the first token of each value is used, so `1=2 0` (value plus
    /// interpolation type) yields `2`.
    pub fn parse_values(response: &str, expected: usize) -> GcsResult<Vec<f64>> {
        let pairs = Self::parse_key_values(response)?;
        if pairs.len() != expected {
            return Err(GcsError::InvalidResponse(format!(
                "Expected {expected} values, got {}: {}",
                pairs.len(),
                response.trim()
            )));
        }
        pairs
            .iter()
            .map(|(_, v)| Self::parse_number(v.split_whitespace().next().unwrap_or("")))
            .collect()
    }

    /// Parse one `0`/`1` flag per requested item.
    pub fn parse_bools(response: &str, expected: usize) -> GcsResult<Vec<bool>> {
        Self::parse_values(response, expected)?
            .into_iter()
            .map(|v| {
                if v == 0.0 {
                    Ok(false)
                } else if v == 1.0 {
                    Ok(true)
                } else {
                    Err(GcsError::ParseError(format!("Expected 0 or 1, got {v}")))
                }
            })
            .collect()
    }

    fn parse_number(value: &str) -> GcsResult<f64> {
        value
            .trim()
            .parse()
            .map_err(|_| GcsError::ParseError(format!("Invalid number: '{value}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;
    use std::thread;

    #[test]
    fn test_parse_single_value() {
        assert_eq!(GcsDevice::parse_single_value("3\n").unwrap(), 3.0);
        assert_eq!(GcsDevice::parse_single_value("A=1.25\n").unwrap(), 1.25);
        assert_eq!(
            GcsDevice::parse_single_value("1 0x0E000200=4.000000e-05\n").unwrap(),
            4e-5
        );
        assert!(GcsDevice::parse_single_value("\n").is_err());
        assert!(GcsDevice::parse_single_value("A=abc").is_err());
    }

    #[test]
    fn test_parse_values_keeps_answer_order() {
        let values = GcsDevice::parse_values("B=2.5\nA=-1\n", 2).unwrap();
        assert_eq!(values, vec![2.5, -1.0]);

        let rates = GcsDevice::parse_values("1=3 0\n2=3 0\n3=3 0\n", 3).unwrap();
        assert_eq!(rates, vec![3.0, 3.0, 3.0]);

        assert!(matches!(
            GcsDevice::parse_values("A=1\n", 2),
            Err(GcsError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_parse_bools() {
        assert_eq!(
            GcsDevice::parse_bools("A=1\nB=0\n", 2).unwrap(),
            vec![true, false]
        );
        assert!(GcsDevice::parse_bools("A=2\n", 1).is_err());
    }

    #[test]
    fn test_parse_key_values_skips_comments() {
        let pairs = GcsDevice::parse_key_values("# header\n1=A 2\n\n2=B 3\n").unwrap();
        assert_eq!(
            pairs,
            vec![
                ("1".to_string(), "A 2".to_string()),
                ("2".to_string(), "B 3".to_string())
            ]
        );
        assert!(GcsDevice::parse_key_values("garbage").is_err());
    }

    #[test]
    fn test_controller_error_decodes_code() {
        let err = GcsError::controller(303, "SVA A 10");
        assert_eq!(err.pi_error(), Some(PiErrorCode::OpenLoopMotionWhenServoOn));
        assert!(err.to_string().contains("303"));

        let err = GcsError::controller(9999, "FOO");
        assert_eq!(err.pi_error(), None);
    }

    /// Minimal controller on a loopback socket answering a fixed script.
    fn spawn_controller(error_code: i32) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut writer = stream.try_clone().unwrap();
            let reader = BufReader::new(stream);
            for line in reader.lines() {
                let line = line.unwrap();
                let answer = match line.as_str() {
                    "SAI?" => "A \nB \nC\n".to_string(),
                    "ERR?" => format!("{error_code}\n"),
                    _ => continue,
                };
                writer.write_all(answer.as_bytes()).unwrap();
            }
        });
        addr
    }

    #[test]
    fn test_multiline_answer_over_tcp() {
        let addr = spawn_controller(0);
        let mut device = GcsDevice::connect(addr.as_str()).unwrap();
        let response = device.query("SAI?").unwrap();
        assert_eq!(response, "A\nB\nC\n");
        device.command("SVO A 1").unwrap();
    }

    #[test]
    fn test_command_reports_controller_error() {
        let addr = spawn_controller(303);
        let mut device = GcsDevice::connect(addr.as_str()).unwrap();
        let err = device.command("SVA A 10").unwrap_err();
        assert!(matches!(
            err,
            GcsError::ControllerError {
                code: 303,
                error: Some(PiErrorCode::OpenLoopMotionWhenServoOn),
                ..
            }
        ));
    }

    #[test]
    fn test_connect_failure_is_connection_error() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);
        assert!(matches!(
            GcsDevice::connect(addr.as_str()),
            Err(GcsError::Connection { .. })
        ));
    }
}
