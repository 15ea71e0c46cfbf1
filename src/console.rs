//! Serial console adapter for the device under test.
//!
//! Blocking line-oriented reader over the board's UART console, with
//! regex-based waiting and fnmatch-style assertions over captured output.

use anyhow::{anyhow, Context, Result};
use log::debug;
use regex::Regex;
use serialport::SerialPort;
use std::io::{ErrorKind, Read};
use std::time::{Duration, Instant};

/// Default baud rate for the device console
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Configuration for the device console connection
#[derive(Debug, Clone)]
pub struct ConsoleConfig {
    /// Serial port path (e.g. /dev/ttyACM0)
    pub port_path: String,
    /// Baud rate (default: 115200)
    pub baud_rate: u32,
    /// Per-read timeout on the underlying port
    pub read_timeout: Duration,
}

impl ConsoleConfig {
    pub fn new(port_path: &str) -> Self {
        Self {
            port_path: port_path.to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout: Duration::from_millis(100),
        }
    }

    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }
}

/// Accumulates raw serial bytes into complete lines.
///
/// Carriage returns are stripped; a trailing fragment without a newline is
/// held back until the newline arrives.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of bytes, returning any lines completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for &byte in chunk {
            if byte == b'\n' {
                if self.pending.last() == Some(&b'\r') {
                    self.pending.pop();
                }
                lines.push(String::from_utf8_lossy(&self.pending).to_string());
                self.pending.clear();
            } else {
                self.pending.push(byte);
            }
        }
        lines
    }

    /// Drop any partial line held back so far.
    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

/// Line-oriented console access to the device under test.
///
/// Kept as a trait so scripted sequences can run against a fake console in
/// tests while the real harness uses a serial port.
pub trait ConsoleRead {
    /// Read lines until one matches the regex or the timeout passes.
    fn read_lines_until(&mut self, pattern: &str, timeout: Duration) -> Result<Vec<String>>;

    /// Discard pending console input.
    fn clear_buffer(&mut self) -> Result<()>;
}

/// Blocking serial console connected to the device under test
pub struct Console {
    port: Box<dyn SerialPort>,
    buffer: LineBuffer,
    config: ConsoleConfig,
}

impl Console {
    /// Open the console with the given configuration.
    pub fn open(config: ConsoleConfig) -> Result<Self> {
        let port = serialport::new(&config.port_path, config.baud_rate)
            .timeout(config.read_timeout)
            .open()
            .with_context(|| format!("Failed to open serial port: {}", config.port_path))?;

        Ok(Self {
            port,
            buffer: LineBuffer::new(),
            config,
        })
    }

    pub fn config(&self) -> &ConsoleConfig {
        &self.config
    }
}

impl ConsoleRead for Console {
    /// Returns everything read up to and including the matching line. A
    /// timeout is an error naming the pattern that never appeared.
    fn read_lines_until(&mut self, pattern: &str, timeout: Duration) -> Result<Vec<String>> {
        let regex = Regex::new(pattern)
            .with_context(|| format!("Invalid console pattern: {}", pattern))?;
        let deadline = Instant::now() + timeout;
        let mut collected = Vec::new();
        let mut chunk = [0u8; 256];

        loop {
            match self.port.read(&mut chunk) {
                Ok(0) => {}
                Ok(n) => {
                    for line in self.buffer.push(&chunk[..n]) {
                        debug!("console: {}", line);
                        let matched = regex.is_match(&line);
                        collected.push(line);
                        if matched {
                            return Ok(collected);
                        }
                    }
                }
                Err(ref e) if e.kind() == ErrorKind::TimedOut => {}
                Err(ref e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e).context("Failed to read from serial port"),
            }

            if Instant::now() >= deadline {
                return Err(anyhow!(
                    "Timed out after {}s waiting for console pattern: {}",
                    timeout.as_secs(),
                    pattern
                ));
            }
        }
    }

    /// Discards both driver-side and locally buffered input.
    fn clear_buffer(&mut self) -> Result<()> {
        self.port
            .clear(serialport::ClearBuffer::Input)
            .context("Failed to clear serial input buffer")?;
        self.buffer.clear();
        Ok(())
    }
}

/// Check whether any captured line matches an fnmatch-style pattern.
///
/// `*` matches any run of characters; the pattern must cover the whole line,
/// so substring checks are written as `*fragment*`.
pub fn lines_match(lines: &[String], pattern: &str) -> bool {
    let regex = match glob_to_regex(pattern) {
        Ok(r) => r,
        Err(_) => return false,
    };
    lines.iter().any(|line| regex.is_match(line))
}

/// Assert-style variant of [`lines_match`] that reports the captured output.
pub fn expect_match(lines: &[String], pattern: &str) -> Result<()> {
    if lines_match(lines, pattern) {
        Ok(())
    } else {
        Err(anyhow!(
            "No console line matched '{}' in {} captured line(s)",
            pattern,
            lines.len()
        ))
    }
}

fn glob_to_regex(pattern: &str) -> Result<Regex> {
    let mut translated = String::from("^");
    for ch in pattern.chars() {
        if ch == '*' {
            translated.push_str(".*");
        } else {
            translated.push_str(&regex::escape(&ch.to_string()));
        }
    }
    translated.push('$');
    Regex::new(&translated).with_context(|| format!("Invalid line pattern: {}", pattern))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_console_config_defaults() {
        let config = ConsoleConfig::new("/dev/ttyACM0");
        assert_eq!(config.port_path, "/dev/ttyACM0");
        assert_eq!(config.baud_rate, 115_200);
    }

    #[test]
    fn test_console_config_builder() {
        let config = ConsoleConfig::new("/dev/ttyACM1")
            .with_baud_rate(9600)
            .with_read_timeout(Duration::from_secs(1));

        assert_eq!(config.baud_rate, 9600);
        assert_eq!(config.read_timeout, Duration::from_secs(1));
    }

    #[test]
    fn test_line_buffer_splits_lines() {
        // Arrange
        let mut buffer = LineBuffer::new();

        // Act
        let lines = buffer.push(b"Booting main application\r\nWaiting...\n");

        // Assert
        assert_eq!(lines, vec!["Booting main application", "Waiting..."]);
    }

    #[test]
    fn test_line_buffer_holds_back_partial_line() {
        // Arrange
        let mut buffer = LineBuffer::new();

        // Act: the fragment arrives across two reads
        let first = buffer.push(b"Jumping to the ");
        let second = buffer.push(b"first image slot\n");

        // Assert
        assert!(first.is_empty());
        assert_eq!(second, vec!["Jumping to the first image slot"]);
    }

    #[test]
    fn test_line_buffer_clear_drops_partial() {
        // Arrange
        let mut buffer = LineBuffer::new();
        let _ = buffer.push(b"partial fragment");

        // Act
        buffer.clear();
        let lines = buffer.push(b"fresh line\n");

        // Assert
        assert_eq!(lines, vec!["fresh line"]);
    }

    #[test]
    fn test_line_buffer_lossy_utf8() {
        // Arrange: garbage bytes from a misconfigured baud rate
        let mut buffer = LineBuffer::new();

        // Act
        let lines = buffer.push(&[0xff, 0xfe, b'o', b'k', b'\n']);

        // Assert: still produces a line rather than erroring
        assert_eq!(lines.len(), 1);
        assert!(lines[0].ends_with("ok"));
    }

    #[test]
    fn test_lines_match_wildcards() {
        // Arrange
        let lines = vec![
            "I: Booting firmware loader due to missing application image".to_string(),
            "I: Waiting...".to_string(),
        ];

        // Assert
        assert!(lines_match(&lines, "*Booting firmware loader*"));
        assert!(lines_match(&lines, "*Waiting...*"));
        assert!(!lines_match(&lines, "*Booting main application*"));
    }

    #[test]
    fn test_lines_match_is_anchored() {
        // Arrange
        let lines = vec!["Booting main application".to_string()];

        // Assert: without wildcards the pattern must cover the whole line
        assert!(!lines_match(&lines, "Booting"));
        assert!(lines_match(&lines, "Booting main application"));
    }

    #[test]
    fn test_lines_match_escapes_regex_metacharacters() {
        // Arrange: dots in the pattern are literal, not "any character"
        let lines = vec!["WaitingXXX".to_string()];

        // Assert
        assert!(!lines_match(&lines, "Waiting..."));
    }

    #[test]
    fn test_expect_match_error_names_pattern() {
        // Arrange
        let lines = vec!["nothing useful".to_string()];

        // Act
        let result = expect_match(&lines, "*boot banner*");

        // Assert
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("boot banner"));
    }
}
