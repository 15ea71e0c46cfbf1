//! Scripted DFU sequences.
//!
//! A scenario is an ordered list of steps (build, upload, reset, expect a
//! console pattern) executed against one device. The same scenario type
//! backs the CLI `run` flow and the hardware integration tests.

use anyhow::{Context, Result};
use log::info;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::builder::WestBuilder;
use crate::console::ConsoleRead;
use crate::mcumgr::Mcumgr;
use crate::nrfutil;

/// One step of a DFU sequence
#[derive(Debug, Clone)]
pub enum DfuStep {
    /// Build a firmware image with west
    Build(WestBuilder),
    /// Upload an image file over MCUmgr
    Upload(PathBuf),
    /// Reset the board through the device-management tool
    Reset,
    /// Drop any pending console output
    ClearBuffer,
    /// Wait until the console prints a line matching the regex
    ExpectConsole { pattern: String, timeout: Duration },
    /// Give the device time to settle
    Sleep(Duration),
}

impl fmt::Display for DfuStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DfuStep::Build(builder) => write!(f, "build into {}", builder.build_dir().display()),
            DfuStep::Upload(path) => write!(f, "upload {}", path.display()),
            DfuStep::Reset => write!(f, "reset board"),
            DfuStep::ClearBuffer => write!(f, "clear console buffer"),
            DfuStep::ExpectConsole { pattern, .. } => write!(f, "expect console '{}'", pattern),
            DfuStep::Sleep(d) => write!(f, "sleep {}ms", d.as_millis()),
        }
    }
}

/// An ordered DFU sequence against one device
#[derive(Debug, Clone, Default)]
pub struct DfuScenario {
    steps: Vec<DfuStep>,
}

impl DfuScenario {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step(mut self, step: DfuStep) -> Self {
        self.steps.push(step);
        self
    }

    pub fn build(self, builder: WestBuilder) -> Self {
        self.step(DfuStep::Build(builder))
    }

    pub fn upload(self, image: PathBuf) -> Self {
        self.step(DfuStep::Upload(image))
    }

    pub fn reset(self) -> Self {
        self.step(DfuStep::Reset)
    }

    pub fn clear_buffer(self) -> Self {
        self.step(DfuStep::ClearBuffer)
    }

    pub fn expect_console(self, pattern: &str, timeout: Duration) -> Self {
        self.step(DfuStep::ExpectConsole {
            pattern: pattern.to_string(),
            timeout,
        })
    }

    pub fn sleep(self, duration: Duration) -> Self {
        self.step(DfuStep::Sleep(duration))
    }

    pub fn steps(&self) -> &[DfuStep] {
        &self.steps
    }

    /// Execute the steps in order, failing fast on the first error.
    ///
    /// Returns the full console transcript captured by the expect steps.
    pub fn run(
        &self,
        console: &mut dyn ConsoleRead,
        mcumgr: &Mcumgr,
        serial_number: Option<&str>,
    ) -> Result<Vec<String>> {
        let mut transcript = Vec::new();

        for (index, step) in self.steps.iter().enumerate() {
            info!("Step {}/{}: {}", index + 1, self.steps.len(), step);
            self.run_step(step, console, mcumgr, serial_number, &mut transcript)
                .with_context(|| format!("DFU step {} failed: {}", index + 1, step))?;
        }

        Ok(transcript)
    }

    fn run_step(
        &self,
        step: &DfuStep,
        console: &mut dyn ConsoleRead,
        mcumgr: &Mcumgr,
        serial_number: Option<&str>,
        transcript: &mut Vec<String>,
    ) -> Result<()> {
        match step {
            DfuStep::Build(builder) => builder.build(),
            DfuStep::Upload(image) => mcumgr.image_upload(image),
            DfuStep::Reset => nrfutil::reset_board(serial_number),
            DfuStep::ClearBuffer => console.clear_buffer(),
            DfuStep::ExpectConsole { pattern, timeout } => {
                let lines = console.read_lines_until(pattern, *timeout)?;
                transcript.extend(lines);
                Ok(())
            }
            DfuStep::Sleep(duration) => {
                std::thread::sleep(*duration);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    /// Fake console fed from a canned script of line batches
    struct ScriptedConsole {
        batches: Vec<Vec<String>>,
        cleared: usize,
    }

    impl ScriptedConsole {
        fn new(batches: Vec<Vec<&str>>) -> Self {
            Self {
                batches: batches
                    .into_iter()
                    .map(|b| b.into_iter().map(String::from).collect())
                    .collect(),
                cleared: 0,
            }
        }
    }

    impl ConsoleRead for ScriptedConsole {
        fn read_lines_until(&mut self, pattern: &str, _timeout: Duration) -> Result<Vec<String>> {
            if self.batches.is_empty() {
                return Err(anyhow!(
                    "Timed out waiting for console pattern: {}",
                    pattern
                ));
            }
            Ok(self.batches.remove(0))
        }

        fn clear_buffer(&mut self) -> Result<()> {
            self.cleared += 1;
            Ok(())
        }
    }

    #[test]
    fn test_scenario_builder_composition() {
        // Act
        let scenario = DfuScenario::new()
            .clear_buffer()
            .reset()
            .expect_console("Waiting...", Duration::from_secs(5));

        // Assert
        assert_eq!(scenario.steps().len(), 3);
        assert!(matches!(scenario.steps()[0], DfuStep::ClearBuffer));
        assert!(matches!(scenario.steps()[1], DfuStep::Reset));
    }

    #[test]
    fn test_scenario_collects_transcript() {
        // Arrange
        let mut console = ScriptedConsole::new(vec![
            vec!["I: Waiting..."],
            vec!["I: Jumping to the first image slot"],
        ]);
        let mcumgr = Mcumgr::create_for_serial("/dev/ttyACM0");
        let scenario = DfuScenario::new()
            .expect_console("Waiting...", Duration::from_secs(5))
            .expect_console("Jumping to the first image slot", Duration::from_secs(5));

        // Act
        let transcript = scenario.run(&mut console, &mcumgr, None).unwrap();

        // Assert
        assert_eq!(transcript.len(), 2);
        assert!(transcript[1].contains("first image slot"));
    }

    #[test]
    fn test_scenario_clear_buffer_reaches_console() {
        // Arrange
        let mut console = ScriptedConsole::new(vec![]);
        let mcumgr = Mcumgr::create_for_serial("/dev/ttyACM0");
        let scenario = DfuScenario::new().clear_buffer().clear_buffer();

        // Act
        scenario.run(&mut console, &mcumgr, None).unwrap();

        // Assert
        assert_eq!(console.cleared, 2);
    }

    #[test]
    fn test_scenario_fails_fast_with_step_context() {
        // Arrange: the console never prints anything
        let mut console = ScriptedConsole::new(vec![]);
        let mcumgr = Mcumgr::create_for_serial("/dev/ttyACM0");
        let scenario = DfuScenario::new()
            .expect_console("Booting main application", Duration::from_secs(1))
            .clear_buffer();

        // Act
        let result = scenario.run(&mut console, &mcumgr, None);

        // Assert: the error names the failing step, and later steps never ran
        assert!(result.is_err());
        let message = format!("{:#}", result.unwrap_err());
        assert!(message.contains("DFU step 1 failed"));
        assert!(message.contains("Booting main application"));
        assert_eq!(console.cleared, 0);
    }

    #[test]
    fn test_scenario_upload_missing_image_is_error() {
        // Arrange
        let mut console = ScriptedConsole::new(vec![]);
        let mcumgr = Mcumgr::create_for_serial("/dev/ttyACM0");
        let scenario =
            DfuScenario::new().upload(PathBuf::from("/tmp/missing_dfu_image_xyz.signed.bin"));

        // Act
        let result = scenario.run(&mut console, &mcumgr, None);

        // Assert
        assert!(result.is_err());
        assert!(format!("{:#}", result.unwrap_err()).contains("Image file not found"));
    }

    #[test]
    fn test_step_display() {
        assert_eq!(DfuStep::Reset.to_string(), "reset board");
        assert_eq!(
            DfuStep::ExpectConsole {
                pattern: "Waiting...".to_string(),
                timeout: Duration::from_secs(5),
            }
            .to_string(),
            "expect console 'Waiting...'"
        );
    }
}
