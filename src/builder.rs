//! Wrapper over `west build` for producing firmware images.

use anyhow::{anyhow, Context, Result};
use log::info;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::runner::run_command_with_timeout;

/// Default ceiling for a pristine firmware build
pub const DEFAULT_BUILD_TIMEOUT: Duration = Duration::from_secs(120);

/// Invokes `west build` for a board/source/testsuite combination
#[derive(Debug, Clone)]
pub struct WestBuilder {
    source_dir: PathBuf,
    build_dir: PathBuf,
    board: String,
    testsuite: Option<String>,
    timeout: Duration,
}

impl WestBuilder {
    pub fn new(source_dir: &Path, build_dir: &Path, board: &str) -> Self {
        Self {
            source_dir: source_dir.to_path_buf(),
            build_dir: build_dir.to_path_buf(),
            board: board.to_string(),
            testsuite: None,
            timeout: DEFAULT_BUILD_TIMEOUT,
        }
    }

    /// Select a testsuite configuration to build against.
    pub fn with_testsuite(mut self, testsuite: &str) -> Self {
        self.testsuite = Some(testsuite.to_string());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn build_dir(&self) -> &Path {
        &self.build_dir
    }

    /// Run a pristine build, failing on error or when the timeout passes.
    pub fn build(&self) -> Result<()> {
        if !self.source_dir.is_dir() {
            return Err(anyhow!(
                "Source directory not found: {}",
                self.source_dir.display()
            ));
        }

        info!(
            "Building {} for board {} into {}",
            self.source_dir.display(),
            self.board,
            self.build_dir.display()
        );

        let source = self.source_dir.to_string_lossy().to_string();
        let build = self.build_dir.to_string_lossy().to_string();
        let mut args = vec![
            "build",
            "--pristine",
            "always",
            "-b",
            self.board.as_str(),
            "-d",
            build.as_str(),
            source.as_str(),
        ];
        if let Some(ref testsuite) = self.testsuite {
            args.extend(["-T", testsuite.as_str()]);
        }

        run_command_with_timeout("west", &args, self.timeout)
            .with_context(|| format!("west build failed for board {}", self.board))
    }
}
