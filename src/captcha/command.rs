//! Solvers backed by an external OCR process.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use super::{CaptchaImage, CaptchaSolver};

const TESSERACT_PROGRAM: &str = "tesseract";
const TESSERACT_WHITELIST: &str =
    "tessedit_char_whitelist=abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const BINARIZE_THRESHOLD: u8 = 140;

/// Runs an OCR program with the image on stdin and reads the guess from stdout.
///
/// Every failure mode (spawn error, timeout, non-zero exit, undecodable
/// output) yields an empty guess.
#[derive(Debug, Clone)]
pub struct CommandSolver {
    name: String,
    program: String,
    args: Vec<String>,
    timeout: Duration,
    binarize: bool,
}

impl CommandSolver {
    /// Tesseract in single-word mode restricted to alphanumerics.
    ///
    /// `program` overrides the executable path; `extra_args` are appended.
    #[must_use]
    pub fn tesseract(program: Option<String>, extra_args: Vec<String>, timeout: Duration) -> Self {
        let mut args: Vec<String> = ["stdin", "stdout", "--psm", "8", "-c", TESSERACT_WHITELIST]
            .into_iter()
            .map(str::to_string)
            .collect();
        args.extend(extra_args);
        Self {
            name: "tesseract".to_string(),
            program: program.unwrap_or_else(|| TESSERACT_PROGRAM.to_string()),
            args,
            timeout,
            binarize: true,
        }
    }

    /// Arbitrary program receiving the raw image bytes on stdin.
    #[must_use]
    pub fn command(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        let program = program.into();
        Self {
            name: format!("command:{program}"),
            program,
            args,
            timeout,
            binarize: false,
        }
    }

    fn input_for(&self, image: &CaptchaImage) -> Vec<u8> {
        if !self.binarize {
            return image.bytes().to_vec();
        }
        match image.binarized_png(BINARIZE_THRESHOLD) {
            Ok(png) => png,
            Err(e) => {
                debug!(error = %e, "binarization failed, sending raw image");
                image.bytes().to_vec()
            }
        }
    }

    async fn run(&self, input: Vec<u8>) -> std::io::Result<Option<String>> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(&input).await?;
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            warn!(solver = %self.name, status = %output.status, "solver exited unsuccessfully");
            return Ok(None);
        }
        Ok(Some(clean_guess(&String::from_utf8_lossy(&output.stdout))))
    }
}

/// Drops whitespace and control characters OCR engines emit around a word.
fn clean_guess(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace() && !c.is_control())
        .collect()
}

#[async_trait]
impl CaptchaSolver for CommandSolver {
    fn name(&self) -> &str {
        &self.name
    }

    async fn solve(&self, image: &CaptchaImage) -> String {
        let input = self.input_for(image);
        match tokio::time::timeout(self.timeout, self.run(input)).await {
            Ok(Ok(Some(guess))) => {
                debug!(solver = %self.name, guess = %guess, "captcha solved");
                guess
            }
            Ok(Ok(None)) => String::new(),
            Ok(Err(e)) => {
                warn!(solver = %self.name, program = %self.program, error = %e, "solver failed to run");
                String::new()
            }
            Err(_) => {
                warn!(solver = %self.name, timeout_secs = self.timeout.as_secs(), "solver timed out");
                String::new()
            }
        }
    }
}
