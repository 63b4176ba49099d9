//! Captcha images, the solver capability and its named backends.
//!
//! The portal gates every export behind a five-character image captcha. A
//! [`CaptchaSource`] fetches a fresh image per attempt and a
//! [`CaptchaSolver`] turns it into a guess. Only the guess length is locally
//! checkable; correctness is learned from the protected request itself.

mod command;
mod source;

pub use command::CommandSolver;
pub use source::CaptchaSource;

use std::io::Cursor;
use std::sync::Arc;

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, ImageResult};

use crate::config::{SolverConfig, SolverKind};

/// Number of characters in every valid captcha answer.
pub const CAPTCHA_LENGTH: usize = 5;

/// A decoded captcha image.
#[derive(Debug, Clone)]
pub struct CaptchaImage {
    bytes: Vec<u8>,
    format: ImageFormat,
    decoded: DynamicImage,
}

impl CaptchaImage {
    /// Decodes `bytes`, rejecting anything that is not a supported image.
    ///
    /// # Errors
    ///
    /// Returns the decoder error for unknown or corrupt image data.
    pub fn decode(bytes: Vec<u8>) -> ImageResult<Self> {
        let format = image::guess_format(&bytes)?;
        let decoded = image::load_from_memory_with_format(&bytes, format)?;
        Ok(Self {
            bytes,
            format,
            decoded,
        })
    }

    /// Raw bytes as served by the portal.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Detected container format.
    #[must_use]
    pub fn format(&self) -> ImageFormat {
        self.format
    }

    /// Width and height in pixels.
    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.decoded.width(), self.decoded.height())
    }

    /// Grayscale, hard-thresholded PNG rendition; OCR engines read the
    /// portal's noisy captchas noticeably better after binarization.
    ///
    /// # Errors
    ///
    /// Returns the encoder error if PNG encoding fails.
    pub fn binarized_png(&self, threshold: u8) -> ImageResult<Vec<u8>> {
        let mut gray = self.decoded.to_luma8();
        for pixel in gray.pixels_mut() {
            pixel.0[0] = if pixel.0[0] < threshold { 0 } else { u8::MAX };
        }
        let mut out = Vec::new();
        DynamicImage::ImageLuma8(gray).write_to(&mut Cursor::new(&mut out), ImageFormat::Png)?;
        Ok(out)
    }
}

/// One captcha round: the image and the solver's guess for it.
///
/// Lives for a single attempt; images are never reused.
#[derive(Debug, Clone)]
pub struct CaptchaAttempt {
    /// The fetched image.
    pub image: CaptchaImage,
    /// The solver's guess (possibly empty).
    pub text: String,
}

impl CaptchaAttempt {
    /// Number of characters in the guess.
    #[must_use]
    pub fn len(&self) -> usize {
        self.text.chars().count()
    }

    /// Returns `true` when the guess is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// A guess is worth sending only when it has exactly
    /// [`CAPTCHA_LENGTH`] characters.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.len() == CAPTCHA_LENGTH
    }
}

/// Converts a captcha image into a guess.
///
/// Implementations return an empty or malformed string on failure instead of
/// an error; the orchestrator's length gate discards such guesses.
#[async_trait]
pub trait CaptchaSolver: Send + Sync + std::fmt::Debug {
    /// Backend name for logs.
    fn name(&self) -> &str;

    /// Produces a guess for `image`.
    async fn solve(&self, image: &CaptchaImage) -> String;
}

/// Constructs the solver named by `config`.
#[must_use]
pub fn build_solver(config: &SolverConfig) -> Arc<dyn CaptchaSolver> {
    let timeout = std::time::Duration::from_secs(config.timeout_secs);
    match config.kind {
        SolverKind::Tesseract => Arc::new(CommandSolver::tesseract(
            config.program.clone(),
            config.args.clone(),
            timeout,
        )),
        SolverKind::Command => Arc::new(CommandSolver::command(
            config.program.clone().unwrap_or_default(),
            config.args.clone(),
            timeout,
        )),
    }
}
