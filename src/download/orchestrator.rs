//! Captcha-gated downloads against one portal session.
//!
//! [`Sicar`] owns a single [`HttpSession`] and drives the shared attempt loop
//! for both protected endpoints:
//!
//! - region layers: GET `downloadBase` with region, layer token and captcha
//! - properties: CAR lookup first, then POST `exportShapeFile` with the
//!   internal id and captcha, unwrapping data-URL bodies
//!
//! Each round fetches a fresh captcha image; a guess is only sent when it has
//! exactly five characters.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use futures_util::StreamExt;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE, HeaderName};
use reqwest::{Response, StatusCode};
use tokio::fs::{self, File};
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tracing::{debug, info, instrument, warn};

use super::constants::{
    MAX_BODY_PREALLOCATION, PARAM_CAPTCHA, PARAM_POLYGON, PARAM_PROPERTY_ID, PARAM_REGION,
    ZIP_CONTENT_TYPE,
};
use super::decoder::{self, PayloadFormat, ZIP_SIGNATURE_LEN, has_zip_signature};
use super::retry::{CaptchaRetryPolicy, run_attempts};
use super::{AttemptError, DownloadError};
use crate::captcha::{CAPTCHA_LENGTH, CaptchaAttempt, CaptchaSolver, CaptchaSource};
use crate::config::SicarConfig;
use crate::model::{CarNumber, DownloadTarget, PolygonKind, Region};
use crate::portal::{HttpSession, PortalError, PropertyLocator, PropertyRecord};
use crate::release::{ReleaseDates, parse_release_dates};

/// A downloaded archive and how many captcha rounds it took.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadOutcome {
    /// Raw ZIP bytes (data-URL wrappers already removed).
    pub bytes: Vec<u8>,
    /// Deterministic file name for the target.
    pub filename: String,
    /// Attempt that succeeded (1-based).
    pub attempts: u32,
}

impl DownloadOutcome {
    /// Archive size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns `true` for an empty archive (never produced by [`Sicar`]).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Writes the archive to `dir/filename`, creating `dir` if needed.
    ///
    /// The bytes go to a `.part` sibling first and are renamed into place,
    /// so an existing archive is only replaced by a complete one.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Io`] if the directory or file cannot be written.
    #[instrument(skip(self), fields(filename = %self.filename, bytes = self.bytes.len()))]
    pub async fn save_to(&self, dir: &Path) -> Result<PathBuf, DownloadError> {
        fs::create_dir_all(dir)
            .await
            .map_err(|e| DownloadError::io(dir, e))?;

        let path = dir.join(&self.filename);
        let partial = partial_path(dir, &self.filename);

        let file = File::create(&partial)
            .await
            .map_err(|e| DownloadError::io(&partial, e))?;
        let mut writer = BufWriter::new(file);
        writer
            .write_all(&self.bytes)
            .await
            .map_err(|e| DownloadError::io(&partial, e))?;
        writer
            .flush()
            .await
            .map_err(|e| DownloadError::io(&partial, e))?;
        drop(writer);

        fs::rename(&partial, &path)
            .await
            .map_err(|e| DownloadError::io(&path, e))?;

        info!(path = %path.display(), "archive saved");
        Ok(path)
    }
}

/// Portal client that turns captcha rounds into archives.
///
/// One instance owns one cookie session. Download methods take `&mut self`,
/// so two attempt loops can never interleave on the same session; run
/// parallel downloads on separate instances (see
/// [`BatchDownloader`](super::BatchDownloader)).
#[derive(Debug)]
pub struct Sicar {
    session: HttpSession,
    captcha: CaptchaSource,
    locator: PropertyLocator,
    solver: Arc<dyn CaptchaSolver>,
    policy: CaptchaRetryPolicy,
    min_property_bytes: usize,
    interrupt: Arc<AtomicBool>,
}

impl Sicar {
    /// Validates `config`, builds a session and bootstraps its cookies.
    ///
    /// # Errors
    ///
    /// - [`DownloadError::Config`] if `config` fails validation
    /// - [`DownloadError::Session`] if the client cannot be built or the
    ///   index page is unreachable
    #[instrument(skip(config, solver), fields(base_url = %config.base_url, solver = solver.name()))]
    pub async fn connect(
        config: &SicarConfig,
        solver: Arc<dyn CaptchaSolver>,
    ) -> Result<Self, DownloadError> {
        config.validate()?;
        let session = HttpSession::new(config).map_err(DownloadError::session)?;
        session
            .initialize()
            .await
            .map_err(DownloadError::session)?;

        Ok(Self {
            captcha: CaptchaSource::new(session.clone()),
            locator: PropertyLocator::new(session.clone()),
            session,
            solver,
            policy: CaptchaRetryPolicy::from_config(config),
            min_property_bytes: config.min_property_bytes,
            interrupt: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Shares `flag` as the cancellation signal of every attempt loop.
    #[must_use]
    pub fn with_interrupt(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupt = flag;
        self
    }

    /// Replaces the attempt budget and pacing taken from the config.
    #[must_use]
    pub fn with_retry_policy(mut self, policy: CaptchaRetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// The underlying session (for cookie inspection).
    #[must_use]
    pub fn session(&self) -> &HttpSession {
        &self.session
    }

    /// Downloads one layer for one region into memory.
    ///
    /// State layers can be hundreds of megabytes; prefer
    /// [`download_region_polygon_to`](Self::download_region_polygon_to),
    /// which streams to disk.
    ///
    /// # Errors
    ///
    /// [`DownloadError::Exhausted`] when no round produced an archive, or
    /// [`DownloadError::Interrupted`].
    #[instrument(skip(self), fields(region = %region, polygon = kind.token()))]
    pub async fn download_region_polygon(
        &mut self,
        region: Region,
        kind: PolygonKind,
    ) -> Result<DownloadOutcome, DownloadError> {
        let target = DownloadTarget::region_polygon(region, kind);
        let label = target.to_string();
        let filename = target.filename();
        let endpoint = self.session.urls().state_download();
        let request = RegionRequest {
            session: &self.session,
            captcha: &self.captcha,
            solver: self.solver.as_ref(),
            endpoint: &endpoint,
            region,
            kind,
        };
        let request = &request;
        let sink_label = Path::new(&filename);

        let (bytes, attempts) = run_attempts(&self.policy, &label, &self.interrupt, |_| async move {
            let (response, declared) = request.send().await?;
            let mut body = Vec::with_capacity(preallocation(declared));
            stream_archive(response, request.endpoint, declared, &mut body, sink_label).await?;
            Ok(body)
        })
        .await?;

        Ok(DownloadOutcome {
            bytes,
            filename,
            attempts,
        })
    }

    /// Downloads one layer for one region, streaming it into `dir`.
    ///
    /// Each accepted round writes to `{filename}.part`, which is renamed into
    /// place once the whole body has arrived; a rejected or broken round
    /// removes it.
    ///
    /// # Errors
    ///
    /// As [`download_region_polygon`](Self::download_region_polygon), plus
    /// [`DownloadError::Io`].
    #[instrument(skip(self), fields(region = %region, polygon = kind.token(), output_dir = %dir.display()))]
    pub async fn download_region_polygon_to(
        &mut self,
        region: Region,
        kind: PolygonKind,
        dir: &Path,
    ) -> Result<PathBuf, DownloadError> {
        let target = DownloadTarget::region_polygon(region, kind);
        let label = target.to_string();
        let filename = target.filename();
        fs::create_dir_all(dir)
            .await
            .map_err(|e| DownloadError::io(dir, e))?;
        let path = dir.join(&filename);
        let partial = partial_path(dir, &filename);

        let endpoint = self.session.urls().state_download();
        let request = RegionRequest {
            session: &self.session,
            captcha: &self.captcha,
            solver: self.solver.as_ref(),
            endpoint: &endpoint,
            region,
            kind,
        };
        let request = &request;
        let partial_ref = partial.as_path();

        let (written, attempts) = run_attempts(&self.policy, &label, &self.interrupt, |_| async move {
            let (response, declared) = request.send().await?;
            let result = write_partial(response, request.endpoint, declared, partial_ref).await;
            if result.is_err() {
                let _ = fs::remove_file(partial_ref).await;
            }
            result
        })
        .await?;

        fs::rename(&partial, &path)
            .await
            .map_err(|e| DownloadError::io(&path, e))?;
        info!(path = %path.display(), bytes = written, attempts, "archive saved");
        Ok(path)
    }

    /// Resolves `car` and downloads its property archive.
    ///
    /// The CAR lookup happens once, before the first captcha is fetched.
    ///
    /// # Errors
    ///
    /// - [`DownloadError::PropertyLookup`] if the number is unknown or the
    ///   search fails (not retried)
    /// - [`DownloadError::Exhausted`] or [`DownloadError::Interrupted`]
    #[instrument(skip(self), fields(car_number = %car))]
    pub async fn download_property(
        &mut self,
        car: &CarNumber,
    ) -> Result<DownloadOutcome, DownloadError> {
        let target = DownloadTarget::property(car.clone());
        let label = target.to_string();
        let property_id = self
            .locator
            .resolve(car)
            .await
            .map_err(DownloadError::property_lookup)?;
        let endpoint = self.session.urls().property_export();

        let session = &self.session;
        let captcha = &self.captcha;
        let solver = self.solver.as_ref();
        let min_bytes = self.min_property_bytes;
        let endpoint = endpoint.as_str();
        let property_id = property_id.as_str();

        let (bytes, attempts) = run_attempts(&self.policy, &label, &self.interrupt, |_| async move {
            let guess = solve_captcha(captcha, solver).await?;
            let response = session
                .post_form(
                    endpoint,
                    &[(PARAM_PROPERTY_ID, property_id), (PARAM_CAPTCHA, guess.as_str())],
                )
                .await
                .map_err(|source| AttemptError::Transport { source })?;
            accept_property_response(response, endpoint, min_bytes).await
        })
        .await?;

        Ok(DownloadOutcome {
            bytes,
            filename: target.filename(),
            attempts,
        })
    }

    /// Downloads a property archive into `dir`.
    ///
    /// # Errors
    ///
    /// As [`download_property`](Self::download_property), plus
    /// [`DownloadError::Io`].
    pub async fn download_property_to(
        &mut self,
        car: &CarNumber,
        dir: &Path,
    ) -> Result<PathBuf, DownloadError> {
        self.download_property(car).await?.save_to(dir).await
    }

    /// Downloads any target into memory.
    ///
    /// # Errors
    ///
    /// As the matching variant.
    pub async fn download(&mut self, target: &DownloadTarget) -> Result<DownloadOutcome, DownloadError> {
        match target {
            DownloadTarget::RegionPolygon { region, kind } => {
                self.download_region_polygon(*region, *kind).await
            }
            DownloadTarget::Property { car } => self.download_property(car).await,
        }
    }

    /// Downloads any target into `dir`; region layers are streamed.
    ///
    /// # Errors
    ///
    /// As the matching `_to` variant.
    pub async fn download_to(
        &mut self,
        target: &DownloadTarget,
        dir: &Path,
    ) -> Result<PathBuf, DownloadError> {
        match target {
            DownloadTarget::RegionPolygon { region, kind } => {
                self.download_region_polygon_to(*region, *kind, dir).await
            }
            DownloadTarget::Property { car } => self.download_property_to(car, dir).await,
        }
    }

    /// Looks up the published record for `car`.
    ///
    /// # Errors
    ///
    /// [`PortalError::PropertyNotFound`] or [`PortalError::PropertyLookupFailed`].
    pub async fn search_property(&self, car: &CarNumber) -> Result<PropertyRecord, PortalError> {
        self.locator.search(car).await
    }

    /// Fetches and parses the per-region release dates page.
    ///
    /// # Errors
    ///
    /// [`PortalError::ReleaseDatesUnavailable`] if the page cannot be fetched.
    #[instrument(skip(self))]
    pub async fn release_dates(&self) -> Result<ReleaseDates, PortalError> {
        let url = self.session.urls().release_dates();
        let unavailable = |reason: String| PortalError::ReleaseDatesUnavailable { reason };

        let response = self
            .session
            .get(&url)
            .await
            .map_err(|e| unavailable(e.to_string()))?;
        let body = response
            .bytes()
            .await
            .map_err(|e| unavailable(e.to_string()))?;

        let dates = parse_release_dates(&body);
        if dates.is_empty() {
            warn!("release dates page lists no recognised region");
        } else {
            info!(regions = dates.len(), "release dates parsed");
        }
        Ok(dates)
    }
}

/// Fetches a fresh image, solves it and applies the length gate.
async fn solve_captcha(
    captcha: &CaptchaSource,
    solver: &dyn CaptchaSolver,
) -> Result<String, AttemptError> {
    let image = captcha
        .fetch()
        .await
        .map_err(|source| AttemptError::CaptchaFetch { source })?;
    let text = solver.solve(&image).await;
    let attempt = CaptchaAttempt { image, text };

    if !attempt.is_valid() {
        return Err(AttemptError::CaptchaLength {
            len: attempt.len(),
            guess: attempt.text,
            expected: CAPTCHA_LENGTH,
        });
    }
    debug!(solver = solver.name(), guess = %attempt.text, "captcha guess accepted by length gate");
    Ok(attempt.text)
}

fn header_value(response: &Response, name: &HeaderName) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().to_ascii_lowercase())
}

/// One region/layer request: captcha round plus the protected GET.
struct RegionRequest<'a> {
    session: &'a HttpSession,
    captcha: &'a CaptchaSource,
    solver: &'a dyn CaptchaSolver,
    endpoint: &'a str,
    region: Region,
    kind: PolygonKind,
}

impl RegionRequest<'_> {
    /// Solves a fresh captcha, sends it and checks the answer's headers.
    ///
    /// Returns the response with its body still unread, plus the declared
    /// length if any.
    async fn send(&self) -> Result<(Response, Option<u64>), AttemptError> {
        let guess = solve_captcha(self.captcha, self.solver).await?;
        let response = self
            .session
            .get_stream_with_query(
                self.endpoint,
                &[
                    (PARAM_REGION, self.region.as_str()),
                    (PARAM_POLYGON, self.kind.token()),
                    (PARAM_CAPTCHA, guess.as_str()),
                ],
            )
            .await
            .map_err(|source| AttemptError::Transport { source })?;
        let declared = check_region_headers(&response)?;
        Ok((response, declared))
    }
}

/// Strict header check: 200, `application/zip`, declared length not zero.
fn check_region_headers(response: &Response) -> Result<Option<u64>, AttemptError> {
    let status = response.status();
    if status != StatusCode::OK {
        return Err(AttemptError::rejected(status.as_u16(), "unexpected status"));
    }

    let content_type = header_value(response, &CONTENT_TYPE);
    if !content_type
        .as_deref()
        .is_some_and(|ct| ct.starts_with(ZIP_CONTENT_TYPE))
    {
        return Err(AttemptError::rejected(
            status.as_u16(),
            format!(
                "content type {} is not an archive",
                content_type.as_deref().unwrap_or("<missing>")
            ),
        ));
    }

    let declared = header_value(response, &CONTENT_LENGTH).and_then(|v| v.parse::<u64>().ok());
    if declared == Some(0) {
        return Err(AttemptError::rejected(status.as_u16(), "empty archive (Content-Length: 0)"));
    }
    Ok(declared)
}

/// Buffer size to reserve for a body declaring `declared` bytes.
fn preallocation(declared: Option<u64>) -> usize {
    declared
        .and_then(|len| usize::try_from(len).ok())
        .map_or(0, |len| len.min(MAX_BODY_PREALLOCATION))
}

/// Streams an archive body into `sink` and returns the byte count.
///
/// The body must open with a ZIP signature (checked as soon as the first
/// bytes arrive) and, when a length was declared, end exactly there.
/// `sink_path` names the destination in storage errors.
async fn stream_archive<W>(
    response: Response,
    url: &str,
    declared: Option<u64>,
    sink: &mut W,
    sink_path: &Path,
) -> Result<u64, AttemptError>
where
    W: AsyncWrite + Unpin,
{
    let status = response.status().as_u16();
    let storage = |source| AttemptError::Storage {
        path: sink_path.to_path_buf(),
        source,
    };

    let mut head = Vec::with_capacity(ZIP_SIGNATURE_LEN);
    let mut written: u64 = 0;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| AttemptError::Transport {
            source: PortalError::transport(url, e),
        })?;
        if head.len() < ZIP_SIGNATURE_LEN {
            let take = (ZIP_SIGNATURE_LEN - head.len()).min(chunk.len());
            head.extend_from_slice(&chunk[..take]);
            if head.len() == ZIP_SIGNATURE_LEN && !has_zip_signature(&head) {
                return Err(AttemptError::rejected(status, "body is not a ZIP archive"));
            }
        }
        sink.write_all(&chunk).await.map_err(storage)?;
        written += chunk.len() as u64;
    }
    sink.flush().await.map_err(storage)?;

    if written == 0 {
        return Err(AttemptError::rejected(status, "empty archive body"));
    }
    if !has_zip_signature(&head) {
        return Err(AttemptError::rejected(
            status,
            format!("{written} bytes are too short for a ZIP archive"),
        ));
    }
    if let Some(expected) = declared {
        if written != expected {
            return Err(AttemptError::rejected(
                status,
                format!("body ended after {written} of {expected} declared bytes"),
            ));
        }
    }
    Ok(written)
}

/// Streams an accepted body into the `.part` file at `partial`.
async fn write_partial(
    response: Response,
    url: &str,
    declared: Option<u64>,
    partial: &Path,
) -> Result<u64, AttemptError> {
    let file = File::create(partial)
        .await
        .map_err(|source| AttemptError::Storage {
            path: partial.to_path_buf(),
            source,
        })?;
    let mut writer = BufWriter::new(file);
    stream_archive(response, url, declared, &mut writer, partial).await
}

fn partial_path(dir: &Path, filename: &str) -> PathBuf {
    dir.join(format!("{filename}.part"))
}

/// Looser check for property exports, whose content type is unreliable.
///
/// After unwrapping, the body must start with a ZIP signature. A typed
/// (zip / octet-stream) answer of any size passes; an untyped one must also
/// exceed `min_bytes`, which keeps HTML error pages out.
async fn accept_property_response(
    response: Response,
    url: &str,
    min_bytes: usize,
) -> Result<Vec<u8>, AttemptError> {
    let status = response.status();
    if status != StatusCode::OK {
        return Err(AttemptError::rejected(status.as_u16(), "unexpected status"));
    }

    let content_type = header_value(&response, &CONTENT_TYPE).unwrap_or_default();
    let body = response.bytes().await.map_err(|e| AttemptError::Transport {
        source: PortalError::transport(url, e),
    })?;

    let format = PayloadFormat::detect(&body);
    let archive = decoder::normalize(body.to_vec()).map_err(|source| AttemptError::Decode { source })?;
    if archive.is_empty() {
        return Err(AttemptError::rejected(status.as_u16(), "empty archive body"));
    }

    let typed = content_type.contains("zip") || content_type.contains("octet-stream");
    if has_zip_signature(&archive) && (typed || archive.len() > min_bytes) {
        debug!(?format, content_type = %content_type, bytes = archive.len(), "property archive accepted");
        return Ok(archive);
    }

    Err(AttemptError::rejected(
        status.as_u16(),
        format!(
            "{} bytes of {:?} with content type {} do not look like an archive",
            archive.len(),
            format,
            if content_type.is_empty() { "<missing>" } else { content_type.as_str() },
        ),
    ))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn outcome() -> DownloadOutcome {
        DownloadOutcome {
            bytes: b"PK\x03\x04archive".to_vec(),
            filename: "SP_APPS.zip".to_string(),
            attempts: 3,
        }
    }

    #[tokio::test]
    async fn test_save_to_creates_directory_and_file() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("out").join("states");

        let path = outcome().save_to(&nested).await.unwrap();

        assert_eq!(path, nested.join("SP_APPS.zip"));
        assert_eq!(std::fs::read(&path).unwrap(), b"PK\x03\x04archive");
        assert!(!nested.join("SP_APPS.zip.part").exists());
    }

    #[tokio::test]
    async fn test_save_to_replaces_existing_archive() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("SP_APPS.zip"), b"stale").unwrap();

        let path = outcome().save_to(dir.path()).await.unwrap();

        assert_eq!(std::fs::read(path).unwrap(), b"PK\x03\x04archive");
    }

    #[tokio::test]
    async fn test_save_to_reports_io_errors_with_path() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"file").unwrap();

        let err = outcome().save_to(&blocker).await.unwrap_err();

        assert!(matches!(err, DownloadError::Io { .. }), "got: {err:?}");
    }

    #[test]
    fn test_preallocation_is_capped() {
        assert_eq!(preallocation(None), 0);
        assert_eq!(preallocation(Some(512)), 512);
        assert_eq!(preallocation(Some(100_000_000_000_000)), MAX_BODY_PREALLOCATION);
        assert_eq!(preallocation(Some(u64::MAX)), MAX_BODY_PREALLOCATION);
    }

    #[test]
    fn test_partial_path_is_sibling() {
        assert_eq!(
            partial_path(Path::new("/out"), "SP_APPS.zip"),
            PathBuf::from("/out/SP_APPS.zip.part")
        );
    }

    #[test]
    fn test_outcome_len() {
        let outcome = outcome();
        assert_eq!(outcome.len(), 11);
        assert!(!outcome.is_empty());
    }
}
