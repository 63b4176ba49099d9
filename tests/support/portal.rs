//! Mock SICAR portal and scripted captcha solvers.

use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use image::{ImageFormat, Rgb, RgbImage};
use sicar_core::SicarConfig;
use sicar_core::captcha::{CaptchaImage, CaptchaSolver};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const INDEX_PATH: &str = "/imoveis/index";
pub const CAPTCHA_PATH: &str = "/municipios/ReCaptcha";
pub const STATE_DOWNLOAD_PATH: &str = "/estados/downloadBase";
pub const RELEASE_DATES_PATH: &str = "/estados/downloads";
pub const SEARCH_PATH: &str = "/imoveis/search";
pub const EXPORT_PATH: &str = "/imoveis/exportShapeFile";

/// Returns guesses in order, then repeats `fallback`.
#[derive(Debug)]
pub struct ScriptedSolver {
    guesses: Mutex<VecDeque<String>>,
    fallback: String,
    calls: AtomicUsize,
}

impl ScriptedSolver {
    pub fn new(guesses: &[&str]) -> Self {
        Self::with_fallback(guesses, "")
    }

    pub fn with_fallback(guesses: &[&str], fallback: &str) -> Self {
        Self {
            guesses: Mutex::new(guesses.iter().map(|g| (*g).to_string()).collect()),
            fallback: fallback.to_string(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn always(guess: &str) -> Self {
        Self::with_fallback(&[], guess)
    }

    #[allow(dead_code)]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CaptchaSolver for ScriptedSolver {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn solve(&self, _image: &CaptchaImage) -> String {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.guesses
            .lock()
            .expect("solver script lock")
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

/// A small striped PNG standing in for a captcha.
pub fn captcha_png() -> Vec<u8> {
    let image = RgbImage::from_fn(60, 20, |x, _| {
        if x % 4 == 0 {
            Rgb([10, 10, 10])
        } else {
            Rgb([240, 240, 240])
        }
    });
    let mut out = Cursor::new(Vec::new());
    image
        .write_to(&mut out, ImageFormat::Png)
        .expect("encode captcha png");
    out.into_inner()
}

/// Bytes starting with a ZIP local header, padded to `len`.
pub fn zip_bytes(len: usize) -> Vec<u8> {
    let mut bytes = b"PK\x03\x04".to_vec();
    bytes.resize(len.max(4), 0x2a);
    bytes
}

pub fn zip_response(body: Vec<u8>) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body, "application/zip")
}

/// Mounts the session bootstrap page and the captcha image endpoint.
pub async fn mount_portal(server: &MockServer) {
    mount_portal_with_session(server, "test-session").await;
}

/// Like [`mount_portal`], with the index page handing out `session_id`.
pub async fn mount_portal_with_session(server: &MockServer, session_id: &str) {
    Mock::given(method("GET"))
        .and(path(INDEX_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", format!("JSESSIONID={session_id}; Path=/").as_str())
                .set_body_raw("<html>SICAR</html>", "text/html"),
        )
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path(CAPTCHA_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_raw(captcha_png(), "image/png"))
        .mount(server)
        .await;
}

/// Mounts a low-priority catch-all that rejects every protected request the
/// way the portal does for a wrong captcha: 200 with an HTML page.
pub async fn mount_captcha_rejection(server: &MockServer, request_path: &str) {
    Mock::given(path(request_path))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw("<html><p>Captcha inválido</p></html>", "text/html;charset=UTF-8"),
        )
        .with_priority(10)
        .mount(server)
        .await;
}

/// Number of requests the server has seen for `request_path`.
pub async fn request_count(server: &MockServer, request_path: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|request| request.url.path() == request_path)
        .count()
}

/// Config pointing at `server`, without inter-attempt pauses.
pub fn test_config(server: &MockServer) -> SicarConfig {
    let mut config = SicarConfig::with_base_url(server.uri());
    config.jitter_max_ms = 0;
    config
}
