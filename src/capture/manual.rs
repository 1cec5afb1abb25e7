//! Manual redirect capture: print the URL, read the redirect back from a reader

use async_trait::async_trait;
use std::io::{BufRead, BufReader, Write};
use std::sync::{Arc, Mutex};
use url::Url;

use super::{CaptureRequest, CaptureResult, RedirectCapture, bounded, present_url};
use crate::error::{AuthError, Result};

type SharedReader = Arc<Mutex<Box<dyn BufRead + Send>>>;

/// Capture by asking the user to paste the redirect URL
///
/// A full URL has its query parsed. A value without `=` (an OAuth 1.0a
/// out-of-band verifier, or a bare authorization code) is stored under `code`.
/// The read happens on a blocking thread; if the capture times out that
/// thread stays parked on the reader until the next line arrives.
#[derive(Clone)]
pub struct ManualCapture {
    reader: SharedReader,
    prompt: bool,
}

impl ManualCapture {
    /// Read from stdin
    #[must_use]
    pub fn new() -> Self {
        Self {
            reader: Arc::new(Mutex::new(Box::new(BufReader::new(std::io::stdin())))),
            prompt: true,
        }
    }

    /// Read from an arbitrary reader, without printing a prompt
    #[must_use]
    pub fn with_reader(reader: impl BufRead + Send + 'static) -> Self {
        Self {
            reader: Arc::new(Mutex::new(Box::new(reader))),
            prompt: false,
        }
    }
}

impl Default for ManualCapture {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ManualCapture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualCapture")
            .field("prompt", &self.prompt)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl RedirectCapture for ManualCapture {
    async fn capture(&self, request: CaptureRequest) -> Result<CaptureResult> {
        present_url(&request.authorization_url, request.open_browser);

        let reader = Arc::clone(&self.reader);
        let prompt = self.prompt;
        let line = bounded(
            async move {
                tokio::task::spawn_blocking(move || read_line(&reader, prompt))
                    .await
                    .map_err(|e| AuthError::capture_failed(format!("input task failed: {e}")))?
            },
            request.timeout,
            &request.cancel,
        )
        .await?;

        parse_input(&line)?.ensure_granted()
    }
}

fn read_line(reader: &SharedReader, prompt: bool) -> Result<String> {
    if prompt {
        print!("After authorizing access, paste the URL you were redirected to (or the code shown): ");
        std::io::stdout().flush()?;
    }
    let mut reader = reader
        .lock()
        .map_err(|_| AuthError::capture_failed("input reader is poisoned"))?;
    let mut line = String::new();
    if reader.read_line(&mut line)? == 0 {
        return Err(AuthError::capture_failed("input closed before a redirect was entered"));
    }
    Ok(line)
}

/// Interpret one pasted line
pub(crate) fn parse_input(line: &str) -> Result<CaptureResult> {
    let input = line.trim();
    if input.is_empty() {
        return Err(AuthError::capture_failed("no redirect URL was entered"));
    }

    if let Ok(url) = Url::parse(input) {
        if url.query().is_some_and(|q| !q.is_empty()) {
            return Ok(CaptureResult::from_url(&url));
        }
        return Err(AuthError::capture_failed(format!(
            "redirect URL '{input}' carries no query parameters"
        )));
    }

    if input.contains('=') {
        return Ok(CaptureResult::from_query(input));
    }

    Ok(CaptureResult::from_params(
        [("code".to_string(), input.to_string())].into(),
    ))
}
