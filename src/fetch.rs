//! HTTP access layer with status-aware retries.
//!
//! Every request goes through a single classify-then-act loop: a response
//! status is mapped to a disposition (success, empty success, transient,
//! permanent) and transient dispositions are retried with a fixed backoff
//! until the attempt budget runs out.

use crate::error::Error;
use futures::StreamExt;
use reqwest::header::HeaderMap;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Method, StatusCode};
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::time::sleep;
use tracing::{debug, error, warn};

/// Total attempts per request, first try included.
pub const MAX_ATTEMPTS: usize = 5;

/// Pause between attempts unless overridden via [`FetchClient::with_backoff`].
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(10);

/// Basic-auth material for a server target.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub secret: String,
}

/// Response data handed back to callers once the retry loop settles.
#[derive(Debug)]
pub struct FetchOutcome {
    pub body: Vec<u8>,
    pub status: StatusCode,
    pub headers: HeaderMap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Disposition {
    /// Usable response, hand the body back.
    Success,
    /// The resource is absent; callers get an empty body, not an error.
    EmptySuccess,
    /// Worth retrying after a pause.
    Transient,
    /// Will not self-heal, fail immediately.
    Permanent,
    /// Outside the known table; logged and treated as best-effort success.
    Unexpected,
}

fn classify(status: StatusCode, method: &Method) -> Disposition {
    let write = *method == Method::PUT || *method == Method::POST;

    match status.as_u16() {
        200 => Disposition::Success,
        201 if write => Disposition::Success,
        204 if *method == Method::GET => Disposition::Transient,
        204 => Disposition::Success,
        403 => Disposition::Permanent,
        404 => Disposition::EmptySuccess,
        429 => Disposition::Transient,
        500 => Disposition::Permanent,
        _ => Disposition::Unexpected,
    }
}

/// HTTP client wrapper carrying credentials and retry policy.
#[derive(Debug, Clone)]
pub struct FetchClient {
    http: reqwest::Client,
    credentials: Option<Credentials>,
    backoff: Duration,
}

impl FetchClient {
    pub fn new(credentials: Option<Credentials>, timeout: Duration) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Configuration(format!("failed to build http client: {e}")))?;

        Ok(Self {
            http,
            credentials,
            backoff: DEFAULT_BACKOFF,
        })
    }

    /// Overrides the pause between retry attempts.
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.credentials {
            Some(creds) => request.basic_auth(&creds.username, Some(&creds.secret)),
            None => request,
        }
    }

    /// Issues a request and drives it through the retry loop.
    ///
    /// Transient statuses (429, and 204 on reads) are retried up to
    /// [`MAX_ATTEMPTS`] times with a fixed pause in between. A body read that
    /// fails mid-transfer counts as a transient miss too. Permanent statuses
    /// (403, 500) abort on first sight.
    pub async fn fetch(
        &self,
        method: Method,
        url: &str,
        extra_headers: &[(String, String)],
    ) -> Result<FetchOutcome, Error> {
        let mut attempt = 1usize;

        loop {
            let mut request = self.authorize(self.http.request(method.clone(), url));
            for (name, value) in extra_headers {
                request = request.header(name, value);
            }

            let response = request.send().await.map_err(|source| Error::Transport {
                url: url.to_string(),
                source,
            })?;

            let status = response.status();
            let headers = response.headers().clone();
            let disposition = classify(status, &method);

            match disposition {
                Disposition::Success | Disposition::Unexpected => {
                    if disposition == Disposition::Unexpected {
                        warn!("unexpected status {} for {} {}", status, method, url);
                    }
                    match response.bytes().await {
                        Ok(body) => {
                            return Ok(FetchOutcome {
                                body: body.to_vec(),
                                status,
                                headers,
                            });
                        }
                        Err(source) => {
                            if attempt >= MAX_ATTEMPTS {
                                return Err(Error::Transport {
                                    url: url.to_string(),
                                    source,
                                });
                            }
                            debug!(
                                "body read failed for {} (attempt {}/{}), retrying: {}",
                                url, attempt, MAX_ATTEMPTS, source
                            );
                            sleep(self.backoff).await;
                            attempt += 1;
                        }
                    }
                }
                Disposition::EmptySuccess => {
                    debug!("{} returned 404, treating as empty body", url);
                    return Ok(FetchOutcome {
                        body: Vec::new(),
                        status,
                        headers,
                    });
                }
                Disposition::Transient => {
                    if attempt >= MAX_ATTEMPTS {
                        return Err(Error::RetryExhausted {
                            method,
                            url: url.to_string(),
                            attempts: attempt,
                        });
                    }
                    warn!(
                        "received {} for {} {} (attempt {}/{}), backing off {:?}",
                        status, method, url, attempt, MAX_ATTEMPTS, self.backoff
                    );
                    sleep(self.backoff).await;
                    attempt += 1;
                }
                Disposition::Permanent => {
                    error!("received {} for {} {}, giving up", status, method, url);
                    return Err(Error::Permanent {
                        status,
                        method,
                        url: url.to_string(),
                    });
                }
            }
        }
    }

    /// Streams a response body to `dest`, returning the bytes written.
    ///
    /// An interrupted stream is retried like any transient miss. A 404 leaves
    /// `dest` untouched and reports zero bytes.
    pub async fn download(&self, url: &str, dest: &Path) -> Result<u64, Error> {
        let mut attempt = 1usize;

        loop {
            let request = self.authorize(self.http.get(url));
            let response = request.send().await.map_err(|source| Error::Transport {
                url: url.to_string(),
                source,
            })?;

            let status = response.status();

            match classify(status, &Method::GET) {
                Disposition::Success | Disposition::Unexpected => {
                    let mut file = tokio::fs::File::create(dest).await?;
                    let mut stream = response.bytes_stream();
                    let mut written = 0u64;
                    let mut interrupted = None;

                    while let Some(chunk) = stream.next().await {
                        match chunk {
                            Ok(bytes) => {
                                file.write_all(&bytes).await?;
                                written += bytes.len() as u64;
                            }
                            Err(source) => {
                                interrupted = Some(source);
                                break;
                            }
                        }
                    }

                    match interrupted {
                        None => {
                            file.flush().await?;
                            return Ok(written);
                        }
                        Some(source) => {
                            if attempt >= MAX_ATTEMPTS {
                                return Err(Error::Transport {
                                    url: url.to_string(),
                                    source,
                                });
                            }
                            warn!(
                                "download of {} interrupted after {} bytes (attempt {}/{}), retrying",
                                url, written, attempt, MAX_ATTEMPTS
                            );
                            sleep(self.backoff).await;
                            attempt += 1;
                        }
                    }
                }
                Disposition::EmptySuccess => {
                    debug!("{} returned 404, nothing to download", url);
                    return Ok(0);
                }
                Disposition::Transient => {
                    if attempt >= MAX_ATTEMPTS {
                        return Err(Error::RetryExhausted {
                            method: Method::GET,
                            url: url.to_string(),
                            attempts: attempt,
                        });
                    }
                    warn!(
                        "received {} downloading {} (attempt {}/{}), backing off {:?}",
                        status, url, attempt, MAX_ATTEMPTS, self.backoff
                    );
                    sleep(self.backoff).await;
                    attempt += 1;
                }
                Disposition::Permanent => {
                    error!("received {} downloading {}, giving up", status, url);
                    return Err(Error::Permanent {
                        status,
                        method: Method::GET,
                        url: url.to_string(),
                    });
                }
            }
        }
    }

    /// Uploads a file as a multipart PUT, streaming it from disk.
    ///
    /// The body stream is consumed per attempt, so the form is rebuilt from
    /// the file on every retry.
    pub async fn upload(&self, url: &str, file: &Path) -> Result<FetchOutcome, Error> {
        let mut attempt = 1usize;

        loop {
            let handle = tokio::fs::File::open(file).await?;
            let len = handle.metadata().await?.len();
            let file_name = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "upload".to_string());

            let stream = tokio_util::io::ReaderStream::new(handle);
            let part = Part::stream_with_length(Body::wrap_stream(stream), len)
                .file_name(file_name);
            let form = Form::new().part("file", part);

            let request = self.authorize(self.http.put(url)).multipart(form);
            let response = request.send().await.map_err(|source| Error::Transport {
                url: url.to_string(),
                source,
            })?;

            let status = response.status();
            let headers = response.headers().clone();

            match classify(status, &Method::PUT) {
                Disposition::Success | Disposition::Unexpected => {
                    let body = response.bytes().await.map_err(|source| Error::Transport {
                        url: url.to_string(),
                        source,
                    })?;
                    return Ok(FetchOutcome {
                        body: body.to_vec(),
                        status,
                        headers,
                    });
                }
                Disposition::EmptySuccess => {
                    return Ok(FetchOutcome {
                        body: Vec::new(),
                        status,
                        headers,
                    });
                }
                Disposition::Transient => {
                    if attempt >= MAX_ATTEMPTS {
                        return Err(Error::RetryExhausted {
                            method: Method::PUT,
                            url: url.to_string(),
                            attempts: attempt,
                        });
                    }
                    warn!(
                        "received {} uploading to {} (attempt {}/{}), backing off {:?}",
                        status, url, attempt, MAX_ATTEMPTS, self.backoff
                    );
                    sleep(self.backoff).await;
                    attempt += 1;
                }
                Disposition::Permanent => {
                    error!("received {} uploading to {}, giving up", status, url);
                    return Err(Error::Permanent {
                        status,
                        method: Method::PUT,
                        url: url.to_string(),
                    });
                }
            }
        }
    }
}
