use std::time::Duration;

use reqwest::{
    header::{CONTENT_LENGTH, CONTENT_TYPE},
    Client, Response,
};
use thiserror::Error;
use url::Url;

/// Some image hosts refuse clients that do not look like a browser.
const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

#[derive(Debug, Clone, Copy)]
pub struct FetchLimits {
    pub probe_timeout: Duration,
    pub download_timeout: Duration,
    pub max_bytes: u64,
}

impl Default for FetchLimits {
    fn default() -> Self {
        FetchLimits {
            probe_timeout: Duration::from_secs(10),
            download_timeout: Duration::from_secs(30),
            max_bytes: 10 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Invalid URL format")]
    InvalidUrl,
    #[error("Only HTTP and HTTPS URLs are supported")]
    UnsupportedScheme,
    #[error("{}", not_an_image_message(.content_type))]
    NotAnImage { content_type: String },
    #[error("Image too large. Maximum size: {}MB", .limit / (1024 * 1024))]
    TooLarge { limit: u64 },
    #[error("{0}")]
    Request(#[from] reqwest::Error),
}

impl FetchError {
    /// Whether the URL itself was malformed, as opposed to what it points at.
    pub fn is_syntax(&self) -> bool {
        matches!(self, FetchError::InvalidUrl | FetchError::UnsupportedScheme)
    }
}

fn not_an_image_message(content_type: &str) -> String {
    if content_type.contains("text/html") {
        format!(
            "URL points to a webpage, not an image. Content-Type: {}. Please use a direct link to an image file (ending in .jpg, .png, .jpeg, etc.)",
            content_type
        )
    } else {
        format!(
            "URL does not point to an image. Content-Type: {}. Please use a direct link to an image file.",
            content_type
        )
    }
}

#[derive(Debug)]
pub enum ValidationOutcome {
    Valid {
        content_type: String,
        content_length: Option<String>,
    },
    Invalid(FetchError),
}

pub fn parse_image_url(raw: &str) -> Result<Url, FetchError> {
    let raw = raw.trim();
    // `http:example.com` has no authority even though `Url` would repair it.
    match raw.split_once(':') {
        Some((_, rest)) if rest.starts_with("//") => {}
        _ => return Err(FetchError::InvalidUrl),
    }
    let url = Url::parse(raw).map_err(|_| FetchError::InvalidUrl)?;

    match url.host_str() {
        Some(host) if !host.is_empty() => {}
        _ => return Err(FetchError::InvalidUrl),
    }

    match url.scheme() {
        "http" | "https" => Ok(url),
        _ => Err(FetchError::UnsupportedScheme),
    }
}

#[derive(Debug, Clone)]
pub struct RemoteImageFetcher {
    client: Client,
    limits: FetchLimits,
}

impl RemoteImageFetcher {
    pub fn new(limits: FetchLimits) -> Result<Self, reqwest::Error> {
        let client = Client::builder().user_agent(BROWSER_USER_AGENT).build()?;
        Ok(RemoteImageFetcher { client, limits })
    }

    /// HEAD probe. Never returns an error; every failure is an `Invalid` outcome.
    pub async fn validate(&self, raw: &str) -> ValidationOutcome {
        match self.probe(raw).await {
            Ok((content_type, content_length)) => ValidationOutcome::Valid {
                content_type,
                content_length,
            },
            Err(err) => ValidationOutcome::Invalid(err),
        }
    }

    async fn probe(&self, raw: &str) -> Result<(String, Option<String>), FetchError> {
        let url = parse_image_url(raw)?;
        let response = self
            .client
            .head(url)
            .timeout(self.limits.probe_timeout)
            .send()
            .await?
            .error_for_status()?;

        let content_type = self.check_content_type(&response)?;
        self.check_declared_length(&response)?;
        let content_length = header_str(&response, CONTENT_LENGTH.as_str());

        Ok((content_type, content_length))
    }

    /// Full GET. The size limit is checked against the declared length before the
    /// body is read, then against the bytes actually received.
    pub async fn fetch(&self, raw: &str) -> Result<Vec<u8>, FetchError> {
        let url = parse_image_url(raw)?;
        let mut response = self
            .client
            .get(url)
            .timeout(self.limits.download_timeout)
            .send()
            .await?
            .error_for_status()?;

        self.check_content_type(&response)?;
        let declared = self.check_declared_length(&response)?;

        let mut body = Vec::with_capacity(declared.unwrap_or(0) as usize);
        while let Some(chunk) = response.chunk().await? {
            if (body.len() + chunk.len()) as u64 > self.limits.max_bytes {
                return Err(FetchError::TooLarge {
                    limit: self.limits.max_bytes,
                });
            }
            body.extend_from_slice(&chunk);
        }

        Ok(body)
    }

    fn check_content_type(&self, response: &Response) -> Result<String, FetchError> {
        let content_type = header_str(response, CONTENT_TYPE.as_str())
            .unwrap_or_default()
            .to_lowercase();

        if content_type.starts_with("image/") {
            Ok(content_type)
        } else {
            Err(FetchError::NotAnImage { content_type })
        }
    }

    /// An unparsable header is ignored; the received byte count still applies.
    fn check_declared_length(&self, response: &Response) -> Result<Option<u64>, FetchError> {
        let declared = header_str(response, CONTENT_LENGTH.as_str())
            .and_then(|value| value.trim().parse::<u64>().ok());

        match declared {
            Some(len) if len > self.limits.max_bytes => Err(FetchError::TooLarge {
                limit: self.limits.max_bytes,
            }),
            _ => Ok(declared),
        }
    }
}

fn header_str(response: &Response, name: &str) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}
