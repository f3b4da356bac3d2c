use std::{
    env, fs,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use anyhow::{bail, Context};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};

const DEFAULT_MODEL_PATH: &str = "./model/frozen_graph.pb";
const MODEL_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub port: u16,
    pub body_limit_bytes: usize,
    pub model_path: PathBuf,
    pub model_url: Option<String>,
    pub input_op: String,
    pub output_op: String,
}

impl ServiceConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let body_limit_mb: usize = parse_or(&lookup, "BODY_LIMIT_MB", 16)?;
        let port = parse_or(&lookup, "PORT", 5000)?;

        Ok(ServiceConfig {
            port,
            body_limit_bytes: body_limit_mb * 1024 * 1024,
            model_path: lookup("MODEL_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_PATH)),
            model_url: lookup("MODEL_URL").filter(|url| !url.trim().is_empty()),
            input_op: lookup("MODEL_INPUT_OP").unwrap_or_else(|| "x".into()),
            output_op: lookup("MODEL_OUTPUT_OP").unwrap_or_else(|| "Identity".into()),
        })
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} must be a valid number, got '{}'", key, raw)),
        None => Ok(default),
    }
}

async fn download_file(url: &str, path: &Path) -> anyhow::Result<()> {
    tracing::info!(%url, path = %path.display(), "downloading model");

    let mut header_map = HeaderMap::new();
    header_map.insert(ACCEPT, HeaderValue::from_static("application/octet-stream"));

    let client = reqwest::Client::builder()
        .timeout(MODEL_DOWNLOAD_TIMEOUT)
        .build()?;
    let response = client
        .get(url)
        .headers(header_map)
        .send()
        .await
        .with_context(|| format!("failed to request {}", url))?;

    if !response.status().is_success() {
        bail!("failed to download {}: {}", url, response.status());
    }

    let bytes = response.bytes().await.context("failed to read model body")?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(path, &bytes).with_context(|| format!("failed to write {}", path.display()))?;

    tracing::info!(bytes = bytes.len(), path = %path.display(), "model downloaded");
    Ok(())
}

/// Downloads the model once if it is not on disk yet. No checksum, no resume.
pub async fn ensure_model_exists(model_path: &Path, model_url: Option<&str>) -> anyhow::Result<()> {
    if model_path.exists() {
        tracing::info!(path = %model_path.display(), "model already present");
        return Ok(());
    }

    let Some(url) = model_url else {
        bail!(
            "{} does not exist and MODEL_URL is not set",
            model_path.display()
        );
    };
    download_file(url, model_path).await
}
