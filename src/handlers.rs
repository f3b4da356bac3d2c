use std::sync::Arc;

use axum::{
    extract::{multipart::MultipartRejection, Multipart, State},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    error::ApiError,
    fetcher::{FetchError, ValidationOutcome},
    model::{select_prediction, Classifier, InferenceError, Prediction},
    preprocess::{self, DecodeError, UPLOAD_EXTENSIONS},
    AppState,
};

#[derive(Debug, Deserialize)]
pub struct UrlRequest {
    url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UploadPrediction {
    #[serde(flatten)]
    prediction: Prediction,
    filename: String,
    format: &'static str,
}

#[derive(Debug, Serialize)]
pub struct UrlPrediction {
    #[serde(flatten)]
    prediction: Prediction,
    url: String,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum UrlValidation {
    Valid {
        valid: bool,
        content_type: String,
        content_length: Option<String>,
        url: String,
    },
    Invalid {
        valid: bool,
        error: String,
    },
}

struct UploadedFile {
    filename: String,
    bytes: Vec<u8>,
}

enum PipelineError {
    Decode(DecodeError),
    Inference(InferenceError),
}

/// Decode, infer and select off the async workers.
async fn classify(
    classifier: Arc<dyn Classifier>,
    image_data: Vec<u8>,
    context: &'static str,
) -> Result<Prediction, ApiError> {
    let outcome = tokio::task::spawn_blocking(move || {
        let tensor = preprocess::decode_and_normalize(&image_data).map_err(PipelineError::Decode)?;
        let distribution = classifier.infer(&tensor).map_err(PipelineError::Inference)?;
        select_prediction(distribution).map_err(PipelineError::Inference)
    })
    .await;

    match outcome {
        Ok(Ok(prediction)) => Ok(prediction),
        // The probe already passed, so a decode failure here is a processing error.
        Ok(Err(PipelineError::Decode(err))) => Err(ApiError::internal(context, err)),
        Ok(Err(PipelineError::Inference(err))) => Err(ApiError::internal(context, err)),
        Err(join_err) => Err(ApiError::internal(context, join_err)),
    }
}

async fn read_file_field(multipart: &mut Multipart) -> Result<Option<UploadedFile>, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::ClientInput(format!("Error reading upload: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }
        // A part without a filename is a plain form value, not an upload.
        let Some(filename) = field.file_name().map(str::to_string) else {
            continue;
        };
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::ClientInput(format!("Error reading upload: {}", e)))?;

        return Ok(Some(UploadedFile {
            filename,
            bytes: bytes.to_vec(),
        }));
    }

    Ok(None)
}

fn requested_url(payload: Option<Json<UrlRequest>>) -> Result<String, ApiError> {
    payload
        .and_then(|Json(body)| body.url)
        .map(|url| url.trim().to_string())
        .filter(|url| !url.is_empty())
        .ok_or_else(|| ApiError::ClientInput("No URL provided".into()))
}

pub async fn predict_handler(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadPrediction>, ApiError> {
    let mut multipart = multipart.map_err(|_| ApiError::ClientInput("No file uploaded".into()))?;

    let upload = read_file_field(&mut multipart)
        .await?
        .ok_or_else(|| ApiError::ClientInput("No file uploaded".into()))?;

    if upload.filename.is_empty() {
        return Err(ApiError::ClientInput("No file selected".into()));
    }
    if !preprocess::has_supported_extension(&upload.filename) {
        return Err(ApiError::ClientInput(format!(
            "Unsupported format. Valid formats: {}",
            UPLOAD_EXTENSIONS.join(", ")
        )));
    }
    if upload.bytes.is_empty() {
        return Err(ApiError::ClientInput("Uploaded file is empty".into()));
    }

    let probed = preprocess::probe(&upload.bytes)
        .map_err(|_| ApiError::InvalidImage("File is not a valid image".into()))?;

    let prediction = classify(state.classifier.clone(), upload.bytes, "Error processing image").await?;

    tracing::info!(
        filename = %upload.filename,
        label = %prediction.label,
        confidence = prediction.confidence,
        "classified upload"
    );

    Ok(Json(UploadPrediction {
        prediction,
        filename: upload.filename,
        format: probed.format.name(),
    }))
}

pub async fn predict_url_handler(
    State(state): State<AppState>,
    payload: Option<Json<UrlRequest>>,
) -> Result<Json<UrlPrediction>, ApiError> {
    let url = requested_url(payload)?;

    let image_data = state.fetcher.fetch(&url).await?;

    preprocess::probe(&image_data)
        .map_err(|_| ApiError::InvalidImage("Invalid image format".into()))?;

    let prediction = classify(
        state.classifier.clone(),
        image_data,
        "Error processing image from URL",
    )
    .await?;

    tracing::info!(
        %url,
        label = %prediction.label,
        confidence = prediction.confidence,
        "classified remote image"
    );

    Ok(Json(UrlPrediction { prediction, url }))
}

pub async fn validate_url_handler(
    State(state): State<AppState>,
    payload: Option<Json<UrlRequest>>,
) -> Result<Json<UrlValidation>, ApiError> {
    let url = requested_url(payload)?;

    let validation = match state.fetcher.validate(&url).await {
        ValidationOutcome::Valid {
            content_type,
            content_length,
        } => UrlValidation::Valid {
            valid: true,
            content_type,
            content_length,
            url,
        },
        ValidationOutcome::Invalid(err) if err.is_syntax() => return Err(err.into()),
        ValidationOutcome::Invalid(FetchError::Request(err)) => UrlValidation::Invalid {
            valid: false,
            error: format!("Error accessing URL: {}", err),
        },
        ValidationOutcome::Invalid(err) => UrlValidation::Invalid {
            valid: false,
            error: err.to_string(),
        },
    };

    Ok(Json(validation))
}

/// The router is only served after the model has loaded.
pub async fn health_check() -> Json<serde_json::Value> {
    Json(json!({ "status": "OK", "model_loaded": true }))
}
