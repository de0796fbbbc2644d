//! Google Generative Language API client (Gemini for text/editing, Imagen for generation)

use super::Gateway;
use crate::config::CompanionConfig;
use crate::error::{ConfigError, RemoteFailure};
use crate::session::ImageRef;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

const DESCRIBE_INSTRUCTION: &str = "Describe this image in detail. This description will be used as a base prompt for further image editing.";
const NO_IMAGE_RETURNED: &str = "no image returned; the request may have been blocked by safety policies or the instruction was invalid";
const GENERATED_MIME_TYPE: &str = "image/jpeg";
const GENERATED_ASPECT_RATIO: &str = "1:1";

/// Model identifiers for each remote operation
#[derive(Debug, Clone, PartialEq, Eq)]
struct GeminiModels {
    describe: String,
    edit: String,
    generate: String,
}

/// Gateway backed by the Generative Language REST API
pub struct GeminiGateway {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
    models: GeminiModels,
}

impl GeminiGateway {
    pub fn from_config(config: &CompanionConfig) -> Result<Self, ConfigError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or(ConfigError::MissingApiKey)?;

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            client,
            api_base: config.api_base.trim().trim_end_matches('/').to_string(),
            api_key,
            models: GeminiModels {
                describe: config.describe_model.clone(),
                edit: config.edit_model.clone(),
                generate: config.generate_model.clone(),
            },
        })
    }

    fn endpoint(&self, model: &str, method: &str) -> String {
        let model = model.trim();
        let model_path = if model.starts_with("models/") {
            model.to_string()
        } else {
            format!("models/{}", model)
        };
        format!("{}/{}:{}", self.api_base, model_path, method)
    }

    async fn post<B, R>(&self, url: &str, body: &B) -> Result<R, RemoteFailure>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        tracing::debug!(%url, "sending request");

        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        decode_response(status, &text)
    }
}

/// Turn a status and raw body into the typed payload or a failure
fn decode_response<R: DeserializeOwned>(status: StatusCode, body: &str) -> Result<R, RemoteFailure> {
    if !status.is_success() {
        return Err(RemoteFailure::new(format!(
            "API returned status {}: {}",
            status,
            api_error_message(body)
        )));
    }

    serde_json::from_str(body).map_err(|e| RemoteFailure::new(format!("malformed response: {}", e)))
}

#[async_trait]
impl Gateway for GeminiGateway {
    async fn describe_image(&self, image: &ImageRef) -> Result<String, RemoteFailure> {
        let request = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![Part::image(image), Part::text(DESCRIBE_INSTRUCTION)],
            }],
            generation_config: None,
        };
        let url = self.endpoint(&self.models.describe, "generateContent");
        let response: GenerateContentResponse = self.post(&url, &request).await?;
        extract_text(&response)
    }

    async fn edit_image(&self, image: &ImageRef, instruction: &str) -> Result<ImageRef, RemoteFailure> {
        let request = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![Part::image(image), Part::text(instruction)],
            }],
            generation_config: Some(GenerationConfig {
                response_modalities: vec!["IMAGE".to_string()],
            }),
        };
        let url = self.endpoint(&self.models.edit, "generateContent");
        let response: GenerateContentResponse = self.post(&url, &request).await?;
        extract_image(&response, image.mime_type())
    }

    async fn generate_image(&self, prompt: &str) -> Result<ImageRef, RemoteFailure> {
        let request = PredictRequest {
            instances: vec![PredictInstance {
                prompt: prompt.to_string(),
            }],
            parameters: PredictParameters {
                sample_count: 1,
                aspect_ratio: GENERATED_ASPECT_RATIO.to_string(),
                output_options: OutputOptions {
                    mime_type: GENERATED_MIME_TYPE.to_string(),
                },
            },
        };
        let url = self.endpoint(&self.models.generate, "predict");
        let response: PredictResponse = self.post(&url, &request).await?;
        extract_prediction(&response)
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, alias = "inline_data", skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

impl Part {
    fn text(text: &str) -> Self {
        Self {
            text: Some(text.to_string()),
            inline_data: None,
        }
    }

    fn image(image: &ImageRef) -> Self {
        Self {
            text: None,
            inline_data: Some(InlineData {
                mime_type: Some(image.mime_type().to_string()),
                data: image.to_base64(),
            }),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    #[serde(default, alias = "mime_type", skip_serializing_if = "Option::is_none")]
    mime_type: Option<String>,
    #[serde(default)]
    data: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_modalities: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Serialize)]
struct PredictRequest {
    instances: Vec<PredictInstance>,
    parameters: PredictParameters,
}

#[derive(Serialize)]
struct PredictInstance {
    prompt: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PredictParameters {
    sample_count: u32,
    aspect_ratio: String,
    output_options: OutputOptions,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OutputOptions {
    mime_type: String,
}

#[derive(Debug, Deserialize)]
struct PredictResponse {
    #[serde(default)]
    predictions: Vec<Prediction>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Prediction {
    #[serde(default)]
    bytes_base64_encoded: Option<String>,
    #[serde(default)]
    mime_type: Option<String>,
    #[serde(default)]
    rai_filtered_reason: Option<String>,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    message: String,
}

fn api_error_message(body: &str) -> String {
    match serde_json::from_str::<ApiErrorBody>(body) {
        Ok(parsed) if !parsed.error.message.is_empty() => parsed.error.message,
        _ if body.trim().is_empty() => "empty response body".to_string(),
        _ => body.trim().to_string(),
    }
}

/// Why a response carried no usable payload, if the API said so
fn refusal_reason(response: &GenerateContentResponse) -> Option<String> {
    if let Some(reason) = response
        .prompt_feedback
        .as_ref()
        .and_then(|feedback| feedback.block_reason.clone())
    {
        return Some(format!("prompt blocked ({})", reason));
    }
    response
        .candidates
        .first()
        .and_then(|candidate| candidate.finish_reason.clone())
        .filter(|reason| reason != "STOP")
        .map(|reason| format!("generation stopped ({})", reason))
}

fn first_parts(response: &GenerateContentResponse) -> &[Part] {
    response
        .candidates
        .first()
        .and_then(|candidate| candidate.content.as_ref())
        .map(|content| content.parts.as_slice())
        .unwrap_or_default()
}

fn extract_text(response: &GenerateContentResponse) -> Result<String, RemoteFailure> {
    let text: String = first_parts(response)
        .iter()
        .filter_map(|part| part.text.as_deref())
        .collect();

    if text.trim().is_empty() {
        let cause = match refusal_reason(response) {
            Some(reason) => format!("no text returned: {}", reason),
            None => "no text returned".to_string(),
        };
        return Err(RemoteFailure::new(cause));
    }
    Ok(text.trim().to_string())
}

fn extract_image(response: &GenerateContentResponse, fallback_mime: &str) -> Result<ImageRef, RemoteFailure> {
    let inline = first_parts(response)
        .iter()
        .filter_map(|part| part.inline_data.as_ref())
        .find(|inline| !inline.data.is_empty());

    match inline {
        Some(inline) => {
            let mime_type = inline.mime_type.as_deref().unwrap_or(fallback_mime);
            Ok(ImageRef::from_base64(&inline.data, mime_type)?)
        }
        None => {
            let cause = match refusal_reason(response) {
                Some(reason) => format!("{}: {}", NO_IMAGE_RETURNED, reason),
                None => NO_IMAGE_RETURNED.to_string(),
            };
            Err(RemoteFailure::new(cause))
        }
    }
}

fn extract_prediction(response: &PredictResponse) -> Result<ImageRef, RemoteFailure> {
    let Some(prediction) = response.predictions.first() else {
        return Err(RemoteFailure::new(NO_IMAGE_RETURNED));
    };

    match prediction.bytes_base64_encoded.as_deref() {
        Some(data) if !data.is_empty() => {
            let mime_type = prediction.mime_type.as_deref().unwrap_or(GENERATED_MIME_TYPE);
            Ok(ImageRef::from_base64(data, mime_type)?)
        }
        _ => {
            let cause = match &prediction.rai_filtered_reason {
                Some(reason) => format!("{}: {}", NO_IMAGE_RETURNED, reason),
                None => NO_IMAGE_RETURNED.to_string(),
            };
            Err(RemoteFailure::new(cause))
        }
    }
}
