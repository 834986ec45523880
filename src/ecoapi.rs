use anyhow::{anyhow, Context, Result};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use serde::Serialize;

use crate::models::{Classification, DisposalGuide, RawClassification, WasteCategory};

pub mod guide;

/// How much of an unparseable body is echoed back in errors.
const BODY_PREVIEW_CHARS: usize = 100;

#[derive(Serialize)]
struct GuideRequest<'a> {
    category: &'a str,
}

/// Client for the classification and disposal-guide webhooks.
#[derive(Debug, Clone)]
pub struct EcoApi {
    client: Client,
    classify_url: String,
    guide_url: Option<String>,
}

impl EcoApi {
    pub fn new(classify_url: impl Into<String>, guide_url: Option<String>) -> Self {
        Self {
            client: Client::new(),
            classify_url: classify_url.into(),
            guide_url,
        }
    }

    /// Sends an image to the classification webhook as the `image` form field.
    pub async fn classify_image(
        &self,
        image: Vec<u8>,
        filename: &str,
        content_type: Option<&str>,
    ) -> Result<Classification> {
        log::trace!("[classify_image] Uploading {filename} ({} bytes)...", image.len());

        let mut part = Part::bytes(image).file_name(filename.to_string());
        if let Some(content_type) = content_type {
            part = part
                .mime_str(content_type)
                .with_context(|| format!("Invalid content type for {filename}: {content_type}"))?;
        }

        let response = self
            .client
            .post(&self.classify_url)
            .multipart(Form::new().part("image", part))
            .send()
            .await
            .context("Could not reach the classification webhook.")?;

        let body = read_body(response, "Classification").await?;
        let classification = parse_classification(&body)?;

        log::info!(
            "[classify_image] {filename} classified as {} ({}%)",
            classification.label,
            classification.confidence
        );
        Ok(classification)
    }

    /// Asks the guide webhook how to dispose of `category`.
    pub async fn fetch_disposal_guide(&self, category: &str) -> Result<DisposalGuide> {
        let url = self
            .guide_url
            .as_deref()
            .context("Disposal guide webhook URL not configured.")?;

        let response = self
            .client
            .post(url)
            .json(&GuideRequest { category })
            .send()
            .await
            .context("Could not reach the disposal guide webhook.")?;

        let body = read_body(response, "Disposal guide").await?;
        serde_json::from_str::<DisposalGuide>(&body)
            .with_context(|| format!("Invalid JSON from disposal guide webhook: {}", preview(&body)))
    }

    /// The webhook's guide for `category` when available, otherwise the built-in one.
    pub async fn disposal_guide(&self, category: WasteCategory) -> DisposalGuide {
        if self.guide_url.is_none() {
            return guide::builtin_guide(category);
        }

        self.fetch_disposal_guide(category.as_str())
            .await
            .unwrap_or_else(|err| {
                log::warn!("[disposal_guide] Falling back to built-in guide for {category}: {err:#}");
                guide::builtin_guide(category)
            })
    }
}

/// Returns the body of a successful, non-empty response.
async fn read_body(response: Response, what: &str) -> Result<String> {
    let status = response.status();
    let body = response
        .text()
        .await
        .with_context(|| format!("{what} response could not be read."))?;

    if !status.is_success() {
        return Err(anyhow!("{what} failed ({status}): {body}"));
    }

    Ok(body)
}

/// Validates a classification webhook body.
pub fn parse_classification(body: &str) -> Result<Classification> {
    if body.trim().is_empty() {
        return Err(anyhow!("Classification webhook returned empty response"));
    }

    let raw = serde_json::from_str::<RawClassification>(body)
        .with_context(|| format!("Invalid JSON response from classification webhook: {}", preview(body)))?;

    Ok(Classification::from(raw))
}

fn preview(body: &str) -> String {
    body.chars().take(BODY_PREVIEW_CHARS).collect()
}
