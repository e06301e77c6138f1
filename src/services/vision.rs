use base64::Engine;
use reqwest::Client;
use serde::Deserialize;

use crate::models::bill::ExtractedBill;

/// Client for the generative-AI vision endpoint that extracts line items
/// and totals from a bill photo.
pub struct VisionClient {
    http: Client,
    api_key: String,
    model: String,
}

/// Extraction plus how long the collaborator call took.
#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    pub extracted: ExtractedBill,
    pub processing_ms: i64,
}

#[derive(Deserialize)]
struct GenerateResponse {
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Deserialize)]
struct CandidateContent {
    parts: Vec<ContentPart>,
}

#[derive(Deserialize)]
struct ContentPart {
    text: Option<String>,
}

const PROMPT: &str = concat!(
    "Analyze the provided image of a bill. The text may be handwritten ",
    "in Hindi or a mix of Hindi and English. Extract the following and ",
    "return it as a structured JSON object: ",
    "1. items: an array of objects, each with name (string), quantity ",
    "(number, default 1 if not mentioned) and price (number). ",
    "2. written_total (number): the total amount written on the bill, ",
    "or null if not present. ",
    "3. computed_total (number): the sum of all item prices you extracted. ",
    "4. mismatch (boolean): true if written_total does not match ",
    "computed_total. ",
    "Return ONLY valid JSON with these exact field names."
);

impl VisionClient {
    pub fn new(api_key: &str, model: &str) -> Self {
        Self {
            http: Client::new(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        }
    }

    /// Fetch the stored image and run it through the vision model.
    /// The collaborator owns the arithmetic; its JSON shape is trusted.
    pub async fn analyze(&self, image_url: &str) -> Result<AnalysisOutcome, VisionError> {
        let started = std::time::Instant::now();

        let image_bytes = self
            .http
            .get(image_url)
            .send()
            .await
            .map_err(VisionError::Fetch)?
            .error_for_status()
            .map_err(VisionError::Fetch)?
            .bytes()
            .await
            .map_err(VisionError::Fetch)?;

        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent",
            self.model
        );

        let request_body = serde_json::json!({
            "contents": [{
                "parts": [
                    { "text": PROMPT },
                    {
                        "inline_data": {
                            "mime_type": "image/jpeg",
                            "data": base64::engine::general_purpose::STANDARD.encode(&image_bytes),
                        }
                    }
                ]
            }]
        });

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request_body)
            .send()
            .await
            .map_err(VisionError::Http)?
            .error_for_status()
            .map_err(VisionError::Http)?;

        let generated: GenerateResponse = response.json().await.map_err(VisionError::Http)?;

        let text = generated
            .candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .and_then(|p| p.text.as_deref())
            .ok_or(VisionError::EmptyResponse)?;

        let extracted = parse_model_json(text)?;

        Ok(AnalysisOutcome {
            extracted,
            processing_ms: started.elapsed().as_millis() as i64,
        })
    }
}

/// Models wrap JSON answers in markdown fences more often than not;
/// strip them before parsing.
fn parse_model_json(text: &str) -> Result<ExtractedBill, VisionError> {
    let cleaned = text.replace("```json", "").replace("```", "");
    serde_json::from_str(cleaned.trim()).map_err(VisionError::Parse)
}

#[derive(Debug, thiserror::Error)]
pub enum VisionError {
    #[error("failed to fetch stored image: {0}")]
    Fetch(reqwest::Error),

    #[error("vision API request failed: {0}")]
    Http(reqwest::Error),

    #[error("vision API returned no content")]
    EmptyResponse,

    #[error("failed to parse vision response as bill data: {0}")]
    Parse(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fenced_json() {
        let text = "```json\n{\"items\":[{\"name\":\"Atta\",\"quantity\":2,\"price\":120}],\"written_total\":250,\"computed_total\":240,\"mismatch\":true}\n```";
        let bill = parse_model_json(text).unwrap();
        assert!(bill.mismatch);
        assert_eq!(bill.items.len(), 1);
        assert_eq!(bill.written_total, Some(250.0));
    }

    #[test]
    fn parses_bare_json() {
        let text = r#"{"items":[],"written_total":null,"computed_total":null,"mismatch":false}"#;
        let bill = parse_model_json(text).unwrap();
        assert!(bill.items.is_empty());
        assert_eq!(bill.written_total, None);
    }

    #[test]
    fn rejects_prose() {
        assert!(parse_model_json("I could not read this bill.").is_err());
    }
}
