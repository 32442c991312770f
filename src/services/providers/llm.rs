//! OpenAI-compatible chat completions provider
//!
//! Serves as both the entity/location extractor and the explanation generator. Only
//! the `/chat/completions` endpoint is used.
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{
    error::{AppError, AppResult},
    models::{normalize_category, Extraction, ExtractionRequest},
    services::explanation::strip_code_fences,
    services::providers::{EntityExtractor, ExplanationGenerator},
};

#[derive(Clone)]
pub struct LlmClient {
    http_client: HttpClient,
    api_key: String,
    api_url: String,
    model: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Raw extractor output before normalization
#[derive(Debug, Deserialize)]
struct RawExtraction {
    #[serde(default)]
    category: String,
    #[serde(default, alias = "entityNames")]
    entity_names: Vec<String>,
    #[serde(default)]
    location: Option<String>,
    #[serde(default, alias = "locationArray")]
    location_array: Option<Vec<String>>,
}

impl LlmClient {
    pub fn new(api_key: String, api_url: String, model: String, timeout: Duration) -> AppResult<Self> {
        let http_client = HttpClient::builder().timeout(timeout).build()?;
        Ok(Self {
            http_client,
            api_key,
            api_url: api_url.trim_end_matches('/').to_string(),
            model,
        })
    }

    async fn complete(&self, prompt: &str, temperature: f32) -> AppResult<String> {
        let url = format!("{}/chat/completions", self.api_url);
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature,
        };

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalApi(format!(
                "LLM API returned status {}: {}",
                status, body
            )));
        }

        let chat: ChatResponse = response.json().await?;
        chat.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| AppError::ExternalApi("LLM response contained no content".to_string()))
    }
}

fn extraction_prompt(request: &ExtractionRequest) -> String {
    let mut prompt = String::from(
        "Extract structured search parameters from a description of someone's cultural taste.\n\
         Respond with only a JSON object of the form:\n\
         {\"category\": string, \"entity_names\": [string], \"location\": string or null, \"location_array\": [string] or null}\n\
         - category: one of place, artist, movie, book, brand, podcast, tv_show, videogame, destination\n\
         - entity_names: canonical names of specific things mentioned or strongly implied\n\
         - location: a single city or region, if one is mentioned\n\
         - location_array: several regions, only when more than one is mentioned; never set together with location\n\n",
    );
    prompt.push_str(&format!("Taste: {}\n", request.taste));
    if !request.similar_tastes.is_empty() {
        prompt.push_str("Earlier related tastes:\n");
        for similar in &request.similar_tastes {
            prompt.push_str(&format!("- {}\n", similar));
        }
    }
    prompt
}

/// Parses extractor output into a normalized [`Extraction`]
fn parse_extraction(text: &str) -> AppResult<Extraction> {
    let raw: RawExtraction = serde_json::from_str(strip_code_fences(text)).map_err(|e| {
        AppError::ExternalApi(format!("Failed to parse extraction response: {}", e))
    })?;

    let entity_names: Vec<String> = raw
        .entity_names
        .into_iter()
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .collect();

    Ok(Extraction {
        category: normalize_category(&raw.category),
        entity_names,
        location: raw.location.filter(|l| !l.trim().is_empty()),
        location_array: raw.location_array.filter(|l| !l.is_empty()),
    })
}

#[async_trait::async_trait]
impl EntityExtractor for LlmClient {
    async fn extract(&self, request: &ExtractionRequest) -> AppResult<Extraction> {
        let text = self.complete(&extraction_prompt(request), 0.0).await?;
        let extraction = parse_extraction(&text)?;

        tracing::info!(
            category = %extraction.category,
            entities = extraction.entity_names.len(),
            location = ?extraction.location,
            provider = "llm",
            "Extraction completed"
        );

        Ok(extraction)
    }
}

#[async_trait::async_trait]
impl ExplanationGenerator for LlmClient {
    async fn generate(&self, prompt: &str) -> AppResult<String> {
        self.complete(prompt, 0.7).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_extraction_normalizes() {
        let text = r#"```json
{"category": "Place ", "entity_names": ["Sushi", "  ", "Ramen "], "location": "Tokyo", "location_array": []}
```"#;
        let extraction = parse_extraction(text).unwrap();
        assert_eq!(extraction.category, "place");
        assert_eq!(extraction.entity_names, vec!["Sushi", "Ramen"]);
        assert_eq!(extraction.location, Some("Tokyo".to_string()));
        assert_eq!(extraction.location_array, None);
    }

    #[test]
    fn test_parse_extraction_accepts_camel_case() {
        let text = r#"{"category": "artist", "entityNames": ["Miles Davis"], "locationArray": ["Paris", "Berlin"]}"#;
        let extraction = parse_extraction(text).unwrap();
        assert_eq!(extraction.entity_names, vec!["Miles Davis"]);
        assert_eq!(
            extraction.location_array,
            Some(vec!["Paris".to_string(), "Berlin".to_string()])
        );
    }

    #[test]
    fn test_parse_extraction_rejects_garbage() {
        let err = parse_extraction("I think you like jazz").unwrap_err();
        assert!(err.to_string().contains("Failed to parse extraction response"));
    }

    #[test]
    fn test_extraction_prompt_lists_similar_tastes() {
        let prompt = extraction_prompt(&ExtractionRequest {
            taste: "jazz and Italian food".to_string(),
            similar_tastes: vec!["bebop".to_string()],
        });
        assert!(prompt.contains("Taste: jazz and Italian food"));
        assert!(prompt.contains("- bebop"));
    }

    #[test]
    fn test_chat_response_deserialization() {
        let json = r#"{"choices": [{"message": {"role": "assistant", "content": "hi"}}]}"#;
        let chat: ChatResponse = serde_json::from_str(json).unwrap();
        assert_eq!(chat.choices[0].message.content.as_deref(), Some("hi"));
    }
}
