use crate::domain::AiClient;
use crate::errors::AiError;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const GEMINI_MODEL: &str = "gemini-1.5-flash";

/// Thin HTTP client for the Gemini generateContent endpoint.
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl GeminiClient {
    pub fn new(api_key: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key,
            model: GEMINI_MODEL.to_string(),
        }
    }

    async fn generate(&self, parts: serde_json::Value) -> Result<String, AiError> {
        if self.api_key.is_empty() {
            return Err(AiError::MissingApiKey);
        }
        let url = format!(
            "{}/{}:generateContent?key={}",
            GEMINI_API_BASE, self.model, self.api_key
        );
        let body = json!({ "contents": [{ "parts": parts }] });

        let response = self.http.post(&url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(AiError::Service(format!("{status}: {detail}")));
        }

        let parsed: GenerateContentResponse = response.json().await?;
        parsed
            .candidates
            .into_iter()
            .flatten()
            .next()
            .and_then(|c| c.content.parts.into_iter().find_map(|p| p.text))
            .ok_or_else(|| AiError::MalformedResponse("no text candidate in response".to_string()))
    }
}

#[async_trait]
impl AiClient for GeminiClient {
    async fn generate_text(&self, prompt: &str) -> Result<String, AiError> {
        debug!(prompt_len = prompt.len(), "Gemini: generating text");
        self.generate(json!([{ "text": prompt }])).await
    }

    async fn analyze_image(&self, image_base64: &str, prompt: &str) -> Result<String, AiError> {
        debug!(prompt_len = prompt.len(), "Gemini: analyzing image");
        self.generate(json!([
            { "text": prompt },
            { "inline_data": { "mime_type": "image/jpeg", "data": image_base64 } }
        ]))
        .await
    }
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Option<Vec<Candidate>>,
}

#[derive(Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

/// A structured meme concept produced by the model.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct MemeConcept {
    pub caption: String,
    #[serde(default)]
    pub hashtags: Vec<String>,
    #[serde(default)]
    pub virality_score: Option<f32>,
    #[serde(default)]
    pub reasoning: Option<String>,
}

/// AI meme studio: prompt construction plus defensive parsing of the
/// model's structured replies.
pub struct MemeStudio {
    client: Arc<dyn AiClient>,
}

impl MemeStudio {
    pub fn new(client: Arc<dyn AiClient>) -> Self {
        Self { client }
    }

    /// Asks the model for a meme concept as strict JSON and parses it.
    /// A reply we can't parse is surfaced as a typed error; nothing partial
    /// is applied.
    pub async fn generate_concept(&self, idea: &str) -> Result<MemeConcept, AiError> {
        let prompt = format!(
            "You are a meme writer. For the idea below, reply with ONLY a JSON \
             object (no prose, no markdown) with keys: \"caption\" (string), \
             \"hashtags\" (array of strings), \"virality_score\" (number 0-100), \
             \"reasoning\" (one sentence).\n\nIdea: {idea}"
        );
        let raw = self.client.generate_text(&prompt).await?;
        parse_json_reply(&raw)
    }

    /// Suggests captions for an existing image, passed inline.
    pub async fn suggest_captions(&self, image: &[u8]) -> Result<Vec<String>, AiError> {
        let prompt = "Suggest 4 funny meme captions for this image. Reply with ONLY a \
                      JSON array of strings, no prose, no markdown.";
        let encoded = BASE64.encode(image);
        let raw = self.client.analyze_image(&encoded, prompt).await?;
        parse_json_reply(&raw)
    }
}

/// Parses a model reply that is supposed to be JSON, stripping the markdown
/// code fences models like to wrap it in.
pub fn parse_json_reply<T: serde::de::DeserializeOwned>(raw: &str) -> Result<T, AiError> {
    let cleaned = strip_code_fences(raw);
    serde_json::from_str(cleaned)
        .map_err(|e| AiError::MalformedResponse(format!("{e}: {cleaned:.120}")))
}

fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string ("json") on the opening fence line.
    let rest = match rest.split_once('\n') {
        Some((_, body)) => body,
        None => rest,
    };
    rest.strip_suffix("```").map(str::trim).unwrap_or(rest).trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::AiError;

    #[test]
    fn strips_fenced_json() {
        let raw = "```json\n{\"caption\":\"hi\"}\n```";
        assert_eq!(strip_code_fences(raw), "{\"caption\":\"hi\"}");
    }

    #[test]
    fn leaves_bare_json_alone() {
        assert_eq!(strip_code_fences("  {\"a\":1} "), "{\"a\":1}");
    }

    #[test]
    fn parses_fenced_concept() {
        let raw = "```json\n{\"caption\":\"POV: it compiles\",\"hashtags\":[\"#rust\"],\
                   \"virality_score\":87,\"reasoning\":\"relatable\"}\n```";
        let concept: MemeConcept = parse_json_reply(raw).unwrap();
        assert_eq!(concept.caption, "POV: it compiles");
        assert_eq!(concept.hashtags, vec!["#rust"]);
        assert_eq!(concept.virality_score, Some(87.0));
    }

    #[test]
    fn malformed_reply_is_a_typed_error() {
        let err = parse_json_reply::<MemeConcept>("Sure! Here's a meme idea:").unwrap_err();
        assert!(matches!(err, AiError::MalformedResponse(_)));
    }

    #[test]
    fn parses_caption_array() {
        let captions: Vec<String> =
            parse_json_reply("```\n[\"one\",\"two\"]\n```").unwrap();
        assert_eq!(captions, vec!["one", "two"]);
    }

    struct ScriptedAi {
        reply: String,
        last_prompt: std::sync::Mutex<String>,
    }

    #[async_trait]
    impl AiClient for ScriptedAi {
        async fn generate_text(&self, prompt: &str) -> Result<String, AiError> {
            *self.last_prompt.lock().unwrap() = prompt.to_string();
            Ok(self.reply.clone())
        }

        async fn analyze_image(&self, _image_base64: &str, prompt: &str) -> Result<String, AiError> {
            *self.last_prompt.lock().unwrap() = prompt.to_string();
            Ok(self.reply.clone())
        }
    }

    #[tokio::test]
    async fn studio_parses_a_fenced_concept_reply() {
        let client = Arc::new(ScriptedAi {
            reply: "```json\n{\"caption\":\"no\",\"hashtags\":[],\"virality_score\":12,\
                    \"reasoning\":\"mondays\"}\n```"
                .to_string(),
            last_prompt: std::sync::Mutex::new(String::new()),
        });
        let studio = MemeStudio::new(client.clone());

        let concept = studio.generate_concept("monday mood").await.unwrap();
        assert_eq!(concept.caption, "no");
        assert!(client.last_prompt.lock().unwrap().contains("monday mood"));
    }

    #[tokio::test]
    async fn studio_surfaces_malformed_replies() {
        let client = Arc::new(ScriptedAi {
            reply: "I'd be happy to help with that!".to_string(),
            last_prompt: std::sync::Mutex::new(String::new()),
        });
        let studio = MemeStudio::new(client);
        let err = studio.suggest_captions(b"pixels").await.unwrap_err();
        assert!(matches!(err, AiError::MalformedResponse(_)));
    }
}
