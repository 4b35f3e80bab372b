use async_trait::async_trait;
use rand::seq::SliceRandom;
use reqwest::Client;
use serde_json::{json, Value as JsonValue};

use crate::error::{Error, Result};
use crate::models::question::Question;

/// Options every generated question must carry.
pub const GENERATED_OPTION_COUNT: usize = 4;

const GEMINI_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Turns source notes into multiple-choice questions. May return fewer
/// questions than requested, never more.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QuestionGenerator: Send + Sync {
    async fn generate_questions(&self, source_text: &str, desired_count: usize)
        -> Result<Vec<Question>>;
}

#[derive(Clone)]
pub struct GeminiGenerator {
    client: Client,
    api_key: String,
    model: String,
}

impl GeminiGenerator {
    pub fn new(api_key: String, model: String, client: Client) -> Self {
        Self {
            client,
            api_key,
            model,
        }
    }

    fn response_schema() -> JsonValue {
        json!({
            "type": "ARRAY",
            "items": {
                "type": "OBJECT",
                "properties": {
                    "questionText": { "type": "STRING" },
                    "options": { "type": "ARRAY", "items": { "type": "STRING" } },
                    "correctAnswerIndex": { "type": "NUMBER" }
                },
                "required": ["questionText", "options", "correctAnswerIndex"]
            }
        })
    }

    async fn generate_content(&self, prompt: String) -> Result<JsonValue> {
        let payload = json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": Self::response_schema(),
            }
        });

        let res = self
            .client
            .post(format!("{}/{}:generateContent", GEMINI_ENDPOINT, self.model))
            .query(&[("key", self.api_key.as_str())])
            .json(&payload)
            .send()
            .await
            .map_err(|e| Error::UpstreamGeneration(format!("request failed: {}", e)))?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(Error::UpstreamGeneration(format!(
                "Gemini API error {}: {}",
                status, text
            )));
        }

        let body: JsonValue = res
            .json()
            .await
            .map_err(|e| Error::UpstreamGeneration(format!("unreadable response: {}", e)))?;

        body.get("candidates")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("content"))
            .and_then(|c| c.get("parts"))
            .and_then(|p| p.get(0))
            .and_then(|p| p.get("text"))
            .and_then(|t| t.as_str())
            .and_then(|s| serde_json::from_str(s).ok())
            .ok_or_else(|| Error::UpstreamGeneration("Invalid Gemini response format".to_string()))
    }
}

#[async_trait]
impl QuestionGenerator for GeminiGenerator {
    async fn generate_questions(
        &self,
        source_text: &str,
        desired_count: usize,
    ) -> Result<Vec<Question>> {
        let prompt = format!(
            "Generate exactly {count} multiple-choice questions (MCQs) from the following text.\n\
             Each question should have 4 options (A, B, C, D) and indicate the correct answer (0-indexed).\n\
             Ensure the questions are directly derivable from the provided text.\n\
             If the text explicitly contains an MCQ, extract it as is. Otherwise, create a new MCQ.\n\
             The output MUST be a JSON array of objects with questionText, options and correctAnswerIndex.\n\n\
             Text:\n{text}",
            count = desired_count,
            text = source_text
        );

        tracing::info!(
            model = %self.model,
            desired_count,
            source_len = source_text.len(),
            "requesting generated questions"
        );
        let raw = self.generate_content(prompt).await?;
        let mut rng = rand::thread_rng();
        let questions = sanitize_questions(&raw, desired_count, &mut rng)?;
        tracing::info!(
            generated = questions.len(),
            desired_count,
            "generated questions accepted"
        );
        Ok(questions)
    }
}

/// Validates generator output as a whole: one malformed item rejects the batch.
/// Options are shuffled while the correct option is tracked by position.
pub fn sanitize_questions(
    raw: &JsonValue,
    desired_count: usize,
    rng: &mut impl rand::Rng,
) -> Result<Vec<Question>> {
    let items = raw
        .as_array()
        .or_else(|| raw.get("questions").and_then(|q| q.as_array()))
        .ok_or_else(|| {
            Error::UpstreamGeneration("Generator did not return an array of questions".to_string())
        })?;

    if items.is_empty() {
        return Err(Error::UpstreamGeneration(
            "Generator returned no questions".to_string(),
        ));
    }

    let mut questions = Vec::with_capacity(items.len().min(desired_count));
    for (index, item) in items.iter().enumerate() {
        let question = coerce_question(item, rng).ok_or_else(|| {
            tracing::warn!(index, item = %item, "generator returned a malformed question");
            Error::UpstreamGeneration(format!("Generator returned malformed question at index {}", index))
        })?;
        questions.push(question);
    }

    questions.truncate(desired_count);
    Ok(questions)
}

fn coerce_question(v: &JsonValue, rng: &mut impl rand::Rng) -> Option<Question> {
    let text = v.get("questionText")?.as_str()?.trim();
    let raw_options = v.get("options")?.as_array()?;
    if raw_options.len() != GENERATED_OPTION_COUNT {
        return None;
    }
    let options: Vec<String> = raw_options
        .iter()
        .map(|o| o.as_str().map(str::to_string))
        .collect::<Option<_>>()?;

    let correct = v.get("correctAnswerIndex")?.as_f64()?;
    if correct.fract() != 0.0 || correct < 0.0 || correct >= GENERATED_OPTION_COUNT as f64 {
        return None;
    }

    let mut indexed: Vec<(usize, String)> = options.into_iter().enumerate().collect();
    indexed.shuffle(rng);
    let correct_index = indexed.iter().position(|(i, _)| *i == correct as usize)?;
    let options = indexed.into_iter().map(|(_, o)| o).collect();

    Question::new(text, options, correct_index as i32).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn item(text: &str, options: &[&str], correct: i64) -> JsonValue {
        json!({ "questionText": text, "options": options, "correctAnswerIndex": correct })
    }

    #[test]
    fn keeps_the_correct_option_after_shuffling() {
        let mut rng = StdRng::seed_from_u64(7);
        let raw = json!([
            item("Red planet?", &["Earth", "Mars", "Jupiter", "Venus"], 1),
            item("Largest ocean?", &["Atlantic", "Indian", "Arctic", "Pacific"], 3),
        ]);

        let questions = sanitize_questions(&raw, 10, &mut rng).unwrap();
        assert_eq!(questions.len(), 2);
        let first = &questions[0];
        assert_eq!(first.options[first.correct_option_index as usize], "Mars");
        let second = &questions[1];
        assert_eq!(second.options[second.correct_option_index as usize], "Pacific");
    }

    #[test]
    fn truncates_to_the_requested_count() {
        let mut rng = StdRng::seed_from_u64(1);
        let raw = json!({
            "questions": (0..5)
                .map(|i| item(&format!("Q{}", i), &["a", "b", "c", "d"], 0))
                .collect::<Vec<_>>()
        });
        assert_eq!(sanitize_questions(&raw, 3, &mut rng).unwrap().len(), 3);
    }

    #[test]
    fn one_malformed_item_rejects_the_batch() {
        let mut rng = StdRng::seed_from_u64(1);
        let three_options = json!([
            item("ok", &["a", "b", "c", "d"], 0),
            item("short", &["a", "b", "c"], 0),
        ]);
        assert!(matches!(
            sanitize_questions(&three_options, 5, &mut rng),
            Err(Error::UpstreamGeneration(_))
        ));

        let bad_index = json!([item("q", &["a", "b", "c", "d"], 4)]);
        assert!(sanitize_questions(&bad_index, 5, &mut rng).is_err());

        let missing_text = json!([{ "options": ["a", "b", "c", "d"], "correctAnswerIndex": 0 }]);
        assert!(sanitize_questions(&missing_text, 5, &mut rng).is_err());
    }

    #[test]
    fn empty_or_non_array_output_is_an_upstream_error() {
        let mut rng = StdRng::seed_from_u64(1);
        assert!(matches!(
            sanitize_questions(&json!([]), 5, &mut rng),
            Err(Error::UpstreamGeneration(_))
        ));
        assert!(sanitize_questions(&json!({"text": "nope"}), 5, &mut rng).is_err());
    }
}
