//! Advisory query expansion.
//!
//! Given a user query, proposes up to three paraphrase questions and five
//! domain keywords to widen retrieval recall. The expander is advisory:
//! retrieval must work (with narrower recall) when the provider is
//! disabled or the call fails, so every failure path degrades to an empty
//! expansion instead of an error.

use std::time::Duration;

use crate::config::ExpanderConfig;

/// Paraphrases and keywords to feed into retrieval as extra sub-queries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Expansion {
    pub questions: Vec<String>,
    pub keywords: Vec<String>,
}

const SYSTEM_PROMPT: &str = "You analyze a user's knowledge-base query. Reply with a JSON object \
     {\"questions\": [...], \"keywords\": [...]} containing up to 3 \
     paraphrased questions and up to 5 search keywords relevant to the \
     query's domain. Reply with JSON only.";

/// Expand a query via the configured chat-completions model.
///
/// Returns an empty [`Expansion`] when the provider is disabled, the call
/// fails, or the response cannot be parsed.
pub async fn expand_query(config: &ExpanderConfig, query: &str) -> Expansion {
    if !config.is_enabled() || query.trim().is_empty() {
        return Expansion::default();
    }

    match request_expansion(config, query).await {
        Ok(expansion) => expansion,
        Err(e) => {
            eprintln!("Warning: query expansion skipped: {}", e);
            Expansion::default()
        }
    }
}

async fn request_expansion(config: &ExpanderConfig, query: &str) -> anyhow::Result<Expansion> {
    let api_key = std::env::var("OPENAI_API_KEY")
        .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY not set"))?;

    let model = config
        .model
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("expander.model required"))?;

    let base_url = config
        .url
        .as_deref()
        .unwrap_or("https://api.openai.com")
        .trim_end_matches('/');

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?;

    let body = serde_json::json!({
        "model": model,
        "response_format": { "type": "json_object" },
        "messages": [
            { "role": "system", "content": SYSTEM_PROMPT },
            { "role": "user", "content": query },
        ],
    });

    let mut last_err = None;

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            // Exponential backoff: 1s, 2s, 4s, ...
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tokio::time::sleep(delay).await;
        }

        let resp = client
            .post(format!("{}/v1/chat/completions", base_url))
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await;

        match resp {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    let json: serde_json::Value = response.json().await?;
                    let content = json
                        .get("choices")
                        .and_then(|c| c.get(0))
                        .and_then(|c| c.get("message"))
                        .and_then(|m| m.get("content"))
                        .and_then(|c| c.as_str())
                        .ok_or_else(|| {
                            anyhow::anyhow!("expansion response missing message content")
                        })?;
                    return parse_expansion(content, config.max_questions, config.max_keywords);
                }

                // Rate limited or server error — retry
                if status.as_u16() == 429 || status.is_server_error() {
                    let body_text = response.text().await.unwrap_or_default();
                    last_err = Some(anyhow::anyhow!(
                        "expansion API error {}: {}",
                        status,
                        body_text
                    ));
                    continue;
                }

                // Client error (not 429) — don't retry
                let body_text = response.text().await.unwrap_or_default();
                anyhow::bail!("expansion API error {}: {}", status, body_text);
            }
            Err(e) => {
                last_err = Some(e.into());
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Expansion failed after retries")))
}

/// Parse the model's JSON reply, clamping list lengths to their caps.
fn parse_expansion(
    content: &str,
    max_questions: usize,
    max_keywords: usize,
) -> anyhow::Result<Expansion> {
    let value: serde_json::Value = serde_json::from_str(content)?;

    let mut questions = string_list(&value, "questions");
    let mut keywords = string_list(&value, "keywords");
    questions.truncate(max_questions);
    keywords.truncate(max_keywords);

    Ok(Expansion {
        questions,
        keywords,
    })
}

fn string_list(value: &serde_json::Value, key: &str) -> Vec<String> {
    value
        .get(key)
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str())
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_questions_and_keywords() {
        let json = r#"{"questions": ["How much leave?", "What are leave rules?"],
                       "keywords": ["vacation", "paid leave"]}"#;
        let exp = parse_expansion(json, 3, 5).unwrap();
        assert_eq!(exp.questions.len(), 2);
        assert_eq!(exp.keywords, vec!["vacation", "paid leave"]);
    }

    #[test]
    fn clamps_to_caps() {
        let json = r#"{"questions": ["a","b","c","d","e"],
                       "keywords": ["1","2","3","4","5","6","7"]}"#;
        let exp = parse_expansion(json, 3, 5).unwrap();
        assert_eq!(exp.questions.len(), 3);
        assert_eq!(exp.keywords.len(), 5);
    }

    #[test]
    fn missing_fields_yield_empty_lists() {
        let exp = parse_expansion(r#"{"something": "else"}"#, 3, 5).unwrap();
        assert!(exp.questions.is_empty());
        assert!(exp.keywords.is_empty());
    }

    #[test]
    fn invalid_json_is_an_error() {
        assert!(parse_expansion("not json", 3, 5).is_err());
    }

    #[test]
    fn blank_entries_are_dropped() {
        let json = r#"{"questions": ["  ", "real question"], "keywords": [""]}"#;
        let exp = parse_expansion(json, 3, 5).unwrap();
        assert_eq!(exp.questions, vec!["real question"]);
        assert!(exp.keywords.is_empty());
    }

    #[tokio::test]
    async fn disabled_provider_expands_to_nothing() {
        let cfg = ExpanderConfig::default();
        let exp = expand_query(&cfg, "anything").await;
        assert_eq!(exp, Expansion::default());
    }
}
