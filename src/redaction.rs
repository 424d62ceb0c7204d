use once_cell::sync::Lazy;
use regex::Regex;

/// Telegram bot tokens look like `123456789:AA...` and also show up inside
/// `/bot<token>/` API paths.
static BOT_TOKEN_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"\b(\d{6,12}:[A-Za-z0-9_\-]{30,})\b").expect("valid regex"),
        Regex::new(r#"(?i)(token|secret)\s*[:=]\s*["']?([A-Za-z0-9_\-\.:]{6,})["']?"#).expect("valid regex"),
    ]
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedactionResult {
    pub content: String,
    pub redaction_count: usize,
}

/// Scrubs the configured bot token, plus anything shaped like one, from text
/// that is about to be logged.
#[derive(Debug, Default, Clone)]
pub struct Redactor {
    known_secret: Option<String>,
}

impl Redactor {
    pub fn new(known_secret: Option<&str>) -> Self {
        Self {
            known_secret: known_secret
                .map(str::trim)
                .filter(|secret| !secret.is_empty())
                .map(ToString::to_string),
        }
    }

    pub fn redact(&self, input: &str) -> RedactionResult {
        if input.is_empty() {
            return RedactionResult {
                content: String::new(),
                redaction_count: 0,
            };
        }

        let mut result = input.to_string();
        let mut redaction_count = 0usize;

        if let Some(secret) = &self.known_secret {
            let matches = result.matches(secret.as_str()).count();
            if matches > 0 {
                redaction_count += matches;
                result = result.replace(secret.as_str(), "[REDACTED]");
            }
        }

        for pattern in BOT_TOKEN_PATTERNS.iter() {
            let matches = pattern.find_iter(&result).count();
            if matches == 0 {
                continue;
            }

            redaction_count += matches;
            result = pattern
                .replace_all(&result, |caps: &regex::Captures<'_>| match caps.get(2) {
                    Some(_) => format!("{}=[REDACTED]", caps[1].to_ascii_lowercase()),
                    None => "[REDACTED]".to_string(),
                })
                .to_string();
        }

        RedactionResult {
            content: result,
            redaction_count,
        }
    }

    pub fn scrub(&self, input: impl std::fmt::Display) -> String {
        self.redact(&input.to_string()).content
    }
}
