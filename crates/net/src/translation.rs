//! Translation collaborator
//!
//! `Translator` is the seam to the external translation backend. The hub
//! never surfaces a failure to realtime clients: `translate_or_fallback`
//! bounds the call with a timeout and degrades to a visible marker such
//! as `[EN→VI] hello`.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Default bound on a backend call
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(3000);

/// The backend could not produce a translation
#[derive(Debug, Clone, thiserror::Error)]
#[error("Translation unavailable: {reason}")]
pub struct TranslationUnavailable {
    pub reason: String,
}

impl TranslationUnavailable {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// External translation backend
#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(
        &self,
        text: &str,
        source_language: &str,
        target_language: &str,
    ) -> Result<String, TranslationUnavailable>;
}

/// A language offered in the product's pickers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Language {
    pub code: &'static str,
    pub name: &'static str,
}

const SUPPORTED_LANGUAGES: &[Language] = &[
    Language { code: "en", name: "English" },
    Language { code: "vi", name: "Vietnamese" },
    Language { code: "ja", name: "Japanese" },
    Language { code: "zh", name: "Chinese" },
    Language { code: "ko", name: "Korean" },
    Language { code: "fr", name: "French" },
    Language { code: "de", name: "German" },
    Language { code: "es", name: "Spanish" },
    Language { code: "pt", name: "Portuguese" },
    Language { code: "it", name: "Italian" },
    Language { code: "ru", name: "Russian" },
    Language { code: "ar", name: "Arabic" },
    Language { code: "hi", name: "Hindi" },
    Language { code: "th", name: "Thai" },
    Language { code: "nl", name: "Dutch" },
    Language { code: "pl", name: "Polish" },
    Language { code: "tr", name: "Turkish" },
    Language { code: "sv", name: "Swedish" },
    Language { code: "da", name: "Danish" },
    Language { code: "no", name: "Norwegian" },
];

pub fn supported_languages() -> &'static [Language] {
    SUPPORTED_LANGUAGES
}

pub fn is_supported(code: &str) -> bool {
    SUPPORTED_LANGUAGES
        .iter()
        .any(|l| l.code.eq_ignore_ascii_case(code))
}

/// Placeholder shown when the backend is unavailable
pub fn fallback_text(text: &str, source_language: &str, target_language: &str) -> String {
    format!(
        "[{}→{}] {}",
        source_language.to_uppercase(),
        target_language.to_uppercase(),
        text
    )
}

/// Translate with a deadline, degrading to the fallback marker
///
/// Same-language requests are returned unchanged without a backend call.
pub async fn translate_or_fallback(
    translator: &dyn Translator,
    text: &str,
    source_language: &str,
    target_language: &str,
    timeout: Duration,
) -> String {
    if source_language.eq_ignore_ascii_case(target_language) {
        return text.to_string();
    }

    let call = translator.translate(text, source_language, target_language);
    match tokio::time::timeout(timeout, call).await {
        Ok(Ok(translated)) => {
            debug!(source_language, target_language, "Translated");
            translated
        }
        Ok(Err(e)) => {
            warn!(error = %e, source_language, target_language, "Translation failed, using fallback");
            fallback_text(text, source_language, target_language)
        }
        Err(_) => {
            warn!(
                timeout_ms = timeout.as_millis() as u64,
                source_language, target_language, "Translation timed out, using fallback"
            );
            fallback_text(text, source_language, target_language)
        }
    }
}

/// Used when no backend is configured; every call fails
#[derive(Debug, Default, Clone, Copy)]
pub struct Unconfigured;

#[async_trait]
impl Translator for Unconfigured {
    async fn translate(&self, _: &str, _: &str, _: &str) -> Result<String, TranslationUnavailable> {
        Err(TranslationUnavailable::new("no translation backend configured"))
    }
}

#[derive(Serialize)]
struct TranslateRequest<'a> {
    text: &'a str,
    source: &'a str,
    target: &'a str,
}

#[derive(Deserialize)]
struct TranslateResponse {
    translated_text: Option<String>,
}

/// JSON-over-HTTP translation backend
///
/// POSTs `{text, source, target}` with a bearer key and reads
/// `translated_text` from the response.
pub struct HttpTranslator {
    client: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
}

impl HttpTranslator {
    pub fn new(api_url: impl Into<String>, api_key: Option<String>, timeout: Duration) -> crate::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| crate::Error::Protocol(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_url: api_url.into(),
            api_key,
        })
    }
}

#[async_trait]
impl Translator for HttpTranslator {
    async fn translate(
        &self,
        text: &str,
        source_language: &str,
        target_language: &str,
    ) -> Result<String, TranslationUnavailable> {
        let mut request = self.client.post(&self.api_url).json(&TranslateRequest {
            text,
            source: source_language,
            target: target_language,
        });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| TranslationUnavailable::new(e.to_string()))?;

        if !response.status().is_success() {
            return Err(TranslationUnavailable::new(format!(
                "backend returned {}",
                response.status()
            )));
        }

        let body: TranslateResponse = response
            .json()
            .await
            .map_err(|e| TranslationUnavailable::new(e.to_string()))?;

        // A backend that answers without a translation echoes the input
        Ok(body.translated_text.unwrap_or_else(|| text.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Upper {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Translator for Upper {
        async fn translate(&self, text: &str, _: &str, _: &str) -> Result<String, TranslationUnavailable> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(text.to_uppercase())
        }
    }

    struct Stalled;

    #[async_trait]
    impl Translator for Stalled {
        async fn translate(&self, _: &str, _: &str, _: &str) -> Result<String, TranslationUnavailable> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(String::new())
        }
    }

    #[test]
    fn test_fallback_marker() {
        assert_eq!(fallback_text("hello", "en", "vi"), "[EN→VI] hello");
    }

    #[test]
    fn test_supported_languages() {
        assert_eq!(supported_languages().len(), 20);
        assert!(is_supported("vi"));
        assert!(is_supported("JA"));
        assert!(!is_supported("xx"));
    }

    #[tokio::test]
    async fn test_success_passes_through() {
        let upper = Upper {
            calls: AtomicUsize::new(0),
        };
        let out = translate_or_fallback(&upper, "hello", "en", "vi", DEFAULT_TIMEOUT).await;
        assert_eq!(out, "HELLO");
        assert_eq!(upper.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_same_language_skips_backend() {
        let upper = Upper {
            calls: AtomicUsize::new(0),
        };
        let out = translate_or_fallback(&upper, "hello", "en", "EN", DEFAULT_TIMEOUT).await;
        assert_eq!(out, "hello");
        assert_eq!(upper.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unconfigured_falls_back() {
        let out = translate_or_fallback(&Unconfigured, "hello", "en", "vi", DEFAULT_TIMEOUT).await;
        assert_eq!(out, "[EN→VI] hello");
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_falls_back() {
        let out =
            translate_or_fallback(&Stalled, "hello", "en", "vi", Duration::from_millis(50)).await;
        assert_eq!(out, "[EN→VI] hello");
    }

    #[tokio::test]
    async fn test_unreachable_http_backend_falls_back() {
        // Nothing listens on port 9 locally
        let translator =
            HttpTranslator::new("http://127.0.0.1:9/translate", None, Duration::from_millis(500))
                .unwrap();
        let out = translate_or_fallback(&translator, "hello", "en", "vi", DEFAULT_TIMEOUT).await;
        assert_eq!(out, "[EN→VI] hello");
    }
}
