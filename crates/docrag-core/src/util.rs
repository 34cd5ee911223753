use std::future::Future;
use std::time::Duration;

use sha2::{Digest, Sha256};
use tracing::warn;

use crate::error::{Error, Result};

/// Retry an async operation with capped exponential backoff. Only
/// `Transient` errors are retried; everything else is returned as-is.
pub async fn with_retries<T, F, Fut>(
    op: &str,
    attempts: u32,
    base_delay: Duration,
    mut call: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut delay = base_delay;
    let mut attempt = 1;
    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < attempts => {
                warn!(op, attempt, delay_ms = delay.as_millis() as u64, error = %err, "retrying after transient failure");
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(Duration::from_secs(10));
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Bound an async call with a deadline. A timeout counts as transient so
/// the retry policy applies.
pub async fn with_deadline<T, Fut>(op: &str, deadline: Duration, fut: Fut) -> Result<T>
where
    Fut: Future<Output = Result<T>>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => result,
        Err(_) => Err(Error::Transient(format!(
            "{op} timed out after {}s",
            deadline.as_secs()
        ))),
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Make an uploaded file name safe for use inside a storage path.
pub fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = cleaned.trim_matches(|c| c == '.' || c == '_');
    let mut result = if trimmed.is_empty() {
        "document".to_string()
    } else {
        trimmed.to_string()
    };
    result.truncate(120);
    result
}

/// Detect the dominant language of a text sample, returned as an ISO 639-1
/// code where one exists (whatlang reports ISO 639-3).
pub fn detect_language(text: &str) -> Option<String> {
    let info = whatlang::detect(text)?;
    if !info.is_reliable() && text.len() > 200 {
        return None;
    }
    Some(iso_639_1(info.lang()).to_string())
}

fn iso_639_1(lang: whatlang::Lang) -> &'static str {
    use whatlang::Lang;
    match lang {
        Lang::Eng => "en",
        Lang::Rus => "ru",
        Lang::Deu => "de",
        Lang::Fra => "fr",
        Lang::Spa => "es",
        Lang::Por => "pt",
        Lang::Ita => "it",
        Lang::Nld => "nl",
        Lang::Pol => "pl",
        Lang::Ukr => "uk",
        Lang::Tur => "tr",
        Lang::Ara => "ar",
        Lang::Cmn => "zh",
        Lang::Jpn => "ja",
        Lang::Kor => "ko",
        Lang::Hin => "hi",
        other => other.code(),
    }
}
