// Licensed under the Apache License, Version 2.0.
// See http://www.apache.org/licenses/LICENSE-2.0 for details.

use std::path::{Path, PathBuf};
use std::time::Duration;

use radar_common::fs::ScopedTempFile;
use radar_common::retry::{retry_with_backoff, RetryPolicy};

use crate::errors::{unexpected_content_type_error, RadarSourcesError, Result};

fn is_retryable(err: &RadarSourcesError) -> bool {
    match err {
        RadarSourcesError::HttpError(e) => e.is_timeout() || e.is_connect() || e.status().map(|s| s.is_server_error()).unwrap_or(false),
        _ => false,
    }
}

/// `true` when `content_type` is binary-incompatible with a radar composite
/// payload - in practice this is the IMGW failure mode where a dead/expired
/// download link comes back as a `200 OK` HTML error page.
fn is_html_content_type(content_type: &str) -> bool {
    let base = content_type.split(';').next().unwrap_or(content_type).trim();
    base.eq_ignore_ascii_case("text/html")
}

pub async fn probe_exists(client: &reqwest::Client, url: &str) -> bool {
    match client.head(url).timeout(Duration::from_secs(8)).send().await {
        Ok(resp) => {
            if !resp.status().is_success() {
                return false;
            }
            resp.headers().get(reqwest::header::CONTENT_TYPE).and_then(|v| v.to_str().ok()).map(|ct| !is_html_content_type(ct)).unwrap_or(true)
        }
        Err(_) => false,
    }
}

/// Downloads `url` into `cache_dir` under a stable `{prefix}{suffix}` name,
/// retrying transient failures with exponential backoff. The body is staged
/// through a [`ScopedTempFile`] inside `cache_dir` so a failed or cancelled
/// download never leaves a half-written file at the final path. A `200 OK`
/// response carrying `text/html` is treated as a permanent failure rather
/// than a successful download - some providers (IMGW) return a dead-link
/// error page this way instead of a 404.
pub async fn download_to(client: &reqwest::Client, url: &str, cache_dir: &Path, prefix: &str, suffix: &str) -> Result<PathBuf> {
    let policy = RetryPolicy { max_retries: 3, base_delay: Duration::from_secs(1), max_delay: Duration::from_secs(30), jitter: true };

    let bytes = retry_with_backoff(&policy, is_retryable, || async {
        let response = client.get(url).timeout(Duration::from_secs(30)).send().await.map_err(RadarSourcesError::from)?;
        let response = response.error_for_status().map_err(RadarSourcesError::from)?;
        if let Some(ct) = response.headers().get(reqwest::header::CONTENT_TYPE).and_then(|v| v.to_str().ok()) {
            if is_html_content_type(ct) {
                return Err(unexpected_content_type_error(url, ct));
            }
        }
        response.bytes().await.map_err(RadarSourcesError::from)
    })
    .await?;

    std::fs::create_dir_all(cache_dir)?;
    let tmp = ScopedTempFile::new_in(cache_dir, prefix, suffix)?;
    std::fs::write(tmp.path(), &bytes)?;
    let dest = cache_dir.join(format!("{prefix}{suffix}"));
    tmp.persist_as(&dest)?;
    Ok(dest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_content_type_is_detected_even_with_charset_suffix() {
        assert!(is_html_content_type("text/html"));
        assert!(is_html_content_type("text/html; charset=utf-8"));
        assert!(!is_html_content_type("application/x-hdf5"));
        assert!(!is_html_content_type("application/octet-stream"));
    }
}
