pub mod cleanup;
pub mod history;
pub mod logout;
pub mod send;
pub mod status;

use reqwest::header::{HeaderMap, HeaderValue};

/// Build a reqwest client that sends `api_key` on every request.
pub fn api_client(api_key: Option<&str>) -> anyhow::Result<reqwest::Client> {
    let mut headers = HeaderMap::new();
    if let Some(key) = api_key {
        let mut value = HeaderValue::from_str(key)
            .map_err(|_| anyhow::anyhow!("API key contains characters not allowed in a header"))?;
        value.set_sensitive(true);
        headers.insert("x-api-key", value);
    }
    Ok(reqwest::Client::builder().default_headers(headers).build()?)
}

/// Map common reqwest errors to user-friendly messages.
pub fn friendly_error(err: reqwest::Error) -> anyhow::Error {
    if err.is_connect() {
        anyhow::anyhow!(
            "Could not connect to the chatgate daemon. Is it running?\n  \
             (hint: start it with `chatgate` or check --api-url)"
        )
    } else if err.is_timeout() {
        anyhow::anyhow!("Request timed out. The daemon may be busy.")
    } else {
        anyhow::anyhow!("API request failed: {err}")
    }
}

/// Turn a non-2xx response into an error carrying the API's `error` field.
pub async fn error_from(action: &str, resp: reqwest::Response) -> anyhow::Error {
    let status = resp.status();
    let body: serde_json::Value = resp.json().await.unwrap_or_default();
    let message = body["error"].as_str().unwrap_or("unknown error");
    match body["details"].as_str() {
        Some(details) => anyhow::anyhow!("{action}: {message} ({details}, HTTP {status})"),
        None => anyhow::anyhow!("{action}: {message} (HTTP {status})"),
    }
}
