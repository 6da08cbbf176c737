use super::{api_client, error_from, friendly_error};

/// `POST /session/logout`.
pub async fn run(api_url: &str, api_key: Option<&str>) -> anyhow::Result<()> {
    let client = api_client(api_key)?;
    let resp = client
        .post(format!("{api_url}/session/logout"))
        .send()
        .await
        .map_err(friendly_error)?;

    if !resp.status().is_success() {
        return Err(error_from("Logout failed", resp).await);
    }
    let body: serde_json::Value = resp.json().await.map_err(friendly_error)?;
    println!("{}", body["message"].as_str().unwrap_or("Logged out."));
    if let Some(ms) = body["restartInMs"].as_u64() {
        println!("  new pairing in ~{ms}ms");
    }
    Ok(())
}
