use super::{api_client, error_from, friendly_error};

/// Print the last `limit` inbound messages.
pub async fn run(api_url: &str, api_key: Option<&str>, limit: usize) -> anyhow::Result<()> {
    let client = api_client(api_key)?;
    let resp = client
        .get(format!("{api_url}/history"))
        .query(&[("limit", limit)])
        .send()
        .await
        .map_err(friendly_error)?;

    if !resp.status().is_success() {
        return Err(error_from("Failed to fetch history", resp).await);
    }
    let page: serde_json::Value = resp.json().await.map_err(friendly_error)?;
    for line in render(&page) {
        println!("{line}");
    }
    Ok(())
}

fn render(page: &serde_json::Value) -> Vec<String> {
    let messages = page["messages"].as_array().cloned().unwrap_or_default();
    let total = page["total"].as_u64().unwrap_or(messages.len() as u64);

    let mut lines = vec![format!("{} of {total} messages", messages.len())];
    for m in &messages {
        lines.push(format!(
            "[{}] {} <{}>: {}",
            m["observedAt"].as_str().unwrap_or("?"),
            m["displayName"].as_str().unwrap_or("?"),
            m["from"].as_str().unwrap_or("?"),
            m["body"].as_str().unwrap_or(""),
        ));
    }
    lines
}
