use super::{api_client, error_from, friendly_error};

/// Run the `status` subcommand: fetch `/status` and pretty-print it.
pub async fn run(api_url: &str, api_key: Option<&str>) -> anyhow::Result<()> {
    let client = api_client(api_key)?;

    let resp = client
        .get(format!("{api_url}/status"))
        .send()
        .await
        .map_err(friendly_error)?;
    if !resp.status().is_success() {
        return Err(error_from("Failed to fetch status", resp).await);
    }
    let status: serde_json::Value = resp.json().await.map_err(friendly_error)?;

    println!("{}", render(&status));
    Ok(())
}

fn render(status: &serde_json::Value) -> String {
    let state = status["state"].as_str().unwrap_or("unknown");
    let connected = status["connected"].as_bool().unwrap_or(false);
    let pairing = status["pairingAvailable"].as_bool().unwrap_or(false);
    let attempts = status["reconnectAttempts"].as_u64().unwrap_or(0);
    let fault = status["fault"].as_str().unwrap_or("-");

    let mut out = String::from("chatgate status\n");
    out.push_str(&"-".repeat(40));
    out.push('\n');
    out.push_str(&format!("State:          {state}\n"));
    out.push_str(&format!("Connected:      {}\n", if connected { "yes" } else { "no" }));
    out.push_str(&format!("Pairing ready:  {}\n", if pairing { "yes" } else { "no" }));
    out.push_str(&format!("Reconnects:     {attempts}\n"));
    out.push_str(&format!("Fault:          {fault}"));
    out
}
