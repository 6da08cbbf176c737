use super::{api_client, error_from, friendly_error};

/// Send `message` to `to` through `POST /send`.
pub async fn run(api_url: &str, api_key: Option<&str>, to: &str, message: &str) -> anyhow::Result<()> {
    let client = api_client(api_key)?;
    let resp = client
        .post(format!("{api_url}/send"))
        .json(&serde_json::json!({ "to": to, "message": message }))
        .send()
        .await
        .map_err(friendly_error)?;

    if !resp.status().is_success() {
        return Err(error_from(&format!("Failed to send to {to}"), resp).await);
    }
    let body: serde_json::Value = resp.json().await.map_err(friendly_error)?;
    println!("Message sent.");
    if let Some(to) = body["to"].as_str() {
        println!("  to:   {to}");
    }
    if let Some(at) = body["timestamp"].as_str() {
        println!("  at:   {at}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use axum::{http::StatusCode, routing::post, Json, Router};
    use serde_json::{json, Value};

    use super::*;

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn posts_to_and_message() {
        let app = Router::new().route(
            "/send",
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body["to"], "5215550000001");
                assert_eq!(body["message"], "hi");
                Json(json!({"success": true, "to": "5215550000001", "timestamp": "2026-01-01T00:00:00Z"}))
            }),
        );
        let url = serve(app).await;
        assert!(run(&url, Some("k"), "5215550000001", "hi").await.is_ok());
    }

    #[tokio::test]
    async fn surfaces_not_connected() {
        let app = Router::new().route(
            "/send",
            post(|| async {
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(json!({"error": "session not connected", "state": "connecting"})),
                )
            }),
        );
        let url = serve(app).await;
        let err = run(&url, Some("k"), "1", "hi").await.unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("session not connected"));
        assert!(msg.contains("503"));
    }
}
