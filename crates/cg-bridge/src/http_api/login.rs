use axum::{
    extract::{Form, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
};
use std::sync::Arc;
use tracing::{info, warn};

use crate::session_guard::clear_cookie;

use super::state::ApiState;
use super::types::LoginForm;

pub(crate) const AFTER_LOGIN: &str = "/pairing?format=image";

fn login_html(error: Option<&str>) -> String {
    let error = error
        .map(|e| format!(r#"<p style="color:#b00">{e}</p>"#))
        .unwrap_or_default();
    format!(
        r#"<!doctype html>
<html>
<head><meta charset="utf-8"><title>chatgate login</title></head>
<body>
<h1>Pairing login</h1>
{error}
<form method="post" action="/login">
  <label>User <input name="username" autocomplete="username"></label><br>
  <label>Password <input name="password" type="password" autocomplete="current-password"></label><br>
  <button type="submit">Sign in</button>
</form>
</body>
</html>
"#
    )
}

/// GET /login -- the login form.
pub(crate) async fn login_page() -> Html<String> {
    Html(login_html(None))
}

/// POST /login -- check credentials, set the session cookie and go to the
/// pairing image.
pub(crate) async fn login_submit(
    State(state): State<Arc<ApiState>>,
    Form(form): Form<LoginForm>,
) -> Response {
    match state.guard.login(&form.username, &form.password) {
        Some(token) => {
            info!(user = %form.username, "operator logged in");
            (
                [(header::SET_COOKIE, state.guard.set_cookie(&token))],
                Redirect::to(AFTER_LOGIN),
            )
                .into_response()
        }
        None => {
            warn!(user = %form.username, "login rejected");
            (
                StatusCode::UNAUTHORIZED,
                Html(login_html(Some("Invalid username or password"))),
            )
                .into_response()
        }
    }
}

/// GET /logout -- drop the session cookie.
pub(crate) async fn logout() -> Response {
    (
        [(header::SET_COOKIE, clear_cookie())],
        Redirect::to("/login"),
    )
        .into_response()
}
