use axum::response::{Html, IntoResponse};

const HOME_PAGE: &str = r#"<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="utf-8">
    <title>Gangway</title>
  </head>
  <body>
    <h1>Gangway</h1>
    <p>Sign in with your identity provider to get credentials for this cluster.</p>
    <p><a href="/login">Sign in</a></p>
  </body>
</html>
"#;

// axum handler for the landing page
pub async fn home() -> impl IntoResponse {
    Html(HOME_PAGE)
}
