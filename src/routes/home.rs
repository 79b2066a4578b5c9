//! Landing page.

use axum::extract::State;
use axum::response::Html;

use crate::state::AppState;

/// Render the landing page.
pub async fn index(State(state): State<AppState>) -> Html<String> {
    let ui = &state.config.ui;
    let body = format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <title>{site_name}</title>
    <link rel="stylesheet" href="static/css/style.css">
</head>
<body>
    <div class="container">
        <h1>{site_name}</h1>
        <p class="version">v{version}</p>
        <p>The workbench is up and serving.</p>
    </div>
</body>
</html>"#,
        site_name = ui.site_name,
        version = ui.version,
    );
    Html(body)
}
