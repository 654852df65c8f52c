//! HTML status page served at `/`.
//!
//! A static snapshot of connection status, the latest telemetry and the progress
//! state. The browser reloads it every five seconds.

use crate::state::StateSnapshot;

/// Render the page for one snapshot.
pub fn render(snapshot: &StateSnapshot) -> String {
    let telemetry = serde_json::to_string_pretty(&snapshot.telemetry.to_json())
        .unwrap_or_else(|_| "{}".to_string());
    let progress = &snapshot.progress;

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <title>Serial Handler Status</title>
    <meta http-equiv="refresh" content="5">
    <style>
        body {{ font-family: Arial, sans-serif; margin: 20px; }}
        .status {{ padding: 10px; border-radius: 5px; margin: 10px 0; }}
        .connected {{ background-color: #d4edda; color: #155724; }}
        .disconnected {{ background-color: #f8d7da; color: #721c24; }}
    </style>
</head>
<body>
    <h1>Serial Handler Status</h1>
    <div class="status {class}">
        <p>Serial Connection: {label}</p>
    </div>
    <div>
        <h2>Latest Data:</h2>
        <pre>{telemetry}</pre>
    </div>
    <div>
        <h2>Progress Animation:</h2>
        <p>Value: {value}</p>
        <p>Direction: {direction}</p>
        <p>Running: {running}</p>
    </div>
</body>
</html>
"#,
        class = snapshot.connection.as_str(),
        label = snapshot.connection.label(),
        telemetry = escape_html(&telemetry),
        value = progress.value(),
        direction = progress.direction().label(),
        running = if progress.is_running() { "Yes" } else { "No" },
    )
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}
