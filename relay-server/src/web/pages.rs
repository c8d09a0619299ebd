//! Minimal HTML pages for the web interface.

pub const INDEX: &str = r#"<!doctype html>
<html>
<head><meta charset="utf-8"><title>SMS Relay</title></head>
<body>
<h1>SMS Relay</h1>
<p>Received messages are served encrypted from <a href="/messages">/messages</a>.
Decrypt them client-side with the base decryption string.</p>
<p><a href="/logout">Log out</a></p>
</body>
</html>
"#;

/// Render the login form, optionally with an error line.
pub fn login_page(error: Option<&str>) -> String {
    let error = error
        .map(|e| format!("<p class=\"error\">{}</p>\n", e))
        .unwrap_or_default();

    format!(
        r#"<!doctype html>
<html>
<head><meta charset="utf-8"><title>Login - SMS Relay</title></head>
<body>
<h1>Login</h1>
{error}<form method="post">
<label>Username <input name="username" autocomplete="username"></label>
<label>Password <input name="password" type="password" autocomplete="current-password"></label>
<button type="submit">Log in</button>
</form>
</body>
</html>
"#
    )
}
