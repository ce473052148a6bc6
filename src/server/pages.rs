//! Minimal HTML pages for consent, link confirmation, and failures.

// crates.io
use axum::response::Html;
// self
use crate::flows::{ConsentPrompt, LinkConfirmation};

/// Escapes text for HTML element and attribute content.
pub fn escape(raw: &str) -> String {
	let mut out = String::with_capacity(raw.len());

	for c in raw.chars() {
		match c {
			'&' => out.push_str("&amp;"),
			'<' => out.push_str("&lt;"),
			'>' => out.push_str("&gt;"),
			'"' => out.push_str("&quot;"),
			'\'' => out.push_str("&#x27;"),
			_ => out.push(c),
		}
	}

	out
}

/// Consent page posting `state` plus `decision=approve|deny` back to the prompt's action.
pub fn consent(prompt: &ConsentPrompt) -> Html<String> {
	let scopes = if prompt.scopes.is_empty() {
		"<li>Basic profile information</li>".to_owned()
	} else {
		prompt.scopes.iter().map(|s| format!("<li>{}</li>", escape(s))).collect::<String>()
	};
	let body = format!(
		r#"<h1>Authorize {client}</h1>
<p><strong>{client}</strong> wants to sign you in with {provider} and will be redirected to
<code>{redirect}</code>.</p>
<p>Requested access:</p>
<ul>{scopes}</ul>
<form method="post" action="{action}">
<input type="hidden" name="state" value="{state}">
<button type="submit" name="decision" value="approve">Approve</button>
<button type="submit" name="decision" value="deny">Deny</button>
</form>"#,
		client = escape(&prompt.client_name),
		provider = escape(&prompt.provider_name),
		redirect = escape(&prompt.redirect_uri),
		action = escape(&prompt.action),
		state = escape(&prompt.state),
	);

	layout("Authorization request", &body)
}

/// Shown after a successful secondary link.
pub fn link_confirmation(confirmation: &LinkConfirmation) -> Html<String> {
	let body = format!(
		"<h1>{provider} connected</h1>\n<p>Signed in as <strong>{account}</strong>. You can close \
		 this window.</p>",
		provider = escape(&confirmation.provider_name),
		account = escape(&confirmation.account),
	);

	layout("Account linked", &body)
}

/// Shown when a secondary link fails; offers a retry when the owner is known.
pub fn link_error(message: &str, retry_path: Option<&str>) -> Html<String> {
	let retry = retry_path
		.map(|path| format!("\n<p><a href=\"{}\">Try again</a></p>", escape(path)))
		.unwrap_or_default();
	let body = format!("<h1>Linking failed</h1>\n<p>{}</p>{retry}", escape(message));

	layout("Linking failed", &body)
}

/// Shown when the user declines consent.
pub fn denied() -> Html<String> {
	layout(
		"Access denied",
		"<h1>Access denied</h1>\n<p>You declined the request. No access was granted.</p>",
	)
}

fn layout(title: &str, body: &str) -> Html<String> {
	Html(format!(
		"<!doctype html>\n<html lang=\"en\">\n<head><meta charset=\"utf-8\"><title>{}</title></head>\n\
		 <body>\n{body}\n</body>\n</html>\n",
		escape(title)
	))
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn consent_page_escapes_untrusted_values() {
		let Html(page) = consent(&ConsentPrompt {
			client_name: "<script>alert(1)</script>".into(),
			provider_name: "GitHub".into(),
			scopes: vec!["read".into()],
			redirect_uri: "https://client.example.com/cb?a=1&b=\"2\"".into(),
			state: "eyJ+/=".into(),
			action: "/authorize".into(),
		});

		assert!(!page.contains("<script>"));
		assert!(page.contains("&lt;script&gt;"));
		assert!(page.contains("a=1&amp;b=&quot;2&quot;"));
		assert!(page.contains(r#"name="state" value="eyJ+/=""#));
		assert!(page.contains(r#"value="deny""#));
	}

	#[test]
	fn link_error_renders_retry_only_when_known() {
		let Html(with_retry) = link_error("Expired.", Some("/slack/authorize?userId=u1&x=1"));
		let Html(without) = link_error("Expired.", None);

		assert!(with_retry.contains(r#"href="/slack/authorize?userId=u1&amp;x=1""#));
		assert!(!without.contains("href="));
	}
}
