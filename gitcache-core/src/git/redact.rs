//! Credential redaction for remote URLs

/// Mask credentials embedded in a remote URL
///
/// Passwords are always masked. For http(s) remotes a bare username is masked
/// as well, since that is where access tokens usually live. Strings that are
/// not URLs (e.g. `git@host:owner/repo.git`) are returned unchanged.
pub fn redact_url(input: &str) -> String {
    let Ok(mut url) = url::Url::parse(input) else {
        return input.to_string();
    };

    if url.password().is_some() {
        let _ = url.set_password(Some("***"));
        return url.to_string();
    }

    let is_http = matches!(url.scheme(), "http" | "https");
    if is_http && !url.username().is_empty() {
        let _ = url.set_username("***");
        return url.to_string();
    }

    input.to_string()
}
