// Remote URLs may embed credentials; never log them verbatim.

use std::borrow::Cow;

use url::Url;

const REDACTED: &str = "***";

/// Replaces credentials in a remote URL with `***`.
///
/// HTTP(S) remotes lose both username and password, since tokens are commonly
/// passed as the username. Other schemes (`ssh://git@host/...`) only lose the
/// password. scp-like (`git@host:path`) and local paths are returned as-is.
pub fn redact_remote_url(remote: &str) -> Cow<'_, str> {
    let Ok(mut url) = Url::parse(remote) else {
        return Cow::Borrowed(remote);
    };

    let mut changed = false;
    if url.password().is_some() {
        changed |= url.set_password(Some(REDACTED)).is_ok();
    }
    if matches!(url.scheme(), "http" | "https") && !url.username().is_empty() {
        changed |= url.set_username(REDACTED).is_ok();
    }

    if changed {
        Cow::Owned(url.to_string())
    } else {
        Cow::Borrowed(remote)
    }
}
