const DEFAULT_SESSION_MARKER: &str = "session-auth-";
const DEFAULT_LOCALE_COOKIE: &str = "locale-pref";
const DEFAULT_TEST_COOKIE: &str = "stampa_test_cookie=cookie-check";

/// Which inbound cookies are replayed on the loop-back fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookiePolicy {
    /// Cookies whose name contains this marker carry the session.
    pub session_marker: String,
    /// Exact name of the language-preference cookie.
    pub locale_cookie: String,
    /// `name=value` pair that always leads the forwarded header.
    pub test_cookie: String,
}

impl Default for CookiePolicy {
    fn default() -> Self {
        Self {
            session_marker: DEFAULT_SESSION_MARKER.to_string(),
            locale_cookie: DEFAULT_LOCALE_COOKIE.to_string(),
            test_cookie: DEFAULT_TEST_COOKIE.to_string(),
        }
    }
}

impl CookiePolicy {
    pub fn is_session_cookie(&self, name: &str) -> bool {
        !self.session_marker.is_empty() && name.contains(self.session_marker.as_str())
    }

    pub fn is_locale_cookie(&self, name: &str) -> bool {
        name == self.locale_cookie
    }

    /// Keep only the cookies the policy forwards, preserving request order.
    pub fn collect<'a, I>(&self, cookies: I) -> ForwardedCookies
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut forwarded = ForwardedCookies::default();
        for (name, value) in cookies {
            if self.is_session_cookie(name) {
                forwarded.session.push((name.to_string(), value.to_string()));
            } else if self.is_locale_cookie(name) {
                forwarded.locale = Some((name.to_string(), value.to_string()));
            }
        }
        forwarded
    }
}

/// Session and locale cookies captured from the inbound request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ForwardedCookies {
    session: Vec<(String, String)>,
    locale: Option<(String, String)>,
}

impl ForwardedCookies {
    pub fn is_empty(&self) -> bool {
        self.session.is_empty() && self.locale.is_none()
    }

    pub fn names(&self) -> Vec<&str> {
        self.session
            .iter()
            .chain(self.locale.iter())
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

/// Build the `Cookie` header for the loop-back fetch: the test cookie first,
/// then every session cookie, then the locale cookie.
pub fn compose_cookie_header(policy: &CookiePolicy, cookies: &ForwardedCookies) -> String {
    let mut parts = Vec::with_capacity(cookies.session.len() + 2);
    if !policy.test_cookie.is_empty() {
        parts.push(policy.test_cookie.clone());
    }
    parts.extend(
        cookies
            .session
            .iter()
            .chain(cookies.locale.iter())
            .map(|(name, value)| format!("{name}={value}")),
    );
    parts.join("; ")
}
