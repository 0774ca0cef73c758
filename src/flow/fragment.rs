use std::borrow::Cow;
use std::fmt;
use url::form_urlencoded;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Fragment key carrying the delivered access token.
pub const ACCESS_TOKEN_KEY: &str = "access_token";
/// Fragment key carrying the optional refresh token.
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";
/// Query flag asking to re-run the connect step for a signed-in user.
pub const CONNECT_FLAG: &str = "gmailConnect";

/// Tokens a provider delivered through the redirect fragment.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct DeliveredTokens {
    access_token: String,
    refresh_token: Option<String>,
}

impl DeliveredTokens {
    pub fn new(access_token: impl Into<String>, refresh_token: Option<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token,
        }
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref()
    }
}

impl fmt::Debug for DeliveredTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeliveredTokens")
            .field("access_token", &"[redacted]")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[redacted]"))
            .finish()
    }
}

fn pairs(raw: &str, prefix: char) -> form_urlencoded::Parse<'_> {
    form_urlencoded::parse(raw.strip_prefix(prefix).unwrap_or(raw).as_bytes())
}

/// Extracts delivered tokens from a URL fragment.
///
/// Returns `None` when the fragment has no `access_token` pair or its value is
/// empty. A blank `refresh_token` counts as absent.
pub fn parse_tokens(fragment: &str) -> Option<DeliveredTokens> {
    let mut access_token: Option<Cow<'_, str>> = None;
    let mut refresh_token: Option<Cow<'_, str>> = None;

    for (name, value) in pairs(fragment, '#') {
        match name.as_ref() {
            ACCESS_TOKEN_KEY if access_token.is_none() => access_token = Some(value),
            REFRESH_TOKEN_KEY if refresh_token.is_none() => refresh_token = Some(value),
            _ => {}
        }
    }

    let access_token = access_token.filter(|token| !token.trim().is_empty())?;
    let refresh_token = refresh_token
        .filter(|token| !token.trim().is_empty())
        .map(Cow::into_owned);

    Some(DeliveredTokens::new(access_token.into_owned(), refresh_token))
}

/// Whether the query string carries `gmailConnect=true`.
pub fn connect_requested(query: &str) -> bool {
    pairs(query, '?').any(|(name, value)| name == CONNECT_FLAG && value == "true")
}

/// What the browser saw when it landed on the auth entry point.
#[derive(Debug, Clone, Default)]
pub struct Landing {
    pub fragment: String,
    pub query: String,
}

impl Landing {
    pub fn new(fragment: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            fragment: fragment.into(),
            query: query.into(),
        }
    }

    /// A landing with only a query string.
    pub fn query_only(query: impl Into<String>) -> Self {
        Self::new(String::new(), query)
    }

    pub fn tokens(&self) -> Option<DeliveredTokens> {
        parse_tokens(&self.fragment)
    }

    pub fn connect_requested(&self) -> bool {
        connect_requested(&self.query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_access_and_refresh_tokens() {
        let tokens = parse_tokens("#access_token=T1&refresh_token=T2").unwrap();
        assert_eq!(tokens.access_token(), "T1");
        assert_eq!(tokens.refresh_token(), Some("T2"));
    }

    #[test]
    fn refresh_token_is_optional() {
        let tokens =
            parse_tokens("access_token=ya29.a0&expires_in=3599&token_type=Bearer").unwrap();
        assert_eq!(tokens.access_token(), "ya29.a0");
        assert_eq!(tokens.refresh_token(), None);

        let blank = parse_tokens("#access_token=abc&refresh_token=").unwrap();
        assert_eq!(blank.refresh_token(), None);
    }

    #[test]
    fn values_are_percent_decoded() {
        let tokens = parse_tokens("#access_token=a%2Fb%3Dc&refresh_token=1%2F%2Fx").unwrap();
        assert_eq!(tokens.access_token(), "a/b=c");
        assert_eq!(tokens.refresh_token(), Some("1//x"));
    }

    #[test]
    fn missing_or_empty_access_token_means_no_token() {
        assert!(parse_tokens("").is_none());
        assert!(parse_tokens("#").is_none());
        assert!(parse_tokens("#refresh_token=T2").is_none());
        assert!(parse_tokens("#access_token=&refresh_token=T2").is_none());
        assert!(parse_tokens("#access_token").is_none());
        assert!(parse_tokens("#error=access_denied").is_none());
    }

    #[test]
    fn connect_flag_requires_true() {
        assert!(connect_requested("?gmailConnect=true"));
        assert!(connect_requested("foo=1&gmailConnect=true"));
        assert!(!connect_requested("gmailConnect=false"));
        assert!(!connect_requested("gmailconnect=true"));
        assert!(!connect_requested(""));
    }

    #[test]
    fn debug_output_hides_tokens() {
        let tokens = DeliveredTokens::new("secret-access", Some("secret-refresh".to_string()));
        let rendered = format!("{:?}", tokens);
        assert!(!rendered.contains("secret"));
    }
}
