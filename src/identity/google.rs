use serde::Deserialize;
use url::Url;

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::identity::{ProviderAccount, SignInOptions};

/// Parameters Google only accepts on the authorization-code flow.
const CODE_FLOW_ONLY_PARAMS: &[&str] = &["access_type"];

/// Google OAuth endpoints and client registration.
#[derive(Debug, Clone)]
pub struct GoogleOAuth {
    client_id: String,
    authorize_url: Url,
    userinfo_url: Url,
}

#[derive(Debug, Deserialize)]
struct UserInfo {
    sub: String,
    email: Option<String>,
}

impl GoogleOAuth {
    pub fn new(client_id: impl Into<String>, authorize_url: Url, userinfo_url: Url) -> Self {
        Self {
            client_id: client_id.into(),
            authorize_url,
            userinfo_url,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(
            config.google_client_id.clone(),
            Url::parse(&config.google_authorize_url)?,
            Url::parse(&config.google_userinfo_url)?,
        ))
    }

    /// Authorization URL using the implicit flow, so tokens come back in the
    /// redirect fragment.
    ///
    /// Extras the implicit flow rejects (`access_type`) are left out; such a
    /// grant never carries a refresh token.
    pub fn authorize_url(&self, options: &SignInOptions) -> Url {
        let mut url = self.authorize_url.clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("client_id", &self.client_id)
                .append_pair("redirect_uri", &options.redirect_to)
                .append_pair("response_type", "token")
                .append_pair("scope", &options.scopes.join(" "));
            for (name, value) in &options.extra_params {
                if CODE_FLOW_ONLY_PARAMS.contains(&name.as_str()) {
                    tracing::debug!("Skipping {}={} on implicit grant", name, value);
                    continue;
                }
                query.append_pair(name, value);
            }
        }
        url
    }

    /// Resolves the account an access token was issued for.
    pub async fn fetch_account(&self, http: &reqwest::Client, access_token: &str) -> Result<ProviderAccount> {
        let response = http
            .get(self.userinfo_url.clone())
            .bearer_auth(access_token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AppError::Provider(format!(
                "Google rejected the access token ({})",
                response.status()
            )));
        }

        let info: UserInfo = response.json().await?;
        if info.sub.is_empty() {
            return Err(AppError::Provider("Google returned no account id".to_string()));
        }

        Ok(ProviderAccount {
            subject: info.sub,
            email: info.email,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GOOGLE_AUTHORIZE_URL, GOOGLE_USERINFO_URL};

    fn google() -> GoogleOAuth {
        GoogleOAuth::new(
            "client-123",
            Url::parse(GOOGLE_AUTHORIZE_URL).unwrap(),
            Url::parse(GOOGLE_USERINFO_URL).unwrap(),
        )
    }

    #[test]
    fn authorize_url_carries_redirect_scopes_and_extras() {
        let url = google().authorize_url(&SignInOptions::gmail_connect("http://localhost:3000"));
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();

        assert!(url.as_str().starts_with(GOOGLE_AUTHORIZE_URL));
        assert!(pairs.contains(&("client_id".into(), "client-123".into())));
        assert!(pairs.contains(&("response_type".into(), "token".into())));
        assert!(pairs.contains(&(
            "redirect_uri".into(),
            "http://localhost:3000/auth?gmailConnect=true".into()
        )));
        assert!(pairs.contains(&(
            "scope".into(),
            "email profile https://www.googleapis.com/auth/gmail.readonly".into()
        )));
        assert!(pairs.contains(&("prompt".into(), "consent".into())));
    }

    #[test]
    fn implicit_grant_url_omits_code_flow_parameters() {
        let url = google().authorize_url(&SignInOptions::gmail_connect("http://localhost:3000"));
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();

        let response_types: Vec<&str> = pairs
            .iter()
            .filter(|(k, _)| k == "response_type")
            .map(|(_, v)| v.as_str())
            .collect();
        assert_eq!(response_types, vec!["token"]);
        assert!(pairs.iter().all(|(k, _)| k != "access_type"));

        let login = google().authorize_url(&SignInOptions::login("http://localhost:3000"));
        assert!(login.query_pairs().all(|(k, _)| k != "access_type" && k != "prompt"));
    }
}
