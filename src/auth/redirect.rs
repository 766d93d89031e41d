//! Building the authorization redirect and reading the fragment it comes back with.

use crate::{Error, Result};
use oauth2::basic::BasicClient;
use oauth2::{AuthUrl, ClientId, CsrfToken, RedirectUrl, Scope};

const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub(super) const DEFAULT_EXPIRES_IN: i64 = 3600;
/// Longer lifetimes are cut to a day.
const MAX_EXPIRES_IN: i64 = 86_400;

/// Scopes requested on every authorization.
pub const SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/spreadsheets",
    "https://www.googleapis.com/auth/drive.file",
    "openid",
    "profile",
    "email",
];

/// Where to send the user, and the `state` that must come back.
#[derive(Debug, Clone, Eq, PartialEq, serde::Serialize)]
pub struct Redirect {
    pub url: String,
    pub state: String,
}

/// The successful outcome of an authorization redirect.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct FragmentGrant {
    pub access_token: String,
    /// Seconds, 3600 when the fragment does not say and at most a day.
    pub expires_in: i64,
    pub state: Option<String>,
}

/// Builds the implicit-grant authorization URL with a fresh random `state`.
pub fn authorization_request(client_id: &str, redirect_uri: &str) -> Result<Redirect> {
    if client_id.trim().is_empty() {
        return Err(Error::AuthInitError(
            "no OAuth client_id is configured".into(),
        ));
    }
    let auth_url = AuthUrl::new(AUTH_URL.to_string())
        .map_err(|e| Error::AuthInitError(format!("invalid authorization URL: {e}")))?;
    let redirect_url = RedirectUrl::new(redirect_uri.to_string())
        .map_err(|e| Error::AuthInitError(format!("invalid redirect URI '{redirect_uri}': {e}")))?;

    let client = BasicClient::new(ClientId::new(client_id.to_string()))
        .set_auth_uri(auth_url)
        .set_redirect_uri(redirect_url);

    let (url, state) = client
        .authorize_url(CsrfToken::new_random)
        .add_scopes(SCOPES.iter().map(|s| Scope::new(s.to_string())))
        .use_implicit_flow()
        .add_extra_param("prompt", "consent")
        .url();

    Ok(Redirect {
        url: url.to_string(),
        state: state.secret().clone(),
    })
}

/// Parses the fragment of the redirect location. A whole URL is accepted too, in which case only
/// the part after `#` is read.
///
/// # Errors
/// `Error::AuthRejected` when the fragment carries `error` or has no `access_token`.
pub fn parse_fragment(location: &str) -> Result<FragmentGrant> {
    let fragment = match location.split_once('#') {
        Some((_, fragment)) => fragment,
        None => location,
    };
    let fragment = fragment.trim().trim_start_matches('#');

    let mut access_token = None;
    let mut expires_in = None;
    let mut state = None;
    let mut error = None;
    let mut error_description = None;
    for (key, value) in url::form_urlencoded::parse(fragment.as_bytes()) {
        match key.as_ref() {
            "access_token" => access_token = Some(value.into_owned()),
            "expires_in" => expires_in = value.parse::<i64>().ok(),
            "state" => state = Some(value.into_owned()),
            "error" => error = Some(value.into_owned()),
            "error_description" => error_description = Some(value.into_owned()),
            _ => {}
        }
    }

    if let Some(error) = error {
        return Err(Error::AuthRejected(match error_description {
            Some(description) => format!("{error}: {description}"),
            None => error,
        }));
    }
    let access_token = access_token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| Error::AuthRejected("the redirect has no access_token".into()))?;

    Ok(FragmentGrant {
        access_token,
        expires_in: expires_in
            .filter(|s| *s > 0)
            .map_or(DEFAULT_EXPIRES_IN, |s| s.min(MAX_EXPIRES_IN)),
        state,
    })
}
