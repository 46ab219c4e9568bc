use std::fmt;

use thiserror::Error;

pub const TOKEN_ENV: &str = "FACEFIND_ACCESS_TOKEN";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthenticationError {
    #[error("no access token: pass --token, set FACEFIND_ACCESS_TOKEN, or set access_token in the config file")]
    MissingToken,
}

/// OAuth bearer token for the storage and vision APIs.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Result<Self, AuthenticationError> {
        let token = token.into().trim().to_string();
        if token.is_empty() {
            return Err(AuthenticationError::MissingToken);
        }
        Ok(Self(token))
    }

    pub fn secret(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(***)")
    }
}

/// Pick the first non-empty token from the flag, the environment, then the config file.
pub fn resolve_access_token(
    flag: Option<&str>,
    env: Option<&str>,
    config: Option<&str>,
) -> Result<AccessToken, AuthenticationError> {
    [flag, env, config]
        .into_iter()
        .flatten()
        .find_map(|candidate| AccessToken::new(candidate).ok())
        .ok_or(AuthenticationError::MissingToken)
}

/// [`resolve_access_token`] reading the environment variable itself.
pub fn access_token(
    flag: Option<&str>,
    config: Option<&str>,
) -> Result<AccessToken, AuthenticationError> {
    let env = std::env::var(TOKEN_ENV).ok();
    resolve_access_token(flag, env.as_deref(), config)
}
