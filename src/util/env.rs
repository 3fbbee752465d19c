//! Chat configuration read from `TMI_`-prefixed environment variables.
//!
//! An optional `.env` file is merged in by [`dotenvy`]; the matching variables are collected into
//! a JSON object with the prefix stripped and deserialized into [`ChatConfig`].

use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::constants::{DEFAULT_LOG_FILTER, ENV_PREFIX};
use crate::util::services::{CredentialProvider, StaticServers};

pub type EnvResult<T> = core::result::Result<T, EnvErr>;

#[derive(Debug, Error)]
pub enum EnvErr {
    #[error(transparent)]
    Dotenvy(#[from] dotenvy::Error),

    #[error("env deserialization error: {0}")]
    DeserializationError(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct ChatConfig {
    #[serde(default)]
    pub oauth_token: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    /// Comma separated `host:port` list
    #[serde(default)]
    pub servers: Option<String>,
    #[serde(default)]
    pub log: Option<String>,
}

impl ChatConfig {
    /// Loads `.env` (if there is one) and then reads the process environment.
    pub fn from_env() -> EnvResult<Self> {
        match dotenvy::dotenv() {
            Ok(_) => {}
            Err(err) if err.not_found() => {}
            Err(err) => return Err(err.into()),
        }

        Self::from_vars(dotenvy::vars())
    }

    pub fn from_vars<Iter>(vars: Iter) -> EnvResult<Self>
    where
        Iter: IntoIterator<Item = (String, String)>,
    {
        let object: Map<String, Value> = vars
            .into_iter()
            .filter_map(|(key, value)| {
                key.strip_prefix(ENV_PREFIX)
                    .map(|name| (name.to_owned(), Value::String(value)))
            })
            .collect();

        Ok(serde_json::from_value(Value::Object(object))?)
    }

    pub fn log_filter(&self) -> &str {
        self.log
            .as_deref()
            .filter(|filter| !filter.is_empty())
            .unwrap_or(DEFAULT_LOG_FILTER)
    }

    /// Configured endpoints, falling back to the public Twitch server
    pub fn server_list(&self) -> StaticServers {
        let servers: Vec<String> = self
            .servers
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|server| !server.is_empty())
            .map(str::to_owned)
            .collect();

        if servers.is_empty() {
            StaticServers::default()
        } else {
            StaticServers::new(servers)
        }
    }
}

impl CredentialProvider for ChatConfig {
    fn oauth_token(&self) -> Option<String> {
        self.oauth_token.clone()
    }

    fn user_name(&self) -> Option<String> {
        self.username.clone()
    }
}
