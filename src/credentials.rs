use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;

use crate::{CachedToken, Error, Session};

/// Short-lived role credentials. Fetched on demand and never written to disk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TemporaryCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
    pub expiration: DateTime<Utc>,
}

impl TemporaryCredentials {
    fn expiration_rfc3339(&self) -> String {
        self.expiration.to_rfc3339_opts(SecondsFormat::Secs, true)
    }

    /// `export` lines suitable for `eval` in a POSIX shell. A value that
    /// cannot be quoted is an error, never written raw.
    pub fn to_env_exports(&self, region: Option<&str>) -> Result<String, Error> {
        let expiration = self.expiration_rfc3339();
        let mut pairs = vec![
            ("AWS_ACCESS_KEY_ID", self.access_key_id.as_str()),
            ("AWS_SECRET_ACCESS_KEY", self.secret_access_key.as_str()),
            ("AWS_SESSION_TOKEN", self.session_token.as_str()),
            ("AWS_CREDENTIAL_EXPIRATION", expiration.as_str()),
        ];
        if let Some(region) = region {
            pairs.push(("AWS_REGION", region));
        }
        let mut out = String::new();
        for (key, value) in pairs {
            let quoted = shlex::try_quote(value).map_err(|err| Error::InvalidOutput {
                command: format!("export {key}"),
                detail: err.to_string(),
            })?;
            out.push_str(&format!("export {key}={quoted}\n"));
        }
        Ok(out)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CallerIdentity {
    #[serde(default)]
    pub user_id: String,
    pub account: String,
    pub arn: String,
}

pub trait CredentialExchange {
    fn role_credentials(
        &self,
        session: &Session,
        token: &CachedToken,
        account_id: &str,
        role: &str,
    ) -> Result<TemporaryCredentials, Error>;

    /// Confirms a configured profile works end to end.
    fn caller_identity(&self, profile: &str) -> Result<CallerIdentity, Error>;
}
