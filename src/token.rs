use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_with::{NoneAsEmptyString, serde_as};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info};

use crate::{
    Error, LoginOptions, LoginOrchestrator, Paths, Session, TOKEN_ERR_BAD_EXPIRY,
    TOKEN_ERR_READ_DIR, TOKEN_NOTICE_LOGIN, print_notice,
};

/// Shape of the files the AWS CLI writes under `~/.aws/sso/cache`.
#[serde_as]
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CacheFile {
    #[serde(default)]
    #[serde_as(as = "NoneAsEmptyString")]
    start_url: Option<String>,
    #[serde(default)]
    #[serde_as(as = "NoneAsEmptyString")]
    session_name: Option<String>,
    #[serde(default)]
    #[serde_as(as = "NoneAsEmptyString")]
    access_token: Option<String>,
    #[serde(default)]
    expires_at: Option<String>,
}

impl CacheFile {
    fn belongs_to(&self, session: &Session) -> bool {
        self.session_name.as_deref() == Some(session.name.as_str())
            || self
                .start_url
                .as_deref()
                .is_some_and(|url| session.matches_start_url(url))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CachedToken {
    pub start_url: String,
    pub session_name: Option<String>,
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
    pub path: PathBuf,
}

impl CachedToken {
    /// No early-refresh margin: a token is usable up to its expiry instant.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TokenLookup {
    Valid(CachedToken),
    Expired,
    Missing,
}

impl TokenLookup {
    /// The token, or the cache error that names `session`.
    pub fn into_token(self, session: &Session) -> Result<CachedToken, Error> {
        match self {
            TokenLookup::Valid(token) => Ok(token),
            TokenLookup::Expired => Err(Error::CacheExpired {
                session: session.name.clone(),
            }),
            TokenLookup::Missing => Err(Error::CacheMissing {
                session: session.name.clone(),
            }),
        }
    }
}

struct TokenState {
    session: String,
    start_url: String,
    token: CachedToken,
}

pub struct TokenCache {
    dir: PathBuf,
    state: Mutex<Option<TokenState>>,
}

impl TokenCache {
    pub fn new(dir: PathBuf) -> TokenCache {
        TokenCache {
            dir,
            state: Mutex::new(None),
        }
    }

    pub fn from_paths(paths: &Paths) -> TokenCache {
        TokenCache::new(paths.sso_cache.clone())
    }

    pub fn resolve(&self, session: &Session) -> Result<TokenLookup, Error> {
        self.resolve_at(session, Utc::now())
    }

    pub fn resolve_at(&self, session: &Session, now: DateTime<Utc>) -> Result<TokenLookup, Error> {
        if let Some(token) = self.remembered(session, now) {
            debug!(session = %session.name, "using in-memory SSO token");
            return Ok(TokenLookup::Valid(token));
        }
        let lookup = scan_cache_dir(&self.dir, session, now)?;
        if let TokenLookup::Valid(token) = &lookup {
            self.remember(session, token.clone());
        }
        Ok(lookup)
    }

    pub fn invalidate(&self) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Resolves the token, signing in once when it is missing or expired.
    /// A second miss after the sign-in is returned as an error.
    pub fn resolve_with_auto_login(
        &self,
        session: &Session,
        login: &LoginOrchestrator<'_>,
        options: LoginOptions,
    ) -> Result<CachedToken, Error> {
        if !options.force_refresh {
            match self.resolve(session)? {
                TokenLookup::Valid(token) => return Ok(token),
                lookup => {
                    info!(session = %session.name, ?lookup, "SSO token unusable, signing in");
                    print_notice(&crate::msg1(TOKEN_NOTICE_LOGIN, &session.name));
                }
            }
        }
        login.refresh(session, options.no_browser)?;
        self.resolve(session)?.into_token(session)
    }

    fn remembered(&self, session: &Session, now: DateTime<Utc>) -> Option<CachedToken> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state
            .as_ref()
            .filter(|state| state.session == session.name && state.start_url == session.start_url)
            .map(|state| state.token.clone())
            .filter(|token| token.is_valid_at(now))
    }

    fn remember(&self, session: &Session, token: CachedToken) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = Some(TokenState {
            session: session.name.clone(),
            start_url: session.start_url.clone(),
            token,
        });
    }
}

fn scan_cache_dir(dir: &Path, session: &Session, now: DateTime<Utc>) -> Result<TokenLookup, Error> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            debug!(dir = %dir.display(), "SSO cache directory does not exist");
            return Ok(TokenLookup::Missing);
        }
        Err(err) => {
            return Err(Error::Config(crate::msg2(
                TOKEN_ERR_READ_DIR,
                dir.display(),
                err,
            )));
        }
    };

    let mut best: Option<CachedToken> = None;
    let mut saw_expired = false;
    for entry in entries {
        let Ok(entry) = entry else {
            continue;
        };
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
            continue;
        }
        let Some(file) = read_cache_file(&path) else {
            continue;
        };
        if !file.belongs_to(session) {
            continue;
        }
        let Some(access_token) = file.access_token else {
            debug!(path = %path.display(), "matching cache file has no access token");
            continue;
        };
        let raw_expiry = file.expires_at.unwrap_or_default();
        let expires_at = parse_expires_at(&raw_expiry).map_err(|err| {
            Error::Config(crate::msg3(
                TOKEN_ERR_BAD_EXPIRY,
                path.display(),
                &raw_expiry,
                err,
            ))
        })?;
        let token = CachedToken {
            start_url: file
                .start_url
                .unwrap_or_else(|| session.start_url.clone()),
            session_name: file.session_name,
            access_token,
            expires_at,
            path,
        };
        if !token.is_valid_at(now) {
            debug!(
                path = %token.path.display(),
                expires_at = %token.expires_at,
                "expired SSO token"
            );
            saw_expired = true;
            continue;
        }
        if best
            .as_ref()
            .is_none_or(|current| token.expires_at > current.expires_at)
        {
            best = Some(token);
        }
    }

    Ok(match best {
        Some(token) => TokenLookup::Valid(token),
        None if saw_expired => TokenLookup::Expired,
        None => TokenLookup::Missing,
    })
}

fn read_cache_file(path: &Path) -> Option<CacheFile> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) => {
            debug!(path = %path.display(), %err, "skipping unreadable cache file");
            return None;
        }
    };
    match serde_json::from_str(&contents) {
        Ok(file) => Some(file),
        Err(err) => {
            debug!(path = %path.display(), %err, "skipping unparseable cache file");
            None
        }
    }
}

/// RFC 3339, with a literal `UTC` suffix accepted in place of `Z`.
pub fn parse_expires_at(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    let trimmed = raw.trim();
    let normalized = match trimmed.strip_suffix("UTC") {
        Some(prefix) => format!("{}Z", prefix.trim_end()),
        None => trimmed.to_string(),
    };
    DateTime::parse_from_rfc3339(&normalized).map(|at| at.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{sample_session, write_cache_file};
    use chrono::Duration as ChronoDuration;

    fn now() -> DateTime<Utc> {
        parse_expires_at("2030-06-01T12:00:00Z").unwrap()
    }

    #[test]
    fn parse_expires_at_accepts_utc_suffix() {
        let z = parse_expires_at("2030-06-01T12:00:00Z").unwrap();
        assert_eq!(parse_expires_at("2030-06-01T12:00:00UTC").unwrap(), z);
        assert_eq!(parse_expires_at("2030-06-01T14:00:00+02:00").unwrap(), z);
        assert!(parse_expires_at("tomorrow").is_err());
        assert!(parse_expires_at("").is_err());
    }

    #[test]
    fn missing_directory_is_missing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = TokenCache::new(dir.path().join("nope"));
        let lookup = cache.resolve_at(&sample_session("work"), now()).unwrap();
        assert_eq!(lookup, TokenLookup::Missing);
    }

    #[test]
    fn unrelated_and_unparseable_files_are_missing() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("garbage.json"), "{not json").unwrap();
        fs::write(dir.path().join("notes.txt"), "hello").unwrap();
        fs::write(
            dir.path().join("client.json"),
            r#"{"clientId":"abc","clientSecret":"xyz","expiresAt":"2031-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        write_cache_file(
            dir.path(),
            "other.json",
            "https://other.awsapps.com/start",
            None,
            "tok-other",
            "2031-01-01T00:00:00Z",
        );
        let cache = TokenCache::new(dir.path().to_path_buf());
        let lookup = cache.resolve_at(&sample_session("work"), now()).unwrap();
        assert_eq!(lookup, TokenLookup::Missing);
    }

    #[test]
    fn only_expired_matches_is_expired() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_cache_file(
            dir.path(),
            "a.json",
            "https://work.awsapps.com/start",
            None,
            "tok-old",
            "2030-06-01T11:59:59Z",
        );
        write_cache_file(
            dir.path(),
            "b.json",
            "https://elsewhere.awsapps.com/start",
            Some("work"),
            "tok-at-expiry",
            "2030-06-01T12:00:00Z",
        );
        let cache = TokenCache::new(dir.path().to_path_buf());
        let lookup = cache.resolve_at(&sample_session("work"), now()).unwrap();
        assert_eq!(lookup, TokenLookup::Expired);
    }

    #[test]
    fn latest_valid_expiry_wins() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_cache_file(
            dir.path(),
            "1.json",
            "https://work.awsapps.com/start#",
            None,
            "tok-soon",
            "2030-06-01T13:00:00Z",
        );
        write_cache_file(
            dir.path(),
            "2.json",
            "https://renamed.awsapps.com/start",
            Some("work"),
            "tok-late",
            "2030-06-01T20:00:00UTC",
        );
        write_cache_file(
            dir.path(),
            "3.json",
            "https://work.awsapps.com/start",
            None,
            "tok-expired",
            "2030-06-01T01:00:00Z",
        );
        let cache = TokenCache::new(dir.path().to_path_buf());
        let TokenLookup::Valid(token) = cache.resolve_at(&sample_session("work"), now()).unwrap()
        else {
            panic!("expected a valid token");
        };
        assert_eq!(token.access_token, "tok-late");
        assert_eq!(token.session_name.as_deref(), Some("work"));
    }

    #[test]
    fn malformed_expiry_on_matching_file_is_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_cache_file(
            dir.path(),
            "bad.json",
            "https://work.awsapps.com/start",
            None,
            "tok",
            "next tuesday",
        );
        let cache = TokenCache::new(dir.path().to_path_buf());
        let err = cache.resolve_at(&sample_session("work"), now()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("next tuesday"));
    }

    #[test]
    fn malformed_expiry_on_other_session_is_ignored() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_cache_file(
            dir.path(),
            "bad.json",
            "https://other.awsapps.com/start",
            None,
            "tok",
            "next tuesday",
        );
        let cache = TokenCache::new(dir.path().to_path_buf());
        let lookup = cache.resolve_at(&sample_session("work"), now()).unwrap();
        assert_eq!(lookup, TokenLookup::Missing);
    }

    #[test]
    fn memory_is_consulted_first_and_invalidated() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_cache_file(
            dir.path(),
            "1.json",
            "https://work.awsapps.com/start",
            None,
            "tok-1",
            "2030-06-01T13:00:00Z",
        );
        let cache = TokenCache::new(dir.path().to_path_buf());
        let session = sample_session("work");
        assert!(matches!(
            cache.resolve_at(&session, now()).unwrap(),
            TokenLookup::Valid(_)
        ));
        fs::remove_file(&path).unwrap();
        let TokenLookup::Valid(token) = cache.resolve_at(&session, now()).unwrap() else {
            panic!("expected remembered token");
        };
        assert_eq!(token.access_token, "tok-1");
        let later = now() + ChronoDuration::hours(2);
        assert_eq!(cache.resolve_at(&session, later).unwrap(), TokenLookup::Missing);
        cache.invalidate();
        assert_eq!(cache.resolve_at(&session, now()).unwrap(), TokenLookup::Missing);
    }
}
