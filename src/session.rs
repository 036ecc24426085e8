use serde::{Deserialize, Serialize};
use std::env;

use crate::{
    Error, Prompter, SESSION_ERR_NAME, SESSION_ERR_REGION, SESSION_ERR_START_URL,
    SESSION_ERR_UNKNOWN_CHOICE, SESSION_OPTION_CREATE, SESSION_PROMPT_NAME,
    SESSION_PROMPT_REGION, SESSION_PROMPT_SELECT, SESSION_PROMPT_START_URL,
};

pub const DEFAULT_SESSION_NAME: &str = "default-sso";
pub const DEFAULT_REGION: &str = "us-east-1";
pub const DEFAULT_SCOPE: &str = "sso:account:access";

/// One `[sso-session NAME]` entry. `start_url` never carries a trailing `#`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "StoredSession")]
pub struct Session {
    pub name: String,
    pub start_url: String,
    pub region: String,
    pub scopes: Vec<String>,
}

/// A session as read from disk, before validation.
#[derive(Deserialize)]
struct StoredSession {
    name: String,
    start_url: String,
    region: String,
    #[serde(default = "default_scopes")]
    scopes: Vec<String>,
}

impl TryFrom<StoredSession> for Session {
    type Error = Error;

    fn try_from(stored: StoredSession) -> Result<Session, Error> {
        let mut session = Session::new(&stored.name, &stored.start_url, &stored.region)?;
        session.scopes = stored.scopes;
        Ok(session)
    }
}

fn default_scopes() -> Vec<String> {
    vec![DEFAULT_SCOPE.to_string()]
}

impl Session {
    pub fn new(name: &str, start_url: &str, region: &str) -> Result<Session, Error> {
        let name = name.trim();
        validate_session_name(name)?;
        let start_url = normalize_start_url(start_url);
        validate_start_url(&start_url)?;
        let region = region.trim();
        validate_region(region)?;
        Ok(Session {
            name: name.to_string(),
            start_url,
            region: region.to_string(),
            scopes: default_scopes(),
        })
    }

    pub fn label(&self) -> String {
        format!("{} ({})", self.name, self.start_url)
    }

    pub fn matches_start_url(&self, url: &str) -> bool {
        normalize_start_url(url) == self.start_url
    }
}

pub fn normalize_start_url(url: &str) -> String {
    url.trim().trim_end_matches('#').to_string()
}

pub fn validate_start_url(url: &str) -> Result<(), Error> {
    let valid = url
        .strip_prefix("https://")
        .is_some_and(|rest| !rest.is_empty() && !rest.contains(char::is_whitespace));
    if valid {
        Ok(())
    } else {
        Err(Error::Validation(crate::msg1(SESSION_ERR_START_URL, url)))
    }
}

pub fn validate_session_name(name: &str) -> Result<(), Error> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(Error::Validation(crate::msg1(SESSION_ERR_NAME, name)))
    }
}

fn validate_region(region: &str) -> Result<(), Error> {
    let valid = !region.is_empty()
        && region
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '-');
    if valid {
        Ok(())
    } else {
        Err(Error::Validation(crate::msg1(SESSION_ERR_REGION, region)))
    }
}

/// Region from `AWS_REGION`, then `AWS_DEFAULT_REGION`, then `us-east-1`.
pub fn default_region() -> String {
    env_region().unwrap_or_else(|| DEFAULT_REGION.to_string())
}

pub fn env_region() -> Option<String> {
    env_region_from(
        env::var("AWS_REGION").ok(),
        env::var("AWS_DEFAULT_REGION").ok(),
    )
}

fn env_region_from(region: Option<String>, default_region: Option<String>) -> Option<String> {
    [region, default_region]
        .into_iter()
        .flatten()
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
}

/// Values supplied on the command line; any of them may be missing.
#[derive(Clone, Debug, Default)]
pub struct SessionRequest {
    pub name: Option<String>,
    pub start_url: Option<String>,
    pub region: Option<String>,
}

impl SessionRequest {
    fn is_empty(&self) -> bool {
        self.name.is_none() && self.start_url.is_none() && self.region.is_none()
    }
}

pub struct SessionResolver<'a> {
    prompter: &'a dyn Prompter,
    sessions: Vec<Session>,
}

impl<'a> SessionResolver<'a> {
    pub fn new(prompter: &'a dyn Prompter, sessions: Vec<Session>) -> SessionResolver<'a> {
        SessionResolver { prompter, sessions }
    }

    #[cfg(test)]
    pub fn sessions(&self) -> &[Session] {
        &self.sessions
    }

    pub fn resolve(&mut self, request: &SessionRequest) -> Result<Session, Error> {
        if let (Some(name), Some(start_url), Some(region)) =
            (&request.name, &request.start_url, &request.region)
        {
            let session = Session::new(name, start_url, region)?;
            self.sessions.push(session.clone());
            return Ok(session);
        }
        if self.sessions.len() == 1 && request.is_empty() {
            return Ok(self.sessions[0].clone());
        }
        if !self.sessions.is_empty() {
            let mut options: Vec<String> = self.sessions.iter().map(Session::label).collect();
            options.push(SESSION_OPTION_CREATE.to_string());
            let choice = self.prompter.select_one(SESSION_PROMPT_SELECT, &options)?;
            if choice != SESSION_OPTION_CREATE {
                return self
                    .sessions
                    .iter()
                    .find(|session| session.label() == choice)
                    .cloned()
                    .ok_or_else(|| {
                        Error::Validation(crate::msg1(SESSION_ERR_UNKNOWN_CHOICE, choice))
                    });
            }
        }
        self.create(request)
    }

    fn create(&mut self, request: &SessionRequest) -> Result<Session, Error> {
        let name = self.prompter.text_input(
            SESSION_PROMPT_NAME,
            Some(request.name.as_deref().unwrap_or(DEFAULT_SESSION_NAME)),
        )?;
        validate_session_name(name.trim())?;
        let start_url = self
            .prompter
            .text_input(SESSION_PROMPT_START_URL, request.start_url.as_deref())?;
        validate_start_url(&normalize_start_url(&start_url))?;
        let region = match &request.region {
            Some(region) => region.clone(),
            None => default_region(),
        };
        let region = self
            .prompter
            .text_input(SESSION_PROMPT_REGION, Some(&region))?;
        let session = Session::new(&name, &start_url, &region)?;
        self.sessions.push(session.clone());
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{Answer, ScriptedPrompter, sample_session, set_env_guard};

    fn full_request() -> SessionRequest {
        SessionRequest {
            name: Some("corp".to_string()),
            start_url: Some("https://corp.awsapps.com/start#".to_string()),
            region: Some("eu-west-1".to_string()),
        }
    }

    #[test]
    fn start_url_validation_boundary() {
        assert!(validate_start_url("https://x.awsapps.com/start").is_ok());
        assert!(validate_start_url("http://x.com").is_err());
        assert!(validate_start_url("https://").is_err());
        assert!(validate_start_url("").is_err());
    }

    #[test]
    fn normalize_strips_trailing_hash() {
        assert_eq!(
            normalize_start_url(" https://x.awsapps.com/start/#"),
            "https://x.awsapps.com/start/"
        );
        let session = sample_session("corp");
        assert!(session.matches_start_url("https://corp.awsapps.com/start#"));
        assert!(!session.matches_start_url("https://other.awsapps.com/start"));
    }

    #[test]
    fn session_name_validation() {
        assert!(validate_session_name("default-sso").is_ok());
        assert!(validate_session_name("my sso").is_err());
        assert!(validate_session_name("").is_err());
        assert!(Session::new("x", "https://x.awsapps.com/start", "us east").is_err());
    }

    #[test]
    fn env_region_prefers_aws_region() {
        assert_eq!(
            env_region_from(Some("eu-west-1".into()), Some("us-west-2".into())),
            Some("eu-west-1".to_string())
        );
        assert_eq!(
            env_region_from(Some(" ".into()), Some("us-west-2".into())),
            Some("us-west-2".to_string())
        );
        assert_eq!(env_region_from(None, None), None);
    }

    #[test]
    fn all_values_supplied_skip_prompts() {
        let prompter = ScriptedPrompter::new(vec![]);
        let mut resolver = SessionResolver::new(&prompter, vec![sample_session("other")]);
        let session = resolver.resolve(&full_request()).unwrap();
        assert_eq!(session.start_url, "https://corp.awsapps.com/start");
        assert_eq!(resolver.sessions().len(), 2);
        assert!(prompter.is_exhausted());
    }

    #[test]
    fn supplied_invalid_start_url_is_rejected() {
        let prompter = ScriptedPrompter::new(vec![]);
        let mut resolver = SessionResolver::new(&prompter, vec![]);
        let mut request = full_request();
        request.start_url = Some("http://corp.example.com".to_string());
        assert!(matches!(
            resolver.resolve(&request),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn single_saved_session_is_used_without_prompting() {
        let prompter = ScriptedPrompter::new(vec![]);
        let saved = sample_session("work");
        let mut resolver = SessionResolver::new(&prompter, vec![saved.clone()]);
        let session = resolver.resolve(&SessionRequest::default()).unwrap();
        assert_eq!(session, saved);
    }

    #[test]
    fn saved_session_selected_from_menu() {
        let prompter =
            ScriptedPrompter::new(vec![Answer::Select("beta (https://beta.awsapps.com/start)")]);
        let sessions = vec![sample_session("alpha"), sample_session("beta")];
        let mut resolver = SessionResolver::new(&prompter, sessions);
        let session = resolver.resolve(&SessionRequest::default()).unwrap();
        assert_eq!(session.name, "beta");
        let options = prompter.last_options();
        assert_eq!(options.last().map(String::as_str), Some("Create new session"));
        assert_eq!(options.len(), 3);
    }

    #[test]
    fn create_new_session_falls_through_to_prompts() {
        let _region = set_env_guard("AWS_REGION", None);
        let _default_region = set_env_guard("AWS_DEFAULT_REGION", None);
        let prompter = ScriptedPrompter::new(vec![
            Answer::Select("Create new session"),
            Answer::Default,
            Answer::Text("https://new.awsapps.com/start#"),
            Answer::Default,
        ]);
        let mut resolver = SessionResolver::new(&prompter, vec![sample_session("alpha")]);
        let session = resolver.resolve(&SessionRequest::default()).unwrap();
        assert_eq!(session.name, DEFAULT_SESSION_NAME);
        assert_eq!(session.start_url, "https://new.awsapps.com/start");
        assert_eq!(session.region, DEFAULT_REGION);
        assert_eq!(resolver.sessions().len(), 2);
    }

    #[test]
    fn partial_request_values_become_defaults() {
        let prompter =
            ScriptedPrompter::new(vec![Answer::Default, Answer::Default, Answer::Default]);
        let mut resolver = SessionResolver::new(&prompter, vec![]);
        let request = SessionRequest {
            name: Some("team".to_string()),
            start_url: Some("https://team.awsapps.com/start".to_string()),
            region: None,
        };
        let _region = set_env_guard("AWS_REGION", Some("ap-southeast-2"));
        let session = resolver.resolve(&request).unwrap();
        assert_eq!(session.name, "team");
        assert_eq!(session.start_url, "https://team.awsapps.com/start");
        assert_eq!(session.region, "ap-southeast-2");
    }

    #[test]
    fn invalid_start_url_from_prompt_aborts() {
        let prompter = ScriptedPrompter::new(vec![Answer::Default, Answer::Text("http://x.com")]);
        let mut resolver = SessionResolver::new(&prompter, vec![]);
        let err = resolver.resolve(&SessionRequest::default()).unwrap_err();
        assert!(err.to_string().contains("https://"));
        assert!(resolver.sessions().is_empty());
    }

    #[test]
    fn cancel_propagates() {
        let prompter = ScriptedPrompter::new(vec![Answer::Cancel]);
        let mut resolver =
            SessionResolver::new(&prompter, vec![sample_session("a"), sample_session("b")]);
        assert!(resolver.resolve(&SessionRequest::default()).unwrap_err().is_cancelled());
    }
}
