use std::time::Duration;
use tracing::{debug, info};

use crate::{
    CONFIG_ERR_SESSION_NOT_REGISTERED, ConfigStore, Error, Session, TokenCache, TokenLookup,
    command_name, format_cmd_plain,
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoginOptions {
    pub force_refresh: bool,
    pub no_browser: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoginOutcome {
    AlreadyValid,
    LoggedIn,
}

/// Runs the browser/device sign-in for a registered `sso-session`.
pub trait LoginCommand {
    fn sso_login(&self, session_name: &str, no_browser: bool, timeout: Duration)
    -> Result<(), Error>;
}

pub struct LoginOrchestrator<'a> {
    config: &'a ConfigStore,
    cache: &'a TokenCache,
    command: &'a dyn LoginCommand,
    timeout: Duration,
}

impl<'a> LoginOrchestrator<'a> {
    pub fn new(
        config: &'a ConfigStore,
        cache: &'a TokenCache,
        command: &'a dyn LoginCommand,
        timeout: Duration,
    ) -> LoginOrchestrator<'a> {
        LoginOrchestrator {
            config,
            cache,
            command,
            timeout,
        }
    }

    /// Signs in unless the cache already holds a valid token and no refresh
    /// was requested.
    pub fn login(&self, session: &Session, options: LoginOptions) -> Result<LoginOutcome, Error> {
        self.ensure_registered(session)?;
        if !options.force_refresh
            && let TokenLookup::Valid(token) = self.cache.resolve(session)?
        {
            debug!(
                session = %session.name,
                expires_at = %token.expires_at,
                "SSO token still valid"
            );
            return Ok(LoginOutcome::AlreadyValid);
        }
        self.run(session, options.no_browser)?;
        Ok(LoginOutcome::LoggedIn)
    }

    /// Always signs in, without looking at the cache first.
    pub fn refresh(&self, session: &Session, no_browser: bool) -> Result<(), Error> {
        self.ensure_registered(session)?;
        self.run(session, no_browser)
    }

    fn run(&self, session: &Session, no_browser: bool) -> Result<(), Error> {
        self.cache.invalidate();
        info!(
            session = %session.name,
            no_browser,
            timeout_secs = self.timeout.as_secs(),
            "starting SSO sign-in"
        );
        self.command
            .sso_login(&session.name, no_browser, self.timeout)?;
        info!(session = %session.name, "SSO sign-in finished");
        Ok(())
    }

    fn ensure_registered(&self, session: &Session) -> Result<(), Error> {
        if self.config.has_session(&session.name)? {
            return Ok(());
        }
        Err(Error::Config(crate::msg3(
            CONFIG_ERR_SESSION_NOT_REGISTERED,
            &session.name,
            self.config.path().display(),
            format_cmd_plain(&format!("{} setup", command_name())),
        )))
    }
}
