use crate::{
    Account, CachedToken, CallerIdentity, ConfigStore, CredentialExchange, Error, LoginCommand,
    Paths, ProfileLister, Prompter, Session, SettingsStore, SsoDirectory, TemporaryCredentials,
    TokenCache, is_plain, paths_for_home, set_plain,
};
use chrono::{DateTime, Utc};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

pub(crate) static ENV_MUTEX: Mutex<()> = Mutex::new(());
pub(crate) static PLAIN_MUTEX: Mutex<()> = Mutex::new(());

thread_local! {
    static ENV_DEPTH: Cell<usize> = const { Cell::new(0) };
    static PLAIN_DEPTH: Cell<usize> = const { Cell::new(0) };
}

pub(crate) struct EnvVarGuard {
    key: String,
    prev: Option<String>,
    _lock: Option<MutexGuard<'static, ()>>,
}

pub(crate) struct PlainGuard {
    prev: bool,
    _lock: Option<MutexGuard<'static, ()>>,
}

fn set_env(key: &str, value: Option<&str>) -> Option<String> {
    let prev = env::var(key).ok();
    restore_env(key, value.map(str::to_string));
    prev
}

fn restore_env(key: &str, value: Option<String>) {
    if let Some(value) = value {
        unsafe {
            env::set_var(key, value);
        }
    } else {
        unsafe {
            env::remove_var(key);
        }
    }
}

/// Sets or clears an env var until the guard drops. The first guard on a
/// thread holds `ENV_MUTEX`, so nested guards are fine.
pub(crate) fn set_env_guard(key: &str, value: Option<&str>) -> EnvVarGuard {
    let lock = ENV_DEPTH.with(|depth| {
        let current = depth.get();
        depth.set(current + 1);
        if current == 0 {
            Some(ENV_MUTEX.lock().unwrap_or_else(PoisonError::into_inner))
        } else {
            None
        }
    });
    EnvVarGuard {
        key: key.to_string(),
        prev: set_env(key, value),
        _lock: lock,
    }
}

pub(crate) fn set_plain_guard(value: bool) -> PlainGuard {
    let lock = PLAIN_DEPTH.with(|depth| {
        let current = depth.get();
        depth.set(current + 1);
        if current == 0 {
            Some(PLAIN_MUTEX.lock().unwrap_or_else(PoisonError::into_inner))
        } else {
            None
        }
    });
    let prev = is_plain();
    set_plain(value);
    PlainGuard { prev, _lock: lock }
}

impl Drop for EnvVarGuard {
    fn drop(&mut self) {
        let prev = self.prev.take();
        restore_env(&self.key, prev);
        ENV_DEPTH.with(|depth| {
            let current = depth.get();
            depth.set(current.saturating_sub(1));
        });
    }
}

impl Drop for PlainGuard {
    fn drop(&mut self) {
        set_plain(self.prev);
        PLAIN_DEPTH.with(|depth| {
            let current = depth.get();
            depth.set(current.saturating_sub(1));
        });
    }
}

pub(crate) fn make_paths(root: &Path) -> Paths {
    paths_for_home(root, None)
}

pub(crate) fn config_store(dir: &Path) -> ConfigStore {
    ConfigStore::new(dir.join("config"), dir.join("config.lock"))
}

pub(crate) fn broker_stores(dir: &Path) -> (ConfigStore, SettingsStore, TokenCache) {
    (
        config_store(dir),
        SettingsStore::new(dir.join("settings.json"), dir.join("settings.lock")),
        TokenCache::new(dir.join("cache")),
    )
}

pub(crate) fn sample_session(name: &str) -> Session {
    Session::new(
        name,
        &format!("https://{name}.awsapps.com/start"),
        "us-east-1",
    )
    .unwrap()
}

pub(crate) fn sample_account(account_id: &str, name: Option<&str>) -> Account {
    Account {
        account_id: account_id.to_string(),
        account_name: name.map(str::to_string),
        email: None,
        region: "us-east-1".to_string(),
        roles: Vec::new(),
    }
}

pub(crate) fn sample_token(access_token: &str) -> CachedToken {
    CachedToken {
        start_url: "https://work.awsapps.com/start".to_string(),
        session_name: Some("work".to_string()),
        access_token: access_token.to_string(),
        expires_at: Utc::now() + chrono::Duration::hours(1),
        path: PathBuf::from("token.json"),
    }
}

/// Writes a cache file in the layout the AWS CLI uses.
pub(crate) fn write_cache_file(
    dir: &Path,
    file_name: &str,
    start_url: &str,
    session_name: Option<&str>,
    access_token: &str,
    expires_at: &str,
) -> PathBuf {
    fs::create_dir_all(dir).unwrap();
    let mut value = serde_json::json!({
        "startUrl": start_url,
        "region": "us-east-1",
        "accessToken": access_token,
        "expiresAt": expires_at,
    });
    if let Some(session_name) = session_name {
        value["sessionName"] = serde_json::Value::String(session_name.to_string());
    }
    let path = dir.join(file_name);
    fs::write(&path, serde_json::to_string(&value).unwrap()).unwrap();
    path
}

#[cfg(unix)]
pub(crate) fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}")).unwrap();
    let mut perms = fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).unwrap();
    path
}

pub(crate) enum Answer {
    Select(&'static str),
    Text(&'static str),
    Default,
    Cancel,
}

/// Answers prompts from a fixed script; an unexpected prompt fails the test.
pub(crate) struct ScriptedPrompter {
    answers: RefCell<VecDeque<Answer>>,
    last_options: RefCell<Vec<String>>,
}

impl ScriptedPrompter {
    pub(crate) fn new(answers: Vec<Answer>) -> ScriptedPrompter {
        ScriptedPrompter {
            answers: RefCell::new(answers.into()),
            last_options: RefCell::new(Vec::new()),
        }
    }

    pub(crate) fn is_exhausted(&self) -> bool {
        self.answers.borrow().is_empty()
    }

    pub(crate) fn last_options(&self) -> Vec<String> {
        self.last_options.borrow().clone()
    }

    fn next(&self, label: &str) -> Answer {
        self.answers
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| panic!("unexpected prompt: {label}"))
    }
}

impl Prompter for ScriptedPrompter {
    fn select_one(&self, label: &str, options: &[String]) -> Result<String, Error> {
        *self.last_options.borrow_mut() = options.to_vec();
        match self.next(label) {
            Answer::Select(choice) => {
                assert!(
                    options.iter().any(|option| option == choice),
                    "{choice} is not one of {options:?}"
                );
                Ok(choice.to_string())
            }
            Answer::Default => Ok(options[0].clone()),
            Answer::Cancel => Err(Error::Cancelled),
            Answer::Text(_) => panic!("text answer given to select prompt {label}"),
        }
    }

    fn text_input(&self, label: &str, default: Option<&str>) -> Result<String, Error> {
        match self.next(label) {
            Answer::Text(value) => Ok(value.to_string()),
            Answer::Default => Ok(default.unwrap_or_default().to_string()),
            Answer::Cancel => Err(Error::Cancelled),
            Answer::Select(_) => panic!("select answer given to text prompt {label}"),
        }
    }
}

/// Stands in for every `aws` subcommand the broker uses.
#[derive(Default)]
pub(crate) struct FakeAws {
    accounts: Vec<Account>,
    roles: Vec<String>,
    profiles: Vec<String>,
    login_error: Option<String>,
    on_login: Option<Box<dyn Fn()>>,
    logins: RefCell<Vec<(String, bool)>>,
}

impl FakeAws {
    pub(crate) fn with_accounts(mut self, accounts: Vec<Account>) -> FakeAws {
        self.accounts = accounts;
        self
    }

    pub(crate) fn with_roles(mut self, roles: Vec<&str>) -> FakeAws {
        self.roles = roles.into_iter().map(str::to_string).collect();
        self
    }

    pub(crate) fn with_profiles(mut self, profiles: Vec<&str>) -> FakeAws {
        self.profiles = profiles.into_iter().map(str::to_string).collect();
        self
    }

    pub(crate) fn failing_login(mut self, stderr: &str) -> FakeAws {
        self.login_error = Some(stderr.to_string());
        self
    }

    pub(crate) fn on_login(mut self, hook: impl Fn() + 'static) -> FakeAws {
        self.on_login = Some(Box::new(hook));
        self
    }

    pub(crate) fn login_count(&self) -> usize {
        self.logins.borrow().len()
    }

    pub(crate) fn logins(&self) -> Vec<(String, bool)> {
        self.logins.borrow().clone()
    }
}

impl LoginCommand for FakeAws {
    fn sso_login(
        &self,
        session_name: &str,
        no_browser: bool,
        _timeout: Duration,
    ) -> Result<(), Error> {
        self.logins
            .borrow_mut()
            .push((session_name.to_string(), no_browser));
        if let Some(stderr) = &self.login_error {
            return Err(Error::Subprocess {
                command: format!("aws sso login --sso-session {session_name}"),
                status: Some(255),
                stderr: stderr.clone(),
            });
        }
        if let Some(hook) = &self.on_login {
            hook();
        }
        Ok(())
    }
}

impl SsoDirectory for FakeAws {
    fn list_accounts(
        &self,
        _session: &Session,
        _token: &CachedToken,
    ) -> Result<Vec<Account>, Error> {
        Ok(self.accounts.clone())
    }

    fn list_roles(
        &self,
        _session: &Session,
        _token: &CachedToken,
        _account_id: &str,
    ) -> Result<Vec<String>, Error> {
        Ok(self.roles.clone())
    }
}

impl CredentialExchange for FakeAws {
    fn role_credentials(
        &self,
        _session: &Session,
        token: &CachedToken,
        account_id: &str,
        role: &str,
    ) -> Result<TemporaryCredentials, Error> {
        Ok(TemporaryCredentials {
            access_key_id: format!("AKIA-{role}-{account_id}"),
            secret_access_key: "secret".to_string(),
            session_token: format!("session-for-{}", token.access_token),
            expiration: DateTime::<Utc>::from_timestamp(1_900_000_000, 0).unwrap(),
        })
    }

    fn caller_identity(&self, profile: &str) -> Result<CallerIdentity, Error> {
        Ok(CallerIdentity {
            user_id: "AROATEST:me".to_string(),
            account: "123456789012".to_string(),
            arn: format!("arn:aws:sts::123456789012:assumed-role/{profile}/me"),
        })
    }
}

impl ProfileLister for FakeAws {
    fn list_profiles(&self) -> Result<Vec<String>, Error> {
        Ok(self.profiles.clone())
    }
}
