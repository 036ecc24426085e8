use std::env;

use crate::{
    AccountRoleSelector, CachedToken, CallerIdentity, ConfigStore, CredentialExchange,
    DEFAULT_PROFILE, Error, LoginCommand, LoginOptions, LoginOrchestrator, LoginOutcome, Paths,
    Profile, ProfileLister, ProfileWriter, Prompter, PROFILE_PROMPT_NAME, STEP_CHOOSE_PROFILE,
    STEP_FETCH_CREDENTIALS, STEP_LIST_PROFILES, STEP_LOAD_PROFILE, STEP_LOAD_SETTINGS, STEP_LOGIN,
    STEP_REGISTER_SESSION, STEP_RESOLVE_SESSION, STEP_RESOLVE_TOKEN, STEP_SAVE_SETTINGS,
    STEP_SELECT_ACCOUNT, STEP_SELECT_ROLE, STEP_SETUP, STEP_STATUS, STEP_VERIFY_IDENTITY,
    STEP_WRITE_DEFAULT, STEP_WRITE_PROFILE, Session, SessionRequest, SessionResolver, Settings,
    SettingsStore, SsoDirectory, StepExt, TemporaryCredentials, TokenCache, TokenLookup,
    env_region, format_warning, load_profile, use_color_stderr, validate_account_id,
    validate_profile_name,
};

/// The external pieces the broker drives. Production wires `AwsCli` and
/// `InquirePrompter` into every slot.
pub struct Collaborators<'a> {
    pub prompter: &'a dyn Prompter,
    pub login: &'a dyn LoginCommand,
    pub directory: &'a dyn SsoDirectory,
    pub exchange: &'a dyn CredentialExchange,
    pub lister: &'a dyn ProfileLister,
}

#[derive(Clone, Debug, Default)]
pub struct SetupOptions {
    pub session: SessionRequest,
    pub profile: Option<String>,
    pub set_default: bool,
    pub account_id: Option<String>,
    pub role: Option<String>,
    pub login: LoginOptions,
}

#[derive(Clone, Debug)]
pub struct SetupOutcome {
    pub profile: Profile,
    pub wrote_default: bool,
}

#[derive(Clone, Debug, Default)]
pub struct InitOptions {
    pub profile: Option<String>,
    pub login: LoginOptions,
}

#[derive(Clone, Debug)]
pub struct InitOutcome {
    pub profile: Profile,
    pub session: Session,
    pub login: LoginOutcome,
    pub token: CachedToken,
    pub identity: CallerIdentity,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionStatus {
    pub session: Session,
    pub token: TokenLookup,
}

#[derive(Clone, Debug)]
pub struct StatusReport {
    pub sessions: Vec<SessionStatus>,
    pub profiles: Vec<String>,
    pub default_profile: Option<String>,
}

pub struct Broker<'a> {
    config: ConfigStore,
    settings: SettingsStore,
    cache: TokenCache,
    deps: Collaborators<'a>,
}

impl<'a> Broker<'a> {
    pub fn new(paths: &Paths, deps: Collaborators<'a>) -> Broker<'a> {
        Broker::with_stores(
            ConfigStore::from_paths(paths),
            SettingsStore::from_paths(paths),
            TokenCache::from_paths(paths),
            deps,
        )
    }

    pub fn with_stores(
        config: ConfigStore,
        settings: SettingsStore,
        cache: TokenCache,
        deps: Collaborators<'a>,
    ) -> Broker<'a> {
        Broker {
            config,
            settings,
            cache,
            deps,
        }
    }

    fn orchestrator(&self, settings: &Settings) -> LoginOrchestrator<'_> {
        LoginOrchestrator::new(
            &self.config,
            &self.cache,
            self.deps.login,
            settings.login_timeout(),
        )
    }

    /// Session, token, account, role, profile. Cancelling at any prompt
    /// stops before anything is written to a profile.
    pub fn setup(&self, options: SetupOptions) -> Result<SetupOutcome, Error> {
        self.run_setup(options).step(STEP_SETUP)
    }

    fn run_setup(&self, options: SetupOptions) -> Result<SetupOutcome, Error> {
        if let Some(account_id) = &options.account_id {
            validate_account_id(account_id).step(STEP_SELECT_ACCOUNT)?;
        }
        if let Some(profile) = &options.profile {
            validate_profile_name(profile).step(STEP_CHOOSE_PROFILE)?;
        }
        let settings = self.settings.load().step(STEP_LOAD_SETTINGS)?;

        let mut resolver = SessionResolver::new(self.deps.prompter, settings.sessions);
        let session = resolver
            .resolve(&options.session)
            .step(STEP_RESOLVE_SESSION)?;
        self.config
            .register_session(&session)
            .step(STEP_REGISTER_SESSION)?;
        self.settings
            .update(|settings| settings.upsert_session(session.clone()))
            .step(STEP_SAVE_SETTINGS)?;

        let token = self
            .resolve_token(&session, options.login)
            .step(STEP_RESOLVE_TOKEN)?;

        let selector = AccountRoleSelector::new(self.deps.directory, self.deps.prompter);
        let account_id = match options.account_id {
            Some(account_id) => account_id,
            None => {
                selector
                    .select_account(&session, &token)
                    .step(STEP_SELECT_ACCOUNT)?
                    .account_id
            }
        };
        let role = match options.role {
            Some(role) => role,
            None => selector
                .select_role(&session, &token, &account_id)
                .step(STEP_SELECT_ROLE)?,
        };
        let profile_name = match options.profile {
            Some(profile) => profile,
            None => {
                let name = self
                    .deps
                    .prompter
                    .text_input(PROFILE_PROMPT_NAME, Some(DEFAULT_PROFILE))
                    .step(STEP_CHOOSE_PROFILE)?;
                validate_profile_name(&name).step(STEP_CHOOSE_PROFILE)?;
                name
            }
        };

        let region = profile_region(env_region(), &session);
        let writer = ProfileWriter::new(&self.config);
        let profile = writer
            .write_profile(&profile_name, &session, &account_id, &role, &region)
            .step(STEP_WRITE_PROFILE)?;
        let wrote_default = if profile_name == DEFAULT_PROFILE {
            true
        } else if options.set_default {
            writer
                .write_profile(DEFAULT_PROFILE, &session, &account_id, &role, &region)
                .step(STEP_WRITE_DEFAULT)?;
            true
        } else {
            false
        };
        self.settings
            .update(|settings| settings.default_profile = Some(profile_name.clone()))
            .step(STEP_SAVE_SETTINGS)?;

        Ok(SetupOutcome {
            profile,
            wrote_default,
        })
    }

    /// Makes sure the profile's session has a valid token, signing in when
    /// needed, and checks the profile against STS.
    pub fn init(&self, options: InitOptions) -> Result<InitOutcome, Error> {
        let settings = self.settings.load().step(STEP_LOAD_SETTINGS)?;
        let name = select_profile_name(
            options.profile,
            env::var("AWS_PROFILE").ok(),
            settings.default_profile.clone(),
        );
        let (profile, session) = load_profile(&self.config, &name).step(STEP_LOAD_PROFILE)?;
        let login = self
            .orchestrator(&settings)
            .login(&session, options.login)
            .step(STEP_LOGIN)?;
        let token = self.cached_token(&session).step(STEP_RESOLVE_TOKEN)?;
        let identity = self
            .deps
            .exchange
            .caller_identity(&profile.profile_name)
            .step(STEP_VERIFY_IDENTITY)?;
        Ok(InitOutcome {
            profile,
            session,
            login,
            token,
            identity,
        })
    }

    /// A valid token for `session`, signing in at most once.
    pub fn resolve_token(
        &self,
        session: &Session,
        options: LoginOptions,
    ) -> Result<CachedToken, Error> {
        let settings = self.settings.load()?;
        let login = self.orchestrator(&settings);
        self.cache.resolve_with_auto_login(session, &login, options)
    }

    /// Reads the cache once after `login` has run. A miss here is an error,
    /// never a second sign-in.
    fn cached_token(&self, session: &Session) -> Result<CachedToken, Error> {
        self.cache.resolve(session)?.into_token(session)
    }

    pub fn exchange_for_credentials(
        &self,
        session: &Session,
        token: &CachedToken,
        role: &str,
        account_id: &str,
    ) -> Result<TemporaryCredentials, Error> {
        validate_account_id(account_id)?;
        self.deps
            .exchange
            .role_credentials(session, token, account_id, role)
    }

    /// Temporary credentials for a configured profile.
    pub fn credentials(
        &self,
        profile: Option<String>,
        options: LoginOptions,
    ) -> Result<(Profile, TemporaryCredentials), Error> {
        let settings = self.settings.load().step(STEP_LOAD_SETTINGS)?;
        let name = select_profile_name(
            profile,
            env::var("AWS_PROFILE").ok(),
            settings.default_profile.clone(),
        );
        let (profile, session) = load_profile(&self.config, &name).step(STEP_LOAD_PROFILE)?;
        let token = self
            .resolve_token(&session, options)
            .step(STEP_RESOLVE_TOKEN)?;
        let credentials = self
            .exchange_for_credentials(&session, &token, &profile.role, &profile.account_id)
            .step(STEP_FETCH_CREDENTIALS)?;
        Ok((profile, credentials))
    }

    /// Profiles from the config file, or from `aws configure list-profiles`
    /// when there is no config file.
    pub fn list_known_profiles(&self) -> Result<Vec<String>, Error> {
        let listed = match self.config.list_profiles().step(STEP_LIST_PROFILES)? {
            Some(names) => names,
            None => self.deps.lister.list_profiles().step(STEP_LIST_PROFILES)?,
        };
        Ok(listed)
    }

    pub fn status(&self) -> Result<StatusReport, Error> {
        let settings = self.settings.load().step(STEP_LOAD_SETTINGS)?;
        let mut sessions = settings.sessions.clone();
        if let Some(doc) = self.config.read().step(STEP_STATUS)? {
            for name in doc.session_names() {
                if sessions.iter().any(|session| session.name == name) {
                    continue;
                }
                match doc.session(&name, self.config.path()) {
                    Ok(session) => sessions.push(session),
                    Err(err) => {
                        eprintln!("{}", format_warning(&err.to_string(), use_color_stderr()))
                    }
                }
            }
        }
        let mut statuses = Vec::with_capacity(sessions.len());
        for session in sessions {
            let token = self.cache.resolve(&session).step(STEP_STATUS)?;
            statuses.push(SessionStatus { session, token });
        }
        Ok(StatusReport {
            sessions: statuses,
            profiles: self.list_known_profiles()?,
            default_profile: settings.default_profile,
        })
    }
}

/// Explicit argument, then `AWS_PROFILE`, then the last configured profile.
fn select_profile_name(
    explicit: Option<String>,
    env_profile: Option<String>,
    saved: Option<String>,
) -> String {
    [explicit, env_profile, saved]
        .into_iter()
        .flatten()
        .map(|name| name.trim().to_string())
        .find(|name| !name.is_empty())
        .unwrap_or_else(|| DEFAULT_PROFILE.to_string())
}

fn profile_region(env_region: Option<String>, session: &Session) -> String {
    env_region.unwrap_or_else(|| session.region.clone())
}
