use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::env;
use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::{
    AWS_ERR_BAD_EXPIRATION, AWS_ERR_SPAWN, AWS_ERR_WAIT, Account, CachedToken, CallerIdentity,
    CredentialExchange, Error, LoginCommand, ProfileLister, Session, SsoDirectory,
    TemporaryCredentials,
};

const AWS_BIN_ENV_VAR: &str = "SSO_BROKER_AWS_BIN";
const DEFAULT_AWS_BIN: &str = "aws";
const POLL_INTERVAL: Duration = Duration::from_millis(100);
const REDACTED: &str = "<redacted>";
const SIGINT_EXIT_CODE: i32 = 130;

/// Every AWS interaction goes through the `aws` executable.
pub struct AwsCli {
    program: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountList {
    #[serde(default)]
    account_list: Vec<AccountEntry>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountEntry {
    account_id: String,
    #[serde(default)]
    account_name: Option<String>,
    #[serde(default)]
    email_address: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RoleList {
    #[serde(default)]
    role_list: Vec<RoleEntry>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RoleEntry {
    role_name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RoleCredentialsResponse {
    role_credentials: RoleCredentials,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RoleCredentials {
    access_key_id: String,
    secret_access_key: String,
    session_token: String,
    expiration: i64,
}

impl AwsCli {
    pub fn new(program: impl Into<String>) -> AwsCli {
        AwsCli {
            program: program.into(),
        }
    }

    pub fn from_env() -> AwsCli {
        let program = env::var(AWS_BIN_ENV_VAR)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_AWS_BIN.to_string());
        AwsCli::new(program)
    }

    /// Shell-quoted command line with the access token hidden.
    fn display(&self, args: &[&str]) -> String {
        let mut words: Vec<&str> = Vec::with_capacity(args.len() + 1);
        words.push(&self.program);
        let mut redact_next = false;
        for arg in args {
            if redact_next {
                words.push(REDACTED);
                redact_next = false;
                continue;
            }
            redact_next = *arg == "--access-token";
            words.push(arg);
        }
        shlex::try_join(words.iter().copied()).unwrap_or_else(|_| words.join(" "))
    }

    fn spawn_error(&self, display: &str, err: std::io::Error) -> Error {
        Error::Config(crate::msg2(AWS_ERR_SPAWN, display, err))
    }

    fn output(&self, args: &[&str]) -> Result<String, Error> {
        let command_line = self.display(args);
        debug!(command = %command_line, "running aws");
        let output = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|err| self.spawn_error(&command_line, err))?;
        if !output.status.success() {
            return Err(Error::Subprocess {
                command: command_line,
                status: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn json<T: DeserializeOwned>(&self, args: &[&str]) -> Result<T, Error> {
        let stdout = self.output(args)?;
        serde_json::from_str(&stdout).map_err(|err| Error::InvalidOutput {
            command: self.display(args),
            detail: err.to_string(),
        })
    }

    /// Runs an interactive command, killing it once `timeout` elapses. The
    /// child's stdout is sent to our stderr so `credentials` output stays
    /// clean; its stderr is captured for the error. Stderr is collected only
    /// until the deadline, since a browser started by the child can keep the
    /// pipe open after the child exits.
    fn run_with_timeout(&self, args: &[&str], timeout: Duration) -> Result<(), Error> {
        let command_line = self.display(args);
        debug!(
            command = %command_line,
            timeout_secs = timeout.as_secs(),
            "running aws with timeout"
        );
        let deadline = Instant::now() + timeout;
        let mut child = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::from(std::io::stderr()))
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| self.spawn_error(&command_line, err))?;
        let stderr_rx = child.stderr.take().map(|mut stderr| {
            let (tx, rx) = mpsc::channel();
            thread::spawn(move || {
                let mut captured = Vec::new();
                let _ = stderr.read_to_end(&mut captured);
                let _ = tx.send(String::from_utf8_lossy(&captured).into_owned());
            });
            rx
        });

        let status = match wait_until(&mut child, deadline) {
            Ok(Some(status)) => status,
            Ok(None) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(Error::Timeout {
                    command: command_line,
                    timeout,
                });
            }
            Err(err) => {
                let _ = child.kill();
                return Err(Error::Config(crate::msg2(AWS_ERR_WAIT, command_line, err)));
            }
        };
        let stderr = stderr_rx
            .and_then(|rx| {
                let remaining = deadline.saturating_duration_since(Instant::now());
                rx.recv_timeout(remaining.max(POLL_INTERVAL)).ok()
            })
            .unwrap_or_default();
        if status.success() {
            return Ok(());
        }
        if was_interrupted(&status) {
            return Err(Error::Cancelled);
        }
        Err(Error::Subprocess {
            command: command_line,
            status: status.code(),
            stderr,
        })
    }
}

fn wait_until(child: &mut Child, deadline: Instant) -> std::io::Result<Option<ExitStatus>> {
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn was_interrupted(status: &ExitStatus) -> bool {
    if status.code() == Some(SIGINT_EXIT_CODE) {
        return true;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if status.signal() == Some(2) {
            return true;
        }
    }
    false
}

impl LoginCommand for AwsCli {
    fn sso_login(
        &self,
        session_name: &str,
        no_browser: bool,
        timeout: Duration,
    ) -> Result<(), Error> {
        let mut args = vec!["sso", "login", "--sso-session", session_name];
        if no_browser {
            args.push("--no-browser");
        }
        self.run_with_timeout(&args, timeout)
    }
}

impl SsoDirectory for AwsCli {
    fn list_accounts(&self, session: &Session, token: &CachedToken) -> Result<Vec<Account>, Error> {
        let list: AccountList = self.json(&[
            "sso",
            "list-accounts",
            "--access-token",
            &token.access_token,
            "--region",
            &session.region,
            "--output",
            "json",
        ])?;
        Ok(list
            .account_list
            .into_iter()
            .map(|entry| Account {
                account_id: entry.account_id,
                account_name: entry.account_name.filter(|name| !name.is_empty()),
                email: entry.email_address.filter(|email| !email.is_empty()),
                region: session.region.clone(),
                roles: Vec::new(),
            })
            .collect())
    }

    fn list_roles(
        &self,
        session: &Session,
        token: &CachedToken,
        account_id: &str,
    ) -> Result<Vec<String>, Error> {
        let list: RoleList = self.json(&[
            "sso",
            "list-account-roles",
            "--access-token",
            &token.access_token,
            "--account-id",
            account_id,
            "--region",
            &session.region,
            "--output",
            "json",
        ])?;
        Ok(list
            .role_list
            .into_iter()
            .map(|entry| entry.role_name)
            .collect())
    }
}

impl CredentialExchange for AwsCli {
    fn role_credentials(
        &self,
        session: &Session,
        token: &CachedToken,
        account_id: &str,
        role: &str,
    ) -> Result<TemporaryCredentials, Error> {
        let args = [
            "sso",
            "get-role-credentials",
            "--role-name",
            role,
            "--account-id",
            account_id,
            "--access-token",
            &token.access_token,
            "--region",
            &session.region,
            "--output",
            "json",
        ];
        let response: RoleCredentialsResponse = self.json(&args)?;
        let credentials = response.role_credentials;
        let expiration =
            DateTime::<Utc>::from_timestamp_millis(credentials.expiration).ok_or_else(|| {
                Error::InvalidOutput {
                    command: self.display(&args),
                    detail: crate::msg1(AWS_ERR_BAD_EXPIRATION, credentials.expiration),
                }
            })?;
        Ok(TemporaryCredentials {
            access_key_id: credentials.access_key_id,
            secret_access_key: credentials.secret_access_key,
            session_token: credentials.session_token,
            expiration,
        })
    }

    fn caller_identity(&self, profile: &str) -> Result<CallerIdentity, Error> {
        self.json(&[
            "sts",
            "get-caller-identity",
            "--profile",
            profile,
            "--output",
            "json",
        ])
    }
}

impl ProfileLister for AwsCli {
    fn list_profiles(&self) -> Result<Vec<String>, Error> {
        let stdout = self.output(&["configure", "list-profiles"])?;
        Ok(stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }
}
