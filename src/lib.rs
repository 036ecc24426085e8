use clap::{FromArgMatches, error::ErrorKind};

use crate::cli::{Cli, Commands, command_with_examples};

pub fn run_cli() {
    let args: Vec<std::ffi::OsString> = std::env::args_os().collect();
    if let Err(message) = run_cli_with_args(args) {
        eprintln!("{message}");
        std::process::exit(1);
    }
}

fn run_cli_with_args(args: Vec<std::ffi::OsString>) -> Result<(), String> {
    if args.len() == 1 {
        let name = package_command_name();
        println!("{name} {}", env!("CARGO_PKG_VERSION"));
        println!();
        let mut cmd = command_with_examples();
        let _ = cmd.print_help();
        println!();
        return Ok(());
    }
    let cmd = command_with_examples();
    let matches = match cmd.clone().try_get_matches_from(args) {
        Ok(matches) => matches,
        Err(err) => {
            if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) {
                let _ = err.print();
                return Ok(());
            }
            return Err(err.to_string());
        }
    };
    let cli = Cli::from_arg_matches(&matches).map_err(|err| err.to_string())?;
    set_plain(cli.plain);
    init_tracing();
    match run(cli) {
        Ok(()) => Ok(()),
        Err(err) if err.is_cancelled() => Ok(()),
        Err(err) => {
            tracing::debug!(error = ?err, "command failed");
            Err(format_error(&err.to_string()))
        }
    }
}

fn run(cli: Cli) -> Result<(), Error> {
    let paths = resolve_paths()?;
    ensure_paths(&paths)?;

    let aws = AwsCli::from_env();
    let prompter = InquirePrompter;
    let broker = Broker::new(
        &paths,
        Collaborators {
            prompter: &prompter,
            login: &aws,
            directory: &aws,
            exchange: &aws,
            lister: &aws,
        },
    );

    match cli.command {
        Commands::Setup {
            session,
            start_url,
            region,
            profile,
            default,
            account_id,
            role,
            force_refresh,
            no_browser,
        } => setup_command(
            &broker,
            SetupOptions {
                session: SessionRequest {
                    name: session,
                    start_url,
                    region,
                },
                profile,
                set_default: default,
                account_id,
                role,
                login: LoginOptions {
                    force_refresh,
                    no_browser,
                },
            },
        ),
        Commands::Init {
            profile,
            force_refresh,
            no_browser,
        } => init_command(
            &broker,
            InitOptions {
                profile,
                login: LoginOptions {
                    force_refresh,
                    no_browser,
                },
            },
        ),
        Commands::List => list_command(&broker),
        Commands::Status => status_command(&broker),
        Commands::Credentials {
            profile,
            no_browser,
        } => credentials_command(
            &broker,
            profile,
            LoginOptions {
                force_refresh: false,
                no_browser,
            },
        ),
    }
}

mod accounts;
mod aws;
mod broker;
mod cli;
mod commands;
mod common;
mod config;
mod credentials;
mod error;
mod logging;
mod login;
mod messages;
mod profile;
mod prompt;
mod session;
mod settings;
#[cfg(test)]
mod test_utils;
mod token;
mod ui;

pub(crate) use accounts::*;
pub(crate) use aws::*;
pub(crate) use broker::*;
pub(crate) use commands::*;
pub(crate) use common::*;
pub(crate) use config::*;
pub(crate) use credentials::*;
pub(crate) use error::*;
pub(crate) use logging::*;
pub(crate) use login::*;
pub(crate) use messages::*;
pub(crate) use profile::*;
pub(crate) use prompt::*;
pub(crate) use session::*;
pub(crate) use settings::*;
pub(crate) use token::*;
pub(crate) use ui::*;

pub use config::{ConfigDocument, SectionBlock, SectionKey, remove_section, splice_section};
pub use credentials::TemporaryCredentials;
pub use error::Error;
pub use profile::{validate_account_id, validate_profile_name};
pub use session::{normalize_start_url, validate_session_name, validate_start_url};
pub use token::parse_expires_at;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{make_paths, set_env_guard};
    use std::ffi::OsString;
    use std::fs;

    #[test]
    fn run_cli_with_args_help() {
        let args = vec![OsString::from("sso-broker")];
        run_cli_with_args(args).unwrap();
    }

    #[test]
    fn run_cli_with_args_display_help() {
        let args = vec![OsString::from("sso-broker"), OsString::from("--help")];
        run_cli_with_args(args).unwrap();
    }

    #[test]
    fn run_cli_with_args_errors() {
        let args = vec![OsString::from("sso-broker"), OsString::from("nope")];
        let err = run_cli_with_args(args).unwrap_err();
        assert!(err.contains("error"));
    }

    #[test]
    fn run_cli_list_command() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = make_paths(dir.path());
        fs::create_dir_all(paths.aws_config.parent().unwrap()).unwrap();
        fs::write(&paths.aws_config, "[profile dev]\nregion = us-east-1\n").unwrap();
        let home = dir.path().to_string_lossy().into_owned();
        let _home = set_env_guard("SSO_BROKER_HOME", Some(&home));
        let _config = set_env_guard("AWS_CONFIG_FILE", None);
        let cli = Cli {
            plain: true,
            command: Commands::List,
        };
        run(cli).unwrap();
        assert!(paths.lock.exists());
    }

    #[test]
    fn run_reports_missing_profile() {
        let dir = tempfile::tempdir().expect("tempdir");
        let home = dir.path().to_string_lossy().into_owned();
        let _home = set_env_guard("SSO_BROKER_HOME", Some(&home));
        let _config = set_env_guard("AWS_CONFIG_FILE", None);
        let _profile = set_env_guard("AWS_PROFILE", None);
        let cli = Cli {
            plain: true,
            command: Commands::Init {
                profile: Some("ghost".to_string()),
                force_refresh: false,
                no_browser: true,
            },
        };
        let err = run(cli).unwrap_err();
        assert!(err.to_string().contains("[profile ghost]"));
    }
}
