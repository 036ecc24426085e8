use clap::{Command, CommandFactory, Parser, Subcommand};

use crate::command_name;

#[derive(Parser)]
#[command(author, version, about, color = clap::ColorChoice::Never)]
pub struct Cli {
    /// Disable styling and separators
    #[arg(long, global = true)]
    pub plain: bool,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Pick an SSO session, account and role, then write an AWS profile
    Setup {
        /// SSO session name
        #[arg(long, value_name = "name")]
        session: Option<String>,
        /// SSO start URL (https://...)
        #[arg(long, value_name = "url")]
        start_url: Option<String>,
        /// SSO region
        #[arg(long, value_name = "region")]
        region: Option<String>,
        /// Profile name to write
        #[arg(long, value_name = "profile")]
        profile: Option<String>,
        /// Also write the profile as [default]
        #[arg(long)]
        default: bool,
        /// Skip the account prompt
        #[arg(long, value_name = "id")]
        account_id: Option<String>,
        /// Skip the role prompt
        #[arg(long, value_name = "role")]
        role: Option<String>,
        /// Sign in again even if the cached token is valid
        #[arg(long)]
        force_refresh: bool,
        /// Print the sign-in URL instead of opening a browser
        #[arg(long)]
        no_browser: bool,
    },
    /// Sign in for a profile's SSO session when its token is missing or expired
    Init {
        /// Profile to use (defaults to AWS_PROFILE, then the last configured profile)
        #[arg(long, value_name = "profile")]
        profile: Option<String>,
        /// Sign in again even if the cached token is valid
        #[arg(long)]
        force_refresh: bool,
        /// Print the sign-in URL instead of opening a browser
        #[arg(long)]
        no_browser: bool,
    },
    /// List profiles in the AWS config file
    List,
    /// Show token state for every known SSO session
    Status,
    /// Print `export` lines with temporary credentials for a profile
    Credentials {
        /// Profile to use (defaults to AWS_PROFILE, then the last configured profile)
        #[arg(long, value_name = "profile")]
        profile: Option<String>,
        /// Print the sign-in URL instead of opening a browser
        #[arg(long)]
        no_browser: bool,
    },
}

pub fn command_with_examples() -> Command {
    let name = command_name();
    let mut cmd = Cli::command();
    cmd.set_bin_name(name);
    cmd = cmd.after_help(examples_root(name));
    cmd
}

fn examples_root(name: &str) -> String {
    format!(
        "Examples:\n  {name} setup\n  {name} setup --session work --start-url https://work.awsapps.com/start --region us-east-1 --profile dev\n  {name} init --profile dev\n  {name} list\n  {name} status\n  eval \"$({name} credentials --profile dev)\""
    )
}
