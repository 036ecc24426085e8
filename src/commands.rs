use crate::{
    Broker, DEFAULT_PROFILE, Error, InitOptions, InitOutcome, LoginOptions, LoginOutcome,
    MSG_INIT_ALREADY_VALID, MSG_INIT_IDENTITY, MSG_INIT_LOGGED_IN, MSG_NO_PROFILES,
    MSG_SETUP_DEFAULT, MSG_SETUP_DONE, MSG_SETUP_USE, MSG_STATUS_DEFAULT_MARK, MSG_STATUS_EXPIRED,
    MSG_STATUS_MISSING, MSG_STATUS_NO_SESSIONS, MSG_STATUS_PROFILES, MSG_STATUS_SESSIONS,
    MSG_STATUS_VALID, MSG_TOKEN_EXPIRES, SetupOptions, SetupOutcome, StatusReport, TokenLookup,
    env_region, format_action, format_badge, format_cmd, format_command, format_entry_header,
    format_hint, format_local_time, print_output_block, style_text, use_color_stdout,
};
use colored::Colorize;

pub fn setup_command(broker: &Broker<'_>, options: SetupOptions) -> Result<(), Error> {
    let outcome = broker.setup(options)?;
    print_output_block(&render_setup(&outcome, use_color_stdout()));
    Ok(())
}

pub fn init_command(broker: &Broker<'_>, options: InitOptions) -> Result<(), Error> {
    let outcome = broker.init(options)?;
    print_output_block(&render_init(&outcome, use_color_stdout()));
    Ok(())
}

pub fn list_command(broker: &Broker<'_>) -> Result<(), Error> {
    let profiles = broker.list_known_profiles()?;
    print_output_block(&render_list(&profiles, None, use_color_stdout()));
    Ok(())
}

pub fn status_command(broker: &Broker<'_>) -> Result<(), Error> {
    let report = broker.status()?;
    print_output_block(&render_status(&report, use_color_stdout()));
    Ok(())
}

/// Prints bare `export` lines so the output can be `eval`ed.
pub fn credentials_command(
    broker: &Broker<'_>,
    profile: Option<String>,
    options: LoginOptions,
) -> Result<(), Error> {
    let (profile, credentials) = broker.credentials(profile, options)?;
    let region = env_region().unwrap_or(profile.region);
    print!("{}", credentials.to_env_exports(Some(&region))?);
    Ok(())
}

fn render_setup(outcome: &SetupOutcome, use_color: bool) -> String {
    let profile = &outcome.profile;
    let mut lines = vec![format_action(
        &crate::msg3(
            MSG_SETUP_DONE,
            &profile.profile_name,
            &profile.account_id,
            &profile.role,
        ),
        use_color,
    )];
    if outcome.wrote_default && profile.profile_name != DEFAULT_PROFILE {
        lines.push(format_hint(MSG_SETUP_DEFAULT, use_color));
    }
    let example = if profile.profile_name == DEFAULT_PROFILE {
        "aws sts get-caller-identity".to_string()
    } else {
        format!(
            "aws sts get-caller-identity --profile {}",
            profile.profile_name
        )
    };
    lines.push(format_hint(
        &crate::msg1(MSG_SETUP_USE, format_cmd(&example, use_color)),
        use_color,
    ));
    lines.join("\n")
}

fn render_init(outcome: &InitOutcome, use_color: bool) -> String {
    let headline = match outcome.login {
        LoginOutcome::AlreadyValid => MSG_INIT_ALREADY_VALID,
        LoginOutcome::LoggedIn => MSG_INIT_LOGGED_IN,
    };
    [
        format_action(&crate::msg1(headline, &outcome.session.name), use_color),
        crate::msg2(
            MSG_INIT_IDENTITY,
            &outcome.profile.profile_name,
            &outcome.identity.arn,
        ),
        format_hint(
            &crate::msg1(
                MSG_TOKEN_EXPIRES,
                format_local_time(&outcome.token.expires_at),
            ),
            use_color,
        ),
    ]
    .join("\n")
}

fn render_list(profiles: &[String], default_profile: Option<&str>, use_color: bool) -> String {
    if profiles.is_empty() {
        return crate::msg1(MSG_NO_PROFILES, format_command("setup", use_color));
    }
    profiles
        .iter()
        .map(|name| {
            if Some(name.as_str()) == default_profile {
                format!(
                    "{} {}",
                    format_entry_header(name, use_color),
                    format_badge(MSG_STATUS_DEFAULT_MARK, use_color)
                )
            } else {
                name.clone()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_token_state(token: &TokenLookup, use_color: bool) -> String {
    match token {
        TokenLookup::Valid(token) => style_text(
            &crate::msg1(MSG_STATUS_VALID, format_local_time(&token.expires_at)),
            use_color,
            |text| text.green(),
        ),
        TokenLookup::Expired => style_text(MSG_STATUS_EXPIRED, use_color, |text| text.yellow()),
        TokenLookup::Missing => style_text(MSG_STATUS_MISSING, use_color, |text| text.dimmed()),
    }
}

fn render_status(report: &StatusReport, use_color: bool) -> String {
    let mut lines = vec![format_entry_header(MSG_STATUS_SESSIONS, use_color)];
    if report.sessions.is_empty() {
        lines.push(format!("  {MSG_STATUS_NO_SESSIONS}"));
    }
    for status in &report.sessions {
        lines.push(format!(
            "  {}  {}",
            status.session.label(),
            render_token_state(&status.token, use_color)
        ));
    }
    lines.push(String::new());
    lines.push(format_entry_header(MSG_STATUS_PROFILES, use_color));
    let profiles = render_list(
        &report.profiles,
        report.default_profile.as_deref(),
        use_color,
    );
    for line in profiles.lines() {
        lines.push(format!("  {line}"));
    }
    lines.join("\n")
}
