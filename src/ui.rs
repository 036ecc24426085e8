use chrono::{DateTime, Local, Utc};
use colored::Colorize;
use inquire::ui::{Color, RenderConfig, StyleSheet, Styled};
use std::sync::atomic::{AtomicBool, Ordering};
use supports_color::Stream;

use crate::command_name;
use crate::{UI_ERROR_PREFIX, UI_INFO_PREFIX, UI_WARNING_PREFIX};

static PLAIN: AtomicBool = AtomicBool::new(false);

pub fn set_plain(value: bool) {
    PLAIN.store(value, Ordering::Relaxed);
}

pub fn is_plain() -> bool {
    PLAIN.load(Ordering::Relaxed)
}

pub fn use_color_stdout() -> bool {
    supports_color(Stream::Stdout)
}

pub fn use_color_stderr() -> bool {
    supports_color(Stream::Stderr)
}

fn supports_color(stream: Stream) -> bool {
    if is_plain() {
        return false;
    }
    if std::env::var_os("NO_COLOR").is_some() {
        return false;
    }
    supports_color::on(stream).is_some()
}

pub fn style_text<F>(text: &str, use_color: bool, style: F) -> String
where
    F: FnOnce(colored::ColoredString) -> colored::ColoredString,
{
    if use_color && !is_plain() {
        style(text.normal()).to_string()
    } else {
        text.to_string()
    }
}

pub fn format_cmd(command: &str, use_color: bool) -> String {
    let text = format_cmd_plain(command);
    style_text(&text, use_color, |text| text.yellow().bold())
}

/// Backtick-quoted command for messages that are rendered later.
pub fn format_cmd_plain(command: &str) -> String {
    format!("`{command}`")
}

pub fn format_command(cmd: &str, use_color: bool) -> String {
    let name = command_name();
    let full = if cmd.is_empty() {
        name.to_string()
    } else {
        format!("{name} {cmd}")
    };
    format_cmd(&full, use_color)
}

pub fn format_action(message: &str, use_color: bool) -> String {
    let text = format!("✅ {message}");
    style_text(&text, use_color, |text| text.green().bold())
}

pub fn format_warning(message: &str, use_color: bool) -> String {
    let prefix = UI_WARNING_PREFIX;
    let mut lines = message.lines();
    let first = lines.next().unwrap_or_default();
    let mut text = format!("{prefix}{first}");
    let indent = " ".repeat(prefix.len());
    for line in lines {
        text.push('\n');
        text.push_str(&indent);
        text.push_str(line);
    }
    style_text(&text, use_color, |text| text.yellow().dimmed().italic())
}

pub fn format_hint(message: &str, use_color: bool) -> String {
    if is_plain() {
        crate::msg1(UI_INFO_PREFIX, message)
    } else {
        style_text(message, use_color, |text| text.italic())
    }
}

/// Progress line written to stderr so stdout stays machine readable.
pub fn print_notice(message: &str) {
    eprintln!("{}", format_hint(message, use_color_stderr()));
}

pub fn format_error(message: &str) -> String {
    let message = message
        .strip_prefix(&format!("{UI_ERROR_PREFIX} "))
        .unwrap_or(message);
    let use_color = use_color_stderr();
    let prefix = if use_color {
        UI_ERROR_PREFIX.red().bold().to_string()
    } else {
        UI_ERROR_PREFIX.to_string()
    };
    let mut lines = message.lines();
    let first = lines.next().unwrap_or_default();
    let mut text = format!("{prefix} {first}");
    for line in lines {
        text.push('\n');
        text.push_str(&style_text(line, use_color, |text| text.dimmed().italic()));
    }
    text
}

pub fn format_entry_header(display: &str, use_color: bool) -> String {
    if use_color {
        display.bold().to_string()
    } else {
        display.to_string()
    }
}

pub fn format_badge(text: &str, use_color: bool) -> String {
    if use_color {
        format!(" {text} ").white().on_bright_black().to_string()
    } else {
        format!("[{text}]")
    }
}

pub fn format_local_time(at: &DateTime<Utc>) -> String {
    at.with_timezone(&Local)
        .format("%Y-%m-%d %H:%M:%S %Z")
        .to_string()
}

pub fn inquire_select_render_config() -> RenderConfig<'static> {
    let mut config = if use_color_stderr() {
        let mut config = RenderConfig::default_colored();
        config.help_message = StyleSheet::new().with_fg(Color::DarkGrey);
        config
    } else {
        RenderConfig::empty()
    };
    config.prompt_prefix = Styled::new("");
    config.answered_prompt_prefix = Styled::new("");
    config
}

pub fn is_inquire_cancel(err: &inquire::error::InquireError) -> bool {
    matches!(
        err,
        inquire::error::InquireError::OperationCanceled
            | inquire::error::InquireError::OperationInterrupted
    )
}

const OUTPUT_INDENT: &str = " ";

pub fn print_output_block(message: &str) {
    let message = if is_plain() {
        message.to_string()
    } else {
        indent_output(message)
    };
    println!("\n{message}\n");
}

fn indent_output(message: &str) -> String {
    message
        .lines()
        .map(|line| {
            if line.is_empty() {
                String::new()
            } else {
                format!("{OUTPUT_INDENT}{line}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{set_env_guard, set_plain_guard};
    use crate::{ERR_TIMEOUT, ERR_TIMEOUT_HINT, UI_TWO_LINE};

    #[test]
    fn plain_toggle_affects_output() {
        {
            let _plain = set_plain_guard(true);
            assert!(is_plain());
            let warning = format_warning("oops", true);
            assert_eq!(warning, "Warning: oops");
        }
        assert!(!is_plain());
    }

    #[test]
    fn format_warning_multiline_aligns_continuation() {
        let warning = format_warning("first\nsecond", false);
        assert_eq!(warning, "Warning: first\n         second");
    }

    #[test]
    fn supports_color_respects_no_color() {
        let _env = set_env_guard("NO_COLOR", Some("1"));
        assert!(!use_color_stdout());
        assert!(!use_color_stderr());
    }

    #[test]
    fn format_helpers_basic() {
        let _plain = set_plain_guard(false);
        assert_eq!(format_cmd("aws sso login", false), "`aws sso login`");
        assert_eq!(format_cmd_plain("x"), "`x`");
        assert!(format_action("done", false).contains("done"));
        assert_eq!(format_hint("hint", false), "hint");
        assert_eq!(format_badge("default", false), "[default]");
    }

    #[test]
    fn format_hint_plain_uses_prefix() {
        let _plain = set_plain_guard(true);
        assert_eq!(format_hint("hint", true), "Info: hint");
    }

    #[test]
    fn format_error_plain() {
        let _env = set_env_guard("NO_COLOR", Some("1"));
        assert_eq!(format_error("oops"), "Error: oops");
        assert_eq!(format_error("Error: oops"), "Error: oops");
    }

    #[test]
    fn format_error_multiline_keeps_detail_lines() {
        let _env = set_env_guard("NO_COLOR", Some("1"));
        let message = crate::msg2(
            UI_TWO_LINE,
            crate::msg1(ERR_TIMEOUT, 5),
            crate::msg1(ERR_TIMEOUT_HINT, "`aws sso login`"),
        );
        let err = format_error(&message);
        let mut lines = err.lines();
        assert_eq!(
            lines.next().unwrap(),
            "Error: The browser sign-in was not completed within 5 seconds."
        );
        assert!(lines.next().unwrap().contains("`aws sso login`"));
    }

    #[test]
    fn format_local_time_is_readable() {
        let at = DateTime::parse_from_rfc3339("2030-01-02T03:04:05Z")
            .unwrap()
            .with_timezone(&Utc);
        let text = format_local_time(&at);
        assert!(text.contains(':'));
        assert!(text.len() >= 19);
    }

    #[test]
    fn format_entry_header_and_indent() {
        assert_eq!(format_entry_header("Display", false), "Display");
        let indented = super::indent_output("line\n\nline2");
        assert_eq!(indented, " line\n\n line2");
    }

    #[test]
    fn render_config_and_cancel() {
        let _env = set_env_guard("NO_COLOR", Some("1"));
        let config = inquire_select_render_config();
        assert_eq!(config.prompt_prefix.content, "");
        let err = inquire::error::InquireError::OperationCanceled;
        assert!(is_inquire_cancel(&err));
        let err = inquire::error::InquireError::NotTTY;
        assert!(!is_inquire_cancel(&err));
    }

    #[test]
    fn print_output_blocks() {
        let _plain = set_plain_guard(true);
        print_output_block("hi");
    }

    #[test]
    fn format_command_uses_name() {
        let cmd = format_command("init", false);
        assert!(cmd.starts_with('`'));
        assert!(cmd.ends_with(" init`"));
    }
}
