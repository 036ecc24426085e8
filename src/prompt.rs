use inquire::{Select, Text};
use std::io::{self, IsTerminal};

use crate::{
    Error, PROMPT_ERR_CONTEXT, PROMPT_ERR_NO_OPTIONS, PROMPT_ERR_TTY_REQUIRED, PROMPT_HELP_SELECT,
    command_name, inquire_select_render_config, is_inquire_cancel,
};

/// The two interactions the broker needs from a user.
pub trait Prompter {
    fn select_one(&self, label: &str, options: &[String]) -> Result<String, Error>;
    fn text_input(&self, label: &str, default: Option<&str>) -> Result<String, Error>;
}

/// Terminal prompts backed by `inquire`.
pub struct InquirePrompter;

impl Prompter for InquirePrompter {
    fn select_one(&self, label: &str, options: &[String]) -> Result<String, Error> {
        require_tty(label)?;
        if options.is_empty() {
            return Err(Error::Validation(crate::msg1(PROMPT_ERR_NO_OPTIONS, label)));
        }
        let prompt = Select::new(label, options.to_vec())
            .with_help_message(PROMPT_HELP_SELECT)
            .with_render_config(inquire_select_render_config())
            .prompt();
        handle_inquire_result(prompt, label)
    }

    fn text_input(&self, label: &str, default: Option<&str>) -> Result<String, Error> {
        require_tty(label)?;
        let mut prompt = Text::new(label).with_render_config(inquire_select_render_config());
        if let Some(default) = default {
            prompt = prompt.with_default(default);
        }
        let value = handle_inquire_result(prompt.prompt(), label)?;
        Ok(value.trim().to_string())
    }
}

fn require_tty(context: &str) -> Result<(), Error> {
    require_tty_with(io::stdin().is_terminal(), context)
}

fn require_tty_with(is_tty: bool, context: &str) -> Result<(), Error> {
    if is_tty {
        Ok(())
    } else {
        Err(Error::Prompt(crate::msg2(
            PROMPT_ERR_TTY_REQUIRED,
            context,
            command_name(),
        )))
    }
}

fn handle_inquire_result<T>(
    result: Result<T, inquire::error::InquireError>,
    context: &str,
) -> Result<T, Error> {
    match result {
        Ok(value) => Ok(value),
        Err(err) if is_inquire_cancel(&err) => Err(Error::Cancelled),
        Err(err) => Err(Error::Prompt(crate::msg2(PROMPT_ERR_CONTEXT, context, err))),
    }
}
