use crate::{
    ACCOUNT_ERR_NO_ROLES, ACCOUNT_ERR_NONE, ACCOUNT_ERR_UNKNOWN, ACCOUNT_PROMPT_SELECT,
    ACCOUNT_UNNAMED, CachedToken, Error, Prompter, ROLE_PROMPT_SELECT, Session,
    validate_account_id,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Account {
    pub account_id: String,
    pub account_name: Option<String>,
    pub email: Option<String>,
    pub region: String,
    pub roles: Vec<String>,
}

impl Account {
    /// `<id> (<name>)`; the id must stay first, see [`parse_account_label`].
    pub fn label(&self) -> String {
        let name = self.account_name.as_deref().unwrap_or(ACCOUNT_UNNAMED);
        format!("{} ({name})", self.account_id)
    }
}

/// Accounts and roles reachable with an SSO access token.
pub trait SsoDirectory {
    fn list_accounts(&self, session: &Session, token: &CachedToken) -> Result<Vec<Account>, Error>;
    fn list_roles(
        &self,
        session: &Session,
        token: &CachedToken,
        account_id: &str,
    ) -> Result<Vec<String>, Error>;
}

pub fn parse_account_label(label: &str) -> Result<String, Error> {
    let id = label.split_once(' ').map_or(label, |(id, _)| id);
    validate_account_id(id)?;
    Ok(id.to_string())
}

pub struct AccountRoleSelector<'a> {
    directory: &'a dyn SsoDirectory,
    prompter: &'a dyn Prompter,
}

impl<'a> AccountRoleSelector<'a> {
    pub fn new(
        directory: &'a dyn SsoDirectory,
        prompter: &'a dyn Prompter,
    ) -> AccountRoleSelector<'a> {
        AccountRoleSelector {
            directory,
            prompter,
        }
    }

    pub fn select_account(&self, session: &Session, token: &CachedToken) -> Result<Account, Error> {
        let accounts = self.directory.list_accounts(session, token)?;
        if accounts.is_empty() {
            return Err(Error::Config(crate::msg1(ACCOUNT_ERR_NONE, &session.name)));
        }
        let labels: Vec<String> = accounts.iter().map(Account::label).collect();
        let choice = self.prompter.select_one(ACCOUNT_PROMPT_SELECT, &labels)?;
        let account_id = parse_account_label(&choice)?;
        accounts
            .into_iter()
            .find(|account| account.account_id == account_id)
            .ok_or_else(|| Error::Validation(crate::msg1(ACCOUNT_ERR_UNKNOWN, account_id)))
    }

    pub fn select_role(
        &self,
        session: &Session,
        token: &CachedToken,
        account_id: &str,
    ) -> Result<String, Error> {
        let roles = self.directory.list_roles(session, token, account_id)?;
        if roles.is_empty() {
            return Err(Error::Config(crate::msg1(ACCOUNT_ERR_NO_ROLES, account_id)));
        }
        self.prompter.select_one(ROLE_PROMPT_SELECT, &roles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{
        Answer, FakeAws, ScriptedPrompter, sample_account, sample_session, sample_token,
    };

    #[test]
    fn label_uses_unnamed_fallback() {
        let mut account = sample_account("123456789012", Some("Prod"));
        assert_eq!(account.label(), "123456789012 (Prod)");
        account.account_name = None;
        assert_eq!(account.label(), "123456789012 (Unnamed)");
    }

    #[test]
    fn parse_account_label_revalidates() {
        assert_eq!(
            parse_account_label("123456789012 (Prod team)").unwrap(),
            "123456789012"
        );
        assert_eq!(parse_account_label("123456789012").unwrap(), "123456789012");
        assert!(parse_account_label("12345678901 (short)").is_err());
        assert!(parse_account_label("Prod (123456789012)").is_err());
    }

    #[test]
    fn select_account_returns_chosen_account() {
        let aws = FakeAws::default().with_accounts(vec![
            sample_account("111111111111", Some("Dev")),
            sample_account("222222222222", None),
        ]);
        let prompter = ScriptedPrompter::new(vec![Answer::Select("222222222222 (Unnamed)")]);
        let selector = AccountRoleSelector::new(&aws, &prompter);
        let account = selector
            .select_account(&sample_session("work"), &sample_token("tok"))
            .unwrap();
        assert_eq!(account.account_id, "222222222222");
        assert_eq!(
            prompter.last_options(),
            vec!["111111111111 (Dev)", "222222222222 (Unnamed)"]
        );
    }

    #[test]
    fn zero_accounts_or_roles_is_error() {
        let aws = FakeAws::default();
        let prompter = ScriptedPrompter::new(vec![]);
        let selector = AccountRoleSelector::new(&aws, &prompter);
        let session = sample_session("work");
        let token = sample_token("tok");
        let err = selector.select_account(&session, &token).unwrap_err();
        assert!(err.to_string().contains("No accounts"));
        let err = selector
            .select_role(&session, &token, "111111111111")
            .unwrap_err();
        assert!(err.to_string().contains("No roles"));
    }

    #[test]
    fn select_role_prompts_with_roles() {
        let aws = FakeAws::default().with_roles(vec!["Admin", "ReadOnly"]);
        let prompter = ScriptedPrompter::new(vec![Answer::Select("ReadOnly")]);
        let selector = AccountRoleSelector::new(&aws, &prompter);
        let role = selector
            .select_role(&sample_session("work"), &sample_token("tok"), "111111111111")
            .unwrap();
        assert_eq!(role, "ReadOnly");
    }

    #[test]
    fn cancel_during_selection_propagates() {
        let aws = FakeAws::default().with_accounts(vec![sample_account("111111111111", None)]);
        let prompter = ScriptedPrompter::new(vec![Answer::Cancel]);
        let selector = AccountRoleSelector::new(&aws, &prompter);
        let err = selector
            .select_account(&sample_session("work"), &sample_token("tok"))
            .unwrap_err();
        assert!(err.is_cancelled());
    }
}
