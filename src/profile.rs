use tracing::info;

use crate::{
    ConfigStore, Error, PROFILE_ERR_ACCOUNT_ID, PROFILE_ERR_NAME, PROFILE_ERR_VERIFY,
    SectionBlock, SectionKey, Session, missing_section, required, validate_start_url,
};

pub const DEFAULT_PROFILE: &str = "default";
const OUTPUT_FORMAT: &str = "json";

/// A named profile that points at an `sso-session`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Profile {
    pub profile_name: String,
    pub region: String,
    pub account_id: String,
    pub role: String,
    pub start_url: String,
    pub session_name: String,
}

impl Profile {
    fn block(&self) -> Result<SectionBlock, Error> {
        SectionBlock::new(SectionKey::profile(&self.profile_name))?
            .entry("sso_session", &self.session_name)?
            .entry("sso_account_id", &self.account_id)?
            .entry("sso_role_name", &self.role)?
            .entry("region", &self.region)?
            .entry("output", OUTPUT_FORMAT)
    }
}

/// Exactly twelve ASCII digits.
pub fn validate_account_id(account_id: &str) -> Result<(), Error> {
    if account_id.len() == 12 && account_id.bytes().all(|byte| byte.is_ascii_digit()) {
        Ok(())
    } else {
        Err(Error::Validation(crate::msg1(
            PROFILE_ERR_ACCOUNT_ID,
            account_id,
        )))
    }
}

pub fn validate_profile_name(name: &str) -> Result<(), Error> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.' | '@'));
    if valid {
        Ok(())
    } else {
        Err(Error::Validation(crate::msg1(PROFILE_ERR_NAME, name)))
    }
}

pub struct ProfileWriter<'a> {
    config: &'a ConfigStore,
}

impl<'a> ProfileWriter<'a> {
    pub fn new(config: &'a ConfigStore) -> ProfileWriter<'a> {
        ProfileWriter { config }
    }

    /// Validates everything before touching the file. `default` replaces the
    /// whole `[default]` section and is read back afterwards.
    pub fn write_profile(
        &self,
        profile_name: &str,
        session: &Session,
        account_id: &str,
        role: &str,
        region: &str,
    ) -> Result<Profile, Error> {
        validate_profile_name(profile_name)?;
        validate_account_id(account_id)?;
        validate_start_url(&session.start_url)?;
        let profile = Profile {
            profile_name: profile_name.to_string(),
            region: region.trim().to_string(),
            account_id: account_id.to_string(),
            role: role.trim().to_string(),
            start_url: session.start_url.clone(),
            session_name: session.name.clone(),
        };
        let block = profile.block()?;
        if profile_name == DEFAULT_PROFILE {
            self.config.replace_default(&block)?;
            self.verify_default(&block)?;
        } else {
            self.config.upsert_section(&block)?;
        }
        info!(
            profile = profile_name,
            account_id,
            role = %profile.role,
            "profile written"
        );
        Ok(profile)
    }

    fn verify_default(&self, block: &SectionBlock) -> Result<(), Error> {
        let path = self.config.path();
        let doc = self
            .config
            .read()?
            .ok_or_else(|| missing_section(&SectionKey::Default, path))?;
        let section = doc
            .section(&SectionKey::Default)
            .ok_or_else(|| missing_section(&SectionKey::Default, path))?;
        for (key, value) in block.entries() {
            if section.get(key) != Some(value.as_str()) {
                return Err(Error::Persist(crate::msg3(
                    PROFILE_ERR_VERIFY,
                    path.display(),
                    key,
                    value,
                )));
            }
        }
        Ok(())
    }
}

/// Reads a profile and the session it references back from the config file.
pub fn load_profile(config: &ConfigStore, name: &str) -> Result<(Profile, Session), Error> {
    let key = SectionKey::profile(name);
    let path = config.path();
    let doc = config
        .read()?
        .ok_or_else(|| missing_section(&key, path))?;
    let section = doc.section(&key).ok_or_else(|| missing_section(&key, path))?;
    let session_name = required(section, "sso_session", path)?;
    let session = doc.session(session_name, path)?;
    let account_id = required(section, "sso_account_id", path)?;
    validate_account_id(account_id)?;
    let role = required(section, "sso_role_name", path)?;
    let region = section
        .get("region")
        .filter(|region| !region.is_empty())
        .unwrap_or(&session.region)
        .to_string();
    let profile = Profile {
        profile_name: name.to_string(),
        region,
        account_id: account_id.to_string(),
        role: role.to_string(),
        start_url: session.start_url.clone(),
        session_name: session.name.clone(),
    };
    Ok((profile, session))
}
