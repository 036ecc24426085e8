use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::{
    CONFIG_ERR_KEY, CONFIG_ERR_MISSING_KEY, CONFIG_ERR_READ, CONFIG_ERR_SECTION_MISSING,
    CONFIG_ERR_SECTION_NAME, CONFIG_ERR_VALUE, CONFIG_ERR_VALUE_EMPTY, CONFIG_ERR_VALUE_NEWLINE,
    DEFAULT_PROFILE, Error, Paths, Session, command_name, format_cmd_plain, lock_store,
    write_atomic,
};

const SSO_SESSION_PREFIX: &str = "sso-session ";
const PROFILE_PREFIX: &str = "profile ";

/// Identity of a section in the AWS CLI config file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SectionKey {
    Default,
    Profile(String),
    SsoSession(String),
    Other(String),
}

impl SectionKey {
    /// Parses the text between the brackets of a section header.
    pub fn parse(inner: &str) -> SectionKey {
        let inner = inner.trim();
        if inner == DEFAULT_PROFILE {
            return SectionKey::Default;
        }
        if let Some(name) = inner.strip_prefix(PROFILE_PREFIX) {
            return SectionKey::Profile(name.trim().to_string());
        }
        if let Some(name) = inner.strip_prefix(SSO_SESSION_PREFIX) {
            return SectionKey::SsoSession(name.trim().to_string());
        }
        SectionKey::Other(inner.to_string())
    }

    /// `default` maps to `[default]`, anything else to `[profile NAME]`.
    pub fn profile(name: &str) -> SectionKey {
        if name == DEFAULT_PROFILE {
            SectionKey::Default
        } else {
            SectionKey::Profile(name.to_string())
        }
    }

    pub fn header(&self) -> String {
        match self {
            SectionKey::Default => format!("[{DEFAULT_PROFILE}]"),
            SectionKey::Profile(name) => format!("[{PROFILE_PREFIX}{name}]"),
            SectionKey::SsoSession(name) => format!("[{SSO_SESSION_PREFIX}{name}]"),
            SectionKey::Other(name) => format!("[{name}]"),
        }
    }

    pub fn profile_name(&self) -> Option<&str> {
        match self {
            SectionKey::Default => Some(DEFAULT_PROFILE),
            SectionKey::Profile(name) => Some(name),
            _ => None,
        }
    }

    fn name(&self) -> &str {
        match self {
            SectionKey::Default => DEFAULT_PROFILE,
            SectionKey::Profile(name) | SectionKey::SsoSession(name) | SectionKey::Other(name) => {
                name
            }
        }
    }
}

fn header_key(line: &str) -> Option<SectionKey> {
    let trimmed = line.trim();
    let inner = trimmed.strip_prefix('[')?.strip_suffix(']')?;
    Some(SectionKey::parse(inner))
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Section {
    pub key: SectionKey,
    pub entries: Vec<(String, String)>,
}

impl Section {
    /// Last assignment of `key` wins, as in the AWS CLI.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .rev()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConfigDocument {
    pub sections: Vec<Section>,
}

impl ConfigDocument {
    pub fn parse(content: &str) -> ConfigDocument {
        let mut sections: Vec<Section> = Vec::new();
        let mut nested = false;
        for line in content.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with(';') {
                continue;
            }
            if let Some(key) = header_key(trimmed) {
                nested = false;
                sections.push(Section {
                    key,
                    entries: Vec::new(),
                });
                continue;
            }
            let Some(section) = sections.last_mut() else {
                continue;
            };
            // Indented lines under an empty-valued key are nested settings (e.g. `s3 =`).
            if nested && line.starts_with(char::is_whitespace) {
                continue;
            }
            let Some((key, value)) = trimmed.split_once('=') else {
                continue;
            };
            let value = value.trim();
            nested = value.is_empty();
            section
                .entries
                .push((key.trim().to_string(), value.to_string()));
        }
        ConfigDocument { sections }
    }

    pub fn section(&self, key: &SectionKey) -> Option<&Section> {
        self.sections.iter().rev().find(|section| section.key == *key)
    }

    /// Profile names in file order, duplicates removed.
    pub fn profile_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for section in &self.sections {
            if let Some(name) = section.key.profile_name()
                && !names.iter().any(|existing| existing == name)
            {
                names.push(name.to_string());
            }
        }
        names
    }

    pub fn session_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for section in &self.sections {
            if let SectionKey::SsoSession(name) = &section.key
                && !names.contains(name)
            {
                names.push(name.clone());
            }
        }
        names
    }

    pub fn session(&self, name: &str, path: &Path) -> Result<Session, Error> {
        let key = SectionKey::SsoSession(name.to_string());
        let section = self.section(&key).ok_or_else(|| missing_section(&key, path))?;
        let start_url = required(section, "sso_start_url", path)?;
        let region = required(section, "sso_region", path)?;
        let mut session = Session::new(name, start_url, region)?;
        if let Some(scopes) = section.get("sso_registration_scopes") {
            let scopes: Vec<String> = scopes
                .split(',')
                .map(str::trim)
                .filter(|scope| !scope.is_empty())
                .map(str::to_string)
                .collect();
            if !scopes.is_empty() {
                session.scopes = scopes;
            }
        }
        Ok(session)
    }
}

pub(crate) fn required<'a>(section: &'a Section, key: &str, path: &Path) -> Result<&'a str, Error> {
    section
        .get(key)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| {
            Error::Config(crate::msg3(
                CONFIG_ERR_MISSING_KEY,
                section.key.header(),
                path.display(),
                key,
            ))
        })
}

pub(crate) fn missing_section(key: &SectionKey, path: &Path) -> Error {
    Error::Config(crate::msg3(
        CONFIG_ERR_SECTION_MISSING,
        key.header(),
        path.display(),
        format_cmd_plain(&format!("{} setup", command_name())),
    ))
}

/// A section ready to be written. Keys and values are checked when they are
/// added, so `render` always produces a well-formed block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SectionBlock {
    key: SectionKey,
    entries: Vec<(String, String)>,
}

impl SectionBlock {
    pub fn new(key: SectionKey) -> Result<SectionBlock, Error> {
        let name = key.name();
        let valid = !name.is_empty()
            && name
                .chars()
                .all(|ch| !ch.is_whitespace() && !matches!(ch, '[' | ']' | '#' | ';'));
        if !valid {
            return Err(Error::Validation(crate::msg1(CONFIG_ERR_SECTION_NAME, name)));
        }
        Ok(SectionBlock {
            key,
            entries: Vec::new(),
        })
    }

    pub fn entry(mut self, key: &str, value: &str) -> Result<SectionBlock, Error> {
        let key_valid = !key.is_empty()
            && key
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '_' | '-' | '.'));
        if !key_valid {
            return Err(Error::Validation(crate::msg1(CONFIG_ERR_KEY, key)));
        }
        if value.contains(['\n', '\r']) {
            return Err(Error::Validation(crate::msg2(
                CONFIG_ERR_VALUE,
                key,
                CONFIG_ERR_VALUE_NEWLINE,
            )));
        }
        let value = value.trim();
        if value.is_empty() {
            return Err(Error::Validation(crate::msg2(
                CONFIG_ERR_VALUE,
                key,
                CONFIG_ERR_VALUE_EMPTY,
            )));
        }
        self.entries.retain(|(existing, _)| existing != key);
        self.entries.push((key.to_string(), value.to_string()));
        Ok(self)
    }

    pub fn key(&self) -> &SectionKey {
        &self.key
    }

    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }

    /// True when every field of the block already has the same value on disk.
    pub fn matches(&self, section: &Section) -> bool {
        section.key == self.key
            && self
                .entries
                .iter()
                .all(|(key, value)| section.get(key) == Some(value.as_str()))
    }

    pub fn render(&self) -> String {
        let mut out = self.key.header();
        out.push('\n');
        for (key, value) in &self.entries {
            out.push_str(key);
            out.push_str(" = ");
            out.push_str(value);
            out.push('\n');
        }
        out
    }
}

pub fn session_block(session: &Session) -> Result<SectionBlock, Error> {
    SectionBlock::new(SectionKey::SsoSession(session.name.clone()))?
        .entry("sso_start_url", &session.start_url)?
        .entry("sso_region", &session.region)?
        .entry("sso_registration_scopes", &session.scopes.join(","))
}

/// Replaces the section named by `block` in place, or appends it when absent.
/// Every other line is kept verbatim.
pub fn splice_section(content: &str, block: &SectionBlock) -> String {
    replace_section(content, block.key(), Some(&block.render()))
}

pub fn remove_section(content: &str, key: &SectionKey) -> String {
    replace_section(content, key, None)
}

fn replace_section(content: &str, key: &SectionKey, replacement: Option<&str>) -> String {
    let mut out = String::with_capacity(content.len() + replacement.map_or(0, str::len) + 2);
    let mut in_target = false;
    let mut placed = false;
    for line in content.split_inclusive('\n') {
        if let Some(found) = header_key(line) {
            if found == *key {
                in_target = true;
                if !placed {
                    if let Some(block) = replacement {
                        out.push_str(block);
                    }
                    placed = true;
                }
                continue;
            }
            if in_target && replacement.is_some() && !out.ends_with("\n\n") {
                out.push('\n');
            }
            in_target = false;
        }
        if !in_target {
            out.push_str(line);
        }
    }
    if !placed && let Some(block) = replacement {
        if !out.is_empty() {
            if !out.ends_with('\n') {
                out.push('\n');
            }
            if !out.ends_with("\n\n") {
                out.push('\n');
            }
        }
        out.push_str(block);
    }
    out
}

/// Source of profile names when the config file is not available locally.
pub trait ProfileLister {
    fn list_profiles(&self) -> Result<Vec<String>, Error>;
}

/// The AWS CLI config file plus the lock that serialises writers.
pub struct ConfigStore {
    path: PathBuf,
    lock_path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: PathBuf, lock_path: PathBuf) -> ConfigStore {
        ConfigStore { path, lock_path }
    }

    pub fn from_paths(paths: &Paths) -> ConfigStore {
        ConfigStore::new(paths.aws_config.clone(), paths.app.join("aws-config.lock"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_raw(&self) -> Result<Option<String>, Error> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(Some(content)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(Error::Config(crate::msg2(
                CONFIG_ERR_READ,
                self.path.display(),
                err,
            ))),
        }
    }

    /// `None` when the file does not exist yet.
    pub fn read(&self) -> Result<Option<ConfigDocument>, Error> {
        Ok(self.read_raw()?.map(|content| ConfigDocument::parse(&content)))
    }

    pub fn section(&self, key: &SectionKey) -> Result<Option<Section>, Error> {
        Ok(self
            .read()?
            .and_then(|doc| doc.section(key).cloned()))
    }

    /// Writes `block` unless the file already holds identical values for
    /// every field in it. Returns whether the file changed.
    pub fn upsert_section(&self, block: &SectionBlock) -> Result<bool, Error> {
        let _lock = lock_store(&self.lock_path)?;
        let content = self.read_raw()?.unwrap_or_default();
        let doc = ConfigDocument::parse(&content);
        if doc
            .section(block.key())
            .is_some_and(|section| block.matches(section))
        {
            debug!(section = %block.key().header(), "config section unchanged");
            return Ok(false);
        }
        let updated = splice_section(&content, block);
        write_atomic(&self.path, updated.as_bytes())?;
        info!(
            section = %block.key().header(),
            path = %self.path.display(),
            "wrote config section"
        );
        Ok(true)
    }

    /// Drops every `[default]` section and appends `block` in its place.
    pub fn replace_default(&self, block: &SectionBlock) -> Result<(), Error> {
        let _lock = lock_store(&self.lock_path)?;
        let content = self.read_raw()?.unwrap_or_default();
        let stripped = remove_section(&content, &SectionKey::Default);
        let updated = splice_section(&stripped, block);
        write_atomic(&self.path, updated.as_bytes())?;
        info!(path = %self.path.display(), "replaced default profile");
        Ok(())
    }

    pub fn register_session(&self, session: &Session) -> Result<bool, Error> {
        self.upsert_section(&session_block(session)?)
    }

    pub fn has_session(&self, name: &str) -> Result<bool, Error> {
        let key = SectionKey::SsoSession(name.to_string());
        Ok(self.section(&key)?.is_some())
    }

    /// `None` when the config file does not exist.
    pub fn list_profiles(&self) -> Result<Option<Vec<String>>, Error> {
        Ok(self.read()?.map(|doc| doc.profile_names()))
    }
}
