pub const CANCELLED_MESSAGE: &str = "Cancelled.";

pub const ERR_STEP: &str = "Failed to {}: {}";
pub const ERR_CACHE_MISSING: &str = "No cached SSO token found for session '{}'. Run {} to sign in.";
pub const ERR_CACHE_EXPIRED: &str =
    "The cached SSO token for session '{}' has expired. Run {} to sign in again.";
pub const ERR_SUBPROCESS_FAILED: &str = "`{}` exited with status {}: {}";
pub const ERR_SUBPROCESS_SIGNAL: &str = "`{}` was terminated by a signal: {}";
pub const ERR_SUBPROCESS_NO_OUTPUT: &str = "(no error output)";
pub const ERR_TIMEOUT: &str = "The browser sign-in was not completed within {} seconds.";
pub const ERR_TIMEOUT_HINT: &str =
    "Finish signing in sooner and rerun, or raise SSO_BROKER_LOGIN_TIMEOUT. Command: {}";
pub const ERR_INVALID_OUTPUT: &str = "Unexpected output from `{}`: {}";

pub const STEP_SETUP: &str = "configure SSO profile";
pub const STEP_LOAD_SETTINGS: &str = "load settings";
pub const STEP_SAVE_SETTINGS: &str = "save settings";
pub const STEP_RESOLVE_SESSION: &str = "resolve SSO session";
pub const STEP_REGISTER_SESSION: &str = "register SSO session";
pub const STEP_RESOLVE_TOKEN: &str = "obtain SSO token";
pub const STEP_SELECT_ACCOUNT: &str = "select account";
pub const STEP_SELECT_ROLE: &str = "select role";
pub const STEP_CHOOSE_PROFILE: &str = "choose profile name";
pub const STEP_WRITE_PROFILE: &str = "write profile";
pub const STEP_WRITE_DEFAULT: &str = "write default profile";
pub const STEP_LOAD_PROFILE: &str = "load profile";
pub const STEP_LOGIN: &str = "sign in";
pub const STEP_VERIFY_IDENTITY: &str = "verify caller identity";
pub const STEP_FETCH_CREDENTIALS: &str = "fetch role credentials";
pub const STEP_LIST_PROFILES: &str = "list profiles";
pub const STEP_STATUS: &str = "read session status";

pub const CONFIG_ERR_READ: &str = "Could not read {}: {}";
pub const CONFIG_ERR_SECTION_NAME: &str = "Invalid section name '{}'";
pub const CONFIG_ERR_KEY: &str = "Invalid config key '{}'";
pub const CONFIG_ERR_VALUE: &str = "Invalid value for '{}': {}";
pub const CONFIG_ERR_VALUE_EMPTY: &str = "value cannot be empty";
pub const CONFIG_ERR_VALUE_NEWLINE: &str = "value cannot contain line breaks";
pub const CONFIG_ERR_SESSION_NOT_REGISTERED: &str =
    "SSO session '{}' is not registered in {}. Run {} first.";
pub const CONFIG_ERR_SECTION_MISSING: &str = "{} was not found in {}. Run {} first.";
pub const CONFIG_ERR_MISSING_KEY: &str = "{} in {} is missing {}";

pub const SETTINGS_ERR_READ: &str = "Could not read settings file {}: {}";
pub const SETTINGS_ERR_INVALID_JSON: &str = "Settings file {} is invalid JSON: {}";
pub const SETTINGS_ERR_SERIALIZE: &str = "Failed to serialize settings: {}";
pub const SETTINGS_WARN_TIMEOUT: &str = "Ignoring invalid SSO_BROKER_LOGIN_TIMEOUT value '{}'";

pub const SESSION_ERR_START_URL: &str = "Start URL must begin with https:// (got '{}')";
pub const SESSION_ERR_NAME: &str =
    "Invalid session name '{}'. Use letters, digits, '-', '_' or '.'.";
pub const SESSION_ERR_REGION: &str = "Invalid region '{}'";
pub const SESSION_ERR_UNKNOWN_CHOICE: &str = "Unknown session selection '{}'";
pub const SESSION_PROMPT_SELECT: &str = "Select an SSO session";
pub const SESSION_OPTION_CREATE: &str = "Create new session";
pub const SESSION_PROMPT_NAME: &str = "SSO session name";
pub const SESSION_PROMPT_START_URL: &str = "SSO start URL";
pub const SESSION_PROMPT_REGION: &str = "SSO region";

pub const PROMPT_ERR_TTY_REQUIRED: &str =
    "Prompting for '{}' requires a TTY. Pass the value as a flag to `{}` instead.";
pub const PROMPT_ERR_CONTEXT: &str = "Could not prompt for {}: {}";
pub const PROMPT_ERR_NO_OPTIONS: &str = "Nothing to choose from for '{}'";
pub const PROMPT_HELP_SELECT: &str = "Type to search • Use ↑/↓ to select • ENTER to confirm";

pub const TOKEN_ERR_READ_DIR: &str = "Could not read SSO cache directory {}: {}";
pub const TOKEN_ERR_BAD_EXPIRY: &str = "Cached token {} has an invalid expiresAt '{}': {}";
pub const TOKEN_NOTICE_LOGIN: &str = "No valid SSO token for session '{}'. Starting sign-in.";

pub const AWS_ERR_SPAWN: &str = "Could not run `{}`: {}. Install the AWS CLI v2 or set SSO_BROKER_AWS_BIN.";
pub const AWS_ERR_WAIT: &str = "Failed while waiting for `{}`: {}";
pub const AWS_ERR_BAD_EXPIRATION: &str = "invalid expiration timestamp {}";

pub const ACCOUNT_ERR_NONE: &str = "No accounts are available to session '{}'.";
pub const ACCOUNT_ERR_NO_ROLES: &str = "No roles are available in account {}.";
pub const ACCOUNT_ERR_UNKNOWN: &str = "Account {} is not in the account list.";
pub const ACCOUNT_PROMPT_SELECT: &str = "Select an AWS account";
pub const ACCOUNT_UNNAMED: &str = "Unnamed";
pub const ROLE_PROMPT_SELECT: &str = "Select a role";

pub const PROFILE_ERR_ACCOUNT_ID: &str = "Account ID must be exactly 12 digits (got '{}')";
pub const PROFILE_ERR_NAME: &str =
    "Invalid profile name '{}'. Use letters, digits, '-', '_', '.' or '@'.";
pub const PROFILE_ERR_VERIFY: &str = "{} was written but [default] does not contain {} = {}";
pub const PROFILE_PROMPT_NAME: &str = "Profile name";

pub const MSG_SETUP_DONE: &str = "Configured profile {} for {} as {}";
pub const MSG_SETUP_DEFAULT: &str = "Also wrote it as the default profile";
pub const MSG_SETUP_USE: &str = "Use it with {}";
pub const MSG_INIT_ALREADY_VALID: &str = "SSO token for session '{}' is still valid";
pub const MSG_INIT_LOGGED_IN: &str = "Signed in to session '{}'";
pub const MSG_INIT_IDENTITY: &str = "Profile {} is {}";
pub const MSG_TOKEN_EXPIRES: &str = "Token expires {}";
pub const MSG_NO_PROFILES: &str = "No profiles configured. Run {} to create one.";
pub const MSG_STATUS_SESSIONS: &str = "Sessions";
pub const MSG_STATUS_PROFILES: &str = "Profiles";
pub const MSG_STATUS_NO_SESSIONS: &str = "No SSO sessions configured.";
pub const MSG_STATUS_VALID: &str = "valid until {}";
pub const MSG_STATUS_EXPIRED: &str = "expired";
pub const MSG_STATUS_MISSING: &str = "not signed in";
pub const MSG_STATUS_DEFAULT_MARK: &str = "(default)";

pub const UI_WARNING_PREFIX: &str = "Warning: ";
pub const UI_INFO_PREFIX: &str = "Info: {}";
pub const UI_ERROR_PREFIX: &str = "Error:";
pub const UI_TWO_LINE: &str = "{}\n{}";

pub const COMMON_ERR_RESOLVE_HOME: &str = "Could not resolve home directory";
pub const COMMON_ERR_EXISTS_NOT_DIR: &str = "{} exists and is not a directory";
pub const COMMON_ERR_CREATE_APP_DIR: &str = "Cannot create application directory {}: {}";
pub const COMMON_ERR_SET_PERMISSIONS: &str = "Cannot set permissions on {}: {}";
pub const COMMON_ERR_WRITE_LOCK_FILE: &str = "Cannot write lock file {}: {}";
pub const COMMON_ERR_RESOLVE_PARENT: &str = "Cannot resolve parent directory for {}";
pub const COMMON_ERR_CREATE_DIR: &str = "Cannot create directory {}: {}";
pub const COMMON_ERR_INVALID_FILE_NAME: &str = "Invalid file name {}";
pub const COMMON_ERR_GET_TIME: &str = "Failed to get time: {}";
pub const COMMON_ERR_CREATE_TEMP: &str = "Failed to create temp file for {}: {}";
pub const COMMON_ERR_WRITE_TEMP: &str = "Failed to write temp file for {}: {}";
pub const COMMON_ERR_SET_TEMP_PERMISSIONS: &str = "Failed to set temp file permissions for {}: {}";
pub const COMMON_ERR_REPLACE_FILE: &str = "Failed to replace {}: {}";
pub const COMMON_ERR_EXISTS_NOT_FILE: &str = "{} exists and is not a file";
pub const COMMON_ERR_LOCK_OPEN: &str = "Could not open lock file {}: {}";
pub const COMMON_ERR_LOCK_ACQUIRE: &str =
    "Could not acquire the file lock. Another {} may be running; retry shortly.";
pub const COMMON_ERR_LOCK_HELD: &str = "Could not lock file: {}";

pub fn msg1(template: &str, a: impl std::fmt::Display) -> String {
    template.replacen("{}", &a.to_string(), 1)
}

pub fn msg2(template: &str, a: impl std::fmt::Display, b: impl std::fmt::Display) -> String {
    let out = template.replacen("{}", &a.to_string(), 1);
    out.replacen("{}", &b.to_string(), 1)
}

pub fn msg3(
    template: &str,
    a: impl std::fmt::Display,
    b: impl std::fmt::Display,
    c: impl std::fmt::Display,
) -> String {
    let out = template.replacen("{}", &a.to_string(), 1);
    let out = out.replacen("{}", &b.to_string(), 1);
    out.replacen("{}", &c.to_string(), 1)
}
