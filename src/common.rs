use directories::BaseDirs;
use fslock::LockFile;
use std::env;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::thread;
use std::time::{Duration, Instant};

#[cfg(test)]
use std::cell::Cell;
#[cfg(test)]
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::Error;
use crate::{
    COMMON_ERR_CREATE_APP_DIR, COMMON_ERR_CREATE_DIR, COMMON_ERR_CREATE_TEMP,
    COMMON_ERR_EXISTS_NOT_DIR, COMMON_ERR_EXISTS_NOT_FILE, COMMON_ERR_GET_TIME,
    COMMON_ERR_INVALID_FILE_NAME, COMMON_ERR_LOCK_ACQUIRE, COMMON_ERR_LOCK_HELD,
    COMMON_ERR_LOCK_OPEN, COMMON_ERR_REPLACE_FILE, COMMON_ERR_RESOLVE_HOME,
    COMMON_ERR_RESOLVE_PARENT, COMMON_ERR_SET_PERMISSIONS, COMMON_ERR_SET_TEMP_PERMISSIONS,
    COMMON_ERR_WRITE_LOCK_FILE, COMMON_ERR_WRITE_TEMP,
};

const HOME_ENV_VAR: &str = "SSO_BROKER_HOME";
const COMMAND_ENV_VAR: &str = "SSO_BROKER_COMMAND";
const AWS_CONFIG_ENV_VAR: &str = "AWS_CONFIG_FILE";
const APP_DIR: &str = ".sso-broker";
#[cfg(not(test))]
const LOCK_TIMEOUT: Duration = Duration::from_secs(10);
const LOCK_RETRY_DELAY: Duration = Duration::from_millis(200);

pub struct Paths {
    pub app: PathBuf,
    pub settings: PathBuf,
    pub lock: PathBuf,
    pub aws_config: PathBuf,
    pub sso_cache: PathBuf,
}

pub fn command_name() -> &'static str {
    static COMMAND_NAME: OnceLock<String> = OnceLock::new();
    COMMAND_NAME
        .get_or_init(|| {
            let env_value = env::var(COMMAND_ENV_VAR).ok();
            compute_command_name_from(env_value, env::args_os())
        })
        .as_str()
}

fn compute_command_name_from<I>(env_value: Option<String>, mut args: I) -> String
where
    I: Iterator<Item = std::ffi::OsString>,
{
    if let Some(value) = env_value {
        let trimmed = value.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }
    args.next()
        .and_then(|arg| {
            Path::new(&arg)
                .file_name()
                .and_then(|name| name.to_str())
                .map(|name| name.to_string())
        })
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| package_command_name().to_string())
}

pub fn package_command_name() -> &'static str {
    "sso-broker"
}

#[cfg(unix)]
const FAIL_SET_PERMISSIONS: usize = 1;
const FAIL_WRITE_OPEN: usize = 2;
const FAIL_WRITE_WRITE: usize = 3;
const FAIL_WRITE_PERMS: usize = 4;
const FAIL_WRITE_SYNC: usize = 5;
const FAIL_WRITE_RENAME: usize = 6;

#[cfg(test)]
thread_local! {
    static FAILPOINT: Cell<usize> = const { Cell::new(0) };
}
#[cfg(test)]
static FAILPOINT_LOCK: Mutex<()> = Mutex::new(());

#[cfg(test)]
fn maybe_fail(step: usize) -> std::io::Result<()> {
    if FAILPOINT.with(|failpoint| failpoint.get()) == step {
        return Err(std::io::Error::other("failpoint"));
    }
    Ok(())
}

#[cfg(not(test))]
fn maybe_fail(_step: usize) -> std::io::Result<()> {
    Ok(())
}

pub fn resolve_paths() -> Result<Paths, Error> {
    let home_dir =
        resolve_home_dir().ok_or_else(|| Error::Config(COMMON_ERR_RESOLVE_HOME.to_string()))?;
    let aws_config = env::var_os(AWS_CONFIG_ENV_VAR)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty());
    Ok(paths_for_home(&home_dir, aws_config))
}

pub(crate) fn paths_for_home(home_dir: &Path, aws_config: Option<PathBuf>) -> Paths {
    let app = home_dir.join(APP_DIR);
    let aws = home_dir.join(".aws");
    Paths {
        settings: app.join("settings.json"),
        lock: app.join("settings.lock"),
        aws_config: aws_config.unwrap_or_else(|| aws.join("config")),
        sso_cache: aws.join("sso").join("cache"),
        app,
    }
}

fn resolve_home_dir() -> Option<PathBuf> {
    let broker_home = env::var_os(HOME_ENV_VAR).map(PathBuf::from);
    let base_home = BaseDirs::new().map(|dirs| dirs.home_dir().to_path_buf());
    let home = env::var_os("HOME").map(PathBuf::from);
    let userprofile = env::var_os("USERPROFILE").map(PathBuf::from);
    let homedrive = env::var_os("HOMEDRIVE").map(PathBuf::from);
    let homepath = env::var_os("HOMEPATH").map(PathBuf::from);
    resolve_home_dir_with(
        broker_home,
        base_home,
        home,
        userprofile,
        homedrive,
        homepath,
    )
}

fn resolve_home_dir_with(
    broker_home: Option<PathBuf>,
    base_home: Option<PathBuf>,
    home: Option<PathBuf>,
    userprofile: Option<PathBuf>,
    homedrive: Option<PathBuf>,
    homepath: Option<PathBuf>,
) -> Option<PathBuf> {
    if let Some(path) = non_empty_path(broker_home) {
        return Some(path);
    }
    if let Some(path) = base_home {
        return Some(path);
    }
    if let Some(path) = non_empty_path(home) {
        return Some(path);
    }
    if let Some(path) = non_empty_path(userprofile) {
        return Some(path);
    }
    match (homedrive, homepath) {
        (Some(drive), Some(path)) => {
            let mut out = drive;
            out.push(path);
            if out.as_os_str().is_empty() {
                None
            } else {
                Some(out)
            }
        }
        _ => None,
    }
}

fn non_empty_path(path: Option<PathBuf>) -> Option<PathBuf> {
    path.filter(|path| !path.as_os_str().is_empty())
}

pub fn ensure_paths(paths: &Paths) -> Result<(), Error> {
    if paths.app.exists() && !paths.app.is_dir() {
        return Err(Error::Config(crate::msg1(
            COMMON_ERR_EXISTS_NOT_DIR,
            paths.app.display(),
        )));
    }

    fs::create_dir_all(&paths.app).map_err(|err| {
        Error::Config(crate::msg2(
            COMMON_ERR_CREATE_APP_DIR,
            paths.app.display(),
            err,
        ))
    })?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = fs::Permissions::from_mode(0o700);
        if let Err(err) = set_dir_permissions(&paths.app, perms) {
            return Err(Error::Config(crate::msg2(
                COMMON_ERR_SET_PERMISSIONS,
                paths.app.display(),
                err,
            )));
        }
    }

    ensure_file_or_absent(&paths.settings)?;
    ensure_file_or_absent(&paths.lock)?;
    ensure_file_or_absent(&paths.aws_config)?;

    OpenOptions::new()
        .create(true)
        .append(true)
        .open(&paths.lock)
        .map_err(|err| {
            Error::Config(crate::msg2(
                COMMON_ERR_WRITE_LOCK_FILE,
                paths.lock.display(),
                err,
            ))
        })?;

    Ok(())
}

/// Replaces `path` with `contents` via a temp file in the same directory.
/// Existing permissions are kept; new files are created owner-only.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), Error> {
    let permissions = fs::metadata(path)
        .ok()
        .map(|meta| meta.permissions())
        .or_else(restrictive_permissions);
    write_atomic_with_permissions(path, contents, permissions)
}

#[cfg(unix)]
fn restrictive_permissions() -> Option<fs::Permissions> {
    use std::os::unix::fs::PermissionsExt;
    Some(fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrictive_permissions() -> Option<fs::Permissions> {
    None
}

/// Opens the temp file. A file that already existed at `tmp_path` is left
/// alone; only a file this call created is removed on failure.
fn open_temp(options: &OpenOptions, tmp_path: &Path) -> std::io::Result<fs::File> {
    let file = options.open(tmp_path)?;
    if let Err(err) = maybe_fail(FAIL_WRITE_OPEN) {
        drop(file);
        let _ = fs::remove_file(tmp_path);
        return Err(err);
    }
    Ok(file)
}

fn write_atomic_with_permissions(
    path: &Path,
    contents: &[u8],
    permissions: Option<fs::Permissions>,
) -> Result<(), Error> {
    let parent = path
        .parent()
        .ok_or_else(|| Error::Persist(crate::msg1(COMMON_ERR_RESOLVE_PARENT, path.display())))?;
    if !parent.as_os_str().is_empty() {
        fs::create_dir_all(parent).map_err(|err| {
            Error::Persist(crate::msg2(COMMON_ERR_CREATE_DIR, parent.display(), err))
        })?;
    }

    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| Error::Persist(crate::msg1(COMMON_ERR_INVALID_FILE_NAME, path.display())))?;
    let pid = std::process::id();
    let mut attempt = 0u32;
    loop {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|err| Error::Persist(crate::msg1(COMMON_ERR_GET_TIME, err)))?
            .as_nanos();
        let tmp_name = format!(".{file_name}.tmp-{pid}-{nanos}-{attempt}");
        let tmp_path = parent.join(tmp_name);
        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        if let Some(permissions) = permissions.as_ref() {
            use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
            options.mode(permissions.mode());
        }
        let mut tmp_file = match open_temp(&options, &tmp_path) {
            Ok(file) => file,
            Err(err) => {
                attempt += 1;
                if attempt < 5 {
                    continue;
                }
                return Err(Error::Persist(crate::msg2(
                    COMMON_ERR_CREATE_TEMP,
                    path.display(),
                    err,
                )));
            }
        };

        let written = maybe_fail(FAIL_WRITE_WRITE)
            .and_then(|_| tmp_file.write_all(contents))
            .map_err(|err| crate::msg2(COMMON_ERR_WRITE_TEMP, path.display(), err))
            .and_then(|_| match permissions.as_ref() {
                Some(permissions) => maybe_fail(FAIL_WRITE_PERMS)
                    .and_then(|_| fs::set_permissions(&tmp_path, permissions.clone()))
                    .map_err(|err| {
                        crate::msg2(COMMON_ERR_SET_TEMP_PERMISSIONS, path.display(), err)
                    }),
                None => Ok(()),
            })
            .and_then(|_| {
                maybe_fail(FAIL_WRITE_SYNC)
                    .and_then(|_| tmp_file.sync_all())
                    .map_err(|err| crate::msg2(COMMON_ERR_WRITE_TEMP, path.display(), err))
            });
        drop(tmp_file);
        if let Err(message) = written {
            let _ = fs::remove_file(&tmp_path);
            return Err(Error::Persist(message));
        }

        let rename_result = maybe_fail(FAIL_WRITE_RENAME).and_then(|_| fs::rename(&tmp_path, path));
        match rename_result {
            Ok(()) => return Ok(()),
            Err(err) => {
                #[cfg(windows)]
                {
                    if path.exists() {
                        let _ = fs::remove_file(path);
                    }
                    if fs::rename(&tmp_path, path).is_ok() {
                        return Ok(());
                    }
                }
                let _ = fs::remove_file(&tmp_path);
                return Err(Error::Persist(crate::msg2(
                    COMMON_ERR_REPLACE_FILE,
                    path.display(),
                    err,
                )));
            }
        }
    }
}

fn ensure_file_or_absent(path: &Path) -> Result<(), Error> {
    if path.exists() && !path.is_file() {
        return Err(Error::Config(crate::msg1(
            COMMON_ERR_EXISTS_NOT_FILE,
            path.display(),
        )));
    }
    Ok(())
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path, perms: fs::Permissions) -> std::io::Result<()> {
    maybe_fail(FAIL_SET_PERMISSIONS)?;
    fs::set_permissions(path, perms)
}

/// Advisory lock held across a read-modify-write of the settings or the AWS
/// config file. Released on drop.
pub struct StoreLock {
    _lock: LockFile,
}

pub fn lock_store(lock_path: &Path) -> Result<StoreLock, Error> {
    if let Some(parent) = lock_path.parent() {
        fs::create_dir_all(parent).map_err(|err| {
            Error::Persist(crate::msg2(COMMON_ERR_CREATE_DIR, parent.display(), err))
        })?;
    }
    let start = Instant::now();
    let mut lock = LockFile::open(lock_path)
        .map_err(|err| {
            Error::Persist(crate::msg2(COMMON_ERR_LOCK_OPEN, lock_path.display(), err))
        })?;
    loop {
        match lock.try_lock() {
            Ok(true) => break,
            Ok(false) => {
                if start.elapsed() > lock_timeout() {
                    return Err(Error::Persist(crate::msg1(
                        COMMON_ERR_LOCK_ACQUIRE,
                        command_name(),
                    )));
                }
                thread::sleep(LOCK_RETRY_DELAY);
            }
            Err(err) => {
                return Err(Error::Persist(crate::msg1(COMMON_ERR_LOCK_HELD, err)));
            }
        }
    }
    Ok(StoreLock { _lock: lock })
}

#[cfg(not(test))]
fn lock_timeout() -> Duration {
    LOCK_TIMEOUT
}

#[cfg(test)]
fn lock_timeout() -> Duration {
    Duration::from_millis(300)
}
