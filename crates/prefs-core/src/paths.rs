use directories::ProjectDirs;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

pub const APP_QUALIFIER: &str = "com";
pub const APP_ORG: &str = "darklock";
pub const APP_NAME: &str = "prefs";

fn project_dirs() -> Result<ProjectDirs, ConfigError> {
    ProjectDirs::from(APP_QUALIFIER, APP_ORG, APP_NAME).ok_or(ConfigError::NoDataDir)
}

/// Platform data directory. Overrides are applied by `PrefsConfig`.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    Ok(project_dirs()?.data_dir().to_path_buf())
}

pub fn config_file() -> Result<PathBuf, ConfigError> {
    Ok(project_dirs()?.config_dir().join("config.json"))
}

pub fn keys_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("keys")
}

/// Owner read/write only (0600).
#[cfg(unix)]
pub fn restrict_to_owner(path: &Path) -> std::io::Result<()> {
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_mode(0o600);
    fs::set_permissions(path, perms)
}

/// No POSIX modes here; files keep the ACLs inherited from their directory.
#[cfg(not(unix))]
pub fn restrict_to_owner(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_live_under_data_dir() {
        assert_eq!(keys_dir(Path::new("/data")), PathBuf::from("/data/keys"));
    }

    #[cfg(unix)]
    #[test]
    fn restrict_sets_owner_only_mode() {
        use std::os::unix::fs::PermissionsExt;
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::set_permissions(file.path(), std::fs::Permissions::from_mode(0o644)).unwrap();
        restrict_to_owner(file.path()).unwrap();
        let mode = std::fs::metadata(file.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
