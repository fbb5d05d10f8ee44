/// Zero-permission lock files for exercising permission handling.
///
/// A lock file holds the 4-byte `LOCK` magic and carries mode 0000, so
/// tested code cannot open it for reading or writing. It can still be
/// unlinked by its owner, which is exactly the behavior remove/unlink
/// tests rely on.
use crate::config::types::{FaultboxError, Result};
use std::fs;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

const MAGIC: &[u8; 4] = b"LOCK";

pub fn create_lockfile(path: &Path) -> Result<()> {
    let mut file = fs::File::create(path).map_err(|e| {
        FaultboxError::LockFile(format!("Unable to create lock file {}: {e}", path.display()))
    })?;
    file.write_all(MAGIC).map_err(|e| {
        FaultboxError::LockFile(format!(
            "Unable to write magic bytes to lock file {}: {e}",
            path.display()
        ))
    })?;
    drop(file);

    fs::set_permissions(path, fs::Permissions::from_mode(0o000)).map_err(|e| {
        FaultboxError::LockFile(format!(
            "Unable to set lock file permissions on {}: {e}",
            path.display()
        ))
    })?;
    Ok(())
}

/// Unlink a lock file created by [`create_lockfile`]. Unlinking does
/// not require read or write permission, only ownership of the
/// containing directory entry.
pub fn remove_lockfile(path: &Path) -> Result<()> {
    if !path.exists() {
        return Err(FaultboxError::LockFile(format!(
            "Lock file {} no longer exists",
            path.display()
        )));
    }
    fs::remove_file(path).map_err(|e| {
        FaultboxError::LockFile(format!("Unable to remove lock file {}: {e}", path.display()))
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lockfile_lifecycle() {
        let path = std::env::temp_dir().join(format!("faultbox-lock-{}", std::process::id()));
        create_lockfile(&path).unwrap();

        let meta = fs::metadata(&path).unwrap();
        assert_eq!(meta.permissions().mode() & 0o777, 0);
        assert_eq!(meta.len(), 4);

        remove_lockfile(&path).unwrap();
        assert!(!path.exists());
        assert!(remove_lockfile(&path).is_err());
    }
}
