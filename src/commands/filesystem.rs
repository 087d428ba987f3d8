use crate::error::{Result, SyncError};
use chrono::Local;
use std::fs;
use std::path::{Path, PathBuf};

/// Check if the target folder already exists in the textures directory
pub fn check_existing_folder(textures_dir: &Path, folder: &str) -> bool {
    textures_dir.join(folder).exists()
}

/// Backup the existing target folder by renaming it with a timestamp.
///
/// Returns the backup folder's path.
pub fn backup_existing_folder(textures_dir: &Path, folder: &str) -> Result<PathBuf> {
    let source = textures_dir.join(folder);

    if !source.exists() {
        return Err(SyncError::io(
            &source,
            std::io::Error::new(std::io::ErrorKind::NotFound, "folder does not exist"),
        ));
    }

    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    let dest = textures_dir.join(format!("{}_backup_{}", folder, timestamp));

    fs::rename(&source, &dest).map_err(|e| SyncError::io(&source, e))?;

    Ok(dest)
}

/// Check that a directory exists and is writable
pub fn validate_directory(path: &Path) -> Result<()> {
    let invalid = |message: &str| SyncError::InvalidConfig {
        field: "local_directory",
        message: format!("{}: {}", path.display(), message),
    };

    if !path.exists() {
        return Err(invalid("directory does not exist"));
    }

    if !path.is_dir() {
        return Err(invalid("path is not a directory"));
    }

    let metadata = fs::metadata(path).map_err(|e| SyncError::io(path, e))?;
    if metadata.permissions().readonly() {
        return Err(invalid("directory is read-only"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn backup_renames_with_timestamp() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join("SLUS-21214")).unwrap();
        assert!(check_existing_folder(tmp.path(), "SLUS-21214"));

        let backup = backup_existing_folder(tmp.path(), "SLUS-21214").unwrap();
        assert!(!check_existing_folder(tmp.path(), "SLUS-21214"));
        assert!(backup.is_dir());
        let name = backup.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("SLUS-21214_backup_"));
        assert_eq!(name.len(), "SLUS-21214_backup_".len() + "YYYYMMDD_HHMMSS".len());
    }

    #[test]
    fn backup_of_missing_folder_fails() {
        let tmp = TempDir::new().unwrap();
        assert!(backup_existing_folder(tmp.path(), "SLUS-21214").is_err());
    }

    #[test]
    fn validate_rejects_files_and_missing_paths() {
        let tmp = TempDir::new().unwrap();
        assert!(validate_directory(tmp.path()).is_ok());
        assert!(validate_directory(&tmp.path().join("nope")).is_err());
        let file = tmp.path().join("f.txt");
        fs::write(&file, b"x").unwrap();
        assert!(matches!(
            validate_directory(&file),
            Err(SyncError::InvalidConfig { .. })
        ));
    }
}
