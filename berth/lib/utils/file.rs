use std::path::Path;

use tokio::fs;

use crate::BerthResult;

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Copies every regular file in `src_dir` (non-recursive) into `dst_dir`,
/// creating `dst_dir` if needed. Existing destination files are overwritten.
///
/// Returns the number of files copied.
pub async fn copy_dir_files(src_dir: &Path, dst_dir: &Path) -> BerthResult<usize> {
    fs::create_dir_all(dst_dir).await?;

    let mut copied = 0;
    let mut entries = fs::read_dir(src_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        let Some(file_name) = path.file_name() else {
            continue;
        };

        fs::copy(&path, dst_dir.join(file_name)).await?;
        copied += 1;
    }

    Ok(copied)
}

/// Marks a file as executable by its owner, group, and others (preserving the
/// rest of its mode bits). Used for shell scripts seeded into app data
/// directories, where the engine bind-mounts them into containers.
#[cfg(unix)]
pub async fn set_executable(path: &Path) -> BerthResult<()> {
    use std::os::unix::fs::PermissionsExt;

    let metadata = fs::metadata(path).await?;
    let mut permissions = metadata.permissions();
    permissions.set_mode(permissions.mode() | 0o111);
    fs::set_permissions(path, permissions).await?;

    Ok(())
}

/// Restricts a file to owner-only read/write. Used for secrets sidecars.
#[cfg(unix)]
pub async fn set_owner_only(path: &Path) -> BerthResult<()> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await?;

    Ok(())
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_copy_dir_files_copies_only_regular_files() -> BerthResult<()> {
        let src = tempdir()?;
        let dst = tempdir()?;

        fs::write(src.path().join("a.txt"), "a").await?;
        fs::write(src.path().join("b.conf"), "b").await?;
        fs::create_dir(src.path().join("nested")).await?;
        fs::write(src.path().join("nested").join("c.txt"), "c").await?;

        let copied = copy_dir_files(src.path(), dst.path()).await?;

        assert_eq!(copied, 2);
        assert!(dst.path().join("a.txt").is_file());
        assert!(dst.path().join("b.conf").is_file());
        assert!(!dst.path().join("nested").exists());

        Ok(())
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_set_executable_adds_exec_bits() -> BerthResult<()> {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir()?;
        let path = dir.path().join("run.sh");
        fs::write(&path, "#!/bin/sh\n").await?;

        set_executable(&path).await?;

        let mode = fs::metadata(&path).await?.permissions().mode();
        assert_eq!(mode & 0o111, 0o111);

        Ok(())
    }
}
