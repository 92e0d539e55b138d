use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Writes `text` next to `path` first, then swaps it into place so readers
/// never observe a half-written map.
pub(crate) fn write_map_text(path: &Path, text: &str) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let staging = staging_path(path);
    if let Err(error) = fs::write(&staging, text) {
        discard(&staging);
        return Err(error);
    }
    if let Err(error) = swap_into_place(&staging, path) {
        discard(&staging);
        return Err(error);
    }
    Ok(())
}

fn swap_into_place(staging: &Path, target: &Path) -> io::Result<()> {
    match fs::rename(staging, target) {
        Ok(()) => Ok(()),
        // Some platforms refuse to rename over an existing file.
        Err(_) if target.exists() => {
            fs::remove_file(target)?;
            fs::rename(staging, target)
        }
        Err(error) => Err(error),
    }
}

fn discard(staging: &Path) {
    let _ = fs::remove_file(staging);
}

fn staging_path(path: &Path) -> PathBuf {
    let stem = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("map.json");
    path.with_file_name(format!(".{stem}.{}.partial", std::process::id()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_new_file_and_creates_parent_directories() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("maps").join("level.json");
        write_map_text(&path, "{}").expect("write");
        assert_eq!(fs::read_to_string(&path).expect("read"), "{}");
    }

    #[test]
    fn replaces_existing_file_without_leaving_staging_behind() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("level.json");
        fs::write(&path, "old").expect("seed");
        write_map_text(&path, "new").expect("write");
        assert_eq!(fs::read_to_string(&path).expect("read"), "new");

        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .expect("read dir")
            .filter_map(Result::ok)
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(".partial"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
