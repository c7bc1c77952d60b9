use std::fs;
use std::path::{Path, PathBuf};

use jwalk::WalkDir;

use crate::error::{Result, Chainable};

/// Files directly inside `dir` with extension `ext`, sorted by name.
pub fn list_files(dir: &Path, ext: &str) -> Result<Vec<PathBuf>> {
    let mut files = vec![];
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort(true) {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type().is_file() && path.extension().map_or(false, |e| e == ext) {
            files.push(path);
        }
    }

    Ok(files)
}

/// Recursively copies the contents of `from` into `to`, creating `to` and
/// overwriting files that already exist there. Hidden entries are skipped.
pub fn copy_dir(from: &Path, to: &Path) -> Result<usize> {
    let mut copied = 0;
    fs::create_dir_all(to).chain_with(|| error!("failed to create directory", "path" => to.display()))?;
    for entry in WalkDir::new(from).min_depth(1).sort(true) {
        let entry = entry?;
        let path = entry.path();
        let dest = to.join(path.strip_prefix(from)?);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&dest)?;
        } else if entry.file_type().is_file() {
            copy_file(&path, &dest)?;
            copied += 1;
        }
    }

    Ok(copied)
}

pub fn copy_file(from: &Path, to: &Path) -> Result<()> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)?;
    }

    fs::copy(from, to).map(|_| ()).chain_with(|| error! {
        "failed to copy file",
        "from" => from.display(),
        "to" => to.display(),
    })
}

/// Removes everything inside `dir` but leaves `dir` itself in place,
/// creating it if it does not exist.
pub fn clear_dir(dir: &Path) -> Result<()> {
    if !dir.exists() {
        return Ok(fs::create_dir_all(dir)?);
    }

    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let removed = match path.is_dir() {
            true => fs::remove_dir_all(&path),
            false => fs::remove_file(&path),
        };

        removed.chain_with(|| error!("failed to remove path", "path" => path.display()))?;
    }

    Ok(())
}

/// Writes `contents` through a sibling temporary file and a rename, so a
/// reader never observes a half-written file.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let parent = path.parent().unwrap_or(Path::new("."));
    fs::create_dir_all(parent)?;

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, contents)?;
    fs::rename(&tmp, path).chain_with(|| error! {
        "failed to move file into place",
        "path" => path.display(),
    })
}
