//! Copy requested files into a working directory

use crate::types::InlineFile;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Copy each file or directory into `dest`, keeping only its base name
pub fn stage_paths(dest: &Path, paths: &[PathBuf]) -> io::Result<()> {
    for source in paths {
        let name = source.file_name().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("Cannot stage {}: no file name", source.display()),
            )
        })?;
        let target = dest.join(name);
        if source.is_dir() {
            copy_tree(source, &target)?;
        } else {
            std::fs::copy(source, &target)?;
        }
    }
    Ok(())
}

/// Write each inline file directly under `dest`
pub fn write_inline_files(dest: &Path, files: &[InlineFile]) -> io::Result<()> {
    for file in files {
        std::fs::write(dest.join(&file.name), &file.contents)?;
    }
    Ok(())
}

fn copy_tree(source: &Path, target: &Path) -> io::Result<()> {
    for entry in WalkDir::new(source).follow_links(false) {
        let entry = entry.map_err(io::Error::from)?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|err| io::Error::new(io::ErrorKind::Other, err))?;
        let destination = target.join(relative);
        let file_type = entry.file_type();
        if file_type.is_dir() {
            std::fs::create_dir_all(&destination)?;
        } else if file_type.is_file() {
            std::fs::copy(entry.path(), &destination)?;
        } else {
            tracing::debug!(path = %entry.path().display(), "Skipping non-regular file while staging");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_files_and_directories_by_basename() {
        let source = tempfile::tempdir().unwrap();
        let file = source.path().join("answer.txt");
        std::fs::write(&file, "42").unwrap();
        let package = source.path().join("pkg");
        std::fs::create_dir_all(package.join("sub")).unwrap();
        std::fs::write(package.join("sub").join("mod.py"), "X = 1").unwrap();

        let dest = tempfile::tempdir().unwrap();
        stage_paths(dest.path(), &[file, package]).unwrap();

        assert_eq!(std::fs::read_to_string(dest.path().join("answer.txt")).unwrap(), "42");
        assert_eq!(
            std::fs::read_to_string(dest.path().join("pkg/sub/mod.py")).unwrap(),
            "X = 1"
        );
    }

    #[test]
    fn test_write_inline_files() {
        let dest = tempfile::tempdir().unwrap();
        write_inline_files(dest.path(), &[InlineFile::new("data.txt", b"hello".to_vec())]).unwrap();
        assert_eq!(std::fs::read(dest.path().join("data.txt")).unwrap(), b"hello");
    }

    #[test]
    fn test_missing_source_is_an_error() {
        let dest = tempfile::tempdir().unwrap();
        let missing = dest.path().join("nope.txt");
        assert!(stage_paths(dest.path(), &[missing]).is_err());
    }
}
