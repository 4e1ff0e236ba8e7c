use crate::error::{Error, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// A source file read into memory.
#[derive(Debug, Clone)]
pub struct SourceFile {
    /// Path the file was read from
    pub path: PathBuf,

    /// UTF-8 content
    pub content: String,
}

impl SourceFile {
    /// Reads a file as UTF-8 text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUtf8`] for non-UTF-8 content and [`Error::Io`]
    /// for any other read failure.
    pub fn read(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let content = fs::read_to_string(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::InvalidData {
                Error::invalid_utf8(&path)
            } else {
                Error::io(&path, e)
            }
        })?;

        Ok(Self { path, content })
    }

    /// Returns the number of lines.
    #[must_use]
    pub fn line_count(&self) -> usize {
        count_lines(&self.content)
    }

    /// Returns the file name, or an empty string for paths without one.
    #[must_use]
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Returns the extension with a leading dot (`.py`), or an empty string.
    #[must_use]
    pub fn extension(&self) -> String {
        dotted_extension(&self.path)
    }
}

/// Counts lines as `number of '\n' + 1`, so an empty string is one line.
#[must_use]
pub fn count_lines(text: &str) -> usize {
    memchr::memchr_iter(b'\n', text.as_bytes()).count() + 1
}

/// Returns the extension of `path` with a leading dot, or an empty string.
#[must_use]
pub(crate) fn dotted_extension(path: &Path) -> String {
    path.extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default()
}

/// Writes a file atomically.
///
/// # Process
///
/// 1. Writes content to a temporary sibling file
/// 2. Syncs the temporary file to disk
/// 3. Renames it over the target path, replacing any existing file
pub(crate) fn write_file_atomic(path: &Path, content: &str) -> Result<()> {
    let mut temp_name = path.file_name().unwrap_or_default().to_os_string();
    temp_name.push(".tmp");
    let temp_path = path.with_file_name(temp_name);

    let mut temp_file = fs::File::create(&temp_path).map_err(|e| Error::io(&temp_path, e))?;

    temp_file
        .write_all(content.as_bytes())
        .map_err(|e| Error::io(&temp_path, e))?;

    temp_file.sync_all().map_err(|e| Error::io(&temp_path, e))?;

    drop(temp_file);

    fs::rename(&temp_path, path).map_err(|e| Error::io(path, e))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;

    #[test]
    fn test_read_text_file() {
        let temp = assert_fs::TempDir::new().unwrap();
        let file = temp.child("a.py");
        file.write_str("x = 1\ny = 2\n").unwrap();

        let source = SourceFile::read(file.path()).unwrap();
        assert_eq!(source.content, "x = 1\ny = 2\n");
        assert_eq!(source.line_count(), 3);
        assert_eq!(source.file_name(), "a.py");
        assert_eq!(source.extension(), ".py");
    }

    #[test]
    fn test_read_invalid_utf8() {
        let temp = assert_fs::TempDir::new().unwrap();
        let file = temp.child("bin.py");
        file.write_binary(&[0xff, 0xfe, 0x00, 0x80]).unwrap();

        let err = SourceFile::read(file.path()).unwrap_err();
        assert!(matches!(err, Error::InvalidUtf8 { .. }));
    }

    #[test]
    fn test_read_missing_file() {
        let err = SourceFile::read("/nonexistent/a.py").unwrap_err();
        assert!(err.is_io());
    }

    #[test]
    fn test_count_lines() {
        assert_eq!(count_lines(""), 1);
        assert_eq!(count_lines("one"), 1);
        assert_eq!(count_lines("one\ntwo"), 2);
        assert_eq!(count_lines("one\ntwo\n"), 3);
    }

    #[test]
    fn test_dotted_extension() {
        assert_eq!(dotted_extension(Path::new("dir/Main.java")), ".java");
        assert_eq!(dotted_extension(Path::new("Makefile")), "");
    }

    #[test]
    fn test_write_file_atomic_overwrites() {
        let temp = assert_fs::TempDir::new().unwrap();
        let file = temp.child("out.py");
        file.write_str("old").unwrap();

        write_file_atomic(file.path(), "new").unwrap();

        file.assert("new");
        assert!(!temp.child("out.py.tmp").path().exists());
    }
}
