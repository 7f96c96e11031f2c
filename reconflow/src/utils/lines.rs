//! Line-oriented artifact files.
//!
//! Every stage artifact is a plain text file with one entry per line.
//! Readers trim whitespace and drop blank lines; a missing file reads as
//! empty.

use std::io;
use std::path::Path;

/// Reads the non-blank, trimmed lines of a file.
///
/// A missing file yields an empty list.
pub fn read_lines(path: &Path) -> io::Result<Vec<String>> {
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e),
    }
}

/// Writes one entry per line, newline-terminated.
pub fn write_lines<S: AsRef<str>>(path: &Path, lines: &[S]) -> io::Result<()> {
    let mut text = String::new();
    for line in lines {
        text.push_str(line.as_ref());
        text.push('\n');
    }
    std::fs::write(path, text)
}

/// Counts the non-blank lines of a file; missing files count as zero.
pub fn count_lines(path: &Path) -> io::Result<usize> {
    read_lines(path).map(|lines| lines.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_lines_trims_and_skips_blanks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hosts.txt");
        std::fs::write(&path, "a.example.com\n\n  b.example.com  \n\t\n").unwrap();

        let lines = read_lines(&path).unwrap();
        assert_eq!(lines, vec!["a.example.com", "b.example.com"]);
        assert_eq!(count_lines(&path).unwrap(), 2);
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.txt");
        assert!(read_lines(&path).unwrap().is_empty());
        assert_eq!(count_lines(&path).unwrap(), 0);
    }

    #[test]
    fn test_write_lines_terminates_each_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        write_lines(&path, &["one", "two"]).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "one\ntwo\n");

        write_lines::<&str>(&path, &[]).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "");
    }
}
