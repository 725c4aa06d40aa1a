//! Parser for the result-info contract file a build container writes.
//!
//! At `<scratch>/resInfo` the container leaves a UTF-8 text file: line 1 is
//! the package name, line 2 the version, lines 3+ the artifact filenames
//! relative to `<scratch>/pkgdest`.

use std::path::{Path, PathBuf};

use crate::{Error, Result};

/// Name of the result-info file inside the scratch directory.
pub const RES_INFO_FILE_NAME: &str = "resInfo";

/// Directory inside the scratch dir where the container places artifacts.
pub const PKG_DEST_DIR: &str = "pkgdest";

/// Information about the result of a built package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResInfo {
    pub name: String,
    pub version: String,
    /// Absolute paths of the produced artifacts.
    pub files: Vec<PathBuf>,
}

/// Path of the resInfo file for a scratch directory.
pub fn res_info_path(scratch_dir: &Path) -> PathBuf {
    scratch_dir.join(RES_INFO_FILE_NAME)
}

/// Parse the resInfo file of `scratch_dir`.
///
/// Trailing blank lines are ignored. Artifact paths are resolved under
/// `<scratch_dir>/pkgdest/`.
pub fn parse_res_info(scratch_dir: &Path) -> Result<ResInfo> {
    let path = res_info_path(scratch_dir);
    let meta = std::fs::metadata(&path)?;
    if meta.len() == 0 {
        return Err(Error::ResInfoFileEmpty);
    }

    let content = std::fs::read_to_string(&path)?;
    let mut lines: Vec<&str> = content.split('\n').collect();
    while lines.last().is_some_and(|l| l.trim().is_empty()) {
        lines.pop();
    }

    if lines.len() < 3 {
        return Err(Error::ResInfoInvalidFormat);
    }

    let name = lines[0].trim();
    let version = lines[1].trim();
    let files: Vec<&str> = lines[2..]
        .iter()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .collect();

    if name.is_empty() || version.is_empty() || files.is_empty() {
        return Err(Error::ResInfoInvalidFormat);
    }

    let pkgdest = scratch_dir.join(PKG_DEST_DIR);
    Ok(ResInfo {
        name: name.to_string(),
        version: version.to_string(),
        files: files.iter().map(|f| pkgdest.join(f)).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn scratch_with(content: &str) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(res_info_path(dir.path()), content).unwrap();
        dir
    }

    #[test]
    fn three_line_file_parses() {
        let dir = scratch_with("vim\n9.1\nvim-9.1.pkg.tar.xz");
        let info = parse_res_info(dir.path()).unwrap();
        assert_eq!(info.name, "vim");
        assert_eq!(info.version, "9.1");
        assert_eq!(
            info.files,
            vec![dir.path().join("pkgdest").join("vim-9.1.pkg.tar.xz")]
        );
    }

    #[test]
    fn trailing_blank_lines_are_ignored() {
        let dir = scratch_with("vim\n9.1\nvim-9.1.pkg.tar.xz\n\n\n");
        let info = parse_res_info(dir.path()).unwrap();
        assert_eq!(info.files.len(), 1);
    }

    #[test]
    fn multiple_artifacts() {
        let dir = scratch_with("vim\n9.1\nvim-9.1.pkg.tar.xz\nvim-debug-9.1.pkg.tar.xz\n");
        let info = parse_res_info(dir.path()).unwrap();
        assert_eq!(info.files.len(), 2);
    }

    #[test]
    fn two_lines_are_invalid() {
        let dir = scratch_with("vim\n9.1");
        assert!(matches!(
            parse_res_info(dir.path()),
            Err(Error::ResInfoInvalidFormat)
        ));
    }

    #[test]
    fn empty_file_is_rejected() {
        let dir = scratch_with("");
        assert!(matches!(
            parse_res_info(dir.path()),
            Err(Error::ResInfoFileEmpty)
        ));
    }

    #[test]
    fn empty_fields_are_invalid() {
        let dir = scratch_with("\n9.1\nvim-9.1.pkg.tar.xz");
        assert!(matches!(
            parse_res_info(dir.path()),
            Err(Error::ResInfoInvalidFormat)
        ));
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(parse_res_info(dir.path()), Err(Error::Io(_))));
    }
}
