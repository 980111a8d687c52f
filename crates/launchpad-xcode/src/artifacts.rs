//! Result artifacts: stable output locations, copying and bundle merging

use std::path::{Path, PathBuf};

use launchpad_core::{CommandSpec, ProcessRunner};
use tracing::debug;
use walkdir::WalkDir;

use crate::error::{Result, XcodeError};

/// Result bundle extension
pub const XCRESULT_EXTENSION: &str = "xcresult";

/// Stable output file names
pub const REPORT_XCRESULT: &str = "report.xcresult";
pub const REPORT_JUNIT: &str = "report.junit";
pub const SYSTEM_LOGS_DIR: &str = "system_logs";

/// Stable artifact paths under an output directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    pub root: PathBuf,
}

impl OutputPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn xcresult(&self) -> PathBuf {
        self.root.join(REPORT_XCRESULT)
    }

    pub fn junit(&self) -> PathBuf {
        self.root.join(REPORT_JUNIT)
    }

    /// Where the system log of simulator `name` is copied to
    pub fn system_log(&self, name: &str) -> PathBuf {
        self.root.join(SYSTEM_LOGS_DIR).join(format!("{}.log", name))
    }

    /// Scratch directory for one simulator's run
    pub fn run_dir(&self, udid: &str) -> PathBuf {
        self.root.join("runs").join(udid)
    }

    /// Remove the reports an earlier run left at the stable paths
    pub fn clear_reports(&self) -> Result<()> {
        remove_path(&self.xcresult())?;
        remove_path(&self.junit())
    }
}

/// First entry directly inside `dir` with extension `ext`, by name
pub fn first_with_extension(dir: &Path, ext: &str) -> Option<PathBuf> {
    let mut found: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .map(|e| e.into_path())
        .filter(|p| p.extension().is_some_and(|e| e == ext))
        .collect();
    found.sort();
    found.into_iter().next()
}

/// Copy a file or directory tree to `dest`, replacing whatever is there
pub fn copy_artifact(src: &Path, dest: &Path) -> Result<()> {
    remove_path(dest)?;
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if src.is_file() {
        std::fs::copy(src, dest)?;
        return Ok(());
    }

    for entry in WalkDir::new(src) {
        let entry = entry.map_err(|e| XcodeError::Io(std::io::Error::other(e.to_string())))?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| XcodeError::Io(std::io::Error::other(e.to_string())))?;
        let target = dest.join(relative);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    debug!(from = %src.display(), to = %dest.display(), "copied artifact");
    Ok(())
}

/// Remove a file, symlink or directory if it exists
pub fn remove_path(path: &Path) -> Result<()> {
    match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => std::fs::remove_dir_all(path)?,
        Ok(_) => std::fs::remove_file(path)?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

/// Merge result bundles into `dest` with `xcresulttool`.
///
/// A single bundle is copied instead, since the tool needs at least two.
pub async fn merge_result_bundles(
    runner: &dyn ProcessRunner,
    bundles: &[PathBuf],
    dest: &Path,
) -> Result<()> {
    match bundles {
        [] => Ok(()),
        [only] => copy_artifact(only, dest),
        many => {
            remove_path(dest)?;
            let mut spec = CommandSpec::xcrun(["xcresulttool", "merge"]);
            for bundle in many {
                spec = spec.arg("--path").arg(bundle.to_string_lossy());
            }
            spec = spec.arg("--output-path").arg(dest.to_string_lossy());
            runner
                .run_checked(&spec)
                .await
                .map_err(|e| XcodeError::tool("xcresulttool merge", e))?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use launchpad_core::fake::ScriptedRunner;

    #[test]
    fn test_first_with_extension_is_sorted() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("b.xcresult")).unwrap();
        std::fs::create_dir_all(tmp.path().join("a.xcresult")).unwrap();
        std::fs::write(tmp.path().join("log.txt"), "").unwrap();

        assert_eq!(
            first_with_extension(tmp.path(), XCRESULT_EXTENSION),
            Some(tmp.path().join("a.xcresult"))
        );
        assert_eq!(first_with_extension(tmp.path(), "xctestrun"), None);
    }

    #[test]
    fn test_copy_directory_replaces_destination() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("run.xcresult");
        std::fs::create_dir_all(src.join("Data")).unwrap();
        std::fs::write(src.join("Info.plist"), "info").unwrap();
        std::fs::write(src.join("Data/blob"), "blob").unwrap();

        let dest = tmp.path().join("out/report.xcresult");
        std::fs::create_dir_all(&dest).unwrap();
        std::fs::write(dest.join("stale"), "old").unwrap();

        copy_artifact(&src, &dest).unwrap();
        assert_eq!(std::fs::read_to_string(dest.join("Data/blob")).unwrap(), "blob");
        assert!(!dest.join("stale").exists());
    }

    #[tokio::test]
    async fn test_merge_command() {
        let tmp = tempfile::tempdir().unwrap();
        let runner = ScriptedRunner::new();
        let bundles = vec![tmp.path().join("0.xcresult"), tmp.path().join("1.xcresult")];
        let dest = tmp.path().join("report.xcresult");

        merge_result_bundles(&runner, &bundles, &dest).await.unwrap();

        assert_eq!(
            runner.calls()[0],
            format!(
                "xcrun xcresulttool merge --path {} --path {} --output-path {}",
                bundles[0].display(),
                bundles[1].display(),
                dest.display()
            )
        );
    }

    #[test]
    fn test_output_paths() {
        let out = OutputPaths::new("/ci/out");
        assert_eq!(out.junit(), PathBuf::from("/ci/out/report.junit"));
        assert_eq!(
            out.system_log("iPhone 15"),
            PathBuf::from("/ci/out/system_logs/iPhone 15.log")
        );
    }
}
