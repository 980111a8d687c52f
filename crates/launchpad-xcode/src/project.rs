//! Xcode project reference and shared xcodebuild arguments

use std::path::{Path, PathBuf};

use launchpad_core::process::shell_quote;
use launchpad_core::Config;

/// The container xcodebuild is pointed at
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XcodeProject {
    Workspace(PathBuf),
    Project(PathBuf),
}

impl XcodeProject {
    /// `-workspace <path>` or `-project <path>`
    pub fn args(&self) -> [String; 2] {
        match self {
            Self::Workspace(p) => ["-workspace".to_string(), p.to_string_lossy().into_owned()],
            Self::Project(p) => ["-project".to_string(), p.to_string_lossy().into_owned()],
        }
    }
}

/// Everything needed to address one scheme of one project
#[derive(Debug, Clone)]
pub struct XcodeTarget {
    pub project: XcodeProject,
    pub scheme: String,
    pub configuration: String,
    pub derived_data: PathBuf,
}

impl XcodeTarget {
    /// Derive the target from a validated configuration
    pub fn from_config(config: &Config) -> Self {
        let project = match (&config.workspace, &config.project) {
            (Some(ws), _) => XcodeProject::Workspace(ws.clone()),
            (None, Some(p)) => XcodeProject::Project(p.clone()),
            // Validation guarantees one of the two; fall back to xcodebuild's own lookup
            (None, None) => XcodeProject::Project(PathBuf::from(".")),
        };
        Self {
            project,
            scheme: config.scheme.clone(),
            configuration: config.configuration.clone(),
            derived_data: config.derived_data_path.clone(),
        }
    }

    /// Base arguments shared by every invocation, with `derived_data` overriding
    /// the shared directory
    pub fn base_args(&self, derived_data: &Path) -> Vec<String> {
        let mut args: Vec<String> = self.project.args().into();
        args.extend([
            "-scheme".to_string(),
            self.scheme.clone(),
            "-configuration".to_string(),
            self.configuration.clone(),
            "-derivedDataPath".to_string(),
            derived_data.to_string_lossy().into_owned(),
        ]);
        args
    }
}

/// Build `xcodebuild <args> | tee <log> [| formatter]` as a shell script
pub(crate) fn xcodebuild_pipeline(args: &[String], stdout_log: &Path, formatter: Option<&str>) -> String {
    let mut script = std::iter::once("xcodebuild")
        .chain(args.iter().map(String::as_str))
        .map(shell_quote)
        .collect::<Vec<_>>()
        .join(" ");

    script.push_str(" | tee ");
    script.push_str(&shell_quote(&stdout_log.to_string_lossy()));

    if let Some(formatter) = formatter {
        script.push_str(" | ");
        script.push_str(formatter);
    }
    script
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_prefers_workspace() {
        let config = Config {
            workspace: Some(PathBuf::from("App.xcworkspace")),
            scheme: "App".to_string(),
            ..Default::default()
        };
        let target = XcodeTarget::from_config(&config);
        assert_eq!(
            target.project,
            XcodeProject::Workspace(PathBuf::from("App.xcworkspace"))
        );
    }

    #[test]
    fn test_base_args() {
        let target = XcodeTarget {
            project: XcodeProject::Project(PathBuf::from("App.xcodeproj")),
            scheme: "App".to_string(),
            configuration: "Debug".to_string(),
            derived_data: PathBuf::from("dd"),
        };
        assert_eq!(
            target.base_args(Path::new("/tmp/dd-1")),
            [
                "-project",
                "App.xcodeproj",
                "-scheme",
                "App",
                "-configuration",
                "Debug",
                "-derivedDataPath",
                "/tmp/dd-1"
            ]
        );
    }

    #[test]
    fn test_pipeline_quotes_arguments() {
        let args = vec![
            "-destination".to_string(),
            "platform=iOS Simulator,id=X,OS=17.2".to_string(),
            "test".to_string(),
        ];
        let script = xcodebuild_pipeline(&args, Path::new("/tmp/logs/App.log"), Some("xcbeautify"));
        assert_eq!(
            script,
            "xcodebuild -destination 'platform=iOS Simulator,id=X,OS=17.2' test | tee /tmp/logs/App.log | xcbeautify"
        );
    }
}
