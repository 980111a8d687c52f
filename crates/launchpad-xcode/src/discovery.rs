//! Test inventory from compiled test bundles
//!
//! After `build-for-testing`, xcodebuild leaves an `.xctestrun` file next to
//! the build products. It names every test bundle; the test methods
//! themselves are recovered from each bundle's exported symbols.

use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use launchpad_core::process::shell_quote;
use launchpad_core::{CommandSpec, ProcessRunner};
use regex::Regex;
use tracing::{debug, info, instrument, warn};

use crate::artifacts::first_with_extension;
use crate::error::{Result, XcodeError};

const TEST_ROOT: &str = "__TESTROOT__";
const TEST_HOST: &str = "__TESTHOST__";

/// `Module.Class.testName() -> ()` as printed by swift-demangle
static SWIFT_TEST_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b([A-Za-z_][\w.]*)\.(test\w*)\(\)(?:\s+async)?(?:\s+throws)?\s*->\s*\(\)")
        .expect("Invalid regex")
});

/// `-[Class testName]`
static OBJC_TEST_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-\[(\w+) (test\w*)\]").expect("Invalid regex"));

/// Source of the compiled test inventory
#[async_trait]
pub trait TestDiscovery: Send + Sync {
    /// Every test identifier (`Target/Class/testName`) built under
    /// `derived_data`, sorted and without duplicates
    async fn discover(&self, derived_data: &Path) -> Result<Vec<String>>;
}

/// One test target listed in an `.xctestrun` file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestTarget {
    pub name: String,
    pub bundle_path: PathBuf,
    /// `Class` or `Class/testName`, relative to the target
    pub skipped: Vec<String>,
}

impl TestTarget {
    /// Executable inside the `.xctest` bundle
    pub fn binary_path(&self) -> PathBuf {
        let stem = self
            .bundle_path
            .file_stem()
            .map(|s| s.to_os_string())
            .unwrap_or_default();
        self.bundle_path.join(stem)
    }

    fn is_skipped(&self, identifier: &str) -> bool {
        self.skipped.iter().any(|skip| {
            let skip = format!("{}/{}", self.name, skip);
            identifier == skip || identifier.starts_with(&format!("{}/", skip))
        })
    }
}

/// [`TestDiscovery`] reading `.xctestrun` files and bundle symbols
#[derive(Clone)]
pub struct XctestrunDiscovery {
    runner: Arc<dyn ProcessRunner>,
}

impl XctestrunDiscovery {
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl TestDiscovery for XctestrunDiscovery {
    #[instrument(skip(self), fields(derived_data = %derived_data.display()))]
    async fn discover(&self, derived_data: &Path) -> Result<Vec<String>> {
        let products = derived_data.join("Build").join("Products");
        let xctestrun = find_xctestrun(&products)?;
        let targets = parse_xctestrun(&xctestrun)?;
        debug!(path = %xctestrun.display(), targets = targets.len(), "parsed xctestrun");

        let handles: Vec<_> = targets
            .into_iter()
            .map(|target| {
                let runner = self.runner.clone();
                tokio::spawn(async move {
                    let tests = list_bundle_tests(runner.as_ref(), &target).await;
                    (target, tests)
                })
            })
            .collect();

        let mut identifiers = Vec::new();
        for handle in handles {
            let (target, tests) = handle
                .await
                .map_err(|e| XcodeError::Io(std::io::Error::other(e.to_string())))?;
            let tests = tests?;
            identifiers.extend(tests.into_iter().filter(|id| !target.is_skipped(id)));
        }

        identifiers.sort();
        identifiers.dedup();
        info!(count = identifiers.len(), "discovered tests");
        Ok(identifiers)
    }
}

/// First `.xctestrun` under `products`, by name
pub fn find_xctestrun(products: &Path) -> Result<PathBuf> {
    first_with_extension(products, "xctestrun").ok_or_else(|| XcodeError::XctestrunNotFound {
        dir: products.to_path_buf(),
    })
}

/// Read the test targets of an `.xctestrun` file (format 1 or 2)
pub fn parse_xctestrun(path: &Path) -> Result<Vec<TestTarget>> {
    let root = plist::Value::from_file(path)?;
    let test_root = path.parent().unwrap_or(Path::new("."));
    let invalid = |message: &str| XcodeError::InvalidXctestrun {
        path: path.to_path_buf(),
        message: message.to_string(),
    };

    let dict = root
        .as_dictionary()
        .ok_or_else(|| invalid("root is not a dictionary"))?;

    let mut targets = Vec::new();
    if let Some(configurations) = dict.get("TestConfigurations").and_then(|v| v.as_array()) {
        // Format 2: one entry per configuration; the first carries the full set
        let first = configurations
            .first()
            .and_then(|c| c.as_dictionary())
            .ok_or_else(|| invalid("empty TestConfigurations"))?;
        let entries = first
            .get("TestTargets")
            .and_then(|v| v.as_array())
            .ok_or_else(|| invalid("missing TestTargets"))?;
        for entry in entries.iter().filter_map(|e| e.as_dictionary()) {
            let name = entry
                .get("BlueprintName")
                .and_then(|v| v.as_string())
                .unwrap_or_default();
            if let Some(target) = read_target(name, entry, test_root) {
                targets.push(target);
            }
        }
    } else {
        for (name, entry) in dict.iter().filter(|(k, _)| !k.starts_with("__")) {
            if let Some(target) = entry.as_dictionary().and_then(|e| read_target(name, e, test_root)) {
                targets.push(target);
            }
        }
    }

    if targets.is_empty() {
        return Err(invalid("no test targets"));
    }
    Ok(targets)
}

fn read_target(name: &str, entry: &plist::Dictionary, test_root: &Path) -> Option<TestTarget> {
    let root = test_root.to_string_lossy();
    let host = entry
        .get("TestHostPath")
        .and_then(|v| v.as_string())
        .map(|h| h.replace(TEST_ROOT, &root))
        .unwrap_or_else(|| root.to_string());
    let bundle = entry
        .get("TestBundlePath")
        .and_then(|v| v.as_string())?
        .replace(TEST_HOST, &host)
        .replace(TEST_ROOT, &root);

    let skipped = entry
        .get("SkipTestIdentifiers")
        .and_then(|v| v.as_array())
        .map(|a| {
            a.iter()
                .filter_map(|s| s.as_string().map(String::from))
                .collect()
        })
        .unwrap_or_default();

    if name.is_empty() {
        return None;
    }
    Some(TestTarget {
        name: name.to_string(),
        bundle_path: PathBuf::from(bundle),
        skipped,
    })
}

async fn list_bundle_tests(runner: &dyn ProcessRunner, target: &TestTarget) -> Result<Vec<String>> {
    let binary = target.binary_path();
    let script = format!(
        "nm -gU {} | xcrun swift-demangle",
        shell_quote(&binary.to_string_lossy())
    );
    let output = runner
        .run_checked(&CommandSpec::shell(script))
        .await
        .map_err(|e| XcodeError::tool("list-tests", e))?;

    let tests = parse_test_symbols(&target.name, &output.stdout);
    if tests.is_empty() {
        warn!(target = %target.name, binary = %binary.display(), "no tests found in bundle");
    }
    Ok(tests)
}

/// Extract `Target/Class/testName` identifiers from demangled symbols
pub fn parse_test_symbols(target: &str, symbols: &str) -> Vec<String> {
    let mut tests: Vec<String> = symbols
        .lines()
        .filter_map(|line| {
            if let Some(c) = SWIFT_TEST_REGEX.captures(line) {
                let owner = c.get(1)?.as_str();
                let class = owner.rsplit('.').next()?;
                // Bare module-level functions have no class component
                if class == owner {
                    return None;
                }
                return Some(format!("{}/{}/{}", target, class, c.get(2)?.as_str()));
            }
            OBJC_TEST_REGEX
                .captures(line)
                .and_then(|c| Some(format!("{}/{}/{}", target, c.get(1)?.as_str(), c.get(2)?.as_str())))
        })
        .collect();
    tests.sort();
    tests.dedup();
    tests
}
