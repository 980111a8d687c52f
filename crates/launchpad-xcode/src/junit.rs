//! JUnit report model, reader, writer and merger
//!
//! Only the subset of JUnit that test formatters emit is understood:
//! `testsuites` > `testsuite` > `testcase`, with optional `failure` and
//! `skipped` children. Anything else is skipped over.

use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Result, XcodeError};

static TAG_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<(/?)(testsuites|testsuite|testcase|failure|error|skipped)\b((?:[^>"']|"[^"]*"|'[^']*')*?)(/?)>"#)
        .expect("Invalid regex")
});

static ATTR_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([\w:.-]+)\s*=\s*(?:"([^"]*)"|'([^']*)')"#).expect("Invalid regex")
});

/// A whole JUnit document
#[derive(Debug, Clone, PartialEq)]
pub struct JunitReport {
    pub name: String,
    pub tests: usize,
    pub failures: usize,
    pub suites: Vec<JunitSuite>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JunitSuite {
    pub name: String,
    pub tests: usize,
    pub failures: usize,
    pub time: Option<f64>,
    pub cases: Vec<JunitCase>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JunitCase {
    pub classname: String,
    pub name: String,
    pub time: Option<f64>,
    pub failure: Option<JunitFailure>,
    pub skipped: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JunitFailure {
    pub message: String,
    /// Source location, usually `path/File.swift:42`
    pub file: Option<String>,
}

impl JunitReport {
    /// Read and parse a report from disk
    pub fn read(path: &Path) -> Result<Self> {
        let xml = std::fs::read_to_string(path)?;
        Self::parse(&xml)
    }

    /// Parse a JUnit document
    pub fn parse(xml: &str) -> Result<Self> {
        let mut report: Option<JunitReport> = None;
        let mut suites: Vec<JunitSuite> = Vec::new();
        let mut suite: Option<JunitSuite> = None;
        let mut case: Option<JunitCase> = None;
        let mut failure_start: Option<(usize, String)> = None;

        for caps in TAG_REGEX.captures_iter(xml) {
            let whole = caps.get(0).map(|m| (m.start(), m.end())).unwrap_or_default();
            let closing = caps.get(1).is_some_and(|m| !m.as_str().is_empty());
            let self_closing = caps.get(4).is_some_and(|m| !m.as_str().is_empty());
            let tag = caps.get(2).map_or("", |m| m.as_str());
            let attrs = parse_attributes(caps.get(3).map_or("", |m| m.as_str()));

            match (tag, closing) {
                ("testsuites", false) => {
                    report = Some(JunitReport {
                        name: attrs.get("name").cloned().unwrap_or_default(),
                        tests: count_attr(&attrs, "tests")?.unwrap_or(0),
                        failures: count_attr(&attrs, "failures")?.unwrap_or(0),
                        suites: Vec::new(),
                    });
                }
                ("testsuite", false) => {
                    let opened = JunitSuite {
                        name: attrs.get("name").cloned().unwrap_or_default(),
                        tests: count_attr(&attrs, "tests")?.unwrap_or(0),
                        failures: count_attr(&attrs, "failures")?.unwrap_or(0),
                        time: time_attr(&attrs),
                        cases: Vec::new(),
                    };
                    if self_closing {
                        suites.push(opened);
                    } else {
                        suite = Some(opened);
                    }
                }
                ("testsuite", true) => {
                    let closed = suite
                        .take()
                        .ok_or_else(|| XcodeError::junit("unbalanced </testsuite>"))?;
                    suites.push(closed);
                }
                ("testcase", false) => {
                    let opened = JunitCase {
                        classname: attrs.get("classname").cloned().unwrap_or_default(),
                        name: attrs.get("name").cloned().unwrap_or_default(),
                        time: time_attr(&attrs),
                        failure: None,
                        skipped: false,
                    };
                    if self_closing {
                        push_case(&mut suite, opened)?;
                    } else {
                        case = Some(opened);
                    }
                }
                ("testcase", true) => {
                    let closed = case
                        .take()
                        .ok_or_else(|| XcodeError::junit("unbalanced </testcase>"))?;
                    push_case(&mut suite, closed)?;
                }
                ("failure" | "error", false) => {
                    let message = attrs.get("message").cloned().unwrap_or_default();
                    if self_closing {
                        set_failure(&mut case, message, None)?;
                    } else {
                        failure_start = Some((whole.1, message));
                    }
                }
                ("failure" | "error", true) => {
                    let (start, message) = failure_start
                        .take()
                        .ok_or_else(|| XcodeError::junit("unbalanced </failure>"))?;
                    let body = unescape(xml[start..whole.0].trim());
                    let file = (!body.is_empty()).then_some(body);
                    set_failure(&mut case, message, file)?;
                }
                ("skipped", false) => {
                    if let Some(c) = case.as_mut() {
                        c.skipped = true;
                    }
                }
                _ => {}
            }
        }

        if suite.is_some() || case.is_some() {
            return Err(XcodeError::junit("document ended inside an open element"));
        }

        match report {
            Some(mut report) => {
                report.suites = suites;
                Ok(report)
            }
            // Single-suite documents have no aggregate root
            None if !suites.is_empty() => {
                let tests = suites.iter().map(|s| s.tests).sum();
                let failures = suites.iter().map(|s| s.failures).sum();
                Ok(JunitReport {
                    name: String::new(),
                    tests,
                    failures,
                    suites,
                })
            }
            None => Err(XcodeError::junit("no <testsuites> or <testsuite> element")),
        }
    }

    /// Every test case, suite by suite
    pub fn test_cases(&self) -> impl Iterator<Item = &JunitCase> {
        self.suites.iter().flat_map(|s| s.cases.iter())
    }

    /// Combine reports in input order.
    ///
    /// Counts are summed and suites concatenated; duplicate cases from
    /// different reports are kept because they ran on different simulators.
    pub fn merge(reports: &[JunitReport]) -> JunitReport {
        JunitReport {
            name: reports
                .iter()
                .map(|r| r.name.as_str())
                .find(|n| !n.is_empty())
                .unwrap_or("All tests")
                .to_string(),
            tests: reports.iter().map(|r| r.tests).sum(),
            failures: reports.iter().map(|r| r.failures).sum(),
            suites: reports.iter().flat_map(|r| r.suites.iter().cloned()).collect(),
        }
    }

    /// Serialize as JUnit XML
    pub fn to_xml(&self) -> String {
        let mut xml = String::new();

        xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        xml.push_str(&format!(
            "<testsuites name=\"{}\" tests=\"{}\" failures=\"{}\">\n",
            escape_xml(&self.name),
            self.tests,
            self.failures
        ));

        for suite in &self.suites {
            xml.push_str(&format!(
                "  <testsuite name=\"{}\" tests=\"{}\" failures=\"{}\"{}>\n",
                escape_xml(&suite.name),
                suite.tests,
                suite.failures,
                time_suffix(suite.time)
            ));

            for case in &suite.cases {
                let open = format!(
                    "    <testcase classname=\"{}\" name=\"{}\"{}",
                    escape_xml(&case.classname),
                    escape_xml(&case.name),
                    time_suffix(case.time)
                );
                if let Some(ref failure) = case.failure {
                    xml.push_str(&open);
                    xml.push_str(">\n");
                    xml.push_str(&format!(
                        "      <failure message=\"{}\">{}</failure>\n",
                        escape_xml(&failure.message),
                        escape_xml(failure.file.as_deref().unwrap_or_default())
                    ));
                    xml.push_str("    </testcase>\n");
                } else if case.skipped {
                    xml.push_str(&open);
                    xml.push_str(">\n      <skipped/>\n    </testcase>\n");
                } else {
                    xml.push_str(&open);
                    xml.push_str("/>\n");
                }
            }

            xml.push_str("  </testsuite>\n");
        }

        xml.push_str("</testsuites>\n");
        xml
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_xml())?;
        Ok(())
    }
}

fn push_case(suite: &mut Option<JunitSuite>, case: JunitCase) -> Result<()> {
    suite
        .as_mut()
        .ok_or_else(|| XcodeError::junit("<testcase> outside of <testsuite>"))?
        .cases
        .push(case);
    Ok(())
}

fn set_failure(case: &mut Option<JunitCase>, message: String, file: Option<String>) -> Result<()> {
    let case = case
        .as_mut()
        .ok_or_else(|| XcodeError::junit("<failure> outside of <testcase>"))?;
    case.failure = Some(JunitFailure { message, file });
    Ok(())
}

fn parse_attributes(raw: &str) -> HashMap<String, String> {
    ATTR_REGEX
        .captures_iter(raw)
        .filter_map(|c| {
            let key = c.get(1)?.as_str().to_string();
            let value = c.get(2).or_else(|| c.get(3))?.as_str();
            Some((key, unescape(value)))
        })
        .collect()
}

fn count_attr(attrs: &HashMap<String, String>, key: &str) -> Result<Option<usize>> {
    attrs
        .get(key)
        .map(|v| {
            v.trim()
                .parse::<usize>()
                .map_err(|_| XcodeError::junit(format!("{}=\"{}\" is not a count", key, v)))
        })
        .transpose()
}

fn time_attr(attrs: &HashMap<String, String>) -> Option<f64> {
    attrs.get("time").and_then(|v| v.trim().parse().ok())
}

fn time_suffix(time: Option<f64>) -> String {
    time.map(|t| format!(" time=\"{:.3}\"", t)).unwrap_or_default()
}

/// Escape special XML characters
fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

fn unescape(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
