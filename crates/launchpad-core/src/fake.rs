//! Scripted [`ProcessRunner`] for tests
//!
//! Rules are matched against the rendered command line in registration order;
//! the first rule whose pattern is a substring of the command wins. Commands
//! that match no rule succeed with empty output.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::ProcessError;
use crate::process::{CommandSpec, ProcessOutput, ProcessRunner, Termination};

/// Canned response for a matching command
#[derive(Debug, Clone)]
pub struct ScriptedResponse {
    pub termination: Termination,
    pub stdout: String,
    pub stderr: String,
    /// Simulated run time
    pub delay: Duration,
    /// Fail to spawn instead of producing output
    pub spawn_error: bool,
}

impl ScriptedResponse {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            termination: Termination::Exited(0),
            stdout: stdout.into(),
            stderr: String::new(),
            delay: Duration::ZERO,
            spawn_error: false,
        }
    }

    pub fn fail(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            termination: Termination::Exited(code),
            stderr: stderr.into(),
            ..Self::ok("")
        }
    }

    pub fn terminated(termination: Termination) -> Self {
        Self {
            termination,
            ..Self::ok("")
        }
    }

    pub fn spawn_error() -> Self {
        Self {
            spawn_error: true,
            ..Self::ok("")
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

struct Rule {
    pattern: String,
    response: ScriptedResponse,
    remaining: Option<usize>,
}

/// Fake runner answering from a script and recording every command
#[derive(Clone, Default)]
pub struct ScriptedRunner {
    rules: Arc<Mutex<Vec<Rule>>>,
    calls: Arc<Mutex<Vec<CommandSpec>>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every command containing `pattern` with `response`
    pub fn on(self, pattern: impl Into<String>, response: ScriptedResponse) -> Self {
        self.push(pattern.into(), response, None);
        self
    }

    /// Answer only the next command containing `pattern`
    pub fn once(self, pattern: impl Into<String>, response: ScriptedResponse) -> Self {
        self.push(pattern.into(), response, Some(1));
        self
    }

    fn push(&self, pattern: String, response: ScriptedResponse, remaining: Option<usize>) {
        if let Ok(mut rules) = self.rules.lock() {
            rules.push(Rule {
                pattern,
                response,
                remaining,
            });
        }
    }

    /// Every command run so far, rendered for display
    pub fn calls(&self) -> Vec<String> {
        self.specs().iter().map(CommandSpec::display).collect()
    }

    /// Every command run so far
    pub fn specs(&self) -> Vec<CommandSpec> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Number of recorded commands containing `pattern`
    pub fn count(&self, pattern: &str) -> usize {
        self.calls().iter().filter(|c| c.contains(pattern)).count()
    }

    fn respond(&self, command: &str) -> ScriptedResponse {
        let Ok(mut rules) = self.rules.lock() else {
            return ScriptedResponse::ok("");
        };
        for rule in rules.iter_mut() {
            if !command.contains(&rule.pattern) {
                continue;
            }
            match rule.remaining.as_mut() {
                Some(0) => continue,
                Some(n) => *n -= 1,
                None => {}
            }
            return rule.response.clone();
        }
        ScriptedResponse::ok("")
    }
}

#[async_trait]
impl ProcessRunner for ScriptedRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<ProcessOutput, ProcessError> {
        let command = spec.display();
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(spec.clone());
        }
        let response = self.respond(&command);

        if response.spawn_error {
            return Err(ProcessError::Spawn {
                command,
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "scripted"),
            });
        }
        if !response.delay.is_zero() {
            tokio::time::sleep(response.delay).await;
        }

        Ok(ProcessOutput {
            termination: response.termination,
            stdout: response.stdout,
            stderr: response.stderr,
            duration: response.delay,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_first_matching_rule_wins() {
        let runner = ScriptedRunner::new()
            .on("simctl list", ScriptedResponse::ok("listed"))
            .on("simctl", ScriptedResponse::fail(1, "nope"));

        let out = runner
            .run(&CommandSpec::xcrun(["simctl", "list", "runtimes"]))
            .await
            .unwrap();
        assert_eq!(out.stdout, "listed");

        let out = runner
            .run(&CommandSpec::xcrun(["simctl", "boot", "X"]))
            .await
            .unwrap();
        assert_eq!(out.termination, Termination::Exited(1));
        assert_eq!(runner.count("simctl"), 2);
    }

    #[tokio::test]
    async fn test_once_rules_are_consumed() {
        let runner = ScriptedRunner::new()
            .once("clone", ScriptedResponse::ok("first"))
            .on("clone", ScriptedResponse::ok("second"));

        let spec = CommandSpec::xcrun(["simctl", "clone"]);
        assert_eq!(runner.run(&spec).await.unwrap().stdout, "first");
        assert_eq!(runner.run(&spec).await.unwrap().stdout, "second");
    }

    #[tokio::test]
    async fn test_unmatched_commands_succeed() {
        let runner = ScriptedRunner::new();
        let out = runner.run(&CommandSpec::new("true")).await.unwrap();
        assert!(out.success());
        assert_eq!(runner.calls(), vec!["true".to_string()]);
    }
}
