use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

// Parallel execution must not run babel commands that mutate state,
// burn LLM quota or wait for a human. The registry below is the single
// point of change for that policy.

/// Safety classification of a babel subcommand for parallel gathering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyCategory {
    /// Read-only, no LLM: may run in parallel
    Safe,
    /// Writes state: must stay sequential
    Mutation,
    /// Calls an LLM: rate limiting concerns
    LlmHeavy,
    /// Needs user input: would hang in parallel
    Interactive,
}

impl SafetyCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            SafetyCategory::Safe => "safe",
            SafetyCategory::Mutation => "mutation",
            SafetyCategory::LlmHeavy => "llm_heavy",
            SafetyCategory::Interactive => "interactive",
        }
    }
}

/// Safety classification for one babel subcommand.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandSafety {
    pub command: String,
    pub category: SafetyCategory,
    pub reason: String,
    #[serde(default)]
    pub suggestion: String,
}

impl CommandSafety {
    pub fn safe_for_parallel(&self) -> bool {
        self.category == SafetyCategory::Safe
    }

    /// Structured rejection message, written for a planner to read.
    pub fn rejection_message(&self) -> String {
        let mut lines = vec![
            format!(
                "REJECTED: 'babel {}' cannot run in parallel gather",
                self.command
            ),
            String::new(),
            format!("Category: {}", self.category.as_str()),
            format!("Reason: {}", self.reason),
        ];
        if !self.suggestion.is_empty() {
            lines.push(format!("Suggestion: {}", self.suggestion));
        }
        lines.join("\n")
    }
}

/// A bash source was rejected by the safety gate.
#[derive(Debug, Clone)]
pub struct SafetyViolation {
    pub command: String,
    pub category: SafetyCategory,
    pub message: String,
}

impl fmt::Display for SafetyViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for SafetyViolation {}

/// Registry classifying babel subcommands. Mutable and introspectable;
/// policy changes happen here and nowhere else.
#[derive(Debug, Clone)]
pub struct SafetyRegistry {
    entries: BTreeMap<String, CommandSafety>,
}

impl Default for SafetyRegistry {
    fn default() -> Self {
        let mut registry = Self {
            entries: BTreeMap::new(),
        };

        for (command, reason) in [
            ("list", "Read-only listing of artifacts"),
            ("status", "Read-only project summary"),
            ("why", "Read-only graph query"),
            ("show", "Read-only artifact display"),
            ("map", "Read-only symbol lookup"),
            ("refs", "Read-only topic index lookup"),
        ] {
            registry.set(CommandSafety {
                command: command.to_string(),
                category: SafetyCategory::Safe,
                reason: reason.to_string(),
                suggestion: String::new(),
            });
        }

        for (command, reason) in [
            ("init", "Creates the project event log"),
            ("capture", "Appends events to the log"),
            ("confirm", "Appends confirmation events"),
            ("link", "Appends link events"),
            ("share", "Moves events between scopes"),
            ("sync", "Replays the shared journal"),
            ("deprecate", "Appends status transition events"),
            ("resolve", "Appends resolution events"),
        ] {
            registry.set(CommandSafety {
                command: command.to_string(),
                category: SafetyCategory::Mutation,
                reason: reason.to_string(),
                suggestion: "Run sequentially after the gather completes".to_string(),
            });
        }

        for (command, reason) in [
            ("scan", "Drives LLM extraction over many inputs"),
            ("coherence", "LLM-evaluated consistency check"),
            ("gather", "Recursive gather would multiply load"),
            ("review", "LLM-assisted review"),
        ] {
            registry.set(CommandSafety {
                command: command.to_string(),
                category: SafetyCategory::LlmHeavy,
                reason: reason.to_string(),
                suggestion: "Invoke directly so the rate limiter applies".to_string(),
            });
        }

        for (command, reason) in [
            ("memo", "Prompts for user preference input"),
            ("prompt", "Interactive by design"),
        ] {
            registry.set(CommandSafety {
                command: command.to_string(),
                category: SafetyCategory::Interactive,
                reason: reason.to_string(),
                suggestion: "Run in a terminal session".to_string(),
            });
        }

        registry
    }
}

impl SafetyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a classification.
    pub fn set(&mut self, entry: CommandSafety) {
        self.entries.insert(entry.command.clone(), entry);
    }

    pub fn get(&self, command: &str) -> Option<&CommandSafety> {
        self.entries.get(command)
    }

    pub fn entries(&self) -> impl Iterator<Item = &CommandSafety> {
        self.entries.values()
    }

    /// Classify a full shell command line. Only `babel <sub>`
    /// invocations are classified; everything else is out of scope for
    /// this registry.
    pub fn classify(&self, command_line: &str) -> Option<&CommandSafety> {
        let mut parts = command_line.split_whitespace();
        if parts.next()? != "babel" {
            return None;
        }
        let subcommand = parts.find(|part| !part.starts_with('-'))?;
        self.entries.get(subcommand)
    }

    /// Gate a set of shell commands for parallel execution. Unknown
    /// babel subcommands are rejected conservatively.
    pub fn check_commands<'a>(
        &self,
        commands: impl IntoIterator<Item = &'a str>,
    ) -> Result<(), SafetyViolation> {
        for command_line in commands {
            let is_babel = command_line
                .split_whitespace()
                .next()
                .is_some_and(|first| first == "babel");
            if !is_babel {
                continue;
            }

            match self.classify(command_line) {
                Some(entry) if entry.safe_for_parallel() => {}
                Some(entry) => {
                    return Err(SafetyViolation {
                        command: command_line.to_string(),
                        category: entry.category,
                        message: entry.rejection_message(),
                    });
                }
                None => {
                    return Err(SafetyViolation {
                        command: command_line.to_string(),
                        category: SafetyCategory::Mutation,
                        message: format!(
                            "REJECTED: unclassified babel command in parallel gather: {}",
                            command_line
                        ),
                    });
                }
            }
        }
        Ok(())
    }
}
