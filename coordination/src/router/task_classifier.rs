//! Task classification
//!
//! Maps an objective string onto a [`TaskCategory`] with a keyword rule
//! table. Rules are data: the first rule with a matching keyword wins, so
//! table order is the precedence order.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Category of work an objective asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskCategory {
    /// Write new code from a description.
    Generate,
    /// Repair existing code.
    Fix,
    /// Produce tests or test-oriented code.
    Test,
    /// Nothing in the rule table matched.
    Other,
}

impl TaskCategory {
    /// All categories.
    pub fn all() -> &'static [TaskCategory] {
        &[Self::Generate, Self::Fix, Self::Test, Self::Other]
    }

    /// Whether static-analysis gates run for this category.
    ///
    /// Test-writing and unclassified objectives skip them; lint findings on
    /// test scaffolding are noise rather than defects.
    pub fn runs_analysis_gates(&self) -> bool {
        matches!(self, Self::Generate | Self::Fix)
    }
}

impl std::fmt::Display for TaskCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Generate => write!(f, "generate"),
            Self::Fix => write!(f, "fix"),
            Self::Test => write!(f, "test"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// One row of the classification table.
#[derive(Debug, Clone, Copy)]
pub struct ClassificationRule {
    pub category: TaskCategory,
    pub keywords: &'static [&'static str],
}

/// Rule table in precedence order.
///
/// "fix the failing test" is a repair, so `Fix` precedes `Test`; "write tests
/// for the parser" is test work, so `Test` precedes `Generate`.
pub const CLASSIFICATION_RULES: &[ClassificationRule] = &[
    ClassificationRule {
        category: TaskCategory::Fix,
        keywords: &[
            "fix", "fixes", "repair", "debug", "bug", "broken", "crash", "crashes", "error",
            "errors", "exception", "traceback", "failing", "patch",
        ],
    },
    ClassificationRule {
        category: TaskCategory::Test,
        keywords: &[
            "test", "tests", "testing", "unittest", "pytest", "coverage", "assert", "verify",
        ],
    },
    ClassificationRule {
        category: TaskCategory::Generate,
        keywords: &[
            "generate", "create", "write", "implement", "build", "add", "make", "compute",
            "calculate", "convert", "parse", "sort", "function", "class", "script",
        ],
    },
];

static WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[a-z][a-z0-9_]*").expect("WORD_RE regex should compile"));

/// Lowercased word tokens of `text`.
fn words(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    WORD_RE
        .find_iter(&lower)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Result of classifying an objective.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub category: TaskCategory,
    /// Keyword that selected the rule, if any.
    pub matched_keyword: Option<String>,
}

/// Classify an objective against [`CLASSIFICATION_RULES`].
pub fn classify(objective: &str) -> TaskCategory {
    classify_detailed(objective).category
}

/// Classify an objective and report which keyword decided it.
pub fn classify_detailed(objective: &str) -> Classification {
    classify_with_rules(objective, CLASSIFICATION_RULES)
}

/// Classify against a caller-supplied rule table.
pub fn classify_with_rules(objective: &str, rules: &[ClassificationRule]) -> Classification {
    let tokens = words(objective);
    for rule in rules {
        if let Some(hit) = rule
            .keywords
            .iter()
            .find(|k| tokens.iter().any(|t| t == *k))
        {
            return Classification {
                category: rule.category,
                matched_keyword: Some(hit.to_string()),
            };
        }
    }
    Classification {
        category: TaskCategory::Other,
        matched_keyword: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_objective() {
        assert_eq!(classify("add two integers"), TaskCategory::Generate);
        assert_eq!(
            classify("Write a function that reverses a string"),
            TaskCategory::Generate
        );
    }

    #[test]
    fn test_fix_objective() {
        assert_eq!(
            classify("fix the ZeroDivisionError in average()"),
            TaskCategory::Fix
        );
    }

    #[test]
    fn test_fix_beats_test() {
        let c = classify_detailed("fix the failing test");
        assert_eq!(c.category, TaskCategory::Fix);
        assert_eq!(c.matched_keyword.as_deref(), Some("fix"));
    }

    #[test]
    fn test_test_beats_generate() {
        assert_eq!(
            classify("write tests for the csv parser"),
            TaskCategory::Test
        );
    }

    #[test]
    fn test_whole_word_matching() {
        // "prefix" contains "fix" but is not the word "fix"
        assert_eq!(classify("prefix tree lookup"), TaskCategory::Other);
        assert_eq!(classify("contest results"), TaskCategory::Other);
    }

    #[test]
    fn test_other_fallback() {
        let c = classify_detailed("hello there");
        assert_eq!(c.category, TaskCategory::Other);
        assert!(c.matched_keyword.is_none());
        assert_eq!(classify(""), TaskCategory::Other);
    }

    #[test]
    fn test_deterministic() {
        let objective = "Implement a LRU cache";
        assert_eq!(classify(objective), classify(objective));
    }

    #[test]
    fn test_custom_rules() {
        const RULES: &[ClassificationRule] = &[ClassificationRule {
            category: TaskCategory::Test,
            keywords: &["hello"],
        }];
        assert_eq!(
            classify_with_rules("hello world", RULES).category,
            TaskCategory::Test
        );
    }

    #[test]
    fn test_analysis_gate_policy() {
        assert!(TaskCategory::Generate.runs_analysis_gates());
        assert!(TaskCategory::Fix.runs_analysis_gates());
        assert!(!TaskCategory::Test.runs_analysis_gates());
        assert!(!TaskCategory::Other.runs_analysis_gates());
    }
}
