//! Prompt templates for each pipeline stage.
//!
//! Prompt versioning: bump `PROMPT_VERSION` whenever preamble or template
//! content changes, so a logged run can be traced to the prompts that
//! produced it.

use coordination::escalation::ContextSnapshot;
use coordination::router::TaskCategory;

/// Prompt version. Bump on any preamble content change.
pub const PROMPT_VERSION: &str = "1.3.0";

/// Planning tier preamble.
pub const PLANNER_PREAMBLE: &str = "\
You are a software planner. Given an objective, describe in a few short \
sentences how to implement it: the function or functions to write, their \
signatures, the edge cases to handle, and how the result can be checked. \
Do not write the code itself.";

/// Generation tier preamble, shared by candidate and test generation.
pub const CODER_PREAMBLE: &str = "\
You are a code generator. You reply with source code only.

## Output rules
- Do NOT wrap the code in markdown fences or any other markers.
- The first line MUST be an executable statement, import, or definition.
- No explanations before or after the code.
- Use only the standard library unless the capabilities list says otherwise.";

/// Escalation tier preamble.
pub const ESCALATION_PREAMBLE: &str = "\
You are a senior engineer repairing code that failed its tests. You are \
given the objective, the plan, the failing code, the latest error, and the \
errors from every earlier attempt. Do not repeat a fix that already failed. \
Reply with the complete corrected source code only, with no fences and no \
commentary. The first line must be an executable statement.";

const OUTPUT_CONSTRAINTS: &str = "\
Reply with raw source code only. No markdown fences, no wrapping markers, \
no prose. Start with an executable statement.";

/// Planning prompt for `objective`.
pub fn planning_prompt(objective: &str) -> String {
    format!("## Objective\n{objective}\n\nDescribe the implementation strategy.")
}

/// Generation prompt. The task category picks the framing.
pub fn generation_prompt(category: TaskCategory, objective: &str, strategy: &str) -> String {
    let task = match category {
        TaskCategory::Generate => "Write new code that accomplishes the objective.",
        TaskCategory::Fix => {
            "Repair the code described in the objective. Produce the complete corrected code, \
             not a patch."
        }
        TaskCategory::Test => {
            "Write the code under test described in the objective, so that a test suite can \
             exercise it."
        }
        TaskCategory::Other => "Write code that accomplishes the objective.",
    };
    format!(
        "{task}\n\n## Objective\n{objective}\n\n## Strategy\n{strategy}\n\n{OUTPUT_CONSTRAINTS}"
    )
}

/// Test-suite prompt. Embeds the candidate so tests match its interface, and
/// names the file the validator writes it to.
pub fn test_prompt(candidate: &str, strategy: &str, candidate_file: &str) -> String {
    let path = std::path::Path::new(candidate_file);
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(candidate_file);
    let load = match path.extension().and_then(|e| e.to_str()) {
        Some("py") => format!("import from it with `from {stem} import *`"),
        _ => "load it from that file".to_string(),
    };
    format!(
        "Write a test suite for the code below. The code is saved as `{candidate_file}` in the \
         working directory; {load}. Test the observable behavior described by the strategy. \
         Each failing check must raise with a message that names the input and the wrong \
         output.\n\n\
         ## Strategy\n{strategy}\n\n\
         ## Code\n{candidate}\n\n\
         {OUTPUT_CONSTRAINTS}"
    )
}

/// Escalation prompt carrying the cumulative failure context.
pub fn escalation_prompt(ctx: &ContextSnapshot) -> String {
    let mut prompt = format!(
        "## Objective\n{}\n\n## Strategy\n{}\n\n## Current code\n{}\n\n## Latest error\n{}\n",
        ctx.objective, ctx.strategy, ctx.prior_candidate, ctx.prior_error
    );

    if ctx.failure_history.len() > 1 {
        prompt.push_str("\n## Earlier failures (oldest first)\n");
        let earlier = &ctx.failure_history[..ctx.failure_history.len() - 1];
        for (i, error) in earlier.iter().enumerate() {
            prompt.push_str(&format!("{}. {}\n", i + 1, error));
        }
    }

    if !ctx.capabilities.is_empty() {
        prompt.push_str(&format!(
            "\n## Available capabilities\n{}\n",
            ctx.capabilities.join(", ")
        ));
    }

    prompt.push('\n');
    prompt.push_str(OUTPUT_CONSTRAINTS);
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(history: &[&str]) -> ContextSnapshot {
        ContextSnapshot {
            objective: "add two integers".into(),
            strategy: "def add(a, b)".into(),
            prior_candidate: "def add(a, b): return a / 0".into(),
            prior_error: history.last().copied().unwrap_or_default().into(),
            failure_history: history.iter().map(|s| s.to_string()).collect(),
            capabilities: vec!["python3".into(), "pytest".into()],
        }
    }

    #[test]
    fn test_generation_prompt_forbids_wrapping() {
        for &category in TaskCategory::all() {
            let p = generation_prompt(category, "add two integers", "use +");
            assert!(p.contains("No markdown fences"));
            assert!(p.contains("Start with an executable statement"));
            assert!(p.contains("add two integers"));
            assert!(p.contains("use +"));
        }
    }

    #[test]
    fn test_generation_prompt_framing_varies() {
        let fix = generation_prompt(TaskCategory::Fix, "o", "s");
        let gen = generation_prompt(TaskCategory::Generate, "o", "s");
        assert!(fix.starts_with("Repair"));
        assert!(gen.starts_with("Write new code"));
    }

    #[test]
    fn test_test_prompt_embeds_candidate() {
        let p = test_prompt("def add(a, b): return a + b", "plan", "candidate.py");
        assert!(p.contains("def add(a, b): return a + b"));
        assert!(p.contains("`candidate.py`"));
        assert!(p.contains("from candidate import *"));
    }

    #[test]
    fn test_test_prompt_follows_candidate_file() {
        let p = test_prompt("x = 1", "plan", "solution.py");
        assert!(p.contains("`solution.py`"));
        assert!(p.contains("from solution import *"));
        assert!(!p.contains("candidate"));

        let p = test_prompt("add() { :; }", "plan", "lib.sh");
        assert!(p.contains("`lib.sh`"));
        assert!(!p.contains("import *"));
    }

    #[test]
    fn test_escalation_prompt_lists_history_and_capabilities() {
        let p = escalation_prompt(&ctx(&["ZeroDivisionError", "AssertionError: 4 != 5"]));
        assert!(p.contains("## Latest error\nAssertionError: 4 != 5"));
        assert!(p.contains("1. ZeroDivisionError"));
        assert!(p.contains("python3, pytest"));
    }

    #[test]
    fn test_escalation_prompt_single_failure_has_no_history_section() {
        let p = escalation_prompt(&ctx(&["ZeroDivisionError"]));
        assert!(!p.contains("Earlier failures"));
    }
}
