// ── Mentor Engine: Mode Detection ──────────────────────────────────────────
//
// Classify the *kind* of help being asked for and route to one of the five
// operating modes. Example:
//   "explain how recursion works"          → Tutor     (explanation, no code)
//   "explain this: def f(x): return f(x)"  → Explainer (explanation + code)
//   "I have a bug in my loop"              → Debugger
//   "I want to build a todo app"           → ProjectBuilder
//   "give me a roadmap to learn rust"      → LearningPlanner
//
// Keyword heuristics — no ML model, fast & deterministic, pure function of
// the message and recent history. Detection never fails: when nothing
// matches, the default is Tutor and `trigger_matches` is 0.

use crate::atoms::types::{Detection, HistoryMessage, Mode};
use regex::Regex;
use std::sync::LazyLock;

// ═══════════════════════════════════════════════════════════════════════════
// Trigger sets
// ═══════════════════════════════════════════════════════════════════════════

// The five sets are disjoint. Evaluation order is the tie-break rule:
// debugger outranks explainer/tutor, which outrank project-builder, which
// outranks learning-planner. A message matching several sets always routes
// to the highest-ranked one.

const DEBUG_TRIGGERS: &[&str] = &[
    "bug", "error", "fix", "broken", "crash", "exception", "traceback",
    "stack trace", "doesn't work", "does not work", "not working",
    "fails", "failing", "debug", "segfault", "panics", "panicked",
];

const EXPLAIN_TRIGGERS: &[&str] = &[
    "explain", "what is", "what's", "what does", "define", "definition of",
    "how does", "why does", "meaning of", "help me understand",
    "walk me through", "what do these",
];

const BUILD_TRIGGERS: &[&str] = &[
    "build a", "build an", "build my", "create a", "create an", "make a",
    "make an", "develop a", "develop an", "start a project", "new project",
    "app idea", "prototype",
];

const PLAN_TRIGGERS: &[&str] = &[
    "roadmap", "study plan", "learning path", "learning plan", "curriculum",
    "want to learn", "how to learn", "where do i start", "where should i start",
    "what should i learn", "study schedule", "course of study",
];

// ═══════════════════════════════════════════════════════════════════════════
// Code-presence detection
// ═══════════════════════════════════════════════════════════════════════════

/// Structural tokens that rarely appear in natural prose.
static CODE_TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[{}();\[\]]|=>|::|->|==|\breturn\b|\bdef\b|\bfn\b|\bclass\b|\bfunc\b")
        .expect("code token regex is valid")
});

/// A line qualifies as code if it opens a fenced block, is indented like a
/// block, or carries a high density of structural tokens.
fn is_code_line(line: &str) -> bool {
    if line.starts_with("    ") || line.starts_with('\t') {
        return true;
    }
    let matches = CODE_TOKEN_RE.find_iter(line).count();
    if matches == 0 {
        return false;
    }
    let words = line.split_whitespace().count().max(1);
    matches >= 2 || (matches as f64 / words as f64) > 0.5
}

/// Whether a message contains code: a fenced block, or any code-like line.
pub fn contains_code(text: &str) -> bool {
    if text.contains("```") {
        return true;
    }
    text.lines().any(is_code_line)
}

// ═══════════════════════════════════════════════════════════════════════════
// Detection
// ═══════════════════════════════════════════════════════════════════════════

/// Classify a message (plus recent history) into an operating mode.
///
/// Pure and deterministic: no side effects, no memory writes. History is
/// only consulted for code presence — a follow-up like "explain that" after
/// a pasted snippet still routes to Explainer.
pub fn detect(message: &str, recent_history: &[HistoryMessage]) -> Detection {
    let text = message.to_lowercase();

    let debug_matches = count_matches(&text, DEBUG_TRIGGERS);
    let explain_matches = count_matches(&text, EXPLAIN_TRIGGERS);
    let build_matches = count_matches(&text, BUILD_TRIGGERS);
    let plan_matches = count_matches(&text, PLAN_TRIGGERS);

    // Priority order: debugger wins every tie against explainer; builder
    // and planner only fire when nothing higher matched.
    if debug_matches > 0 {
        return Detection { mode: Mode::Debugger, trigger_matches: debug_matches };
    }
    if explain_matches > 0 {
        let code = contains_code(message)
            || recent_history.iter().rev().take(3).any(|m| contains_code(&m.content));
        let mode = if code { Mode::Explainer } else { Mode::Tutor };
        return Detection { mode, trigger_matches: explain_matches };
    }
    if build_matches > 0 {
        return Detection { mode: Mode::ProjectBuilder, trigger_matches: build_matches };
    }
    if plan_matches > 0 {
        return Detection { mode: Mode::LearningPlanner, trigger_matches: plan_matches };
    }

    Detection { mode: Mode::Tutor, trigger_matches: 0 }
}

fn count_matches(text: &str, triggers: &[&str]) -> usize {
    triggers.iter().filter(|t| trigger_fires(text, t)).count()
}

/// Phrase triggers match as substrings; single-word triggers must match a
/// whole word, so "fix" never fires inside "prefix".
fn trigger_fires(text: &str, trigger: &str) -> bool {
    if trigger.contains(' ') {
        return text.contains(trigger);
    }
    text.split(|c: char| !c.is_alphanumeric() && c != '\'')
        .any(|word| word == trigger)
}

// ═══════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::types::Role;

    fn detect_alone(message: &str) -> Mode {
        detect(message, &[]).mode
    }

    #[test]
    fn explanation_without_code_is_tutor() {
        assert_eq!(detect_alone("explain how recursion works"), Mode::Tutor);
    }

    #[test]
    fn explanation_with_code_is_explainer() {
        assert_eq!(detect_alone("explain this: def f(x): return f(x)"), Mode::Explainer);
    }

    #[test]
    fn explanation_with_fenced_block_is_explainer() {
        let msg = "what does this do\n```\nlet x = 1;\n```";
        assert_eq!(detect_alone(msg), Mode::Explainer);
    }

    #[test]
    fn bug_report_is_debugger() {
        assert_eq!(detect_alone("I have a bug in my loop"), Mode::Debugger);
    }

    #[test]
    fn debugger_beats_explainer_on_tie() {
        // Contains both "explain" and "error" — debugger must win.
        let d = detect("explain this error in my code", &[]);
        assert_eq!(d.mode, Mode::Debugger);
        assert!(d.confident());
    }

    #[test]
    fn build_request_is_project_builder() {
        assert_eq!(detect_alone("I want to build a todo app"), Mode::ProjectBuilder);
    }

    #[test]
    fn roadmap_request_is_learning_planner() {
        assert_eq!(detect_alone("give me a roadmap for learning rust"), Mode::LearningPlanner);
        assert_eq!(detect_alone("I want to learn web development"), Mode::LearningPlanner);
    }

    #[test]
    fn no_trigger_defaults_to_tutor_with_zero_confidence() {
        let d = detect("hello there", &[]);
        assert_eq!(d.mode, Mode::Tutor);
        assert!(!d.confident());
    }

    #[test]
    fn detection_is_deterministic() {
        let history = vec![HistoryMessage { role: Role::User, content: "hi".into() }];
        let a = detect("explain iterators", &history);
        let b = detect("explain iterators", &history);
        assert_eq!(a, b);
    }

    #[test]
    fn history_code_promotes_followup_to_explainer() {
        let history = vec![HistoryMessage {
            role: Role::User,
            content: "```\nfn main() { println!(\"hi\"); }\n```".into(),
        }];
        assert_eq!(detect("explain that", &history).mode, Mode::Explainer);
        assert_eq!(detect("explain that", &[]).mode, Mode::Tutor);
    }

    #[test]
    fn prose_is_not_mistaken_for_code() {
        assert!(!contains_code("how do closures capture their environment"));
        assert!(contains_code("for (i = 0; i < n; i++) { sum += a[i]; }"));
        assert!(contains_code("    indented block line"));
    }

    #[test]
    fn trigger_words_do_not_fire_inside_larger_words() {
        // "fix" must not match inside "prefix".
        assert_eq!(detect_alone("explain what a prefix sum is"), Mode::Tutor);
        // Whole-word occurrences still fire.
        assert_eq!(detect_alone("can you fix this for me"), Mode::Debugger);
        // Phrase triggers keep matching as substrings.
        assert_eq!(detect_alone("the program doesn't work anymore"), Mode::Debugger);
    }

    #[test]
    fn every_debug_trigger_routes_to_debugger() {
        for t in DEBUG_TRIGGERS {
            let msg = format!("explain the {} please", t);
            assert_eq!(detect_alone(&msg), Mode::Debugger, "trigger {:?}", t);
        }
    }
}
