// ── Mentor Engine: Prompt Assembly ─────────────────────────────────────────
//
// Pure string assembly — five fixed templates keyed by Mode, enriched with
// retrieved context and the learner's profile. No I/O, no async, no state:
// the same inputs always render the same prompt.
//
// The {context} block keeps a stable shape: each item renders as a
// provenance-tagged snippet, and empty context renders an explicit marker so
// the model never sees a dangling header.

use crate::atoms::types::{ContextItem, Mode};
use chrono::{DateTime, Utc};

/// The user-authored inputs a template consumes. `error_text` is the
/// separate error/traceback field the debugger template renders verbatim.
#[derive(Debug, Clone, Default)]
pub struct ModeInput {
    pub message: String,
    pub error_text: Option<String>,
}

impl ModeInput {
    pub fn message(message: impl Into<String>) -> Self {
        Self { message: message.into(), error_text: None }
    }
}

/// Render the full prompt for one request.
pub fn build(
    mode: Mode,
    input: &ModeInput,
    context: &[ContextItem],
    learning_profile: Option<&str>,
) -> String {
    let context_block = render_context(context);
    let profile_block = learning_profile.unwrap_or("(no learner profile on record)");

    match mode {
        Mode::Tutor => tutor_prompt(input, &context_block, profile_block),
        Mode::Explainer => explainer_prompt(input, &context_block, profile_block),
        Mode::Debugger => debugger_prompt(input, &context_block, profile_block),
        Mode::ProjectBuilder => project_builder_prompt(input, &context_block, profile_block),
        Mode::LearningPlanner => learning_planner_prompt(input, &context_block, profile_block),
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Context rendering
// ═══════════════════════════════════════════════════════════════════════════

fn render_context(context: &[ContextItem]) -> String {
    if context.is_empty() {
        return "(no prior context for this learner)".to_string();
    }
    let now = Utc::now();
    context
        .iter()
        .map(|item| {
            format!(
                "- [{} · {}] {}",
                item.memory_type,
                humanize_age(&item.timestamp, now),
                item.content
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Coarse human-readable age ("3 days ago"). Unparseable timestamps render
/// as "some time ago" rather than failing prompt assembly.
fn humanize_age(timestamp: &str, now: DateTime<Utc>) -> String {
    let Ok(created) = DateTime::parse_from_rfc3339(timestamp) else {
        return "some time ago".to_string();
    };
    let secs = (now - created.with_timezone(&Utc)).num_seconds().max(0);
    match secs {
        0..=59 => "just now".to_string(),
        60..=3_599 => format!("{}m ago", secs / 60),
        3_600..=86_399 => format!("{}h ago", secs / 3_600),
        _ => format!("{}d ago", secs / 86_400),
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Code / prose separation (Explainer & Debugger)
// ═══════════════════════════════════════════════════════════════════════════

/// Split a message into prose and fenced code blocks. Unfenced messages come
/// back with an empty code part.
fn split_code(message: &str) -> (String, String) {
    if !message.contains("```") {
        return (message.trim().to_string(), String::new());
    }
    let mut prose = Vec::new();
    let mut code = Vec::new();
    let mut in_fence = false;
    for line in message.lines() {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            code.push(line);
        } else {
            prose.push(line);
        }
    }
    (prose.join("\n").trim().to_string(), code.join("\n").trim().to_string())
}

// ═══════════════════════════════════════════════════════════════════════════
// Templates
// ═══════════════════════════════════════════════════════════════════════════

fn tutor_prompt(input: &ModeInput, context: &str, profile: &str) -> String {
    format!(
        "You are a patient programming tutor. Teach by guiding, not by \
         dumping answers: ask one probing question before revealing a \
         solution, and calibrate depth to the learner's profile.\n\n\
         Learner profile:\n{profile}\n\n\
         Relevant history:\n{context}\n\n\
         Learner's question:\n{message}",
        profile = profile,
        context = context,
        message = input.message,
    )
}

fn explainer_prompt(input: &ModeInput, context: &str, profile: &str) -> String {
    let (prose, code) = split_code(&input.message);
    let code_block =
        if code.is_empty() { "(no code provided)".to_string() } else { format!("```\n{}\n```", code) };
    format!(
        "You are a code explainer. Walk through the code below step by step, \
         naming each construct and what it does at runtime. Keep explanations \
         concrete and tied to the code shown.\n\n\
         Learner profile:\n{profile}\n\n\
         Relevant history:\n{context}\n\n\
         Code:\n{code}\n\n\
         Learner's question:\n{prose}",
        profile = profile,
        context = context,
        code = code_block,
        prose = if prose.is_empty() { "Explain this code." } else { &prose },
    )
}

fn debugger_prompt(input: &ModeInput, context: &str, profile: &str) -> String {
    let (prose, code) = split_code(&input.message);
    let code_block =
        if code.is_empty() { "(no code provided)".to_string() } else { format!("```\n{}\n```", code) };
    let error_block = input.error_text.as_deref().unwrap_or("(no error text provided)");
    format!(
        "You are a debugging partner. Diagnose before prescribing: state the \
         most likely root cause, how the error message supports it, then the \
         minimal fix. Mention what to check if the first hypothesis is wrong.\n\n\
         Learner profile:\n{profile}\n\n\
         Relevant history:\n{context}\n\n\
         Code:\n{code}\n\n\
         Error output:\n{error}\n\n\
         Learner's description:\n{prose}",
        profile = profile,
        context = context,
        code = code_block,
        error = error_block,
        prose = if prose.is_empty() { "Something is broken." } else { &prose },
    )
}

fn project_builder_prompt(input: &ModeInput, context: &str, profile: &str) -> String {
    format!(
        "You are a project mentor. Help scope and plan the build: clarify the \
         goal, propose a minimal first milestone, and list concrete next \
         steps sized to the learner's level. Favor working software over \
         exhaustive design.\n\n\
         Learner profile:\n{profile}\n\n\
         Project history:\n{context}\n\n\
         Learner's request:\n{message}",
        profile = profile,
        context = context,
        message = input.message,
    )
}

fn learning_planner_prompt(input: &ModeInput, context: &str, profile: &str) -> String {
    format!(
        "You are a learning planner. Produce a sequenced study plan: ordered \
         topics with a rough time estimate each, building on what the learner \
         already knows and skipping what their history shows is mastered.\n\n\
         Learner profile:\n{profile}\n\n\
         Learning history:\n{context}\n\n\
         Learner's goal:\n{message}",
        profile = profile,
        context = context,
        message = input.message,
    )
}

// ═══════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════
