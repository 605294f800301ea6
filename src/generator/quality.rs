//! Draft quality gate.
//!
//! Screens model output for the failure modes a human reviewer should never
//! see: empty or truncated drafts, and prompt scaffolding leaking into the
//! reply.

/// Lowercased substrings that mark prompt leakage or model boilerplate.
const BANNED_MARKERS: &[&str] = &[
    "[knowledge",
    "## knowledge",
    "## customer message",
    "## instructions",
    "system prompt",
    "as an ai language model",
    "as an ai assistant",
];

/// Check a draft. `Ok(())` when acceptable, `Err(reason)` otherwise.
pub fn check(draft: &str, min_len: usize) -> Result<(), String> {
    let trimmed = draft.trim();
    if trimmed.is_empty() {
        return Err("draft is empty".into());
    }
    if trimmed.len() < min_len {
        return Err(format!(
            "draft is {} chars, below the {min_len} minimum",
            trimmed.len()
        ));
    }

    let lowered = trimmed.to_lowercase();
    for marker in BANNED_MARKERS {
        if lowered.contains(marker) {
            return Err(format!("draft contains scaffolding marker '{marker}'"));
        }
    }

    Ok(())
}
