//! Draft payload extraction from raw model output.
//!
//! Generation prompts ask models to wrap the deliverable in
//! `<draft>...</draft>` so reasoning and preamble can be discarded. A
//! missing tag is not an error: the whole output is taken as the draft.

use std::sync::OnceLock;

use regex::Regex;

const OPEN_TAG: &str = "<draft>";

fn draft_block() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<draft>(.*?)</draft>").expect("static draft pattern"))
}

/// Return the trimmed inner text of the first `<draft>` block, or the whole
/// trimmed input when no block is present.
///
/// An opening tag without a closing tag yields everything after the tag.
/// The block ends at the first `</draft>`, so a draft whose own text
/// contains that tag is cut short.
pub fn extract_draft(raw: &str) -> String {
    if let Some(caps) = draft_block().captures(raw) {
        if let Some(inner) = caps.get(1) {
            return inner.as_str().trim().to_string();
        }
    }

    let lower = raw.to_ascii_lowercase();
    if let Some(pos) = lower.find(OPEN_TAG) {
        return raw[pos + OPEN_TAG.len()..].trim().to_string();
    }

    raw.trim().to_string()
}

/// Like [`extract_draft`], but `None` when nothing usable remains.
pub fn extract_nonempty_draft(raw: &str) -> Option<String> {
    let draft = extract_draft(raw);
    if draft.is_empty() {
        None
    } else {
        Some(draft)
    }
}
