//! Cleanup of model output before it is handed to speech synthesis.
//!
//! Markdown markers and pictographs read badly when spoken, so they are
//! stripped; the unsanitized text is still what the browser displays.

/// Inclusive code-point ranges treated as emoji/pictographs.
const EMOJI_RANGES: &[(u32, u32)] = &[
    (0x1F600, 0x1F64F), // emoticons
    (0x1F300, 0x1F5FF), // symbols & pictographs
    (0x1F680, 0x1F6FF), // transport & map
    (0x1F1E0, 0x1F1FF), // flags
    (0x2702, 0x27B0),
    (0x24C2, 0x1F251),
    (0x1F900, 0x1F9FF), // supplemental symbols & pictographs
    (0x2600, 0x26FF),   // misc symbols
    (0x2700, 0x27BF),   // dingbats
];

pub fn is_emoji(c: char) -> bool {
    let cp = c as u32;
    EMOJI_RANGES.iter().any(|&(lo, hi)| (lo..=hi).contains(&cp))
}

/// Strip markdown emphasis/heading markers and emoji, then normalize whitespace.
pub fn sanitize(text: &str) -> String {
    // Drop `*` and emoji before looking at `#` runs: "#*#" must not survive
    // as a heading marker on a second pass.
    let stripped: String = text.chars().filter(|&c| c != '*' && !is_emoji(c)).collect();
    let stripped = strip_heading_markers(&stripped);

    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Remove every run of two or more `#`. A lone `#` ("C#", "#3") is kept.
fn strip_heading_markers(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '#' {
            out.push(c);
            continue;
        }
        let mut run = 1;
        while chars.next_if_eq(&'#').is_some() {
            run += 1;
        }
        if run == 1 {
            out.push('#');
        }
    }
    out
}
