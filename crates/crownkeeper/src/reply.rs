//! Chat-facing text: message tags, denial phrases and small wording helpers.

pub const SUCCESS: &str = "✅ » ";
pub const INFO: &str = "🟦 » ";
pub const FAILURE: &str = "🟥 » ";

pub const DENIAL_PHRASES: [&str; 7] = [
    "You don't have permission to use this command!",
    "Uh, no.",
    "What are you trying to do?...",
    "Did you know that you don't have permission to use this command?",
    "Here's a tutorial on how to run that command: Step 1, you don't.",
    "You shall not pass!",
    "You don't look like an admin!",
];

/// One denial phrase, picked uniformly at random.
pub fn denial() -> String {
    let mut b = [0u8; 4];
    // A failed entropy read still yields a valid (first) phrase.
    getrandom::getrandom(&mut b).ok();
    let i = (u32::from_le_bytes(b) as usize) % DENIAL_PHRASES.len();
    format!("{FAILURE}{}", DENIAL_PHRASES[i])
}

pub fn possessive(s: &str) -> String {
    if s.ends_with('s') {
        format!("{s}'")
    } else {
        format!("{s}'s")
    }
}

/// Chat lines can't carry layout; newlines and tabs become spaces.
pub fn one_line(s: &str) -> String {
    s.replace(['\n', '\t', '\r'], " ")
}
