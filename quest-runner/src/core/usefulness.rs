//! Refusal detection for assembled answers.

/// Case-sensitive markers of refusal or uncertainty, in English and Indonesian.
///
/// Matching is plain substring containment, so an answer that merely quotes one
/// of these phrases is also classified as unhelpful.
pub const UNHELPFUL_MARKERS: &[&str] = &[
    "maaf",
    "Maaf",
    "sorry",
    "Sorry",
    "I do not know",
    "i do not know",
    "Saya tidak tahu",
    "saya tidak tahu",
    "i do not have",
    "saya tidak memiliki",
    "Saya tidak mengetahui",
    "I do not have",
    "Saya tidak memiliki",
    "saya tidak mempunyai",
    "saya tidak mengetahui",
    "Saya tidak mempunyai",
];

/// Returns true if the answer contains any unhelpful marker.
pub fn is_unhelpful(answer: &str) -> bool {
    UNHELPFUL_MARKERS
        .iter()
        .any(|marker| answer.contains(marker))
}

/// Returns true if the answer can be reported.
pub fn is_useful(answer: &str) -> bool {
    !is_unhelpful(answer)
}
