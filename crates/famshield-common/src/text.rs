use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Fold text for accent- and case-insensitive comparison.
///
/// Applies canonical decomposition, drops combining marks and lowercases, so
/// "Sebevražda", "SEBEVRAZDA" and "sebevražda" all fold to "sebevrazda".
pub fn normalize(text: &str) -> String {
    text.nfd().filter(|c| !is_combining_mark(*c)).flat_map(char::to_lowercase).collect()
}

/// Iterator form of [`normalize`] for streaming consumers.
pub fn normalized_chars(text: &str) -> impl Iterator<Item = char> + '_ {
    text.nfd().filter(|c| !is_combining_mark(*c)).flat_map(char::to_lowercase)
}
