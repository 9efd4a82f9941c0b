//! Plain-text matching and snippet extraction shared by store backends.
//!
//! Matching is case-insensitive per character, so byte offsets are never
//! reused across case folding.

/// Characters of context kept on each side of a match.
pub const SNIPPET_RADIUS: usize = 40;

fn fold(c: char) -> char { c.to_lowercase().next().unwrap_or(c) }

/// Position (in chars) of the first case-insensitive occurrence of `needle`.
pub fn find_match(haystack: &str, needle: &str) -> Option<usize> {
  let needle: Vec<char> = needle.chars().map(fold).collect();
  if needle.is_empty() {
    return Some(0);
  }
  let hay: Vec<char> = haystack.chars().map(fold).collect();
  hay.windows(needle.len()).position(|w| w == needle.as_slice())
}

pub fn matches(haystack: &str, needle: &str) -> bool {
  find_match(haystack, needle).is_some()
}

/// A single-line excerpt of `text` around the first match of `needle`, with
/// `…` marking truncation. Returns `None` when there is no match.
pub fn snippet(text: &str, needle: &str, radius: usize) -> Option<String> {
  let at = find_match(text, needle)?;
  let chars: Vec<char> = text.chars().collect();
  let len = needle.chars().count();

  let start = at.saturating_sub(radius);
  let end = (at + len + radius).min(chars.len());

  let mut out = String::new();
  if start > 0 {
    out.push('…');
  }
  out.extend(
    chars[start..end]
      .iter()
      .map(|&c| if c == '\n' { ' ' } else { c }),
  );
  if end < chars.len() {
    out.push('…');
  }
  Some(out)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn match_ignores_case() {
    assert_eq!(find_match("The Night Garden", "night"), Some(4));
    assert_eq!(find_match("ÄBC", "äb"), Some(0));
    assert!(!matches("daylight", "night"));
  }

  #[test]
  fn snippet_truncates_both_sides() {
    let text = "aaaaaaaaaa needle bbbbbbbbbb";
    assert_eq!(snippet(text, "needle", 3).unwrap(), "…aa needle bb…");
  }

  #[test]
  fn snippet_keeps_short_text_whole() {
    assert_eq!(snippet("one\ntwo", "two", 40).unwrap(), "one two");
    assert!(snippet("one", "zzz", 40).is_none());
  }
}
