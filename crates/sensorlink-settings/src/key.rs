//! Tolerant JSON key comparison.
//!
//! Keys are compared ignoring ASCII case and every non-alphanumeric character,
//! so `hardware_version`, `hardware-version` and `Hardware Version` all name the
//! same key. Neither function allocates.

/// Returns true if key `a` matches key `b`.
pub fn matches(a: &str, b: &str) -> bool {
    significant(a).eq(significant(b))
}

/// Returns true if `key` starts with `pattern`.
///
/// On success `key` is advanced past the match, to the first alphanumeric
/// character that follows it (or to the end of the string). On failure `key`
/// is left unchanged.
pub fn starts_with(key: &mut &str, pattern: &str) -> bool {
    let bytes = key.as_bytes();
    let mut index = 0;

    for expected in significant(pattern) {
        index = skip_non_alphanumeric(bytes, index);
        match bytes.get(index) {
            Some(byte) if byte.to_ascii_lowercase() == expected => index += 1,
            _ => return false,
        }
    }

    // Only ASCII bytes are ever stepped over individually, so `index` always
    // lands on a char boundary.
    *key = &key[skip_non_alphanumeric(bytes, index)..];
    true
}

/// The lower-cased alphanumeric bytes of a key.
fn significant(key: &str) -> impl Iterator<Item = u8> + '_ {
    key.bytes()
        .filter(u8::is_ascii_alphanumeric)
        .map(|byte| byte.to_ascii_lowercase())
}

fn skip_non_alphanumeric(bytes: &[u8], mut index: usize) -> usize {
    while index < bytes.len() && !bytes[index].is_ascii_alphanumeric() {
        index += 1;
    }
    index
}
