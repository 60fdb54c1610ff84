use unicode_normalization::UnicodeNormalization;

/// Normalize `s` to NFC. Callers that construct a `RelativePath` or similar
/// identifier are expected to run it through this before comparing or
/// hashing it; the canonical encoder itself never normalizes text on its
/// own, since it must stay byte-exact over whatever it is handed.
pub fn normalize_nfc(s: &str) -> String {
    s.nfc().collect()
}

#[cfg(test)]
mod tests {
    use super::normalize_nfc;

    #[test]
    fn composes_combining_marks() {
        let decomposed = "e\u{0301}"; // e + combining acute accent
        assert_eq!(normalize_nfc(decomposed), "\u{00e9}");
    }

    #[test]
    fn leaves_already_normalized_text_unchanged() {
        assert_eq!(normalize_nfc("already/normal-path.txt"), "already/normal-path.txt");
    }
}
