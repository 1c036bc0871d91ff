//! Whitespace and case normalization of names

/// Title-case `text`: a letter that follows a non-letter (or starts the
/// string) is upper-cased, every other letter is lower-cased.
///
/// Lossy by nature: `"dnaJ"` becomes `"Dnaj"`, `"HIV"` becomes `"Hiv"`.
pub fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut prev_is_letter = false;

    for c in text.chars() {
        if c.is_alphabetic() {
            if prev_is_letter {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_is_letter = true;
        } else {
            out.push(c);
            prev_is_letter = false;
        }
    }
    out
}

/// Trim and title-case. `None` when nothing is left after trimming.
pub fn normalize_name(raw: Option<&str>) -> Option<String> {
    let trimmed = raw?.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(title_case(trimmed))
    }
}

/// Trim and title-case, absent becomes the empty string
pub fn normalize_scalar(raw: Option<&str>) -> String {
    normalize_name(raw).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("dnaJ"), "Dnaj");
        assert_eq!(title_case("alzheimer disease"), "Alzheimer Disease");
        assert_eq!(title_case("o'neil"), "O'Neil");
        assert_eq!(title_case("PHASE3"), "Phase3");
        assert_eq!(title_case("3rd line"), "3Rd Line");
        assert_eq!(title_case("type-2 DIABETES"), "Type-2 Diabetes");
        assert_eq!(title_case(""), "");
    }

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name(Some("  aspirin ")), Some("Aspirin".to_string()));
        assert_eq!(normalize_name(Some("   ")), None);
        assert_eq!(normalize_name(None), None);
    }

    #[test]
    fn test_normalize_scalar() {
        assert_eq!(normalize_scalar(Some(" COMPLETED ")), "Completed");
        assert_eq!(normalize_scalar(None), "");
    }
}
