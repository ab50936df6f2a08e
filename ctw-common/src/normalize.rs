//! Text normalization for key matching
//!
//! Responsible names and city names come from people typing into a helpdesk,
//! so lookups must not care about accents, case or stray whitespace.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Normalize a string into a lookup key.
///
/// Trims, decomposes (NFKD), drops combining marks, collapses whitespace runs
/// to a single space and case-folds. Idempotent.
///
/// # Examples
///
/// ```
/// use ctw_common::normalize;
///
/// assert_eq!(normalize("  São   Paulo "), "sao paulo");
/// assert_eq!(normalize("Straße"), normalize("STRASSE"));
/// assert_eq!(normalize(""), "");
/// ```
pub fn normalize(input: &str) -> String {
    let stripped: String = input
        .trim()
        .nfkd()
        .filter(|ch| !is_combining_mark(*ch))
        .collect();

    let collapsed = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
    casefold(&collapsed)
}

/// Normalize an optional value; `None` yields an empty key.
pub fn normalize_opt(input: Option<&str>) -> String {
    input.map(normalize).unwrap_or_default()
}

/// Unicode lowercasing plus the full folds `to_lowercase` leaves alone.
///
/// NFKD has already folded the compatibility forms (long s, Greek symbol
/// variants, ligatures), so what remains is sharp s and final sigma. Folds
/// outside the Latin and Greek scripts (Cherokee, some Armenian ligatures)
/// are not covered.
fn casefold(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            // U+1E9E lowercases to U+00DF, both fold to "ss"
            'ß' | 'ẞ' => out.push_str("ss"),
            // final sigma folds to the medial form
            'ς' => out.push('σ'),
            _ => {
                for lower in ch.to_lowercase() {
                    out.push(if lower == 'ς' { 'σ' } else { lower });
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accents_case_and_spacing_collapse_to_same_key() {
        let expected = normalize("São Paulo");
        assert_eq!(expected, "sao paulo");
        assert_eq!(normalize("sao paulo"), expected);
        assert_eq!(normalize("  SAO   PAULO  "), expected);
    }

    #[test]
    fn test_empty_and_whitespace_only() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("   \t\n "), "");
        assert_eq!(normalize_opt(None), "");
    }

    #[test]
    fn test_sharp_s_folds() {
        assert_eq!(normalize("Bárbara Hülse"), "barbara hulse");
        assert_eq!(normalize("Straße"), "strasse");
        assert_eq!(normalize("STRAẞE"), "strasse");
    }

    #[test]
    fn test_final_sigma_folds_with_capital() {
        assert_eq!(normalize("ΟΔΟΣ"), normalize("οδος"));
        assert_eq!(normalize("Οδός"), "οδοσ");
    }

    #[test]
    fn test_idempotent() {
        for input in [
            "Thiago Valcácio de Assis",
            "  Apreensões - Pátio ",
            "Mottu México CDMX Iztapalapa",
            "ﬁnance", // compatibility ligature
            "Ⅻ",
            "ΟΔΟΣ οδος",
        ] {
            let once = normalize(input);
            assert_eq!(normalize(&once), once, "not idempotent for {input:?}");
        }
    }

    #[test]
    fn test_internal_tabs_and_newlines_become_single_space() {
        assert_eq!(normalize("Vila\t\tLeopoldina\n"), "vila leopoldina");
    }
}
