/*!
 * Language utilities for ISO language code handling.
 *
 * Documents carry their language pair as free-form metadata tags, so codes
 * are normalized before they reach a prompt or a memory lookup.
 */

use anyhow::{Result, anyhow};
use isolang::Language;

/// ISO 639-2/B codes that differ from their 639-2/T counterpart
const BIBLIOGRAPHIC_CODES: &[(&str, &str)] = &[
    ("fre", "fra"),
    ("ger", "deu"),
    ("dut", "nld"),
    ("gre", "ell"),
    ("chi", "zho"),
    ("cze", "ces"),
    ("ice", "isl"),
    ("alb", "sqi"),
    ("arm", "hye"),
    ("baq", "eus"),
    ("bur", "mya"),
    ("per", "fas"),
    ("geo", "kat"),
    ("may", "msa"),
    ("mac", "mkd"),
    ("rum", "ron"),
    ("slo", "slk"),
    ("wel", "cym"),
];

/// Normalize a language code to ISO 639-2/T (3-letter) format
pub fn normalize_to_part2t(code: &str) -> Result<String> {
    let normalized_code = code.trim().to_lowercase();

    if normalized_code.len() == 2 {
        if let Some(lang) = Language::from_639_1(&normalized_code) {
            return Ok(lang.to_639_3().to_string());
        }
    } else if normalized_code.len() == 3 {
        if Language::from_639_3(&normalized_code).is_some() {
            return Ok(normalized_code);
        }

        if let Some((_, terminology)) = BIBLIOGRAPHIC_CODES
            .iter()
            .find(|(bibliographic, _)| *bibliographic == normalized_code)
        {
            return Ok(terminology.to_string());
        }
    }

    Err(anyhow!("Cannot normalize invalid language code: {}", code))
}

/// Get the language name from a code
pub fn get_language_name(code: &str) -> Result<String> {
    let normalized = normalize_to_part2t(code)?;
    let lang = Language::from_639_3(&normalized)
        .ok_or_else(|| anyhow!("Failed to get language from code: {}", normalized))?;

    Ok(lang.to_name().to_string())
}

/// Human readable name for prompts, falling back to the raw code
pub fn display_name(code: &str) -> String {
    get_language_name(code).unwrap_or_else(|_| code.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalizeToPart2t_withTwoLetterCode_shouldConvert() {
        assert_eq!(normalize_to_part2t("es").unwrap(), "spa");
        assert_eq!(normalize_to_part2t(" EN ").unwrap(), "eng");
    }

    #[test]
    fn test_normalizeToPart2t_withBibliographicCode_shouldMapToTerminology() {
        assert_eq!(normalize_to_part2t("fre").unwrap(), "fra");
        assert_eq!(normalize_to_part2t("ger").unwrap(), "deu");
    }

    #[test]
    fn test_normalizeToPart2t_withInvalidCode_shouldFail() {
        assert!(normalize_to_part2t("xx").is_err());
        assert!(normalize_to_part2t("").is_err());
    }

    #[test]
    fn test_displayName_withUnknownCode_shouldFallBackToCode() {
        assert_eq!(display_name("es"), "Spanish");
        assert_eq!(display_name("klingon"), "klingon");
    }
}
