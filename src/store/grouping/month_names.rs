//! Locale resolution for month bucket titles.

use chrono::{Locale, TimeZone, Utc};

/// Locales offered for month names. The first entry for a language is the
/// one picked when a tag names only the language (`fr` → `fr_FR`).
const KNOWN_LOCALES: &[(&str, Locale)] = &[
    ("en_US", Locale::en_US),
    ("en_GB", Locale::en_GB),
    ("fr_FR", Locale::fr_FR),
    ("fr_CA", Locale::fr_CA),
    ("fr_BE", Locale::fr_BE),
    ("de_DE", Locale::de_DE),
    ("de_AT", Locale::de_AT),
    ("es_ES", Locale::es_ES),
    ("es_MX", Locale::es_MX),
    ("it_IT", Locale::it_IT),
    ("pt_BR", Locale::pt_BR),
    ("pt_PT", Locale::pt_PT),
    ("nl_NL", Locale::nl_NL),
    ("sv_SE", Locale::sv_SE),
    ("da_DK", Locale::da_DK),
    ("nb_NO", Locale::nb_NO),
    ("fi_FI", Locale::fi_FI),
    ("pl_PL", Locale::pl_PL),
    ("cs_CZ", Locale::cs_CZ),
    ("ru_RU", Locale::ru_RU),
    ("uk_UA", Locale::uk_UA),
    ("tr_TR", Locale::tr_TR),
    ("el_GR", Locale::el_GR),
    ("hu_HU", Locale::hu_HU),
    ("ro_RO", Locale::ro_RO),
    ("ja_JP", Locale::ja_JP),
    ("ko_KR", Locale::ko_KR),
    ("zh_CN", Locale::zh_CN),
    ("zh_TW", Locale::zh_TW),
    ("vi_VN", Locale::vi_VN),
    ("id_ID", Locale::id_ID),
    ("th_TH", Locale::th_TH),
    ("hi_IN", Locale::hi_IN),
];

/// Fallback for unknown tags and the `default` keyword.
pub const FALLBACK_LOCALE: Locale = Locale::en_US;

/// Resolve a BCP 47 or POSIX style tag (`fr-FR`, `pt_BR.UTF-8`, `de`).
#[must_use]
pub fn resolve_locale(tag: &str) -> Locale {
    let tag = tag.trim();
    // Drop POSIX codeset and modifier suffixes.
    let tag = tag.split(['.', '@']).next().unwrap_or_default();
    let normalized = tag.replace('-', "_");

    if normalized.is_empty() || normalized.eq_ignore_ascii_case("default") {
        return FALLBACK_LOCALE;
    }

    if let Some((_, locale)) = KNOWN_LOCALES
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(&normalized))
    {
        return *locale;
    }

    let language = normalized.split('_').next().unwrap_or_default();
    KNOWN_LOCALES
        .iter()
        .find(|(name, _)| {
            name.split('_')
                .next()
                .is_some_and(|lang| lang.eq_ignore_ascii_case(language))
        })
        .map_or(FALLBACK_LOCALE, |(_, locale)| *locale)
}

/// Full month name (1-based `month`) in the given locale.
#[must_use]
pub fn month_name(month: u32, locale: Locale) -> String {
    Utc.with_ymd_and_hms(2000, month, 1, 0, 0, 0)
        .single()
        .map_or_else(
            || month.to_string(),
            |date| date.format_localized("%B", locale).to_string(),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolves_common_tag_shapes() {
        assert_eq!(resolve_locale("fr-FR"), Locale::fr_FR);
        assert_eq!(resolve_locale("pt_BR"), Locale::pt_BR);
        assert_eq!(resolve_locale("pt-br"), Locale::pt_BR);
        assert_eq!(resolve_locale("de"), Locale::de_DE);
        assert_eq!(resolve_locale("fr_CA.UTF-8"), Locale::fr_CA);
        assert_eq!(resolve_locale("en-AU"), Locale::en_US);
    }

    #[test]
    fn test_unknown_and_default_fall_back_to_english() {
        assert_eq!(resolve_locale("default"), FALLBACK_LOCALE);
        assert_eq!(resolve_locale(""), FALLBACK_LOCALE);
        assert_eq!(resolve_locale("xx-YY"), FALLBACK_LOCALE);
    }

    #[test]
    fn test_month_names() {
        assert_eq!(month_name(1, Locale::en_US), "January");
        assert_eq!(month_name(12, Locale::en_US), "December");
        assert_eq!(month_name(1, Locale::fr_FR), "janvier");
        assert_eq!(month_name(3, Locale::de_DE), "März");
        assert_eq!(month_name(13, Locale::en_US), "13");
    }
}
