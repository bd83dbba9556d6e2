//! The "current locale" charset, used for empty files and the `CURRENT`
//! candidate label.

use super::Encoding;

const LOCALE_VARS: [&str; 3] = ["LC_ALL", "LC_CTYPE", "LANG"];

/// Charset of the process locale, falling back to UTF-8.
pub fn locale_encoding() -> Encoding {
    let value = LOCALE_VARS
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .find(|value| !value.is_empty());

    match value {
        Some(value) => locale_encoding_from(&value),
        None => Encoding::Utf8,
    }
}

/// Parse a POSIX locale name (`language_TERRITORY.codeset@modifier`).
pub fn locale_encoding_from(locale: &str) -> Encoding {
    let codeset = locale
        .split_once('.')
        .map(|(_, rest)| rest.split('@').next().unwrap_or(rest))
        .filter(|codeset| !codeset.is_empty() && !codeset.eq_ignore_ascii_case("current"));

    let Some(codeset) = codeset else {
        return Encoding::Utf8;
    };

    match Encoding::for_label(codeset) {
        Ok(encoding) => encoding,
        Err(err) => {
            log::debug!("locale charset {codeset} not usable ({err}), assuming UTF-8");
            Encoding::Utf8
        }
    }
}
