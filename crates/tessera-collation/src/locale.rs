use crate::spec::{Alternate, CaseFirst};

/// Per-locale defaults applied when a collation leaves a field unspecified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocaleDefaults {
    pub name: &'static str,
    pub case_first: CaseFirst,
    pub alternate: Alternate,
    pub backwards: bool,
}

const fn locale(name: &'static str) -> LocaleDefaults {
    LocaleDefaults {
        name,
        case_first: CaseFirst::Off,
        alternate: Alternate::NonIgnorable,
        backwards: false,
    }
}

const fn upper_first(name: &'static str) -> LocaleDefaults {
    LocaleDefaults {
        case_first: CaseFirst::Upper,
        ..locale(name)
    }
}

const fn shifted(name: &'static str) -> LocaleDefaults {
    LocaleDefaults {
        alternate: Alternate::Shifted,
        ..locale(name)
    }
}

const fn french_accents(name: &'static str) -> LocaleDefaults {
    LocaleDefaults {
        backwards: true,
        ..locale(name)
    }
}

// Sorted by name for binary search.
static LOCALES: &[LocaleDefaults] = &[
    locale("af"),
    locale("ar"),
    locale("bg"),
    locale("ca"),
    locale("cs"),
    upper_first("da"),
    locale("de"),
    locale("de_AT"),
    locale("el"),
    locale("en"),
    locale("en_AU"),
    locale("en_CA"),
    locale("en_GB"),
    locale("en_US"),
    locale("en_US_POSIX"),
    locale("es"),
    locale("et"),
    locale("fa"),
    locale("fi"),
    locale("fr"),
    french_accents("fr_CA"),
    locale("he"),
    locale("hi"),
    locale("hr"),
    locale("hu"),
    locale("id"),
    locale("is"),
    locale("it"),
    locale("ja"),
    locale("ko"),
    locale("lt"),
    locale("lv"),
    upper_first("mt"),
    locale("nb"),
    locale("nl"),
    locale("pl"),
    locale("pt"),
    locale("ro"),
    locale("ru"),
    locale("sk"),
    locale("sl"),
    locale("sr"),
    locale("sv"),
    shifted("th"),
    locale("tr"),
    locale("uk"),
    locale("vi"),
    locale("zh"),
    locale("zh_Hant"),
];

/// Look up the defaults for a locale identifier.
pub fn locale_defaults(name: &str) -> Option<&'static LocaleDefaults> {
    LOCALES
        .binary_search_by(|l| l.name.cmp(name))
        .ok()
        .map(|i| &LOCALES[i])
}

pub fn is_supported_locale(name: &str) -> bool {
    locale_defaults(name).is_some()
}
