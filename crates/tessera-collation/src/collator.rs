use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use icu_collator::options::{
    AlternateHandling, CaseLevel, CollatorOptions, MaxVariable as IcuMaxVariable,
    Strength as IcuStrength,
};
use icu_collator::{CollatorBorrowed, CollatorPreferences};
use icu_locale_core::Locale;
use tracing::debug;
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

use crate::error::CollationError;
use crate::locale::locale_defaults;
use crate::spec::{Alternate, CaseFirst, CollationSpec, MaxVariable, Strength};

/// Compares strings according to a [`CollationSpec`] using the ICU root and
/// locale tailorings.
///
/// Cloning is cheap; the spec and the ICU tables are shared. Two collators
/// are equal when their specs are.
#[derive(Clone)]
pub struct Collator {
    spec: Arc<CollationSpec>,
    icu: Arc<IcuCollators>,
}

struct IcuCollators {
    full: CollatorBorrowed<'static>,
    /// Present when accents compare from the end of the string.
    reversed_accents: Option<ReversedAccents>,
}

/// Level-limited collators used to read accents from the end of the string.
struct ReversedAccents {
    primary: CollatorBorrowed<'static>,
    secondary: CollatorBorrowed<'static>,
}

impl fmt::Debug for Collator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collator").field("spec", &self.spec).finish()
    }
}

impl PartialEq for Collator {
    fn eq(&self, other: &Self) -> bool {
        self.spec == other.spec
    }
}

impl Eq for Collator {}

impl Collator {
    pub fn new(spec: CollationSpec) -> Result<Self, CollationError> {
        // Backwards accents are applied here rather than by locale data, so
        // fr_CA compares with the fr table.
        let tag = match locale_defaults(&spec.locale) {
            Some(defaults) if defaults.backwards => "fr".to_string(),
            _ => spec.locale.replace('_', "-"),
        };
        let locale = locale_with_keywords(&tag, &spec)?;

        let full = build(&locale, options(&spec, spec.strength))?;
        let reversed_accents = if spec.backwards && spec.strength > Strength::Primary {
            Some(ReversedAccents {
                primary: build(&locale, options(&spec, Strength::Primary))?,
                secondary: build(&locale, options(&spec, Strength::Secondary))?,
            })
        } else {
            None
        };

        debug!(locale = %spec.locale, icu_locale = %locale, strength = ?spec.strength, "collator created");
        Ok(Collator {
            spec: Arc::new(spec),
            icu: Arc::new(IcuCollators {
                full,
                reversed_accents,
            }),
        })
    }

    pub fn spec(&self) -> &CollationSpec {
        &self.spec
    }

    pub fn compare(&self, a: &str, b: &str) -> Ordering {
        if a == b {
            return Ordering::Equal;
        }
        let Some(levels) = &self.icu.reversed_accents else {
            return self.icu.full.compare(a, b);
        };
        levels
            .primary
            .compare(a, b)
            .then_with(|| levels.secondary.compare(&reverse_clusters(a), &reverse_clusters(b)))
            .then_with(|| self.icu.full.compare(a, b))
    }

    pub fn equals(&self, a: &str, b: &str) -> bool {
        self.compare(a, b) == Ordering::Equal
    }
}

fn build(locale: &Locale, options: CollatorOptions) -> Result<CollatorBorrowed<'static>, CollationError> {
    let prefs = CollatorPreferences::from(locale.clone());
    icu_collator::Collator::try_new(prefs, options).map_err(|e| {
        CollationError::invalid(format!("no collation data for locale {locale}: {e}"))
    })
}

/// The locale tag plus the `kf` (case first) and `kn` (numeric) keywords.
fn locale_with_keywords(tag: &str, spec: &CollationSpec) -> Result<Locale, CollationError> {
    let case_first = match spec.case_first {
        CaseFirst::Off => "false",
        CaseFirst::Upper => "upper",
        CaseFirst::Lower => "lower",
    };
    let tagged = format!("{tag}-u-kf-{case_first}-kn-{}", spec.numeric_ordering);
    tagged
        .parse::<Locale>()
        .map_err(|e| CollationError::invalid(format!("invalid locale {}: {e}", spec.locale)))
}

fn options(spec: &CollationSpec, strength: Strength) -> CollatorOptions {
    let mut options = CollatorOptions::default();
    options.strength = Some(match strength {
        Strength::Primary => IcuStrength::Primary,
        Strength::Secondary => IcuStrength::Secondary,
        Strength::Tertiary => IcuStrength::Tertiary,
        Strength::Quaternary => IcuStrength::Quaternary,
        Strength::Identical => IcuStrength::Identical,
    });
    options.alternate_handling = Some(match spec.alternate {
        Alternate::NonIgnorable => AlternateHandling::NonIgnorable,
        Alternate::Shifted => AlternateHandling::Shifted,
    });
    options.max_variable = Some(match spec.max_variable {
        MaxVariable::Space => IcuMaxVariable::Space,
        MaxVariable::Punct => IcuMaxVariable::Punctuation,
    });
    options.case_level = Some(if spec.case_level {
        CaseLevel::On
    } else {
        CaseLevel::Off
    });
    options
}

/// Reverse the order of base characters, keeping each base's combining
/// marks after it, so a forward secondary comparison reads accents from the
/// end of the original string.
fn reverse_clusters(s: &str) -> String {
    let mut clusters: Vec<String> = Vec::with_capacity(s.len());
    for c in s.nfd() {
        match clusters.last_mut() {
            Some(last) if is_combining_mark(c) => last.push(c),
            _ => clusters.push(c.to_string()),
        }
    }
    clusters.into_iter().rev().collect()
}
