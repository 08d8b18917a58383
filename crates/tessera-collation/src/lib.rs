//! Collation specifications and string collators.
//!
//! A collation is parsed from its document form with [`parse_collation`],
//! which returns `None` for the binary `{locale: "simple"}` sentinel and a
//! fully normalized [`CollationSpec`] otherwise. A [`Collator`] built from a
//! spec compares strings with the ICU collation tables.

mod collator;
mod error;
mod locale;
mod spec;

pub use collator::Collator;
pub use error::CollationError;
pub use locale::{LocaleDefaults, is_supported_locale, locale_defaults};
pub use spec::{
    Alternate, COLLATOR_VERSION, CaseFirst, CollationSpec, MaxVariable, Strength,
    parse_collation, parse_collation_with_version,
};

/// True when two optional collators order strings identically.
///
/// `None` stands for the simple (binary) collation.
pub fn collators_match(a: Option<&Collator>, b: Option<&Collator>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a.spec() == b.spec(),
        _ => false,
    }
}
