use std::fmt;

use bson::{Bson, Document, doc};
use serde::{Deserialize, Serialize};

use crate::error::CollationError;
use crate::locale::locale_defaults;

/// Revision of the comparison tables this build ships with.
pub const COLLATOR_VERSION: &str = "57.1";

const SIMPLE_LOCALE: &str = "simple";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaseFirst {
    Off,
    Upper,
    Lower,
}

impl CaseFirst {
    pub fn as_str(self) -> &'static str {
        match self {
            CaseFirst::Off => "off",
            CaseFirst::Upper => "upper",
            CaseFirst::Lower => "lower",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Alternate {
    NonIgnorable,
    Shifted,
}

impl Alternate {
    pub fn as_str(self) -> &'static str {
        match self {
            Alternate::NonIgnorable => "non-ignorable",
            Alternate::Shifted => "shifted",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaxVariable {
    Punct,
    Space,
}

impl MaxVariable {
    pub fn as_str(self) -> &'static str {
        match self {
            MaxVariable::Punct => "punct",
            MaxVariable::Space => "space",
        }
    }
}

/// Comparison level. Higher levels distinguish more differences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum Strength {
    /// Base letters only.
    Primary = 1,
    /// Adds accents.
    Secondary = 2,
    /// Adds case.
    Tertiary = 3,
    /// Adds ignorable punctuation when `alternate` is shifted.
    Quaternary = 4,
    /// Code point tie breaker.
    Identical = 5,
}

impl TryFrom<i32> for Strength {
    type Error = CollationError;

    fn try_from(level: i32) -> Result<Self, Self::Error> {
        match level {
            1 => Ok(Strength::Primary),
            2 => Ok(Strength::Secondary),
            3 => Ok(Strength::Tertiary),
            4 => Ok(Strength::Quaternary),
            5 => Ok(Strength::Identical),
            n => Err(CollationError::invalid(format!(
                "strength must be an integer 1 through 5, got {n}"
            ))),
        }
    }
}

impl From<Strength> for i32 {
    fn from(s: Strength) -> i32 {
        s as i32
    }
}

/// A fully normalized, non-simple collation.
///
/// Every field is populated: values the user left out are filled from the
/// locale defaults. Two specs are interchangeable for index use exactly when
/// they compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollationSpec {
    pub locale: String,
    pub case_level: bool,
    pub case_first: CaseFirst,
    pub strength: Strength,
    pub numeric_ordering: bool,
    pub alternate: Alternate,
    pub max_variable: MaxVariable,
    pub normalization: bool,
    pub backwards: bool,
    pub version: String,
}

impl CollationSpec {
    /// Defaults for `locale` with every option unset.
    ///
    /// Returns `None` for unsupported locales and for `"simple"`.
    pub fn for_locale(locale: &str) -> Option<Self> {
        let defaults = locale_defaults(locale)?;
        Some(CollationSpec {
            locale: defaults.name.to_string(),
            case_level: false,
            case_first: defaults.case_first,
            strength: Strength::Tertiary,
            numeric_ordering: false,
            alternate: defaults.alternate,
            max_variable: MaxVariable::Punct,
            normalization: false,
            backwards: defaults.backwards,
            version: COLLATOR_VERSION.to_string(),
        })
    }

    /// The normalized document form, with fields in canonical order.
    pub fn to_document(&self) -> Document {
        doc! {
            "locale": self.locale.as_str(),
            "caseLevel": self.case_level,
            "caseFirst": self.case_first.as_str(),
            "strength": i32::from(self.strength),
            "numericOrdering": self.numeric_ordering,
            "alternate": self.alternate.as_str(),
            "maxVariable": self.max_variable.as_str(),
            "normalization": self.normalization,
            "backwards": self.backwards,
            "version": self.version.as_str(),
        }
    }
}

impl fmt::Display for CollationSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_document())
    }
}

/// Parse and normalize a user-supplied collation against the installed
/// comparison tables.
///
/// Returns `Ok(None)` for `{locale: "simple"}`.
pub fn parse_collation(value: &Bson) -> Result<Option<CollationSpec>, CollationError> {
    parse_collation_with_version(value, COLLATOR_VERSION)
}

/// Like [`parse_collation`], validating `version` against `installed`.
pub fn parse_collation_with_version(
    value: &Bson,
    installed: &str,
) -> Result<Option<CollationSpec>, CollationError> {
    let doc = match value {
        Bson::Document(d) => d,
        other => {
            return Err(CollationError::invalid(format!(
                "collation must be an object, got {}",
                type_name(other)
            )));
        }
    };

    let locale = match doc.get("locale") {
        Some(Bson::String(s)) => s.as_str(),
        Some(other) => {
            return Err(CollationError::invalid(format!(
                "locale must be a string, got {}",
                type_name(other)
            )));
        }
        None => return Err(CollationError::invalid("missing required field locale")),
    };

    if locale == SIMPLE_LOCALE {
        if doc.len() > 1 {
            return Err(CollationError::invalid(
                "the simple locale does not accept other options",
            ));
        }
        return Ok(None);
    }

    let mut spec = CollationSpec::for_locale(locale)
        .ok_or_else(|| CollationError::invalid(format!("unsupported locale: {locale}")))?;
    spec.version = installed.to_string();

    for (key, value) in doc {
        match key.as_str() {
            "locale" => {}
            "caseLevel" => spec.case_level = expect_bool(key, value)?,
            "caseFirst" => {
                spec.case_first = match expect_str(key, value)? {
                    "off" => CaseFirst::Off,
                    "upper" => CaseFirst::Upper,
                    "lower" => CaseFirst::Lower,
                    other => {
                        return Err(CollationError::invalid(format!(
                            "caseFirst must be one of off, upper, lower; got {other}"
                        )));
                    }
                }
            }
            "strength" => spec.strength = parse_strength(value)?,
            "numericOrdering" => spec.numeric_ordering = expect_bool(key, value)?,
            "alternate" => {
                spec.alternate = match expect_str(key, value)? {
                    "non-ignorable" => Alternate::NonIgnorable,
                    "shifted" => Alternate::Shifted,
                    other => {
                        return Err(CollationError::invalid(format!(
                            "alternate must be non-ignorable or shifted; got {other}"
                        )));
                    }
                }
            }
            "maxVariable" => {
                spec.max_variable = match expect_str(key, value)? {
                    "punct" => MaxVariable::Punct,
                    "space" => MaxVariable::Space,
                    other => {
                        return Err(CollationError::invalid(format!(
                            "maxVariable must be punct or space; got {other}"
                        )));
                    }
                }
            }
            "normalization" => spec.normalization = expect_bool(key, value)?,
            "backwards" => spec.backwards = expect_bool(key, value)?,
            "version" => {
                let requested = expect_str(key, value)?;
                if requested != installed {
                    return Err(CollationError::IncompatibleVersion {
                        requested: requested.to_string(),
                        installed: installed.to_string(),
                    });
                }
            }
            other => {
                return Err(CollationError::invalid(format!(
                    "unknown collation spec field: {other}"
                )));
            }
        }
    }

    Ok(Some(spec))
}

fn parse_strength(value: &Bson) -> Result<Strength, CollationError> {
    let level = match value {
        Bson::Int32(n) => i64::from(*n),
        Bson::Int64(n) => *n,
        Bson::Double(d) if d.fract() == 0.0 && d.is_finite() => *d as i64,
        Bson::Double(d) => {
            return Err(CollationError::invalid(format!(
                "strength must be an integer, got {d}"
            )));
        }
        other => {
            return Err(CollationError::invalid(format!(
                "strength must be a number, got {}",
                type_name(other)
            )));
        }
    };
    let level = i32::try_from(level).map_err(|_| {
        CollationError::invalid(format!("strength must be an integer 1 through 5, got {level}"))
    })?;
    Strength::try_from(level)
}

fn expect_bool(key: &str, value: &Bson) -> Result<bool, CollationError> {
    match value {
        Bson::Boolean(b) => Ok(*b),
        other => Err(CollationError::invalid(format!(
            "{key} must be a boolean, got {}",
            type_name(other)
        ))),
    }
}

fn expect_str<'a>(key: &str, value: &'a Bson) -> Result<&'a str, CollationError> {
    match value {
        Bson::String(s) => Ok(s.as_str()),
        other => Err(CollationError::invalid(format!(
            "{key} must be a string, got {}",
            type_name(other)
        ))),
    }
}

fn type_name(value: &Bson) -> &'static str {
    match value {
        Bson::Double(_) => "double",
        Bson::String(_) => "string",
        Bson::Document(_) => "object",
        Bson::Array(_) => "array",
        Bson::Boolean(_) => "bool",
        Bson::Null => "null",
        Bson::Undefined => "undefined",
        Bson::Int32(_) => "int",
        Bson::Int64(_) => "long",
        _ => "unsupported type",
    }
}
