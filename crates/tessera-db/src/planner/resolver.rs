use bson::Bson;
use tessera_collation::{Collator, parse_collation_with_version};

use crate::error::DbError;

/// The collation an operation runs under.
///
/// An explicit collation wins, `{locale: "simple"}` included; otherwise the
/// collection default applies; otherwise comparison is binary. `None` is the
/// simple collation.
pub(crate) fn resolve_collation(
    requested: Option<&Bson>,
    collection_default: Option<&Collator>,
    installed_version: &str,
) -> Result<Option<Collator>, DbError> {
    match requested {
        Some(value) => Ok(parse_collation_with_version(value, installed_version)?
            .map(Collator::new)
            .transpose()?),
        None => Ok(collection_default.cloned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use tessera_collation::{COLLATOR_VERSION, CollationError, parse_collation};

    fn fr_ca() -> Collator {
        Collator::new(
            parse_collation(&doc! { "locale": "fr_CA" }.into())
                .unwrap()
                .unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn explicit_simple_overrides_default() {
        let default = fr_ca();
        let resolved = resolve_collation(
            Some(&doc! { "locale": "simple" }.into()),
            Some(&default),
            COLLATOR_VERSION,
        )
        .unwrap();
        assert!(resolved.is_none());
    }

    #[test]
    fn default_used_when_absent() {
        let default = fr_ca();
        let resolved = resolve_collation(None, Some(&default), COLLATOR_VERSION).unwrap();
        assert_eq!(resolved.unwrap().spec().locale, "fr_CA");
        assert!(resolve_collation(None, None, COLLATOR_VERSION).unwrap().is_none());
    }

    #[test]
    fn explicit_collation_is_normalized() {
        let resolved = resolve_collation(
            Some(&doc! { "locale": "en_US", "strength": 2 }.into()),
            None,
            COLLATOR_VERSION,
        )
        .unwrap()
        .unwrap();
        assert_eq!(resolved.spec().version, COLLATOR_VERSION);
    }

    #[test]
    fn version_mismatch_fails() {
        let err = resolve_collation(
            Some(&doc! { "locale": "en_US", "version": "unknownVersion" }.into()),
            None,
            COLLATOR_VERSION,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            DbError::Collation(CollationError::IncompatibleVersion { .. })
        ));
    }
}
