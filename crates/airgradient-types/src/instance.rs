//! Instance id resolution.
//!
//! AirGradient monitors post to `/sensors/{token}/measures` where the token is
//! `airgradient:<serial>`. Only the serial part identifies the instance.

/// Id used when the token does not carry a usable instance id.
pub const NULL_INSTANCE_ID: &str = "null";

/// Separator between the token prefix and the instance id.
pub const INSTANCE_ID_DELIMITER: char = ':';

/// Resolve the instance id from a path token.
///
/// The token must split into exactly two parts on [`INSTANCE_ID_DELIMITER`];
/// the second part is the id. Anything else resolves to [`NULL_INSTANCE_ID`].
///
/// # Examples
///
/// ```
/// use airgradient_types::parse_instance_id;
///
/// assert_eq!(parse_instance_id("abc:sensor7"), "sensor7");
/// assert_eq!(parse_instance_id("sensor7"), "null");
/// assert_eq!(parse_instance_id("a:b:c"), "null");
/// ```
#[must_use]
pub fn parse_instance_id(token: &str) -> String {
    let mut parts = token.split(INSTANCE_ID_DELIMITER);
    match (parts.next(), parts.next(), parts.next()) {
        (Some(_), Some(id), None) if !id.is_empty() => id.to_string(),
        _ => NULL_INSTANCE_ID.to_string(),
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Resolved ids are never empty and never contain the delimiter.
        #[test]
        fn parse_instance_id_never_empty(token in ".*") {
            let id = parse_instance_id(&token);
            prop_assert!(!id.is_empty());
            prop_assert!(id == NULL_INSTANCE_ID || !id.contains(INSTANCE_ID_DELIMITER));
        }

        /// A well-formed token always yields its second part.
        #[test]
        fn parse_instance_id_takes_second_part(prefix in "[a-z]{0,12}", id in "[a-zA-Z0-9]{1,16}") {
            let token = format!("{prefix}:{id}");
            prop_assert_eq!(parse_instance_id(&token), id);
        }
    }
}
