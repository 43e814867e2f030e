//! Storage keys and request paths.
//!
//! Storage keys and request paths share the same layout:
//!
//! | Key | Record | Sealed |
//! |-----|--------|--------|
//! | `config` | [`Configuration`](crate::config::Configuration) | yes |
//! | `roles/{name}` | [`Role`](crate::role::Role) | no |
//! | `creds/{name}` | [`Credential`](crate::credential::Credential) | yes |

/// Storage key of the singleton configuration record.
pub const CONFIG_KEY: &str = "config";

/// Request path aliasing the configuration handlers.
pub const RSA_PATH: &str = "rsa";

/// Prefix of role definitions.
pub const ROLE_PREFIX: &str = "roles/";

/// Prefix of issued credentials.
pub const CREDS_PREFIX: &str = "creds/";

/// Storage keys that must be seal-wrapped at rest.
///
/// Entries ending in `/` match every key under that prefix.
pub const SEAL_WRAP_KEYS: &[&str] = &[CONFIG_KEY, CREDS_PREFIX];

/// Maximum length of a role name.
pub const MAX_ROLE_NAME_LEN: usize = 128;

/// Storage key of the role named `name`.
#[must_use]
pub fn role_key(name: &str) -> String {
    format!("{ROLE_PREFIX}{name}")
}

/// Storage key of the credential issued for role `name`.
#[must_use]
pub fn creds_key(name: &str) -> String {
    format!("{CREDS_PREFIX}{name}")
}

/// Returns `true` if `key` must be written with seal wrapping.
#[must_use]
pub fn requires_seal_wrap(key: &str) -> bool {
    SEAL_WRAP_KEYS.iter().any(|pattern| match pattern.strip_suffix('/') {
        Some(_) => key.starts_with(pattern),
        None => key == *pattern,
    })
}

/// Returns `true` if `name` can be used as a single path segment.
///
/// Accepts 1..=128 characters from `[A-Za-z0-9_.-]`, excluding `.` and `..`.
#[must_use]
pub fn is_valid_role_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_ROLE_NAME_LEN
        && name != "."
        && name != ".."
        && name.bytes().all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b'.'))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use proptest::prelude::*;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::config("config", true)]
    #[case::creds("creds/app", true)]
    #[case::roles("roles/app", false)]
    #[case::config_lookalike("config2", false)]
    #[case::unrelated("sys/policy", false)]
    fn seal_wrap_paths(#[case] key: &str, #[case] expected: bool) {
        assert_eq!(requires_seal_wrap(key), expected);
    }

    #[rstest]
    #[case::simple("app", true)]
    #[case::punctuated("svc_app-01.prod", true)]
    #[case::empty("", false)]
    #[case::dot(".", false)]
    #[case::dotdot("..", false)]
    #[case::nested("team/app", false)]
    #[case::space("my app", false)]
    fn role_name_validation(#[case] name: &str, #[case] expected: bool) {
        assert_eq!(is_valid_role_name(name), expected);
    }

    proptest! {
        #[test]
        fn valid_names_round_trip_through_keys(name in "[A-Za-z0-9_-][A-Za-z0-9_.-]{0,127}") {
            prop_assert!(is_valid_role_name(&name));
            let creds = creds_key(&name);
            let role = role_key(&name);
            prop_assert_eq!(creds.strip_prefix(CREDS_PREFIX), Some(name.as_str()));
            prop_assert_eq!(role.strip_prefix(ROLE_PREFIX), Some(name.as_str()));
        }

        #[test]
        fn names_with_separators_are_rejected(prefix in "[a-z]{1,8}", suffix in "[a-z]{1,8}") {
            let name = format!("{prefix}/{suffix}");
            prop_assert!(!is_valid_role_name(&name));
        }
    }
}
