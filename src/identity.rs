//! Who is running the tool. The login name is taken from the environment
//! as-is; nothing here authenticates it.

const LOGIN_VARS: [&str; 4] = ["LOGNAME", "USER", "LNAME", "USERNAME"];

pub fn current_identity() -> Option<String> {
    identity_from(|key| std::env::var(key).ok())
}

/// First non-blank login variable, lower-cased.
pub fn identity_from(lookup: impl Fn(&str) -> Option<String>) -> Option<String> {
    LOGIN_VARS
        .iter()
        .filter_map(|key| lookup(key))
        .map(|value| value.trim().to_lowercase())
        .find(|value| !value.is_empty())
}
