//! Translation of driver errors.
//!
//! Unique-index violations (server code 11000) become
//! [`DocumentStoreError::DuplicateKey`] with the storage names of the index,
//! recovered from the server message. Every other error is reported as
//! [`DocumentStoreError::Backend`].

use mongodb::error::{Error, ErrorKind, WriteFailure};

use docmodel_core::error::DocumentStoreError;

const DUPLICATE_KEY_CODE: i32 = 11000;

pub(crate) fn backend_error(err: Error) -> DocumentStoreError {
    let duplicate = match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(error)) if error.code == DUPLICATE_KEY_CODE => {
            Some(error.message.clone())
        }
        ErrorKind::Command(error) if error.code == DUPLICATE_KEY_CODE => Some(error.message.clone()),
        _ => None,
    };

    match duplicate {
        Some(message) => DocumentStoreError::DuplicateKey {
            key_pattern: parse_key_pattern(&message),
            message,
        },
        None => DocumentStoreError::Backend(err.to_string()),
    }
}

/// Recovers the indexed storage names from an E11000 message.
///
/// Keys are read from the `dup key: { ... }` part. Servers that leave those
/// keys blank get them from the index name instead.
pub(crate) fn parse_key_pattern(message: &str) -> Vec<String> {
    let from_dup_key = message
        .split_once("dup key: {")
        .map(|(_, rest)| dup_key_names(rest))
        .unwrap_or_default();

    if !from_dup_key.is_empty() && from_dup_key.iter().all(|key| !key.is_empty()) {
        return from_dup_key;
    }

    message
        .split_once("index: ")
        .and_then(|(_, rest)| rest.split_whitespace().next())
        .map(index_name_keys)
        .unwrap_or_default()
}

/// Reads the keys of `key: value, key: value }`, skipping over values.
fn dup_key_names(body: &str) -> Vec<String> {
    let mut keys = Vec::new();
    let mut current = String::new();
    let mut in_key = true;
    let mut depth = 0usize;
    let mut quoted = false;
    let mut escaped = false;

    for ch in body.chars() {
        if in_key {
            match ch {
                ':' => {
                    keys.push(current.trim().to_string());
                    current.clear();
                    in_key = false;
                }
                '}' => break,
                ch => current.push(ch),
            }
            continue;
        }

        if quoted {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => quoted = false,
                _ => {}
            }
            continue;
        }

        match ch {
            '"' => quoted = true,
            '{' | '[' => depth += 1,
            '}' | ']' if depth > 0 => depth -= 1,
            '}' => break,
            ',' if depth == 0 => in_key = true,
            _ => {}
        }
    }

    keys
}

/// Splits a default index name such as `first_1_last_-1` into its keys.
///
/// Old servers prefix the name with the namespace, as in `db.user.$nick_1`.
fn index_name_keys(name: &str) -> Vec<String> {
    let name = name.rsplit_once('$').map_or(name, |(_, name)| name);

    if name == "_id_" {
        return vec!["_id".to_string()];
    }

    let mut keys = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for part in name.split('_') {
        if matches!(part, "1" | "-1") && !current.is_empty() {
            keys.push(current.join("_"));
            current.clear();
        } else {
            current.push(part);
        }
    }

    keys
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_keys_from_dup_key() {
        let message = r#"E11000 duplicate key error collection: test.user index: nick_1 dup key: { nick: "bob, the: {builder}" }"#;
        assert_eq!(parse_key_pattern(message), vec!["nick"]);

        let message = r#"E11000 duplicate key error collection: test.user index: f_1_l_1 dup key: { f: "Ann", l: { a: [1, 2] } }"#;
        assert_eq!(parse_key_pattern(message), vec!["f", "l"]);
    }

    #[test]
    fn falls_back_to_the_index_name() {
        let message = r#"E11000 duplicate key error index: test.user.$first_name_1_last_1 dup key: { : "Ann", : "Smith" }"#;
        assert_eq!(parse_key_pattern(message), vec!["first_name", "last"]);

        let message = r#"E11000 duplicate key error collection: test.user index: _id_ dup key: { : 1 }"#;
        assert_eq!(parse_key_pattern(message), vec!["_id"]);
    }
}
