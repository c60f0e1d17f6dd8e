//! Readers for the loosely shaped JSON the portal backend returns.

use medportal_core::session::profile::UserProfile;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;

const TOKEN_FIELDS: [&str; 3] = ["token", "access_token", "accessToken"];

/// Token under `token`, `access_token` or `accessToken`, at the root or under `data`.
pub fn extract_token(body: &Value) -> Option<String> {
    [Some(body), body.get("data")].into_iter().flatten().find_map(|scope| {
        TOKEN_FIELDS.iter().find_map(|field| {
            scope
                .get(*field)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|token| !token.is_empty())
                .map(str::to_string)
        })
    })
}

/// Profile fields from `user` (root or under `data`), falling back to the
/// object itself. `fallback_login` fills a missing login.
pub fn extract_profile(body: &Value, fallback_login: &str) -> UserProfile {
    let data = body.get("data").filter(|value| value.is_object());
    let scope = body
        .get("user")
        .or_else(|| data.and_then(|data| data.get("user")))
        .or(data)
        .unwrap_or(body);

    let mut profile = serde_json::from_value::<UserProfile>(with_login(scope, fallback_login))
        .unwrap_or_else(|_| UserProfile {
            login: fallback_login.to_string(),
            ..UserProfile::default()
        });
    profile.token = None;
    profile
}

fn with_login(scope: &Value, fallback_login: &str) -> Value {
    let mut scope = scope.clone();
    if let Some(object) = scope.as_object_mut() {
        let has_login = object.get("login").and_then(Value::as_str).is_some();
        if !has_login {
            object.insert("login".to_string(), Value::String(fallback_login.to_string()));
        }
    }
    scope
}

/// Items under `.value`, `.data` or the root array. Any other shape, and any
/// item that does not decode, is dropped.
pub fn extract_list<T>(body: Value) -> Vec<T>
where
    T: DeserializeOwned,
{
    let items = match body {
        Value::Array(items) => items,
        Value::Object(mut object) => ["value", "data"]
            .into_iter()
            .find_map(|key| match object.remove(key) {
                Some(Value::Array(items)) => Some(items),
                _ => None,
            })
            .unwrap_or_default(),
        _ => Vec::new(),
    };

    items
        .into_iter()
        .filter_map(|item| match serde_json::from_value(item) {
            Ok(decoded) => Some(decoded),
            Err(error) => {
                warn!(
                    event_name = "backend.list.item_skipped",
                    error = %error,
                    "list item ignored"
                );
                None
            }
        })
        .collect()
}

/// Single document either bare or wrapped in `data`.
pub fn unwrap_data(body: Value) -> Value {
    match body {
        Value::Object(mut object) if object.get("data").is_some_and(Value::is_object) => {
            object.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    }
}

/// Error text from `message`, `error`, or the SAP `error.message.value` shape.
pub fn extract_error_message(body: &Value) -> Option<String> {
    let candidates = [
        body.get("message"),
        body.get("error").filter(|error| error.is_string()),
        body.pointer("/error/message/value"),
        body.pointer("/error/message"),
    ];
    candidates
        .into_iter()
        .flatten()
        .find_map(Value::as_str)
        .map(str::trim)
        .filter(|message| !message.is_empty())
        .map(str::to_string)
}
