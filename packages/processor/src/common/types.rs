use serde::Serialize;

/// Status carried by every HTTP response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Ok,
    Ko,
}

/// Merge the top-level keys of `patch` into `target`.
///
/// Non-object targets are replaced by an empty object first; non-object
/// patches are ignored. Nested objects are replaced, not merged, matching the
/// `jsonb || jsonb` semantics of the Postgres store.
pub fn merge_json_object(target: &mut serde_json::Value, patch: &serde_json::Value) {
    let Some(patch) = patch.as_object() else {
        return;
    };
    if !target.is_object() {
        *target = serde_json::Value::Object(Default::default());
    }
    if let Some(target) = target.as_object_mut() {
        for (key, value) in patch {
            target.insert(key.clone(), value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn merge_keeps_existing_keys() {
        let mut target = json!({"a": 1, "b": {"x": 1}});
        merge_json_object(&mut target, &json!({"b": {"y": 2}, "c": 3}));
        assert_eq!(target, json!({"a": 1, "b": {"y": 2}, "c": 3}));
    }

    #[test]
    fn merge_into_null_creates_object() {
        let mut target = serde_json::Value::Null;
        merge_json_object(&mut target, &json!({"url": {"title": "t"}}));
        assert_eq!(target, json!({"url": {"title": "t"}}));
    }

    #[test]
    fn response_status_serializes_lowercase() {
        assert_eq!(serde_json::to_value(ResponseStatus::Ko).unwrap(), json!("ko"));
    }
}
