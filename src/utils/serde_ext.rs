use serde::{Deserialize, Deserializer};

/// Distinguishes a missing field (`None`) from an explicit `null` (`Some(None)`).
/// Use together with `#[serde(default)]`.
pub fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Deserialize::deserialize(deserializer).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Patch {
        #[serde(default, deserialize_with = "double_option")]
        note: Option<Option<String>>,
    }

    #[test]
    fn missing_null_and_value_are_distinct() {
        let missing: Patch = serde_json::from_str("{}").unwrap();
        let null: Patch = serde_json::from_str(r#"{"note": null}"#).unwrap();
        let value: Patch = serde_json::from_str(r#"{"note": "late bus"}"#).unwrap();

        assert_eq!(missing.note, None);
        assert_eq!(null.note, Some(None));
        assert_eq!(value.note, Some(Some("late bus".to_string())));
    }
}
