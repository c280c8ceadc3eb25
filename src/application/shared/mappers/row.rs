use crate::application::ports::remote_gateway::{value_as_text, Row};
use crate::domain::value_objects::ItemId;
use crate::shared::error::AppError;
use chrono::{DateTime, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde_json::Value;

pub fn required_str(row: &Row, key: &str) -> Result<String, AppError> {
    optional_str(row, key)
        .ok_or_else(|| AppError::Deserialization(format!("missing field `{key}`")))
}

pub fn optional_str(row: &Row, key: &str) -> Option<String> {
    row.get(key)
        .and_then(value_as_text)
        .filter(|value| !value.is_empty())
}

pub fn required_id(row: &Row, key: &str) -> Result<ItemId, AppError> {
    let raw = required_str(row, key)?;
    ItemId::new(raw).map_err(AppError::Deserialization)
}

pub fn required_datetime(row: &Row, key: &str) -> Result<DateTime<Utc>, AppError> {
    match row.get(key) {
        Some(value) => parse_datetime(value).ok_or_else(|| {
            AppError::Deserialization(format!("field `{key}` is not a timestamp"))
        }),
        None => Err(AppError::Deserialization(format!("missing field `{key}`"))),
    }
}

pub fn optional_datetime(row: &Row, key: &str) -> Option<DateTime<Utc>> {
    row.get(key).and_then(parse_datetime)
}

pub fn optional_u64(row: &Row, key: &str) -> u64 {
    match row.get(key) {
        Some(Value::Number(n)) => n.as_u64().unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

pub fn optional_u32(row: &Row, key: &str) -> Option<u32> {
    match row.get(key) {
        Some(Value::Number(n)) => n.as_u64().and_then(|v| u32::try_from(v).ok()),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Joined relation: PostgREST returns an object, or an array for to-many embeds.
pub fn nested_row<'a>(row: &'a Row, key: &str) -> Option<&'a Row> {
    match row.get(key) {
        Some(Value::Object(map)) => Some(map),
        Some(Value::Array(items)) => items.first().and_then(Value::as_object),
        _ => None,
    }
}

pub fn parse_datetime(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(raw) => parse_datetime_str(raw),
        Value::Number(n) => n
            .as_i64()
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single()),
        _ => None,
    }
}

fn parse_datetime_str(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f%#z", "%Y-%m-%dT%H:%M:%S%.f%#z"] {
        if let Ok(parsed) = DateTime::parse_from_str(raw, format) {
            return Some(parsed.with_timezone(&Utc));
        }
    }
    // realtime payloads may carry `timestamp` columns without an offset
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    None
}

pub fn format_timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn timestamp_value(value: &DateTime<Utc>) -> Value {
    Value::String(format_timestamp(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn parses_postgres_timestamp_shapes() {
        let r = row(json!({
            "a": "2024-03-01T10:00:00.123456+00:00",
            "b": "2024-03-01T10:00:00.5",
            "c": "2024-03-01 10:00:00+09",
            "d": 1_709_287_200_000i64,
        }));
        let a = required_datetime(&r, "a").unwrap();
        assert_eq!(format_timestamp(&a), "2024-03-01T10:00:00.123Z");
        assert_eq!(
            format_timestamp(&required_datetime(&r, "b").unwrap()),
            "2024-03-01T10:00:00.500Z"
        );
        assert_eq!(
            format_timestamp(&required_datetime(&r, "c").unwrap()),
            "2024-03-01T01:00:00.000Z"
        );
        assert_eq!(
            required_datetime(&r, "d").unwrap().timestamp_millis(),
            1_709_287_200_000
        );
        assert!(required_datetime(&r, "missing").is_err());
    }

    #[test]
    fn ids_accept_numbers_and_strings() {
        let r = row(json!({"id": 17, "uuid": "c1", "empty": ""}));
        assert_eq!(required_id(&r, "id").unwrap().as_str(), "17");
        assert_eq!(required_id(&r, "uuid").unwrap().as_str(), "c1");
        assert!(required_id(&r, "empty").is_err());
    }

    #[test]
    fn nested_row_handles_object_and_array_embeds() {
        let r = row(json!({
            "author": {"id": "u1"},
            "authors": [{"id": "u2"}],
            "none": null,
        }));
        assert_eq!(optional_str(nested_row(&r, "author").unwrap(), "id").as_deref(), Some("u1"));
        assert_eq!(optional_str(nested_row(&r, "authors").unwrap(), "id").as_deref(), Some("u2"));
        assert!(nested_row(&r, "none").is_none());
    }
}
