//! 入退室記録リクエストボディのバリデーター

use super::timestamp::validate_timestamp;
use super::validation::{all_keys_present, fmt_field_list, RecordMap, ValidationError};

/// 入退室記録の必須フィールド
const REQUIRED_FIELDS: &[&str] = &["user_id", "timestamp", "location"];

/// 有効なメイカースペースの所在地
pub const VALID_LOCATIONS: &[&str] = &["Watt", "Cooper", "CUICAR"];

/// 入退室記録リクエストボディを検証する
///
/// ボディの変形は行わないため、検証済みのボディをそのまま返す。
pub fn validate_visit_body(data: RecordMap) -> Result<RecordMap, ValidationError> {
    // 必須フィールドの存在確認
    if !all_keys_present(REQUIRED_FIELDS, &data) {
        let error_msg = format!(
            "Missing at least one field from {} in request body.",
            fmt_field_list(REQUIRED_FIELDS)
        );
        return Err(ValidationError::InvalidRequestBody(error_msg));
    }

    // タイムスタンプの形式確認
    let timestamp = data.get("timestamp").and_then(|v| v.as_str()).unwrap_or("");
    validate_timestamp(timestamp)?;

    // 所在地が定義済みの値であること
    let location = data.get("location").and_then(|v| v.as_str()).unwrap_or("");
    if !VALID_LOCATIONS.contains(&location) {
        let error_msg = format!(
            "Specified location '{}' is not one of the valid locations {}.",
            location,
            fmt_field_list(VALID_LOCATIONS)
        );
        return Err(ValidationError::InvalidRequestBody(error_msg));
    }

    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: serde_json::Value) -> RecordMap {
        value.as_object().unwrap().clone()
    }

    // 正しいボディは受理される
    #[test]
    fn test_valid_visit() {
        let data = record(json!({
            "user_id": "u1",
            "timestamp": "2024-01-01T10:00:00",
            "location": "Watt"
        }));
        assert!(validate_visit_body(data).is_ok());
    }

    // 必須フィールド欠落
    #[test]
    fn test_missing_location() {
        let data = record(json!({
            "user_id": "u1",
            "timestamp": "2024-01-01T10:00:00"
        }));
        let err = validate_visit_body(data).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Missing at least one field from ['user_id', 'timestamp', 'location'] \
             in request body."
        );
    }

    // タイムスタンプ形式違反
    #[test]
    fn test_invalid_timestamp_format() {
        let data = record(json!({
            "user_id": "u1",
            "timestamp": "01/01/2024",
            "location": "Watt"
        }));
        let err = validate_visit_body(data).unwrap_err();
        assert!(err.to_string().contains("approved format"));
    }

    // 未知の所在地は拒否される
    #[test]
    fn test_unknown_location() {
        let data = record(json!({
            "user_id": "u1",
            "timestamp": "2024-01-01T10:00:00",
            "location": "Library"
        }));
        let err = validate_visit_body(data).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Specified location 'Library' is not one of the valid locations \
             ['Watt', 'Cooper', 'CUICAR']."
        );
    }
}
