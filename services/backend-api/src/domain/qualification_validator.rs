//! 資格情報リクエストボディのバリデーター
//!
//! `trainings`と`waivers`は必須（空リスト可）、`miscellaneous`は
//! 任意。存在するリストは各アイテムが完了可能アイテムの形式を
//! 満たすことを検証する。

use serde_json::Value;

use super::completable::{COMPLETABLE_ITEM_FIELDS, VALID_COMPLETION_STATUSES};
use super::validation::{all_keys_present, fmt_field_list, RecordMap, ValidationError};

/// 資格情報レコードの必須フィールド
const REQUIRED_FIELDS: &[&str] = &["user_id", "trainings", "waivers"];

/// 資格情報リクエストボディを検証する
pub fn validate_qualification_body(data: RecordMap) -> Result<RecordMap, ValidationError> {
    // 必須フィールドの存在確認
    if !all_keys_present(REQUIRED_FIELDS, &data) {
        let error_msg = format!(
            "Missing at least one field from {} in request body. \
             'trainings' and 'waivers' can be empty lists.",
            fmt_field_list(REQUIRED_FIELDS)
        );
        return Err(ValidationError::InvalidRequestBody(error_msg));
    }

    // 必須リストと、存在する場合のみのmiscellaneousを検証
    validate_completable_list("trainings", &data["trainings"])?;
    validate_completable_list("waivers", &data["waivers"])?;
    if let Some(miscellaneous) = data.get("miscellaneous") {
        validate_completable_list("miscellaneous", miscellaneous)?;
    }

    Ok(data)
}

/// 完了可能アイテムリストの各アイテムを検証する
fn validate_completable_list(list_name: &str, list: &Value) -> Result<(), ValidationError> {
    let items = list.as_array().cloned().unwrap_or_default();

    for item in &items {
        let fields = item.as_object().cloned().unwrap_or_default();
        if !all_keys_present(COMPLETABLE_ITEM_FIELDS, &fields) {
            let error_msg = format!(
                "Missing at least one field from {} for at least one completeable item in {}.",
                fmt_field_list(COMPLETABLE_ITEM_FIELDS),
                list_name
            );
            return Err(ValidationError::InvalidRequestBody(error_msg));
        }

        let name = value_as_display(&fields["name"]);
        let status = value_as_display(&fields["completion_status"]);
        if !VALID_COMPLETION_STATUSES.contains(&status.as_str()) {
            let error_msg = format!(
                "Completion status '{}' is not one of the valid completion statuses {} \
                 for object with name {} in {}.",
                status,
                fmt_field_list(VALID_COMPLETION_STATUSES),
                name,
                list_name
            );
            return Err(ValidationError::InvalidRequestBody(error_msg));
        }
    }

    Ok(())
}

/// JSON値をエラーメッセージ用の文字列表現にする
fn value_as_display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
