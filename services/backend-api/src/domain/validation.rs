//! リクエストボディ検証の基本部品
//!
//! 各リソースのバリデーターが共有する必須/禁止フィールドチェックと、
//! 検証エラー型を提供する。バリデーターは最初の違反で即座に失敗し、
//! エラーは人間が読めるメッセージを1つだけ持つ（複数エラーの集約はしない）。

use serde_json::{Map, Value};
use thiserror::Error;

/// リクエストボディ・レコードを表すJSONマップ
///
/// DynamoDBアイテムもリクエストボディもフラットなJSONオブジェクトとして
/// 扱うため、全レイヤーで共通のマップ型を使用する。
pub type RecordMap = Map<String, Value>;

/// リクエスト検証のエラー型
///
/// どちらのバリアントもHTTP 400としてレスポンスの`errorMsg`に変換される。
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// リクエストボディが要件を満たしていない
    #[error("{0}")]
    InvalidRequestBody(String),

    /// クエリパラメータ（または組み合わせ）が不正
    #[error("{0}")]
    InvalidQueryParameters(String),
}

/// 判別フィールドの値ごとの必須/禁止フィールド定義
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldCheck {
    /// 必ず存在しなければならないフィールド
    pub required: &'static [&'static str],
    /// 存在した場合に黙って削除されるフィールド
    pub disallowed: &'static [&'static str],
}

/// フィールド名リストをエラーメッセージ用に整形する
///
/// 例: `['user_id', 'timestamp']`
pub fn fmt_field_list(fields: &[&str]) -> String {
    let quoted: Vec<String> = fields.iter().map(|f| format!("'{}'", f)).collect();
    format!("[{}]", quoted.join(", "))
}

/// すべてのキーがマップに存在するか確認する
pub fn all_keys_present(keys: &[&str], data: &RecordMap) -> bool {
    keys.iter().all(|key| data.contains_key(*key))
}

/// いずれかのキーがマップに存在するか確認する
pub fn any_keys_present(keys: &[&str], data: &RecordMap) -> bool {
    keys.iter().any(|key| data.contains_key(*key))
}

/// 必須/禁止フィールドのチェックとクリーニングを行う
///
/// 必須フィールドが1つでも欠けていれば`InvalidRequestBody`を返す。
/// 禁止フィールドは存在しても黙って削除され、クリーニング済みの
/// ボディが返される。
pub fn check_and_clean_request_fields(
    mut data: RecordMap,
    field_check: &FieldCheck,
) -> Result<RecordMap, ValidationError> {
    for required_field in field_check.required {
        if !data.contains_key(*required_field) {
            let error_msg = format!(
                "Missing at least one field from {}.",
                fmt_field_list(field_check.required)
            );
            return Err(ValidationError::InvalidRequestBody(error_msg));
        }
    }

    for disallowed_field in field_check.disallowed {
        data.remove(*disallowed_field);
    }

    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> RecordMap {
        value.as_object().unwrap().clone()
    }

    // フィールドリスト整形のテスト
    #[test]
    fn test_fmt_field_list() {
        assert_eq!(fmt_field_list(&["a", "b"]), "['a', 'b']");
        assert_eq!(fmt_field_list(&[]), "[]");
    }

    // all_keys_present: 全キー存在
    #[test]
    fn test_all_keys_present_true() {
        let data = record(json!({"a": 1, "b": 2, "c": 3}));
        assert!(all_keys_present(&["a", "b"], &data));
    }

    // all_keys_present: 1つ欠落
    #[test]
    fn test_all_keys_present_missing_one() {
        let data = record(json!({"a": 1}));
        assert!(!all_keys_present(&["a", "b"], &data));
    }

    // any_keys_present のテスト
    #[test]
    fn test_any_keys_present() {
        let data = record(json!({"b": 2}));
        assert!(any_keys_present(&["a", "b"], &data));
        assert!(!any_keys_present(&["x", "y"], &data));
    }

    // 必須フィールド欠落でInvalidRequestBody
    #[test]
    fn test_check_and_clean_missing_required() {
        let check = FieldCheck {
            required: &["needed"],
            disallowed: &[],
        };
        let data = record(json!({"other": 1}));

        let result = check_and_clean_request_fields(data, &check);
        match result.unwrap_err() {
            ValidationError::InvalidRequestBody(msg) => {
                assert_eq!(msg, "Missing at least one field from ['needed'].");
            }
            other => panic!("Expected InvalidRequestBody, got {:?}", other),
        }
    }

    // 禁止フィールドは黙って削除される
    #[test]
    fn test_check_and_clean_removes_disallowed() {
        let check = FieldCheck {
            required: &["keep"],
            disallowed: &["drop"],
        };
        let data = record(json!({"keep": 1, "drop": 2}));

        let cleaned = check_and_clean_request_fields(data, &check).unwrap();
        assert!(cleaned.contains_key("keep"));
        assert!(!cleaned.contains_key("drop"));
    }

    // 禁止フィールドが無くてもエラーにならない
    #[test]
    fn test_check_and_clean_disallowed_absent_ok() {
        let check = FieldCheck {
            required: &[],
            disallowed: &["drop"],
        };
        let data = record(json!({"keep": 1}));

        let cleaned = check_and_clean_request_fields(data, &check).unwrap();
        assert_eq!(cleaned.len(), 1);
    }
}
