//! ユーザー情報リクエストボディのバリデーター
//!
//! `university_status`を判別フィールドとして、所属区分ごとの
//! 必須/禁止フィールドを適用する。

use super::validation::{
    all_keys_present, check_and_clean_request_fields, fmt_field_list, FieldCheck, RecordMap,
    ValidationError,
};

/// ユーザーレコードの必須フィールド
const REQUIRED_FIELDS: &[&str] = &["user_id", "university_status"];

/// 有効なundergraduate_classの値
const VALID_UNDERGRADUATE_CLASSES: &[&str] = &["Freshman", "Sophomore", "Junior", "Senior"];

/// 大学所属区分
///
/// 区分ごとに必須/禁止フィールドのルールが決まる。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniversityStatus {
    Undergraduate,
    Graduate,
    Faculty,
}

impl UniversityStatus {
    /// 有効な所属区分の表記（エラーメッセージ用の順序で）
    pub const VALID_VALUES: &[&str] = &["Undergraduate", "Graduate", "Faculty"];

    /// 文字列から所属区分を解決する。未知の値は`None`。
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Undergraduate" => Some(UniversityStatus::Undergraduate),
            "Graduate" => Some(UniversityStatus::Graduate),
            "Faculty" => Some(UniversityStatus::Faculty),
            _ => None,
        }
    }

    /// 所属区分ごとの必須/禁止フィールド
    pub fn field_check(&self) -> FieldCheck {
        match self {
            // 学部生は学年と専攻が必須
            UniversityStatus::Undergraduate => FieldCheck {
                required: &["undergraduate_class", "major"],
                disallowed: &[],
            },
            // 大学院生は専攻のみ必須、学年は持てない
            UniversityStatus::Graduate => FieldCheck {
                required: &["major"],
                disallowed: &["undergraduate_class"],
            },
            // 教職員は学年も専攻も持てない
            UniversityStatus::Faculty => FieldCheck {
                required: &[],
                disallowed: &["undergraduate_class", "major"],
            },
        }
    }
}

/// ユーザー情報リクエストボディを検証し、クリーニング済みボディを返す
///
/// 最初の違反で`InvalidRequestBody`を返す。禁止フィールドは
/// 黙って削除される。
pub fn validate_user_body(data: RecordMap) -> Result<RecordMap, ValidationError> {
    // 必須フィールドの存在確認
    if !all_keys_present(REQUIRED_FIELDS, &data) {
        let error_msg = format!(
            "Missing at least one field from {} in request body.",
            fmt_field_list(REQUIRED_FIELDS)
        );
        return Err(ValidationError::InvalidRequestBody(error_msg));
    }

    // university_statusが定義済みの値であること
    let status_value = data
        .get("university_status")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();
    let Some(status) = UniversityStatus::parse(&status_value) else {
        let error_msg = format!(
            "The provided university_status ('{}') is not one of the valid statuses ({}).",
            status_value,
            fmt_field_list(UniversityStatus::VALID_VALUES)
        );
        return Err(ValidationError::InvalidRequestBody(error_msg));
    };

    // 所属区分に応じた必須/禁止フィールドのチェックとクリーニング
    let checking_fields = status.field_check();
    let data = check_and_clean_request_fields(data, &checking_fields).map_err(|_| {
        let error_msg = format!(
            "Missing at least one field from {} due to a 'university_status' value of '{}' \
             in request body.",
            fmt_field_list(checking_fields.required),
            status_value
        );
        ValidationError::InvalidRequestBody(error_msg)
    })?;

    // undergraduate_classが残っている場合は値も検証する
    if let Some(class_value) = data.get("undergraduate_class") {
        let class_str = class_value.as_str().unwrap_or("");
        if !VALID_UNDERGRADUATE_CLASSES.contains(&class_str) {
            let error_msg = format!(
                "Specified undergraduate_class ('{}') is not one of the valid classes {} \
                 in request body.",
                class_str,
                fmt_field_list(VALID_UNDERGRADUATE_CLASSES)
            );
            return Err(ValidationError::InvalidRequestBody(error_msg));
        }
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

    // 学部生: 学年と専攻ありで有効
    #[test]
    fn test_valid_undergraduate() {
        let data = record(json!({
            "user_id": "u1",
            "university_status": "Undergraduate",
            "undergraduate_class": "Junior",
            "major": "Computer Science"
        }));
        let cleaned = validate_user_body(data).unwrap();
        assert_eq!(cleaned["undergraduate_class"], "Junior");
    }

    // 学部生: 専攻欠落で失敗
    #[test]
    fn test_undergraduate_missing_major() {
        let data = record(json!({
            "user_id": "u1",
            "university_status": "Undergraduate",
            "undergraduate_class": "Junior"
        }));
        let err = validate_user_body(data).unwrap_err();
        assert!(err
            .to_string()
            .contains("due to a 'university_status' value of 'Undergraduate'"));
    }

    // 大学院生: undergraduate_classは黙って削除される
    #[test]
    fn test_graduate_strips_undergraduate_class() {
        let data = record(json!({
            "user_id": "u1",
            "university_status": "Graduate",
            "major": "Mechanical Engineering",
            "undergraduate_class": "Senior"
        }));
        let cleaned = validate_user_body(data).unwrap();
        assert!(!cleaned.contains_key("undergraduate_class"));
        assert_eq!(cleaned["major"], "Mechanical Engineering");
    }

    // 教職員: 学年・専攻の両方が削除される
    #[test]
    fn test_faculty_strips_class_and_major() {
        let data = record(json!({
            "user_id": "u1",
            "university_status": "Faculty",
            "undergraduate_class": "Freshman",
            "major": "Art"
        }));
        let cleaned = validate_user_body(data).unwrap();
        assert!(!cleaned.contains_key("undergraduate_class"));
        assert!(!cleaned.contains_key("major"));
    }

    // 未知のuniversity_statusは拒否される
    #[test]
    fn test_unknown_university_status() {
        let data = record(json!({
            "user_id": "u1",
            "university_status": "Alumni"
        }));
        let err = validate_user_body(data).unwrap_err();
        assert_eq!(
            err.to_string(),
            "The provided university_status ('Alumni') is not one of the valid statuses \
             (['Undergraduate', 'Graduate', 'Faculty'])."
        );
    }

    // 必須フィールド欠落
    #[test]
    fn test_missing_required_fields() {
        let data = record(json!({"user_id": "u1"}));
        let err = validate_user_body(data).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Missing at least one field from ['user_id', 'university_status'] in request body."
        );
    }

    // 不正なundergraduate_classは拒否される
    #[test]
    fn test_invalid_undergraduate_class() {
        let data = record(json!({
            "user_id": "u1",
            "university_status": "Undergraduate",
            "undergraduate_class": "Fifth Year",
            "major": "Physics"
        }));
        let err = validate_user_body(data).unwrap_err();
        assert!(err.to_string().contains("Fifth Year"));
        assert!(err
            .to_string()
            .contains("['Freshman', 'Sophomore', 'Junior', 'Senior']"));
    }
}
