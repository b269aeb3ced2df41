//! 機器使用記録リクエストボディのバリデーター
//!
//! `project_type`と`equipment_type`の2つの判別フィールドを持ち、
//! それぞれの値ごとに必須/禁止フィールドを適用する。

use super::timestamp::validate_timestamp;
use super::validation::{
    all_keys_present, check_and_clean_request_fields, fmt_field_list, FieldCheck, RecordMap,
    ValidationError,
};

/// 機器使用記録の必須フィールド
const REQUIRED_FIELDS: &[&str] = &[
    "user_id",
    "timestamp",
    "location",
    "project_name",
    "project_type",
    "equipment_type",
];

/// 3Dプリンター情報オブジェクトのフィールド名
const PRINTER_INFO_FIELD: &str = "3d_printer_info";

/// `3d_printer_info`オブジェクトの必須フィールド
const PRINTER_INFO_FIELDS: &[&str] = &[
    "printer_name",
    "print_duration",
    "print_mass",
    "print_mass_estimate",
    "print_status",
    "print_notes",
];

/// プロジェクト区分
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectType {
    Personal,
    Class,
    Club,
}

impl ProjectType {
    /// 有効なプロジェクト区分の表記
    pub const VALID_VALUES: &[&str] = &["Personal", "Class", "Club"];

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Personal" => Some(ProjectType::Personal),
            "Class" => Some(ProjectType::Class),
            "Club" => Some(ProjectType::Club),
            _ => None,
        }
    }

    /// プロジェクト区分ごとの必須/禁止フィールド
    pub fn field_check(&self) -> FieldCheck {
        match self {
            ProjectType::Personal => FieldCheck {
                required: &[],
                disallowed: &[
                    "class_number",
                    "faculty_name",
                    "project_sponsor",
                    "organization_affiliation",
                ],
            },
            ProjectType::Class => FieldCheck {
                required: &["class_number", "faculty_name", "project_sponsor"],
                disallowed: &["organization_affiliation"],
            },
            ProjectType::Club => FieldCheck {
                required: &["organization_affiliation"],
                disallowed: &["class_number", "faculty_name", "project_sponsor"],
            },
        }
    }
}

/// 機器区分
///
/// 現状、収集データに差があるのは3Dプリンター系のみ。
/// `FDM 3D Printer`と`SLA Printer`は`3d_printer_info`が必須で、
/// それ以外の機器では禁止される。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EquipmentType {
    Fdm3dPrinter,
    SlaPrinter,
    LaserEngraver,
    Glowforge,
    FabricPrinter,
    VinylCutter,
    ButtonMaker,
    Scanner3d,
    HandTools,
    StickerPrinter,
    EmbroideryMachine,
}

impl EquipmentType {
    /// 有効な機器区分の表記（エラーメッセージ用の順序で）
    pub const VALID_VALUES: &[&str] = &[
        "FDM 3D Printer",
        "SLA Printer",
        "Laser Engraver",
        "Glowforge",
        "Fabric Printer",
        "Vinyl Cutter",
        "Button Maker",
        "3D Scanner",
        "Hand Tools",
        "Sticker Printer",
        "Embroidery Machine",
    ];

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "FDM 3D Printer" => Some(EquipmentType::Fdm3dPrinter),
            "SLA Printer" => Some(EquipmentType::SlaPrinter),
            "Laser Engraver" => Some(EquipmentType::LaserEngraver),
            "Glowforge" => Some(EquipmentType::Glowforge),
            "Fabric Printer" => Some(EquipmentType::FabricPrinter),
            "Vinyl Cutter" => Some(EquipmentType::VinylCutter),
            "Button Maker" => Some(EquipmentType::ButtonMaker),
            "3D Scanner" => Some(EquipmentType::Scanner3d),
            "Hand Tools" => Some(EquipmentType::HandTools),
            "Sticker Printer" => Some(EquipmentType::StickerPrinter),
            "Embroidery Machine" => Some(EquipmentType::EmbroideryMachine),
            _ => None,
        }
    }

    /// 機器区分ごとの必須/禁止フィールド
    pub fn field_check(&self) -> FieldCheck {
        match self {
            EquipmentType::Fdm3dPrinter | EquipmentType::SlaPrinter => FieldCheck {
                required: &[PRINTER_INFO_FIELD],
                disallowed: &[],
            },
            _ => FieldCheck {
                required: &[],
                disallowed: &[PRINTER_INFO_FIELD],
            },
        }
    }
}

/// 機器使用記録リクエストボディを検証し、クリーニング済みボディを返す
pub fn validate_equipment_body(data: RecordMap) -> Result<RecordMap, ValidationError> {
    // 必須フィールドの存在確認
    if !all_keys_present(REQUIRED_FIELDS, &data) {
        let error_msg = format!(
            "Missing at least one field from {} in request body.",
            fmt_field_list(REQUIRED_FIELDS)
        );
        return Err(ValidationError::InvalidRequestBody(error_msg));
    }

    // project_typeが定義済みの値であること
    let project_type_value = data
        .get("project_type")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();
    let Some(project_type) = ProjectType::parse(&project_type_value) else {
        let error_msg = format!(
            "project_type {} is not one of the valid project types {}.",
            project_type_value,
            fmt_field_list(ProjectType::VALID_VALUES)
        );
        return Err(ValidationError::InvalidRequestBody(error_msg));
    };

    // equipment_typeが定義済みの値であること
    let equipment_type_value = data
        .get("equipment_type")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();
    let Some(equipment_type) = EquipmentType::parse(&equipment_type_value) else {
        let error_msg = format!(
            "equipment_type {} is not one of the valid equipment types {}.",
            equipment_type_value,
            fmt_field_list(EquipmentType::VALID_VALUES)
        );
        return Err(ValidationError::InvalidRequestBody(error_msg));
    };

    // project_typeに応じたフィールドのチェックとクリーニング
    let checking_fields = project_type.field_check();
    let data = check_and_clean_request_fields(data, &checking_fields).map_err(|_| {
        let error_msg = format!(
            "Missing at least one field from {} for a project_type value of '{}'.",
            fmt_field_list(checking_fields.required),
            project_type_value
        );
        ValidationError::InvalidRequestBody(error_msg)
    })?;

    // equipment_typeに応じたフィールドのチェックとクリーニング
    let checking_fields = equipment_type.field_check();
    let data = check_and_clean_request_fields(data, &checking_fields).map_err(|_| {
        let error_msg = format!(
            "Missing at least one field from {} for a equipment_type value of '{}'.",
            fmt_field_list(checking_fields.required),
            equipment_type_value
        );
        ValidationError::InvalidRequestBody(error_msg)
    })?;

    // 3d_printer_infoオブジェクトの中身を確認する（残っている場合のみ）
    if let Some(printer_info) = data.get(PRINTER_INFO_FIELD) {
        let all_present = printer_info
            .as_object()
            .map(|info| all_keys_present(PRINTER_INFO_FIELDS, info))
            .unwrap_or(false);
        if !all_present {
            let error_msg = format!(
                "Missing at least one field from {} in the '{}' object in the request body.",
                fmt_field_list(PRINTER_INFO_FIELDS),
                PRINTER_INFO_FIELD
            );
            return Err(ValidationError::InvalidRequestBody(error_msg));
        }
    }

    // タイムスタンプの形式確認
    let timestamp = data.get("timestamp").and_then(|v| v.as_str()).unwrap_or("");
    validate_timestamp(timestamp)?;

    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: serde_json::Value) -> RecordMap {
        value.as_object().unwrap().clone()
    }

    fn printer_info() -> serde_json::Value {
        json!({
            "printer_name": "Prusa MK4",
            "print_duration": "02:30:00",
            "print_mass": "50",
            "print_mass_estimate": "55",
            "print_status": "Success",
            "print_notes": ""
        })
    }

    // 個人プロジェクトのFDM印刷は有効
    #[test]
    fn test_valid_personal_fdm_print() {
        let data = record(json!({
            "user_id": "u1",
            "timestamp": "2024-01-01T10:00:00",
            "location": "Watt",
            "project_name": "Chess Set",
            "project_type": "Personal",
            "equipment_type": "FDM 3D Printer",
            "3d_printer_info": printer_info()
        }));
        assert!(validate_equipment_body(data).is_ok());
    }

    // 授業プロジェクトはclass_number等が必須
    #[test]
    fn test_class_project_missing_fields() {
        let data = record(json!({
            "user_id": "u1",
            "timestamp": "2024-01-01T10:00:00",
            "location": "Watt",
            "project_name": "Bridge Model",
            "project_type": "Class",
            "equipment_type": "Hand Tools"
        }));
        let err = validate_equipment_body(data).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Missing at least one field from ['class_number', 'faculty_name', \
             'project_sponsor'] for a project_type value of 'Class'."
        );
    }

    // 個人プロジェクトでは授業・クラブ関連フィールドが削除される
    #[test]
    fn test_personal_project_strips_class_fields() {
        let data = record(json!({
            "user_id": "u1",
            "timestamp": "2024-01-01T10:00:00",
            "location": "Cooper",
            "project_name": "Lamp",
            "project_type": "Personal",
            "equipment_type": "Laser Engraver",
            "class_number": "ME-2010",
            "organization_affiliation": "Robotics Club"
        }));
        let cleaned = validate_equipment_body(data).unwrap();
        assert!(!cleaned.contains_key("class_number"));
        assert!(!cleaned.contains_key("organization_affiliation"));
    }

    // 3Dプリンター以外では3d_printer_infoが削除される
    #[test]
    fn test_non_printer_strips_printer_info() {
        let data = record(json!({
            "user_id": "u1",
            "timestamp": "2024-01-01T10:00:00",
            "location": "Watt",
            "project_name": "Sticker",
            "project_type": "Personal",
            "equipment_type": "Sticker Printer",
            "3d_printer_info": printer_info()
        }));
        let cleaned = validate_equipment_body(data).unwrap();
        assert!(!cleaned.contains_key("3d_printer_info"));
    }

    // SLAプリンターは3d_printer_infoが必須
    #[test]
    fn test_sla_printer_requires_printer_info() {
        let data = record(json!({
            "user_id": "u1",
            "timestamp": "2024-01-01T10:00:00",
            "location": "Watt",
            "project_name": "Miniature",
            "project_type": "Personal",
            "equipment_type": "SLA Printer"
        }));
        let err = validate_equipment_body(data).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Missing at least one field from ['3d_printer_info'] for a equipment_type \
             value of 'SLA Printer'."
        );
    }

    // 3d_printer_infoの中身が不完全ならエラー
    #[test]
    fn test_incomplete_printer_info() {
        let data = record(json!({
            "user_id": "u1",
            "timestamp": "2024-01-01T10:00:00",
            "location": "Watt",
            "project_name": "Chess Set",
            "project_type": "Personal",
            "equipment_type": "FDM 3D Printer",
            "3d_printer_info": {"printer_name": "Prusa MK4"}
        }));
        let err = validate_equipment_body(data).unwrap_err();
        assert!(err
            .to_string()
            .contains("in the '3d_printer_info' object in the request body"));
    }

    // 未知のproject_type
    #[test]
    fn test_unknown_project_type() {
        let data = record(json!({
            "user_id": "u1",
            "timestamp": "2024-01-01T10:00:00",
            "location": "Watt",
            "project_name": "X",
            "project_type": "Research",
            "equipment_type": "Hand Tools"
        }));
        let err = validate_equipment_body(data).unwrap_err();
        assert_eq!(
            err.to_string(),
            "project_type Research is not one of the valid project types \
             ['Personal', 'Class', 'Club']."
        );
    }

    // 未知のequipment_type
    #[test]
    fn test_unknown_equipment_type() {
        let data = record(json!({
            "user_id": "u1",
            "timestamp": "2024-01-01T10:00:00",
            "location": "Watt",
            "project_name": "X",
            "project_type": "Personal",
            "equipment_type": "CNC Mill"
        }));
        let err = validate_equipment_body(data).unwrap_err();
        assert!(err
            .to_string()
            .starts_with("equipment_type CNC Mill is not one of the valid equipment types"));
    }

    // タイムスタンプはクリーニング後に最後に検証される
    #[test]
    fn test_invalid_timestamp() {
        let data = record(json!({
            "user_id": "u1",
            "timestamp": "yesterday",
            "location": "Watt",
            "project_name": "X",
            "project_type": "Personal",
            "equipment_type": "Hand Tools"
        }));
        let err = validate_equipment_body(data).unwrap_err();
        assert!(err.to_string().contains("approved format"));
    }
}
