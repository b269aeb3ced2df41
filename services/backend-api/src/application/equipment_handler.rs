//! 機器使用記録リソースのハンドラー
//!
//! equipmentテーブルは（user_id, timestamp）の複合キーを持つ。
//! PATCHはボディのtimestampで対象レコードを絞り込み、ちょうど1件に
//! 特定できた場合のみ更新する。

use serde_json::{json, Value};
use tracing::{error, info};

use crate::domain::{validate_equipment_body, RecordMap, TimestampRange};
use crate::infrastructure::{
    query_all, scan_all, KeyQuery, PutCondition, PutResult, RecordKey, RecordStore,
    RecordStoreError, DEFAULT_QUERY_LIMIT, DEFAULT_SCAN_LIMIT, GSI_ATTRIBUTE_NAME, GSI_SENTINEL,
    TIMESTAMP_INDEX,
};

use super::http_event::{
    build_response, error_response, extract_parts, QueryParams, RestEvent, RestResponse,
    APOLOGY_MSG, SERVER_ERROR_MSG, EQUIPMENT_PARAM_PATH, EQUIPMENT_PATH,
};

/// 機器使用記録リクエストのハンドラー
pub struct EquipmentHandler<S: RecordStore> {
    store: S,
}

impl<S: RecordStore> EquipmentHandler<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// リクエストをメソッドとリソースパスで振り分ける
    pub async fn handle(&self, event: &RestEvent) -> RestResponse {
        let parts = match extract_parts(event) {
            Ok(parts) => parts,
            Err(response) => return response,
        };

        match (event.http_method.as_str(), event.resource.as_str()) {
            ("GET", EQUIPMENT_PATH) => {
                self.get_all_equipment_usage_information(&parts.query).await
            }
            ("POST", EQUIPMENT_PATH) => self.create_user_equipment_usage(parts.data).await,
            ("GET", EQUIPMENT_PARAM_PATH) => {
                match self.get_user_equipment_usage(&parts.user_id, &parts.query).await {
                    Ok(equipment_logs) => {
                        build_response(200, &json!({ "equipment_logs": equipment_logs }))
                    }
                    Err(response) => response,
                }
            }
            ("PATCH", EQUIPMENT_PARAM_PATH) => {
                self.patch_user_equipment_usage(&parts.user_id, parts.data)
                    .await
            }
            _ => build_response(400, &json!({})),
        }
    }

    /// 全機器使用記録を返す
    async fn get_all_equipment_usage_information(&self, query: &QueryParams) -> RestResponse {
        let equipment_logs = if !query.is_empty() {
            let range = match query.range() {
                Ok(range) => range,
                Err(e) => return error_response(400, &e.to_string()),
            };
            let limit = query.limit.unwrap_or(DEFAULT_QUERY_LIMIT);

            let key_query = KeyQuery {
                partition: (GSI_ATTRIBUTE_NAME.to_string(), GSI_SENTINEL.to_string()),
                sort: range.map(|range| ("timestamp".to_string(), range)),
                index: Some(TIMESTAMP_INDEX.to_string()),
            };

            let items = match query_all(&self.store, &key_query, limit).await {
                Ok(items) => items,
                Err(e) => {
                    error!(error = %e, "機器使用記録のGSIクエリに失敗");
                    return error_response(500, SERVER_ERROR_MSG);
                }
            };

            // GSIはキーのみを射影するため、残りのデータを本体テーブルから取得する
            let mut equipment_logs = Vec::with_capacity(items.len());
            for item in &items {
                let user_id = item.get("user_id").and_then(Value::as_str).unwrap_or("");
                let timestamp = item.get("timestamp").and_then(Value::as_str).unwrap_or("");

                let key = RecordKey::composite("user_id", user_id, "timestamp", timestamp);
                match self.store.get(&key).await {
                    Ok(Some(log)) => equipment_logs.push(log),
                    Ok(None) => continue,
                    Err(e) => {
                        error!(error = %e, user_id = %user_id, "機器使用記録の再取得に失敗");
                        return error_response(500, APOLOGY_MSG);
                    }
                }
            }
            equipment_logs
        } else {
            match scan_all(&self.store, DEFAULT_SCAN_LIMIT).await {
                Ok(logs) => logs,
                Err(e) => {
                    error!(error = %e, "機器使用記録テーブルのスキャンに失敗");
                    return error_response(500, APOLOGY_MSG);
                }
            }
        };

        build_response(200, &json!({ "equipment_logs": equipment_logs }))
    }

    /// 新しい機器使用記録を追加する
    async fn create_user_equipment_usage(&self, data: RecordMap) -> RestResponse {
        let mut data = match validate_equipment_body(data) {
            Ok(data) => data,
            Err(e) => return error_response(400, &e.to_string()),
        };

        let user_id = data
            .get("user_id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let timestamp = data
            .get("timestamp")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        // GSI検索対象にするためセンチネルを強制する
        data.insert(GSI_ATTRIBUTE_NAME.to_string(), json!(GSI_SENTINEL));

        // 同じ（user_id, timestamp）のレコードが存在する場合は書き込まない
        let condition = PutCondition::IfAttributeAbsent("user_id".to_string());
        match self.store.put(data, condition).await {
            Ok(PutResult::Stored) => {}
            Ok(PutResult::AlreadyExists) => {
                let error_msg = format!(
                    "Equipment usage entry for user {} at timestamp {} already exists. \
                     Did you mean to input a different user or timestamp?",
                    user_id, timestamp
                );
                return error_response(400, &error_msg);
            }
            Err(e) => {
                error!(error = %e, user_id = %user_id, "機器使用記録のputに失敗");
                return error_response(500, SERVER_ERROR_MSG);
            }
        }

        info!(user_id = %user_id, timestamp = %timestamp, "機器使用記録を追加");
        build_response(201, &json!({}))
    }

    /// 指定ユーザーの機器使用記録を取得する
    ///
    /// 失敗した場合はそのまま返すべきレスポンスを`Err`で返す。
    async fn get_user_equipment_usage(
        &self,
        user_id: &str,
        query: &QueryParams,
    ) -> Result<Vec<RecordMap>, RestResponse> {
        // 正の値のlimitのみ有効
        let limit = query
            .limit
            .filter(|limit| *limit > 0)
            .unwrap_or(DEFAULT_QUERY_LIMIT);

        let range = query
            .range()
            .map_err(|e| error_response(400, &e.to_string()))?;

        let key_query = KeyQuery {
            partition: ("user_id".to_string(), user_id.to_string()),
            sort: range.map(|range: TimestampRange| ("timestamp".to_string(), range)),
            index: None,
        };

        query_all(&self.store, &key_query, limit)
            .await
            .map_err(|e: RecordStoreError| {
                error!(error = %e, user_id = %user_id, "機器使用記録のクエリに失敗");
                error_response(500, SERVER_ERROR_MSG)
            })
    }

    /// 既存の機器使用記録を更新する
    ///
    /// ボディにtimestampがある場合はそのタイムスタンプのレコードに
    /// 絞り込む。対象がちょうど1件に特定できない場合は失敗する。
    async fn patch_user_equipment_usage(&self, user_id: &str, mut data: RecordMap) -> RestResponse {
        // 更新対象を特定するクエリ（timestamp指定があれば一致条件で絞る)
        let narrowing = QueryParams {
            start_timestamp: data
                .get("timestamp")
                .and_then(Value::as_str)
                .map(String::from),
            end_timestamp: data
                .get("timestamp")
                .and_then(Value::as_str)
                .map(String::from),
            limit: Some(1),
        };

        let found = self.get_user_equipment_usage(user_id, &narrowing).await;
        let mut equipment_log = match found {
            Ok(logs) if logs.len() == 1 => logs.into_iter().next().unwrap_or_default(),
            _ => {
                let error_msg = format!(
                    "Equipment usage logs for {} could not be found. \
                     Did you mean to add a usage log?",
                    user_id
                );
                return error_response(400, &error_msg);
            }
        };

        // user_idフィールドの更新は常に禁止
        if data.contains_key("user_id") {
            let error_msg = format!(
                "Updating the 'user_id' field is not allowed. Please remove it before \
                 trying to update user {}'s information.",
                user_id
            );
            return error_response(400, &error_msg);
        }

        // timestampは対象の特定にのみ使い、更新内容には含めない
        data.remove("timestamp");
        data.insert(GSI_ATTRIBUTE_NAME.to_string(), json!(GSI_SENTINEL));

        for (field, value) in data {
            equipment_log.insert(field, value);
        }

        let equipment_log = match validate_equipment_body(equipment_log) {
            Ok(log) => log,
            Err(e) => return error_response(400, &e.to_string()),
        };

        if let Err(e) = self.store.put(equipment_log, PutCondition::None).await {
            error!(error = %e, user_id = %user_id, "機器使用記録の更新に失敗");
            return error_response(500, APOLOGY_MSG);
        }

        info!(user_id = %user_id, "機器使用記録を更新");
        build_response(204, &json!({}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::record_store::tests::MemoryRecordStore;
    use std::collections::HashMap;

    fn handler() -> EquipmentHandler<MemoryRecordStore> {
        EquipmentHandler::new(MemoryRecordStore::new("user_id", Some("timestamp")))
    }

    fn post_event(body: Value) -> RestEvent {
        RestEvent::with_body("POST", EQUIPMENT_PATH, &[], &body)
    }

    fn get_user_event(user_id: &str, query: &[(&str, &str)]) -> RestEvent {
        let mut event = RestEvent::get(EQUIPMENT_PARAM_PATH, query);
        let mut path_parameters = HashMap::new();
        path_parameters.insert("user_id".to_string(), user_id.to_string());
        event.path_parameters = Some(path_parameters);
        event
    }

    fn patch_event(user_id: &str, body: Value) -> RestEvent {
        RestEvent::with_body("PATCH", EQUIPMENT_PARAM_PATH, &[("user_id", user_id)], &body)
    }

    fn usage(user_id: &str, timestamp: &str) -> Value {
        json!({
            "user_id": user_id,
            "timestamp": timestamp,
            "location": "Watt",
            "project_name": "Chess Set",
            "project_type": "Personal",
            "equipment_type": "Hand Tools"
        })
    }

    // 追加 → ユーザー別取得の往復
    #[tokio::test]
    async fn test_create_then_get_usage() {
        let handler = handler();

        let response = handler
            .handle(&post_event(usage("jdoe", "2024-01-01T10:00:00")))
            .await;
        assert_eq!(response.status_code, 201);

        let response = handler.handle(&get_user_event("jdoe", &[])).await;
        assert_eq!(response.status_code, 200);
        let logs = response.body_json()["equipment_logs"]
            .as_array()
            .unwrap()
            .clone();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0]["project_name"], "Chess Set");
        assert_eq!(logs[0]["_ignore"], "1");
    }

    // 同じ（user_id, timestamp）の二重追加は400
    #[tokio::test]
    async fn test_create_duplicate_usage() {
        let handler = handler();
        handler
            .handle(&post_event(usage("jdoe", "2024-01-01T10:00:00")))
            .await;

        let response = handler
            .handle(&post_event(usage("jdoe", "2024-01-01T10:00:00")))
            .await;
        assert_eq!(response.status_code, 400);
        assert_eq!(
            response.body_json()["errorMsg"],
            "Equipment usage entry for user jdoe at timestamp 2024-01-01T10:00:00 \
             already exists. Did you mean to input a different user or timestamp?"
        );
    }

    // 検証エラーは400
    #[tokio::test]
    async fn test_create_missing_project_fields() {
        let handler = handler();
        let mut body = usage("jdoe", "2024-01-01T10:00:00");
        body["project_type"] = json!("Class");

        let response = handler.handle(&post_event(body)).await;
        assert_eq!(response.status_code, 400);
        assert!(response.body_json()["errorMsg"]
            .as_str()
            .unwrap()
            .contains("for a project_type value of 'Class'"));
    }

    // PATCHはtimestampで対象を特定し、フィールドをマージして204
    #[tokio::test]
    async fn test_patch_with_timestamp_narrowing() {
        let handler = handler();
        handler
            .handle(&post_event(usage("jdoe", "2024-01-01T10:00:00")))
            .await;
        handler
            .handle(&post_event(usage("jdoe", "2024-01-02T10:00:00")))
            .await;

        let response = handler
            .handle(&patch_event(
                "jdoe",
                json!({
                    "timestamp": "2024-01-01T10:00:00",
                    "project_name": "Lamp"
                }),
            ))
            .await;
        assert_eq!(response.status_code, 204);

        // 指定したタイムスタンプのレコードだけが更新されている
        let response = handler.handle(&get_user_event("jdoe", &[])).await;
        let logs = response.body_json()["equipment_logs"]
            .as_array()
            .unwrap()
            .clone();
        let first = logs
            .iter()
            .find(|l| l["timestamp"] == "2024-01-01T10:00:00")
            .unwrap();
        let second = logs
            .iter()
            .find(|l| l["timestamp"] == "2024-01-02T10:00:00")
            .unwrap();
        assert_eq!(first["project_name"], "Lamp");
        assert_eq!(second["project_name"], "Chess Set");
    }

    // 存在しないユーザーへのPATCHは400
    #[tokio::test]
    async fn test_patch_missing_usage() {
        let handler = handler();
        let response = handler
            .handle(&patch_event("ghost", json!({"project_name": "Lamp"})))
            .await;
        assert_eq!(response.status_code, 400);
        assert_eq!(
            response.body_json()["errorMsg"],
            "Equipment usage logs for ghost could not be found. \
             Did you mean to add a usage log?"
        );
    }

    // PATCHでuser_idは変更できない
    #[tokio::test]
    async fn test_patch_rejects_user_id() {
        let handler = handler();
        handler
            .handle(&post_event(usage("jdoe", "2024-01-01T10:00:00")))
            .await;

        let response = handler
            .handle(&patch_event(
                "jdoe",
                json!({"timestamp": "2024-01-01T10:00:00", "user_id": "other"}),
            ))
            .await;
        assert_eq!(response.status_code, 400);
        assert!(response.body_json()["errorMsg"]
            .as_str()
            .unwrap()
            .starts_with("Updating the 'user_id' field is not allowed."));
    }

    // マージ後のレコードも検証される（3Dプリンター情報の必須化）
    #[tokio::test]
    async fn test_patch_validates_merged_record() {
        let handler = handler();
        handler
            .handle(&post_event(usage("jdoe", "2024-01-01T10:00:00")))
            .await;

        // FDMプリンターに変更するには3d_printer_infoが必要
        let response = handler
            .handle(&patch_event(
                "jdoe",
                json!({
                    "timestamp": "2024-01-01T10:00:00",
                    "equipment_type": "FDM 3D Printer"
                }),
            ))
            .await;
        assert_eq!(response.status_code, 400);
        assert!(response.body_json()["errorMsg"]
            .as_str()
            .unwrap()
            .contains("3d_printer_info"));
    }

    // タイムスタンプ範囲での全件取得はGSI経由で新しい順
    #[tokio::test]
    async fn test_get_all_with_range() {
        let handler = handler();
        handler
            .handle(&post_event(usage("jdoe", "2024-01-01T10:00:00")))
            .await;
        handler
            .handle(&post_event(usage("asmith", "2024-01-03T10:00:00")))
            .await;

        let response = handler
            .handle(&RestEvent::get(
                EQUIPMENT_PATH,
                &[("start_timestamp", "2024-01-02T00:00:00")],
            ))
            .await;
        assert_eq!(response.status_code, 200);
        let logs = response.body_json()["equipment_logs"]
            .as_array()
            .unwrap()
            .clone();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0]["user_id"], "asmith");
    }

    // limit=0はデフォルトに置き換わる
    #[tokio::test]
    async fn test_get_user_zero_limit_uses_default() {
        let handler = handler();
        handler
            .handle(&post_event(usage("jdoe", "2024-01-01T10:00:00")))
            .await;

        let response = handler
            .handle(&get_user_event("jdoe", &[("limit", "0")]))
            .await;
        assert_eq!(response.status_code, 200);
        assert_eq!(
            response.body_json()["equipment_logs"]
                .as_array()
                .unwrap()
                .len(),
            1
        );
    }
}
