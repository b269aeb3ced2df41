//! 入退室記録リソースのハンドラー
//!
//! visitsテーブルは（user_id, timestamp）の複合キーを持つ。
//! タイムスタンプによる全件検索はGSI（TimestampIndex）を経由し、
//! GSIの射影にはキーしか含まれないため本体テーブルを再参照する。

use serde_json::{json, Value};
use tracing::{error, info};

use crate::domain::{validate_visit_body, RecordMap, TimestampRange};
use crate::infrastructure::{
    query_all, scan_all, KeyQuery, PutCondition, PutResult, RecordKey, RecordStore,
    DEFAULT_QUERY_LIMIT, DEFAULT_SCAN_LIMIT, GSI_ATTRIBUTE_NAME, GSI_SENTINEL, TIMESTAMP_INDEX,
};

use super::http_event::{
    build_response, error_response, extract_parts, QueryParams, RestEvent, RestResponse,
    APOLOGY_MSG, SERVER_ERROR_MSG, VISITS_PARAM_PATH, VISITS_PATH,
};

/// 入退室記録リクエストのハンドラー
pub struct VisitsHandler<S: RecordStore> {
    store: S,
}

impl<S: RecordStore> VisitsHandler<S> {
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
            ("GET", VISITS_PATH) => self.get_all_visit_information(&parts.query).await,
            ("POST", VISITS_PATH) => self.create_user_visit_information(parts.data).await,
            ("GET", VISITS_PARAM_PATH) => {
                self.get_user_visit_information(&parts.user_id, &parts.query)
                    .await
            }
            _ => build_response(400, &json!({})),
        }
    }

    /// 全入退室記録を返す
    ///
    /// クエリパラメータがある場合はGSI経由でタイムスタンプ検索し、
    /// 無い場合はテーブル全体をスキャンする。
    async fn get_all_visit_information(&self, query: &QueryParams) -> RestResponse {
        let visits = if !query.is_empty() {
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
                    error!(error = %e, "入退室記録のGSIクエリに失敗");
                    return error_response(500, SERVER_ERROR_MSG);
                }
            };

            // GSIはキーのみを射影するため、残りのデータを本体テーブルから取得する
            match self.fetch_full_records(&items).await {
                Ok(visits) => visits,
                Err(response) => return response,
            }
        } else {
            match scan_all(&self.store, DEFAULT_SCAN_LIMIT).await {
                Ok(visits) => visits,
                Err(e) => {
                    error!(error = %e, "入退室記録テーブルのスキャンに失敗");
                    return error_response(500, APOLOGY_MSG);
                }
            }
        };

        build_response(200, &json!({ "visits": visits }))
    }

    /// GSIクエリ結果の各キーについて本体テーブルのレコードを取得する
    async fn fetch_full_records(
        &self,
        items: &[RecordMap],
    ) -> Result<Vec<RecordMap>, RestResponse> {
        let mut visits = Vec::with_capacity(items.len());
        for item in items {
            let user_id = item.get("user_id").and_then(Value::as_str).unwrap_or("");
            let timestamp = item.get("timestamp").and_then(Value::as_str).unwrap_or("");

            let key = RecordKey::composite("user_id", user_id, "timestamp", timestamp);
            match self.store.get(&key).await {
                Ok(Some(visit)) => visits.push(visit),
                // GSIと本体の一時的なずれは無視する
                Ok(None) => continue,
                Err(e) => {
                    error!(error = %e, user_id = %user_id, "入退室記録の再取得に失敗");
                    return Err(error_response(500, APOLOGY_MSG));
                }
            }
        }
        Ok(visits)
    }

    /// 新しい入退室記録を追加する
    async fn create_user_visit_information(&self, data: RecordMap) -> RestResponse {
        let mut data = match validate_visit_body(data) {
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
                    "Visit entry for user {} at timestamp {} already exists. \
                     Did you mean to input a different user or timestamp?",
                    user_id, timestamp
                );
                return error_response(400, &error_msg);
            }
            Err(e) => {
                error!(error = %e, user_id = %user_id, "入退室記録のputに失敗");
                return error_response(500, SERVER_ERROR_MSG);
            }
        }

        info!(user_id = %user_id, timestamp = %timestamp, "入退室記録を追加");
        build_response(201, &json!({}))
    }

    /// 指定ユーザーの入退室記録を返す
    async fn get_user_visit_information(
        &self,
        user_id: &str,
        query: &QueryParams,
    ) -> RestResponse {
        let range = match query.range() {
            Ok(range) => range,
            Err(e) => return error_response(400, &e.to_string()),
        };
        let limit = query.limit.unwrap_or(DEFAULT_QUERY_LIMIT);

        let key_query = KeyQuery {
            partition: ("user_id".to_string(), user_id.to_string()),
            sort: range.map(|range: TimestampRange| ("timestamp".to_string(), range)),
            index: None,
        };

        let visits = match query_all(&self.store, &key_query, limit).await {
            Ok(visits) => visits,
            Err(e) => {
                error!(error = %e, user_id = %user_id, "入退室記録のクエリに失敗");
                return error_response(500, SERVER_ERROR_MSG);
            }
        };

        build_response(200, &json!({ "visits": visits }))
    }
}
