//! 資格情報リソースのハンドラー
//!
//! qualificationsテーブルは（user_id, last_updated）の複合キーを
//! 持ち、ユーザーごとに1件のレコードを保つ。更新時はlast_updatedが
//! 変わるため、新しいレコードをputしてから古いキーのレコードを
//! 削除する。

use serde_json::{json, Value};
use tracing::{error, info};

use crate::domain::{
    eastern_now, merge_completable_lists, validate_qualification_body, RecordMap,
    COMPLETABLE_LIST_FIELDS,
};
use crate::infrastructure::{
    query_all, scan_all, KeyQuery, PutCondition, RecordKey, RecordStore, DEFAULT_QUERY_LIMIT,
    DEFAULT_SCAN_LIMIT, GSI_ATTRIBUTE_NAME, GSI_SENTINEL, TIMESTAMP_INDEX,
};

use super::http_event::{
    build_response, error_response, extract_parts, QueryParams, RestEvent, RestResponse,
    APOLOGY_MSG, SERVER_ERROR_MSG, QUALIFICATIONS_PARAM_PATH, QUALIFICATIONS_PATH,
};

/// 資格情報リクエストのハンドラー
pub struct QualificationsHandler<S: RecordStore> {
    store: S,
}

impl<S: RecordStore> QualificationsHandler<S> {
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
            ("GET", QUALIFICATIONS_PATH) => {
                self.get_all_qualifications_information(&parts.query).await
            }
            ("POST", QUALIFICATIONS_PATH) => self.create_user_qualifications(parts.data).await,
            ("GET", QUALIFICATIONS_PARAM_PATH) => {
                self.get_user_qualifications(&parts.user_id).await
            }
            ("PATCH", QUALIFICATIONS_PARAM_PATH) => {
                self.patch_user_qualifications(&parts.user_id, parts.data)
                    .await
            }
            _ => build_response(400, &json!({})),
        }
    }

    /// 全資格情報を返す
    ///
    /// クエリパラメータがある場合はGSI経由でlast_updated順
    /// （新しい順）に検索する。
    async fn get_all_qualifications_information(&self, query: &QueryParams) -> RestResponse {
        let qualifications = if !query.is_empty() {
            let range = match query.range() {
                Ok(range) => range,
                Err(e) => return error_response(400, &e.to_string()),
            };
            let limit = query.limit.unwrap_or(DEFAULT_QUERY_LIMIT);

            let key_query = KeyQuery {
                partition: (GSI_ATTRIBUTE_NAME.to_string(), GSI_SENTINEL.to_string()),
                sort: range.map(|range| ("last_updated".to_string(), range)),
                index: Some(TIMESTAMP_INDEX.to_string()),
            };

            let items = match query_all(&self.store, &key_query, limit).await {
                Ok(items) => items,
                Err(e) => {
                    error!(error = %e, "資格情報のGSIクエリに失敗");
                    return error_response(500, SERVER_ERROR_MSG);
                }
            };

            // GSIはキーのみを射影するため、残りのデータを本体テーブルから取得する
            let mut qualifications = Vec::with_capacity(items.len());
            for item in &items {
                let user_id = item.get("user_id").and_then(Value::as_str).unwrap_or("");
                let last_updated = item
                    .get("last_updated")
                    .and_then(Value::as_str)
                    .unwrap_or("");

                let key = RecordKey::composite("user_id", user_id, "last_updated", last_updated);
                match self.store.get(&key).await {
                    Ok(Some(record)) => qualifications.push(record),
                    Ok(None) => continue,
                    Err(e) => {
                        error!(error = %e, user_id = %user_id, "資格情報の再取得に失敗");
                        return error_response(500, APOLOGY_MSG);
                    }
                }
            }
            qualifications
        } else {
            match scan_all(&self.store, DEFAULT_SCAN_LIMIT).await {
                Ok(qualifications) => qualifications,
                Err(e) => {
                    error!(error = %e, "資格情報テーブルのスキャンに失敗");
                    return error_response(500, APOLOGY_MSG);
                }
            }
        };

        build_response(200, &json!({ "qualifications": qualifications }))
    }

    /// 新しい資格情報を登録する
    async fn create_user_qualifications(&self, data: RecordMap) -> RestResponse {
        let mut data = match validate_qualification_body(data) {
            Ok(data) => data,
            Err(e) => return error_response(400, &e.to_string()),
        };

        let user_id = data
            .get("user_id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        // ユーザーごとに1件のレコードしか持てない
        match self.find_user_record(&user_id).await {
            Ok(Some(_)) => {
                let error_msg = format!(
                    "User {} qualifications already exist. Did you mean to update?",
                    user_id
                );
                return error_response(400, &error_msg);
            }
            Ok(None) => {}
            Err(response) => return response,
        }

        // 呼び出し元がlast_updatedを指定しない場合は現在の東部時間
        if !data.contains_key("last_updated") {
            data.insert("last_updated".to_string(), json!(eastern_now()));
        }
        data.insert(GSI_ATTRIBUTE_NAME.to_string(), json!(GSI_SENTINEL));

        if let Err(e) = self.store.put(data, PutCondition::None).await {
            error!(error = %e, user_id = %user_id, "資格情報のputに失敗");
            return error_response(500, SERVER_ERROR_MSG);
        }

        info!(user_id = %user_id, "資格情報を登録");
        build_response(201, &json!({}))
    }

    /// 指定ユーザーの資格情報を返す
    async fn get_user_qualifications(&self, user_id: &str) -> RestResponse {
        match self.find_user_record(user_id).await {
            Ok(Some(record)) => build_response(200, &Value::Object(record)),
            Ok(None) => {
                let error_msg = format!(
                    "No qualifications for the user {} could be found. Is there a typo?",
                    user_id
                );
                error_response(400, &error_msg)
            }
            Err(response) => response,
        }
    }

    /// 既存の資格情報を更新する
    ///
    /// 完了可能アイテムのリストは`name`同一性で和集合マージされる。
    /// 新しいlast_updatedでputした後、キーが変わった場合は古い
    /// レコードを削除する。
    async fn patch_user_qualifications(&self, user_id: &str, data: RecordMap) -> RestResponse {
        let existing = match self.find_user_record(user_id).await {
            Ok(Some(record)) => record,
            _ => {
                let error_msg = format!(
                    "User {} could not be found. Did you mean to add the user?",
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

        let old_last_updated = existing
            .get("last_updated")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        // 呼び出し元がlast_updatedを指定しない場合は現在の東部時間
        let new_last_updated = data
            .get("last_updated")
            .and_then(Value::as_str)
            .map(String::from)
            .unwrap_or_else(eastern_now);

        // 完了可能アイテムのリストは和集合マージ、それ以外は上書き
        let mut merged = existing;
        for (field, value) in data {
            if COMPLETABLE_LIST_FIELDS.contains(&field.as_str()) {
                let existing_list = merged.get(&field).cloned().unwrap_or_else(|| json!([]));
                merged.insert(field, merge_completable_lists(&existing_list, &value));
            } else {
                merged.insert(field, value);
            }
        }
        merged.insert("last_updated".to_string(), json!(new_last_updated));
        merged.insert(GSI_ATTRIBUTE_NAME.to_string(), json!(GSI_SENTINEL));

        let merged = match validate_qualification_body(merged) {
            Ok(merged) => merged,
            Err(e) => return error_response(400, &e.to_string()),
        };

        if let Err(e) = self.store.put(merged, PutCondition::None).await {
            error!(error = %e, user_id = %user_id, "資格情報の更新putに失敗");
            return error_response(500, APOLOGY_MSG);
        }

        // キーが変わった場合のみ古いレコードを削除する
        if old_last_updated != new_last_updated {
            let old_key =
                RecordKey::composite("user_id", user_id, "last_updated", &old_last_updated);
            if let Err(e) = self.store.delete(&old_key).await {
                error!(error = %e, user_id = %user_id, "古い資格情報の削除に失敗");
                return error_response(500, APOLOGY_MSG);
            }
        }

        info!(user_id = %user_id, last_updated = %new_last_updated, "資格情報を更新");
        build_response(204, &json!({}))
    }

    /// ユーザーの資格情報レコードを1件取得する
    ///
    /// テーブルはソートキーを持つため、get_itemではなくlimit 1の
    /// クエリで取得する。
    async fn find_user_record(&self, user_id: &str) -> Result<Option<RecordMap>, RestResponse> {
        let key_query = KeyQuery {
            partition: ("user_id".to_string(), user_id.to_string()),
            sort: None,
            index: None,
        };

        let mut items = query_all(&self.store, &key_query, 1).await.map_err(|e| {
            error!(error = %e, user_id = %user_id, "資格情報のクエリに失敗");
            error_response(500, APOLOGY_MSG)
        })?;

        Ok(items.pop())
    }
}
