//! ユーザー情報リソースのハンドラー
//!
//! usersテーブルはuser_idのみをキーとする単純なテーブルで、
//! 登録コンソールからのユーザー登録と参照・更新を受け持つ。

use serde_json::{json, Value};
use tracing::{error, info};

use crate::domain::{validate_user_body, RecordMap};
use crate::infrastructure::{
    scan_all, PutCondition, PutResult, RecordKey, RecordStore, DEFAULT_SCAN_LIMIT,
};

use super::http_event::{
    build_response, error_response, extract_parts, QueryParams, RestEvent, RestResponse,
    APOLOGY_MSG, SERVER_ERROR_MSG, USERS_PARAM_PATH, USERS_PATH,
};

/// ユーザー情報リクエストのハンドラー
pub struct UsersHandler<S: RecordStore> {
    store: S,
}

impl<S: RecordStore> UsersHandler<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// リクエストをメソッドとリソースパスで振り分ける
    ///
    /// どのエンドポイントにも一致しない場合は400（空ボディ）。
    pub async fn handle(&self, event: &RestEvent) -> RestResponse {
        let parts = match extract_parts(event) {
            Ok(parts) => parts,
            Err(response) => return response,
        };

        match (event.http_method.as_str(), event.resource.as_str()) {
            ("GET", USERS_PATH) => self.get_all_user_information(&parts.query).await,
            ("POST", USERS_PATH) => self.create_user_information(parts.data).await,
            ("GET", USERS_PARAM_PATH) => self.get_user_information(&parts.user_id).await,
            ("PATCH", USERS_PARAM_PATH) => {
                self.patch_user_information(&parts.user_id, parts.data).await
            }
            _ => build_response(400, &json!({})),
        }
    }

    /// 全ユーザー情報を返す
    async fn get_all_user_information(&self, query: &QueryParams) -> RestResponse {
        let limit = query.limit.unwrap_or(DEFAULT_SCAN_LIMIT);

        let users = match scan_all(&self.store, limit).await {
            Ok(users) => users,
            Err(e) => {
                error!(error = %e, "ユーザーテーブルのスキャンに失敗");
                return error_response(500, APOLOGY_MSG);
            }
        };

        build_response(200, &json!({ "users": users }))
    }

    /// 新しいユーザーを登録する
    async fn create_user_information(&self, data: RecordMap) -> RestResponse {
        let data = match validate_user_body(data) {
            Ok(data) => data,
            Err(e) => return error_response(400, &e.to_string()),
        };

        let user_id = data
            .get("user_id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        // 同じuser_idのレコードが存在する場合は書き込まない
        let condition = PutCondition::IfAttributeAbsent("user_id".to_string());
        match self.store.put(data, condition).await {
            Ok(PutResult::Stored) => {}
            Ok(PutResult::AlreadyExists) => {
                let error_msg = format!(
                    "User {} information already exists. Did you mean to update?",
                    user_id
                );
                return error_response(400, &error_msg);
            }
            Err(e) => {
                error!(error = %e, user_id = %user_id, "ユーザー登録のputに失敗");
                return error_response(500, SERVER_ERROR_MSG);
            }
        }

        info!(user_id = %user_id, "ユーザーを登録");
        build_response(201, &json!({}))
    }

    /// 指定ユーザーの情報を返す
    async fn get_user_information(&self, user_id: &str) -> RestResponse {
        let key = RecordKey::partition_only("user_id", user_id);
        let user = match self.store.get(&key).await {
            Ok(user) => user,
            Err(e) => {
                error!(error = %e, user_id = %user_id, "ユーザー情報の取得に失敗");
                return error_response(500, APOLOGY_MSG);
            }
        };

        match user {
            Some(user) => build_response(200, &Value::Object(user)),
            None => {
                let error_msg = format!(
                    "No information for the user {} could be found. Is there a typo?",
                    user_id
                );
                error_response(400, &error_msg)
            }
        }
    }

    /// 既存ユーザーの情報を更新する
    ///
    /// ユーザーが存在しない場合は失敗する。ボディのフィールドを
    /// 既存レコードに上書きマージし、マージ後のレコードを再検証する。
    async fn patch_user_information(&self, user_id: &str, data: RecordMap) -> RestResponse {
        let key = RecordKey::partition_only("user_id", user_id);
        let existing = match self.store.get(&key).await {
            Ok(existing) => existing,
            Err(e) => {
                error!(error = %e, user_id = %user_id, "ユーザー情報の取得に失敗");
                return error_response(500, APOLOGY_MSG);
            }
        };

        let Some(mut user) = existing else {
            let error_msg = format!(
                "User {} could not be found. Did you mean to add the user?",
                user_id
            );
            return error_response(400, &error_msg);
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

        for (field, value) in data {
            user.insert(field, value);
        }

        let user = match validate_user_body(user) {
            Ok(user) => user,
            Err(e) => return error_response(400, &e.to_string()),
        };

        if let Err(e) = self.store.put(user, PutCondition::None).await {
            error!(error = %e, user_id = %user_id, "ユーザー情報の更新に失敗");
            return error_response(500, APOLOGY_MSG);
        }

        info!(user_id = %user_id, "ユーザー情報を更新");
        build_response(204, &json!({}))
    }
}
