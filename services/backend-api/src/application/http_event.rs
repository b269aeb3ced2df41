//! API Gatewayプロキシ統合のイベント/レスポンス型
//!
//! 各リソースのLambdaが受け取るRESTイベントの解析と、
//! API Gatewayに返すレスポンスの構築を共通化する。

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;

use crate::domain::{RecordMap, TimestampRange, ValidationError};

// エンドポイントのパス定義
pub const USER_ENDPOINT: &str = "/{user_id}";
pub const USERS_PATH: &str = "/users";
pub const USERS_PARAM_PATH: &str = "/users/{user_id}";
pub const VISITS_PATH: &str = "/visits";
pub const VISITS_PARAM_PATH: &str = "/visits/{user_id}";
pub const EQUIPMENT_PATH: &str = "/equipment";
pub const EQUIPMENT_PARAM_PATH: &str = "/equipment/{user_id}";
pub const QUALIFICATIONS_PATH: &str = "/qualifications";
pub const QUALIFICATIONS_PARAM_PATH: &str = "/qualifications/{user_id}";

/// 予期しない失敗時の固定メッセージ（HTTP 500）
pub const APOLOGY_MSG: &str = "We're sorry, but something happened. Try again later.";

/// ストア操作の失敗時メッセージ（HTTP 500）
pub const SERVER_ERROR_MSG: &str = "Something went wrong on the server.";

/// 許可されたクエリパラメータ名
const VALID_QUERY_PARAMETERS: &[&str] = &["start_timestamp", "end_timestamp", "limit"];

/// API Gatewayプロキシ統合のRESTイベント
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RestEvent {
    /// HTTPメソッド（"GET", "POST", "PATCH"など）
    #[serde(rename = "httpMethod", default)]
    pub http_method: String,

    /// エンドポイントのリソースパス（パスパラメータは未解決の波括弧形式）
    #[serde(default)]
    pub resource: String,

    /// パスパラメータ名と値
    #[serde(rename = "pathParameters", default)]
    pub path_parameters: Option<HashMap<String, String>>,

    /// クエリパラメータ名と値
    #[serde(rename = "queryStringParameters", default)]
    pub query_string_parameters: Option<HashMap<String, String>>,

    /// リクエストボディ（JSON文字列）
    #[serde(default)]
    pub body: Option<String>,
}

impl RestEvent {
    /// GETイベントを構築する（ハンドラー間の内部呼び出し用）
    pub fn get(resource: &str, query: &[(&str, &str)]) -> Self {
        let query_string_parameters = if query.is_empty() {
            None
        } else {
            Some(
                query
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            )
        };
        Self {
            http_method: "GET".to_string(),
            resource: resource.to_string(),
            query_string_parameters,
            ..Default::default()
        }
    }

    /// ボディ付きイベントを構築する（ハンドラー間の内部呼び出し用）
    pub fn with_body(
        http_method: &str,
        resource: &str,
        path_parameters: &[(&str, &str)],
        body: &Value,
    ) -> Self {
        let path_parameters = if path_parameters.is_empty() {
            None
        } else {
            Some(
                path_parameters
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            )
        };
        Self {
            http_method: http_method.to_string(),
            resource: resource.to_string(),
            path_parameters,
            body: Some(body.to_string()),
            ..Default::default()
        }
    }
}

/// API Gatewayプロキシ統合のレスポンス
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RestResponse {
    /// HTTPステータスコード
    #[serde(rename = "statusCode")]
    pub status_code: u16,

    /// レスポンスヘッダー
    pub headers: HashMap<String, String>,

    /// レスポンスボディ（JSON文字列）
    pub body: String,
}

impl RestResponse {
    /// ボディをJSON値として取り出す
    pub fn body_json(&self) -> Value {
        serde_json::from_str(&self.body).unwrap_or(Value::Null)
    }
}

/// API Gatewayに返す有効なレスポンスを構築する
pub fn build_response(status_code: u16, body: &Value) -> RestResponse {
    let mut headers = HashMap::new();
    headers.insert("Content-Type".to_string(), "application/json".to_string());

    RestResponse {
        status_code,
        headers,
        body: body.to_string(),
    }
}

/// `{"errorMsg": ...}`形式のエラーレスポンスを構築する
pub fn error_response(status_code: u16, error_msg: &str) -> RestResponse {
    build_response(status_code, &json!({ "errorMsg": error_msg }))
}

/// 検証済みのクエリパラメータ
///
/// 許可リストにないパラメータと、数値に解釈できない`limit`は
/// 黙って捨てられる。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    pub start_timestamp: Option<String>,
    pub end_timestamp: Option<String>,
    pub limit: Option<usize>,
}

impl QueryParams {
    /// イベントからクエリパラメータを取り出す
    pub fn from_event(event: &RestEvent) -> Self {
        let Some(raw) = &event.query_string_parameters else {
            return Self::default();
        };

        Self {
            start_timestamp: raw
                .get(VALID_QUERY_PARAMETERS[0])
                .map(|v| v.to_string()),
            end_timestamp: raw.get(VALID_QUERY_PARAMETERS[1]).map(|v| v.to_string()),
            limit: raw
                .get(VALID_QUERY_PARAMETERS[2])
                .and_then(|v| v.parse::<usize>().ok()),
        }
    }

    /// 有効なパラメータが1つも無いか
    pub fn is_empty(&self) -> bool {
        self.start_timestamp.is_none() && self.end_timestamp.is_none() && self.limit.is_none()
    }

    /// タイムスタンプ範囲条件を構築する
    pub fn range(&self) -> Result<Option<TimestampRange>, ValidationError> {
        TimestampRange::from_query(
            self.start_timestamp.as_deref(),
            self.end_timestamp.as_deref(),
        )
    }
}

/// イベントから取り出した共通のリクエスト部品
#[derive(Debug, Clone, Default)]
pub struct RequestParts {
    /// パスパラメータのuser_id（パスに含まれない場合は空文字列）
    pub user_id: String,
    /// パース済みのリクエストボディ（ボディ不要のメソッドでは空）
    pub data: RecordMap,
    /// 検証済みのクエリパラメータ
    pub query: QueryParams,
}

/// イベントからuser_id・ボディ・クエリパラメータを取り出す
///
/// 失敗した場合はそのまま返すべきレスポンスを`Err`で返す:
/// - user_idに'@'が含まれる → 400
/// - POST/PATCHでボディが無い → 400
/// - ボディがJSONとして解釈できない → 500（固定の謝罪メッセージ）
pub fn extract_parts(event: &RestEvent) -> Result<RequestParts, RestResponse> {
    let method_requires_body = ["POST", "PATCH"];

    // パスにuser_idが含まれる場合は取り出す
    let mut user_id = String::new();
    if event.resource.contains(USER_ENDPOINT) {
        user_id = event
            .path_parameters
            .as_ref()
            .and_then(|params| params.get("user_id"))
            .cloned()
            .ok_or_else(|| error_response(500, APOLOGY_MSG))?;

        // user_idにメールアドレスは使えない
        if user_id.contains('@') {
            return Err(error_response(400, "user_id can't be an email."));
        }
    }

    // ボディが必要なメソッドの場合は取り出してパースする
    let mut data = RecordMap::new();
    if method_requires_body.contains(&event.http_method.as_str()) {
        let Some(raw_body) = &event.body else {
            let error_msg = format!(
                "REST method {} requires a request body.",
                event.http_method
            );
            return Err(error_response(400, &error_msg));
        };

        data = serde_json::from_str::<RecordMap>(raw_body)
            .map_err(|_| error_response(500, APOLOGY_MSG))?;
    }

    Ok(RequestParts {
        user_id,
        data,
        query: QueryParams::from_event(event),
    })
}
