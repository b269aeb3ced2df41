// BridgeClient - Tiger Training（Bridge LMS）用HTTPクライアント
//
// プログラムに含まれるコースの一覧と、各コースの受講登録
// （完了状態と更新時刻）を取得する。

use async_trait::async_trait;
use reqwest::Client;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info};

use super::config::BridgeConfig;

/// 最大再試行回数
const MAX_RETRIES: u32 = 3;

/// リクエストタイムアウト（秒）
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// 接続タイムアウト（秒）
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// BridgeClient用エラー型
#[derive(Debug, Error)]
pub enum BridgeClientError {
    /// HTTPエラー（ステータスコード付き）
    #[error("HTTPエラー: status={status}, message={message}")]
    HttpError {
        /// HTTPステータスコード
        status: u16,
        /// エラーメッセージ
        message: String,
    },

    /// ネットワークエラー
    #[error("ネットワークエラー: {0}")]
    NetworkError(String),

    /// レスポンスのデシリアライズエラー
    #[error("デシリアライズエラー: {0}")]
    DeserializationError(String),
}

/// プログラムに含まれるコース
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeCourse {
    /// コースID
    pub id: u64,
    /// コース名（タイトル）
    pub name: String,
}

/// 受講登録に紐づく学習者
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeLearner {
    /// Bridge内部の学習者ID
    pub id: String,
    /// 学習者のメールアドレス
    pub email: String,
}

/// コースの受講登録1件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeEnrollment {
    /// 学習者ID（`BridgeLearner::id`に対応）
    pub learner_id: String,
    /// 受講状態（"complete"など）
    pub state: String,
    /// 最終更新時刻（ISO 8601、オフセット付き）
    pub updated_at: String,
}

/// コースの受講登録の取得結果
#[derive(Debug, Clone, Default)]
pub struct CourseEnrollments {
    /// レスポンスにリンクされた学習者
    pub learners: Vec<BridgeLearner>,
    /// 受講登録
    pub enrollments: Vec<BridgeEnrollment>,
}

/// Bridge API用トレイト
///
/// 異なる実装を可能にします（実際のBridge API、テスト用モック）。
#[async_trait]
pub trait BridgeApi: Send + Sync {
    /// プログラムに含まれるコースの一覧を取得
    async fn program_courses(
        &self,
        program_id: u64,
    ) -> Result<Vec<BridgeCourse>, BridgeClientError>;

    /// コースの受講登録を取得
    ///
    /// `updated_after`以降に更新された受講登録のみが返る。
    async fn course_enrollments(
        &self,
        course_id: u64,
        updated_after: &str,
    ) -> Result<CourseEnrollments, BridgeClientError>;
}

/// BridgeApiのHTTP実装
#[derive(Clone)]
pub struct BridgeClient {
    /// HTTPクライアント（再試行ミドルウェア付き）
    client: ClientWithMiddleware,
    /// Bridge APIのベースURL
    bridge_url: String,
    /// Basic認証トークン
    auth_token: String,
}

impl std::fmt::Debug for BridgeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeClient")
            .field("bridge_url", &self.bridge_url)
            .finish_non_exhaustive()
    }
}

impl BridgeClient {
    /// 設定からBridgeClientを作成
    pub fn new(config: &BridgeConfig) -> Self {
        info!(bridge_url = config.bridge_url(), "BridgeClientを初期化");

        let base_client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .expect("HTTPクライアントの構築に失敗");

        // 指数バックオフ再試行ポリシー
        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(MAX_RETRIES);

        let client = ClientBuilder::new(base_client)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Self {
            client,
            bridge_url: config.bridge_url().trim_end_matches('/').to_string(),
            auth_token: config.auth_token(),
        }
    }

    /// プログラム取得エンドポイントURLを構築
    fn program_url(&self, program_id: u64) -> String {
        format!("{}/api/author/programs/{}", self.bridge_url, program_id)
    }

    /// 受講登録取得エンドポイントURLを構築
    fn enrollments_url(&self, course_id: u64, updated_after: &str) -> String {
        format!(
            "{}/api/author/course_templates/{}/enrollments?updated_after={}",
            self.bridge_url, course_id, updated_after
        )
    }

    /// GETリクエストを送り、JSONボディを返す
    async fn get_json(&self, url: &str) -> Result<Value, BridgeClientError> {
        debug!(url = %url, "Bridge APIへGETリクエスト");

        let response = self
            .client
            .get(url)
            .header("Authorization", format!("Basic {}", self.auth_token))
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, url = %url, "Bridge APIリクエスト失敗");
                BridgeClientError::NetworkError(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %body, "Bridge APIエラーレスポンス");
            return Err(BridgeClientError::HttpError {
                status: status.as_u16(),
                message: body,
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| BridgeClientError::DeserializationError(e.to_string()))
    }
}

/// JSONのID値（数値または文字列）を文字列に変換する
fn value_as_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// JSONのID値（数値または文字列）をu64に変換する
fn value_as_numeric_id(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse::<u64>().ok(),
        _ => None,
    }
}

/// プログラムレスポンスからコース一覧を抽出する
fn parse_program_courses(body: &Value) -> Result<Vec<BridgeCourse>, BridgeClientError> {
    let items = body
        .get("programs")
        .and_then(|v| v.get(0))
        .and_then(|v| v.get("items"))
        .and_then(|v| v.as_array())
        .ok_or_else(|| {
            BridgeClientError::DeserializationError(
                "programs[0].items missing in program response".to_string(),
            )
        })?;

    let mut courses = Vec::new();
    for item in items {
        let id = item.get("id").and_then(value_as_numeric_id).ok_or_else(|| {
            BridgeClientError::DeserializationError("course id missing or invalid".to_string())
        })?;
        let name = item
            .get("title")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                BridgeClientError::DeserializationError("course title missing".to_string())
            })?
            .to_string();
        courses.push(BridgeCourse { id, name });
    }

    Ok(courses)
}

/// 受講登録レスポンスから学習者と受講登録を抽出する
fn parse_course_enrollments(body: &Value) -> Result<CourseEnrollments, BridgeClientError> {
    let mut result = CourseEnrollments::default();

    let linked_learners = body
        .get("linked")
        .and_then(|v| v.get("learners"))
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();
    for learner in &linked_learners {
        let id = learner.get("id").and_then(value_as_id).ok_or_else(|| {
            BridgeClientError::DeserializationError("learner id missing".to_string())
        })?;
        let email = learner
            .get("email")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                BridgeClientError::DeserializationError("learner email missing".to_string())
            })?
            .to_string();
        result.learners.push(BridgeLearner { id, email });
    }

    let enrollments = body
        .get("enrollments")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();
    for enrollment in &enrollments {
        let learner_id = enrollment
            .get("links")
            .and_then(|v| v.get("learner"))
            .and_then(|v| v.get("id"))
            .and_then(value_as_id)
            .ok_or_else(|| {
                BridgeClientError::DeserializationError(
                    "enrollment learner link missing".to_string(),
                )
            })?;
        let state = enrollment
            .get("state")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let updated_at = enrollment
            .get("updated_at")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                BridgeClientError::DeserializationError(
                    "enrollment updated_at missing".to_string(),
                )
            })?
            .to_string();
        result.enrollments.push(BridgeEnrollment {
            learner_id,
            state,
            updated_at,
        });
    }

    Ok(result)
}

#[async_trait]
impl BridgeApi for BridgeClient {
    async fn program_courses(
        &self,
        program_id: u64,
    ) -> Result<Vec<BridgeCourse>, BridgeClientError> {
        let body = self.get_json(&self.program_url(program_id)).await?;
        parse_program_courses(&body)
    }

    async fn course_enrollments(
        &self,
        course_id: u64,
        updated_after: &str,
    ) -> Result<CourseEnrollments, BridgeClientError> {
        let body = self
            .get_json(&self.enrollments_url(course_id, updated_after))
            .await?;
        parse_course_enrollments(&body)
    }
}
