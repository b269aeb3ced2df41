/// DynamoDBテーブルとBridge API接続設定
use aws_sdk_dynamodb::Client as DynamoDbClient;
use base64::prelude::{Engine, BASE64_STANDARD};
use thiserror::Error;

/// 設定読み込みのエラー型
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// テーブル名とクライアントを持つDynamoDB設定
///
/// 各Lambdaは自分が扱うテーブル名を環境変数で受け取る:
/// - USERS_TABLE_NAME: ユーザー情報テーブル
/// - VISITS_TABLE_NAME: 入退室記録テーブル
/// - EQUIPMENT_TABLE_NAME: 機器使用記録テーブル
/// - QUALIFICATIONS_TABLE_NAME: 資格情報テーブル
#[derive(Debug, Clone)]
pub struct TableConfig {
    /// DynamoDBクライアントインスタンス
    client: DynamoDbClient,
    /// テーブル名
    table_name: String,
}

impl TableConfig {
    /// 環境からAWS設定を読み込み、指定された環境変数からテーブル名を読み取る
    pub async fn from_env(table_env: &str) -> Result<Self, ConfigError> {
        // 環境からAWS設定を読み込み（認証情報、リージョンなど）
        let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        let client = DynamoDbClient::new(&aws_config);

        let table_name = std::env::var(table_env)
            .map_err(|_| ConfigError::MissingEnvVar(table_env.to_string()))?;

        Ok(Self { client, table_name })
    }

    /// 明示的な値で新しいTableConfigを作成（テスト用）
    pub fn new(client: DynamoDbClient, table_name: String) -> Self {
        Self { client, table_name }
    }

    /// DynamoDBクライアントへの参照を取得
    pub fn client(&self) -> &DynamoDbClient {
        &self.client
    }

    /// テーブル名を取得
    pub fn table_name(&self) -> &str {
        &self.table_name
    }
}

/// Bridge API（Tiger Training）接続設定
///
/// 環境変数:
/// - BRIDGE_URL: Bridge APIのベースURL
/// - BRIDGE_KEY / BRIDGE_SECRET: Basic認証のキーペア
/// - BRIDGE_PROGRAM_ID: 同期対象プログラムのID
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    bridge_url: String,
    key: String,
    secret: String,
    program_id: u64,
}

impl BridgeConfig {
    /// 環境変数からBridge設定を読み込む
    pub fn from_env() -> Result<Self, ConfigError> {
        let bridge_url = std::env::var("BRIDGE_URL")
            .map_err(|_| ConfigError::MissingEnvVar("BRIDGE_URL".to_string()))?;
        let key = std::env::var("BRIDGE_KEY")
            .map_err(|_| ConfigError::MissingEnvVar("BRIDGE_KEY".to_string()))?;
        let secret = std::env::var("BRIDGE_SECRET")
            .map_err(|_| ConfigError::MissingEnvVar("BRIDGE_SECRET".to_string()))?;

        let program_id_raw = std::env::var("BRIDGE_PROGRAM_ID")
            .map_err(|_| ConfigError::MissingEnvVar("BRIDGE_PROGRAM_ID".to_string()))?;
        let program_id = program_id_raw.parse::<u64>().map_err(|_| {
            ConfigError::InvalidEnvVar("BRIDGE_PROGRAM_ID".to_string(), program_id_raw.clone())
        })?;

        Ok(Self {
            bridge_url,
            key,
            secret,
            program_id,
        })
    }

    /// 明示的な値で新しいBridgeConfigを作成（テスト用）
    pub fn new(bridge_url: String, key: String, secret: String, program_id: u64) -> Self {
        Self {
            bridge_url,
            key,
            secret,
            program_id,
        }
    }

    /// Bridge APIのベースURLを取得
    pub fn bridge_url(&self) -> &str {
        &self.bridge_url
    }

    /// 同期対象プログラムのIDを取得
    pub fn program_id(&self) -> u64 {
        self.program_id
    }

    /// Basic認証トークンを構築する
    ///
    /// `Base64("{key}:{secret}")`の形式。
    pub fn auth_token(&self) -> String {
        BASE64_STANDARD.encode(format!("{}:{}", self.key, self.secret))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    // テストで環境変数を設定/削除するヘルパー
    // 安全性: #[serial]でシングルスレッド実行を保証する
    unsafe fn set_env(key: &str, value: &str) {
        unsafe { std::env::set_var(key, value) };
    }

    unsafe fn remove_env(key: &str) {
        unsafe { std::env::remove_var(key) };
    }

    unsafe fn cleanup_bridge_env() {
        unsafe {
            remove_env("BRIDGE_URL");
            remove_env("BRIDGE_KEY");
            remove_env("BRIDGE_SECRET");
            remove_env("BRIDGE_PROGRAM_ID");
        }
    }

    // エラー型の表示テスト
    #[test]
    fn test_missing_env_var_error_display() {
        let error = ConfigError::MissingEnvVar("USERS_TABLE_NAME".to_string());
        assert_eq!(
            error.to_string(),
            "Missing environment variable: USERS_TABLE_NAME"
        );
    }

    // 明示的な値でTableConfig構築のテスト
    #[tokio::test]
    async fn test_table_config_new() {
        let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        let client = DynamoDbClient::new(&aws_config);

        let config = TableConfig::new(client, "test-visits".to_string());
        assert_eq!(config.table_name(), "test-visits");
        let _client_ref = config.client();
    }

    // テーブル名の環境変数が欠落している場合のテスト
    #[tokio::test]
    #[serial]
    async fn test_table_config_missing_env() {
        // 安全性: #[serial]によりテスト間の競合はない
        unsafe { remove_env("TEST_MISSING_TABLE_NAME") };

        let result = TableConfig::from_env("TEST_MISSING_TABLE_NAME").await;
        match result.unwrap_err() {
            ConfigError::MissingEnvVar(var) => assert_eq!(var, "TEST_MISSING_TABLE_NAME"),
            other => panic!("Expected MissingEnvVar, got {:?}", other),
        }
    }

    // Bridge設定: すべての環境変数が設定されている場合
    #[test]
    #[serial]
    fn test_bridge_config_from_env() {
        // 安全性: #[serial]によりテスト間の競合はない
        unsafe {
            cleanup_bridge_env();
            set_env("BRIDGE_URL", "https://example.bridgeapp.com");
            set_env("BRIDGE_KEY", "my-key");
            set_env("BRIDGE_SECRET", "my-secret");
            set_env("BRIDGE_PROGRAM_ID", "4242");
        }

        let config = BridgeConfig::from_env().unwrap();
        assert_eq!(config.bridge_url(), "https://example.bridgeapp.com");
        assert_eq!(config.program_id(), 4242);

        // 安全性: テスト環境のクリーンアップ
        unsafe { cleanup_bridge_env() };
    }

    // Bridge設定: プログラムIDが数値でない場合
    #[test]
    #[serial]
    fn test_bridge_config_invalid_program_id() {
        // 安全性: #[serial]によりテスト間の競合はない
        unsafe {
            cleanup_bridge_env();
            set_env("BRIDGE_URL", "https://example.bridgeapp.com");
            set_env("BRIDGE_KEY", "my-key");
            set_env("BRIDGE_SECRET", "my-secret");
            set_env("BRIDGE_PROGRAM_ID", "not-a-number");
        }

        let result = BridgeConfig::from_env();
        match result.unwrap_err() {
            ConfigError::InvalidEnvVar(var, value) => {
                assert_eq!(var, "BRIDGE_PROGRAM_ID");
                assert_eq!(value, "not-a-number");
            }
            other => panic!("Expected InvalidEnvVar, got {:?}", other),
        }

        // 安全性: テスト環境のクリーンアップ
        unsafe { cleanup_bridge_env() };
    }

    // Basic認証トークンの構築テスト
    #[test]
    fn test_auth_token_encoding() {
        let config = BridgeConfig::new(
            "https://example.bridgeapp.com".to_string(),
            "key".to_string(),
            "secret".to_string(),
            1,
        );
        // Base64("key:secret")
        assert_eq!(config.auth_token(), "a2V5OnNlY3JldA==");
    }
}
