/// Tiger Training同期のLambda関数
///
/// EventBridgeのスケジュールで起動され、Bridge LMSの受講登録を
/// qualificationsテーブルへ反映する。
use backend_api::application::{
    error_response, QualificationsHandler, RestResponse, TigerTrainingHandler, APOLOGY_MSG,
};
use backend_api::infrastructure::{
    init_logging, BridgeClient, BridgeConfig, DynamoRecordStore, TableConfig,
};
use lambda_runtime::{service_fn, Error, LambdaEvent};
use serde_json::Value;
use tracing::error;

#[tokio::main]
async fn main() -> Result<(), Error> {
    // 構造化ログを初期化
    init_logging();

    // Lambda関数を初期化して実行
    let func = service_fn(handler);
    lambda_runtime::run(func).await?;
    Ok(())
}

/// Lambda関数のメインハンドラー
async fn handler(_event: LambdaEvent<Value>) -> Result<RestResponse, Error> {
    // DynamoDB設定を環境から読み込み
    let table_config = match TableConfig::from_env("QUALIFICATIONS_TABLE_NAME").await {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "qualificationsテーブル設定の読み込みに失敗");
            return Ok(error_response(500, APOLOGY_MSG));
        }
    };

    // Bridge API設定を環境変数から読み込み
    let bridge_config = match BridgeConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "Bridge API設定の読み込みに失敗");
            return Ok(error_response(500, APOLOGY_MSG));
        }
    };

    let store = DynamoRecordStore::new(
        table_config.client().clone(),
        table_config.table_name().to_string(),
    );
    let bridge = BridgeClient::new(&bridge_config);
    let handler = TigerTrainingHandler::new(
        QualificationsHandler::new(store),
        bridge,
        bridge_config.program_id(),
    );

    Ok(handler.handle().await)
}
