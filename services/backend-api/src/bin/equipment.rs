/// /equipment エンドポイントのLambda関数
///
/// 機器使用記録の登録・検索・更新リクエストを処理し、
/// equipmentテーブルを読み書きする。
use backend_api::application::{
    error_response, EquipmentHandler, RestEvent, RestResponse, APOLOGY_MSG,
};
use backend_api::infrastructure::{init_logging, DynamoRecordStore, TableConfig};
use lambda_runtime::{service_fn, Error, LambdaEvent};
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
async fn handler(event: LambdaEvent<RestEvent>) -> Result<RestResponse, Error> {
    // DynamoDB設定を環境から読み込み
    let config = match TableConfig::from_env("EQUIPMENT_TABLE_NAME").await {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "equipmentテーブル設定の読み込みに失敗");
            return Ok(error_response(500, APOLOGY_MSG));
        }
    };

    let store = DynamoRecordStore::new(config.client().clone(), config.table_name().to_string());
    let handler = EquipmentHandler::new(store);

    Ok(handler.handle(&event.payload).await)
}
