/// DynamoDBでリソースレコードを管理するためのレコードストア
///
/// 4つのテーブル（users/visits/equipment/qualifications）はすべて
/// フラットなJSONオブジェクトをアイテムとして保存するため、
/// テーブルごとのリポジトリではなく1つの汎用ストアで扱う。
///
/// タイムスタンプによる全件検索のため、各テーブルは`_ignore`を
/// パーティションキー、タイムスタンプ属性をソートキーとする
/// GSI（TimestampIndex）を持つ。検索対象のアイテムはすべて
/// `_ignore = "1"`を持たなければならない。
use async_trait::async_trait;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client as DynamoDbClient;
use serde_dynamo::aws_sdk_dynamodb_1::{from_item, to_item};
use thiserror::Error;

use crate::domain::{RecordMap, TimestampRange};

/// クエリ1回あたりのデフォルト取得上限
pub const DEFAULT_QUERY_LIMIT: usize = 1000;

/// スキャン1回あたりのデフォルト取得上限
pub const DEFAULT_SCAN_LIMIT: usize = 1000;

/// タイムスタンプ検索用GSIの名前
pub const TIMESTAMP_INDEX: &str = "TimestampIndex";

/// GSIパーティションキーの属性名
pub const GSI_ATTRIBUTE_NAME: &str = "_ignore";

/// GSIパーティションキーの固定値
pub const GSI_SENTINEL: &str = "1";

/// レコードストア操作のエラー型
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RecordStoreError {
    /// DynamoDBへの書き込みに失敗
    #[error("Write error: {0}")]
    WriteError(String),

    /// DynamoDBからの読み取りに失敗
    #[error("Read error: {0}")]
    ReadError(String),

    /// データのシリアライズ/デシリアライズに失敗
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// レコードを一意に特定するキー
///
/// 各要素は（属性名, 値）のペア。キー属性値はこのシステムでは
/// すべて文字列。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordKey {
    /// パーティションキー
    pub partition: (String, String),
    /// ソートキー（テーブルが複合キーの場合）
    pub sort: Option<(String, String)>,
}

impl RecordKey {
    /// パーティションキーのみのキーを作成
    pub fn partition_only(attr: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            partition: (attr.into(), value.into()),
            sort: None,
        }
    }

    /// 複合キーを作成
    pub fn composite(
        partition_attr: impl Into<String>,
        partition_value: impl Into<String>,
        sort_attr: impl Into<String>,
        sort_value: impl Into<String>,
    ) -> Self {
        Self {
            partition: (partition_attr.into(), partition_value.into()),
            sort: Some((sort_attr.into(), sort_value.into())),
        }
    }
}

/// キー条件によるクエリ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyQuery {
    /// パーティションキー条件（属性名, 値）
    pub partition: (String, String),
    /// ソートキーに対する範囲条件（属性名, 範囲）
    pub sort: Option<(String, TimestampRange)>,
    /// 使用するGSI名（テーブル本体へのクエリの場合はNone）
    pub index: Option<String>,
}

/// クエリ/スキャン1ページ分の結果
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Page {
    /// 取得したレコード
    pub items: Vec<RecordMap>,
    /// 続きがある場合の継続トークン（LastEvaluatedKey相当）
    pub next: Option<RecordMap>,
}

/// put時の条件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PutCondition {
    /// 無条件で書き込む（上書きあり）
    None,
    /// 同じキーのアイテムが存在しない場合のみ書き込む
    IfAttributeAbsent(String),
}

/// put操作の結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PutResult {
    /// 新しいレコードとして保存された
    Stored,
    /// 条件付きputで既存レコードが見つかった
    AlreadyExists,
}

/// レコード永続化用トレイト
///
/// 異なる実装を可能にします（実際のDynamoDB、テスト用モック）。
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// キーでレコードを1件取得
    async fn get(&self, key: &RecordKey) -> Result<Option<RecordMap>, RecordStoreError>;

    /// キー条件に合致するレコードを1ページ取得
    ///
    /// 結果はソートキーの降順（新しい順）。`start`は前ページの
    /// 継続トークン。
    async fn query_page(
        &self,
        query: &KeyQuery,
        limit: usize,
        start: Option<RecordMap>,
    ) -> Result<Page, RecordStoreError>;

    /// テーブル全体を1ページ分スキャン
    async fn scan_page(&self, start: Option<RecordMap>) -> Result<Page, RecordStoreError>;

    /// レコードを保存
    async fn put(
        &self,
        record: RecordMap,
        condition: PutCondition,
    ) -> Result<PutResult, RecordStoreError>;

    /// キーでレコードを削除
    async fn delete(&self, key: &RecordKey) -> Result<(), RecordStoreError>;
}

/// キー条件に合致するレコードを`limit`件まですべて取得する
///
/// 継続トークンを次のクエリに引き継ぎながら、トークンが尽きるか
/// `limit`件に達するまでページを読み続ける。
pub async fn query_all<S: RecordStore + ?Sized>(
    store: &S,
    query: &KeyQuery,
    limit: usize,
) -> Result<Vec<RecordMap>, RecordStoreError> {
    let mut items: Vec<RecordMap> = Vec::new();
    let mut start: Option<RecordMap> = None;

    loop {
        let page = store.query_page(query, limit, start).await?;
        items.extend(page.items);

        start = page.next;
        if start.is_none() || items.len() >= limit {
            break;
        }
    }

    items.truncate(limit);
    Ok(items)
}

/// テーブル全体のレコードを`limit`件まですべて取得する
pub async fn scan_all<S: RecordStore + ?Sized>(
    store: &S,
    limit: usize,
) -> Result<Vec<RecordMap>, RecordStoreError> {
    let mut items: Vec<RecordMap> = Vec::new();
    let mut start: Option<RecordMap> = None;

    loop {
        let page = store.scan_page(start).await?;
        items.extend(page.items);

        start = page.next;
        if start.is_none() || items.len() >= limit {
            break;
        }
    }

    items.truncate(limit);
    Ok(items)
}

/// RecordStoreのDynamoDB実装
#[derive(Debug, Clone)]
pub struct DynamoRecordStore {
    /// DynamoDBクライアント
    client: DynamoDbClient,
    /// テーブル名
    table_name: String,
}

impl DynamoRecordStore {
    /// 新しいDynamoRecordStoreを作成
    pub fn new(client: DynamoDbClient, table_name: String) -> Self {
        Self { client, table_name }
    }

    /// RecordKeyをDynamoDBのキーマップに変換
    fn build_key(key: &RecordKey) -> Vec<(String, AttributeValue)> {
        let mut attrs = vec![(
            key.partition.0.clone(),
            AttributeValue::S(key.partition.1.clone()),
        )];
        if let Some((sort_attr, sort_value)) = &key.sort {
            attrs.push((sort_attr.clone(), AttributeValue::S(sort_value.clone())));
        }
        attrs
    }
}

#[async_trait]
impl RecordStore for DynamoRecordStore {
    async fn get(&self, key: &RecordKey) -> Result<Option<RecordMap>, RecordStoreError> {
        let mut request = self.client.get_item().table_name(&self.table_name);
        for (attr, value) in Self::build_key(key) {
            request = request.key(attr, value);
        }

        let response = request
            .send()
            .await
            .map_err(|e| RecordStoreError::ReadError(e.to_string()))?;

        match response.item {
            Some(item) => {
                let record: RecordMap = from_item(item)
                    .map_err(|e| RecordStoreError::SerializationError(e.to_string()))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    async fn query_page(
        &self,
        query: &KeyQuery,
        limit: usize,
        start: Option<RecordMap>,
    ) -> Result<Page, RecordStoreError> {
        // パーティションキー条件
        let mut key_condition = "#pk = :pk".to_string();
        let mut request = self
            .client
            .query()
            .table_name(&self.table_name)
            .expression_attribute_names("#pk", &query.partition.0)
            .expression_attribute_values(":pk", AttributeValue::S(query.partition.1.clone()))
            // 結果をタイムスタンプ降順（新しい順）で返す
            .scan_index_forward(false)
            .limit(limit.min(i32::MAX as usize) as i32);

        // ソートキーの範囲条件
        if let Some((sort_attr, range)) = &query.sort {
            request = request.expression_attribute_names("#sk", sort_attr);
            match range {
                TimestampRange::Lte(end) => {
                    key_condition.push_str(" AND #sk <= :sk_end");
                    request = request
                        .expression_attribute_values(":sk_end", AttributeValue::S(end.clone()));
                }
                TimestampRange::Gte(start) => {
                    key_condition.push_str(" AND #sk >= :sk_start");
                    request = request
                        .expression_attribute_values(":sk_start", AttributeValue::S(start.clone()));
                }
                TimestampRange::Eq(value) => {
                    key_condition.push_str(" AND #sk = :sk_eq");
                    request = request
                        .expression_attribute_values(":sk_eq", AttributeValue::S(value.clone()));
                }
                TimestampRange::Between(start, end) => {
                    key_condition.push_str(" AND #sk BETWEEN :sk_start AND :sk_end");
                    request = request
                        .expression_attribute_values(":sk_start", AttributeValue::S(start.clone()))
                        .expression_attribute_values(":sk_end", AttributeValue::S(end.clone()));
                }
            }
        }

        request = request.key_condition_expression(key_condition);

        if let Some(index) = &query.index {
            request = request.index_name(index);
        }

        if let Some(start) = start {
            let start_key = to_item(start)
                .map_err(|e| RecordStoreError::SerializationError(e.to_string()))?;
            request = request.set_exclusive_start_key(Some(start_key));
        }

        let response = request
            .send()
            .await
            .map_err(|e| RecordStoreError::ReadError(e.to_string()))?;

        let mut items: Vec<RecordMap> = Vec::new();
        for item in response.items() {
            let record: RecordMap = from_item(item.clone())
                .map_err(|e| RecordStoreError::SerializationError(e.to_string()))?;
            items.push(record);
        }

        let next = match response.last_evaluated_key {
            Some(key) => Some(
                from_item(key)
                    .map_err(|e| RecordStoreError::SerializationError(e.to_string()))?,
            ),
            None => None,
        };

        Ok(Page { items, next })
    }

    async fn scan_page(&self, start: Option<RecordMap>) -> Result<Page, RecordStoreError> {
        let mut request = self
            .client
            .scan()
            .table_name(&self.table_name)
            .limit(DEFAULT_SCAN_LIMIT as i32);

        if let Some(start) = start {
            let start_key = to_item(start)
                .map_err(|e| RecordStoreError::SerializationError(e.to_string()))?;
            request = request.set_exclusive_start_key(Some(start_key));
        }

        let response = request
            .send()
            .await
            .map_err(|e| RecordStoreError::ReadError(e.to_string()))?;

        let mut items: Vec<RecordMap> = Vec::new();
        for item in response.items() {
            let record: RecordMap = from_item(item.clone())
                .map_err(|e| RecordStoreError::SerializationError(e.to_string()))?;
            items.push(record);
        }

        let next = match response.last_evaluated_key {
            Some(key) => Some(
                from_item(key)
                    .map_err(|e| RecordStoreError::SerializationError(e.to_string()))?,
            ),
            None => None,
        };

        Ok(Page { items, next })
    }

    async fn put(
        &self,
        record: RecordMap,
        condition: PutCondition,
    ) -> Result<PutResult, RecordStoreError> {
        let item = to_item(record)
            .map_err(|e| RecordStoreError::SerializationError(e.to_string()))?;

        let mut request = self
            .client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(item));

        if let PutCondition::IfAttributeAbsent(attr) = &condition {
            request = request
                .condition_expression("attribute_not_exists(#cond)")
                .expression_attribute_names("#cond", attr);
        }

        match request.send().await {
            Ok(_) => Ok(PutResult::Stored),
            Err(e) => {
                // 条件付きputの失敗は既存レコードありとして扱う
                let is_condition_failure = e
                    .as_service_error()
                    .map(|se| se.is_conditional_check_failed_exception())
                    .unwrap_or(false);
                if is_condition_failure {
                    Ok(PutResult::AlreadyExists)
                } else {
                    Err(RecordStoreError::WriteError(e.to_string()))
                }
            }
        }
    }

    async fn delete(&self, key: &RecordKey) -> Result<(), RecordStoreError> {
        let mut request = self.client.delete_item().table_name(&self.table_name);
        for (attr, value) in Self::build_key(key) {
            request = request.key(attr, value);
        }

        request
            .send()
            .await
            .map_err(|e| RecordStoreError::WriteError(e.to_string()))?;

        Ok(())
    }
}
