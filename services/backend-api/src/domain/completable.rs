//! 完了可能アイテム（トレーニング・同意書など）
//!
//! qualificationsレコードの`trainings`/`waivers`/`miscellaneous`は
//! `{name, completion_status}`のリストで、`name`を同一性として扱う。

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 完了可能アイテムのリストを持つフィールド名
pub const COMPLETABLE_LIST_FIELDS: &[&str] = &["trainings", "waivers", "miscellaneous"];

/// 完了可能アイテムの必須フィールド
pub const COMPLETABLE_ITEM_FIELDS: &[&str] = &["name", "completion_status"];

/// 有効な完了ステータス
pub const VALID_COMPLETION_STATUSES: &[&str] = &["Complete", "Incomplete"];

/// 完了ステータス「完了」
pub const STATUS_COMPLETE: &str = "Complete";

/// 完了可能アイテム
///
/// `name`がアイテムの同一性を決める。同じ`name`のアイテムは
/// マージ時に新しい方で置き換えられる。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletableItem {
    /// アイテム名（コース名など）
    pub name: String,
    /// 完了ステータス（"Complete" または "Incomplete"）
    pub completion_status: String,
}

impl CompletableItem {
    /// 新しい完了可能アイテムを作成
    pub fn new(name: impl Into<String>, completion_status: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            completion_status: completion_status.into(),
        }
    }
}

/// 完了可能アイテムのリストを`name`同一性で和集合マージする
///
/// 既存リストを基にし、着信リストの各アイテムについて、同じ`name`を
/// 持つ既存アイテムがあれば置き換え、なければ末尾に追加する。
/// どちらの引数もJSON配列でなければ着信側（または空配列）を返す。
pub fn merge_completable_lists(existing: &Value, incoming: &Value) -> Value {
    let existing_items = match existing.as_array() {
        Some(items) => items.clone(),
        None => Vec::new(),
    };
    let incoming_items = match incoming.as_array() {
        Some(items) => items,
        None => return Value::Array(existing_items),
    };

    let mut merged = existing_items;
    for item in incoming_items {
        let name = item.get("name").and_then(|v| v.as_str());

        let position = name.and_then(|name| {
            merged
                .iter()
                .position(|m| m.get("name").and_then(|v| v.as_str()) == Some(name))
        });

        match position {
            Some(index) => merged[index] = item.clone(),
            None => merged.push(item.clone()),
        }
    }

    Value::Array(merged)
}
