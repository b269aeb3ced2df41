//! タイムスタンプの検証・変換
//!
//! 全リソース共通のタイムスタンプ形式は`YYYY-MM-DDThh:mm:ss`
//! （ローカルオフセットを含まないISO 8601）。この形式は辞書順比較が
//! 時刻順比較と一致するため、範囲条件は文字列比較で構築できる。

use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};

use super::validation::ValidationError;

/// リソース全体で使用するタイムスタンプ形式
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// 表現可能な最小のタイムスタンプ（qualificationsが空の場合の低水位点）
pub const MIN_TIMESTAMP: &str = "0001-01-01T00:00:00";

/// Bridge APIのタイムゾーンオフセット
///
/// Bridgeは（観測した限り）常に-04:00のオフセットを使用する。
const BRIDGE_TZ_OFFSET: &str = "-04:00";

/// 東部時間のUTCオフセット（秒）
const EASTERN_OFFSET_SECS: i32 = 5 * 3600;

/// タイムスタンプ範囲条件
///
/// クエリパラメータ`start_timestamp`/`end_timestamp`の組み合わせから
/// 構築され、ソートキーに対する範囲条件としてストア層に渡される。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimestampRange {
    /// end_timestampのみ: 以前（含む）
    Lte(String),
    /// start_timestampのみ: 以降（含む）
    Gte(String),
    /// 両方が同じ値: 一致
    Eq(String),
    /// 両方あり: 範囲（両端含む）
    Between(String, String),
}

impl TimestampRange {
    /// クエリパラメータの組み合わせから範囲条件を構築する
    ///
    /// どちらも指定されていない場合は`Ok(None)`。
    /// `end_timestamp`が`start_timestamp`より辞書順で前の場合は
    /// `InvalidQueryParameters`を返す。
    pub fn from_query(
        start_timestamp: Option<&str>,
        end_timestamp: Option<&str>,
    ) -> Result<Option<Self>, ValidationError> {
        match (start_timestamp, end_timestamp) {
            (None, None) => Ok(None),
            (None, Some(end)) => Ok(Some(TimestampRange::Lte(end.to_string()))),
            (Some(start), None) => Ok(Some(TimestampRange::Gte(start.to_string()))),
            (Some(start), Some(end)) if start == end => {
                Ok(Some(TimestampRange::Eq(start.to_string())))
            }
            (Some(start), Some(end)) => {
                // end_timestampがstart_timestampより前の範囲は構築できない
                if end < start {
                    return Err(ValidationError::InvalidQueryParameters(
                        "When searching with both start and end timestamps, \
                         end_timestamp cannot occur before start_timestamp."
                            .to_string(),
                    ));
                }
                Ok(Some(TimestampRange::Between(
                    start.to_string(),
                    end.to_string(),
                )))
            }
        }
    }
}

/// タイムスタンプが承認済みの形式であるか検証する
pub fn validate_timestamp(value: &str) -> Result<(), ValidationError> {
    NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT).map_err(|_| {
        ValidationError::InvalidRequestBody(
            "Timestamp not in the approved format. Approved format is 'YYYY-MM-DDThh:mm:ss'."
                .to_string(),
        )
    })?;
    Ok(())
}

/// 現在の東部時間をタイムスタンプ形式で返す
///
/// 固定オフセット-05:00を使用する（夏時間は考慮しない）。
pub fn eastern_now() -> String {
    let offset = FixedOffset::west_opt(EASTERN_OFFSET_SECS)
        .unwrap_or_else(|| FixedOffset::east_opt(0).unwrap());
    Utc::now()
        .with_timezone(&offset)
        .format(TIMESTAMP_FORMAT)
        .to_string()
}

/// ローカル形式のタイムスタンプをBridge APIのタイムスタンプに変換する
///
/// Bridgeは秒をミリ秒精度（小数点以下3桁）で、オフセット付きで要求する。
/// 例: `2024-01-01T10:00:00` → `2024-01-01T10:00:00.000-04:00`
pub fn to_bridge_timestamp(local: &str) -> Result<String, ValidationError> {
    let parsed = NaiveDateTime::parse_from_str(local, TIMESTAMP_FORMAT).map_err(|_| {
        ValidationError::InvalidQueryParameters(format!(
            "Timestamp '{}' cannot be converted to a Bridge timestamp.",
            local
        ))
    })?;
    Ok(format!(
        "{}{}",
        parsed.format("%Y-%m-%dT%H:%M:%S%.3f"),
        BRIDGE_TZ_OFFSET
    ))
}

/// Bridgeの`updated_at`タイムスタンプをローカル形式に変換する
///
/// オフセットはそのまま無視し、壁時計時刻のみを保持する。
pub fn from_bridge_timestamp(bridge: &str) -> Option<String> {
    let parsed: DateTime<FixedOffset> = DateTime::parse_from_rfc3339(bridge).ok()?;
    Some(parsed.format(TIMESTAMP_FORMAT).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==================== 範囲条件の構築テスト ====================

    // 両方指定なしの場合は条件なし
    #[test]
    fn test_range_none_when_no_parameters() {
        let range = TimestampRange::from_query(None, None).unwrap();
        assert!(range.is_none());
    }

    // end_timestampのみ → Lte
    #[test]
    fn test_range_end_only_is_lte() {
        let range = TimestampRange::from_query(None, Some("2024-01-01T00:00:00")).unwrap();
        assert_eq!(
            range,
            Some(TimestampRange::Lte("2024-01-01T00:00:00".to_string()))
        );
    }

    // start_timestampのみ → Gte
    #[test]
    fn test_range_start_only_is_gte() {
        let range = TimestampRange::from_query(Some("2024-01-01T00:00:00"), None).unwrap();
        assert_eq!(
            range,
            Some(TimestampRange::Gte("2024-01-01T00:00:00".to_string()))
        );
    }

    // 同一値の場合はBetweenではなくEq
    #[test]
    fn test_range_equal_values_is_eq() {
        let ts = "2024-06-15T12:30:00";
        let range = TimestampRange::from_query(Some(ts), Some(ts)).unwrap();
        assert_eq!(range, Some(TimestampRange::Eq(ts.to_string())));
    }

    // 通常の範囲 → Between
    #[test]
    fn test_range_between() {
        let range = TimestampRange::from_query(
            Some("2024-01-01T00:00:00"),
            Some("2024-12-31T23:59:59"),
        )
        .unwrap();
        assert_eq!(
            range,
            Some(TimestampRange::Between(
                "2024-01-01T00:00:00".to_string(),
                "2024-12-31T23:59:59".to_string()
            ))
        );
    }

    // end < start はInvalidQueryParameters
    #[test]
    fn test_range_end_before_start_fails() {
        let result = TimestampRange::from_query(
            Some("2024-12-31T23:59:59"),
            Some("2024-01-01T00:00:00"),
        );
        match result.unwrap_err() {
            ValidationError::InvalidQueryParameters(msg) => {
                assert!(msg.contains("end_timestamp cannot occur before start_timestamp"));
            }
            other => panic!("Expected InvalidQueryParameters, got {:?}", other),
        }
    }

    // ==================== 形式検証テスト ====================

    // 正しい形式は受理される
    #[test]
    fn test_validate_timestamp_valid() {
        assert!(validate_timestamp("2024-01-01T10:00:00").is_ok());
        assert!(validate_timestamp("0001-01-01T00:00:00").is_ok());
    }

    // オフセット付き・日付のみ・別形式は拒否される
    #[test]
    fn test_validate_timestamp_invalid() {
        assert!(validate_timestamp("2024-01-01").is_err());
        assert!(validate_timestamp("2024-01-01 10:00:00").is_err());
        assert!(validate_timestamp("not a timestamp").is_err());
    }

    // エラーメッセージが契約どおりであること
    #[test]
    fn test_validate_timestamp_error_message() {
        let err = validate_timestamp("bad").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Timestamp not in the approved format. Approved format is 'YYYY-MM-DDThh:mm:ss'."
        );
    }

    // ==================== Bridgeタイムスタンプ変換テスト ====================

    // ローカル → Bridge形式（ミリ秒 + オフセット）
    #[test]
    fn test_to_bridge_timestamp() {
        let bridge = to_bridge_timestamp("2024-01-01T10:00:00").unwrap();
        assert_eq!(bridge, "2024-01-01T10:00:00.000-04:00");
    }

    // 最小タイムスタンプも変換できる
    #[test]
    fn test_to_bridge_timestamp_min() {
        let bridge = to_bridge_timestamp(MIN_TIMESTAMP).unwrap();
        assert_eq!(bridge, "0001-01-01T00:00:00.000-04:00");
    }

    // Bridge → ローカル形式（壁時計時刻を保持）
    #[test]
    fn test_from_bridge_timestamp() {
        let local = from_bridge_timestamp("2024-03-05T08:15:30.123-04:00").unwrap();
        assert_eq!(local, "2024-03-05T08:15:30");
    }

    // 不正なBridgeタイムスタンプはNone
    #[test]
    fn test_from_bridge_timestamp_invalid() {
        assert!(from_bridge_timestamp("2024-03-05").is_none());
    }

    // eastern_nowは承認済み形式で返る
    #[test]
    fn test_eastern_now_format() {
        let now = eastern_now();
        assert!(validate_timestamp(&now).is_ok());
    }
}
