//! Tiger Training（Bridge LMS）同期のハンドラー
//!
//! スケジュール起動でBridgeのプログラムから全コースの受講登録を
//! 取得し、完了した受講をqualificationsテーブルへ反映する。前回
//! 同期以降の差分のみを取得するため、qualificationsの最新
//! last_updatedを基準時刻として使う。

use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use tracing::{error, info, warn};

use crate::domain::{
    from_bridge_timestamp, to_bridge_timestamp, CompletableItem, MIN_TIMESTAMP, STATUS_COMPLETE,
};
use crate::infrastructure::{BridgeApi, BridgeCourse, RecordStore};

use super::http_event::{
    build_response, error_response, RestEvent, RestResponse, APOLOGY_MSG,
    QUALIFICATIONS_PARAM_PATH, QUALIFICATIONS_PATH,
};
use super::qualifications_handler::QualificationsHandler;

/// 1人の学習者について集計した完了コース
#[derive(Debug, Clone)]
struct Learner {
    user_id: String,
    /// この学習者の受講登録のうち最新の更新時刻
    last_updated: String,
    /// 完了したコース
    courses: Vec<CompletableItem>,
}

impl Learner {
    fn new(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            last_updated: MIN_TIMESTAMP.to_string(),
            courses: Vec::new(),
        }
    }

    /// より新しい更新時刻を観測した場合のみ進める
    fn update_timestamp(&mut self, timestamp: &str) {
        if timestamp > self.last_updated.as_str() {
            self.last_updated = timestamp.to_string();
        }
    }

    fn add_course(&mut self, name: &str) {
        self.courses.push(CompletableItem::new(name, STATUS_COMPLETE));
    }
}

/// Tiger Training同期のハンドラー
///
/// qualificationsの読み書きはRESTハンドラーを内部呼び出しして
/// 行い、検証とマージのロジックを共有する。
pub struct TigerTrainingHandler<S: RecordStore, B: BridgeApi> {
    qualifications: QualificationsHandler<S>,
    bridge: B,
    program_id: u64,
}

impl<S: RecordStore, B: BridgeApi> TigerTrainingHandler<S, B> {
    pub fn new(qualifications: QualificationsHandler<S>, bridge: B, program_id: u64) -> Self {
        Self {
            qualifications,
            bridge,
            program_id,
        }
    }

    /// 同期を1回実行する
    pub async fn handle(&self) -> RestResponse {
        let courses = match self.bridge.program_courses(self.program_id).await {
            Ok(courses) => courses,
            Err(e) => {
                error!(error = %e, program_id = self.program_id, "プログラムのコース取得に失敗");
                return error_response(500, APOLOGY_MSG);
            }
        };
        info!(program_id = self.program_id, courses = courses.len(), "同期を開始");

        let base_time = match self.latest_update_time().await {
            Ok(base_time) => base_time,
            Err(response) => return response,
        };
        let updated_after = match to_bridge_timestamp(&base_time) {
            Ok(updated_after) => updated_after,
            Err(e) => {
                error!(error = %e, base_time = %base_time, "基準時刻の変換に失敗");
                return error_response(500, APOLOGY_MSG);
            }
        };

        let (learners, latest) = match self.collect_learners(&courses, &updated_after).await {
            Ok(collected) => collected,
            Err(response) => return response,
        };

        // 差分が1件も無い場合は何もしない
        let Some((latest_user_id, latest_timestamp)) = latest else {
            info!("更新された受講登録なし");
            return build_response(200, &json!({}));
        };

        // 完了が無くても、最新の更新を持つ学習者は必ず書き込んで
        // 次回同期の基準時刻を進める
        let mut learners = learners;
        learners
            .entry(latest_user_id.clone())
            .or_insert_with(|| Learner::new(&latest_user_id))
            .update_timestamp(&latest_timestamp);

        for learner in learners.values() {
            self.store_learner(learner).await;
        }

        build_response(200, &json!({}))
    }

    /// qualificationsテーブルの最新のlast_updatedを返す
    ///
    /// テーブルが空の場合は表現可能な最小のタイムスタンプ。
    async fn latest_update_time(&self) -> Result<String, RestResponse> {
        let event = RestEvent::get(QUALIFICATIONS_PATH, &[("limit", "1")]);
        let response = self.qualifications.handle(&event).await;
        if response.status_code != 200 {
            error!(status = response.status_code, "最新の資格情報の取得に失敗");
            return Err(error_response(500, APOLOGY_MSG));
        }

        let latest = response.body_json()["qualifications"]
            .get(0)
            .and_then(|record| record.get("last_updated"))
            .and_then(Value::as_str)
            .map(String::from);

        Ok(latest.unwrap_or_else(|| MIN_TIMESTAMP.to_string()))
    }

    /// 全コースの受講登録を取得し、学習者ごとに完了コースを集計する
    ///
    /// 併せて、完了状態を問わず最も新しい（user_id, 更新時刻）を
    /// 追跡して返す。
    async fn collect_learners(
        &self,
        courses: &[BridgeCourse],
        updated_after: &str,
    ) -> Result<(BTreeMap<String, Learner>, Option<(String, String)>), RestResponse> {
        let mut learners: BTreeMap<String, Learner> = BTreeMap::new();
        let mut latest: Option<(String, String)> = None;

        for course in courses {
            let result = match self.bridge.course_enrollments(course.id, updated_after).await {
                Ok(result) => result,
                Err(e) => {
                    error!(error = %e, course_id = course.id, "受講登録の取得に失敗");
                    return Err(error_response(500, APOLOGY_MSG));
                }
            };

            // Bridgeの学習者ID → user_id（メールのローカル部）
            let learner_lookup: HashMap<&str, &str> = result
                .learners
                .iter()
                .map(|learner| {
                    let user_id = learner.email.split('@').next().unwrap_or_default();
                    (learner.id.as_str(), user_id)
                })
                .collect();

            for enrollment in &result.enrollments {
                let Some(user_id) = learner_lookup.get(enrollment.learner_id.as_str()) else {
                    warn!(
                        learner_id = %enrollment.learner_id,
                        course_id = course.id,
                        "受講登録に対応する学習者が見つからないためスキップ"
                    );
                    continue;
                };
                let Some(last_updated) = from_bridge_timestamp(&enrollment.updated_at) else {
                    warn!(
                        updated_at = %enrollment.updated_at,
                        user_id = %user_id,
                        "更新時刻を解釈できないためスキップ"
                    );
                    continue;
                };

                // 完了状態を問わず最新の更新を追跡する
                let is_newer = latest
                    .as_ref()
                    .is_none_or(|(_, ts)| last_updated.as_str() > ts.as_str());
                if is_newer {
                    latest = Some((user_id.to_string(), last_updated.clone()));
                }

                if enrollment.state.to_lowercase() == "complete" {
                    let learner = learners
                        .entry(user_id.to_string())
                        .or_insert_with(|| Learner::new(user_id));
                    learner.add_course(&course.name);
                    learner.update_timestamp(&last_updated);
                }
            }
        }

        Ok((learners, latest))
    }

    /// 学習者1人分の集計結果をqualificationsに書き込む
    ///
    /// まずPATCHを試み、レコードが存在しない場合（400）はPOSTで
    /// 新規作成する。書き込み失敗はログに残し、他の学習者の処理は
    /// 続行する。
    async fn store_learner(&self, learner: &Learner) {
        let (trainings, waivers, miscellaneous) = separate_courses(&learner.courses);

        let mut body = json!({
            "trainings": trainings,
            "waivers": waivers,
            "miscellaneous": miscellaneous,
            "last_updated": learner.last_updated,
        });

        let patch_event = RestEvent::with_body(
            "PATCH",
            QUALIFICATIONS_PARAM_PATH,
            &[("user_id", &learner.user_id)],
            &body,
        );
        let response = self.qualifications.handle(&patch_event).await;
        if response.status_code != 400 {
            if response.status_code != 204 {
                error!(
                    user_id = %learner.user_id,
                    status = response.status_code,
                    "資格情報の更新に失敗"
                );
            }
            return;
        }

        // レコードが無い場合は新規作成
        body["user_id"] = json!(learner.user_id);
        let post_event = RestEvent::with_body("POST", QUALIFICATIONS_PATH, &[], &body);
        let response = self.qualifications.handle(&post_event).await;
        if response.status_code != 201 {
            error!(
                user_id = %learner.user_id,
                status = response.status_code,
                "資格情報の新規作成に失敗"
            );
        }
    }
}

/// 完了コースをコース名でtrainings/waivers/miscellaneousに振り分ける
fn separate_courses(
    courses: &[CompletableItem],
) -> (Vec<CompletableItem>, Vec<CompletableItem>, Vec<CompletableItem>) {
    let mut trainings = Vec::new();
    let mut waivers = Vec::new();
    let mut miscellaneous = Vec::new();

    for course in courses {
        let name = course.name.to_lowercase();
        if name.contains("waiver") {
            waivers.push(course.clone());
        } else if name.contains("training") {
            trainings.push(course.clone());
        } else {
            miscellaneous.push(course.clone());
        }
    }

    (trainings, waivers, miscellaneous)
}
