//! アプリケーション層
//!
//! API Gatewayイベントの解析と、各リソースのRESTハンドラー、
//! Tiger Training同期ジョブを提供する。

pub mod equipment_handler;
pub mod http_event;
pub mod qualifications_handler;
pub mod tiger_training_handler;
pub mod users_handler;
pub mod visits_handler;

pub use equipment_handler::EquipmentHandler;
pub use http_event::{
    build_response, error_response, extract_parts, QueryParams, RequestParts, RestEvent,
    RestResponse, APOLOGY_MSG, EQUIPMENT_PARAM_PATH, EQUIPMENT_PATH, QUALIFICATIONS_PARAM_PATH,
    QUALIFICATIONS_PATH, SERVER_ERROR_MSG, USERS_PARAM_PATH, USERS_PATH, USER_ENDPOINT,
    VISITS_PARAM_PATH, VISITS_PATH,
};
pub use qualifications_handler::QualificationsHandler;
pub use tiger_training_handler::TigerTrainingHandler;
pub use users_handler::UsersHandler;
pub use visits_handler::VisitsHandler;
