// Infrastructure layer modules
pub mod bridge_client;
pub mod config;
pub mod logging;
pub mod record_store;

// Re-exports
pub use bridge_client::{
    BridgeApi, BridgeClient, BridgeClientError, BridgeCourse, BridgeEnrollment, BridgeLearner,
    CourseEnrollments,
};
pub use config::{BridgeConfig, ConfigError, TableConfig};
pub use logging::init_logging;
pub use record_store::{
    query_all, scan_all, DynamoRecordStore, KeyQuery, Page, PutCondition, PutResult, RecordKey,
    RecordStore, RecordStoreError, DEFAULT_QUERY_LIMIT, DEFAULT_SCAN_LIMIT, GSI_ATTRIBUTE_NAME,
    GSI_SENTINEL, TIMESTAMP_INDEX,
};
