// Domain layer modules
pub mod completable;
pub mod equipment_validator;
pub mod qualification_validator;
pub mod timestamp;
pub mod user_validator;
pub mod validation;
pub mod visit_validator;

// Re-exports
pub use completable::{
    merge_completable_lists, CompletableItem, COMPLETABLE_LIST_FIELDS, STATUS_COMPLETE,
};
pub use equipment_validator::{validate_equipment_body, EquipmentType, ProjectType};
pub use qualification_validator::validate_qualification_body;
pub use timestamp::{
    eastern_now, from_bridge_timestamp, to_bridge_timestamp, validate_timestamp, TimestampRange,
    MIN_TIMESTAMP, TIMESTAMP_FORMAT,
};
pub use user_validator::{validate_user_body, UniversityStatus};
pub use validation::{
    check_and_clean_request_fields, fmt_field_list, FieldCheck, RecordMap, ValidationError,
};
pub use visit_validator::{validate_visit_body, VALID_LOCATIONS};
