pub mod access_gate;
pub mod assistance_service;
pub mod attempt_service;
pub mod audit_service;
pub mod class_service;
pub mod grading_service;
pub mod progress_service;
pub mod quiz_service;
pub mod review_service;
