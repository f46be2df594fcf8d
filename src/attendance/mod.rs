//! Attendance hours accounting, idempotent record creation and bulk
//! scheduling of placeholder rows.

pub mod scheduler;
pub mod service;
pub mod summary;

pub use scheduler::BulkScheduler;
pub use service::AttendanceService;
