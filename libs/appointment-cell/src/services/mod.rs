pub mod admin;
pub mod booking;
pub mod capacity;
pub mod lifecycle;

pub use admin::AppointmentAdminService;
pub use booking::{parse_appointment_date, BookingEngine};
pub use capacity::CapacityLedger;
pub use lifecycle::AppointmentLifecycleService;
