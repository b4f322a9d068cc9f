pub mod dispatcher;
pub mod scheduler;

pub use dispatcher::ReminderDispatcher;
pub use scheduler::ReminderScheduler;
