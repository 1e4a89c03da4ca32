pub mod booking;
pub mod conflict;
pub mod guard;
pub mod lifecycle;
pub mod notify;

pub use booking::BookingService;
pub use conflict::ConflictDetectionService;
pub use guard::CalendarGuard;
pub use lifecycle::AppointmentLifecycleService;
pub use notify::NotificationService;
