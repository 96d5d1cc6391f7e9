pub mod booking;
pub mod lifecycle;
pub mod reservations;

pub use booking::AppointmentService;
pub use lifecycle::AppointmentLifecycleService;
pub use reservations::ReservationService;
