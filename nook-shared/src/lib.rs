pub mod models;
pub mod pii;

pub use models::booking::{Booking, BookingStatus, StayRange, StayRangeError};
