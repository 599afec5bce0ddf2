pub mod auth;
pub mod availability;
pub mod bookings;
pub mod expiry;
pub mod payments;
