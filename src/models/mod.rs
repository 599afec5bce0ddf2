pub mod booking;
pub mod pagination;
pub mod payment;
pub mod spot;
pub mod user;

pub use booking::{Booking, BookingStatus, PaymentStatus, VehicleInfo};
pub use pagination::{PageParams, Paginated, SortOrder};
pub use payment::{Payment, PaymentMethod, PaymentState};
pub use spot::{ParkingSpot, SpotStatus, SpotType};
pub use user::{Role, User};
