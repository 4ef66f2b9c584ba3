pub mod expiry;
pub mod manager;

pub use expiry::HoldExpiry;
pub use manager::ReservationManager;
