pub mod ids;
pub mod models;
pub mod pii;

pub use ids::{ConcertId, ReservationId, SeatId, TicketId, UserId};
pub use models::{
    Concert, Reservation, ReservationStatus, Seat, Ticket, TicketStatus, UnknownStatus, User,
};
pub use pii::{redact_email, Masked};
