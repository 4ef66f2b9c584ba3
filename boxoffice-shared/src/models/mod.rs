pub mod entities;
pub mod status;

pub use entities::{Concert, Reservation, Seat, Ticket, User};
pub use status::{ReservationStatus, TicketStatus, UnknownStatus};
