use crate::ids::{ConcertId, ReservationId, SeatId, TicketId, UserId};
use crate::models::status::{ReservationStatus, TicketStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(username: String, email: String) -> Self {
        Self {
            id: UserId::new(),
            username,
            email,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Concert {
    pub id: ConcertId,
    pub name: String,
    pub event_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Concert {
    pub fn new(name: String, event_date: DateTime<Utc>) -> Self {
        Self {
            id: ConcertId::new(),
            name,
            event_date,
            created_at: Utc::now(),
        }
    }
}

/// A seat label within a concert. Number and section carry no ordering.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Seat {
    pub id: SeatId,
    pub concert_id: ConcertId,
    pub seat_number: String,
    pub section: Option<String>,
}

impl Seat {
    pub fn new(concert_id: ConcertId, seat_number: String, section: Option<String>) -> Self {
        Self {
            id: SeatId::new(),
            concert_id,
            seat_number,
            section,
        }
    }
}

/// The sellable unit, tied 1:1 to a seat
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Ticket {
    pub id: TicketId,
    pub concert_id: ConcertId,
    pub seat_id: SeatId,
    pub price_cents: i64,
    pub status: TicketStatus,
    pub created_at: DateTime<Utc>,
}

impl Ticket {
    /// Newly issued tickets always start out available.
    pub fn new(concert_id: ConcertId, seat_id: SeatId, price_cents: i64) -> Self {
        Self {
            id: TicketId::new(),
            concert_id,
            seat_id,
            price_cents,
            status: TicketStatus::Available,
            created_at: Utc::now(),
        }
    }

    pub fn is_available(&self) -> bool {
        self.status == TicketStatus::Available
    }
}

/// A user's claim on one ticket
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Reservation {
    pub id: ReservationId,
    pub user_id: UserId,
    pub ticket_id: TicketId,
    pub status: ReservationStatus,
    pub reserved_at: DateTime<Utc>,
}

impl Reservation {
    pub fn pending(user_id: UserId, ticket_id: TicketId) -> Self {
        Self {
            id: ReservationId::new(),
            user_id,
            ticket_id,
            status: ReservationStatus::Pending,
            reserved_at: Utc::now(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }
}
