use async_trait::async_trait;
use boxoffice_shared::{
    Concert, ConcertId, Reservation, ReservationId, ReservationStatus, Seat, Ticket, TicketId,
    TicketStatus, User, UserId,
};
use chrono::{DateTime, Utc};

use crate::unit_of_work::Transaction;
use crate::CoreResult;

/// Whether a read should take the row's exclusive lock for the rest of the transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowLock {
    Shared,
    Exclusive,
}

/// A relational store that can hand out transactions.
#[async_trait]
pub trait TransactionalStore: Send + Sync {
    async fn begin(&self) -> CoreResult<Transaction>;
}

/// Operations available inside one open store transaction.
///
/// Reads see committed data plus the transaction's own writes. Every write to
/// a ticket or reservation row takes that row's exclusive lock, held until
/// commit or rollback. Lock waits are bounded by the store's lock timeout and
/// surface as `CoreError::Conflict`.
#[async_trait]
pub trait StoreTransaction: Send {
    async fn insert_user(&mut self, user: &User) -> CoreResult<()>;

    async fn find_user(&mut self, id: UserId) -> CoreResult<Option<User>>;

    async fn insert_concert(&mut self, concert: &Concert) -> CoreResult<()>;

    async fn find_concert(&mut self, id: ConcertId) -> CoreResult<Option<Concert>>;

    async fn insert_seats(&mut self, seats: &[Seat]) -> CoreResult<()>;

    /// Seats of a concert in creation order.
    async fn list_seats(&mut self, concert_id: ConcertId) -> CoreResult<Vec<Seat>>;

    async fn insert_ticket(&mut self, ticket: &Ticket) -> CoreResult<()>;

    async fn list_tickets(&mut self, concert_id: ConcertId) -> CoreResult<Vec<Ticket>>;

    async fn find_ticket(&mut self, id: TicketId, lock: RowLock) -> CoreResult<Option<Ticket>>;

    /// Check-and-set on `ticket.status`. Returns `None` when the row is
    /// missing or its status is no longer `expected`.
    async fn swap_ticket_status(
        &mut self,
        id: TicketId,
        expected: TicketStatus,
        next: TicketStatus,
    ) -> CoreResult<Option<Ticket>>;

    async fn insert_reservation(&mut self, reservation: &Reservation) -> CoreResult<()>;

    async fn find_reservation(
        &mut self,
        id: ReservationId,
        lock: RowLock,
    ) -> CoreResult<Option<Reservation>>;

    /// Check-and-set on `reservation.status`, same contract as `swap_ticket_status`.
    async fn swap_reservation_status(
        &mut self,
        id: ReservationId,
        expected: ReservationStatus,
        next: ReservationStatus,
    ) -> CoreResult<Option<Reservation>>;

    async fn reservations_for_ticket(&mut self, ticket_id: TicketId)
        -> CoreResult<Vec<Reservation>>;

    /// Oldest first.
    async fn pending_reserved_before(
        &mut self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> CoreResult<Vec<ReservationId>>;

    async fn commit(&mut self) -> CoreResult<()>;

    async fn rollback(&mut self) -> CoreResult<()>;
}
