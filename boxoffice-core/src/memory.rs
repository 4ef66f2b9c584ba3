//! In-process store with the same transactional contract as the Postgres one.
//!
//! Committed rows live behind one mutex. Each transaction buffers its writes
//! and applies them atomically at commit. Ticket and reservation rows carry
//! their own async lock, taken by locking reads and by every status write and
//! held until the transaction ends, which gives the same read-committed plus
//! `SELECT ... FOR UPDATE` behaviour the allocator relies on in Postgres.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use boxoffice_shared::{
    Concert, ConcertId, Reservation, ReservationId, ReservationStatus, Seat, SeatId, Ticket,
    TicketId, TicketStatus, User, UserId,
};
use chrono::{DateTime, Utc};
use tokio::sync::OwnedMutexGuard;

use crate::repository::{RowLock, StoreTransaction, TransactionalStore};
use crate::unit_of_work::Transaction;
use crate::{CoreError, CoreResult};

pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Default)]
struct Tables {
    users: HashMap<UserId, User>,
    concerts: HashMap<ConcertId, Concert>,
    seats: Vec<Seat>,
    tickets: HashMap<TicketId, Ticket>,
    reservations: HashMap<ReservationId, Reservation>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum RowKey {
    Ticket(TicketId),
    Reservation(ReservationId),
}

struct Shared {
    tables: Mutex<Tables>,
    row_locks: Mutex<HashMap<RowKey, Arc<tokio::sync::Mutex<()>>>>,
    lock_timeout: Duration,
}

impl Shared {
    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn read<R>(&self, f: impl FnOnce(&Tables) -> R) -> R {
        f(&self.tables())
    }

    fn row_lock(&self, key: RowKey) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.row_locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(key).or_default().clone()
    }

    /// Drops lock entries nobody holds or waits on.
    fn prune_row_locks(&self) {
        let mut locks = self.row_locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.retain(|_, row| Arc::strong_count(row) > 1);
    }

    fn apply(&self, pending: Pending) -> CoreResult<()> {
        let mut tables = self.tables();

        // Unique constraints are re-checked against rows committed since the
        // insert was buffered.
        for user in &pending.users {
            if tables.users.values().any(|u| u.email == user.email) {
                return Err(CoreError::Constraint(format!(
                    "user email already registered ({})",
                    user.id
                )));
            }
        }
        for ticket in pending.tickets.values() {
            if tables
                .tickets
                .values()
                .any(|t| t.seat_id == ticket.seat_id && t.id != ticket.id)
            {
                return Err(CoreError::Constraint(format!(
                    "seat {} already has a ticket",
                    ticket.seat_id
                )));
            }
        }

        tables.users.extend(pending.users.into_iter().map(|u| (u.id, u)));
        tables
            .concerts
            .extend(pending.concerts.into_iter().map(|c| (c.id, c)));
        tables.seats.extend(pending.seats);
        tables.tickets.extend(pending.tickets);
        tables.reservations.extend(pending.reservations);
        Ok(())
    }
}

/// Shared handle; clones see the same data.
#[derive(Clone)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_lock_timeout(DEFAULT_LOCK_TIMEOUT)
    }

    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                tables: Mutex::new(Tables::default()),
                row_locks: Mutex::new(HashMap::new()),
                lock_timeout,
            }),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TransactionalStore for MemoryStore {
    async fn begin(&self) -> CoreResult<Transaction> {
        Ok(Transaction::new(Box::new(MemoryTransaction {
            shared: self.shared.clone(),
            pending: Pending::default(),
            held: HashMap::new(),
            finished: false,
            aborted: false,
        })))
    }
}

#[derive(Default)]
struct Pending {
    users: Vec<User>,
    concerts: Vec<Concert>,
    seats: Vec<Seat>,
    tickets: HashMap<TicketId, Ticket>,
    reservations: HashMap<ReservationId, Reservation>,
}

struct MemoryTransaction {
    shared: Arc<Shared>,
    pending: Pending,
    held: HashMap<RowKey, OwnedMutexGuard<()>>,
    finished: bool,
    /// Set by a lock timeout. Only rollback is accepted afterwards.
    aborted: bool,
}

impl MemoryTransaction {
    fn ensure_open(&self) -> CoreResult<()> {
        if self.finished {
            return Err(CoreError::TransactionFailure(
                "transaction already finished".to_string(),
            ));
        }
        if self.aborted {
            return Err(aborted());
        }
        Ok(())
    }

    async fn lock(&mut self, key: RowKey) -> CoreResult<()> {
        if self.held.contains_key(&key) {
            return Ok(());
        }
        let row = self.shared.row_lock(key);
        match tokio::time::timeout(self.shared.lock_timeout, row.lock_owned()).await {
            Ok(guard) => {
                self.held.insert(key, guard);
                Ok(())
            }
            Err(_) => {
                self.aborted = true;
                Err(CoreError::Conflict(format!(
                    "timed out waiting for lock on {:?}",
                    key
                )))
            }
        }
    }

    fn finish(&mut self) {
        self.finished = true;
        self.held.clear();
        self.shared.prune_row_locks();
    }

    fn user_exists(&self, id: UserId) -> bool {
        self.pending.users.iter().any(|u| u.id == id)
            || self.shared.read(|t| t.users.contains_key(&id))
    }

    fn concert_exists(&self, id: ConcertId) -> bool {
        self.pending.concerts.iter().any(|c| c.id == id)
            || self.shared.read(|t| t.concerts.contains_key(&id))
    }

    fn seat_exists(&self, id: SeatId) -> bool {
        self.pending.seats.iter().any(|s| s.id == id)
            || self.shared.read(|t| t.seats.iter().any(|s| s.id == id))
    }

    fn current_ticket(&self, id: TicketId) -> Option<Ticket> {
        self.pending
            .tickets
            .get(&id)
            .cloned()
            .or_else(|| self.shared.read(|t| t.tickets.get(&id).cloned()))
    }

    fn current_reservation(&self, id: ReservationId) -> Option<Reservation> {
        self.pending
            .reservations
            .get(&id)
            .cloned()
            .or_else(|| self.shared.read(|t| t.reservations.get(&id).cloned()))
    }

    fn visible_tickets(&self, keep: impl Fn(&Ticket) -> bool) -> Vec<Ticket> {
        let committed: HashMap<TicketId, Ticket> = self.shared.read(|t| {
            t.tickets
                .iter()
                .filter(|&(_, ticket)| keep(ticket))
                .map(|(id, ticket)| (*id, ticket.clone()))
                .collect()
        });
        overlay(committed, &self.pending.tickets, keep)
    }

    fn visible_reservations(&self, keep: impl Fn(&Reservation) -> bool) -> Vec<Reservation> {
        let committed: HashMap<ReservationId, Reservation> = self.shared.read(|t| {
            t.reservations
                .iter()
                .filter(|&(_, r)| keep(r))
                .map(|(id, r)| (*id, r.clone()))
                .collect()
        });
        overlay(committed, &self.pending.reservations, keep)
    }
}

fn aborted() -> CoreError {
    CoreError::TransactionFailure(
        "transaction aborted by a lock timeout, roll it back".to_string(),
    )
}

/// Layers this transaction's own writes over the committed rows.
fn overlay<K, V>(
    mut committed: HashMap<K, V>,
    pending: &HashMap<K, V>,
    keep: impl Fn(&V) -> bool,
) -> Vec<V>
where
    K: Eq + Hash + Copy,
    V: Clone,
{
    for (id, row) in pending {
        if keep(row) {
            committed.insert(*id, row.clone());
        } else {
            committed.remove(id);
        }
    }
    committed.into_values().collect()
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        if !self.finished {
            self.finish();
        }
    }
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn insert_user(&mut self, user: &User) -> CoreResult<()> {
        self.ensure_open()?;
        let taken = self.pending.users.iter().any(|u| u.email == user.email)
            || self
                .shared
                .read(|t| t.users.values().any(|u| u.email == user.email));
        if taken {
            return Err(CoreError::Constraint(format!(
                "user email already registered ({})",
                user.id
            )));
        }
        self.pending.users.push(user.clone());
        Ok(())
    }

    async fn find_user(&mut self, id: UserId) -> CoreResult<Option<User>> {
        self.ensure_open()?;
        Ok(self
            .pending
            .users
            .iter()
            .find(|u| u.id == id)
            .cloned()
            .or_else(|| self.shared.read(|t| t.users.get(&id).cloned())))
    }

    async fn insert_concert(&mut self, concert: &Concert) -> CoreResult<()> {
        self.ensure_open()?;
        self.pending.concerts.push(concert.clone());
        Ok(())
    }

    async fn find_concert(&mut self, id: ConcertId) -> CoreResult<Option<Concert>> {
        self.ensure_open()?;
        Ok(self
            .pending
            .concerts
            .iter()
            .find(|c| c.id == id)
            .cloned()
            .or_else(|| self.shared.read(|t| t.concerts.get(&id).cloned())))
    }

    async fn insert_seats(&mut self, seats: &[Seat]) -> CoreResult<()> {
        self.ensure_open()?;
        for seat in seats {
            if !self.concert_exists(seat.concert_id) {
                return Err(CoreError::Constraint(format!(
                    "seat references unknown concert {}",
                    seat.concert_id
                )));
            }
        }
        self.pending.seats.extend_from_slice(seats);
        Ok(())
    }

    async fn list_seats(&mut self, concert_id: ConcertId) -> CoreResult<Vec<Seat>> {
        self.ensure_open()?;
        let mut seats: Vec<Seat> = self.shared.read(|t| {
            t.seats
                .iter()
                .filter(|s| s.concert_id == concert_id)
                .cloned()
                .collect()
        });
        seats.extend(
            self.pending
                .seats
                .iter()
                .filter(|s| s.concert_id == concert_id)
                .cloned(),
        );
        Ok(seats)
    }

    async fn insert_ticket(&mut self, ticket: &Ticket) -> CoreResult<()> {
        self.ensure_open()?;
        if !self.concert_exists(ticket.concert_id) {
            return Err(CoreError::Constraint(format!(
                "ticket references unknown concert {}",
                ticket.concert_id
            )));
        }
        if !self.seat_exists(ticket.seat_id) {
            return Err(CoreError::Constraint(format!(
                "ticket references unknown seat {}",
                ticket.seat_id
            )));
        }
        if !self.visible_tickets(|t| t.seat_id == ticket.seat_id).is_empty() {
            return Err(CoreError::Constraint(format!(
                "seat {} already has a ticket",
                ticket.seat_id
            )));
        }
        self.pending.tickets.insert(ticket.id, ticket.clone());
        Ok(())
    }

    async fn list_tickets(&mut self, concert_id: ConcertId) -> CoreResult<Vec<Ticket>> {
        self.ensure_open()?;
        let mut tickets = self.visible_tickets(|t| t.concert_id == concert_id);
        tickets.sort_by_key(|t| (t.created_at, t.id));
        Ok(tickets)
    }

    async fn find_ticket(&mut self, id: TicketId, lock: RowLock) -> CoreResult<Option<Ticket>> {
        self.ensure_open()?;
        if lock == RowLock::Exclusive {
            self.lock(RowKey::Ticket(id)).await?;
        }
        Ok(self.current_ticket(id))
    }

    async fn swap_ticket_status(
        &mut self,
        id: TicketId,
        expected: TicketStatus,
        next: TicketStatus,
    ) -> CoreResult<Option<Ticket>> {
        self.ensure_open()?;
        self.lock(RowKey::Ticket(id)).await?;
        match self.current_ticket(id) {
            Some(mut ticket) if ticket.status == expected => {
                ticket.status = next;
                self.pending.tickets.insert(id, ticket.clone());
                Ok(Some(ticket))
            }
            _ => Ok(None),
        }
    }

    async fn insert_reservation(&mut self, reservation: &Reservation) -> CoreResult<()> {
        self.ensure_open()?;
        if !self.user_exists(reservation.user_id) {
            return Err(CoreError::Constraint(format!(
                "reservation references unknown user {}",
                reservation.user_id
            )));
        }
        if self.current_ticket(reservation.ticket_id).is_none() {
            return Err(CoreError::Constraint(format!(
                "reservation references unknown ticket {}",
                reservation.ticket_id
            )));
        }
        self.pending
            .reservations
            .insert(reservation.id, reservation.clone());
        Ok(())
    }

    async fn find_reservation(
        &mut self,
        id: ReservationId,
        lock: RowLock,
    ) -> CoreResult<Option<Reservation>> {
        self.ensure_open()?;
        if lock == RowLock::Exclusive {
            self.lock(RowKey::Reservation(id)).await?;
        }
        Ok(self.current_reservation(id))
    }

    async fn swap_reservation_status(
        &mut self,
        id: ReservationId,
        expected: ReservationStatus,
        next: ReservationStatus,
    ) -> CoreResult<Option<Reservation>> {
        self.ensure_open()?;
        self.lock(RowKey::Reservation(id)).await?;
        match self.current_reservation(id) {
            Some(mut reservation) if reservation.status == expected => {
                reservation.status = next;
                self.pending.reservations.insert(id, reservation.clone());
                Ok(Some(reservation))
            }
            _ => Ok(None),
        }
    }

    async fn reservations_for_ticket(
        &mut self,
        ticket_id: TicketId,
    ) -> CoreResult<Vec<Reservation>> {
        self.ensure_open()?;
        let mut reservations = self.visible_reservations(|r| r.ticket_id == ticket_id);
        reservations.sort_by_key(|r| (r.reserved_at, r.id));
        Ok(reservations)
    }

    async fn pending_reserved_before(
        &mut self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> CoreResult<Vec<ReservationId>> {
        self.ensure_open()?;
        let mut stale = self.visible_reservations(|r| {
            r.status == ReservationStatus::Pending && r.reserved_at < cutoff
        });
        stale.sort_by_key(|r| (r.reserved_at, r.id));
        Ok(stale.into_iter().take(limit).map(|r| r.id).collect())
    }

    async fn commit(&mut self) -> CoreResult<()> {
        if self.aborted && !self.finished {
            self.pending = Pending::default();
            self.finish();
            return Err(aborted());
        }
        self.ensure_open()?;
        let pending = std::mem::take(&mut self.pending);
        let outcome = self.shared.apply(pending);
        self.finish();
        outcome
    }

    async fn rollback(&mut self) -> CoreResult<()> {
        if self.finished {
            return Err(CoreError::TransactionFailure(
                "transaction already finished".to_string(),
            ));
        }
        self.pending = Pending::default();
        self.finish();
        Ok(())
    }
}
