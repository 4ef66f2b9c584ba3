use std::fmt;
use std::sync::Arc;

use boxoffice_core::{
    CoreError, CoreResult, StoreTransaction, Transaction, TransactionalStore, TxScope,
};
use boxoffice_shared::{Concert, ConcertId, Seat, SeatId, Ticket};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

const DEFAULT_SECTION: &str = "A";
const MAX_NAME_LEN: usize = 255;
/// Largest venue a single request may lay out.
pub const MAX_SEATS: u32 = 100_000;

/// Result of a bulk seat creation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SeatBatch {
    pub concert_id: ConcertId,
    pub created: u32,
}

impl fmt::Display for SeatBatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} seats created for concert {}", self.created, self.concert_id)
    }
}

/// Concert, seat and ticket data entry
#[derive(Clone)]
pub struct CatalogService {
    store: Arc<dyn TransactionalStore>,
}

impl CatalogService {
    pub fn new(store: Arc<dyn TransactionalStore>) -> Self {
        Self { store }
    }

    #[instrument(skip(self, outer))]
    pub async fn create_concert(
        &self,
        outer: Option<&mut Transaction>,
        name: &str,
        event_date: DateTime<Utc>,
    ) -> CoreResult<Concert> {
        let name = name.trim();
        if name.is_empty() || name.len() > MAX_NAME_LEN {
            return Err(CoreError::Validation(format!(
                "concert name must be 1-{} characters",
                MAX_NAME_LEN
            )));
        }

        let concert = Concert::new(name.to_string(), event_date);
        let mut scope = TxScope::open(self.store.as_ref(), outer).await?;
        let outcome = scope.tx().insert_concert(&concert).await;
        scope.close(outcome).await?;

        info!(concert_id = %concert.id, "Concert created");
        Ok(concert)
    }

    pub async fn get_concert(
        &self,
        outer: Option<&mut Transaction>,
        id: ConcertId,
    ) -> CoreResult<Option<Concert>> {
        let mut scope = TxScope::open(self.store.as_ref(), outer).await?;
        let outcome = scope.tx().find_concert(id).await;
        scope.close(outcome).await
    }

    /// Seats are numbered `1..=count` in section A.
    #[instrument(skip(self, outer))]
    pub async fn create_seats(
        &self,
        outer: Option<&mut Transaction>,
        concert_id: ConcertId,
        count: u32,
    ) -> CoreResult<SeatBatch> {
        if count == 0 {
            return Err(CoreError::Validation(
                "a concert needs at least one seat".to_string(),
            ));
        }
        if count > MAX_SEATS {
            return Err(CoreError::Validation(format!(
                "a concert can have at most {} seats",
                MAX_SEATS
            )));
        }

        let mut scope = TxScope::open(self.store.as_ref(), outer).await?;
        let outcome = insert_seats(scope.tx(), concert_id, count).await;
        let batch = scope.close(outcome).await?;

        info!(%concert_id, created = batch.created, "Seats created");
        Ok(batch)
    }

    pub async fn list_seats(
        &self,
        outer: Option<&mut Transaction>,
        concert_id: ConcertId,
    ) -> CoreResult<Vec<Seat>> {
        let mut scope = TxScope::open(self.store.as_ref(), outer).await?;
        let outcome = scope.tx().list_seats(concert_id).await;
        scope.close(outcome).await
    }

    /// Issues an available ticket for a seat of the concert.
    #[instrument(skip(self, outer))]
    pub async fn create_ticket(
        &self,
        outer: Option<&mut Transaction>,
        concert_id: ConcertId,
        seat_id: SeatId,
        price_cents: i64,
    ) -> CoreResult<Ticket> {
        if price_cents < 0 {
            return Err(CoreError::Validation(format!(
                "ticket price cannot be negative: {}",
                price_cents
            )));
        }

        let mut scope = TxScope::open(self.store.as_ref(), outer).await?;
        let outcome = issue_ticket(scope.tx(), concert_id, seat_id, price_cents).await;
        let ticket = scope.close(outcome).await?;

        info!(ticket_id = %ticket.id, %seat_id, "Ticket issued");
        Ok(ticket)
    }

    pub async fn list_tickets(
        &self,
        outer: Option<&mut Transaction>,
        concert_id: ConcertId,
    ) -> CoreResult<Vec<Ticket>> {
        let mut scope = TxScope::open(self.store.as_ref(), outer).await?;
        let outcome = scope.tx().list_tickets(concert_id).await;
        scope.close(outcome).await
    }
}

async fn insert_seats(
    tx: &mut Transaction,
    concert_id: ConcertId,
    count: u32,
) -> CoreResult<SeatBatch> {
    if tx.find_concert(concert_id).await?.is_none() {
        return Err(CoreError::not_found("concert", concert_id));
    }

    let seats: Vec<Seat> = (1..=count)
        .map(|n| Seat::new(concert_id, n.to_string(), Some(DEFAULT_SECTION.to_string())))
        .collect();
    tx.insert_seats(&seats).await?;

    Ok(SeatBatch {
        concert_id,
        created: count,
    })
}

async fn issue_ticket(
    tx: &mut Transaction,
    concert_id: ConcertId,
    seat_id: SeatId,
    price_cents: i64,
) -> CoreResult<Ticket> {
    if tx.find_concert(concert_id).await?.is_none() {
        return Err(CoreError::not_found("concert", concert_id));
    }
    let seats = tx.list_seats(concert_id).await?;
    if !seats.iter().any(|s| s.id == seat_id) {
        return Err(CoreError::not_found("seat", seat_id));
    }

    let ticket = Ticket::new(concert_id, seat_id, price_cents);
    tx.insert_ticket(&ticket).await?;
    Ok(ticket)
}
