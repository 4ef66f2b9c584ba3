use std::sync::Arc;

use boxoffice_core::{
    CoreError, CoreResult, RowLock, StoreTransaction, Transaction, TransactionalStore, TxScope,
};
use boxoffice_shared::{Ticket, TicketId, TicketStatus};
use tracing::{info, instrument};

/// Owns the ticket status machine.
///
/// Every status change re-reads the row under its exclusive lock inside the
/// caller's transaction, then applies a check-and-set, so two transactions
/// claiming the same ticket are serialized by the store and exactly one wins.
/// Nothing here caches ticket state between calls.
#[derive(Clone)]
pub struct TicketAllocator {
    store: Arc<dyn TransactionalStore>,
}

impl TicketAllocator {
    pub fn new(store: Arc<dyn TransactionalStore>) -> Self {
        Self { store }
    }

    pub async fn get_ticket(
        &self,
        outer: Option<&mut Transaction>,
        id: TicketId,
    ) -> CoreResult<Option<Ticket>> {
        let mut scope = TxScope::open(self.store.as_ref(), outer).await?;
        let outcome = scope.tx().find_ticket(id, RowLock::Shared).await;
        scope.close(outcome).await
    }

    /// Transition: Available → Reserved. Losing the race is a `Conflict`.
    #[instrument(skip(self, outer))]
    pub async fn claim(&self, outer: Option<&mut Transaction>, id: TicketId) -> CoreResult<Ticket> {
        let mut scope = TxScope::open(self.store.as_ref(), outer).await?;
        let outcome = claim_in(scope.tx(), id).await;
        scope.close(outcome).await
    }

    /// Transition: Reserved → Sold
    #[instrument(skip(self, outer))]
    pub async fn mark_sold(
        &self,
        outer: Option<&mut Transaction>,
        id: TicketId,
    ) -> CoreResult<Ticket> {
        let mut scope = TxScope::open(self.store.as_ref(), outer).await?;
        let outcome = advance(scope.tx(), id, TicketStatus::Sold).await;
        scope.close(outcome).await
    }

    /// Transition: Reserved → Available (reservation canceled or expired)
    #[instrument(skip(self, outer))]
    pub async fn release(
        &self,
        outer: Option<&mut Transaction>,
        id: TicketId,
    ) -> CoreResult<Ticket> {
        let mut scope = TxScope::open(self.store.as_ref(), outer).await?;
        let outcome = advance(scope.tx(), id, TicketStatus::Available).await;
        scope.close(outcome).await
    }
}

async fn claim_in(tx: &mut Transaction, id: TicketId) -> CoreResult<Ticket> {
    let ticket = locked_ticket(tx, id).await?;

    if !ticket.is_available() {
        return Err(CoreError::Conflict(format!(
            "ticket {} is already {}",
            id, ticket.status
        )));
    }

    swap(tx, id, TicketStatus::Available, TicketStatus::Reserved).await
}

async fn advance(tx: &mut Transaction, id: TicketId, next: TicketStatus) -> CoreResult<Ticket> {
    let ticket = locked_ticket(tx, id).await?;

    if !ticket.status.can_transition_to(next) {
        return Err(CoreError::invalid_transition("ticket", ticket.status, next));
    }

    swap(tx, id, ticket.status, next).await
}

async fn locked_ticket(tx: &mut Transaction, id: TicketId) -> CoreResult<Ticket> {
    tx.find_ticket(id, RowLock::Exclusive)
        .await?
        .ok_or_else(|| CoreError::not_found("ticket", id))
}

async fn swap(
    tx: &mut Transaction,
    id: TicketId,
    from: TicketStatus,
    to: TicketStatus,
) -> CoreResult<Ticket> {
    let ticket = tx
        .swap_ticket_status(id, from, to)
        .await?
        .ok_or_else(|| CoreError::Conflict(format!("ticket {} changed under its lock", id)))?;

    info!(ticket_id = %id, %from, %to, "Ticket status changed");
    Ok(ticket)
}
