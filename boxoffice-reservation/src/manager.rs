use std::sync::Arc;

use boxoffice_catalog::TicketAllocator;
use boxoffice_core::{
    CoreError, CoreResult, RowLock, StoreTransaction, Transaction, TransactionalStore, TxScope,
};
use boxoffice_shared::{Reservation, ReservationId, ReservationStatus, TicketId, UserId};
use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Settlement {
    Confirm,
    Cancel,
}

impl Settlement {
    fn target(self) -> ReservationStatus {
        match self {
            Settlement::Confirm => ReservationStatus::Confirmed,
            Settlement::Cancel => ReservationStatus::Canceled,
        }
    }
}

/// Drives the reservation lifecycle across the ticket and reservation rows.
///
/// Each operation is one unit of work: either both rows change or neither
/// does. The manager is the only writer of `Reservation.status`; ticket status
/// changes go through the `TicketAllocator` inside the same transaction.
#[derive(Clone)]
pub struct ReservationManager {
    store: Arc<dyn TransactionalStore>,
    allocator: TicketAllocator,
}

impl ReservationManager {
    pub fn new(store: Arc<dyn TransactionalStore>) -> Self {
        let allocator = TicketAllocator::new(store.clone());
        Self { store, allocator }
    }

    pub fn allocator(&self) -> &TicketAllocator {
        &self.allocator
    }

    /// Claims the ticket and records a pending reservation for the user.
    ///
    /// Returns `None` when the ticket is missing, already taken, or another
    /// transaction wins the claim. That is the normal outcome of losing a race,
    /// not an error. Inside a caller's transaction a lost claim is returned as
    /// `Conflict` instead, since the caller's whole unit has to be abandoned.
    #[instrument(skip(self, outer))]
    pub async fn reserve_ticket(
        &self,
        outer: Option<&mut Transaction>,
        user_id: UserId,
        ticket_id: TicketId,
    ) -> CoreResult<Option<Reservation>> {
        let mut scope = TxScope::open(self.store.as_ref(), outer).await?;
        let root = scope.is_root();
        let outcome = self.reserve_in(scope.tx(), user_id, ticket_id).await;
        let reservation = match scope.close(outcome).await {
            Ok(reservation) => reservation,
            // Our own unit was rolled back, so a lost claim leaves nothing behind.
            // A joined caller's unit is aborted too and must see the conflict.
            Err(CoreError::Conflict(reason)) if root => {
                debug!(%ticket_id, %reason, "Lost ticket claim");
                None
            }
            Err(err) => return Err(err),
        };

        if let Some(reservation) = &reservation {
            info!(reservation_id = %reservation.id, %ticket_id, %user_id, "Ticket reserved");
        }
        Ok(reservation)
    }

    /// Transition: Pending → Confirmed, ticket Reserved → Sold
    #[instrument(skip(self, outer))]
    pub async fn confirm_reservation(
        &self,
        outer: Option<&mut Transaction>,
        id: ReservationId,
    ) -> CoreResult<Option<Reservation>> {
        self.settle(outer, id, Settlement::Confirm).await
    }

    /// Transition: Pending → Canceled, ticket Reserved → Available
    #[instrument(skip(self, outer))]
    pub async fn cancel_reservation(
        &self,
        outer: Option<&mut Transaction>,
        id: ReservationId,
    ) -> CoreResult<Option<Reservation>> {
        self.settle(outer, id, Settlement::Cancel).await
    }

    pub async fn get_reservation(
        &self,
        outer: Option<&mut Transaction>,
        id: ReservationId,
    ) -> CoreResult<Option<Reservation>> {
        let mut scope = TxScope::open(self.store.as_ref(), outer).await?;
        let outcome = scope.tx().find_reservation(id, RowLock::Shared).await;
        scope.close(outcome).await
    }

    /// Pending reservations made before `cutoff`, oldest first.
    pub async fn pending_before(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> CoreResult<Vec<ReservationId>> {
        let mut scope = TxScope::open(self.store.as_ref(), None).await?;
        let outcome = scope.tx().pending_reserved_before(cutoff, limit).await;
        scope.close(outcome).await
    }

    async fn reserve_in(
        &self,
        tx: &mut Transaction,
        user_id: UserId,
        ticket_id: TicketId,
    ) -> CoreResult<Option<Reservation>> {
        match self.allocator.get_ticket(Some(&mut *tx), ticket_id).await? {
            Some(ticket) if ticket.is_available() => {}
            Some(ticket) => {
                debug!(%ticket_id, status = %ticket.status, "Ticket not available");
                return Ok(None);
            }
            None => {
                debug!(%ticket_id, "Ticket not found");
                return Ok(None);
            }
        }

        // The claim re-reads the row under its lock; this is where races are decided.
        self.allocator.claim(Some(&mut *tx), ticket_id).await?;

        let reservation = Reservation::pending(user_id, ticket_id);
        tx.insert_reservation(&reservation).await?;
        Ok(Some(reservation))
    }

    async fn settle(
        &self,
        outer: Option<&mut Transaction>,
        id: ReservationId,
        settlement: Settlement,
    ) -> CoreResult<Option<Reservation>> {
        let mut scope = TxScope::open(self.store.as_ref(), outer).await?;
        let outcome = self.settle_in(scope.tx(), id, settlement).await;
        let settled = scope.close(outcome).await?;

        match &settled {
            Some(reservation) => info!(
                reservation_id = %id,
                ticket_id = %reservation.ticket_id,
                status = %reservation.status,
                "Reservation settled"
            ),
            None => debug!(reservation_id = %id, "Reservation not found"),
        }
        Ok(settled)
    }

    async fn settle_in(
        &self,
        tx: &mut Transaction,
        id: ReservationId,
        settlement: Settlement,
    ) -> CoreResult<Option<Reservation>> {
        let Some(reservation) = tx.find_reservation(id, RowLock::Exclusive).await? else {
            return Ok(None);
        };

        let target = settlement.target();
        if !reservation.status.can_transition_to(target) {
            return Err(CoreError::invalid_transition(
                "reservation",
                reservation.status,
                target,
            ));
        }

        let updated = tx
            .swap_reservation_status(id, reservation.status, target)
            .await?
            .ok_or_else(|| {
                CoreError::Conflict(format!("reservation {} changed under its lock", id))
            })?;

        match settlement {
            Settlement::Confirm => {
                self.allocator
                    .mark_sold(Some(&mut *tx), reservation.ticket_id)
                    .await?
            }
            Settlement::Cancel => {
                self.allocator
                    .release(Some(&mut *tx), reservation.ticket_id)
                    .await?
            }
        };

        Ok(Some(updated))
    }
}
