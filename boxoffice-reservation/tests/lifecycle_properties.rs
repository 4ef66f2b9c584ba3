//! Property tests over random sequences of reserve/confirm/cancel/expire
//! calls. After every step each ticket's status must agree with its active
//! reservation, and settled reservations must never change again.

use std::collections::HashMap;
use std::sync::Arc;

use boxoffice_catalog::CatalogService;
use boxoffice_core::{
    IdentityService, MemoryStore, RowLock, StoreTransaction, TransactionalStore,
};
use boxoffice_reservation::{HoldExpiry, ReservationManager};
use boxoffice_shared::{ReservationId, ReservationStatus, Ticket, TicketStatus, UserId};
use chrono::{Duration, Utc};
use proptest::prelude::*;

const USERS: usize = 3;
const TICKETS: u32 = 2;

#[derive(Debug, Clone)]
enum Op {
    Reserve { user: usize, ticket: usize },
    Confirm(usize),
    Cancel(usize),
    Expire,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0..USERS, 0..TICKETS as usize).prop_map(|(user, ticket)| Op::Reserve { user, ticket }),
        2 => any::<usize>().prop_map(Op::Confirm),
        2 => any::<usize>().prop_map(Op::Cancel),
        1 => Just(Op::Expire),
    ]
}

struct World {
    store: Arc<dyn TransactionalStore>,
    manager: ReservationManager,
    expiry: HoldExpiry,
    users: Vec<UserId>,
    tickets: Vec<Ticket>,
}

async fn world() -> World {
    let store: Arc<dyn TransactionalStore> = Arc::new(MemoryStore::new());
    let identity = IdentityService::new(store.clone());
    let catalog = CatalogService::new(store.clone());

    let mut users = Vec::new();
    for i in 0..USERS {
        let user = identity
            .register_user(None, &format!("fan_{}", i), &format!("fan{}@example.com", i))
            .await
            .unwrap();
        users.push(user.id);
    }

    let concert = catalog
        .create_concert(None, "Property Night", Utc::now())
        .await
        .unwrap();
    catalog.create_seats(None, concert.id, TICKETS).await.unwrap();
    let mut tickets = Vec::new();
    for seat in catalog.list_seats(None, concert.id).await.unwrap() {
        tickets.push(
            catalog
                .create_ticket(None, concert.id, seat.id, 8_000)
                .await
                .unwrap(),
        );
    }

    let manager = ReservationManager::new(store.clone());
    // A zero-length hold makes every pending reservation eligible for expiry.
    let expiry = HoldExpiry::new(manager.clone(), Duration::zero(), 100);
    World {
        store,
        manager,
        expiry,
        users,
        tickets,
    }
}

/// Ticket status must mirror the active reservation, and there is at most one.
async fn check_correspondence(world: &World) -> Result<(), TestCaseError> {
    let mut tx = world.store.begin().await.unwrap();
    for ticket in &world.tickets {
        let current = tx
            .find_ticket(ticket.id, RowLock::Shared)
            .await
            .unwrap()
            .unwrap();
        let active: Vec<_> = tx
            .reservations_for_ticket(ticket.id)
            .await
            .unwrap()
            .into_iter()
            .filter(|r| r.is_active())
            .collect();

        prop_assert!(active.len() <= 1, "ticket {} has {} active reservations", ticket.id, active.len());
        match active.first().map(|r| r.status) {
            None => prop_assert_eq!(current.status, TicketStatus::Available),
            Some(ReservationStatus::Pending) => prop_assert_eq!(current.status, TicketStatus::Reserved),
            Some(ReservationStatus::Confirmed) => prop_assert_eq!(current.status, TicketStatus::Sold),
            Some(ReservationStatus::Canceled) => unreachable!(),
        }
    }
    Ok(())
}

async fn run_ops(ops: Vec<Op>) -> Result<(), TestCaseError> {
    let world = world().await;
    let mut known: Vec<ReservationId> = Vec::new();
    let mut settled: HashMap<ReservationId, ReservationStatus> = HashMap::new();

    for op in ops {
        match op {
            Op::Reserve { user, ticket } => {
                let outcome = world
                    .manager
                    .reserve_ticket(None, world.users[user], world.tickets[ticket].id)
                    .await
                    .unwrap();
                if let Some(reservation) = outcome {
                    known.push(reservation.id);
                }
            }
            Op::Confirm(_) | Op::Cancel(_) if known.is_empty() => {}
            Op::Confirm(pick) => {
                let id = known[pick % known.len()];
                let _ = world.manager.confirm_reservation(None, id).await;
            }
            Op::Cancel(pick) => {
                let id = known[pick % known.len()];
                let _ = world.manager.cancel_reservation(None, id).await;
            }
            Op::Expire => {
                world.expiry.sweep(Utc::now() + Duration::seconds(1)).await.unwrap();
            }
        }

        check_correspondence(&world).await?;

        for id in &known {
            let status = world
                .manager
                .get_reservation(None, *id)
                .await
                .unwrap()
                .unwrap()
                .status;
            if let Some(previous) = settled.get(id) {
                prop_assert_eq!(*previous, status, "settled reservation {} changed", id);
            } else if status != ReservationStatus::Pending {
                settled.insert(*id, status);
            }
        }
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_status_tracks_active_reservation(ops in prop::collection::vec(op_strategy(), 1..40)) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(run_ops(ops))?;
    }
}
