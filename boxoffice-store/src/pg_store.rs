use std::time::Duration;

use async_trait::async_trait;
use boxoffice_core::{
    CoreError, CoreResult, RowLock, StoreTransaction, Transaction, TransactionalStore,
};
use boxoffice_shared::{
    Concert, ConcertId, Reservation, ReservationId, ReservationStatus, Seat, Ticket, TicketId,
    TicketStatus, UnknownStatus, User, UserId,
};
use chrono::{DateTime, Utc};
use sqlx::postgres::PgConnection;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::debug;
use uuid::Uuid;

// Postgres SQLSTATE codes we translate
const LOCK_NOT_AVAILABLE: &str = "55P03";
const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";
const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";

const SEAT_INSERT_CHUNK: usize = 1_000;

/// PostgreSQL-backed store. Every transaction runs at READ COMMITTED with
/// `lock_timeout` set, so row lock waits fail as `Conflict` instead of hanging.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PgStore {
    pub fn new(pool: PgPool, lock_timeout: Duration) -> Self {
        Self { pool, lock_timeout }
    }
}

#[async_trait]
impl TransactionalStore for PgStore {
    async fn begin(&self) -> CoreResult<Transaction> {
        let mut tx = self.pool.begin().await.map_err(store_error)?;
        // SET does not take bind parameters
        let statement = format!(
            "SET LOCAL lock_timeout = '{}ms'",
            self.lock_timeout.as_millis()
        );
        sqlx::query(&statement)
            .execute(&mut *tx)
            .await
            .map_err(store_error)?;
        Ok(Transaction::new(Box::new(PgTransaction { tx: Some(tx) })))
    }
}

struct PgTransaction {
    tx: Option<sqlx::Transaction<'static, Postgres>>,
}

impl PgTransaction {
    fn conn(&mut self) -> CoreResult<&mut PgConnection> {
        self.tx.as_deref_mut().ok_or_else(finished)
    }
}

fn finished() -> CoreError {
    CoreError::TransactionFailure("transaction already finished".to_string())
}

fn store_error(err: sqlx::Error) -> CoreError {
    if let Some(db) = err.as_database_error() {
        let code = db.code();
        debug!(code = ?code, message = db.message(), "Database error");
        match code.as_deref() {
            Some(LOCK_NOT_AVAILABLE | SERIALIZATION_FAILURE | DEADLOCK_DETECTED) => {
                return CoreError::Conflict(db.message().to_string());
            }
            Some(UNIQUE_VIOLATION | FOREIGN_KEY_VIOLATION) => {
                return CoreError::Constraint(db.message().to_string());
            }
            _ => {}
        }
    }
    CoreError::TransactionFailure(err.to_string())
}

fn corrupt_row(err: UnknownStatus) -> CoreError {
    CoreError::TransactionFailure(format!("corrupt row: {}", err))
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    username: String,
    email: String,
    created_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: row.id.into(),
            username: row.username,
            email: row.email,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ConcertRow {
    id: Uuid,
    name: String,
    event_date: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl From<ConcertRow> for Concert {
    fn from(row: ConcertRow) -> Self {
        Concert {
            id: row.id.into(),
            name: row.name,
            event_date: row.event_date,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct SeatRow {
    id: Uuid,
    concert_id: Uuid,
    seat_number: String,
    section: Option<String>,
}

impl From<SeatRow> for Seat {
    fn from(row: SeatRow) -> Self {
        Seat {
            id: row.id.into(),
            concert_id: row.concert_id.into(),
            seat_number: row.seat_number,
            section: row.section,
        }
    }
}

#[derive(sqlx::FromRow)]
struct TicketRow {
    id: Uuid,
    concert_id: Uuid,
    seat_id: Uuid,
    price_cents: i64,
    status: String,
    created_at: DateTime<Utc>,
}

impl TicketRow {
    fn into_ticket(self) -> CoreResult<Ticket> {
        Ok(Ticket {
            id: self.id.into(),
            concert_id: self.concert_id.into(),
            seat_id: self.seat_id.into(),
            price_cents: self.price_cents,
            status: self.status.parse().map_err(corrupt_row)?,
            created_at: self.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ReservationRow {
    id: Uuid,
    user_id: Uuid,
    ticket_id: Uuid,
    status: String,
    reserved_at: DateTime<Utc>,
}

impl ReservationRow {
    fn into_reservation(self) -> CoreResult<Reservation> {
        Ok(Reservation {
            id: self.id.into(),
            user_id: self.user_id.into(),
            ticket_id: self.ticket_id.into(),
            status: self.status.parse().map_err(corrupt_row)?,
            reserved_at: self.reserved_at,
        })
    }
}

#[async_trait]
impl StoreTransaction for PgTransaction {
    async fn insert_user(&mut self, user: &User) -> CoreResult<()> {
        sqlx::query(
            r#"INSERT INTO "user" (id, username, email, created_at) VALUES ($1, $2, $3, $4)"#,
        )
        .bind(user.id.as_uuid())
        .bind(&user.username)
        .bind(&user.email)
        .bind(user.created_at)
        .execute(self.conn()?)
        .await
        .map_err(store_error)?;
        Ok(())
    }

    async fn find_user(&mut self, id: UserId) -> CoreResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"SELECT id, username, email, created_at FROM "user" WHERE id = $1"#,
        )
        .bind(id.as_uuid())
        .fetch_optional(self.conn()?)
        .await
        .map_err(store_error)?;
        Ok(row.map(User::from))
    }

    async fn insert_concert(&mut self, concert: &Concert) -> CoreResult<()> {
        sqlx::query(
            "INSERT INTO concert (id, name, event_date, created_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(concert.id.as_uuid())
        .bind(&concert.name)
        .bind(concert.event_date)
        .bind(concert.created_at)
        .execute(self.conn()?)
        .await
        .map_err(store_error)?;
        Ok(())
    }

    async fn find_concert(&mut self, id: ConcertId) -> CoreResult<Option<Concert>> {
        let row = sqlx::query_as::<_, ConcertRow>(
            "SELECT id, name, event_date, created_at FROM concert WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(self.conn()?)
        .await
        .map_err(store_error)?;
        Ok(row.map(Concert::from))
    }

    async fn insert_seats(&mut self, seats: &[Seat]) -> CoreResult<()> {
        for chunk in seats.chunks(SEAT_INSERT_CHUNK) {
            let mut builder: QueryBuilder<Postgres> =
                QueryBuilder::new("INSERT INTO seat (id, concert_id, seat_number, section) ");
            builder.push_values(chunk, |mut row, seat| {
                row.push_bind(seat.id.as_uuid())
                    .push_bind(seat.concert_id.as_uuid())
                    .push_bind(seat.seat_number.clone())
                    .push_bind(seat.section.clone());
            });
            builder
                .build()
                .execute(self.conn()?)
                .await
                .map_err(store_error)?;
        }
        Ok(())
    }

    async fn list_seats(&mut self, concert_id: ConcertId) -> CoreResult<Vec<Seat>> {
        let rows = sqlx::query_as::<_, SeatRow>(
            "SELECT id, concert_id, seat_number, section FROM seat WHERE concert_id = $1 ORDER BY seq",
        )
        .bind(concert_id.as_uuid())
        .fetch_all(self.conn()?)
        .await
        .map_err(store_error)?;
        Ok(rows.into_iter().map(Seat::from).collect())
    }

    async fn insert_ticket(&mut self, ticket: &Ticket) -> CoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO ticket (id, concert_id, seat_id, price_cents, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(ticket.id.as_uuid())
        .bind(ticket.concert_id.as_uuid())
        .bind(ticket.seat_id.as_uuid())
        .bind(ticket.price_cents)
        .bind(ticket.status.as_str())
        .bind(ticket.created_at)
        .execute(self.conn()?)
        .await
        .map_err(store_error)?;
        Ok(())
    }

    async fn list_tickets(&mut self, concert_id: ConcertId) -> CoreResult<Vec<Ticket>> {
        let rows = sqlx::query_as::<_, TicketRow>(
            r#"
            SELECT id, concert_id, seat_id, price_cents, status, created_at
            FROM ticket WHERE concert_id = $1
            ORDER BY created_at, id
            "#,
        )
        .bind(concert_id.as_uuid())
        .fetch_all(self.conn()?)
        .await
        .map_err(store_error)?;
        rows.into_iter().map(TicketRow::into_ticket).collect()
    }

    async fn find_ticket(&mut self, id: TicketId, lock: RowLock) -> CoreResult<Option<Ticket>> {
        let sql = match lock {
            RowLock::Shared => {
                "SELECT id, concert_id, seat_id, price_cents, status, created_at FROM ticket WHERE id = $1"
            }
            RowLock::Exclusive => {
                "SELECT id, concert_id, seat_id, price_cents, status, created_at FROM ticket WHERE id = $1 FOR UPDATE"
            }
        };
        let row = sqlx::query_as::<_, TicketRow>(sql)
            .bind(id.as_uuid())
            .fetch_optional(self.conn()?)
            .await
            .map_err(store_error)?;
        row.map(TicketRow::into_ticket).transpose()
    }

    async fn swap_ticket_status(
        &mut self,
        id: TicketId,
        expected: TicketStatus,
        next: TicketStatus,
    ) -> CoreResult<Option<Ticket>> {
        let row = sqlx::query_as::<_, TicketRow>(
            r#"
            UPDATE ticket SET status = $3
            WHERE id = $1 AND status = $2
            RETURNING id, concert_id, seat_id, price_cents, status, created_at
            "#,
        )
        .bind(id.as_uuid())
        .bind(expected.as_str())
        .bind(next.as_str())
        .fetch_optional(self.conn()?)
        .await
        .map_err(store_error)?;
        row.map(TicketRow::into_ticket).transpose()
    }

    async fn insert_reservation(&mut self, reservation: &Reservation) -> CoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO reservation (id, user_id, ticket_id, status, reserved_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(reservation.id.as_uuid())
        .bind(reservation.user_id.as_uuid())
        .bind(reservation.ticket_id.as_uuid())
        .bind(reservation.status.as_str())
        .bind(reservation.reserved_at)
        .execute(self.conn()?)
        .await
        .map_err(store_error)?;
        Ok(())
    }

    async fn find_reservation(
        &mut self,
        id: ReservationId,
        lock: RowLock,
    ) -> CoreResult<Option<Reservation>> {
        let sql = match lock {
            RowLock::Shared => {
                "SELECT id, user_id, ticket_id, status, reserved_at FROM reservation WHERE id = $1"
            }
            RowLock::Exclusive => {
                "SELECT id, user_id, ticket_id, status, reserved_at FROM reservation WHERE id = $1 FOR UPDATE"
            }
        };
        let row = sqlx::query_as::<_, ReservationRow>(sql)
            .bind(id.as_uuid())
            .fetch_optional(self.conn()?)
            .await
            .map_err(store_error)?;
        row.map(ReservationRow::into_reservation).transpose()
    }

    async fn swap_reservation_status(
        &mut self,
        id: ReservationId,
        expected: ReservationStatus,
        next: ReservationStatus,
    ) -> CoreResult<Option<Reservation>> {
        let row = sqlx::query_as::<_, ReservationRow>(
            r#"
            UPDATE reservation SET status = $3
            WHERE id = $1 AND status = $2
            RETURNING id, user_id, ticket_id, status, reserved_at
            "#,
        )
        .bind(id.as_uuid())
        .bind(expected.as_str())
        .bind(next.as_str())
        .fetch_optional(self.conn()?)
        .await
        .map_err(store_error)?;
        row.map(ReservationRow::into_reservation).transpose()
    }

    async fn reservations_for_ticket(
        &mut self,
        ticket_id: TicketId,
    ) -> CoreResult<Vec<Reservation>> {
        let rows = sqlx::query_as::<_, ReservationRow>(
            r#"
            SELECT id, user_id, ticket_id, status, reserved_at
            FROM reservation WHERE ticket_id = $1
            ORDER BY reserved_at, id
            "#,
        )
        .bind(ticket_id.as_uuid())
        .fetch_all(self.conn()?)
        .await
        .map_err(store_error)?;
        rows.into_iter().map(ReservationRow::into_reservation).collect()
    }

    async fn pending_reserved_before(
        &mut self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> CoreResult<Vec<ReservationId>> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT id FROM reservation
            WHERE status = 'pending' AND reserved_at < $1
            ORDER BY reserved_at, id
            LIMIT $2
            "#,
        )
        .bind(cutoff)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(self.conn()?)
        .await
        .map_err(store_error)?;
        Ok(ids.into_iter().map(ReservationId::from).collect())
    }

    async fn commit(&mut self) -> CoreResult<()> {
        let tx = self.tx.take().ok_or_else(finished)?;
        tx.commit().await.map_err(store_error)
    }

    async fn rollback(&mut self) -> CoreResult<()> {
        let tx = self.tx.take().ok_or_else(finished)?;
        tx.rollback().await.map_err(store_error)
    }
}
