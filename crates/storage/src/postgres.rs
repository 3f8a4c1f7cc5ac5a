//! Postgres storage backend.
//!
//! Expected schema:
//!
//! ```sql
//! CREATE TABLE loads (
//!     id             bigserial PRIMARY KEY,
//!     status         text      NOT NULL DEFAULT 'open',
//!     winning_bid_id bigint
//! );
//! CREATE TABLE bids (
//!     id           bigserial PRIMARY KEY,
//!     load_id      bigint    NOT NULL REFERENCES loads (id),
//!     carrier_id   text      NOT NULL,
//!     amount_cents bigint    NOT NULL,
//!     state        text      NOT NULL DEFAULT 'pending'
//! );
//! -- The durable uniqueness invariant: at most one accepted bid per load.
//! CREATE UNIQUE INDEX bids_one_accepted_per_load ON bids (load_id)
//!     WHERE state = 'accepted';
//! CREATE TABLE acceptance_locks (
//!     load_id    bigint      PRIMARY KEY,
//!     expires_at timestamptz NOT NULL
//! );
//! CREATE TABLE rate_confirmations (
//!     id                         bigserial   PRIMARY KEY,
//!     load_id                    bigint      NOT NULL REFERENCES loads (id),
//!     bid_id                     bigint      NOT NULL REFERENCES bids (id),
//!     carrier_id                 text        NOT NULL,
//!     status                     text        NOT NULL DEFAULT 'generated',
//!     dispatch_signed_at         timestamptz,
//!     driver_acceptance_deadline timestamptz,
//!     driver_accepted_at         timestamptz,
//!     document_reference         text        NOT NULL
//! );
//! ```

use {
    crate::traits::{
        AssignmentError, LoadStoring, LockStoring, NewRateConfirmation, WorkflowStoring,
    },
    anyhow::{Context, Result, anyhow, bail},
    chrono::{DateTime, Utc},
    model::{
        Bid, BidId, BidState, Load, LoadId, LoadStatus, RateConfirmation, RateConfirmationStatus,
        WorkflowId,
    },
    sqlx::PgPool,
    std::time::Duration,
};

#[derive(Clone)]
pub struct Postgres(pub PgPool);

fn load_status_from_db(status: &str) -> Result<LoadStatus> {
    Ok(match status {
        "open" => LoadStatus::Open,
        "assigned" => LoadStatus::Assigned,
        "in_transit" => LoadStatus::InTransit,
        "completed" => LoadStatus::Completed,
        "cancelled" => LoadStatus::Cancelled,
        other => bail!("unexpected load status {other:?}"),
    })
}

fn bid_state_from_db(state: &str) -> Result<BidState> {
    Ok(match state {
        "pending" => BidState::Pending,
        "accepted" => BidState::Accepted,
        "rejected" => BidState::Rejected,
        "expired" => BidState::Expired,
        other => bail!("unexpected bid state {other:?}"),
    })
}

fn workflow_status_to_db(status: RateConfirmationStatus) -> &'static str {
    match status {
        RateConfirmationStatus::Generated => "generated",
        RateConfirmationStatus::DispatchSigned => "dispatch_signed",
        RateConfirmationStatus::DriverAccepted => "driver_accepted",
        RateConfirmationStatus::Rejected => "rejected",
        RateConfirmationStatus::Expired => "expired",
    }
}

fn workflow_status_from_db(status: &str) -> Result<RateConfirmationStatus> {
    Ok(match status {
        "generated" => RateConfirmationStatus::Generated,
        "dispatch_signed" => RateConfirmationStatus::DispatchSigned,
        "driver_accepted" => RateConfirmationStatus::DriverAccepted,
        "rejected" => RateConfirmationStatus::Rejected,
        "expired" => RateConfirmationStatus::Expired,
        other => bail!("unexpected workflow status {other:?}"),
    })
}

fn is_accepted_bid_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(err) => err.constraint() == Some("bids_one_accepted_per_load"),
        _ => false,
    }
}

#[derive(sqlx::FromRow)]
struct WorkflowRow {
    id: i64,
    load_id: i64,
    bid_id: i64,
    carrier_id: String,
    status: String,
    dispatch_signed_at: Option<DateTime<Utc>>,
    driver_acceptance_deadline: Option<DateTime<Utc>>,
    driver_accepted_at: Option<DateTime<Utc>>,
    document_reference: String,
}

impl TryFrom<WorkflowRow> for RateConfirmation {
    type Error = anyhow::Error;

    fn try_from(row: WorkflowRow) -> Result<Self> {
        Ok(Self {
            id: WorkflowId(row.id),
            load_id: LoadId(row.load_id),
            bid_id: BidId(row.bid_id),
            carrier_id: row.carrier_id,
            status: workflow_status_from_db(&row.status)?,
            dispatch_signed_at: row.dispatch_signed_at,
            driver_acceptance_deadline: row.driver_acceptance_deadline,
            driver_accepted_at: row.driver_accepted_at,
            document_reference: row.document_reference,
        })
    }
}

#[async_trait::async_trait]
impl LoadStoring for Postgres {
    async fn assign_winning_bid(&self, load: LoadId, bid: BidId) -> Result<(), AssignmentError> {
        let mut tx = self.0.begin().await.context("begin")?;

        // Guarded assignment: zero updated rows means another actor already
        // recorded a winner. The uncommitted transaction rolls back on drop.
        const ASSIGN: &str = r#"
            UPDATE loads
            SET status = 'assigned', winning_bid_id = $2
            WHERE id = $1 AND winning_bid_id IS NULL
        "#;
        let assigned = sqlx::query(ASSIGN)
            .bind(load.0)
            .bind(bid.0)
            .execute(&mut *tx)
            .await
            .context("assign load")?;
        if assigned.rows_affected() == 0 {
            return Err(AssignmentError::AlreadyAssigned);
        }

        const ACCEPT: &str = r#"
            UPDATE bids
            SET state = 'accepted'
            WHERE id = $1 AND load_id = $2
        "#;
        let accepted = sqlx::query(ACCEPT)
            .bind(bid.0)
            .bind(load.0)
            .execute(&mut *tx)
            .await
            .map_err(|err| {
                if is_accepted_bid_unique_violation(&err) {
                    AssignmentError::AlreadyAssigned
                } else {
                    AssignmentError::Other(anyhow::Error::new(err).context("accept bid"))
                }
            })?;
        if accepted.rows_affected() == 0 {
            return Err(anyhow!("bid {bid} does not belong to load {load}").into());
        }

        const REJECT_SIBLINGS: &str = r#"
            UPDATE bids
            SET state = 'rejected'
            WHERE load_id = $1 AND id <> $2 AND state = 'pending'
        "#;
        sqlx::query(REJECT_SIBLINGS)
            .bind(load.0)
            .bind(bid.0)
            .execute(&mut *tx)
            .await
            .context("reject sibling bids")?;

        tx.commit().await.context("commit")?;
        Ok(())
    }

    async fn read_load(&self, load: LoadId) -> Result<Option<Load>> {
        const QUERY: &str = r#"
            SELECT id, status, winning_bid_id
            FROM loads
            WHERE id = $1
        "#;
        let row: Option<(i64, String, Option<i64>)> = sqlx::query_as(QUERY)
            .bind(load.0)
            .fetch_optional(&self.0)
            .await
            .context("read load")?;
        row.map(|(id, status, winning_bid_id)| {
            Ok(Load {
                id: LoadId(id),
                status: load_status_from_db(&status)?,
                winning_bid_id: winning_bid_id.map(BidId),
            })
        })
        .transpose()
    }

    async fn read_bid(&self, bid: BidId) -> Result<Option<Bid>> {
        const QUERY: &str = r#"
            SELECT id, load_id, carrier_id, amount_cents, state
            FROM bids
            WHERE id = $1
        "#;
        let row: Option<(i64, i64, String, i64, String)> = sqlx::query_as(QUERY)
            .bind(bid.0)
            .fetch_optional(&self.0)
            .await
            .context("read bid")?;
        row.map(|(id, load_id, carrier_id, amount_cents, state)| {
            Ok(Bid {
                id: BidId(id),
                load_id: LoadId(load_id),
                carrier_id,
                amount_cents,
                state: bid_state_from_db(&state)?,
            })
        })
        .transpose()
    }

    async fn set_load_open(&self, load: LoadId) -> Result<()> {
        let mut tx = self.0.begin().await.context("begin")?;

        const LOCK_ROW: &str = "SELECT winning_bid_id FROM loads WHERE id = $1 FOR UPDATE";
        let winning: Option<Option<i64>> = sqlx::query_scalar(LOCK_ROW)
            .bind(load.0)
            .fetch_optional(&mut *tx)
            .await
            .context("read load for reopen")?;
        let Some(winning) = winning else {
            bail!("load {load} does not exist");
        };

        const REOPEN: &str = r#"
            UPDATE loads
            SET status = 'open', winning_bid_id = NULL
            WHERE id = $1
        "#;
        sqlx::query(REOPEN)
            .bind(load.0)
            .execute(&mut *tx)
            .await
            .context("reopen load")?;

        if let Some(winning) = winning {
            const EXPIRE_BID: &str = r#"
                UPDATE bids
                SET state = 'expired'
                WHERE id = $1
            "#;
            sqlx::query(EXPIRE_BID)
                .bind(winning)
                .execute(&mut *tx)
                .await
                .context("expire winning bid")?;
        }

        tx.commit().await.context("commit")?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl LockStoring for Postgres {
    async fn try_acquire(&self, key: LoadId, ttl: Duration) -> Result<bool> {
        let now = Utc::now();
        let expires_at = now + chrono::Duration::from_std(ttl).context("lock ttl")?;
        // Atomic test-and-set: the conflict arm only fires when the existing
        // row has already expired, so an unexpired lock never changes hands.
        const QUERY: &str = r#"
            INSERT INTO acceptance_locks (load_id, expires_at)
            VALUES ($1, $2)
            ON CONFLICT (load_id) DO UPDATE
            SET expires_at = $2
            WHERE acceptance_locks.expires_at <= $3
        "#;
        let result = sqlx::query(QUERY)
            .bind(key.0)
            .bind(expires_at)
            .bind(now)
            .execute(&self.0)
            .await
            .context("acquire acceptance lock")?;
        Ok(result.rows_affected() > 0)
    }

    async fn release(&self, key: LoadId) -> Result<()> {
        const QUERY: &str = "DELETE FROM acceptance_locks WHERE load_id = $1";
        sqlx::query(QUERY)
            .bind(key.0)
            .execute(&self.0)
            .await
            .context("release acceptance lock")?;
        Ok(())
    }

    async fn is_held(&self, key: LoadId) -> Result<bool> {
        Ok(self.remaining_ttl(key).await?.is_some())
    }

    async fn remaining_ttl(&self, key: LoadId) -> Result<Option<Duration>> {
        const QUERY: &str = "SELECT expires_at FROM acceptance_locks WHERE load_id = $1";
        let expires_at: Option<DateTime<Utc>> = sqlx::query_scalar(QUERY)
            .bind(key.0)
            .fetch_optional(&self.0)
            .await
            .context("read acceptance lock")?;
        Ok(expires_at
            .map(|expires_at| expires_at - Utc::now())
            .filter(|remaining| *remaining > chrono::Duration::zero())
            .map(|remaining| remaining.to_std().expect("positive duration")))
    }
}

#[async_trait::async_trait]
impl WorkflowStoring for Postgres {
    async fn insert(&self, new: NewRateConfirmation) -> Result<RateConfirmation> {
        const QUERY: &str = r#"
            INSERT INTO rate_confirmations
                (load_id, bid_id, carrier_id, status, document_reference)
            VALUES ($1, $2, $3, 'generated', $4)
            RETURNING *
        "#;
        let row: WorkflowRow = sqlx::query_as(QUERY)
            .bind(new.load_id.0)
            .bind(new.bid_id.0)
            .bind(&new.carrier_id)
            .bind(&new.document_reference)
            .fetch_one(&self.0)
            .await
            .context("insert rate confirmation")?;
        row.try_into()
    }

    async fn get(&self, id: WorkflowId) -> Result<Option<RateConfirmation>> {
        const QUERY: &str = "SELECT * FROM rate_confirmations WHERE id = $1";
        let row: Option<WorkflowRow> = sqlx::query_as(QUERY)
            .bind(id.0)
            .fetch_optional(&self.0)
            .await
            .context("read rate confirmation")?;
        row.map(TryInto::try_into).transpose()
    }

    async fn mark_dispatch_signed(
        &self,
        id: WorkflowId,
        signed_at: DateTime<Utc>,
        deadline: DateTime<Utc>,
    ) -> Result<Option<RateConfirmation>> {
        const QUERY: &str = r#"
            UPDATE rate_confirmations
            SET status = 'dispatch_signed',
                dispatch_signed_at = $2,
                driver_acceptance_deadline = $3
            WHERE id = $1 AND status = 'generated'
            RETURNING *
        "#;
        let row: Option<WorkflowRow> = sqlx::query_as(QUERY)
            .bind(id.0)
            .bind(signed_at)
            .bind(deadline)
            .fetch_optional(&self.0)
            .await
            .context("mark dispatch signed")?;
        row.map(TryInto::try_into).transpose()
    }

    async fn finalize(
        &self,
        id: WorkflowId,
        to: RateConfirmationStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<RateConfirmation>> {
        anyhow::ensure!(to.is_terminal(), "finalize target {to:?} is not terminal");
        const QUERY: &str = r#"
            UPDATE rate_confirmations
            SET status = $2,
                driver_accepted_at = CASE
                    WHEN $2 = 'driver_accepted' THEN $3
                    ELSE driver_accepted_at
                END
            WHERE id = $1 AND status = 'dispatch_signed'
            RETURNING *
        "#;
        let row: Option<WorkflowRow> = sqlx::query_as(QUERY)
            .bind(id.0)
            .bind(workflow_status_to_db(to))
            .bind(at)
            .fetch_optional(&self.0)
            .await
            .context("finalize rate confirmation")?;
        row.map(TryInto::try_into).transpose()
    }

    async fn due_for_expiry(&self, now: DateTime<Utc>) -> Result<Vec<RateConfirmation>> {
        const QUERY: &str = r#"
            SELECT *
            FROM rate_confirmations
            WHERE status = 'dispatch_signed' AND driver_acceptance_deadline <= $1
        "#;
        let rows: Vec<WorkflowRow> = sqlx::query_as(QUERY)
            .bind(now)
            .fetch_all(&self.0)
            .await
            .context("query overdue rate confirmations")?;
        rows.into_iter().map(TryInto::try_into).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn connect() -> Postgres {
        let pool = PgPool::connect("postgresql://").await.unwrap();
        for table in ["rate_confirmations", "acceptance_locks", "bids", "loads"] {
            sqlx::query(&format!("TRUNCATE {table} CASCADE"))
                .execute(&pool)
                .await
                .unwrap();
        }
        Postgres(pool)
    }

    async fn seed_load_with_bids(db: &Postgres) -> (LoadId, BidId, BidId) {
        let load: i64 =
            sqlx::query_scalar("INSERT INTO loads (status) VALUES ('open') RETURNING id")
                .fetch_one(&db.0)
                .await
                .unwrap();
        let mut bids = Vec::new();
        for (carrier, amount) in [("carrier-a", 50_000_i64), ("carrier-b", 48_000)] {
            let bid: i64 = sqlx::query_scalar(
                "INSERT INTO bids (load_id, carrier_id, amount_cents) VALUES ($1, $2, $3) \
                 RETURNING id",
            )
            .bind(load)
            .bind(carrier)
            .bind(amount)
            .fetch_one(&db.0)
            .await
            .unwrap();
            bids.push(BidId(bid));
        }
        (LoadId(load), bids[0], bids[1])
    }

    #[tokio::test]
    #[ignore]
    async fn postgres_assignment_is_exclusive() {
        let db = connect().await;
        let (load, first, second) = seed_load_with_bids(&db).await;

        db.assign_winning_bid(load, first).await.unwrap();
        let err = db.assign_winning_bid(load, second).await.unwrap_err();
        assert!(matches!(err, AssignmentError::AlreadyAssigned));

        let stored = db.read_load(load).await.unwrap().unwrap();
        assert_eq!(stored.winning_bid_id, Some(first));
        assert_eq!(
            db.read_bid(second).await.unwrap().unwrap().state,
            BidState::Rejected
        );
    }

    #[tokio::test]
    #[ignore]
    async fn postgres_lock_roundtrip() {
        let db = connect().await;
        let key = LoadId(1);
        let ttl = Duration::from_secs(90);

        assert!(db.try_acquire(key, ttl).await.unwrap());
        assert!(!db.try_acquire(key, ttl).await.unwrap());
        assert!(db.is_held(key).await.unwrap());
        assert!(db.remaining_ttl(key).await.unwrap().unwrap() <= ttl);

        db.release(key).await.unwrap();
        db.release(key).await.unwrap();
        assert!(db.try_acquire(key, ttl).await.unwrap());
    }

    #[tokio::test]
    #[ignore]
    async fn postgres_workflow_compare_and_swap() {
        let db = connect().await;
        let (load, bid, _) = seed_load_with_bids(&db).await;
        db.assign_winning_bid(load, bid).await.unwrap();

        let workflow = db
            .insert(NewRateConfirmation {
                load_id: load,
                bid_id: bid,
                carrier_id: "carrier-a".to_string(),
                document_reference: "ratecon-test".to_string(),
            })
            .await
            .unwrap();
        let now = Utc::now();
        let signed = db
            .mark_dispatch_signed(workflow.id, now, now + chrono::Duration::minutes(30))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(signed.status, RateConfirmationStatus::DispatchSigned);

        let accepted = db
            .finalize(workflow.id, RateConfirmationStatus::DriverAccepted, now)
            .await
            .unwrap();
        assert!(accepted.is_some());
        let raced = db
            .finalize(workflow.id, RateConfirmationStatus::Expired, now)
            .await
            .unwrap();
        assert!(raced.is_none());
    }
}
