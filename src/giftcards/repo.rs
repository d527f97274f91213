use sqlx::{FromRow, PgPool, Postgres};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::AppError;
use crate::giftcards::dto::Stats;
use crate::giftcards::model::{
    Comment, Customer, ExpirationType, GiftCard, GiftCardStatus, Transaction, TransactionKind,
};

/// Derived-expiry predicate shared by list filters, stats and the debit
/// guard, so SQL agrees with `GiftCard::display_status`.
const EXPIRED_PRED: &str =
    "(expiration_type = 'fixed-date' AND expiration_date IS NOT NULL AND expiration_date <= now())";

const CARD_COLUMNS: &str = "id, code, initial_value, current_balance, currency, expiration_type, \
     expiration_date, customer_name, customer_email, customer_phone, notes, status, created_at, updated_at";

#[derive(Debug, FromRow)]
struct GiftCardRow {
    id: Uuid,
    code: String,
    initial_value: i64,
    current_balance: i64,
    currency: String,
    expiration_type: String,
    expiration_date: Option<OffsetDateTime>,
    customer_name: Option<String>,
    customer_email: Option<String>,
    customer_phone: Option<String>,
    notes: Option<String>,
    status: String,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl TryFrom<GiftCardRow> for GiftCard {
    type Error = AppError;

    fn try_from(r: GiftCardRow) -> Result<Self, Self::Error> {
        let expiration_type = ExpirationType::parse(&r.expiration_type).ok_or_else(|| {
            AppError::Internal(anyhow::anyhow!(
                "unknown expiration_type {:?} on card {}",
                r.expiration_type,
                r.id
            ))
        })?;
        let status = GiftCardStatus::parse(&r.status).ok_or_else(|| {
            AppError::Internal(anyhow::anyhow!(
                "unknown status {:?} on card {}",
                r.status,
                r.id
            ))
        })?;
        Ok(GiftCard {
            id: r.id,
            code: r.code,
            initial_value: r.initial_value,
            current_balance: r.current_balance,
            currency: r.currency,
            expiration_type,
            expiration_date: r.expiration_date,
            customer: Customer {
                name: r.customer_name,
                email: r.customer_email,
                phone: r.customer_phone,
            },
            notes: r.notes,
            status,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
struct TransactionRow {
    id: Uuid,
    gift_card_id: Uuid,
    kind: String,
    amount: i64,
    balance_after: i64,
    order_ref: Option<String>,
    note: Option<String>,
    created_at: OffsetDateTime,
}

impl TryFrom<TransactionRow> for Transaction {
    type Error = AppError;

    fn try_from(r: TransactionRow) -> Result<Self, Self::Error> {
        let kind = TransactionKind::parse(&r.kind).ok_or_else(|| {
            AppError::Internal(anyhow::anyhow!(
                "unknown transaction kind {:?} on {}",
                r.kind,
                r.id
            ))
        })?;
        Ok(Transaction {
            id: r.id,
            kind,
            amount: r.amount,
            balance_after: r.balance_after,
            order_ref: r.order_ref,
            note: r.note,
            created_at: r.created_at,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
struct CommentRow {
    gift_card_id: Uuid,
    author: String,
    body: String,
    created_at: OffsetDateTime,
}

impl From<CommentRow> for Comment {
    fn from(r: CommentRow) -> Self {
        Self {
            author: r.author,
            text: r.body,
            created_at: r.created_at,
        }
    }
}

/// Validated input for card creation.
#[derive(Debug)]
pub struct NewGiftCard {
    pub code: String,
    pub initial_value: i64,
    pub currency: String,
    pub expiration_type: ExpirationType,
    pub expiration_date: Option<OffsetDateTime>,
    pub customer: Customer,
    pub notes: Option<String>,
}

/// Full post-patch column set, computed by the service from the locked row.
#[derive(Debug)]
pub struct GiftCardChanges {
    pub code: String,
    pub initial_value: i64,
    pub currency: String,
    pub expiration_type: ExpirationType,
    pub expiration_date: Option<OffsetDateTime>,
    pub customer: Customer,
    pub notes: Option<String>,
    pub status: GiftCardStatus,
}

#[derive(Debug)]
pub struct ListFilter {
    pub status: Option<GiftCardStatus>,
    pub search: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

fn status_predicate(status: GiftCardStatus) -> String {
    match status {
        GiftCardStatus::Active => format!("status = 'active' AND NOT {EXPIRED_PRED}"),
        GiftCardStatus::Expired => {
            format!("(status = 'expired' OR (status = 'active' AND {EXPIRED_PRED}))")
        }
        GiftCardStatus::Used => "status = 'used'".to_string(),
        GiftCardStatus::Deactivated => "status = 'deactivated'".to_string(),
    }
}

/// Insert a card together with its synthetic `created` transaction, as one
/// database transaction. A duplicate code surfaces as Conflict.
pub async fn insert(
    db: &PgPool,
    new: &NewGiftCard,
) -> Result<(GiftCard, Vec<Transaction>), AppError> {
    let mut tx = db.begin().await?;

    let row = sqlx::query_as::<_, GiftCardRow>(&format!(
        r#"
        INSERT INTO gift_cards
            (code, initial_value, current_balance, currency, expiration_type, expiration_date,
             customer_name, customer_email, customer_phone, notes, status)
        VALUES ($1, $2, $2, $3, $4, $5, $6, $7, $8, $9, 'active')
        RETURNING {CARD_COLUMNS}
        "#
    ))
    .bind(&new.code)
    .bind(new.initial_value)
    .bind(&new.currency)
    .bind(new.expiration_type.as_str())
    .bind(new.expiration_date)
    .bind(&new.customer.name)
    .bind(&new.customer.email)
    .bind(&new.customer.phone)
    .bind(&new.notes)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| match AppError::from(e) {
        AppError::Conflict(_) => AppError::conflict("gift card code already exists"),
        other => other,
    })?;

    let created = sqlx::query_as::<_, TransactionRow>(
        r#"
        INSERT INTO gift_card_transactions (gift_card_id, kind, amount, balance_after)
        VALUES ($1, 'created', $2, $2)
        RETURNING id, gift_card_id, kind, amount, balance_after, order_ref, note, created_at
        "#,
    )
    .bind(row.id)
    .bind(new.initial_value)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok((row.try_into()?, vec![created.try_into()?]))
}

/// Load a card with its ordered transactions and comments.
pub async fn fetch(
    db: &PgPool,
    id: Uuid,
) -> Result<Option<(GiftCard, Vec<Transaction>, Vec<Comment>)>, AppError> {
    let row = sqlx::query_as::<_, GiftCardRow>(&format!(
        "SELECT {CARD_COLUMNS} FROM gift_cards WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(db)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };
    let card: GiftCard = row.try_into()?;

    let transactions = sqlx::query_as::<_, TransactionRow>(
        r#"
        SELECT id, gift_card_id, kind, amount, balance_after, order_ref, note, created_at
        FROM gift_card_transactions
        WHERE gift_card_id = $1
        ORDER BY seq ASC
        "#,
    )
    .bind(id)
    .fetch_all(db)
    .await?
    .into_iter()
    .map(Transaction::try_from)
    .collect::<Result<Vec<_>, _>>()?;

    let comments = sqlx::query_as::<_, CommentRow>(
        r#"
        SELECT gift_card_id, author, body, created_at
        FROM gift_card_comments
        WHERE gift_card_id = $1
        ORDER BY seq ASC
        "#,
    )
    .bind(id)
    .fetch_all(db)
    .await?
    .into_iter()
    .map(Comment::from)
    .collect();

    Ok(Some((card, transactions, comments)))
}

/// Does another card already use this code?
pub async fn code_taken(db: &PgPool, code: &str, exclude: Option<Uuid>) -> Result<bool, AppError> {
    let taken: (bool,) = sqlx::query_as(
        r#"
        SELECT EXISTS (
            SELECT 1 FROM gift_cards
            WHERE code = $1 AND ($2::uuid IS NULL OR id <> $2)
        )
        "#,
    )
    .bind(code)
    .bind(exclude)
    .fetch_one(db)
    .await?;
    Ok(taken.0)
}

/// One page of cards matching the filter, with their transactions and
/// comments batched in, plus the total match count.
pub async fn list(
    db: &PgPool,
    filter: &ListFilter,
) -> Result<(Vec<(GiftCard, Vec<Transaction>, Vec<Comment>)>, i64), AppError> {
    // The search clause is always present; without a search term the bound
    // pattern is "%", which the NOT NULL code column always matches.
    let mut predicate = String::from(
        "(code ILIKE $1 OR customer_name ILIKE $1 OR customer_email ILIKE $1)",
    );
    if let Some(status) = filter.status {
        predicate.push_str(" AND ");
        predicate.push_str(&status_predicate(status));
    }

    let pattern = filter
        .search
        .as_deref()
        .map(|s| format!("%{s}%"))
        .unwrap_or_else(|| "%".to_string());

    let rows = sqlx::query_as::<_, GiftCardRow>(&format!(
        r#"
        SELECT {CARD_COLUMNS} FROM gift_cards
        WHERE {predicate}
        ORDER BY created_at DESC
        LIMIT $2 OFFSET $3
        "#
    ))
    .bind(&pattern)
    .bind(filter.limit)
    .bind(filter.offset)
    .fetch_all(db)
    .await?;

    let total: (i64,) = sqlx::query_as(&format!(
        "SELECT COUNT(*) FROM gift_cards WHERE {predicate}"
    ))
    .bind(&pattern)
    .fetch_one(db)
    .await?;

    let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();

    let mut transactions: Vec<TransactionRow> = Vec::new();
    let mut comments: Vec<CommentRow> = Vec::new();
    if !ids.is_empty() {
        transactions = sqlx::query_as::<_, TransactionRow>(
            r#"
            SELECT id, gift_card_id, kind, amount, balance_after, order_ref, note, created_at
            FROM gift_card_transactions
            WHERE gift_card_id = ANY($1)
            ORDER BY seq ASC
            "#,
        )
        .bind(&ids)
        .fetch_all(db)
        .await?;
        comments = sqlx::query_as::<_, CommentRow>(
            r#"
            SELECT gift_card_id, author, body, created_at
            FROM gift_card_comments
            WHERE gift_card_id = ANY($1)
            ORDER BY seq ASC
            "#,
        )
        .bind(&ids)
        .fetch_all(db)
        .await?;
    }

    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let id = row.id;
        let card: GiftCard = row.try_into()?;
        let txs = transactions
            .iter()
            .filter(|t| t.gift_card_id == id)
            .cloned()
            .map(Transaction::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        let cmts = comments
            .iter()
            .filter(|c| c.gift_card_id == id)
            .cloned()
            .map(Comment::from)
            .collect();
        out.push((card, txs, cmts));
    }

    Ok((out, total.0))
}

/// Whole-collection aggregates, with derived expiry folded into the counts.
pub async fn stats(db: &PgPool) -> Result<Stats, AppError> {
    let row: (i64, i64, i64, i64, i64) = sqlx::query_as(&format!(
        r#"
        SELECT
            COALESCE(SUM(current_balance), 0)::BIGINT,
            COALESCE(SUM(initial_value), 0)::BIGINT,
            COUNT(*) FILTER (WHERE status = 'active' AND NOT {EXPIRED_PRED}),
            COUNT(*) FILTER (WHERE status = 'used'),
            COUNT(*) FILTER (WHERE status = 'expired' OR (status = 'active' AND {EXPIRED_PRED}))
        FROM gift_cards
        "#
    ))
    .fetch_one(db)
    .await?;
    Ok(Stats {
        total_balance: row.0,
        total_initial_value: row.1,
        active_count: row.2,
        used_count: row.3,
        expired_count: row.4,
    })
}

/// Lock a card row for the duration of a patch transaction.
pub async fn lock_card(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    id: Uuid,
) -> Result<Option<GiftCard>, AppError> {
    let row = sqlx::query_as::<_, GiftCardRow>(&format!(
        "SELECT {CARD_COLUMNS} FROM gift_cards WHERE id = $1 FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(&mut **tx)
    .await?;
    row.map(GiftCard::try_from).transpose()
}

/// Write the full post-patch column set in one statement.
pub async fn apply_changes(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    id: Uuid,
    changes: &GiftCardChanges,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        UPDATE gift_cards SET
            code = $2,
            initial_value = $3,
            currency = $4,
            expiration_type = $5,
            expiration_date = $6,
            customer_name = $7,
            customer_email = $8,
            customer_phone = $9,
            notes = $10,
            status = $11,
            updated_at = now()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(&changes.code)
    .bind(changes.initial_value)
    .bind(&changes.currency)
    .bind(changes.expiration_type.as_str())
    .bind(changes.expiration_date)
    .bind(&changes.customer.name)
    .bind(&changes.customer.email)
    .bind(&changes.customer.phone)
    .bind(&changes.notes)
    .bind(changes.status.as_str())
    .execute(&mut **tx)
    .await
    .map_err(|e| match AppError::from(e) {
        AppError::Conflict(_) => AppError::conflict("gift card code already exists"),
        other => other,
    })?;
    Ok(())
}

pub async fn insert_comment(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    id: Uuid,
    author: &str,
    text: &str,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO gift_card_comments (gift_card_id, author, body)
        VALUES ($1, $2, $3)
        "#,
    )
    .bind(id)
    .bind(author)
    .bind(text)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Remove the nth comment (0-based, insertion order). One statement, so the
/// list compacts with no gaps. Returns false when the index is out of range.
pub async fn delete_comment_at(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    id: Uuid,
    index: usize,
) -> Result<bool, AppError> {
    let result = sqlx::query(
        r#"
        DELETE FROM gift_card_comments
        WHERE id = (
            SELECT id FROM gift_card_comments
            WHERE gift_card_id = $1
            ORDER BY seq ASC
            LIMIT 1 OFFSET $2
        )
        "#,
    )
    .bind(id)
    .bind(index as i64)
    .execute(&mut **tx)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Compare-and-swap debit: the balance check, the decrement and the flip to
/// `used` happen in one conditional UPDATE, so concurrent debits can never
/// both pass a stale balance check. Returns the updated card and the new
/// ledger record, or None when the condition did not hold.
pub async fn try_debit(
    db: &PgPool,
    id: Uuid,
    amount: i64,
    order_id: Option<&str>,
    note: Option<&str>,
) -> Result<Option<(GiftCard, Transaction)>, AppError> {
    let mut tx = db.begin().await?;

    let row = sqlx::query_as::<_, GiftCardRow>(&format!(
        r#"
        UPDATE gift_cards SET
            current_balance = current_balance - $2,
            status = CASE WHEN current_balance - $2 = 0 THEN 'used' ELSE status END,
            updated_at = now()
        WHERE id = $1
          AND status = 'active'
          AND current_balance > 0
          AND current_balance >= $2
          AND NOT {EXPIRED_PRED}
        RETURNING {CARD_COLUMNS}
        "#
    ))
    .bind(id)
    .bind(amount)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let entry = sqlx::query_as::<_, TransactionRow>(
        r#"
        INSERT INTO gift_card_transactions (gift_card_id, kind, amount, balance_after, order_ref, note)
        VALUES ($1, 'used', $2, $3, $4, $5)
        RETURNING id, gift_card_id, kind, amount, balance_after, order_ref, note, created_at
        "#,
    )
    .bind(id)
    .bind(-amount)
    .bind(row.current_balance)
    .bind(order_id)
    .bind(note)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(Some((row.try_into()?, entry.try_into()?)))
}

/// Guarded delete: only a card whose full value is intact may be removed.
/// The predicate rides along in the DELETE so a concurrent debit cannot
/// slip a used card through.
pub async fn delete_unused(db: &PgPool, id: Uuid) -> Result<(), AppError> {
    let result = sqlx::query(
        "DELETE FROM gift_cards WHERE id = $1 AND current_balance = initial_value",
    )
    .bind(id)
    .execute(db)
    .await?;

    if result.rows_affected() > 0 {
        return Ok(());
    }

    let exists: (bool,) = sqlx::query_as("SELECT EXISTS (SELECT 1 FROM gift_cards WHERE id = $1)")
        .bind(id)
        .fetch_one(db)
        .await?;
    if exists.0 {
        Err(AppError::conflict(
            "card has been used — deactivate instead",
        ))
    } else {
        Err(AppError::not_found("gift card not found"))
    }
}
