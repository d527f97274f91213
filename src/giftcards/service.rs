use time::OffsetDateTime;
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::giftcards::dto::{
    CreateGiftCardRequest, CustomerPatch, DebitRequest, GiftCardListResponse, GiftCardResponse,
    ListQuery, PaginationMeta, UpdateGiftCardRequest,
};
use crate::giftcards::model::{Customer, ExpirationType, GiftCard, GiftCardStatus};
use crate::giftcards::repo::{self, GiftCardChanges, ListFilter, NewGiftCard};
use crate::state::AppState;

const DEFAULT_CURRENCY: &str = "Rs";
const DEFAULT_COMMENT_AUTHOR: &str = "Staff";
const MAX_PAGE_SIZE: i64 = 100;

pub async fn create(
    state: &AppState,
    req: CreateGiftCardRequest,
) -> Result<GiftCardResponse, AppError> {
    let now = OffsetDateTime::now_utc();
    let new = validate_new_card(req, now)?;

    if repo::code_taken(&state.db, &new.code, None).await? {
        return Err(AppError::conflict("gift card code already exists"));
    }

    let (card, transactions) = repo::insert(&state.db, &new).await?;
    info!(card_id = %card.id, code = %card.code, value = card.initial_value, "gift card created");
    Ok(GiftCardResponse::assemble(card, transactions, vec![], now))
}

pub async fn get(state: &AppState, id: Uuid) -> Result<GiftCardResponse, AppError> {
    let (card, transactions, comments) = repo::fetch(&state.db, id)
        .await?
        .ok_or_else(|| AppError::not_found("gift card not found"))?;
    Ok(GiftCardResponse::assemble(
        card,
        transactions,
        comments,
        OffsetDateTime::now_utc(),
    ))
}

pub async fn list(state: &AppState, q: ListQuery) -> Result<GiftCardListResponse, AppError> {
    let limit = q.limit.clamp(1, MAX_PAGE_SIZE);
    let page = q.page.max(1);
    let filter = ListFilter {
        status: q.status,
        search: q
            .search
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty()),
        limit,
        offset: (page - 1) * limit,
    };

    let (items, total) = repo::list(&state.db, &filter).await?;
    let stats = repo::stats(&state.db).await?;

    let now = OffsetDateTime::now_utc();
    let gift_cards = items
        .into_iter()
        .map(|(card, txs, cmts)| GiftCardResponse::assemble(card, txs, cmts, now))
        .collect();

    let total_pages = if total == 0 {
        0
    } else {
        (total + limit - 1) / limit
    };

    Ok(GiftCardListResponse {
        gift_cards,
        pagination: PaginationMeta {
            page,
            limit,
            total,
            total_pages,
        },
        stats,
    })
}

pub async fn update(
    state: &AppState,
    id: Uuid,
    patch: UpdateGiftCardRequest,
) -> Result<GiftCardResponse, AppError> {
    let now = OffsetDateTime::now_utc();
    let comment_op = validate_comment_op(&patch)?;
    if !patch.has_field_patch() && comment_op.is_none() {
        return Err(AppError::NoOp("no valid fields provided for update".into()));
    }

    let mut tx = state.db.begin().await?;
    let card = repo::lock_card(&mut tx, id)
        .await?
        .ok_or_else(|| AppError::not_found("gift card not found"))?;

    if patch.has_field_patch() {
        let changes = apply_field_patch(&card, &patch, now)?;
        if changes.code != card.code
            && repo::code_taken(&state.db, &changes.code, Some(id)).await?
        {
            return Err(AppError::conflict("gift card code already exists"));
        }
        repo::apply_changes(&mut tx, id, &changes).await?;
    }

    match comment_op {
        Some(CommentOp::Append { author, text }) => {
            repo::insert_comment(&mut tx, id, &author, &text).await?;
        }
        Some(CommentOp::DeleteAt(index)) => {
            if !repo::delete_comment_at(&mut tx, id, index).await? {
                return Err(AppError::validation("comment index out of range"));
            }
        }
        None => {}
    }

    tx.commit().await?;
    info!(card_id = %id, "gift card updated");
    get(state, id).await
}

pub async fn debit(
    state: &AppState,
    id: Uuid,
    req: DebitRequest,
) -> Result<GiftCardResponse, AppError> {
    if req.amount <= 0 {
        return Err(AppError::validation("amount must be positive"));
    }

    let outcome = repo::try_debit(
        &state.db,
        id,
        req.amount,
        req.order_id.as_deref(),
        req.note.as_deref(),
    )
    .await?;

    if let Some((card, _entry)) = outcome {
        info!(card_id = %id, amount = req.amount, balance = card.current_balance, "gift card debited");
        return get(state, id).await;
    }

    // The conditional update did not fire; re-read fresh state to say why.
    let now = OffsetDateTime::now_utc();
    let (card, _, _) = repo::fetch(&state.db, id)
        .await?
        .ok_or_else(|| AppError::not_found("gift card not found"))?;

    let status = card.display_status(now);
    if status != GiftCardStatus::Active {
        return Err(AppError::Unusable(format!(
            "gift card is {}",
            status.as_str()
        )));
    }
    if card.current_balance <= 0 {
        return Err(AppError::Unusable(
            "gift card has no remaining balance".into(),
        ));
    }
    if req.amount > card.current_balance {
        return Err(AppError::InsufficientBalance {
            requested: req.amount,
            available: card.current_balance,
        });
    }
    // A concurrent writer restored usability between the two reads.
    Err(AppError::conflict("gift card changed concurrently, retry"))
}

pub async fn remove(state: &AppState, id: Uuid) -> Result<(), AppError> {
    repo::delete_unused(&state.db, id).await?;
    info!(card_id = %id, "gift card deleted");
    Ok(())
}

// --- pure input rules ---

fn validate_new_card(
    req: CreateGiftCardRequest,
    now: OffsetDateTime,
) -> Result<NewGiftCard, AppError> {
    let code = req.gift_card_code.trim().to_string();
    if code.is_empty() {
        return Err(AppError::validation("giftCardCode is required"));
    }
    if req.initial_value <= 0 {
        return Err(AppError::validation("initialValue must be positive"));
    }

    let expiration_type = req.expiration_type.unwrap_or(ExpirationType::None);
    let expiration_date = match expiration_type {
        ExpirationType::None => None,
        ExpirationType::FixedDate => {
            let date = req.expiration_date.ok_or_else(|| {
                AppError::validation("expirationDate is required for fixed-date expiration")
            })?;
            if date <= now {
                return Err(AppError::validation("expirationDate must be in the future"));
            }
            Some(date)
        }
    };

    let currency = req
        .currency
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| DEFAULT_CURRENCY.to_string());

    Ok(NewGiftCard {
        code,
        initial_value: req.initial_value,
        currency,
        expiration_type,
        expiration_date,
        customer: merge_customer(Customer::default(), req.customer.as_ref()),
        notes: req.notes,
    })
}

#[derive(Debug, PartialEq)]
enum CommentOp {
    Append { author: String, text: String },
    DeleteAt(usize),
}

fn validate_comment_op(patch: &UpdateGiftCardRequest) -> Result<Option<CommentOp>, AppError> {
    match (&patch.comment, patch.delete_comment_index) {
        (Some(_), Some(_)) => Err(AppError::validation(
            "comment and deleteCommentIndex are mutually exclusive",
        )),
        (Some(text), None) => {
            let text = text.trim();
            if text.is_empty() {
                return Err(AppError::validation("comment text must not be empty"));
            }
            let author = patch
                .author_name
                .as_deref()
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .unwrap_or(DEFAULT_COMMENT_AUTHOR)
                .to_string();
            Ok(Some(CommentOp::Append {
                author,
                text: text.to_string(),
            }))
        }
        (None, Some(index)) => Ok(Some(CommentOp::DeleteAt(index))),
        (None, None) => Ok(None),
    }
}

/// Compute the post-patch column set from the locked row. Expiration fields
/// are only re-validated when the patch touches them, so an already-expired
/// card can still take unrelated edits.
fn apply_field_patch(
    card: &GiftCard,
    patch: &UpdateGiftCardRequest,
    now: OffsetDateTime,
) -> Result<GiftCardChanges, AppError> {
    let code = match &patch.gift_card_code {
        Some(c) => {
            let c = c.trim();
            if c.is_empty() {
                return Err(AppError::validation("giftCardCode must not be empty"));
            }
            c.to_string()
        }
        None => card.code.clone(),
    };

    let initial_value = match patch.initial_value {
        Some(v) => {
            if v <= 0 {
                return Err(AppError::validation("initialValue must be positive"));
            }
            if v < card.current_balance {
                return Err(AppError::validation(
                    "initialValue cannot be below the current balance",
                ));
            }
            v
        }
        None => card.initial_value,
    };

    let currency = match &patch.currency {
        Some(c) => {
            let c = c.trim();
            if c.is_empty() {
                return Err(AppError::validation("currency must not be empty"));
            }
            c.to_string()
        }
        None => card.currency.clone(),
    };

    let (expiration_type, expiration_date) =
        if patch.expiration_type.is_some() || patch.expiration_date.is_some() {
            let ty = patch.expiration_type.unwrap_or(card.expiration_type);
            match ty {
                ExpirationType::None => (ty, None),
                ExpirationType::FixedDate => {
                    let date = patch.expiration_date.or(card.expiration_date).ok_or_else(
                        || {
                            AppError::validation(
                                "expirationDate is required for fixed-date expiration",
                            )
                        },
                    )?;
                    if date <= now {
                        return Err(AppError::validation("expirationDate must be in the future"));
                    }
                    (ty, Some(date))
                }
            }
        } else {
            (card.expiration_type, card.expiration_date)
        };

    let status = match patch.status {
        Some(GiftCardStatus::Active) => GiftCardStatus::Active,
        Some(GiftCardStatus::Deactivated) => GiftCardStatus::Deactivated,
        Some(_) => {
            return Err(AppError::validation(
                "status can only be set to active or deactivated",
            ))
        }
        None => card.status,
    };

    Ok(GiftCardChanges {
        code,
        initial_value,
        currency,
        expiration_type,
        expiration_date,
        customer: merge_customer(card.customer.clone(), patch.customer.as_ref()),
        notes: patch.notes.clone().or_else(|| card.notes.clone()),
        status,
    })
}

fn merge_customer(mut base: Customer, patch: Option<&CustomerPatch>) -> Customer {
    if let Some(p) = patch {
        if let Some(name) = &p.name {
            base.name = Some(name.clone());
        }
        if let Some(email) = &p.email {
            base.email = Some(email.clone());
        }
        if let Some(phone) = &p.phone {
            base.phone = Some(phone.clone());
        }
    }
    base
}
