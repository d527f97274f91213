use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::giftcards::model::{
    Comment, Customer, ExpirationType, GiftCard, GiftCardStatus, Transaction, TransactionKind,
};

/// Body of `POST /giftcards`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateGiftCardRequest {
    #[serde(default)]
    pub gift_card_code: String,
    #[serde(default)]
    pub initial_value: i64,
    pub currency: Option<String>,
    pub expiration_type: Option<ExpirationType>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub expiration_date: Option<OffsetDateTime>,
    pub customer: Option<CustomerPatch>,
    pub notes: Option<String>,
}

/// Partial customer update; only present fields are merged.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerPatch {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// Body of `PUT /giftcards/{id}`. Field patches and comment operations share
/// the one endpoint; the two comment operations are mutually exclusive.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateGiftCardRequest {
    pub gift_card_code: Option<String>,
    pub initial_value: Option<i64>,
    pub currency: Option<String>,
    pub expiration_type: Option<ExpirationType>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub expiration_date: Option<OffsetDateTime>,
    pub customer: Option<CustomerPatch>,
    pub notes: Option<String>,
    pub status: Option<GiftCardStatus>,
    pub comment: Option<String>,
    pub author_name: Option<String>,
    pub delete_comment_index: Option<usize>,
}

impl UpdateGiftCardRequest {
    /// True when at least one recognized entity field is present.
    pub fn has_field_patch(&self) -> bool {
        self.gift_card_code.is_some()
            || self.initial_value.is_some()
            || self.currency.is_some()
            || self.expiration_type.is_some()
            || self.expiration_date.is_some()
            || self.customer.is_some()
            || self.notes.is_some()
            || self.status.is_some()
    }
}

/// Body of `POST /giftcards/{id}/debit`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebitRequest {
    #[serde(default)]
    pub amount: i64,
    pub order_id: Option<String>,
    pub note: Option<String>,
}

/// Query string of `GET /giftcards`.
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub status: Option<GiftCardStatus>,
    pub search: Option<String>,
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_page() -> i64 {
    1
}
fn default_limit() -> i64 {
    20
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionResponse {
    pub id: Uuid,
    pub kind: TransactionKind,
    pub amount: i64,
    pub balance_after: i64,
    pub order_id: Option<String>,
    pub note: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<Transaction> for TransactionResponse {
    fn from(t: Transaction) -> Self {
        Self {
            id: t.id,
            kind: t.kind,
            amount: t.amount,
            balance_after: t.balance_after,
            order_id: t.order_ref,
            note: t.note,
            created_at: t.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentResponse {
    pub author: String,
    pub text: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<Comment> for CommentResponse {
    fn from(c: Comment) -> Self {
        Self {
            author: c.author,
            text: c.text,
            created_at: c.created_at,
        }
    }
}

/// Full entity representation. `status` is the derived display status.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GiftCardResponse {
    pub id: Uuid,
    pub gift_card_code: String,
    pub initial_value: i64,
    pub current_balance: i64,
    pub currency: String,
    pub expiration_type: ExpirationType,
    #[serde(with = "time::serde::rfc3339::option")]
    pub expiration_date: Option<OffsetDateTime>,
    pub customer: Customer,
    pub notes: Option<String>,
    pub status: GiftCardStatus,
    pub transactions: Vec<TransactionResponse>,
    pub comments: Vec<CommentResponse>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl GiftCardResponse {
    pub fn assemble(
        card: GiftCard,
        transactions: Vec<Transaction>,
        comments: Vec<Comment>,
        now: OffsetDateTime,
    ) -> Self {
        let status = card.display_status(now);
        Self {
            id: card.id,
            gift_card_code: card.code,
            initial_value: card.initial_value,
            current_balance: card.current_balance,
            currency: card.currency,
            expiration_type: card.expiration_type,
            expiration_date: card.expiration_date,
            customer: card.customer,
            notes: card.notes,
            status,
            transactions: transactions.into_iter().map(Into::into).collect(),
            comments: comments.into_iter().map(Into::into).collect(),
            created_at: card.created_at,
            updated_at: card.updated_at,
        }
    }
}

/// Collection-wide aggregates returned alongside every list page.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub total_balance: i64,
    pub total_initial_value: i64,
    pub active_count: i64,
    pub used_count: i64,
    pub expired_count: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationMeta {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub total_pages: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GiftCardListResponse {
    pub gift_cards: Vec<GiftCardResponse>,
    pub pagination: PaginationMeta,
    pub stats: Stats,
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    #[test]
    fn create_request_parses_wire_names() {
        let req: CreateGiftCardRequest = serde_json::from_str(
            r#"{"giftCardCode":"GC-1","initialValue":100,"currency":"Rs",
                "expirationType":"fixed-date","expirationDate":"2030-01-01T00:00:00Z",
                "customer":{"name":"Asha"},"notes":"vip"}"#,
        )
        .unwrap();
        assert_eq!(req.gift_card_code, "GC-1");
        assert_eq!(req.initial_value, 100);
        assert_eq!(req.expiration_type, Some(ExpirationType::FixedDate));
        assert!(req.expiration_date.is_some());
        assert_eq!(req.customer.unwrap().name.as_deref(), Some("Asha"));
    }

    #[test]
    fn empty_patch_has_no_field_patch() {
        let patch: UpdateGiftCardRequest = serde_json::from_str("{}").unwrap();
        assert!(!patch.has_field_patch());
        assert!(patch.comment.is_none());
        assert!(patch.delete_comment_index.is_none());
    }

    #[test]
    fn comment_only_patch_is_not_a_field_patch() {
        let patch: UpdateGiftCardRequest =
            serde_json::from_str(r#"{"comment":"called customer","authorName":"Priya"}"#).unwrap();
        assert!(!patch.has_field_patch());
        assert_eq!(patch.comment.as_deref(), Some("called customer"));
        assert_eq!(patch.author_name.as_deref(), Some("Priya"));
    }

    #[test]
    fn list_query_defaults() {
        let q: ListQuery = serde_urlencoded_like("{}");
        assert_eq!(q.page, 1);
        assert_eq!(q.limit, 20);
        assert!(q.status.is_none());
    }

    // Query strings deserialize through serde like JSON objects do; an empty
    // JSON object exercises the same defaults.
    fn serde_urlencoded_like(json: &str) -> ListQuery {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn response_uses_derived_status_and_wire_names() {
        let now = OffsetDateTime::now_utc();
        let card = GiftCard {
            id: Uuid::new_v4(),
            code: "GC-9".into(),
            initial_value: 100,
            current_balance: 40,
            currency: "Rs".into(),
            expiration_type: ExpirationType::FixedDate,
            expiration_date: Some(now - Duration::days(2)),
            customer: Customer::default(),
            notes: None,
            status: GiftCardStatus::Active,
            created_at: now,
            updated_at: now,
        };
        let resp = GiftCardResponse::assemble(card, vec![], vec![], now);
        assert_eq!(resp.status, GiftCardStatus::Expired);
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("\"giftCardCode\":\"GC-9\""));
        assert!(json.contains("\"currentBalance\":40"));
        assert!(json.contains("\"status\":\"expired\""));
    }
}
