use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Stored lifecycle state. `used` and `expired` are system-derived and never
/// set directly by clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GiftCardStatus {
    Active,
    Used,
    Expired,
    Deactivated,
}

impl GiftCardStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Used => "used",
            Self::Expired => "expired",
            Self::Deactivated => "deactivated",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "used" => Some(Self::Used),
            "expired" => Some(Self::Expired),
            "deactivated" => Some(Self::Deactivated),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExpirationType {
    #[serde(rename = "none")]
    None,
    #[serde(rename = "fixed-date")]
    FixedDate,
}

impl ExpirationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::FixedDate => "fixed-date",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "none" => Some(Self::None),
            "fixed-date" => Some(Self::FixedDate),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Created,
    Used,
    Refund,
    Adjustment,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Used => "used",
            Self::Refund => "refund",
            Self::Adjustment => "adjustment",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "created" => Some(Self::Created),
            "used" => Some(Self::Used),
            "refund" => Some(Self::Refund),
            "adjustment" => Some(Self::Adjustment),
            _ => None,
        }
    }
}

/// Embedded customer contact details. All fields optional; patches merge
/// field by field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// Gift card entity. Monetary amounts are integer minor units.
/// Invariant: `0 <= current_balance <= initial_value`.
#[derive(Debug, Clone)]
pub struct GiftCard {
    pub id: Uuid,
    pub code: String,
    pub initial_value: i64,
    pub current_balance: i64,
    pub currency: String,
    pub expiration_type: ExpirationType,
    pub expiration_date: Option<OffsetDateTime>,
    pub customer: Customer,
    pub notes: Option<String>,
    pub status: GiftCardStatus,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl GiftCard {
    /// A card is expired when the fixed date has passed; cards without a
    /// fixed-date policy never expire.
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        self.expiration_type == ExpirationType::FixedDate
            && self.expiration_date.map_or(false, |d| d <= now)
    }

    /// Status as every read path must report it: an active card past its
    /// fixed date shows as expired. Stored state is not mutated here; a card
    /// already used or deactivated is never reclassified.
    pub fn display_status(&self, now: OffsetDateTime) -> GiftCardStatus {
        if self.status == GiftCardStatus::Active && self.is_expired(now) {
            GiftCardStatus::Expired
        } else {
            self.status
        }
    }

    /// Debit precondition: active (by derived status) with balance remaining.
    pub fn is_usable(&self, now: OffsetDateTime) -> bool {
        self.display_status(now) == GiftCardStatus::Active && self.current_balance > 0
    }
}

/// Immutable ledger record. Append-only; total ordering by insertion.
#[derive(Debug, Clone)]
pub struct Transaction {
    pub id: Uuid,
    pub kind: TransactionKind,
    pub amount: i64,
    pub balance_after: i64,
    pub order_ref: Option<String>,
    pub note: Option<String>,
    pub created_at: OffsetDateTime,
}

/// Staff annotation on a gift card, addressed by positional index.
#[derive(Debug, Clone)]
pub struct Comment {
    pub author: String,
    pub text: String,
    pub created_at: OffsetDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    fn card(status: GiftCardStatus, exp: ExpirationType, date: Option<OffsetDateTime>) -> GiftCard {
        let now = OffsetDateTime::now_utc();
        GiftCard {
            id: Uuid::new_v4(),
            code: "GC-100".into(),
            initial_value: 100,
            current_balance: 100,
            currency: "Rs".into(),
            expiration_type: exp,
            expiration_date: date,
            customer: Customer::default(),
            notes: None,
            status,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn active_card_past_fixed_date_displays_expired() {
        let now = OffsetDateTime::now_utc();
        let c = card(
            GiftCardStatus::Active,
            ExpirationType::FixedDate,
            Some(now - Duration::days(1)),
        );
        assert_eq!(c.display_status(now), GiftCardStatus::Expired);
        assert!(!c.is_usable(now));
    }

    #[test]
    fn active_card_before_fixed_date_stays_active() {
        let now = OffsetDateTime::now_utc();
        let c = card(
            GiftCardStatus::Active,
            ExpirationType::FixedDate,
            Some(now + Duration::days(30)),
        );
        assert_eq!(c.display_status(now), GiftCardStatus::Active);
        assert!(c.is_usable(now));
    }

    #[test]
    fn no_expiry_policy_never_expires() {
        let now = OffsetDateTime::now_utc();
        let c = card(GiftCardStatus::Active, ExpirationType::None, None);
        assert_eq!(c.display_status(now), GiftCardStatus::Active);
    }

    #[test]
    fn deactivated_and_used_cards_are_not_reclassified() {
        let now = OffsetDateTime::now_utc();
        let past = Some(now - Duration::days(1));
        let d = card(GiftCardStatus::Deactivated, ExpirationType::FixedDate, past);
        assert_eq!(d.display_status(now), GiftCardStatus::Deactivated);
        let u = card(GiftCardStatus::Used, ExpirationType::FixedDate, past);
        assert_eq!(u.display_status(now), GiftCardStatus::Used);
    }

    #[test]
    fn zero_balance_card_is_not_usable() {
        let now = OffsetDateTime::now_utc();
        let mut c = card(GiftCardStatus::Active, ExpirationType::None, None);
        c.current_balance = 0;
        assert!(!c.is_usable(now));
    }

    #[test]
    fn expiration_type_uses_kebab_wire_names() {
        assert_eq!(
            serde_json::to_string(&ExpirationType::FixedDate).unwrap(),
            "\"fixed-date\""
        );
        let parsed: ExpirationType = serde_json::from_str("\"fixed-date\"").unwrap();
        assert_eq!(parsed, ExpirationType::FixedDate);
        assert_eq!(ExpirationType::parse("fixed-date"), Some(ExpirationType::FixedDate));
    }
}
