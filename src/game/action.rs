//! Audience Actions
//!
//! Inbound actions from the ingestion collaborator, their validation, and the
//! per-kind medal conversion that feeds the physics stage.

use serde::{Serialize, Deserialize};

/// Longest accepted user identifier (bytes).
pub const MAX_USER_ID_LEN: usize = 128;

/// User id used when the ingestion source omits one.
pub const ANONYMOUS_USER: &str = "anon";

/// Kind of audience action.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Chat comment.
    Comment,
    /// Like / tap.
    Like,
    /// New follower.
    Follow,
    /// Paid gift.
    Gift,
}

impl ActionKind {
    /// Parse a kind leniently. Unknown kinds are treated as comments.
    pub fn parse_lenient(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "like" => ActionKind::Like,
            "follow" => ActionKind::Follow,
            "gift" => ActionKind::Gift,
            _ => ActionKind::Comment,
        }
    }

    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Comment => "comment",
            ActionKind::Like => "like",
            ActionKind::Follow => "follow",
            ActionKind::Gift => "gift",
        }
    }
}

/// A validated audience action.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionEvent {
    /// Action kind.
    pub kind: ActionKind,
    /// Acting user.
    pub user_id: String,
    /// Gift value in minor currency units (0 for non-gift actions).
    pub amount_minor_units: u64,
}

impl ActionEvent {
    /// Build an action from already-typed parts.
    pub fn new(kind: ActionKind, user_id: impl Into<String>, amount_minor_units: u64) -> Self {
        Self {
            kind,
            user_id: user_id.into(),
            amount_minor_units,
        }
    }
}

/// Raw action as submitted by an ingestion source, before validation.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionRequest {
    /// Action kind (unknown or missing means comment).
    #[serde(default)]
    pub kind: Option<String>,
    /// Acting user.
    #[serde(default)]
    pub user_id: Option<String>,
    /// Gift value in minor units.
    #[serde(default)]
    pub amount: Option<f64>,
}

/// Reasons an action request is rejected.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ActionError {
    /// Amount was NaN or infinite.
    #[error("amount is not a finite number")]
    NonFiniteAmount,
    /// User id exceeds the length limit.
    #[error("user id longer than 128 bytes")]
    UserIdTooLong,
    /// User id contains control characters.
    #[error("user id contains control characters")]
    UserIdControlChars,
}

impl ActionRequest {
    /// Validate into an [`ActionEvent`].
    ///
    /// Negative and fractional amounts are floored (negative to 0); non-finite
    /// amounts are rejected. A missing or blank user becomes [`ANONYMOUS_USER`].
    pub fn validate(&self) -> Result<ActionEvent, ActionError> {
        let kind = self
            .kind
            .as_deref()
            .map(ActionKind::parse_lenient)
            .unwrap_or(ActionKind::Comment);

        let user_id = validate_user_id(self.user_id.as_deref())?;

        let amount_minor_units = match self.amount {
            None => 0,
            Some(a) if !a.is_finite() => return Err(ActionError::NonFiniteAmount),
            Some(a) if a <= 0.0 => 0,
            // `as` saturates for values above u64::MAX.
            Some(a) => a.floor() as u64,
        };

        Ok(ActionEvent {
            kind,
            user_id,
            amount_minor_units,
        })
    }
}

/// Normalize a user id, defaulting blanks to [`ANONYMOUS_USER`].
pub fn validate_user_id(raw: Option<&str>) -> Result<String, ActionError> {
    let trimmed = raw.map(str::trim).unwrap_or("");
    if trimmed.is_empty() {
        return Ok(ANONYMOUS_USER.to_string());
    }
    if trimmed.len() > MAX_USER_ID_LEN {
        return Err(ActionError::UserIdTooLong);
    }
    if trimmed.chars().any(char::is_control) {
        return Err(ActionError::UserIdControlChars);
    }
    Ok(trimmed.to_string())
}

/// Conversion table from actions to medals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedalTable {
    /// Coins granted per 100 minor units of gift value.
    pub coins_per_100_units: f64,
    /// Medals granted per 100 coins.
    pub medals_per_100_coins: f64,
    /// Medals for a comment.
    pub comment: u64,
    /// Medals for a like.
    pub like: u64,
    /// Medals for a follow.
    pub follow: u64,
    /// Medals for a points-paid spin.
    pub points_spin: u64,
}

impl Default for MedalTable {
    fn default() -> Self {
        Self {
            coins_per_100_units: 100.0,
            medals_per_100_coins: 5.0,
            comment: 1,
            like: 1,
            follow: 3,
            points_spin: 10,
        }
    }
}

impl MedalTable {
    /// Coins for a gift of the given value.
    pub fn gift_coins(&self, amount_minor_units: u64) -> u64 {
        (amount_minor_units as f64 * (self.coins_per_100_units / 100.0)).floor().max(0.0) as u64
    }

    /// Medals dropped for an action. Gifts always drop at least one medal.
    pub fn medals_for(&self, action: &ActionEvent) -> u64 {
        match action.kind {
            ActionKind::Gift => {
                let coins = self.gift_coins(action.amount_minor_units);
                let medals = (coins as f64 * (self.medals_per_100_coins / 100.0)).floor() as u64;
                medals.max(1)
            }
            ActionKind::Comment => self.comment,
            ActionKind::Like => self.like,
            ActionKind::Follow => self.follow,
        }
    }
}
