//! Protocol Messages
//!
//! Wire format for overlay and ingest clients over WebSocket.
//! Server frames are JSON `{"type": <topic>, "data": {...}}`; action
//! submissions may also arrive as bincode for the ingest fast path.

use serde::{Serialize, Deserialize};

use crate::game::action::{ActionKind, ActionRequest};
use crate::game::slot::SpinResult;
use crate::ledger::{BonusProgress, ConfigPatch, LeaderboardEntry, LiveConfig};

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Requests sent from a client to the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Submit an audience action.
    SubmitAction(ActionRequest),

    /// Spend points on a spin.
    SpinPoints {
        /// Spending user.
        #[serde(default, rename = "userId")]
        user_id: Option<String>,
    },

    /// Current top-N leaderboard.
    GetLeaderboard {
        /// Entries wanted (server default if absent).
        #[serde(default)]
        limit: Option<usize>,
    },

    /// Current global bonus progress.
    GetProgress,

    /// A user's point balance.
    GetBalance {
        /// User to look up.
        #[serde(default, rename = "userId")]
        user_id: Option<String>,
    },

    /// Current jackpot pool.
    GetJackpot,

    /// Current live configuration.
    GetConfig,

    /// Patch the live configuration (admin).
    PatchConfig {
        /// Admin credential.
        token: String,
        /// Fields to change.
        patch: ConfigPatch,
    },

    /// Pay a bonus to a user out of cycle (admin).
    ForceBonus {
        /// Admin credential.
        token: String,
        /// Recipient.
        #[serde(rename = "userId")]
        user_id: String,
    },

    /// Ping for latency measurement.
    Ping {
        /// Client timestamp, echoed back.
        timestamp: u64,
    },
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Events and replies sent from the server to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OverlayEvent {
    /// Greeting on connect.
    #[serde(rename = "hello")]
    Hello(Hello),

    /// Outcome of one processed action.
    #[serde(rename = "play:event")]
    Play(PlayEvent),

    /// Global or forced bonus payout.
    #[serde(rename = "play:bonus")]
    Bonus(BonusEvent),

    /// Progress toward the next global bonus.
    #[serde(rename = "bonus:progress")]
    Progress(BonusProgress),

    /// Periodic leaderboard snapshot.
    #[serde(rename = "leaderboard:update")]
    Leaderboard(Vec<LeaderboardEntry>),

    /// Live configuration changed.
    #[serde(rename = "config:update")]
    Config(LiveConfig),

    /// Reply to a request.
    #[serde(rename = "response")]
    Response(Response),

    /// Request failed.
    #[serde(rename = "error")]
    Error(ErrorPayload),
}

/// Greeting payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hello {
    /// Server time (Unix milliseconds).
    pub ts: i64,
    /// Server version.
    pub version: String,
}

/// What paid for a play.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaySource {
    /// Paid gift.
    Gift,
    /// Free audience action.
    Action,
    /// Spent points.
    Points,
}

/// Per-action outcome broadcast to overlays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayEvent {
    /// Acting user.
    pub user_id: String,
    /// Action kind (absent for points spins).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<ActionKind>,
    /// Medals dropped.
    pub dropped: u64,
    /// Medals that fell.
    pub fallen: u64,
    /// Bonus hole flag (0 or 1).
    pub bonus: u8,
    /// Jackpot contribution to the score.
    pub jackpot_delta: u64,
    /// Final score credited.
    pub score: u64,
    /// Slot outcome.
    pub spin: SpinResult,
    /// What paid for the play.
    pub source: PlaySource,
}

/// Kind of bonus payout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BonusKind {
    /// Global counter crossed the threshold.
    Global,
    /// Operator paid a bonus by hand.
    Forced,
}

/// Bonus payout notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BonusEvent {
    /// Payout kind.
    pub kind: BonusKind,
    /// Recipient.
    pub user_id: String,
    /// Action that crossed the threshold (absent for forced or points payouts).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<ActionKind>,
    /// Cycle length at payout time.
    pub threshold: u64,
    /// Score credited.
    pub bonus_score: u64,
    /// Actions left in the current cycle.
    pub remain: u64,
}

/// Result of a submitted or points-paid play.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionReceipt {
    /// Medals fed into the physics stage.
    pub medals: u64,
    /// Broadcast outcome.
    pub play: PlayEvent,
    /// Counter state after this play.
    pub progress: BonusProgress,
    /// Whether this play completed a bonus cycle.
    pub triggered: bool,
    /// Bonus paid, if triggered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bonus: Option<BonusEvent>,
    /// Point balance after a points spin.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balance_after: Option<u64>,
}

/// A user's point balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceInfo {
    /// User.
    pub user_id: String,
    /// Balance.
    pub balance: u64,
}

/// Request replies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Response {
    /// Play accepted and settled.
    Receipt(ActionReceipt),
    /// Leaderboard page.
    Leaderboard {
        /// Ranked entries, best first.
        entries: Vec<LeaderboardEntry>,
    },
    /// Bonus progress.
    Progress(BonusProgress),
    /// Point balance.
    Balance(BalanceInfo),
    /// Jackpot pool.
    Jackpot {
        /// Pool value.
        pool: u64,
    },
    /// Live configuration.
    Config(LiveConfig),
    /// Forced bonus paid.
    Bonus(BonusEvent),
    /// Ping reply.
    Pong {
        /// Echoed client timestamp.
        timestamp: u64,
        /// Server time (Unix milliseconds).
        server_time: u64,
    },
}

/// Error reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
}

/// Error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Malformed request or action.
    InvalidInput,
    /// Not enough points.
    InsufficientBalance,
    /// Ledger backend unreachable.
    StoreUnavailable,
    /// Missing or invalid admin credential.
    Forbidden,
    /// Server overloaded.
    ServerOverloaded,
    /// Internal error.
    InternalError,
}

impl OverlayEvent {
    /// Build an error reply.
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        OverlayEvent::Error(ErrorPayload {
            code,
            message: message.into(),
        })
    }

    /// Topic name as seen on the wire.
    pub fn topic(&self) -> &'static str {
        match self {
            OverlayEvent::Hello(_) => "hello",
            OverlayEvent::Play(_) => "play:event",
            OverlayEvent::Bonus(_) => "play:bonus",
            OverlayEvent::Progress(_) => "bonus:progress",
            OverlayEvent::Leaderboard(_) => "leaderboard:update",
            OverlayEvent::Config(_) => "config:update",
            OverlayEvent::Response(_) => "response",
            OverlayEvent::Error(_) => "error",
        }
    }
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl ClientMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl OverlayEvent {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

// Tagged enums do not survive bincode, so the binary path carries a bare
// action request only.
impl ActionRequest {
    /// Serialize to binary.
    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    /// Deserialize from binary.
    pub fn from_bytes(data: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::slot::{Symbol, Tier};

    fn sample_spin() -> SpinResult {
        SpinResult {
            tier: Tier::High,
            multiplier: 2.0,
            symbols: [Symbol::Fire; 3],
            bonus_game: false,
            combo_extend: false,
        }
    }

    #[test]
    fn test_submit_action_json() {
        let msg = ClientMessage::from_json(
            r#"{"type":"submit_action","kind":"gift","userId":"u1","amount":500}"#,
        )
        .unwrap();

        if let ClientMessage::SubmitAction(req) = msg {
            let event = req.validate().unwrap();
            assert_eq!(event.kind, ActionKind::Gift);
            assert_eq!(event.user_id, "u1");
            assert_eq!(event.amount_minor_units, 500);
        } else {
            panic!("Wrong message type");
        }
    }

    #[test]
    fn test_admin_requests_json() {
        let msg = ClientMessage::from_json(
            r#"{"type":"patch_config","token":"t","patch":{"threshold":10,"fxLevel":1.2}}"#,
        )
        .unwrap();
        if let ClientMessage::PatchConfig { token, patch } = msg {
            assert_eq!(token, "t");
            assert_eq!(patch.threshold, Some(10));
            assert_eq!(patch.fx_level, Some(1.2));
            assert!(patch.pace_ms.is_none());
        } else {
            panic!("Wrong message type");
        }

        let msg = ClientMessage::from_json(r#"{"type":"force_bonus","token":"t","userId":"u9"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::ForceBonus { ref user_id, .. } if user_id == "u9"));

        let msg = ClientMessage::from_json(r#"{"type":"get_progress"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::GetProgress));

        let msg = ClientMessage::from_json(r#"{"type":"get_leaderboard"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::GetLeaderboard { limit: None }));
    }

    #[test]
    fn test_overlay_event_envelope() {
        let event = OverlayEvent::Play(PlayEvent {
            user_id: "u1".into(),
            action: Some(ActionKind::Like),
            dropped: 1,
            fallen: 0,
            bonus: 1,
            jackpot_delta: 0,
            score: 200,
            spin: sample_spin(),
            source: PlaySource::Action,
        });

        let json: serde_json::Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();
        assert_eq!(json["type"], "play:event");
        assert_eq!(json["data"]["userId"], "u1");
        assert_eq!(json["data"]["action"], "like");
        assert_eq!(json["data"]["jackpotDelta"], 0);
        assert_eq!(json["data"]["source"], "action");
        assert_eq!(json["data"]["spin"]["tier"], "HIGH");
        assert_eq!(event.topic(), "play:event");

        let parsed = OverlayEvent::from_json(&event.to_json().unwrap()).unwrap();
        assert_eq!(parsed, event);
    }

    #[test]
    fn test_bonus_and_progress_shape() {
        let bonus = OverlayEvent::Bonus(BonusEvent {
            kind: BonusKind::Global,
            user_id: "u10".into(),
            action: Some(ActionKind::Comment),
            threshold: 10,
            bonus_score: 500,
            remain: 0,
        });
        let json: serde_json::Value = serde_json::from_str(&bonus.to_json().unwrap()).unwrap();
        assert_eq!(json["type"], "play:bonus");
        assert_eq!(json["data"]["kind"], "global");
        assert_eq!(json["data"]["bonusScore"], 500);

        let progress = OverlayEvent::Progress(BonusProgress::at(13, 10));
        let json: serde_json::Value = serde_json::from_str(&progress.to_json().unwrap()).unwrap();
        assert_eq!(json["type"], "bonus:progress");
        assert_eq!(json["data"]["after"], 13);
        assert_eq!(json["data"]["remain"], 7);
    }

    #[test]
    fn test_leaderboard_is_array() {
        let event = OverlayEvent::Leaderboard(vec![LeaderboardEntry {
            user_id: "a".into(),
            score: 5,
        }]);
        let json: serde_json::Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();
        assert_eq!(json["type"], "leaderboard:update");
        assert_eq!(json["data"][0]["userId"], "a");
        assert_eq!(json["data"][0]["score"], 5);
    }

    #[test]
    fn test_response_and_error_codes() {
        let reply = OverlayEvent::Response(Response::Balance(BalanceInfo {
            user_id: "u".into(),
            balance: 1900,
        }));
        let json: serde_json::Value = serde_json::from_str(&reply.to_json().unwrap()).unwrap();
        assert_eq!(json["data"]["kind"], "balance");
        assert_eq!(json["data"]["balance"], 1900);

        let err = OverlayEvent::error(ErrorCode::InsufficientBalance, "balance 0 < cost 100");
        let json = err.to_json().unwrap();
        assert!(json.contains("insufficient_balance"));
        assert!(json.contains(r#""type":"error""#));
    }

    #[test]
    fn test_binary_action_request() {
        let req = ActionRequest {
            kind: Some("follow".into()),
            user_id: Some("viewer".into()),
            amount: None,
        };

        let bytes = req.to_bytes().unwrap();
        let parsed = ActionRequest::from_bytes(&bytes).unwrap();
        let event = parsed.validate().unwrap();
        assert_eq!(event.kind, ActionKind::Follow);
        assert_eq!(event.user_id, "viewer");

        assert!(ActionRequest::from_bytes(&[0xff]).is_err());
    }
}
