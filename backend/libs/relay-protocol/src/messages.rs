/// Message types exchanged over a relay WebSocket
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use crate::error::ProtocolError;
use crate::user::UserId;

/// Every kind of message the relay can send to a client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    EarningUpdate,
    ReferralJoined,
    PurchaseCompleted,
    Connected,
    HeartbeatResponse,
}

impl EventKind {
    /// Kinds that carry a notification for UI subscribers
    pub const NOTIFICATIONS: [EventKind; 3] = [
        EventKind::EarningUpdate,
        EventKind::ReferralJoined,
        EventKind::PurchaseCompleted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::EarningUpdate => "earning_update",
            EventKind::ReferralJoined => "referral_joined",
            EventKind::PurchaseCompleted => "purchase_completed",
            EventKind::Connected => "connected",
            EventKind::HeartbeatResponse => "heartbeat_response",
        }
    }

    /// Control kinds (`connected`, `heartbeat_response`) are answers to a
    /// client's own frames and never reach UI subscribers.
    pub fn is_notification(&self) -> bool {
        Self::NOTIFICATIONS.contains(self)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "earning_update" => Ok(EventKind::EarningUpdate),
            "referral_joined" => Ok(EventKind::ReferralJoined),
            "purchase_completed" => Ok(EventKind::PurchaseCompleted),
            "connected" => Ok(EventKind::Connected),
            "heartbeat_response" => Ok(EventKind::HeartbeatResponse),
            other => Err(ProtocolError::UnknownType(other.to_string())),
        }
    }
}

/// Referral tier: 1 for a direct referral, 2 for a referral of a referral
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum ReferralLevel {
    Direct,
    Indirect,
}

impl TryFrom<u8> for ReferralLevel {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(ReferralLevel::Direct),
            2 => Ok(ReferralLevel::Indirect),
            other => Err(ProtocolError::InvalidLevel(other)),
        }
    }
}

impl From<ReferralLevel> for u8 {
    fn from(level: ReferralLevel) -> Self {
        match level {
            ReferralLevel::Direct => 1,
            ReferralLevel::Indirect => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Subscribed,
}

/// Acknowledges a `subscribe` control message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connected {
    pub status: SubscriptionStatus,
    pub user_id: UserId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatResponse {
    pub timestamp: DateTime<Utc>,
}

/// A referrer earned commission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EarningUpdate {
    pub amount: f64,
    pub source: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

/// Someone joined through the referrer's code, directly or one tier down
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferralJoined {
    pub referral_name: String,
    pub level: ReferralLevel,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

/// A referral made a purchase that earned the referrer `earning`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseCompleted {
    pub referral_name: String,
    pub amount: f64,
    pub earning: f64,
    pub level: ReferralLevel,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

/// Server → client frame, encoded as `{"type": ..., "data": {...}}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerMessage {
    Connected(Connected),
    HeartbeatResponse(HeartbeatResponse),
    EarningUpdate(EarningUpdate),
    ReferralJoined(ReferralJoined),
    PurchaseCompleted(PurchaseCompleted),
}

impl ServerMessage {
    pub fn kind(&self) -> EventKind {
        match self {
            ServerMessage::Connected(_) => EventKind::Connected,
            ServerMessage::HeartbeatResponse(_) => EventKind::HeartbeatResponse,
            ServerMessage::EarningUpdate(_) => EventKind::EarningUpdate,
            ServerMessage::ReferralJoined(_) => EventKind::ReferralJoined,
            ServerMessage::PurchaseCompleted(_) => EventKind::PurchaseCompleted,
        }
    }

    pub fn connected(user_id: impl Into<UserId>) -> Self {
        ServerMessage::Connected(Connected {
            status: SubscriptionStatus::Subscribed,
            user_id: user_id.into(),
        })
    }

    pub fn heartbeat_response() -> Self {
        ServerMessage::HeartbeatResponse(HeartbeatResponse {
            timestamp: Utc::now(),
        })
    }

    pub fn earning_update(amount: f64, source: impl Into<String>) -> Self {
        ServerMessage::EarningUpdate(EarningUpdate {
            amount,
            source: source.into(),
            timestamp: Utc::now(),
        })
    }

    pub fn referral_joined(referral_name: impl Into<String>, level: ReferralLevel) -> Self {
        ServerMessage::ReferralJoined(ReferralJoined {
            referral_name: referral_name.into(),
            level,
            timestamp: Utc::now(),
        })
    }

    pub fn purchase_completed(
        referral_name: impl Into<String>,
        amount: f64,
        earning: f64,
        level: ReferralLevel,
    ) -> Self {
        ServerMessage::PurchaseCompleted(PurchaseCompleted {
            referral_name: referral_name.into(),
            amount,
            earning,
            level,
            timestamp: Utc::now(),
        })
    }

    /// Build a notification from an untyped `(type, data)` pair.
    ///
    /// Validates `data` against the schema of `kind` and rejects the control
    /// kinds, which only the relay itself may emit.
    pub fn notification(kind: &str, data: serde_json::Value) -> Result<Self, ProtocolError> {
        let kind: EventKind = kind.parse()?;
        if !kind.is_notification() {
            return Err(ProtocolError::NotPushable(kind));
        }
        let message = serde_json::from_value(json!({ "type": kind.as_str(), "data": data }))?;
        Ok(message)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Client → server control frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Subscribe {
        #[serde(rename = "userId")]
        user_id: UserId,
    },
    Heartbeat,
}

impl ClientMessage {
    pub fn subscribe(user_id: impl Into<UserId>) -> Self {
        ClientMessage::Subscribe {
            user_id: user_id.into(),
        }
    }

    /// Decode a text frame, telling apart unknown kinds from broken payloads
    /// so the relay can log them differently.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        let kind = value
            .get("type")
            .and_then(serde_json::Value::as_str)
            .ok_or(ProtocolError::MissingType)?;

        match kind {
            "subscribe" | "heartbeat" => Ok(serde_json::from_value(value)?),
            other => Err(ProtocolError::UnknownType(other.to_string())),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
