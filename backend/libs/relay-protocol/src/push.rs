/// HTTP bodies accepted by the relay from the purchase-processing workflow
use chrono::Utc;
use serde::{Deserialize, Serialize};
use crate::error::ProtocolError;
use crate::messages::{EarningUpdate, PurchaseCompleted, ReferralLevel, ServerMessage};
use crate::user::UserId;

/// `POST {type, userId, data}`: push one notification to one user
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushRequest {
    #[serde(rename = "type")]
    pub kind: String,
    pub user_id: UserId,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl PushRequest {
    /// Validate the request into its recipient and typed message
    pub fn into_message(self) -> Result<(UserId, ServerMessage), ProtocolError> {
        let message = ServerMessage::notification(&self.kind, self.data)?;
        Ok((self.user_id, message))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PushResponse {
    pub fn delivered() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

/// `POST {type, data}`: push one notification to every connected user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastRequest {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl BroadcastRequest {
    pub fn into_message(self) -> Result<ServerMessage, ProtocolError> {
        ServerMessage::notification(&self.kind, self.data)
    }
}

/// One referrer's share of a purchase, already computed by the caller
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferrerEarning {
    pub referrer_id: UserId,
    pub level: ReferralLevel,
    pub earning: f64,
}

/// A completed purchase and every referrer who earns from it
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseFanoutRequest {
    pub referral_name: String,
    pub amount: f64,
    pub referrers: Vec<ReferrerEarning>,
}

impl PurchaseFanoutRequest {
    /// Messages to deliver, in order: for each referrer a `purchase_completed`
    /// followed by an `earning_update`.
    pub fn messages(&self) -> Vec<(UserId, ServerMessage)> {
        let timestamp = Utc::now();
        let source = format!("Purchase by {}", self.referral_name);

        self.referrers
            .iter()
            .flat_map(|referrer| {
                [
                    (
                        referrer.referrer_id.clone(),
                        ServerMessage::PurchaseCompleted(PurchaseCompleted {
                            referral_name: self.referral_name.clone(),
                            amount: self.amount,
                            earning: referrer.earning,
                            level: referrer.level,
                            timestamp,
                        }),
                    ),
                    (
                        referrer.referrer_id.clone(),
                        ServerMessage::EarningUpdate(EarningUpdate {
                            amount: referrer.earning,
                            source: source.clone(),
                            timestamp,
                        }),
                    ),
                ]
            })
            .collect()
    }
}
