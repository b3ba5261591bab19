/// Wire protocol for the referral notification relay
///
/// Shared by the relay service and its clients so that both ends agree on
/// one closed set of message kinds:
/// - `ClientMessage`: control frames a browser session sends (subscribe, heartbeat)
/// - `ServerMessage`: frames the relay pushes to a session
/// - Push bodies: what the purchase-processing workflow POSTs to the relay
pub mod error;
pub mod messages;
pub mod push;
pub mod user;

pub use error::ProtocolError;
pub use messages::{
    ClientMessage, Connected, EarningUpdate, EventKind, HeartbeatResponse, PurchaseCompleted,
    ReferralJoined, ReferralLevel, ServerMessage, SubscriptionStatus,
};
pub use push::{
    BroadcastRequest, PurchaseFanoutRequest, PushRequest, PushResponse, ReferrerEarning,
};
pub use user::UserId;

/// Close code a client uses for a deliberate shutdown; any other code is abnormal.
pub const NORMAL_CLOSURE: u16 = 1000;
