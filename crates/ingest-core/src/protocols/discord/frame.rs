//! Gateway wire frame format.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub mod opcode {
    pub const DISPATCH: u8 = 0;
    pub const HEARTBEAT: u8 = 1;
    pub const IDENTIFY: u8 = 2;
    pub const RESUME: u8 = 6;
    pub const RECONNECT: u8 = 7;
    pub const INVALID_SESSION: u8 = 9;
    pub const HELLO: u8 = 10;
    pub const HEARTBEAT_ACK: u8 = 11;
}

/// Fatal close codes: authentication failed, invalid shard, sharding
/// required, invalid API version, invalid/disallowed intents. On these
/// the ingestor transitions straight to `failed`.
pub mod close_code {
    pub const AUTHENTICATION_FAILED: u16 = 4004;
    pub const INVALID_SHARD: u16 = 4010;
    pub const SHARDING_REQUIRED: u16 = 4011;
    pub const INVALID_API_VERSION: u16 = 4012;
    pub const INVALID_INTENTS: u16 = 4013;
    pub const DISALLOWED_INTENTS: u16 = 4014;

    pub const REPLAY: u16 = 4000;
    pub const ZOMBIE: u16 = 4009;
    pub const NORMAL: u16 = 1000;

    pub const FATAL: [u16; 6] = [
        AUTHENTICATION_FAILED,
        INVALID_SHARD,
        SHARDING_REQUIRED,
        INVALID_API_VERSION,
        INVALID_INTENTS,
        DISALLOWED_INTENTS,
    ];

    pub fn is_fatal(code: u16) -> bool {
        FATAL.contains(&code)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayFrame {
    pub op: u8,
    #[serde(default)]
    pub d: Value,
    #[serde(default)]
    pub s: Option<i64>,
    #[serde(default)]
    pub t: Option<String>,
}
