//! Discord Gateway intent bitmask constants. Opcodes, close codes, and
//! intent bit positions are the external contract and must match the
//! documented values exactly.

pub const GUILDS: u32 = 1;
pub const GUILD_MEMBERS: u32 = 2;
pub const GUILD_MODERATION: u32 = 4;
pub const GUILD_EXPRESSIONS: u32 = 8;
pub const GUILD_INTEGRATIONS: u32 = 16;
pub const GUILD_WEBHOOKS: u32 = 32;
pub const GUILD_INVITES: u32 = 64;
pub const GUILD_VOICE_STATES: u32 = 128;
pub const GUILD_PRESENCES: u32 = 256;
pub const GUILD_MESSAGES: u32 = 512;
pub const GUILD_MESSAGE_REACTIONS: u32 = 1024;
pub const GUILD_MESSAGE_TYPING: u32 = 2048;
pub const DIRECT_MESSAGES: u32 = 4096;
pub const DIRECT_MESSAGE_REACTIONS: u32 = 8192;
pub const DIRECT_MESSAGE_TYPING: u32 = 16384;
pub const MESSAGE_CONTENT: u32 = 32768;
pub const GUILD_SCHEDULED_EVENTS: u32 = 65536;
pub const AUTO_MODERATION_CONFIGURATION: u32 = 1 << 20;
pub const AUTO_MODERATION_EXECUTION: u32 = 1 << 21;

/// Bitwise-OR of every documented intent, including privileged ones.
pub const ALL_INTENTS: u32 = GUILDS
    | GUILD_MEMBERS
    | GUILD_MODERATION
    | GUILD_EXPRESSIONS
    | GUILD_INTEGRATIONS
    | GUILD_WEBHOOKS
    | GUILD_INVITES
    | GUILD_VOICE_STATES
    | GUILD_PRESENCES
    | GUILD_MESSAGES
    | GUILD_MESSAGE_REACTIONS
    | GUILD_MESSAGE_TYPING
    | DIRECT_MESSAGES
    | DIRECT_MESSAGE_REACTIONS
    | DIRECT_MESSAGE_TYPING
    | MESSAGE_CONTENT
    | GUILD_SCHEDULED_EVENTS
    | AUTO_MODERATION_CONFIGURATION
    | AUTO_MODERATION_EXECUTION;

/// All intents except the three privileged ones.
pub const ALL_NON_PRIVILEGED_INTENTS: u32 =
    ALL_INTENTS & !(GUILD_MEMBERS | GUILD_PRESENCES | MESSAGE_CONTENT);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_privileged_excludes_the_three_privileged_intents() {
        assert_eq!(ALL_NON_PRIVILEGED_INTENTS & GUILD_MEMBERS, 0);
        assert_eq!(ALL_NON_PRIVILEGED_INTENTS & GUILD_PRESENCES, 0);
        assert_eq!(ALL_NON_PRIVILEGED_INTENTS & MESSAGE_CONTENT, 0);
    }

    #[test]
    fn non_privileged_is_subset_of_all() {
        assert_eq!(ALL_NON_PRIVILEGED_INTENTS & !ALL_INTENTS, 0);
    }

    #[test]
    fn bit_positions_match_documented_values() {
        assert_eq!(GUILDS, 1);
        assert_eq!(GUILD_VOICE_STATES, 128);
        assert_eq!(MESSAGE_CONTENT, 32768);
        assert_eq!(AUTO_MODERATION_EXECUTION, 1 << 21);
    }
}
