//! Storage key constants.

/// Keys of the persisted session layout.
pub struct StorageKeys;

impl StorageKeys {
    /// Raw bearer credential
    pub const AUTH_TOKEN: &'static str = "auth_token";

    /// Cached profile (JSON)
    pub const AUTH_USER: &'static str = "auth_user";

    /// Last successful server verification (RFC 3339, advisory only)
    pub const AUTH_LAST_VERIFIED: &'static str = "auth_last_verified";

    /// Every key that belongs to the session pair.
    pub const SESSION_KEYS: [&'static str; 3] = [
        Self::AUTH_TOKEN,
        Self::AUTH_USER,
        Self::AUTH_LAST_VERIFIED,
    ];
}
