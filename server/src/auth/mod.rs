//! Session validation boundary.
//!
//! Tokens are issued by the account service; the gateway only checks them
//! and learns which user is connecting.

pub mod jwt;

/// Why a handshake token was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Token signature is fine but it has expired
    Expired,
    /// Token is malformed, badly signed, or names no user
    Invalid,
}

impl AuthError {
    /// WebSocket close code sent to the client before hanging up.
    pub fn close_code(&self) -> u16 {
        match self {
            AuthError::Expired => 4001,
            AuthError::Invalid => 4002,
        }
    }
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::Expired => write!(f, "Token expired"),
            AuthError::Invalid => write!(f, "Token invalid"),
        }
    }
}

impl std::error::Error for AuthError {}

/// Resolves a handshake token to the authenticated user id.
pub trait SessionValidator: Send + Sync {
    fn validate_session(&self, token: &str) -> Result<String, AuthError>;
}
