//! Session store configuration.

#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Session lifetime in seconds (default: 604_800 = 7 days).
    pub session_lifetime_secs: u64,
    /// Lifetime of email verification codes in seconds
    /// (default: 86_400 = 24 hours).
    pub verification_lifetime_secs: u64,
    /// Optional pepper prepended to passwords before Argon2id hashing and
    /// verification. Must match the pepper given to the principal
    /// repository.
    pub pepper: Option<String>,
    /// Minimum password length for sign-up.
    pub min_password_length: usize,
    /// When set, sign-in is refused with a verification prompt until the
    /// email address is confirmed.
    pub require_email_confirmation: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_lifetime_secs: 604_800,
            verification_lifetime_secs: 86_400,
            pepper: None,
            min_password_length: 8,
            require_email_confirmation: true,
        }
    }
}
