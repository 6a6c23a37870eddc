use thiserror::Error;

/// Why an inbound event was not carried out. The display text is what the
/// originator is told.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("Invalid request: {0}")]
    Validation(String),
    #[error("You are sending too fast. Try again.")]
    RateLimited,
    #[error("Nobody is connected right now.")]
    NoActivePartner,
    #[error("Your IP is banned.")]
    Banned,
}
