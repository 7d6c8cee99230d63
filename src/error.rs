//! Error types for the DHCPv6 server.
//!
//! All fallible operations in this crate return [`Result<T>`], which uses
//! the [`Error`] enum for error variants. None of these are fatal to the
//! process: the transport logs them and drops the datagram.

/// Errors that can occur while decoding, handling or answering DHCPv6 messages.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// File system or network I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error (config file).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed datagram.
    ///
    /// The buffer ended before a declared header or option length was
    /// satisfied. The transport drops such datagrams silently.
    #[error("Malformed DHCPv6 message: {0}")]
    Malformed(String),

    /// Message type the engine has no handler for.
    ///
    /// Raised by the default [`UnknownMessageHandler`](crate::engine::UnknownMessageHandler).
    #[error("Unknown DHCPv6 message type {0}")]
    UnknownMessage(u8),

    /// The message violates RFC 3315 shape rules for its type.
    ///
    /// For example a SOLICIT carrying a Server Identifier, a REQUEST for a
    /// different server, or a server-side message type received by a server.
    #[error("Invalid DHCPv6 message: {0}")]
    InvalidMessage(String),

    /// RFC 3315 forbids replying to this message.
    ///
    /// CONFIRM without any address information, or REBIND for an IA the
    /// server has no binding for. The engine maps this to "no reply".
    #[error("Unable to answer: {0}")]
    UnableToAnswer(String),

    /// A singleton option appeared more than once in a container.
    #[error("Option {0} must appear at most once")]
    DuplicateOption(u16),

    /// Relay messages carry hop count and addresses instead of a transaction id.
    #[error("Relay messages have no transaction id")]
    NoTransactionId,

    /// The address pool has no free address left.
    #[error("No available IPv6 addresses in pool")]
    PoolExhausted,

    /// Invalid server configuration or lifetimes policy.
    ///
    /// Returned by [`Config::validate`](crate::Config::validate) and
    /// [`Lifetimes::new`](crate::lease::Lifetimes::new).
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Socket creation or configuration error.
    ///
    /// Typically occurs when binding to port 547 without administrator
    /// privileges, or when joining the DHCPv6 multicast group fails.
    #[error("Socket error: {0}")]
    Socket(String),
}

impl Error {
    /// Returns true if the error means "send nothing back" rather than a failure worth a warning.
    pub fn is_no_reply(&self) -> bool {
        matches!(self, Self::UnableToAnswer(_))
    }
}

/// A specialized Result type for DHCPv6 operations.
pub type Result<T> = std::result::Result<T, Error>;
