//! DHCPv6 message framing (RFC 3315 §6 and §7).
//!
//! Client/server messages:
//!
//! ```text
//! | msg-type (1) | transaction-id (3) | options ... |
//! ```
//!
//! Relay agent/server messages (RELAY-FORW, RELAY-REPL):
//!
//! ```text
//! | msg-type (1) | hop-count (1) | link-address (16) | peer-address (16) | options ... |
//! ```

use std::fmt;
use std::net::Ipv6Addr;

use byteorder::{ByteOrder, NetworkEndian};

use crate::codec::OptionRegistry;
use crate::error::{Error, Result};
use crate::options::{ClientIdOption, Duid, OptionContainer, ServerIdOption};

/// Client/server message header length.
pub const CLIENT_HEADER_LEN: usize = 4;

/// Relay message header length.
pub const RELAY_HEADER_LEN: usize = 34;

/// Transaction ids are 24 bits wide.
pub const TRANSACTION_ID_MASK: u32 = 0x00ff_ffff;

/// DHCPv6 message types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    Solicit,
    Advertise,
    Request,
    Confirm,
    Renew,
    Rebind,
    Reply,
    Release,
    Decline,
    Reconfigure,
    InformationRequest,
    RelayForward,
    RelayReply,
    Unknown(u8),
}

impl MessageType {
    pub fn code(self) -> u8 {
        match self {
            Self::Solicit => 1,
            Self::Advertise => 2,
            Self::Request => 3,
            Self::Confirm => 4,
            Self::Renew => 5,
            Self::Rebind => 6,
            Self::Reply => 7,
            Self::Release => 8,
            Self::Decline => 9,
            Self::Reconfigure => 10,
            Self::InformationRequest => 11,
            Self::RelayForward => 12,
            Self::RelayReply => 13,
            Self::Unknown(code) => code,
        }
    }

    /// Relay messages use the hop-count/link/peer header.
    pub fn is_relay(self) -> bool {
        matches!(self, Self::RelayForward | Self::RelayReply)
    }
}

impl From<u8> for MessageType {
    fn from(value: u8) -> Self {
        match value {
            1 => Self::Solicit,
            2 => Self::Advertise,
            3 => Self::Request,
            4 => Self::Confirm,
            5 => Self::Renew,
            6 => Self::Rebind,
            7 => Self::Reply,
            8 => Self::Release,
            9 => Self::Decline,
            10 => Self::Reconfigure,
            11 => Self::InformationRequest,
            12 => Self::RelayForward,
            13 => Self::RelayReply,
            other => Self::Unknown(other),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Solicit => write!(f, "SOLICIT"),
            Self::Advertise => write!(f, "ADVERTISE"),
            Self::Request => write!(f, "REQUEST"),
            Self::Confirm => write!(f, "CONFIRM"),
            Self::Renew => write!(f, "RENEW"),
            Self::Rebind => write!(f, "REBIND"),
            Self::Reply => write!(f, "REPLY"),
            Self::Release => write!(f, "RELEASE"),
            Self::Decline => write!(f, "DECLINE"),
            Self::Reconfigure => write!(f, "RECONFIGURE"),
            Self::InformationRequest => write!(f, "INFORMATION-REQUEST"),
            Self::RelayForward => write!(f, "RELAY-FORW"),
            Self::RelayReply => write!(f, "RELAY-REPL"),
            Self::Unknown(code) => write!(f, "UNKNOWN({})", code),
        }
    }
}

/// The part of the header that differs between client and relay messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    Client {
        transaction_id: u32,
    },
    Relay {
        hop_count: u8,
        link_address: Ipv6Addr,
        peer_address: Ipv6Addr,
    },
}

/// A decoded DHCPv6 message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub message_type: MessageType,
    pub framing: Framing,
    pub options: OptionContainer,
}

impl Message {
    /// Creates a client/server message with no options.
    pub fn new(message_type: MessageType, transaction_id: u32) -> Self {
        Self {
            message_type,
            framing: Framing::Client {
                transaction_id: transaction_id & TRANSACTION_ID_MASK,
            },
            options: OptionContainer::new(),
        }
    }

    /// Creates a relay message with no options.
    pub fn new_relay(
        message_type: MessageType,
        hop_count: u8,
        link_address: Ipv6Addr,
        peer_address: Ipv6Addr,
    ) -> Self {
        Self {
            message_type,
            framing: Framing::Relay {
                hop_count,
                link_address,
                peer_address,
            },
            options: OptionContainer::new(),
        }
    }

    /// Parses a DHCPv6 message.
    ///
    /// The framing is chosen by the message type: RELAY-FORW and RELAY-REPL
    /// carry the relay header, every other type a transaction id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Malformed`] if the buffer is shorter than the header
    /// or the option stream is truncated.
    pub fn parse(data: &[u8], registry: &OptionRegistry) -> Result<Self> {
        let Some(&type_code) = data.first() else {
            return Err(Error::Malformed("Empty message".to_string()));
        };
        let message_type = MessageType::from(type_code);

        let (framing, header_len) = if message_type.is_relay() {
            if data.len() < RELAY_HEADER_LEN {
                return Err(Error::Malformed(format!(
                    "Relay message too short: {} bytes",
                    data.len()
                )));
            }
            let framing = Framing::Relay {
                hop_count: data[1],
                link_address: ipv6_at(data, 2),
                peer_address: ipv6_at(data, 18),
            };
            (framing, RELAY_HEADER_LEN)
        } else {
            if data.len() < CLIENT_HEADER_LEN {
                return Err(Error::Malformed(format!(
                    "Message too short: {} bytes",
                    data.len()
                )));
            }
            let framing = Framing::Client {
                transaction_id: NetworkEndian::read_u24(&data[1..4]),
            };
            (framing, CLIENT_HEADER_LEN)
        };

        let options = registry.decode_options(&data[header_len..])?;

        Ok(Self {
            message_type,
            framing,
            options,
        })
    }

    /// Encodes the message to bytes.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(RELAY_HEADER_LEN);
        out.push(self.message_type.code());

        match self.framing {
            Framing::Client { transaction_id } => {
                let mut xid = [0u8; 3];
                NetworkEndian::write_u24(&mut xid, transaction_id & TRANSACTION_ID_MASK);
                out.extend_from_slice(&xid);
            }
            Framing::Relay {
                hop_count,
                link_address,
                peer_address,
            } => {
                out.push(hop_count);
                out.extend_from_slice(&link_address.octets());
                out.extend_from_slice(&peer_address.octets());
            }
        }

        self.options.encode_into(&mut out)?;
        Ok(out)
    }

    /// Returns the transaction id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoTransactionId`] for relay messages.
    pub fn transaction_id(&self) -> Result<u32> {
        match self.framing {
            Framing::Client { transaction_id } => Ok(transaction_id),
            Framing::Relay { .. } => Err(Error::NoTransactionId),
        }
    }

    pub fn is_relay(&self) -> bool {
        matches!(self.framing, Framing::Relay { .. })
    }

    /// Returns the DUID from the Client Identifier option, if present.
    pub fn client_id(&self) -> Result<Option<Duid>> {
        Ok(self.options.get::<ClientIdOption>()?.map(ClientIdOption::duid))
    }

    /// Returns the DUID from the Server Identifier option, if present.
    pub fn server_id(&self) -> Result<Option<Duid>> {
        Ok(self.options.get::<ServerIdOption>()?.map(ServerIdOption::duid))
    }

    /// Starts a reply to this message.
    ///
    /// The reply has the same transaction id, the given type and a Server
    /// Identifier option carrying `server_duid`. Nothing else is copied.
    pub fn create_reply(&self, message_type: MessageType, server_duid: &Duid) -> Result<Self> {
        let mut reply = Self::new(message_type, self.transaction_id()?);
        reply.options.add(ServerIdOption::new(server_duid));
        Ok(reply)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.framing {
            Framing::Client { transaction_id } => {
                write!(f, "{} xid={:06x}", self.message_type, transaction_id)?;
            }
            Framing::Relay {
                hop_count,
                link_address,
                peer_address,
            } => {
                write!(
                    f,
                    "{} hops={} link={} peer={}",
                    self.message_type, hop_count, link_address, peer_address
                )?;
            }
        }
        let codes: Vec<String> = self.options.iter().map(|o| o.code().to_string()).collect();
        write!(f, " options=[{}]", codes.join(","))
    }
}

fn ipv6_at(data: &[u8], offset: usize) -> Ipv6Addr {
    let mut octets = [0u8; 16];
    octets.copy_from_slice(&data[offset..offset + 16]);
    Ipv6Addr::from(octets)
}
