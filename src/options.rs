//! DHCPv6 options as defined in RFC 3315 and RFC 3646.
//!
//! DHCPv6 options are encoded as a 2-byte code, a 2-byte length and
//! `length` bytes of data. Every known option is represented by a typed view
//! that owns the option's raw bytes and reads or writes its fields at fixed
//! offsets, so decoding and re-encoding an option never changes its payload.
//! Options that carry suboptions (IA_NA, IA_TA, IA Address, Vendor-specific
//! Information) keep a fixed-size header followed by an embedded option
//! stream that is decoded on demand with an [`OptionRegistry`].
//!
//! Unknown option codes, and known codes whose payload has the wrong size,
//! are preserved as [`Dhcp6Option::Unrecognized`] so they can still be
//! forwarded byte-for-byte.
//!
//! # References
//!
//! - RFC 3315: Dynamic Host Configuration Protocol for IPv6
//! - RFC 3646: DNS Configuration options for DHCPv6

use std::fmt;
use std::net::Ipv6Addr;

use byteorder::{ByteOrder, NetworkEndian};

use crate::codec::OptionRegistry;
use crate::error::{Error, Result};
use crate::message::{Message, MessageType};

/// Maximum DUID length in bytes (RFC 3315 §9.1).
pub const MAX_DUID_LEN: usize = 128;

/// DHCPv6 option codes.
///
/// Only codes this server understands are listed; any other code is
/// carried as [`Dhcp6Option::Unrecognized`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum OptionCode {
    /// Client Identifier (RFC 3315 §22.2).
    ClientId = 1,
    /// Server Identifier (RFC 3315 §22.3).
    ServerId = 2,
    /// Identity Association for Non-temporary Addresses (RFC 3315 §22.4).
    IaNa = 3,
    /// Identity Association for Temporary Addresses (RFC 3315 §22.5).
    IaTa = 4,
    /// IA Address (RFC 3315 §22.6).
    IaAddress = 5,
    /// Option Request Option (RFC 3315 §22.7).
    OptionRequest = 6,
    /// Server preference (RFC 3315 §22.8).
    Preference = 7,
    /// Elapsed time since the client began the exchange (RFC 3315 §22.9).
    ElapsedTime = 8,
    /// Relayed message (RFC 3315 §22.10).
    RelayMessage = 9,
    /// Authentication (RFC 3315 §22.11). Never interpreted.
    Authentication = 11,
    /// Server unicast address (RFC 3315 §22.12).
    ServerUnicast = 12,
    /// Status code (RFC 3315 §22.13).
    StatusCode = 13,
    /// Rapid commit (RFC 3315 §22.14).
    RapidCommit = 14,
    /// User class (RFC 3315 §22.15).
    UserClass = 15,
    /// Vendor class (RFC 3315 §22.16).
    VendorClass = 16,
    /// Vendor-specific information (RFC 3315 §22.17).
    VendorOpts = 17,
    /// Relay interface identifier (RFC 3315 §22.18).
    InterfaceId = 18,
    /// Reconfigure message (RFC 3315 §22.19).
    ReconfigureMessage = 19,
    /// Reconfigure accept (RFC 3315 §22.20).
    ReconfigureAccept = 20,
    /// DNS recursive name servers (RFC 3646 §3).
    DnsServers = 23,
    /// Domain search list (RFC 3646 §4).
    DomainList = 24,
}

impl TryFrom<u16> for OptionCode {
    type Error = u16;

    fn try_from(value: u16) -> std::result::Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::ClientId),
            2 => Ok(Self::ServerId),
            3 => Ok(Self::IaNa),
            4 => Ok(Self::IaTa),
            5 => Ok(Self::IaAddress),
            6 => Ok(Self::OptionRequest),
            7 => Ok(Self::Preference),
            8 => Ok(Self::ElapsedTime),
            9 => Ok(Self::RelayMessage),
            11 => Ok(Self::Authentication),
            12 => Ok(Self::ServerUnicast),
            13 => Ok(Self::StatusCode),
            14 => Ok(Self::RapidCommit),
            15 => Ok(Self::UserClass),
            16 => Ok(Self::VendorClass),
            17 => Ok(Self::VendorOpts),
            18 => Ok(Self::InterfaceId),
            19 => Ok(Self::ReconfigureMessage),
            20 => Ok(Self::ReconfigureAccept),
            23 => Ok(Self::DnsServers),
            24 => Ok(Self::DomainList),
            other => Err(other),
        }
    }
}

/// Status codes carried in the Status Code option (RFC 3315 §24.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum StatusCode {
    Success = 0,
    UnspecFail = 1,
    NoAddrsAvail = 2,
    NoBinding = 3,
    NotOnLink = 4,
    UseMulticast = 5,
}

impl TryFrom<u16> for StatusCode {
    type Error = u16;

    fn try_from(value: u16) -> std::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Success),
            1 => Ok(Self::UnspecFail),
            2 => Ok(Self::NoAddrsAvail),
            3 => Ok(Self::NoBinding),
            4 => Ok(Self::NotOnLink),
            5 => Ok(Self::UseMulticast),
            other => Err(other),
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "Success"),
            Self::UnspecFail => write!(f, "UnspecFail"),
            Self::NoAddrsAvail => write!(f, "NoAddrsAvail"),
            Self::NoBinding => write!(f, "NoBinding"),
            Self::NotOnLink => write!(f, "NotOnLink"),
            Self::UseMulticast => write!(f, "UseMulticast"),
        }
    }
}

/// A DHCP Unique Identifier.
///
/// DUIDs are opaque to the server: two DUIDs are the same client exactly
/// when their bytes are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Duid(Vec<u8>);

impl Duid {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Parses a DUID from hex, accepting `:` or `-` separators.
    pub fn from_hex(text: &str) -> Result<Self> {
        let compact: String = text.chars().filter(|c| *c != ':' && *c != '-').collect();
        let bytes = hex::decode(&compact)
            .map_err(|error| Error::InvalidConfig(format!("Invalid DUID {:?}: {}", text, error)))?;
        if bytes.is_empty() || bytes.len() > MAX_DUID_LEN {
            return Err(Error::InvalidConfig(format!(
                "DUID must be 1 to {} bytes, got {}",
                MAX_DUID_LEN,
                bytes.len()
            )));
        }
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&[u8]> for Duid {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl fmt::Display for Duid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let octets: Vec<String> = self.0.iter().map(|byte| hex::encode([*byte])).collect();
        f.write_str(&octets.join(":"))
    }
}

// Field offsets inside option payloads.
mod field {
    use std::ops::{Range, RangeFrom};

    pub const IA_ID: Range<usize> = 0..4;
    pub const IA_T1: Range<usize> = 4..8;
    pub const IA_T2: Range<usize> = 8..12;
    pub const IA_NA_OPTIONS: RangeFrom<usize> = 12..;
    pub const IA_TA_OPTIONS: RangeFrom<usize> = 4..;

    pub const IAADDR_IP: Range<usize> = 0..16;
    pub const IAADDR_PREFERRED: Range<usize> = 16..20;
    pub const IAADDR_VALID: Range<usize> = 20..24;
    pub const IAADDR_OPTIONS: RangeFrom<usize> = 24..;

    pub const STATUS_CODE: Range<usize> = 0..2;
    pub const STATUS_MESSAGE: RangeFrom<usize> = 2..;

    pub const ENTERPRISE: Range<usize> = 0..4;
    pub const VENDOR_DATA: RangeFrom<usize> = 4..;
}

fn read_ipv6(data: &[u8]) -> Ipv6Addr {
    let mut octets = [0u8; 16];
    octets.copy_from_slice(&data[..16]);
    Ipv6Addr::from(octets)
}

/// Splits a `(len:u16, data)*` list as used by User Class and Vendor Class.
fn parse_class_data(mut data: &[u8]) -> Result<Vec<Vec<u8>>> {
    let mut items = Vec::new();
    while !data.is_empty() {
        if data.len() < 2 {
            return Err(Error::Malformed("Class data length missing".to_string()));
        }
        let length = NetworkEndian::read_u16(&data[..2]) as usize;
        if data.len() < 2 + length {
            return Err(Error::Malformed("Class data truncated".to_string()));
        }
        items.push(data[2..2 + length].to_vec());
        data = &data[2 + length..];
    }
    Ok(items)
}

fn encode_class_data(items: &[Vec<u8>], out: &mut Vec<u8>) {
    for item in items {
        let mut length = [0u8; 2];
        NetworkEndian::write_u16(&mut length, item.len() as u16);
        out.extend_from_slice(&length);
        out.extend_from_slice(item);
    }
}

macro_rules! raw_bytes {
    ($view:ident) => {
        impl $view {
            /// Returns the option payload (without code and length).
            pub fn as_bytes(&self) -> &[u8] {
                &self.data
            }
        }
    };
}

/// Client Identifier option (1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdOption {
    data: Vec<u8>,
}

impl ClientIdOption {
    pub fn new(duid: &Duid) -> Self {
        Self {
            data: duid.as_bytes().to_vec(),
        }
    }

    pub fn duid(&self) -> Duid {
        Duid::from(self.data.as_slice())
    }

    pub fn set_duid(&mut self, duid: &Duid) {
        self.data = duid.as_bytes().to_vec();
    }
}

/// Server Identifier option (2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerIdOption {
    data: Vec<u8>,
}

impl ServerIdOption {
    pub fn new(duid: &Duid) -> Self {
        Self {
            data: duid.as_bytes().to_vec(),
        }
    }

    pub fn duid(&self) -> Duid {
        Duid::from(self.data.as_slice())
    }

    pub fn set_duid(&mut self, duid: &Duid) {
        self.data = duid.as_bytes().to_vec();
    }
}

/// Identity Association for Non-temporary Addresses (3).
///
/// ```text
/// | IAID (4) | T1 (4) | T2 (4) | IA_NA-options ... |
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IaNaOption {
    data: Vec<u8>,
}

impl IaNaOption {
    pub const HEADER_LEN: usize = 12;

    pub fn new(ia_id: u32, t1: u32, t2: u32) -> Self {
        let mut option = Self {
            data: vec![0u8; Self::HEADER_LEN],
        };
        option.set_ia_id(ia_id);
        option.set_t1(t1);
        option.set_t2(t2);
        option
    }

    pub fn ia_id(&self) -> u32 {
        NetworkEndian::read_u32(&self.data[field::IA_ID])
    }

    pub fn set_ia_id(&mut self, value: u32) {
        NetworkEndian::write_u32(&mut self.data[field::IA_ID], value);
    }

    pub fn t1(&self) -> u32 {
        NetworkEndian::read_u32(&self.data[field::IA_T1])
    }

    pub fn set_t1(&mut self, value: u32) {
        NetworkEndian::write_u32(&mut self.data[field::IA_T1], value);
    }

    pub fn t2(&self) -> u32 {
        NetworkEndian::read_u32(&self.data[field::IA_T2])
    }

    pub fn set_t2(&mut self, value: u32) {
        NetworkEndian::write_u32(&mut self.data[field::IA_T2], value);
    }

    /// Decodes the suboptions following the 12-byte header.
    pub fn options(&self, registry: &OptionRegistry) -> Result<OptionContainer> {
        registry.decode_options(&self.data[field::IA_NA_OPTIONS])
    }

    /// Replaces the suboptions following the header.
    pub fn set_options(&mut self, options: &OptionContainer) -> Result<()> {
        let encoded = options.encode()?;
        self.data.truncate(Self::HEADER_LEN);
        self.data.extend_from_slice(&encoded);
        Ok(())
    }
}

/// Identity Association for Temporary Addresses (4).
///
/// ```text
/// | IAID (4) | IA_TA-options ... |
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IaTaOption {
    data: Vec<u8>,
}

impl IaTaOption {
    pub const HEADER_LEN: usize = 4;

    pub fn new(ia_id: u32) -> Self {
        let mut option = Self {
            data: vec![0u8; Self::HEADER_LEN],
        };
        option.set_ia_id(ia_id);
        option
    }

    pub fn ia_id(&self) -> u32 {
        NetworkEndian::read_u32(&self.data[field::IA_ID])
    }

    pub fn set_ia_id(&mut self, value: u32) {
        NetworkEndian::write_u32(&mut self.data[field::IA_ID], value);
    }

    pub fn options(&self, registry: &OptionRegistry) -> Result<OptionContainer> {
        registry.decode_options(&self.data[field::IA_TA_OPTIONS])
    }

    pub fn set_options(&mut self, options: &OptionContainer) -> Result<()> {
        let encoded = options.encode()?;
        self.data.truncate(Self::HEADER_LEN);
        self.data.extend_from_slice(&encoded);
        Ok(())
    }
}

/// IA Address option (5).
///
/// ```text
/// | IPv6 address (16) | preferred-lifetime (4) | valid-lifetime (4) | IAaddr-options ... |
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IaAddressOption {
    data: Vec<u8>,
}

impl IaAddressOption {
    pub const HEADER_LEN: usize = 24;

    pub fn new(ip: Ipv6Addr, preferred_lifetime: u32, valid_lifetime: u32) -> Self {
        let mut option = Self {
            data: vec![0u8; Self::HEADER_LEN],
        };
        option.set_ip(ip);
        option.set_preferred_lifetime(preferred_lifetime);
        option.set_valid_lifetime(valid_lifetime);
        option
    }

    pub fn ip(&self) -> Ipv6Addr {
        read_ipv6(&self.data[field::IAADDR_IP])
    }

    pub fn set_ip(&mut self, ip: Ipv6Addr) {
        self.data[field::IAADDR_IP].copy_from_slice(&ip.octets());
    }

    pub fn preferred_lifetime(&self) -> u32 {
        NetworkEndian::read_u32(&self.data[field::IAADDR_PREFERRED])
    }

    pub fn set_preferred_lifetime(&mut self, value: u32) {
        NetworkEndian::write_u32(&mut self.data[field::IAADDR_PREFERRED], value);
    }

    pub fn valid_lifetime(&self) -> u32 {
        NetworkEndian::read_u32(&self.data[field::IAADDR_VALID])
    }

    pub fn set_valid_lifetime(&mut self, value: u32) {
        NetworkEndian::write_u32(&mut self.data[field::IAADDR_VALID], value);
    }

    pub fn options(&self, registry: &OptionRegistry) -> Result<OptionContainer> {
        registry.decode_options(&self.data[field::IAADDR_OPTIONS])
    }

    pub fn set_options(&mut self, options: &OptionContainer) -> Result<()> {
        let encoded = options.encode()?;
        self.data.truncate(Self::HEADER_LEN);
        self.data.extend_from_slice(&encoded);
        Ok(())
    }
}

/// Option Request Option (6): the option codes a client wants back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionRequestOption {
    data: Vec<u8>,
}

impl OptionRequestOption {
    pub fn new(codes: &[u16]) -> Self {
        let mut data = vec![0u8; codes.len() * 2];
        NetworkEndian::write_u16_into(codes, &mut data);
        Self { data }
    }

    pub fn requested(&self) -> Vec<u16> {
        self.data
            .chunks_exact(2)
            .map(NetworkEndian::read_u16)
            .collect()
    }

    pub fn contains(&self, code: u16) -> bool {
        self.data
            .chunks_exact(2)
            .any(|chunk| NetworkEndian::read_u16(chunk) == code)
    }

    pub fn add(&mut self, code: u16) {
        let mut bytes = [0u8; 2];
        NetworkEndian::write_u16(&mut bytes, code);
        self.data.extend_from_slice(&bytes);
    }
}

/// Preference option (7).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreferenceOption {
    data: Vec<u8>,
}

impl PreferenceOption {
    pub fn new(value: u8) -> Self {
        Self { data: vec![value] }
    }

    pub fn value(&self) -> u8 {
        self.data[0]
    }

    pub fn set_value(&mut self, value: u8) {
        self.data[0] = value;
    }
}

/// Elapsed Time option (8), in hundredths of a second.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElapsedTimeOption {
    data: Vec<u8>,
}

impl ElapsedTimeOption {
    pub fn new(value: u16) -> Self {
        Self {
            data: value.to_be_bytes().to_vec(),
        }
    }

    pub fn value(&self) -> u16 {
        NetworkEndian::read_u16(&self.data)
    }

    pub fn set_value(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.data, value);
    }
}

/// Relay Message option (9): a complete encoded DHCPv6 message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayMessageOption {
    data: Vec<u8>,
}

impl RelayMessageOption {
    pub fn new(encoded: Vec<u8>) -> Self {
        Self { data: encoded }
    }

    pub fn from_message(message: &Message) -> Result<Self> {
        Ok(Self {
            data: message.encode()?,
        })
    }

    /// Decodes the embedded message.
    pub fn message(&self, registry: &OptionRegistry) -> Result<Message> {
        Message::parse(&self.data, registry)
    }
}

/// Server Unicast option (12).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerUnicastOption {
    data: Vec<u8>,
}

impl ServerUnicastOption {
    pub fn new(address: Ipv6Addr) -> Self {
        Self {
            data: address.octets().to_vec(),
        }
    }

    pub fn address(&self) -> Ipv6Addr {
        read_ipv6(&self.data)
    }

    pub fn set_address(&mut self, address: Ipv6Addr) {
        self.data.copy_from_slice(&address.octets());
    }
}

/// Status Code option (13).
///
/// ```text
/// | status-code (2) | status-message (UTF-8) ... |
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusCodeOption {
    data: Vec<u8>,
}

impl StatusCodeOption {
    pub fn new(status: StatusCode, message: &str) -> Self {
        let mut data = (status as u16).to_be_bytes().to_vec();
        data.extend_from_slice(message.as_bytes());
        Self { data }
    }

    /// Raw status code, including codes this server does not know.
    pub fn code(&self) -> u16 {
        NetworkEndian::read_u16(&self.data[field::STATUS_CODE])
    }

    pub fn status(&self) -> Option<StatusCode> {
        StatusCode::try_from(self.code()).ok()
    }

    pub fn set_status(&mut self, status: StatusCode) {
        NetworkEndian::write_u16(&mut self.data[field::STATUS_CODE], status as u16);
    }

    pub fn message(&self) -> String {
        String::from_utf8_lossy(&self.data[field::STATUS_MESSAGE]).to_string()
    }
}

/// Rapid Commit option (14). Carries no data.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RapidCommitOption {
    data: Vec<u8>,
}

impl RapidCommitOption {
    pub fn new() -> Self {
        Self::default()
    }
}

/// User Class option (15).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserClassOption {
    data: Vec<u8>,
}

impl UserClassOption {
    pub fn new(classes: &[Vec<u8>]) -> Self {
        let mut data = Vec::new();
        encode_class_data(classes, &mut data);
        Self { data }
    }

    pub fn classes(&self) -> Result<Vec<Vec<u8>>> {
        parse_class_data(&self.data)
    }
}

/// Vendor Class option (16).
///
/// ```text
/// | enterprise-number (4) | vendor-class-data ... |
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VendorClassOption {
    data: Vec<u8>,
}

impl VendorClassOption {
    pub fn new(enterprise_number: u32, classes: &[Vec<u8>]) -> Self {
        let mut data = enterprise_number.to_be_bytes().to_vec();
        encode_class_data(classes, &mut data);
        Self { data }
    }

    pub fn enterprise_number(&self) -> u32 {
        NetworkEndian::read_u32(&self.data[field::ENTERPRISE])
    }

    pub fn classes(&self) -> Result<Vec<Vec<u8>>> {
        parse_class_data(&self.data[field::VENDOR_DATA])
    }
}

/// Vendor-specific Information option (17).
///
/// Suboptions use the regular option grammar; how their codes are
/// interpreted depends on the enterprise number, see
/// [`OptionRegistry::register_vendor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VendorOptsOption {
    data: Vec<u8>,
}

impl VendorOptsOption {
    pub const HEADER_LEN: usize = 4;

    pub fn new(enterprise_number: u32) -> Self {
        Self {
            data: enterprise_number.to_be_bytes().to_vec(),
        }
    }

    pub fn enterprise_number(&self) -> u32 {
        NetworkEndian::read_u32(&self.data[field::ENTERPRISE])
    }

    pub fn set_enterprise_number(&mut self, value: u32) {
        NetworkEndian::write_u32(&mut self.data[field::ENTERPRISE], value);
    }

    pub fn options(&self, registry: &OptionRegistry) -> Result<OptionContainer> {
        registry.decode_vendor_options(self.enterprise_number(), &self.data[field::VENDOR_DATA])
    }

    pub fn set_options(&mut self, options: &OptionContainer) -> Result<()> {
        let encoded = options.encode()?;
        self.data.truncate(Self::HEADER_LEN);
        self.data.extend_from_slice(&encoded);
        Ok(())
    }
}

/// Interface-Id option (18), opaque to the server and echoed to relays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceIdOption {
    data: Vec<u8>,
}

impl InterfaceIdOption {
    pub fn new(id: &[u8]) -> Self {
        Self { data: id.to_vec() }
    }

    pub fn id(&self) -> &[u8] {
        &self.data
    }
}

/// Reconfigure Message option (19).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconfigureMessageOption {
    data: Vec<u8>,
}

impl ReconfigureMessageOption {
    pub fn new(message_type: MessageType) -> Self {
        Self {
            data: vec![message_type.code()],
        }
    }

    pub fn message_type(&self) -> MessageType {
        MessageType::from(self.data[0])
    }
}

/// Reconfigure Accept option (20). Carries no data.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconfigureAcceptOption {
    data: Vec<u8>,
}

impl ReconfigureAcceptOption {
    pub fn new() -> Self {
        Self::default()
    }
}

/// DNS Recursive Name Server option (23).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsServersOption {
    data: Vec<u8>,
}

impl DnsServersOption {
    pub fn new(servers: &[Ipv6Addr]) -> Self {
        let data = servers.iter().flat_map(|server| server.octets()).collect();
        Self { data }
    }

    pub fn servers(&self) -> Vec<Ipv6Addr> {
        self.data.chunks_exact(16).map(read_ipv6).collect()
    }
}

/// Domain Search List option (24), names in DNS wire format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainListOption {
    data: Vec<u8>,
}

impl DomainListOption {
    const MAX_LABEL_LEN: usize = 63;

    pub fn new(domains: &[String]) -> Result<Self> {
        let mut data = Vec::new();
        for domain in domains {
            for label in domain.split('.').filter(|label| !label.is_empty()) {
                if label.len() > Self::MAX_LABEL_LEN {
                    return Err(Error::InvalidConfig(format!(
                        "Domain label {:?} exceeds {} bytes",
                        label,
                        Self::MAX_LABEL_LEN
                    )));
                }
                data.push(label.len() as u8);
                data.extend_from_slice(label.as_bytes());
            }
            data.push(0);
        }
        Ok(Self { data })
    }

    pub fn domains(&self) -> Result<Vec<String>> {
        let mut domains = Vec::new();
        let mut labels: Vec<String> = Vec::new();
        let mut index = 0;

        while index < self.data.len() {
            let length = self.data[index] as usize;
            index += 1;
            if length == 0 {
                domains.push(labels.join("."));
                labels.clear();
                continue;
            }
            if length > Self::MAX_LABEL_LEN || index + length > self.data.len() {
                return Err(Error::Malformed("Domain label truncated".to_string()));
            }
            labels.push(String::from_utf8_lossy(&self.data[index..index + length]).to_string());
            index += length;
        }

        if !labels.is_empty() {
            return Err(Error::Malformed("Domain name not terminated".to_string()));
        }
        Ok(domains)
    }
}

/// An option this server does not interpret, kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnrecognizedOption {
    code: u16,
    data: Vec<u8>,
}

impl UnrecognizedOption {
    pub fn new(code: u16, data: Vec<u8>) -> Self {
        Self { code, data }
    }

    pub fn code(&self) -> u16 {
        self.code
    }
}

raw_bytes!(ClientIdOption);
raw_bytes!(ServerIdOption);
raw_bytes!(IaNaOption);
raw_bytes!(IaTaOption);
raw_bytes!(IaAddressOption);
raw_bytes!(OptionRequestOption);
raw_bytes!(PreferenceOption);
raw_bytes!(ElapsedTimeOption);
raw_bytes!(RelayMessageOption);
raw_bytes!(ServerUnicastOption);
raw_bytes!(StatusCodeOption);
raw_bytes!(RapidCommitOption);
raw_bytes!(UserClassOption);
raw_bytes!(VendorClassOption);
raw_bytes!(VendorOptsOption);
raw_bytes!(InterfaceIdOption);
raw_bytes!(ReconfigureMessageOption);
raw_bytes!(ReconfigureAcceptOption);
raw_bytes!(DnsServersOption);
raw_bytes!(DomainListOption);
raw_bytes!(UnrecognizedOption);

/// A DHCPv6 option.
///
/// Each variant wraps the typed view for one option code. Anything the
/// server cannot interpret ends up in [`Unrecognized`](Self::Unrecognized).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dhcp6Option {
    ClientId(ClientIdOption),
    ServerId(ServerIdOption),
    IaNa(IaNaOption),
    IaTa(IaTaOption),
    IaAddress(IaAddressOption),
    OptionRequest(OptionRequestOption),
    Preference(PreferenceOption),
    ElapsedTime(ElapsedTimeOption),
    RelayMessage(RelayMessageOption),
    ServerUnicast(ServerUnicastOption),
    StatusCode(StatusCodeOption),
    RapidCommit(RapidCommitOption),
    UserClass(UserClassOption),
    VendorClass(VendorClassOption),
    VendorOpts(VendorOptsOption),
    InterfaceId(InterfaceIdOption),
    ReconfigureMessage(ReconfigureMessageOption),
    ReconfigureAccept(ReconfigureAcceptOption),
    DnsServers(DnsServersOption),
    DomainList(DomainListOption),
    Unrecognized(UnrecognizedOption),
}

impl Dhcp6Option {
    /// Builds the typed view for `code`.
    ///
    /// Payloads too short (or of the wrong fixed size) for their code are
    /// kept as [`Unrecognized`](Self::Unrecognized) rather than rejected.
    pub fn parse(code: u16, data: &[u8]) -> Self {
        let owned = data.to_vec();
        let len = data.len();
        match OptionCode::try_from(code) {
            Ok(OptionCode::ClientId) if len > 0 => Self::ClientId(ClientIdOption { data: owned }),
            Ok(OptionCode::ServerId) if len > 0 => Self::ServerId(ServerIdOption { data: owned }),
            Ok(OptionCode::IaNa) if len >= IaNaOption::HEADER_LEN => {
                Self::IaNa(IaNaOption { data: owned })
            }
            Ok(OptionCode::IaTa) if len >= IaTaOption::HEADER_LEN => {
                Self::IaTa(IaTaOption { data: owned })
            }
            Ok(OptionCode::IaAddress) if len >= IaAddressOption::HEADER_LEN => {
                Self::IaAddress(IaAddressOption { data: owned })
            }
            Ok(OptionCode::OptionRequest) if len % 2 == 0 => {
                Self::OptionRequest(OptionRequestOption { data: owned })
            }
            Ok(OptionCode::Preference) if len == 1 => {
                Self::Preference(PreferenceOption { data: owned })
            }
            Ok(OptionCode::ElapsedTime) if len == 2 => {
                Self::ElapsedTime(ElapsedTimeOption { data: owned })
            }
            Ok(OptionCode::RelayMessage) => Self::RelayMessage(RelayMessageOption { data: owned }),
            Ok(OptionCode::ServerUnicast) if len == 16 => {
                Self::ServerUnicast(ServerUnicastOption { data: owned })
            }
            Ok(OptionCode::StatusCode) if len >= 2 => {
                Self::StatusCode(StatusCodeOption { data: owned })
            }
            Ok(OptionCode::RapidCommit) if len == 0 => {
                Self::RapidCommit(RapidCommitOption { data: owned })
            }
            Ok(OptionCode::UserClass) => Self::UserClass(UserClassOption { data: owned }),
            Ok(OptionCode::VendorClass) if len >= 4 => {
                Self::VendorClass(VendorClassOption { data: owned })
            }
            Ok(OptionCode::VendorOpts) if len >= VendorOptsOption::HEADER_LEN => {
                Self::VendorOpts(VendorOptsOption { data: owned })
            }
            Ok(OptionCode::InterfaceId) => Self::InterfaceId(InterfaceIdOption { data: owned }),
            Ok(OptionCode::ReconfigureMessage) if len == 1 => {
                Self::ReconfigureMessage(ReconfigureMessageOption { data: owned })
            }
            Ok(OptionCode::ReconfigureAccept) if len == 0 => {
                Self::ReconfigureAccept(ReconfigureAcceptOption { data: owned })
            }
            Ok(OptionCode::DnsServers) if len % 16 == 0 => {
                Self::DnsServers(DnsServersOption { data: owned })
            }
            Ok(OptionCode::DomainList) => Self::DomainList(DomainListOption { data: owned }),
            _ => Self::Unrecognized(UnrecognizedOption { code, data: owned }),
        }
    }

    /// Returns the option code.
    pub fn code(&self) -> u16 {
        match self {
            Self::ClientId(_) => OptionCode::ClientId as u16,
            Self::ServerId(_) => OptionCode::ServerId as u16,
            Self::IaNa(_) => OptionCode::IaNa as u16,
            Self::IaTa(_) => OptionCode::IaTa as u16,
            Self::IaAddress(_) => OptionCode::IaAddress as u16,
            Self::OptionRequest(_) => OptionCode::OptionRequest as u16,
            Self::Preference(_) => OptionCode::Preference as u16,
            Self::ElapsedTime(_) => OptionCode::ElapsedTime as u16,
            Self::RelayMessage(_) => OptionCode::RelayMessage as u16,
            Self::ServerUnicast(_) => OptionCode::ServerUnicast as u16,
            Self::StatusCode(_) => OptionCode::StatusCode as u16,
            Self::RapidCommit(_) => OptionCode::RapidCommit as u16,
            Self::UserClass(_) => OptionCode::UserClass as u16,
            Self::VendorClass(_) => OptionCode::VendorClass as u16,
            Self::VendorOpts(_) => OptionCode::VendorOpts as u16,
            Self::InterfaceId(_) => OptionCode::InterfaceId as u16,
            Self::ReconfigureMessage(_) => OptionCode::ReconfigureMessage as u16,
            Self::ReconfigureAccept(_) => OptionCode::ReconfigureAccept as u16,
            Self::DnsServers(_) => OptionCode::DnsServers as u16,
            Self::DomainList(_) => OptionCode::DomainList as u16,
            Self::Unrecognized(option) => option.code,
        }
    }

    /// Returns the option payload.
    pub fn data(&self) -> &[u8] {
        match self {
            Self::ClientId(option) => option.as_bytes(),
            Self::ServerId(option) => option.as_bytes(),
            Self::IaNa(option) => option.as_bytes(),
            Self::IaTa(option) => option.as_bytes(),
            Self::IaAddress(option) => option.as_bytes(),
            Self::OptionRequest(option) => option.as_bytes(),
            Self::Preference(option) => option.as_bytes(),
            Self::ElapsedTime(option) => option.as_bytes(),
            Self::RelayMessage(option) => option.as_bytes(),
            Self::ServerUnicast(option) => option.as_bytes(),
            Self::StatusCode(option) => option.as_bytes(),
            Self::RapidCommit(option) => option.as_bytes(),
            Self::UserClass(option) => option.as_bytes(),
            Self::VendorClass(option) => option.as_bytes(),
            Self::VendorOpts(option) => option.as_bytes(),
            Self::InterfaceId(option) => option.as_bytes(),
            Self::ReconfigureMessage(option) => option.as_bytes(),
            Self::ReconfigureAccept(option) => option.as_bytes(),
            Self::DnsServers(option) => option.as_bytes(),
            Self::DomainList(option) => option.as_bytes(),
            Self::Unrecognized(option) => option.as_bytes(),
        }
    }

    /// Appends the wire form (code, length, data) to `out`.
    pub fn encode_into(&self, out: &mut Vec<u8>) -> Result<()> {
        let data = self.data();
        let length = u16::try_from(data.len()).map_err(|_| {
            Error::Malformed(format!(
                "Option {} payload of {} bytes exceeds 65535",
                self.code(),
                data.len()
            ))
        })?;

        let mut header = [0u8; 4];
        NetworkEndian::write_u16(&mut header[0..2], self.code());
        NetworkEndian::write_u16(&mut header[2..4], length);
        out.extend_from_slice(&header);
        out.extend_from_slice(data);
        Ok(())
    }
}

/// Ties a typed option view to its [`Dhcp6Option`] variant.
///
/// Used by the typed accessors of [`OptionContainer`], e.g.
/// `options.get::<ClientIdOption>()`.
pub trait OptionKind: Sized + 'static {
    const CODE: OptionCode;

    /// Whether a message may carry at most one instance of this option.
    const SINGLETON: bool;

    fn from_option(option: &Dhcp6Option) -> Option<&Self>;

    fn from_option_mut(option: &mut Dhcp6Option) -> Option<&mut Self>;

    fn into_option(self) -> Dhcp6Option;
}

macro_rules! option_kind {
    ($view:ident, $variant:ident, $singleton:expr) => {
        impl OptionKind for $view {
            const CODE: OptionCode = OptionCode::$variant;
            const SINGLETON: bool = $singleton;

            fn from_option(option: &Dhcp6Option) -> Option<&Self> {
                match option {
                    Dhcp6Option::$variant(view) => Some(view),
                    _ => None,
                }
            }

            fn from_option_mut(option: &mut Dhcp6Option) -> Option<&mut Self> {
                match option {
                    Dhcp6Option::$variant(view) => Some(view),
                    _ => None,
                }
            }

            fn into_option(self) -> Dhcp6Option {
                Dhcp6Option::$variant(self)
            }
        }

        impl From<$view> for Dhcp6Option {
            fn from(view: $view) -> Self {
                Dhcp6Option::$variant(view)
            }
        }
    };
}

option_kind!(ClientIdOption, ClientId, true);
option_kind!(ServerIdOption, ServerId, true);
option_kind!(IaNaOption, IaNa, false);
option_kind!(IaTaOption, IaTa, false);
option_kind!(IaAddressOption, IaAddress, false);
option_kind!(OptionRequestOption, OptionRequest, true);
option_kind!(PreferenceOption, Preference, true);
option_kind!(ElapsedTimeOption, ElapsedTime, true);
option_kind!(RelayMessageOption, RelayMessage, true);
option_kind!(ServerUnicastOption, ServerUnicast, true);
option_kind!(StatusCodeOption, StatusCode, true);
option_kind!(RapidCommitOption, RapidCommit, true);
option_kind!(UserClassOption, UserClass, true);
option_kind!(VendorClassOption, VendorClass, false);
option_kind!(VendorOptsOption, VendorOpts, false);
option_kind!(InterfaceIdOption, InterfaceId, true);
option_kind!(ReconfigureMessageOption, ReconfigureMessage, true);
option_kind!(ReconfigureAcceptOption, ReconfigureAccept, true);
option_kind!(DnsServersOption, DnsServers, true);
option_kind!(DomainListOption, DomainList, true);

impl From<UnrecognizedOption> for Dhcp6Option {
    fn from(option: UnrecognizedOption) -> Self {
        Dhcp6Option::Unrecognized(option)
    }
}

/// An ordered collection of options where a code may repeat.
///
/// Insertion order is preserved and is the order options are encoded in.
/// Repeated codes are kept as independent entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptionContainer {
    options: Vec<Dhcp6Option>,
}

impl OptionContainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.options.len()
    }

    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Dhcp6Option> {
        self.options.iter()
    }

    /// Appends an option after all existing ones.
    pub fn add(&mut self, option: impl Into<Dhcp6Option>) {
        self.options.push(option.into());
    }

    /// Replaces every instance of `T` with `value`.
    pub fn set<T: OptionKind>(&mut self, value: T) {
        self.remove::<T>();
        self.options.push(value.into_option());
    }

    /// Appends every option from `other`, preserving its order.
    pub fn extend(&mut self, other: OptionContainer) {
        self.options.extend(other.options);
    }

    pub fn contains<T: OptionKind>(&self) -> bool {
        self.options.iter().any(|option| T::from_option(option).is_some())
    }

    pub fn contains_code(&self, code: u16) -> bool {
        self.options.iter().any(|option| option.code() == code)
    }

    /// Returns the single instance of a singleton option, or the first
    /// instance of a repeatable one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateOption`] if `T` is a singleton and the
    /// container holds more than one instance.
    pub fn get<T: OptionKind>(&self) -> Result<Option<&T>> {
        let mut matches = self.options.iter().filter_map(T::from_option);
        let first = matches.next();
        if T::SINGLETON && matches.next().is_some() {
            return Err(Error::DuplicateOption(T::CODE as u16));
        }
        Ok(first)
    }

    pub fn get_mut<T: OptionKind>(&mut self) -> Result<Option<&mut T>> {
        if T::SINGLETON && self.count::<T>() > 1 {
            return Err(Error::DuplicateOption(T::CODE as u16));
        }
        Ok(self.options.iter_mut().find_map(T::from_option_mut))
    }

    pub fn get_all<T: OptionKind>(&self) -> impl Iterator<Item = &T> {
        self.options.iter().filter_map(T::from_option)
    }

    pub fn get_all_mut<T: OptionKind>(&mut self) -> impl Iterator<Item = &mut T> {
        self.options.iter_mut().filter_map(T::from_option_mut)
    }

    pub fn count<T: OptionKind>(&self) -> usize {
        self.get_all::<T>().count()
    }

    /// Removes every instance of `T`, returning how many were removed.
    pub fn remove<T: OptionKind>(&mut self) -> usize {
        let before = self.options.len();
        self.options.retain(|option| T::from_option(option).is_none());
        before - self.options.len()
    }

    pub fn retain(&mut self, keep: impl FnMut(&Dhcp6Option) -> bool) {
        self.options.retain(keep);
    }

    /// Encodes all options in order.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.encode_into(&mut out)?;
        Ok(out)
    }

    pub fn encode_into(&self, out: &mut Vec<u8>) -> Result<()> {
        for option in &self.options {
            option.encode_into(out)?;
        }
        Ok(())
    }
}

impl FromIterator<Dhcp6Option> for OptionContainer {
    fn from_iter<I: IntoIterator<Item = Dhcp6Option>>(iter: I) -> Self {
        Self {
            options: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for OptionContainer {
    type Item = Dhcp6Option;
    type IntoIter = std::vec::IntoIter<Dhcp6Option>;

    fn into_iter(self) -> Self::IntoIter {
        self.options.into_iter()
    }
}
