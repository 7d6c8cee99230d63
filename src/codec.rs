//! TLV option stream codec and the option registry.
//!
//! Every option stream in DHCPv6 (top-level message options, IA suboptions,
//! vendor suboptions) uses the same grammar:
//!
//! ```text
//! | option-code (2) | option-len (2) | option-data (option-len) | ...
//! ```
//!
//! The [`OptionRegistry`] decodes such streams into an [`OptionContainer`].
//! It is an explicit value passed to whoever decodes, so vendor decoders can
//! be registered per server instance instead of in a process-wide table.

use std::collections::HashMap;
use std::fmt;

use byteorder::{ByteOrder, NetworkEndian};

use crate::error::{Error, Result};
use crate::options::{Dhcp6Option, OptionContainer, UnrecognizedOption};

/// Size of an option header (code + length).
pub const OPTION_HEADER_LEN: usize = 4;

/// Decodes the suboptions of a Vendor-specific Information option.
///
/// The meaning of vendor suboption codes is private to the enterprise that
/// owns the enterprise number, so decoders are registered per number with
/// [`OptionRegistry::register_vendor`].
pub trait VendorDecoder: Send + Sync {
    fn decode(&self, registry: &OptionRegistry, data: &[u8]) -> Result<OptionContainer>;
}

/// Keeps every vendor suboption as [`Dhcp6Option::Unrecognized`].
///
/// Used for enterprise numbers without a registered decoder.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpaqueVendorDecoder;

impl VendorDecoder for OpaqueVendorDecoder {
    fn decode(&self, _registry: &OptionRegistry, data: &[u8]) -> Result<OptionContainer> {
        walk_options(data, |code, value| {
            Dhcp6Option::Unrecognized(UnrecognizedOption::new(code, value.to_vec()))
        })
    }
}

/// Interprets vendor suboptions with the standard DHCPv6 option codes.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardVendorDecoder;

impl VendorDecoder for StandardVendorDecoder {
    fn decode(&self, registry: &OptionRegistry, data: &[u8]) -> Result<OptionContainer> {
        registry.decode_options(data)
    }
}

/// Maps option streams to typed options.
pub struct OptionRegistry {
    vendors: HashMap<u32, Box<dyn VendorDecoder>>,
    fallback: Box<dyn VendorDecoder>,
}

impl OptionRegistry {
    /// Creates a registry with no vendor decoders registered.
    pub fn new() -> Self {
        Self {
            vendors: HashMap::new(),
            fallback: Box::new(OpaqueVendorDecoder),
        }
    }

    /// Registers the decoder used for Vendor-specific Information options
    /// carrying `enterprise_number`. Replaces any previous registration.
    pub fn register_vendor(&mut self, enterprise_number: u32, decoder: impl VendorDecoder + 'static) {
        self.vendors.insert(enterprise_number, Box::new(decoder));
    }

    pub fn has_vendor(&self, enterprise_number: u32) -> bool {
        self.vendors.contains_key(&enterprise_number)
    }

    /// Decodes an option stream.
    ///
    /// Unknown codes and known codes with an unexpected payload size are kept
    /// as [`Dhcp6Option::Unrecognized`]. Repeated codes stay separate entries.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Malformed`] if the stream ends inside an option
    /// header or before the declared option length.
    pub fn decode_options(&self, bytes: &[u8]) -> Result<OptionContainer> {
        walk_options(bytes, Dhcp6Option::parse)
    }

    /// Decodes vendor suboptions with the decoder registered for
    /// `enterprise_number`, falling back to [`OpaqueVendorDecoder`].
    pub fn decode_vendor_options(&self, enterprise_number: u32, bytes: &[u8]) -> Result<OptionContainer> {
        match self.vendors.get(&enterprise_number) {
            Some(decoder) => decoder.decode(self, bytes),
            None => self.fallback.decode(self, bytes),
        }
    }
}

impl Default for OptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for OptionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut enterprises: Vec<_> = self.vendors.keys().collect();
        enterprises.sort();
        f.debug_struct("OptionRegistry")
            .field("vendors", &enterprises)
            .finish()
    }
}

/// Encodes `options` in order onto `out`.
pub fn encode_options(options: &OptionContainer, out: &mut Vec<u8>) -> Result<()> {
    options.encode_into(out)
}

fn walk_options(
    mut bytes: &[u8],
    mut build: impl FnMut(u16, &[u8]) -> Dhcp6Option,
) -> Result<OptionContainer> {
    let mut options = OptionContainer::new();

    while !bytes.is_empty() {
        if bytes.len() < OPTION_HEADER_LEN {
            return Err(Error::Malformed(format!(
                "Option header truncated: {} bytes left",
                bytes.len()
            )));
        }

        let code = NetworkEndian::read_u16(&bytes[0..2]);
        let length = NetworkEndian::read_u16(&bytes[2..4]) as usize;
        let end = OPTION_HEADER_LEN + length;

        if bytes.len() < end {
            return Err(Error::Malformed(format!(
                "Option {} declares {} bytes, only {} available",
                code,
                length,
                bytes.len() - OPTION_HEADER_LEN
            )));
        }

        options.add(build(code, &bytes[OPTION_HEADER_LEN..end]));
        bytes = &bytes[end..];
    }

    Ok(options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::{
        ElapsedTimeOption, IaNaOption, OptionCode, PreferenceOption, StatusCode, StatusCodeOption,
        VendorOptsOption,
    };

    #[test]
    fn test_decode_empty() {
        let registry = OptionRegistry::new();
        assert!(registry.decode_options(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_decode_known_and_unknown() {
        let registry = OptionRegistry::new();
        let bytes = [
            0x00, 0x08, 0x00, 0x02, 0x00, 0x2a, // elapsed time 42
            0x00, 0xfa, 0x00, 0x01, 0x07, // unknown code 250
        ];

        let options = registry.decode_options(&bytes).unwrap();
        assert_eq!(options.len(), 2);
        assert_eq!(options.get::<ElapsedTimeOption>().unwrap().unwrap().value(), 42);

        let unknown: Vec<_> = options.iter().filter(|o| o.code() == 250).collect();
        assert_eq!(unknown.len(), 1);
        assert_eq!(unknown[0].data(), &[0x07]);
    }

    #[test]
    fn test_truncated_header_is_malformed() {
        let registry = OptionRegistry::new();
        assert!(matches!(
            registry.decode_options(&[0x00, 0x08, 0x00]),
            Err(Error::Malformed(_))
        ));
    }

    #[test]
    fn test_truncated_value_is_malformed() {
        let registry = OptionRegistry::new();
        assert!(matches!(
            registry.decode_options(&[0x00, 0x01, 0x00, 0x05, 0xaa, 0xbb]),
            Err(Error::Malformed(_))
        ));
    }

    #[test]
    fn test_repeated_codes_are_not_merged() {
        let registry = OptionRegistry::new();
        let mut options = OptionContainer::new();
        options.add(IaNaOption::new(1, 0, 0));
        options.add(IaNaOption::new(2, 0, 0));

        let bytes = options.encode().unwrap();
        let decoded = registry.decode_options(&bytes).unwrap();
        assert_eq!(decoded.count::<IaNaOption>(), 2);
        assert_eq!(decoded, options);
    }

    #[test]
    fn test_encode_options_appends() {
        let mut options = OptionContainer::new();
        options.add(PreferenceOption::new(255));

        let mut out = vec![0xff];
        encode_options(&options, &mut out).unwrap();
        assert_eq!(out, vec![0xff, 0x00, 0x07, 0x00, 0x01, 0xff]);
    }

    #[test]
    fn test_vendor_decoders() {
        let mut inner = OptionContainer::new();
        inner.add(StatusCodeOption::new(StatusCode::Success, ""));

        let mut vendor = VendorOptsOption::new(4491);
        vendor.set_options(&inner).unwrap();

        let mut registry = OptionRegistry::new();
        let opaque = vendor.options(&registry).unwrap();
        assert_eq!(opaque.len(), 1);
        assert!(!opaque.contains::<StatusCodeOption>());
        assert!(opaque.contains_code(OptionCode::StatusCode as u16));

        registry.register_vendor(4491, StandardVendorDecoder);
        assert!(registry.has_vendor(4491));
        let standard = vendor.options(&registry).unwrap();
        assert!(standard.contains::<StatusCodeOption>());
    }
}
