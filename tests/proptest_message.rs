use proptest::prelude::*;

use dhcp6lease::options::{IaAddressOption, IaNaOption};
use dhcp6lease::{Message, MessageType, OptionContainer, OptionRegistry};

fn client_header(message_type: u8, xid: u32) -> Vec<u8> {
    let mut message = vec![message_type];
    message.extend_from_slice(&xid.to_be_bytes()[1..]);
    message
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(10000))]

    #[test]
    fn parse_never_panics_on_arbitrary_bytes(data: Vec<u8>) {
        let registry = OptionRegistry::new();
        let _ = Message::parse(&data, &registry);
    }

    #[test]
    fn parse_never_panics_on_valid_header_with_random_options(
        message_type in 1u8..=13,
        options_data in prop::collection::vec(any::<u8>(), 0..512)
    ) {
        let registry = OptionRegistry::new();
        let mut message = if message_type >= 12 {
            vec![message_type; 34]
        } else {
            client_header(message_type, 0x123456)
        };
        message.extend_from_slice(&options_data);
        let _ = Message::parse(&message, &registry);
    }

    #[test]
    fn parse_never_panics_on_random_option_lengths(
        option_code in any::<u16>(),
        option_length in any::<u16>(),
        option_data in prop::collection::vec(any::<u8>(), 0..256)
    ) {
        let registry = OptionRegistry::new();
        let mut message = client_header(1, 1);
        message.extend_from_slice(&option_code.to_be_bytes());
        message.extend_from_slice(&option_length.to_be_bytes());
        let actual_len = (option_length as usize).min(option_data.len());
        message.extend_from_slice(&option_data[..actual_len]);

        let parsed = Message::parse(&message, &registry);
        if actual_len < option_length as usize {
            prop_assert!(parsed.is_err());
        } else {
            prop_assert!(parsed.is_ok());
        }
    }

    #[test]
    fn suboption_decoding_never_panics(
        ia_id in any::<u32>(),
        suboptions in prop::collection::vec(any::<u8>(), 0..256)
    ) {
        let registry = OptionRegistry::new();
        let mut message = client_header(3, 7);
        message.extend_from_slice(&3u16.to_be_bytes());
        message.extend_from_slice(&((12 + suboptions.len()) as u16).to_be_bytes());
        message.extend_from_slice(&ia_id.to_be_bytes());
        message.extend_from_slice(&[0u8; 8]);
        message.extend_from_slice(&suboptions);

        let parsed = Message::parse(&message, &registry).unwrap();
        let ia = parsed.options.get::<IaNaOption>().unwrap().unwrap();
        prop_assert_eq!(ia.ia_id(), ia_id);
        let _ = ia.options(&registry);
    }

    #[test]
    fn decoded_messages_reencode_identically(
        message_type in 1u8..=11,
        xid in 0u32..0x0100_0000,
        addresses in prop::collection::vec(any::<[u8; 16]>(), 0..4),
    ) {
        let registry = OptionRegistry::new();
        let mut message = Message::new(MessageType::from(message_type), xid);
        let mut ia = IaNaOption::new(1, 10, 20);
        let mut inner = OptionContainer::new();
        for octets in &addresses {
            inner.add(IaAddressOption::new((*octets).into(), 30, 40));
        }
        ia.set_options(&inner).unwrap();
        message.options.add(ia);

        let encoded = message.encode().unwrap();
        let parsed = Message::parse(&encoded, &registry).unwrap();
        prop_assert_eq!(&parsed, &message);
        prop_assert_eq!(parsed.encode().unwrap(), encoded);
    }
}
