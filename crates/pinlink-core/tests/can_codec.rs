//! CAN text codec properties

use pinlink_core::protocol::{CanDataPacket, CanMessage};
use pretty_assertions::assert_eq;

fn sample_messages() -> Vec<CanMessage> {
    let payloads = [
        [0u8; 8],
        [0xff; 8],
        [1, 2, 3, 4, 5, 6, 7, 8],
        [0x0a, 0, 0, 0, 0, 0, 0, 0x80],
    ];
    let ids = [0u32, 0x1, 0xf, 0x7e0, 0x7ff, 0xfff];
    let mut out = Vec::new();
    for id in ids {
        for p in payloads {
            out.push(CanMessage::new(id, CanDataPacket::new(p)));
        }
    }
    out
}

#[test]
fn test_round_trip() {
    for msg in sample_messages() {
        let decoded = CanMessage::decode(&msg.encode());
        assert_eq!(decoded.id, msg.id, "id of {}", msg);
        assert_eq!(decoded.data, msg.data, "payload of {}", msg);
    }
}

#[test]
fn test_fixed_width_fields() {
    for msg in sample_messages() {
        let text = msg.encode();
        let fields: Vec<&str> = text.split(':').collect();
        assert_eq!(fields.len(), 9);
        assert_eq!(fields[0].len(), 2 + 3, "id field {:?}", fields[0]);
        for f in &fields[1..] {
            assert_eq!(f.len(), 2 + 2, "byte field {:?}", f);
            assert!(f.starts_with("0x"));
        }
    }
}

#[test]
fn test_small_ids_are_zero_padded() {
    let zero = CanMessage::new(0, CanDataPacket::new([0xff; 8]));
    let f = CanMessage::new(0xf, CanDataPacket::default());
    let fff = CanMessage::new(0xfff, CanDataPacket::default());
    assert!(zero.encode().starts_with("0x000:0xff:"));
    assert!(f.encode().starts_with("0x00f:0x00:"));
    assert!(fff.encode().starts_with("0xfff:"));
}

#[test]
fn test_combine_is_commutative_and_idempotent() {
    let packets = [
        CanDataPacket::new([0x0f, 0, 0xaa, 1, 2, 3, 4, 5]),
        CanDataPacket::new([0xf0, 0xff, 0x55, 0, 0, 0, 0, 0x80]),
        CanDataPacket::default(),
    ];
    for a in &packets {
        assert_eq!(CanDataPacket::combine(a, a), *a);
        for b in &packets {
            assert_eq!(CanDataPacket::combine(a, b), CanDataPacket::combine(b, a));
            assert_eq!(*a | *b, CanDataPacket::combine(a, b));
        }
    }
    assert_eq!(
        CanDataPacket::combine(&packets[0], &packets[1]),
        CanDataPacket::new([0xff, 0xff, 0xff, 1, 2, 3, 4, 0x85])
    );
}

#[test]
fn test_short_input_decodes_to_sentinel() {
    for text in ["", "0x001", "0x001:0x02:0x03", "0x001:0:0:0:0:0:0:0"] {
        let msg = CanMessage::decode(text);
        assert!(msg.is_empty(), "{:?}", text);
        assert_eq!(msg, CanMessage::empty());
        assert_eq!(msg.encode(), "");
        assert_eq!(msg.to_string(), "");
    }
}

#[test]
fn test_too_many_fields_decodes_to_sentinel() {
    assert!(CanMessage::decode("0x001:0:0:0:0:0:0:0:0:0").is_empty());
}

#[test]
fn test_zero_id_with_data_is_not_sentinel() {
    let msg = CanMessage::decode("0x000:0x00:0x00:0x00:0x00:0x00:0x00:0x00:0x00");
    assert!(!msg.is_empty());
    assert_eq!(msg.length, 8);
}
