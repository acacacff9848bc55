// Codec vectors: exact wire bytes for both tag schemes, and payloads as a
// radio would hand them over (zero padded, truncated, repeated records).

use hopmesh_core::advert::{
    decode_distance, decode_field, decode_hop_count, decode_manufacturer, decode_message_id,
    decode_name, decode_sender, decode_services,
};
use hopmesh_core::{AdvError, AdvertisementPacket, ManufacturerId, Name, ServiceUuid, TagScheme};

/// {target 0x0102, name 0x1234, hop 4, distance 7.94, sender 0x5678, id 4321}
const SCENARIO_V2: [u8; 25] = [
    0x03, 0xFF, 0x02, 0x01, // manufacturer, little-endian
    0x03, 0x08, 0x12, 0x34, // integer name
    0x02, 0x15, 0x04, // hop count
    0x05, 0x16, 0x7B, 0x14, 0xFE, 0x40, // distance, f32 little-endian
    0x03, 0x17, 0x56, 0x78, // sender
    0x03, 0x18, 0x10, 0xE1, // message id
];

fn scenario() -> AdvertisementPacket {
    AdvertisementPacket::new()
        .with_manufacturer(ManufacturerId(0x0102))
        .with_name(Name::Id(0x1234))
        .with_hop_count(4)
        .with_distance(7.94)
        .with_sender(0x5678)
        .with_message_id(4321)
}

#[test]
fn test_scenario_encodes_to_known_bytes() {
    assert_eq!(scenario().encode(TagScheme::V2).unwrap(), SCENARIO_V2.to_vec());
}

#[test]
fn test_scenario_decodes_from_known_bytes() {
    let decoded = AdvertisementPacket::decode(&SCENARIO_V2, TagScheme::V2);
    assert!(decoded.issues.is_empty());
    assert!(decoded.is_relayable());
    assert_eq!(decoded.packet, scenario());

    assert_eq!(decode_name(&SCENARIO_V2, TagScheme::V2), Ok(Some(Name::Id(0x1234))));
    assert_eq!(decode_hop_count(&SCENARIO_V2, TagScheme::V2), Ok(Some(4)));
    assert_eq!(decode_distance(&SCENARIO_V2, TagScheme::V2), Ok(Some(7.94)));
    assert_eq!(decode_sender(&SCENARIO_V2, TagScheme::V2), Ok(Some(0x5678)));
    assert_eq!(decode_message_id(&SCENARIO_V2, TagScheme::V2), Ok(Some(4321)));
    assert_eq!(
        decode_manufacturer(&SCENARIO_V2, TagScheme::V2),
        Ok(Some(ManufacturerId(0x0102)))
    );
}

/// First generation firmware: every integer packed into one byte
const FIRST_GENERATION: [u8; 13] = [
    0x03, 0xFF, 0x02, 0x01, // manufacturer
    0x02, 0x09, 0x03, // hop count
    0x02, 0x08, 0x07, // sender
    0x02, 0x04, 0x2A, // message id
];

#[test]
fn test_first_generation_payload_decodes() {
    let decoded = AdvertisementPacket::decode(&FIRST_GENERATION, TagScheme::Legacy);
    assert!(decoded.issues.is_empty());
    assert!(decoded.is_relayable());
    assert_eq!(decoded.packet.manufacturer, Some(ManufacturerId(0x0102)));
    assert_eq!(decoded.packet.hop_count, Some(3));
    assert_eq!(decoded.packet.sender, Some(7));
    assert_eq!(decoded.packet.message_id, Some(42));

    assert_eq!(decode_message_id(&FIRST_GENERATION, TagScheme::Legacy), Ok(Some(42)));
    assert_eq!(decode_sender(&FIRST_GENERATION, TagScheme::Legacy), Ok(Some(7)));
}

#[test]
fn test_legacy_scheme_vector() {
    let packet = AdvertisementPacket::new()
        .with_manufacturer(ManufacturerId(0x0102))
        .with_name(Name::Id(0x12))
        .with_hop_count(2)
        .with_sender(0x01)
        .with_message_id(99);

    let expected = vec![
        0x03, 0xFF, 0x02, 0x01, //
        0x02, 0x02, 0x12, //
        0x02, 0x09, 0x02, //
        0x02, 0x08, 0x01, //
        0x02, 0x04, 0x63,
    ];
    assert_eq!(packet.encode(TagScheme::Legacy).unwrap(), expected);
    assert_eq!(AdvertisementPacket::decode(&expected, TagScheme::Legacy).packet, packet);
}

#[test]
fn test_schemes_do_not_cross_decode() {
    let legacy = AdvertisementPacket::new()
        .with_hop_count(3)
        .with_message_id(99)
        .encode(TagScheme::Legacy)
        .unwrap();

    // under V2 neither tag 0x09 nor 0x04 means hop count or message id
    let decoded = AdvertisementPacket::decode(&legacy, TagScheme::V2);
    assert_eq!(decoded.packet.hop_count, None);
    assert_eq!(decoded.packet.message_id, None);
}

#[test]
fn test_legacy_text_name_shares_tag() {
    let payload = [0x06, 0x02, b'r', b'e', b'l', b'a', b'y'];
    assert_eq!(
        decode_name(&payload, TagScheme::Legacy),
        Ok(Some(Name::Text("relay".to_string())))
    );

    // a one byte value is an integer name, so one character text cannot be sent
    let one_char = AdvertisementPacket::new().with_name(Name::Text("a".to_string()));
    assert!(matches!(
        one_char.encode(TagScheme::Legacy),
        Err(AdvError::UnsupportedField(..))
    ));
    assert!(one_char.encode(TagScheme::V2).is_ok());

    let two_chars = AdvertisementPacket::new().with_name(Name::Text("ab".to_string()));
    let payload = two_chars.encode(TagScheme::Legacy).unwrap();
    assert_eq!(
        decode_name(&payload, TagScheme::Legacy),
        Ok(Some(Name::Text("ab".to_string())))
    );
}

#[test]
fn test_zero_padded_radio_buffer() {
    let mut payload = SCENARIO_V2.to_vec();
    payload.resize(31, 0x00);

    let decoded = AdvertisementPacket::decode(&payload, TagScheme::V2);
    assert!(decoded.is_relayable());
    assert_eq!(decoded.packet, scenario());
}

#[test]
fn test_record_hidden_behind_padding_is_malformed() {
    let mut payload = SCENARIO_V2[..11].to_vec();
    payload.push(0x00);
    payload.extend_from_slice(&SCENARIO_V2[21..]);

    let decoded = AdvertisementPacket::decode(&payload, TagScheme::V2);
    assert!(!decoded.is_relayable());
    assert_eq!(decoded.packet.hop_count, Some(4));
    assert_eq!(decoded.packet.message_id, None);
    assert_eq!(decoded.issues.last(), Some(&AdvError::DataAfterPadding { offset: 12 }));
}

#[test]
fn test_truncated_vector_keeps_leading_fields() {
    let payload = &SCENARIO_V2[..SCENARIO_V2.len() - 2];
    let decoded = AdvertisementPacket::decode(payload, TagScheme::V2);

    assert!(!decoded.is_relayable());
    assert_eq!(decoded.packet.sender, Some(0x5678));
    assert_eq!(decoded.packet.message_id, None);
    assert!(matches!(
        decoded.issues.last(),
        Some(AdvError::MalformedPayload { offset: 21, length: 3, available: 1 })
    ));
}

#[test]
fn test_services_vector() {
    let payload = [
        0x03, 0x03, 0x0F, 0x18, // uuid16 0x180F
        0x03, 0x03, 0x0A, 0x18, // uuid16 0x180A
        0x05, 0x05, 0x78, 0x56, 0x34, 0x12, // uuid32 0x12345678
    ];

    assert_eq!(
        decode_services(&payload, TagScheme::V2),
        Ok(vec![
            ServiceUuid::Short(0x180F),
            ServiceUuid::Short(0x180A),
            ServiceUuid::Medium(0x1234_5678),
        ])
    );
    assert_eq!(decode_field(&payload, 0x03).records.len(), 2);

    let encoded = AdvertisementPacket::new()
        .with_service(ServiceUuid::Medium(0x1234_5678))
        .with_service(ServiceUuid::Short(0x180F))
        .with_service(ServiceUuid::Short(0x180A))
        .encode(TagScheme::V2)
        .unwrap();
    // grouped by width on the way out
    assert_eq!(encoded, payload.to_vec());
}

#[test]
fn test_width_mismatch_vector() {
    // hop count record carrying two bytes
    let payload = [0x03, 0x15, 0x00, 0x04, 0x03, 0x18, 0x00, 0x63];
    assert_eq!(
        decode_hop_count(&payload, TagScheme::V2),
        Err(AdvError::UnexpectedFieldWidth {
            field: hopmesh_core::FieldKind::HopCount,
            expected: 1,
            actual: 2,
        })
    );

    let decoded = AdvertisementPacket::decode(&payload, TagScheme::V2);
    assert_eq!(decoded.packet.hop_count, None);
    assert_eq!(decoded.packet.message_id, Some(99));
    assert!(decoded.is_relayable());
}

#[test]
fn test_zero_values_are_encoded() {
    let payload = AdvertisementPacket::new()
        .with_hop_count(0)
        .with_message_id(0)
        .encode(TagScheme::V2)
        .unwrap();
    assert_eq!(payload, vec![0x02, 0x15, 0x00, 0x03, 0x18, 0x00, 0x00]);
}
