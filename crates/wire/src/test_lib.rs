use super::*;

#[test]
fn crc_standard_check_value() {
    assert_eq!(crc16(b"123456789"), 0x29B1);
}

#[test]
fn crc_empty() {
    assert_eq!(crc16(&[]), 0xFFFF);
}

#[test]
fn crc_single_zero() {
    assert_eq!(crc16(&[0]), 0xE1F0);
}

#[test]
fn crc_large() {
    let data: Vec<u8> = b"0123456789".iter().copied().cycle().take(300).collect();
    assert_eq!(crc16(&data), 0xC347);
}

#[test]
fn add_and_verify_crc() {
    let mut packet = vec![0x01, 0x02, 0x03];
    add_crc(&mut packet);
    assert_eq!(packet, [0x01, 0x02, 0x03, 0xAD, 0xAD]);
    assert_eq!(verify_crc(&packet), Ok(()));
}

#[test]
fn add_crc_standard_value() {
    let mut packet = b"123456789".to_vec();
    add_crc(&mut packet);
    assert_eq!(&packet[9..], [0x29, 0xB1]);
    assert_eq!(verify_crc(&packet), Ok(()));
}

#[test]
fn verify_bad_crc() {
    assert_eq!(
        verify_crc(&[0x01, 0x02, 0x03, 0xAD, 0xAE]),
        Err(WireError::CrcMismatch)
    );
}

#[test]
fn verify_short_packet() {
    assert_eq!(verify_crc(&[0x01, 0x02]), Err(WireError::ShortData));
}

#[test]
fn split_basic() {
    /* The trailing 0x01 0x01 stands in for a CRC; splitting does not check it */
    let packet = [
        0x01, 0x00, 0x01, 0x04, b't', b'e', b's', b't', b'h', b'e', b'l', b'l', b'o', 0x01, 0x01,
    ];
    let (topic, data) = split_packet(&packet, 3).unwrap();
    assert_eq!(topic, Topic::new("test").unwrap());
    assert_eq!(data, b"hello");
}

#[test]
fn split_bogus_topic_length() {
    let packet = [0x01, 0x00, 0x01, 0x06, 0x02, 0x03];
    assert_eq!(split_packet(&packet, 3), Err(WireError::TopicOverlong));
}

#[test]
fn split_start_out_of_range() {
    assert_eq!(split_packet(&[0x01, 0x02], 5), Err(WireError::ShortData));
}

#[test]
fn split_empty_topic_and_data() {
    let mut packet = vec![0x42, 0x01, 0x00];
    add_crc(&mut packet);
    let (topic, data) = split_packet(&packet, 2).unwrap();
    assert!(topic.is_empty());
    assert!(data.is_empty());
}

#[test]
fn packet_type_from_byte() {
    assert_eq!(PacketType::try_from(0x42), Ok(PacketType::Broadcast));
    assert_eq!(PacketType::try_from(0x50), Ok(PacketType::Publish));
    assert_eq!(PacketType::try_from(0x41), Ok(PacketType::Ack));
    assert_eq!(
        PacketType::try_from(0x58),
        Err(WireError::UnrecognisedType(0x58))
    );
}

#[test]
fn topic_length_bound() {
    assert!(Topic::new([0x55u8; MAX_TOPIC_LENGTH]).is_ok());
    assert_eq!(
        Topic::new([0x55u8; MAX_TOPIC_LENGTH + 1]),
        Err(WireError::TopicOverlong)
    );
}

#[test]
fn broadcast_roundtrip() {
    let packet = Packet::Broadcast {
        id: 1,
        topic: Topic::new("test-topic").unwrap(),
        data: b"hello".to_vec(),
    };
    let mut op = Vec::new();
    packet.encode(&mut op);

    assert_eq!(op[0], 0x42);
    assert_eq!(op[1], 0x01);
    assert_eq!(op[2], 10);
    assert_eq!(verify_crc(&op), Ok(()));
    assert_eq!(Packet::decode(&op).unwrap(), packet);
}

#[test]
fn publish_roundtrip_empty_payload() {
    let packet = Packet::Publish {
        id: 0xFF,
        topic: Topic::new("t").unwrap(),
        data: Vec::new(),
    };
    let mut op = Vec::new();
    packet.encode(&mut op);
    assert_eq!(op[0], 0x50);
    assert_eq!(Packet::decode(&op).unwrap(), packet);
}

#[test]
fn payload_with_zeros_roundtrip() {
    let packet = Packet::Broadcast {
        id: 9,
        topic: Topic::new("z").unwrap(),
        data: vec![0x00, 0x00],
    };
    let mut op = Vec::new();
    packet.encode(&mut op);
    assert_eq!(Packet::decode(&op).unwrap(), packet);
}

#[test]
fn decode_rejects_unknown_type() {
    let mut op = vec![0x58, 0x01];
    add_crc(&mut op);
    assert_eq!(Packet::decode(&op), Err(WireError::UnrecognisedType(0x58)));
}

#[test]
fn decode_rejects_bad_crc() {
    let mut op = Vec::new();
    Packet::Ack { id: 3 }.encode(&mut op);
    let last = op.len() - 1;
    op[last] ^= 0xFF;
    assert_eq!(Packet::decode(&op), Err(WireError::CrcMismatch));
}

#[test]
fn decode_rejects_overlong_topic() {
    /* Valid CRC, bogus topic length byte */
    let mut op = vec![0x42, 0x01, 0x74, 0x01, 0x02, 0x03];
    add_crc(&mut op);
    assert_eq!(Packet::decode(&op), Err(WireError::TopicOverlong));
}
