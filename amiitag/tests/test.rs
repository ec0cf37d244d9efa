use amiitag::{Error, Half, KeyMaterial, TagCodec, TagData, TAG_SIZE};
use std::collections::HashSet;
use std::io::Cursor;

/// Synthetic 80-byte master key blob with the retail structure.
fn key_blob(fill: u8, type_string: &[u8], magic_size: u8) -> Vec<u8> {
    let mut out = vec![fill; 16]; // hmac key
    let mut ts = [0u8; 14];
    ts[..type_string.len()].copy_from_slice(type_string);
    out.extend_from_slice(&ts);
    out.push(0); // rfu
    out.push(magic_size);
    out.extend((0u8..16).map(|i| fill ^ i)); // magic bytes
    out.extend((0u8..32).map(|i| fill.wrapping_mul(3).wrapping_add(i))); // xor pad
    out
}

fn key_file() -> Vec<u8> {
    let mut file = key_blob(0x5A, b"unfixed infos", 14);
    file.extend(key_blob(0xC3, b"locked secret", 14));
    file
}

fn test_codec() -> TagCodec {
    TagCodec::new(KeyMaterial::from_combined(&key_file()).unwrap())
}

/// Plaintext record with a deterministic payload and a fixed serial.
fn sample_record() -> TagData {
    let mut image = [0u8; TAG_SIZE];
    for (i, b) in image.iter_mut().enumerate() {
        *b = (i % 251) as u8;
    }
    let mut record = TagData::from_bytes(&image).unwrap();
    record
        .set_uid([0x04, 0x92, 0x3B, 0x1C, 0x5D, 0x7E, 0x9F])
        .unwrap();
    record
}

#[test]
fn test_key_material_size() {
    assert!(matches!(
        KeyMaterial::from_combined(&[0; 159]),
        Err(Error::KeySize { got: 159, .. })
    ));
    assert!(matches!(
        KeyMaterial::from_combined(&vec![0; 161]),
        Err(Error::KeySize { got: 161, .. })
    ));
    assert!(KeyMaterial::read(&mut Cursor::new(key_file())).is_ok());
}

#[test]
fn test_round_trip() {
    let codec = test_codec();
    let record = sample_record();

    let dump = codec.encrypt(&record).unwrap();
    let decrypted = codec.decrypt(&dump).unwrap();

    assert_eq!(decrypted.uid(), record.uid());
    assert_eq!(decrypted.figure_id(), record.figure_id());
    assert_eq!(decrypted.write_counter(), record.write_counter());
    assert_eq!(decrypted.payload(), record.payload());

    // a decrypt-originated record survives a full cycle byte for byte
    let dump2 = codec.encrypt(&decrypted).unwrap();
    assert_eq!(dump2, dump);
    assert_eq!(codec.decrypt(&dump2).unwrap(), decrypted);
}

#[test]
fn test_round_trip_other_serial() {
    let codec = test_codec();
    let mut record = sample_record();
    record
        .set_uid([0x04, 0xFF, 0x00, 0xAB, 0xCD, 0xEF, 0x01])
        .unwrap();

    let decrypted = codec.decrypt(&codec.encrypt(&record).unwrap()).unwrap();
    assert_eq!(decrypted.uid(), record.uid());
    assert_eq!(decrypted.payload(), record.payload());
}

#[test]
fn test_undersized_dump() {
    let codec = test_codec();
    assert!(matches!(
        codec.decrypt(&[0; TAG_SIZE - 1]),
        Err(Error::DumpSize(539))
    ));
    assert!(matches!(
        codec.decrypt(&[0; TAG_SIZE + 1]),
        Err(Error::DumpSize(541))
    ));
    assert!(matches!(codec.validate(&[]), Err(Error::DumpSize(0))));
}

#[test]
fn test_tamper_detection_hmac_fields() {
    let codec = test_codec();
    let dump = codec.encrypt(&sample_record()).unwrap();

    // stored tag hmac lives at 0x34, stored data hmac at 0x80 (tag order)
    for (range, half) in [(0x34..0x54, Half::Tag), (0x80..0xA0, Half::Data)] {
        for offset in range {
            for bit in 0..8 {
                let mut bad = dump;
                bad[offset] ^= 1 << bit;
                match codec.decrypt(&bad) {
                    Err(Error::Integrity(got)) => assert_eq!(got, half),
                    other => panic!("expected integrity failure, got {other:?}"),
                }
            }
        }
    }
}

#[test]
fn test_tamper_detection_payload() {
    let codec = test_codec();
    let dump = codec.encrypt(&sample_record()).unwrap();

    // encrypted app data without a matching tag
    for offset in [0xA0, 0x150, 0x207] {
        let mut bad = dump;
        bad[offset] ^= 0x01;
        assert!(matches!(
            codec.decrypt(&bad),
            Err(Error::Integrity(Half::Data))
        ));
    }

    // serial bytes feed key derivation, so the tag half degrades first
    let mut bad = dump;
    bad[0x01] ^= 0x01;
    assert!(matches!(
        codec.decrypt(&bad),
        Err(Error::Integrity(Half::Tag))
    ));
}

#[test]
fn test_validate_only() {
    let codec = test_codec();
    let dump = codec.encrypt(&sample_record()).unwrap();
    assert!(codec.validate(&dump).is_ok());

    let mut bad = dump;
    bad[0x90] ^= 0x80;
    assert!(codec.validate(&bad).is_err());
}

#[test]
fn test_wrong_key_material_rejected() {
    let dump = test_codec().encrypt(&sample_record()).unwrap();

    let mut other_file = key_blob(0x11, b"unfixed infos", 14);
    other_file.extend(key_blob(0x22, b"locked secret", 14));
    let other = TagCodec::new(KeyMaterial::from_combined(&other_file).unwrap());
    assert!(matches!(other.decrypt(&dump), Err(Error::Integrity(_))));
}

#[test]
fn test_checksum_consistency() {
    let codec = test_codec();
    let dump = codec.encrypt(&sample_record()).unwrap();

    // BCC0 over cascade tag and uid0-2, BCC1 over uid3-6, recomputed from
    // the returned dump alone
    assert_eq!(dump[3], 0x88 ^ dump[0] ^ dump[1] ^ dump[2]);
    assert_eq!(dump[8], dump[4] ^ dump[5] ^ dump[6] ^ dump[7]);

    // same property for a decrypt-originated record
    let reencrypted = codec.encrypt(&codec.decrypt(&dump).unwrap()).unwrap();
    assert_eq!(reencrypted, dump);
}

#[test]
fn test_checksum_repaired_on_encrypt() {
    let codec = test_codec();
    let mut dump = codec.encrypt(&sample_record()).unwrap();

    // BCC1 is outside both signed regions, so a corrupted check byte still
    // decrypts; encrypt must emit a consistent one regardless
    dump[8] ^= 0xFF;
    let record = codec.decrypt(&dump).unwrap();
    let out = codec.encrypt(&record).unwrap();
    assert_eq!(out[3], 0x88 ^ out[0] ^ out[1] ^ out[2]);
    assert_eq!(out[8], out[4] ^ out[5] ^ out[6] ^ out[7]);
    assert!(codec.decrypt(&out).is_ok());
}

#[test]
fn test_record_shape() {
    assert!(matches!(
        TagData::from_bytes(&[0; TAG_SIZE - 1]),
        Err(Error::RecordSize(539))
    ));

    // a reserved serial byte can only arrive via from_bytes; encrypt rejects it
    let mut image = [0u8; TAG_SIZE];
    image[0x1D4] = 0x88;
    let record = TagData::from_bytes(&image).unwrap();
    assert!(matches!(
        test_codec().encrypt(&record),
        Err(Error::ReservedUid(0x88))
    ));
}

#[test]
fn test_random_serials() {
    let codec = test_codec();
    let record = sample_record();

    let dumps: Vec<_> = codec.random_serials(&record, 100).collect();
    assert_eq!(dumps.len(), 100);

    let mut serials = HashSet::new();
    for dump in &dumps {
        let copy = codec.decrypt(dump).unwrap();
        assert_ne!(copy.uid(), record.uid());
        assert_eq!(copy.uid()[0], 0x04);
        assert_eq!(copy.figure_id(), record.figure_id());
        assert_eq!(copy.payload(), record.payload());
        serials.insert(copy.uid());
    }
    assert_eq!(serials.len(), dumps.len());
}

#[test]
fn test_random_serials_restartable() {
    let codec = test_codec();
    let record = sample_record();

    let first: Vec<_> = codec.random_serials(&record, 3).collect();
    let second: Vec<_> = codec.random_serials(&record, 3).collect();
    assert_eq!(first.len(), 3);
    assert_eq!(second.len(), 3);
    // independent sequences; colliding 6-byte serials would be astonishing
    assert_ne!(first, second);
}
