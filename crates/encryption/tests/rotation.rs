//! Expiry-driven DEK rotation and version framing.

mod support;

use std::collections::HashMap;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use field_encryption::clock::MILLIS_IN_DAY;
use field_encryption::config::ENCRYPT_DEK_EXPIRY_DAYS;
use field_encryption::crypto::{extract_version, prefix_version, AES256_GCM};
use field_encryption::{
    FieldEncryptionExecutor, FieldType, FieldValue, RuleContext, RuleExecutor, RuleMode,
};
use support::{ctx, Harness, SUBJECT};

fn rotating(mode: RuleMode) -> RuleContext {
    ctx(mode).with_param(ENCRYPT_DEK_EXPIRY_DAYS, "1")
}

fn executor(h: &Harness) -> FieldEncryptionExecutor {
    let mut executor =
        FieldEncryptionExecutor::with_clock(h.clock.clone()).with_kms_registry(h.kms.clone());
    executor.configure(h.registry.clone(), HashMap::new()).unwrap();
    executor
}

fn write(executor: &FieldEncryptionExecutor, value: &str) -> (String, Vec<u8>) {
    let Some(FieldValue::String(encoded)) = executor
        .transform_field(
            &rotating(RuleMode::Write),
            FieldType::String,
            Some(FieldValue::String(value.to_owned())),
        )
        .unwrap()
    else {
        panic!("expected string ciphertext");
    };
    let framed = STANDARD.decode(&encoded).unwrap();
    (encoded, framed)
}

fn read(executor: &FieldEncryptionExecutor, encoded: String) -> Option<FieldValue> {
    executor
        .transform_field(
            &rotating(RuleMode::Read),
            FieldType::String,
            Some(FieldValue::String(encoded)),
        )
        .unwrap()
}

#[test]
fn two_day_advance_rotates_to_version_two() {
    let h = Harness::new();
    let executor = executor(&h);

    let (first, first_framed) = write(&executor, "first");
    assert_eq!(extract_version(&first_framed).unwrap().0, 1);

    h.clock.advance(2 * MILLIS_IN_DAY);

    let (second, second_framed) = write(&executor, "second");
    assert_eq!(extract_version(&second_framed).unwrap().0, 2);
    assert_eq!(h.registry.dek_version_count("kek1", SUBJECT, AES256_GCM), 2);

    // Old ciphertexts keep decrypting with the version they carry.
    assert_eq!(read(&executor, first), Some(FieldValue::String("first".into())));
    assert_eq!(read(&executor, second), Some(FieldValue::String("second".into())));
}

#[test]
fn unexpired_dek_is_reused() {
    let h = Harness::new();
    let executor = executor(&h);

    let (_, a) = write(&executor, "a");
    h.clock.advance(MILLIS_IN_DAY - 1);
    let (_, b) = write(&executor, "b");

    assert_eq!(extract_version(&a).unwrap().0, 1);
    assert_eq!(extract_version(&b).unwrap().0, 1);
    assert_eq!(h.registry.dek_version_count("kek1", SUBJECT, AES256_GCM), 1);
}

#[test]
fn readers_never_rotate() {
    let h = Harness::new();
    let executor = executor(&h);

    let (encoded, _) = write(&executor, "kept");
    h.clock.advance(30 * MILLIS_IN_DAY);

    assert_eq!(read(&executor, encoded), Some(FieldValue::String("kept".into())));
    assert_eq!(h.registry.dek_version_count("kek1", SUBJECT, AES256_GCM), 1);
}

#[test]
fn reframing_is_identity() {
    let h = Harness::new();
    let executor = executor(&h);
    let (_, framed) = write(&executor, "frame me");

    let (version, body) = extract_version(&framed).unwrap();
    assert_eq!(prefix_version(version, body), framed);
}

#[test]
fn unrotated_ciphertext_has_no_frame() {
    let h = Harness::new();
    let executor = executor(&h);

    let Some(FieldValue::Bytes(ct)) = executor
        .transform_field(
            &ctx(RuleMode::Write),
            FieldType::Bytes,
            Some(FieldValue::Bytes(b"plain".to_vec())),
        )
        .unwrap()
    else {
        panic!("expected bytes ciphertext");
    };
    // nonce (12) + plaintext (5) + tag (16)
    assert_eq!(ct.len(), 12 + 5 + 16);
}
