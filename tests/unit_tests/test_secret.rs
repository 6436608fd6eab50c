// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use base64::{
    Engine as _,
    engine::general_purpose::{STANDARD, URL_SAFE},
};
use netwarden::secret::{SecretBox, SecretError};

use crate::unit_tests::{test_key_b64, test_secret_box};

#[test]
fn round_trip_preserves_plaintext() {
    let secrets = test_secret_box();
    for pt in ["p", "hello", "pässwörd ✓", "a much longer secret value 0123456789"] {
        let ct = secrets.encrypt(pt).expect("encrypt");
        assert_ne!(ct, pt);
        assert_eq!(secrets.decrypt(&ct).expect("decrypt"), pt);
    }
}

#[test]
fn empty_input_round_trips_unchanged() {
    let secrets = test_secret_box();
    assert_eq!(secrets.encrypt("").expect("encrypt"), "");
    assert_eq!(secrets.decrypt("").expect("decrypt"), "");
}

#[test]
fn nonces_are_fresh_per_operation() {
    let secrets = test_secret_box();
    let a = secrets.encrypt("same plaintext").expect("encrypt");
    let b = secrets.encrypt("same plaintext").expect("encrypt");
    assert_ne!(a, b);
}

#[test]
fn any_bit_flip_is_corrupt() {
    let secrets = test_secret_box();
    let ct = secrets.encrypt("hello").expect("encrypt");
    let raw = STANDARD.decode(&ct).expect("ciphertext is base64");

    // Flip one bit at every position: nonce, body, and tag must all be
    // covered by the authentication check.
    for idx in 0..raw.len() {
        let mut tampered = raw.clone();
        tampered[idx] ^= 0x01;
        let tampered_b64 = STANDARD.encode(&tampered);
        assert_eq!(
            secrets.decrypt(&tampered_b64),
            Err(SecretError::Corrupt),
            "flip at byte {idx} must not decrypt"
        );
    }
}

#[test]
fn truncated_ciphertext_is_corrupt() {
    let secrets = test_secret_box();
    // Shorter than one nonce.
    let short = STANDARD.encode([1u8, 2, 3, 4, 5]);
    assert_eq!(secrets.decrypt(&short), Err(SecretError::Corrupt));
}

#[test]
fn garbage_ciphertext_is_corrupt() {
    let secrets = test_secret_box();
    assert_eq!(secrets.decrypt("not base64 at all!"), Err(SecretError::Corrupt));
}

#[test]
fn wrong_key_is_corrupt() {
    let a = test_secret_box();
    let b = SecretBox::from_key_b64(&STANDARD.encode([7u8; 32])).expect("key");
    let ct = a.encrypt("hello").expect("encrypt");
    assert_eq!(b.decrypt(&ct), Err(SecretError::Corrupt));
}

#[test]
fn key_decode_fallback_chain() {
    // 0xfb bytes force '+' and '/' into the standard alphabet, so the three
    // encodings genuinely exercise different branches.
    let key = [0xfbu8; 32];
    let std_b64 = STANDARD.encode(key);
    let url_b64 = URL_SAFE.encode(key);
    let unpadded = std_b64.trim_end_matches('=').to_string();
    assert_ne!(std_b64, url_b64);

    let reference = SecretBox::from_key_b64(&std_b64).expect("standard base64");
    for variant in [url_b64, unpadded] {
        let other = SecretBox::from_key_b64(&variant).expect("fallback decode");
        let ct = reference.encrypt("interop").expect("encrypt");
        assert_eq!(other.decrypt(&ct).expect("decrypt"), "interop");
    }
}

#[test]
fn key_must_be_256_bits() {
    let short = STANDARD.encode([1u8; 16]);
    assert_eq!(
        SecretBox::from_key_b64(&short).err(),
        Some(SecretError::KeyLength(16))
    );
}

#[test]
fn undecodable_key_fails_at_startup() {
    assert_eq!(
        SecretBox::from_key_b64("!!! definitely not base64 !!!").err(),
        Some(SecretError::KeyNotBase64)
    );
}

#[test]
fn key_is_valid_for_sanity() {
    // The shared fixture itself must stay usable.
    assert!(SecretBox::from_key_b64(&test_key_b64()).is_ok());
}
