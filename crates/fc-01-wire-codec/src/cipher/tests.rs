use super::*;
use crate::test_keys::pair;
use proptest::prelude::*;
use shared_types::{FlowId, MessageBody, SessionId};

fn agent() -> LocalIdentity {
    LocalIdentity::new("C.00000000000000aa", pair(0))
}

fn server_key() -> RsaKeyPair {
    pair(1)
}

fn batch() -> Vec<Message> {
    vec![
        Message::new(
            SessionId::Flow(FlowId("F:1".into())),
            "ListProcesses",
            MessageBody::Data(b"pid=1".to_vec()),
        )
        .with_ids(1, 1),
        Message::new(
            SessionId::Flow(FlowId("F:1".into())),
            "ListProcesses",
            MessageBody::Data(b"pid=2".to_vec()),
        )
        .with_ids(1, 2),
    ]
}

fn sealed() -> Envelope {
    SessionCipher::new(&agent(), server_key().public_key())
        .unwrap()
        .seal(&batch(), Timestamp::from_micros(1234))
        .unwrap()
}

fn open_fresh(envelope: &Envelope) -> Result<(Vec<Message>, Timestamp), CodecError> {
    InboundCipher::unwrap(envelope, &server_key())?.open(envelope)
}

// =============================================================================
// ROUND TRIP
// =============================================================================

#[test]
fn test_roundtrip_preserves_batch_and_timestamp() {
    let envelope = sealed();
    let bytes = envelope.to_bytes().unwrap();
    let parsed = Envelope::from_bytes(&bytes).unwrap();

    let inbound = InboundCipher::unwrap(&parsed, &server_key()).unwrap();
    let (messages, timestamp) = inbound.open(&parsed).unwrap();

    assert_eq!(messages, batch());
    assert_eq!(timestamp, Timestamp::from_micros(1234));
    assert_eq!(inbound.source_name(), "C.00000000000000aa");
    assert_eq!(inbound.source_key(), pair(0).public_key());
}

#[test]
fn test_session_reuse_keeps_header_and_refreshes_iv() {
    let cipher = SessionCipher::new(&agent(), server_key().public_key()).unwrap();
    let first = cipher.seal(&batch(), Timestamp::from_micros(1)).unwrap();
    let second = cipher.seal(&batch(), Timestamp::from_micros(2)).unwrap();

    assert_eq!(first.cipher_key(), second.cipher_key());
    assert_ne!(first.packet_iv, second.packet_iv);

    let inbound = InboundCipher::unwrap(&first, &server_key()).unwrap();
    assert_eq!(
        inbound.open(&second).unwrap().1,
        Timestamp::from_micros(2)
    );
}

#[test]
fn test_empty_batch_roundtrips() {
    let envelope = SessionCipher::new(&agent(), server_key().public_key())
        .unwrap()
        .seal(&[], Timestamp::from_micros(5))
        .unwrap();
    let (messages, timestamp) = open_fresh(&envelope).unwrap();
    assert!(messages.is_empty());
    assert_eq!(timestamp, Timestamp::from_micros(5));
}

// =============================================================================
// FAILURE MAPPING
// =============================================================================

#[test]
fn test_wrong_recipient_is_decryption_error() {
    let envelope = sealed();
    assert!(matches!(
        InboundCipher::unwrap(&envelope, &pair(2)),
        Err(CodecError::Decryption(_))
    ));
}

#[test]
fn test_tampered_iv_is_integrity_error() {
    let mut envelope = sealed();
    envelope.packet_iv[0] ^= 0x01;
    assert_eq!(open_fresh(&envelope), Err(CodecError::Integrity));
}

#[test]
fn test_tampered_hmac_is_integrity_error() {
    let mut envelope = sealed();
    envelope.hmac[31] ^= 0x80;
    assert_eq!(open_fresh(&envelope), Err(CodecError::Integrity));
}

#[test]
fn test_tampered_encrypted_cipher_is_decryption_error() {
    let mut envelope = sealed();
    envelope.encrypted_cipher[10] ^= 0x01;
    assert!(matches!(
        open_fresh(&envelope),
        Err(CodecError::Decryption(_))
    ));
}

#[test]
fn test_tampered_metadata_is_decryption_error() {
    let mut envelope = sealed();
    let last = envelope.encrypted_cipher_metadata.len() - 1;
    envelope.encrypted_cipher_metadata[last] ^= 0x01;
    assert!(matches!(
        open_fresh(&envelope),
        Err(CodecError::Decryption(_))
    ));
}

#[test]
fn test_cipher_from_other_session_cannot_open() {
    let inbound = InboundCipher::unwrap(&sealed(), &server_key()).unwrap();
    let other = sealed();
    assert_eq!(inbound.open(&other), Err(CodecError::Integrity));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_any_flipped_ciphertext_byte_is_integrity_error(index in any::<prop::sample::Index>(), bit in 0u8..8) {
        let mut envelope = sealed();
        let i = index.index(envelope.encrypted.len());
        envelope.encrypted[i] ^= 1 << bit;
        prop_assert_eq!(open_fresh(&envelope), Err(CodecError::Integrity));
    }
}

// =============================================================================
// LOGGING
// =============================================================================

#[derive(Clone, Default)]
struct CapturedLogs(std::sync::Arc<parking_lot::Mutex<Vec<u8>>>);

impl std::io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedLogs;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

#[test]
fn test_unwrap_logs_sender() {
    let logs = CapturedLogs::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(logs.clone())
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .finish();

    tracing::subscriber::with_default(subscriber, || {
        open_fresh(&sealed()).unwrap();
    });

    let output = String::from_utf8(logs.0.lock().clone()).unwrap();
    assert!(output.contains("[fc-01] Unwrapped session key from C.00000000000000aa"));
}
