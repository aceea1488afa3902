//! Unit tests for the newline record codec.

use bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use natty::engine::codec::{RecordCodec, MAX_LINE_BYTES};
use natty::AppError;

// ── Decoding ─────────────────────────────────────────────────────────────────

#[test]
fn single_record_is_decoded_without_newline() {
    let mut codec = RecordCodec::new();
    let mut buf = BytesMut::from("candidate:1 1 UDP\n");

    let record = codec.decode(&mut buf).expect("decode");
    assert_eq!(record, Some(Bytes::from_static(b"candidate:1 1 UDP")));
    assert!(buf.is_empty());
}

#[test]
fn batched_records_are_each_decoded() {
    let mut codec = RecordCodec::new();
    let mut buf = BytesMut::from("a\nb\n");

    assert_eq!(codec.decode(&mut buf).expect("first"), Some(Bytes::from_static(b"a")));
    assert_eq!(codec.decode(&mut buf).expect("second"), Some(Bytes::from_static(b"b")));
    assert_eq!(codec.decode(&mut buf).expect("drained"), None);
}

#[test]
fn partial_record_is_buffered_until_newline() {
    let mut codec = RecordCodec::new();
    let mut buf = BytesMut::from("v=0 o=- 1");

    assert_eq!(codec.decode(&mut buf).expect("partial"), None);

    buf.extend_from_slice(b" 2 IN\n");
    assert_eq!(
        codec.decode(&mut buf).expect("complete"),
        Some(Bytes::from_static(b"v=0 o=- 1 2 IN"))
    );
}

#[test]
fn carriage_return_and_non_utf8_are_kept() {
    let mut codec = RecordCodec::new();
    let mut buf = BytesMut::from(&b"\xff\xfeabc\r\n"[..]);

    assert_eq!(
        codec.decode(&mut buf).expect("decode"),
        Some(Bytes::from_static(b"\xff\xfeabc\r"))
    );
}

#[test]
fn empty_record_is_yielded() {
    let mut codec = RecordCodec::new();
    let mut buf = BytesMut::from("\n");
    assert_eq!(codec.decode(&mut buf).expect("decode"), Some(Bytes::new()));
}

#[test]
fn record_at_limit_is_accepted() {
    let mut codec = RecordCodec::with_max_length(4);
    let mut buf = BytesMut::from("abcd\n");
    assert_eq!(codec.decode(&mut buf).expect("decode"), Some(Bytes::from_static(b"abcd")));
}

#[test]
fn record_over_limit_is_rejected() {
    let mut codec = RecordCodec::with_max_length(4);
    let mut buf = BytesMut::from("abcde");

    let err = codec.decode(&mut buf).unwrap_err();
    assert!(
        matches!(err, AppError::Io(ref msg) if msg.starts_with("line too long")),
        "got {err:?}"
    );
}

#[test]
fn default_limit_is_one_mebibyte() {
    assert_eq!(MAX_LINE_BYTES, 1_048_576);
    assert_eq!(RecordCodec::new().max_length(), MAX_LINE_BYTES);
}

#[test]
fn unterminated_fragment_at_eof_is_discarded() {
    let mut codec = RecordCodec::new();
    let mut buf = BytesMut::from("done\npartial");

    assert_eq!(codec.decode_eof(&mut buf).expect("eof"), Some(Bytes::from_static(b"done")));
    assert_eq!(codec.decode_eof(&mut buf).expect("eof"), None);
    assert!(buf.is_empty());
}

#[test]
fn codec_is_reusable_after_discarding_fragment() {
    let mut codec = RecordCodec::with_max_length(16);
    let mut buf = BytesMut::from("partial");

    assert_eq!(codec.decode(&mut buf).expect("partial"), None);
    assert_eq!(codec.decode_eof(&mut buf).expect("eof"), None);
    assert!(buf.is_empty());

    buf.extend_from_slice(b"x\n");
    assert_eq!(codec.decode(&mut buf).expect("decode"), Some(Bytes::from_static(b"x")));
    assert_eq!(codec.max_length(), 16);
}

// ── Encoding ─────────────────────────────────────────────────────────────────

#[test]
fn encode_appends_single_newline() {
    let mut codec = RecordCodec::new();
    let mut dst = BytesMut::new();

    codec
        .encode(Bytes::from_static(b"answer-sdp"), &mut dst)
        .expect("encode");
    assert_eq!(&dst[..], b"answer-sdp\n");
}
