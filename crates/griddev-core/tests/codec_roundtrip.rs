//! Integration tests for the griddev-core wire codec.
//!
//! These tests drive the public encoder and decoder the way the client and
//! server do: several fields of different types in one body, an encoder
//! reused across requests, and decoding bounded by the body length.

use griddev_core::{
    protocol::codec::WireDecoder, Color, DeviceRequest, DrawingContextValue, LineType, Opcode,
    ProtocolError, WireEncoder,
};

#[test]
fn test_roundtrip_mixed_request_body() {
    // Arrange
    let mut encoder = WireEncoder::new();
    encoder.write_byte(Opcode::DrawPolygon as u8);
    encoder.write_int(3);
    encoder.write_int(7);
    encoder.write_double_array(Some(&[0.0, 1.5, -2.25]));
    encoder.write_double_array(Some(&[f64::MAX, f64::MIN_POSITIVE, 0.1]));
    encoder.write_int(0);
    encoder.write_int(3);

    // Act
    let mut decoder = WireDecoder::new(encoder.reset_write());

    // Assert
    assert_eq!(decoder.read_byte().unwrap(), Opcode::DrawPolygon as u8);
    assert_eq!(decoder.read_int().unwrap(), 3);
    assert_eq!(decoder.read_int().unwrap(), 7);
    assert_eq!(decoder.read_double_array().unwrap(), Some(vec![0.0, 1.5, -2.25]));
    assert_eq!(
        decoder.read_double_array().unwrap(),
        Some(vec![f64::MAX, f64::MIN_POSITIVE, 0.1])
    );
    assert_eq!(decoder.read_int().unwrap(), 0);
    assert_eq!(decoder.read_int().unwrap(), 3);
    assert!(decoder.is_read_finished());
}

#[test]
fn test_roundtrip_strings_empty_unicode_and_null() {
    let mut encoder = WireEncoder::new();
    encoder.write_string(Some(""));
    encoder.write_string(Some("plain ascii"));
    encoder.write_string(Some("Grüße, 世界 🎨"));
    encoder.write_string(None);

    let mut decoder = WireDecoder::new(encoder.reset_write());
    assert_eq!(decoder.read_string().unwrap().as_deref(), Some(""));
    assert_eq!(decoder.read_string().unwrap().as_deref(), Some("plain ascii"));
    assert_eq!(decoder.read_string().unwrap().as_deref(), Some("Grüße, 世界 🎨"));
    assert_eq!(decoder.read_string().unwrap(), None);
    assert!(decoder.is_read_finished());
}

#[test]
fn test_roundtrip_arrays_null_and_empty() {
    let mut encoder = WireEncoder::new();
    encoder.write_byte_array(None);
    encoder.write_byte_array(Some(&[]));
    encoder.write_byte_array(Some(&[0, 127, 255]));
    encoder.write_int_array(None);
    encoder.write_int_array(Some(&[]));
    encoder.write_int_array(Some(&[i32::MIN, -1, 0, i32::MAX]));
    encoder.write_double_array(None);
    encoder.write_double_array(Some(&[]));

    let mut decoder = WireDecoder::new(encoder.reset_write());
    assert_eq!(decoder.read_byte_array().unwrap(), None);
    assert_eq!(decoder.read_byte_array().unwrap(), Some(vec![]));
    assert_eq!(decoder.read_byte_array().unwrap(), Some(vec![0, 127, 255]));
    assert_eq!(decoder.read_int_array().unwrap(), None);
    assert_eq!(decoder.read_int_array().unwrap(), Some(vec![]));
    assert_eq!(
        decoder.read_int_array().unwrap(),
        Some(vec![i32::MIN, -1, 0, i32::MAX])
    );
    assert_eq!(decoder.read_double_array().unwrap(), None);
    assert_eq!(decoder.read_double_array().unwrap(), Some(vec![]));
}

#[test]
fn test_roundtrip_preserves_special_doubles_bitwise() {
    let values = [f64::NAN, f64::INFINITY, f64::NEG_INFINITY, -0.0];
    let mut encoder = WireEncoder::new();
    for v in values {
        encoder.write_double(v);
    }
    let mut decoder = WireDecoder::new(encoder.reset_write());
    for v in values {
        assert_eq!(decoder.read_double().unwrap().to_bits(), v.to_bits());
    }
}

#[test]
fn test_reused_encoder_holds_only_the_second_request() {
    // Arrange: request A is large enough to grow the buffer
    let mut encoder = WireEncoder::new();
    encoder.write_byte(Opcode::DrawRaster as u8);
    encoder.write_int_array(Some(&[0x7F00_FF00; 64]));
    let request_a = encoder.reset_write();

    // Act
    encoder.write_byte(Opcode::Flush as u8);
    encoder.write_int(5);
    let request_b = encoder.reset_write();

    // Assert
    assert_eq!(request_a.len(), 1 + 4 + 64 * 4);
    assert_eq!(request_b, vec![4, 0, 0, 0, 5]);
    assert_eq!(encoder.position(), 0);
}

#[test]
fn test_truncated_body_fails_with_unexpected_eof() {
    // A DRAW_RECT body cut off in the middle of its third double.
    let mut encoder = WireEncoder::new();
    encoder.write_byte(Opcode::DrawRect as u8);
    encoder.write_int(1);
    encoder.write_int(1);
    encoder.write_double(0.5);
    encoder.write_double(0.5);
    let mut body = encoder.reset_write();
    body.extend_from_slice(&[0x3F, 0xF0]);

    let mut decoder = WireDecoder::new(body);
    decoder.read_byte().unwrap();
    decoder.read_int().unwrap();
    decoder.read_int().unwrap();
    decoder.read_double().unwrap();
    decoder.read_double().unwrap();
    let err = decoder.read_double().unwrap_err();

    assert!(matches!(err, ProtocolError::UnexpectedEof { needed: 8, .. }));
}

#[test]
fn test_context_and_device_payloads_share_one_body() {
    let ctx = DrawingContextValue::builder()
        .line_type(LineType::Blank)
        .fill_color(Color::from_rgba(1, 2, 3, 4))
        .build();
    let request = DeviceRequest::image("plot.svg", "svg", 640, 480);

    let mut encoder = WireEncoder::new();
    request.encode(&mut encoder);
    ctx.encode(&mut encoder);

    let mut decoder = WireDecoder::new(encoder.reset_write());
    assert_eq!(DeviceRequest::decode(&mut decoder).unwrap(), request);
    assert_eq!(DrawingContextValue::decode(&mut decoder).unwrap(), ctx);
    assert!(decoder.is_read_finished());
}
