//! Self-describing binary encoding of field lists.
//!
//! A stored object is a fixed header followed by a body of fields:
//!
//! ```text
//! record = "GVOB" | version u8 | object type u8 | body len u32 LE | crc32(body) u32 LE | body
//! body   = field*
//! field  = kind u8 | value tag u8 | payload len u32 LE | payload
//! ```
//!
//! Value tags: 1 = UTF-8 string, 2 = i64 LE (exactly 8 bytes), 3 = composite
//! (payload is a nested body). Decoding rejects anything it does not fully
//! understand.
//!
//! # Size limits
//!
//! Every length prefix is a `u32`, so one field payload (including a nested
//! composite body) and one record body are each at most `u32::MAX` bytes,
//! just under 4 GiB. Encoding anything larger fails with
//! [`CodecError::TooLarge`] rather than truncating. The object store applies
//! a much smaller cap on whole records; see
//! [`DEFAULT_MAX_OBJECT_SIZE`](crate::store::DEFAULT_MAX_OBJECT_SIZE).

use crate::error::{CodecError, CodecResult};
use crate::field::{Field, FieldKind, Value};
use crate::object::ObjectType;

pub const MAGIC: &[u8; 4] = b"GVOB";
pub const FORMAT_VERSION: u8 = 1;
pub const HEADER_LEN: usize = 4 + 1 + 1 + 4 + 4;

/// Deepest allowed nesting of composite values.
pub const MAX_DEPTH: usize = 8;

const TAG_STR: u8 = 1;
const TAG_INT: u8 = 2;
const TAG_COMPOSITE: u8 = 3;

const FIELD_HEADER_LEN: usize = 1 + 1 + 4;

/// Encode a field list as a body (no record header).
pub fn encode(fields: &[Field]) -> CodecResult<Vec<u8>> {
    let mut out = Vec::new();
    encode_into(&mut out, fields, 1)?;
    Ok(out)
}

fn encode_into(out: &mut Vec<u8>, fields: &[Field], depth: usize) -> CodecResult<()> {
    if depth > MAX_DEPTH {
        return Err(CodecError::TooDeep(MAX_DEPTH));
    }
    for field in fields {
        out.push(field.kind.tag());
        match &field.value {
            Value::Str(s) => {
                out.push(TAG_STR);
                push_len(out, s.len())?;
                out.extend_from_slice(s.as_bytes());
            }
            Value::Int(n) => {
                out.push(TAG_INT);
                push_len(out, 8)?;
                out.extend_from_slice(&n.to_le_bytes());
            }
            Value::Composite(children) => {
                out.push(TAG_COMPOSITE);
                let mut nested = Vec::new();
                encode_into(&mut nested, children, depth + 1)?;
                push_len(out, nested.len())?;
                out.extend_from_slice(&nested);
            }
        }
    }
    Ok(())
}

fn push_len(out: &mut Vec<u8>, len: usize) -> CodecResult<()> {
    let len = u32::try_from(len).map_err(|_| CodecError::TooLarge(len))?;
    out.extend_from_slice(&len.to_le_bytes());
    Ok(())
}

/// Decode a body produced by [`encode`].
pub fn decode(body: &[u8]) -> CodecResult<Vec<Field>> {
    decode_at(body, 1)
}

fn decode_at(mut data: &[u8], depth: usize) -> CodecResult<Vec<Field>> {
    if depth > MAX_DEPTH {
        return Err(CodecError::TooDeep(MAX_DEPTH));
    }
    let mut fields = Vec::new();
    while !data.is_empty() {
        if data.len() < FIELD_HEADER_LEN {
            return Err(CodecError::Truncated {
                needed: FIELD_HEADER_LEN,
                available: data.len(),
            });
        }
        let kind = FieldKind::from_tag(data[0]).ok_or(CodecError::UnknownFieldKind(data[0]))?;
        let value_tag = data[1];
        let len = read_u32(&data[2..6]) as usize;
        let rest = &data[FIELD_HEADER_LEN..];
        if rest.len() < len {
            return Err(CodecError::Truncated {
                needed: len,
                available: rest.len(),
            });
        }
        let (payload, tail) = rest.split_at(len);

        let value = match value_tag {
            TAG_STR => {
                let s = std::str::from_utf8(payload).map_err(|_| CodecError::InvalidUtf8)?;
                Value::Str(s.to_string())
            }
            TAG_INT => {
                let bytes: [u8; 8] = payload
                    .try_into()
                    .map_err(|_| CodecError::BadInteger(payload.len()))?;
                Value::Int(i64::from_le_bytes(bytes))
            }
            TAG_COMPOSITE => Value::Composite(decode_at(payload, depth + 1)?),
            other => return Err(CodecError::UnknownValueTag(other)),
        };
        fields.push(Field { kind, value });
        data = tail;
    }
    Ok(fields)
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[..4]);
    u32::from_le_bytes(buf)
}

/// Encode a complete record: header plus body.
pub fn encode_object(object_type: ObjectType, fields: &[Field]) -> CodecResult<Vec<u8>> {
    let body = encode(fields)?;
    let mut out = Vec::with_capacity(HEADER_LEN + body.len());
    out.extend_from_slice(MAGIC);
    out.push(FORMAT_VERSION);
    out.push(object_type.tag());
    push_len(&mut out, body.len())?;
    out.extend_from_slice(&crc32fast::hash(&body).to_le_bytes());
    out.extend_from_slice(&body);
    Ok(out)
}

/// Decode a complete record, verifying its header and checksum.
pub fn decode_object(data: &[u8]) -> CodecResult<(ObjectType, Vec<Field>)> {
    if data.len() < HEADER_LEN {
        return Err(CodecError::Truncated {
            needed: HEADER_LEN,
            available: data.len(),
        });
    }
    if &data[0..4] != MAGIC {
        return Err(CodecError::BadMagic);
    }
    if data[4] != FORMAT_VERSION {
        return Err(CodecError::UnsupportedVersion(data[4]));
    }
    let object_type = ObjectType::from_tag(data[5]).ok_or(CodecError::UnknownObjectType(data[5]))?;
    let declared = read_u32(&data[6..10]) as usize;
    let expected = read_u32(&data[10..14]);
    let body = &data[HEADER_LEN..];
    if body.len() != declared {
        return Err(CodecError::LengthMismatch {
            declared,
            actual: body.len(),
        });
    }
    let computed = crc32fast::hash(body);
    if computed != expected {
        return Err(CodecError::ChecksumMismatch { expected, computed });
    }
    Ok((object_type, decode(body)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample() -> Vec<Field> {
        vec![
            Field::string(FieldKind::Id, "dir-1"),
            Field::string(FieldKind::FileName, "name"),
            Field::string(FieldKind::DirRef, "dir1"),
            Field::string(FieldKind::DirRef, "dir2"),
            Field::composite(
                FieldKind::File,
                vec![
                    Field::string(FieldKind::FileName, "f"),
                    Field::int(FieldKind::Size, -5),
                ],
            ),
        ]
    }

    // ------------------------------------------------------------------
    // Body encoding
    // ------------------------------------------------------------------

    #[test]
    fn empty_body_roundtrips() {
        assert!(encode(&[]).unwrap().is_empty());
        assert!(decode(&[]).unwrap().is_empty());
    }

    #[test]
    fn sample_roundtrips() {
        let fields = sample();
        assert_eq!(decode(&encode(&fields).unwrap()).unwrap(), fields);
    }

    #[test]
    fn string_field_layout() {
        let bytes = encode(&[Field::string(FieldKind::FileName, "ab")]).unwrap();
        assert_eq!(bytes, vec![2, TAG_STR, 2, 0, 0, 0, b'a', b'b']);
    }

    #[test]
    fn int_field_layout() {
        let bytes = encode(&[Field::int(FieldKind::Started, 1)]).unwrap();
        assert_eq!(bytes, vec![8, TAG_INT, 8, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn truncated_payload_rejected() {
        let mut bytes = encode(&sample()).unwrap();
        bytes.pop();
        assert!(matches!(decode(&bytes), Err(CodecError::Truncated { .. })));
    }

    #[test]
    fn truncated_field_header_rejected() {
        assert!(matches!(
            decode(&[2, TAG_STR, 0]),
            Err(CodecError::Truncated { .. })
        ));
    }

    #[test]
    fn unknown_kind_rejected() {
        assert_eq!(
            decode(&[99, TAG_STR, 0, 0, 0, 0]),
            Err(CodecError::UnknownFieldKind(99))
        );
    }

    #[test]
    fn unknown_value_tag_rejected() {
        assert_eq!(
            decode(&[2, 9, 0, 0, 0, 0]),
            Err(CodecError::UnknownValueTag(9))
        );
    }

    #[test]
    fn short_integer_rejected() {
        assert_eq!(
            decode(&[8, TAG_INT, 4, 0, 0, 0, 1, 2, 3, 4]),
            Err(CodecError::BadInteger(4))
        );
    }

    #[test]
    fn invalid_utf8_rejected() {
        assert_eq!(
            decode(&[2, TAG_STR, 2, 0, 0, 0, 0xff, 0xfe]),
            Err(CodecError::InvalidUtf8)
        );
    }

    #[test]
    fn nesting_limit_enforced() {
        let mut field = Field::string(FieldKind::FileName, "leaf");
        for _ in 0..MAX_DEPTH {
            field = Field::composite(FieldKind::File, vec![field]);
        }
        assert_eq!(encode(&[field]), Err(CodecError::TooDeep(MAX_DEPTH)));

        let mut ok = Field::string(FieldKind::FileName, "leaf");
        for _ in 0..MAX_DEPTH - 1 {
            ok = Field::composite(FieldKind::File, vec![ok]);
        }
        let bytes = encode(&[ok.clone()]).unwrap();
        assert_eq!(decode(&bytes).unwrap(), vec![ok]);
    }

    // ------------------------------------------------------------------
    // Record framing
    // ------------------------------------------------------------------

    #[test]
    fn record_roundtrips() {
        let fields = sample();
        let bytes = encode_object(ObjectType::Dir, &fields).unwrap();
        assert_eq!(&bytes[..4], MAGIC);
        let (ty, decoded) = decode_object(&bytes).unwrap();
        assert_eq!(ty, ObjectType::Dir);
        assert_eq!(decoded, fields);
    }

    #[test]
    fn short_record_rejected() {
        assert!(matches!(
            decode_object(b"GVOB"),
            Err(CodecError::Truncated { .. })
        ));
    }

    #[test]
    fn bad_magic_rejected() {
        let mut bytes = encode_object(ObjectType::Dir, &sample()).unwrap();
        bytes[0] = b'X';
        assert_eq!(decode_object(&bytes), Err(CodecError::BadMagic));
    }

    #[test]
    fn unknown_version_rejected() {
        let mut bytes = encode_object(ObjectType::Dir, &sample()).unwrap();
        bytes[4] = 2;
        assert_eq!(decode_object(&bytes), Err(CodecError::UnsupportedVersion(2)));
    }

    #[test]
    fn unknown_object_type_rejected() {
        let mut bytes = encode_object(ObjectType::Dir, &sample()).unwrap();
        bytes[5] = 0xee;
        assert_eq!(decode_object(&bytes), Err(CodecError::UnknownObjectType(0xee)));
    }

    #[test]
    fn trailing_garbage_rejected() {
        let mut bytes = encode_object(ObjectType::Dir, &sample()).unwrap();
        bytes.push(0);
        assert!(matches!(
            decode_object(&bytes),
            Err(CodecError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn flipped_body_bit_rejected() {
        let mut bytes = encode_object(ObjectType::Dir, &sample()).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        assert!(matches!(
            decode_object(&bytes),
            Err(CodecError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn length_prefix_caps_payloads_below_4_gib() {
        let mut out = Vec::new();
        push_len(&mut out, u32::MAX as usize).unwrap();
        assert_eq!(out, u32::MAX.to_le_bytes());

        let over = u32::MAX as usize + 1;
        assert_eq!(push_len(&mut out, over), Err(CodecError::TooLarge(over)));
    }

    // ------------------------------------------------------------------
    // Round-trip law
    // ------------------------------------------------------------------

    fn arb_kind() -> impl Strategy<Value = FieldKind> {
        prop::sample::select(FieldKind::ALL.to_vec())
    }

    fn arb_field() -> impl Strategy<Value = Field> {
        let leaf = prop_oneof![
            (arb_kind(), ".{0,24}").prop_map(|(k, s)| Field::string(k, s)),
            (arb_kind(), any::<i64>()).prop_map(|(k, n)| Field::int(k, n)),
        ];
        leaf.prop_recursive(4, 32, 6, |inner| {
            (arb_kind(), prop::collection::vec(inner, 0..6))
                .prop_map(|(k, children)| Field::composite(k, children))
        })
    }

    proptest! {
        #[test]
        fn decode_inverts_encode(fields in prop::collection::vec(arb_field(), 0..12)) {
            let bytes = encode_object(ObjectType::FileGroup, &fields).unwrap();
            let (ty, decoded) = decode_object(&bytes).unwrap();
            prop_assert_eq!(ty, ObjectType::FileGroup);
            prop_assert_eq!(decoded, fields);
        }

        #[test]
        fn decode_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..64)) {
            let _ = decode(&bytes);
            let _ = decode_object(&bytes);
        }
    }
}
