//! DNS wire-format helpers: domain names and minimal queries.

use crate::EncodingError;
use bytes::{BufMut, Bytes, BytesMut};

/// Maximum length of a single label
pub const MAX_LABEL_LEN: usize = 63;

/// Maximum length of an encoded name, root label included
pub const MAX_NAME_LEN: usize = 255;

/// Size of the DNS message header
pub const DNS_HEADER_SIZE: usize = 12;

/// Default transaction id of generated queries
pub const DEFAULT_QUERY_ID: u16 = 0x1234;

/// QTYPE A
pub const QTYPE_A: u16 = 1;

/// QCLASS IN
pub const QCLASS_IN: u16 = 1;

/// Recursion desired flag (high byte of the flags word)
const FLAG_RD: u16 = 0x0100;

/// Append `name` as length-prefixed labels plus the root label.
///
/// A single trailing dot is accepted; `""` and `"."` encode the root name.
/// On error `buf` is left as it was.
pub fn put_name(name: &str, buf: &mut BytesMut) -> Result<(), EncodingError> {
    let start = buf.len();
    let result = put_labels(name, buf).and_then(|()| {
        let encoded = buf.len() - start;
        if encoded > MAX_NAME_LEN {
            Err(EncodingError::NameTooLong(encoded))
        } else {
            Ok(())
        }
    });
    if result.is_err() {
        buf.truncate(start);
    }
    result
}

fn put_labels(name: &str, buf: &mut BytesMut) -> Result<(), EncodingError> {
    let trimmed = name.strip_suffix('.').unwrap_or(name);

    if !trimmed.is_empty() {
        for label in trimmed.split('.') {
            if label.is_empty() {
                return Err(EncodingError::EmptyLabel(name.to_string()));
            }
            if !label.is_ascii() {
                return Err(EncodingError::NonAscii(label.to_string()));
            }
            if label.len() > MAX_LABEL_LEN {
                return Err(EncodingError::LabelTooLong {
                    label: label.to_string(),
                    len: label.len(),
                });
            }
            buf.put_u8(label.len() as u8);
            buf.put_slice(label.as_bytes());
        }
    }
    buf.put_u8(0);
    Ok(())
}

/// Render wire-format labels as a dotted name.
///
/// Returns `None` when the labels do not end exactly at the root label.
pub fn decode_name(wire: &[u8]) -> Option<String> {
    let mut labels = Vec::new();
    let mut rest = wire;
    loop {
        let (&len, tail) = rest.split_first()?;
        let len = usize::from(len);
        if len == 0 {
            if !tail.is_empty() {
                return None;
            }
            break;
        }
        if len > MAX_LABEL_LEN || tail.len() < len {
            return None;
        }
        labels.push(String::from_utf8_lossy(&tail[..len]).into_owned());
        rest = &tail[len..];
    }

    if labels.is_empty() {
        Some(".".to_string())
    } else {
        Some(labels.join("."))
    }
}

/// Encode a domain name in DNS wire format
pub fn encode_name(name: &str) -> Result<Bytes, EncodingError> {
    let mut buf = BytesMut::with_capacity(name.len() + 2);
    put_name(name, &mut buf)?;
    Ok(buf.freeze())
}

/// Build a single-question query with the default id, type A, class IN
pub fn build_query(name: &str) -> Result<Bytes, EncodingError> {
    build_query_with(name, DEFAULT_QUERY_ID, QTYPE_A, QCLASS_IN)
}

/// Build a single-question query: 12-byte header with RD set and
/// QDCOUNT = 1, then QNAME, QTYPE and QCLASS.
pub fn build_query_with(
    name: &str,
    id: u16,
    qtype: u16,
    qclass: u16,
) -> Result<Bytes, EncodingError> {
    let mut buf = BytesMut::with_capacity(DNS_HEADER_SIZE + name.len() + 6);

    buf.put_u16(id);
    buf.put_u16(FLAG_RD);
    buf.put_u16(1); // QDCOUNT
    buf.put_u16(0); // ANCOUNT
    buf.put_u16(0); // NSCOUNT
    buf.put_u16(0); // ARCOUNT

    put_name(name, &mut buf)?;

    buf.put_u16(qtype);
    buf.put_u16(qclass);

    Ok(buf.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_example_com() {
        let encoded = encode_name("example.com").unwrap();
        assert_eq!(encoded.as_ref(), b"\x07example\x03com\x00");
    }

    #[test]
    fn test_trailing_dot_and_root() {
        assert_eq!(
            encode_name("example.com.").unwrap(),
            encode_name("example.com").unwrap()
        );
        assert_eq!(encode_name("").unwrap().as_ref(), &[0]);
        assert_eq!(encode_name(".").unwrap().as_ref(), &[0]);
    }

    #[test]
    fn test_label_limits() {
        let ok = "a".repeat(63);
        assert!(encode_name(&format!("{ok}.com")).is_ok());

        let long = "a".repeat(64);
        assert_eq!(
            encode_name(&format!("{long}.com")),
            Err(EncodingError::LabelTooLong {
                label: long.clone(),
                len: 64
            })
        );
    }

    #[test]
    fn test_malformed_names() {
        assert!(matches!(
            encode_name("a..b"),
            Err(EncodingError::EmptyLabel(_))
        ));
        assert!(matches!(
            encode_name(".leading"),
            Err(EncodingError::EmptyLabel(_))
        ));
        assert!(matches!(
            encode_name("bücher.example"),
            Err(EncodingError::NonAscii(_))
        ));
    }

    #[test]
    fn test_name_too_long() {
        // 5 labels of 63 bytes: 5 * 64 + 1 = 321 bytes encoded
        let label = "b".repeat(63);
        let name = vec![label.as_str(); 5].join(".");
        assert!(matches!(
            encode_name(&name),
            Err(EncodingError::NameTooLong(321))
        ));
    }

    #[test]
    fn test_failed_name_leaves_buffer_untouched() {
        let mut buf = BytesMut::from(&b"prefix"[..]);
        let long_label = format!("ok.{}", "a".repeat(64));

        for name in ["ok.a..b", "ok.bücher", long_label.as_str()] {
            assert!(put_name(name, &mut buf).is_err());
            assert_eq!(buf.as_ref(), b"prefix");
        }

        put_name("example.com", &mut buf).unwrap();
        assert_eq!(buf.as_ref(), b"prefix\x07example\x03com\x00");
    }

    #[test]
    fn test_decode_name() {
        assert_eq!(
            decode_name(b"\x07example\x03com\x00").as_deref(),
            Some("example.com")
        );
        assert_eq!(decode_name(b"\x00").as_deref(), Some("."));
        assert_eq!(decode_name(b"\x07example"), None);
        assert_eq!(decode_name(b"\x03com\x00\x01"), None);
        assert_eq!(decode_name(b""), None);
    }

    #[test]
    fn test_build_query_layout() {
        let query = build_query("example.com").unwrap();

        assert_eq!(&query[..2], &[0x12, 0x34]);
        assert_eq!(&query[2..4], &[0x01, 0x00]);
        assert_eq!(&query[4..6], &[0x00, 0x01]);
        assert_eq!(&query[6..12], &[0; 6]);
        assert_eq!(&query[12..25], b"\x07example\x03com\x00");
        assert_eq!(&query[25..], &[0x00, 0x01, 0x00, 0x01]);
    }

    #[test]
    fn test_build_query_rejects_long_label() {
        let name = format!("{}.example", "x".repeat(64));
        assert!(build_query(&name).is_err());
    }
}
