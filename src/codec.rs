//! Binary protocol codec: request framing and response parsing for
//! `set_bulk`, `get_bulk`, `remove_bulk`, and `play_script`.
//!
//! All integers are big-endian. Every request is assembled into a single
//! contiguous [`BytesMut`] and handed to the stream as one `write_all` — the
//! wire never sees more than one write per logical request.

use bytes::{BufMut, BytesMut};

use crate::error::{Error, ProtocolError, Result};
use crate::record::{GetItem, GetRecord, Record, ScriptRecord};
use crate::stream::Stream;

pub const MB_SET_BULK: u8 = 0xb8;
pub const MB_GET_BULK: u8 = 0xba;
pub const MB_REMOVE_BULK: u8 = 0xb9;
pub const MB_PLAY_SCRIPT: u8 = 0xb4;
pub const MB_ERROR: u8 = 0xbf;

fn checked_len(bytes: &[u8], what: &str) -> Result<u32> {
    u32::try_from(bytes.len())
        .map_err(|_| Error::InvalidInput(format!("{} is too long ({} bytes)", what, bytes.len())))
}

/// Encode a `set_bulk` request frame.
pub fn encode_set_bulk(records: &[Record], flags: u32) -> Result<BytesMut> {
    let mut buf = BytesMut::with_capacity(9);
    buf.put_u8(MB_SET_BULK);
    buf.put_u32(flags);
    let count = u32::try_from(records.len())
        .map_err(|_| Error::InvalidInput("too many records in one set_bulk call".into()))?;
    buf.put_u32(count);

    for rec in records {
        let klen = checked_len(&rec.key, "key")?;
        let vlen = checked_len(&rec.value, "value")?;
        buf.put_u16(rec.db);
        buf.put_u32(klen);
        buf.put_u32(vlen);
        buf.put_i64(rec.expire);
        buf.put_slice(&rec.key);
        buf.put_slice(&rec.value);
    }

    Ok(buf)
}

/// Encode a `get_bulk` request frame.
pub fn encode_get_bulk(items: &[GetItem], flags: u32) -> Result<BytesMut> {
    let mut buf = BytesMut::with_capacity(9);
    buf.put_u8(MB_GET_BULK);
    buf.put_u32(flags);
    let count = u32::try_from(items.len())
        .map_err(|_| Error::InvalidInput("too many keys in one get_bulk call".into()))?;
    buf.put_u32(count);

    for item in items {
        let klen = checked_len(&item.key, "key")?;
        buf.put_u16(item.db);
        buf.put_u32(klen);
        buf.put_slice(&item.key);
    }

    Ok(buf)
}

/// Encode a `remove_bulk` request frame.
pub fn encode_remove_bulk(items: &[GetItem], flags: u32) -> Result<BytesMut> {
    let mut buf = BytesMut::with_capacity(9);
    buf.put_u8(MB_REMOVE_BULK);
    buf.put_u32(flags);
    let count = u32::try_from(items.len())
        .map_err(|_| Error::InvalidInput("too many keys in one remove_bulk call".into()))?;
    buf.put_u32(count);

    for item in items {
        let klen = checked_len(&item.key, "key")?;
        buf.put_u16(item.db);
        buf.put_u32(klen);
        buf.put_slice(&item.key);
    }

    Ok(buf)
}

/// Encode a `play_script` request frame.
pub fn encode_play_script(name: &[u8], records: &[ScriptRecord], flags: u32) -> Result<BytesMut> {
    let nlen = checked_len(name, "script name")?;
    let mut buf = BytesMut::with_capacity(9 + name.len());
    buf.put_u8(MB_PLAY_SCRIPT);
    buf.put_u32(flags);
    buf.put_u32(nlen);
    buf.put_slice(name);
    let count = u32::try_from(records.len())
        .map_err(|_| Error::InvalidInput("too many records in one play_script call".into()))?;
    buf.put_u32(count);

    for rec in records {
        let klen = checked_len(&rec.key, "key")?;
        let vlen = checked_len(&rec.value, "value")?;
        buf.put_u32(klen);
        buf.put_u32(vlen);
        buf.put_slice(&rec.key);
        buf.put_slice(&rec.value);
    }

    Ok(buf)
}

/// Decode a `hit_count` response shared by `set_bulk` and `remove_bulk`.
pub async fn decode_count_response(stream: &mut Stream, expect_magic: u8) -> Result<u32> {
    let head = stream.read_exact(1).await?;
    let magic = head[0];
    if magic == expect_magic {
        let body = stream.read_exact(4).await?;
        Ok(u32::from_be_bytes(body.try_into().unwrap()))
    } else if magic == MB_ERROR {
        Err(ProtocolError::ServerError.into())
    } else {
        Err(ProtocolError::UnknownMagic(magic).into())
    }
}

/// Decode a `get_bulk` response using the coalesced-read optimization: the
/// header of record `i+1` is read together with the payload of record `i`,
/// so decoding `n` records costs `n + 1` reads rather than `4*n`.
pub async fn decode_get_bulk_response(stream: &mut Stream) -> Result<Vec<GetRecord>> {
    let head = stream.read_exact(5).await?;
    let magic = head[0];
    if magic == MB_ERROR {
        return Err(ProtocolError::ServerError.into());
    }
    if magic != MB_GET_BULK {
        return Err(ProtocolError::UnknownMagic(magic).into());
    }

    let total = u32::from_be_bytes(head[1..5].try_into().unwrap()) as usize;
    let mut records = Vec::with_capacity(total);
    if total == 0 {
        return Ok(records);
    }

    // First record's header: u16 db; u32 klen; u32 vlen; i64 xt  (18 bytes).
    let mut header = stream.read_exact(18).await?;
    for _ in 0..total - 1 {
        let (db, klen, vlen, xt) = parse_get_header(&header);
        // Coalesced read: this record's payload plus the next header.
        let payload = stream.read_exact(klen + vlen + 18).await?;
        records.push(GetRecord {
            key: payload[..klen].to_vec(),
            value: payload[klen..klen + vlen].to_vec(),
            db,
            expire: xt,
        });
        header = payload[klen + vlen..].to_vec();
    }

    let (db, klen, vlen, xt) = parse_get_header(&header);
    let payload = stream.read_exact(klen + vlen).await?;
    records.push(GetRecord {
        key: payload[..klen].to_vec(),
        value: payload[klen..].to_vec(),
        db,
        expire: xt,
    });

    Ok(records)
}

fn parse_get_header(buf: &[u8]) -> (u16, usize, usize, i64) {
    let db = u16::from_be_bytes(buf[0..2].try_into().unwrap());
    let klen = u32::from_be_bytes(buf[2..6].try_into().unwrap()) as usize;
    let vlen = u32::from_be_bytes(buf[6..10].try_into().unwrap()) as usize;
    let xt = i64::from_be_bytes(buf[10..18].try_into().unwrap());
    (db, klen, vlen, xt)
}

/// Decode a `play_script` response, applying the same coalesced-read shape
/// as `get_bulk` but with the narrower `(klen, vlen)` record header.
pub async fn decode_play_script_response(stream: &mut Stream) -> Result<Vec<ScriptRecord>> {
    let head = stream.read_exact(5).await?;
    let magic = head[0];
    if magic == MB_ERROR {
        return Err(ProtocolError::ServerError.into());
    }
    if magic != MB_PLAY_SCRIPT {
        return Err(ProtocolError::UnknownMagic(magic).into());
    }

    let total = u32::from_be_bytes(head[1..5].try_into().unwrap()) as usize;
    let mut records = Vec::with_capacity(total);
    if total == 0 {
        return Ok(records);
    }

    // First record's header: u32 klen; u32 vlen (8 bytes).
    let mut header = stream.read_exact(8).await?;
    for _ in 0..total - 1 {
        let (klen, vlen) = parse_script_header(&header);
        let payload = stream.read_exact(klen + vlen + 8).await?;
        records.push(ScriptRecord {
            key: payload[..klen].to_vec(),
            value: payload[klen..klen + vlen].to_vec(),
        });
        header = payload[klen + vlen..].to_vec();
    }

    let (klen, vlen) = parse_script_header(&header);
    let payload = stream.read_exact(klen + vlen).await?;
    records.push(ScriptRecord {
        key: payload[..klen].to_vec(),
        value: payload[klen..].to_vec(),
    });

    Ok(records)
}

fn parse_script_header(buf: &[u8]) -> (usize, usize) {
    let klen = u32::from_be_bytes(buf[0..4].try_into().unwrap()) as usize;
    let vlen = u32::from_be_bytes(buf[4..8].try_into().unwrap()) as usize;
    (klen, vlen)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_bulk_header_round_trips() {
        let records = vec![Record::new(b"k".to_vec(), b"v".to_vec(), 3, 42)];
        let buf = encode_set_bulk(&records, FLAG_NOREPLY_FOR_TEST).unwrap();
        assert_eq!(buf[0], MB_SET_BULK);
        let flags = u32::from_be_bytes(buf[1..5].try_into().unwrap());
        assert_eq!(flags, FLAG_NOREPLY_FOR_TEST);
        let count = u32::from_be_bytes(buf[5..9].try_into().unwrap());
        assert_eq!(count, 1);
    }

    const FLAG_NOREPLY_FOR_TEST: u32 = 0x01;

    #[test]
    fn get_bulk_empty_request_has_zero_count() {
        let buf = encode_get_bulk(&[], 0).unwrap();
        assert_eq!(buf.len(), 9);
        let count = u32::from_be_bytes(buf[5..9].try_into().unwrap());
        assert_eq!(count, 0);
    }

    #[test]
    fn play_script_encodes_name_and_records() {
        let records = vec![ScriptRecord::new(b"k".to_vec(), b"v".to_vec())];
        let buf = encode_play_script(b"myproc", &records, 0).unwrap();
        assert_eq!(buf[0], MB_PLAY_SCRIPT);
        let nlen = u32::from_be_bytes(buf[5..9].try_into().unwrap());
        assert_eq!(nlen, 6);
        assert_eq!(&buf[9..15], b"myproc");
    }

    #[test]
    fn checked_len_accepts_normal_lengths() {
        assert!(checked_len(&[0u8; 4], "key").is_ok());
        assert!(matches!(checked_len(&[][..], "key"), Ok(0)));
    }
}
