//! Compact binary model layout.
//!
//! ```text
//! header      magic "lMXE", size, type "GISM", version,
//!             num_outcomes, num_predicates, num_params,
//!             off_params, off_outcomes, off_predicates, 2 reserved words
//! PARM chunk  "PARM", chunk size, num_predicates, num_params,
//!             correction constant (f64), correction weight (f64),
//!             offsets[num_predicates + 1] (u32),
//!             num_params x (outcome u32, weight f64)
//! outcomes    CQDB dictionary, label -> outcome index
//! predicates  CQDB dictionary, label -> predicate index
//! ```
//!
//! All integers and floats are little-endian; chunks start on 4-byte
//! boundaries.

use std::io::{Cursor, Seek, SeekFrom, Write};

use bstr::ByteSlice;
use cqdb::{CQDBWriter, CQDB};

use crate::dictionary::Dictionary;
use crate::error::{Error, Result};
use crate::model::MaxentModel;
use crate::parameters::Parameters;

pub(crate) const MAGIC: &[u8; 4] = b"lMXE";
const MODEL_TYPE: &[u8; 4] = b"GISM";
const VERSION: u32 = 100;
const HEADER_SIZE: usize = 48;
const PARAMS_CHUNK_HEADER: usize = 32;
const PARAM_SIZE: usize = 12;

#[inline]
fn unpack_u32(buf: &[u8], at: usize) -> Result<u32> {
    buf.get(at..at + 4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or_else(|| Error::invalid_model("not enough data for unpacking u32"))
}

#[inline]
fn unpack_f64(buf: &[u8], at: usize) -> Result<f64> {
    buf.get(at..at + 8)
        .map(|b| f64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
        .ok_or_else(|| Error::invalid_model("not enough data for unpacking f64"))
}

fn to_u32(n: usize, what: &str) -> Result<u32> {
    u32::try_from(n).map_err(|_| Error::invalid_model(format!("{} exceeds u32::MAX", what)))
}

/// Align the stream position to a 4-byte boundary with zero padding.
fn align_to_u32(out: &mut Cursor<Vec<u8>>) -> Result<()> {
    let mut pos = out.stream_position()?;
    while pos % 4 != 0 {
        out.write_all(&[0])?;
        pos += 1;
    }
    Ok(())
}

fn write_cqdb(out: &mut Cursor<Vec<u8>>, dict: &Dictionary) -> Result<()> {
    // The database is flushed when the writer is dropped at the end of
    // this scope.
    let mut writer = CQDBWriter::new(out)?;
    for (s, id) in dict.iter() {
        writer.put(s, id)?;
    }
    Ok(())
}

fn write_header(
    out: &mut Cursor<Vec<u8>>,
    model: &MaxentModel,
    size: u32,
    offsets: [u32; 3],
) -> Result<()> {
    out.write_all(MAGIC)?;
    out.write_all(&size.to_le_bytes())?;
    out.write_all(MODEL_TYPE)?;
    out.write_all(&VERSION.to_le_bytes())?;
    out.write_all(&to_u32(model.num_outcomes(), "number of outcomes")?.to_le_bytes())?;
    out.write_all(&to_u32(model.num_predicates(), "number of predicates")?.to_le_bytes())?;
    let num_params = model.parameters().num_parameters();
    out.write_all(&to_u32(num_params, "number of parameters")?.to_le_bytes())?;
    for off in offsets {
        out.write_all(&off.to_le_bytes())?;
    }
    out.write_all(&0u32.to_le_bytes())?;
    out.write_all(&0u32.to_le_bytes())?;
    Ok(())
}

fn write_params(out: &mut Cursor<Vec<u8>>, params: &Parameters) -> Result<()> {
    let num_predicates = params.num_predicates();
    let num_params = params.num_parameters();
    let chunk_size = PARAMS_CHUNK_HEADER as u64
        + 4 * (num_predicates as u64 + 1)
        + PARAM_SIZE as u64 * num_params as u64;
    let chunk_size = u32::try_from(chunk_size)
        .map_err(|_| Error::invalid_model("parameter chunk size exceeds u32::MAX"))?;

    out.write_all(b"PARM")?;
    out.write_all(&chunk_size.to_le_bytes())?;
    out.write_all(&to_u32(num_predicates, "number of predicates")?.to_le_bytes())?;
    out.write_all(&to_u32(num_params, "number of parameters")?.to_le_bytes())?;
    out.write_all(&params.correction_constant().to_le_bytes())?;
    out.write_all(&params.correction_weight().to_le_bytes())?;
    for &off in params.offsets() {
        out.write_all(&to_u32(off, "parameter offset")?.to_le_bytes())?;
    }
    for (&oid, &weight) in params.flat_outcomes().iter().zip(params.flat_weights()) {
        out.write_all(&oid.to_le_bytes())?;
        out.write_all(&weight.to_le_bytes())?;
    }
    Ok(())
}

/// Serialize a model to the binary layout
pub fn to_bytes(model: &MaxentModel) -> Result<Vec<u8>> {
    let mut out = Cursor::new(Vec::new());

    // Header is rewritten once the offsets are known
    write_header(&mut out, model, 0, [0; 3])?;

    let off_params = to_u32(out.stream_position()? as usize, "file position")?;
    write_params(&mut out, model.parameters())?;

    align_to_u32(&mut out)?;
    let off_outcomes = to_u32(out.stream_position()? as usize, "file position")?;
    write_cqdb(&mut out, model.outcomes())?;

    align_to_u32(&mut out)?;
    let off_predicates = to_u32(out.stream_position()? as usize, "file position")?;
    write_cqdb(&mut out, model.predicates())?;

    let size = to_u32(out.get_ref().len(), "file size")?;
    out.seek(SeekFrom::Start(0))?;
    write_header(
        &mut out,
        model,
        size,
        [off_params, off_outcomes, off_predicates],
    )?;

    Ok(out.into_inner())
}

fn read_labels(buf: &[u8], offset: usize, count: usize, what: &str) -> Result<Dictionary> {
    let db = buf
        .get(offset..)
        .ok_or_else(|| Error::invalid_model(format!("{} table offset out of range", what)))?;
    let db = CQDB::new(db).map_err(|e| Error::invalid_model(format!("{} table: {}", what, e)))?;
    let mut dict = Dictionary::new();
    for i in 0..count {
        let label = db
            .to_str(i as u32)
            .and_then(|s| s.to_str().ok())
            .ok_or_else(|| Error::invalid_model(format!("missing {} label #{}", what, i)))?;
        if dict.get_or_insert(label) as usize != i {
            return Err(Error::invalid_model(format!(
                "duplicate {} label {:?}",
                what, label
            )));
        }
    }
    Ok(dict)
}

/// Load a model from the binary layout
pub fn from_bytes(buf: &[u8]) -> Result<MaxentModel> {
    if buf.len() < HEADER_SIZE {
        return Err(Error::invalid_model("invalid model format"));
    }
    if &buf[0..4] != MAGIC {
        return Err(Error::invalid_model("invalid file format, magic mismatch"));
    }
    let size = unpack_u32(buf, 4)? as usize;
    if size > buf.len() {
        return Err(Error::invalid_model("truncated model file"));
    }
    if &buf[8..12] != MODEL_TYPE {
        return Err(Error::invalid_model("unsupported model type"));
    }
    let version = unpack_u32(buf, 12)?;
    if version != VERSION {
        return Err(Error::invalid_model(format!(
            "unsupported model version {}",
            version
        )));
    }
    let num_outcomes = unpack_u32(buf, 16)? as usize;
    let num_predicates = unpack_u32(buf, 20)? as usize;
    let num_params = unpack_u32(buf, 24)? as usize;
    let off_params = unpack_u32(buf, 28)? as usize;
    let off_outcomes = unpack_u32(buf, 32)? as usize;
    let off_predicates = unpack_u32(buf, 36)? as usize;

    if buf.get(off_params..off_params + 4) != Some(&b"PARM"[..]) {
        return Err(Error::invalid_model("missing parameter chunk"));
    }
    if unpack_u32(buf, off_params + 8)? as usize != num_predicates
        || unpack_u32(buf, off_params + 12)? as usize != num_params
    {
        return Err(Error::invalid_model("parameter chunk disagrees with header"));
    }
    let correction_constant = unpack_f64(buf, off_params + 16)?;
    let correction_weight = unpack_f64(buf, off_params + 24)?;

    let needed = 4 * (num_predicates as u64 + 1) + PARAM_SIZE as u64 * num_params as u64;
    if (off_params + PARAMS_CHUNK_HEADER) as u64 + needed > buf.len() as u64 {
        return Err(Error::invalid_model("truncated parameter chunk"));
    }

    let mut index = off_params + PARAMS_CHUNK_HEADER;
    let mut offsets = Vec::with_capacity(num_predicates + 1);
    for _ in 0..=num_predicates {
        offsets.push(unpack_u32(buf, index)? as usize);
        index += 4;
    }
    let mut outcomes = Vec::with_capacity(num_params);
    let mut weights = Vec::with_capacity(num_params);
    for _ in 0..num_params {
        outcomes.push(unpack_u32(buf, index)?);
        weights.push(unpack_f64(buf, index + 4)?);
        index += PARAM_SIZE;
    }
    let params = Parameters::from_parts(
        num_outcomes,
        offsets,
        outcomes,
        weights,
        correction_constant,
        correction_weight,
    )?;

    let outcome_labels = read_labels(buf, off_outcomes, num_outcomes, "outcome")?;
    let predicate_labels = read_labels(buf, off_predicates, num_predicates, "predicate")?;
    MaxentModel::new(outcome_labels, predicate_labels, params)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_model() -> MaxentModel {
        let outcomes: Dictionary = ["B-PER", "I-PER", "O"].iter().collect();
        let predicates: Dictionary = ["w=John", "cap", "prev=B-PER"].iter().collect();
        let params = Parameters::from_parts(
            3,
            vec![0, 2, 3, 5],
            vec![0, 2, 0, 1, 2],
            vec![1.25, -0.5, 0.75, 2.0, -1.0 / 3.0],
            3.0,
            0.125,
        )
        .unwrap();
        MaxentModel::new(outcomes, predicates, params).unwrap()
    }

    #[test]
    fn test_binary_layout_header() {
        let buf = to_bytes(&small_model()).unwrap();
        assert_eq!(&buf[0..4], b"lMXE");
        assert_eq!(unpack_u32(&buf, 4).unwrap() as usize, buf.len());
        assert_eq!(&buf[8..12], b"GISM");
        assert_eq!(unpack_u32(&buf, 12).unwrap(), 100);
        assert_eq!(unpack_u32(&buf, 16).unwrap(), 3);
        assert_eq!(unpack_u32(&buf, 20).unwrap(), 3);
        assert_eq!(unpack_u32(&buf, 24).unwrap(), 5);
        assert_eq!(unpack_u32(&buf, 28).unwrap() as usize, HEADER_SIZE);
        assert_eq!(unpack_u32(&buf, 32).unwrap() % 4, 0);
    }

    #[test]
    fn test_binary_round_trip_is_exact() {
        let model = small_model();
        let loaded = from_bytes(&to_bytes(&model).unwrap()).unwrap();
        assert_eq!(loaded.parameters(), model.parameters());
        assert_eq!(loaded.outcomes(), model.outcomes());
        assert_eq!(loaded.predicates(), model.predicates());
        let ctx = ["w=John", "cap"];
        assert_eq!(loaded.eval(&ctx), model.eval(&ctx));
    }

    #[test]
    fn test_invalid_model() {
        assert!(from_bytes(b"").is_err());

        let mut buf = to_bytes(&small_model()).unwrap();
        buf[0] = b'L';
        let err = from_bytes(&buf).unwrap_err();
        assert!(err.to_string().contains("magic"));

        let mut buf = to_bytes(&small_model()).unwrap();
        buf[12..16].copy_from_slice(&99u32.to_le_bytes());
        let err = from_bytes(&buf).unwrap_err();
        assert!(err.to_string().contains("version 99"));

        let buf = to_bytes(&small_model()).unwrap();
        assert!(from_bytes(&buf[..buf.len() / 2]).is_err());
    }
}
