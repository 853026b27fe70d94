//! Little-endian byte-stream primitives for the on-disk format.
//!
//! Every structure in the library implements a `write_to`/`read_from` pair
//! that visits its fields in declaration order using these helpers, so the
//! emitted stream is deterministic and the two directions stay in lockstep.
//!
//! Encoding rules:
//! - plain integers: little-endian bytes of the underlying representation;
//! - `u128`: low 64 bits first, then high 64 bits;
//! - dynamic sequences: a `u64` element count followed by the elements.
//!
//! Readers validate lengths before allocating; a stream that declares an
//! implausible length fails with [`Error::CorruptInput`] instead of
//! attempting the allocation.

use crate::error::{Error, Result};
use std::io::{Read, Write};

/// Upper bound on any serialized sequence length. Streams declaring more
/// elements than this are rejected as corrupt.
const MAX_SEQUENCE_LEN: u64 = 1 << 48;

pub(crate) fn write_u16<W: Write>(writer: &mut W, x: u16) -> Result<()> {
    writer.write_all(&x.to_le_bytes())?;
    Ok(())
}

pub(crate) fn read_u16<R: Read>(reader: &mut R) -> Result<u16> {
    let mut buf = [0u8; 2];
    reader.read_exact(&mut buf)?;
    Ok(u16::from_le_bytes(buf))
}

pub(crate) fn write_u64<W: Write>(writer: &mut W, x: u64) -> Result<()> {
    writer.write_all(&x.to_le_bytes())?;
    Ok(())
}

pub(crate) fn read_u64<R: Read>(reader: &mut R) -> Result<u64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

pub(crate) fn write_i64<W: Write>(writer: &mut W, x: i64) -> Result<()> {
    writer.write_all(&x.to_le_bytes())?;
    Ok(())
}

pub(crate) fn read_i64<R: Read>(reader: &mut R) -> Result<i64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(i64::from_le_bytes(buf))
}

pub(crate) fn write_u128<W: Write>(writer: &mut W, x: u128) -> Result<()> {
    write_u64(writer, x as u64)?;
    write_u64(writer, (x >> 64) as u64)
}

pub(crate) fn read_u128<R: Read>(reader: &mut R) -> Result<u128> {
    let low = read_u64(reader)?;
    let high = read_u64(reader)?;
    Ok((high as u128) << 64 | low as u128)
}

fn read_sequence_len<R: Read>(reader: &mut R, what: &str) -> Result<usize> {
    let len = read_u64(reader)?;
    if len > MAX_SEQUENCE_LEN {
        return Err(Error::CorruptInput(format!(
            "{what} declares {len} elements"
        )));
    }
    Ok(len as usize)
}

pub(crate) fn write_vec_u64<W: Write>(writer: &mut W, xs: &[u64]) -> Result<()> {
    write_u64(writer, xs.len() as u64)?;
    for &x in xs {
        write_u64(writer, x)?;
    }
    Ok(())
}

pub(crate) fn read_vec_u64<R: Read>(reader: &mut R) -> Result<Vec<u64>> {
    let len = read_sequence_len(reader, "u64 sequence")?;
    let mut xs = Vec::with_capacity(len);
    for _ in 0..len {
        xs.push(read_u64(reader)?);
    }
    Ok(xs)
}

pub(crate) fn write_vec_i64<W: Write>(writer: &mut W, xs: &[i64]) -> Result<()> {
    write_u64(writer, xs.len() as u64)?;
    for &x in xs {
        write_i64(writer, x)?;
    }
    Ok(())
}

pub(crate) fn read_vec_i64<R: Read>(reader: &mut R) -> Result<Vec<i64>> {
    let len = read_sequence_len(reader, "i64 sequence")?;
    let mut xs = Vec::with_capacity(len);
    for _ in 0..len {
        xs.push(read_i64(reader)?);
    }
    Ok(xs)
}

pub(crate) fn write_vec_u16<W: Write>(writer: &mut W, xs: &[u16]) -> Result<()> {
    write_u64(writer, xs.len() as u64)?;
    for &x in xs {
        write_u16(writer, x)?;
    }
    Ok(())
}

pub(crate) fn read_vec_u16<R: Read>(reader: &mut R) -> Result<Vec<u16>> {
    let len = read_sequence_len(reader, "u16 sequence")?;
    let mut xs = Vec::with_capacity(len);
    for _ in 0..len {
        xs.push(read_u16(reader)?);
    }
    Ok(xs)
}
