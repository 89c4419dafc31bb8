// src/io/numpy.rs
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Minimal `.npy` reader/writer: enough of the format to round-trip the
//! dense matrices (features, dense models, prediction score dumps) this
//! crate exchanges with NumPy-based tooling. Reads versions 1-3; always
//! writes version 3.0 with a 64-byte-aligned, `u32`-length header,
//! matching `original_source`'s `write_npy_header`.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use ndarray::Array2;

use crate::error::{DismecError, Result};
use crate::types::Real;

const MAGIC: &[u8; 6] = b"\x93NUMPY";
const HEADER_ALIGN: usize = 64;

/// Supported element dtypes, little-endian only (`<` byte order).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DType {
    F4,
    F8,
    I4,
    I8,
    U4,
    U8,
}

impl DType {
    fn descr(self) -> &'static str {
        match self {
            DType::F4 => "<f4",
            DType::F8 => "<f8",
            DType::I4 => "<i4",
            DType::I8 => "<i8",
            DType::U4 => "<u4",
            DType::U8 => "<u8",
        }
    }

    fn itemsize(self) -> usize {
        match self {
            DType::F4 | DType::I4 | DType::U4 => 4,
            DType::F8 | DType::I8 | DType::U8 => 8,
        }
    }

    fn from_descr(descr: &str) -> Result<Self> {
        match descr {
            "<f4" => Ok(DType::F4),
            "<f8" => Ok(DType::F8),
            "<i4" => Ok(DType::I4),
            "<i8" => Ok(DType::I8),
            "<u4" => Ok(DType::U4),
            "<u8" => Ok(DType::U8),
            other => Err(DismecError::parse("npy header", format!("unsupported dtype descr {other}"))),
        }
    }
}

/// A parsed `.npy` payload: dtype, shape and raw little-endian bytes.
pub struct NpyArray {
    pub dtype: DType,
    pub shape: Vec<usize>,
    pub data: Vec<u8>,
}

impl NpyArray {
    /// Convert every element to `f64`, regardless of the on-disk dtype.
    pub fn to_f64(&self) -> Vec<Real> {
        let n: usize = self.shape.iter().product();
        let mut out = Vec::with_capacity(n);
        let item = self.dtype.itemsize();
        for chunk in self.data.chunks_exact(item) {
            let v = match self.dtype {
                DType::F4 => f32::from_le_bytes(chunk.try_into().unwrap()) as Real,
                DType::F8 => f64::from_le_bytes(chunk.try_into().unwrap()),
                DType::I4 => i32::from_le_bytes(chunk.try_into().unwrap()) as Real,
                DType::I8 => i64::from_le_bytes(chunk.try_into().unwrap()) as Real,
                DType::U4 => u32::from_le_bytes(chunk.try_into().unwrap()) as Real,
                DType::U8 => u64::from_le_bytes(chunk.try_into().unwrap()) as Real,
            };
            out.push(v);
        }
        out
    }

    pub fn to_array2(&self) -> Result<Array2<Real>> {
        if self.shape.len() != 2 {
            return Err(DismecError::shape(format!("expected a 2-D array, got shape {:?}", self.shape)));
        }
        Array2::from_shape_vec((self.shape[0], self.shape[1]), self.to_f64())
            .map_err(|e| DismecError::shape(e.to_string()))
    }
}

/// Find the quoted value that follows a dict key, accepting either `'` or
/// `"` as the quote character (NumPy itself always writes `'`, but the
/// format allows either and spec scenarios use `"`).
fn find_quoted_value<'a>(header: &'a str, key: &str) -> Result<&'a str> {
    let key_start = header.find(key).ok_or_else(|| DismecError::parse("npy header", format!("missing {key}")))?;
    let after_key = &header[key_start + key.len()..];
    let colon = after_key.find(':').ok_or_else(|| DismecError::parse("npy header", format!("malformed {key}")))?;
    let after_colon = &after_key[colon + 1..];
    let quote = after_colon
        .find(['\'', '"'])
        .ok_or_else(|| DismecError::parse("npy header", format!("malformed {key}")))?;
    let quote_char = after_colon.as_bytes()[quote] as char;
    let value_start = quote + 1;
    let value_end = after_colon[value_start..]
        .find(quote_char)
        .ok_or_else(|| DismecError::parse("npy header", format!("malformed {key}")))?
        + value_start;
    Ok(&after_colon[value_start..value_end])
}

fn parse_header_dict(header: &str) -> Result<(DType, Vec<usize>)> {
    let descr = find_quoted_value(header, "descr")?;
    let dtype = DType::from_descr(descr.trim())?;

    let shape_start = header.find("shape").ok_or_else(|| DismecError::parse("npy header", "missing 'shape'"))?;
    let paren_start = header[shape_start..]
        .find('(')
        .ok_or_else(|| DismecError::parse("npy header", "malformed shape"))?
        + shape_start;
    let paren_end = header[paren_start..]
        .find(')')
        .ok_or_else(|| DismecError::parse("npy header", "malformed shape"))?
        + paren_start;
    let shape: Vec<usize> = header[paren_start + 1..paren_end]
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<usize>().map_err(|e| DismecError::parse("npy shape", e.to_string())))
        .collect::<Result<_>>()?;

    Ok((dtype, shape))
}

pub fn read_npy(path: impl AsRef<Path>) -> Result<NpyArray> {
    let mut file = File::open(path)?;
    let mut magic = [0u8; 6];
    file.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(DismecError::parse("npy header", "bad magic bytes"));
    }

    let mut version = [0u8; 2];
    file.read_exact(&mut version)?;
    let major = version[0];

    let header_len = if major == 1 {
        let mut buf = [0u8; 2];
        file.read_exact(&mut buf)?;
        u16::from_le_bytes(buf) as usize
    } else {
        let mut buf = [0u8; 4];
        file.read_exact(&mut buf)?;
        u32::from_le_bytes(buf) as usize
    };

    let mut header_bytes = vec![0u8; header_len];
    file.read_exact(&mut header_bytes)?;
    let header = String::from_utf8_lossy(&header_bytes);
    let (dtype, shape) = parse_header_dict(&header)?;

    let elem_count: usize = shape.iter().product();
    let mut data = vec![0u8; elem_count * dtype.itemsize()];
    file.read_exact(&mut data)?;

    Ok(NpyArray { dtype, shape, data })
}

pub fn write_npy(path: impl AsRef<Path>, array: &Array2<Real>) -> Result<()> {
    let shape = array.shape();
    let mut header = format!(
        "{{'descr': '{}', 'fortran_order': False, 'shape': ({}, {}), }}",
        DType::F8.descr(),
        shape[0],
        shape[1]
    );

    let prefix_len = MAGIC.len() + 2 + 4;
    let unpadded_total = prefix_len + header.len() + 1;
    let padded_total = unpadded_total.div_ceil(HEADER_ALIGN) * HEADER_ALIGN;
    let pad = padded_total - unpadded_total;
    header.push_str(&" ".repeat(pad));
    header.push('\n');

    let mut file = File::create(path)?;
    file.write_all(MAGIC)?;
    file.write_all(&[3, 0])?;
    file.write_all(&(header.len() as u32).to_le_bytes())?;
    file.write_all(header.as_bytes())?;

    for value in array.iter() {
        file.write_all(&value.to_le_bytes())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tempfile::NamedTempFile;

    proptest! {
        #[test]
        fn round_trips_arbitrary_dense_arrays(
            rows in 1usize..6,
            cols in 1usize..6,
            seed in any::<u32>(),
        ) {
            let values: Vec<f64> = (0..rows * cols)
                .map(|i| ((seed.wrapping_add(i as u32)) as f64 * 0.125).sin())
                .collect();
            let array = Array2::from_shape_vec((rows, cols), values).unwrap();

            let file = NamedTempFile::new().unwrap();
            write_npy(file.path(), &array).unwrap();
            let loaded = read_npy(file.path()).unwrap().to_array2().unwrap();

            prop_assert_eq!(loaded, array);
        }
    }

    #[test]
    fn round_trips_dense_array() {
        let array = Array2::from_shape_vec((2, 3), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let file = NamedTempFile::new().unwrap();
        write_npy(file.path(), &array).unwrap();

        let loaded = read_npy(file.path()).unwrap();
        assert_eq!(loaded.dtype, DType::F8);
        assert_eq!(loaded.shape, vec![2, 3]);
        assert_eq!(loaded.to_array2().unwrap(), array);
    }

    #[test]
    fn rejects_bad_magic() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), b"not an npy file").unwrap();
        assert!(read_npy(file.path()).is_err());
    }

    #[test]
    fn writes_version_3_with_u32_header_length() {
        let array = Array2::from_shape_vec((1, 1), vec![1.0]).unwrap();
        let file = NamedTempFile::new().unwrap();
        write_npy(file.path(), &array).unwrap();

        let bytes = std::fs::read(file.path()).unwrap();
        assert_eq!(&bytes[0..6], MAGIC);
        assert_eq!(&bytes[6..8], &[3, 0]);
        let header_len = u32::from_le_bytes(bytes[8..12].try_into().unwrap()) as usize;
        assert_eq!(bytes.len(), 12 + header_len + 8);
        assert_eq!((12 + header_len) % HEADER_ALIGN, 0);
    }

    #[test]
    fn parses_double_quoted_header() {
        let mut header = "{\"descr\": \"<f8\", \"fortran_order\": False, \"shape\": (2, 2), }".to_string();
        let prefix_len = MAGIC.len() + 2 + 4;
        let unpadded_total = prefix_len + header.len() + 1;
        let padded_total = unpadded_total.div_ceil(HEADER_ALIGN) * HEADER_ALIGN;
        header.push_str(&" ".repeat(padded_total - unpadded_total));
        header.push('\n');

        let mut bytes = Vec::new();
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&[3, 0]);
        bytes.extend_from_slice(&(header.len() as u32).to_le_bytes());
        bytes.extend_from_slice(header.as_bytes());
        bytes.extend_from_slice(&1.0f64.to_le_bytes());
        bytes.extend_from_slice(&2.0f64.to_le_bytes());
        bytes.extend_from_slice(&3.0f64.to_le_bytes());
        bytes.extend_from_slice(&4.0f64.to_le_bytes());

        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), &bytes).unwrap();

        let loaded = read_npy(file.path()).unwrap();
        assert_eq!(loaded.dtype, DType::F8);
        assert_eq!(loaded.shape, vec![2, 2]);
        assert_eq!(loaded.to_f64(), vec![1.0, 2.0, 3.0, 4.0]);
    }
}
