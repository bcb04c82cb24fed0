//! Binary FBX node-record tree
//!
//! Layout: a 27-byte header (magic, two padding bytes, little-endian `u32`
//! version) followed by nested records. Each record starts with its end
//! offset, property count and property byte length (`u64` from version 7500,
//! `u32` before), then a length-prefixed name, its properties and finally its
//! child records closed by an all-zero null record.

use std::io::Read;

use flate2::read::ZlibDecoder;

pub const MAGIC: &[u8] = b"Kaydara FBX Binary  \x00";
const HEADER_LEN: usize = 27;

/// Upper bound on decoded array elements, guards against hostile counts
const MAX_ARRAY_LEN: usize = 1 << 28;

/// Deepest record nesting accepted, real exports stay well below it
const MAX_DEPTH: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub enum Property {
    Bool(bool),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    String(String),
    Raw(Vec<u8>),
    BoolArray(Vec<bool>),
    I32Array(Vec<i32>),
    I64Array(Vec<i64>),
    F32Array(Vec<f32>),
    F64Array(Vec<f64>),
}

impl Property {
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Self::I16(v) => Some(v as i64),
            Self::I32(v) => Some(v as i64),
            Self::I64(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Self::F32(v) => Some(v as f64),
            Self::F64(v) => Some(v),
            Self::I16(v) => Some(v as f64),
            Self::I32(v) => Some(v as f64),
            Self::I64(v) => Some(v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Raw(b) => Some(b),
            _ => None,
        }
    }

    pub fn to_f64_vec(&self) -> Option<Vec<f64>> {
        match self {
            Self::F64Array(v) => Some(v.clone()),
            Self::F32Array(v) => Some(v.iter().map(|&x| x as f64).collect()),
            _ => None,
        }
    }

    pub fn to_i32_vec(&self) -> Option<Vec<i32>> {
        match self {
            Self::I32Array(v) => Some(v.clone()),
            Self::I64Array(v) => Some(v.iter().map(|&x| x as i32).collect()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    pub name: String,
    pub properties: Vec<Property>,
    pub children: Vec<Record>,
}

impl Record {
    pub fn child(&self, name: &str) -> Option<&Record> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Record> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    pub fn prop(&self, index: usize) -> Option<&Property> {
        self.properties.get(index)
    }

    /// First property of the named child, the usual `Name: value` shape
    pub fn child_value(&self, name: &str) -> Option<&Property> {
        self.child(name).and_then(|c| c.prop(0))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub version: u32,
    pub records: Vec<Record>,
}

impl Document {
    pub fn record(&self, name: &str) -> Option<&Record> {
        self.records.iter().find(|r| r.name == name)
    }
}

pub fn is_binary_fbx(bytes: &[u8]) -> bool {
    bytes.starts_with(MAGIC)
}

/// Parses the whole record tree
pub fn parse_document(bytes: &[u8]) -> Result<Document, String> {
    if !is_binary_fbx(bytes) {
        return Err("missing binary FBX header".to_string());
    }
    if bytes.len() < HEADER_LEN {
        return Err("truncated header".to_string());
    }
    let version = u32::from_le_bytes([bytes[23], bytes[24], bytes[25], bytes[26]]);
    let mut cursor = Cursor {
        bytes,
        pos: HEADER_LEN,
        wide: version >= 7500,
    };

    let mut records = Vec::new();
    while cursor.remaining() > 0 {
        match cursor.read_record(0, bytes.len())? {
            Some(record) => records.push(record),
            None => break,
        }
    }
    Ok(Document { version, records })
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
    /// 64-bit record headers
    wide: bool,
}

impl<'a> Cursor<'a> {
    fn remaining(&self) -> usize {
        self.bytes.len().saturating_sub(self.pos)
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], String> {
        if len > self.remaining() {
            return Err(format!(
                "unexpected end of data at byte {} (wanted {})",
                self.pos, len
            ));
        }
        let bytes = self.bytes;
        let slice = &bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], String> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, String> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32, String> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    fn header_word(&mut self) -> Result<u64, String> {
        if self.wide {
            Ok(u64::from_le_bytes(self.array()?))
        } else {
            Ok(self.u32()? as u64)
        }
    }

    /// Reads one record that must end by `parent_end`, `None` for a null record
    fn read_record(&mut self, depth: usize, parent_end: usize) -> Result<Option<Record>, String> {
        if depth >= MAX_DEPTH {
            return Err("FBX nesting too deep".to_string());
        }
        let end_offset = self.header_word()? as usize;
        let property_count = self.header_word()? as usize;
        let _property_bytes = self.header_word()?;
        let name_len = self.u8()? as usize;

        if end_offset == 0 {
            // Null record closing a child list
            return Ok(None);
        }
        if end_offset <= self.pos || end_offset > parent_end {
            return Err(format!("record end offset {} out of range", end_offset));
        }

        let name = String::from_utf8_lossy(self.take(name_len)?).into_owned();
        let mut properties = Vec::with_capacity(property_count.min(64));
        for _ in 0..property_count {
            properties.push(self.read_property()?);
        }

        let mut children = Vec::new();
        while self.pos < end_offset {
            match self.read_record(depth + 1, end_offset)? {
                Some(child) => children.push(child),
                None => break,
            }
        }
        self.pos = end_offset;

        Ok(Some(Record {
            name,
            properties,
            children,
        }))
    }

    fn read_property(&mut self) -> Result<Property, String> {
        let type_code = self.u8()?;
        let property = match type_code {
            b'C' => Property::Bool(self.u8()? != 0),
            b'Y' => Property::I16(i16::from_le_bytes(self.array()?)),
            b'I' => Property::I32(i32::from_le_bytes(self.array()?)),
            b'L' => Property::I64(i64::from_le_bytes(self.array()?)),
            b'F' => Property::F32(f32::from_le_bytes(self.array()?)),
            b'D' => Property::F64(f64::from_le_bytes(self.array()?)),
            b'S' => {
                let len = self.u32()? as usize;
                Property::String(String::from_utf8_lossy(self.take(len)?).into_owned())
            }
            b'R' => {
                let len = self.u32()? as usize;
                Property::Raw(self.take(len)?.to_vec())
            }
            b'f' => Property::F32Array(
                self.read_array(4)?
                    .chunks_exact(4)
                    .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                    .collect(),
            ),
            b'd' => Property::F64Array(
                self.read_array(8)?
                    .chunks_exact(8)
                    .map(|c| f64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
                    .collect(),
            ),
            b'i' => Property::I32Array(
                self.read_array(4)?
                    .chunks_exact(4)
                    .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                    .collect(),
            ),
            b'l' => Property::I64Array(
                self.read_array(8)?
                    .chunks_exact(8)
                    .map(|c| i64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
                    .collect(),
            ),
            b'b' => Property::BoolArray(self.read_array(1)?.iter().map(|&b| b != 0).collect()),
            other => {
                return Err(format!(
                    "unknown property type 0x{:02x} at byte {}",
                    other,
                    self.pos - 1
                ))
            }
        };
        Ok(property)
    }

    /// Returns the raw little-endian element bytes, inflating zlib payloads
    fn read_array(&mut self, element_size: usize) -> Result<Vec<u8>, String> {
        let count = self.u32()? as usize;
        let encoding = self.u32()?;
        let stored_len = self.u32()? as usize;
        if count > MAX_ARRAY_LEN {
            return Err(format!("array of {} elements is too large", count));
        }
        let expected = count * element_size;
        let stored = self.take(stored_len)?;

        let data = match encoding {
            0 => stored.to_vec(),
            1 => {
                // The declared count is untrusted, `take` bounds the output
                let mut out = Vec::with_capacity(expected.min(stored_len.saturating_mul(8)));
                ZlibDecoder::new(stored)
                    .take(expected as u64)
                    .read_to_end(&mut out)
                    .map_err(|e| format!("corrupt compressed array: {}", e))?;
                out
            }
            other => return Err(format!("unknown array encoding {}", other)),
        };
        if data.len() != expected {
            return Err(format!(
                "array holds {} bytes, expected {}",
                data.len(),
                expected
            ));
        }
        Ok(data)
    }
}

/// Writes record trees in the binary layout, used to build fixtures
#[cfg(test)]
pub(crate) mod writer {
    use super::*;
    use flate2::{write::ZlibEncoder, Compression};
    use std::io::Write;

    pub fn document(version: u32, records: &[Record]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&[0x1a, 0x00]);
        out.extend_from_slice(&version.to_le_bytes());
        let wide = version >= 7500;
        for record in records {
            write_record(&mut out, record, wide);
        }
        write_null(&mut out, wide);
        out
    }

    fn write_word(out: &mut Vec<u8>, value: usize, wide: bool) {
        if wide {
            out.extend_from_slice(&(value as u64).to_le_bytes());
        } else {
            out.extend_from_slice(&(value as u32).to_le_bytes());
        }
    }

    fn write_null(out: &mut Vec<u8>, wide: bool) {
        let len = if wide { 25 } else { 13 };
        out.extend(std::iter::repeat(0u8).take(len));
    }

    fn write_record(out: &mut Vec<u8>, record: &Record, wide: bool) {
        let start = out.len();
        let mut props = Vec::new();
        for p in &record.properties {
            write_property(&mut props, p);
        }
        // End offset is patched once the children are written
        write_word(out, 0, wide);
        write_word(out, record.properties.len(), wide);
        write_word(out, props.len(), wide);
        out.push(record.name.len() as u8);
        out.extend_from_slice(record.name.as_bytes());
        out.extend_from_slice(&props);
        if !record.children.is_empty() {
            for child in &record.children {
                write_record(out, child, wide);
            }
            write_null(out, wide);
        }
        let end = out.len();
        if wide {
            out[start..start + 8].copy_from_slice(&(end as u64).to_le_bytes());
        } else {
            out[start..start + 4].copy_from_slice(&(end as u32).to_le_bytes());
        }
    }

    fn write_array(out: &mut Vec<u8>, code: u8, count: usize, raw: Vec<u8>, compress: bool) {
        out.push(code);
        out.extend_from_slice(&(count as u32).to_le_bytes());
        if compress {
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&raw).unwrap();
            let packed = encoder.finish().unwrap();
            out.extend_from_slice(&1u32.to_le_bytes());
            out.extend_from_slice(&(packed.len() as u32).to_le_bytes());
            out.extend_from_slice(&packed);
        } else {
            out.extend_from_slice(&0u32.to_le_bytes());
            out.extend_from_slice(&(raw.len() as u32).to_le_bytes());
            out.extend_from_slice(&raw);
        }
    }

    fn write_property(out: &mut Vec<u8>, property: &Property) {
        match property {
            Property::Bool(v) => {
                out.push(b'C');
                out.push(*v as u8);
            }
            Property::I16(v) => {
                out.push(b'Y');
                out.extend_from_slice(&v.to_le_bytes());
            }
            Property::I32(v) => {
                out.push(b'I');
                out.extend_from_slice(&v.to_le_bytes());
            }
            Property::I64(v) => {
                out.push(b'L');
                out.extend_from_slice(&v.to_le_bytes());
            }
            Property::F32(v) => {
                out.push(b'F');
                out.extend_from_slice(&v.to_le_bytes());
            }
            Property::F64(v) => {
                out.push(b'D');
                out.extend_from_slice(&v.to_le_bytes());
            }
            Property::String(s) => {
                out.push(b'S');
                out.extend_from_slice(&(s.len() as u32).to_le_bytes());
                out.extend_from_slice(s.as_bytes());
            }
            Property::Raw(b) => {
                out.push(b'R');
                out.extend_from_slice(&(b.len() as u32).to_le_bytes());
                out.extend_from_slice(b);
            }
            Property::F64Array(v) => {
                let raw = v.iter().flat_map(|x| x.to_le_bytes()).collect();
                write_array(out, b'd', v.len(), raw, v.len() > 8);
            }
            Property::F32Array(v) => {
                let raw = v.iter().flat_map(|x| x.to_le_bytes()).collect();
                write_array(out, b'f', v.len(), raw, false);
            }
            Property::I32Array(v) => {
                let raw = v.iter().flat_map(|x| x.to_le_bytes()).collect();
                write_array(out, b'i', v.len(), raw, v.len() > 8);
            }
            Property::I64Array(v) => {
                let raw = v.iter().flat_map(|x| x.to_le_bytes()).collect();
                write_array(out, b'l', v.len(), raw, false);
            }
            Property::BoolArray(v) => {
                let raw = v.iter().map(|&b| b as u8).collect();
                write_array(out, b'b', v.len(), raw, false);
            }
        }
    }

    pub fn record(name: &str, properties: Vec<Property>, children: Vec<Record>) -> Record {
        Record {
            name: name.to_string(),
            properties,
            children,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{writer::*, *};

    fn sample() -> Vec<Record> {
        vec![record(
            "Objects",
            vec![],
            vec![record(
                "Geometry",
                vec![
                    Property::I64(42),
                    Property::String("Cube\x00\x01Geometry".into()),
                    Property::String("Mesh".into()),
                ],
                vec![
                    record("Vertices", vec![Property::F64Array((0..12).map(|i| i as f64).collect())], vec![]),
                    record("PolygonVertexIndex", vec![Property::I32Array(vec![0, 1, 2, -4])], vec![]),
                ],
            )],
        )]
    }

    #[test]
    fn record_tree_parses_in_both_header_widths() {
        for version in [7400, 7500] {
            let doc = parse_document(&document(version, &sample())).unwrap();
            assert_eq!(doc.version, version);
            let geometry = doc.record("Objects").unwrap().child("Geometry").unwrap();
            assert_eq!(geometry.prop(0).and_then(Property::as_i64), Some(42));
            let vertices = geometry.child_value("Vertices").unwrap().to_f64_vec().unwrap();
            assert_eq!(vertices.len(), 12);
            assert_eq!(vertices[11], 11.0);
            assert_eq!(
                geometry.child_value("PolygonVertexIndex").unwrap().to_i32_vec(),
                Some(vec![0, 1, 2, -4])
            );
        }
    }

    #[test]
    fn compressed_arrays_inflate() {
        // Arrays longer than 8 elements are written zlib-compressed
        let doc = parse_document(&document(7400, &sample())).unwrap();
        let geometry = doc.record("Objects").unwrap().child("Geometry").unwrap();
        assert_eq!(geometry.child_value("Vertices").unwrap().to_f64_vec().unwrap()[5], 5.0);
    }

    #[test]
    fn truncated_document_is_an_error() {
        let mut bytes = document(7400, &sample());
        bytes.truncate(60);
        assert!(parse_document(&bytes).is_err());
    }

    #[test]
    fn runaway_nesting_is_an_error() {
        let mut nested = record("Leaf", vec![], vec![]);
        for _ in 0..MAX_DEPTH + 1 {
            nested = record("N", vec![], vec![nested]);
        }
        let err = parse_document(&document(7400, &[nested])).unwrap_err();
        assert!(err.contains("too deep"));
    }

    #[test]
    fn child_ending_past_its_parent_is_an_error() {
        let parent = record("Parent", vec![], vec![record("Child", vec![], vec![])]);
        let mut bytes = document(7400, &[parent]);
        // Parent header is 13 bytes plus its 6-byte name, the child follows
        let child_start = HEADER_LEN + 13 + "Parent".len();
        let parent_end = u32::from_le_bytes(bytes[HEADER_LEN..HEADER_LEN + 4].try_into().unwrap());
        bytes[child_start..child_start + 4].copy_from_slice(&(parent_end + 1).to_le_bytes());
        assert!(parse_document(&bytes).unwrap_err().contains("out of range"));
    }

    #[test]
    fn huge_declared_array_count_fails_without_reserving_it() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&[0x1a, 0x00]);
        bytes.extend_from_slice(&7400u32.to_le_bytes());
        let record_start = bytes.len();
        // end offset patched below, one property, property bytes, name "A"
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.extend_from_slice(&13u32.to_le_bytes());
        bytes.push(1);
        bytes.push(b'A');
        bytes.push(b'd');
        bytes.extend_from_slice(&(MAX_ARRAY_LEN as u32).to_le_bytes());
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());
        let end = bytes.len() as u32;
        bytes[record_start..record_start + 4].copy_from_slice(&end.to_le_bytes());

        assert!(parse_document(&bytes).is_err());
    }

    #[test]
    fn ascii_is_not_binary() {
        assert!(!is_binary_fbx(b"; FBX 7.4.0 project file\n"));
    }
}
