//! Named-field layouts of fixed-size binary calibration records.
//!
//! A [`CalSchema`] maps field names (e.g. `"Fghz"`, `"Timestamp"`) to their
//! byte offset, element type and array shape within a record buffer. All
//! values are stored little-endian, row-major.

use std::{collections::BTreeMap, io::Cursor};

use byteorder::{LittleEndian, ReadBytesExt};

use crate::{
    calibration::CalRecordError,
    ndarray::{ArrayD, IxDyn},
};

/// Element type of a record field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    /// signed 8 bit integer
    I8,
    /// unsigned 8 bit integer
    U8,
    /// signed 16 bit integer
    I16,
    /// unsigned 16 bit integer
    U16,
    /// signed 32 bit integer
    I32,
    /// unsigned 32 bit integer
    U32,
    /// signed 64 bit integer
    I64,
    /// single precision float
    F32,
    /// double precision float
    F64,
}

impl FieldType {
    /// Size of one element in bytes.
    pub fn size(&self) -> usize {
        match self {
            Self::I8 | Self::U8 => 1,
            Self::I16 | Self::U16 => 2,
            Self::I32 | Self::U32 | Self::F32 => 4,
            Self::I64 | Self::F64 => 8,
        }
    }

    /// Look up a type from its single character format code, as used by
    /// the calibration database (`b`, `B`, `h`, `H`, `i`, `I`, `q`, `f`,
    /// `d`; `l` and `L` are aliases of `i` and `I`).
    pub fn from_code(code: char) -> Option<Self> {
        Some(match code {
            'b' => Self::I8,
            'B' => Self::U8,
            'h' => Self::I16,
            'H' => Self::U16,
            'i' | 'l' => Self::I32,
            'I' | 'L' => Self::U32,
            'q' => Self::I64,
            'f' => Self::F32,
            'd' => Self::F64,
            _ => return None,
        })
    }

    fn read_f64(&self, cursor: &mut Cursor<&[u8]>) -> std::io::Result<f64> {
        Ok(match self {
            Self::I8 => cursor.read_i8()? as f64,
            Self::U8 => cursor.read_u8()? as f64,
            Self::I16 => cursor.read_i16::<LittleEndian>()? as f64,
            Self::U16 => cursor.read_u16::<LittleEndian>()? as f64,
            Self::I32 => cursor.read_i32::<LittleEndian>()? as f64,
            Self::U32 => cursor.read_u32::<LittleEndian>()? as f64,
            Self::I64 => cursor.read_i64::<LittleEndian>()? as f64,
            Self::F32 => cursor.read_f32::<LittleEndian>()? as f64,
            Self::F64 => cursor.read_f64::<LittleEndian>()?,
        })
    }
}

/// Where a field lives inside a record buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    /// Byte offset of the first element.
    pub offset: usize,
    /// Element type.
    pub field_type: FieldType,
    /// Array shape, empty for a scalar.
    pub shape: Vec<usize>,
}

impl FieldDescriptor {
    /// Create a new descriptor
    pub fn new(offset: usize, field_type: FieldType, shape: &[usize]) -> Self {
        Self {
            offset,
            field_type,
            shape: shape.to_vec(),
        }
    }

    /// Number of elements in the field.
    pub fn num_elements(&self) -> usize {
        self.shape.iter().product()
    }

    /// Number of bytes the field occupies.
    pub fn num_bytes(&self) -> usize {
        self.num_elements() * self.field_type.size()
    }
}

/// Field layout of one kind of calibration record.
#[derive(Debug, Clone, Default)]
pub struct CalSchema {
    fields: BTreeMap<String, FieldDescriptor>,
}

impl CalSchema {
    /// An empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a field.
    pub fn insert(&mut self, name: &str, descriptor: FieldDescriptor) {
        self.fields.insert(name.to_string(), descriptor);
    }

    /// Builder-style [`CalSchema::insert`].
    pub fn with_field(mut self, name: &str, descriptor: FieldDescriptor) -> Self {
        self.insert(name, descriptor);
        self
    }

    /// Look up a field by name.
    ///
    /// # Errors
    ///
    /// [`CalRecordError::MissingField`] if there is no such field.
    pub fn field(&self, name: &str) -> Result<&FieldDescriptor, CalRecordError> {
        self.fields
            .get(name)
            .ok_or_else(|| CalRecordError::MissingField {
                name: name.to_string(),
            })
    }

    /// Smallest buffer length that holds every field.
    pub fn record_len(&self) -> usize {
        self.fields
            .values()
            .map(|d| d.offset + d.num_bytes())
            .max()
            .unwrap_or(0)
    }

    /// Names of all fields, sorted.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }
}

/// Read field `name` from `buf` as an array of `f64`, whatever its stored
/// type.
///
/// # Errors
///
/// - [`CalRecordError::MissingField`] if `schema` has no field `name`
/// - [`CalRecordError::OutOfBounds`] if the field doesn't fit in `buf`
pub fn extract_f64(
    buf: &[u8],
    schema: &CalSchema,
    name: &str,
) -> Result<ArrayD<f64>, CalRecordError> {
    let descriptor = schema.field(name)?;
    let end = descriptor.offset + descriptor.num_bytes();
    if end > buf.len() {
        return Err(CalRecordError::OutOfBounds {
            name: name.to_string(),
            end,
            buf_len: buf.len(),
        });
    }
    let mut cursor = Cursor::new(&buf[descriptor.offset..end]);
    let values = (0..descriptor.num_elements())
        .map(|_| descriptor.field_type.read_f64(&mut cursor))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| CalRecordError::OutOfBounds {
            name: name.to_string(),
            end,
            buf_len: buf.len(),
        })?;
    ArrayD::from_shape_vec(IxDyn(&descriptor.shape), values).map_err(|e| {
        CalRecordError::BadShape {
            name: name.to_string(),
            expected: format!("{:?}", descriptor.shape),
            received: e.to_string(),
        }
    })
}

/// Read field `name` from `buf` as an array of `i32`. Floating point values
/// are truncated.
///
/// # Errors
///
/// See [`extract_f64`].
pub fn extract_i32(
    buf: &[u8],
    schema: &CalSchema,
    name: &str,
) -> Result<ArrayD<i32>, CalRecordError> {
    Ok(extract_f64(buf, schema, name)?.mapv(|v| v as i32))
}

/// Read the first element of field `name` from `buf`.
///
/// # Errors
///
/// See [`extract_f64`], and [`CalRecordError::BadShape`] if the field has no
/// elements.
pub fn extract_scalar_f64(buf: &[u8], schema: &CalSchema, name: &str) -> Result<f64, CalRecordError> {
    extract_f64(buf, schema, name)?
        .iter()
        .next()
        .copied()
        .ok_or_else(|| CalRecordError::BadShape {
            name: name.to_string(),
            expected: "at least one element".into(),
            received: "an empty field".into(),
        })
}
