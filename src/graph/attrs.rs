use std::fmt;

use smallvec::SmallVec;

/// Names of node attributes.
///
/// Which names a node accepts depends on its kind. See
/// [`NodeKind::accepts_attr`](super::NodeKind::accepts_attr).
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub enum AttrName {
    Alpha,
    Axes,
    Axis,
    Beta,
    Broadcast,
    Direction,
    Ends,
    HiddenSize,
    InputAsShape,
    Perm,
    Size,
    Starts,
    TransA,
    TransB,
    Value,
}

impl AttrName {
    /// Return the attribute name as it appears in ONNX.
    pub fn as_str(self) -> &'static str {
        match self {
            AttrName::Alpha => "alpha",
            AttrName::Axes => "axes",
            AttrName::Axis => "axis",
            AttrName::Beta => "beta",
            AttrName::Broadcast => "broadcast",
            AttrName::Direction => "direction",
            AttrName::Ends => "ends",
            AttrName::HiddenSize => "hidden_size",
            AttrName::InputAsShape => "input_as_shape",
            AttrName::Perm => "perm",
            AttrName::Size => "size",
            AttrName::Starts => "starts",
            AttrName::TransA => "transA",
            AttrName::TransB => "transB",
            AttrName::Value => "value",
        }
    }
}

impl fmt::Display for AttrName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Element data of a [`Tensor`] attribute.
#[derive(Clone, Debug, PartialEq)]
pub enum TensorData {
    Int64(Vec<i64>),
    Float32(Vec<f32>),
}

/// Constant tensor stored in a node attribute, such as the `value` of a
/// `Constant` node.
#[derive(Clone, Debug, PartialEq)]
pub struct Tensor {
    shape: SmallVec<[usize; 4]>,
    data: TensorData,
}

impl Tensor {
    /// Create a tensor from a shape and data.
    ///
    /// Panics if the number of elements does not match the shape.
    pub fn new(shape: &[usize], data: TensorData) -> Tensor {
        let len = match &data {
            TensorData::Int64(data) => data.len(),
            TensorData::Float32(data) => data.len(),
        };
        assert_eq!(
            len,
            shape.iter().product::<usize>(),
            "tensor data length does not match shape {:?}",
            shape
        );
        Tensor {
            shape: shape.into(),
            data,
        }
    }

    /// Create a rank-0 int64 tensor.
    pub fn scalar_i64(value: i64) -> Tensor {
        Tensor::new(&[], TensorData::Int64(vec![value]))
    }

    /// Create a rank-1 int64 tensor.
    pub fn vector_i64(values: &[i64]) -> Tensor {
        Tensor::new(&[values.len()], TensorData::Int64(values.to_vec()))
    }

    /// Create a float tensor filled with zeros.
    pub fn zeros_f32(shape: &[usize]) -> Tensor {
        let len: usize = shape.iter().product();
        Tensor::new(shape, TensorData::Float32(vec![0.; len]))
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn data(&self) -> &TensorData {
        &self.data
    }

    /// Return the int64 elements of this tensor, if it has that type.
    pub fn as_i64(&self) -> Option<&[i64]> {
        match &self.data {
            TensorData::Int64(data) => Some(data),
            TensorData::Float32(_) => None,
        }
    }
}

impl fmt::Display for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.data {
            TensorData::Int64(data) if data.len() <= 8 => {
                write!(f, "i64{:?} {:?}", self.shape.as_slice(), data)
            }
            TensorData::Float32(data) if data.len() <= 8 => {
                write!(f, "f32{:?} {:?}", self.shape.as_slice(), data)
            }
            TensorData::Int64(_) => write!(f, "i64{:?}", self.shape.as_slice()),
            TensorData::Float32(_) => write!(f, "f32{:?}", self.shape.as_slice()),
        }
    }
}

/// Value of a node attribute.
#[derive(Clone, Debug, PartialEq)]
pub enum AttrValue {
    Int(i64),
    Ints(Vec<i64>),
    Float(f32),
    String(String),
    Tensor(Tensor),
}

impl AttrValue {
    fn type_name(&self) -> &'static str {
        match self {
            AttrValue::Int(_) => "int",
            AttrValue::Ints(_) => "ints",
            AttrValue::Float(_) => "float",
            AttrValue::String(_) => "string",
            AttrValue::Tensor(_) => "tensor",
        }
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Int(v) => write!(f, "{}", v),
            AttrValue::Ints(v) => write!(f, "{:?}", v),
            AttrValue::Float(v) => write!(f, "{}", v),
            AttrValue::String(v) => write!(f, "{:?}", v),
            AttrValue::Tensor(v) => write!(f, "{}", v),
        }
    }
}

/// Attribute map of a node.
///
/// Typed getters such as [`i`](Attributes::i) panic if the attribute is
/// missing or has a different type. The `get_*` variants return `None` if the
/// attribute is missing, but still panic on a type mismatch, since that means
/// whatever produced the graph disagrees about the operator's schema.
///
/// Attributes are kept in insertion order, which is also the order they are
/// printed in.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Attributes {
    entries: SmallVec<[(AttrName, AttrValue); 2]>,
}

macro_rules! typed_accessors {
    ($get:ident, $req:ident, $variant:ident, $ty:ty) => {
        /// Return the attribute value, or `None` if it is not set.
        ///
        /// Panics if the attribute has a different type.
        pub fn $get(&self, name: AttrName) -> Option<&$ty> {
            match self.get(name)? {
                AttrValue::$variant(v) => Some(v),
                other => panic!(
                    "attribute \"{}\" is {}, expected {}",
                    name,
                    other.type_name(),
                    stringify!($variant)
                ),
            }
        }

        /// Return the attribute value.
        ///
        /// Panics if the attribute is missing or has a different type.
        pub fn $req(&self, name: AttrName) -> &$ty {
            self.$get(name)
                .unwrap_or_else(|| panic!("missing attribute \"{}\"", name))
        }
    };
}

impl Attributes {
    pub fn new() -> Attributes {
        Attributes::default()
    }

    pub fn has(&self, name: AttrName) -> bool {
        self.get(name).is_some()
    }

    pub fn get(&self, name: AttrName) -> Option<&AttrValue> {
        self.entries
            .iter()
            .find_map(|(n, v)| (*n == name).then_some(v))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over `(name, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (AttrName, &AttrValue)> {
        self.entries.iter().map(|(n, v)| (*n, v))
    }

    /// Set an attribute.
    ///
    /// Panics if the attribute is already set with a value of a different
    /// type.
    pub fn set(&mut self, name: AttrName, value: AttrValue) {
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => {
                assert!(
                    std::mem::discriminant(existing) == std::mem::discriminant(&value),
                    "cannot replace {} attribute \"{}\" with {}",
                    existing.type_name(),
                    name,
                    value.type_name()
                );
                *existing = value;
            }
            None => self.entries.push((name, value)),
        }
    }

    /// Remove an attribute, returning its previous value.
    pub fn remove(&mut self, name: AttrName) -> Option<AttrValue> {
        let pos = self.entries.iter().position(|(n, _)| *n == name)?;
        Some(self.entries.remove(pos).1)
    }

    typed_accessors!(get_i, i, Int, i64);
    typed_accessors!(get_is, is, Ints, Vec<i64>);
    typed_accessors!(get_f, f, Float, f32);
    typed_accessors!(get_s, s, String, String);
    typed_accessors!(get_t, t, Tensor, Tensor);
}
