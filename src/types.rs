use std::fmt;

/// Scalar element types supported by the IR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarType {
    U8,
    U64,
    F64,
}

impl ScalarType {
    /// Size of one element in a static array, in bytes.
    pub fn size(self) -> usize {
        match self {
            ScalarType::U8 => 1,
            ScalarType::U64 | ScalarType::F64 => 8,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, ScalarType::F64)
    }

    pub fn is_integer(self) -> bool {
        !self.is_float()
    }

    /// Type both operands of an arithmetic op are converted to.
    pub fn promote(a: ScalarType, b: ScalarType) -> ScalarType {
        if a.is_float() || b.is_float() {
            ScalarType::F64
        } else {
            ScalarType::U64
        }
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarType::U8 => write!(f, "uint8"),
            ScalarType::U64 => write!(f, "uint64"),
            ScalarType::F64 => write!(f, "float64"),
        }
    }
}

/// Type of a named binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValType {
    Scalar(ScalarType),
    /// Fixed-length static array: element type and length.
    Array(ScalarType, usize),
}

impl ValType {
    pub fn scalar(self) -> Option<ScalarType> {
        match self {
            ValType::Scalar(s) => Some(s),
            ValType::Array(..) => None,
        }
    }
}

impl fmt::Display for ValType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValType::Scalar(s) => write!(f, "{s}"),
            ValType::Array(s, len) => write!(f, "[{len}]{s}"),
        }
    }
}

/// A literal value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Val {
    U8(u8),
    U64(u64),
    F64(f64),
}

impl Val {
    pub fn ty(&self) -> ScalarType {
        match self {
            Val::U8(_) => ScalarType::U8,
            Val::U64(_) => ScalarType::U64,
            Val::F64(_) => ScalarType::F64,
        }
    }

    /// The 64-bit pattern this value occupies in an 8-byte array element.
    /// Integers are zero-extended, floats are their IEEE-754 bits.
    pub fn bits(self) -> u64 {
        match self {
            Val::U8(v) => v as u64,
            Val::U64(v) => v,
            Val::F64(v) => v.to_bits(),
        }
    }

    pub fn default_for(ty: ScalarType) -> Val {
        match ty {
            ScalarType::U8 => Val::U8(0),
            ScalarType::U64 => Val::U64(0),
            ScalarType::F64 => Val::F64(0.0),
        }
    }
}

impl fmt::Display for Val {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Val::U8(v) => write!(f, "{v}u8"),
            Val::U64(v) => write!(f, "{v}"),
            Val::F64(v) => write!(f, "{v:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn promotion() {
        assert_eq!(ScalarType::promote(ScalarType::U8, ScalarType::U64), ScalarType::U64);
        assert_eq!(ScalarType::promote(ScalarType::U8, ScalarType::F64), ScalarType::F64);
        assert_eq!(ScalarType::promote(ScalarType::F64, ScalarType::U64), ScalarType::F64);
    }

    #[test]
    fn element_bits() {
        assert_eq!(Val::U8(200).bits(), 200);
        assert_eq!(Val::F64(1.0).bits(), 0x3FF0_0000_0000_0000);
    }

    #[test]
    fn display_keeps_float_point() {
        assert_eq!(Val::F64(440.0).to_string(), "440.0");
        assert_eq!(Val::U8(7).to_string(), "7u8");
        assert_eq!(ValType::Array(ScalarType::U8, 12).to_string(), "[12]uint8");
    }
}
