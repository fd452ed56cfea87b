//! Canonical C type model.
//!
//! The frontend reports the semantic type of every expression node. Types may
//! still carry typedef names and qualifiers as written; `canonical()` strips
//! both down to the underlying structural type, so two macros that are
//! textually different but structurally identical reify the same way.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuiltinType {
    Void,
    Char,
    Int,
    UnsignedInt,
    Long,
    UnsignedLong,
    Float,
    Double,
}

impl BuiltinType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuiltinType::Void => "void",
            BuiltinType::Char => "char",
            BuiltinType::Int => "int",
            BuiltinType::UnsignedInt => "unsigned int",
            BuiltinType::Long => "long",
            BuiltinType::UnsignedLong => "unsigned long",
            BuiltinType::Float => "float",
            BuiltinType::Double => "double",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Qualifier {
    Const,
    Volatile,
}

/// A semantic C type as reported by the type checker.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CType {
    Builtin(BuiltinType),
    /// A typedef alias together with the type it resolves to.
    Typedef {
        name: String,
        underlying: Box<CType>,
    },
    Qualified {
        quals: Vec<Qualifier>,
        inner: Box<CType>,
    },
    Pointer(Box<CType>),
    Array {
        element: Box<CType>,
        len: Option<usize>,
    },
    Function {
        ret: Box<CType>,
        params: Vec<CType>,
    },
    /// A struct/union/enum or other user-defined type, by tag.
    Record(String),
}

impl CType {
    pub fn int() -> Self {
        CType::Builtin(BuiltinType::Int)
    }

    /// Strips typedefs and qualifiers recursively, yielding the underlying
    /// structural type.
    pub fn canonical(&self) -> CType {
        match self {
            CType::Builtin(b) => CType::Builtin(*b),
            CType::Typedef { underlying, .. } => underlying.canonical(),
            CType::Qualified { inner, .. } => inner.canonical(),
            CType::Pointer(pointee) => CType::Pointer(Box::new(pointee.canonical())),
            CType::Array { element, len } => CType::Array {
                element: Box::new(element.canonical()),
                len: *len,
            },
            CType::Function { ret, params } => CType::Function {
                ret: Box::new(ret.canonical()),
                params: params.iter().map(CType::canonical).collect(),
            },
            CType::Record(tag) => CType::Record(tag.clone()),
        }
    }

    /// True if the canonical form is a builtin scalar type.
    pub fn is_builtin(&self) -> bool {
        matches!(self.canonical(), CType::Builtin(_))
    }

    pub fn is_array(&self) -> bool {
        matches!(self.canonical(), CType::Array { .. })
    }

    /// True for function types and pointers to function types.
    pub fn is_function_like(&self) -> bool {
        match self.canonical() {
            CType::Function { .. } => true,
            CType::Pointer(pointee) => matches!(*pointee, CType::Function { .. }),
            _ => false,
        }
    }
}

impl fmt::Display for CType {
    /// Renders C declaration-specifier syntax. Function types render in the
    /// abstract `ret (*)(params)` shape; the synthesizer flags them as
    /// non-anonymous-safe rather than relying on this rendering.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CType::Builtin(b) => write!(f, "{}", b.as_str()),
            CType::Typedef { name, .. } => write!(f, "{}", name),
            CType::Qualified { quals, inner } => {
                for q in quals {
                    match q {
                        Qualifier::Const => write!(f, "const ")?,
                        Qualifier::Volatile => write!(f, "volatile ")?,
                    }
                }
                write!(f, "{}", inner)
            }
            CType::Pointer(pointee) => write!(f, "{} *", pointee),
            CType::Array { element, len } => match len {
                Some(n) => write!(f, "{} [{}]", element, n),
                None => write!(f, "{} []", element),
            },
            CType::Function { ret, params } => {
                write!(f, "{} (*)(", ret)?;
                for (i, p) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", p)?;
                }
                write!(f, ")")
            }
            CType::Record(tag) => write!(f, "struct {}", tag),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn size_t() -> CType {
        CType::Typedef {
            name: "size_t".to_string(),
            underlying: Box::new(CType::Builtin(BuiltinType::UnsignedLong)),
        }
    }

    #[test]
    fn canonical_strips_typedefs_and_qualifiers() {
        let ty = CType::Qualified {
            quals: vec![Qualifier::Const],
            inner: Box::new(size_t()),
        };
        assert_eq!(ty.canonical(), CType::Builtin(BuiltinType::UnsignedLong));
        assert!(ty.is_builtin());
    }

    #[test]
    fn canonical_reaches_through_pointers() {
        let ty = CType::Pointer(Box::new(size_t()));
        assert_eq!(
            ty.canonical(),
            CType::Pointer(Box::new(CType::Builtin(BuiltinType::UnsignedLong)))
        );
        assert!(!ty.is_builtin());
    }

    #[test]
    fn function_pointers_are_function_like() {
        let fn_ty = CType::Function {
            ret: Box::new(CType::int()),
            params: vec![CType::int()],
        };
        assert!(fn_ty.is_function_like());
        assert!(CType::Pointer(Box::new(fn_ty)).is_function_like());
        assert!(!CType::int().is_function_like());
    }

    #[test]
    fn display_renders_c_syntax() {
        assert_eq!(CType::int().to_string(), "int");
        assert_eq!(
            CType::Pointer(Box::new(CType::Builtin(BuiltinType::Char))).to_string(),
            "char *"
        );
        assert_eq!(CType::Record("point".to_string()).to_string(), "struct point");
    }
}
