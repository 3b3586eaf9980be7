//! Canonical column types, default values and referential actions.
//!
//! Type tags from the schema definition are resolved into [`SqlType`] once,
//! when the snapshot is built. Dialects only ever see resolved types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Canonical SQL types understood by the snapshot model.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SqlType {
    /// 16-bit integer.
    SmallInt,
    /// 32-bit integer.
    Integer,
    /// 64-bit integer.
    BigInt,
    /// Single precision float.
    Real,
    /// Double precision float.
    Double,
    /// Exact decimal.
    Decimal {
        /// Total digits.
        precision: u32,
        /// Digits after the decimal point.
        scale: u32,
    },
    /// Exact numeric (alias of decimal in most engines, kept distinct).
    Numeric {
        /// Total digits.
        precision: u32,
        /// Digits after the decimal point.
        scale: u32,
    },
    /// Fixed-length string.
    Char {
        /// Length in characters.
        length: u32,
    },
    /// Variable-length string with a limit.
    Varchar {
        /// Maximum length in characters.
        length: u32,
    },
    /// Unbounded text.
    Text,
    /// Boolean.
    Boolean,
    /// Calendar date.
    Date,
    /// Time of day.
    Time,
    /// Timestamp without time zone.
    Timestamp,
    /// Timestamp with time zone.
    TimestampTz,
    /// UUID.
    Uuid,
    /// JSON document.
    Json,
    /// Binary data.
    Blob,
    /// A named enum declared in the same schema.
    Enum {
        /// Enum name.
        name: String,
    },
}

/// Why a tag could not be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeParseError {
    /// Tag not in the catalogue.
    Unknown,
    /// Tag known, parameter count wrong.
    Parameters,
}

impl SqlType {
    /// Resolves a type tag plus parameters into a canonical type.
    ///
    /// Tags are case-insensitive. `enum:<name>` produces [`SqlType::Enum`];
    /// the caller is responsible for checking that the enum exists.
    pub fn parse(tag: &str, params: &[u32]) -> Result<Self, TypeParseError> {
        let lowered = tag.trim().to_ascii_lowercase();
        if let Some(name) = lowered.strip_prefix("enum:") {
            if name.is_empty() || !params.is_empty() {
                return Err(TypeParseError::Parameters);
            }
            // keep the declared spelling of the enum name
            let declared = &tag.trim()[tag.trim().len() - name.len()..];
            return Ok(Self::Enum {
                name: declared.to_string(),
            });
        }

        let no_params = |ty: Self| {
            if params.is_empty() {
                Ok(ty)
            } else {
                Err(TypeParseError::Parameters)
            }
        };

        match lowered.as_str() {
            "smallint" | "int2" => no_params(Self::SmallInt),
            "integer" | "int" | "int4" => no_params(Self::Integer),
            "bigint" | "int8" => no_params(Self::BigInt),
            "real" | "float4" => no_params(Self::Real),
            "double" | "float8" | "double precision" => no_params(Self::Double),
            "decimal" | "numeric" => {
                let (precision, scale) = match params {
                    [p] => (*p, 0),
                    [p, s] if s <= p => (*p, *s),
                    _ => return Err(TypeParseError::Parameters),
                };
                if precision == 0 {
                    return Err(TypeParseError::Parameters);
                }
                if lowered == "decimal" {
                    Ok(Self::Decimal { precision, scale })
                } else {
                    Ok(Self::Numeric { precision, scale })
                }
            }
            "char" => match params {
                [] => Ok(Self::Char { length: 1 }),
                [n] if *n > 0 => Ok(Self::Char { length: *n }),
                _ => Err(TypeParseError::Parameters),
            },
            "varchar" => match params {
                [n] if *n > 0 => Ok(Self::Varchar { length: *n }),
                _ => Err(TypeParseError::Parameters),
            },
            "text" => no_params(Self::Text),
            "boolean" | "bool" => no_params(Self::Boolean),
            "date" => no_params(Self::Date),
            "time" => no_params(Self::Time),
            "timestamp" => no_params(Self::Timestamp),
            "timestamptz" => no_params(Self::TimestampTz),
            "uuid" => no_params(Self::Uuid),
            "json" | "jsonb" => no_params(Self::Json),
            "blob" | "bytea" => no_params(Self::Blob),
            _ => Err(TypeParseError::Unknown),
        }
    }

    /// Returns the enum name if this is an enum type.
    #[must_use]
    pub fn enum_name(&self) -> Option<&str> {
        match self {
            Self::Enum { name } => Some(name),
            _ => None,
        }
    }

    const fn integer_rank(&self) -> Option<u8> {
        match self {
            Self::SmallInt => Some(1),
            Self::Integer => Some(2),
            Self::BigInt => Some(3),
            _ => None,
        }
    }

    /// Returns `true` when converting a column from `self` to `target` can
    /// lose data (or truncate values).
    ///
    /// Only well-known widenings are considered safe; everything else,
    /// including conversions across type families, is narrowing.
    #[must_use]
    pub fn is_narrowing_to(&self, target: &Self) -> bool {
        if self == target {
            return false;
        }
        if let (Some(from), Some(to)) = (self.integer_rank(), target.integer_rank()) {
            return to < from;
        }
        let widening = match (self, target) {
            (Self::Real, Self::Double) | (Self::Timestamp, Self::TimestampTz) => true,
            (
                Self::Decimal {
                    precision: p1,
                    scale: s1,
                }
                | Self::Numeric {
                    precision: p1,
                    scale: s1,
                },
                Self::Decimal {
                    precision: p2,
                    scale: s2,
                }
                | Self::Numeric {
                    precision: p2,
                    scale: s2,
                },
            ) => s2 >= s1 && p2.saturating_sub(*s2) >= p1.saturating_sub(*s1),
            (Self::Char { length: a }, Self::Char { length: b } | Self::Varchar { length: b })
            | (Self::Varchar { length: a }, Self::Varchar { length: b }) => b >= a,
            (Self::Char { .. } | Self::Varchar { .. } | Self::Enum { .. }, Self::Text) => true,
            _ => false,
        };
        !widening
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SmallInt => f.write_str("smallint"),
            Self::Integer => f.write_str("integer"),
            Self::BigInt => f.write_str("bigint"),
            Self::Real => f.write_str("real"),
            Self::Double => f.write_str("double"),
            Self::Decimal { precision, scale } => write!(f, "decimal({precision}, {scale})"),
            Self::Numeric { precision, scale } => write!(f, "numeric({precision}, {scale})"),
            Self::Char { length } => write!(f, "char({length})"),
            Self::Varchar { length } => write!(f, "varchar({length})"),
            Self::Text => f.write_str("text"),
            Self::Boolean => f.write_str("boolean"),
            Self::Date => f.write_str("date"),
            Self::Time => f.write_str("time"),
            Self::Timestamp => f.write_str("timestamp"),
            Self::TimestampTz => f.write_str("timestamptz"),
            Self::Uuid => f.write_str("uuid"),
            Self::Json => f.write_str("json"),
            Self::Blob => f.write_str("blob"),
            Self::Enum { name } => write!(f, "enum:{name}"),
        }
    }
}

/// Default value for a column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum DefaultValue {
    /// NULL default.
    Null,
    /// Boolean default.
    Bool(bool),
    /// Integer default.
    Integer(i64),
    /// Float default.
    Float(f64),
    /// String literal default.
    String(String),
    /// Raw SQL expression (e.g., `CURRENT_TIMESTAMP`).
    Expression(String),
}

impl fmt::Display for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::String(s) => write!(f, "'{s}'"),
            Self::Expression(expr) => f.write_str(expr),
        }
    }
}

/// Foreign key action (ON DELETE, ON UPDATE).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ForeignKeyAction {
    /// No action (error if referenced row is deleted/updated).
    #[default]
    NoAction,
    /// Restrict (same as NoAction but checked immediately).
    Restrict,
    /// Cascade the delete/update to referencing rows.
    Cascade,
    /// Set the foreign key column to NULL.
    SetNull,
    /// Set the foreign key column to its default value.
    SetDefault,
}

impl ForeignKeyAction {
    /// Returns the SQL representation of this action.
    #[must_use]
    pub const fn as_sql(&self) -> &'static str {
        match self {
            Self::NoAction => "NO ACTION",
            Self::Restrict => "RESTRICT",
            Self::Cascade => "CASCADE",
            Self::SetNull => "SET NULL",
            Self::SetDefault => "SET DEFAULT",
        }
    }
}
