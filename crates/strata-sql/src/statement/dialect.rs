//! SQL dialects.

use std::fmt;

use crate::error::StrataError;

/// The SQL flavours statements can be rendered in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Dialect {
    /// Portable SQL: `?` markers, unquoted identifiers, `LIMIT ? OFFSET ?`.
    /// Used for MySQL, H2 and SQLite.
    #[default]
    Generic,
    /// `$n` markers, double-quoted identifiers.
    Postgres,
    /// `:n` markers, upper-cased quoted identifiers, `OFFSET .. ROWS FETCH NEXT .. ROWS ONLY`.
    Oracle,
}

impl Dialect {
    /// Dialect named by a configured database type tag, if the tag is known.
    pub fn parse_tag(tag: &str) -> Option<Self> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "generic" | "mysql" | "h2" | "sqlite" => Some(Self::Generic),
            "postgres" | "postgresql" => Some(Self::Postgres),
            "oracle" => Some(Self::Oracle),
            _ => None,
        }
    }

    /// Select a dialect from a configured database type tag. Unknown tags fall back
    /// to [`Dialect::Generic`].
    pub fn from_tag(tag: &str) -> Self {
        Self::parse_tag(tag).unwrap_or_else(|| {
            tracing::warn!(
                database_type = %tag,
                "Unknown database type provided, using the generic statement provider"
            );
            Self::Generic
        })
    }

    /// Parameter marker for the `index`-th (1-based) parameter.
    pub fn placeholder(self, index: usize) -> String {
        match self {
            Self::Generic => "?".to_string(),
            Self::Postgres => format!("${}", index),
            Self::Oracle => format!(":{}", index),
        }
    }

    /// Render a table or column name.
    pub fn quote_identifier(self, ident: &str) -> Result<String, StrataError> {
        if ident.is_empty() || !ident.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(StrataError::InvalidIdentifier(ident.to_string()));
        }
        Ok(match self {
            Self::Generic => ident.to_string(),
            Self::Postgres => format!("\"{}\"", ident),
            Self::Oracle => format!("\"{}\"", ident.to_ascii_uppercase()),
        })
    }

    /// Pagination clause. `limit` and `offset` are parameter markers; `offset` is
    /// `None` when no rows are skipped.
    pub fn pagination(self, limit: &str, offset: Option<&str>) -> String {
        match (self, offset) {
            (Self::Oracle, Some(offset)) => {
                format!("OFFSET {} ROWS FETCH NEXT {} ROWS ONLY", offset, limit)
            }
            (Self::Oracle, None) => format!("FETCH FIRST {} ROWS ONLY", limit),
            (_, Some(offset)) => format!("LIMIT {} OFFSET {}", limit, offset),
            (_, None) => format!("LIMIT {}", limit),
        }
    }

    /// Whether the offset parameter is bound before the limit parameter.
    pub(crate) fn offset_first(self) -> bool {
        matches!(self, Self::Oracle)
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Generic => "generic",
            Self::Postgres => "postgres",
            Self::Oracle => "oracle",
        };
        f.write_str(name)
    }
}
