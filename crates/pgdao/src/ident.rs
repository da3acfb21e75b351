//! Validated SQL identifiers.
//!
//! Table and column names only ever reach SQL text through [`Ident`], and an
//! `Ident` can only be built from a name declared on an entity descriptor.
//! Every part is rendered double-quoted, so reserved words (`order`, `user`,
//! `group`) and mixed-case names are safe as column names.
//!
//! - Unquoted parts are validated against: `[A-Za-z_][A-Za-z0-9_$]*`
//! - Quoted parts allow any characters except NUL and escape `"` as `""`

use crate::error::{OrmError, OrmResult};

/// A SQL identifier: `column`, `table` or `schema.table`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Ident {
    parts: Vec<String>,
}

impl Ident {
    /// Parse a possibly dotted, possibly quoted identifier (`public."Files"`).
    pub fn parse(s: &str) -> OrmResult<Self> {
        if s.is_empty() {
            return Err(OrmError::schema("Identifier cannot be empty"));
        }
        if s.contains('\0') {
            return Err(OrmError::schema("Identifier cannot contain NUL character"));
        }

        let mut parts = Vec::new();
        let mut chars = s.chars().peekable();

        while chars.peek().is_some() {
            if !parts.is_empty() {
                match chars.next() {
                    Some('.') => {
                        if chars.peek().is_none() {
                            return Err(OrmError::schema(format!(
                                "Trailing '.' in identifier '{s}'"
                            )));
                        }
                    }
                    Some(c) => {
                        return Err(OrmError::schema(format!(
                            "Expected '.' between identifier parts in '{s}', got '{c}'"
                        )));
                    }
                    None => break,
                }
            }

            if chars.peek() == Some(&'"') {
                chars.next();
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some('"') => {
                            if chars.peek() == Some(&'"') {
                                chars.next();
                                name.push('"');
                            } else {
                                break;
                            }
                        }
                        Some(c) => name.push(c),
                        None => {
                            return Err(OrmError::schema(format!(
                                "Unclosed quoted identifier '{s}'"
                            )));
                        }
                    }
                }
                if name.is_empty() {
                    return Err(OrmError::schema("Empty quoted identifier"));
                }
                parts.push(name);
                continue;
            }

            let mut name = String::new();
            while let Some(&c) = chars.peek() {
                if c == '.' {
                    break;
                }
                let ok = if name.is_empty() {
                    c == '_' || c.is_ascii_alphabetic()
                } else {
                    c == '_' || c == '$' || c.is_ascii_alphanumeric()
                };
                if !ok {
                    return Err(OrmError::schema(format!(
                        "Invalid character '{c}' in identifier '{s}'"
                    )));
                }
                name.push(c);
                chars.next();
            }
            if name.is_empty() {
                return Err(OrmError::schema(format!("Empty segment in identifier '{s}'")));
            }
            parts.push(name);
        }

        Ok(Self { parts })
    }

    /// Parse a single-part identifier (a column name).
    pub fn column(s: &str) -> OrmResult<Self> {
        let ident = Self::parse(s)?;
        if ident.parts.len() != 1 {
            return Err(OrmError::schema(format!(
                "Column name '{s}' must not be qualified"
            )));
        }
        Ok(ident)
    }

    /// The unquoted name of the last part (the column or table name itself).
    pub fn name(&self) -> &str {
        self.parts.last().map(String::as_str).unwrap_or_default()
    }

    /// Render the identifier as SQL.
    pub fn to_sql(&self) -> String {
        let mut out = String::with_capacity(self.parts.iter().map(|p| p.len() + 3).sum());
        self.write_sql(&mut out);
        out
    }

    pub(crate) fn write_sql(&self, out: &mut String) {
        for (i, part) in self.parts.iter().enumerate() {
            if i > 0 {
                out.push('.');
            }
            out.push('"');
            for ch in part.chars() {
                if ch == '"' {
                    out.push('"');
                }
                out.push(ch);
            }
            out.push('"');
        }
    }
}

impl std::fmt::Display for Ident {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_sql())
    }
}
