use crate::error::{Error, Result};
use crate::types::ColumnType;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Longest identifier most engines accept without truncation.
pub const MAX_IDENTIFIER_LENGTH: usize = 63;

/// An identifier that has been escaped by a storage engine's quoting rules.
///
/// Only constructible through an [`IdentifierQuoting`] implementation, so
/// raw user text can never reach a statement unquoted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QuotedIdent {
    raw: String,
    quoted: String,
}

impl QuotedIdent {
    /// The name as the user wrote it.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// The escaped form, safe to splice into a statement.
    pub fn as_sql(&self) -> &str {
        &self.quoted
    }
}

impl fmt::Display for QuotedIdent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.quoted)
    }
}

/// Identifier quoting facility exposed by a storage engine.
pub trait IdentifierQuoting: Send + Sync {
    fn quote_identifier(&self, name: &str) -> Result<QuotedIdent>;
}

/// Double-quote quoting with embedded quotes doubled, as in PostgreSQL.
#[derive(Debug, Clone)]
pub struct AnsiQuoting {
    pub max_length: usize,
}

impl Default for AnsiQuoting {
    fn default() -> Self {
        Self {
            max_length: MAX_IDENTIFIER_LENGTH,
        }
    }
}

impl IdentifierQuoting for AnsiQuoting {
    fn quote_identifier(&self, name: &str) -> Result<QuotedIdent> {
        if name.is_empty() {
            return Err(Error::InvalidIdentifier("identifier cannot be empty".to_string()));
        }
        if name.len() > self.max_length {
            return Err(Error::InvalidIdentifier(format!(
                "identifier \"{}\" is longer than {} bytes",
                name, self.max_length
            )));
        }
        if name.chars().any(|c| c.is_control()) {
            return Err(Error::InvalidIdentifier(
                "identifier cannot contain control characters".to_string(),
            ));
        }
        Ok(QuotedIdent {
            raw: name.to_string(),
            quoted: format!("\"{}\"", name.replace('"', "\"\"")),
        })
    }
}

/// A table qualified into the uploads namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableRef {
    pub schema: QuotedIdent,
    pub name: QuotedIdent,
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: QuotedIdent,
    pub column_type: ColumnType,
}

/// Validated table plus columns, ready to be turned into DDL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    pub table: TableRef,
    pub columns: Vec<ColumnDef>,
}

impl TableSchema {
    pub fn create_statement(&self) -> Statement {
        Statement::CreateTable(CreateTable {
            table: self.table.clone(),
            columns: self.columns.clone(),
        })
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.raw()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateTable {
    pub table: TableRef,
    pub columns: Vec<ColumnDef>,
}

/// DDL understood by the storage collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Statement {
    CreateTable(CreateTable),
    DropTableIfExists(TableRef),
    RenameTable { from: TableRef, to: QuotedIdent },
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Statement::CreateTable(create) => {
                write!(f, "CREATE TABLE {} (", create.table)?;
                for (idx, column) in create.columns.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{} {}", column.name, column.column_type.storage_type())?;
                }
                write!(f, ")")
            }
            Statement::DropTableIfExists(table) => write!(f, "DROP TABLE IF EXISTS {}", table),
            Statement::RenameTable { from, to } => write!(f, "ALTER TABLE {} RENAME TO {}", from, to),
        }
    }
}

/// Turns user-supplied names and inferred types into validated identifiers
/// and DDL.
pub struct SchemaBuilder<'a> {
    quoting: &'a dyn IdentifierQuoting,
    schema_name: String,
}

impl<'a> SchemaBuilder<'a> {
    pub fn new(quoting: &'a dyn IdentifierQuoting, schema_name: impl Into<String>) -> Self {
        Self {
            quoting,
            schema_name: schema_name.into(),
        }
    }

    /// Validate a logical table name and qualify it into the uploads schema.
    pub fn table_ref(&self, table_name: &str) -> Result<TableRef> {
        validate_table_name(table_name)?;
        Ok(TableRef {
            schema: self.quoting.quote_identifier(&self.schema_name)?,
            name: self.quoting.quote_identifier(table_name)?,
        })
    }

    pub fn build(&self, table_name: &str, columns: &[(String, ColumnType)]) -> Result<TableSchema> {
        let table = self.table_ref(table_name)?;
        if columns.is_empty() {
            return Err(Error::InvalidIdentifier(
                "a table needs at least one column".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        let mut defs = Vec::with_capacity(columns.len());
        for (name, column_type) in columns {
            if !seen.insert(name.as_str()) {
                return Err(Error::InvalidIdentifier(format!(
                    "duplicate column name \"{}\"",
                    name
                )));
            }
            defs.push(ColumnDef {
                name: self.quoting.quote_identifier(name)?,
                column_type: *column_type,
            });
        }

        Ok(TableSchema { table, columns: defs })
    }
}

/// Logical table names are restricted to lowercase letters, digits and
/// underscores.
pub fn validate_table_name(table_name: &str) -> Result<()> {
    if table_name.is_empty() {
        return Err(Error::InvalidIdentifier("Table can't be blank".to_string()));
    }
    if table_name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(Error::InvalidIdentifier(format!(
            "Table is too long (maximum is {} characters)",
            MAX_IDENTIFIER_LENGTH
        )));
    }
    if !table_name
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_')
    {
        return Err(Error::InvalidIdentifier(
            "Table can only contain lowercase letters, numbers, and underscores".to_string(),
        ));
    }
    Ok(())
}
