//! SQL identifier validation.
//!
//! Values always travel as bound parameters. Table and column names cannot,
//! so they are checked here before being spliced into statements.

/// Maximum length for identifiers (table and column names)
pub const MAX_IDENTIFIER_LENGTH: usize = 63;

/// Validates that a string is a safe SQL identifier.
/// Only allows ASCII alphanumeric characters and underscores, starting with a
/// letter or underscore.
pub fn validate_identifier(s: &str) -> Result<(), SqlSanitizeError> {
  let Some(first) = s.chars().next() else {
    return Err(SqlSanitizeError::EmptyIdentifier);
  };

  if s.len() > MAX_IDENTIFIER_LENGTH {
    return Err(SqlSanitizeError::IdentifierTooLong(s.len()));
  }

  if !first.is_ascii_alphabetic() && first != '_' {
    return Err(SqlSanitizeError::InvalidIdentifierStart(first));
  }

  if let Some(c) = s.chars().find(|c| !c.is_ascii_alphanumeric() && *c != '_') {
    return Err(SqlSanitizeError::InvalidIdentifierChar(c));
  }

  let upper = s.to_uppercase();
  if SQL_KEYWORDS.contains(&upper.as_str()) {
    return Err(SqlSanitizeError::ReservedKeyword(s.to_string()));
  }

  Ok(())
}

/// Validates that a page size is within acceptable bounds.
pub fn validate_limit(limit: usize) -> Result<(), SqlSanitizeError> {
  const MAX_LIMIT: usize = 100_000;
  if limit > MAX_LIMIT {
    return Err(SqlSanitizeError::LimitTooLarge(limit, MAX_LIMIT));
  }
  Ok(())
}

/// SQL sanitization errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SqlSanitizeError {
  #[error("Identifier cannot be empty")]
  EmptyIdentifier,
  #[error("Identifier too long: {0} > {max}", max = MAX_IDENTIFIER_LENGTH)]
  IdentifierTooLong(usize),
  #[error("Identifier must start with letter or underscore, got '{0}'")]
  InvalidIdentifierStart(char),
  #[error("Invalid character in identifier: '{0}'")]
  InvalidIdentifierChar(char),
  #[error("'{0}' is a reserved SQL keyword")]
  ReservedKeyword(String),
  #[error("Limit {0} exceeds maximum {1}")]
  LimitTooLarge(usize, usize),
}

/// Common SQL keywords that cannot be used as identifiers
const SQL_KEYWORDS: &[&str] = &[
  "SELECT", "INSERT", "UPDATE", "DELETE", "DROP", "CREATE", "ALTER", "TABLE", "INDEX", "FROM",
  "WHERE", "AND", "OR", "NOT", "NULL", "TRUE", "FALSE", "ORDER", "BY", "ASC", "DESC", "LIMIT",
  "OFFSET", "JOIN", "ON", "AS", "IN", "IS", "UNION", "ALL", "GROUP", "HAVING", "INTO", "VALUES",
  "SET", "PRIMARY", "KEY", "UNIQUE", "DEFAULT", "CONSTRAINT", "TRIGGER", "CONFLICT", "EXCLUDED",
  "MERGE", "MATCHED", "USING", "BEGIN", "COMMIT", "ROLLBACK", "TRANSACTION",
];
