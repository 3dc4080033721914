//! Classification of native driver errors.
//!
//! Every error the native driver reports is tagged with a [`NativeErrorClass`] (the
//! driver's own exception hierarchy) and, when the server supplied one, a SQLSTATE
//! code. [`classify`] turns that into a [`TaxonomyError`] whose [`ErrorKind`] drives
//! recovery: [`TaxonomyError::connection_error`] decides whether the connection must
//! be thrown away, [`TaxonomyError::unique_error`] lets callers tell an expected
//! constraint race from a real failure.

use std::fmt;

use thiserror::Error;

/// SQLSTATE for `unique_violation`.
pub const UNIQUE_VIOLATION: &str = "23505";

/// SQLSTATE class prefix for "connection exception".
pub const CLASS_CONNECTION_EXCEPTION: &str = "08";

/// Error classes reported by the native driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeErrorClass {
    Warning,
    Interface,
    Database,
    Data,
    Operational,
    Integrity,
    Internal,
    Programming,
    NotSupported,
}

impl NativeErrorClass {
    /// Map a SQLSTATE code to the driver error class it is raised as.
    #[must_use]
    pub fn from_sqlstate(code: &str) -> Self {
        let class = code.get(..2).unwrap_or(code);
        match class {
            "01" => NativeErrorClass::Warning,
            "0A" => NativeErrorClass::NotSupported,
            "08" | "26" | "27" | "28" | "34" | "40" | "53" | "54" | "55" | "57" | "58"
            | "HV" => NativeErrorClass::Operational,
            "20" | "21" | "3D" | "3F" | "42" | "44" => NativeErrorClass::Programming,
            "22" => NativeErrorClass::Data,
            "23" => NativeErrorClass::Integrity,
            "24" | "25" | "2B" | "2D" | "2F" | "38" | "39" | "3B" | "F0" | "P0" | "XX" => {
                NativeErrorClass::Internal
            }
            _ => NativeErrorClass::Database,
        }
    }
}

/// An error as reported by the native driver, before classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeError {
    pub class: NativeErrorClass,
    pub code: Option<String>,
    pub message: String,
}

impl NativeError {
    #[must_use]
    pub fn new(class: NativeErrorClass, message: impl Into<String>) -> Self {
        Self {
            class,
            code: None,
            message: message.into(),
        }
    }

    /// Build an error from a server-reported SQLSTATE; the class follows the code.
    #[must_use]
    pub fn with_sqlstate(code: impl Into<String>, message: impl Into<String>) -> Self {
        let code = code.into();
        Self {
            class: NativeErrorClass::from_sqlstate(&code),
            code: Some(code),
            message: message.into(),
        }
    }

    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

impl fmt::Display for NativeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{} [{code}]", self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for NativeError {}

/// Taxonomy kind of a classified driver error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Operational,
    Interface,
    Data,
    Integrity,
    Internal,
    Programming,
    /// Fallback for driver classes with no dedicated kind.
    Generic,
    /// Informational condition; never returned from connection operations.
    Warning,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Operational => "operational",
            ErrorKind::Interface => "interface",
            ErrorKind::Data => "data",
            ErrorKind::Integrity => "integrity",
            ErrorKind::Internal => "internal",
            ErrorKind::Programming => "programming",
            ErrorKind::Generic => "database",
            ErrorKind::Warning => "warning",
        };
        f.write_str(name)
    }
}

/// A native error together with its taxonomy kind.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} error: {native}")]
pub struct TaxonomyError {
    kind: ErrorKind,
    #[source]
    native: NativeError,
}

impl TaxonomyError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    #[must_use]
    pub fn native(&self) -> &NativeError {
        &self.native
    }

    #[must_use]
    pub fn code(&self) -> Option<&str> {
        self.native.code.as_deref()
    }

    #[must_use]
    pub fn is_warning(&self) -> bool {
        self.kind == ErrorKind::Warning
    }

    /// True when the connection that produced this error can no longer be trusted.
    ///
    /// With a SQLSTATE the answer is whether it belongs to the connection-exception
    /// class; data, integrity and programming errors never qualify. Without a code
    /// only operational failures (lost socket, server gone) qualify.
    #[must_use]
    pub fn connection_error(&self) -> bool {
        if matches!(
            self.kind,
            ErrorKind::Data | ErrorKind::Integrity | ErrorKind::Programming
        ) {
            return false;
        }
        match self.code() {
            Some(code) => code.starts_with(CLASS_CONNECTION_EXCEPTION),
            None => self.kind == ErrorKind::Operational,
        }
    }

    /// True iff the error is a unique-constraint violation.
    #[must_use]
    pub fn unique_error(&self) -> bool {
        self.code() == Some(UNIQUE_VIOLATION)
    }
}

/// Classify a native driver error.
#[must_use]
pub fn classify(native: NativeError) -> TaxonomyError {
    let kind = match native.class {
        NativeErrorClass::Warning => ErrorKind::Warning,
        NativeErrorClass::Interface => ErrorKind::Interface,
        NativeErrorClass::Data => ErrorKind::Data,
        NativeErrorClass::Operational => ErrorKind::Operational,
        NativeErrorClass::Integrity => ErrorKind::Integrity,
        NativeErrorClass::Internal => ErrorKind::Internal,
        NativeErrorClass::Programming => ErrorKind::Programming,
        NativeErrorClass::Database | NativeErrorClass::NotSupported => ErrorKind::Generic,
    };
    TaxonomyError { kind, native }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coded(class: NativeErrorClass, code: &str) -> TaxonomyError {
        classify(NativeError::new(class, "boom").with_code(code))
    }

    fn bare(class: NativeErrorClass) -> TaxonomyError {
        classify(NativeError::new(class, "boom"))
    }

    #[test]
    fn classes_map_to_kinds() {
        assert_eq!(bare(NativeErrorClass::Operational).kind(), ErrorKind::Operational);
        assert_eq!(bare(NativeErrorClass::Interface).kind(), ErrorKind::Interface);
        assert_eq!(bare(NativeErrorClass::Data).kind(), ErrorKind::Data);
        assert_eq!(bare(NativeErrorClass::Integrity).kind(), ErrorKind::Integrity);
        assert_eq!(bare(NativeErrorClass::Internal).kind(), ErrorKind::Internal);
        assert_eq!(bare(NativeErrorClass::Programming).kind(), ErrorKind::Programming);
        assert_eq!(bare(NativeErrorClass::Warning).kind(), ErrorKind::Warning);
        assert_eq!(bare(NativeErrorClass::Database).kind(), ErrorKind::Generic);
        assert_eq!(bare(NativeErrorClass::NotSupported).kind(), ErrorKind::Generic);
    }

    #[test]
    fn sqlstate_classes() {
        assert_eq!(NativeErrorClass::from_sqlstate("08006"), NativeErrorClass::Operational);
        assert_eq!(NativeErrorClass::from_sqlstate("23505"), NativeErrorClass::Integrity);
        assert_eq!(NativeErrorClass::from_sqlstate("22012"), NativeErrorClass::Data);
        assert_eq!(NativeErrorClass::from_sqlstate("42P01"), NativeErrorClass::Programming);
        assert_eq!(NativeErrorClass::from_sqlstate("XX000"), NativeErrorClass::Internal);
        assert_eq!(NativeErrorClass::from_sqlstate("01000"), NativeErrorClass::Warning);
        assert_eq!(NativeErrorClass::from_sqlstate("0A000"), NativeErrorClass::NotSupported);
        assert_eq!(NativeErrorClass::from_sqlstate("ZZ999"), NativeErrorClass::Database);
    }

    #[test]
    fn unique_error_only_for_unique_violation() {
        assert!(coded(NativeErrorClass::Integrity, UNIQUE_VIOLATION).unique_error());
        assert!(!coded(NativeErrorClass::Integrity, "23503").unique_error());
        assert!(!coded(NativeErrorClass::Operational, "08006").unique_error());
        assert!(!bare(NativeErrorClass::Integrity).unique_error());
    }

    #[test]
    fn connection_error_with_code() {
        assert!(coded(NativeErrorClass::Operational, "08006").connection_error());
        assert!(coded(NativeErrorClass::Database, "08003").connection_error());
        assert!(!coded(NativeErrorClass::Operational, "57014").connection_error());
        assert!(!coded(NativeErrorClass::Integrity, "23505").connection_error());
    }

    #[test]
    fn connection_error_without_code() {
        assert!(bare(NativeErrorClass::Operational).connection_error());
        assert!(!bare(NativeErrorClass::Data).connection_error());
        assert!(!bare(NativeErrorClass::Integrity).connection_error());
        assert!(!bare(NativeErrorClass::Programming).connection_error());
    }

    #[test]
    fn display_includes_kind_and_code() {
        let err = coded(NativeErrorClass::Integrity, "23505");
        assert_eq!(err.to_string(), "integrity error: boom [23505]");
    }
}
