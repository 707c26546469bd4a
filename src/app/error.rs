use serde::Serialize;
use std::fmt;

pub const ERR_BRIDGE_UNAVAILABLE: &str = "ERR_BRIDGE_UNAVAILABLE";
pub const ERR_DISCOVERY: &str = "ERR_DISCOVERY";
pub const ERR_PERSIST_CORRUPTION: &str = "ERR_PERSIST_CORRUPTION";
pub const ERR_PERSIST_VALIDATION: &str = "ERR_PERSIST_VALIDATION";
pub const ERR_LOCK_CONTENTION: &str = "ERR_LOCK_CONTENTION";
pub const ERR_VALIDATION: &str = "ERR_VALIDATION";
pub const ERR_BUSY: &str = "ERR_BUSY";
pub const ERR_SYSTEM: &str = "ERR_SYSTEM";

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AppError {
    pub error: String,
    pub code: String,
    pub trace_id: String,
}

impl AppError {
    pub fn new(code: impl Into<String>, message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            code: code.into(),
            trace_id: trace_id.into(),
        }
    }

    pub fn validation(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new(ERR_VALIDATION, message, trace_id)
    }

    pub fn bridge_unavailable(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new(ERR_BRIDGE_UNAVAILABLE, message, trace_id)
    }

    pub fn discovery(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new(ERR_DISCOVERY, message, trace_id)
    }

    pub fn persist_corruption(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new(ERR_PERSIST_CORRUPTION, message, trace_id)
    }

    pub fn persist_validation(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new(ERR_PERSIST_VALIDATION, message, trace_id)
    }

    pub fn lock_contention(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new(ERR_LOCK_CONTENTION, message, trace_id)
    }

    pub fn busy(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new(ERR_BUSY, message, trace_id)
    }

    pub fn system(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new(ERR_SYSTEM, message, trace_id)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.error, self.code)
    }
}

impl std::error::Error for AppError {}
