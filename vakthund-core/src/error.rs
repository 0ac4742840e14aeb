use std::fmt;
use std::io;

use thiserror::Error;

/// Guarded operation that produced an allocation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocOp {
    Malloc,
    Calloc,
    Realloc,
    AlignedMalloc,
    Strdup,
    Strndup,
}

impl AllocOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            AllocOp::Malloc => "malloc",
            AllocOp::Calloc => "calloc",
            AllocOp::Realloc => "realloc",
            AllocOp::AlignedMalloc => "aligned-malloc",
            AllocOp::Strdup => "strdup",
            AllocOp::Strndup => "strndup",
        }
    }
}

impl fmt::Display for AllocOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the caller asked for. Only used for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocRequest {
    pub size: usize,
    pub count: Option<usize>,
    pub alignment: Option<usize>,
}

impl AllocRequest {
    pub fn bytes(size: usize) -> Self {
        Self {
            size,
            count: None,
            alignment: None,
        }
    }

    pub fn array(count: usize, size: usize) -> Self {
        Self {
            size,
            count: Some(count),
            alignment: None,
        }
    }

    pub fn aligned(size: usize, alignment: usize) -> Self {
        Self {
            size,
            count: None,
            alignment: Some(alignment),
        }
    }
}

impl fmt::Display for AllocRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.count {
            Some(count) => write!(f, "{count} x {} bytes", self.size)?,
            None => write!(f, "{} bytes", self.size)?,
        }
        if let Some(alignment) = self.alignment {
            write!(f, ", alignment {alignment}")?;
        }
        Ok(())
    }
}

/// The raw allocator could not satisfy a guarded request.
#[derive(Debug, Error)]
#[error("{op} failed: {source}, while trying to allocate {request}")]
pub struct AllocationFailed {
    pub op: AllocOp,
    pub request: AllocRequest,
    #[source]
    pub source: io::Error,
}

/// Error code attached to every log entry emitted by the guarded layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogCode {
    /// A raw allocation attempt failed.
    MemAlloc,
    /// The engine cannot finish initializing and is exiting.
    Fatal,
}

impl fmt::Display for LogCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogCode::MemAlloc => "mem_alloc",
            LogCode::Fatal => "fatal",
        })
    }
}
