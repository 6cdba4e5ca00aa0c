use thiserror::Error;

/// Every way the pipeline can fail before or while handing code to the CPU.
///
/// A fault inside the generated code itself (illegal instruction, segfault)
/// is not represented: it terminates the process.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("unsupported bit depth: {0} (only 8-bit tables are supported)")]
    UnsupportedBitDepth(u32),

    #[error("invalid prelude config: {0}")]
    InvalidConfig(String),

    #[error("template render failed: {0}")]
    TemplateRender(String),

    #[error("parse error at byte {pos}: {message}")]
    Parse { pos: usize, message: String },

    #[error("compile error: {0}")]
    Compile(String),

    #[error("executable memory mapping failed: {0}")]
    MemoryMap(String),

    #[error("code built for {target} cannot run on {host}")]
    TargetMismatch {
        target: &'static str,
        host: &'static str,
    },
}

impl Error {
    /// Short name of the pipeline stage that produced this error.
    pub fn stage(&self) -> &'static str {
        match self {
            Error::UnsupportedBitDepth(_) => "wavetable",
            Error::InvalidConfig(_) => "config",
            Error::TemplateRender(_) => "template",
            Error::Parse { .. } => "parse",
            Error::Compile(_) => "compile",
            Error::MemoryMap(_) | Error::TargetMismatch { .. } => "execute",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
