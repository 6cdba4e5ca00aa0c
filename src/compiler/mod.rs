//! IR → native machine code.
//!
//! The harness in [`crate::runtime`] only ever sees a [`MachineCode`] buffer,
//! so any code generator can sit behind [`Backend`]. The bundled
//! [`CraneliftBackend`] compiles for the host ISA and produces a
//! zero-argument function returning a `u8` in the C calling convention,
//! which is what the harness assumes.

pub mod codegen;

use std::fmt;

use crate::error::Result;
use crate::ir::Program;

pub use codegen::CraneliftBackend;

/// Finished machine code for one zero-argument, `u8`-returning function.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MachineCode(Vec<u8>);

impl MachineCode {
    pub fn new(bytes: Vec<u8>) -> Self {
        MachineCode(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for MachineCode {
    fn from(bytes: Vec<u8>) -> Self {
        MachineCode(bytes)
    }
}

impl AsRef<[u8]> for MachineCode {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for MachineCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", crate::runtime::hex_dump(&self.0))
    }
}

/// Compiles an IR program to machine code.
pub trait Backend {
    /// Architecture the produced code runs on, e.g. `"x86_64"`.
    fn target(&self) -> &'static str;

    fn compile(&self, program: &Program) -> Result<MachineCode>;
}

/// Backend whose output can run on this machine.
pub fn host_backend() -> Box<dyn Backend> {
    Box::new(CraneliftBackend::new())
}
