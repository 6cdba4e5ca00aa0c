//! Native execution harness and the end-to-end pipeline.

use std::fmt;

use tracing::{debug, info, instrument};

use crate::compiler::{host_backend, Backend, MachineCode};
use crate::error::{Error, Result};
use crate::ir::Program;
use crate::memory::ExecutableRegion;
use crate::parser::{MiniParser, SourceParser};
use crate::prelude::{self, PreludeConfig};

/// Signature every backend must emit: no parameters, one byte returned in
/// the platform's scalar return register (`al` on x86-64).
pub type EntryPoint = unsafe extern "C" fn() -> u8;

/// Call the code at the start of `region` once and return its byte.
///
/// # Safety
///
/// The region must hold a complete function for the host architecture that
/// follows [`EntryPoint`]'s convention: it takes no arguments, preserves
/// callee-saved registers and the stack, returns its result in the scalar
/// return register, and terminates. Nothing here can check that; code that
/// violates it is undefined behaviour and usually kills the process.
pub unsafe fn invoke(region: &ExecutableRegion) -> u8 {
    // SAFETY: caller upholds the contract above; the region is mapped
    // executable and stays alive for the duration of the call.
    unsafe {
        let entry = std::mem::transmute::<*const u8, EntryPoint>(region.as_ptr());
        entry()
    }
}

/// Outcome of one native call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Execution {
    /// Byte returned by the generated function.
    pub result: u8,
    /// The machine code as it sat in executable memory.
    pub code: Vec<u8>,
}

impl Execution {
    pub fn code_len(&self) -> usize {
        self.code.len()
    }

    pub fn hex_dump(&self) -> String {
        hex_dump(&self.code)
    }
}

impl fmt::Display for Execution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Size   : {} bytes", self.code_len())?;
        writeln!(f, "Value  : {}", self.result)?;
        writeln!(f)?;
        write!(f, "{}", self.hex_dump())
    }
}

/// Offset-prefixed hex listing, eight bytes per line.
pub fn hex_dump(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 5 + bytes.len() / 8 * 8);
    for (line, chunk) in bytes.chunks(8).enumerate() {
        out.push_str(&format!("{:04x}:", line * 8));
        for b in chunk {
            out.push_str(&format!(" 0x{b:02x}"));
        }
        out.push('\n');
    }
    out
}

/// Copy `code` into fresh executable memory, call it once, and unmap it.
///
/// The code must follow the [`invoke`] contract. An empty buffer is rejected
/// with [`Error::MemoryMap`] before anything is mapped.
#[instrument(level = "debug", skip_all, fields(len = code.len()))]
pub fn execute(code: &MachineCode) -> Result<Execution> {
    let region = ExecutableRegion::with_code(code.as_bytes())?;
    debug!(addr = ?region.as_ptr(), "invoking generated code");
    // SAFETY: `MachineCode` comes from a `Backend`, whose contract is to emit
    // an `EntryPoint` function for this host.
    let result = unsafe { invoke(&region) };
    let execution = Execution {
        result,
        code: region.as_slice().to_vec(),
    };
    info!(size = execution.code_len(), value = result, "executed");
    debug!("\n{}", execution.hex_dump());
    Ok(execution)
}

/// Runs the pipeline: assemble the prelude, compile it, execute it.
pub struct Runtime {
    backend: Box<dyn Backend>,
    parser: Box<dyn SourceParser>,
}

impl Runtime {
    /// Runtime using the host's native backend and the bundled parser.
    pub fn new() -> Self {
        Runtime {
            backend: host_backend(),
            parser: Box::new(MiniParser::new()),
        }
    }

    pub fn with_backend(backend: impl Backend + 'static) -> Self {
        Runtime {
            backend: Box::new(backend),
            parser: Box::new(MiniParser::new()),
        }
    }

    pub fn with_parser(mut self, parser: impl SourceParser + 'static) -> Self {
        self.parser = Box::new(parser);
        self
    }

    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    /// Build the IR program for `config`.
    pub fn assemble(&self, config: &PreludeConfig) -> Result<Program> {
        prelude::assemble(config, self.parser.as_ref())
    }

    /// Assemble and compile, without executing.
    #[instrument(level = "debug", skip_all, fields(arch = self.backend.target()))]
    pub fn compile(&self, config: &PreludeConfig) -> Result<(Program, MachineCode)> {
        let program = self.assemble(config)?;
        debug!("assembled prelude:\n{program}");
        let code = self.backend.compile(&program)?;
        if code.is_empty() {
            return Err(Error::Compile("backend produced no code".into()));
        }
        Ok((program, code))
    }

    /// Execute code produced by this runtime's backend. Code for another
    /// architecture is refused rather than jumped to.
    pub fn execute(&self, code: &MachineCode) -> Result<Execution> {
        if self.backend.target() != std::env::consts::ARCH {
            return Err(Error::TargetMismatch {
                target: self.backend.target(),
                host: std::env::consts::ARCH,
            });
        }
        execute(code)
    }

    /// Assemble, compile and execute once.
    pub fn run(&self, config: &PreludeConfig) -> Result<Execution> {
        let (_, code) = self.compile(config)?;
        self.execute(&code)
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}
