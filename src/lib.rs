//! wavejit: builds a tiny sine-oscillator program, compiles it to native code
//! and runs it in-process.
//!
//! The pipeline is wavetable → prelude IR (with the loop template parsed in)
//! → [`Backend`] → executable memory → one native call.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use wavejit::{PreludeConfig, Runtime};
//!
//! let rt = Runtime::new();
//! let execution = rt.run(&PreludeConfig::default()).unwrap();
//! assert_eq!(execution.result, 128);
//! println!("{execution}");
//! ```

pub mod compiler;
pub mod error;
pub mod ir;
pub mod memory;
pub mod parser;
pub mod prelude;
pub mod runtime;
pub mod schema;
pub mod template;
pub mod types;
pub mod wavetable;

pub use compiler::{host_backend, Backend, MachineCode, CraneliftBackend};
pub use error::{Error, Result};
pub use ir::{Expr, Program, Stmt};
pub use memory::ExecutableRegion;
pub use parser::{MiniParser, SourceParser};
pub use prelude::{assemble, assemble_default, PreludeConfig};
pub use runtime::{execute, Execution, Runtime};
pub use schema::Bindings;
pub use template::{LoopBody, LoopTemplate, ResultSource, TemplateVariant};
pub use types::{ScalarType, Val, ValType};
pub use wavetable::Wavetable;
