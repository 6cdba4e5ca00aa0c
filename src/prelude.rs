//! Assembly of the oscillator program.
//!
//! The prelude binds the buffers and constants the loop template reads, in a
//! fixed order, then appends the parsed loop and a return of one fixed
//! element. Generated code resolves names in order of binding, so the order
//! below is part of the contract with the backend.

use tracing::{debug, instrument};

use crate::error::{Error, Result};
use crate::ir::{Expr, Program, Stmt};
use crate::parser::{MiniParser, SourceParser};
use crate::schema::Bindings;
use crate::template::{LoopTemplate, ResultSource, TemplateVariant};
use crate::types::{ScalarType, Val};
use crate::wavetable::{self, SUPPORTED_BIT_DEPTH};

/// Carrier frequency of the reference program, in Hz.
pub const DEFAULT_FREQUENCY: f64 = 440.0;

/// Inputs to [`assemble`].
#[derive(Debug, Clone, PartialEq)]
pub struct PreludeConfig {
    /// Samples per second. Only used to derive the table step ratio.
    pub sample_rate: u32,
    /// Length of the sine wavetable.
    pub table_size: usize,
    /// Number of phase accumulators.
    pub generator_count: usize,
    /// Length of the output buffer, and the loop bound.
    pub sample_count: usize,
    pub bit_depth: u32,
    pub frequency: f64,
    pub variant: TemplateVariant,
    pub bindings: Bindings,
}

impl Default for PreludeConfig {
    fn default() -> Self {
        PreludeConfig {
            sample_rate: 44_100,
            table_size: 12,
            generator_count: 1,
            sample_count: 4,
            bit_depth: SUPPORTED_BIT_DEPTH,
            frequency: DEFAULT_FREQUENCY,
            variant: TemplateVariant::default(),
            bindings: Bindings::STANDARD,
        }
    }
}

impl PreludeConfig {
    /// Reference configuration with the four sizing parameters replaced.
    pub fn new(
        sample_rate: u32,
        table_size: usize,
        generator_count: usize,
        sample_count: usize,
    ) -> Self {
        PreludeConfig {
            sample_rate,
            table_size,
            generator_count,
            sample_count,
            ..Self::default()
        }
    }

    pub fn with_variant(mut self, variant: TemplateVariant) -> Self {
        self.variant = variant;
        self
    }

    pub fn with_bindings(mut self, bindings: Bindings) -> Self {
        self.bindings = bindings;
        self
    }

    /// Table step per output sample: `table_size / sample_rate`.
    pub fn ratio(&self) -> f64 {
        self.table_size as f64 / f64::from(self.sample_rate)
    }

    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(invalid("sample rate must be positive"));
        }
        if self.table_size == 0 {
            return Err(invalid("table size must be positive"));
        }
        if self.sample_count == 0 {
            return Err(invalid("sample count must be positive"));
        }
        if !self.frequency.is_finite() {
            return Err(invalid(format!("frequency {} is not finite", self.frequency)));
        }
        match self.variant.result {
            ResultSource::Sine(k) if k >= self.table_size => {
                return Err(invalid(format!(
                    "result reads sine[{k}] but the table has {} entries",
                    self.table_size
                )));
            }
            ResultSource::Output(k) if k >= self.sample_count => {
                return Err(invalid(format!(
                    "result reads output[{k}] but the buffer has {} samples",
                    self.sample_count
                )));
            }
            _ => {}
        }
        self.bindings.validate().map_err(Error::InvalidConfig)
    }
}

fn invalid(message: impl Into<String>) -> Error {
    Error::InvalidConfig(message.into())
}

/// Build the oscillator program for `config`, parsing the rendered loop with
/// `parser`.
#[instrument(level = "debug", skip_all, fields(
    sample_rate = config.sample_rate,
    table_size = config.table_size,
    sample_count = config.sample_count,
))]
pub fn assemble(config: &PreludeConfig, parser: &dyn SourceParser) -> Result<Program> {
    config.validate()?;
    let names = &config.bindings;
    let table = wavetable::generate(config.bit_depth, config.table_size)?;
    debug!(bit_depth = table.bit_depth(), entries = table.len(), "generated wavetable");

    let mut stmts = Vec::with_capacity(8);
    stmts.push(Stmt::assign(
        names.output,
        Expr::zeroed_array(ScalarType::U8, config.sample_count),
    ));
    stmts.push(Stmt::assign(
        names.sine,
        Expr::StaticArray(
            ScalarType::U8,
            table.to_u8().into_iter().map(Val::U8).collect(),
        ),
    ));
    stmts.push(Stmt::assign(
        names.phase_table,
        Expr::zeroed_array(ScalarType::F64, config.generator_count),
    ));
    stmts.push(Stmt::assign(
        names.sample_count,
        Expr::Lit(Val::U64(config.sample_count as u64)),
    ));
    stmts.push(Stmt::assign(names.freq, Expr::Lit(Val::F64(config.frequency))));

    let source = LoopTemplate::for_variant(&config.variant, *names).render(config.ratio())?;
    debug!(ratio = config.ratio(), "rendered loop template");
    stmts.push(Stmt::Block(parser.parse(&source)?));

    let (array, k) = match config.variant.result {
        ResultSource::Sine(k) => (names.sine, k),
        ResultSource::Output(k) => (names.output, k),
    };
    stmts.push(Stmt::assign(
        names.result,
        Expr::index(array, Expr::Lit(Val::U64(k as u64))),
    ));
    stmts.push(Stmt::Return(Expr::var(names.result)));

    Ok(Program::new(stmts))
}

/// [`assemble`] with the reference frequency, the plain copy loop and the
/// bundled parser.
pub fn assemble_default(
    sample_rate: u32,
    table_size: usize,
    generator_count: usize,
    sample_count: usize,
) -> Result<Program> {
    assemble(
        &PreludeConfig::new(sample_rate, table_size, generator_count, sample_count),
        &MiniParser::new(),
    )
}

// ── Instruments ──────────────────────────────────────────────────────────────

/// An instrument's generator definition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeneratorDef {
    pub name: String,
    /// Semitone offset from the carrier.
    pub transpose: i32,
}

/// Statements realising `def`. Instruments are not compiled yet, so this
/// contributes nothing to a program.
pub fn compile_generator_def(def: &GeneratorDef) -> Vec<Stmt> {
    debug!(name = %def.name, "instrument definitions are not compiled");
    Vec::new()
}
