//! Integration tests for the wavejit pipeline.
//!
//! Most tests run the whole chain:
//!   PreludeConfig → assemble → CraneliftBackend::compile → execute
//! Tests that jump into generated code only build on x86-64 Linux, where the
//! executable mapping is known to be allowed.

use wavejit::{
    compiler::Backend,
    ir::{Expr, Program, Stmt},
    parser::{MiniParser, SourceParser},
    prelude::{assemble, PreludeConfig},
    runtime::Runtime,
    schema::Bindings,
    template::{LoopBody, ResultSource, TemplateVariant},
    types::{ScalarType, Val},
    wavetable, Error, CraneliftBackend,
};

// ── Helpers ───────────────────────────────────────────────────────────────────

fn config(sample_count: usize, variant: TemplateVariant) -> PreludeConfig {
    PreludeConfig::new(44_100, 12, 1, sample_count).with_variant(variant)
}

fn output(k: usize) -> TemplateVariant {
    TemplateVariant {
        result: ResultSource::Output(k),
        ..TemplateVariant::default()
    }
}

/// `prefix` followed by the statements parsed from `source`.
fn program(prefix: Vec<Stmt>, source: &str) -> Program {
    let mut stmts = prefix;
    stmts.extend(MiniParser::new().parse(source).unwrap());
    Program::new(stmts)
}

fn u8_array(name: &str, values: &[u8]) -> Stmt {
    Stmt::assign(
        name,
        Expr::StaticArray(ScalarType::U8, values.iter().copied().map(Val::U8).collect()),
    )
}

// ── Assembly and compilation (any host) ──────────────────────────────────────

#[test]
fn test_reference_program_compiles() {
    let program = assemble(&PreludeConfig::default(), &MiniParser::new()).unwrap();
    let code = CraneliftBackend::new().compile(&program).unwrap();
    assert!(!code.is_empty());
    assert_eq!(code, CraneliftBackend::new().compile(&program).unwrap());
}

#[test]
fn test_program_listing_names_every_binding() {
    let program = assemble(&PreludeConfig::default(), &MiniParser::new()).unwrap();
    let listing = program.to_string();
    for name in Bindings::STANDARD.reserved() {
        assert!(listing.contains(name), "`{name}` missing from:\n{listing}");
    }
}

#[test]
fn test_renamed_bindings_flow_through() {
    let bindings = Bindings {
        output: "buf",
        sine: "table",
        counter: "k",
        ..Bindings::STANDARD
    };
    let config = PreludeConfig::default().with_bindings(bindings);
    let program = assemble(&config, &MiniParser::new()).unwrap();
    assert_eq!(
        program.bindings(),
        vec!["buf", "table", "phaseTable", "N", "freq", "result"]
    );
    let listing = program.to_string();
    assert!(listing.contains("while (k != N)"), "{listing}");
    CraneliftBackend::new().compile(&program).unwrap();
}

#[test]
fn test_small_frame_limit_is_a_compile_error() {
    let err = Runtime::with_backend(CraneliftBackend::with_max_frame(16))
        .compile(&PreludeConfig::default())
        .unwrap_err();
    assert!(matches!(err, Error::Compile(_)));
    assert_eq!(err.stage(), "compile");
}

#[test]
fn test_invalid_config_stops_before_compiling() {
    let err = Runtime::with_backend(CraneliftBackend::new())
        .run(&PreludeConfig::new(0, 12, 1, 4))
        .unwrap_err();
    assert_eq!(err.stage(), "config");
}

#[test]
fn test_unsupported_bit_depth_stage() {
    let config = PreludeConfig {
        bit_depth: 12,
        ..PreludeConfig::default()
    };
    let err = Runtime::with_backend(CraneliftBackend::new()).run(&config).unwrap_err();
    assert_eq!(err, Error::UnsupportedBitDepth(12));
    assert_eq!(err.stage(), "wavetable");
}

#[test]
fn test_template_parse_error_surfaces() {
    let err = MiniParser::new()
        .parse("while i != N { output[i] = sine[i]")
        .unwrap_err();
    assert!(matches!(err, Error::Parse { .. }));
}

// ── End to end ────────────────────────────────────────────────────────────────

#[cfg(all(target_arch = "x86_64", target_os = "linux"))]
mod native {
    use super::*;
    use proptest::prelude::*;

    fn rt() -> Runtime {
        Runtime::new()
    }

    fn run_program(p: &Program) -> u8 {
        let code = CraneliftBackend::new().compile(p).unwrap();
        wavejit::execute(&code).unwrap().result
    }

    #[test]
    fn test_reference_run() {
        let table = wavetable::generate(8, 12).unwrap();
        let e = rt().run(&PreludeConfig::default()).unwrap();
        assert!(table.contains(u32::from(e.result)));
        assert_eq!(e.result, 128);
        assert!(e.code_len() > 0);
        assert!(e.to_string().starts_with(&format!("Size   : {} bytes\n", e.code_len())));
    }

    #[test]
    fn test_more_samples_than_table_entries() {
        let table = wavetable::generate(8, 12).unwrap();
        let e = rt()
            .run(&PreludeConfig::new(44_100, 12, 1, 32))
            .unwrap();
        assert!(table.contains(u32::from(e.result)));
    }

    #[test]
    fn test_copy_loop_fills_output() {
        assert_eq!(rt().run(&config(4, output(0))).unwrap().result, 128);
        assert_eq!(rt().run(&config(4, output(3))).unwrap().result, 255);
        assert_eq!(rt().run(&config(12, output(9))).unwrap().result, 0);
    }

    #[test]
    fn test_output_past_the_table_reads_zero() {
        assert_eq!(rt().run(&config(32, output(20))).unwrap().result, 0);
    }

    #[test]
    fn test_scaled_loop() {
        // 255 * (440 * 12 / 44100) = 30.53, truncated on store
        let variant = TemplateVariant {
            body: LoopBody::Scaled,
            result: ResultSource::Output(3),
            inline_return: false,
        };
        assert_eq!(rt().run(&config(4, variant)).unwrap().result, 30);
    }

    #[test]
    fn test_inline_return_wins() {
        let variant = TemplateVariant {
            result: ResultSource::Sine(3),
            inline_return: true,
            ..TemplateVariant::default()
        };
        // the template returns output[0]; the trailing sine[3] read never runs
        assert_eq!(rt().run(&config(4, variant)).unwrap().result, 128);
    }

    #[test]
    fn test_renamed_bindings_run() {
        let bindings = Bindings {
            output: "buf",
            sine: "table",
            counter: "k",
            sample_count: "count",
            ..Bindings::STANDARD
        };
        let config = config(4, output(2)).with_bindings(bindings);
        assert_eq!(rt().run(&config).unwrap().result, 239);
    }

    #[test]
    fn test_code_is_reported_verbatim() {
        let (_, code) = rt().compile(&PreludeConfig::default()).unwrap();
        let e = rt().execute(&code).unwrap();
        assert_eq!(e.code, code.as_bytes());
        assert_eq!(e.hex_dump(), code.to_string());
    }

    #[test]
    fn test_counting_loop() {
        let p = program(
            vec![],
            "s = 0; i = 0
             while i < 10 { s = s + i; i = i + 1 }
             return s",
        );
        assert_eq!(run_program(&p), 45);
    }

    #[test]
    fn test_float_arithmetic_truncates() {
        assert_eq!(run_program(&program(vec![], "x = 2.5 * 4.0; return x")), 10);
        assert_eq!(run_program(&program(vec![], "x = 7.9; return x")), 7);
        assert_eq!(run_program(&program(vec![], "x = 9.0 / 4.0; return x")), 2);
        assert_eq!(run_program(&program(vec![], "return 3 + 0.75 * 4")), 6);
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(run_program(&program(vec![], "return 3 < 5")), 1);
        assert_eq!(run_program(&program(vec![], "return 5 <= 4")), 0);
        assert_eq!(run_program(&program(vec![], "return 2.5 > 1.0")), 1);
        assert_eq!(run_program(&program(vec![], "return 2 == 2.0")), 1);
    }

    #[test]
    fn test_nan_comparisons_follow_ieee() {
        let nan = "z = 0.0; x = z / z; ";
        let run = |tail: &str| run_program(&program(vec![], &format!("{nan}{tail}")));
        assert_eq!(run("return x != x"), 1);
        assert_eq!(run("return x == x"), 0);
        assert_eq!(run("return x < 1.0"), 0);
        assert_eq!(run("return x <= 1.0"), 0);
        assert_eq!(run("return x > 1.0"), 0);
        assert_eq!(run("return x >= 1.0"), 0);
        assert_eq!(run("return 1.0 != x"), 1);
    }

    #[test]
    fn test_nan_loop_condition_is_false() {
        let p = program(
            vec![],
            "z = 0.0; x = z / z; n = 0
             while x < 1.0 { n = n + 1; x = 2.0 }
             return n",
        );
        assert_eq!(run_program(&p), 0);
    }

    #[test]
    fn test_every_opt_level_agrees() {
        let p = program(
            vec![u8_array("a", &[5, 6, 7])],
            "s = 0; i = 0
             while i < 5 { s = s + a[i]; i = i + 1 }
             return s",
        );
        for level in ["none", "speed", "speed_and_size"] {
            let code = CraneliftBackend::new().with_opt_level(level).compile(&p).unwrap();
            assert_eq!(wavejit::execute(&code).unwrap().result, 18, "{level}");
        }
    }

    #[test]
    fn test_return_wraps_to_a_byte() {
        assert_eq!(run_program(&program(vec![], "return 250 + 10")), 4);
        assert_eq!(run_program(&program(vec![], "x = 10 - 3; return x")), 7);
    }

    #[test]
    fn test_out_of_range_accesses_are_contained() {
        let p = program(
            vec![u8_array("a", &[1, 2, 3])],
            "x = 5
             a[100] = 9
             a[1] = a[1] + 40
             return a[0] + a[1] + a[7] + x",
        );
        assert_eq!(run_program(&p), 1 + 42 + 5);
    }

    #[test]
    fn test_u8_stores_do_not_spill() {
        // a[0] = 300 keeps the low byte only; a[1] is untouched
        let p = program(vec![u8_array("a", &[0, 7])], "a[0] = 300; return a[0] + a[1]");
        assert_eq!(run_program(&p), 44 + 7);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_output_mirrors_the_table(
            table_size in 1usize..64,
            sample_count in 1usize..64,
            pick in any::<prop::sample::Index>(),
        ) {
            let k = pick.index(sample_count);
            let table = wavetable::generate(8, table_size).unwrap().to_u8();
            let config = PreludeConfig::new(44_100, table_size, 1, sample_count)
                .with_variant(output(k));
            let expected = table.get(k).copied().unwrap_or(0);
            prop_assert_eq!(rt().run(&config).unwrap().result, expected);
        }
    }
}
