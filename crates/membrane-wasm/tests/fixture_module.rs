//! Integration test: a session over a real wasm module.
//!
//! The module below is a toy engine written in WAT. It keeps the exported
//! ABI but none of the search: an expression's outputs are the sum of its
//! inputs plus the output index, its chromosome is three genes, every
//! equation repeats the first input symbol, the loss sums the first label
//! row and the constants, and each descent step subtracts one from every
//! constant. Frees and destroys are counted in globals exposed through
//! `frees` and `destroys`.

use membrane_core::{
    BridgeError, EngineBinding, EngineError, ErrorCode, ExpressionParams, LinearMemory, PAGE_SIZE,
};
use membrane_engine::{Session, SessionConfig};
use membrane_wasm::WasmEngine;

const TOY_ENGINE: &str = r#"
(module
  (memory (export "memory") 1)
  (global $heap (mut i32) (i32.const 1024))
  (global $frees (mut i32) (i32.const 0))
  (global $destroys (mut i32) (i32.const 0))

  (func $malloc (export "malloc") (param $size i32) (result i32)
    (local $start i32) (local $end i32) (local $have i32)
    (local.set $start
      (i32.and (i32.add (global.get $heap) (i32.const 15)) (i32.const -16)))
    (local.set $end (i32.add (local.get $start) (local.get $size)))
    (local.set $have (i32.shl (memory.size) (i32.const 16)))
    (if (i32.gt_u (local.get $end) (local.get $have))
      (then
        (if (i32.eq
              (memory.grow
                (i32.shr_u
                  (i32.add (i32.sub (local.get $end) (local.get $have)) (i32.const 65535))
                  (i32.const 16)))
              (i32.const -1))
          (then (unreachable)))))
    (global.set $heap (local.get $end))
    (local.get $start))

  (func $count_free (param i32)
    (global.set $frees (i32.add (global.get $frees) (i32.const 1))))
  (func $count_destroy (param i32)
    (global.set $destroys (i32.add (global.get $destroys) (i32.const 1))))

  (func (export "frees") (result i32) (global.get $frees))
  (func (export "destroys") (result i32) (global.get $destroys))

  (func (export "kernel_set_constructor") (param $names i32) (param $count i32) (result i32)
    (local $ks i32)
    (if (i32.eqz (local.get $count)) (then (return (i32.const 0))))
    (local.set $ks (call $malloc (i32.const 4)))
    (i32.store (local.get $ks) (local.get $count))
    (local.get $ks))

  (func (export "kernel_set_destroy") (param $ks i32)
    (call $count_destroy (local.get $ks)))

  (func (export "expression_constructor")
    (param $inputs i32) (param $outputs i32) (param $rows i32) (param $columns i32)
    (param $levels_back i32) (param $arity i32) (param $kernels i32) (param $seed f64)
    (result i32)
    (local $e i32)
    (if (i32.eqz (local.get $kernels)) (then (return (i32.const 0))))
    (local.set $e (call $malloc (i32.const 24)))
    (i32.store offset=0 (local.get $e) (local.get $inputs))
    (i32.store offset=4 (local.get $e) (local.get $outputs))
    (i32.store offset=8 (local.get $e) (local.get $inputs))
    (i32.store offset=12 (local.get $e) (local.get $outputs))
    (i32.store offset=16 (local.get $e) (i32.trunc_f64_u (local.get $seed)))
    (local.get $e))

  (func (export "expression_destroy") (param $e i32)
    (call $count_destroy (local.get $e)))

  (func (export "expression_get_chromosome") (param $e i32) (param $len_out i32) (result i32)
    (local $genes i32)
    (i32.store (local.get $len_out) (i32.const 3))
    (local.set $genes (call $malloc (i32.const 12)))
    (memory.copy (local.get $genes) (i32.add (local.get $e) (i32.const 8)) (i32.const 12))
    (local.get $genes))

  (func (export "expression_set_chromosome") (param $e i32) (param $genes i32) (param $len i32)
    (if (i32.ne (local.get $len) (i32.const 3)) (then (unreachable)))
    (memory.copy (i32.add (local.get $e) (i32.const 8)) (local.get $genes) (i32.const 12)))

  (func (export "expression_evaluate") (param $e i32) (param $in i32) (result i32)
    (local $n i32) (local $o i32) (local $i i32) (local $sum f64) (local $out i32)
    (local.set $n (i32.load (local.get $e)))
    (local.set $o (i32.load offset=4 (local.get $e)))
    (block $summed
      (loop $sum_inputs
        (br_if $summed (i32.ge_u (local.get $i) (local.get $n)))
        (local.set $sum
          (f64.add (local.get $sum)
            (f64.load (i32.add (local.get $in) (i32.shl (local.get $i) (i32.const 3))))))
        (local.set $i (i32.add (local.get $i) (i32.const 1)))
        (br $sum_inputs)))
    (local.set $out (call $malloc (i32.shl (local.get $o) (i32.const 3))))
    (local.set $i (i32.const 0))
    (block $written
      (loop $write
        (br_if $written (i32.ge_u (local.get $i) (local.get $o)))
        (f64.store (i32.add (local.get $out) (i32.shl (local.get $i) (i32.const 3)))
          (f64.add (local.get $sum) (f64.convert_i32_u (local.get $i))))
        (local.set $i (i32.add (local.get $i) (i32.const 1)))
        (br $write)))
    (local.get $out))

  (func (export "expression_equation") (param $e i32) (param $symbols i32) (result i32)
    (local $o i32) (local $record i32) (local $out i32) (local $i i32)
    (local.set $o (i32.load offset=4 (local.get $e)))
    (local.set $record (i32.add (i32.load (local.get $symbols)) (i32.const 4)))
    (local.set $out (call $malloc (i32.mul (local.get $o) (local.get $record))))
    (block $copied
      (loop $copy
        (br_if $copied (i32.ge_u (local.get $i) (local.get $o)))
        (memory.copy
          (i32.add (local.get $out) (i32.mul (local.get $i) (local.get $record)))
          (local.get $symbols)
          (local.get $record))
        (local.set $i (i32.add (local.get $i) (i32.const 1)))
        (br $copy)))
    (local.get $out))

  (func (export "expression_loss")
    (param $e i32) (param $inputs i32) (param $labels i32) (param $points i32)
    (param $constants i32) (param $count i32)
    (result f64)
    (local $i i32) (local $acc f64)
    (block $labels_done
      (loop $add_labels
        (br_if $labels_done (i32.ge_u (local.get $i) (local.get $points)))
        (local.set $acc
          (f64.add (local.get $acc)
            (f64.load (i32.add (local.get $labels) (i32.shl (local.get $i) (i32.const 3))))))
        (local.set $i (i32.add (local.get $i) (i32.const 1)))
        (br $add_labels)))
    (local.set $i (i32.const 0))
    (block $constants_done
      (loop $add_constants
        (br_if $constants_done (i32.ge_u (local.get $i) (local.get $count)))
        (local.set $acc
          (f64.add (local.get $acc)
            (f64.load (i32.add (local.get $constants) (i32.shl (local.get $i) (i32.const 3))))))
        (local.set $i (i32.add (local.get $i) (i32.const 1)))
        (br $add_constants)))
    (local.get $acc))

  (func (export "gradient_descent")
    (param $e i32) (param $steps i32) (param $inputs i32) (param $labels i32)
    (param $points i32) (param $constants i32) (param $count i32)
    (result f64)
    (local $i i32) (local $at i32)
    (block $done
      (loop $step
        (br_if $done (i32.ge_u (local.get $i) (local.get $count)))
        (local.set $at (i32.add (local.get $constants) (i32.shl (local.get $i) (i32.const 3))))
        (f64.store (local.get $at)
          (f64.sub (f64.load (local.get $at)) (f64.convert_i32_u (local.get $steps))))
        (local.set $i (i32.add (local.get $i) (i32.const 1)))
        (br $step)))
    (f64.convert_i32_u (local.get $steps)))

  (func (export "delete_double_array") (param $a i32) (call $count_free (local.get $a)))
  (func (export "delete_uint32_array") (param $a i32) (call $count_free (local.get $a)))
  (func (export "delete_string") (param $a i32) (call $count_free (local.get $a)))
)
"#;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn toy_engine() -> WasmEngine {
    init_tracing();
    let bytes = wat::parse_str(TOY_ENGINE).unwrap();
    WasmEngine::from_bytes(bytes).unwrap()
}

fn small_scratch() -> SessionConfig {
    SessionConfig {
        scratch_bytes: 64 * 1024,
        ..SessionConfig::default()
    }
}

fn counter(engine: &mut WasmEngine, export: &'static str) -> u32 {
    engine.invoke::<(), u32>(export, ()).unwrap()
}

#[test]
fn scratch_reservation_grows_the_module_memory() {
    let mut engine = toy_engine();
    assert_eq!(engine.size(), PAGE_SIZE as usize);
    let at = engine.reserve_scratch(64 * 1024).unwrap();
    assert!(at.is_aligned(16));
    assert!(engine.size() >= at.as_usize() + 64 * 1024);
}

#[test]
fn host_grow_reports_previous_size() {
    let mut engine = toy_engine();
    assert_eq!(engine.grow(2).unwrap(), 1);
    assert_eq!(engine.size(), 3 * PAGE_SIZE as usize);
}

#[test]
fn session_runs_over_the_module() {
    let mut engine = toy_engine();
    {
        let mut s = Session::new(&mut engine, small_scratch()).unwrap();
        let kernels = s.create_kernel_set(&["sum", "mul"]).unwrap();
        let params = ExpressionParams::new(2, 2).with_seed(7);
        let expr = s.create_expression(params, kernels).unwrap();

        let point = s.evaluate(expr, &[1.0, 2.0]).unwrap().into_point().unwrap();
        assert_eq!(point, vec![3.0, 4.0]);

        let batch = s
            .evaluate(expr, &[vec![1.0, 3.0], vec![2.0, 4.0]])
            .unwrap()
            .into_batch()
            .unwrap();
        assert_eq!(batch, vec![vec![3.0, 7.0], vec![4.0, 8.0]]);

        assert_eq!(s.chromosome(expr).unwrap(), vec![2, 2, 7]);
        s.set_chromosome(expr, &[9, 8, 7]).unwrap();
        assert_eq!(s.chromosome(expr).unwrap(), vec![9, 8, 7]);

        let equations = s.equations(expr, &["x\u{2080}", "y"]).unwrap();
        assert_eq!(equations, vec!["x\u{2080}".to_owned(), "x\u{2080}".to_owned()]);

        assert_eq!(s.scratch().used(), 0);
    }
    // Two evaluations of the batch plus one point, two chromosome reads
    // and one equation buffer.
    assert_eq!(counter(&mut engine, "frees"), 6);
    // Session drop destroys the expression and then the kernel set.
    assert_eq!(counter(&mut engine, "destroys"), 2);
}

#[test]
fn loss_and_descent_pass_the_data_set_through() {
    let mut engine = toy_engine();
    let mut s = Session::new(&mut engine, small_scratch()).unwrap();
    let kernels = s.create_kernel_set(&["sum"]).unwrap();
    let expr = s
        .create_expression(ExpressionParams::new(3, 1), kernels)
        .unwrap();
    let inputs = [vec![0.0, 0.0, 0.0]];
    let labels = [vec![1.0, 2.0, 3.0]];

    let loss = s.loss(expr, &inputs, &labels, &[0.25, 0.25]).unwrap();
    assert_eq!(loss, 6.5);

    let outcome = s
        .gradient_descent(expr, 2, &inputs, &labels, &[5.0, 6.0])
        .unwrap();
    assert_eq!(outcome.loss, 2.0);
    assert_eq!(outcome.constants, vec![3.0, 4.0]);
}

#[test]
fn engine_trap_is_reported_with_its_entry_point() {
    let mut engine = toy_engine();
    let mut s = Session::new(&mut engine, small_scratch()).unwrap();
    let kernels = s.create_kernel_set(&["sum"]).unwrap();
    let expr = s
        .create_expression(ExpressionParams::new(1, 1), kernels)
        .unwrap();
    let err = s.set_chromosome(expr, &[1, 2]).unwrap_err();
    assert_eq!(err.code(), ErrorCode::EngineTrap);
    assert!(matches!(
        err,
        BridgeError::Engine(EngineError::Trap {
            entry_point: "expression_set_chromosome",
            ..
        })
    ));
    // The instance stays usable after a trap.
    assert_eq!(s.chromosome(expr).unwrap(), vec![1, 1, 0]);
}

#[test]
fn null_kernel_set_is_reported() {
    let mut engine = toy_engine();
    let handle = engine
        .kernel_set_construct(membrane_core::Address(2048), 0)
        .unwrap();
    assert!(handle.is_null());
}

#[test]
fn missing_memory_export_is_rejected() {
    init_tracing();
    let err = WasmEngine::from_bytes(
        r#"(module (func (export "malloc") (param i32) (result i32) (i32.const 0)))"#,
    )
    .unwrap_err();
    assert!(matches!(err, EngineError::Export { name: "memory", .. }));
}

#[test]
fn missing_entry_point_fails_only_when_used() {
    init_tracing();
    let mut engine = WasmEngine::from_bytes(
        r#"(module
             (memory (export "memory") 1)
             (func (export "malloc") (param i32) (result i32) (i32.const 1024)))"#,
    )
    .unwrap();
    let config = SessionConfig {
        scratch_bytes: 4096,
        ..SessionConfig::default()
    };
    let mut s = Session::new(&mut engine, config).unwrap();
    let err = s.create_kernel_set(&["sum"]).unwrap_err();
    assert_eq!(err.code(), ErrorCode::EngineExport);
    assert!(matches!(
        err,
        BridgeError::Engine(EngineError::Export {
            name: "kernel_set_constructor",
            ..
        })
    ));
    assert_eq!(s.scratch().used(), 0);
}

#[test]
fn wrongly_typed_export_is_an_export_error() {
    init_tracing();
    let mut engine = WasmEngine::from_bytes(
        r#"(module
             (memory (export "memory") 1)
             (func (export "malloc") (param i64) (result i64) (i64.const 1024)))"#,
    )
    .unwrap();
    let err = engine.reserve_scratch(64).unwrap_err();
    assert!(matches!(err, EngineError::Export { name: "malloc", .. }));
}

#[test]
fn null_scratch_reservation_is_a_null_buffer() {
    init_tracing();
    let mut engine = WasmEngine::from_bytes(
        r#"(module
             (memory (export "memory") 1)
             (func (export "malloc") (param i32) (result i32) (i32.const 0)))"#,
    )
    .unwrap();
    let err = Session::new(&mut engine, SessionConfig::default())
        .err()
        .unwrap();
    assert_eq!(err.code(), ErrorCode::EngineNull);
}

#[test]
fn invalid_module_is_rejected() {
    init_tracing();
    let err = WasmEngine::from_bytes(b"\0asm garbage").unwrap_err();
    assert!(matches!(
        err,
        EngineError::Rejected {
            entry_point: "compile",
            ..
        }
    ));
}
