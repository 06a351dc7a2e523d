//! End-to-end behavioral scenarios, run on every backend.

mod common;

use std::sync::Arc;

use rhdl_bir::Design;
use rhdl_bitvec::BitVec;
use rhdl_sim::{BackendKind, RunState, SimParams, Simulation, SimulationError, Watch};
use rstest::rstest;

fn sim(design: &Arc<Design>, backend: BackendKind) -> Simulation {
    Simulation::new(Arc::clone(design), backend, SimParams::default())
}

fn bv(value: u128, width: u32) -> BitVec {
    BitVec::new(value, width).unwrap()
}

#[rstest]
#[case(BackendKind::Interpreter)]
#[case(BackendKind::Bytecode)]
#[case(BackendKind::Compiled)]
fn counter_counts_modulo_width(#[case] backend: BackendKind) {
    let design = common::counter(4);
    let mut sim = sim(&design, backend);
    sim.reset();
    sim.run_ticks(5).unwrap();
    assert_eq!(sim.peek("q").unwrap(), bv(5, 4));
    sim.run_ticks(12).unwrap();
    // 17 mod 16
    assert_eq!(sim.peek("q").unwrap(), bv(1, 4));
}

#[rstest]
#[case(BackendKind::Interpreter)]
#[case(BackendKind::Bytecode)]
#[case(BackendKind::Compiled)]
fn register_file_reads_one_cycle_behind_writes(#[case] backend: BackendKind) {
    let design = common::register_file();
    let mut sim = sim(&design, backend);
    sim.poke("raddr", bv(7, 5)).unwrap();
    sim.poke("waddr", bv(7, 5)).unwrap();
    sim.poke("wdata", bv(0xab, 8)).unwrap();
    sim.poke("wen", bv(1, 1)).unwrap();
    sim.tick().unwrap();
    // The write landed on this edge; the synchronous read sampled the
    // previous contents.
    assert_eq!(sim.peek("rdata").unwrap(), bv(0, 8));
    assert_eq!(sim.memory_read("mem", 7).unwrap(), bv(0xab, 8));
    sim.poke("wen", bv(0, 1)).unwrap();
    sim.tick().unwrap();
    assert_eq!(sim.peek("rdata").unwrap(), bv(0xab, 8));
}

#[rstest]
#[case(BackendKind::Interpreter)]
#[case(BackendKind::Bytecode)]
#[case(BackendKind::Compiled)]
fn alu_add_sets_the_documented_flags(#[case] backend: BackendKind) {
    let design = common::alu();
    let mut sim = sim(&design, backend);
    sim.poke("a", bv(0x7f, 8)).unwrap();
    sim.poke("b", bv(0x01, 8)).unwrap();
    sim.poke("op", bv(0, 2)).unwrap();
    assert_eq!(sim.peek("result").unwrap(), bv(0x80, 8));
    assert_eq!(sim.peek("zero").unwrap(), bv(0, 1));
    assert_eq!(sim.peek("negative").unwrap(), bv(1, 1));
    assert_eq!(sim.peek("overflow").unwrap(), bv(1, 1));
    assert_eq!(sim.peek("carry").unwrap(), bv(0, 1));
}

#[rstest]
#[case(BackendKind::Interpreter)]
#[case(BackendKind::Bytecode)]
#[case(BackendKind::Compiled)]
fn mux_routes_by_select(#[case] backend: BackendKind) {
    let design = common::byte_mux();
    let mut sim = sim(&design, backend);
    sim.poke("a", bv(0xaa, 8)).unwrap();
    sim.poke("b", bv(0x55, 8)).unwrap();
    sim.poke("sel", bv(0, 1)).unwrap();
    assert_eq!(sim.peek("y").unwrap(), bv(0x55, 8));
    sim.poke("sel", bv(1, 1)).unwrap();
    assert_eq!(sim.peek("y").unwrap(), bv(0xaa, 8));
}

#[test]
fn reset_is_idempotent() {
    let design = common::counter(4);
    let mut sim = Simulation::interpreter(design);
    sim.run_ticks(9).unwrap();
    sim.reset();
    let once = sim.peek("q").unwrap();
    let ticks_once = sim.tick_count();
    sim.reset();
    assert_eq!(sim.peek("q").unwrap(), once);
    assert_eq!(sim.tick_count(), ticks_once);
    assert_eq!(sim.tick_count(), 0);
}

#[test]
fn zero_tick_run_is_a_no_op() {
    let design = common::counter(4);
    let mut sim = Simulation::interpreter(design);
    sim.run_ticks(3).unwrap();
    let before = sim.peek("q").unwrap();
    let state = sim.run_ticks(0).unwrap();
    assert_eq!(state, RunState::Done { ticks: 0 });
    assert_eq!(sim.peek("q").unwrap(), before);
    assert_eq!(sim.tick_count(), 3);
}

#[test]
fn memory_edge_addresses() {
    let design = common::register_file();
    let mut sim = Simulation::interpreter(design);
    sim.memory_write("mem", 31, bv(0x42, 8)).unwrap();
    assert_eq!(sim.memory_read("mem", 31).unwrap(), bv(0x42, 8));
    assert!(matches!(
        sim.memory_read("mem", 32),
        Err(SimulationError::AddressOutOfRange { .. })
    ));
    assert!(matches!(
        sim.memory_write("mem", 32, bv(0, 8)),
        Err(SimulationError::AddressOutOfRange { .. })
    ));
}

#[rstest]
#[case(BackendKind::Interpreter)]
#[case(BackendKind::Bytecode)]
#[case(BackendKind::Compiled)]
fn conflicting_same_edge_writes_resolve_to_the_last_port(#[case] backend: BackendKind) {
    use rhdl_bir::{dsl::*, ComponentBuilder, ReadMode, Registry};

    let mut b = ComponentBuilder::new("dual_write");
    let clk = b.clock("clk");
    let addr = b.input("addr", 2).unwrap();
    let first = b.input("first", 4).unwrap();
    let second = b.input("second", 4).unwrap();
    let out = b.output("out", 4).unwrap();
    let mem = b.memory("mem", 4, 4).unwrap();
    let rdata = b
        .read_port(mem, sig(addr), ReadMode::Asynchronous, None)
        .unwrap();
    b.write_port(mem, clk, sig(addr), sig(first), lit(1, 1));
    b.write_port(mem, clk, sig(addr), sig(second), lit(1, 1));
    b.assign(out, sig(rdata)).unwrap();
    let component = b.build().unwrap();
    let design = Arc::new(rhdl_bir::Design::elaborate(&component, &Registry::new()).unwrap());

    let mut sim = Simulation::new(design, backend, SimParams::default());
    sim.poke("addr", bv(2, 2)).unwrap();
    sim.poke("first", bv(0x3, 4)).unwrap();
    sim.poke("second", bv(0xc, 4)).unwrap();
    sim.tick().unwrap();
    assert_eq!(sim.peek("out").unwrap(), bv(0xc, 4));
}

#[test]
fn watch_run_returns_the_matching_tick() {
    let design = common::counter(4);
    let mut sim = Simulation::bytecode(design);
    let ticks = sim
        .run_clock_ticks_with_watch(
            "clk",
            100,
            &[Watch {
                signal: "q".into(),
                value: 5,
            }],
        )
        .unwrap();
    assert_eq!(ticks, 5);
    assert_eq!(sim.peek("q").unwrap(), bv(5, 4));

    // Nothing matches within the budget: the full count runs.
    let ticks = sim
        .run_clock_ticks_with_watch(
            "clk",
            3,
            &[Watch {
                signal: "q".into(),
                value: 15,
            }],
        )
        .unwrap();
    assert_eq!(ticks, 3);
}

#[test]
fn stop_signal_interrupts_between_ticks() {
    let design = common::counter(8);
    let mut sim = Simulation::compiled(design);
    let stop = sim.stop_signal();
    stop.stop();
    let state = sim.run_ticks(50).unwrap();
    assert_eq!(state, RunState::Stopped { ticks: 0 });
    stop.clear();
    let state = sim.run_ticks(50).unwrap();
    assert_eq!(state, RunState::Done { ticks: 50 });
}

#[test]
fn breakpoints_pause_runs() {
    let design = common::counter(8);
    let mut sim = Simulation::interpreter(design);
    let id = sim.add_breakpoint_signal("q", 7).unwrap();
    match sim.run_ticks(100).unwrap() {
        RunState::Break { id: hit, ticks } => {
            assert_eq!(hit, id);
            assert_eq!(ticks, 7);
        }
        other => panic!("expected a break, got {other:?}"),
    }
    assert!(sim.delete_breakpoint(id));
    assert!(!sim.delete_breakpoint(id));

    let cycle = sim.add_breakpoint_cycle(20);
    match sim.run_ticks(100).unwrap() {
        RunState::Break { id: hit, ticks } => {
            assert_eq!(hit, cycle);
            assert_eq!(sim.tick_count(), 20);
            assert_eq!(ticks, 13);
        }
        other => panic!("expected a break, got {other:?}"),
    }
}

#[test]
fn async_reset_forces_registers_without_a_clock_edge() {
    use rhdl_bir::{dsl::*, ComponentBuilder, Registry, ResetKind, ResetPolarity};

    let mut b = ComponentBuilder::new("resettable");
    let clk = b.clock("clk");
    let rst = b.input("rst", 1).unwrap();
    let q = b
        .register_with_reset(
            "q",
            4,
            bv(0x9, 4),
            clk,
            rst,
            ResetPolarity::ActiveHigh,
            ResetKind::Asynchronous,
        )
        .unwrap();
    let out = b.output("out", 4).unwrap();
    b.assign(out, sig(q)).unwrap();
    b.process(clk).rule(q, add(sig(q), lit(1, 4)));
    let component = b.build().unwrap();
    let design = Arc::new(rhdl_bir::Design::elaborate(&component, &Registry::new()).unwrap());

    for backend in [
        BackendKind::Interpreter,
        BackendKind::Bytecode,
        BackendKind::Compiled,
    ] {
        let mut sim = Simulation::new(Arc::clone(&design), backend, SimParams::default());
        sim.run_ticks(3).unwrap();
        assert_eq!(sim.peek("out").unwrap(), bv(0xc, 4));
        // Assert reset with no clock edge: the register is forced.
        sim.poke("rst", bv(1, 1)).unwrap();
        assert_eq!(sim.peek("out").unwrap(), bv(0x9, 4));
        // Held in reset across edges.
        sim.run_ticks(2).unwrap();
        assert_eq!(sim.peek("out").unwrap(), bv(0x9, 4));
        sim.poke("rst", bv(0, 1)).unwrap();
        sim.tick().unwrap();
        assert_eq!(sim.peek("out").unwrap(), bv(0xa, 4));
    }
}

#[test]
fn snapshot_round_trips_memory_bytes() {
    use rhdl_sim::MemorySnapshot;

    let design = common::register_file();
    let mut sim = Simulation::interpreter(design);
    for addr in 0..8u128 {
        sim.memory_write_byte("mem", addr, (addr as u8) * 3).unwrap();
    }
    let snapshot =
        MemorySnapshot::capture(&mut sim, "mem", "ram", 0, 8, Some(0x200)).unwrap();
    let text = snapshot.to_json().unwrap();
    assert!(text.contains("\"dataB64\""));
    assert!(text.contains("\"savedAtIso\""));

    for addr in 0..8u128 {
        sim.memory_write_byte("mem", addr, 0).unwrap();
    }
    let parsed = MemorySnapshot::from_json(&text).unwrap();
    parsed.restore(&mut sim, "mem").unwrap();
    for addr in 0..8u128 {
        assert_eq!(sim.memory_read_byte("mem", addr).unwrap(), (addr as u8) * 3);
    }
    assert_eq!(parsed.start_pc, Some(0x200));
}
