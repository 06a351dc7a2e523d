//! Trace buffer and VCD emission.

mod common;

use rhdl_sim::Simulation;

#[test]
fn vcd_contains_var_declarations_and_one_change_per_counter_tick() {
    let design = common::counter(3);
    let mut sim = Simulation::interpreter(design);
    sim.reset();
    sim.trace_add_signal("q").unwrap();
    sim.set_trace_enabled(true).unwrap();
    sim.run_ticks(8).unwrap();

    let mut out = Vec::new();
    sim.write_vcd(&mut out).unwrap();
    let text = String::from_utf8(out).unwrap();

    assert!(text.contains("$timescale"));
    assert!(text.contains("$scope module counter $end"));
    assert!(text.contains("$var wire 3 ! q $end"));
    assert!(text.contains("$dumpvars"));

    // Time markers are monotonically non-decreasing.
    let times: Vec<u64> = text
        .lines()
        .filter_map(|line| line.strip_prefix('#'))
        .map(|t| t.parse().unwrap())
        .collect();
    assert!(times.windows(2).all(|w| w[0] <= w[1]));

    // The counter changes every tick: one baseline record in $dumpvars
    // plus exactly 8 change records.
    let records = text.lines().filter(|line| line.starts_with('b')).count();
    assert_eq!(records, 1 + 8);
    assert_eq!(times.len(), 1 + 8);
}

#[test]
fn trace_status_reports_drops() {
    use rhdl_sim::{BackendKind, SimParams};

    let design = common::counter(3);
    let mut sim = Simulation::new(
        design,
        BackendKind::Compiled,
        SimParams { trace_capacity: 4 },
    );
    sim.trace_add_signal("q").unwrap();
    sim.set_trace_enabled(true).unwrap();
    sim.run_ticks(10).unwrap();

    let status = sim.trace_status();
    assert_eq!(status.watched, 1);
    assert_eq!(status.buffered, 4);
    assert_eq!(status.capacity, 4);
    // Baseline + 10 captures into 4 slots.
    assert_eq!(status.dropped, 7);
}

#[test]
fn disabled_trace_does_not_capture() {
    let design = common::counter(3);
    let mut sim = Simulation::interpreter(design);
    sim.trace_add_signal("q").unwrap();
    sim.run_ticks(5).unwrap();
    assert_eq!(sim.trace_status().buffered, 0);
    assert!(!sim.trace_enabled());
}

#[test]
fn multi_clock_domains_tick_independently() {
    use std::sync::Arc;

    use rhdl_bir::{dsl::*, ComponentBuilder, Design, Registry};
    use rhdl_bitvec::BitVec;

    let mut b = ComponentBuilder::new("two_domains");
    let fast = b.clock("fast");
    let slow = b.clock("slow");
    let fast_count = b
        .register("fast_count", 8, BitVec::zero(8).unwrap(), fast)
        .unwrap();
    let slow_count = b
        .register("slow_count", 8, BitVec::zero(8).unwrap(), slow)
        .unwrap();
    let crossing = b.output("crossing", 8).unwrap();
    b.process(fast)
        .rule(fast_count, add(sig(fast_count), lit(1, 8)));
    b.process(slow)
        .rule(slow_count, add(sig(slow_count), lit(1, 8)));
    // A cross-domain combinational path: it sees the latest settled values
    // of both domains; no synchronizers are inserted.
    b.assign(crossing, add(sig(fast_count), sig(slow_count)))
        .unwrap();
    let component = b.build().unwrap();
    let design = Arc::new(Design::elaborate(&component, &Registry::new()).unwrap());

    let mut sim = Simulation::bytecode(design);
    sim.run_clock_ticks("fast", 10).unwrap();
    sim.run_clock_ticks("slow", 3).unwrap();
    assert_eq!(sim.peek("fast_count").unwrap().value(), 10);
    assert_eq!(sim.peek("slow_count").unwrap().value(), 3);
    assert_eq!(sim.peek("crossing").unwrap().value(), 13);
    // The default clock is the first declared one.
    sim.tick().unwrap();
    assert_eq!(sim.peek("fast_count").unwrap().value(), 11);
    assert_eq!(sim.tick_count(), 11);
}
