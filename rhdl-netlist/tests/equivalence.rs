//! The lowered netlist must be behaviorally equivalent to its source
//! design under the behavioral cycle model: same outputs for any input
//! sequence, before and after constant folding.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rhdl_bir::{dsl::*, ComponentBuilder, Design, ReadMode, Registry};
use rhdl_bitvec::BitVec;
use rhdl_netlist::{fold_constants, lower, LowerParams, NetlistSim};
use rhdl_sim::Simulation;

fn netlist_pair(design: &Arc<Design>) -> (Simulation, NetlistSim) {
    let mut netlist = lower(design, &LowerParams::default());
    fold_constants(&mut netlist);
    (
        Simulation::interpreter(Arc::clone(design)),
        NetlistSim::new(netlist),
    )
}

fn counter(width: u32) -> Arc<Design> {
    let mut b = ComponentBuilder::new("counter");
    let clk = b.clock("clk");
    let q = b
        .register("q", width, BitVec::zero(width).unwrap(), clk)
        .unwrap();
    let count = b.output("count", width).unwrap();
    b.assign(count, sig(q)).unwrap();
    b.process(clk).rule(q, add(sig(q), lit(1, width)));
    Arc::new(Design::elaborate(&b.build().unwrap(), &Registry::new()).unwrap())
}

#[test]
fn counter_netlist_matches_behavior() {
    let design = counter(4);
    let (mut sim, mut net) = netlist_pair(&design);
    for tick in 0..40 {
        sim.tick().unwrap();
        net.tick();
        assert_eq!(
            sim.peek("count").unwrap().value(),
            net.peek("count").unwrap(),
            "divergence at tick {tick}"
        );
    }
}

#[test]
fn combinational_ops_match_behavior() {
    let mut b = ComponentBuilder::new("ops");
    let a = b.input("a", 8).unwrap();
    let c = b.input("c", 8).unwrap();
    let sum = b.output("sum", 8).unwrap();
    let diff = b.output("diff", 8).unwrap();
    let less = b.output("less", 1).unwrap();
    let gear = b.output("gear", 8).unwrap();
    let parity = b.output("parity", 1).unwrap();
    let nibble = b.output("nibble", 4).unwrap();
    b.assign(sum, add(sig(a), sig(c))).unwrap();
    b.assign(diff, sub(sig(a), sig(c))).unwrap();
    b.assign(less, lt(sig(a), sig(c))).unwrap();
    b.assign(gear, shl(sig(a), and(sig(c), lit(0x07, 8)))).unwrap();
    b.assign(parity, reduce_xor(sig(a))).unwrap();
    b.assign(nibble, slice(xor(sig(a), sig(c)), 7, 4)).unwrap();
    let design =
        Arc::new(Design::elaborate(&b.build().unwrap(), &Registry::new()).unwrap());

    let (mut sim, mut net) = netlist_pair(&design);
    let mut rng = StdRng::seed_from_u64(11);
    for _ in 0..300 {
        let av = rng.gen_range(0..256u128);
        let cv = rng.gen_range(0..256u128);
        sim.poke("a", BitVec::new(av, 8).unwrap()).unwrap();
        sim.poke("c", BitVec::new(cv, 8).unwrap()).unwrap();
        assert!(net.poke("a", av));
        assert!(net.poke("c", cv));
        for port in ["sum", "diff", "less", "gear", "parity", "nibble"] {
            assert_eq!(
                sim.peek(port).unwrap().value(),
                net.peek(port).unwrap(),
                "port `{port}` diverges for a={av:#x} c={cv:#x}"
            );
        }
    }
}

#[test]
fn case_select_and_mux_match_behavior() {
    let mut b = ComponentBuilder::new("selects");
    let op = b.input("op", 2).unwrap();
    let x = b.input("x", 8).unwrap();
    let y = b.input("y", 8).unwrap();
    let out = b.output("out", 8).unwrap();
    b.assign(
        out,
        case(
            sig(op),
            vec![
                (BitVec::new(0, 2).unwrap(), and(sig(x), sig(y))),
                (BitVec::new(1, 2).unwrap(), or(sig(x), sig(y))),
                (BitVec::new(2, 2).unwrap(), mux(slice(sig(x), 0, 0), sig(y), sig(x))),
            ],
            bnot(sig(x)),
        ),
    )
    .unwrap();
    let design =
        Arc::new(Design::elaborate(&b.build().unwrap(), &Registry::new()).unwrap());

    let (mut sim, mut net) = netlist_pair(&design);
    let mut rng = StdRng::seed_from_u64(23);
    for _ in 0..200 {
        let opv = rng.gen_range(0..4u128);
        let xv = rng.gen_range(0..256u128);
        let yv = rng.gen_range(0..256u128);
        sim.poke("op", BitVec::new(opv, 2).unwrap()).unwrap();
        sim.poke("x", BitVec::new(xv, 8).unwrap()).unwrap();
        sim.poke("y", BitVec::new(yv, 8).unwrap()).unwrap();
        assert!(net.poke("op", opv));
        assert!(net.poke("x", xv));
        assert!(net.poke("y", yv));
        assert_eq!(sim.peek("out").unwrap().value(), net.peek("out").unwrap());
    }
}

#[test]
fn flattened_register_file_matches_behavior() {
    let mut b = ComponentBuilder::new("regfile");
    let clk = b.clock("clk");
    let waddr = b.input("waddr", 5).unwrap();
    let wdata = b.input("wdata", 8).unwrap();
    let wen = b.input("wen", 1).unwrap();
    let raddr = b.input("raddr", 5).unwrap();
    let rdata = b.output("rdata", 8).unwrap();
    let mem = b.memory("mem", 32, 8).unwrap();
    let port = b
        .read_port(mem, sig(raddr), ReadMode::Synchronous, Some(clk))
        .unwrap();
    b.write_port(mem, clk, sig(waddr), sig(wdata), sig(wen));
    b.assign(rdata, sig(port)).unwrap();
    let design =
        Arc::new(Design::elaborate(&b.build().unwrap(), &Registry::new()).unwrap());

    let (mut sim, mut net) = netlist_pair(&design);
    let mut rng = StdRng::seed_from_u64(5);
    for tick in 0..200 {
        let waddr = rng.gen_range(0..32u128);
        let raddr = rng.gen_range(0..32u128);
        let wdata = rng.gen_range(0..256u128);
        let wen = rng.gen_range(0..2u128);
        sim.poke("waddr", BitVec::new(waddr, 5).unwrap()).unwrap();
        sim.poke("raddr", BitVec::new(raddr, 5).unwrap()).unwrap();
        sim.poke("wdata", BitVec::new(wdata, 8).unwrap()).unwrap();
        sim.poke("wen", BitVec::new(wen, 1).unwrap()).unwrap();
        assert!(net.poke("waddr", waddr));
        assert!(net.poke("raddr", raddr));
        assert!(net.poke("wdata", wdata));
        assert!(net.poke("wen", wen));
        sim.tick().unwrap();
        net.tick();
        assert_eq!(
            sim.peek("rdata").unwrap().value(),
            net.peek("rdata").unwrap(),
            "divergence at tick {tick}"
        );
    }
}

#[test]
fn large_memory_stays_a_primitive_and_matches() {
    let mut b = ComponentBuilder::new("big_ram");
    let clk = b.clock("clk");
    let addr = b.input("addr", 10).unwrap();
    let wdata = b.input("wdata", 8).unwrap();
    let wen = b.input("wen", 1).unwrap();
    let rdata = b.output("rdata", 8).unwrap();
    let mem = b.memory("ram", 1024, 8).unwrap();
    let port = b
        .read_port(mem, sig(addr), ReadMode::Asynchronous, None)
        .unwrap();
    b.write_port(mem, clk, sig(addr), sig(wdata), sig(wen));
    b.assign(rdata, sig(port)).unwrap();
    let design =
        Arc::new(Design::elaborate(&b.build().unwrap(), &Registry::new()).unwrap());

    let mut netlist = lower(&design, &LowerParams::default());
    fold_constants(&mut netlist);
    assert_eq!(netlist.memories.len(), 1);
    assert_eq!(netlist.memories[0].depth, 1024);

    let mut sim = Simulation::interpreter(Arc::clone(&design));
    let mut net = NetlistSim::new(netlist);
    let mut rng = StdRng::seed_from_u64(77);
    for _ in 0..200 {
        let a = rng.gen_range(0..1024u128);
        let d = rng.gen_range(0..256u128);
        let w = rng.gen_range(0..2u128);
        sim.poke("addr", BitVec::new(a, 10).unwrap()).unwrap();
        sim.poke("wdata", BitVec::new(d, 8).unwrap()).unwrap();
        sim.poke("wen", BitVec::new(w, 1).unwrap()).unwrap();
        assert!(net.poke("addr", a));
        assert!(net.poke("wdata", d));
        assert!(net.poke("wen", w));
        sim.tick().unwrap();
        net.tick();
        assert_eq!(sim.peek("rdata").unwrap().value(), net.peek("rdata").unwrap());
    }
}

#[test]
fn folding_shrinks_constant_logic_without_changing_behavior() {
    let mut b = ComponentBuilder::new("folded");
    let a = b.input("a", 8).unwrap();
    let out = b.output("out", 8).unwrap();
    // Everything here reduces: and with zero, or with the operand, a
    // constant mux select.
    b.assign(
        out,
        mux(
            lit(1, 1),
            or(and(sig(a), lit(0, 8)), sig(a)),
            bnot(sig(a)),
        ),
    )
    .unwrap();
    let design =
        Arc::new(Design::elaborate(&b.build().unwrap(), &Registry::new()).unwrap());

    let unfolded = lower(&design, &LowerParams::default());
    let mut folded = unfolded.clone();
    fold_constants(&mut folded);
    assert!(folded.gates.len() < unfolded.gates.len());

    let mut sim = Simulation::interpreter(Arc::clone(&design));
    let mut net = NetlistSim::new(folded);
    for value in [0u128, 1, 0x55, 0xaa, 0xff] {
        sim.poke("a", BitVec::new(value, 8).unwrap()).unwrap();
        assert!(net.poke("a", value));
        assert_eq!(sim.peek("out").unwrap().value(), net.peek("out").unwrap());
        assert_eq!(net.peek("out").unwrap(), value);
    }
}

#[test]
fn async_reset_reaches_the_flops() {
    use rhdl_bir::{ResetKind, ResetPolarity};

    let mut b = ComponentBuilder::new("resettable");
    let clk = b.clock("clk");
    let rst = b.input("rst", 1).unwrap();
    let q = b
        .register_with_reset(
            "q",
            4,
            BitVec::new(0x5, 4).unwrap(),
            clk,
            rst,
            ResetPolarity::ActiveHigh,
            ResetKind::Asynchronous,
        )
        .unwrap();
    let out = b.output("out", 4).unwrap();
    b.assign(out, sig(q)).unwrap();
    b.process(clk).rule(q, add(sig(q), lit(1, 4)));
    let design =
        Arc::new(Design::elaborate(&b.build().unwrap(), &Registry::new()).unwrap());

    let (mut sim, mut net) = netlist_pair(&design);
    sim.run_ticks(3).unwrap();
    for _ in 0..3 {
        net.tick();
    }
    assert_eq!(sim.peek("out").unwrap().value(), net.peek("out").unwrap());

    sim.poke("rst", BitVec::new(1, 1).unwrap()).unwrap();
    assert!(net.poke("rst", 1));
    assert_eq!(sim.peek("out").unwrap().value(), 0x5);
    assert_eq!(net.peek("out").unwrap(), 0x5);
}

#[test]
fn stats_count_gates_by_kind() {
    let design = counter(4);
    let mut netlist = lower(&design, &LowerParams::default());
    fold_constants(&mut netlist);
    let stats = netlist.stats();
    assert_eq!(stats.dffs, 4);
    assert!(stats.nets > 0);
    let total: usize = stats.gates.values().sum();
    assert_eq!(total, netlist.gates.len());
    assert!(total > 0);
}
