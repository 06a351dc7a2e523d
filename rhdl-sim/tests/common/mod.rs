//! Shared designs for the simulation tests.
#![allow(dead_code)]

use std::sync::Arc;

use rhdl_bir::{dsl::*, ComponentBuilder, Design, ReadMode, Registry};
use rhdl_bitvec::BitVec;

/// `width`-bit free-running counter: `q <- q + 1` on the clock edge.
pub fn counter(width: u32) -> Arc<Design> {
    let mut b = ComponentBuilder::new("counter");
    let clk = b.clock("clk");
    let q = b
        .register("q", width, BitVec::zero(width).unwrap(), clk)
        .unwrap();
    let count = b.output("count", width).unwrap();
    b.assign(count, sig(q)).unwrap();
    b.process(clk).rule(q, add(sig(q), lit(1, width)));
    let component = b.build().unwrap();
    Arc::new(Design::elaborate(&component, &Registry::new()).unwrap())
}

/// 32x8 register file with one synchronous read port and one write port.
pub fn register_file() -> Arc<Design> {
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
    let component = b.build().unwrap();
    Arc::new(Design::elaborate(&component, &Registry::new()).unwrap())
}

/// 8-bit ALU with add/sub/and/or selected by `op`, plus add-path flags.
pub fn alu() -> Arc<Design> {
    let mut b = ComponentBuilder::new("alu");
    let a = b.input("a", 8).unwrap();
    let bb = b.input("b", 8).unwrap();
    let op = b.input("op", 2).unwrap();
    let sum9 = b.wire("sum9", 9).unwrap();
    let result = b.output("result", 8).unwrap();
    let zero = b.output("zero", 1).unwrap();
    let negative = b.output("negative", 1).unwrap();
    let overflow = b.output("overflow", 1).unwrap();
    let carry = b.output("carry", 1).unwrap();

    b.assign(
        sum9,
        add(
            cat(vec![lit(0, 1), sig(a)]),
            cat(vec![lit(0, 1), sig(bb)]),
        ),
    )
    .unwrap();
    b.assign(
        result,
        case(
            sig(op),
            vec![
                (BitVec::new(0, 2).unwrap(), slice(sig(sum9), 7, 0)),
                (BitVec::new(1, 2).unwrap(), sub(sig(a), sig(bb))),
                (BitVec::new(2, 2).unwrap(), and(sig(a), sig(bb))),
            ],
            or(sig(a), sig(bb)),
        ),
    )
    .unwrap();
    b.assign(zero, eq(sig(result), lit(0, 8))).unwrap();
    b.assign(negative, slice(sig(result), 7, 7)).unwrap();
    b.assign(
        overflow,
        mux(
            eq(sig(op), lit(0, 2)),
            slice(
                and(bnot(xor(sig(a), sig(bb))), xor(sig(a), sig(result))),
                7,
                7,
            ),
            lit(0, 1),
        ),
    )
    .unwrap();
    b.assign(
        carry,
        mux(eq(sig(op), lit(0, 2)), slice(sig(sum9), 8, 8), lit(0, 1)),
    )
    .unwrap();
    let component = b.build().unwrap();
    Arc::new(Design::elaborate(&component, &Registry::new()).unwrap())
}

/// Two-way mux on byte operands.
pub fn byte_mux() -> Arc<Design> {
    let mut b = ComponentBuilder::new("byte_mux");
    let sel = b.input("sel", 1).unwrap();
    let a = b.input("a", 8).unwrap();
    let bb = b.input("b", 8).unwrap();
    let y = b.output("y", 8).unwrap();
    b.assign(y, mux(sig(sel), sig(a), sig(bb))).unwrap();
    let component = b.build().unwrap();
    Arc::new(Design::elaborate(&component, &Registry::new()).unwrap())
}

/// A design exercising every expression kind: shifts, reductions, case,
/// let bindings, concat/slice, registers, and an asynchronous-read memory.
pub fn kitchen_sink() -> Arc<Design> {
    let mut b = ComponentBuilder::new("kitchen_sink");
    let clk = b.clock("clk");
    let din = b.input("din", 8).unwrap();
    let sel = b.input("sel", 2).unwrap();
    let acc = b
        .register("acc", 8, BitVec::zero(8).unwrap(), clk)
        .unwrap();
    let phase = b
        .register("phase", 3, BitVec::zero(3).unwrap(), clk)
        .unwrap();
    let scratch = b.wire("scratch", 8).unwrap();
    let folded = b.output("folded", 8).unwrap();
    let parity = b.output("parity", 1).unwrap();
    let mem = b.memory("scratchpad", 8, 8).unwrap();
    let rdata = b
        .read_port(
            mem,
            cat(vec![lit(0, 1), slice(sig(phase), 1, 0)]),
            ReadMode::Asynchronous,
            None,
        )
        .unwrap();
    b.write_port(
        mem,
        clk,
        cat(vec![lit(0, 1), slice(sig(phase), 1, 0)]),
        sig(acc),
        lit(1, 1),
    );

    b.assign(
        scratch,
        let_in(
            "spun",
            shl(sig(din), cat(vec![lit(0, 5), sig(phase)])),
            case(
                sig(sel),
                vec![
                    (BitVec::new(0, 2).unwrap(), local("spun")),
                    (BitVec::new(1, 2).unwrap(), bnot(local("spun"))),
                    (
                        BitVec::new(2, 2).unwrap(),
                        shr(local("spun"), lit(1, 8)),
                    ),
                ],
                xor(local("spun"), sig(rdata)),
            ),
        ),
    )
    .unwrap();
    b.assign(folded, sig(acc)).unwrap();
    b.assign(parity, reduce_xor(sig(scratch))).unwrap();
    b.process(clk)
        .rule(acc, add(sig(acc), sig(scratch)))
        .rule(phase, add(sig(phase), lit(1, 3)));
    let component = b.build().unwrap();
    Arc::new(Design::elaborate(&component, &Registry::new()).unwrap())
}
