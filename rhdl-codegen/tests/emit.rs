//! Emitted-text checks against the external interface contract.

use rhdl_bir::{dsl::*, ComponentBuilder, Design, ReadMode, Registry};
use rhdl_bitvec::BitVec;
use rhdl_codegen::{behavioral_verilog, behavioral_vhdl, structural_verilog};
use rhdl_netlist::{fold_constants, lower, LowerParams};

fn counter() -> rhdl_bir::Component {
    let mut b = ComponentBuilder::new("Counter");
    let clk = b.clock("clk");
    let rst = b.input("rst", 1).unwrap();
    let q = b
        .register_with_reset(
            "q",
            4,
            BitVec::zero(4).unwrap(),
            clk,
            rst,
            rhdl_bir::ResetPolarity::ActiveHigh,
            rhdl_bir::ResetKind::Asynchronous,
        )
        .unwrap();
    let count = b.output("count", 4).unwrap();
    b.assign(count, sig(q)).unwrap();
    b.process(clk).rule(q, add(sig(q), lit(1, 4)));
    b.build().unwrap()
}

fn register_file() -> rhdl_bir::Component {
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
    b.build().unwrap()
}

#[test]
fn behavioral_verilog_covers_the_contract_surface() {
    let component = counter();
    let text = behavioral_verilog(&component, &Registry::new()).unwrap();

    // Sanitized module name, declared widths, sized literals, async reset.
    assert!(text.contains("module counter ("));
    assert!(text.contains("input wire clk"));
    assert!(text.contains("input wire rst"));
    assert!(text.contains("output wire [3:0] count"));
    assert!(text.contains("reg [3:0] q;"));
    assert!(text.contains("assign count = q;"));
    assert!(text.contains("always @(posedge clk or posedge rst)"));
    assert!(text.contains("4'd1"));
    assert!(text.contains("4'd0"));
    assert!(text.contains("endmodule"));
}

#[test]
fn behavioral_verilog_memories_are_reg_arrays() {
    let component = register_file();
    let text = behavioral_verilog(&component, &Registry::new()).unwrap();

    assert!(text.contains("reg [7:0] mem [0:31];"));
    assert!(text.contains("always @(posedge clk)"));
    assert!(text.contains("if (wen) mem[waddr] <= wdata;"));
    // Synchronous read data is registered.
    assert!(text.contains("reg [7:0] mem_rdata0;"));
    assert!(text.contains("mem_rdata0 <= mem[raddr];"));
}

#[test]
fn hierarchical_verilog_instantiates_children() {
    let mut b = ComponentBuilder::new("inverter");
    let a = b.input("a", 4).unwrap();
    let y = b.output("y", 4).unwrap();
    b.assign(y, bnot(sig(a))).unwrap();
    let inverter = b.build().unwrap();

    let mut registry = Registry::new();
    registry.insert(inverter);

    let mut b = ComponentBuilder::new("top");
    let x = b.input("x", 4).unwrap();
    let w = b.wire("w", 4).unwrap();
    let out = b.output("out", 4).unwrap();
    b.instance(
        "inv0",
        "inverter",
        vec![("a".into(), sig(x))],
        vec![("y".into(), w)],
        vec![],
    );
    b.assign(out, sig(w)).unwrap();
    let top = b.build().unwrap();

    let text = behavioral_verilog(&top, &registry).unwrap();
    assert!(text.contains("module inverter ("));
    assert!(text.contains("module top ("));
    assert!(text.contains("inverter inv0 ("));
    assert!(text.contains(".a(x)"));
    assert!(text.contains(".y(w)"));
    // Child modules come before the top module.
    assert!(text.find("module inverter").unwrap() < text.find("module top").unwrap());
}

#[test]
fn output_is_stable_across_runs() {
    let component = register_file();
    let first = behavioral_verilog(&component, &Registry::new()).unwrap();
    let second = behavioral_verilog(&component, &Registry::new()).unwrap();
    assert_eq!(first, second);

    let vhdl_first = behavioral_vhdl(&component, &Registry::new()).unwrap();
    let vhdl_second = behavioral_vhdl(&component, &Registry::new()).unwrap();
    assert_eq!(vhdl_first, vhdl_second);
}

#[test]
fn behavioral_vhdl_covers_the_contract_surface() {
    let component = counter();
    let text = behavioral_vhdl(&component, &Registry::new()).unwrap();

    assert!(text.contains("library ieee;"));
    assert!(text.contains("use ieee.numeric_std.all;"));
    assert!(text.contains("entity counter is"));
    assert!(text.contains("clk : in std_logic"));
    assert!(text.contains("count : out std_logic_vector(3 downto 0)"));
    assert!(text.contains("architecture rtl of counter is"));
    assert!(text.contains("rising_edge(clk)"));
    // Async reset appears in the sensitivity list and as the first branch.
    assert!(text.contains("process(clk, rst)"));
    assert!(text.contains("if rst = '1' then"));
    assert!(text.contains("end architecture;"));
}

#[test]
fn vhdl_single_bit_ports_are_std_logic() {
    let component = register_file();
    let text = behavioral_vhdl(&component, &Registry::new()).unwrap();
    assert!(text.contains("wen : in std_logic;"));
    assert!(text.contains("wdata : in std_logic_vector(7 downto 0)"));
}

#[test]
fn structural_verilog_is_a_flat_gate_listing() {
    let component = counter();
    let design = Design::elaborate(&component, &Registry::new()).unwrap();
    let mut netlist = lower(&design, &LowerParams::default());
    fold_constants(&mut netlist);
    let text = structural_verilog(&netlist).unwrap();

    assert!(text.contains("module counter ("));
    assert!(text.contains("module rhdl_dff"));
    assert!(text.contains("rhdl_dff_arh"));
    // A ripple-carry increment leaves xor gates behind.
    assert!(text.contains("xor "));
    assert!(text.contains("output wire [3:0] count"));
    // Stable output.
    assert_eq!(text, structural_verilog(&netlist).unwrap());
}

#[test]
fn structural_verilog_emits_memory_primitives() {
    let mut b = ComponentBuilder::new("big");
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
    let design = Design::elaborate(&b.build().unwrap(), &Registry::new()).unwrap();
    let mut netlist = lower(&design, &LowerParams::default());
    fold_constants(&mut netlist);

    let text = structural_verilog(&netlist).unwrap();
    assert!(text.contains("module big_ram_mem ("));
    assert!(text.contains("reg [7:0] mem [0:1023];"));
    assert!(text.contains("big_ram_mem ram_i ("));
}

#[test]
fn identifiers_are_sanitized() {
    use rhdl_codegen::sanitize_identifier;
    assert_eq!(sanitize_identifier("CPU.ALU.Flags"), "cpu_alu_flags");
}
