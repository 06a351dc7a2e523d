//! Structural Verilog: a flat gate-and-flip-flop listing from a netlist.
//!
//! Nets are emitted as `n<id>`; ports connect through assigns and
//! concatenations, flip-flops through two tiny helper modules, and opaque
//! memories through one generated module per primitive.

use std::fmt::Write;

use itertools::Itertools;
use rhdl_netlist::{GateKind, MemoryPrimitive, NetId, Netlist};

use crate::sanitize::sanitize_identifier;
use crate::Result;

/// Emit a flat structural Verilog rendition of the netlist.
pub fn structural_verilog(netlist: &Netlist) -> Result<String> {
    let mut out = String::new();
    writeln!(out, "// Generated by rhdl-codegen; do not edit.")?;
    emit_dff_helpers(&mut out)?;
    for (index, memory) in netlist.memories.iter().enumerate() {
        emit_memory_module(netlist, index, memory, &mut out)?;
    }
    emit_top(netlist, &mut out)?;
    Ok(out)
}

fn emit_dff_helpers(out: &mut String) -> Result<()> {
    writeln!(
        out,
        "\nmodule rhdl_dff #(parameter INIT = 1'b0) (\n  \
         input wire clk,\n  input wire d,\n  output reg q\n);\n  \
         initial q = INIT;\n  always @(posedge clk) q <= d;\nendmodule"
    )?;
    writeln!(
        out,
        "\nmodule rhdl_dff_arh #(parameter INIT = 1'b0, parameter RVAL = 1'b0) (\n  \
         input wire clk,\n  input wire rst,\n  input wire d,\n  output reg q\n);\n  \
         initial q = INIT;\n  always @(posedge clk or posedge rst)\n    \
         if (rst) q <= RVAL;\n    else q <= d;\nendmodule"
    )?;
    writeln!(
        out,
        "\nmodule rhdl_dff_arl #(parameter INIT = 1'b0, parameter RVAL = 1'b0) (\n  \
         input wire clk,\n  input wire rst,\n  input wire d,\n  output reg q\n);\n  \
         initial q = INIT;\n  always @(posedge clk or negedge rst)\n    \
         if (!rst) q <= RVAL;\n    else q <= d;\nendmodule"
    )?;
    Ok(())
}

fn memory_module_name(netlist: &Netlist, memory: &MemoryPrimitive) -> String {
    format!(
        "{}_{}_mem",
        sanitize_identifier(&netlist.name),
        sanitize_identifier(&memory.name)
    )
}

fn emit_memory_module(
    netlist: &Netlist,
    _index: usize,
    memory: &MemoryPrimitive,
    out: &mut String,
) -> Result<()> {
    let name = memory_module_name(netlist, memory);
    let clocks: Vec<usize> = memory
        .read_ports
        .iter()
        .filter_map(|p| p.clock.map(|c| c.0))
        .chain(memory.write_ports.iter().map(|p| p.clock.0))
        .unique()
        .sorted()
        .collect();

    let mut ports = Vec::new();
    for clock in &clocks {
        ports.push(format!(
            "input wire {}",
            sanitize_identifier(&netlist.clocks[*clock])
        ));
    }
    for (index, port) in memory.read_ports.iter().enumerate() {
        ports.push(format!(
            "input wire [{}:0] r{index}_addr",
            port.addr.len() - 1
        ));
        let direction = if port.clock.is_some() {
            "output reg"
        } else {
            "output wire"
        };
        ports.push(format!(
            "{direction} [{}:0] r{index}_data",
            port.data.len() - 1
        ));
    }
    for (index, port) in memory.write_ports.iter().enumerate() {
        ports.push(format!(
            "input wire [{}:0] w{index}_addr",
            port.addr.len() - 1
        ));
        ports.push(format!(
            "input wire [{}:0] w{index}_data",
            port.data.len() - 1
        ));
        ports.push(format!("input wire w{index}_en"));
    }

    writeln!(out, "\nmodule {name} (\n  {}\n);", ports.join(",\n  "))?;
    writeln!(
        out,
        "  reg [{}:0] mem [0:{}];",
        memory.width - 1,
        memory.depth - 1
    )?;
    for (index, port) in memory.read_ports.iter().enumerate() {
        match port.clock {
            None => writeln!(out, "  assign r{index}_data = mem[r{index}_addr];")?,
            Some(clock) => {
                let clock = sanitize_identifier(&netlist.clocks[clock.0]);
                writeln!(
                    out,
                    "  always @(posedge {clock}) r{index}_data <= mem[r{index}_addr];"
                )?;
            }
        }
    }
    // Write ports grouped per clock in declaration order, so a later port
    // wins same-edge conflicts.
    for clock in &clocks {
        let writers: Vec<usize> = memory
            .write_ports
            .iter()
            .enumerate()
            .filter(|(_, p)| p.clock.0 == *clock)
            .map(|(i, _)| i)
            .collect();
        if writers.is_empty() {
            continue;
        }
        let clock = sanitize_identifier(&netlist.clocks[*clock]);
        writeln!(out, "  always @(posedge {clock}) begin")?;
        for index in writers {
            writeln!(
                out,
                "    if (w{index}_en) mem[w{index}_addr] <= w{index}_data;"
            )?;
        }
        writeln!(out, "  end")?;
    }
    writeln!(out, "endmodule")?;
    Ok(())
}

fn emit_top(netlist: &Netlist, out: &mut String) -> Result<()> {
    let net = |id: NetId| format!("n{}", id.0);

    let mut ports = Vec::new();
    for clock in &netlist.clocks {
        ports.push(format!("input wire {}", sanitize_identifier(clock)));
    }
    for (name, bits) in &netlist.inputs {
        ports.push(format!(
            "input wire {}{}",
            bus_range(bits.len()),
            sanitize_identifier(name)
        ));
    }
    for (name, bits) in &netlist.outputs {
        ports.push(format!(
            "output wire {}{}",
            bus_range(bits.len()),
            sanitize_identifier(name)
        ));
    }
    writeln!(
        out,
        "\nmodule {} (\n  {}\n);",
        sanitize_identifier(&netlist.name),
        ports.join(",\n  ")
    )?;

    // Declare every live net.
    let mut used = vec![false; netlist.net_count()];
    used[netlist.const0().0] = true;
    used[netlist.const1().0] = true;
    for gate in &netlist.gates {
        used[gate.output.0] = true;
        for input in &gate.inputs {
            used[input.0] = true;
        }
    }
    for dff in &netlist.dffs {
        used[dff.d.0] = true;
        used[dff.q.0] = true;
        if let Some(reset) = dff.reset {
            used[reset.net.0] = true;
        }
    }
    for memory in &netlist.memories {
        for port in &memory.read_ports {
            port.addr.iter().chain(&port.data).for_each(|n| used[n.0] = true);
        }
        for port in &memory.write_ports {
            port.addr.iter().chain(&port.data).for_each(|n| used[n.0] = true);
            used[port.enable.0] = true;
        }
    }
    for (_, bits) in netlist.inputs.iter().chain(&netlist.outputs) {
        for bit in bits {
            used[bit.0] = true;
        }
    }
    for (id, used) in used.iter().enumerate() {
        if *used {
            writeln!(out, "  wire n{id};")?;
        }
    }
    writeln!(out)?;
    writeln!(out, "  assign {} = 1'b0;", net(netlist.const0()))?;
    writeln!(out, "  assign {} = 1'b1;", net(netlist.const1()))?;

    for (name, bits) in &netlist.inputs {
        let name = sanitize_identifier(name);
        if bits.len() == 1 {
            writeln!(out, "  assign {} = {name};", net(bits[0]))?;
        } else {
            for (bit, id) in bits.iter().enumerate() {
                writeln!(out, "  assign {} = {name}[{bit}];", net(*id))?;
            }
        }
    }
    for (name, bits) in &netlist.outputs {
        let name = sanitize_identifier(name);
        let joined = bits.iter().rev().map(|id| net(*id)).join(", ");
        if bits.len() == 1 {
            writeln!(out, "  assign {name} = {joined};")?;
        } else {
            writeln!(out, "  assign {name} = {{{joined}}};")?;
        }
    }
    writeln!(out)?;

    for (index, gate) in netlist.gates.iter().enumerate() {
        let pins = std::iter::once(gate.output)
            .chain(gate.inputs.iter().copied())
            .map(net)
            .join(", ");
        writeln!(out, "  {} g{index} ({pins});", gate.kind.primitive())?;
    }

    for (index, dff) in netlist.dffs.iter().enumerate() {
        let clock = sanitize_identifier(&netlist.clocks[dff.clock.0]);
        let init = bit_literal(dff.init);
        match dff.reset {
            None => writeln!(
                out,
                "  rhdl_dff #(.INIT({init})) ff{index} (.clk({clock}), .d({}), .q({}));",
                net(dff.d),
                net(dff.q)
            )?,
            Some(reset) => {
                let module = if reset.active_high {
                    "rhdl_dff_arh"
                } else {
                    "rhdl_dff_arl"
                };
                writeln!(
                    out,
                    "  {module} #(.INIT({init}), .RVAL({})) ff{index} \
                     (.clk({clock}), .rst({}), .d({}), .q({}));",
                    bit_literal(reset.value),
                    net(reset.net),
                    net(dff.d),
                    net(dff.q)
                )?;
            }
        }
    }

    for memory in &netlist.memories {
        let module = memory_module_name(netlist, memory);
        let instance = format!("{}_i", sanitize_identifier(&memory.name));
        let mut pins = Vec::new();
        let clocks: Vec<usize> = memory
            .read_ports
            .iter()
            .filter_map(|p| p.clock.map(|c| c.0))
            .chain(memory.write_ports.iter().map(|p| p.clock.0))
            .unique()
            .sorted()
            .collect();
        for clock in clocks {
            let name = sanitize_identifier(&netlist.clocks[clock]);
            pins.push(format!(".{name}({name})"));
        }
        for (index, port) in memory.read_ports.iter().enumerate() {
            pins.push(format!(
                ".r{index}_addr({{{}}})",
                port.addr.iter().rev().map(|n| net(*n)).join(", ")
            ));
            pins.push(format!(
                ".r{index}_data({{{}}})",
                port.data.iter().rev().map(|n| net(*n)).join(", ")
            ));
        }
        for (index, port) in memory.write_ports.iter().enumerate() {
            pins.push(format!(
                ".w{index}_addr({{{}}})",
                port.addr.iter().rev().map(|n| net(*n)).join(", ")
            ));
            pins.push(format!(
                ".w{index}_data({{{}}})",
                port.data.iter().rev().map(|n| net(*n)).join(", ")
            ));
            pins.push(format!(".w{index}_en({})", net(port.enable)));
        }
        writeln!(
            out,
            "  {module} {instance} (\n    {}\n  );",
            pins.join(",\n    ")
        )?;
    }

    writeln!(out, "endmodule")?;
    Ok(())
}

fn bus_range(width: usize) -> String {
    if width == 1 {
        String::new()
    } else {
        format!("[{}:0] ", width - 1)
    }
}

fn bit_literal(value: bool) -> &'static str {
    if value {
        "1'b1"
    } else {
        "1'b0"
    }
}
