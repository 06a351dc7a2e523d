/// Make a declared name a legal HDL identifier: lowercase, non-identifier
/// characters replaced by underscores, a leading underscore added before a
/// leading digit. Dots from flattened instance paths become underscores,
/// so `cpu.alu.flags` emits as `cpu_alu_flags`.
pub fn sanitize_identifier(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for (index, c) in name.chars().enumerate() {
        let c = c.to_ascii_lowercase();
        if c.is_ascii_alphanumeric() || c == '_' {
            if index == 0 && c.is_ascii_digit() {
                out.push('_');
            }
            out.push(c);
        } else {
            out.push('_');
        }
    }
    if out.is_empty() {
        out.push('_');
    }
    out
}
