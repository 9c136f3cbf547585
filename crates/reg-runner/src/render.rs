use anyhow::{Context, Result};
use reg_machine::{Machine, MachineReport, Status};

/// Plain listing of the final machine state.
pub fn text(machine: &Machine) -> String {
    let registers = machine.registers();
    let flags = machine.flags();

    let stack: Vec<String> = machine.stack_top_first().map(|value| value.to_string()).collect();
    let stack = if stack.is_empty() {
        "(empty)".to_string()
    } else {
        stack.join(" ")
    };

    let status = match machine.status() {
        Status::Running => "running",
        Status::Halted => "halted",
        Status::Errored(_) => "errored",
    };

    let mut lines = vec![
        format!(
            "registers: a={} b={} c={} d={} insp={}",
            registers.a, registers.b, registers.c, registers.d, registers.insp
        ),
        format!(
            "flags: eq={} lt={} gt={}",
            u8::from(flags.eq),
            u8::from(flags.lt),
            u8::from(flags.gt)
        ),
        format!("stack (top first): {stack}"),
        format!("steps: {}", machine.steps()),
        format!("status: {status}"),
    ];
    if let Some(error) = machine.error() {
        lines.push(format!("error: {error}"));
    }
    lines.join("\n")
}

pub fn json(report: &MachineReport) -> Result<String> {
    serde_json::to_string_pretty(report).context("serializing machine report")
}
