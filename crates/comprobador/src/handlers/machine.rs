//! Machine command handler.

use crate::commands::{DiagramFormat, MachineArgs};
use crate::error::{CliError, CliResult};
use comprobar::LoginMachine;
use std::fmt::Write as _;

/// Transition list followed by the validation verdict
#[must_use]
pub fn render_machine_text(machine: &LoginMachine) -> String {
    let mut out = String::new();
    for t in machine.transitions() {
        let _ = writeln!(out, "{} --{}--> {}  [{}]", t.from, t.trigger, t.to, t.guard);
    }
    let report = machine.validate();
    if report.is_valid() {
        let _ = writeln!(out, "ok: {} states reachable", report.reachable.len());
    } else {
        for issue in &report.issues {
            let _ = writeln!(out, "issue: {issue}");
        }
    }
    out
}

/// Execute the machine command, returning what it printed.
pub fn execute_machine(args: &MachineArgs) -> CliResult<String> {
    let machine = LoginMachine::standard();
    let out = match args.format {
        DiagramFormat::Text => render_machine_text(&machine),
        DiagramFormat::Dot => machine.to_dot(),
    };
    print!("{out}");
    if machine.validate().is_valid() {
        Ok(out)
    } else {
        Err(CliError::validation("login machine has issues"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_lists_transitions() {
        let machine = LoginMachine::standard();
        let text = render_machine_text(&machine);
        assert_eq!(text.lines().count(), machine.transitions().len() + 1);
        assert!(text.contains("AnonymousLanding --"));
        assert!(text.trim_end().ends_with("states reachable"));
    }

    #[test]
    fn test_dot_output() {
        let out = execute_machine(&MachineArgs {
            format: DiagramFormat::Dot,
        })
        .unwrap();
        assert!(out.starts_with("digraph Login"));
    }
}
