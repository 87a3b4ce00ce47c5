use std::fmt;
use std::process::Command;

/// A missing prerequisite with actionable install instructions.
#[derive(Debug)]
pub struct MissingPrereq {
    pub name: &'static str,
    pub purpose: &'static str,
    pub install_hint: &'static str,
}

impl fmt::Display for MissingPrereq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "  - {}: {} (install: {})",
            self.name, self.purpose, self.install_hint
        )
    }
}

pub fn command_exists(name: &str) -> bool {
    Command::new("which")
        .arg(name)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Check what the ansible executor needs on the control host.
/// Returns a list of missing items. Empty list means all prerequisites are met.
pub fn check_ansible_prereqs() -> Vec<MissingPrereq> {
    let mut missing = Vec::new();

    if !command_exists("sh") {
        missing.push(MissingPrereq {
            name: "sh",
            purpose: "wrapping playbook runs and recording their status",
            install_hint: "any POSIX shell (usually pre-installed)",
        });
    }

    if !command_exists("ansible-playbook") {
        missing.push(MissingPrereq {
            name: "ansible-playbook",
            purpose: "running provisioning playbooks against remote hosts",
            install_hint: "pipx install ansible-core | apt install ansible | dnf install ansible-core | zypper install ansible",
        });
    }

    missing
}

/// Format a list of missing prerequisites into a user-friendly error message.
pub fn format_missing(missing: &[MissingPrereq]) -> String {
    use std::fmt::Write as _;
    let mut msg = String::from("missing prerequisites:\n");
    for m in missing {
        let _ = writeln!(msg, "{m}");
    }
    msg.push_str("\nlogstack needs these tools to provision remote hosts.");
    msg
}
