//! Service control instructions given on the command line.

use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Instruction {
    /// Register the systemd unit and enable it.
    Install,
    /// Stop, disable and remove the systemd unit.
    Uninstall,
    /// `systemctl start`.
    Start,
    /// `systemctl stop`.
    Stop,
    /// Serve in the foreground.
    #[default]
    Run,
}

impl Instruction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Instruction::Install => "install",
            Instruction::Uninstall => "uninstall",
            Instruction::Start => "start",
            Instruction::Stop => "stop",
            Instruction::Run => "run",
        }
    }

    /// Anything other than a known control verb runs the service.
    pub fn parse(raw: Option<&str>) -> Self {
        raw.and_then(|raw| raw.parse().ok()).unwrap_or_default()
    }
}

impl FromStr for Instruction {
    type Err = UnknownInstruction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "install" => Ok(Instruction::Install),
            "uninstall" => Ok(Instruction::Uninstall),
            "start" => Ok(Instruction::Start),
            "stop" => Ok(Instruction::Stop),
            "run" => Ok(Instruction::Run),
            _ => Err(UnknownInstruction(s.to_string())),
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown instruction '{0}'")]
pub struct UnknownInstruction(pub String);
