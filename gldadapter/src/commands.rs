/// Debugger command vocabulary
///
/// Each command is one line written to the simulator's console. The
/// session executes one at a time; responses are classified by the kind
/// of the executing command and the typed result lands in its output
/// slot when the prompt returns.
use serde::{Deserialize, Serialize};

use crate::types::{GlobalList, ObjectProperties, SimulationStatus, StepStatus};

/// Argument given to the LIST queued after a step run, marking it as a
/// refresh of the existing listing rather than a brand new one.
pub const LIST_UPDATE_TAG: &str = "UPDATE";

/// Kinds of debugger commands and their console spellings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandKind {
    /// Launch the simulator process; nothing is written to the console
    Load,
    /// Run until the next breakpoint or watchpoint
    Run,
    /// Advance the scheduler by one object
    Next,
    /// Report the scheduler context
    Context,
    /// List every object with its flags, rank, clock, and parent
    List,
    /// Print the properties of the current object
    PrintCurrent,
    /// Print the properties of a named object
    PrintObject,
    /// List every global variable
    GlobalsList,
    BreakList,
    BreakError,
    BreakClock,
    BreakObject,
    BreakModule,
    BreakClass,
    BreakPass,
    BreakRank,
    BreakTime,
    BreakEnable,
    BreakDisable,
    WatchList,
    WatchObject,
    WatchSync,
    WatchEnable,
    WatchDisable,
    Quit,
}

impl CommandKind {
    /// Console template for this kind; `{}` marks the argument slot.
    pub fn template(&self) -> &'static str {
        match self {
            CommandKind::Load => "",
            CommandKind::Run => "run",
            CommandKind::Next => "next",
            CommandKind::Context => "where",
            CommandKind::List => "list",
            CommandKind::PrintCurrent => "print",
            CommandKind::PrintObject => "print {}",
            CommandKind::GlobalsList => "globals",
            CommandKind::BreakList => "break",
            CommandKind::BreakError => "break error",
            CommandKind::BreakClock => "break clock",
            CommandKind::BreakObject => "break object {}",
            CommandKind::BreakModule => "break module {}",
            CommandKind::BreakClass => "break class {}",
            CommandKind::BreakPass => "break pass {}",
            CommandKind::BreakRank => "break rank {}",
            CommandKind::BreakTime => "break time {}",
            CommandKind::BreakEnable => "break enable {}",
            CommandKind::BreakDisable => "break disable {}",
            CommandKind::WatchList => "watch",
            CommandKind::WatchObject => "watch {}",
            CommandKind::WatchSync => "watch sync",
            CommandKind::WatchEnable => "watch enable {}",
            CommandKind::WatchDisable => "watch disable {}",
            CommandKind::Quit => "quit",
        }
    }
}

/// Typed result attached to a command when it completes
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutput {
    Step(StepStatus),
    Simulation(SimulationStatus),
    Globals(GlobalList),
    Properties(ObjectProperties),
}

/// One console command, from creation through queueing to completion
#[derive(Debug, Clone)]
pub struct GldCommand {
    pub kind: CommandKind,
    pub arg: Option<String>,
    /// Set by the session when the command's response is complete
    pub output: Option<CommandOutput>,
}

impl GldCommand {
    pub fn new(kind: CommandKind) -> GldCommand {
        GldCommand {
            kind,
            arg: None,
            output: None,
        }
    }

    pub fn with_arg(kind: CommandKind, arg: impl Into<String>) -> GldCommand {
        GldCommand {
            kind,
            arg: Some(arg.into()),
            output: None,
        }
    }

    /// Literal line written to the simulator console.
    ///
    /// The LIST refresh tag is carried on the command but never sent.
    pub fn render(&self) -> String {
        let template = self.kind.template();
        if template.contains("{}") {
            let arg = self.arg.as_deref().unwrap_or("");
            template.replace("{}", arg).trim_end().to_string()
        } else {
            template.to_string()
        }
    }
}
