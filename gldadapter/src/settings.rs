/// Project settings
///
/// Everything that shapes a simulator launch: the executable, model
/// files, command line flags, the GLPATH override, and the breakpoint
/// and watch lists installed once the debugger is up. Settings persist
/// as a JSON project file.
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::commands::{CommandKind, GldCommand};

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Failed to read project file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse project file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid project settings: {0}")]
    Invalid(String),
}

/// Encoding of XML streams written by the simulator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum XmlEncoding {
    Utf8,
    Utf16,
    Utf32,
}

impl XmlEncoding {
    pub fn bits(&self) -> u32 {
        match self {
            XmlEncoding::Utf8 => 8,
            XmlEncoding::Utf16 => 16,
            XmlEncoding::Utf32 => 32,
        }
    }
}

impl Default for XmlEncoding {
    fn default() -> XmlEncoding {
        XmlEncoding::Utf8
    }
}

/// Runtime environment the simulator integrates with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SimEnvironment {
    Batch,
    Matlab,
}

impl Default for SimEnvironment {
    fn default() -> SimEnvironment {
        SimEnvironment::Batch
    }
}

/// What a saved breakpoint triggers on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BreakpointKind {
    Error,
    Clock,
    Object,
    Module,
    Class,
    Pass,
    Rank,
    Time,
}

/// One saved breakpoint definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Breakpoint {
    pub kind: BreakpointKind,
    /// Object name, rank, timestamp, and so on, depending on the kind
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl Breakpoint {
    pub fn to_command(&self) -> GldCommand {
        let kind = match self.kind {
            BreakpointKind::Error => CommandKind::BreakError,
            BreakpointKind::Clock => CommandKind::BreakClock,
            BreakpointKind::Object => CommandKind::BreakObject,
            BreakpointKind::Module => CommandKind::BreakModule,
            BreakpointKind::Class => CommandKind::BreakClass,
            BreakpointKind::Pass => CommandKind::BreakPass,
            BreakpointKind::Rank => CommandKind::BreakRank,
            BreakpointKind::Time => CommandKind::BreakTime,
        };
        match &self.value {
            Some(value) => GldCommand::with_arg(kind, value.clone()),
            None => GldCommand::new(kind),
        }
    }
}

/// One saved watchpoint definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Watch {
    pub object: String,
    /// Watch a single property instead of the whole object
    #[serde(default)]
    pub property: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl Watch {
    pub fn to_command(&self) -> GldCommand {
        let arg = match &self.property {
            Some(property) => format!("{} {}", self.object, property),
            None => self.object.clone(),
        };
        GldCommand::with_arg(CommandKind::WatchObject, arg)
    }
}

fn default_enabled() -> bool {
    true
}

/// Launch configuration for one debugging project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectSettings {
    pub gridlab_exe: PathBuf,
    pub working_dir: PathBuf,
    pub model_files: Vec<PathBuf>,
    /// Where the simulator writes its output dump, if anywhere
    pub output_file: Option<PathBuf>,
    /// Overrides the GLPATH environment variable for the launch
    pub gl_path: Option<String>,
    pub debug_messages: bool,
    pub verbose: bool,
    pub quiet: bool,
    pub warnings: bool,
    pub profiling: bool,
    pub module_check: bool,
    pub dump_all: bool,
    pub xml_encoding: XmlEncoding,
    /// Worker threads for the simulator; zero leaves it unset
    pub thread_count: u32,
    pub environment: SimEnvironment,
    pub breakpoints: Vec<Breakpoint>,
    pub watches: Vec<Watch>,
}

impl Default for ProjectSettings {
    fn default() -> ProjectSettings {
        ProjectSettings {
            gridlab_exe: PathBuf::from("gridlabd"),
            working_dir: PathBuf::from("."),
            model_files: Vec::new(),
            output_file: None,
            gl_path: None,
            debug_messages: false,
            verbose: false,
            quiet: false,
            warnings: false,
            profiling: false,
            module_check: false,
            dump_all: false,
            xml_encoding: XmlEncoding::Utf8,
            thread_count: 0,
            environment: SimEnvironment::Batch,
            breakpoints: Vec::new(),
            watches: Vec::new(),
        }
    }
}

impl ProjectSettings {
    /// Load settings from a JSON project file.
    pub fn load(path: impl AsRef<Path>) -> Result<ProjectSettings, SettingsError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Save settings as a JSON project file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), SettingsError> {
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Check the fields a launch cannot start without.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.gridlab_exe.as_os_str().is_empty() {
            return Err(SettingsError::Invalid("no simulator executable set".into()));
        }
        if self.model_files.is_empty() {
            return Err(SettingsError::Invalid("no model files listed".into()));
        }
        if !self.working_dir.is_dir() {
            return Err(SettingsError::Invalid(format!(
                "working directory does not exist: {}",
                self.working_dir.display()
            )));
        }
        Ok(())
    }

    /// Argument vector for the simulator invocation.
    ///
    /// The debugger console and merged output streams are not optional;
    /// everything the session does depends on them.
    pub fn build_command_line(&self, pid_file: &Path) -> Vec<String> {
        let mut args = Vec::new();
        if self.debug_messages {
            args.push("--debug".to_string());
        }
        if self.verbose {
            args.push("--verbose".to_string());
        }
        if self.quiet {
            args.push("--quiet".to_string());
        }
        if self.warnings {
            args.push("--warn".to_string());
        }
        if self.profiling {
            args.push("--profile".to_string());
        }
        if self.module_check {
            args.push("--check".to_string());
        }
        if self.dump_all {
            args.push("--dumpall".to_string());
        }
        args.push("--xmlencoding".to_string());
        args.push(self.xml_encoding.bits().to_string());
        if self.thread_count > 0 {
            args.push("--threadcount".to_string());
            args.push(self.thread_count.to_string());
        }
        if self.environment == SimEnvironment::Matlab {
            args.push("--environment".to_string());
            args.push("matlab".to_string());
        }
        args.push("--debugger".to_string());
        args.push("--bothstdout".to_string());
        if let Some(output) = &self.output_file {
            args.push("-o".to_string());
            args.push(output.to_string_lossy().into_owned());
        }
        args.push(format!("--pidfile={}", pid_file.display()));
        for model in &self.model_files {
            args.push(model.to_string_lossy().into_owned());
        }
        args
    }
}
