/// GridLAB-D debugger adapter
///
/// Drives a gridlabd process in interactive debugger mode. The session
/// frames console output into messages, classifies responses against
/// the executing command, runs commands one at a time through a FIFO
/// queue, and notifies registered listeners of clock changes, raw
/// output, status transitions, and command results.
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, LazyLock, Mutex};

use regex::Regex;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;

pub mod commands;
pub mod events;
pub mod framer;
pub mod parser;
pub mod process;
pub mod settings;
pub mod step;
pub mod types;

pub use commands::{CommandKind, CommandOutput, GldCommand, LIST_UPDATE_TAG};
pub use events::{GldListener, LifecycleEvent, OutputChannel, ProcessEvent};
pub use settings::{
    Breakpoint, BreakpointKind, ProjectSettings, SettingsError, SimEnvironment, Watch, XmlEncoding,
};
pub use step::{StepTracker, StepType};
pub use types::*;

use events::ListenerSet;
use process::GldProcess;

#[derive(Error, Debug)]
pub enum GldError {
    #[error("Simulator process error: {0}")]
    Process(#[from] process::ProcessError),
    #[error("Project settings error: {0}")]
    Settings(#[from] settings::SettingsError),
    #[error("Communication error: {0}")]
    Communication(String),
    #[error("Simulator process id is not known")]
    PidUnknown,
}

pub type Result<T> = std::result::Result<T, GldError>;

/// Prefix of the output line that announces a clock advance during a run
const CLOCK_MARKER: &str = "DEBUG: global_clock = ";

/// The clock value sits between the first and last single quote
static CLOCK_VALUE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"'(.*)'").expect("clock value pattern"));

/// A pending listener notification, collected under the session lock
/// and delivered after it is released
enum Notice {
    Clock(String),
    Output(OutputChannel, String),
    Status(GldStatus, Option<GldCommand>),
    Results(GldCommand),
}

struct SessionInner {
    status: GldStatus,
    executing: Option<GldCommand>,
    pending: VecDeque<GldCommand>,
    last_command: Option<GldCommand>,
    gridlab_running: bool,
    /// Bumped on every launch; events from earlier processes are stale
    generation: u64,
    writer: Option<mpsc::UnboundedSender<String>>,
    process: Option<GldProcess>,
    pid_file: Option<PathBuf>,
    pid: Option<u32>,
    step_status: Option<StepStatus>,
    sim_status: Option<SimulationStatus>,
    globals: Option<GlobalList>,
    object_props: Option<ObjectProperties>,
    objects: Vec<GldObject>,
    step: StepTracker,
}

impl SessionInner {
    fn new() -> SessionInner {
        SessionInner {
            status: GldStatus::None,
            executing: None,
            pending: VecDeque::new(),
            last_command: None,
            gridlab_running: false,
            generation: 0,
            writer: None,
            process: None,
            pid_file: None,
            pid: None,
            step_status: None,
            sim_status: None,
            globals: None,
            object_props: None,
            objects: Vec::new(),
            step: StepTracker::default(),
        }
    }
}

/// Owner of the simulator process and the debugger command queue
///
/// Cheap to clone; clones share the same session. All methods return
/// without blocking on the simulator, and listener callbacks run after
/// the internal lock is released, so callbacks may call back in.
#[derive(Clone)]
pub struct GldSession {
    config: Arc<Mutex<ProjectSettings>>,
    inner: Arc<Mutex<SessionInner>>,
    listeners: Arc<ListenerSet>,
}

impl GldSession {
    pub fn new(config: ProjectSettings) -> GldSession {
        GldSession {
            config: Arc::new(Mutex::new(config)),
            inner: Arc::new(Mutex::new(SessionInner::new())),
            listeners: Arc::new(ListenerSet::new()),
        }
    }

    pub fn add_listener(&self, listener: Arc<dyn GldListener>) {
        self.listeners.add(listener);
    }

    pub fn remove_listener(&self, listener: &Arc<dyn GldListener>) {
        self.listeners.remove(listener);
    }

    pub fn config(&self) -> ProjectSettings {
        self.config.lock().unwrap().clone()
    }

    pub fn set_config(&self, config: ProjectSettings) {
        *self.config.lock().unwrap() = config;
    }

    pub fn status(&self) -> GldStatus {
        self.inner.lock().unwrap().status
    }

    pub fn is_running(&self) -> bool {
        self.inner.lock().unwrap().gridlab_running
    }

    /// The most recently dispatched command, with its output if it has
    /// completed.
    pub fn last_command(&self) -> Option<GldCommand> {
        self.inner.lock().unwrap().last_command.clone()
    }

    /// Objects gathered by the most recent LIST.
    pub fn object_list(&self) -> Vec<GldObject> {
        self.inner.lock().unwrap().objects.clone()
    }

    /// Parent/child tree of the most recent LIST, or None before one
    /// completes.
    pub fn object_tree(&self) -> Option<ObjectTree> {
        let inner = self.inner.lock().unwrap();
        if inner.objects.is_empty() {
            None
        } else {
            Some(ObjectTree::build(&inner.objects))
        }
    }

    /// The simulator's process id, read from its pidfile.
    ///
    /// The simulator writes the file some time after launch, so this
    /// stays None until then; the first successful read is cached.
    pub fn process_id(&self) -> Option<u32> {
        let mut inner = self.inner.lock().unwrap();
        if inner.pid.is_none() {
            if let Some(path) = &inner.pid_file {
                inner.pid = process::read_pid_file(path);
            }
        }
        inner.pid
    }

    /// Launch the simulator and begin the load command.
    ///
    /// Any previous process is killed first. On success the session is
    /// RUNNING with LOAD executing; the load completes when the first
    /// prompt arrives. On failure the session state is left untouched.
    pub async fn load(&self) -> Result<()> {
        let config = self.config.lock().unwrap().clone();
        config.validate()?;

        let pid_file = process::allocate_pid_file();
        let mut proc = GldProcess::launch(&config, &pid_file)?;
        let stdin = proc
            .take_stdin()
            .ok_or_else(|| GldError::Communication("Failed to open stdin".to_string()))?;
        let stdout = proc
            .take_stdout()
            .ok_or_else(|| GldError::Communication("Failed to open stdout".to_string()))?;
        let stderr = proc
            .take_stderr()
            .ok_or_else(|| GldError::Communication("Failed to open stderr".to_string()))?;

        let (writer_tx, mut writer_rx) = mpsc::unbounded_channel::<String>();
        tokio::spawn(async move {
            let mut stdin = stdin;
            while let Some(line) = writer_rx.recv().await {
                if let Err(e) = stdin.write_all(line.as_bytes()).await {
                    log::error!("Failed to write to simulator stdin: {}", e);
                    break;
                }
                if let Err(e) = stdin.flush().await {
                    log::error!("Failed to flush simulator stdin: {}", e);
                    break;
                }
            }
        });

        let (events_tx, mut events_rx) = mpsc::unbounded_channel::<ProcessEvent>();
        framer::spawn_reader(stdout, OutputChannel::Stdout, events_tx.clone());
        framer::spawn_reader(stderr, OutputChannel::Stderr, events_tx);

        let load_cmd = GldCommand::new(CommandKind::Load);
        let generation;
        let notices = {
            let mut inner = self.inner.lock().unwrap();
            if let Some(mut old) = inner.process.take() {
                log::debug!("Killing previous simulator process");
                let _ = old.start_kill();
            }
            inner.generation += 1;
            generation = inner.generation;
            inner.process = Some(proc);
            inner.writer = Some(writer_tx);
            inner.pid_file = Some(pid_file);
            inner.pid = None;
            inner.pending.clear();
            inner.objects.clear();
            inner.step_status = None;
            inner.sim_status = None;
            inner.globals = None;
            inner.object_props = None;
            inner.step = StepTracker::default();
            inner.gridlab_running = true;
            inner.executing = Some(load_cmd.clone());
            inner.last_command = Some(load_cmd.clone());
            inner.status = GldStatus::Running;
            vec![Notice::Status(GldStatus::Running, Some(load_cmd))]
        };

        // both output streams funnel into one ordered sink
        let session = self.clone();
        tokio::spawn(async move {
            while let Some(event) = events_rx.recv().await {
                session.handle_event(generation, event);
            }
        });

        self.dispatch(notices);
        log::info!("Simulation load started");
        Ok(())
    }

    /// Queue a command; it dispatches now if nothing is executing.
    pub fn queue_command(&self, cmd: GldCommand) {
        let notices = {
            let mut inner = self.inner.lock().unwrap();
            let mut notices = Vec::new();
            self.queue_command_locked(&mut inner, cmd, &mut notices);
            notices
        };
        self.dispatch(notices);
    }

    /// Step until the given dimension of progress changes.
    ///
    /// The session keeps issuing `next` on its own; when the run
    /// finishes, a listing refresh is queued behind it.
    pub fn step(&self, step_type: StepType) {
        let notices = {
            let mut inner = self.inner.lock().unwrap();
            inner.step.begin(step_type);
            let mut notices = Vec::new();
            self.queue_command_locked(
                &mut inner,
                GldCommand::new(CommandKind::Next),
                &mut notices,
            );
            notices
        };
        self.dispatch(notices);
    }

    /// Queue every enabled breakpoint and watch from the project
    /// settings.
    pub fn install_breakpoints(&self) {
        let (breakpoints, watches) = {
            let config = self.config.lock().unwrap();
            (config.breakpoints.clone(), config.watches.clone())
        };
        for breakpoint in breakpoints.iter().filter(|b| b.enabled) {
            self.queue_command(breakpoint.to_command());
        }
        for watch in watches.iter().filter(|w| w.enabled) {
            self.queue_command(watch.to_command());
        }
    }

    /// Halt the simulator process without going through the queue.
    pub fn stop(&self) {
        let notices = {
            let mut inner = self.inner.lock().unwrap();
            if let Some(mut process) = inner.process.take() {
                log::info!("Halting simulator process");
                let _ = process.start_kill();
            }
            self.process_lifecycle_locked(&mut inner, LifecycleEvent::Halted)
        };
        self.dispatch(notices);
    }

    /// Interrupt the running simulation so it drops to the prompt.
    ///
    /// This goes around the console entirely: the signal is delivered
    /// to the process id from the pidfile.
    pub fn post_break(&self) -> Result<()> {
        let pid = self.process_id().ok_or(GldError::PidUnknown)?;
        log::info!("Sending break to simulator pid {}", pid);
        process::post_interrupt(pid)?;
        Ok(())
    }

    /// Terminate the simulator by signal and tear the session down.
    ///
    /// The process will not answer anything further, so the session
    /// drops to NONE before the signal is sent.
    pub fn post_kill(&self) -> Result<()> {
        let pid = self.process_id().ok_or(GldError::PidUnknown)?;
        let notices = {
            let mut inner = self.inner.lock().unwrap();
            inner.gridlab_running = false;
            inner.executing = None;
            inner.pending.clear();
            inner.objects.clear();
            inner.writer = None;
            inner.process = None;
            inner.status = GldStatus::None;
            vec![Notice::Status(GldStatus::None, None)]
        };
        self.dispatch(notices);
        log::info!("Sending terminate to simulator pid {}", pid);
        process::post_terminate(pid)?;
        Ok(())
    }

    /// Feed one process event through the response classifier.
    pub(crate) fn handle_event(&self, generation: u64, event: ProcessEvent) {
        let notices = {
            let mut inner = self.inner.lock().unwrap();
            if inner.generation != generation {
                return; // stale event from a replaced process
            }
            self.process_event_locked(&mut inner, event)
        };
        self.dispatch(notices);
    }

    fn process_event_locked(
        &self,
        inner: &mut SessionInner,
        event: ProcessEvent,
    ) -> Vec<Notice> {
        let mut notices = Vec::new();
        match event {
            ProcessEvent::Output { channel, message } => {
                log::trace!("RECV {}: {}", channel, message.trim_end());
                let at_prompt = message.trim() == framer::PROMPT.trim_end();
                let mut consumed = false;
                if inner.executing.is_some() {
                    consumed =
                        self.process_response_locked(inner, at_prompt, &message, &mut notices);
                }
                if !consumed && !at_prompt {
                    notices.push(Notice::Output(channel, message));
                }
            }
            ProcessEvent::Lifecycle(kind) => {
                notices = self.process_lifecycle_locked(inner, kind);
            }
        }
        notices
    }

    /// Classify one message against the executing command.
    ///
    /// Returns true when the message was consumed by a response
    /// handler; unconsumed non-prompt messages are broadcast as raw
    /// output.
    fn process_response_locked(
        &self,
        inner: &mut SessionInner,
        at_prompt: bool,
        msg: &str,
        notices: &mut Vec<Notice>,
    ) -> bool {
        let kind = match &inner.executing {
            Some(cmd) => cmd.kind,
            None => return false,
        };
        match kind {
            CommandKind::Run | CommandKind::Load => {
                if msg.starts_with(CLOCK_MARKER) {
                    if let Some(caps) = CLOCK_VALUE.captures(msg) {
                        notices.push(Notice::Clock(caps[1].to_string()));
                        return true;
                    }
                }
                let consumed = Self::populate_step_status(inner, msg);
                if at_prompt {
                    self.finalize_step_status(inner, notices);
                    self.finish_command(inner, notices);
                }
                consumed
            }
            CommandKind::Next => {
                let consumed = Self::populate_step_status(inner, msg);
                if at_prompt {
                    let finished = self.finalize_step_status(inner, notices);
                    self.finish_command(inner, notices);
                    if finished {
                        self.queue_command_locked(
                            inner,
                            GldCommand::with_arg(CommandKind::List, LIST_UPDATE_TAG),
                            notices,
                        );
                    } else {
                        self.queue_command_locked(
                            inner,
                            GldCommand::new(CommandKind::Next),
                            notices,
                        );
                    }
                }
                consumed
            }
            CommandKind::Context => {
                if at_prompt {
                    let output = inner.sim_status.take().unwrap_or_default();
                    if let Some(cmd) = inner.executing.as_mut() {
                        cmd.output = Some(CommandOutput::Simulation(output));
                    }
                    self.post_results(inner, notices);
                    self.finish_command(inner, notices);
                    return true;
                }
                let status = inner.sim_status.get_or_insert_with(SimulationStatus::default);
                if msg.starts_with("DEBUG: Global clock") {
                    if let Some(value) = parser::parse_dotted_value(msg) {
                        status.global_clock = value.to_string();
                    }
                    true
                } else if msg.starts_with("DEBUG: Hard events") {
                    match parser::parse_dotted_value(msg).and_then(|v| v.parse().ok()) {
                        Some(count) => {
                            status.hard_events = count;
                            true
                        }
                        None => false,
                    }
                } else if msg.starts_with("DEBUG: Sync status") {
                    if let Some(value) = parser::parse_dotted_value(msg) {
                        status.sync_status = value.to_string();
                    }
                    true
                } else if msg.starts_with("DEBUG: Step to time") {
                    if let Some(value) = parser::parse_dotted_value(msg) {
                        status.step_to_time = value.to_string();
                    }
                    true
                } else if msg.starts_with("DEBUG: Pass") {
                    if let Some(value) = parser::parse_dotted_value(msg) {
                        status.pass = value.to_string();
                    }
                    true
                } else if msg.starts_with("DEBUG: Rank") {
                    match parser::parse_dotted_value(msg).and_then(|v| v.parse().ok()) {
                        Some(rank) => {
                            status.rank = rank;
                            true
                        }
                        None => false,
                    }
                } else if msg.starts_with("DEBUG: Object") {
                    if let Some(value) = parser::parse_dotted_value(msg) {
                        status.object = value.to_string();
                    }
                    true
                } else {
                    // anything unrecognized passes through as raw output
                    false
                }
            }
            CommandKind::GlobalsList => {
                if at_prompt {
                    let output = inner.globals.take().unwrap_or_default();
                    if let Some(cmd) = inner.executing.as_mut() {
                        cmd.output = Some(CommandOutput::Globals(output));
                    }
                    self.post_results(inner, notices);
                    self.finish_command(inner, notices);
                } else if let Some(globals) = inner.globals.as_mut() {
                    parser::parse_global_line(globals, msg);
                }
                true
            }
            CommandKind::PrintCurrent | CommandKind::PrintObject => {
                if at_prompt {
                    let output = inner.object_props.take().unwrap_or_default();
                    if let Some(cmd) = inner.executing.as_mut() {
                        cmd.output = Some(CommandOutput::Properties(output));
                    }
                    self.post_results(inner, notices);
                    self.finish_command(inner, notices);
                } else if let Some(props) = inner.object_props.as_mut() {
                    parser::parse_property_line(props, msg);
                }
                true
            }
            CommandKind::List => {
                if at_prompt {
                    self.post_results(inner, notices);
                    self.finish_command(inner, notices);
                    false
                } else {
                    if let Some(obj) = parser::parse_object_listing(msg) {
                        inner.objects.push(obj);
                    }
                    true
                }
            }
            _ => {
                // break, watch, and quit produce no typed output; the
                // prompt alone completes them
                if at_prompt {
                    self.finish_command(inner, notices);
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Fold one step-status line into the accumulator.
    fn populate_step_status(inner: &mut SessionInner, msg: &str) -> bool {
        match parser::parse_step_line(msg) {
            parser::StepLine::Clock(clock) => {
                inner
                    .step_status
                    .get_or_insert_with(StepStatus::default)
                    .global_clock = clock.to_string();
                true
            }
            parser::StepLine::Pass {
                pass,
                rank,
                object,
                iteration,
            } => {
                let status = inner.step_status.get_or_insert_with(StepStatus::default);
                status.pass = pass.to_string();
                status.rank = rank;
                status.object_name = object.to_string();
                status.iteration = iteration;
                true
            }
            parser::StepLine::Consumed => true,
            parser::StepLine::Unrecognized => false,
        }
    }

    /// Close out the step-status accumulator at a prompt.
    ///
    /// Attaches the snapshot to the executing command, posts results,
    /// and reports whether the current step run is finished. With no
    /// accumulated status there is nothing to report and the run is not
    /// finished.
    fn finalize_step_status(&self, inner: &mut SessionInner, notices: &mut Vec<Notice>) -> bool {
        let Some(mut status) = inner.step_status.take() else {
            return false;
        };
        let finished = inner.step.evaluate(&status);
        status.update_focus = finished;
        if let Some(cmd) = inner.executing.as_mut() {
            cmd.output = Some(CommandOutput::Step(status.clone()));
        }
        self.post_results(inner, notices);
        inner.step.record(status, finished);
        finished
    }

    /// Complete the executing command: STOPPED, notify, then dispatch
    /// the next queued command.
    fn finish_command(&self, inner: &mut SessionInner, notices: &mut Vec<Notice>) {
        let finished = inner.executing.take();
        if let Some(cmd) = &finished {
            inner.last_command = Some(cmd.clone());
        }
        inner.status = GldStatus::Stopped;
        notices.push(Notice::Status(GldStatus::Stopped, finished));

        if let Some(next) = inner.pending.pop_front() {
            self.dispatch_command_locked(inner, next, notices);
        }
    }

    fn queue_command_locked(
        &self,
        inner: &mut SessionInner,
        cmd: GldCommand,
        notices: &mut Vec<Notice>,
    ) {
        if inner.executing.is_none() {
            self.dispatch_command_locked(inner, cmd, notices);
        } else {
            inner.pending.push_back(cmd);
        }
    }

    /// Make a command the executing one and send its line.
    fn dispatch_command_locked(
        &self,
        inner: &mut SessionInner,
        cmd: GldCommand,
        notices: &mut Vec<Notice>,
    ) {
        match cmd.kind {
            CommandKind::List => inner.objects.clear(),
            CommandKind::GlobalsList => inner.globals = Some(GlobalList::default()),
            CommandKind::PrintCurrent | CommandKind::PrintObject => {
                inner.object_props = Some(ObjectProperties::default())
            }
            _ => {}
        }
        inner.executing = Some(cmd.clone());
        inner.last_command = Some(cmd.clone());
        inner.status = GldStatus::Running;
        notices.push(Notice::Status(GldStatus::Running, Some(cmd.clone())));
        let line = cmd.render();
        if !line.is_empty() {
            self.write_line_locked(inner, &line);
        }
    }

    fn write_line_locked(&self, inner: &mut SessionInner, line: &str) {
        match &inner.writer {
            Some(writer) => {
                log::debug!("SEND: {}", line);
                if writer.send(format!("{}\n", line)).is_err() {
                    log::error!("Simulator stdin is gone; dropped command: {}", line);
                }
            }
            None => log::error!("No simulator process; dropped command: {}", line),
        }
    }

    /// Tear the session down when the process ends.
    ///
    /// Idempotent: both output streams report EOF and a halt also lands
    /// here, but only the first arrival does anything. The executing
    /// command is force-completed with no output and no results.
    fn process_lifecycle_locked(
        &self,
        inner: &mut SessionInner,
        kind: LifecycleEvent,
    ) -> Vec<Notice> {
        let mut notices = Vec::new();
        if !inner.gridlab_running {
            return notices;
        }
        log::debug!("{}", kind);
        inner.gridlab_running = false;
        notices.push(Notice::Output(OutputChannel::Lifecycle, kind.to_string()));

        let finished = inner.executing.take();
        if let Some(cmd) = &finished {
            inner.last_command = Some(cmd.clone());
        }
        inner.status = GldStatus::None;
        notices.push(Notice::Status(GldStatus::None, finished));

        inner.process = None;
        inner.writer = None;
        inner.objects.clear();
        notices
    }

    /// Post the executing command as results.
    fn post_results(&self, inner: &mut SessionInner, notices: &mut Vec<Notice>) {
        if let Some(cmd) = inner.executing.clone() {
            notices.push(Notice::Results(cmd));
        }
    }

    /// Deliver collected notices to a snapshot of the listeners.
    fn dispatch(&self, notices: Vec<Notice>) {
        if notices.is_empty() {
            return;
        }
        let listeners = self.listeners.snapshot();
        for notice in notices {
            match notice {
                Notice::Clock(clock) => {
                    for listener in &listeners {
                        listener.clock_changed(&clock);
                    }
                }
                Notice::Output(channel, message) => {
                    for listener in &listeners {
                        listener.output(channel, &message);
                    }
                }
                Notice::Status(status, cmd) => {
                    for listener in &listeners {
                        listener.status_changed(status, cmd.as_ref());
                    }
                }
                Notice::Results(cmd) => {
                    for listener in &listeners {
                        listener.command_results(&cmd);
                    }
                }
            }
        }
    }
}
