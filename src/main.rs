use std::sync::Arc;

use gldadapter::{
    CommandKind, CommandOutput, GldCommand, GldListener, GldSession, GldStatus, OutputChannel,
    ProjectSettings, StepType,
};
use tokio::io::{AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() {
    // Initialize the logger first
    simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Info)
        .with_module_level("gldebug", log::LevelFilter::Debug)
        .with_module_level("gldadapter", log::LevelFilter::Debug)
        .init()
        .unwrap();

    // keep Ctrl-C aimed at the simulator, not this console
    gldadapter::process::install_signal_protection();

    let Some(project_path) = std::env::args().nth(1) else {
        eprintln!("Usage: gldebug <project.json>");
        std::process::exit(2);
    };

    log::info!("GLDebug console starting...");

    let settings = match ProjectSettings::load(&project_path) {
        Ok(settings) => settings,
        Err(e) => {
            log::error!("Failed to load project {}: {}", project_path, e);
            std::process::exit(1);
        }
    };

    let session = GldSession::new(settings);
    session.add_listener(Arc::new(ConsoleListener {
        session: session.clone(),
    }));

    if let Err(e) = session.load().await {
        log::error!("Failed to start simulation: {}", e);
        std::process::exit(1);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if !run_console_command(&session, &line).await {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                log::error!("Failed to read console input: {}", e);
                break;
            }
        }
    }

    if session.is_running() {
        session.queue_command(GldCommand::new(CommandKind::Quit));
    }
    log::info!("GLDebug console exiting");
}

/// One console input line, decoded
#[derive(Debug)]
enum ConsoleAction {
    Queue(GldCommand),
    Step(StepType),
    Reload,
    Interrupt,
    Kill,
    Halt,
    Quit,
    Help,
}

fn parse_console_command(line: &str) -> Option<ConsoleAction> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let action = match *tokens.first()? {
        "run" => ConsoleAction::Queue(GldCommand::new(CommandKind::Run)),
        "step" => ConsoleAction::Step(parse_step_type(tokens.get(1).copied())?),
        "where" | "context" => ConsoleAction::Queue(GldCommand::new(CommandKind::Context)),
        "list" => ConsoleAction::Queue(GldCommand::new(CommandKind::List)),
        "globals" => ConsoleAction::Queue(GldCommand::new(CommandKind::GlobalsList)),
        "print" => {
            if tokens.len() > 1 {
                ConsoleAction::Queue(GldCommand::with_arg(
                    CommandKind::PrintObject,
                    tokens[1..].join(" "),
                ))
            } else {
                ConsoleAction::Queue(GldCommand::new(CommandKind::PrintCurrent))
            }
        }
        "break" => ConsoleAction::Interrupt,
        "kill" => ConsoleAction::Kill,
        "halt" | "stop" => ConsoleAction::Halt,
        "load" | "reload" => ConsoleAction::Reload,
        "quit" | "exit" => ConsoleAction::Quit,
        "help" | "?" => ConsoleAction::Help,
        _ => return None,
    };
    Some(action)
}

fn parse_step_type(token: Option<&str>) -> Option<StepType> {
    match token {
        None | Some("object") => Some(StepType::Object),
        Some("rank") => Some(StepType::Rank),
        Some("pass") => Some(StepType::Pass),
        Some("iteration") | Some("iter") => Some(StepType::Iteration),
        Some("clock") => Some(StepType::Clock),
        Some(_) => None,
    }
}

async fn run_console_command(session: &GldSession, line: &str) -> bool {
    match parse_console_command(line) {
        Some(ConsoleAction::Queue(command)) => session.queue_command(command),
        Some(ConsoleAction::Step(step_type)) => session.step(step_type),
        Some(ConsoleAction::Reload) => {
            if let Err(e) = session.load().await {
                log::error!("Failed to restart simulation: {}", e);
            }
        }
        Some(ConsoleAction::Interrupt) => {
            if let Err(e) = session.post_break() {
                log::error!("Failed to interrupt simulator: {}", e);
            }
        }
        Some(ConsoleAction::Kill) => {
            if let Err(e) = session.post_kill() {
                log::error!("Failed to kill simulator: {}", e);
            }
        }
        Some(ConsoleAction::Halt) => session.stop(),
        Some(ConsoleAction::Quit) => return false,
        Some(ConsoleAction::Help) => print_help(),
        None => {
            let trimmed = line.trim();
            if !trimmed.is_empty() {
                println!("Unknown command: {} (try 'help')", trimmed);
            }
        }
    }
    true
}

fn print_help() {
    println!("Commands:");
    println!("  run                 run until a breakpoint or the end of the simulation");
    println!("  step [dimension]    step by object, rank, pass, iteration, or clock");
    println!("  where               show the simulator's current position");
    println!("  list                list model objects with their sync status");
    println!("  globals             list global variables");
    println!("  print [object]      print properties of an object (default: current)");
    println!("  break               interrupt a running simulation");
    println!("  halt                kill the simulator process");
    println!("  kill                kill the simulator by signal, bypassing the console");
    println!("  reload              restart the simulator and reload the model");
    println!("  quit                leave the debugger");
}

/// Prints everything the session reports to the terminal.
struct ConsoleListener {
    session: GldSession,
}

impl GldListener for ConsoleListener {
    fn clock_changed(&self, clock: &str) {
        println!("clock: {}", clock);
    }

    fn output(&self, channel: OutputChannel, message: &str) {
        match channel {
            OutputChannel::Stdout => print!("{}", message),
            OutputChannel::Stderr => eprint!("{}", message),
            OutputChannel::Lifecycle => println!("{}", message),
        }
    }

    fn status_changed(&self, status: GldStatus, command: Option<&GldCommand>) {
        let loaded = status == GldStatus::Stopped
            && command.map(|c| c.kind) == Some(CommandKind::Load);
        if loaded {
            // the simulator is at its first prompt
            self.session.install_breakpoints();
            self.session
                .queue_command(GldCommand::new(CommandKind::Context));
        }
    }

    fn command_results(&self, command: &GldCommand) {
        if command.kind == CommandKind::List {
            for object in self.session.object_list() {
                println!("{}", object);
            }
            return;
        }
        match command.output.as_ref() {
            Some(CommandOutput::Step(status)) => {
                println!(
                    "stopped at {} pass {} rank {} object {} iteration {}",
                    status.global_clock,
                    status.pass,
                    status.rank,
                    status.object_name,
                    status.iteration
                );
            }
            Some(CommandOutput::Simulation(status)) => {
                println!("Global clock... {}", status.global_clock);
                println!("Hard events.... {}", status.hard_events);
                println!("Sync status.... {}", status.sync_status);
                println!("Step to time... {}", status.step_to_time);
                println!("Pass........... {}", status.pass);
                println!("Rank........... {}", status.rank);
                println!("Object......... {}", status.object);
            }
            Some(CommandOutput::Globals(globals)) => {
                for entry in &globals.entries {
                    println!("{} = {}", entry.name, entry.value);
                }
            }
            Some(CommandOutput::Properties(props)) => {
                println!("object {} {{", props.object_name);
                for entry in &props.entries {
                    match &entry.property_type {
                        Some(property_type) => {
                            println!("  {} {} = {};", property_type, entry.name, entry.value)
                        }
                        None => println!("  {} = {};", entry.name, entry.value),
                    }
                }
                println!("}}");
            }
            None => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_console_commands() {
        match parse_console_command("run") {
            Some(ConsoleAction::Queue(cmd)) => assert_eq!(cmd.kind, CommandKind::Run),
            other => panic!("Unexpected action: {:?}", other),
        }
        match parse_console_command("print house:1") {
            Some(ConsoleAction::Queue(cmd)) => {
                assert_eq!(cmd.kind, CommandKind::PrintObject);
                assert_eq!(cmd.arg.as_deref(), Some("house:1"));
            }
            other => panic!("Unexpected action: {:?}", other),
        }
        match parse_console_command("print") {
            Some(ConsoleAction::Queue(cmd)) => assert_eq!(cmd.kind, CommandKind::PrintCurrent),
            other => panic!("Unexpected action: {:?}", other),
        }
        assert!(matches!(
            parse_console_command("break"),
            Some(ConsoleAction::Interrupt)
        ));
        assert!(matches!(
            parse_console_command("quit"),
            Some(ConsoleAction::Quit)
        ));
        assert!(parse_console_command("").is_none());
        assert!(parse_console_command("frobnicate").is_none());
    }

    #[test]
    fn test_parse_step_dimensions() {
        assert_eq!(parse_step_type(None), Some(StepType::Object));
        assert_eq!(parse_step_type(Some("clock")), Some(StepType::Clock));
        assert_eq!(parse_step_type(Some("iter")), Some(StepType::Iteration));
        assert_eq!(parse_step_type(Some("sideways")), None);

        match parse_console_command("step clock") {
            Some(ConsoleAction::Step(StepType::Clock)) => {}
            other => panic!("Unexpected action: {:?}", other),
        }
        match parse_console_command("step") {
            Some(ConsoleAction::Step(StepType::Object)) => {}
            other => panic!("Unexpected action: {:?}", other),
        }
    }
}
