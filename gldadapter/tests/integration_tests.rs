/// Integration tests for the GridLAB-D debugger adapter
///
/// These tests exercise the public API: project settings, command
/// rendering, output parsing, and session construction.
use gldadapter::*;

#[test]
fn test_session_creation() {
    let session = GldSession::new(ProjectSettings::default());
    assert_eq!(session.status(), GldStatus::None);
    assert!(!session.is_running());
    assert!(session.last_command().is_none());
    assert!(session.object_tree().is_none());
    assert_eq!(session.process_id(), None);
}

#[test]
fn test_parse_full_object_listing() {
    let listing = "\
ATbt--   10 2000-01-30 07:14:48 EST  Node1            ROOT
ATbt--   10 2000-01-30 07:14:48 EST  Node2            ROOT
-TTT1x    0 2000-01-30 07:14:48 EST  house:12         Node1
-t-t--    0 2000-01-30 07:14:48 EST  house:13         Node1
";
    let objects: Vec<GldObject> = listing
        .lines()
        .filter_map(parser::parse_object_listing)
        .collect();
    assert_eq!(objects.len(), 4);

    let node = &objects[0];
    assert_eq!(node.name, "Node1");
    assert_eq!(node.parent_name, "ROOT");
    assert_eq!(node.rank, 10);
    assert_eq!(node.clock, "2000-01-30 07:14:48 EST");
    assert_eq!(node.service, ServiceStatus::Active);
    assert!(!node.locked);
    assert!(!node.has_plc);

    let house = &objects[2];
    assert_eq!(house.name, "house:12");
    assert_eq!(house.parent_name, "Node1");
    assert_eq!(house.presync, SyncStatus::Post);
    assert!(house.locked);
    assert!(house.has_plc);
    assert_eq!(house.status_string(), "-TTT1x");

    let tree = ObjectTree::build(&objects);
    assert_eq!(tree.name, GldObject::ROOT_NAME);
    assert_eq!(tree.children.len(), 2);
    let node1 = tree.find("Node1").unwrap();
    assert_eq!(node1.children.len(), 2);
    assert!(tree.find("house:13").is_some());
    assert!(tree.find("house:99").is_none());
}

#[test]
fn test_command_rendering() {
    let cases = [
        (GldCommand::new(CommandKind::Run), "run"),
        (GldCommand::new(CommandKind::Next), "next"),
        (GldCommand::new(CommandKind::Context), "where"),
        (GldCommand::new(CommandKind::List), "list"),
        (GldCommand::new(CommandKind::PrintCurrent), "print"),
        (
            GldCommand::with_arg(CommandKind::PrintObject, "house:1"),
            "print house:1",
        ),
        (GldCommand::new(CommandKind::BreakError), "break error"),
        (
            GldCommand::with_arg(CommandKind::BreakClock, "2000-01-01 00:00:00"),
            "break clock 2000-01-01 00:00:00",
        ),
        (
            GldCommand::with_arg(CommandKind::WatchObject, "house:1 air_temperature"),
            "watch house:1 air_temperature",
        ),
        (GldCommand::new(CommandKind::Quit), "quit"),
    ];
    for (command, expected) in &cases {
        assert_eq!(command.render(), *expected, "for {:?}", command.kind);
    }
}

#[test]
fn test_framing_prompt_and_crlf() {
    let mut framer = framer::LineFramer::new();
    let mut messages = Vec::new();
    for ch in "DEBUG: time 2000-01-01 00:00:00 UTC\r\nGLD> ".chars() {
        framer.push(ch, &mut messages);
    }
    framer.finish(&mut messages);
    assert_eq!(
        messages,
        vec![
            "DEBUG: time 2000-01-01 00:00:00 UTC\r\n".to_string(),
            "GLD>".to_string(),
        ]
    );
}

#[test]
fn test_settings_save_and_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("project.json");

    let mut settings = ProjectSettings::default();
    settings.gridlab_exe = "/opt/gridlabd/bin/gridlabd".into();
    settings.model_files = vec!["feeder.glm".into(), "climate.glm".into()];
    settings.verbose = true;
    settings.thread_count = 4;
    settings.breakpoints.push(Breakpoint {
        kind: BreakpointKind::Time,
        value: Some("2000-06-01 00:00:00".to_string()),
        enabled: true,
    });
    settings.watches.push(Watch {
        object: "house:1".to_string(),
        property: Some("air_temperature".to_string()),
        enabled: false,
    });

    settings.save(&path).unwrap();
    let loaded = ProjectSettings::load(&path).unwrap();
    assert_eq!(loaded, settings);
}

#[test]
fn test_settings_command_line() {
    let mut settings = ProjectSettings::default();
    settings.gridlab_exe = "gridlabd".into();
    settings.model_files = vec!["model.glm".into()];
    settings.verbose = true;
    settings.warnings = true;
    settings.thread_count = 2;

    let args = settings.build_command_line(std::path::Path::new("/tmp/sim.pid"));
    assert_eq!(
        args,
        vec![
            "--verbose",
            "--warn",
            "--xmlencoding",
            "8",
            "--threadcount",
            "2",
            "--debugger",
            "--bothstdout",
            "--pidfile=/tmp/sim.pid",
            "model.glm",
        ]
    );
}

#[test]
fn test_step_dimension_detection() {
    let baseline = StepStatus {
        global_clock: "2000-01-01 00:00:00 UTC".to_string(),
        pass: "PRESYNC".to_string(),
        rank: 2,
        object_name: "house:1".to_string(),
        iteration: 1,
        update_focus: false,
    };

    let cases = [
        (StepType::Object, baseline.clone(), true),
        (
            StepType::Clock,
            StepStatus {
                global_clock: "2000-01-01 00:15:00 UTC".to_string(),
                ..baseline.clone()
            },
            true,
        ),
        (StepType::Clock, baseline.clone(), false),
        (
            StepType::Rank,
            StepStatus {
                rank: 3,
                ..baseline.clone()
            },
            true,
        ),
        (StepType::Pass, baseline.clone(), false),
        (
            StepType::Iteration,
            StepStatus {
                iteration: 2,
                ..baseline.clone()
            },
            true,
        ),
    ];

    for (step_type, status, expected) in &cases {
        let mut tracker = StepTracker::default();
        tracker.record(baseline.clone(), false);
        tracker.begin(*step_type);
        assert_eq!(
            tracker.evaluate(status),
            *expected,
            "stepping by {:?}",
            step_type
        );
    }
}

#[test]
fn test_global_and_property_parsing() {
    let mut globals = GlobalList::default();
    parser::parse_global_line(
        &mut globals,
        "version.major                   : \"2\"",
    );
    parser::parse_global_line(
        &mut globals,
        "clock                           : 2000-09-27 04:05:42 EDT",
    );
    assert_eq!(globals.get("version.major"), Some("2"));
    assert_eq!(globals.get("clock"), Some("2000-09-27 04:05:42 EDT"));

    let mut props = ObjectProperties::default();
    parser::parse_property_line(&mut props, "DEBUG: object house:12 {");
    parser::parse_property_line(&mut props, "  double floor_area = 2500.0;");
    parser::parse_property_line(&mut props, "  parent = Node1");
    assert_eq!(props.object_name, "house:12");
    assert_eq!(props.get("floor_area"), Some("2500.0"));
    assert_eq!(props.get("parent"), Some("Node1"));
}

#[tokio::test]
async fn test_load_rejects_bad_settings() {
    // no model files
    let session = GldSession::new(ProjectSettings::default());
    match session.load().await {
        Err(GldError::Settings(_)) => {}
        other => panic!("Expected a settings error, got {:?}", other.err()),
    }
    assert_eq!(session.status(), GldStatus::None);
    assert!(!session.is_running());
}

#[tokio::test]
async fn test_load_reports_missing_executable() {
    let dir = tempfile::tempdir().unwrap();
    let mut settings = ProjectSettings::default();
    settings.gridlab_exe = "/nonexistent/gridlabd-binary".into();
    settings.working_dir = dir.path().to_path_buf();
    settings.model_files = vec!["model.glm".into()];

    let session = GldSession::new(settings);
    match session.load().await {
        Err(GldError::Process(_)) => {}
        other => panic!("Expected a process error, got {:?}", other.err()),
    }
    // a failed launch leaves the session untouched
    assert_eq!(session.status(), GldStatus::None);
    assert!(!session.is_running());
}
