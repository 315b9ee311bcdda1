//! End-to-end agent tests: dialogues, save/load through real files.

use phatic_core::{LearningError, ModelKind, MoveKey, MoveWindow, PhaticConfig};
use phatic_learning::{AgentPhase, QLearningAgent};
use std::fs;
use tempfile::TempDir;

const WIDTH: usize = 6;

fn config(model: ModelKind) -> PhaticConfig {
    let mut config = PhaticConfig::default();
    config.agent.seed = Some(7);
    config.agent.model = model;
    config.network.topology = vec![WIDTH, 4, 1];
    config.feelings.topology = vec![WIDTH, 2, 1];
    config.feelings.seed_count = 3;
    config
}

fn mv(subject: &str) -> MoveKey {
    MoveKey::new(subject, "says", "something")
}

/// Crude context rendering: one slot per window position, filled with the
/// subject's first byte scaled into [0, 1].
fn render(window: &MoveWindow) -> Vec<f64> {
    let mut ctx = vec![0.0; WIDTH];
    for (slot, m) in ctx.iter_mut().zip(window.iter()) {
        *slot = f64::from(m.subject().as_bytes()[0]) / 255.0;
    }
    ctx
}

/// Feed `script` to the agent, returning every predicted move.
fn converse(agent: &mut QLearningAgent, script: &[&str]) -> Vec<MoveKey> {
    let mut window = MoveWindow::new(WIDTH);
    let mut predictions = Vec::new();
    for subject in script {
        let observed = mv(subject);
        window.push(observed.clone());
        let state = window.signature();
        let ctx = render(&window);
        predictions.push(agent.step(&observed, &state, &ctx).unwrap());
    }
    predictions
}

const SCRIPT: &[&str] = &[
    "hello", "hello", "how", "fine", "how", "fine", "bye", "hello", "how", "fine",
];

#[test]
fn test_dialogue_grows_registry_and_counts() {
    let mut agent = QLearningAgent::new(&config(ModelKind::Network)).unwrap();
    let predictions = converse(&mut agent, SCRIPT);

    assert_eq!(predictions[0], mv("hello"));
    assert_eq!(agent.phase(), AgentPhase::Steady);
    // hello, how, fine, bye
    assert_eq!(agent.move_registry().len(), 4);
    assert_eq!(
        agent.visit_frequencies().total_visits(),
        (SCRIPT.len() - 1) as u64
    );
    for p in &predictions {
        assert!(agent.move_registry().contains(p));
    }
}

#[test]
fn test_save_load_save_is_byte_identical() {
    let dir = TempDir::new().unwrap();
    let first = dir.path().join("agent.txt");
    let second = dir.path().join("agent2.txt");

    let mut agent = QLearningAgent::new(&config(ModelKind::Network)).unwrap();
    converse(&mut agent, SCRIPT);
    agent.save(&first).unwrap();

    let loaded = QLearningAgent::from_file(&config(ModelKind::Network), &first).unwrap();
    loaded.save(&second).unwrap();

    assert_eq!(fs::read(&first).unwrap(), fs::read(&second).unwrap());
    assert_eq!(loaded.move_registry().keys(), agent.move_registry().keys());
    assert_eq!(loaded.phase(), AgentPhase::Uninitialized);
}

#[test]
fn test_file_header_counts() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("agent.txt");

    let mut agent = QLearningAgent::new(&config(ModelKind::Network)).unwrap();
    converse(&mut agent, SCRIPT);
    agent.save(&path).unwrap();

    let text = fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 2);
    let models: usize = lines[0].split_whitespace().next().unwrap().parse().unwrap();
    let keys: usize = lines[1].split_whitespace().next().unwrap().parse().unwrap();
    assert_eq!(models, agent.move_registry().len());
    assert_eq!(keys, agent.visit_frequencies().key_count());
}

#[test]
fn test_loaded_agents_replay_identically() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("agent.txt");

    let mut trained = QLearningAgent::new(&config(ModelKind::Network)).unwrap();
    converse(&mut trained, SCRIPT);
    trained.save(&path).unwrap();

    let mut a = QLearningAgent::from_file(&config(ModelKind::Network), &path).unwrap();
    let mut b = QLearningAgent::from_file(&config(ModelKind::Network), &path).unwrap();
    let script = ["how", "fine", "new", "bye", "hello", "new"];
    assert_eq!(converse(&mut a, &script), converse(&mut b, &script));
    assert_eq!(a.feeling(), b.feeling());
}

#[test]
fn test_loaded_visits_are_restored() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("agent.txt");

    let mut agent = QLearningAgent::new(&config(ModelKind::Network)).unwrap();
    converse(&mut agent, SCRIPT);
    agent.save(&path).unwrap();

    let loaded = QLearningAgent::from_file(&config(ModelKind::Network), &path).unwrap();
    let original: Vec<_> = agent.visit_frequencies().iter().collect();
    let restored: Vec<_> = loaded.visit_frequencies().iter().collect();
    assert_eq!(original, restored);
    // feeling statistics stay behind
    assert!(loaded.feeling_frequencies().is_empty());
}

#[test]
fn test_truncated_file_is_corrupt_and_agent_untouched() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("agent.txt");

    let mut agent = QLearningAgent::new(&config(ModelKind::Network)).unwrap();
    converse(&mut agent, SCRIPT);
    agent.save(&path).unwrap();

    let text = fs::read_to_string(&path).unwrap();
    fs::write(&path, &text[..text.len() / 2]).unwrap();

    let mut fresh = QLearningAgent::new(&config(ModelKind::Network)).unwrap();
    let err = fresh.load(&path).unwrap_err();
    match err {
        LearningError::PersistenceCorrupt { path: p, .. } => assert_eq!(p, path),
        other => panic!("expected PersistenceCorrupt, got {other:?}"),
    }
    assert!(fresh.move_registry().is_empty());
    assert!(fresh.visit_frequencies().is_empty());
}

#[test]
fn test_garbage_and_trailing_data_are_corrupt() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("agent.txt");
    let mut agent = QLearningAgent::new(&config(ModelKind::Network)).unwrap();

    fs::write(&path, "many a is x").unwrap();
    assert!(matches!(
        agent.load(&path),
        Err(LearningError::PersistenceCorrupt { .. })
    ));

    fs::write(&path, "0\n0\nextra\n").unwrap();
    assert!(matches!(
        agent.load(&path),
        Err(LearningError::PersistenceCorrupt { .. })
    ));

    fs::write(&path, [0xff, 0xfe, 0x00]).unwrap();
    assert!(matches!(
        agent.load(&path),
        Err(LearningError::PersistenceCorrupt { .. })
    ));
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = TempDir::new().unwrap();
    let mut agent = QLearningAgent::new(&config(ModelKind::Network)).unwrap();
    assert!(matches!(
        agent.load(dir.path().join("absent.txt")),
        Err(LearningError::Io(_))
    ));
}

#[test]
fn test_whitespace_in_move_cannot_be_saved() {
    let dir = TempDir::new().unwrap();
    let mut agent = QLearningAgent::new(&config(ModelKind::Network)).unwrap();
    agent
        .step(&MoveKey::new("two words", "is", "x"), "s", &[0.0; WIDTH])
        .unwrap();
    assert!(matches!(
        agent.save(dir.path().join("agent.txt")),
        Err(LearningError::UnencodableToken(_))
    ));
}

#[test]
fn test_failed_save_keeps_previous_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("agent.txt");

    let mut agent = QLearningAgent::new(&config(ModelKind::Network)).unwrap();
    converse(&mut agent, SCRIPT);
    agent.save(&path).unwrap();
    let good = fs::read(&path).unwrap();

    agent
        .step(&MoveKey::new("two words", "is", "x"), "s", &[0.0; WIDTH])
        .unwrap();
    assert!(matches!(
        agent.save(&path),
        Err(LearningError::UnencodableToken(_))
    ));

    assert_eq!(fs::read(&path).unwrap(), good);
    let restored = QLearningAgent::from_file(&config(ModelKind::Network), &path).unwrap();
    assert_eq!(restored.move_registry().len(), 4);
    // no staging files left behind
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
}

#[test]
fn test_overflowing_layer_width_is_corrupt() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("agent.txt");
    fs::write(&path, "1 a b c 3 9223372036854775808 2 1 0.1 0.2\n0\n").unwrap();

    let mut agent = QLearningAgent::new(&config(ModelKind::Network)).unwrap();
    match agent.load(&path) {
        Err(LearningError::PersistenceCorrupt { path: p, .. }) => assert_eq!(p, path),
        other => panic!("expected PersistenceCorrupt, got {other:?}"),
    }
    assert!(agent.move_registry().is_empty());
}

#[test]
fn test_load_replaces_existing_entries_in_place() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("agent.txt");

    let mut source = QLearningAgent::new(&config(ModelKind::Network)).unwrap();
    converse(&mut source, &["how", "fine"]);
    source.save(&path).unwrap();

    let mut target = QLearningAgent::new(&config(ModelKind::Network)).unwrap();
    converse(&mut target, &["fine", "bye"]);
    let fine_handle = target.move_registry().handle_of(&mv("fine")).unwrap();
    target.load(&path).unwrap();

    assert_eq!(
        target.move_registry().handle_of(&mv("fine")),
        Some(fine_handle)
    );
    assert_eq!(
        target.move_registry().keys(),
        &[mv("fine"), mv("bye"), mv("how")]
    );
}

#[test]
fn test_tabular_agent_round_trips() {
    let dir = TempDir::new().unwrap();
    let first = dir.path().join("agent.txt");
    let second = dir.path().join("agent2.txt");

    let mut agent = QLearningAgent::new(&config(ModelKind::Tabular)).unwrap();
    converse(&mut agent, SCRIPT);
    agent.save(&first).unwrap();

    let loaded = QLearningAgent::from_file(&config(ModelKind::Tabular), &first).unwrap();
    loaded.save(&second).unwrap();
    assert_eq!(
        fs::read_to_string(&first).unwrap(),
        fs::read_to_string(&second).unwrap()
    );
}

#[test]
fn test_dimension_mismatch_keeps_memory() {
    let mut agent = QLearningAgent::new(&config(ModelKind::Network)).unwrap();
    converse(&mut agent, &["hello", "how"]);
    let before = agent.memory().map(|m| m.action.clone());

    let err = agent.step(&mv("fine"), "s", &[0.5; WIDTH + 1]).unwrap_err();
    assert!(matches!(
        err,
        LearningError::DimensionMismatch {
            expected: WIDTH,
            actual: 7
        }
    ));
    assert_eq!(agent.memory().map(|m| m.action.clone()), before);
}

#[test]
fn test_dimension_mismatch_keeps_visit_counts() {
    let mut agent = QLearningAgent::new(&config(ModelKind::Network)).unwrap();
    converse(&mut agent, &["hello", "how"]);
    // a persisted entry whose network reads 3 inputs instead of WIDTH
    agent
        .load_from_str("1 a b c 3 3 2 1 0.1 0.2 0.3 0.4 0.5 0.6 0.7 0.8\n0\n")
        .unwrap();

    let before: Vec<_> = agent
        .visit_frequencies()
        .iter()
        .map(|(k, states)| (k.clone(), states.clone()))
        .collect();
    let total = agent.visit_frequencies().total_visits();
    let remembered = agent.memory().map(|m| m.action.clone());

    for subject in ["hello", "hello", "how"] {
        let err = agent.step(&mv(subject), "s", &[0.5; WIDTH]).unwrap_err();
        assert!(matches!(
            err,
            LearningError::DimensionMismatch {
                expected: 3,
                actual: WIDTH
            }
        ));
    }

    let after: Vec<_> = agent
        .visit_frequencies()
        .iter()
        .map(|(k, states)| (k.clone(), states.clone()))
        .collect();
    assert_eq!(after, before);
    assert_eq!(agent.visit_frequencies().total_visits(), total);
    assert_eq!(agent.memory().map(|m| m.action.clone()), remembered);
}
