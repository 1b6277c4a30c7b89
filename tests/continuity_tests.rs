/// Continuity integration tests: roster lifecycle over a full outline.

use manuscript_guard::core::continuity::ContinuityState;
use manuscript_guard::core::rules::ContinuityRules;
use manuscript_guard::schema::config::StoryConfig;
use manuscript_guard::schema::outline::{Outline, SceneId};
use std::path::Path;

fn fixture() -> (Outline, StoryConfig) {
    let outline = Outline::load_from_ron(Path::new("tests/fixtures/drowned_station.ron")).unwrap();
    let config = StoryConfig::load_from_ron(Path::new("tests/fixtures/story.ron")).unwrap();
    (outline, config)
}

#[test]
fn roster_comes_from_config() {
    let (outline, config) = fixture();
    let state = ContinuityState::from_outline(&outline, &config);
    assert!(state.is_enabled());
    let names: Vec<&str> = state.roster().iter().map(|c| c.name.as_str()).collect();
    assert_eq!(
        names,
        vec!["Elena Voss", "Warden", "Silas Greer", "Mara Quinn", "Jonah Reyes"]
    );
    assert_eq!(state.scene_order().len(), 8);
    assert_eq!(state.scene_order()[2], SceneId::new(2, 1));
}

#[test]
fn death_visible_only_after_death_scene() {
    let (outline, config) = fixture();
    let state = ContinuityState::from_outline(&outline, &config);

    for before in ["ch01_s01", "ch01_s02"] {
        assert!(state.dead_at(before).is_empty(), "{}", before);
        assert!(state.alive_at(before).contains("Silas Greer"), "{}", before);
    }
    for after in ["ch02_s01", "ch02_s02", "ch02_s03", "ch03_s01", "ch03_s02", "ch03_s03"] {
        let dead = state.dead_at(after);
        assert_eq!(dead.get("Silas Greer"), Some(&SceneId::new(1, 2)), "{}", after);
        assert!(!state.alive_at(after).contains("Silas Greer"), "{}", after);
        assert_eq!(state.alive_at(after).len(), 4, "{}", after);
    }
}

#[test]
fn dead_character_acting_on_page() {
    let (outline, config) = fixture();
    let state = ContinuityState::from_outline(&outline, &config);
    let result = state.validate("ch02_s01", "Silas walked into the room and said hello.", "Mara Quinn");
    assert!(!result.ok);
    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].contains("Dead character"));
    assert!(result.errors[0].contains("Silas Greer"));
    assert_eq!(result.retry_notes.len(), 1);
}

#[test]
fn remembered_dead_character_is_fine() {
    let (outline, config) = fixture();
    let state = ContinuityState::from_outline(&outline, &config);
    let text = "Elena remembered how Silas had said the pumps would hold. \
                Mara watched the water rise past the porthole.";
    let result = state.validate("ch02_s01", text, "Mara Quinn");
    assert!(result.ok, "{:?}", result.errors);
}

#[test]
fn empty_scene_always_rejected() {
    let (outline, config) = fixture();
    let state = ContinuityState::from_outline(&outline, &config);
    for scene in ["ch01_s01", "ch03_s03", "not_a_scene"] {
        let result = state.validate(scene, "", "Elena Voss");
        assert!(!result.ok);
        assert_eq!(result.errors, vec!["Empty scene.".to_string()]);
    }
}

#[test]
fn world_rules_forbid_sunlight_and_phones() {
    let (outline, config) = fixture();
    let state = ContinuityState::from_outline(&outline, &config);
    let text = "Sunlight spilled across the bridge while the phone rang for Jonah.";
    let result = state.validate("ch02_s02", text, "Elena Voss");
    assert_eq!(result.errors.len(), 2, "{:?}", result.errors);
    assert!(result.errors.iter().all(|e| e.starts_with("Setting violation")));
}

#[test]
fn context_block_grounds_the_generator() {
    let (outline, config) = fixture();
    let state = ContinuityState::from_outline(&outline, &config);
    let block = state.build_context_block("ch02_s02", "Elena");
    assert!(block.contains("POV: Elena Voss"));
    assert!(block.contains("Silas Greer (died in ch01_s02)"));
    assert!(block.contains("- The pumps were sabotaged."));
    assert!(block.contains("- The bulkhead was cut from the inside."));

    let opening = state.build_context_block("ch01_s01", "Elena");
    assert!(!opening.contains("Dead:"));
    assert!(!opening.contains("Established facts"));
}

#[test]
fn custom_rule_tables() {
    let rules = ContinuityRules::load_from_ron(Path::new("tests/fixtures/orbital_rules.ron")).unwrap();
    let outline = Outline::parse_ron(
        r#"(
            chapters: [
                (scenes: [
                    (purpose: "Docking", pov: "Ada"),
                    (purpose: "Hull breach", outcome: "Ivo is lost in the airlock"),
                    (purpose: "Ada alone", pov: "Ada"),
                ]),
            ],
        )"#,
    )
    .unwrap();
    let config = StoryConfig {
        protagonist: "Ada Okafor".to_string(),
        other_characters: "Ivo Marsh".to_string(),
        world_rules: "The ship runs in zero gravity.".to_string(),
        ..Default::default()
    };
    let state = ContinuityState::with_rules(&outline, &config, &rules).unwrap();
    assert_eq!(state.dead_at("ch01_s03").get("Ivo Marsh"), Some(&SceneId::new(1, 2)));

    let result = state.validate(
        "ch01_s03",
        "Ivo hovered by the hatch. Coffee poured from the bulb. It felt like a time loop.",
        "Ada",
    );
    assert_eq!(result.errors.len(), 3, "{:?}", result.errors);
    assert!(result.errors[0].starts_with("Dead character"));
    assert!(result.errors[1].starts_with("Setting violation"));
    assert!(result.errors[2].starts_with("Design drift"));

    // Default presence verbs are not in this table.
    assert!(state.validate("ch01_s03", "Ivo walked to the hatch.", "Ada").ok);
}

#[test]
fn state_can_move_across_threads() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<ContinuityState>();

    let (outline, config) = fixture();
    let state = ContinuityState::from_outline(&outline, &config);
    let handle = std::thread::spawn(move || state.dead_at("ch03_s01").len());
    assert_eq!(handle.join().unwrap(), 1);
}
