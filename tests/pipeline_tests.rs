/// Pipeline integration tests: drafting a whole outline against continuity state.

use manuscript_guard::core::continuity::ContinuityState;
use manuscript_guard::core::pipeline::{DraftSession, PipelineError};
use manuscript_guard::schema::config::StoryConfig;
use manuscript_guard::schema::outline::Outline;
use std::path::Path;

fn state() -> ContinuityState {
    let outline = Outline::load_from_ron(Path::new("tests/fixtures/drowned_station.ron")).unwrap();
    let config = StoryConfig::load_from_ron(Path::new("tests/fixtures/story.ron")).unwrap();
    ContinuityState::from_outline(&outline, &config)
}

#[test]
fn drafts_outline_in_order() {
    let state = state();
    let outline = Outline::load_from_ron(Path::new("tests/fixtures/drowned_station.ron")).unwrap();
    let mut session = DraftSession::new(&state, |prompt: &str| -> Result<String, String> {
        if prompt.contains("Silas Greer (died in") {
            Ok("Elena checked the seals alone. The hull ticked in the cold.".to_string())
        } else {
            Ok("Silas walked the lower deck with Elena, checking every seal.".to_string())
        }
    });

    let mut drafted = Vec::new();
    for (id, scene) in outline.ordered_scenes() {
        let result = session.draft(&id.to_string(), &scene.pov, &scene.purpose).unwrap();
        drafted.push(result);
    }
    assert_eq!(drafted.len(), 8);
    assert!(drafted.iter().all(|d| d.accepted && d.attempts == 1));
    assert!(drafted[0].text.starts_with("Silas walked"));
    assert!(drafted[2].text.starts_with("Elena checked"));
}

#[test]
fn advisory_result_after_exhausting_retries() {
    let state = state();
    let mut session = DraftSession::new(&state, |_: &str| -> Result<String, String> {
        Ok("Silas said nothing as sunlight filled the galley.".to_string())
    })
    .max_attempts(3);

    let drafted = session.draft("ch02_s01", "Mara Quinn", "Mourn Silas.").unwrap();
    assert!(!drafted.accepted);
    assert_eq!(drafted.attempts, 3);
    assert_eq!(drafted.validation.errors.len(), 2);
    assert_eq!(session.last_drafted().map(|id| id.to_string()), Some("ch02_s01".to_string()));

    let err = session.draft("ch01_s02", "Elena Voss", "Too late.").unwrap_err();
    assert!(matches!(err, PipelineError::OutOfOrder { .. }));
    assert_eq!(err.to_string(), "scene ch01_s02 comes before already drafted scene ch02_s01");
}
