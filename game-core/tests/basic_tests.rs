mod common;

use common::*;
use game_core::{
    JsonFileRoundSource, Round, RoundOutcome, RoundSession, RoundSource, VecRoundSource,
};
use game_types::GameStateError;
use std::time::Duration;
use uuid::Uuid;

#[test]
fn test_json_source_serves_rounds_in_order() {
    let file = write_rounds_file(&[create_test_spec(1), create_test_spec(2)]);
    let mut source = JsonFileRoundSource::open(file.path(), false).unwrap();

    assert_eq!(source.loaded_count(), 2);
    assert_eq!(source.next_round().unwrap().map(|s| s.game_id), Some(1));
    assert_eq!(source.next_round().unwrap().map(|s| s.game_id), Some(2));
    assert!(source.next_round().unwrap().is_none());
}

#[test]
fn test_json_source_cycles_when_asked() {
    let file = write_rounds_file(&[create_test_spec(10), create_test_spec(11)]);
    let mut source = JsonFileRoundSource::open(file.path(), true).unwrap();

    let ids: Vec<u32> = (0..5)
        .map(|_| source.next_round().unwrap().unwrap().game_id)
        .collect();
    assert_eq!(ids, vec![10, 11, 10, 11, 10]);
    assert_eq!(source.served_count(), 5);
}

#[test]
fn test_json_source_ignores_unknown_fields() {
    let mut spec = serde_json::to_value(create_test_spec(3)).unwrap();
    spec["difficulty"] = serde_json::json!("hard");
    let file = write_raw_file(&serde_json::to_string(&vec![spec]).unwrap());

    let mut source = JsonFileRoundSource::open(file.path(), false).unwrap();
    assert_eq!(source.next_round().unwrap().unwrap(), create_test_spec(3));
}

#[test]
fn test_json_source_rejects_malformed_round() {
    let mut bad = create_test_spec(4);
    bad.groups[0].words.pop();
    let file = write_rounds_file(&[create_test_spec(3), bad]);

    let err = JsonFileRoundSource::open(file.path(), false).unwrap_err();
    assert!(format!("{:#}", err).contains("gameId=4"));
}

#[test]
fn test_json_source_rejects_missing_file() {
    assert!(JsonFileRoundSource::open("/definitely/not/here.json", false).is_err());
}

#[test]
fn test_closed_source_errors() {
    let mut source = VecRoundSource::new(vec![create_test_spec(1)]);
    source.close().unwrap();
    assert!(source.is_closed());
    assert!(source.next_round().is_err());
}

#[test]
fn test_session_plays_through_a_round() {
    let round = Round::from_spec(create_test_spec(1), Duration::from_secs(60)).unwrap();
    let mut session = RoundSession::new(Uuid::new_v4(), round.id());

    let shuffled = {
        let mut words = group_words(1);
        words.reverse();
        words
    };
    let index = round.group_index(&shuffled).unwrap();
    assert_eq!(round.theme(index), Some("Colors"));
    assert_eq!(session.register_correct(index).unwrap().new_score, 6);

    let mixed = vec![
        "apple".to_string(),
        "red".to_string(),
        "iron".to_string(),
        "mars".to_string(),
    ];
    assert!(round.group_index(&mixed).is_none());
    assert_eq!(session.register_wrong().unwrap().new_score, 2);

    session.register_correct(0).unwrap();
    let last = session.register_correct(2).unwrap();
    assert_eq!(last.new_score, 32);
    assert_eq!(last.finished, Some(RoundOutcome::Won { mistakes: 1 }));
    assert_eq!(
        session.register_correct(3),
        Err(GameStateError::AlreadyTerminated)
    );
}
