//! Tests for the SQLite account repository and service.

use tempfile::NamedTempFile;

use strictly_arena::{
    AccountBackend, AccountError, AccountRepository, AccountService, Credentials, NewMatchRecord,
    NewPlayerRecord,
};

/// Creates a temporary database file with schema applied, returns the file
/// handle (must stay in scope to keep the file alive) and a ready repository.
fn setup_test_db() -> (NamedTempFile, AccountRepository) {
    let db_file = NamedTempFile::new().expect("Failed to create temp file");
    let db_path = db_file.path().to_str().expect("Invalid path").to_string();

    let repo = AccountRepository::new(db_path).expect("Failed to create repository");
    repo.run_migrations().expect("Migrations failed");
    (db_file, repo)
}

fn player(repo: &AccountRepository, name: &str) -> i32 {
    *repo
        .create_player(NewPlayerRecord::new(name.to_string(), "hash".to_string()))
        .expect("Create failed")
        .id()
}

#[test]
fn test_create_player_defaults() {
    let (_db, repo) = setup_test_db();
    let record = repo
        .create_player(NewPlayerRecord::new("Alice".to_string(), "hash".to_string()))
        .expect("Create failed");
    assert_eq!(record.username(), "Alice");
    assert_eq!(*record.rating(), 1000);
    assert_eq!(*record.games_played(), 0);
    assert!(*record.id() > 0);
}

#[test]
fn test_duplicate_username_fails() {
    let (_db, repo) = setup_test_db();
    player(&repo, "Bob");
    let err = repo
        .create_player(NewPlayerRecord::new("Bob".to_string(), "other".to_string()))
        .expect_err("Duplicate name should fail");
    assert!(err.is_duplicate(), "unexpected error kind: {err}");
}

#[test]
fn test_lookup_by_name_and_id() {
    let (_db, repo) = setup_test_db();
    let id = player(&repo, "Carol");

    let by_name = repo.player_by_username("Carol").expect("Query failed");
    assert_eq!(by_name.as_ref().map(|p| *p.id()), Some(id));
    assert!(repo.player_by_username("NoSuchUser").expect("Query failed").is_none());
    assert!(repo.player_by_id(id).expect("Query failed").is_some());
    assert!(repo.player_by_id(id + 100).expect("Query failed").is_none());
}

#[test]
fn test_record_match_updates_both_players() {
    let (_db, repo) = setup_test_db();
    let p1 = player(&repo, "Dana");
    let p2 = player(&repo, "Eli");

    let (first, second) = repo
        .record_match(NewMatchRecord::new(p1, p2, Some(p1)), |a, b| (a + 16, b - 16))
        .expect("Record failed")
        .expect("Players exist");
    assert_eq!(*first.rating(), 1016);
    assert_eq!(*second.rating(), 984);
    assert_eq!(*first.games_played(), 1);
    assert_eq!(*second.games_played(), 1);

    let history = repo.matches_for(p2).expect("Query failed");
    assert_eq!(history.len(), 1);
    assert_eq!(*history[0].winner_id(), Some(p1));
}

#[test]
fn test_record_match_with_unknown_player_writes_nothing() {
    let (_db, repo) = setup_test_db();
    let p1 = player(&repo, "Fay");

    let outcome = repo
        .record_match(NewMatchRecord::new(p1, 999, None), |a, b| (a, b))
        .expect("Record failed");
    assert!(outcome.is_none());
    assert!(repo.matches_for(p1).expect("Query failed").is_empty());
    let fay = repo.player_by_id(p1).expect("Query failed").expect("exists");
    assert_eq!(*fay.games_played(), 0);
}

#[test]
fn test_top_players_ordered_and_limited() {
    let (_db, repo) = setup_test_db();
    let ids: Vec<i32> = (0..12).map(|n| player(&repo, &format!("player{n:02}"))).collect();
    repo.record_match(NewMatchRecord::new(ids[5], ids[6], Some(ids[5])), |a, b| (a + 50, b - 50))
        .expect("Record failed");

    let top = repo.top_players(10).expect("Query failed");
    assert_eq!(top.len(), 10);
    assert_eq!(top[0].username(), "player05");
    assert_eq!(*top[0].rating(), 1050);
    assert!(top.iter().all(|p| p.username() != "player06"));
}

#[tokio::test]
async fn test_service_register_login_and_rate() {
    let (_db, repo) = setup_test_db();
    let service = AccountService::new(repo);

    let ann = service
        .register(Credentials::new("ann".into(), "password".into()))
        .await
        .expect("Register failed");
    let bob = service
        .register(Credentials::new("bob".into(), "password".into()))
        .await
        .expect("Register failed");
    assert!(matches!(
        service
            .register(Credentials::new("ann".into(), "password".into()))
            .await,
        Err(AccountError::UsernameTaken)
    ));

    let login = service
        .login(Credentials::new("ann".into(), "password".into()))
        .await
        .expect("Login failed");
    assert_eq!(login, ann);
    assert!(matches!(
        service
            .login(Credentials::new("ann".into(), "wrong-password".into()))
            .await,
        Err(AccountError::InvalidCredentials)
    ));

    let saved = service
        .save_match(strictly_arena::MatchReport::new(
            *ann.player_id(),
            *bob.player_id(),
            Some(*ann.player_id()),
        ))
        .await
        .expect("Save failed");
    assert_eq!(*saved.player1_new_rating(), 1016);
    assert_eq!(*saved.player2_new_rating(), 984);

    let board = service.leaderboard().await.expect("Leaderboard failed");
    assert_eq!(board.len(), 2);
    assert_eq!(*board[0].rank(), 1);
    assert_eq!(board[0].username(), "ann");
    assert_eq!(*board[1].games_played(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_registration_of_one_name() {
    let (_db, repo) = setup_test_db();
    let service = AccountService::new(repo);

    let attempts: Vec<_> = (0..6)
        .map(|_| {
            let service = service.clone();
            tokio::spawn(async move {
                service
                    .register(Credentials::new("zoe".into(), "password".into()))
                    .await
            })
        })
        .collect();

    let mut created = 0;
    for attempt in attempts {
        match attempt.await.expect("Task panicked") {
            Ok(_) => created += 1,
            Err(AccountError::UsernameTaken) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(created, 1);
}
