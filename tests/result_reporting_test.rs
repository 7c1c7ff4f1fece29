//! Game-over reporting from the authority to the account backend.

use std::sync::Arc;
use std::time::Duration;

use strictly_arena::{
    AccountBackend, ArenaConfig, AuthorityCoordinator, Credentials, InMemoryAccounts, Matchmaker,
    MatchReport, MoveOutcome, Participant, ParticipantProfile, Replica, Seat, SessionDirectory,
};

const WAIT: Duration = Duration::from_secs(5);

fn both_seated(replica: &Replica) -> bool {
    replica
        .state()
        .as_ref()
        .is_some_and(|s| s.registered_count() == 2)
}

async fn profile(accounts: &InMemoryAccounts, name: &str) -> ParticipantProfile {
    accounts
        .register(Credentials::new(name.to_string(), "password".to_string()))
        .await
        .expect("register")
        .profile()
}

async fn play_to_finish(
    accounts: Arc<InMemoryAccounts>,
    first: ParticipantProfile,
    second: ParticipantProfile,
    moves: &[i32],
) -> MoveOutcome {
    let config = ArenaConfig::default();
    let directory = SessionDirectory::new(*config.event_capacity());
    let matchmaker = Matchmaker::new(directory.clone(), config.clone());
    let backend: Arc<dyn AccountBackend> = accounts;
    let coordinator = AuthorityCoordinator::new(directory, config, Some(backend));

    let one = Participant::connect(&matchmaker, &coordinator, first).await.unwrap();
    let two = Participant::connect(&matchmaker, &coordinator, second).await.unwrap();
    one.wait_until(WAIT, both_seated).await.unwrap();

    let mut outcome = MoveOutcome::Continued { next: Seat::One };
    for (n, position) in moves.iter().enumerate() {
        let mover = if n % 2 == 0 { &one } else { &two };
        outcome = mover.request_move(*position).await.unwrap();
    }
    outcome
}

async fn wait_for_matches(accounts: &InMemoryAccounts, count: usize) -> Vec<MatchReport> {
    for _ in 0..100 {
        let matches = accounts.matches();
        if matches.len() >= count {
            return matches;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    accounts.matches()
}

#[tokio::test(start_paused = true)]
async fn test_win_is_reported_and_rated() {
    let accounts = Arc::new(InMemoryAccounts::new());
    let ann = profile(&accounts, "ann").await;
    let bob = profile(&accounts, "bob").await;
    let (ann_id, bob_id) = (ann.backend_id().unwrap(), bob.backend_id().unwrap());

    let outcome = play_to_finish(Arc::clone(&accounts), ann, bob, &[4, 0, 1, 3, 7]).await;
    assert_eq!(outcome, MoveOutcome::Won(Seat::One));

    let matches = wait_for_matches(&accounts, 1).await;
    assert_eq!(matches, vec![MatchReport::new(ann_id, bob_id, Some(ann_id))]);
    assert_eq!(*accounts.account("ann").unwrap().rating(), 1016);
    assert_eq!(*accounts.account("bob").unwrap().rating(), 984);
}

#[tokio::test(start_paused = true)]
async fn test_draw_is_reported_without_winner() {
    let accounts = Arc::new(InMemoryAccounts::new());
    let ann = profile(&accounts, "ann").await;
    let bob = profile(&accounts, "bob").await;

    let outcome =
        play_to_finish(Arc::clone(&accounts), ann, bob, &[0, 1, 2, 4, 3, 5, 7, 6, 8]).await;
    assert_eq!(outcome, MoveOutcome::Draw);

    let matches = wait_for_matches(&accounts, 1).await;
    assert_eq!(matches.len(), 1);
    assert_eq!(*matches[0].winner_id(), None);
    assert_eq!(*accounts.account("ann").unwrap().rating(), 1000);
}

#[tokio::test(start_paused = true)]
async fn test_guests_are_not_reported() {
    let accounts = Arc::new(InMemoryAccounts::new());
    let outcome = play_to_finish(
        Arc::clone(&accounts),
        ParticipantProfile::guest("ann"),
        ParticipantProfile::guest("bob"),
        &[4, 0, 1, 3, 7],
    )
    .await;
    assert!(outcome.is_terminal());

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(accounts.matches().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_backend_failure_does_not_disturb_the_session() {
    let accounts = Arc::new(InMemoryAccounts::new());
    let ann = profile(&accounts, "ann").await;
    let bob = profile(&accounts, "bob").await;
    accounts.set_offline(true);

    let outcome = play_to_finish(Arc::clone(&accounts), ann, bob, &[4, 0, 1, 3, 7]).await;
    assert_eq!(outcome, MoveOutcome::Won(Seat::One));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(accounts.matches().is_empty());
    assert_eq!(*accounts.account("ann").unwrap().rating(), 1000);
}
