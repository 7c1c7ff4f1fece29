//! Database repository for player accounts and match results.

use diesel::prelude::*;
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use tracing::{debug, info, instrument, warn};

use crate::db::{DbError, MatchRecord, NewMatchRecord, NewPlayerRecord, PlayerRecord, schema};

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Database repository for account and match operations.
#[derive(Debug, Clone)]
pub struct AccountRepository {
    db_path: String,
}

impl AccountRepository {
    /// Creates a new repository for the database at the given path.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the path is empty.
    #[instrument(skip(db_path), fields(db_path = %db_path))]
    pub fn new(db_path: String) -> Result<Self, DbError> {
        if db_path.is_empty() {
            return Err(DbError::new("Database path is empty"));
        }
        info!(path = %db_path, "Creating AccountRepository");
        Ok(Self { db_path })
    }

    /// Establishes a database connection.
    #[instrument(skip(self))]
    fn connection(&self) -> Result<SqliteConnection, DbError> {
        debug!(path = %self.db_path, "Establishing connection");
        let mut conn = SqliteConnection::establish(&self.db_path)
            .map_err(|e| DbError::new(format!("Failed to connect to '{}': {}", self.db_path, e)))?;
        // Writers from the blocking pool queue on the file lock instead of failing.
        diesel::sql_query("PRAGMA busy_timeout = 5000").execute(&mut conn)?;
        Ok(conn)
    }

    /// Applies any pending schema migrations.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a migration fails.
    #[instrument(skip(self))]
    pub fn run_migrations(&self) -> Result<(), DbError> {
        let mut conn = self.connection()?;
        let applied = conn
            .run_pending_migrations(MIGRATIONS)
            .map_err(|e| DbError::new(format!("Migration failed: {}", e)))?;
        info!(count = applied.len(), "Migrations applied");
        Ok(())
    }

    /// Creates a new player account.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a database error occurs; a taken username is
    /// reported with [`DbError::is_duplicate`] set.
    #[instrument(skip(self, player))]
    pub fn create_player(&self, player: NewPlayerRecord) -> Result<PlayerRecord, DbError> {
        let mut conn = self.connection()?;

        let record = diesel::insert_into(schema::players::table)
            .values(&player)
            .returning(PlayerRecord::as_returning())
            .get_result(&mut conn)?;

        info!(player_id = record.id(), username = %record.username(), "Player created");
        Ok(record)
    }

    /// Looks up a player by username. Returns `None` if not found.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a database error occurs.
    #[instrument(skip(self))]
    pub fn player_by_username(&self, username: &str) -> Result<Option<PlayerRecord>, DbError> {
        let mut conn = self.connection()?;

        let player = schema::players::table
            .filter(schema::players::username.eq(username))
            .select(PlayerRecord::as_select())
            .first(&mut conn)
            .optional()?;

        debug!(found = player.is_some(), "Player lookup by username");
        Ok(player)
    }

    /// Looks up a player by id. Returns `None` if not found.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a database error occurs.
    #[instrument(skip(self))]
    pub fn player_by_id(&self, player_id: i32) -> Result<Option<PlayerRecord>, DbError> {
        let mut conn = self.connection()?;

        let player = schema::players::table
            .find(player_id)
            .select(PlayerRecord::as_select())
            .first(&mut conn)
            .optional()?;

        Ok(player)
    }

    /// Records a match and applies new ratings in one transaction.
    ///
    /// `rate` receives the current ratings of player 1 and player 2 and
    /// returns their new ratings. Both players have `games_played`
    /// incremented. Returns `None`, writing nothing, when either player
    /// does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a database error occurs; the transaction is
    /// rolled back.
    #[instrument(skip(self, rate), fields(
        player1 = new_match.player1_id(),
        player2 = new_match.player2_id(),
        winner = ?new_match.winner_id(),
    ))]
    pub fn record_match<F>(
        &self,
        new_match: NewMatchRecord,
        rate: F,
    ) -> Result<Option<(PlayerRecord, PlayerRecord)>, DbError>
    where
        F: FnOnce(i32, i32) -> (i32, i32),
    {
        use schema::players::dsl::{games_played, players, rating};

        let mut conn = self.connection()?;
        conn.transaction::<_, DbError, _>(|conn| {
            let p1 = players
                .find(*new_match.player1_id())
                .select(PlayerRecord::as_select())
                .first(conn)
                .optional()?;
            let p2 = players
                .find(*new_match.player2_id())
                .select(PlayerRecord::as_select())
                .first(conn)
                .optional()?;
            let (Some(p1), Some(p2)) = (p1, p2) else {
                warn!("Match references unknown player");
                return Ok(None);
            };

            let saved = diesel::insert_into(schema::matches::table)
                .values(&new_match)
                .returning(MatchRecord::as_returning())
                .get_result(conn)?;

            let (r1, r2) = rate(*p1.rating(), *p2.rating());
            let p1 = diesel::update(players.find(*p1.id()))
                .set((rating.eq(r1), games_played.eq(games_played + 1)))
                .returning(PlayerRecord::as_returning())
                .get_result(conn)?;
            let p2 = diesel::update(players.find(*p2.id()))
                .set((rating.eq(r2), games_played.eq(games_played + 1)))
                .returning(PlayerRecord::as_returning())
                .get_result(conn)?;

            info!(match_id = saved.id(), player1_rating = r1, player2_rating = r2, "Match recorded");
            Ok(Some((p1, p2)))
        })
    }

    /// Matches involving a player, most recent first.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a database error occurs.
    #[instrument(skip(self))]
    pub fn matches_for(&self, player_id: i32) -> Result<Vec<MatchRecord>, DbError> {
        use schema::matches::dsl::{id, matches, played_at, player1_id, player2_id};

        let mut conn = self.connection()?;
        let history = matches
            .filter(player1_id.eq(player_id).or(player2_id.eq(player_id)))
            .order((played_at.desc(), id.desc()))
            .select(MatchRecord::as_select())
            .load(&mut conn)?;

        debug!(count = history.len(), "Match history loaded");
        Ok(history)
    }

    /// Highest rated players, best first, ties broken by account age.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a database error occurs.
    #[instrument(skip(self))]
    pub fn top_players(&self, limit: i64) -> Result<Vec<PlayerRecord>, DbError> {
        use schema::players::dsl::{id, players, rating};

        let mut conn = self.connection()?;
        let top = players
            .order((rating.desc(), id.asc()))
            .limit(limit)
            .select(PlayerRecord::as_select())
            .load(&mut conn)?;

        info!(count = top.len(), "Top players loaded");
        Ok(top)
    }
}
