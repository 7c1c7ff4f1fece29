//! Database models for accounts and matches.

use chrono::NaiveDateTime;
use derive_getters::Getters;
use derive_new::new;
use diesel::prelude::*;

use crate::db::schema;

/// Player account row.
#[derive(Debug, Clone, PartialEq, Eq, Queryable, Identifiable, Selectable, Getters)]
#[diesel(table_name = schema::players)]
pub struct PlayerRecord {
    id: i32,
    username: String,
    password_hash: String,
    rating: i32,
    games_played: i32,
    created_at: NaiveDateTime,
}

/// Insertable account. Rating and games played take their column defaults.
#[derive(Debug, Clone, Insertable, new)]
#[diesel(table_name = schema::players)]
pub struct NewPlayerRecord {
    username: String,
    password_hash: String,
}

/// Recorded match.
#[derive(Debug, Clone, PartialEq, Eq, Queryable, Identifiable, Selectable, Getters)]
#[diesel(table_name = schema::matches)]
pub struct MatchRecord {
    id: i32,
    player1_id: i32,
    player2_id: i32,
    winner_id: Option<i32>,
    played_at: NaiveDateTime,
}

/// Insertable match. `winner_id` is `None` for a draw.
#[derive(Debug, Clone, Copy, Insertable, new, Getters)]
#[diesel(table_name = schema::matches)]
pub struct NewMatchRecord {
    player1_id: i32,
    player2_id: i32,
    winner_id: Option<i32>,
}
