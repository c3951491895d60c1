//! Row types for the `users` and `tracks` tables and their upstream patches.

use crate::api::{TRACKS_ENDPOINT, USERS_ENDPOINT};
use crate::data::timestamps::Timestamps;
use crate::data::upsert::{Entity, assign};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer};
use sqlx::SqliteConnection;

/// A nullable column as seen in a partial record: `None` when the key was
/// absent, `Some(None)` when it was explicitly `null`.
pub type PatchField<T> = Option<Option<T>>;

/// Marks a key as present even when its value is `null`.
fn present<'de, D, T>(deserializer: D) -> Result<PatchField<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub gender: Option<String>,
    pub favorite_genres: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct UserPatch {
    pub id: i64,
    #[serde(default, deserialize_with = "present")]
    pub first_name: PatchField<String>,
    #[serde(default, deserialize_with = "present")]
    pub last_name: PatchField<String>,
    #[serde(default, deserialize_with = "present")]
    pub email: PatchField<String>,
    #[serde(default, deserialize_with = "present")]
    pub gender: PatchField<String>,
    #[serde(default, deserialize_with = "present")]
    pub favorite_genres: PatchField<String>,
}

#[async_trait]
impl Entity for User {
    type Patch = UserPatch;

    const NAME: &'static str = "User";
    const ENDPOINT: &'static str = USERS_ENDPOINT;

    fn patch_id(patch: &UserPatch) -> i64 {
        patch.id
    }

    fn create(patch: UserPatch, stamps: Timestamps) -> Self {
        let (created_at, updated_at) = stamps.or_now();
        Self {
            id: patch.id,
            first_name: patch.first_name.flatten(),
            last_name: patch.last_name.flatten(),
            email: patch.email.flatten(),
            gender: patch.gender.flatten(),
            favorite_genres: patch.favorite_genres.flatten(),
            created_at,
            updated_at,
        }
    }

    fn merge(&mut self, patch: UserPatch, stamps: Timestamps) {
        assign(&mut self.first_name, patch.first_name);
        assign(&mut self.last_name, patch.last_name);
        assign(&mut self.email, patch.email);
        assign(&mut self.gender, patch.gender);
        assign(&mut self.favorite_genres, patch.favorite_genres);
        assign(&mut self.created_at, stamps.created_at);
        assign(&mut self.updated_at, stamps.updated_at);
    }

    async fn find(conn: &mut SqliteConnection, id: i64) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, first_name, last_name, email, gender, favorite_genres,
                   created_at, updated_at
            FROM users
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
    }

    async fn insert(&self, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO users (
                id, first_name, last_name, email, gender, favorite_genres,
                created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(self.id)
        .bind(&self.first_name)
        .bind(&self.last_name)
        .bind(&self.email)
        .bind(&self.gender)
        .bind(&self.favorite_genres)
        .bind(self.created_at)
        .bind(self.updated_at)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    async fn update(&self, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE users
            SET first_name = ?, last_name = ?, email = ?, gender = ?,
                favorite_genres = ?, created_at = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&self.first_name)
        .bind(&self.last_name)
        .bind(&self.email)
        .bind(&self.gender)
        .bind(&self.favorite_genres)
        .bind(self.created_at)
        .bind(self.updated_at)
        .bind(self.id)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Track {
    pub id: i64,
    pub name: Option<String>,
    pub artist: Option<String>,
    pub songwriters: Option<String>,
    /// Free text as delivered upstream, e.g. `5:35`.
    pub duration: Option<String>,
    pub genres: Option<String>,
    pub album: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TrackPatch {
    pub id: i64,
    #[serde(default, deserialize_with = "present")]
    pub name: PatchField<String>,
    #[serde(default, deserialize_with = "present")]
    pub artist: PatchField<String>,
    #[serde(default, deserialize_with = "present")]
    pub songwriters: PatchField<String>,
    #[serde(default, deserialize_with = "present")]
    pub duration: PatchField<String>,
    #[serde(default, deserialize_with = "present")]
    pub genres: PatchField<String>,
    #[serde(default, deserialize_with = "present")]
    pub album: PatchField<String>,
}

#[async_trait]
impl Entity for Track {
    type Patch = TrackPatch;

    const NAME: &'static str = "Track";
    const ENDPOINT: &'static str = TRACKS_ENDPOINT;

    fn patch_id(patch: &TrackPatch) -> i64 {
        patch.id
    }

    fn create(patch: TrackPatch, stamps: Timestamps) -> Self {
        let (created_at, updated_at) = stamps.or_now();
        Self {
            id: patch.id,
            name: patch.name.flatten(),
            artist: patch.artist.flatten(),
            songwriters: patch.songwriters.flatten(),
            duration: patch.duration.flatten(),
            genres: patch.genres.flatten(),
            album: patch.album.flatten(),
            created_at,
            updated_at,
        }
    }

    fn merge(&mut self, patch: TrackPatch, stamps: Timestamps) {
        assign(&mut self.name, patch.name);
        assign(&mut self.artist, patch.artist);
        assign(&mut self.songwriters, patch.songwriters);
        assign(&mut self.duration, patch.duration);
        assign(&mut self.genres, patch.genres);
        assign(&mut self.album, patch.album);
        assign(&mut self.created_at, stamps.created_at);
        assign(&mut self.updated_at, stamps.updated_at);
    }

    async fn find(conn: &mut SqliteConnection, id: i64) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Track>(
            r#"
            SELECT id, name, artist, songwriters, duration, genres, album,
                   created_at, updated_at
            FROM tracks
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
    }

    async fn insert(&self, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO tracks (
                id, name, artist, songwriters, duration, genres, album,
                created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(self.id)
        .bind(&self.name)
        .bind(&self.artist)
        .bind(&self.songwriters)
        .bind(&self.duration)
        .bind(&self.genres)
        .bind(&self.album)
        .bind(self.created_at)
        .bind(self.updated_at)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    async fn update(&self, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE tracks
            SET name = ?, artist = ?, songwriters = ?, duration = ?, genres = ?,
                album = ?, created_at = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&self.name)
        .bind(&self.artist)
        .bind(&self.songwriters)
        .bind(&self.duration)
        .bind(&self.genres)
        .bind(&self.album)
        .bind(self.created_at)
        .bind(self.updated_at)
        .bind(self.id)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }
}
