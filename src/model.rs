use chrono::Utc;
use serde::{Deserialize, Deserializer, Serialize};
use std::sync::atomic::{AtomicI64, Ordering};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Channel {
    #[serde(deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub url: String,
    #[serde(deserialize_with = "null_as_default")]
    pub group: String,
    #[serde(deserialize_with = "null_as_default")]
    pub logo: String,
    #[serde(deserialize_with = "null_as_default")]
    pub added_at: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Playlist {
    #[serde(deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub channels: Vec<Channel>,
    #[serde(deserialize_with = "null_as_default")]
    pub created_at: i64,
}

/// Root document persisted to the data file.
///
/// `playlists` keeps insertion order, `history` is most-recent-first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Store {
    #[serde(deserialize_with = "null_as_default")]
    pub playlists: Vec<Playlist>,
    #[serde(deserialize_with = "null_as_default")]
    pub history: Vec<Channel>,
}

// A JSON `null` reads as the field's zero value, same as an absent field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

static LAST_ID: AtomicI64 = AtomicI64::new(0);

/// Returns a decimal id derived from the current time in nanoseconds.
///
/// Ids are strictly increasing within the process, so two calls landing on
/// the same clock tick still get distinct values.
pub fn generate_id() -> String {
    let now = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    let mut last = LAST_ID.load(Ordering::Relaxed);
    loop {
        let next = now.max(last + 1);
        match LAST_ID.compare_exchange_weak(last, next, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => return next.to_string(),
            Err(actual) => last = actual,
        }
    }
}

pub fn unix_now() -> i64 {
    Utc::now().timestamp()
}
