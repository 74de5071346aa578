//! Domain records and the raw rows they are validated from.
//!
//! Rows come straight out of Postgres with every column optional or loosely
//! typed; records are what the rest of the crate works with. Conversion
//! happens once, at the query boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// A row that could not be turned into a domain record
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InvalidRecord {
    #[error("Record {id} has an empty {field}")]
    EmptyField { id: String, field: &'static str },

    #[error("Record {id} has a negative {field} ({value})")]
    NegativeCounter {
        id: String,
        field: &'static str,
        value: i32,
    },
}

/// Opaque image identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageId(String);

impl ImageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<Uuid> for ImageId {
    fn from(id: Uuid) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for ImageId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Uploader profile attached to an image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    pub avatar_url: Option<String>,
}

impl Profile {
    /// Name shown next to a photo
    pub fn display_name(profile: Option<&Profile>) -> &str {
        profile.map(|p| p.name.as_str()).unwrap_or("Anonymous")
    }
}

/// One stored photo's metadata plus a URL to its bytes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub id: ImageId,
    pub url: String,
    pub location: Option<String>,
    pub created_at: DateTime<Utc>,
    pub profile: Option<Profile>,
    #[serde(default)]
    pub is_starred: bool,
    pub likes: Option<u32>,
    pub comments: Option<u32>,
}

/// Image row joined with its uploader profile
#[derive(Debug, Clone, FromRow)]
pub struct ImageRow {
    pub id: Uuid,
    pub url: String,
    pub location: Option<String>,
    pub created_at: DateTime<Utc>,
    pub user_id: Uuid,
    pub is_starred: Option<bool>,
    pub likes: Option<i32>,
    pub comments: Option<i32>,
    pub profile_name: Option<String>,
    pub profile_avatar_url: Option<String>,
}

impl TryFrom<ImageRow> for ImageRecord {
    type Error = InvalidRecord;

    fn try_from(row: ImageRow) -> Result<Self, Self::Error> {
        let id = row.id.to_string();

        if row.url.trim().is_empty() {
            return Err(InvalidRecord::EmptyField { id, field: "url" });
        }

        let likes = counter(&id, "likes", row.likes)?;
        let comments = counter(&id, "comments", row.comments)?;

        // A profile without a name is treated as no profile at all
        let profile = row
            .profile_name
            .filter(|name| !name.trim().is_empty())
            .map(|name| Profile {
                name,
                avatar_url: row.profile_avatar_url.filter(|u| !u.is_empty()),
            });

        Ok(Self {
            id: ImageId(id),
            url: row.url,
            location: row.location.filter(|l| !l.trim().is_empty()),
            created_at: row.created_at,
            profile,
            is_starred: row.is_starred.unwrap_or(false),
            likes,
            comments,
        })
    }
}

fn counter(id: &str, field: &'static str, value: Option<i32>) -> Result<Option<u32>, InvalidRecord> {
    match value {
        None => Ok(None),
        Some(v) if v < 0 => Err(InvalidRecord::NegativeCounter {
            id: id.to_string(),
            field,
            value: v,
        }),
        Some(v) => Ok(Some(v as u32)),
    }
}

/// Image about to be recorded after its bytes were stored
#[derive(Debug, Clone, PartialEq)]
pub struct NewImage {
    pub url: String,
    pub location: String,
}

/// Account-level profile of the signed-in user
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserProfile {
    pub id: Uuid,
    pub username: Option<String>,
    pub avatar_url: Option<String>,
    pub subscription_tier: Option<String>,
    pub storage_used: Option<i64>,
}

impl UserProfile {
    /// Name shown on the account page
    pub fn display_username(&self) -> &str {
        self.username
            .as_deref()
            .filter(|u| !u.is_empty())
            .unwrap_or("Anonymous User")
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use chrono::TimeZone;

    /// Minimal record created at the given UTC time
    pub(crate) fn image(id: &str, y: i32, m: u32, d: u32, h: u32) -> ImageRecord {
        ImageRecord {
            id: ImageId::new(id),
            url: format!("https://cdn.example.com/images/{id}.jpg"),
            location: None,
            created_at: Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap(),
            profile: None,
            is_starred: false,
            likes: None,
            comments: None,
        }
    }
}
