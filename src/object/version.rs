use crate::core::{Result, StoreError};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How versions are minted for persistent objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VersionScheme {
    #[default]
    Serial,
    Timestamp,
    /// No version headers are written and nothing ever conflicts.
    None,
}

/// Optimistic-concurrency stamp of a persistent, non-aggregated object.
///
/// Equality compares every part; `differs` is the conflict test and only
/// looks at the sequence (serial) or the time (timestamp).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Version {
    Serial {
        sequence: u64,
        user: String,
        time: DateTime<Utc>,
    },
    Timestamp {
        user: String,
        time: DateTime<Utc>,
    },
}

impl Version {
    /// First version of a newly inserted object, or `None` when unversioned.
    pub fn initial(scheme: VersionScheme, user: &str, now: DateTime<Utc>) -> Option<Version> {
        match scheme {
            VersionScheme::Serial => Some(Version::Serial {
                sequence: 1,
                user: user.to_string(),
                time: now,
            }),
            VersionScheme::Timestamp => Some(Version::Timestamp {
                user: user.to_string(),
                time: now,
            }),
            VersionScheme::None => None,
        }
    }

    pub fn next(&self, user: &str, now: DateTime<Utc>) -> Version {
        match self {
            Version::Serial { sequence, .. } => Version::Serial {
                sequence: sequence + 1,
                user: user.to_string(),
                time: now,
            },
            Version::Timestamp { time, .. } => {
                // keep timestamps strictly increasing even on a coarse clock
                let bumped = if now.timestamp_millis() > time.timestamp_millis() {
                    now
                } else {
                    *time + chrono::Duration::milliseconds(1)
                };
                Version::Timestamp {
                    user: user.to_string(),
                    time: bumped,
                }
            }
        }
    }

    pub fn differs(&self, other: &Version) -> bool {
        match (self, other) {
            (Version::Serial { sequence: a, .. }, Version::Serial { sequence: b, .. }) => a != b,
            (Version::Timestamp { time: a, .. }, Version::Timestamp { time: b, .. }) => {
                a.timestamp_millis() != b.timestamp_millis()
            }
            _ => true,
        }
    }

    pub fn user(&self) -> &str {
        match self {
            Version::Serial { user, .. } | Version::Timestamp { user, .. } => user,
        }
    }

    pub fn time(&self) -> DateTime<Utc> {
        match self {
            Version::Serial { time, .. } | Version::Timestamp { time, .. } => *time,
        }
    }

    pub fn scheme(&self) -> VersionScheme {
        match self {
            Version::Serial { .. } => VersionScheme::Serial,
            Version::Timestamp { .. } => VersionScheme::Timestamp,
        }
    }

    /// The part of the version compared by `differs`, as stored.
    pub fn sequence_string(&self) -> String {
        match self {
            Version::Serial { sequence, .. } => sequence.to_string(),
            Version::Timestamp { time, .. } => time.timestamp_millis().to_string(),
        }
    }

    pub fn time_string(&self) -> String {
        self.time().timestamp_millis().to_string()
    }

    /// Rebuilds a version from its stored header strings.
    pub fn from_parts(
        scheme: VersionScheme,
        sequence: &str,
        user: &str,
        time: &str,
    ) -> Result<Option<Version>> {
        let invalid = |what: &str| {
            StoreError::Storage(format!("Invalid stored version {} '{}'", what, sequence))
        };
        let time = parse_millis(time).ok_or_else(|| invalid("time"))?;
        match scheme {
            VersionScheme::Serial => {
                let sequence = sequence.parse().map_err(|_| invalid("sequence"))?;
                Ok(Some(Version::Serial {
                    sequence,
                    user: user.to_string(),
                    time,
                }))
            }
            VersionScheme::Timestamp => {
                let time = parse_millis(sequence).ok_or_else(|| invalid("timestamp"))?;
                Ok(Some(Version::Timestamp {
                    user: user.to_string(),
                    time,
                }))
            }
            VersionScheme::None => Ok(None),
        }
    }
}

fn parse_millis(encoded: &str) -> Option<DateTime<Utc>> {
    let millis: i64 = encoded.parse().ok()?;
    Utc.timestamp_millis_opt(millis).single()
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Version::Serial { sequence, user, .. } => write!(f, "#{} ({})", sequence, user),
            Version::Timestamp { user, time } => {
                write!(f, "{} ({})", time.format("%Y-%m-%d %H:%M:%S%.3f"), user)
            }
        }
    }
}
