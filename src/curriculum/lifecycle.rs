use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Status of a learning path. Ordered: a path only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PathStatus {
    Planned,
    InProgress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Advanced { from: PathStatus, to: PathStatus },
    Unchanged(PathStatus),
}

impl Transition {
    pub fn status(&self) -> PathStatus {
        match *self {
            Transition::Advanced { to, .. } => to,
            Transition::Unchanged(status) => status,
        }
    }
}

impl PathStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PathStatus::Planned => "planned",
            PathStatus::InProgress => "in-progress",
        }
    }

    /// Status after a recalculation produced `completed_modules`.
    pub fn after_recalculation(self, completed_modules: i64) -> Transition {
        if completed_modules > 0 {
            self.request(PathStatus::InProgress)
        } else {
            Transition::Unchanged(self)
        }
    }

    /// Explicit request to move to `target`; a no-op at or past it.
    pub fn request(self, target: PathStatus) -> Transition {
        if target > self {
            Transition::Advanced {
                from: self,
                to: target,
            }
        } else {
            Transition::Unchanged(self)
        }
    }
}

impl fmt::Display for PathStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PathStatus {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "planned" => Ok(PathStatus::Planned),
            "in-progress" => Ok(PathStatus::InProgress),
            other => Err(Error::InvalidInput(format!("unknown path status: {other}"))),
        }
    }
}
