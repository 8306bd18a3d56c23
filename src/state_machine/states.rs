use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::Hash;

/// Coarse task lifecycle shared by every workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStage {
    /// Persisted but not yet started
    #[default]
    Created,
    /// Sub-stage handlers are running
    Started,
    Finished,
    Failed,
    Cancelled,
}

impl TaskStage {
    /// Check if this is a terminal stage (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Failed | Self::Cancelled)
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Started)
    }
}

impl fmt::Display for TaskStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Started => write!(f, "started"),
            Self::Finished => write!(f, "finished"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for TaskStage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(Self::Created),
            "started" => Ok(Self::Started),
            "finished" => Ok(Self::Finished),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("Invalid task stage: {s}")),
        }
    }
}

/// Workflow-specific checkpoint, totally ordered by declaration order.
///
/// `ALL` lists every sub-stage in order; the last two are the completed and
/// error sub-stages.
pub trait SubStage:
    Copy + Eq + Ord + Hash + fmt::Debug + fmt::Display + Serialize + DeserializeOwned + Send + Sync + 'static
{
    const ALL: &'static [Self];

    fn created() -> Self {
        Self::ALL[0]
    }

    fn completed() -> Self {
        Self::ALL[Self::ALL.len() - 2]
    }

    fn error() -> Self {
        Self::ALL[Self::ALL.len() - 1]
    }

    fn ordinal(&self) -> usize {
        Self::ALL.iter().position(|s| s == self).unwrap_or(0)
    }

    fn is_final(&self) -> bool {
        *self == Self::completed() || *self == Self::error()
    }

    /// Progress percentage: ordinal over the number of non-final sub-stages
    fn progress(&self) -> u8 {
        let steps = Self::ALL.len().saturating_sub(2).max(1);
        ((self.ordinal() * 100) / steps).min(100) as u8
    }
}
