//! Vote casting.
//!
//! A vote is only recorded locally once the daemon has confirmed it. The
//! local vote table is what keeps the agent from voting the same way twice on
//! an object, so callers check [`has_voted`] before calling [`cast_vote`].
//! Tallies on the governance object are never touched here; they are
//! refreshed from the daemon on the next sync.

use std::fmt::Display;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::daemon::{self, DaemonClient, VoteReply};
use crate::object::{is_hash, GovernanceObject};
use crate::store::{self, ObjectStore};
use crate::time::{now_epoch, EpochSecs};

#[allow(missing_docs)]
#[derive(thiserror::Error, Clone, Debug, PartialEq, Eq)]
pub enum ParseError {
    #[error("Invalid vote signal {0:?}")]
    Signal(String),
    #[error("Invalid vote outcome {0:?}")]
    Outcome(String),
}

/// What a vote is about
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Signal {
    /// Fund the object
    Funding,
    /// The object is valid
    Valid,
    /// Delete the object
    Delete,
}

impl Signal {
    /// All signals, in seeding order
    pub const ALL: [Signal; 3] =
        [Signal::Funding, Signal::Valid, Signal::Delete];

    /// Name used by the daemon and the signals table
    pub fn name(&self) -> &'static str {
        match self {
            Signal::Funding => "funding",
            Signal::Valid => "valid",
            Signal::Delete => "delete",
        }
    }
}

impl Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Signal {
    type Err = ParseError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Signal::ALL
            .into_iter()
            .find(|signal| signal.name() == s.trim())
            .ok_or_else(|| ParseError::Signal(s.to_string()))
    }
}

/// The position taken on a signal
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// Yes
    Yes,
    /// No
    No,
    /// Abstain
    Abstain,
}

impl Outcome {
    /// All outcomes, in seeding order
    pub const ALL: [Outcome; 3] = [Outcome::Yes, Outcome::No, Outcome::Abstain];

    /// Name used by the daemon and the outcomes table
    pub fn name(&self) -> &'static str {
        match self {
            Outcome::Yes => "yes",
            Outcome::No => "no",
            Outcome::Abstain => "abstain",
        }
    }
}

impl Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Outcome {
    type Err = ParseError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Outcome::ALL
            .into_iter()
            .find(|outcome| outcome.name() == s.trim())
            .ok_or_else(|| ParseError::Outcome(s.to_string()))
    }
}

/// A vote this node cast and the daemon accepted
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    /// Hash of the governance object voted on
    pub governance_object_hash: String,
    /// Vote signal
    pub signal: Signal,
    /// Vote outcome
    pub outcome: Outcome,
    /// When the vote was cast
    pub voted_at: EpochSecs,
}

impl Vote {
    /// New vote record
    pub fn new(
        governance_object_hash: impl Into<String>,
        signal: Signal,
        outcome: Outcome,
        voted_at: EpochSecs,
    ) -> Self {
        Self {
            governance_object_hash: governance_object_hash.into(),
            signal,
            outcome,
            voted_at,
        }
    }
}

/// The `gobject vote-conf` command for a vote on `object_hash`
pub fn vote_command(
    object_hash: &str,
    signal: Signal,
    outcome: Outcome,
) -> Vec<String> {
    vec![
        "gobject".to_string(),
        "vote-conf".to_string(),
        object_hash.to_string(),
        signal.name().to_string(),
        outcome.name().to_string(),
    ]
}

/// What became of a vote
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VoteStatus {
    /// The daemon accepted the vote and it was recorded
    Cast(Vote),
    /// The daemon declined the vote; nothing was recorded
    Rejected(String),
    /// The object has no valid hash, so there was nothing to vote on
    Skipped,
}

#[allow(missing_docs)]
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("{0}")]
    Daemon(#[from] daemon::Error),
    #[error("{0}")]
    Store(#[from] store::Error),
}

/// A result of a voting operation
pub type Result<T> = std::result::Result<T, Error>;

/// Cast a vote on `object` and record it once the daemon confirms it.
pub fn cast_vote<S, D>(
    store: &mut S,
    daemon: &D,
    object: &GovernanceObject,
    signal: Signal,
    outcome: Outcome,
) -> Result<VoteStatus>
where
    S: ObjectStore,
    D: DaemonClient + ?Sized,
{
    if object.object_hash == "0" || !is_hash(&object.object_hash) {
        tracing::warn!(
            object_hash = %object.object_hash,
            "No governance object hash, nothing to vote on"
        );
        return Ok(VoteStatus::Skipped);
    }

    let command = vote_command(&object.object_hash, signal, outcome);
    tracing::info!("{}", command.join(" "));
    let response = daemon.cast_vote(&command)?;

    match daemon::parse_vote_reply(&response) {
        VoteReply::Accepted => {
            let vote =
                Vote::new(&object.object_hash, signal, outcome, now_epoch());
            store.insert_vote(vote.clone())?;
            Ok(VoteStatus::Cast(vote))
        }
        VoteReply::Rejected(reason) => {
            tracing::warn!(
                object_hash = %object.object_hash,
                %signal,
                %outcome,
                %reason,
                "Vote was not accepted by the daemon"
            );
            Ok(VoteStatus::Rejected(reason))
        }
    }
}

/// Count this node's recorded votes on an object, optionally narrowed to a
/// signal and/or outcome.
pub fn has_voted<S>(
    store: &S,
    object_hash: &str,
    signal: Option<Signal>,
    outcome: Option<Outcome>,
) -> store::Result<usize>
where
    S: ObjectStore,
{
    Ok(store
        .votes_for(object_hash)?
        .iter()
        .filter(|vote| signal.map_or(true, |s| vote.signal == s))
        .filter(|vote| outcome.map_or(true, |o| vote.outcome == o))
        .count())
}
