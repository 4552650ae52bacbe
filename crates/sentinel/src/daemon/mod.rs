//! Daemon RPC boundary

mod http;

use std::collections::BTreeMap;

use lazy_static::lazy_static;
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

pub use self::http::HttpDaemonClient;
use crate::address::Network;
use crate::time::EpochSecs;

#[allow(missing_docs)]
#[derive(Error, Debug)]
pub enum Error {
    #[error("Daemon transport error: {0}")]
    Transport(String),
    #[error("Daemon RPC error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("Unexpected daemon response: {0}")]
    UnexpectedResponse(String),
}

/// Result of a daemon call
pub type Result<T> = std::result::Result<T, Error>;

/// One entry of the daemon's `gobject list` output
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GovObjectRecord {
    /// Object hash
    pub hash: String,
    /// Hash of the collateral transaction
    #[serde(default)]
    pub collateral_hash: String,
    /// Shim-encoded object payload
    pub data_hex: String,
    /// Yes minus no votes
    #[serde(default)]
    pub absolute_yes_count: i64,
    /// Yes votes
    #[serde(default)]
    pub yes_count: i64,
    /// No votes
    #[serde(default)]
    pub no_count: i64,
    /// Abstain votes
    #[serde(default)]
    pub abstain_count: i64,
    /// Creation time, when reported
    #[serde(default)]
    pub creation_time: Option<EpochSecs>,
}

impl GovObjectRecord {
    /// Read a record from its raw JSON form
    pub fn from_wire(value: &Value) -> serde_json::Result<Self> {
        Self::deserialize(value)
    }
}

/// Outcome of a `gobject vote-conf` call as reported by the daemon
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VoteReply {
    /// The daemon relayed the vote
    Accepted,
    /// The daemon declined the vote, with its reason
    Rejected(String),
}

lazy_static! {
    static ref VOTING_TOO_SOON_RE: Regex = Regex::new(
        r"(?m)^time between votes is too soon|Masternode voting too often"
    )
    .unwrap();
}

/// Parse the reply to a `gobject vote-conf` call. Only a `success` result for
/// this node's masternode counts as an accepted vote.
pub fn parse_vote_reply(response: &Value) -> VoteReply {
    let detail = &response["detail"]["dash.conf"];
    let error_message = detail["errorMessage"].as_str().unwrap_or_default();
    match detail["result"].as_str() {
        Some("success") => VoteReply::Accepted,
        Some(result) => {
            if VOTING_TOO_SOON_RE.is_match(error_message) {
                // the network already has a vote of ours we don't know about
                tracing::debug!("Voting too often, need to sync w/network");
            }
            let reason = if error_message.is_empty() {
                result.to_string()
            } else {
                error_message.to_string()
            };
            VoteReply::Rejected(reason)
        }
        None => VoteReply::Rejected(format!("malformed vote reply {response}")),
    }
}

/// The daemon RPC calls the governance agent needs. Implementors only need
/// to provide [`DaemonClient::invoke`].
pub trait DaemonClient {
    /// Invoke an RPC method
    fn invoke(&self, method: &str, params: &[Value]) -> Result<Value>;

    /// Invoke a command given as `[method, args...]`
    fn rpc_command(&self, command: &[String]) -> Result<Value> {
        let (method, args) = command.split_first().ok_or_else(|| {
            Error::UnexpectedResponse("empty RPC command".to_string())
        })?;
        let params: Vec<Value> =
            args.iter().map(|arg| Value::String(arg.clone())).collect();
        self.invoke(method, &params)
    }

    /// The network's governance objects, raw, keyed by hash
    fn list_governance_objects(&self) -> Result<BTreeMap<String, Value>> {
        match self.invoke("gobject", &[json!("list")])? {
            Value::Object(map) => Ok(map.into_iter().collect()),
            other => Err(Error::UnexpectedResponse(format!(
                "gobject list returned {other}"
            ))),
        }
    }

    /// Send a `gobject vote-conf` command
    fn cast_vote(&self, command: &[String]) -> Result<Value> {
        self.rpc_command(command)
    }

    /// Send a `gobject submit` command
    fn submit_superblock(&self, command: &[String]) -> Result<Value> {
        self.rpc_command(command)
    }

    /// Minimum absolute yes count for a proposal to pass
    fn governance_quorum(&self) -> Result<i64> {
        let info = self.invoke("getgovernanceinfo", &[])?;
        info["governanceminquorum"].as_i64().ok_or_else(|| {
            Error::UnexpectedResponse(format!(
                "missing governanceminquorum in {info}"
            ))
        })
    }

    /// Height of the next superblock
    fn next_superblock_height(&self) -> Result<i64> {
        let info = self.invoke("getgovernanceinfo", &[])?;
        info["nextsuperblock"].as_i64().ok_or_else(|| {
            Error::UnexpectedResponse(format!(
                "missing nextsuperblock in {info}"
            ))
        })
    }

    /// Budget available to the next superblock
    fn next_superblock_max_budget(&self) -> Result<Decimal> {
        let height = self.next_superblock_height()?;
        let budget = self.invoke("getsuperblockbudget", &[json!(height)])?;
        let text = match &budget {
            Value::Number(n) => n.to_string(),
            Value::String(s) => s.clone(),
            _ => String::new(),
        };
        text.parse::<Decimal>()
            .or_else(|_| Decimal::from_scientific(&text))
            .map_err(|_| {
                Error::UnexpectedResponse(format!(
                    "invalid superblock budget {budget}"
                ))
            })
    }
}

/// Snapshot of the daemon-reported consensus parameters that validation and
/// ranking are evaluated against
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DaemonState {
    /// Current time
    pub now: EpochSecs,
    /// Minimum absolute yes count for funding
    pub quorum: i64,
    /// Height of the next superblock
    pub next_superblock_height: i64,
    /// Budget ceiling of the next superblock. `None` or zero means no
    /// ceiling is enforced.
    pub max_budget: Option<Decimal>,
    /// Network the node runs on
    pub network: Network,
}

impl DaemonState {
    /// Query the daemon for a fresh snapshot.
    pub fn fetch<D>(
        daemon: &D,
        network: Network,
        now: EpochSecs,
    ) -> Result<Self>
    where
        D: DaemonClient + ?Sized,
    {
        let quorum = daemon.governance_quorum()?;
        let next_superblock_height = daemon.next_superblock_height()?;
        let max_budget = daemon.next_superblock_max_budget()?;
        Ok(Self {
            now,
            quorum,
            next_superblock_height,
            max_budget: Some(max_budget),
            network,
        })
    }

    /// The budget ceiling, if one applies
    pub fn budget_ceiling(&self) -> Option<Decimal> {
        self.max_budget.filter(|budget| !budget.is_zero())
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;

    use super::*;
    use crate::testing::MockDaemon;

    #[test]
    fn test_parse_vote_reply() {
        let accepted = json!({
            "overall": "Voted successfully 1 time(s) and failed 0 time(s).",
            "detail": {"dash.conf": {"result": "success"}}
        });
        assert_eq!(parse_vote_reply(&accepted), VoteReply::Accepted);

        let too_often = json!({
            "overall": "Voted successfully 0 time(s) and failed 1 time(s).",
            "detail": {"dash.conf": {
                "result": "failed",
                "errorMessage": "Failure to process vote: Masternode voting too often"
            }}
        });
        assert_matches!(
            parse_vote_reply(&too_often),
            VoteReply::Rejected(reason) if reason.contains("too often")
        );

        assert_eq!(
            parse_vote_reply(
                &json!({"detail": {"dash.conf": {"result": "failed"}}})
            ),
            VoteReply::Rejected("failed".to_string())
        );
        assert_matches!(
            parse_vote_reply(&json!("Voted")),
            VoteReply::Rejected(_)
        );
    }

    #[test]
    fn test_record_from_wire() {
        let value = json!({
            "DataHex": "5b5d",
            "Hash": "abc",
            "CollateralHash": "def",
            "AbsoluteYesCount": -2,
            "YesCount": 1,
            "NoCount": 3,
            "AbstainCount": 0,
            "SomethingNew": true
        });
        let record = GovObjectRecord::from_wire(&value).unwrap();
        assert_eq!(record.hash, "abc");
        assert_eq!(record.absolute_yes_count, -2);
        assert_eq!(record.creation_time, None);
        assert!(GovObjectRecord::from_wire(&json!({"Hash": "abc"})).is_err());
    }

    #[test]
    fn test_fetch_state() {
        let daemon = MockDaemon::default();
        daemon.set_governance_info(10, 62500, dec!(1234.5));
        let state =
            DaemonState::fetch(&daemon, Network::Testnet, 1_000).unwrap();
        assert_eq!(state.quorum, 10);
        assert_eq!(state.next_superblock_height, 62500);
        assert_eq!(state.budget_ceiling(), Some(dec!(1234.5)));

        let no_budget = DaemonState {
            max_budget: Some(Decimal::ZERO),
            ..state
        };
        assert_eq!(no_budget.budget_ceiling(), None);
    }

    #[test]
    fn test_rpc_command_splits_method() {
        let daemon = MockDaemon::default();
        assert_matches!(
            daemon.rpc_command(&[]),
            Err(Error::UnexpectedResponse(_))
        );
        daemon
            .rpc_command(&["gobject".to_string(), "count".to_string()])
            .unwrap();
        assert_eq!(
            daemon.calls().last().unwrap(),
            &("gobject".to_string(), vec![json!("count")])
        );
    }
}
