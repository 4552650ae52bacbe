//! Test helpers: a scripted daemon, wire record builders and proptest
//! strategies.

use std::cell::RefCell;
use std::collections::BTreeMap;

use proptest::collection;
use proptest::prelude::*;
use rust_decimal::Decimal;
use serde_json::{json, Value};

use crate::codec::{self, FieldMap};
use crate::daemon::{DaemonClient, Error, GovObjectRecord, Result};
use crate::object::{GovernanceObject, ObjectType};
use crate::time::EpochSecs;

/// Testnet addresses with valid checksums
pub const TESTNET_ADDRESSES: [&str; 2] = [
    "yYe8KwyaUu5YswSYmB3q3ryx8XTUu9y7Ui",
    "yTC62huR4YQEPn9AJHjnQxxreHSbgAoatV",
];

/// A well-formed object hash made of a single repeated hex digit
pub fn hash_of(digit: char) -> String {
    std::iter::repeat(digit).take(64).collect()
}

/// A governance object envelope with the given tally
pub fn governance_object(
    object_hash: &str,
    object_type: ObjectType,
    absolute_yes_count: i64,
) -> GovernanceObject {
    GovernanceObject {
        object_hash: object_hash.to_string(),
        parent_hash: "0".to_string(),
        object_type,
        revision: 1,
        fee_tx_hash: hash_of('f'),
        yes_count: absolute_yes_count.max(0),
        no_count: absolute_yes_count.min(0).saturating_neg(),
        abstain_count: 0,
        absolute_yes_count,
        creation_time: 1_500_000_000,
    }
}

/// Fields of a proposal that is valid on testnet at `end_epoch - 1`
pub fn proposal_fields(
    name: &str,
    end_epoch: EpochSecs,
    payment_amount: Decimal,
) -> FieldMap {
    FieldMap::from([
        ("name".to_string(), json!(name)),
        (
            "url".to_string(),
            json!(format!("https://dashcentral.org/{name}")),
        ),
        (
            "start_epoch".to_string(),
            json!(end_epoch.saturating_sub(86400 * 30)),
        ),
        ("end_epoch".to_string(), json!(end_epoch)),
        ("payment_address".to_string(), json!(TESTNET_ADDRESSES[0])),
        ("payment_amount".to_string(), json!(payment_amount.to_string())),
    ])
}

/// Fields of a superblock
pub fn superblock_fields(
    event_block_height: i64,
    payment_addresses: &str,
    payment_amounts: &str,
) -> FieldMap {
    FieldMap::from([
        ("event_block_height".to_string(), json!(event_block_height)),
        ("payment_addresses".to_string(), json!(payment_addresses)),
        ("payment_amounts".to_string(), json!(payment_amounts)),
    ])
}

/// An entry of `gobject list` carrying the given fields
pub fn wire_record(
    object_hash: &str,
    object_type: ObjectType,
    fields: &FieldMap,
    absolute_yes_count: i64,
) -> Value {
    let record = GovObjectRecord {
        hash: object_hash.to_string(),
        collateral_hash: hash_of('c'),
        data_hex: codec::encode_for_daemon(object_type, fields),
        absolute_yes_count,
        yes_count: absolute_yes_count.max(0),
        no_count: absolute_yes_count.min(0).saturating_neg(),
        abstain_count: 0,
        creation_time: Some(1_500_000_000),
    };
    serde_json::to_value(record).expect("Serializing a record shouldn't fail")
}

#[derive(Debug, Default)]
struct MockState {
    objects: BTreeMap<String, Value>,
    quorum: i64,
    next_superblock_height: i64,
    max_budget: Decimal,
    vote_rejection: Option<String>,
    transport_failure: Option<String>,
    calls: Vec<(String, Vec<Value>)>,
    vote_commands: Vec<Vec<String>>,
    submitted: Vec<Vec<String>>,
}

/// An in-memory daemon. It serves a scripted object list and governance
/// info, accepts votes unless told otherwise and records every call.
#[derive(Debug, Default)]
pub struct MockDaemon {
    state: RefCell<MockState>,
}

impl MockDaemon {
    /// List an object with the given fields
    pub fn insert_object(
        &self,
        object_hash: &str,
        object_type: ObjectType,
        fields: &FieldMap,
        absolute_yes_count: i64,
    ) {
        let record =
            wire_record(object_hash, object_type, fields, absolute_yes_count);
        self.insert_raw(object_hash, record);
    }

    /// List an arbitrary `gobject list` entry
    pub fn insert_raw(&self, object_hash: &str, record: Value) {
        self.state
            .borrow_mut()
            .objects
            .insert(object_hash.to_string(), record);
    }

    /// Stop listing an object
    pub fn remove_object(&self, object_hash: &str) {
        self.state.borrow_mut().objects.remove(object_hash);
    }

    /// Change the reported tally of a listed object
    pub fn set_absolute_yes_count(&self, object_hash: &str, count: i64) {
        let mut state = self.state.borrow_mut();
        if let Some(record) = state.objects.get_mut(object_hash) {
            record["AbsoluteYesCount"] = json!(count);
            record["YesCount"] = json!(count.max(0));
            record["NoCount"] = json!(count.min(0).saturating_neg());
        }
    }

    /// Set what `getgovernanceinfo` and `getsuperblockbudget` report
    pub fn set_governance_info(
        &self,
        quorum: i64,
        next_superblock_height: i64,
        max_budget: Decimal,
    ) {
        let mut state = self.state.borrow_mut();
        state.quorum = quorum;
        state.next_superblock_height = next_superblock_height;
        state.max_budget = max_budget;
    }

    /// Reject every following vote with `message`
    pub fn reject_votes(&self, message: &str) {
        self.state.borrow_mut().vote_rejection = Some(message.to_string());
    }

    /// Fail every following call with a transport error
    pub fn fail_transport(&self, message: &str) {
        self.state.borrow_mut().transport_failure = Some(message.to_string());
    }

    /// Make calls succeed again
    pub fn restore_transport(&self) {
        self.state.borrow_mut().transport_failure = None;
    }

    /// Every call made, in order
    pub fn calls(&self) -> Vec<(String, Vec<Value>)> {
        self.state.borrow().calls.clone()
    }

    /// Every `gobject vote-conf` command received, accepted or not
    pub fn vote_commands(&self) -> Vec<Vec<String>> {
        self.state.borrow().vote_commands.clone()
    }

    /// Every `gobject submit` command received
    pub fn submitted(&self) -> Vec<Vec<String>> {
        self.state.borrow().submitted.clone()
    }

    fn gobject(state: &mut MockState, params: &[Value]) -> Result<Value> {
        let command: Vec<String> = std::iter::once("gobject".to_string())
            .chain(params.iter().map(|param| match param {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            }))
            .collect();
        match params.first().and_then(Value::as_str) {
            Some("list") => Ok(Value::Object(
                state.objects.clone().into_iter().collect(),
            )),
            Some("count") => Ok(json!(state.objects.len())),
            Some("vote-conf") => {
                state.vote_commands.push(command);
                let detail = match &state.vote_rejection {
                    Some(message) => json!({
                        "result": "failed",
                        "errorMessage": message,
                    }),
                    None => json!({"result": "success"}),
                };
                Ok(json!({
                    "overall": "Voted successfully",
                    "detail": {"dash.conf": detail},
                }))
            }
            Some("submit") => {
                state.submitted.push(command);
                Ok(json!(hash_of('e')))
            }
            _ => Err(Error::Rpc {
                code: -32601,
                message: format!("unknown gobject command {params:?}"),
            }),
        }
    }
}

impl DaemonClient for MockDaemon {
    fn invoke(&self, method: &str, params: &[Value]) -> Result<Value> {
        let mut state = self.state.borrow_mut();
        state.calls.push((method.to_string(), params.to_vec()));
        if let Some(message) = &state.transport_failure {
            return Err(Error::Transport(message.clone()));
        }
        match method {
            "gobject" => Self::gobject(&mut state, params),
            "getgovernanceinfo" => Ok(json!({
                "governanceminquorum": state.quorum,
                "nextsuperblock": state.next_superblock_height,
            })),
            "getsuperblockbudget" => Ok(json!(state.max_budget.to_string())),
            _ => Err(Error::Rpc {
                code: -32601,
                message: "Method not found".to_string(),
            }),
        }
    }
}

prop_compose! {
    /// Generate an arbitrary object hash
    pub fn arb_object_hash()(hash in "[a-f0-9]{64}") -> String {
        hash
    }
}

prop_compose! {
    /// Generate an arbitrary positive amount with at most 8 decimals
    pub fn arb_amount()(
        units in 1_i64..1_000_000_000_000,
        scale in 0_u32..=8,
    ) -> Decimal {
        Decimal::new(units, scale)
    }
}

/// Generate arbitrary superblock fields paying valid testnet addresses
pub fn arb_superblock_fields() -> impl Strategy<Value = FieldMap> {
    (
        1_i64..10_000_000,
        collection::vec((0..TESTNET_ADDRESSES.len(), arb_amount()), 1..5),
    )
        .prop_map(|(height, payments)| {
            let addresses: Vec<&str> = payments
                .iter()
                .map(|(index, _)| TESTNET_ADDRESSES[*index])
                .collect();
            let amounts: Vec<String> = payments
                .iter()
                .map(|(_, amount)| amount.to_string())
                .collect();
            superblock_fields(height, &addresses.join("|"), &amounts.join("|"))
        })
}
