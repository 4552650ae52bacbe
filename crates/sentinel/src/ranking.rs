//! Proposal ranking and superblock queries.
//!
//! Every node computes the ranking on its own when it builds a superblock,
//! so the order must be fully deterministic: absolute yes count descending,
//! then object hash ascending.

use std::cmp::Ordering;

use itertools::Itertools;

use crate::daemon::DaemonState;
use crate::object::{Proposal, Superblock};
use crate::store::{self, ObjectStore};
use crate::validation;
use crate::voting::{has_voted, Outcome, Signal};

/// The rank of a proposal: the absolute yes count of its governance object.
pub fn proposal_rank<S>(store: &S, proposal: &Proposal) -> store::Result<i64>
where
    S: ObjectStore,
{
    store
        .get_object(&proposal.object_hash)?
        .map(|object| object.absolute_yes_count)
        .ok_or_else(|| {
            store::Error::MissingObject(proposal.object_hash.clone())
        })
}

fn rank_order(a: &(i64, Proposal), b: &(i64, Proposal)) -> Ordering {
    b.0.cmp(&a.0)
        .then_with(|| a.1.object_hash.cmp(&b.1.object_hash))
}

/// Proposals that passed the quorum, in rank order, with those that are no
/// longer valid dropped.
pub fn approved_and_ranked<S>(
    store: &S,
    state: &DaemonState,
) -> store::Result<Vec<Proposal>>
where
    S: ObjectStore,
{
    let mut approved = Vec::new();
    for proposal in store.proposals()? {
        let rank = proposal_rank(store, &proposal)?;
        if rank > state.quorum {
            approved.push((rank, proposal));
        }
    }
    // the validity filter runs after sorting and keeps the relative order
    Ok(approved
        .into_iter()
        .sorted_by(rank_order)
        .map(|(_, proposal)| proposal)
        .filter(|proposal| {
            match validation::validate_proposal(proposal, state) {
                Ok(()) => true,
                Err(err) => {
                    tracing::debug!(
                        object_hash = %proposal.object_hash,
                        %err,
                        "Dropping invalid approved proposal"
                    );
                    false
                }
            }
        })
        .collect())
}

/// All superblocks for the given block height
pub fn at_height<S>(
    store: &S,
    event_block_height: i64,
) -> store::Result<Vec<Superblock>>
where
    S: ObjectStore,
{
    Ok(store
        .superblocks()?
        .into_iter()
        .filter(|sb| sb.event_block_height == event_block_height)
        .collect())
}

/// Check if this node has voted to fund any superblock at the given height.
pub fn is_voted_funding<S>(
    store: &S,
    event_block_height: i64,
) -> store::Result<bool>
where
    S: ObjectStore,
{
    for superblock in at_height(store, event_block_height)? {
        let votes = has_voted(
            store,
            &superblock.object_hash,
            Some(Signal::Funding),
            Some(Outcome::Yes),
        )?;
        if votes > 0 {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Among the superblocks with the given canonical hash, the one with the
/// greatest object hash.
pub fn find_highest_deterministic<S>(
    store: &S,
    sb_hash: &str,
) -> store::Result<Option<Superblock>>
where
    S: ObjectStore,
{
    Ok(store
        .superblocks()?
        .into_iter()
        .filter(|sb| sb.sb_hash() == sb_hash)
        .max_by(|a, b| a.object_hash.cmp(&b.object_hash)))
}

/// The superblock with the greatest block height. Ties go to the greatest
/// object hash.
pub fn latest<S>(store: &S) -> store::Result<Option<Superblock>>
where
    S: ObjectStore,
{
    Ok(store.superblocks()?.into_iter().max_by(|a, b| {
        a.event_block_height
            .cmp(&b.event_block_height)
            .then_with(|| a.object_hash.cmp(&b.object_hash))
    }))
}
