//! Validity rules for governance sub-records.
//!
//! Validation is a pure function of a sub-record and a [`DaemonState`]
//! snapshot. Proposal checks run in a fixed order and the first failing one
//! is reported.

use lazy_static::lazy_static;
use regex::Regex;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::address::{validate_address, AddressError};
use crate::daemon::DaemonState;
use crate::object::{GovernanceRecord, Proposal, Superblock};
use crate::time::{elapsed_more_than, EpochSecs, PROPOSAL_RETENTION_SECS};

/// Minimum length of a proposal URL, surrounding whitespace excluded
pub const MIN_URL_LEN: usize = 4;

lazy_static! {
    static ref PROPOSAL_NAME_RE: Regex =
        Regex::new("^[-_a-zA-Z0-9]+$").unwrap();
}

/// Why a sub-record is not valid
#[allow(missing_docs)]
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The name is empty or has characters outside `[-_a-zA-Z0-9]`
    #[error("Invalid proposal name {0:?}")]
    InvalidName(String),
    /// The payment period is empty or reversed
    #[error(
        "Invalid proposal period: end epoch {end} must be after start epoch \
         {start}"
    )]
    EndBeforeStart {
        start: EpochSecs,
        end: EpochSecs,
    },
    /// The payment period is over
    #[error("Proposal expired: end epoch {end} is not after {now}")]
    Expired { end: EpochSecs, now: EpochSecs },
    /// The amount exceeds the next superblock's budget
    #[error("Proposal amount {amount} exceeds the budget of {max_budget}")]
    OverBudget { amount: Decimal, max_budget: Decimal },
    /// The amount is zero or negative
    #[error("Proposal amount {0} must be positive")]
    NonPositiveAmount(Decimal),
    /// The payment address is not valid on this network
    #[error("Invalid payment address: {0}")]
    InvalidAddress(#[from] AddressError),
    /// The URL is too short to be meaningful
    #[error("Proposal URL {0:?} is too short")]
    ShortUrl(String),
    /// The superblock is not for the next superblock height
    #[error(
        "Superblock is for height {found}, but the next superblock is at \
         {expected}"
    )]
    OffCycle { expected: i64, found: i64 },
}

/// Result of a validity check
pub type Result<T> = std::result::Result<T, ValidationError>;

/// Check the proposal name
pub fn is_valid_name(name: &str) -> Result<()> {
    if PROPOSAL_NAME_RE.is_match(name) {
        Ok(())
    } else {
        Err(ValidationError::InvalidName(name.to_string()))
    }
}

/// Check that the payment period is not empty
pub fn is_valid_period(start: EpochSecs, end: EpochSecs) -> Result<()> {
    if end <= start {
        Err(ValidationError::EndBeforeStart { start, end })
    } else {
        Ok(())
    }
}

/// Check that the payment period has not ended. A proposal ending right now
/// is already expired.
pub fn is_not_expired(end: EpochSecs, now: EpochSecs) -> Result<()> {
    if end <= now {
        Err(ValidationError::Expired { end, now })
    } else {
        Ok(())
    }
}

/// Check the amount against the budget ceiling, if there is one. An amount
/// equal to the ceiling fits.
pub fn is_within_budget(
    amount: Decimal,
    max_budget: Option<Decimal>,
) -> Result<()> {
    match max_budget {
        Some(max_budget) if amount > max_budget => {
            Err(ValidationError::OverBudget { amount, max_budget })
        }
        _ => Ok(()),
    }
}

/// Check that the amount is positive
pub fn is_positive_amount(amount: Decimal) -> Result<()> {
    if amount <= Decimal::ZERO {
        Err(ValidationError::NonPositiveAmount(amount))
    } else {
        Ok(())
    }
}

/// Check the URL length
pub fn is_valid_url(url: &str) -> Result<()> {
    if url.trim().chars().count() < MIN_URL_LEN {
        Err(ValidationError::ShortUrl(url.to_string()))
    } else {
        Ok(())
    }
}

/// Run every proposal check, in order.
pub fn validate_proposal(
    proposal: &Proposal,
    state: &DaemonState,
) -> Result<()> {
    is_valid_name(&proposal.name)?;
    is_valid_period(proposal.start_epoch, proposal.end_epoch)?;
    is_not_expired(proposal.end_epoch, state.now)?;
    is_within_budget(proposal.payment_amount, state.budget_ceiling())?;
    is_positive_amount(proposal.payment_amount)?;
    validate_address(&proposal.payment_address, state.network)?;
    is_valid_url(&proposal.url)
}

/// A superblock is only valid for the next superblock height.
pub fn validate_superblock(
    superblock: &Superblock,
    state: &DaemonState,
) -> Result<()> {
    if superblock.event_block_height == state.next_superblock_height {
        Ok(())
    } else {
        Err(ValidationError::OffCycle {
            expected: state.next_superblock_height,
            found: superblock.event_block_height,
        })
    }
}

/// Validate a sub-record of either kind
pub fn validate(record: &GovernanceRecord, state: &DaemonState) -> Result<()> {
    match record {
        GovernanceRecord::Proposal(proposal) => {
            validate_proposal(proposal, state)
        }
        GovernanceRecord::Superblock(superblock) => {
            validate_superblock(superblock, state)
        }
    }
}

/// Check if a sub-record is valid, logging why if it isn't.
pub fn is_valid(record: &GovernanceRecord, state: &DaemonState) -> bool {
    match validate(record, state) {
        Ok(()) => true,
        Err(err) => {
            tracing::debug!(
                object_hash = record.object_hash(),
                %err,
                "Invalid governance object"
            );
            false
        }
    }
}

/// Check if a sub-record may be dropped from the local store.
///
/// Proposals are deletable once their end epoch is more than 30 days in the
/// past. Superblocks are never deletable: no retention policy is defined for
/// them.
pub fn is_deletable(record: &GovernanceRecord, now: EpochSecs) -> bool {
    match record {
        GovernanceRecord::Proposal(proposal) => elapsed_more_than(
            now,
            proposal.end_epoch,
            PROPOSAL_RETENTION_SECS,
        ),
        GovernanceRecord::Superblock(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;

    use super::*;
    use crate::address::Network;

    const NOW: EpochSecs = 1_500_000_000;
    const HASH: &str =
        "1111111111111111111111111111111111111111111111111111111111111111";

    fn state() -> DaemonState {
        DaemonState {
            now: NOW,
            quorum: 10,
            next_superblock_height: 62500,
            max_budget: Some(dec!(100)),
            network: Network::Testnet,
        }
    }

    fn proposal() -> Proposal {
        Proposal {
            name: "dean-miller-5493".to_string(),
            url: "https://dashcentral.org/dean-miller-5493".to_string(),
            start_epoch: NOW - 86400,
            end_epoch: NOW + 86400,
            payment_address: "yYe8KwyaUu5YswSYmB3q3ryx8XTUu9y7Ui".to_string(),
            payment_amount: dec!(25.75),
            object_hash: HASH.to_string(),
        }
    }

    #[test]
    fn test_valid_proposal() {
        assert_eq!(validate_proposal(&proposal(), &state()), Ok(()));
        assert!(is_valid(
            &GovernanceRecord::Proposal(proposal()),
            &state()
        ));
    }

    #[test]
    fn test_proposal_name() {
        for name in ["", "has space", "dots.not.ok", "émoji"] {
            let p = Proposal {
                name: name.to_string(),
                ..proposal()
            };
            assert_matches!(
                validate_proposal(&p, &state()),
                Err(ValidationError::InvalidName(_))
            );
        }
    }

    #[test]
    fn test_proposal_period() {
        let reversed = Proposal {
            end_epoch: NOW - 86400,
            ..proposal()
        };
        assert_matches!(
            validate_proposal(&reversed, &state()),
            Err(ValidationError::EndBeforeStart { .. })
        );
    }

    #[test]
    fn test_end_epoch_boundary_is_exclusive() {
        let ends_now = Proposal {
            end_epoch: NOW,
            ..proposal()
        };
        assert_eq!(
            validate_proposal(&ends_now, &state()),
            Err(ValidationError::Expired { end: NOW, now: NOW })
        );
        let ends_next_second = Proposal {
            end_epoch: NOW + 1,
            ..proposal()
        };
        assert_eq!(validate_proposal(&ends_next_second, &state()), Ok(()));
    }

    #[test]
    fn test_budget_boundary_is_inclusive() {
        let at_budget = Proposal {
            payment_amount: dec!(100),
            ..proposal()
        };
        assert_eq!(validate_proposal(&at_budget, &state()), Ok(()));

        let over_budget = Proposal {
            payment_amount: dec!(100.00000001),
            ..proposal()
        };
        assert_matches!(
            validate_proposal(&over_budget, &state()),
            Err(ValidationError::OverBudget { .. })
        );

        let no_ceiling = DaemonState {
            max_budget: Some(Decimal::ZERO),
            ..state()
        };
        assert_eq!(validate_proposal(&over_budget, &no_ceiling), Ok(()));
    }

    #[test]
    fn test_amount_must_be_positive() {
        for amount in [dec!(0), dec!(-1)] {
            let p = Proposal {
                payment_amount: amount,
                ..proposal()
            };
            assert_eq!(
                validate_proposal(&p, &state()),
                Err(ValidationError::NonPositiveAmount(amount))
            );
        }
    }

    #[test]
    fn test_address_is_checked_against_network() {
        let mainnet = DaemonState {
            network: Network::Mainnet,
            ..state()
        };
        assert_matches!(
            validate_proposal(&proposal(), &mainnet),
            Err(ValidationError::InvalidAddress(
                AddressError::WrongVersion { .. }
            ))
        );
    }

    #[test]
    fn test_url_length() {
        for url in ["", "abc", "  abc  "] {
            let p = Proposal {
                url: url.to_string(),
                ..proposal()
            };
            assert_matches!(
                validate_proposal(&p, &state()),
                Err(ValidationError::ShortUrl(_))
            );
        }
        let p = Proposal {
            url: "a.io".to_string(),
            ..proposal()
        };
        assert_eq!(validate_proposal(&p, &state()), Ok(()));
    }

    #[test]
    fn test_checks_run_in_order() {
        // bad name and expired: the name is reported first
        let p = Proposal {
            name: "bad name".to_string(),
            end_epoch: NOW,
            ..proposal()
        };
        assert_matches!(
            validate_proposal(&p, &state()),
            Err(ValidationError::InvalidName(_))
        );
        // over budget and short url: the budget is reported first
        let p = Proposal {
            payment_amount: dec!(1000),
            url: "x".to_string(),
            ..proposal()
        };
        assert_matches!(
            validate_proposal(&p, &state()),
            Err(ValidationError::OverBudget { .. })
        );
    }

    #[test]
    fn test_superblock_must_be_on_cycle() {
        let on_cycle = Superblock::new(HASH, 62500, "a", "1");
        assert_eq!(validate_superblock(&on_cycle, &state()), Ok(()));
        let off_cycle = Superblock::new(HASH, 62501, "a", "1");
        assert_eq!(
            validate_superblock(&off_cycle, &state()),
            Err(ValidationError::OffCycle {
                expected: 62500,
                found: 62501
            })
        );
    }

    #[test]
    fn test_is_deletable() {
        let record = |end_epoch| {
            GovernanceRecord::Proposal(Proposal {
                end_epoch,
                ..proposal()
            })
        };
        assert!(!is_deletable(&record(NOW), NOW));
        assert!(!is_deletable(&record(NOW - PROPOSAL_RETENTION_SECS), NOW));
        assert!(is_deletable(
            &record(NOW - PROPOSAL_RETENTION_SECS - 1),
            NOW
        ));
        let old_superblock =
            GovernanceRecord::Superblock(Superblock::new(HASH, 1, "a", "1"));
        assert!(!is_deletable(&old_superblock, NOW));
    }
}
