use std::fmt::Display;
use std::str::FromStr;

use lazy_static::lazy_static;
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::codec::{self, FieldMap};
use crate::daemon::GovObjectRecord;
use crate::store::ConstraintViolation;
use crate::time::EpochSecs;

/// Maximum length of an object hash column
pub const MAX_HASH_LEN: usize = 64;
/// Maximum length of a proposal name
pub const MAX_PROPOSAL_NAME_LEN: usize = 20;
/// Maximum length of a proposal payment address
pub const MAX_PAYMENT_ADDRESS_LEN: usize = 36;
/// Total number of digits a payment amount may carry
pub const AMOUNT_MAX_DIGITS: u32 = 16;
/// Number of fractional digits a payment amount is stored with
pub const AMOUNT_DECIMAL_PLACES: u32 = 8;

lazy_static! {
    static ref HASH_RE: Regex = Regex::new("^[a-f0-9]{64}$").unwrap();
}

/// Check if `s` is a well-formed object hash: 64 lowercase hex characters.
pub fn is_hash(s: &str) -> bool {
    HASH_RE.is_match(s)
}

/// The kinds of governance objects this agent understands
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
pub enum ObjectType {
    /// Funding proposal
    Proposal,
    /// Budget superblock
    Superblock,
}

impl ObjectType {
    /// Numeric code used by the daemon
    pub fn code(&self) -> u8 {
        match self {
            ObjectType::Proposal => 1,
            ObjectType::Superblock => 2,
        }
    }

    /// Look up an object type by its numeric daemon code
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(ObjectType::Proposal),
            2 => Some(ObjectType::Superblock),
            _ => None,
        }
    }

    /// Tag used in the serialised `[<tag>, {<fields>}]` pair
    pub fn tag(&self) -> &'static str {
        match self {
            ObjectType::Proposal => "proposal",
            ObjectType::Superblock => "superblock",
        }
    }

    /// Look up an object type by its serialised tag
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "proposal" => Some(ObjectType::Proposal),
            "superblock" => Some(ObjectType::Superblock),
            _ => None,
        }
    }

    /// Fields of the typed sub-record that are carried over the wire and
    /// covered by the canonical hash, in canonical order.
    pub fn serialisable_fields(&self) -> &'static [&'static str] {
        match self {
            ObjectType::Proposal => &[
                "end_epoch",
                "name",
                "payment_address",
                "payment_amount",
                "start_epoch",
                "url",
            ],
            // `sb_hash` is derived from these and so can't be one of them
            ObjectType::Superblock => &[
                "event_block_height",
                "payment_addresses",
                "payment_amounts",
            ],
        }
    }
}

impl Display for ObjectType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.tag())
    }
}

/// The network-visible envelope of a governance item
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GovernanceObject {
    /// Hash identifying the object on the network
    pub object_hash: String,
    /// Hash of the parent object, `"0"` if none
    pub parent_hash: String,
    /// Kind of the typed sub-record
    pub object_type: ObjectType,
    /// Object revision
    pub revision: u32,
    /// Hash of the collateral transaction
    pub fee_tx_hash: String,
    /// Yes votes, as reported by the daemon
    pub yes_count: i64,
    /// No votes, as reported by the daemon
    pub no_count: i64,
    /// Abstain votes, as reported by the daemon
    pub abstain_count: i64,
    /// Yes minus no votes, as reported by the daemon
    pub absolute_yes_count: i64,
    /// Creation time of the object
    pub creation_time: EpochSecs,
}

impl GovernanceObject {
    /// Build the envelope for a record listed by the daemon. The creation time
    /// falls back to `now` when the daemon doesn't report one.
    pub fn from_record(
        record: &GovObjectRecord,
        object_type: ObjectType,
        now: EpochSecs,
    ) -> Self {
        Self {
            object_hash: record.hash.clone(),
            parent_hash: "0".to_string(),
            object_type,
            revision: 1,
            fee_tx_hash: record.collateral_hash.clone(),
            yes_count: record.yes_count,
            no_count: record.no_count,
            abstain_count: record.abstain_count,
            absolute_yes_count: record.absolute_yes_count,
            creation_time: record.creation_time.unwrap_or(now),
        }
    }

    /// Overwrite the daemon-reported attributes with those of `other`. The
    /// creation time of an existing object is kept.
    pub fn refresh_from(&mut self, other: &GovernanceObject) {
        self.object_type = other.object_type;
        self.fee_tx_hash.clone_from(&other.fee_tx_hash);
        self.yes_count = other.yes_count;
        self.no_count = other.no_count;
        self.abstain_count = other.abstain_count;
        self.absolute_yes_count = other.absolute_yes_count;
    }
}

/// Shared behaviour of the typed sub-records
pub trait GovernanceClass: Sized {
    /// The object type this sub-record belongs to
    const OBJECT_TYPE: ObjectType;

    /// Build the sub-record from a decoded field map, enforcing the column
    /// constraints of its table.
    fn from_fields(
        object_hash: &str,
        fields: &FieldMap,
    ) -> Result<Self, ConstraintViolation>;

    /// The serialisable fields of this sub-record
    fn to_fields(&self) -> FieldMap;

    /// The hash of the owning governance object
    fn object_hash(&self) -> &str;

    /// Hook run right before the sub-record is written to storage
    fn before_save(&mut self) {}

    /// Names of the serialisable fields
    fn serialisable_fields() -> &'static [&'static str] {
        Self::OBJECT_TYPE.serialisable_fields()
    }

    /// Canonical hex payload of this sub-record
    fn serialise(&self) -> String {
        codec::canonical_payload(Self::OBJECT_TYPE, &self.to_fields())
    }
}

/// A funding proposal
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    /// Short identifier
    pub name: String,
    /// Proposal description URL
    pub url: String,
    /// Start of the payment period
    pub start_epoch: EpochSecs,
    /// End of the payment period
    pub end_epoch: EpochSecs,
    /// Payee
    pub payment_address: String,
    /// Amount paid per superblock
    pub payment_amount: Decimal,
    /// Hash of the owning governance object
    pub object_hash: String,
}

impl GovernanceClass for Proposal {
    const OBJECT_TYPE: ObjectType = ObjectType::Proposal;

    fn from_fields(
        object_hash: &str,
        fields: &FieldMap,
    ) -> Result<Self, ConstraintViolation> {
        let columns = Columns::new("proposals", fields);
        let proposal = Self {
            name: columns.text_or("name", "")?,
            url: columns.text_or("url", "")?,
            start_epoch: columns.integer("start_epoch")?,
            end_epoch: columns.integer("end_epoch")?,
            payment_address: columns.text("payment_address")?,
            payment_amount: columns.decimal("payment_amount")?,
            object_hash: object_hash.to_string(),
        };
        proposal.check_columns()?;
        Ok(proposal)
    }

    fn to_fields(&self) -> FieldMap {
        FieldMap::from([
            ("end_epoch".to_string(), Value::from(self.end_epoch)),
            ("name".to_string(), Value::from(self.name.clone())),
            (
                "payment_address".to_string(),
                Value::from(self.payment_address.clone()),
            ),
            (
                "payment_amount".to_string(),
                Value::from(self.payment_amount.to_string()),
            ),
            ("start_epoch".to_string(), Value::from(self.start_epoch)),
            ("url".to_string(), Value::from(self.url.clone())),
        ])
    }

    fn object_hash(&self) -> &str {
        &self.object_hash
    }
}

impl Proposal {
    /// Check the column constraints of the `proposals` table.
    pub fn check_columns(&self) -> Result<(), ConstraintViolation> {
        max_len("proposals", "name", &self.name, MAX_PROPOSAL_NAME_LEN)?;
        max_len(
            "proposals",
            "payment_address",
            &self.payment_address,
            MAX_PAYMENT_ADDRESS_LEN,
        )?;
        max_len("proposals", "object_hash", &self.object_hash, MAX_HASH_LEN)?;
        if !fits_amount_column(&self.payment_amount) {
            return Err(ConstraintViolation::new(
                "proposals",
                "payment_amount",
                format!(
                    "value {} does not fit DECIMAL({AMOUNT_MAX_DIGITS}, \
                     {AMOUNT_DECIMAL_PLACES})",
                    self.payment_amount
                ),
            ));
        }
        Ok(())
    }
}

/// A budget superblock
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Superblock {
    /// Block height at which the superblock pays out
    pub event_block_height: i64,
    /// `|`-separated payee addresses
    pub payment_addresses: String,
    /// `|`-separated amounts, parallel to the addresses
    pub payment_amounts: String,
    /// Hash of the owning governance object
    pub object_hash: String,
    sb_hash: String,
}

impl GovernanceClass for Superblock {
    const OBJECT_TYPE: ObjectType = ObjectType::Superblock;

    fn from_fields(
        object_hash: &str,
        fields: &FieldMap,
    ) -> Result<Self, ConstraintViolation> {
        let columns = Columns::new("superblocks", fields);
        let superblock = Self::new(
            object_hash,
            columns.integer("event_block_height")?,
            columns.text("payment_addresses")?,
            columns.text("payment_amounts")?,
        );
        max_len("superblocks", "object_hash", object_hash, MAX_HASH_LEN)?;
        Ok(superblock)
    }

    fn to_fields(&self) -> FieldMap {
        FieldMap::from([
            (
                "event_block_height".to_string(),
                Value::from(self.event_block_height),
            ),
            (
                "payment_addresses".to_string(),
                Value::from(self.payment_addresses.clone()),
            ),
            (
                "payment_amounts".to_string(),
                Value::from(self.payment_amounts.clone()),
            ),
        ])
    }

    fn object_hash(&self) -> &str {
        &self.object_hash
    }

    fn before_save(&mut self) {
        self.sb_hash = self.hex_hash();
    }
}

impl Superblock {
    /// A new superblock with its hash already computed
    pub fn new(
        object_hash: impl Into<String>,
        event_block_height: i64,
        payment_addresses: impl Into<String>,
        payment_amounts: impl Into<String>,
    ) -> Self {
        let mut superblock = Self {
            event_block_height,
            payment_addresses: payment_addresses.into(),
            payment_amounts: payment_amounts.into(),
            object_hash: object_hash.into(),
            sb_hash: String::new(),
        };
        superblock.before_save();
        superblock
    }

    /// Canonical hash of the serialisable fields
    pub fn hash(&self) -> codec::CanonicalHash {
        codec::canonical_hash(Self::OBJECT_TYPE, &self.to_fields())
    }

    /// Canonical hash in its stored, compact hex form
    pub fn hex_hash(&self) -> String {
        self.hash().to_compact_hex()
    }

    /// The stored canonical hash
    pub fn sb_hash(&self) -> &str {
        &self.sb_hash
    }

    /// The `gobject submit` command that publishes this superblock. New
    /// superblocks have no parent and start at revision 1.
    pub fn submit_command(&self, now: EpochSecs) -> Vec<String> {
        vec![
            "gobject".to_string(),
            "submit".to_string(),
            "0".to_string(),
            "1".to_string(),
            now.to_string(),
            codec::encode_for_daemon(Self::OBJECT_TYPE, &self.to_fields()),
        ]
    }
}

/// A typed sub-record of either kind
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GovernanceRecord {
    /// A funding proposal
    Proposal(Proposal),
    /// A budget superblock
    Superblock(Superblock),
}

impl GovernanceRecord {
    /// Build the sub-record matching `object_type` from decoded fields. Only
    /// the declared serialisable fields are looked at.
    pub fn from_fields(
        object_type: ObjectType,
        object_hash: &str,
        fields: &FieldMap,
    ) -> Result<Self, ConstraintViolation> {
        let fields = codec::filter_serialisable(object_type, fields);
        match object_type {
            ObjectType::Proposal => {
                Proposal::from_fields(object_hash, &fields).map(Self::Proposal)
            }
            ObjectType::Superblock => {
                Superblock::from_fields(object_hash, &fields)
                    .map(Self::Superblock)
            }
        }
    }

    /// The object type of the sub-record
    pub fn object_type(&self) -> ObjectType {
        match self {
            GovernanceRecord::Proposal(_) => ObjectType::Proposal,
            GovernanceRecord::Superblock(_) => ObjectType::Superblock,
        }
    }

    /// The hash of the owning governance object
    pub fn object_hash(&self) -> &str {
        match self {
            GovernanceRecord::Proposal(p) => p.object_hash(),
            GovernanceRecord::Superblock(sb) => sb.object_hash(),
        }
    }

    /// Run the pre-save hook of the sub-record
    pub fn before_save(&mut self) {
        match self {
            GovernanceRecord::Proposal(p) => p.before_save(),
            GovernanceRecord::Superblock(sb) => sb.before_save(),
        }
    }
}

/// Typed access to the columns of a decoded field map
struct Columns<'a> {
    table: &'static str,
    fields: &'a FieldMap,
}

impl<'a> Columns<'a> {
    fn new(table: &'static str, fields: &'a FieldMap) -> Self {
        Self { table, fields }
    }

    fn violation(
        &self,
        column: &'static str,
        reason: impl Into<String>,
    ) -> ConstraintViolation {
        ConstraintViolation::new(self.table, column, reason)
    }

    fn required(
        &self,
        column: &'static str,
    ) -> Result<&'a Value, ConstraintViolation> {
        match self.fields.get(column) {
            Some(Value::Null) | None => {
                Err(self.violation(column, "may not be NULL"))
            }
            Some(value) => Ok(value),
        }
    }

    fn text(
        &self,
        column: &'static str,
    ) -> Result<String, ConstraintViolation> {
        match self.required(column)? {
            Value::String(s) => Ok(s.clone()),
            other => Err(self.violation(
                column,
                format!("expected text, got {other}"),
            )),
        }
    }

    fn text_or(
        &self,
        column: &'static str,
        default: &str,
    ) -> Result<String, ConstraintViolation> {
        match self.fields.get(column) {
            Some(Value::Null) | None => Ok(default.to_string()),
            Some(_) => self.text(column),
        }
    }

    fn integer(
        &self,
        column: &'static str,
    ) -> Result<i64, ConstraintViolation> {
        let value = self.required(column)?;
        let parsed = match value {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        };
        parsed.ok_or_else(|| {
            self.violation(column, format!("expected an integer, got {value}"))
        })
    }

    fn decimal(
        &self,
        column: &'static str,
    ) -> Result<Decimal, ConstraintViolation> {
        let value = self.required(column)?;
        let text = match value {
            Value::Number(n) => n.to_string(),
            Value::String(s) => s.trim().to_string(),
            _ => String::new(),
        };
        Decimal::from_str(&text)
            .or_else(|_| Decimal::from_scientific(&text))
            .map(|d| d.round_dp(AMOUNT_DECIMAL_PLACES))
            .map_err(|_| {
                self.violation(
                    column,
                    format!("expected a decimal, got {value}"),
                )
            })
    }
}

fn max_len(
    table: &'static str,
    column: &'static str,
    value: &str,
    max: usize,
) -> Result<(), ConstraintViolation> {
    let len = value.chars().count();
    if len > max {
        Err(ConstraintViolation::new(
            table,
            column,
            format!("length {len} exceeds {max}"),
        ))
    } else {
        Ok(())
    }
}

/// Check that the integral part of an amount fits the column's digits.
fn fits_amount_column(amount: &Decimal) -> bool {
    let integral = amount.trunc().abs();
    let limit =
        Decimal::from(10u64.pow(AMOUNT_MAX_DIGITS - AMOUNT_DECIMAL_PLACES));
    integral < limit
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;
    use serde_json::json;

    use super::*;

    const HASH: &str =
        "1111111111111111111111111111111111111111111111111111111111111111";

    fn fields(value: Value) -> FieldMap {
        serde_json::from_value(value).unwrap()
    }

    fn proposal_fields() -> FieldMap {
        fields(json!({
            "name": "dean-miller-5493",
            "url": "https://dashcentral.org/dean-miller-5493",
            "start_epoch": 1483250400,
            "end_epoch": 1491022800,
            "payment_address": "yYe8KwyaUu5YswSYmB3q3ryx8XTUu9y7Ui",
            "payment_amount": 25.75,
        }))
    }

    #[test]
    fn test_is_hash() {
        assert!(is_hash(HASH));
        assert!(!is_hash("0"));
        assert!(!is_hash(&HASH.to_uppercase().replace('1', "A")));
        assert!(!is_hash(&format!("{HASH}1")));
    }

    #[test]
    fn test_object_type_registry() {
        for object_type in [ObjectType::Proposal, ObjectType::Superblock] {
            assert_eq!(
                ObjectType::from_tag(object_type.tag()),
                Some(object_type)
            );
            assert_eq!(
                ObjectType::from_code(object_type.code()),
                Some(object_type)
            );
        }
        assert_eq!(ObjectType::from_tag("trigger"), None);
        assert!(!ObjectType::Superblock
            .serialisable_fields()
            .contains(&"sb_hash"));
    }

    #[test]
    fn test_proposal_from_fields() {
        let proposal = Proposal::from_fields(HASH, &proposal_fields()).unwrap();
        assert_eq!(proposal.name, "dean-miller-5493");
        assert_eq!(proposal.end_epoch, 1491022800);
        assert_eq!(proposal.payment_amount, dec!(25.75));
        assert_eq!(proposal.object_hash, HASH);
    }

    #[test]
    fn test_proposal_constraints() {
        let mut missing = proposal_fields();
        missing.remove("end_epoch");
        assert_matches!(
            Proposal::from_fields(HASH, &missing),
            Err(ConstraintViolation { column: "end_epoch", .. })
        );

        let mut long_name = proposal_fields();
        long_name.insert("name".into(), json!("a".repeat(21)));
        assert_matches!(
            Proposal::from_fields(HASH, &long_name),
            Err(ConstraintViolation { column: "name", .. })
        );

        let mut huge = proposal_fields();
        huge.insert("payment_amount".into(), json!("123456789.5"));
        assert_matches!(
            Proposal::from_fields(HASH, &huge),
            Err(ConstraintViolation { column: "payment_amount", .. })
        );

        let mut wrong_type = proposal_fields();
        wrong_type.insert("start_epoch".into(), json!("soon"));
        assert_matches!(
            Proposal::from_fields(HASH, &wrong_type),
            Err(ConstraintViolation { column: "start_epoch", .. })
        );
    }

    #[test]
    fn test_amount_is_rounded_to_column_scale() {
        let mut precise = proposal_fields();
        precise.insert("payment_amount".into(), json!("1.123456789"));
        let proposal = Proposal::from_fields(HASH, &precise).unwrap();
        assert_eq!(proposal.payment_amount, dec!(1.12345679));
    }

    #[test]
    fn test_record_dispatch_filters_unknown_fields() {
        let mut raw = proposal_fields();
        raw.insert("name".into(), json!("ok"));
        raw.insert("unexpected".into(), json!({"nested": true}));
        let record =
            GovernanceRecord::from_fields(ObjectType::Proposal, HASH, &raw)
                .unwrap();
        assert_eq!(record.object_type(), ObjectType::Proposal);
        assert_eq!(record.object_hash(), HASH);
    }

    #[test]
    fn test_superblock_hash_is_refreshed_before_save() {
        let mut sb = Superblock::new(HASH, 62500, "a|b", "5|3");
        let original = sb.sb_hash().to_string();
        assert_eq!(original, sb.hex_hash());

        sb.payment_amounts = "5|4".to_string();
        assert_eq!(sb.sb_hash(), original);
        sb.before_save();
        assert_ne!(sb.sb_hash(), original);
        assert_eq!(sb.sb_hash(), sb.hex_hash());
    }

    #[test]
    fn test_superblock_serialise() {
        let sb = Superblock::new(HASH, 62500, "a|b", "5|3");
        assert_eq!(
            Superblock::serialisable_fields(),
            ["event_block_height", "payment_addresses", "payment_amounts"]
        );
        let payload = sb.serialise();
        let json = data_encoding::HEXLOWER.decode(payload.as_bytes()).unwrap();
        assert_eq!(
            String::from_utf8(json).unwrap(),
            r#"["superblock", {"event_block_height": 62500, "payment_addresses": "a|b", "payment_amounts": "5|3"}]"#
        );
    }

    #[test]
    fn test_submit_command() {
        let sb = Superblock::new(HASH, 62500, "a|b", "5|3");
        let cmd = sb.submit_command(1_500_000_000);
        assert_eq!(&cmd[..5], &["gobject", "submit", "0", "1", "1500000000"]);
        let decoded = codec::decode(&cmd[5]).unwrap();
        assert_eq!(decoded.object_type, ObjectType::Superblock);
        assert_eq!(decoded.fields, sb.to_fields());
    }
}
