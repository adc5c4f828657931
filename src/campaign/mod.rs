//! Campaign Matching
//!
//! Decides, for every updated analytics record, which marketing campaigns
//! have their conditions met:
//!
//! - **predicate**: `attribute op constant` and ANDed conjuncts
//! - **firing**: campaigns, validity windows and firing policies
//! - **rtree**: static packed interval tree for stabbing queries
//! - **entry_index**: one interval tree per indexed (entry) attribute
//! - **index**: the matching index and its builder
//!
//! # Example
//!
//! ```rust,ignore
//! let mut builder = CampaignIndexBuilder::new(&schema);
//! builder.entry_attribute(calls_offset)?;
//! builder.add_campaign(Campaign::new(0, from, to, FiringPolicy::Always))?;
//! let p = builder.add_predicate(Predicate::new(calls_offset, Operator::Gre, Value::UInt(5)))?;
//! builder.add_conjunct(0, &[p])?;
//! let index = builder.build()?;
//!
//! let matched = index.match_campaigns(&record);
//! ```

mod entry_index;
mod error;
mod firing;
mod index;
mod predicate;
mod rtree;

pub use entry_index::{EntryAttrIndex, EntryIndex};
pub use error::{CampaignError, CampaignResult};
pub use firing::{Campaign, FiringInterval, FiringPolicy};
pub use index::{predicate_range, CampaignIndex, CampaignIndexBuilder, MatchSet};
pub use predicate::{parse_constant, value_type, Conjunct, Operator, Predicate};
pub use rtree::{OneDimRTree, RangeKey, IM_FAN_OUT, LEAF_FAN_OUT};
