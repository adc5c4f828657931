//! Campaigns and firing policies

use serde::{Deserialize, Serialize};

use super::error::{CampaignError, CampaignResult};
use crate::schema::{FIRST_MONDAY, MSECS_PER_DAY, MSECS_PER_WEEK};

/// Minimum distance between two firings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FiringInterval {
    OneDay,
    TwoDays,
    OneWeek,
}

impl FiringInterval {
    pub fn duration_ms(self) -> i64 {
        match self {
            FiringInterval::OneDay => MSECS_PER_DAY,
            FiringInterval::TwoDays => 2 * MSECS_PER_DAY,
            FiringInterval::OneWeek => MSECS_PER_WEEK,
        }
    }
}

/// When a campaign may fire again
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FiringPolicy {
    Always,
    /// Interval measured from the last firing
    Sliding(FiringInterval),
    /// Interval aligned to day boundaries (weeks to Mondays)
    Fixed(FiringInterval),
}

impl FiringPolicy {
    /// Build from the metadata encoding: interval `0`, `1d`, `2d` or `w`
    /// and start condition `fixed` or `sliding`
    pub fn from_meta(interval: &str, start_condition: &str) -> CampaignResult<Self> {
        let interval = match interval.trim() {
            "0" => return Ok(FiringPolicy::Always),
            "1d" => FiringInterval::OneDay,
            "2d" => FiringInterval::TwoDays,
            "w" => FiringInterval::OneWeek,
            other => return Err(CampaignError::UnknownFiringPolicy(other.to_string())),
        };
        match start_condition.trim() {
            "fixed" => Ok(FiringPolicy::Fixed(interval)),
            "sliding" => Ok(FiringPolicy::Sliding(interval)),
            other => Err(CampaignError::UnknownFiringPolicy(other.to_string())),
        }
    }

    /// Interval code used in the metadata store
    pub fn interval_code(self) -> &'static str {
        match self {
            FiringPolicy::Always => "0",
            FiringPolicy::Sliding(i) | FiringPolicy::Fixed(i) => match i {
                FiringInterval::OneDay => "1d",
                FiringInterval::TwoDays => "2d",
                FiringInterval::OneWeek => "w",
            },
        }
    }

    pub fn interval_ms(self) -> i64 {
        match self {
            FiringPolicy::Always => 0,
            FiringPolicy::Sliding(i) | FiringPolicy::Fixed(i) => i.duration_ms(),
        }
    }

    pub fn start_condition(self) -> &'static str {
        match self {
            FiringPolicy::Fixed(_) => "fixed",
            _ => "sliding",
        }
    }

    pub fn can_fire(self, last_fired: i64, current: i64) -> bool {
        match self {
            FiringPolicy::Always => true,
            FiringPolicy::Sliding(i) => current - last_fired >= i.duration_ms(),
            FiringPolicy::Fixed(FiringInterval::OneDay) => {
                current >= (last_fired / MSECS_PER_DAY + 1) * MSECS_PER_DAY
            }
            FiringPolicy::Fixed(FiringInterval::TwoDays) => {
                current >= (last_fired / MSECS_PER_DAY + 2) * MSECS_PER_DAY
            }
            FiringPolicy::Fixed(FiringInterval::OneWeek) => {
                let week = (last_fired - FIRST_MONDAY) / MSECS_PER_WEEK;
                current >= (week + 1) * MSECS_PER_WEEK + FIRST_MONDAY
            }
        }
    }
}

/// Validity window and firing policy; conditions live in the index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Campaign {
    pub id: u32,
    pub valid_from: i64,
    pub valid_to: i64,
    pub policy: FiringPolicy,
}

impl Campaign {
    pub fn new(id: u32, valid_from: i64, valid_to: i64, policy: FiringPolicy) -> Self {
        Self {
            id,
            valid_from,
            valid_to,
            policy,
        }
    }

    /// Inside the validity window, bounds included
    pub fn is_valid(&self, ts: i64) -> bool {
        ts >= self.valid_from && ts <= self.valid_to
    }

    pub fn can_fire(&self, last_fired: i64, current: i64) -> bool {
        self.is_valid(current) && self.policy.can_fire(last_fired, current)
    }
}
