//! Subscriber dimension data
//!
//! Static per-subscriber attributes (subscription, region, category, value
//! class) stored next to the analytics record. Every attribute is a `u16` id
//! into a small dimension table; the record ends with the subscriber id.

use rand::Rng;

/// Dimension attributes in storage order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DimensionAttribute {
    SubscriptionType,
    SubscriptionCost,
    FreeCallMins,
    SubscriptionData,
    Zip,
    City,
    State,
    Country,
    Region,
    CategoryType,
    ValueType,
    ValueThreshold,
}

impl DimensionAttribute {
    pub const COUNT: usize = 12;

    pub fn all() -> [DimensionAttribute; Self::COUNT] {
        use DimensionAttribute::*;
        [
            SubscriptionType,
            SubscriptionCost,
            FreeCallMins,
            SubscriptionData,
            Zip,
            City,
            State,
            Country,
            Region,
            CategoryType,
            ValueType,
            ValueThreshold,
        ]
    }

    pub fn name(self) -> &'static str {
        use DimensionAttribute::*;
        match self {
            SubscriptionType => "subscription_type",
            SubscriptionCost => "subscription_cost",
            FreeCallMins => "free_call_mins",
            SubscriptionData => "subscription_data",
            Zip => "zip",
            City => "city",
            State => "state",
            Country => "country",
            Region => "region",
            CategoryType => "category_type",
            ValueType => "value_type",
            ValueThreshold => "value_threshold",
        }
    }

    /// Display name of a dimension id
    pub fn value_name(self, id: u16) -> Option<&'static str> {
        use DimensionAttribute::*;
        let names: &[&str] = match self {
            SubscriptionType => &tables::SUBSCRIPTION_TYPES,
            SubscriptionCost => &tables::SUBSCRIPTION_COSTS,
            FreeCallMins => &tables::FREE_CALL_MINS,
            SubscriptionData => &tables::SUBSCRIPTION_DATA,
            Zip => &tables::ZIPS,
            City => &tables::CITIES,
            State => &tables::STATES,
            Country => &tables::COUNTRIES,
            Region => &tables::REGIONS,
            CategoryType => &tables::CATEGORIES,
            ValueType => &tables::VALUE_TYPES,
            ValueThreshold => &tables::VALUE_THRESHOLDS,
        };
        names.get(id as usize).copied()
    }
}

/// Dimension tables, as distinct names plus row -> id mappings
pub mod tables {
    pub const SUBSCRIPTION_TYPES: [&str; 2] = ["prepaid", "contract"];
    pub const SUBSCRIPTION_COSTS: [&str; 4] = ["0", "10", "20", "50"];
    pub const FREE_CALL_MINS: [&str; 4] = ["0", "120", "720", "unlimited"];
    pub const SUBSCRIPTION_DATA: [&str; 4] = ["0", "10", "50", "unlimited"];
    /// Subscription row -> type id
    pub const SUBSCRIPTION_TYPE_OF: [u16; 4] = [0, 1, 1, 1];

    pub const ZIPS: [&str; 6] = [
        "CH-1000",
        "CH-8000",
        "DE-80801",
        "ARG-B6500",
        "CHI-100000",
        "CHI-101500",
    ];
    pub const CITIES: [&str; 5] = ["Lausanne", "Zurich", "Munich", "Buenos Aires", "Beijing"];
    pub const STATES: [&str; 5] = ["Vaud", "Zurich", "Bayern", "Buenos Aires", "Beijing"];
    pub const COUNTRIES: [&str; 4] = ["Switzerland", "Germany", "Argentina", "China"];
    pub const REGIONS: [&str; 3] = ["EUROPE", "SOUTH AMERICA", "ASIA"];
    /// Region row (one per zip) -> ids
    pub const CITY_OF: [u16; 6] = [0, 1, 2, 3, 4, 4];
    pub const STATE_OF: [u16; 6] = [0, 1, 2, 3, 4, 4];
    pub const COUNTRY_OF: [u16; 6] = [0, 0, 1, 2, 3, 3];
    pub const REGION_OF: [u16; 6] = [0, 0, 0, 1, 2, 2];

    pub const CATEGORIES: [&str; 3] = ["business", "private", "company"];
    pub const VALUE_TYPES: [&str; 4] = ["none", "silver", "gold", "platinum"];
    pub const VALUE_THRESHOLDS: [&str; 4] = ["0", "30", "80", "150"];
}

/// Layout of the dimension part of a stored record
#[derive(Debug, Clone)]
pub struct DimensionSchema {
    offsets: Vec<usize>,
    size: usize,
}

impl Default for DimensionSchema {
    fn default() -> Self {
        Self::new()
    }
}

impl DimensionSchema {
    pub const ATTRIBUTE_SIZE: usize = std::mem::size_of::<u16>();

    pub fn new() -> Self {
        let offsets = (0..DimensionAttribute::COUNT)
            .map(|i| i * Self::ATTRIBUTE_SIZE)
            .collect();
        Self {
            offsets,
            size: DimensionAttribute::COUNT * Self::ATTRIBUTE_SIZE,
        }
    }

    /// Bytes of the attributes, subscriber id excluded
    pub fn size(&self) -> usize {
        self.size
    }

    /// Bytes of a full dimension record, subscriber id included
    pub fn record_size(&self) -> usize {
        self.size + std::mem::size_of::<u64>()
    }

    pub fn offset_of(&self, attribute: DimensionAttribute) -> usize {
        self.offsets[attribute as usize]
    }

    pub fn subscriber_id_offset(&self) -> usize {
        self.size
    }

    /// Column sizes: one per attribute, then the subscriber id
    pub fn sizes(&self) -> Vec<usize> {
        let mut sizes = vec![Self::ATTRIBUTE_SIZE; DimensionAttribute::COUNT];
        sizes.push(std::mem::size_of::<u64>());
        sizes
    }
}

/// Dimension values of one subscriber
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DimensionRecord {
    pub values: [u16; DimensionAttribute::COUNT],
    pub subscriber_id: u64,
}

impl DimensionRecord {
    /// Draw one row of each dimension table
    pub fn random<R: Rng + ?Sized>(subscriber_id: u64, rng: &mut R) -> Self {
        use tables::*;
        let subscription = rng.gen_range(0..SUBSCRIPTION_TYPE_OF.len());
        let region = rng.gen_range(0..ZIPS.len());
        let category = rng.gen_range(0..CATEGORIES.len());
        let value = rng.gen_range(0..VALUE_TYPES.len());

        Self {
            values: [
                SUBSCRIPTION_TYPE_OF[subscription],
                subscription as u16,
                subscription as u16,
                subscription as u16,
                region as u16,
                CITY_OF[region],
                STATE_OF[region],
                COUNTRY_OF[region],
                REGION_OF[region],
                category as u16,
                value as u16,
                value as u16,
            ],
            subscriber_id,
        }
    }

    /// Fixed record used when no randomness is wanted
    pub fn fixed(subscriber_id: u64) -> Self {
        // contract, Munich, private, silver
        Self {
            values: [1, 1, 1, 1, 2, 2, 2, 1, 0, 1, 1, 1],
            subscriber_id,
        }
    }

    pub fn get(&self, attribute: DimensionAttribute) -> u16 {
        self.values[attribute as usize]
    }

    pub fn set(&mut self, attribute: DimensionAttribute, id: u16) {
        self.values[attribute as usize] = id;
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(DimensionAttribute::COUNT * 2 + 8);
        for v in self.values {
            out.extend_from_slice(&v.to_le_bytes());
        }
        out.extend_from_slice(&self.subscriber_id.to_le_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != DimensionAttribute::COUNT * 2 + 8 {
            return None;
        }
        let mut values = [0u16; DimensionAttribute::COUNT];
        for (i, v) in values.iter_mut().enumerate() {
            *v = u16::from_le_bytes([bytes[2 * i], bytes[2 * i + 1]]);
        }
        let mut id = [0u8; 8];
        id.copy_from_slice(&bytes[DimensionAttribute::COUNT * 2..]);
        Some(Self {
            values,
            subscriber_id: u64::from_le_bytes(id),
        })
    }
}
