//! Query argument and result types
//!
//! Each query kind has a small argument struct and a fixed result struct.
//! Results travel as `bincode` payloads between the scan threads and the
//! transport; the HTTP layer re-encodes them as JSON.

use serde::{Deserialize, Serialize};

use super::error::{QueryError, QueryResult};

/// Number of query kinds (1..=7)
pub const NUM_QUERY_TYPES: u8 = 7;

/// Default port of the query endpoint
pub const RTA_PORT: u16 = 5001;

/// Time span covered by generated events: 30 days in ms
pub const TIME_SPAN: i64 = 2_592_000_000;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Q1In {
    pub alpha: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Q2In {
    pub alpha: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct Q3In {}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Q4In {
    pub alpha: u32,
    pub beta: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Q5In {
    pub sub_type: u16,
    pub sub_category: u16,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Q6In {
    pub country_id: u16,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Q7In {
    pub subscriber_value_type: u16,
    /// 0 = day, 1 = week
    pub window_length: u8,
}

/// Average duration of subscribers above a local-call threshold
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Q1Out {
    pub success: bool,
    pub error: String,
    pub avg: f64,
}

/// Most expensive call of subscribers above a call threshold
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Q2Out {
    pub success: bool,
    pub error: String,
    pub max: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Q3Tuple {
    pub calls: u32,
    pub cost_ratio: f64,
}

/// Cost per duration unit, grouped by weekly call count
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Q3Out {
    pub success: bool,
    pub error: String,
    pub results: Vec<Q3Tuple>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Q4Tuple {
    pub city: String,
    /// Average weekly local calls
    pub avg: f64,
    /// Total weekly local duration
    pub sum: u64,
}

/// Local call statistics per city
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Q4Out {
    pub success: bool,
    pub error: String,
    pub results: Vec<Q4Tuple>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Q5Tuple {
    pub region: String,
    pub sum_local_cost: f64,
    pub sum_long_distance_cost: f64,
}

/// Local vs long distance cost per region
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Q5Out {
    pub success: bool,
    pub error: String,
    pub results: Vec<Q5Tuple>,
}

/// Longest calls of a country, with the subscriber holding each
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Q6Out {
    pub success: bool,
    pub error: String,
    pub max_local_day: u32,
    pub max_local_day_id: u64,
    pub max_local_week: u32,
    pub max_local_week_id: u64,
    pub max_distant_day: u32,
    pub max_distant_day_id: u64,
    pub max_distant_week: u32,
    pub max_distant_week_id: u64,
}

/// Subscriber with the lowest cost per duration unit
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Q7Out {
    pub success: bool,
    pub error: String,
    pub subscriber_id: u64,
    pub flat_rate: f64,
}

/// A typed query request
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "query", rename_all = "lowercase")]
pub enum QueryRequest {
    Q1(Q1In),
    Q2(Q2In),
    Q3(Q3In),
    Q4(Q4In),
    Q5(Q5In),
    Q6(Q6In),
    Q7(Q7In),
}

impl QueryRequest {
    pub fn kind(&self) -> u8 {
        match self {
            QueryRequest::Q1(_) => 1,
            QueryRequest::Q2(_) => 2,
            QueryRequest::Q3(_) => 3,
            QueryRequest::Q4(_) => 4,
            QueryRequest::Q5(_) => 5,
            QueryRequest::Q6(_) => 6,
            QueryRequest::Q7(_) => 7,
        }
    }

    /// Build a request from a kind and its JSON arguments
    pub fn from_json(kind: u8, args: serde_json::Value) -> QueryResult<Self> {
        fn parse<T: serde::de::DeserializeOwned>(args: serde_json::Value) -> QueryResult<T> {
            serde_json::from_value(args).map_err(|e| QueryError::InvalidArgument(e.to_string()))
        }
        let args = match args {
            serde_json::Value::Null => serde_json::json!({}),
            other => other,
        };
        Ok(match kind {
            1 => QueryRequest::Q1(parse(args)?),
            2 => QueryRequest::Q2(parse(args)?),
            3 => QueryRequest::Q3(parse(args)?),
            4 => QueryRequest::Q4(parse(args)?),
            5 => QueryRequest::Q5(parse(args)?),
            6 => QueryRequest::Q6(parse(args)?),
            7 => QueryRequest::Q7(parse(args)?),
            other => return Err(QueryError::UnknownQuery(other)),
        })
    }
}

/// A decoded query result
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum QueryResponse {
    Q1(Q1Out),
    Q2(Q2Out),
    Q3(Q3Out),
    Q4(Q4Out),
    Q5(Q5Out),
    Q6(Q6Out),
    Q7(Q7Out),
}

impl QueryResponse {
    /// Failed result of the given kind
    pub fn failure(kind: u8, error: impl Into<String>) -> QueryResult<Self> {
        let error = error.into();
        Ok(match kind {
            1 => QueryResponse::Q1(Q1Out { error, ..Default::default() }),
            2 => QueryResponse::Q2(Q2Out { error, ..Default::default() }),
            3 => QueryResponse::Q3(Q3Out { error, ..Default::default() }),
            4 => QueryResponse::Q4(Q4Out { error, ..Default::default() }),
            5 => QueryResponse::Q5(Q5Out { error, ..Default::default() }),
            6 => QueryResponse::Q6(Q6Out { error, ..Default::default() }),
            7 => QueryResponse::Q7(Q7Out { error, ..Default::default() }),
            other => return Err(QueryError::UnknownQuery(other)),
        })
    }

    pub fn kind(&self) -> u8 {
        match self {
            QueryResponse::Q1(_) => 1,
            QueryResponse::Q2(_) => 2,
            QueryResponse::Q3(_) => 3,
            QueryResponse::Q4(_) => 4,
            QueryResponse::Q5(_) => 5,
            QueryResponse::Q6(_) => 6,
            QueryResponse::Q7(_) => 7,
        }
    }

    pub fn success(&self) -> bool {
        match self {
            QueryResponse::Q1(o) => o.success,
            QueryResponse::Q2(o) => o.success,
            QueryResponse::Q3(o) => o.success,
            QueryResponse::Q4(o) => o.success,
            QueryResponse::Q5(o) => o.success,
            QueryResponse::Q6(o) => o.success,
            QueryResponse::Q7(o) => o.success,
        }
    }

    pub fn encode(&self) -> QueryResult<Vec<u8>> {
        Ok(match self {
            QueryResponse::Q1(o) => bincode::serialize(o)?,
            QueryResponse::Q2(o) => bincode::serialize(o)?,
            QueryResponse::Q3(o) => bincode::serialize(o)?,
            QueryResponse::Q4(o) => bincode::serialize(o)?,
            QueryResponse::Q5(o) => bincode::serialize(o)?,
            QueryResponse::Q6(o) => bincode::serialize(o)?,
            QueryResponse::Q7(o) => bincode::serialize(o)?,
        })
    }

    /// Decode a result payload; the kind is not part of the payload
    pub fn decode(kind: u8, bytes: &[u8]) -> QueryResult<Self> {
        Ok(match kind {
            1 => QueryResponse::Q1(bincode::deserialize(bytes)?),
            2 => QueryResponse::Q2(bincode::deserialize(bytes)?),
            3 => QueryResponse::Q3(bincode::deserialize(bytes)?),
            4 => QueryResponse::Q4(bincode::deserialize(bytes)?),
            5 => QueryResponse::Q5(bincode::deserialize(bytes)?),
            6 => QueryResponse::Q6(bincode::deserialize(bytes)?),
            7 => QueryResponse::Q7(bincode::deserialize(bytes)?),
            other => return Err(QueryError::UnknownQuery(other)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_from_json() {
        let req = QueryRequest::from_json(4, serde_json::json!({"alpha": 2, "beta": 30})).unwrap();
        assert_eq!(req, QueryRequest::Q4(Q4In { alpha: 2, beta: 30 }));
        assert_eq!(req.kind(), 4);

        let q3 = QueryRequest::from_json(3, serde_json::Value::Null).unwrap();
        assert_eq!(q3.kind(), 3);

        assert!(matches!(
            QueryRequest::from_json(1, serde_json::json!({"beta": 1})),
            Err(QueryError::InvalidArgument(_))
        ));
        assert!(matches!(
            QueryRequest::from_json(8, serde_json::json!({})),
            Err(QueryError::UnknownQuery(8))
        ));
    }

    #[test]
    fn test_failure_payload() {
        let failed = QueryResponse::failure(6, "no such attribute").unwrap();
        assert!(!failed.success());
        let bytes = failed.encode().unwrap();
        let decoded = QueryResponse::decode(6, &bytes).unwrap();
        match decoded {
            QueryResponse::Q6(out) => {
                assert_eq!(out.error, "no such attribute");
                assert_eq!(out.max_local_day, 0);
            }
            other => panic!("unexpected response {:?}", other),
        }
    }

    #[test]
    fn test_q3_payload_keeps_order() {
        let out = QueryResponse::Q3(Q3Out {
            success: true,
            error: String::new(),
            results: vec![
                Q3Tuple { calls: 1, cost_ratio: 0.5 },
                Q3Tuple { calls: 40, cost_ratio: 2.0 },
            ],
        });
        let decoded = QueryResponse::decode(3, &out.encode().unwrap()).unwrap();
        assert_eq!(decoded, out);
    }
}
