//! Scan Query Engine
//!
//! Hand-compiled analytical queries evaluated by full scans of the column
//! store:
//!
//! - **protocol**: argument and result types of the seven query kinds
//! - **server_object**: the query object contract and shared scan state
//! - **q1..q7**: per-query aggregation
//! - **communication**: registration, result notification and delivery
//!
//! # Lifecycle
//!
//! ```text
//! request -> create_query_object -> pending list
//!         -> scan thread 0 activates it for the next generation
//!         -> every shard: process_bucket* / process_last_bucket / end
//!         -> last end(): merge partials -> notify_for_results
//!         -> delivery thread: pop_result -> Payload, then Finished
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use aim::query::{Q1In, QueryRequest};
//!
//! let reply = delivery.execute(&QueryRequest::Q1(Q1In { alpha: 4 })).await?;
//! ```

pub mod communication;
pub mod error;
pub mod protocol;
pub mod q1;
pub mod q2;
pub mod q3;
pub mod q4;
pub mod q5;
pub mod q6;
pub mod q7;
pub mod server_object;

pub use communication::{LocalRtaCommunication, QueryReply, RtaCommunication};
pub use error::{QueryError, QueryResult};
pub use protocol::{
    Q1In, Q1Out, Q2In, Q2Out, Q3In, Q3Out, Q3Tuple, Q4In, Q4Out, Q4Tuple, Q5In, Q5Out, Q5Tuple,
    Q6In, Q6Out, Q7In, Q7Out, QueryRequest, QueryResponse, NUM_QUERY_TYPES, RTA_PORT, TIME_SPAN,
};
pub use q1::Q1ServerObject;
pub use q2::Q2ServerObject;
pub use q3::{Q3ServerObject, SMALL_THRESHOLD};
pub use q4::Q4ServerObject;
pub use q5::Q5ServerObject;
pub use q6::Q6ServerObject;
pub use q7::Q7ServerObject;
pub use server_object::{QueryServerObject, ScanContext, ScanState, Status};
