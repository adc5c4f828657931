//! Query communication layer
//!
//! [`RtaCommunication`] is the meeting point between the transport and the
//! scan threads: requests become query objects and wait in the pending list
//! until scan thread 0 picks them up; finished queries are pushed onto the
//! polling queue by [`notify_for_results`] and popped by delivery threads.
//!
//! [`LocalRtaCommunication`] runs those delivery threads in-process and hands
//! each payload to the requester over a channel, followed by a separate
//! [`QueryReply::Finished`] message.
//!
//! [`notify_for_results`]: RtaCommunication::notify_for_results

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tokio::sync::mpsc;

use super::error::{QueryError, QueryResult};
use super::protocol::{QueryRequest, QueryResponse};
use super::server_object::{QueryServerObject, ScanContext, Status};
use super::{
    Q1ServerObject, Q2ServerObject, Q3ServerObject, Q4ServerObject, Q5ServerObject,
    Q6ServerObject, Q7ServerObject,
};

/// Message delivered to the requester of a query
#[derive(Debug, Clone, PartialEq)]
pub enum QueryReply {
    /// One result payload (bincode)
    Payload(Vec<u8>),
    /// No more payloads follow
    Finished,
}

/// Pending and finished queries
pub struct RtaCommunication {
    context: ScanContext,
    next_query_id: AtomicU64,
    pending: Mutex<Vec<Arc<dyn QueryServerObject>>>,
    ready: Mutex<VecDeque<Arc<dyn QueryServerObject>>>,
    ready_signal: Condvar,
}

impl RtaCommunication {
    pub fn new(context: ScanContext) -> Self {
        Self {
            context,
            next_query_id: AtomicU64::new(1),
            pending: Mutex::new(Vec::new()),
            ready: Mutex::new(VecDeque::new()),
            ready_signal: Condvar::new(),
        }
    }

    pub fn context(&self) -> &ScanContext {
        &self.context
    }

    pub fn next_query_id(&self) -> u64 {
        self.next_query_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Build the server object of a request
    pub fn create_query_object(&self, request: &QueryRequest) -> Arc<dyn QueryServerObject> {
        let id = self.next_query_id();
        let ctx = &self.context;
        tracing::debug!(query_id = id, ?request, "Creating query object");
        match *request {
            QueryRequest::Q1(args) => Arc::new(Q1ServerObject::new(id, args, ctx)),
            QueryRequest::Q2(args) => Arc::new(Q2ServerObject::new(id, args, ctx)),
            QueryRequest::Q3(args) => Arc::new(Q3ServerObject::new(id, args, ctx)),
            QueryRequest::Q4(args) => Arc::new(Q4ServerObject::new(id, args, ctx)),
            QueryRequest::Q5(args) => Arc::new(Q5ServerObject::new(id, args, ctx)),
            QueryRequest::Q6(args) => Arc::new(Q6ServerObject::new(id, args, ctx)),
            QueryRequest::Q7(args) => Arc::new(Q7ServerObject::new(id, args, ctx)),
        }
    }

    /// Queue a query for the next scan generation
    pub fn enqueue(&self, query: Arc<dyn QueryServerObject>) {
        self.pending.lock().push(query);
    }

    /// Take every queued query
    pub fn get_queued_queries(&self) -> Vec<Arc<dyn QueryServerObject>> {
        std::mem::take(&mut *self.pending.lock())
    }

    pub fn queued_len(&self) -> usize {
        self.pending.lock().len()
    }

    /// A query's result is ready to be polled
    pub fn notify_for_results(&self, query: Arc<dyn QueryServerObject>) {
        tracing::debug!(query_id = query.query_id(), kind = query.kind(), "Result ready");
        self.ready.lock().push_back(query);
        self.ready_signal.notify_one();
    }

    /// Next finished query, waiting up to `timeout`
    pub fn next_to_poll(&self, timeout: Duration) -> Option<Arc<dyn QueryServerObject>> {
        let mut ready = self.ready.lock();
        if ready.is_empty() {
            self.ready_signal.wait_for(&mut ready, timeout);
        }
        ready.pop_front()
    }

    /// Wake every waiting delivery thread
    pub fn wake_all(&self) {
        self.ready_signal.notify_all();
    }
}

type Waiters = Mutex<HashMap<u64, mpsc::UnboundedSender<QueryReply>>>;

/// In-process result delivery
pub struct LocalRtaCommunication {
    rta: Arc<RtaCommunication>,
    waiters: Arc<Waiters>,
    shutdown: Arc<AtomicBool>,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl LocalRtaCommunication {
    /// Start `threads` delivery threads polling `rta`
    pub fn start(rta: Arc<RtaCommunication>, threads: usize) -> QueryResult<Self> {
        let waiters: Arc<Waiters> = Arc::new(Mutex::new(HashMap::new()));
        let shutdown = Arc::new(AtomicBool::new(false));
        let mut handles = Vec::with_capacity(threads.max(1));
        for i in 0..threads.max(1) {
            let rta = Arc::clone(&rta);
            let waiters = Arc::clone(&waiters);
            let shutdown = Arc::clone(&shutdown);
            let handle = std::thread::Builder::new()
                .name(format!("aim-deliver-{}", i))
                .spawn(move || deliver_loop(&rta, &waiters, &shutdown))
                .map_err(|e| QueryError::Closed(e.to_string()))?;
            handles.push(handle);
        }
        tracing::info!("Started {} result delivery threads", handles.len());
        Ok(Self {
            rta,
            waiters,
            shutdown,
            threads: Mutex::new(handles),
        })
    }

    pub fn rta(&self) -> &Arc<RtaCommunication> {
        &self.rta
    }

    /// Register a query and return the channel its replies arrive on
    pub fn submit(&self, request: &QueryRequest) -> (u64, mpsc::UnboundedReceiver<QueryReply>) {
        let query = self.rta.create_query_object(request);
        let id = query.query_id();
        let (tx, rx) = mpsc::unbounded_channel();
        self.waiters.lock().insert(id, tx);
        self.rta.enqueue(query);
        (id, rx)
    }

    /// Submit and await the first payload, decoded
    pub async fn execute(&self, request: &QueryRequest) -> QueryResult<QueryResponse> {
        let (_, mut rx) = self.submit(request);
        let payloads = collect_async(&mut rx).await?;
        decode_first(request.kind(), payloads)
    }

    /// Blocking variant of [`execute`](Self::execute) for non-async callers
    pub fn execute_blocking(&self, request: &QueryRequest) -> QueryResult<QueryResponse> {
        let (_, mut rx) = self.submit(request);
        let mut payloads = Vec::new();
        loop {
            match rx.blocking_recv() {
                Some(QueryReply::Payload(bytes)) => payloads.push(bytes),
                Some(QueryReply::Finished) => break,
                None => return Err(QueryError::Closed("delivery stopped".into())),
            }
        }
        decode_first(request.kind(), payloads)
    }

    /// Stop the delivery threads; pending requesters see a closed channel
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.rta.wake_all();
        for handle in self.threads.lock().drain(..) {
            if handle.join().is_err() {
                tracing::error!("Result delivery thread panicked");
            }
        }
        self.waiters.lock().clear();
    }
}

impl Drop for LocalRtaCommunication {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn deliver_loop(rta: &RtaCommunication, waiters: &Waiters, shutdown: &AtomicBool) {
    while !shutdown.load(Ordering::SeqCst) {
        let Some(query) = rta.next_to_poll(Duration::from_millis(50)) else {
            continue;
        };
        let id = query.query_id();
        let Some(tx) = waiters.lock().remove(&id) else {
            tracing::warn!(query_id = id, "No requester for finished query");
            continue;
        };
        while let Some((bytes, status)) = query.pop_result() {
            // A dropped receiver only means the requester gave up
            let _ = tx.send(QueryReply::Payload(bytes));
            if status == Status::Done {
                break;
            }
        }
        let _ = tx.send(QueryReply::Finished);
    }
}

async fn collect_async(rx: &mut mpsc::UnboundedReceiver<QueryReply>) -> QueryResult<Vec<Vec<u8>>> {
    let mut payloads = Vec::new();
    loop {
        match rx.recv().await {
            Some(QueryReply::Payload(bytes)) => payloads.push(bytes),
            Some(QueryReply::Finished) => return Ok(payloads),
            None => return Err(QueryError::Closed("delivery stopped".into())),
        }
    }
}

fn decode_first(kind: u8, payloads: Vec<Vec<u8>>) -> QueryResult<QueryResponse> {
    let bytes = payloads
        .into_iter()
        .next()
        .ok_or_else(|| QueryError::Closed("query finished without a result".into()))?;
    QueryResponse::decode(kind, &bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::protocol::{Q1In, Q2In};
    use crate::schema::{AnalyticsSchema, DimensionSchema};
    use crate::storage::StoreLayout;

    fn context(threads: usize) -> ScanContext {
        let schema = Arc::new(AnalyticsSchema::standard());
        let layout = Arc::new(StoreLayout::new(&schema, &DimensionSchema::new()));
        ScanContext::new(schema, layout, threads)
    }

    #[test]
    fn test_queue_and_numbering() {
        let rta = RtaCommunication::new(context(1));
        let a = rta.create_query_object(&QueryRequest::Q1(Q1In { alpha: 1 }));
        let b = rta.create_query_object(&QueryRequest::Q2(Q2In { alpha: 1 }));
        assert_eq!(b.query_id(), a.query_id() + 1);
        assert_eq!(b.kind(), 2);

        rta.enqueue(a);
        rta.enqueue(b);
        assert_eq!(rta.queued_len(), 2);
        assert_eq!(rta.get_queued_queries().len(), 2);
        assert!(rta.get_queued_queries().is_empty());
    }

    #[test]
    fn test_payload_then_finished() {
        let rta = Arc::new(RtaCommunication::new(context(1)));
        let local = LocalRtaCommunication::start(Arc::clone(&rta), 1).unwrap();
        let (_, mut rx) = local.submit(&QueryRequest::Q1(Q1In { alpha: 0 }));

        // stand in for the scan thread: no buckets, one end() call
        let queries = rta.get_queued_queries();
        assert_eq!(queries.len(), 1);
        assert!(queries[0].end());
        rta.notify_for_results(Arc::clone(&queries[0]));

        let bytes = match rx.blocking_recv().unwrap() {
            QueryReply::Payload(bytes) => bytes,
            other => panic!("expected payload, got {:?}", other),
        };
        assert_eq!(rx.blocking_recv(), Some(QueryReply::Finished));
        match QueryResponse::decode(1, &bytes).unwrap() {
            QueryResponse::Q1(out) => {
                assert!(out.success);
                assert_eq!(out.avg, 0.0);
            }
            other => panic!("unexpected {:?}", other),
        }
        local.shutdown();
    }
}
