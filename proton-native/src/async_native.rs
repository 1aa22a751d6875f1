use std::sync::Arc;

use bytes::Bytes;
use log::trace;
use proton_error::{ProtonError, ProtonResult, proton_err};
use proton_io::ByteSource;
use proton_types::{InsertContext, QueryContext};
use tokio::sync::Semaphore;
use tokio::task::{JoinError, spawn_blocking};

use crate::result::QueryResult;
use crate::settings::DriverSettings;
use crate::transform::NativeTransform;

/// The block transform as futures.
///
/// Decoding and encoding block on the byte source, so both run on tokio's blocking pool. At most
/// `dispatch_threads` transforms of one `AsyncNative` run at a time; further calls wait for a
/// permit before they start.
#[derive(Debug, Clone)]
pub struct AsyncNative {
    permits: Arc<Semaphore>,
}

impl AsyncNative {
    pub fn new(settings: &DriverSettings) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(settings.dispatch_threads.max(1))),
        }
    }

    /// Read a whole response.
    pub async fn parse_response<S>(
        &self,
        source: S,
        ctx: QueryContext,
    ) -> ProtonResult<QueryResult>
    where
        S: ByteSource + Send + 'static,
    {
        self.run(move || QueryResult::from_stream(NativeTransform::parse_response(source, ctx)))
            .await
    }

    /// Encode every block of an insert.
    pub async fn build_insert(&self, ctx: InsertContext) -> ProtonResult<Vec<Bytes>> {
        self.run(move || NativeTransform::build_insert(ctx)?.collect::<ProtonResult<Vec<_>>>())
            .await
    }

    /// Transforms currently allowed to start without waiting.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    async fn run<T, F>(&self, task: F) -> ProtonResult<T>
    where
        T: Send + 'static,
        F: FnOnce() -> ProtonResult<T> + Send + 'static,
    {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| proton_err!(StreamFailure: "transform pool is closed"))?;
        trace!("starting blocking transform, {} permits left", self.permits.available_permits());
        spawn_blocking(move || {
            let _permit = permit;
            task()
        })
        .await
        .map_err(task_failure)?
    }

    /// Stop accepting new transforms. Running ones finish.
    pub fn shutdown(&self) {
        self.permits.close();
    }
}

fn task_failure(err: JoinError) -> ProtonError {
    if err.is_cancelled() {
        proton_err!(StreamFailure: "transform task was cancelled")
    } else {
        proton_err!(StreamFailure: "transform task panicked")
    }
}

#[cfg(test)]
mod tests {
    use proton_io::{ChunkIter, ResponseBuffer};
    use proton_scalar::Value;
    use proton_types::{InsertData, get_from_name};

    use super::*;

    fn settings(dispatch_threads: usize) -> DriverSettings {
        DriverSettings {
            dispatch_threads,
            ..DriverSettings::default()
        }
    }

    #[tokio::test]
    async fn insert_then_read() {
        let native = AsyncNative::new(&DriverSettings::default());
        let ctx = InsertContext::builder(
            "t",
            vec!["v".to_string()],
            vec![get_from_name("nullable(int64)").unwrap()],
        )
        .data(InsertData::Columns(vec![vec![Value::from(-1i64), Value::Null]]))
        .build()
        .unwrap();
        let chunks = native.build_insert(ctx).await.unwrap();
        let body = chunks.concat();
        let prefix_len = b"INSERT INTO t (`v`) FORMAT Native\n".len();
        let body = Bytes::copy_from_slice(&body[prefix_len..]);
        let source = ResponseBuffer::new(ChunkIter::new([body]));
        let result = native.parse_response(source, QueryContext::default()).await.unwrap();
        assert_eq!(result.result_rows(), vec![vec![Value::Int(-1)], vec![Value::Null]]);
        assert_eq!(native.available(), 1);
    }

    #[tokio::test]
    async fn errors_are_returned() {
        let native = AsyncNative::new(&DriverSettings::default());
        let body = Bytes::from_static(b"\x01\x01\x01v\x03bad");
        let source = ResponseBuffer::new(ChunkIter::new([body]));
        assert!(native.parse_response(source, QueryContext::default()).await.is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_reads_share_the_permits() {
        let native = AsyncNative::new(&settings(2));
        let reads = (0..6u8).map(|v| {
            let native = native.clone();
            tokio::spawn(async move {
                let body = vec![1, 1, 1, b'v', 5, b'u', b'i', b'n', b't', b'8', v];
                let source = ResponseBuffer::new(ChunkIter::new([Bytes::from(body)]));
                native.parse_response(source, QueryContext::default()).await
            })
        });
        let mut values = Vec::new();
        for read in reads.collect::<Vec<_>>() {
            let result = read.await.unwrap().unwrap();
            values.push(result.result_rows()[0][0].clone());
        }
        assert_eq!(values, (0..6u64).map(Value::UInt).collect::<Vec<_>>());
        assert_eq!(native.available(), 2);
    }

    #[tokio::test]
    async fn shutdown_rejects_new_work() {
        let native = AsyncNative::new(&settings(1));
        native.shutdown();
        let source = ResponseBuffer::new(ChunkIter::new(Vec::<Bytes>::new()));
        let err = native.parse_response(source, QueryContext::default()).await.unwrap_err();
        assert!(matches!(err, ProtonError::StreamFailure(..)));
    }
}
