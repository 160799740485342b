use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};

use tokio_util::sync::CancellationToken;

use stowage_core::{
    percent_complete, Error, ObjectLocation, Part, PartPolicy, Result, UploadSession,
};

use crate::source::UploadFile;
use crate::transport::UploadTransport;

/// Called with the overall percent complete of one upload.
pub type ProgressFn<'a> = &'a (dyn Fn(u8) + Send + Sync);

/// Run `fut` unless `cancel` fires first, in which case `fut` is dropped.
async fn cancellable<F, T>(cancel: &CancellationToken, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled),
        result = fut => result,
    }
}

/// Turns bytes sent into percentages for one upload, passing on only values that raise the last
/// one reported.
struct ProgressReporter<'a> {
    size: u64,
    last: AtomicU8,
    on_progress: ProgressFn<'a>,
}

impl<'a> ProgressReporter<'a> {
    fn new(size: u64, on_progress: ProgressFn<'a>) -> Self {
        Self {
            size,
            last: AtomicU8::new(0),
            on_progress,
        }
    }

    fn report(&self, done: u64) {
        let percent = percent_complete(done, self.size);
        if self.last.fetch_max(percent, Ordering::SeqCst) < percent {
            (self.on_progress)(percent);
        }
    }

    fn finish(&self) {
        if self.last.swap(100, Ordering::SeqCst) < 100 {
            (self.on_progress)(100);
        }
    }
}

/// Uploads one file at a time as a multipart upload: initiate, then every part in ascending
/// order (authorize, transmit), then complete. Any failure after initiate releases the session
/// with a best-effort abort before the failure is returned. Nothing is retried.
pub struct Uploader<T> {
    transport: T,
    policy: PartPolicy,
}

impl<T: UploadTransport> Uploader<T> {
    pub fn new(transport: T) -> Self {
        Self::with_policy(transport, PartPolicy::default())
    }

    pub fn with_policy(transport: T, policy: PartPolicy) -> Self {
        Self { transport, policy }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn policy(&self) -> &PartPolicy {
        &self.policy
    }

    /// Upload `file`, reporting overall progress through `on_progress`.
    ///
    /// Progress never decreases and reaches exactly 100 once the object is assembled. Firing
    /// `cancel` stops the step in flight and takes the same abort path as a failure, surfacing
    /// [`Error::Cancelled`].
    pub async fn upload(
        &self,
        file: &UploadFile,
        on_progress: ProgressFn<'_>,
        cancel: &CancellationToken,
    ) -> Result<ObjectLocation> {
        let parts = self.policy.plan(file.size())?;

        let session_id = cancellable(
            cancel,
            self.transport.initiate(file.name(), file.content_type()),
        )
        .await?;
        tracing::debug!(
            "started upload {session_id} of {} in {} parts",
            file.name(),
            parts.len()
        );

        let mut session = UploadSession::new(session_id, file.name(), file.content_type());
        let reporter = ProgressReporter::new(file.size(), on_progress);

        match self
            .upload_parts(file, &parts, &mut session, &reporter, cancel)
            .await
        {
            Ok(location) => {
                reporter.finish();
                tracing::info!("uploaded {} to {location}", file.name());
                Ok(location)
            }
            Err(e) => {
                self.abort(&session, &e).await;
                Err(e)
            }
        }
    }

    async fn upload_parts(
        &self,
        file: &UploadFile,
        parts: &[Part],
        session: &mut UploadSession,
        reporter: &ProgressReporter<'_>,
        cancel: &CancellationToken,
    ) -> Result<ObjectLocation> {
        for part in parts {
            let target = cancellable(
                cancel,
                self.transport
                    .authorize_part(session.key(), session.id(), part.number),
            )
            .await?;

            let body = file.part_body(part).await?;
            let tick = |sent: u64| reporter.report(part.offset + sent.min(part.length));
            let e_tag = cancellable(
                cancel,
                self.transport.transmit(&target, part, body, &tick),
            )
            .await?
            .ok_or(Error::Integrity(part.number))?;

            reporter.report(part.end());
            session.record_part(part.number, e_tag)?;
        }

        cancellable(
            cancel,
            self.transport
                .complete(session.key(), session.id(), session.parts()),
        )
        .await
    }

    async fn abort(&self, session: &UploadSession, cause: &Error) {
        tracing::warn!(
            "upload {} of {} failed, aborting: {cause}",
            session.id(),
            session.key()
        );
        if let Err(e) = self.transport.abort(session.key(), session.id()).await {
            tracing::warn!("failed to abort upload {}: {e}", session.id());
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use rstest::*;

    use stowage_core::CompletedPart;

    use super::*;
    use crate::testing::{small_policy, Call, FakeTransport, KIB};

    struct Recorder(Mutex<Vec<u8>>);

    impl Recorder {
        fn new() -> Self {
            Self(Mutex::new(Vec::new()))
        }

        fn record(&self, percent: u8) {
            self.0.lock().unwrap().push(percent);
        }

        fn values(&self) -> Vec<u8> {
            self.0.lock().unwrap().clone()
        }
    }

    fn file(size: usize) -> UploadFile {
        UploadFile::from_bytes("public/big.bin", vec![7u8; size])
    }

    async fn run(
        transport: FakeTransport,
        size: usize,
    ) -> (Uploader<FakeTransport>, Result<ObjectLocation>, Vec<u8>) {
        let uploader = Uploader::with_policy(transport, small_policy());
        let recorder = Recorder::new();
        let on_progress = |p: u8| recorder.record(p);
        let result = uploader
            .upload(&file(size), &on_progress, &CancellationToken::new())
            .await;
        let values = recorder.values();
        (uploader, result, values)
    }

    #[tokio::test]
    async fn three_part_upload_reports_smooth_progress() {
        let (uploader, result, progress) = run(FakeTransport::default(), 1200 * KIB).await;
        let calls = uploader.transport().calls();

        assert_eq!(result.unwrap().as_str(), "fake:///public/big.bin");
        assert_eq!(
            calls.iter().filter(|c| matches!(c, Call::Authorize(_))).count(),
            3
        );
        let lengths: Vec<usize> = calls
            .iter()
            .filter_map(|c| match c {
                Call::Transmit(_, len) => Some(*len),
                _ => None,
            })
            .collect();
        assert_eq!(lengths, vec![500 * KIB, 500 * KIB, 200 * KIB]);

        assert!(progress.contains(&42));
        assert!(progress.contains(&83));
        assert!(progress.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(progress.last(), Some(&100));
        assert_eq!(progress.iter().filter(|p| **p == 100).count(), 1);
    }

    #[tokio::test]
    async fn completion_receives_ascending_tokens() {
        let (uploader, result, _) = run(FakeTransport::default(), 1200 * KIB).await;
        result.unwrap();

        let completed = uploader
            .transport()
            .calls()
            .into_iter()
            .find_map(|c| match c {
                Call::Complete(parts) => Some(parts),
                _ => None,
            })
            .unwrap();
        let expected: Vec<CompletedPart> = (1..=3)
            .map(|n| CompletedPart {
                part_number: n,
                e_tag: FakeTransport::e_tag(n),
            })
            .collect();
        assert_eq!(completed, expected);
    }

    #[tokio::test]
    async fn empty_files_never_reach_the_network() {
        let (uploader, result, progress) = run(FakeTransport::default(), 0).await;
        assert!(matches!(result, Err(Error::Validation(_))));
        assert!(uploader.transport().calls().is_empty());
        assert!(progress.is_empty());
    }

    #[tokio::test]
    async fn initiate_failure_is_not_aborted() {
        let transport = FakeTransport {
            fail_initiate: true,
            ..Default::default()
        };
        let (uploader, result, _) = run(transport, 10 * KIB).await;
        assert!(matches!(result, Err(Error::Backend(_))));
        assert_eq!(uploader.transport().aborts(), 0);
    }

    #[rstest]
    #[case::authorize_first(FakeTransport { fail_authorize: Some(1), ..Default::default() })]
    #[case::authorize_last(FakeTransport { fail_authorize: Some(3), ..Default::default() })]
    #[case::transmit_second(FakeTransport { fail_transmit: Some(2), ..Default::default() })]
    #[case::missing_token(FakeTransport { missing_etag: Some(2), ..Default::default() })]
    #[case::complete(FakeTransport { fail_complete: true, ..Default::default() })]
    #[tokio::test]
    async fn failures_after_initiate_abort_once(#[case] transport: FakeTransport) {
        let (uploader, result, _) = run(transport, 1200 * KIB).await;
        let transport = uploader.transport();

        assert!(result.is_err());
        assert_eq!(transport.aborts(), 1);
        if !transport.fail_complete {
            assert_eq!(transport.completes(), 0);
        }
    }

    #[tokio::test]
    async fn authorize_failure_stops_before_transmitting() {
        let transport = FakeTransport {
            fail_authorize: Some(1),
            ..Default::default()
        };
        let (uploader, result, _) = run(transport, 1200 * KIB).await;
        assert!(matches!(result, Err(Error::Backend(_))));
        let calls = uploader.transport().calls();
        assert!(!calls.iter().any(|c| matches!(c, Call::Transmit(..))));
        assert_eq!(uploader.transport().completes(), 0);
    }

    #[tokio::test]
    async fn transport_failure_surfaces_the_original_error() {
        let transport = FakeTransport {
            fail_transmit: Some(2),
            fail_abort: true,
            ..Default::default()
        };
        let (uploader, result, progress) = run(transport, 1200 * KIB).await;
        match result {
            Err(Error::Transport(msg)) => assert!(msg.contains("part 2")),
            other => panic!("expected a transport error, got {other:?}"),
        }
        assert_eq!(uploader.transport().aborts(), 1);
        assert_eq!(uploader.transport().completes(), 0);
        assert_eq!(progress.last(), Some(&42));
    }

    #[tokio::test]
    async fn missing_token_is_an_integrity_error() {
        let transport = FakeTransport {
            missing_etag: Some(2),
            ..Default::default()
        };
        let (uploader, result, _) = run(transport, 1200 * KIB).await;
        assert_eq!(result.unwrap_err(), Error::Integrity(2));
        assert_eq!(uploader.transport().aborts(), 1);
    }

    #[tokio::test]
    async fn cancelled_before_start_does_nothing() {
        let uploader = Uploader::with_policy(FakeTransport::default(), small_policy());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = uploader
            .upload(&file(10 * KIB), &|_: u8| {}, &cancel)
            .await;
        assert_eq!(result.unwrap_err(), Error::Cancelled);
        assert!(uploader.transport().calls().is_empty());
    }

    #[tokio::test]
    async fn cancelling_mid_transmission_aborts_the_session() {
        let transport = FakeTransport {
            hang_transmit: Some(2),
            ..Default::default()
        };
        let uploader = Uploader::with_policy(transport, small_policy());
        let cancel = CancellationToken::new();

        let source = file(1200 * KIB);
        let on_progress = |_: u8| {};
        let upload = uploader.upload(&source, &on_progress, &cancel);
        let canceller = async {
            uploader.transport().wait_for_transmit(2).await;
            cancel.cancel();
        };
        let (result, _) = tokio::join!(upload, canceller);

        assert_eq!(result.unwrap_err(), Error::Cancelled);
        assert_eq!(uploader.transport().aborts(), 1);
        assert_eq!(uploader.transport().completes(), 0);
    }
}
