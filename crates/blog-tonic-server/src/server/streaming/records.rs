use crate::server::store::RecordCursor;
use blog_tonic_core::{Error, proto::ListBlogResponse};
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tonic::Status;

/// Drains a record cursor into the response channel of a `ListBlog` call.
///
/// Records are forwarded one message per record, in cursor order, as soon as
/// they are read. The cursor is owned by this function and dropped on return,
/// which releases it on every exit path.
///
/// # Arguments
///
/// - `cursor`: Open cursor over the collection.
/// - `resp_tx`: Channel feeding the gRPC response stream.
/// - `shutdown`: Cancelled when the server gives up on draining in-flight
///   calls.
///
/// # Behavior
///
/// - Returns the number of records sent once the cursor is exhausted.
/// - On a cursor or decode error, makes a best effort to send the error as
///   the final stream item and returns it. Records already sent stay sent.
/// - If the client disconnects, stops reading and returns
///   [`Error::RequestCancelled`].
/// - If `shutdown` fires, including while blocked on a full channel, queues
///   `UNAVAILABLE` if there is room and returns [`Error::ServiceShutdown`].
pub async fn feed_records(
    mut cursor: RecordCursor,
    resp_tx: mpsc::Sender<Result<ListBlogResponse, Status>>,
    shutdown: CancellationToken,
) -> blog_tonic_core::Result<u64> {
    let mut sent = 0;

    loop {
        let next = tokio::select! {
            biased;
            () = shutdown.cancelled() => return Err(end_with_shutdown(&resp_tx)),
            () = resp_tx.closed() => return Err(Error::RequestCancelled),
            next = cursor.next() => next,
        };

        match next {
            None => return Ok(sent),
            Some(Ok(record)) => {
                let msg = ListBlogResponse {
                    blog: Some(record.into()),
                };
                // A consumer that stops reading fills the channel; the send
                // must still give way to shutdown.
                tokio::select! {
                    biased;
                    () = shutdown.cancelled() => return Err(end_with_shutdown(&resp_tx)),
                    res = resp_tx.send(Ok(msg)) => {
                        if res.is_err() {
                            return Err(Error::RequestCancelled);
                        }
                    }
                }
                sent += 1;
            }
            Some(Err(e)) => {
                let err = Error::from(e);
                tokio::select! {
                    biased;
                    () = shutdown.cancelled() => return Err(end_with_shutdown(&resp_tx)),
                    res = resp_tx.send(Err(err.clone().into())) => {
                        if res.is_err() {
                            tracing::warn!("Failed to forward err: client disconnected");
                        }
                    }
                }
                return Err(err);
            }
        }
    }
}

/// Queues `UNAVAILABLE` as the final stream item without waiting for room in
/// the channel.
fn end_with_shutdown(resp_tx: &mpsc::Sender<Result<ListBlogResponse, Status>>) -> Error {
    if resp_tx.try_send(Err(Error::ServiceShutdown.into())).is_err() {
        tracing::debug!("Dropped final shutdown status: stream full or closed");
    }
    Error::ServiceShutdown
}
