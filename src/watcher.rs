//! Watches a remote resource collection for changes, with error recovery.

use crate::api::{ApiError, ListFilter, ResourceApi, ResourceObject, WatchEvent};
use futures::{stream::BoxStream, Stream, StreamExt};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to perform initial object list: {0}")]
    InitialListFailed(#[source] ApiError),
    #[error("failed to start watching objects: {0}")]
    WatchStartFailed(#[source] ApiError),
    #[error("watch stream failed: {0}")]
    WatchFailed(#[source] ApiError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Synchronization events returned from the [`watcher`].
#[derive(Clone, Debug, PartialEq)]
pub enum Event<K> {
    /// An object was added or modified.
    Applied(K),
    /// An object was deleted.
    Deleted(K),
    /// The stream was re-listed, so `Deleted` events may have been missed.
    ///
    /// Should be used as a signal to replace the store contents atomically;
    /// any object previously `Applied` but missing from the snapshot must
    /// be assumed deleted.
    Restarted(Vec<K>),
}

/// The internal finite state machine driving the [`watcher`].
enum State<K: ResourceObject> {
    /// The next poll will start the initial LIST to get all existing objects.
    Empty,
    /// The initial LIST was successful, so move on to starting the watch.
    InitListed { version: String },
    /// The watch is in progress; from this point events stream through.
    ///
    /// If the stream is disrupted the error is propagated and the watch is
    /// restarted from the last seen version. If the version token has been
    /// compacted away we fall back to a full re-list via `Empty`.
    Watching {
        version: String,
        stream: BoxStream<'static, std::result::Result<WatchEvent<K>, ApiError>>,
    },
}

/// Progresses the watcher a single step, returning `(event, state)`.
///
/// This function should be trampolined: if `event == None` the function
/// should be called again until it returns a `Some`.
async fn step_trampolined<K, A>(
    api: &A,
    filter: &ListFilter,
    state: State<K>,
) -> (Option<Result<Event<K>>>, State<K>)
where
    K: ResourceObject,
    A: ResourceApi<K>,
{
    match state {
        State::Empty => match api.list(filter).await {
            Ok(list) => (Some(Ok(Event::Restarted(list.items))), State::InitListed {
                version: list.version,
            }),
            Err(err) => (Some(Err(Error::InitialListFailed(err))), State::Empty),
        },
        State::InitListed { version } => match api.watch(filter, &version).await {
            Ok(stream) => (None, State::Watching { version, stream }),
            Err(err) => (Some(Err(Error::WatchStartFailed(err))), State::InitListed {
                version,
            }),
        },
        State::Watching {
            version,
            mut stream,
        } => match stream.next().await {
            Some(Ok(WatchEvent::Added(obj) | WatchEvent::Modified(obj))) => {
                let version = obj
                    .resource_version()
                    .map_or(version, ToString::to_string);
                (Some(Ok(Event::Applied(obj))), State::Watching {
                    version,
                    stream,
                })
            }
            Some(Ok(WatchEvent::Deleted(obj))) => {
                let version = obj
                    .resource_version()
                    .map_or(version, ToString::to_string);
                (Some(Ok(Event::Deleted(obj))), State::Watching {
                    version,
                    stream,
                })
            }
            Some(Ok(WatchEvent::Expired)) => {
                // We have desynced from the remote collection and need to
                // start over with a fresh list.
                tracing::debug!(kind = %K::KIND, "watch version expired, re-listing");
                (None, State::Empty)
            }
            Some(Err(err)) => (Some(Err(Error::WatchFailed(err))), State::Watching {
                version,
                stream,
            }),
            None => (None, State::InitListed { version }),
        },
    }
}

/// Trampoline helper for [`step_trampolined`].
async fn step<K, A>(api: &A, filter: &ListFilter, mut state: State<K>) -> (Result<Event<K>>, State<K>)
where
    K: ResourceObject,
    A: ResourceApi<K>,
{
    loop {
        match step_trampolined(api, filter, state).await {
            (Some(result), new_state) => return (result, new_state),
            (None, new_state) => state = new_state,
        }
    }
}

/// Watches a remote resource collection continuously.
///
/// Performs an initial list (emitted as [`Event::Restarted`]), then follows
/// the watch stream and recovers it upon errors: a closed stream is
/// re-watched from the last seen version and a compacted version token
/// triggers a fresh list. Errors are propagated as items so the consumer
/// can apply its own pacing before the next poll; they never terminate the
/// stream.
pub fn watcher<K, A>(api: Arc<A>, filter: ListFilter) -> impl Stream<Item = Result<Event<K>>> + Send
where
    K: ResourceObject,
    A: ResourceApi<K> + 'static,
{
    futures::stream::unfold(
        (api, filter, State::Empty),
        |(api, filter, state)| async {
            let (event, state) = step(&*api, &filter, state).await;
            Some((event, (api, filter, state)))
        },
    )
}
