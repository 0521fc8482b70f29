//! Feeds an [`ObjectCache`] from a Kubernetes watch

use std::fmt::Debug;
use std::sync::Arc;

use futures::{StreamExt, TryStreamExt};
use kube::runtime::watcher::{self, Event};
use kube::runtime::WatchStreamExt;
use kube::{Api, Resource};
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use super::ObjectCache;

/// Watcher timeout (seconds), below the client read timeout so idle watches
/// are closed by the API server first.
pub const WATCH_TIMEOUT_SECS: u32 = 25;

/// Mirror `api` into `cache` until the watch stream ends.
///
/// The initial listing is buffered and swapped in as a whole, after which the
/// cache is marked ready.
pub async fn run<K>(api: Api<K>, cache: Arc<ObjectCache<K>>, kind: &'static str)
where
    K: Resource + Clone + Debug + DeserializeOwned + Send + Sync + 'static,
{
    info!(kind, "Starting informer");

    let mut initial: Vec<K> = Vec::new();
    let mut stream = watcher::watcher(api, watcher::Config::default().timeout(WATCH_TIMEOUT_SECS))
        .default_backoff()
        .boxed();

    loop {
        match stream.try_next().await {
            Ok(Some(event)) => match event {
                Event::Init => initial.clear(),
                Event::InitApply(obj) => initial.push(obj),
                Event::InitDone => {
                    let count = initial.len();
                    cache.replace(std::mem::take(&mut initial));
                    cache.mark_ready();
                    debug!(kind, count, "Informer resynced");
                }
                Event::Apply(obj) => cache.apply(obj),
                Event::Delete(obj) => cache.delete(&obj),
            },
            Ok(None) => break,
            Err(e) => {
                warn!(kind, error = %e, "Watch error, backing off");
            }
        }
    }

    info!(kind, "Informer stopped");
}
