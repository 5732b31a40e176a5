use std::future::Future;
use tracing::{Level, event};

/// Default number of keys or documents sent to a store in one round-trip.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Drives `operation` over `items` in ordered chunks of at most `chunk_size`.
///
/// Chunks are issued one after another and their results concatenated in
/// input order. The first failing chunk stops the run: later chunks are never
/// issued and the partial aggregate is dropped. An empty input issues no
/// operation at all.
pub async fn run_batched<'a, T, R, E, F, Fut>(
    items: &'a [T],
    chunk_size: usize,
    mut operation: F,
) -> Result<Vec<R>, E>
where
    F: FnMut(&'a [T]) -> Fut,
    Fut: Future<Output = Result<Vec<R>, E>>,
{
    let chunk_size = chunk_size.max(1);
    let mut aggregate = Vec::with_capacity(items.len());

    for (index, chunk) in items.chunks(chunk_size).enumerate() {
        event!(
            Level::TRACE,
            chunk = index,
            size = chunk.len(),
            "issuing batch chunk"
        );
        let results = operation(chunk).await?;
        aggregate.extend(results);
    }

    Ok(aggregate)
}
