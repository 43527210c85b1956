//! The responder half of the protocol: a pure function from a peer's
//! hashed partitions and the local store to plain records plus refined
//! sub-partitions.
//!
//! The engine holds no state and takes no locks; the caller (HTTP
//! handler or loopback transport) checks the sync guard and returns the
//! busy response without ever reaching this code.

use chrono::Utc;

use axon_core::Period;
use axon_store::{Store, StoreExt};

use crate::error::Result;
use crate::wire::{
    BulletinsPeriod, HashedPeriod, HashedUsersRange, MessagesPeriod, SyncRequest, SyncResponse,
    UsersRange,
};
use crate::AGGRESSIVE_SPLIT_FACTOR;

/// Compute the response to one sync round.
///
/// For each requested partition whose local hash differs from the
/// requester's, the responder either ships the partition's records
/// plainly or returns refined hashed sub-partitions for the requester
/// to compare next:
///
/// - **Messages** walk mismatching ranges in ascending order of local
///   record count, accumulating plain records while the running total
///   stays under `max_batch`. Small diverging ranges ship first, so one
///   response carries as many resolved ranges as the budget allows
///   before any single large range exhausts it. Ranges that cannot ship
///   are split; a range that merely lost the budget race is returned
///   unchanged and ships in a later round.
/// - **Bulletins** ship plainly for every mismatch; bulletin volume is
///   expected to stay low and the protocol leaves them unbudgeted.
/// - **Users** always return the local hash for a mismatching range,
///   and additionally ship the range's users plainly when they fit the
///   batch budget, so the requester converges in one round.
pub async fn respond(
    store: &dyn Store,
    request: &SyncRequest,
    max_batch: u64,
) -> Result<SyncResponse> {
    let now = Utc::now();

    let mut response = SyncResponse {
        hash: store.database_hashes().await?,
        ..SyncResponse::default()
    };

    // Messages: find ranges whose local hash disagrees with the peer's.
    let mut mismatching: Vec<(Period, String)> = Vec::new();
    for theirs in &request.message_ranges {
        let ours = store.hash_messages(&theirs.period).await?;
        if ours != theirs.hash {
            mismatching.push((theirs.period, ours));
        }
    }
    tracing::debug!(
        requested = request.message_ranges.len(),
        mismatching = mismatching.len(),
        "compared message ranges"
    );

    let mut counted = Vec::with_capacity(mismatching.len());
    for (period, hash) in mismatching {
        let count = store.count_messages(&period).await?;
        counted.push((period, hash, count));
    }
    counted.sort_by_key(|(_, _, count)| *count);

    let mut total_plain = 0u64;
    for (period, hash, count) in counted {
        if total_plain + count < max_batch {
            let records = store.list_messages(&period).await?;
            response.messages.push(MessagesPeriod { period, records });
            total_plain += count;
            continue;
        }

        // Plain transfer does not fit. A range at or past the aggressive
        // threshold splits into roughly batch-sized parts; a range that
        // could never fit the budget on its own splits in two; anything
        // smaller is deferred unchanged until the budget frees up.
        if count >= max_batch * AGGRESSIVE_SPLIT_FACTOR {
            let parts = count.div_ceil(max_batch).max(2) as usize;
            tracing::debug!(count, parts, "splitting oversized message range");
            for sub in period.split(parts, now) {
                let hash = store.hash_messages(&sub).await?;
                response
                    .message_ranges
                    .push(HashedPeriod { period: sub, hash });
            }
        } else if count >= max_batch {
            for sub in period.split(2, now) {
                let hash = store.hash_messages(&sub).await?;
                response
                    .message_ranges
                    .push(HashedPeriod { period: sub, hash });
            }
        } else {
            response.message_ranges.push(HashedPeriod { period, hash });
        }
    }

    // Bulletins: every mismatching range ships plainly.
    for theirs in &request.bulletin_ranges {
        let ours = store.hash_bulletins(&theirs.period).await?;
        if ours != theirs.hash {
            let records = store.list_bulletins(&theirs.period).await?;
            response.bulletins.push(BulletinsPeriod {
                period: theirs.period,
                records,
            });
        }
    }

    // Users: return our hash for each mismatch, and the records too when
    // the range is small enough to resolve immediately.
    for theirs in &request.users {
        let ours = store.hash_users(&theirs.range).await?;
        if ours == theirs.hash {
            continue;
        }
        response.user_range_hashes.push(HashedUsersRange {
            range: theirs.range.clone(),
            hash: ours,
        });

        let count = store.count_users(&theirs.range).await?;
        if count > 0 && count <= max_batch {
            let users = store.list_users(&theirs.range).await?;
            response.users.push(UsersRange {
                range: theirs.range.clone(),
                users,
            });
        }
    }

    Ok(response)
}

/// Hash a set of periods against the local store and keep only those
/// whose hash differs from the peer's. Used by the session controller to
/// build the next drill-down request from its own hashes.
pub async fn mismatching_message_ranges(
    store: &dyn Store,
    theirs: &[HashedPeriod],
) -> Result<Vec<HashedPeriod>> {
    let periods: Vec<Period> = theirs.iter().map(|hp| hp.period).collect();
    let ours = store.hash_message_periods(&periods).await?;
    Ok(ours
        .into_iter()
        .zip(theirs)
        .filter(|((_, our_hash), their)| *our_hash != their.hash)
        .map(|((period, hash), _)| HashedPeriod { period, hash })
        .collect())
}

/// Same as [`mismatching_message_ranges`], over bulletins.
pub async fn mismatching_bulletin_ranges(
    store: &dyn Store,
    theirs: &[HashedPeriod],
) -> Result<Vec<HashedPeriod>> {
    let periods: Vec<Period> = theirs.iter().map(|hp| hp.period).collect();
    let ours = store.hash_bulletin_periods(&periods).await?;
    Ok(ours
        .into_iter()
        .zip(theirs)
        .filter(|((_, our_hash), their)| *our_hash != their.hash)
        .map(|((period, hash), _)| HashedPeriod { period, hash })
        .collect())
}
