//! The outbound session controller.
//!
//! Drives convergence with one peer: ping short-circuit, guard
//! acquisition, the initial partition set, the drill-down loop, and the
//! final push of records the peer turned out to be missing.

use std::collections::HashSet;

use chrono::{DateTime, Months, Utc};

use axon_core::{
    release_epoch, Bulletin, Message, NewBulletin, NewMessage, NewUser, Period, StringRange, User,
};
use axon_core::period::week_start;
use axon_store::{InsertOutcome, Store, StoreExt};

use crate::engine;
use crate::error::Result;
use crate::guard::SyncGuard;
use crate::transport::SyncTransport;
use crate::wire::{HashedPeriod, HashedUsersRange, SyncRequest};

/// Tunables for a sync session.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Upper bound on drill-down rounds before giving up for this
    /// session. Divergence left behind is picked up by the next beacon.
    pub max_rounds: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self { max_rounds: 64 }
    }
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionOutcome {
    /// The peer's advertised full hash matched ours; nothing to do.
    #[default]
    AlreadyInSync,
    /// Another session already holds our guard.
    LocalBusy,
    /// The peer reported busy mid-session.
    PeerBusy,
    /// The drill-down reached quiescence.
    Converged,
    /// The round limit was hit before quiescence.
    RoundLimit,
}

/// What one session did.
#[derive(Debug, Clone, Default)]
pub struct SessionReport {
    pub outcome: SessionOutcome,
    pub rounds: usize,
    pub messages_received: usize,
    pub bulletins_received: usize,
    pub users_received: usize,
    pub messages_pushed: usize,
    pub bulletins_pushed: usize,
    pub users_pushed: usize,
}

/// The time partitions the first request covers, anchored to the Monday
/// of the current week and widening backwards: the running week, one
/// month, six months, two years, then everything back to the release
/// epoch. Steps that would precede the epoch collapse into it.
pub fn initial_periods(now: DateTime<Utc>) -> Vec<Period> {
    let epoch = release_epoch();
    let week = week_start(now);
    if week <= epoch {
        return vec![Period::new(epoch, now)];
    }

    let mut periods = vec![Period::new(week, now)];
    let mut prev = week;
    for months_back in [1u32, 6, 24] {
        let start = prev
            .checked_sub_months(Months::new(months_back))
            .unwrap_or(epoch);
        if start <= epoch {
            periods.push(Period::new(epoch, prev));
            return periods;
        }
        periods.push(Period::new(start, prev));
        prev = start;
    }
    periods.push(Period::new(epoch, prev));
    periods
}

/// The 35 single-character fingerprint intervals `['0','1')` through
/// `['y','z')`, covering the hex alphabet and then some.
pub fn fingerprint_ranges() -> Vec<StringRange> {
    let mut ranges = Vec::with_capacity(35);
    for c in b'0'..=b'9' {
        ranges.push(StringRange::new(
            (c as char).to_string(),
            ((c + 1) as char).to_string(),
        ));
    }
    for c in b'a'..=b'y' {
        ranges.push(StringRange::new(
            (c as char).to_string(),
            ((c + 1) as char).to_string(),
        ));
    }
    ranges
}

/// An outbound sync session against one peer.
pub struct SyncSession<'a, T: SyncTransport + ?Sized> {
    store: &'a dyn Store,
    guard: &'a SyncGuard,
    transport: &'a T,
    config: SyncConfig,
}

impl<'a, T: SyncTransport + ?Sized> SyncSession<'a, T> {
    pub fn new(store: &'a dyn Store, guard: &'a SyncGuard, transport: &'a T) -> Self {
        Self {
            store,
            guard,
            transport,
            config: SyncConfig::default(),
        }
    }

    pub fn with_config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    /// Run the session to quiescence (or abort).
    pub async fn run(&self, address: &str) -> Result<SessionReport> {
        let mut report = SessionReport::default();

        let ours = self.store.database_hashes().await?;
        let ping = self.transport.ping(address).await?;
        if ping.hash.full == ours.full {
            report.outcome = SessionOutcome::AlreadyInSync;
            return Ok(report);
        }

        let Some(_permit) = self.guard.permit() else {
            report.outcome = SessionOutcome::LocalBusy;
            return Ok(report);
        };

        tracing::info!(peer = %address, "starting sync session");

        let now = Utc::now();
        let periods = initial_periods(now);
        let ranges = fingerprint_ranges();

        let mut request = SyncRequest {
            message_ranges: hashed_periods(self.store.hash_message_periods(&periods).await?),
            bulletin_ranges: hashed_periods(self.store.hash_bulletin_periods(&periods).await?),
            users: hashed_user_ranges(self.store.hash_user_ranges(&ranges).await?),
        };

        // Ranges asked once per session; user partitions are not
        // subdivided by the protocol, so re-asking a still-mismatching
        // one would loop without progress.
        let mut requested_user_ranges: HashSet<(String, String)> = ranges
            .iter()
            .map(|r| (r.start.clone(), r.end.clone()))
            .collect();

        // Records the peer turned out to be missing, pushed after the loop.
        let mut push_messages: Vec<Message> = Vec::new();
        let mut pushed_message_ids: HashSet<String> = HashSet::new();
        let mut push_bulletins: Vec<Bulletin> = Vec::new();
        let mut pushed_bulletin_ids: HashSet<String> = HashSet::new();
        let mut push_users: Vec<User> = Vec::new();
        let mut pushed_user_fps: HashSet<String> = HashSet::new();

        loop {
            if report.rounds >= self.config.max_rounds {
                report.outcome = SessionOutcome::RoundLimit;
                break;
            }
            report.rounds += 1;

            let response = self.transport.sync(address, &request).await?;
            if response.is_busy {
                tracing::info!(peer = %address, "peer busy, aborting session");
                report.outcome = SessionOutcome::PeerBusy;
                return Ok(report);
            }

            // Users: ingest the peer's, queue ours it lacks.
            let plain_user_ranges: HashSet<(String, String)> = response
                .users
                .iter()
                .map(|ur| (ur.range.start.clone(), ur.range.end.clone()))
                .collect();
            for users_range in &response.users {
                let local = self.store.list_users(&users_range.range).await?;
                let peer_fps: HashSet<&str> = users_range
                    .users
                    .iter()
                    .map(|u| u.fingerprint.as_str())
                    .collect();
                for user in local {
                    if !peer_fps.contains(user.fingerprint.as_str())
                        && pushed_user_fps.insert(user.fingerprint.as_str().to_string())
                    {
                        push_users.push(user);
                    }
                }
                for user in &users_range.users {
                    if self.store.ingest_user(NewUser::from_wire(user)).await?
                        == InsertOutcome::Inserted
                    {
                        report.users_received += 1;
                    }
                }
            }

            // Messages: ingest the peer's, queue ours it lacks.
            for messages_period in &response.messages {
                let local = self.store.list_messages(&messages_period.period).await?;
                let peer_ids: HashSet<&str> = messages_period
                    .records
                    .iter()
                    .map(|m| m.id.as_str())
                    .collect();
                for message in local {
                    if !peer_ids.contains(message.id.as_str())
                        && pushed_message_ids.insert(message.id.as_str().to_string())
                    {
                        push_messages.push(message);
                    }
                }
                for message in &messages_period.records {
                    if self
                        .store
                        .ingest_message(NewMessage::from_wire(message))
                        .await?
                        == InsertOutcome::Inserted
                    {
                        report.messages_received += 1;
                    }
                }
            }

            // Bulletins: queue ours the peer lacks, then ingest the
            // peer's oldest-first so thread parents land before replies.
            let mut incoming: Vec<Bulletin> = Vec::new();
            for bulletins_period in &response.bulletins {
                let local = self.store.list_bulletins(&bulletins_period.period).await?;
                let peer_ids: HashSet<&str> = bulletins_period
                    .records
                    .iter()
                    .map(|b| b.id.as_str())
                    .collect();
                for bulletin in local {
                    if !peer_ids.contains(bulletin.id.as_str())
                        && pushed_bulletin_ids.insert(bulletin.id.as_str().to_string())
                    {
                        push_bulletins.push(bulletin);
                    }
                }
                incoming.extend(bulletins_period.records.iter().cloned());
            }
            incoming.sort_by(|a, b| {
                a.created_at
                    .cmp(&b.created_at)
                    .then_with(|| a.id.cmp(&b.id))
            });
            for bulletin in &incoming {
                if self
                    .store
                    .ingest_bulletin(NewBulletin::from_wire(bulletin))
                    .await?
                    == InsertOutcome::Inserted
                {
                    report.bulletins_received += 1;
                }
            }

            // Build the next request from our own hashes over the
            // peer's refined sub-ranges; echoing the peer's hashes back
            // would compare equal on its side and stall the drill-down.
            let next_messages =
                engine::mismatching_message_ranges(self.store, &response.message_ranges).await?;
            let next_bulletins =
                engine::mismatching_bulletin_ranges(self.store, &response.bulletin_ranges).await?;

            let mut next_users = Vec::new();
            for user_range in &response.user_range_hashes {
                let key = (user_range.range.start.clone(), user_range.range.end.clone());

                // A mismatching range with no plain users means the peer
                // holds none (or too many) there; whatever we hold in
                // that range is missing on its side, so queue it.
                if !plain_user_ranges.contains(&key) {
                    for user in self.store.list_users(&user_range.range).await? {
                        if pushed_user_fps.insert(user.fingerprint.as_str().to_string()) {
                            push_users.push(user);
                        }
                    }
                }

                if requested_user_ranges.contains(&key) {
                    continue;
                }
                let ours = self.store.hash_users(&user_range.range).await?;
                if ours != user_range.hash {
                    requested_user_ranges.insert(key);
                    next_users.push(HashedUsersRange {
                        range: user_range.range.clone(),
                        hash: ours,
                    });
                }
            }

            request = SyncRequest {
                message_ranges: next_messages,
                bulletin_ranges: next_bulletins,
                users: next_users,
            };
            if request.is_empty() {
                report.outcome = SessionOutcome::Converged;
                break;
            }
        }

        // Push phase: send the peer what it was missing, oldest first.
        push_messages.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        push_bulletins.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });

        if !push_users.is_empty() {
            self.transport.push_users(address, &push_users).await?;
            report.users_pushed = push_users.len();
        }
        if !push_messages.is_empty() {
            self.transport
                .push_messages(address, &push_messages)
                .await?;
            report.messages_pushed = push_messages.len();
        }
        if !push_bulletins.is_empty() {
            self.transport
                .push_bulletins(address, &push_bulletins)
                .await?;
            report.bulletins_pushed = push_bulletins.len();
        }

        tracing::info!(
            peer = %address,
            rounds = report.rounds,
            received = report.messages_received + report.bulletins_received + report.users_received,
            pushed = report.messages_pushed + report.bulletins_pushed + report.users_pushed,
            "sync session finished"
        );

        Ok(report)
    }
}

fn hashed_periods(pairs: Vec<(Period, String)>) -> Vec<HashedPeriod> {
    pairs
        .into_iter()
        .map(|(period, hash)| HashedPeriod { period, hash })
        .collect()
}

fn hashed_user_ranges(pairs: Vec<(StringRange, String)>) -> Vec<HashedUsersRange> {
    pairs
        .into_iter()
        .map(|(range, hash)| HashedUsersRange { range, hash })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    #[test]
    fn initial_periods_tile_epoch_to_now() {
        let now = at("2027-09-15T10:30:00Z");
        let periods = initial_periods(now);

        assert_eq!(periods.len(), 5);
        assert_eq!(periods.first().unwrap().end, Some(now));
        assert_eq!(periods.last().unwrap().start, Some(release_epoch()));

        // Contiguous, newest to oldest: each period's start is the next
        // period's end.
        for pair in periods.windows(2) {
            assert_eq!(pair[0].start, pair[1].end);
        }
    }

    #[test]
    fn initial_periods_first_range_starts_monday() {
        // 2027-09-15 is a Wednesday; its week starts Monday 2027-09-13.
        let now = at("2027-09-15T10:30:00Z");
        let periods = initial_periods(now);
        assert_eq!(periods[0].start, Some(at("2027-09-13T00:00:00Z")));
    }

    #[test]
    fn initial_periods_collapse_at_epoch() {
        // Early January 2025: everything before the running week
        // collapses into a single range starting at the epoch.
        let now = at("2025-01-08T12:00:00Z");
        let periods = initial_periods(now);

        assert_eq!(periods.last().unwrap().start, Some(release_epoch()));
        assert!(periods.len() < 5);
        for pair in periods.windows(2) {
            assert_eq!(pair[0].start, pair[1].end);
        }
    }

    #[test]
    fn fingerprint_ranges_cover_hex_alphabet() {
        let ranges = fingerprint_ranges();
        assert_eq!(ranges.len(), 35);
        assert_eq!(ranges[0], StringRange::new("0", "1"));
        assert_eq!(ranges[9], StringRange::new("9", ":"));
        assert_eq!(ranges[10], StringRange::new("a", "b"));
        assert_eq!(ranges[34], StringRange::new("y", "z"));

        // Every canonical fingerprint falls in exactly one range.
        let fp = "f3a0000000000000";
        let holding: Vec<_> = ranges
            .iter()
            .filter(|r| fp >= r.start.as_str() && fp < r.end.as_str())
            .collect();
        assert_eq!(holding.len(), 1);
    }
}
