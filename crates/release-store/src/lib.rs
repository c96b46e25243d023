/*!
The release record store (§4.2): a single durable [`Release`](file_types::Release)
that is "active" (`phase != PUBLISHED`) at all times, guarded by the nine-state
transition table encoded on [`ReleasePhase`].

Grounded on the same heed/LMDB approach as `file-store`, scaled down to the
store's actual shape: one row per release plus a one-entry pointer database
naming the current active row, rather than secondary bitmap indices (a
release store has nothing worth intersecting a filter against).
*/

#[cfg(test)]
mod tests;

use std::path::Path;

use file_types::release::{Release, ReleaseFiles, ReleasePhase};
use file_types::{Code, Error, Result};
use heed::types::{SerdeJson, Str};
use heed::{Database, Env, EnvOpenOptions, RwTxn};
use time::OffsetDateTime;

const NUMBER_OF_DATABASES: u32 = 2;
const ACTIVE_KEY: &str = "active";

mod db_name {
    pub const RELEASES: &str = "releases";
    pub const META: &str = "meta";
}

/// Result of a `begin_*` transition attempt (§4.2): when `updated` is
/// `false`, `release` is the unchanged active release and `message`
/// explains why the transition was refused.
#[derive(Debug, Clone)]
pub struct BeginResult {
    pub release: Release,
    pub previous_phase: ReleasePhase,
    pub updated: bool,
    pub message: String,
}

#[derive(Clone)]
pub struct ReleaseStore {
    env: Env,
    releases: Database<Str, SerdeJson<Release>>,
    meta: Database<Str, Str>,
}

impl ReleaseStore {
    /// Opens the store, bootstrapping a fresh `CREATED` release if none
    /// exists yet so the "exactly one active release" invariant holds from
    /// the first call onward.
    pub fn open(path: impl AsRef<Path>, map_size: usize, now: OffsetDateTime) -> Result<Self> {
        std::fs::create_dir_all(&path).map_err(|e| Error::fatal(e.to_string()))?;
        let env = unsafe { EnvOpenOptions::new().map_size(map_size).max_dbs(NUMBER_OF_DATABASES).open(path) }
            .map_err(|e| Error::fatal(format!("failed to open release store environment: {e}")))?;

        let mut wtxn = env.write_txn().map_err(heed_err)?;
        let releases = env.create_database(&mut wtxn, Some(db_name::RELEASES)).map_err(heed_err)?;
        let meta = env.create_database(&mut wtxn, Some(db_name::META)).map_err(heed_err)?;
        wtxn.commit().map_err(heed_err)?;

        let store = ReleaseStore { env, releases, meta };
        if store.get_active_release()?.is_none() {
            store.spawn_active_release(now)?;
        }
        Ok(store)
    }

    fn spawn_active_release(&self, now: OffsetDateTime) -> Result<Release> {
        let id = uuid::Uuid::now_v7().to_string();
        let release = Release::created(id.clone(), now);
        let mut wtxn = self.env.write_txn().map_err(heed_err)?;
        self.releases.put(&mut wtxn, &id, &release).map_err(heed_err)?;
        self.meta.put(&mut wtxn, ACTIVE_KEY, &id).map_err(heed_err)?;
        wtxn.commit().map_err(heed_err)?;
        Ok(release)
    }

    pub fn get_active_release(&self) -> Result<Option<Release>> {
        let rtxn = self.env.read_txn().map_err(heed_err)?;
        let Some(id) = self.meta.get(&rtxn, ACTIVE_KEY).map_err(heed_err)? else { return Ok(None) };
        self.releases.get(&rtxn, id).map_err(heed_err)
    }

    fn require_active_release(&self) -> Result<Release> {
        self.get_active_release()?.ok_or_else(|| Error::fatal("no active release exists"))
    }

    pub fn get_release_by_id(&self, id: &str) -> Result<Option<Release>> {
        let rtxn = self.env.read_txn().map_err(heed_err)?;
        self.releases.get(&rtxn, id).map_err(heed_err)
    }

    pub fn get_releases(&self) -> Result<Vec<Release>> {
        let rtxn = self.env.read_txn().map_err(heed_err)?;
        let mut out: Vec<Release> = self
            .releases
            .iter(&rtxn)
            .map_err(heed_err)?
            .map(|r| r.map(|(_, v)| v))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(heed_err)?;
        out.sort_by_key(|r| r.created_at);
        Ok(out)
    }

    /// Newest release by `createdAt`, irrespective of phase.
    pub fn get_latest_release(&self) -> Result<Option<Release>> {
        Ok(self.get_releases()?.into_iter().max_by_key(|r| r.created_at))
    }

    fn put(&self, wtxn: &mut RwTxn, release: &Release) -> Result<()> {
        self.releases.put(wtxn, &release.id, release).map_err(heed_err)
    }

    fn begin_transition(&self, target: ReleasePhase, clear: impl FnOnce(&mut Release)) -> Result<BeginResult> {
        let mut release = self.require_active_release()?;
        let previous_phase = release.phase;
        if !target.can_transition_from(previous_phase) {
            return Ok(BeginResult {
                release,
                previous_phase,
                updated: false,
                message: format!("cannot transition to {target:?} from {previous_phase:?}"),
            });
        }
        release.phase = target;
        clear(&mut release);
        let mut wtxn = self.env.write_txn().map_err(heed_err)?;
        self.put(&mut wtxn, &release)?;
        wtxn.commit().map_err(heed_err)?;
        Ok(BeginResult { release, previous_phase, updated: true, message: format!("transitioned to {target:?}") })
    }

    /// Clears `files`, `builtAt`, `calculatedAt`, `label`, `snapshot`,
    /// `error` (not `indices`, so a later build step can still clean up
    /// generations from a previous attempt).
    pub fn begin_calculating_active_release(&self) -> Result<BeginResult> {
        self.begin_transition(ReleasePhase::Calculating, |r| {
            r.files = ReleaseFiles::default();
            r.version = None;
            r.built_at = None;
            r.calculated_at = None;
            r.label = None;
            r.snapshot = None;
            r.error = None;
        })
    }

    pub fn finish_calculating_active_release(&self, now: OffsetDateTime) -> Result<Release> {
        self.finish_transition(ReleasePhase::Calculating, ReleasePhase::Calculated, |r| r.calculated_at = Some(now))
    }

    /// Clears `builtAt`, `label`, `snapshot`, `error`.
    pub fn begin_building_active_release(&self) -> Result<BeginResult> {
        self.begin_transition(ReleasePhase::Building, |r| {
            r.built_at = None;
            r.label = None;
            r.snapshot = None;
            r.error = None;
        })
    }

    pub fn finish_building_active_release(&self, now: OffsetDateTime) -> Result<Release> {
        self.finish_transition(ReleasePhase::Building, ReleasePhase::Built, |r| r.built_at = Some(now))
    }

    /// Clears `error`.
    pub fn begin_publishing_active_release(&self) -> Result<BeginResult> {
        self.begin_transition(ReleasePhase::Publishing, |r| r.error = None)
    }

    /// On success, stamps `publishedAt` and immediately spawns the next
    /// `CREATED` release so the "exactly one active release" invariant
    /// keeps holding once this one leaves the active set.
    pub fn finish_publishing_active_release(&self, now: OffsetDateTime) -> Result<Release> {
        let published = self.finish_transition(ReleasePhase::Publishing, ReleasePhase::Published, |r| r.published_at = Some(now))?;
        let next_id = uuid::Uuid::now_v7().to_string();
        let next = Release::created(next_id.clone(), now);
        let mut wtxn = self.env.write_txn().map_err(heed_err)?;
        self.releases.put(&mut wtxn, &next_id, &next).map_err(heed_err)?;
        self.meta.put(&mut wtxn, ACTIVE_KEY, &next_id).map_err(heed_err)?;
        wtxn.commit().map_err(heed_err)?;
        Ok(published)
    }

    fn finish_transition(&self, expected: ReleasePhase, target: ReleasePhase, stamp: impl FnOnce(&mut Release)) -> Result<Release> {
        let mut release = self.require_active_release()?;
        if release.phase != expected {
            return Err(Error::state_conflict(format!(
                "cannot finish {target:?}: active release is in {:?}, not {expected:?}",
                release.phase
            )));
        }
        release.phase = target;
        stamp(&mut release);
        let mut wtxn = self.env.write_txn().map_err(heed_err)?;
        self.put(&mut wtxn, &release)?;
        wtxn.commit().map_err(heed_err)?;
        Ok(release)
    }

    /// Maps a failure in the current `*ING` phase to its `ERROR_*`
    /// counterpart. Erroring from any other phase is itself an error.
    pub fn set_active_release_error(&self, message: impl Into<String>) -> Result<Release> {
        let mut release = self.require_active_release()?;
        let Some(error_phase) = release.phase.error_phase() else {
            return Err(Error::state_conflict(format!(
                "cannot record a release error while the active release is in {:?}",
                release.phase
            )));
        };
        release.phase = error_phase;
        release.error = Some(message.into());
        let mut wtxn = self.env.write_txn().map_err(heed_err)?;
        self.put(&mut wtxn, &release)?;
        wtxn.commit().map_err(heed_err)?;
        Ok(release)
    }

    pub fn update_active_release_files(&self, files: ReleaseFiles) -> Result<Release> {
        let mut release = self.require_active_release()?;
        release.set_files(files);
        let mut wtxn = self.env.write_txn().map_err(heed_err)?;
        self.put(&mut wtxn, &release)?;
        wtxn.commit().map_err(heed_err)?;
        Ok(release)
    }

    pub fn set_active_release_label(&self, label: impl Into<String>) -> Result<Release> {
        self.mutate_active(|r| r.label = Some(label.into()))
    }

    pub fn set_active_release_indices(&self, indices: Vec<String>) -> Result<Release> {
        self.mutate_active(|r| r.indices = indices)
    }

    pub fn set_active_release_snapshot(&self, snapshot: impl Into<String>) -> Result<Release> {
        self.mutate_active(|r| r.snapshot = Some(snapshot.into()))
    }

    fn mutate_active(&self, f: impl FnOnce(&mut Release)) -> Result<Release> {
        let mut release = self.require_active_release()?;
        f(&mut release);
        let mut wtxn = self.env.write_txn().map_err(heed_err)?;
        self.put(&mut wtxn, &release)?;
        wtxn.commit().map_err(heed_err)?;
        Ok(release)
    }
}

fn heed_err(e: impl std::fmt::Display) -> Error {
    Error::new(Code::Fatal, e.to_string())
}
