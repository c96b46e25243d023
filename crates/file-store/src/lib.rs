/*!
The file record store (§4.1): durable [`File`](file_types::File) records
keyed by `objectId`, with an auto-assigned monotonic `fileId`, optimistic
concurrency on bulk updates, and set-membership filtering over programs,
donors, analyses and object ids.

Grounded on `index-scheduler`'s `queue::tasks` module: one primary LMDB
database keyed by a big-endian `u32`, plus one `RoaringBitmap`-valued
secondary database per filterable attribute so that filter intersections
stay cheap without scanning every record.
*/

mod codec;
mod filter_eval;
mod iter;
#[cfg(test)]
mod tests;

use std::path::Path;

use file_types::file::NewFile;
use file_types::{Code, EmbargoStage, Error, File, FileFilter, FileId, Result, ReleaseState, SongPublishStatus};
use heed::types::{SerdeJson, Str, U32};
use heed::{byteorder::BE, Database, Env, EnvOpenOptions, RoTxn, RwTxn};
use roaring::RoaringBitmap;
use time::OffsetDateTime;

pub use crate::iter::FileIter;
use crate::codec::RoaringBitmapCodec;

type BEU32 = U32<BE>;

const NUMBER_OF_DATABASES: u32 = 6;

mod db_name {
    pub const ALL_FILES: &str = "all-files";
    pub const BY_OBJECT_ID: &str = "by-object-id";
    pub const BY_PROGRAM: &str = "by-program";
    pub const BY_DONOR: &str = "by-donor";
    pub const BY_ANALYSIS: &str = "by-analysis";
    pub const COUNTERS: &str = "counters";
}

const NEXT_FILE_ID_KEY: &str = "next-file-id";

/// Fields an `UpdateBulk` / release-state mutation is allowed to touch.
#[derive(Debug, Clone, Default)]
pub struct ReleaseProperties {
    pub embargo_stage: Option<EmbargoStage>,
    pub release_state: Option<ReleaseState>,
    pub embargo_start: Option<Option<OffsetDateTime>>,
}

#[derive(Debug, Clone, Default)]
pub struct AdminControlUpdate {
    pub admin_promote: Option<Option<EmbargoStage>>,
    pub admin_demote: Option<Option<EmbargoStage>>,
    pub admin_hold: Option<bool>,
    pub clinical_exemption: Option<Option<file_types::file::ClinicalExemptionReason>>,
}

#[derive(Debug, Clone, Default)]
pub struct PublishStatusUpdate {
    pub status: Option<SongPublishStatus>,
    pub first_published: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, Default)]
pub struct BulkUpdate {
    pub release: ReleaseProperties,
    pub admin: AdminControlUpdate,
    pub publish: PublishStatusUpdate,
}

#[derive(Clone)]
pub struct FileStore {
    env: Env,
    all_files: Database<BEU32, SerdeJson<File>>,
    by_object_id: Database<Str, BEU32>,
    by_program: Database<Str, RoaringBitmapCodec>,
    by_donor: Database<Str, RoaringBitmapCodec>,
    by_analysis: Database<Str, RoaringBitmapCodec>,
    counters: Database<Str, BEU32>,
}

impl FileStore {
    pub fn open(path: impl AsRef<Path>, map_size: usize) -> Result<Self> {
        std::fs::create_dir_all(&path).map_err(|e| Error::fatal(e.to_string()))?;
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(map_size)
                .max_dbs(NUMBER_OF_DATABASES)
                .open(path)
        }
        .map_err(|e| Error::fatal(format!("failed to open file store environment: {e}")))?;

        let mut wtxn = env.write_txn().map_err(heed_err)?;
        let all_files = env.create_database(&mut wtxn, Some(db_name::ALL_FILES)).map_err(heed_err)?;
        let by_object_id = env.create_database(&mut wtxn, Some(db_name::BY_OBJECT_ID)).map_err(heed_err)?;
        let by_program = env.create_database(&mut wtxn, Some(db_name::BY_PROGRAM)).map_err(heed_err)?;
        let by_donor = env.create_database(&mut wtxn, Some(db_name::BY_DONOR)).map_err(heed_err)?;
        let by_analysis = env.create_database(&mut wtxn, Some(db_name::BY_ANALYSIS)).map_err(heed_err)?;
        let counters = env.create_database(&mut wtxn, Some(db_name::COUNTERS)).map_err(heed_err)?;
        wtxn.commit().map_err(heed_err)?;

        Ok(FileStore { env, all_files, by_object_id, by_program, by_donor, by_analysis, counters })
    }

    fn next_file_id(&self, wtxn: &mut RwTxn) -> Result<FileId> {
        let next = self.counters.get(wtxn, NEXT_FILE_ID_KEY).map_err(heed_err)?.unwrap_or(1);
        self.counters.put(wtxn, NEXT_FILE_ID_KEY, &(next + 1)).map_err(heed_err)?;
        Ok(FileId::new(next as u64))
    }

    fn index_file(&self, wtxn: &mut RwTxn, file: &File) -> Result<()> {
        self.by_object_id.put(wtxn, &file.object_id, &(file.file_id.value() as u32)).map_err(heed_err)?;
        add_to_bitmap(wtxn, self.by_program, &file.program_id, file.file_id)?;
        add_to_bitmap(wtxn, self.by_donor, &file.donor_id, file.file_id)?;
        add_to_bitmap(wtxn, self.by_analysis, &file.analysis_id, file.file_id)?;
        self.all_files.put(wtxn, &(file.file_id.value() as u32), file).map_err(heed_err)?;
        Ok(())
    }

    /// At-most-one create per `objectId`: returns the existing record on
    /// conflict instead of erroring, so concurrent ingesters racing to
    /// observe the same object for the first time converge on one row.
    pub fn get_or_create_by_object_id(&self, new: NewFile) -> Result<File> {
        let mut wtxn = self.env.write_txn().map_err(heed_err)?;
        if let Some(id) = self.by_object_id.get(&wtxn, &new.object_id).map_err(heed_err)? {
            let file = self.all_files.get(&wtxn, &id).map_err(heed_err)?.ok_or_else(|| {
                Error::fatal("object index pointed at a missing file record")
            })?;
            return Ok(file);
        }
        let file_id = self.next_file_id(&mut wtxn)?;
        let file = File::from_new(file_id, new);
        self.index_file(&mut wtxn, &file)?;
        wtxn.commit().map_err(heed_err)?;
        Ok(file)
    }

    pub fn get_by_id(&self, id: FileId) -> Result<Option<File>> {
        let rtxn = self.env.read_txn().map_err(heed_err)?;
        self.all_files.get(&rtxn, &(id.value() as u32)).map_err(heed_err)
    }

    pub fn get_by_object_id(&self, object_id: &str) -> Result<Option<File>> {
        let rtxn = self.env.read_txn().map_err(heed_err)?;
        match self.by_object_id.get(&rtxn, object_id).map_err(heed_err)? {
            Some(id) => self.all_files.get(&rtxn, &id).map_err(heed_err),
            None => Ok(None),
        }
    }

    pub fn get_by_analysis_id(&self, analysis_id: &str) -> Result<Vec<File>> {
        let rtxn = self.env.read_txn().map_err(heed_err)?;
        let ids = self.by_analysis.get(&rtxn, analysis_id).map_err(heed_err)?.unwrap_or_default();
        self.resolve(&rtxn, &ids)
    }

    pub fn get_by_object_ids(&self, object_ids: &[String]) -> Result<Vec<File>> {
        let rtxn = self.env.read_txn().map_err(heed_err)?;
        let mut out = Vec::with_capacity(object_ids.len());
        for object_id in object_ids {
            if let Some(id) = self.by_object_id.get(&rtxn, object_id).map_err(heed_err)? {
                if let Some(file) = self.all_files.get(&rtxn, &id).map_err(heed_err)? {
                    out.push(file);
                }
            }
        }
        Ok(out)
    }

    /// Lazy, restartable sequence over every file matching `filter`. Each
    /// `next()` call opens a fresh short-lived read transaction rather than
    /// holding one for the lifetime of the scan, so a long-running consumer
    /// (e.g. the recalculation trigger in §4.8) never blocks writers.
    pub fn get_files(&self, filter: FileFilter) -> Result<FileIter> {
        let candidate_ids = self.candidate_ids(&filter)?;
        Ok(FileIter::new(self.env.clone(), self.all_files, candidate_ids, filter))
    }

    pub fn get_all_files(&self) -> Result<FileIter> {
        self.get_files(FileFilter::default())
    }

    pub fn get_paginated_files(&self, page: u64, limit: u64, filter: FileFilter) -> Result<(Vec<File>, u64)> {
        let candidate_ids = self.candidate_ids(&filter)?;
        let total = candidate_ids.len();
        let rtxn = self.env.read_txn().map_err(heed_err)?;
        let skip = page.saturating_mul(limit);
        let page_ids: Vec<u32> = candidate_ids.iter().skip(skip as usize).take(limit as usize).collect();
        Ok((self.resolve(&rtxn, &RoaringBitmap::from_iter(page_ids))?, total))
    }

    pub fn count_files(&self, filter: FileFilter) -> Result<u64> {
        Ok(self.candidate_ids(&filter)?.len())
    }

    pub fn get_programs(&self, filter: FileFilter) -> Result<Vec<String>> {
        let rtxn = self.env.read_txn().map_err(heed_err)?;
        let ids = self.candidate_ids(&filter)?;
        let mut programs: Vec<String> =
            self.resolve(&rtxn, &ids)?.into_iter().map(|f| f.program_id).collect();
        programs.sort();
        programs.dedup();
        Ok(programs)
    }

    pub fn update_release_properties(&self, object_id: &str, update: ReleaseProperties) -> Result<File> {
        self.mutate(object_id, |file| {
            if let Some(stage) = update.embargo_stage {
                file.embargo_stage = stage;
            }
            if let Some(state) = update.release_state {
                file.release_state = state;
            }
            if let Some(start) = update.embargo_start {
                file.embargo_start = start;
            }
        })
    }

    pub fn update_admin_controls(&self, object_id: &str, update: AdminControlUpdate) -> Result<File> {
        self.mutate(object_id, |file| {
            if let Some(promote) = update.admin_promote {
                file.admin.admin_promote = promote;
            }
            if let Some(demote) = update.admin_demote {
                file.admin.admin_demote = demote;
            }
            if let Some(hold) = update.admin_hold {
                file.admin.admin_hold = hold;
            }
            if let Some(exemption) = update.clinical_exemption {
                file.clinical_exemption = exemption;
            }
        })
    }

    pub fn update_song_publish_status(&self, object_id: &str, update: PublishStatusUpdate) -> Result<File> {
        self.mutate(object_id, |file| {
            if let Some(status) = update.status {
                file.status = status;
            }
            if let Some(first_published) = update.first_published {
                file.first_published = first_published;
            }
        })
    }

    /// Optimistic-concurrency batch update: every file matching `filter` is
    /// re-read and re-written inside the same transaction, so a caller never
    /// observes a mix of pre- and post-update records within one call.
    pub fn update_bulk(&self, filter: FileFilter, update: BulkUpdate, return_documents: bool) -> Result<Vec<File>> {
        let ids = self.candidate_ids(&filter)?;
        let mut wtxn = self.env.write_txn().map_err(heed_err)?;
        let mut out = Vec::new();
        for id in ids.iter() {
            let Some(mut file) = self.all_files.get(&wtxn, &id).map_err(heed_err)? else { continue };
            if let Some(stage) = update.release.embargo_stage {
                file.embargo_stage = stage;
            }
            if let Some(state) = update.release.release_state {
                file.release_state = state;
            }
            if let Some(start) = update.release.embargo_start {
                file.embargo_start = start;
            }
            if let Some(promote) = update.admin.admin_promote {
                file.admin.admin_promote = promote;
            }
            if let Some(demote) = update.admin.admin_demote {
                file.admin.admin_demote = demote;
            }
            if let Some(hold) = update.admin.admin_hold {
                file.admin.admin_hold = hold;
            }
            if let Some(exemption) = update.admin.clinical_exemption.clone() {
                file.clinical_exemption = exemption;
            }
            if let Some(status) = update.publish.status {
                file.status = status;
            }
            if let Some(first_published) = update.publish.first_published {
                file.first_published = first_published;
            }
            self.all_files.put(&mut wtxn, &id, &file).map_err(heed_err)?;
            if return_documents {
                out.push(file);
            }
        }
        wtxn.commit().map_err(heed_err)?;
        Ok(out)
    }

    pub fn delete_by_ids(&self, ids: &[FileId]) -> Result<u64> {
        let mut wtxn = self.env.write_txn().map_err(heed_err)?;
        let mut deleted = 0u64;
        for id in ids {
            if let Some(file) = self.all_files.get(&wtxn, &(id.value() as u32)).map_err(heed_err)? {
                self.all_files.delete(&mut wtxn, &(id.value() as u32)).map_err(heed_err)?;
                self.by_object_id.delete(&mut wtxn, &file.object_id).map_err(heed_err)?;
                remove_from_bitmap(&mut wtxn, self.by_program, &file.program_id, *id)?;
                remove_from_bitmap(&mut wtxn, self.by_donor, &file.donor_id, *id)?;
                remove_from_bitmap(&mut wtxn, self.by_analysis, &file.analysis_id, *id)?;
                deleted += 1;
            }
        }
        wtxn.commit().map_err(heed_err)?;
        Ok(deleted)
    }

    /// Debug-only teardown: drops every record and resets the id counter.
    pub fn delete_all(&self) -> Result<()> {
        let mut wtxn = self.env.write_txn().map_err(heed_err)?;
        self.all_files.clear(&mut wtxn).map_err(heed_err)?;
        self.by_object_id.clear(&mut wtxn).map_err(heed_err)?;
        self.by_program.clear(&mut wtxn).map_err(heed_err)?;
        self.by_donor.clear(&mut wtxn).map_err(heed_err)?;
        self.by_analysis.clear(&mut wtxn).map_err(heed_err)?;
        self.counters.clear(&mut wtxn).map_err(heed_err)?;
        wtxn.commit().map_err(heed_err)
    }

    pub fn add_or_update_label(&self, file_id: FileId, labels: std::collections::BTreeMap<String, Vec<String>>) -> Result<File> {
        self.mutate_by_id(file_id, |file| file.labels.merge(labels))
    }

    pub fn remove_label(&self, file_id: FileId, keys: &[String]) -> Result<File> {
        self.mutate_by_id(file_id, |file| {
            file.labels.remove(keys);
            Ok(())
        })
    }

    fn mutate(&self, object_id: &str, f: impl FnOnce(&mut File)) -> Result<File> {
        let mut wtxn = self.env.write_txn().map_err(heed_err)?;
        let id = self
            .by_object_id
            .get(&wtxn, object_id)
            .map_err(heed_err)?
            .ok_or_else(|| Error::not_found(format!("no file with objectId {object_id:?}")))?;
        let mut file = self
            .all_files
            .get(&wtxn, &id)
            .map_err(heed_err)?
            .ok_or_else(|| Error::fatal("object index pointed at a missing file record"))?;
        f(&mut file);
        self.all_files.put(&mut wtxn, &id, &file).map_err(heed_err)?;
        wtxn.commit().map_err(heed_err)?;
        Ok(file)
    }

    fn mutate_by_id(&self, file_id: FileId, f: impl FnOnce(&mut File) -> Result<()>) -> Result<File> {
        let mut wtxn = self.env.write_txn().map_err(heed_err)?;
        let key = file_id.value() as u32;
        let mut file = self
            .all_files
            .get(&wtxn, &key)
            .map_err(heed_err)?
            .ok_or_else(|| Error::not_found(format!("no file with fileId {file_id}")))?;
        f(&mut file)?;
        self.all_files.put(&mut wtxn, &key, &file).map_err(heed_err)?;
        wtxn.commit().map_err(heed_err)?;
        Ok(file)
    }

    fn resolve(&self, rtxn: &RoTxn, ids: &RoaringBitmap) -> Result<Vec<File>> {
        let mut out = Vec::with_capacity(ids.len() as usize);
        for id in ids.iter() {
            if let Some(file) = self.all_files.get(rtxn, &id).map_err(heed_err)? {
                out.push(file);
            }
        }
        Ok(out)
    }

    fn candidate_ids(&self, filter: &FileFilter) -> Result<RoaringBitmap> {
        let rtxn = self.env.read_txn().map_err(heed_err)?;
        let all = || -> Result<RoaringBitmap> {
            Ok(self
                .all_files
                .iter(&rtxn)
                .map_err(heed_err)?
                .map(|r| r.map(|(k, _)| k))
                .collect::<std::result::Result<RoaringBitmap, _>>()
                .map_err(heed_err)?)
        };

        filter_eval::evaluate(filter, &rtxn, self.by_program, self.by_donor, self.by_analysis, self.by_object_id, &all)
    }
}

fn add_to_bitmap(wtxn: &mut RwTxn, db: Database<Str, RoaringBitmapCodec>, key: &str, id: FileId) -> Result<()> {
    let mut bitmap = db.get(wtxn, key).map_err(heed_err)?.unwrap_or_default();
    bitmap.insert(id.value() as u32);
    db.put(wtxn, key, &bitmap).map_err(heed_err)
}

fn remove_from_bitmap(wtxn: &mut RwTxn, db: Database<Str, RoaringBitmapCodec>, key: &str, id: FileId) -> Result<()> {
    if let Some(mut bitmap) = db.get(wtxn, key).map_err(heed_err)? {
        bitmap.remove(id.value() as u32);
        if bitmap.is_empty() {
            db.delete(wtxn, key).map_err(heed_err)?;
        } else {
            db.put(wtxn, key, &bitmap).map_err(heed_err)?;
        }
    }
    Ok(())
}

fn heed_err(e: impl std::fmt::Display) -> Error {
    Error::new(Code::Fatal, e.to_string())
}
