use file_types::{File, FileFilter};
use heed::types::{SerdeJson, U32};
use heed::{byteorder::BE, Database, Env};
use roaring::RoaringBitmap;

type BEU32 = U32<BE>;

/// A lazy, restartable sequence over a pre-computed id set. Implements
/// `Iterator` by opening one short read transaction per element rather than
/// holding a transaction for the whole scan, matching the "express as lazy
/// pull-based sequences" guidance for `GetAllFiles`.
pub struct FileIter {
    env: Env,
    all_files: Database<BEU32, SerdeJson<File>>,
    ids: std::vec::IntoIter<u32>,
    #[allow(dead_code)]
    filter: FileFilter,
}

impl FileIter {
    pub(crate) fn new(
        env: Env,
        all_files: Database<BEU32, SerdeJson<File>>,
        ids: RoaringBitmap,
        filter: FileFilter,
    ) -> Self {
        let ordered: Vec<u32> = ids.into_iter().collect();
        FileIter { env, all_files, ids: ordered.into_iter(), filter }
    }

    /// Resume this sequence after the given `fileId`, dropping everything
    /// up to and including it. Used by long-running scans (the embargo
    /// recalculation trigger) that checkpoint progress and may restart.
    pub fn resume_after(mut self, file_id: u32) -> Self {
        let remaining: Vec<u32> = self.ids.by_ref().skip_while(|id| *id <= file_id).collect();
        self.ids = remaining.into_iter();
        self
    }
}

impl Iterator for FileIter {
    type Item = file_types::Result<File>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let id = self.ids.next()?;
            let rtxn = match self.env.read_txn() {
                Ok(t) => t,
                Err(e) => return Some(Err(file_types::Error::fatal(e.to_string()))),
            };
            match self.all_files.get(&rtxn, &id) {
                Ok(Some(file)) => return Some(Ok(file)),
                Ok(None) => continue,
                Err(e) => return Some(Err(file_types::Error::fatal(e.to_string()))),
            }
        }
    }
}
