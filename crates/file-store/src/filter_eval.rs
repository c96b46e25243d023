use file_types::{FileFilter, FilterSet, Result};
use heed::types::{Str, U32};
use heed::{byteorder::BE, Database, RoTxn};
use roaring::RoaringBitmap;

use crate::codec::RoaringBitmapCodec;

type BEU32 = U32<BE>;

/// Evaluates `filter` into the set of candidate `fileId`s: every populated
/// list inside a `FilterSet` is unioned (set-membership disjunction), the
/// resulting `include`/`exclude` sets are intersected per §4.1.
pub fn evaluate(
    filter: &FileFilter,
    rtxn: &RoTxn,
    by_program: Database<Str, RoaringBitmapCodec>,
    by_donor: Database<Str, RoaringBitmapCodec>,
    by_analysis: Database<Str, RoaringBitmapCodec>,
    by_object_id: Database<Str, BEU32>,
    all: &dyn Fn() -> Result<RoaringBitmap>,
) -> Result<RoaringBitmap> {
    let included = match &filter.include {
        Some(set) if !set.is_empty() => {
            union_set(set, rtxn, by_program, by_donor, by_analysis, by_object_id)?
        }
        _ => all()?,
    };

    let excluded = match &filter.exclude {
        Some(set) if !set.is_empty() => {
            union_set(set, rtxn, by_program, by_donor, by_analysis, by_object_id)?
        }
        _ => RoaringBitmap::new(),
    };

    Ok(included - excluded)
}

fn union_set(
    set: &FilterSet,
    rtxn: &RoTxn,
    by_program: Database<Str, RoaringBitmapCodec>,
    by_donor: Database<Str, RoaringBitmapCodec>,
    by_analysis: Database<Str, RoaringBitmapCodec>,
    by_object_id: Database<Str, BEU32>,
) -> Result<RoaringBitmap> {
    let mut out = RoaringBitmap::new();

    if let Some(programs) = &set.programs {
        for p in programs {
            if let Some(bitmap) = by_program.get(rtxn, p).map_err(heed_err)? {
                out |= bitmap;
            }
        }
    }
    if let Some(donors) = &set.donors {
        for d in donors {
            if let Some(bitmap) = by_donor.get(rtxn, d).map_err(heed_err)? {
                out |= bitmap;
            }
        }
    }
    if let Some(analyses) = &set.analyses {
        for a in analyses {
            if let Some(bitmap) = by_analysis.get(rtxn, a).map_err(heed_err)? {
                out |= bitmap;
            }
        }
    }
    if let Some(file_ids) = &set.file_ids {
        out.extend(file_ids.iter().map(|id| id.value() as u32));
    }
    if let Some(object_ids) = &set.object_ids {
        for object_id in object_ids {
            if let Some(id) = by_object_id.get(rtxn, object_id).map_err(heed_err)? {
                out.insert(id);
            }
        }
    }

    Ok(out)
}

fn heed_err(e: impl std::fmt::Display) -> file_types::Error {
    file_types::Error::fatal(e.to_string())
}
