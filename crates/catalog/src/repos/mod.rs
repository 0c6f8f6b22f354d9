//! Repository traits implemented by the catalog stores.

pub mod counters;
pub mod mirrored_files;
pub mod origin_downloads;

pub use counters::{CounterRepo, CACHE_HITS_KEY, CACHE_MISSES_KEY};
pub use mirrored_files::MirroredFileRepo;
pub use origin_downloads::OriginDownloadRepo;

use crate::models::{MirroredFileRow, MirroredFileWithOrigin, OriginDownloadRow};
use std::collections::HashMap;

/// Join mirrored files with their origin records in memory.
///
/// Shared by both store implementations so the pairing logic cannot drift
/// between backends.
pub(crate) fn join_origins(
    files: Vec<MirroredFileRow>,
    origins: Vec<OriginDownloadRow>,
) -> Vec<MirroredFileWithOrigin> {
    let mut by_key: HashMap<(String, String), OriginDownloadRow> = origins
        .into_iter()
        .map(|o| ((o.mod_id.clone(), o.file_id.clone()), o))
        .collect();

    files
        .into_iter()
        .map(|file| {
            let origin = by_key.remove(&(file.mod_id.clone(), file.mod_download_id.clone()));
            MirroredFileWithOrigin { file, origin }
        })
        .collect()
}
