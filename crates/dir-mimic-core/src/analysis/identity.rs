use crate::model::FileRecord;

/// Identity used to decide that two records hold the same content:
/// `filename|size[|hash]`.
///
/// Identity is anchored on the file name, so identical bytes under different
/// names are never matched. Both catalogs must be scanned with the same hash
/// mode for keys to be comparable.
pub fn identity_key(record: &FileRecord) -> String {
    match &record.hash {
        Some(hash) => format!("{}|{}|{}", record.file_name(), record.size, hash),
        None => format!("{}|{}", record.file_name(), record.size),
    }
}
