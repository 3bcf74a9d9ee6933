//! Shared key generation for storage backends.
//!
//! Key format: everything belonging to a file lives under `files/{file_id}/`.

use uuid::Uuid;

/// Prefix shared by every blob of a file
pub fn file_prefix(file_id: Uuid) -> String {
    format!("files/{}/", file_id)
}

/// Key of a chunk payload.
///
/// Re-uploading the same chunk number writes to the same key.
pub fn chunk_key(file_id: Uuid, chunk_number: i32) -> String {
    format!("files/{}/chunks/{}", file_id, chunk_number)
}

/// Key of the published assembled file
pub fn assembled_key(file_id: Uuid) -> String {
    format!("files/{}/assembled", file_id)
}

/// Scratch key for one reassembly attempt, renamed onto `assembled_key` on success
pub fn assembly_temp_key(file_id: Uuid, attempt_id: Uuid) -> String {
    format!("files/{}/assembled.tmp-{}", file_id, attempt_id)
}
