pub mod backblaze;
pub mod common;
#[cfg(test)]
pub mod in_memory;
pub mod local_fs;
pub mod supabase;
