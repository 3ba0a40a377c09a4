/// Key-value backends holding the serialized blobs.
pub mod kv_store;
/// Match state persistence on top of a key-value backend.
pub mod local;
/// Storage error types.
pub mod storage;
