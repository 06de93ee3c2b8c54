// Storage layer
// SQLite holds the session-collection registry (collection-level metadata);
// LanceDB holds one vector table per session collection

pub mod lancedb;
pub mod sqlite;
