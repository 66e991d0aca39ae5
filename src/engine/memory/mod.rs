// ── Mentor Memory ──────────────────────────────────────────────────────────
// Append-only, per-user, per-type record store (SQLite) with a derived,
// rebuildable in-memory similarity index per memory type.

mod index;
mod schema;
mod store;

pub use store::MemoryStore;
