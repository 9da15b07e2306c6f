pub mod chunk;
pub mod directory;
pub mod inode;
pub mod tombstone;

pub use chunk::ChunkStore;
pub use directory::DirectoryStore;
pub use inode::InodeStore;
pub use tombstone::TombstoneStore;
