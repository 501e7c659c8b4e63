pub mod header;
pub mod codec;
pub mod crypto;
pub mod block;
pub mod table;
pub mod index;
pub mod stream;
pub mod writer;
pub mod archive;

pub use archive::{Archive, ArchiveError};
pub use block::{decode_block, encode_block, BlockDescriptor, BlockFlags};
pub use codec::Compression;
pub use crypto::Encryption;
pub use header::ArchiveHeader;
pub use index::{FileIndex, FileIndexEntry};
pub use stream::EntryStream;
pub use table::{BlockSpan, BlockTable};
pub use writer::{PackOptions, PackageWriter};
