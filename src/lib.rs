//! # LZW Archiver Library
//!
//! Bundle files and directories into a single archive using adaptive LZW
//! compression, and restore them on demand.
//! * `lzw` is the streaming codec: variable code width starting at 9 bits,
//!   dictionary frozen at 2^16 entries, no reset
//! * `archive` is the container: a 1-byte file count followed by per-file
//!   records of `header || compressed payload`, where the header carries the
//!   file's mode, access and modification times, an MD5 of the compressed
//!   payload, both sizes, and the stored path and name
//! * `files` expands command-line inputs into `(path, name, file)` triples
//!   and restores metadata on extraction
//!
//! The compression/expansion functions are generics that operate on trait
//! objects with bounds `Read` or `Write`.  There are convenience functions
//! for working directly with buffers.
//!
//! ## File Example
//!
//! ```rs
//! use lzwar::*;
//! let mut in_file = std::fs::File::open("some_input_path").expect("open failed");
//! let mut out_file = std::fs::File::create("some_output_path").expect("create failed");
//! let (c_size,hash) = lzw::compress(&mut in_file,&mut out_file)
//!     .expect("compression failed");
//! eprintln!("wrote {} bytes, md5 {}",c_size,hex::encode(hash));
//! ```
//!
//! ## Buffer Example
//!
//! ```rs
//! use lzwar::*;
//! let test_data = "This is the chaunt of the priests.  The chaunt of the priests of Mung.".as_bytes();
//! let compressed = lzw::compress_slice(test_data).expect("compression failed");
//! ```

pub mod bits;
pub mod lzw;
pub mod archive;
pub mod files;

type DYNERR = Box<dyn std::error::Error>;
type STDRESULT = Result<(),Box<dyn std::error::Error>>;

/// Archiver Errors
#[derive(thiserror::Error,Debug)]
pub enum Error {
    #[error("file format mismatch")]
    FileFormatMismatch,
    #[error("invalid compression code")]
    BadCode,
    #[error("checksum failed")]
    BadChecksum,
    #[error("too many files for one archive")]
    TooManyFiles
}
