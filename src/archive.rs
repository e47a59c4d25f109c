//! Archive container
//!
//! An archive is one count byte followed by up to 255 records, each being a
//! header and a compressed payload.  The header is written with little-endian
//! fixed fields and two length-prefixed UTF-8 tails:
//!
//! `mode u16 | atime f64 | mtime f64 | hash [16] | c_size u64 | size u64 |
//! path_length u16 | path | name_length u8 | name`
//!
//! `c_size` and `hash` describe the payload that follows, and are only known
//! after compression, so the writer reserves the header slot with zeros, runs
//! the codec, then seeks back and fills the slot in.  The reader repositions
//! to `payload start + c_size` after every entry, so a misbehaving payload
//! can never desynchronize header parsing.

use std::io::{Read,Write,Seek,SeekFrom,BufReader};
use std::fs;
use std::fs::File;
use std::path::{Path,PathBuf,Component};
use crate::{lzw,files};
use crate::files::InputFile;
use crate::{DYNERR,STDRESULT};

/// Width of the fixed header fields, everything before the path bytes.
const FIXED_FIELDS: usize = 2 + 8 + 8 + 16 + 8 + 8 + 2;

/// What to do with output files when an entry turns out to be damaged.
/// Damage means the decoder hit an impossible code, or the digest of the
/// compressed bytes did not match the stored hash.
#[derive(Clone,Copy,PartialEq)]
pub enum DamagePolicy {
    /// warn and keep whatever was written
    Ignore,
    /// warn, delete everything unpacked this invocation, stop
    RejectArchive,
    /// warn, delete this entry's output, continue
    RejectFiles
}

/// Per-file record preceding each compressed payload.
#[derive(Clone,PartialEq,Debug)]
pub struct Header {
    pub mode: u16,
    pub atime: f64,
    pub mtime: f64,
    pub hash: [u8;16],
    pub c_size: u64,
    pub size: u64,
    pub path: String,
    pub name: String
}

impl Header {
    /// Total header length on disk, fixed fields plus both tails.
    pub fn len(&self) -> u64 {
        (FIXED_FIELDS + 1 + self.path.len() + self.name.len()) as u64
    }
    /// Stat `file` and build the header for an entry that compressed to
    /// `c_size` bytes with digest `hash`.
    pub fn capture(input: &InputFile,c_size: u64,hash: [u8;16]) -> Result<Self,DYNERR> {
        let meta = fs::metadata(&input.file)?;
        Ok(Self {
            mode: files::file_mode(&meta),
            atime: files::system_time_secs(meta.accessed()?),
            mtime: files::system_time_secs(meta.modified()?),
            hash,
            c_size,
            size: meta.len(),
            path: input.path.clone(),
            name: input.name.clone()
        })
    }
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut ans = Vec::with_capacity(self.len() as usize);
        ans.extend_from_slice(&self.mode.to_le_bytes());
        ans.extend_from_slice(&self.atime.to_le_bytes());
        ans.extend_from_slice(&self.mtime.to_le_bytes());
        ans.extend_from_slice(&self.hash);
        ans.extend_from_slice(&self.c_size.to_le_bytes());
        ans.extend_from_slice(&self.size.to_le_bytes());
        ans.extend_from_slice(&(self.path.len() as u16).to_le_bytes());
        ans.extend_from_slice(self.path.as_bytes());
        ans.push(self.name.len() as u8);
        ans.extend_from_slice(self.name.as_bytes());
        ans
    }
    /// Parse a header at the reader's current position.  Failures here are
    /// fatal to the run: without a valid `c_size` the next record cannot be
    /// located.
    pub fn parse<R: Read>(reader: &mut R) -> Result<Self,DYNERR> {
        let mut fixed = [0u8;FIXED_FIELDS];
        reader.read_exact(&mut fixed)?;
        let mut hash = [0u8;16];
        hash.copy_from_slice(&fixed[18..34]);
        let path_length = u16::from_le_bytes(fixed[50..52].try_into().expect("bad slice")) as usize;
        let mut path = vec![0u8;path_length];
        reader.read_exact(&mut path)?;
        let mut name_length = [0u8;1];
        reader.read_exact(&mut name_length)?;
        let mut name = vec![0u8;name_length[0] as usize];
        reader.read_exact(&mut name)?;
        Ok(Self {
            mode: u16::from_le_bytes(fixed[0..2].try_into().expect("bad slice")),
            atime: f64::from_le_bytes(fixed[2..10].try_into().expect("bad slice")),
            mtime: f64::from_le_bytes(fixed[10..18].try_into().expect("bad slice")),
            hash,
            c_size: u64::from_le_bytes(fixed[34..42].try_into().expect("bad slice")),
            size: u64::from_le_bytes(fixed[42..50].try_into().expect("bad slice")),
            path: String::from_utf8(path).map_err(|_| crate::Error::FileFormatMismatch)?,
            name: String::from_utf8(name).map_err(|_| crate::Error::FileFormatMismatch)?
        })
    }
    /// Stored location as shown by `listing`, with any leading `./` dropped.
    pub fn display_path(&self) -> String {
        let joined = Path::new(&self.path).join(&self.name);
        let mut ans = PathBuf::new();
        for part in joined.components() {
            if !matches!(part,Component::CurDir) {
                ans.push(part);
            }
        }
        ans.to_string_lossy().into_owned()
    }
}

/// Compress every input into a new archive at `archive_name`.
/// Entries are written in the order given, each as a reserved header slot
/// followed by the payload; the slot is backfilled once the payload's size
/// and digest are known.
pub fn pack(archive_name: &Path,inputs: &[InputFile]) -> STDRESULT {
    if inputs.len() > u8::MAX as usize {
        return Err(Box::new(crate::Error::TooManyFiles));
    }
    let mut archive = File::create(archive_name)?;
    archive.write_all(&[inputs.len() as u8])?;
    for input in inputs {
        if input.path.len() > u16::MAX as usize || input.name.len() > u8::MAX as usize {
            return Err(Box::new(crate::Error::FileFormatMismatch));
        }
        let reserved = FIXED_FIELDS + 1 + input.path.len() + input.name.len();
        archive.write_all(&vec![0u8;reserved])?;
        let mut file = File::open(&input.file)?;
        let (c_size,hash) = lzw::compress(&mut file,&mut archive)?;
        log::debug!("{} compressed to {} bytes",input.name,c_size);
        let header = Header::capture(input,c_size,hash)?;
        archive.seek(SeekFrom::Current(-((reserved as u64 + c_size) as i64)))?;
        archive.write_all(&header.to_bytes())?;
        archive.seek(SeekFrom::Current(c_size as i64))?;
    }
    Ok(())
}

/// Expand an archive into `directory`, creating it if necessary.
/// `restore` applies the stored mode and timestamps to each output file.
/// Damaged entries are warned about once each and handled per `policy`;
/// damage never fails the run, only host I/O does.
pub fn unpack(archive_name: &Path,directory: &Path,restore: bool,policy: DamagePolicy) -> STDRESULT {
    if !directory.exists() {
        fs::create_dir_all(directory)?;
    }
    let mut archive = BufReader::new(File::open(archive_name)?);
    let mut f_count = [0u8;1];
    archive.read_exact(&mut f_count)?;
    let mut unpacked: Vec<PathBuf> = Vec::new();
    for _i in 0..f_count[0] {
        let header = Header::parse(&mut archive)?;
        let payload_start = archive.stream_position()?;
        let dir = directory.join(&header.path);
        if !dir.exists() {
            fs::create_dir_all(&dir)?;
        }
        let file = dir.join(&header.name);
        let result = unpack_entry(&mut archive,&header,&file,restore);
        unpacked.push(file.clone());
        // reposition to the next record no matter what the payload did
        archive.seek(SeekFrom::Start(payload_start + header.c_size))?;
        match result {
            Ok(()) => {},
            Err(e) if e.downcast_ref::<crate::Error>().is_some() => match policy {
                DamagePolicy::Ignore => {
                    log::warn!("{} damaged!",header.name);
                },
                DamagePolicy::RejectArchive => {
                    log::warn!("Archive not unpacked. Damage!");
                    for f in &unpacked {
                        fs::remove_file(f)?;
                    }
                    break;
                },
                DamagePolicy::RejectFiles => {
                    log::warn!("{} not unpacked. Damage!",header.name);
                    fs::remove_file(&file)?;
                    unpacked.pop();
                }
            },
            Err(e) => return Err(e)
        }
    }
    Ok(())
}

/// Decode one payload to `file`, restore metadata if asked, then judge the
/// digest.  Any `crate::Error` coming out of here is damage; everything else
/// is a host I/O failure.
fn unpack_entry<R: Read>(archive: &mut R,header: &Header,file: &Path,restore: bool) -> STDRESULT {
    let mut out = File::create(file)?;
    let hash = lzw::expand(archive,&mut out,header.c_size)?;
    drop(out);
    if restore {
        files::restore_metadata(file,header.mode,header.atime,header.mtime)?;
    }
    if hash != header.hash {
        return Err(Box::new(crate::Error::BadChecksum));
    }
    Ok(())
}

/// Parse every header without decoding any payload.
pub fn list_headers(archive_name: &Path) -> Result<Vec<Header>,DYNERR> {
    let mut archive = BufReader::new(File::open(archive_name)?);
    let mut f_count = [0u8;1];
    archive.read_exact(&mut f_count)?;
    let mut ans = Vec::new();
    for _i in 0..f_count[0] {
        let header = Header::parse(&mut archive)?;
        archive.seek_relative(header.c_size as i64)?;
        ans.push(header);
    }
    Ok(ans)
}

// *************** TESTS *****************

#[cfg(test)]
fn write_tree(dir: &Path) -> Vec<InputFile> {
    fs::write(dir.join("0.txt"),"The quick brown fox jumps over the lazy dog.\n".repeat(8)).expect("write failed");
    fs::write(dir.join("1.txt"),"Pack my box with five dozen liquor jugs.\n".repeat(8)).expect("write failed");
    files::gather_inputs(&[
        dir.join("0.txt").to_string_lossy().into_owned(),
        dir.join("1.txt").to_string_lossy().into_owned()
    ]).expect("gather failed")
}

#[test]
fn header_roundtrip() {
    let header = Header {
        mode: 0o100644,
        atime: 1700000000.25,
        mtime: 1700000001.75,
        hash: [7u8;16],
        c_size: 1234,
        size: 4321,
        path: "./".to_string(),
        name: "0.txt".to_string()
    };
    let bytes = header.to_bytes();
    assert_eq!(bytes.len() as u64,header.len());
    assert_eq!(bytes.len(),53 + 2 + 5);
    let parsed = Header::parse(&mut bytes.as_slice()).expect("parse failed");
    assert_eq!(parsed,header);
}

#[test]
fn structural_law() {
    let temp_dir = tempfile::tempdir().expect("no temp dir");
    let inputs = write_tree(temp_dir.path());
    let archive_name = temp_dir.path().join("arch.lzw");
    pack(&archive_name,&inputs).expect("pack failed");
    let headers = list_headers(&archive_name).expect("listing failed");
    let expected: u64 = 1 + headers.iter().map(|h| h.len() + h.c_size).sum::<u64>();
    assert_eq!(expected,fs::metadata(&archive_name).expect("no archive").len());
}

#[test]
fn listing_matches_writer() {
    let temp_dir = tempfile::tempdir().expect("no temp dir");
    let inputs = write_tree(temp_dir.path());
    let archive_name = temp_dir.path().join("arch.lzw");
    pack(&archive_name,&inputs).expect("pack failed");
    let headers = list_headers(&archive_name).expect("listing failed");
    assert_eq!(headers.len(),2);
    for (header,input) in headers.iter().zip(inputs.iter()) {
        // independent second pass over the same input
        let data = fs::read(&input.file).expect("read failed");
        let compressed = lzw::compress_slice(&data).expect("compression failed");
        assert_eq!(header.path,"./");
        assert_eq!(header.name,input.name);
        assert_eq!(header.size,data.len() as u64);
        assert_eq!(header.c_size,compressed.len() as u64);
        assert_eq!(header.hash,md5::compute(&compressed).0);
        assert_eq!(header.display_path(),input.name);
    }
}

#[test]
fn pack_then_unpack() {
    let temp_dir = tempfile::tempdir().expect("no temp dir");
    let inputs = write_tree(temp_dir.path());
    let archive_name = temp_dir.path().join("arch.lzw");
    pack(&archive_name,&inputs).expect("pack failed");
    let out = temp_dir.path().join("out");
    unpack(&archive_name,&out,false,DamagePolicy::Ignore).expect("unpack failed");
    for input in &inputs {
        let expanded = fs::read(out.join(&input.name)).expect("missing output");
        let original = fs::read(&input.file).expect("read failed");
        assert_eq!(expanded,original);
    }
}

#[test]
fn damaged_entry_is_dropped() {
    let temp_dir = tempfile::tempdir().expect("no temp dir");
    let inputs = write_tree(temp_dir.path());
    let archive_name = temp_dir.path().join("arch.lzw");
    pack(&archive_name,&inputs).expect("pack failed");
    // flip a byte near the tail, inside the second payload
    let mut raw = fs::read(&archive_name).expect("read failed");
    let at = raw.len() - 10;
    raw[at] ^= 0xff;
    fs::write(&archive_name,&raw).expect("write failed");
    let out = temp_dir.path().join("out");
    unpack(&archive_name,&out,false,DamagePolicy::RejectFiles).expect("unpack failed");
    assert!(out.join("0.txt").exists());
    assert!(!out.join("1.txt").exists());
}

#[test]
fn damaged_archive_is_rolled_back() {
    let temp_dir = tempfile::tempdir().expect("no temp dir");
    let inputs = write_tree(temp_dir.path());
    let archive_name = temp_dir.path().join("arch.lzw");
    pack(&archive_name,&inputs).expect("pack failed");
    let mut raw = fs::read(&archive_name).expect("read failed");
    let at = raw.len() - 10;
    raw[at] ^= 0xff;
    fs::write(&archive_name,&raw).expect("write failed");
    let out = temp_dir.path().join("out");
    unpack(&archive_name,&out,false,DamagePolicy::RejectArchive).expect("unpack failed");
    assert!(!out.join("0.txt").exists());
    assert!(!out.join("1.txt").exists());
}
