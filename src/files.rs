//! Input selection and file metadata
//!
//! `gather_inputs` flattens the paths given on the command line into the
//! `(path,name,file)` triples the archive stores.  A file argument is stored
//! under the path `./`; a directory argument is walked recursively with the
//! `walkdir` crate and each contained file is stored under its path relative
//! to the directory's parent, so the directory's own name survives in the
//! archive.  Symlinks inside a walked directory are not followed.
//!
//! The metadata half captures `(mode,atime,mtime)` for headers and applies
//! them again on extraction, using `filetime` for the timestamps.

use std::fs;
use std::path::{Path,PathBuf};
use std::time::SystemTime;
use filetime::FileTime;
use walkdir::WalkDir;
use crate::DYNERR;

/// One entry to be packed: the stored directory path, the stored file name,
/// and the file to read from.
#[derive(Clone,PartialEq,Eq,Debug)]
pub struct InputFile {
    pub path: String,
    pub name: String,
    pub file: PathBuf
}

/// Expand command line arguments into archive entries.  Files come first in
/// argument order, then the contents of each directory argument in walk
/// order.
pub fn gather_inputs(args: &[String]) -> Result<Vec<InputFile>,DYNERR> {
    let mut ans = Vec::new();
    let mut dirs: Vec<PathBuf> = Vec::new();
    for arg in args {
        let pb = PathBuf::from(arg);
        if pb.is_file() {
            let name = match pb.file_name() {
                Some(n) => n.to_string_lossy().into_owned(),
                None => return Err(Box::new(crate::Error::FileFormatMismatch))
            };
            ans.push(InputFile { path: "./".to_string(), name, file: pb });
        } else {
            dirs.push(pb);
        }
    }
    for dir in dirs {
        // strip the parent so the directory's own name is kept
        let base = match dir.parent() {
            Some(p) => p.to_path_buf(),
            None => PathBuf::new()
        };
        for entry in WalkDir::new(&dir) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let file = entry.into_path();
            let name = match file.file_name() {
                Some(n) => n.to_string_lossy().into_owned(),
                None => return Err(Box::new(crate::Error::FileFormatMismatch))
            };
            let parent = file.parent().unwrap_or(Path::new(""));
            let rel = parent.strip_prefix(&base).unwrap_or(parent);
            ans.push(InputFile {
                path: rel.to_string_lossy().into_owned(),
                name,
                file
            });
        }
    }
    Ok(ans)
}

/// Seconds since the epoch as a float, negative before the epoch.
pub fn system_time_secs(time: SystemTime) -> f64 {
    match time.duration_since(SystemTime::UNIX_EPOCH) {
        Ok(d) => d.as_secs_f64(),
        Err(e) => -e.duration().as_secs_f64()
    }
}

/// Permission and file-type bits as stored in the header.
#[cfg(unix)]
pub fn file_mode(meta: &fs::Metadata) -> u16 {
    use std::os::unix::fs::MetadataExt;
    meta.mode() as u16
}

#[cfg(not(unix))]
pub fn file_mode(_meta: &fs::Metadata) -> u16 {
    0
}

fn float_filetime(secs: f64) -> FileTime {
    let whole = secs.floor();
    let nanos = ((secs - whole) * 1e9).round() as u32;
    FileTime::from_unix_time(whole as i64,nanos.min(999_999_999))
}

/// Apply the stored mode and timestamps to an extracted file, mode first.
pub fn restore_metadata(file: &Path,mode: u16,atime: f64,mtime: f64) -> Result<(),std::io::Error> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(file,fs::Permissions::from_mode(mode as u32))?;
    }
    #[cfg(not(unix))]
    let _ = mode;
    filetime::set_file_times(file,float_filetime(atime),float_filetime(mtime))
}

// *************** TESTS *****************

#[cfg(test)]
fn make_tree() -> tempfile::TempDir {
    let dir = tempfile::tempdir().expect("no temp dir");
    let root = dir.path();
    fs::create_dir(root.join("files")).expect("mkdir failed");
    fs::create_dir(root.join("files").join("sub")).expect("mkdir failed");
    fs::write(root.join("top.txt"),b"top").expect("write failed");
    fs::write(root.join("files").join("a.txt"),b"a").expect("write failed");
    fs::write(root.join("files").join("sub").join("b.txt"),b"b").expect("write failed");
    dir
}

#[test]
fn file_argument_is_stored_at_dot() {
    let dir = make_tree();
    let arg = dir.path().join("top.txt").to_string_lossy().into_owned();
    let inputs = gather_inputs(&[arg]).expect("gather failed");
    assert_eq!(inputs.len(),1);
    assert_eq!(inputs[0].path,"./");
    assert_eq!(inputs[0].name,"top.txt");
}

#[test]
fn directory_argument_keeps_its_own_name() {
    let dir = make_tree();
    let arg = dir.path().join("files").to_string_lossy().into_owned();
    let mut inputs = gather_inputs(&[arg]).expect("gather failed");
    inputs.sort_by(|a,b| a.name.cmp(&b.name));
    assert_eq!(inputs.len(),2);
    assert_eq!(inputs[0].path,"files");
    assert_eq!(inputs[0].name,"a.txt");
    assert_eq!(inputs[1].path,Path::new("files").join("sub").to_string_lossy());
    assert_eq!(inputs[1].name,"b.txt");
}

#[test]
fn mixed_arguments_files_first() {
    let dir = make_tree();
    let args = vec![
        dir.path().join("files").to_string_lossy().into_owned(),
        dir.path().join("top.txt").to_string_lossy().into_owned()
    ];
    let inputs = gather_inputs(&args).expect("gather failed");
    assert_eq!(inputs.len(),3);
    assert_eq!(inputs[0].path,"./");
    assert_eq!(inputs[0].name,"top.txt");
}

#[test]
fn missing_argument_is_an_error() {
    let dir = make_tree();
    let arg = dir.path().join("no_such").to_string_lossy().into_owned();
    assert!(gather_inputs(&[arg]).is_err());
}

#[test]
fn metadata_roundtrip() {
    let dir = make_tree();
    let file = dir.path().join("top.txt");
    restore_metadata(&file,0o100600,1600000000.5,1600000001.25).expect("restore failed");
    let meta = fs::metadata(&file).expect("stat failed");
    #[cfg(unix)]
    assert_eq!(file_mode(&meta) & 0o777,0o600);
    let mtime = system_time_secs(meta.modified().expect("no mtime"));
    assert!((mtime - 1600000001.25).abs() < 1e-6);
}
